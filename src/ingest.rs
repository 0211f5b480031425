//! Orchestrator: drives fetch and parse over a [`DocumentTree`].
//!
//! ```text
//! ingest(input)
//!   ├─ fetch(root)  ── local/remote fetch ──▶ bytes │ child locators
//!   │     └─ fetch(child) …           (one at a time, enumeration order)
//!   └─ parse(root)
//!         ├─ parse(child) …           (depth-first, children before parent)
//!         └─ Extractor::select ─▶ parse_document(format)
//! ```
//!
//! Failures never propagate out of [`Ingestor::fetch`] or [`Ingestor::parse`]:
//! each one is recorded on the node it belongs to, and siblings and parents
//! carry on. All mutation goes through `&mut DocumentTree`, so two overlapping
//! runs over the same tree cannot be expressed.

use crate::config::{ExportFormat, IngestConfig};
use crate::doctype::DocumentType;
use crate::error::IngestError;
use crate::extract::{ExtractContext, Extractor};
use crate::fetch::{FetchLayer, Fetched, LocalFetcher, LocalOnlyProvider, RemoteFetcher};
use crate::locator::Locator;
use crate::readability::ReadabilityEngine;
use crate::tree::{DocumentTree, NodeId, NodeStatus};
use futures::future::BoxFuture;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Fetches and parses document trees with one configuration.
///
/// Holds the HTTP client and the Readability engine, so reuse one `Ingestor`
/// across inputs rather than building one per call.
pub struct Ingestor {
    config: IngestConfig,
    fetcher: FetchLayer,
    readability: ReadabilityEngine,
}

impl Ingestor {
    pub fn new(config: IngestConfig) -> Result<Self, IngestError> {
        let remote = RemoteFetcher::new(config.fetch_timeout_secs, &config.user_agent)?;
        let cloud = config
            .cloud_provider
            .clone()
            .unwrap_or_else(|| Arc::new(LocalOnlyProvider));
        let local = LocalFetcher::new(config.include_hidden, cloud);
        let readability = ReadabilityEngine::new(&config, remote.client().clone());
        Ok(Self {
            fetcher: FetchLayer::new(local, remote),
            readability,
            config,
        })
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// Fetch `input` and parse it in `format` (or the configured default).
    ///
    /// Only an unparseable `input` is an `Err`; every other failure is
    /// recorded on a node of the returned tree.
    pub async fn ingest(
        &self,
        input: &str,
        format: Option<ExportFormat>,
    ) -> Result<DocumentTree, IngestError> {
        self.ingest_with_cancel(input, format, &CancellationToken::new())
            .await
    }

    /// [`Ingestor::ingest`] observing `cancel`.
    pub async fn ingest_with_cancel(
        &self,
        input: &str,
        format: Option<ExportFormat>,
        cancel: &CancellationToken,
    ) -> Result<DocumentTree, IngestError> {
        let locator = Locator::parse(input)?;
        info!("Ingesting {}", locator);

        let mut tree = DocumentTree::new();
        let root = tree.insert_root(locator);
        let recursive = self.config.recursive;
        self.fetch(&mut tree, root, recursive, cancel).await;
        self.parse(&mut tree, root, format, recursive, cancel).await;
        Ok(tree)
    }

    /// Fetch `id`'s content or children, then (if `recursive`) every child.
    pub fn fetch<'a>(
        &'a self,
        tree: &'a mut DocumentTree,
        id: NodeId,
        recursive: bool,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            if let NodeStatus::Failed(IngestError::DocumentTypeNotSupported { .. }) =
                tree.node(id).status()
            {
                debug!("Skipping fetch of unsupported {}", tree.node(id).locator());
                return;
            }

            let locator = tree.node(id).locator().clone();
            let label = locator.to_string();
            let callback = self.config.progress_callback.clone();
            if let Some(cb) = &callback {
                cb.on_fetch_start(id, &label);
            }

            let result = {
                let node = tree.node_mut(id);
                node.status = NodeStatus::InProgress(0.0);
                let mut progress = |percent: f64| {
                    node.set_progress(percent);
                    if let Some(cb) = &callback {
                        cb.on_fetch_progress(id, &label, percent);
                    }
                };
                self.fetcher.fetch(&locator, &mut progress, cancel).await
            };

            match result {
                Err(error) => {
                    warn!("Fetch of {} failed: {}", label, error);
                    tree.detach_children(id);
                    let node = tree.node_mut(id);
                    node.raw_content.clear();
                    node.set_failed(error);
                    if let (Some(cb), Some(e)) = (&callback, node.status().error()) {
                        cb.on_node_failed(id, &label, e);
                    }
                }
                Ok(Fetched::Content {
                    data,
                    doc_type,
                    meta,
                }) => {
                    tree.detach_children(id);
                    let node = tree.node_mut(id);
                    if doc_type.is_some() {
                        node.doc_type = doc_type;
                    }
                    node.size = meta.size.or(Some(data.len() as u64));
                    node.created = meta.created;
                    node.modified = meta.modified;
                    node.raw_content = vec![data];
                    node.clear_output();
                    node.status = NodeStatus::Downloaded;
                    info!("Downloaded {} ({} bytes)", label, node.size.unwrap_or(0));
                    if let Some(cb) = &callback {
                        cb.on_node_downloaded(id, &label, 0);
                    }
                }
                Ok(Fetched::Children { locators, meta }) => {
                    tree.detach_children(id);
                    {
                        let node = tree.node_mut(id);
                        node.doc_type = node.doc_type.take().or(Some(DocumentType::Folder));
                        node.raw_content.clear();
                        node.clear_output();
                        node.created = meta.created;
                        node.modified = meta.modified;
                    }
                    let children: Vec<NodeId> = locators
                        .into_iter()
                        .map(|child| tree.add_child(id, child))
                        .collect();
                    tree.node_mut(id).status = NodeStatus::Downloaded;
                    info!("Downloaded {} ({} children)", label, children.len());
                    if let Some(cb) = &callback {
                        cb.on_node_downloaded(id, &label, children.len());
                    }

                    for child in children {
                        let child_node = tree.node(child);
                        if let NodeStatus::Failed(e) = child_node.status() {
                            if let Some(cb) = &callback {
                                cb.on_node_failed(child, &child_node.locator().to_string(), e);
                            }
                            continue;
                        }
                        if recursive {
                            self.fetch(tree, child, true, cancel).await;
                        }
                    }
                }
            }
        })
    }

    /// Parse `id` (children first when `recursive`) into `format`.
    pub fn parse<'a>(
        &'a self,
        tree: &'a mut DocumentTree,
        id: NodeId,
        format: Option<ExportFormat>,
        recursive: bool,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            if recursive {
                let children = tree.children(id).to_vec();
                for child in children {
                    self.parse(tree, child, format, true, cancel).await;
                }
            }

            let node = tree.node(id);
            let label = node.locator().to_string();
            let callback = self.config.progress_callback.clone();

            // A fetch failure leaves no bytes behind; keep its error.
            if matches!(node.status(), NodeStatus::Failed(_))
                && node.raw_content().is_empty()
                && node.children().is_empty()
            {
                return;
            }

            if node.is_container() || !node.children().is_empty() {
                // A container is only complete once its listing was fetched.
                if !matches!(node.status(), NodeStatus::Downloaded | NodeStatus::Parsed) {
                    let node = tree.node_mut(id);
                    node.set_failed(IngestError::EmptyDocument);
                    debug!("Container {} was never fetched", label);
                    if let (Some(cb), Some(e)) = (&callback, node.status().error()) {
                        cb.on_node_failed(id, &label, e);
                    }
                    return;
                }
                let node = tree.node_mut(id);
                node.clear_output();
                node.status = NodeStatus::Parsed;
                debug!("Parsed container {}", label);
                if let Some(cb) = &callback {
                    cb.on_node_parsed(id, &label, 0);
                }
                return;
            }

            let result = match node.raw_content().first() {
                None => Err(IngestError::EmptyDocument),
                Some(_) if cancel.is_cancelled() => Err(IngestError::Cancelled),
                Some(data) => {
                    match Extractor::select(data.clone(), node.locator(), node.doc_type()) {
                        Err(e) => Err(e),
                        Ok(extractor) => {
                            let ctx = ExtractContext {
                                readability: &self.readability,
                                cancel,
                                pdfium_lib_path: self.config.pdfium_lib_path.as_deref(),
                            };
                            let format = format.or(self.config.default_format);
                            extractor.parse_document(format, &ctx).await
                        }
                    }
                }
            };

            let node = tree.node_mut(id);
            match result {
                Ok(parsed) => {
                    let sections = parsed.content.len();
                    node.exported_content = parsed.content;
                    node.title = parsed.title;
                    node.author = parsed.author;
                    node.cover = parsed.cover;
                    node.needs_chunking = parsed.needs_chunking;
                    node.status = NodeStatus::Parsed;
                    info!("Parsed {} ({} sections)", label, sections);
                    if let Some(cb) = &callback {
                        cb.on_node_parsed(id, &label, sections);
                    }
                }
                Err(error) => {
                    warn!("Parse of {} failed: {}", label, error);
                    node.set_failed(error);
                    if let (Some(cb), Some(e)) = (&callback, node.status().error()) {
                        cb.on_node_failed(id, &label, e);
                    }
                }
            }
        })
    }
}

/// Ingest `input` with `config`, using the configured default format.
///
/// # Example
/// ```rust,no_run
/// use edgequake_ingest::{ingest, IngestConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let tree = ingest("./docs", &IngestConfig::default()).await?;
/// for id in tree.walk(tree.roots()[0]) {
///     let node = tree.node(id);
///     println!("{} {:?}", node.filename(), node.status());
/// }
/// # Ok(())
/// # }
/// ```
pub async fn ingest(input: &str, config: &IngestConfig) -> Result<DocumentTree, IngestError> {
    Ingestor::new(config.clone())?
        .ingest(input, config.default_format)
        .await
}

/// Synchronous wrapper around [`ingest`].
///
/// Creates a temporary tokio runtime internally.
pub fn ingest_sync(input: &str, config: &IngestConfig) -> Result<DocumentTree, IngestError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| IngestError::Internal(format!("Failed to create tokio runtime: {e}")))?
        .block_on(ingest(input, config))
}
