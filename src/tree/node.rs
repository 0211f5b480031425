//! One entry in the document tree and its status state machine.

use crate::doctype::DocumentType;
use crate::error::IngestError;
use crate::locator::Locator;
use crate::tree::NodeId;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Lifecycle of a node.
///
/// ```text
/// AwaitingFetch → InProgress(percent) → Downloaded → Parsed
///                                                  ↘ Failed(error)
/// ```
///
/// `Parsed` and `Failed` are terminal until the node is fetched again.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", content = "detail", rename_all = "snake_case")]
pub enum NodeStatus {
    AwaitingFetch,
    /// Fetch underway; percent-complete in 0–100.
    InProgress(f64),
    Downloaded,
    Parsed,
    Failed(IngestError),
}

impl NodeStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, NodeStatus::Parsed | NodeStatus::Failed(_))
    }

    pub fn error(&self) -> Option<&IngestError> {
        match self {
            NodeStatus::Failed(e) => Some(e),
            _ => None,
        }
    }
}

/// A fetched-and-parsed content source.
///
/// Fields are read through accessors; only the orchestrator (which holds
/// `&mut DocumentTree`) mutates them.
#[derive(Debug, Clone)]
pub struct DocumentNode {
    pub(crate) id: NodeId,
    pub(crate) locator: Locator,
    pub(crate) status: NodeStatus,
    pub(crate) raw_content: Vec<Bytes>,
    pub(crate) exported_content: Vec<String>,
    pub(crate) title: Option<String>,
    pub(crate) author: Option<String>,
    pub(crate) cover: Option<Bytes>,
    pub(crate) doc_type: Option<DocumentType>,
    pub(crate) filename: String,
    pub(crate) created: Option<DateTime<Utc>>,
    pub(crate) modified: Option<DateTime<Utc>>,
    pub(crate) size: Option<u64>,
    pub(crate) needs_chunking: bool,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
}

impl DocumentNode {
    /// Construct a node, deriving its type signature from the locator.
    ///
    /// Unsupported signatures put the node straight into
    /// `Failed(DocumentTypeNotSupported)`; no fetch will be attempted.
    pub(crate) fn new(id: NodeId, locator: Locator, parent: Option<NodeId>) -> Self {
        let doc_type = initial_type(&locator);
        let status = match &doc_type {
            Some(t) if !t.is_supported() => {
                NodeStatus::Failed(IngestError::DocumentTypeNotSupported {
                    doc_type: t.to_string(),
                })
            }
            _ => NodeStatus::AwaitingFetch,
        };
        let filename = locator.filename();
        Self {
            id,
            locator,
            status,
            raw_content: Vec::new(),
            exported_content: Vec::new(),
            title: None,
            author: None,
            cover: None,
            doc_type,
            filename,
            created: None,
            modified: None,
            size: None,
            needs_chunking: false,
            parent,
            children: Vec::new(),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn locator(&self) -> &Locator {
        &self.locator
    }

    pub fn status(&self) -> &NodeStatus {
        &self.status
    }

    pub fn raw_content(&self) -> &[Bytes] {
        &self.raw_content
    }

    pub fn exported_content(&self) -> &[String] {
        &self.exported_content
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn author(&self) -> Option<&str> {
        self.author.as_deref()
    }

    pub fn cover(&self) -> Option<&Bytes> {
        self.cover.as_ref()
    }

    pub fn doc_type(&self) -> Option<&DocumentType> {
        self.doc_type.as_ref()
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn created(&self) -> Option<DateTime<Utc>> {
        self.created
    }

    pub fn modified(&self) -> Option<DateTime<Utc>> {
        self.modified
    }

    pub fn size(&self) -> Option<u64> {
        self.size
    }

    /// Hint that the content is long unstructured text worth chunking downstream.
    pub fn needs_chunking(&self) -> bool {
        self.needs_chunking
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// True once this node has been expanded into children.
    pub fn is_container(&self) -> bool {
        self.doc_type.as_ref().is_some_and(DocumentType::is_container)
    }

    // ── Orchestrator-side transitions ────────────────────────────────────

    /// Drop everything a previous parse produced.
    pub(crate) fn clear_output(&mut self) {
        self.exported_content.clear();
        self.title = None;
        self.author = None;
        self.cover = None;
        self.needs_chunking = false;
    }

    pub(crate) fn set_failed(&mut self, error: IngestError) {
        self.clear_output();
        self.status = NodeStatus::Failed(error);
    }

    pub(crate) fn set_progress(&mut self, percent: f64) {
        let percent = percent.clamp(0.0, 100.0);
        // Monotonic within one fetch.
        if let NodeStatus::InProgress(current) = self.status {
            if percent < current {
                return;
            }
        }
        self.status = NodeStatus::InProgress(percent);
    }
}

/// Type signature at construction time.
///
/// Local paths use their extension; an extensionless directory is a folder and
/// an extensionless file is sniffed later. Remote locators only trust an
/// extension that maps to a supported type; otherwise the MIME type decides.
fn initial_type(locator: &Locator) -> Option<DocumentType> {
    match locator {
        Locator::Local(path) => match locator.extension() {
            Some(ext) if path.is_dir() && ext != "rtfd" => Some(DocumentType::Folder),
            Some(ext) => Some(DocumentType::from_extension(&ext)),
            None if path.is_dir() => Some(DocumentType::Folder),
            None => None,
        },
        Locator::Remote(_) => locator
            .extension()
            .map(|ext| DocumentType::from_extension(&ext))
            .filter(DocumentType::is_supported),
    }
}

/// Serialisable snapshot of a node and its subtree.
#[derive(Debug, Clone, Serialize)]
pub struct NodeReport {
    pub locator: String,
    pub filename: String,
    pub doc_type: Option<String>,
    pub status: NodeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    pub has_cover: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified: Option<DateTime<Utc>>,
    pub needs_chunking: bool,
    pub content: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeReport>,
}
