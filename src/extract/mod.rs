//! Format extractors and the dispatcher that picks one per node.
//!
//! ```text
//! (bytes, locator, doc_type) ──select──▶ Extractor ──parse_document(format)──▶ ParsedDocument
//! ```
//!
//! [`Extractor::select`] is a pure mapping; the dispatch table lives in one
//! `match` so it can be checked against [`DocumentType::is_supported`].
//! CPU-bound parsing (pdfium, calamine, zip) runs inside `spawn_blocking`.

pub mod epub;
pub mod html;
pub mod pdf;
pub mod plaintext;
pub mod postprocess;
pub mod richtext;
pub mod spreadsheet;

use crate::config::ExportFormat;
use crate::doctype::DocumentType;
use crate::error::IngestError;
use crate::locator::Locator;
use crate::readability::{sanitize_html, ReadabilityEngine, RenderSource};
use bytes::Bytes;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

pub use richtext::RichTextKind;

/// What every extractor returns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedDocument {
    pub title: Option<String>,
    pub author: Option<String>,
    pub cover: Option<Bytes>,
    /// One entry per worksheet, page group or chapter, in source order.
    pub content: Vec<String>,
    /// Hint that `content` is long unstructured text a consumer should split.
    pub needs_chunking: bool,
}

/// Shared services an extractor may need.
#[derive(Clone, Copy)]
pub struct ExtractContext<'a> {
    pub readability: &'a ReadabilityEngine,
    pub cancel: &'a CancellationToken,
    pub pdfium_lib_path: Option<&'a Path>,
}

/// One extractor per format family, carrying the bytes it will parse.
#[derive(Debug, Clone)]
pub enum Extractor {
    Spreadsheet { data: Bytes, csv: bool },
    RichText { data: Bytes, kind: RichTextKind },
    Pdf { data: Bytes },
    Epub { data: Bytes },
    PlainText { data: Bytes },
    Html { source: HtmlSource },
}

/// Where the HTML extractor reads its page from.
#[derive(Debug, Clone, PartialEq)]
pub enum HtmlSource {
    /// Navigate the render engine to a remote page.
    Remote(Url),
    /// Load local bytes as a raw HTML string.
    Local(Bytes),
}

impl Extractor {
    /// Route a node's bytes to the extractor for its type signature.
    pub fn select(
        data: Bytes,
        locator: &Locator,
        doc_type: Option<&DocumentType>,
    ) -> Result<Extractor, IngestError> {
        let doc_type = match (doc_type, locator) {
            (None, Locator::Remote(url)) => {
                return Ok(Extractor::Html {
                    source: HtmlSource::Remote(url.clone()),
                })
            }
            (None, Locator::Local(_)) => {
                return Err(IngestError::DocumentTypeNotSupported {
                    doc_type: "unknown".into(),
                })
            }
            (Some(t), Locator::Local(_)) if !t.is_supported() => {
                return Err(IngestError::DocumentTypeNotSupported {
                    doc_type: t.to_string(),
                })
            }
            (Some(t), _) => t,
        };

        let extractor = match doc_type {
            DocumentType::Folder | DocumentType::Epub => Extractor::Epub { data },
            DocumentType::Spreadsheet => Extractor::Spreadsheet { data, csv: false },
            DocumentType::Csv => Extractor::Spreadsheet { data, csv: true },
            DocumentType::Pdf => Extractor::Pdf { data },
            DocumentType::Rtf => Extractor::RichText {
                data,
                kind: RichTextKind::Rtf,
            },
            DocumentType::Rtfd => Extractor::RichText {
                data,
                kind: RichTextKind::Rtfd,
            },
            DocumentType::Doc => Extractor::RichText {
                data,
                kind: RichTextKind::Doc,
            },
            DocumentType::Docx => Extractor::RichText {
                data,
                kind: RichTextKind::Docx,
            },
            DocumentType::WebArchive => Extractor::RichText {
                data,
                kind: RichTextKind::WebArchive,
            },
            DocumentType::PlainText
            | DocumentType::SourceCode(_)
            | DocumentType::Xml
            | DocumentType::Json
            | DocumentType::UrlBookmark
            | DocumentType::Email => Extractor::PlainText { data },
            DocumentType::Html => match locator {
                Locator::Remote(url) => Extractor::Html {
                    source: HtmlSource::Remote(url.clone()),
                },
                Locator::Local(_) => Extractor::Html {
                    source: HtmlSource::Local(data),
                },
            },
            DocumentType::Other(tag) => {
                return Err(IngestError::DocumentTypeNotSupported {
                    doc_type: tag.clone(),
                })
            }
        };
        debug!("Dispatching {} to the {} extractor", locator, extractor.name());
        Ok(extractor)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Extractor::Spreadsheet { .. } => "spreadsheet",
            Extractor::RichText { .. } => "rich-text",
            Extractor::Pdf { .. } => "pdf",
            Extractor::Epub { .. } => "epub",
            Extractor::PlainText { .. } => "plain-text",
            Extractor::Html { .. } => "html",
        }
    }

    /// Convert to `format`, or to the extractor's natural format when `None`.
    pub async fn parse_document(
        self,
        format: Option<ExportFormat>,
        ctx: &ExtractContext<'_>,
    ) -> Result<ParsedDocument, IngestError> {
        match self {
            Extractor::Spreadsheet { data, csv } => {
                let format = format.unwrap_or(ExportFormat::Markdown);
                blocking(move || spreadsheet::parse(&data, csv, format)).await
            }
            Extractor::RichText { data, kind } => richtext::parse(data, kind, format, ctx).await,
            Extractor::Pdf { data } => pdf::parse(data, format, ctx).await,
            Extractor::Epub { data } => epub::parse(data, format, ctx).await,
            Extractor::PlainText { data } => plaintext::parse(&data),
            Extractor::Html { source } => html::parse(source, format, ctx).await,
        }
    }
}

/// Run CPU-bound parsing on the blocking pool.
pub(crate) async fn blocking<T, F>(work: F) -> Result<T, IngestError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, IngestError> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| IngestError::Internal(format!("extractor task panicked: {e}")))?
}

/// Boilerplate-strip an HTML document and sanitise the article markup.
pub(crate) async fn readable_html(
    html: String,
    ctx: &ExtractContext<'_>,
) -> Result<String, IngestError> {
    let article = ctx
        .readability
        .extract(RenderSource::Html(html), ctx.cancel)
        .await?;
    Ok(sanitize_html(&article.content))
}
