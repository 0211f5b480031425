//! Rich-text extractor: RTF, RTFD, DOC, DOCX and web archives.
//!
//! ```text
//! bytes ──front-end──▶ RichText runs ──┬─ to_markdown ─▶ tidy
//!                                      ├─ to_html ─▶ readability ─▶ sanitise
//!                                      └─ plain_text
//! ```
//!
//! Every front-end produces the same run model, so the writers are shared with
//! the PDF, EPUB and HTML extractors.

pub mod doc;
pub mod docx;
pub mod from_html;
pub mod markdown;
pub mod model;
pub mod rtf;
pub mod to_html;
pub mod webarchive;

use super::postprocess::{tidy_markdown, tidy_plain_text};
use super::{blocking, readable_html, ExtractContext, ParsedDocument};
use crate::config::ExportFormat;
use crate::error::IngestError;
use bytes::Bytes;
use model::RichText;

/// Output of a front-end: runs plus whatever metadata the format carries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RichDocument {
    pub text: RichText,
    pub title: Option<String>,
    pub author: Option<String>,
}

/// Which front-end reads the bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RichTextKind {
    Rtf,
    /// The package's `TXT.rtf`, already read by the fetch layer.
    Rtfd,
    Doc,
    Docx,
    WebArchive,
}

impl RichTextKind {
    fn read(self, data: &[u8]) -> Result<RichDocument, IngestError> {
        match self {
            RichTextKind::Rtf | RichTextKind::Rtfd => rtf::parse(data),
            RichTextKind::Doc => doc::parse(data),
            RichTextKind::Docx => docx::parse(data),
            RichTextKind::WebArchive => webarchive::parse(data),
        }
    }
}

/// Export runs in `format` (Markdown when `None`).
pub(crate) async fn export_runs(
    text: &RichText,
    format: Option<ExportFormat>,
    ctx: &ExtractContext<'_>,
) -> Result<String, IngestError> {
    match format.unwrap_or(ExportFormat::Markdown) {
        ExportFormat::Markdown => Ok(tidy_markdown(&markdown::to_markdown(text))),
        ExportFormat::PlainText => Ok(tidy_plain_text(&text.plain_text())),
        ExportFormat::Html => readable_html(to_html::to_html(text), ctx).await,
        other => Err(IngestError::unable_to_export(other)),
    }
}

pub(crate) async fn parse(
    data: Bytes,
    kind: RichTextKind,
    format: Option<ExportFormat>,
    ctx: &ExtractContext<'_>,
) -> Result<ParsedDocument, IngestError> {
    if let Some(f @ (ExportFormat::Xml | ExportFormat::Csv)) = format {
        return Err(IngestError::unable_to_export(f));
    }
    let document = blocking(move || kind.read(&data)).await?;
    if document.text.is_blank() {
        return Err(IngestError::EmptyDocument);
    }
    let content = export_runs(&document.text, format, ctx).await?;
    Ok(ParsedDocument {
        title: document.title,
        author: document.author,
        cover: None,
        content: vec![content],
        needs_chunking: false,
    })
}
