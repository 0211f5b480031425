//! PDF extractor over pdfium.
//!
//! ## Why spawn_blocking?
//!
//! pdfium is a C++ library with thread-local state, and walking every glyph
//! of a long document is CPU-bound. All pdfium calls happen inside one
//! `spawn_blocking` closure; only plain Rust values leave it.
//!
//! ## Runs from glyphs
//!
//! Plain-text export uses pdfium's flattened page text. The other formats
//! rebuild [`RichText`] runs from per-character font size and font name, so
//! large type becomes headings and bold/italic faces become emphasis.

use super::postprocess::tidy_plain_text;
use super::richtext::export_runs;
use super::richtext::model::{RichText, RunStyle};
use super::{blocking, ExtractContext, ParsedDocument};
use crate::config::ExportFormat;
use crate::error::IngestError;
use bytes::Bytes;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Library location override read when the config names none.
const LIB_PATH_ENV: &str = "PDFIUM_LIB_PATH";

/// What the blocking pass hands back.
#[derive(Debug, Default)]
struct PdfText {
    title: Option<String>,
    author: Option<String>,
    plain: String,
    runs: RichText,
}

pub(crate) async fn parse(
    data: Bytes,
    format: Option<ExportFormat>,
    ctx: &ExtractContext<'_>,
) -> Result<ParsedDocument, IngestError> {
    let format = format.unwrap_or(ExportFormat::Markdown);
    if matches!(format, ExportFormat::Xml | ExportFormat::Csv) {
        return Err(IngestError::unable_to_export(format));
    }

    let lib_path = ctx.pdfium_lib_path.map(Path::to_path_buf);
    let want_runs = format != ExportFormat::PlainText;
    let text = blocking(move || read_pdf(&data, lib_path, want_runs)).await?;

    let content = if want_runs {
        if text.runs.is_blank() {
            return Err(IngestError::EmptyDocument);
        }
        export_runs(&text.runs, Some(format), ctx).await?
    } else {
        if text.plain.trim().is_empty() {
            return Err(IngestError::EmptyDocument);
        }
        tidy_plain_text(&text.plain)
    };

    Ok(ParsedDocument {
        title: text.title,
        author: text.author,
        cover: None,
        content: vec![content],
        needs_chunking: true,
    })
}

/// Bind pdfium: explicit path, then `PDFIUM_LIB_PATH`, then the system library.
fn bind(lib_path: Option<PathBuf>) -> Result<Pdfium, IngestError> {
    let explicit = lib_path.or_else(|| std::env::var_os(LIB_PATH_ENV).map(PathBuf::from));
    let bindings = match explicit {
        Some(path) => {
            let file = if path.is_dir() {
                Pdfium::pdfium_platform_library_name_at_path(&path)
            } else {
                path
            };
            debug!("Binding pdfium from {}", file.display());
            Pdfium::bind_to_library(&file)
                .map_err(|e| IngestError::PdfiumBindingFailed(format!("{}: {e}", file.display())))?
        }
        None => Pdfium::bind_to_system_library()
            .map_err(|e| IngestError::PdfiumBindingFailed(format!("system library: {e}")))?,
    };
    Ok(Pdfium::new(bindings))
}

fn read_pdf(data: &[u8], lib_path: Option<PathBuf>, want_runs: bool) -> Result<PdfText, IngestError> {
    let pdfium = bind(lib_path)?;
    let document = pdfium.load_pdf_from_byte_slice(data, None).map_err(|e| {
        let detail = format!("{e:?}");
        if detail.contains("Password") {
            IngestError::parsing("PDF is password protected")
        } else {
            IngestError::corrupted(detail)
        }
    })?;

    let metadata = document.metadata();
    let get_meta = |tag: PdfDocumentMetadataTagType| -> Option<String> {
        metadata.get(tag).and_then(|t| {
            let v = t.value().trim().to_string();
            if v.is_empty() {
                None
            } else {
                Some(v)
            }
        })
    };
    let mut out = PdfText {
        title: get_meta(PdfDocumentMetadataTagType::Title),
        author: get_meta(PdfDocumentMetadataTagType::Author),
        ..PdfText::default()
    };

    let pages = document.pages();
    info!("PDF loaded: {} pages", pages.len());

    for (index, page) in pages.iter().enumerate() {
        let text = page
            .text()
            .map_err(|e| IngestError::parsing(format!("page {}: {e:?}", index + 1)))?;
        if !want_runs {
            if index > 0 {
                out.plain.push('\n');
            }
            out.plain.push_str(&text.all());
            continue;
        }

        if index > 0 {
            out.runs.ensure_blank_line();
        }
        for ch in text.chars().iter() {
            let Some(c) = ch.unicode_char() else {
                continue;
            };
            let style = style_for(ch.scaled_font_size().value, &ch.font_name());
            out.runs.push(c.to_string(), style);
        }
    }
    Ok(out)
}

/// Run attributes for a glyph: size rounded to half points, weight and slant
/// inferred from the face name.
fn style_for(size: f32, font_name: &str) -> RunStyle {
    let name = font_name.to_ascii_lowercase();
    let size = (size * 2.0).round() / 2.0;
    RunStyle {
        font_size: (size > 0.0).then_some(size),
        bold: ["bold", "black", "heavy", "semibold", "demi"]
            .iter()
            .any(|w| name.contains(w)),
        italic: name.contains("italic") || name.contains("oblique"),
        ..RunStyle::default()
    }
}
