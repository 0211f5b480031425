//! EPUB extractor.
//!
//! ```text
//! META-INF/container.xml ──rootfile──▶ package.opf
//!     metadata  dc:title, dc:creator, cover
//!     manifest  id → href
//!     spine     reading order of manifest ids
//! ```
//!
//! One output string per readable chapter, in spine order.

use super::postprocess::{tidy_markdown, tidy_plain_text};
use super::richtext::docx::{attr, read_entry};
use super::richtext::{from_html::from_html, markdown::to_markdown};
use super::{blocking, readable_html, ExtractContext, ParsedDocument};
use crate::config::ExportFormat;
use crate::error::IngestError;
use crate::readability::sanitize_html;
use bytes::Bytes;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::HashMap;
use std::io::{Cursor, Read};
use tracing::{debug, warn};
use zip::ZipArchive;

const CONTAINER: &str = "META-INF/container.xml";

#[derive(Debug, Clone, PartialEq)]
struct ManifestItem {
    href: String,
    properties: String,
}

/// Parsed package document.
#[derive(Debug, Default)]
struct Package {
    title: Option<String>,
    author: Option<String>,
    /// Manifest id named by `<meta name="cover">`.
    cover_id: Option<String>,
    manifest: HashMap<String, ManifestItem>,
    spine: Vec<String>,
}

/// Chapter markup plus book metadata.
#[derive(Debug, Default)]
struct Book {
    title: Option<String>,
    author: Option<String>,
    cover: Option<Bytes>,
    chapters: Vec<String>,
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

    let book = blocking(move || read_book(&data)).await?;
    if book.chapters.is_empty() {
        return Err(IngestError::EmptyDocument);
    }
    debug!("EPUB has {} readable chapter(s)", book.chapters.len());

    let mut content = Vec::with_capacity(book.chapters.len());
    for chapter in &book.chapters {
        let text = match format {
            ExportFormat::Markdown => {
                tidy_markdown(&to_markdown(&from_html(&sanitize_html(chapter))))
            }
            ExportFormat::Html => readable_html(sanitize_html(chapter), ctx).await?,
            ExportFormat::PlainText => tidy_plain_text(from_html(chapter).plain_text().trim()),
            ExportFormat::Xml | ExportFormat::Csv => {
                return Err(IngestError::unable_to_export(format))
            }
        };
        content.push(text);
    }

    Ok(ParsedDocument {
        title: book.title,
        author: book.author,
        cover: book.cover,
        content,
        needs_chunking: true,
    })
}

fn read_book(data: &[u8]) -> Result<Book, IngestError> {
    let mut archive = ZipArchive::new(Cursor::new(data)).map_err(IngestError::corrupted)?;

    let container = read_entry(&mut archive, CONTAINER)?
        .ok_or_else(|| IngestError::corrupted(format!("missing {CONTAINER}")))?;
    let opf_path = rootfile(&container)?;
    let opf = read_entry(&mut archive, &opf_path)?
        .ok_or_else(|| IngestError::corrupted(format!("missing package document {opf_path}")))?;
    let package = package(&opf)?;
    let base = opf_path.rsplit_once('/').map_or("", |(dir, _)| dir);

    let cover_href = package
        .manifest
        .values()
        .find(|item| item.properties.split_whitespace().any(|p| p == "cover-image"))
        .or_else(|| {
            package
                .cover_id
                .as_ref()
                .and_then(|id| package.manifest.get(id))
        })
        .map(|item| resolve(base, &item.href));
    let cover = match cover_href {
        Some(path) => read_binary(&mut archive, &path),
        None => None,
    };

    let mut chapters = Vec::with_capacity(package.spine.len());
    for idref in &package.spine {
        let Some(item) = package.manifest.get(idref) else {
            warn!("Spine entry {} is not in the manifest, skipping", idref);
            continue;
        };
        let path = resolve(base, &item.href);
        match read_entry(&mut archive, &path) {
            Ok(Some(markup)) => chapters.push(markup),
            Ok(None) => warn!("Chapter {} is missing, skipping", path),
            Err(e) => warn!("Chapter {} is unreadable ({}), skipping", path, e),
        }
    }

    Ok(Book {
        title: package.title,
        author: package.author,
        cover,
        chapters,
    })
}

fn read_binary<R: Read + std::io::Seek>(archive: &mut ZipArchive<R>, name: &str) -> Option<Bytes> {
    let mut entry = archive.by_name(name).ok()?;
    let mut buf = Vec::new();
    match entry.read_to_end(&mut buf) {
        Ok(_) => Some(Bytes::from(buf)),
        Err(e) => {
            warn!("Cover {} is unreadable: {}", name, e);
            None
        }
    }
}

/// Join an OPF-relative href onto the package directory, folding `..`.
fn resolve(base: &str, href: &str) -> String {
    let href = href.split('#').next().unwrap_or(href);
    let mut parts: Vec<&str> = base.split('/').filter(|p| !p.is_empty()).collect();
    for segment in href.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            s => parts.push(s),
        }
    }
    parts
        .join("/")
        .replace("%20", " ")
}

/// `full-path` of the first rootfile in `container.xml`.
fn rootfile(xml: &str) -> Result<String, IngestError> {
    let mut reader = Reader::from_str(xml);
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) if e.local_name().as_ref() == b"rootfile" => {
                if let Some(path) = attr(&e, b"full-path") {
                    return Ok(path);
                }
            }
            Ok(Event::Eof) => return Err(IngestError::parsing("container.xml has no rootfile")),
            Err(e) => return Err(IngestError::parsing(e)),
            _ => {}
        }
    }
}

fn package(xml: &str) -> Result<Package, IngestError> {
    let mut reader = Reader::from_str(xml);
    let mut package = Package::default();
    let mut current: Option<&'static str> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                current = match e.local_name().as_ref() {
                    b"title" if package.title.is_none() => Some("title"),
                    b"creator" if package.author.is_none() => Some("creator"),
                    _ => None,
                };
                package_element(&mut package, &e);
            }
            Ok(Event::Empty(e)) => package_element(&mut package, &e),
            Ok(Event::Text(t)) => {
                let value = t.unescape().map_err(IngestError::parsing)?.trim().to_string();
                if value.is_empty() {
                    continue;
                }
                match current {
                    Some("title") => package.title = Some(value),
                    Some("creator") => package.author = Some(value),
                    _ => {}
                }
            }
            Ok(Event::End(_)) => current = None,
            Ok(Event::Eof) => break,
            Err(e) => return Err(IngestError::parsing(e)),
            _ => {}
        }
    }
    Ok(package)
}

fn package_element(package: &mut Package, e: &quick_xml::events::BytesStart<'_>) {
    match e.local_name().as_ref() {
        b"item" => {
            if let (Some(id), Some(href)) = (attr(e, b"id"), attr(e, b"href")) {
                package.manifest.insert(
                    id,
                    ManifestItem {
                        href,
                        properties: attr(e, b"properties").unwrap_or_default(),
                    },
                );
            }
        }
        b"itemref" => {
            if let Some(idref) = attr(e, b"idref") {
                package.spine.push(idref);
            }
        }
        b"meta" if attr(e, b"name").as_deref() == Some("cover") => {
            package.cover_id = attr(e, b"content");
        }
        _ => {}
    }
}
