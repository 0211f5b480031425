//! DOCX reader on top of `docx-rs`.
//!
//! [`docx_rs::read_docx`] yields the body tree. Paragraph heading styles and
//! run properties (bold, italic, half-point size) map onto [`RunStyle`],
//! external hyperlinks resolve through the document relationships and
//! tables become cells. Title and author come from `docProps/core.xml`.

use super::model::{RichText, RunStyle, TableCell};
use super::RichDocument;
use crate::error::IngestError;
use docx_rs::{
    DocumentChild, Hyperlink, HyperlinkData, Paragraph, ParagraphChild, Run, RunChild, Table,
    TableCellContent, TableChild, TableRowChild,
};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::io::{Cursor, Read};
use zip::ZipArchive;

const CORE_PROPERTIES: &str = "docProps/core.xml";

/// Parse DOCX bytes into runs plus core metadata.
pub fn parse(data: &[u8]) -> Result<RichDocument, IngestError> {
    let docx = docx_rs::read_docx(data).map_err(IngestError::corrupted)?;

    let mut archive = ZipArchive::new(Cursor::new(data)).map_err(IngestError::corrupted)?;
    let (title, author) = match read_entry(&mut archive, CORE_PROPERTIES)? {
        Some(xml) => core_properties(&xml)?,
        None => (None, None),
    };

    let links: HashMap<&str, &str> = docx
        .document_rels
        .hyperlinks
        .iter()
        .map(|(id, target, _)| (id.as_str(), target.as_str()))
        .collect();
    let mut body = BodyReader::new(&links);
    for child in &docx.document.children {
        match child {
            DocumentChild::Paragraph(p) => body.paragraph(p),
            DocumentChild::Table(t) => body.table(t),
            _ => {}
        }
    }

    Ok(RichDocument {
        text: body.out,
        title,
        author,
    })
}

pub(crate) fn read_entry<R: Read + std::io::Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
) -> Result<Option<String>, IngestError> {
    let mut entry = match archive.by_name(name) {
        Ok(entry) => entry,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(IngestError::corrupted(e)),
    };
    let mut text = String::new();
    entry
        .read_to_string(&mut text)
        .map_err(|e| IngestError::parsing(format!("{name}: {e}")))?;
    Ok(Some(text))
}

pub(crate) fn attr(e: &BytesStart<'_>, local: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.local_name().as_ref() == local)
        .and_then(|a| a.unescape_value().ok())
        .map(|v| v.into_owned())
}

/// `dc:title` and `dc:creator` from the core properties part.
fn core_properties(xml: &str) -> Result<(Option<String>, Option<String>), IngestError> {
    let mut reader = Reader::from_str(xml);
    let mut current: Option<&'static str> = None;
    let (mut title, mut author) = (None, None);
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                current = match e.local_name().as_ref() {
                    b"title" => Some("title"),
                    b"creator" => Some("creator"),
                    _ => None,
                };
            }
            Ok(Event::Text(t)) => {
                let value = t.unescape().map_err(IngestError::parsing)?.trim().to_string();
                if value.is_empty() {
                    continue;
                }
                match current {
                    Some("title") => title = Some(value),
                    Some("creator") => author = Some(value),
                    _ => {}
                }
            }
            Ok(Event::End(_)) => current = None,
            Ok(Event::Eof) => break,
            Err(e) => return Err(IngestError::parsing(e)),
            _ => {}
        }
    }
    Ok((title, author))
}

/// Point size for built-in heading paragraph styles.
fn heading_size(style: &str) -> Option<f32> {
    match style.to_ascii_lowercase().replace(' ', "").as_str() {
        "title" | "heading1" => Some(24.0),
        "heading2" | "subtitle" => Some(18.0),
        "heading3" => Some(15.0),
        _ => None,
    }
}

/// docx-rs keeps property values private and exposes them through
/// `Serialize`; read them back as JSON. Values are either bare scalars or
/// `{"val": ..}` objects depending on the element.
fn properties(props: &impl Serialize) -> Value {
    serde_json::to_value(props).unwrap_or(Value::Null)
}

fn property<'v>(props: &'v Value, key: &str) -> Option<&'v Value> {
    let value = props.get(key)?;
    Some(value.get("val").unwrap_or(value))
}

#[allow(irrefutable_let_patterns)]
fn rows(table: &Table) -> impl Iterator<Item = &docx_rs::TableRow> {
    table.rows.iter().filter_map(|child| {
        if let TableChild::TableRow(row) = child {
            Some(row)
        } else {
            None
        }
    })
}

#[allow(irrefutable_let_patterns)]
fn cells(row: &docx_rs::TableRow) -> Vec<&docx_rs::TableCell> {
    row.cells
        .iter()
        .filter_map(|child| {
            if let TableRowChild::TableCell(cell) = child {
                Some(cell)
            } else {
                None
            }
        })
        .collect()
}

struct BodyReader<'a> {
    links: &'a HashMap<&'a str, &'a str>,
    out: RichText,
    cell: Option<TableCell>,
    tables_seen: usize,
}

impl<'a> BodyReader<'a> {
    fn new(links: &'a HashMap<&'a str, &'a str>) -> Self {
        Self {
            links,
            out: RichText::new(),
            cell: None,
            tables_seen: 0,
        }
    }

    fn paragraph(&mut self, paragraph: &Paragraph) {
        let props = properties(&paragraph.property);
        let heading = property(&props, "style")
            .and_then(Value::as_str)
            .and_then(heading_size);

        for child in &paragraph.children {
            match child {
                ParagraphChild::Run(run) => self.run(run, heading, None),
                ParagraphChild::Hyperlink(link) => self.hyperlink(link, heading),
                _ => {}
            }
        }

        match self.cell {
            Some(cell) => self.out.push(
                " ",
                RunStyle {
                    cell: Some(cell),
                    ..RunStyle::default()
                },
            ),
            None => self.out.push("\n", RunStyle::default()),
        }
    }

    fn hyperlink(&mut self, link: &Hyperlink, heading: Option<f32>) {
        let links = self.links;
        let target = match &link.link {
            HyperlinkData::External { path, .. } if !path.is_empty() => Some(path.as_str()),
            HyperlinkData::External { rid, .. } => links.get(rid.as_str()).copied(),
            HyperlinkData::Anchor { .. } => None,
        };
        for child in &link.children {
            if let ParagraphChild::Run(run) = child {
                self.run(run, heading, target);
            }
        }
    }

    fn run(&mut self, run: &Run, heading: Option<f32>, link: Option<&str>) {
        let props = properties(&run.run_property);
        let style = RunStyle {
            font_size: heading.or_else(|| {
                property(&props, "sz")
                    .and_then(Value::as_f64)
                    .map(|half_points| half_points as f32 / 2.0)
            }),
            bold: property(&props, "bold")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            italic: property(&props, "italic")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            link: link.map(str::to_string),
            cell: self.cell,
        };
        for child in &run.children {
            match child {
                RunChild::Text(t) => self.out.push(t.text.as_str(), style.clone()),
                RunChild::Tab(_) => self.out.push("\t", style.clone()),
                RunChild::Break(_) => self.out.push("\n", style.clone()),
                _ => {}
            }
        }
    }

    fn table(&mut self, table: &Table) {
        // Markdown tables do not nest: inner cells flow into the outer cell.
        let nested = self.cell.is_some();
        let index = self.tables_seen;
        if !nested {
            self.tables_seen += 1;
        }

        for (row_index, row) in rows(table).enumerate() {
            let row_cells = cells(row);
            let columns = table.grid.len().max(row_cells.len()).max(1);
            for (column, cell) in row_cells.into_iter().enumerate() {
                if !nested {
                    let here = TableCell {
                        table: index,
                        row: row_index,
                        column,
                        columns,
                    };
                    self.cell = Some(here);
                    self.out.push(
                        "",
                        RunStyle {
                            cell: Some(here),
                            ..RunStyle::default()
                        },
                    );
                }
                for content in &cell.children {
                    match content {
                        TableCellContent::Paragraph(p) => self.paragraph(p),
                        TableCellContent::Table(t) => self.table(t),
                        _ => {}
                    }
                }
            }
        }

        if !nested {
            self.cell = None;
            self.out.push("\n", RunStyle::default());
        }
    }
}
