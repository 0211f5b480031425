//! Spreadsheet extractor: workbooks through calamine, `.csv` through the csv crate.
//!
//! One output string per worksheet, in workbook order. The document title is
//! the sheet names joined by a space.

use super::richtext::to_html::escape;
use super::ParsedDocument;
use crate::config::ExportFormat;
use crate::error::IngestError;
use calamine::{Data, Reader};
use std::io::Cursor;
use tracing::debug;

/// Sheet name given to the single table of a CSV file.
const CSV_SHEET: &str = "Sheet1";

/// One cell value; `None` for empty cells.
#[derive(Debug, Clone, PartialEq)]
struct Cell {
    text: String,
    /// Text cell (shared string) rather than a scalar.
    is_string: bool,
}

#[derive(Debug, Clone, PartialEq)]
struct Sheet {
    name: String,
    /// Zero-based (row, column) of the first cell.
    origin: (u32, u32),
    rows: Vec<Vec<Option<Cell>>>,
}

pub(crate) fn parse(
    data: &[u8],
    csv: bool,
    format: ExportFormat,
) -> Result<ParsedDocument, IngestError> {
    let sheets = if csv {
        vec![read_csv(data)?]
    } else {
        read_workbook(data)?
    };
    if sheets.iter().all(|s| s.rows.is_empty()) {
        return Err(IngestError::EmptyDocument);
    }
    debug!("Read {} worksheet(s)", sheets.len());

    let content = sheets
        .iter()
        .map(|sheet| match format {
            ExportFormat::Markdown => Ok(to_markdown(sheet)),
            ExportFormat::Html => Ok(to_html(sheet)),
            ExportFormat::Xml => Ok(to_xml(sheet)),
            ExportFormat::Csv => to_csv(sheet),
            ExportFormat::PlainText => Ok(to_plain_text(sheet)),
        })
        .collect::<Result<Vec<_>, _>>()?;

    let title = sheets
        .iter()
        .map(|s| s.name.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    Ok(ParsedDocument {
        title: (!title.is_empty()).then_some(title),
        content,
        ..ParsedDocument::default()
    })
}

fn cell_from_data(value: &Data) -> Option<Cell> {
    let (text, is_string) = match value {
        Data::Empty => return None,
        Data::String(s) => (s.clone(), true),
        Data::DateTimeIso(s) | Data::DurationIso(s) => (s.clone(), true),
        Data::Int(i) => (i.to_string(), false),
        Data::Float(f) => (f.to_string(), false),
        Data::Bool(b) => (b.to_string(), false),
        Data::DateTime(dt) => (dt.to_string(), false),
        Data::Error(e) => (e.to_string(), false),
    };
    Some(Cell { text, is_string })
}

fn read_workbook(data: &[u8]) -> Result<Vec<Sheet>, IngestError> {
    let mut workbook =
        calamine::open_workbook_auto_from_rs(Cursor::new(data)).map_err(IngestError::corrupted)?;

    let mut sheets = Vec::new();
    for name in workbook.sheet_names().to_vec() {
        let range = workbook
            .worksheet_range(&name)
            .map_err(|e| IngestError::parsing(format!("worksheet {name}: {e}")))?;
        let rows = range
            .rows()
            .map(|row| row.iter().map(cell_from_data).collect())
            .collect();
        sheets.push(Sheet {
            name,
            origin: range.start().unwrap_or((0, 0)),
            rows,
        });
    }
    Ok(sheets)
}

fn read_csv(data: &[u8]) -> Result<Sheet, IngestError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(data);
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(IngestError::parsing)?;
        rows.push(
            record
                .iter()
                .map(|field| {
                    (!field.is_empty()).then(|| Cell {
                        text: field.to_string(),
                        is_string: field.parse::<f64>().is_err(),
                    })
                })
                .collect(),
        );
    }
    Ok(Sheet {
        name: CSV_SHEET.to_string(),
        origin: (0, 0),
        rows,
    })
}

fn to_markdown(sheet: &Sheet) -> String {
    let mut out = String::new();
    for (index, row) in sheet.rows.iter().enumerate() {
        out.push('|');
        for cell in row {
            match cell {
                Some(cell) => {
                    out.push(' ');
                    out.push_str(&cell.text.replace('|', "\\|").replace('\n', " "));
                }
                None => out.push(' '),
            }
            out.push_str(" |");
        }
        out.push('\n');
        if index == 0 {
            out.push_str(&"|---".repeat(row.len()));
            out.push_str("|\n");
        }
    }
    out
}

fn to_html(sheet: &Sheet) -> String {
    let name = escape(&sheet.name);
    let mut out = format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<title>{name}</title>\n<style>\n\
         table {{ border-collapse: collapse; width: 100%; }}\n\
         th, td {{ border: 1px solid #ddd; padding: 8px; text-align: left; }}\n\
         tr:nth-child(even) {{ background-color: #f2f2f2; }}\n\
         </style>\n</head>\n<body>\n<h2>{name}</h2>\n<table>\n"
    );
    for (index, row) in sheet.rows.iter().enumerate() {
        let tag = if index == 0 { "th" } else { "td" };
        out.push_str(if index == 0 { "<thead>\n<tr>\n" } else { "<tr>\n" });
        for cell in row {
            let value = cell.as_ref().map_or(" ".to_string(), |c| escape(&c.text));
            out.push_str(&format!("<{tag}>{value}</{tag}>\n"));
        }
        out.push_str(if index == 0 {
            "</tr>\n</thead>\n<tbody>\n"
        } else {
            "</tr>\n"
        });
    }
    out.push_str("</tbody>\n</table>\n</body>\n</html>");
    out
}

/// Spreadsheet column name for a zero-based index: A…Z, AA…
fn column_name(mut index: u32) -> String {
    let mut name = Vec::new();
    loop {
        name.push(b'A' + (index % 26) as u8);
        if index < 26 {
            break;
        }
        index = index / 26 - 1;
    }
    name.reverse();
    String::from_utf8_lossy(&name).into_owned()
}

fn to_xml(sheet: &Sheet) -> String {
    let mut out = String::from(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <worksheet xmlns:r=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships\" \
         xmlns=\"http://schemas.openxmlformats.org/spreadsheetml/2006/main\">\n<sheetData>\n",
    );
    let (first_row, first_col) = sheet.origin;
    for (r, row) in sheet.rows.iter().enumerate() {
        let row_number = first_row + r as u32 + 1;
        out.push_str(&format!("<row r=\"{row_number}\">\n"));
        for (c, cell) in row.iter().enumerate() {
            let reference = format!("{}{row_number}", column_name(first_col + c as u32));
            let (kind, value) = match cell {
                Some(cell) if cell.is_string => ("s", escape(&cell.text)),
                Some(cell) => ("n", escape(&cell.text)),
                None => ("n", String::new()),
            };
            out.push_str(&format!(
                "<c r=\"{reference}\" t=\"{kind}\"><v>{value}</v></c>\n"
            ));
        }
        out.push_str("</row>\n");
    }
    out.push_str("</sheetData>\n</worksheet>");
    out
}

fn to_csv(sheet: &Sheet) -> Result<String, IngestError> {
    let mut writer = csv::WriterBuilder::new()
        .flexible(true)
        .from_writer(Vec::new());
    for row in &sheet.rows {
        writer
            .write_record(row.iter().map(|c| c.as_ref().map_or("", |c| c.text.as_str())))
            .map_err(|e| IngestError::Internal(format!("csv writer: {e}")))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| IngestError::Internal(format!("csv writer: {e}")))?;
    String::from_utf8(bytes).map_err(|e| IngestError::Internal(format!("csv writer: {e}")))
}

fn to_plain_text(sheet: &Sheet) -> String {
    let mut out = format!("{}:\n", sheet.name);
    for row in &sheet.rows {
        let line = row
            .iter()
            .map(|c| c.as_ref().map_or("", |c| c.text.as_str()))
            .collect::<Vec<_>>()
            .join(", ");
        out.push_str(&line);
        out.push('\n');
    }
    out
}
