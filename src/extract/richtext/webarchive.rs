//! Safari web archive reader.
//!
//! A `.webarchive` is a property list whose `WebMainResource` dictionary holds
//! the page bytes (`WebResourceData`) and their text encoding. Subresources
//! (images, scripts) are ignored.

use super::from_html::{document_title, from_html};
use super::rtf::cp1252;
use super::RichDocument;
use crate::error::IngestError;
use plist::Value;
use std::io::Cursor;

/// Decoded HTML of the archive's main resource.
pub fn main_resource_html(data: &[u8]) -> Result<String, IngestError> {
    let root = Value::from_reader(Cursor::new(data)).map_err(IngestError::corrupted)?;
    let main = root
        .as_dictionary()
        .and_then(|d| d.get("WebMainResource"))
        .and_then(Value::as_dictionary)
        .ok_or_else(|| IngestError::parsing("web archive has no WebMainResource"))?;
    let bytes = main
        .get("WebResourceData")
        .and_then(Value::as_data)
        .ok_or_else(|| IngestError::parsing("web archive main resource has no data"))?;
    let encoding = main
        .get("WebResourceTextEncodingName")
        .and_then(Value::as_string)
        .unwrap_or("utf-8")
        .to_ascii_lowercase();

    Ok(match encoding.as_str() {
        "iso-8859-1" | "latin1" | "windows-1252" | "cp1252" => {
            bytes.iter().map(|b| cp1252(*b)).collect()
        }
        _ => String::from_utf8_lossy(bytes).into_owned(),
    })
}

pub fn parse(data: &[u8]) -> Result<RichDocument, IngestError> {
    let html = main_resource_html(data)?;
    Ok(RichDocument {
        title: document_title(&html),
        text: from_html(&html),
        author: None,
    })
}
