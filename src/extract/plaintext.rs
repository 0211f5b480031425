//! Plain-text extractor: UTF-8 passthrough for text, source, XML, JSON,
//! bookmark and mail files. The requested format is ignored.
//!
//! Binary property lists are the one exception: a `.webloc` saved by macOS
//! is a `bplist00` dictionary, and its text is the `URL` entry.

use super::ParsedDocument;
use crate::error::IngestError;
use std::io::Cursor;

const BINARY_PLIST_MAGIC: &[u8] = b"bplist00";

pub(crate) fn parse(data: &[u8]) -> Result<ParsedDocument, IngestError> {
    let text = if data.starts_with(BINARY_PLIST_MAGIC) {
        plist_location(data)?
    } else {
        std::str::from_utf8(data)
            .map_err(|e| IngestError::parsing(format!("not valid UTF-8: {e}")))?
            .to_string()
    };
    Ok(ParsedDocument {
        content: vec![text],
        needs_chunking: true,
        ..ParsedDocument::default()
    })
}

/// The `URL` entry of an internet-location property list.
fn plist_location(data: &[u8]) -> Result<String, IngestError> {
    let root = plist::Value::from_reader(Cursor::new(data)).map_err(IngestError::corrupted)?;
    root.as_dictionary()
        .and_then(|d| d.get("URL"))
        .and_then(plist::Value::as_string)
        .map(str::to_string)
        .ok_or_else(|| IngestError::parsing("property list has no URL entry"))
}
