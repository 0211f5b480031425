//! Type signatures: the normalised content-type tag of a node.
//!
//! Local nodes get theirs from the file extension, remote nodes from the
//! response MIME type. [`DocumentType::is_supported`] is the allow-list
//! consulted at node construction; the dispatch table in
//! [`crate::extract::Extractor::select`] must accept exactly the same set.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Normalised content-type tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    /// Directory or other container of child locators.
    Folder,
    Pdf,
    Rtf,
    /// RTF package directory (`TXT.rtf` plus attachments).
    Rtfd,
    /// Legacy binary word-processing document (`.doc`).
    Doc,
    /// Word-processing XML (`.docx`).
    Docx,
    /// Safari web archive (binary plist).
    WebArchive,
    Html,
    Epub,
    /// Workbook formats read through calamine.
    Spreadsheet,
    Csv,
    PlainText,
    /// Source code; carries the language name.
    SourceCode(String),
    Xml,
    Json,
    /// `.url` / `.webloc` internet-location files.
    UrlBookmark,
    /// RFC 822 message (`.eml`).
    Email,
    /// Recognised but outside the allow-list. Carries the extension or MIME type.
    Other(String),
}

const SOURCE_EXTENSIONS: &[(&str, &str)] = &[
    ("swift", "swift"),
    ("rs", "rust"),
    ("py", "python"),
    ("js", "javascript"),
    ("mjs", "javascript"),
    ("ts", "typescript"),
    ("c", "c"),
    ("h", "c"),
    ("cpp", "c++"),
    ("cc", "c++"),
    ("hpp", "c++"),
    ("m", "objective-c"),
    ("java", "java"),
    ("go", "go"),
    ("rb", "ruby"),
    ("sh", "shell"),
    ("css", "css"),
    ("php", "php"),
];

impl DocumentType {
    /// Map a file extension (without dot, any case) to a type signature.
    pub fn from_extension(ext: &str) -> DocumentType {
        let ext = ext.trim_start_matches('.').to_ascii_lowercase();
        match ext.as_str() {
            "pdf" => DocumentType::Pdf,
            "rtf" => DocumentType::Rtf,
            "rtfd" => DocumentType::Rtfd,
            "doc" => DocumentType::Doc,
            "docx" => DocumentType::Docx,
            "webarchive" => DocumentType::WebArchive,
            "html" | "htm" | "xhtml" => DocumentType::Html,
            "epub" => DocumentType::Epub,
            "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => DocumentType::Spreadsheet,
            "csv" => DocumentType::Csv,
            "txt" | "text" | "md" | "markdown" | "log" => DocumentType::PlainText,
            "xml" => DocumentType::Xml,
            "json" => DocumentType::Json,
            "url" | "webloc" => DocumentType::UrlBookmark,
            "eml" => DocumentType::Email,
            other => SOURCE_EXTENSIONS
                .iter()
                .find(|(e, _)| *e == other)
                .map(|(_, lang)| DocumentType::SourceCode((*lang).to_string()))
                .unwrap_or_else(|| DocumentType::Other(other.to_string())),
        }
    }

    /// Map a `Content-Type` header value to a type signature.
    ///
    /// Returns `None` for types that carry no information
    /// (`application/octet-stream`, empty).
    pub fn from_mime(mime: &str) -> Option<DocumentType> {
        let essence = mime
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
            .to_ascii_lowercase();
        let doc_type = match essence.as_str() {
            "" | "application/octet-stream" | "binary/octet-stream" => return None,
            "text/html" | "application/xhtml+xml" => DocumentType::Html,
            "application/pdf" | "application/x-pdf" => DocumentType::Pdf,
            "application/rtf" | "text/rtf" => DocumentType::Rtf,
            "application/msword" => DocumentType::Doc,
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => {
                DocumentType::Docx
            }
            "application/x-webarchive" => DocumentType::WebArchive,
            "application/epub+zip" => DocumentType::Epub,
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            | "application/vnd.ms-excel"
            | "application/vnd.ms-excel.sheet.macroenabled.12"
            | "application/vnd.oasis.opendocument.spreadsheet" => DocumentType::Spreadsheet,
            "text/csv" => DocumentType::Csv,
            "text/plain" | "text/markdown" => DocumentType::PlainText,
            "application/json" => DocumentType::Json,
            "application/xml" | "text/xml" => DocumentType::Xml,
            "message/rfc822" => DocumentType::Email,
            "text/javascript" | "application/javascript" => {
                DocumentType::SourceCode("javascript".into())
            }
            "text/css" => DocumentType::SourceCode("css".into()),
            other => DocumentType::Other(other.to_string()),
        };
        Some(doc_type)
    }

    /// Guess a type from leading bytes, for local files without an extension.
    pub fn sniff(bytes: &[u8]) -> Option<DocumentType> {
        if bytes.starts_with(b"%PDF-") {
            Some(DocumentType::Pdf)
        } else if bytes.starts_with(b"{\\rtf") {
            Some(DocumentType::Rtf)
        } else if bytes.starts_with(b"bplist00") {
            Some(DocumentType::WebArchive)
        } else if std::str::from_utf8(bytes).is_ok() && !bytes.contains(&0) {
            let head = String::from_utf8_lossy(&bytes[..bytes.len().min(512)]).to_ascii_lowercase();
            if head.trim_start().starts_with("<!doctype html") || head.contains("<html") {
                Some(DocumentType::Html)
            } else {
                Some(DocumentType::PlainText)
            }
        } else {
            None
        }
    }

    /// Whether this signature is on the allow-list.
    pub fn is_supported(&self) -> bool {
        !matches!(self, DocumentType::Other(_))
    }

    /// Whether nodes of this type expand into children instead of holding bytes.
    pub fn is_container(&self) -> bool {
        matches!(self, DocumentType::Folder)
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentType::Folder => f.write_str("folder"),
            DocumentType::Pdf => f.write_str("pdf"),
            DocumentType::Rtf => f.write_str("rtf"),
            DocumentType::Rtfd => f.write_str("rtfd"),
            DocumentType::Doc => f.write_str("doc"),
            DocumentType::Docx => f.write_str("docx"),
            DocumentType::WebArchive => f.write_str("webarchive"),
            DocumentType::Html => f.write_str("html"),
            DocumentType::Epub => f.write_str("epub"),
            DocumentType::Spreadsheet => f.write_str("spreadsheet"),
            DocumentType::Csv => f.write_str("csv"),
            DocumentType::PlainText => f.write_str("plaintext"),
            DocumentType::SourceCode(lang) => write!(f, "source-code({lang})"),
            DocumentType::Xml => f.write_str("xml"),
            DocumentType::Json => f.write_str("json"),
            DocumentType::UrlBookmark => f.write_str("url-bookmark"),
            DocumentType::Email => f.write_str("email"),
            DocumentType::Other(tag) => f.write_str(tag),
        }
    }
}
