//! Error types for the edgequake-ingest library.
//!
//! Every failure in the pipeline is an [`IngestError`]. The orchestrator never
//! returns one to its caller: fetch and parse failures are captured at the
//! node where they happened and stored as `NodeStatus::Failed(error)`, so one
//! corrupt file never aborts the traversal of its siblings or ancestors.
//!
//! Because errors live inside node state they are `Clone` and serialisable,
//! which is why underlying library errors are flattened to strings.
//!
//! Presentation layers that want to localise messages should match on
//! [`IngestError::kind`] instead of the `Display` text.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// All errors produced by the edgequake-ingest library.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum IngestError {
    // ── Document errors ───────────────────────────────────────────────────
    /// The type signature is outside the supported allow-list.
    #[error("Document type '{doc_type}' is not supported")]
    DocumentTypeNotSupported { doc_type: String },

    /// The bytes were read but could not be understood.
    #[error("Failed to parse document: {detail}")]
    ParsingError { detail: String },

    /// The document was parsed but holds no usable text.
    #[error("Document is empty")]
    EmptyDocument,

    /// Nothing exists at the locator.
    #[error("No content found at '{locator}'")]
    NoContent { locator: String },

    /// The process is not allowed to read the locator.
    #[error("Access denied to '{locator}'")]
    NoAccess { locator: String },

    /// A stored reference to the locator no longer resolves.
    #[error("Bookmark for '{locator}' is stale")]
    StaleBookmark { locator: String },

    /// The input is neither a usable path nor an http(s) URL.
    #[error("Invalid URL or path '{input}'")]
    InvalidUrl { input: String },

    /// The extractor has no conversion to the requested target format.
    #[error("Unable to export document to {format}")]
    UnableToExportToRequestedFormat { format: String },

    /// A container (zip, compound file, plist) could not be opened.
    #[error("File is corrupted: {detail}")]
    FileCorrupted { detail: String },

    // ── Transport errors ──────────────────────────────────────────────────
    /// The server answered with a non-2xx status.
    #[error("HTTP {status} fetching '{url}'")]
    HttpStatus { url: String, status: u16 },

    /// The request did not complete within the fetch timeout.
    #[error("Fetch timed out after {secs}s for '{url}'\nIncrease --fetch-timeout.")]
    Timeout { url: String, secs: u64 },

    /// Connection, TLS or body-read failure.
    #[error("Failed to fetch '{url}': {reason}")]
    Transport { url: String, reason: String },

    // ── Render engine errors ──────────────────────────────────────────────
    /// No render backend could be started.
    #[error(
        "Render engine unavailable: {0}\n\
Install Chrome/Chromium, pass --chrome <PATH>, or use --render-backend static."
    )]
    RenderEngineUnavailable(String),

    /// The page failed to load in the render engine.
    #[error("Page failed to load: {0}")]
    RenderLoadFailed(String),

    /// The extraction script threw or could not be evaluated.
    #[error("Extraction script failed: {0}")]
    ScriptEvaluation(String),

    /// The extraction script returned something other than an object.
    #[error("Extraction script returned an invalid response")]
    InvalidResponse,

    /// The script result could not be serialised to JSON.
    #[error("Failed to serialise extraction result: {0}")]
    JsonSerialization(String),

    /// The JSON could not be decoded into an article.
    #[error("Failed to decode extraction result: {0}")]
    JsonDecoding(String),

    /// Rendering did not finish within the render timeout.
    #[error("Rendering timed out after {secs}s\nIncrease --render-timeout.")]
    RenderTimeout { secs: u64 },

    // ── Runtime errors ────────────────────────────────────────────────────
    /// The operation was cancelled through its cancellation token.
    #[error("Operation cancelled")]
    Cancelled,

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium or pass --pdfium-lib."
    )]
    PdfiumBindingFailed(String),

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Stable, text-free classification of an [`IngestError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    DocumentTypeNotSupported,
    ParsingError,
    EmptyDocument,
    NoContent,
    NoAccess,
    StaleBookmark,
    InvalidUrl,
    UnableToExportToRequestedFormat,
    FileCorrupted,
    Transport,
    Render,
    Cancelled,
    Configuration,
    Internal,
}

impl IngestError {
    /// The stable kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::DocumentTypeNotSupported { .. } => ErrorKind::DocumentTypeNotSupported,
            Self::ParsingError { .. } => ErrorKind::ParsingError,
            Self::EmptyDocument => ErrorKind::EmptyDocument,
            Self::NoContent { .. } => ErrorKind::NoContent,
            Self::NoAccess { .. } => ErrorKind::NoAccess,
            Self::StaleBookmark { .. } => ErrorKind::StaleBookmark,
            Self::InvalidUrl { .. } => ErrorKind::InvalidUrl,
            Self::UnableToExportToRequestedFormat { .. } => {
                ErrorKind::UnableToExportToRequestedFormat
            }
            Self::FileCorrupted { .. } => ErrorKind::FileCorrupted,
            Self::HttpStatus { .. } | Self::Timeout { .. } | Self::Transport { .. } => {
                ErrorKind::Transport
            }
            Self::RenderEngineUnavailable(_)
            | Self::RenderLoadFailed(_)
            | Self::ScriptEvaluation(_)
            | Self::InvalidResponse
            | Self::JsonSerialization(_)
            | Self::JsonDecoding(_)
            | Self::RenderTimeout { .. } => ErrorKind::Render,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::PdfiumBindingFailed(_) | Self::InvalidConfig(_) => ErrorKind::Configuration,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// True for errors raised by the network layer.
    pub fn is_transport(&self) -> bool {
        self.kind() == ErrorKind::Transport
    }

    pub(crate) fn parsing(detail: impl std::fmt::Display) -> Self {
        Self::ParsingError {
            detail: detail.to_string(),
        }
    }

    pub(crate) fn corrupted(detail: impl std::fmt::Display) -> Self {
        Self::FileCorrupted {
            detail: detail.to_string(),
        }
    }

    pub(crate) fn unable_to_export(format: crate::config::ExportFormat) -> Self {
        Self::UnableToExportToRequestedFormat {
            format: format.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_status_display() {
        let e = IngestError::HttpStatus {
            url: "https://example.org/missing".into(),
            status: 404,
        };
        let msg = e.to_string();
        assert!(msg.contains("404"), "got: {msg}");
        assert!(msg.contains("example.org/missing"));
    }

    #[test]
    fn timeout_display() {
        let e = IngestError::Timeout {
            url: "https://slow.example".into(),
            secs: 30,
        };
        assert!(e.to_string().contains("30s"));
    }

    #[test]
    fn transport_errors_share_a_kind() {
        let errors = [
            IngestError::HttpStatus {
                url: "u".into(),
                status: 500,
            },
            IngestError::Timeout {
                url: "u".into(),
                secs: 1,
            },
            IngestError::Transport {
                url: "u".into(),
                reason: "dns".into(),
            },
        ];
        for e in errors {
            assert!(e.is_transport(), "{e:?}");
        }
        assert!(!IngestError::EmptyDocument.is_transport());
    }

    #[test]
    fn render_stages_are_distinct_errors() {
        let stages = [
            IngestError::RenderLoadFailed("net::ERR".into()),
            IngestError::InvalidResponse,
            IngestError::JsonSerialization("x".into()),
            IngestError::JsonDecoding("y".into()),
        ];
        for (i, a) in stages.iter().enumerate() {
            assert_eq!(a.kind(), ErrorKind::Render);
            for b in stages.iter().skip(i + 1) {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn unable_to_export_names_format() {
        let e = IngestError::unable_to_export(crate::config::ExportFormat::Csv);
        assert_eq!(e.kind(), ErrorKind::UnableToExportToRequestedFormat);
        assert!(e.to_string().contains("csv"));
    }
}
