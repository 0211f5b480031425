//! # edgequake-ingest
//!
//! Recursively fetch files, folders and web pages and extract their text as
//! Markdown, HTML, XML, CSV or plain text.
//!
//! ## Why this crate?
//!
//! Ingestion for search and RAG pipelines has to cope with whatever a user
//! points at: a folder of mixed office files, an e-book, a spreadsheet, a
//! news article behind a wall of navigation. This crate turns any of those
//! into a tree of nodes, one per file or page, each carrying clean text in
//! the format you asked for, or the reason it could not be read.
//!
//! ## Pipeline Overview
//!
//! ```text
//! input (path | file:// | http(s)://)
//!  │
//!  ├─ 1. Locate   parse input, create the root node
//!  ├─ 2. Fetch    bytes for files/URLs, child nodes for folders
//!  ├─ 3. Dispatch pick an extractor from the document type
//!  ├─ 4. Extract  spreadsheet │ rich text │ PDF │ EPUB │ plain text │ HTML
//!  └─ 5. Tree     per-node status, metadata and exported content
//! ```
//!
//! Web pages go through a Readability engine: a headless Chrome instance
//! over the DevTools protocol, with a static HTML scorer as fallback.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_ingest::{ingest, ExportFormat, IngestConfig, NodeStatus};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = IngestConfig::builder()
//!         .default_format(ExportFormat::Markdown)
//!         .build()?;
//!     let tree = ingest("./reports", &config).await?;
//!     for id in tree.walk(tree.roots()[0]) {
//!         let node = tree.node(id);
//!         match node.status() {
//!             NodeStatus::Parsed => println!("{}: {} sections", node.filename(), node.exported_content().len()),
//!             other => eprintln!("{}: {:?}", node.filename(), other),
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `docingest` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-ingest = { version = "0.1", default-features = false }
//! ```
//!
//! ## Supported Types
//!
//! | Extractor | Types | Default format |
//! |-----------|-------|----------------|
//! | Spreadsheet | xlsx, xls, ods, csv | Markdown |
//! | Rich text | rtf, rtfd, doc, docx, webarchive | Markdown |
//! | PDF | pdf (needs a pdfium library) | Markdown |
//! | EPUB | epub | Markdown |
//! | Plain text | txt, md, source code, xml, json, eml, url bookmarks | passthrough |
//! | HTML | html, remote pages | Html |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod doctype;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod ingest;
pub mod locator;
pub mod progress;
pub mod readability;
pub mod tree;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ExportFormat, IngestConfig, IngestConfigBuilder, RenderBackendKind};
pub use doctype::DocumentType;
pub use error::{ErrorKind, IngestError};
pub use extract::ParsedDocument;
pub use fetch::{CloudProvider, LocalOnlyProvider};
pub use ingest::{ingest, ingest_sync, Ingestor};
pub use locator::Locator;
pub use progress::{IngestProgressCallback, NoopProgressCallback, ProgressCallback};
pub use readability::{Article, ReadabilityEngine, RenderBackend};
pub use tree::{DocumentNode, DocumentTree, NodeId, NodeReport, NodeStatus};
