//! Progress-callback trait for per-node ingestion events.
//!
//! Inject an [`Arc<dyn IngestProgressCallback>`] via
//! [`crate::config::IngestConfigBuilder::progress_callback`] to observe nodes
//! as the orchestrator fetches and parses them.
//!
//! The tree itself is mutated only by the orchestrator; a presentation layer
//! that wants live updates mirrors these events instead of polling nodes.
//!
//! # Example
//!
//! ```rust
//! use edgequake_ingest::{IngestConfig, IngestProgressCallback, NodeId};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     parsed: AtomicUsize,
//! }
//!
//! impl IngestProgressCallback for CountingCallback {
//!     fn on_node_parsed(&self, _node: NodeId, locator: &str, sections: usize) {
//!         self.parsed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{locator}: {sections} sections");
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { parsed: AtomicUsize::new(0) });
//!
//! let config = IngestConfig::builder()
//!     .progress_callback(counter as Arc<dyn IngestProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::error::IngestError;
use crate::tree::NodeId;
use std::sync::Arc;

/// Called by the orchestrator as it walks the document tree.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Events for one tree arrive in traversal order.
pub trait IngestProgressCallback: Send + Sync {
    /// A node is about to be fetched.
    fn on_fetch_start(&self, node: NodeId, locator: &str) {
        let _ = (node, locator);
    }

    /// Download progress for a node, 0–100. Values never decrease for one fetch.
    fn on_fetch_progress(&self, node: NodeId, locator: &str, percent: f64) {
        let _ = (node, locator, percent);
    }

    /// A node reached `Downloaded`.
    ///
    /// # Arguments
    /// * `children`: number of child nodes discovered (0 for leaves)
    fn on_node_downloaded(&self, node: NodeId, locator: &str, children: usize) {
        let _ = (node, locator, children);
    }

    /// A node reached `Parsed`.
    ///
    /// # Arguments
    /// * `sections`: number of exported content strings
    fn on_node_parsed(&self, node: NodeId, locator: &str, sections: usize) {
        let _ = (node, locator, sections);
    }

    /// A node reached `Failed`.
    fn on_node_failed(&self, node: NodeId, locator: &str, error: &IngestError) {
        let _ = (node, locator, error);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl IngestProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::IngestConfig`].
pub type ProgressCallback = Arc<dyn IngestProgressCallback>;
