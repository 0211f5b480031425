//! Fetch layer: turn a locator into bytes or a list of child locators.
//!
//! ```text
//! Locator::Local  ──▶ local  (cloud materialise → list dir | read file)
//! Locator::Remote ──▶ remote (one GET, MIME-typed, never children)
//! ```
//!
//! The variant is picked from the locator's scheme. Every call honours a
//! [`CancellationToken`].

pub mod cloud;
pub mod local;
pub mod remote;

use crate::doctype::DocumentType;
use crate::error::IngestError;
use crate::locator::Locator;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

pub use cloud::{CloudProvider, CloudSubscription, CloudUpdate, DownloadStatus, LocalOnlyProvider};
pub use local::LocalFetcher;
pub use remote::RemoteFetcher;

/// Filesystem or HTTP metadata captured during a fetch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileMeta {
    pub size: Option<u64>,
    pub created: Option<DateTime<Utc>>,
    pub modified: Option<DateTime<Utc>>,
}

/// Result of fetching one locator.
#[derive(Debug, Clone)]
pub enum Fetched {
    /// A leaf: its bytes plus the signature derived while fetching
    /// (`None` when nothing could be determined).
    Content {
        data: Bytes,
        doc_type: Option<DocumentType>,
        meta: FileMeta,
    },
    /// A container: its immediate children, in enumeration order.
    Children {
        locators: Vec<Locator>,
        meta: FileMeta,
    },
}

/// Both fetch variants, selected per locator.
#[derive(Clone)]
pub struct FetchLayer {
    local: LocalFetcher,
    remote: RemoteFetcher,
}

impl FetchLayer {
    pub fn new(local: LocalFetcher, remote: RemoteFetcher) -> Self {
        Self { local, remote }
    }

    pub fn remote(&self) -> &RemoteFetcher {
        &self.remote
    }

    /// Fetch `locator`, reporting percent-complete through `progress`.
    pub async fn fetch(
        &self,
        locator: &Locator,
        progress: &mut (dyn FnMut(f64) + Send),
        cancel: &CancellationToken,
    ) -> Result<Fetched, IngestError> {
        let work = async {
            match locator {
                Locator::Local(path) => self.local.fetch(path, progress, cancel).await,
                Locator::Remote(url) => self.remote.fetch(url, progress).await,
            }
        };
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(IngestError::Cancelled),
            result = work => result,
        }
    }
}
