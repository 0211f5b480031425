//! Cloud placeholder materialisation.
//!
//! Sync clients (iCloud Drive, OneDrive, Dropbox "online-only") leave
//! placeholder entries on disk whose bytes are downloaded on demand. Before the
//! local fetcher can read such a file it triggers the download and waits for
//! the provider to report the item as current.
//!
//! Monitoring is scoped to a single fetch: [`CloudProvider::subscribe`] returns
//! a [`CloudSubscription`] that receives updates for one path only and runs
//! its teardown when dropped, whether materialisation succeeded, failed or was
//! cancelled.

use crate::error::IngestError;
use std::path::Path;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Download state reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadStatus {
    NotDownloaded,
    Downloading,
    /// Local bytes are up to date.
    Current,
}

/// One push update from the provider. Either field may be absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CloudUpdate {
    pub percent: Option<f64>,
    pub status: Option<DownloadStatus>,
}

/// Per-call stream of updates for one placeholder.
pub struct CloudSubscription {
    updates: mpsc::UnboundedReceiver<CloudUpdate>,
    teardown: Option<Box<dyn FnOnce() + Send>>,
}

impl CloudSubscription {
    pub fn new(updates: mpsc::UnboundedReceiver<CloudUpdate>) -> Self {
        Self {
            updates,
            teardown: None,
        }
    }

    /// Run `f` when the subscription is dropped (unregister observers, etc).
    pub fn with_teardown(mut self, f: impl FnOnce() + Send + 'static) -> Self {
        self.teardown = Some(Box::new(f));
        self
    }

    /// Next update, or `None` once the provider closed the channel.
    pub async fn next(&mut self) -> Option<CloudUpdate> {
        self.updates.recv().await
    }
}

impl Drop for CloudSubscription {
    fn drop(&mut self) {
        if let Some(f) = self.teardown.take() {
            f();
        }
    }
}

/// Access to an on-demand sync provider.
pub trait CloudProvider: Send + Sync {
    /// True when `path` is a placeholder whose bytes are not local yet.
    fn is_placeholder(&self, path: &Path) -> Result<bool, IngestError>;

    /// Ask the provider to start downloading `path` in the background.
    fn start_download(&self, path: &Path) -> Result<(), IngestError>;

    /// Open an update stream scoped to `path`.
    fn subscribe(&self, path: &Path) -> Result<CloudSubscription, IngestError>;
}

/// Provider for plain local filesystems: nothing is ever a placeholder.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalOnlyProvider;

impl CloudProvider for LocalOnlyProvider {
    fn is_placeholder(&self, _path: &Path) -> Result<bool, IngestError> {
        Ok(false)
    }

    fn start_download(&self, _path: &Path) -> Result<(), IngestError> {
        Ok(())
    }

    fn subscribe(&self, _path: &Path) -> Result<CloudSubscription, IngestError> {
        let (_tx, rx) = mpsc::unbounded_channel();
        Ok(CloudSubscription::new(rx))
    }
}

/// Download a placeholder and wait until the provider reports it current.
///
/// Percent values passed to `progress` never decrease. Updates that carry
/// neither a new percent nor a final status are skipped and the wait
/// continues. Resolves exactly once.
pub async fn materialize(
    provider: &dyn CloudProvider,
    path: &Path,
    progress: &mut (dyn FnMut(f64) + Send),
    cancel: &CancellationToken,
) -> Result<(), IngestError> {
    // Subscribe first so an update racing the download request is not lost.
    let mut subscription = provider.subscribe(path)?;
    provider.start_download(path)?;
    debug!("Materialising cloud placeholder {}", path.display());

    let mut best = 0.0_f64;
    loop {
        let update = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(IngestError::Cancelled),
            update = subscription.next() => update,
        };

        let Some(update) = update else {
            return Err(IngestError::NoAccess {
                locator: path.display().to_string(),
            });
        };

        if let Some(p) = update.percent {
            let p = p.clamp(0.0, 100.0);
            if p > best {
                best = p;
                progress(best);
            }
        }

        if update.status == Some(DownloadStatus::Current) {
            if best < 100.0 {
                progress(100.0);
            }
            debug!("Placeholder {} is current", path.display());
            return Ok(());
        }
    }
}
