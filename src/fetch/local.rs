//! Local filesystem fetcher.
//!
//! Directories are enumerated, never read; files are read whole. Cloud
//! placeholders are materialised before either happens.

use crate::doctype::DocumentType;
use crate::error::IngestError;
use crate::fetch::cloud::{materialize, CloudProvider};
use crate::fetch::{Fetched, FileMeta};
use crate::locator::Locator;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Name of the main text stream inside an `.rtfd` package.
const RTFD_TEXT: &str = "TXT.rtf";

/// Reads files and lists directories.
#[derive(Clone)]
pub struct LocalFetcher {
    include_hidden: bool,
    cloud: Arc<dyn CloudProvider>,
}

impl LocalFetcher {
    pub fn new(include_hidden: bool, cloud: Arc<dyn CloudProvider>) -> Self {
        Self {
            include_hidden,
            cloud,
        }
    }

    pub async fn fetch(
        &self,
        path: &Path,
        progress: &mut (dyn FnMut(f64) + Send),
        cancel: &CancellationToken,
    ) -> Result<Fetched, IngestError> {
        if self.cloud.is_placeholder(path)? {
            materialize(self.cloud.as_ref(), path, progress, cancel).await?;
        }

        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| io_error(path, e))?;
        let meta = file_meta(&metadata);

        if metadata.is_dir() {
            if is_rtfd_package(path) {
                let data = tokio::fs::read(path.join(RTFD_TEXT))
                    .await
                    .map_err(|e| io_error(path, e))?;
                progress(100.0);
                return Ok(Fetched::Content {
                    data: Bytes::from(data),
                    doc_type: Some(DocumentType::Rtfd),
                    meta,
                });
            }

            let locators = self.list_children(path).await?;
            debug!("{}: {} children", path.display(), locators.len());
            return Ok(Fetched::Children { locators, meta });
        }

        let data = tokio::fs::read(path)
            .await
            .map_err(|e| io_error(path, e))?;
        progress(100.0);

        let doc_type = match path.extension() {
            Some(ext) => Some(DocumentType::from_extension(&ext.to_string_lossy())),
            None => DocumentType::sniff(&data),
        };

        Ok(Fetched::Content {
            data: Bytes::from(data),
            doc_type,
            meta,
        })
    }

    /// Immediate children, sorted by file name, hidden entries skipped unless configured.
    async fn list_children(&self, dir: &Path) -> Result<Vec<Locator>, IngestError> {
        let mut entries = tokio::fs::read_dir(dir)
            .await
            .map_err(|e| io_error(dir, e))?;

        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| io_error(dir, e))?
        {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !self.include_hidden && name.starts_with('.') {
                continue;
            }
            names.push(name);
        }
        names.sort();

        Ok(names
            .into_iter()
            .map(|name| Locator::Local(dir.join(name)))
            .collect())
    }
}

fn is_rtfd_package(path: &Path) -> bool {
    path.extension()
        .is_some_and(|e| e.eq_ignore_ascii_case("rtfd"))
}

fn file_meta(metadata: &std::fs::Metadata) -> FileMeta {
    FileMeta {
        size: (!metadata.is_dir()).then_some(metadata.len()),
        created: metadata.created().ok().map(DateTime::<Utc>::from),
        modified: metadata.modified().ok().map(DateTime::<Utc>::from),
    }
}

fn io_error(path: &Path, e: std::io::Error) -> IngestError {
    let locator = path.display().to_string();
    match e.kind() {
        ErrorKind::NotFound => IngestError::NoContent { locator },
        ErrorKind::PermissionDenied => IngestError::NoAccess { locator },
        _ => IngestError::Internal(format!("I/O error reading '{locator}': {e}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::cloud::LocalOnlyProvider;

    fn fetcher(include_hidden: bool) -> LocalFetcher {
        LocalFetcher::new(include_hidden, Arc::new(LocalOnlyProvider))
    }

    #[tokio::test]
    async fn reads_file_and_types_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.md");
        std::fs::write(&path, "# hi").unwrap();

        let mut last = 0.0;
        let fetched = fetcher(false)
            .fetch(&path, &mut |p| last = p, &CancellationToken::new())
            .await
            .unwrap();
        match fetched {
            Fetched::Content {
                data,
                doc_type,
                meta,
            } => {
                assert_eq!(&data[..], b"# hi");
                assert_eq!(doc_type, Some(DocumentType::PlainText));
                assert_eq!(meta.size, Some(4));
                assert!(meta.modified.is_some());
            }
            other => panic!("expected content, got {other:?}"),
        }
        assert_eq!(last, 100.0);
    }

    #[tokio::test]
    async fn lists_sorted_visible_children() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.txt"), "b").unwrap();
        std::fs::write(dir.path().join("a.txt"), "a").unwrap();
        std::fs::write(dir.path().join(".hidden"), "h").unwrap();

        match fetcher(false)
            .fetch(dir.path(), &mut |_| {}, &CancellationToken::new())
            .await
            .unwrap()
        {
            Fetched::Children { locators, .. } => {
                let names: Vec<String> = locators.iter().map(Locator::filename).collect();
                assert_eq!(names, vec!["a.txt", "b.txt"]);
            }
            other => panic!("expected children, got {other:?}"),
        }

        match fetcher(true)
            .fetch(dir.path(), &mut |_| {}, &CancellationToken::new())
            .await
            .unwrap()
        {
            Fetched::Children { locators, .. } => assert_eq!(locators.len(), 3),
            other => panic!("expected children, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn rtfd_package_yields_its_text_stream() {
        let dir = tempfile::tempdir().unwrap();
        let pkg = dir.path().join("memo.rtfd");
        std::fs::create_dir(&pkg).unwrap();
        std::fs::write(pkg.join("TXT.rtf"), r"{\rtf1 hi}").unwrap();

        match fetcher(false)
            .fetch(&pkg, &mut |_| {}, &CancellationToken::new())
            .await
            .unwrap()
        {
            Fetched::Content { data, doc_type, .. } => {
                assert_eq!(doc_type, Some(DocumentType::Rtfd));
                assert!(data.starts_with(b"{\\rtf1"));
            }
            other => panic!("expected content, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_file_is_no_content() {
        let err = fetcher(false)
            .fetch(
                Path::new("/definitely/missing/file.txt"),
                &mut |_| {},
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::NoContent { .. }));
    }

    #[tokio::test]
    async fn extensionless_file_is_sniffed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("README");
        std::fs::write(&path, "plain words").unwrap();
        match fetcher(false)
            .fetch(&path, &mut |_| {}, &CancellationToken::new())
            .await
            .unwrap()
        {
            Fetched::Content { doc_type, .. } => {
                assert_eq!(doc_type, Some(DocumentType::PlainText))
            }
            other => panic!("expected content, got {other:?}"),
        }
    }
}
