//! Locators: the path or URL that identifies a content source.
//!
//! The scheme decides which fetch variant handles a node, so the split is
//! made once, here, when user input is parsed.

use crate::error::IngestError;
use std::fmt;
use std::path::{Path, PathBuf};
use url::Url;

/// A content source: a filesystem path or an http(s) URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Locator {
    /// A file, directory or package on the local filesystem.
    Local(PathBuf),
    /// An http or https resource.
    Remote(Url),
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

impl Locator {
    /// Parse user input into a locator.
    ///
    /// `http(s)://` becomes [`Locator::Remote`], `file://` and bare paths
    /// become [`Locator::Local`]. Any other scheme is rejected.
    pub fn parse(input: &str) -> Result<Self, IngestError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(IngestError::InvalidUrl {
                input: input.to_string(),
            });
        }

        if is_url(trimmed) {
            let url = Url::parse(trimmed).map_err(|_| IngestError::InvalidUrl {
                input: input.to_string(),
            })?;
            if url.host_str().is_none() {
                return Err(IngestError::InvalidUrl {
                    input: input.to_string(),
                });
            }
            return Ok(Locator::Remote(url));
        }

        if trimmed.starts_with("file://") {
            let url = Url::parse(trimmed).map_err(|_| IngestError::InvalidUrl {
                input: input.to_string(),
            })?;
            let path = url.to_file_path().map_err(|_| IngestError::InvalidUrl {
                input: input.to_string(),
            })?;
            return Ok(Locator::Local(path));
        }

        // Reject other URL schemes, but keep Windows drive letters ("C:\...") as paths.
        if let Some((scheme, _)) = trimmed.split_once("://") {
            if scheme.len() > 1 && scheme.chars().all(|c| c.is_ascii_alphanumeric() || c == '+') {
                return Err(IngestError::InvalidUrl {
                    input: input.to_string(),
                });
            }
        }

        Ok(Locator::Local(PathBuf::from(trimmed)))
    }

    pub fn is_local(&self) -> bool {
        matches!(self, Locator::Local(_))
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, Locator::Remote(_))
    }

    /// The local path, if this is a local locator.
    pub fn as_path(&self) -> Option<&Path> {
        match self {
            Locator::Local(p) => Some(p),
            Locator::Remote(_) => None,
        }
    }

    /// Last path component, or the host for a bare URL.
    pub fn filename(&self) -> String {
        match self {
            Locator::Local(p) => p
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| p.display().to_string()),
            Locator::Remote(url) => url
                .path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
                .filter(|last| !last.is_empty())
                .or_else(|| url.host_str().map(str::to_string))
                .unwrap_or_else(|| url.to_string()),
        }
    }

    /// Lower-cased extension of the last path component, if any.
    pub fn extension(&self) -> Option<String> {
        // Hosts are not file names: "example.com" has no extension.
        let name = match self {
            Locator::Local(p) => p.file_name()?.to_string_lossy().into_owned(),
            Locator::Remote(url) => url.path_segments()?.next_back()?.to_string(),
        };
        Path::new(&name)
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .filter(|e| !e.is_empty())
    }

    /// A child locator inside this (container) locator.
    pub fn join(&self, name: &str) -> Locator {
        match self {
            Locator::Local(p) => Locator::Local(p.join(name)),
            Locator::Remote(url) => match url.join(name) {
                Ok(joined) => Locator::Remote(joined),
                Err(_) => Locator::Remote(url.clone()),
            },
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Local(p) => write!(f, "{}", p.display()),
            Locator::Remote(url) => write!(f, "{url}"),
        }
    }
}

impl From<PathBuf> for Locator {
    fn from(path: PathBuf) -> Self {
        Locator::Local(path)
    }
}

impl From<Url> for Locator {
    fn from(url: Url) -> Self {
        Locator::Remote(url)
    }
}
