//! Configuration types for document ingestion.
//!
//! All pipeline behaviour is controlled through [`IngestConfig`], built via
//! its [`IngestConfigBuilder`]. One struct holds every knob, so an
//! [`crate::Ingestor`] can be rebuilt from it and two runs can be compared by
//! diffing their configs.

use crate::error::IngestError;
use crate::fetch::cloud::CloudProvider;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

/// Configuration for an ingestion run.
///
/// Built via [`IngestConfig::builder()`] or using [`IngestConfig::default()`].
///
/// # Example
/// ```rust
/// use edgequake_ingest::{ExportFormat, IngestConfig};
///
/// let config = IngestConfig::builder()
///     .fetch_timeout_secs(10)
///     .default_format(ExportFormat::Markdown)
///     .recursive(false)
///     .build()
///     .unwrap();
/// assert_eq!(config.fetch_timeout_secs, 10);
/// ```
#[derive(Clone)]
pub struct IngestConfig {
    /// Timeout for a single remote GET, in seconds. Default: 30.
    pub fetch_timeout_secs: u64,

    /// Bound on one render-engine request (load + script), in seconds. Default: 30.
    ///
    /// A hung page would otherwise stall every queued Readability request,
    /// since the engine serialises them.
    pub render_timeout_secs: u64,

    /// Fetch and parse children of containers. Default: true.
    pub recursive: bool,

    /// Target format used when a caller does not request one. Default: None,
    /// meaning each extractor picks its own natural format.
    pub default_format: Option<ExportFormat>,

    /// Include dot-files when enumerating directories. Default: false.
    pub include_hidden: bool,

    /// `User-Agent` header sent with remote fetches.
    pub user_agent: String,

    /// Which render backend the Readability engine drives. Default: [`RenderBackendKind::Auto`].
    pub render_backend: RenderBackendKind,

    /// Explicit Chrome/Chromium executable. If None, well-known locations are searched.
    pub chrome_path: Option<PathBuf>,

    /// Explicit pdfium shared library. If None, `PDFIUM_LIB_PATH` then the
    /// system library are tried.
    pub pdfium_lib_path: Option<PathBuf>,

    /// Receives node lifecycle events. Default: None.
    pub progress_callback: Option<ProgressCallback>,

    /// Materialises cloud placeholders. Default: None (local-only files).
    pub cloud_provider: Option<Arc<dyn CloudProvider>>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            fetch_timeout_secs: 30,
            render_timeout_secs: 30,
            recursive: true,
            default_format: None,
            include_hidden: false,
            user_agent: format!("edgequake-ingest/{}", env!("CARGO_PKG_VERSION")),
            render_backend: RenderBackendKind::default(),
            chrome_path: None,
            pdfium_lib_path: None,
            progress_callback: None,
            cloud_provider: None,
        }
    }
}

impl fmt::Debug for IngestConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IngestConfig")
            .field("fetch_timeout_secs", &self.fetch_timeout_secs)
            .field("render_timeout_secs", &self.render_timeout_secs)
            .field("recursive", &self.recursive)
            .field("default_format", &self.default_format)
            .field("include_hidden", &self.include_hidden)
            .field("user_agent", &self.user_agent)
            .field("render_backend", &self.render_backend)
            .field("chrome_path", &self.chrome_path)
            .field("pdfium_lib_path", &self.pdfium_lib_path)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn IngestProgressCallback>"),
            )
            .field(
                "cloud_provider",
                &self.cloud_provider.as_ref().map(|_| "<dyn CloudProvider>"),
            )
            .finish()
    }
}

impl IngestConfig {
    /// Create a new builder for `IngestConfig`.
    pub fn builder() -> IngestConfigBuilder {
        IngestConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`IngestConfig`].
#[derive(Debug)]
pub struct IngestConfigBuilder {
    config: IngestConfig,
}

impl IngestConfigBuilder {
    pub fn fetch_timeout_secs(mut self, secs: u64) -> Self {
        self.config.fetch_timeout_secs = secs.clamp(1, 3600);
        self
    }

    pub fn render_timeout_secs(mut self, secs: u64) -> Self {
        self.config.render_timeout_secs = secs.clamp(1, 3600);
        self
    }

    pub fn recursive(mut self, v: bool) -> Self {
        self.config.recursive = v;
        self
    }

    pub fn default_format(mut self, format: ExportFormat) -> Self {
        self.config.default_format = Some(format);
        self
    }

    pub fn include_hidden(mut self, v: bool) -> Self {
        self.config.include_hidden = v;
        self
    }

    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.config.user_agent = ua.into();
        self
    }

    pub fn render_backend(mut self, kind: RenderBackendKind) -> Self {
        self.config.render_backend = kind;
        self
    }

    pub fn chrome_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.chrome_path = Some(path.into());
        self
    }

    pub fn pdfium_lib_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_lib_path = Some(path.into());
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    pub fn cloud_provider(mut self, provider: Arc<dyn CloudProvider>) -> Self {
        self.config.cloud_provider = Some(provider);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<IngestConfig, IngestError> {
        let c = &self.config;
        if c.user_agent.trim().is_empty() {
            return Err(IngestError::InvalidConfig(
                "User-Agent must not be empty".into(),
            ));
        }
        if let Some(path) = &c.chrome_path {
            if !path.exists() {
                return Err(IngestError::InvalidConfig(format!(
                    "Chrome executable not found at '{}'",
                    path.display()
                )));
            }
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Target text format for exported content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    PlainText,
    Html,
    Xml,
    Markdown,
    Csv,
}

impl ExportFormat {
    /// File extension conventionally used for this format.
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::PlainText => "txt",
            ExportFormat::Html => "html",
            ExportFormat::Xml => "xml",
            ExportFormat::Markdown => "md",
            ExportFormat::Csv => "csv",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExportFormat::PlainText => "plaintext",
            ExportFormat::Html => "html",
            ExportFormat::Xml => "xml",
            ExportFormat::Markdown => "markdown",
            ExportFormat::Csv => "csv",
        };
        f.write_str(s)
    }
}

impl FromStr for ExportFormat {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "plaintext" | "text" | "txt" => Ok(ExportFormat::PlainText),
            "html" => Ok(ExportFormat::Html),
            "xml" => Ok(ExportFormat::Xml),
            "markdown" | "md" => Ok(ExportFormat::Markdown),
            "csv" => Ok(ExportFormat::Csv),
            other => Err(IngestError::InvalidConfig(format!(
                "unknown export format '{other}' (expected plaintext, html, xml, markdown or csv)"
            ))),
        }
    }
}

/// Render backend behind the Readability engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderBackendKind {
    /// Headless Chrome when one can be found, otherwise the static backend. (default)
    #[default]
    Auto,
    /// Headless Chrome over the DevTools protocol; scripts and styles execute.
    Chrome,
    /// In-process HTML parsing; no script execution.
    Static,
}

impl FromStr for RenderBackendKind {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(RenderBackendKind::Auto),
            "chrome" | "chromium" => Ok(RenderBackendKind::Chrome),
            "static" => Ok(RenderBackendKind::Static),
            other => Err(IngestError::InvalidConfig(format!(
                "unknown render backend '{other}'"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let c = IngestConfig::default();
        assert_eq!(c.fetch_timeout_secs, 30);
        assert_eq!(c.render_timeout_secs, 30);
        assert!(c.recursive);
        assert!(c.default_format.is_none());
        assert_eq!(c.render_backend, RenderBackendKind::Auto);
    }

    #[test]
    fn builder_clamps_timeouts() {
        let c = IngestConfig::builder()
            .fetch_timeout_secs(0)
            .render_timeout_secs(99_999)
            .build()
            .unwrap();
        assert_eq!(c.fetch_timeout_secs, 1);
        assert_eq!(c.render_timeout_secs, 3600);
    }

    #[test]
    fn builder_rejects_missing_chrome() {
        let err = IngestConfig::builder()
            .chrome_path("/definitely/not/a/chrome")
            .build()
            .unwrap_err();
        assert!(matches!(err, IngestError::InvalidConfig(_)));
    }

    #[test]
    fn export_format_parses_aliases() {
        assert_eq!("md".parse::<ExportFormat>().unwrap(), ExportFormat::Markdown);
        assert_eq!("TEXT".parse::<ExportFormat>().unwrap(), ExportFormat::PlainText);
        assert_eq!("csv".parse::<ExportFormat>().unwrap(), ExportFormat::Csv);
        assert!("docx".parse::<ExportFormat>().is_err());
    }

    #[test]
    fn export_format_display_round_trips() {
        for f in [
            ExportFormat::PlainText,
            ExportFormat::Html,
            ExportFormat::Xml,
            ExportFormat::Markdown,
            ExportFormat::Csv,
        ] {
            assert_eq!(f.to_string().parse::<ExportFormat>().unwrap(), f);
        }
    }

    #[test]
    fn debug_hides_trait_objects() {
        let dbg = format!("{:?}", IngestConfig::default());
        assert!(dbg.contains("IngestConfig"));
        assert!(dbg.contains("render_backend"));
    }
}
