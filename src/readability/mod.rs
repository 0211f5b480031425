//! Boilerplate extraction engine.
//!
//! ```text
//! extract(source) ──mpsc──▶ actor ──▶ backend.load(source)
//!        ▲                    │        backend.evaluate_extraction()
//!        └────── oneshot ─────┘        Value → JSON → Article
//! ```
//!
//! One actor task owns the render backend and handles one request at a time.
//! The backend is started lazily on the first request, so runs that never
//! meet HTML never launch a browser. Each request is bounded by the render
//! timeout and observes its caller's [`CancellationToken`]; a request that
//! times out or is cancelled discards the backend, and the next request
//! starts a fresh one.

pub mod browser;
pub mod cdp;
pub mod chrome;
pub mod static_backend;

use crate::config::{IngestConfig, RenderBackendKind};
use crate::error::IngestError;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, OnceCell};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

pub use chrome::ChromeBackend;
pub use static_backend::StaticBackend;

/// Extraction script evaluated in the page; an expression yielding an article object.
pub(crate) const EXTRACT_SCRIPT: &str = include_str!("assets/extract.js");

const QUEUE_DEPTH: usize = 16;

/// Readable article extracted from a page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Article {
    pub title: String,
    /// Cleaned article HTML.
    pub content: String,
    pub text_content: String,
    pub length: usize,
    pub excerpt: Option<String>,
    pub byline: Option<String>,
    pub dir: Option<String>,
    pub site_name: Option<String>,
    pub lang: Option<String>,
}

/// What to render.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderSource {
    /// Navigate to a remote page.
    Url(Url),
    /// Load a raw HTML string.
    Html(String),
}

impl fmt::Display for RenderSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Url(url) => write!(f, "{url}"),
            Self::Html(html) => write!(f, "<{} bytes of HTML>", html.len()),
        }
    }
}

/// A page renderer able to run the extraction script.
#[async_trait]
pub trait RenderBackend: Send {
    fn name(&self) -> &'static str;

    /// Load `source` and return once the page has finished loading.
    async fn load(&mut self, source: &RenderSource) -> Result<(), IngestError>;

    /// Evaluate the extraction script against the loaded page.
    async fn evaluate_extraction(&mut self) -> Result<Value, IngestError>;
}

/// Convert the script result into an [`Article`], one error per stage.
pub(crate) fn article_from_value(value: Value) -> Result<Article, IngestError> {
    if !value.is_object() {
        return Err(IngestError::InvalidResponse);
    }
    let json =
        serde_json::to_string(&value).map_err(|e| IngestError::JsonSerialization(e.to_string()))?;
    serde_json::from_str::<Article>(&json).map_err(|e| IngestError::JsonDecoding(e.to_string()))
}

// ── Sanitisation ─────────────────────────────────────────────────────────────

static SANITIZER: Lazy<ammonia::Builder<'static>> = Lazy::new(|| {
    let mut builder = ammonia::Builder::empty();
    builder
        .add_tags([
            "a", "b", "blockquote", "br", "cite", "code", "dd", "dl", "dt", "em", "i", "li", "ol",
            "p", "pre", "q", "small", "span", "strike", "strong", "sub", "sup", "u", "ul", "div",
        ])
        .add_tags(["h1", "h2", "h3", "h4", "h5", "h6"])
        .add_tags([
            "table", "caption", "colgroup", "col", "thead", "tbody", "tfoot", "tr", "th", "td",
        ])
        .add_tag_attributes("a", ["href"])
        .add_tag_attributes("blockquote", ["cite"])
        .add_tag_attributes("q", ["cite"])
        .add_tag_attributes("td", ["colspan", "rowspan"])
        .add_tag_attributes("th", ["colspan", "rowspan"])
        .add_url_schemes(["http", "https", "mailto", "ftp"])
        .clean_content_tags(HashSet::from(["script", "style", "title"]))
        .link_rel(Some("nofollow"));
    builder
});

/// Strip everything outside the safe inline/block/heading/table allow-list.
pub fn sanitize_html(html: &str) -> String {
    SANITIZER.clean(html).to_string()
}

// ── Engine ───────────────────────────────────────────────────────────────────

struct Job {
    source: RenderSource,
    cancel: CancellationToken,
    reply: oneshot::Sender<Result<Article, IngestError>>,
}

/// How the actor obtains its backend.
#[derive(Clone)]
pub(crate) struct BackendLauncher {
    kind: RenderBackendKind,
    chrome_path: Option<PathBuf>,
    client: reqwest::Client,
}

impl BackendLauncher {
    async fn launch(&self) -> Result<Box<dyn RenderBackend>, IngestError> {
        match self.kind {
            RenderBackendKind::Static => Ok(Box::new(StaticBackend::new(self.client.clone()))),
            RenderBackendKind::Chrome => {
                let path = self
                    .chrome_executable()
                    .ok_or_else(|| IngestError::RenderEngineUnavailable("no Chrome/Chromium found".into()))?;
                Ok(Box::new(ChromeBackend::launch(&path).await?))
            }
            RenderBackendKind::Auto => {
                let Some(path) = self.chrome_executable() else {
                    warn!("No Chrome/Chromium found, using the static render backend");
                    return Ok(Box::new(StaticBackend::new(self.client.clone())));
                };
                match ChromeBackend::launch(&path).await {
                    Ok(backend) => Ok(Box::new(backend)),
                    Err(e) => {
                        warn!("Chrome failed to start ({e}), using the static render backend");
                        Ok(Box::new(StaticBackend::new(self.client.clone())))
                    }
                }
            }
        }
    }

    fn chrome_executable(&self) -> Option<PathBuf> {
        self.chrome_path
            .clone()
            .or_else(browser::find_chrome_executable)
    }
}

/// Handle to the render actor. Cheap to share behind an `Arc`.
pub struct ReadabilityEngine {
    launcher: BackendLauncher,
    timeout: Duration,
    sender: OnceCell<mpsc::Sender<Job>>,
}

impl ReadabilityEngine {
    /// Engine configured from `config`; remote pages for the static backend
    /// are fetched with `client`.
    pub fn new(config: &IngestConfig, client: reqwest::Client) -> Self {
        Self {
            launcher: BackendLauncher {
                kind: config.render_backend,
                chrome_path: config.chrome_path.clone(),
                client,
            },
            timeout: Duration::from_secs(config.render_timeout_secs),
            sender: OnceCell::new(),
        }
    }

    /// Engine driving an already constructed backend.
    pub fn with_backend(backend: Box<dyn RenderBackend>, timeout: Duration) -> Self {
        let engine = Self {
            launcher: BackendLauncher {
                kind: RenderBackendKind::Static,
                chrome_path: None,
                client: reqwest::Client::new(),
            },
            timeout,
            sender: OnceCell::new(),
        };
        let (tx, rx) = mpsc::channel(QUEUE_DEPTH);
        tokio::spawn(run_actor(rx, engine.launcher.clone(), Some(backend), timeout));
        // A fresh cell accepts its first value.
        let _ = engine.sender.set(tx);
        engine
    }

    /// Render `source` and extract its article.
    pub async fn extract(
        &self,
        source: RenderSource,
        cancel: &CancellationToken,
    ) -> Result<Article, IngestError> {
        let sender = self
            .sender
            .get_or_init(|| async {
                let (tx, rx) = mpsc::channel(QUEUE_DEPTH);
                tokio::spawn(run_actor(rx, self.launcher.clone(), None, self.timeout));
                tx
            })
            .await;

        let (reply, response) = oneshot::channel();
        let job = Job {
            source,
            cancel: cancel.clone(),
            reply,
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(IngestError::Cancelled),
            sent = sender.send(job) => sent.map_err(|_| {
                IngestError::RenderEngineUnavailable("render engine stopped".into())
            })?,
        }

        response
            .await
            .map_err(|_| IngestError::RenderEngineUnavailable("render engine dropped the request".into()))?
    }
}

async fn run_actor(
    mut jobs: mpsc::Receiver<Job>,
    launcher: BackendLauncher,
    mut backend: Option<Box<dyn RenderBackend>>,
    timeout: Duration,
) {
    while let Some(job) = jobs.recv().await {
        if job.reply.is_closed() || job.cancel.is_cancelled() {
            continue;
        }

        let result = tokio::select! {
            biased;
            _ = job.cancel.cancelled() => Err(IngestError::Cancelled),
            rendered = tokio::time::timeout(timeout, render(&mut backend, &launcher, &job.source)) => {
                rendered.unwrap_or(Err(IngestError::RenderTimeout { secs: timeout.as_secs() }))
            }
        };

        if matches!(
            result,
            Err(IngestError::Cancelled | IngestError::RenderTimeout { .. })
        ) {
            // The page may still be mid-load; start clean next time.
            backend = None;
        }
        if let Err(e) = &result {
            debug!("Render of {} failed: {}", job.source, e);
        }
        let _ = job.reply.send(result);
    }
}

async fn render(
    slot: &mut Option<Box<dyn RenderBackend>>,
    launcher: &BackendLauncher,
    source: &RenderSource,
) -> Result<Article, IngestError> {
    if slot.is_none() {
        *slot = Some(launcher.launch().await?);
    }
    let Some(backend) = slot.as_mut() else {
        return Err(IngestError::RenderEngineUnavailable("no backend".into()));
    };
    debug!("Rendering {} with the {} backend", source, backend.name());
    backend.load(source).await?;
    let value = backend.evaluate_extraction().await?;
    article_from_value(value)
}
