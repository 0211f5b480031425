//! Headless Chrome render backend.
//!
//! One browser process, one page target, one flattened session. Remote pages
//! are navigated directly. Raw HTML replaces the document of a blank page
//! through `Page.setDocumentContent`, which has no URL length ceiling.

use super::browser::{self, LaunchedBrowser};
use super::cdp::{CdpConnection, CdpError};
use super::{RenderBackend, RenderSource, EXTRACT_SCRIPT};
use crate::error::IngestError;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::Path;
use tracing::{debug, info};

pub struct ChromeBackend {
    cdp: CdpConnection,
    session_id: String,
    // Dropped last: kills the process once the socket is gone.
    _browser: LaunchedBrowser,
}

fn unavailable(e: CdpError) -> IngestError {
    IngestError::RenderEngineUnavailable(e.to_string())
}

fn load_failed(e: CdpError) -> IngestError {
    match e {
        CdpError::Protocol(msg) => IngestError::RenderLoadFailed(msg),
        transport => unavailable(transport),
    }
}

impl ChromeBackend {
    /// Launch `executable` and open the page all renders share.
    pub async fn launch(executable: &Path) -> Result<Self, IngestError> {
        let browser = browser::launch(executable).await?;
        let mut cdp = CdpConnection::connect(&browser.endpoint.web_socket_debugger_url)
            .await
            .map_err(unavailable)?;

        let target = cdp
            .call("Target.createTarget", json!({ "url": "about:blank" }), None)
            .await
            .map_err(unavailable)?;
        let target_id = target["targetId"]
            .as_str()
            .ok_or_else(|| IngestError::RenderEngineUnavailable("no targetId".into()))?
            .to_string();

        let attached = cdp
            .call(
                "Target.attachToTarget",
                json!({ "targetId": target_id, "flatten": true }),
                None,
            )
            .await
            .map_err(unavailable)?;
        let session_id = attached["sessionId"]
            .as_str()
            .ok_or_else(|| IngestError::RenderEngineUnavailable("no sessionId".into()))?
            .to_string();

        cdp.call("Page.enable", json!({}), Some(&session_id))
            .await
            .map_err(unavailable)?;

        info!("Chrome render backend ready ({})", executable.display());
        Ok(Self {
            cdp,
            session_id,
            _browser: browser,
        })
    }
}

/// Navigate the page at `session_id` to `url` and wait for its load event.
async fn navigate(
    cdp: &mut CdpConnection,
    session_id: &str,
    url: &str,
) -> Result<(), IngestError> {
    cdp.clear_events();
    let navigated = cdp
        .call("Page.navigate", json!({ "url": url }), Some(session_id))
        .await
        .map_err(load_failed)?;
    if let Some(error) = navigated.get("errorText").and_then(Value::as_str) {
        if !error.is_empty() {
            return Err(IngestError::RenderLoadFailed(error.to_string()));
        }
    }
    cdp.wait_for_event("Page.loadEventFired", Some(session_id))
        .await
        .map_err(load_failed)?;
    Ok(())
}

/// Load `source` into the page at `session_id`.
pub(crate) async fn load_source(
    cdp: &mut CdpConnection,
    session_id: &str,
    source: &RenderSource,
) -> Result<(), IngestError> {
    let html = match source {
        RenderSource::Url(url) => return navigate(cdp, session_id, url.as_str()).await,
        RenderSource::Html(html) => html,
    };

    navigate(cdp, session_id, "about:blank").await?;
    let tree = cdp
        .call("Page.getFrameTree", json!({}), Some(session_id))
        .await
        .map_err(load_failed)?;
    let frame_id = tree["frameTree"]["frame"]["id"]
        .as_str()
        .ok_or_else(|| IngestError::RenderLoadFailed("no main frame".into()))?
        .to_string();

    cdp.clear_events();
    cdp.call(
        "Page.setDocumentContent",
        json!({ "frameId": frame_id, "html": html }),
        Some(session_id),
    )
    .await
    .map_err(load_failed)?;
    cdp.wait_for_event("Page.loadEventFired", Some(session_id))
        .await
        .map_err(load_failed)?;
    Ok(())
}

#[async_trait]
impl RenderBackend for ChromeBackend {
    fn name(&self) -> &'static str {
        "chrome"
    }

    async fn load(&mut self, source: &RenderSource) -> Result<(), IngestError> {
        debug!("Loading {} into render page", source);
        load_source(&mut self.cdp, &self.session_id, source).await
    }

    async fn evaluate_extraction(&mut self) -> Result<Value, IngestError> {
        let evaluated = self
            .cdp
            .call(
                "Runtime.evaluate",
                json!({
                    "expression": EXTRACT_SCRIPT,
                    "returnByValue": true,
                    "awaitPromise": true,
                }),
                Some(&self.session_id),
            )
            .await
            .map_err(|e| match e {
                CdpError::Protocol(msg) => IngestError::ScriptEvaluation(msg),
                transport => unavailable(transport),
            })?;

        if let Some(details) = evaluated.get("exceptionDetails") {
            let message = details["exception"]["description"]
                .as_str()
                .or_else(|| details["text"].as_str())
                .unwrap_or("uncaught exception");
            return Err(IngestError::ScriptEvaluation(message.to_string()));
        }

        Ok(evaluated["result"]["value"].clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::{SinkExt, StreamExt};
    use std::sync::{Arc, Mutex};
    use tokio::net::TcpListener;
    use tokio_tungstenite::tungstenite::Message;

    /// Fake browser recording every call. Navigations and document writes
    /// are followed by a load event; the frame tree names frame `F1`.
    async fn recording_browser() -> (String, Arc<Mutex<Vec<(String, Value)>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let calls = Arc::new(Mutex::new(Vec::new()));
        let seen = calls.clone();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            while let Some(Ok(Message::Text(text))) = ws.next().await {
                let req: Value = serde_json::from_str(&text).unwrap();
                let method = req["method"].as_str().unwrap().to_string();
                seen.lock().unwrap().push((method.clone(), req["params"].clone()));
                let result = match method.as_str() {
                    "Page.getFrameTree" => json!({ "frameTree": { "frame": { "id": "F1" } } }),
                    "Page.navigate" => json!({ "frameId": "F1" }),
                    _ => json!({}),
                };
                let reply = json!({ "id": req["id"], "result": result });
                ws.send(Message::Text(reply.to_string().into())).await.unwrap();
                if method == "Page.navigate" || method == "Page.setDocumentContent" {
                    let event = json!({
                        "method": "Page.loadEventFired",
                        "params": { "timestamp": 1.0 },
                        "sessionId": req["sessionId"],
                    });
                    ws.send(Message::Text(event.to_string().into())).await.unwrap();
                }
            }
        });
        (format!("ws://{addr}"), calls)
    }

    #[tokio::test]
    async fn large_html_is_written_into_a_blank_page() {
        let (url, calls) = recording_browser().await;
        let mut cdp = CdpConnection::connect(&url).await.unwrap();
        // Past the 2 MiB ceiling Chrome puts on URLs.
        let html = format!("<p>{}</p>", "x".repeat(3 * 1024 * 1024));

        load_source(&mut cdp, "S1", &RenderSource::Html(html.clone()))
            .await
            .unwrap();

        let calls = calls.lock().unwrap();
        let methods: Vec<&str> = calls.iter().map(|(m, _)| m.as_str()).collect();
        assert_eq!(
            methods,
            ["Page.navigate", "Page.getFrameTree", "Page.setDocumentContent"]
        );
        assert_eq!(calls[0].1["url"], "about:blank");
        assert_eq!(calls[2].1["frameId"], "F1");
        assert_eq!(calls[2].1["html"].as_str().map(str::len), Some(html.len()));
    }

    #[tokio::test]
    async fn urls_are_navigated_directly() {
        let (url, calls) = recording_browser().await;
        let mut cdp = CdpConnection::connect(&url).await.unwrap();
        let page = url::Url::parse("https://example.com/a").unwrap();

        load_source(&mut cdp, "S1", &RenderSource::Url(page))
            .await
            .unwrap();

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1["url"], "https://example.com/a");
    }

    #[test]
    fn protocol_errors_during_load_are_load_failures() {
        assert_eq!(
            load_failed(CdpError::Protocol("net::ERR_NAME_NOT_RESOLVED".into())),
            IngestError::RenderLoadFailed("net::ERR_NAME_NOT_RESOLVED".into())
        );
        assert!(matches!(
            load_failed(CdpError::Transport("closed".into())),
            IngestError::RenderEngineUnavailable(_)
        ));
    }
}
