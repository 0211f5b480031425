//! Minimal Chrome DevTools Protocol client over a WebSocket.
//!
//! Requests carry a sequential id and are correlated with the response that
//! echoes it. Events that arrive while a call is pending are buffered so a
//! later [`CdpConnection::wait_for_event`] still sees them. The connection
//! has a single owner (the render actor), so no reader task is needed.

use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::VecDeque;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::trace;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Events kept while waiting for a response.
const EVENT_BUFFER: usize = 256;

/// Failure talking to the browser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CdpError {
    /// The socket failed or closed.
    Transport(String),
    /// The browser answered the call with an error object.
    Protocol(String),
}

impl std::fmt::Display for CdpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transport(msg) => write!(f, "DevTools transport: {msg}"),
            Self::Protocol(msg) => write!(f, "{msg}"),
        }
    }
}

/// A protocol event.
#[derive(Debug, Clone)]
pub struct CdpEvent {
    pub method: String,
    pub params: Value,
    pub session_id: Option<String>,
}

/// One inbound frame: a response (has `id`) or an event (has `method`).
#[derive(Debug, Deserialize)]
struct Incoming {
    id: Option<u64>,
    result: Option<Value>,
    error: Option<ErrorPayload>,
    method: Option<String>,
    params: Option<Value>,
    #[serde(rename = "sessionId")]
    session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorPayload {
    message: String,
    #[serde(default)]
    code: i64,
}

pub struct CdpConnection {
    ws: WsStream,
    next_id: u64,
    events: VecDeque<CdpEvent>,
}

impl CdpConnection {
    pub async fn connect(ws_url: &str) -> Result<Self, CdpError> {
        let (ws, _) = tokio_tungstenite::connect_async(ws_url)
            .await
            .map_err(|e| CdpError::Transport(format!("connect {ws_url}: {e}")))?;
        Ok(Self {
            ws,
            next_id: 0,
            events: VecDeque::new(),
        })
    }

    /// Send `method` and wait for its response.
    pub async fn call(
        &mut self,
        method: &str,
        params: Value,
        session_id: Option<&str>,
    ) -> Result<Value, CdpError> {
        self.next_id += 1;
        let id = self.next_id;
        let mut request = json!({ "id": id, "method": method, "params": params });
        if let Some(session) = session_id {
            request["sessionId"] = json!(session);
        }
        trace!("CDP → {} #{}", method, id);
        self.ws
            .send(Message::Text(request.to_string().into()))
            .await
            .map_err(|e| CdpError::Transport(e.to_string()))?;

        loop {
            let incoming = self.next_incoming().await?;
            match incoming.id {
                Some(rid) if rid == id => {
                    if let Some(err) = incoming.error {
                        return Err(CdpError::Protocol(format!(
                            "{method} failed ({}): {}",
                            err.code, err.message
                        )));
                    }
                    return Ok(incoming.result.unwrap_or(Value::Null));
                }
                // Response to an abandoned call.
                Some(_) => continue,
                None => self.buffer(incoming),
            }
        }
    }

    /// Wait for the next `method` event on `session_id`.
    pub async fn wait_for_event(
        &mut self,
        method: &str,
        session_id: Option<&str>,
    ) -> Result<CdpEvent, CdpError> {
        let matches = |e: &CdpEvent| e.method == method && e.session_id.as_deref() == session_id;
        if let Some(pos) = self.events.iter().position(matches) {
            if let Some(event) = self.events.remove(pos) {
                return Ok(event);
            }
        }
        loop {
            let incoming = self.next_incoming().await?;
            if incoming.id.is_some() {
                continue;
            }
            let Some(event) = to_event(incoming) else {
                continue;
            };
            if matches(&event) {
                return Ok(event);
            }
            self.push_event(event);
        }
    }

    pub fn clear_events(&mut self) {
        self.events.clear();
    }

    fn buffer(&mut self, incoming: Incoming) {
        if let Some(event) = to_event(incoming) {
            self.push_event(event);
        }
    }

    fn push_event(&mut self, event: CdpEvent) {
        if self.events.len() == EVENT_BUFFER {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    async fn next_incoming(&mut self) -> Result<Incoming, CdpError> {
        loop {
            match self.ws.next().await {
                Some(Ok(Message::Text(text))) => {
                    return serde_json::from_str(&text)
                        .map_err(|e| CdpError::Transport(format!("malformed message: {e}")));
                }
                Some(Ok(Message::Close(_))) | None => {
                    return Err(CdpError::Transport("connection closed".into()));
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(CdpError::Transport(e.to_string())),
            }
        }
    }
}

fn to_event(incoming: Incoming) -> Option<CdpEvent> {
    Some(CdpEvent {
        method: incoming.method?,
        params: incoming.params.unwrap_or(Value::Null),
        session_id: incoming.session_id,
    })
}
