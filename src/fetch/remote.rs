//! Remote (http/https) fetcher.
//!
//! One GET per node with a fixed timeout. The response MIME type, not the URL
//! extension, decides the type signature, and a remote locator never expands
//! into children.

use crate::doctype::DocumentType;
use crate::error::IngestError;
use crate::fetch::{Fetched, FileMeta};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use reqwest::header::{CONTENT_TYPE, LAST_MODIFIED};
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

/// HTTP fetcher sharing one connection pool.
#[derive(Debug, Clone)]
pub struct RemoteFetcher {
    client: reqwest::Client,
    timeout_secs: u64,
}

impl RemoteFetcher {
    pub fn new(timeout_secs: u64, user_agent: &str) -> Result<Self, IngestError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(user_agent)
            .build()
            .map_err(|e| IngestError::Internal(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            timeout_secs,
        })
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    pub async fn fetch(
        &self,
        url: &Url,
        progress: &mut (dyn FnMut(f64) + Send),
    ) -> Result<Fetched, IngestError> {
        info!("Fetching {}", url);

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| self.map_err(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(IngestError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let headers = response.headers();
        let doc_type = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(DocumentType::from_mime);
        let modified = headers
            .get(LAST_MODIFIED)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| DateTime::parse_from_rfc2822(v).ok())
            .map(|d| d.with_timezone(&Utc));
        let total = response.content_length().filter(|t| *t > 0);

        let mut body = Vec::with_capacity(total.unwrap_or(0).min(16 * 1024 * 1024) as usize);
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| self.map_err(url, e))?;
            body.extend_from_slice(&chunk);
            if let Some(total) = total {
                progress((body.len() as f64 / total as f64 * 100.0).min(100.0));
            }
        }
        progress(100.0);

        debug!(
            "Fetched {} bytes from {} (type: {:?})",
            body.len(),
            url,
            doc_type
        );

        let size = body.len() as u64;
        Ok(Fetched::Content {
            data: Bytes::from(body),
            doc_type,
            meta: FileMeta {
                size: Some(size),
                created: None,
                modified,
            },
        })
    }

    fn map_err(&self, url: &Url, e: reqwest::Error) -> IngestError {
        if e.is_timeout() {
            IngestError::Timeout {
                url: url.to_string(),
                secs: self.timeout_secs,
            }
        } else {
            IngestError::Transport {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve exactly one canned HTTP response on a random port.
    async fn serve_once(response: &'static str) -> Url {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = [0u8; 2048];
                let _ = socket.read(&mut buf).await;
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });
        Url::parse(&format!("http://{addr}/doc")).unwrap()
    }

    #[tokio::test]
    async fn mime_type_decides_signature() {
        let url = serve_once(
            "HTTP/1.1 200 OK\r\nContent-Type: text/csv; charset=utf-8\r\nContent-Length: 7\r\nConnection: close\r\n\r\na,b\n1,2",
        )
        .await;
        let fetcher = RemoteFetcher::new(5, "test").unwrap();
        let mut seen = Vec::new();
        match fetcher.fetch(&url, &mut |p| seen.push(p)).await.unwrap() {
            Fetched::Content { data, doc_type, meta } => {
                assert_eq!(&data[..], b"a,b\n1,2");
                assert_eq!(doc_type, Some(DocumentType::Csv));
                assert_eq!(meta.size, Some(7));
            }
            other => panic!("expected content, got {other:?}"),
        }
        assert_eq!(seen.last(), Some(&100.0));
    }

    #[tokio::test]
    async fn non_success_status_is_terminal() {
        let url = serve_once(
            "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        )
        .await;
        let fetcher = RemoteFetcher::new(5, "test").unwrap();
        let err = fetcher.fetch(&url, &mut |_| {}).await.unwrap_err();
        assert_eq!(
            err,
            IngestError::HttpStatus {
                url: url.to_string(),
                status: 404
            }
        );
    }

    #[tokio::test]
    async fn connection_refused_is_transport_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let url = Url::parse(&format!("http://{addr}/gone")).unwrap();
        let fetcher = RemoteFetcher::new(5, "test").unwrap();
        let err = fetcher.fetch(&url, &mut |_| {}).await.unwrap_err();
        assert!(err.is_transport(), "{err:?}");
    }
}
