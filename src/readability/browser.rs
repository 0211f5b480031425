//! Chrome/Chromium discovery, launch and DevTools endpoint probing.

use crate::error::IngestError;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};
use tracing::debug;

const PROBE_ATTEMPTS: usize = 25;
const PROBE_INTERVAL: Duration = Duration::from_millis(200);

/// `/json/version` response subset.
#[derive(Debug, Deserialize)]
pub struct CdpVersionInfo {
    #[serde(rename = "webSocketDebuggerUrl")]
    pub web_socket_debugger_url: String,
    #[serde(rename = "Browser")]
    pub browser: Option<String>,
}

/// First Chrome-family executable found on this machine.
pub fn find_chrome_executable() -> Option<PathBuf> {
    let candidates: Vec<String> = if cfg!(target_os = "macos") {
        vec![
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
            "/Applications/Brave Browser.app/Contents/MacOS/Brave Browser",
            "/Applications/Microsoft Edge.app/Contents/MacOS/Microsoft Edge",
        ]
        .into_iter()
        .map(str::to_string)
        .collect()
    } else if cfg!(target_os = "windows") {
        windows_browser_candidates()
    } else {
        vec![
            "google-chrome-stable",
            "google-chrome",
            "chromium-browser",
            "chromium",
            "brave-browser",
            "microsoft-edge",
            "/usr/bin/google-chrome-stable",
            "/usr/bin/google-chrome",
            "/usr/bin/chromium-browser",
            "/usr/bin/chromium",
            "/snap/bin/chromium",
        ]
        .into_iter()
        .map(str::to_string)
        .collect()
    };

    for candidate in candidates {
        if candidate.starts_with('/') || candidate.contains('\\') || candidate.contains(':') {
            let path = PathBuf::from(&candidate);
            if path.exists() {
                return Some(path);
            }
        } else if let Ok(path) = which::which(&candidate) {
            return Some(path);
        }
    }

    None
}

fn windows_browser_candidates() -> Vec<String> {
    let mut roots = Vec::new();
    for key in ["PROGRAMFILES", "PROGRAMFILES(X86)", "LOCALAPPDATA"] {
        if let Ok(value) = std::env::var(key) {
            roots.push(PathBuf::from(value));
        }
    }
    if roots.is_empty() {
        roots.push(PathBuf::from(r"C:\Program Files"));
        roots.push(PathBuf::from(r"C:\Program Files (x86)"));
    }

    let suffixes: &[&[&str]] = &[
        &["Google", "Chrome", "Application", "chrome.exe"],
        &["Microsoft", "Edge", "Application", "msedge.exe"],
        &["Chromium", "Application", "chrome.exe"],
    ];

    let mut candidates = Vec::new();
    for root in roots {
        for suffix in suffixes {
            let mut path = root.clone();
            for component in *suffix {
                path.push(component);
            }
            candidates.push(path.to_string_lossy().to_string());
        }
    }
    candidates.extend(["chrome.exe", "msedge.exe"].map(str::to_string));
    candidates
}

/// A headless browser process and its DevTools endpoint.
///
/// The process is killed when this value is dropped; the profile directory
/// is removed with it.
pub struct LaunchedBrowser {
    pub endpoint: CdpVersionInfo,
    _child: Child,
    _profile: tempfile::TempDir,
}

/// Launch `executable` headless and wait for its DevTools endpoint.
pub async fn launch(executable: &Path) -> Result<LaunchedBrowser, IngestError> {
    let port = free_port()?;
    let profile = tempfile::tempdir()
        .map_err(|e| IngestError::RenderEngineUnavailable(format!("profile dir: {e}")))?;

    let mut cmd = Command::new(executable);
    cmd.arg("--headless=new")
        .arg(format!("--remote-debugging-port={port}"))
        .arg(format!("--user-data-dir={}", profile.path().display()))
        .args([
            "--no-first-run",
            "--no-default-browser-check",
            "--disable-gpu",
            "--disable-extensions",
            "--mute-audio",
            "about:blank",
        ])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true);

    let mut child = cmd.spawn().map_err(|e| {
        IngestError::RenderEngineUnavailable(format!(
            "failed to launch {}: {e}",
            executable.display()
        ))
    })?;
    debug!("Launched {} on DevTools port {}", executable.display(), port);

    let mut last_error = String::from("endpoint not reachable");
    for _ in 0..PROBE_ATTEMPTS {
        tokio::time::sleep(PROBE_INTERVAL).await;

        if let Ok(Some(status)) = child.try_wait() {
            return Err(IngestError::RenderEngineUnavailable(format!(
                "browser exited before its DevTools endpoint came up ({status})"
            )));
        }

        match fetch_cdp_endpoint(port).await {
            Ok(endpoint) => {
                debug!(
                    "DevTools endpoint ready: {}",
                    endpoint.browser.as_deref().unwrap_or("unknown browser")
                );
                return Ok(LaunchedBrowser {
                    endpoint,
                    _child: child,
                    _profile: profile,
                });
            }
            Err(e) => last_error = e,
        }
    }

    Err(IngestError::RenderEngineUnavailable(format!(
        "DevTools endpoint on port {port} never came up: {last_error}"
    )))
}

/// Resolve `/json/version` on `port`.
async fn fetch_cdp_endpoint(port: u16) -> Result<CdpVersionInfo, String> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_millis(400))
        .build()
        .map_err(|e| e.to_string())?;

    let response = client
        .get(format!("http://127.0.0.1:{port}/json/version"))
        .send()
        .await
        .map_err(|e| e.to_string())?;
    if !response.status().is_success() {
        return Err(format!("unexpected status {}", response.status()));
    }
    response
        .json::<CdpVersionInfo>()
        .await
        .map_err(|e| format!("bad /json/version response: {e}"))
}

/// Ask the OS for an unused TCP port.
fn free_port() -> Result<u16, IngestError> {
    std::net::TcpListener::bind("127.0.0.1:0")
        .and_then(|l| l.local_addr())
        .map(|a| a.port())
        .map_err(|e| IngestError::RenderEngineUnavailable(format!("no free port: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn windows_candidates_include_common_browsers() {
        let candidates = windows_browser_candidates();
        assert!(candidates.contains(&"chrome.exe".to_string()));
        assert!(candidates.contains(&"msedge.exe".to_string()));
    }

    #[test]
    fn free_port_is_nonzero() {
        assert!(free_port().unwrap() > 0);
    }

    #[test]
    fn version_info_deserializes() {
        let info: CdpVersionInfo = serde_json::from_str(
            r#"{"Browser":"HeadlessChrome/120.0","webSocketDebuggerUrl":"ws://127.0.0.1:9222/devtools/browser/abc"}"#,
        )
        .unwrap();
        assert_eq!(info.browser.as_deref(), Some("HeadlessChrome/120.0"));
        assert!(info.web_socket_debugger_url.starts_with("ws://"));
    }
}
