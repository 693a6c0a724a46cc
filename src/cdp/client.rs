//! CDP WebSocket client.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, trace, warn};

use crate::error::{AutopressError, Result};

use super::protocol::{BrowserVersion, CdpRequest, CdpResponse, PageInfo};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

const COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Pending command waiting for its response.
struct PendingRequest {
    tx: oneshot::Sender<Result<Value>>,
}

/// Client for a browser debugging endpoint.
///
/// Holds the browser-level WebSocket; page commands are routed through it
/// with a flattened session id obtained from `attach_page`.
pub struct CdpClient {
    /// HTTP endpoint for page discovery.
    http_endpoint: String,
    /// WebSocket sender.
    ws_tx: Arc<tokio::sync::Mutex<WsSink>>,
    /// Command ID counter.
    request_id: AtomicU64,
    /// Commands waiting for responses.
    pending: Arc<Mutex<HashMap<u64, PendingRequest>>>,
    /// Background receive task.
    _recv_task: tokio::task::JoinHandle<()>,
}

impl CdpClient {
    /// Connect to the browser at the given debugging endpoint
    /// (e.g. "http://localhost:9222").
    pub async fn connect(endpoint: &str) -> Result<Self> {
        let http_endpoint = endpoint.trim_end_matches('/').to_string();

        let version_url = format!("{}/json/version", http_endpoint);
        debug!("Fetching browser version from {}", version_url);

        let version: BrowserVersion = reqwest::get(&version_url)
            .await
            .map_err(|e| AutopressError::Browser(format!("Browser not reachable at {}: {}", endpoint, e)))?
            .json()
            .await
            .map_err(|e| AutopressError::Browser(format!("Unexpected version response: {}", e)))?;

        debug!("Connected to browser: {}", version.browser);

        let (ws_stream, _) = tokio_tungstenite::connect_async(&version.web_socket_debugger_url)
            .await
            .map_err(|e| AutopressError::Browser(format!("WebSocket connect failed: {}", e)))?;

        let (ws_sink, ws_source) = ws_stream.split();
        let pending: Arc<Mutex<HashMap<u64, PendingRequest>>> = Arc::new(Mutex::new(HashMap::new()));

        let recv_task = {
            let pending = pending.clone();
            tokio::spawn(async move {
                Self::receive_loop(ws_source, pending).await;
            })
        };

        Ok(Self {
            http_endpoint,
            ws_tx: Arc::new(tokio::sync::Mutex::new(ws_sink)),
            request_id: AtomicU64::new(1),
            pending,
            _recv_task: recv_task,
        })
    }

    /// WebSocket receive loop: route responses to their pending commands,
    /// drop protocol events on the floor.
    async fn receive_loop(mut ws_source: WsSource, pending: Arc<Mutex<HashMap<u64, PendingRequest>>>) {
        while let Some(msg) = ws_source.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    trace!("CDP recv: {}", text);
                    match serde_json::from_str::<CdpResponse>(&text) {
                        Ok(resp) => {
                            if let Some(id) = resp.id {
                                let pending_req = pending.lock().remove(&id);
                                if let Some(req) = pending_req {
                                    let result = if let Some(err) = resp.error {
                                        Err(AutopressError::Browser(format!(
                                            "CDP error {}: {}",
                                            err.code, err.message
                                        )))
                                    } else {
                                        Ok(resp.result.unwrap_or(Value::Null))
                                    };
                                    let _ = req.tx.send(result);
                                }
                            } else if let Some(method) = resp.method {
                                trace!("Ignoring CDP event: {}", method);
                            }
                        }
                        Err(e) => {
                            warn!("Failed to parse CDP message: {}", e);
                        }
                    }
                }
                Ok(Message::Close(_)) => {
                    debug!("Browser WebSocket closed");
                    break;
                }
                Err(e) => {
                    error!("Browser WebSocket error: {}", e);
                    break;
                }
                _ => {}
            }
        }
    }

    /// Send a CDP command and wait for its response.
    pub async fn call(&self, method: &str, params: Option<Value>, session_id: Option<&str>) -> Result<Value> {
        let id = self.request_id.fetch_add(1, Ordering::SeqCst);

        let request = CdpRequest {
            id,
            method: method.to_string(),
            params,
            session_id: session_id.map(|s| s.to_string()),
        };

        let serialized = serde_json::to_string(&request)?;
        trace!("CDP send: {}", serialized);

        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id, PendingRequest { tx });

        {
            let mut ws = self.ws_tx.lock().await;
            ws.send(Message::Text(serialized.into())).await?;
        }

        match tokio::time::timeout(COMMAND_TIMEOUT, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(AutopressError::Browser("Browser connection closed".to_string())),
            Err(_) => {
                self.pending.lock().remove(&id);
                Err(AutopressError::Browser(format!("{} timed out", method)))
            }
        }
    }

    /// List open page targets.
    pub async fn list_pages(&self) -> Result<Vec<PageInfo>> {
        let url = format!("{}/json/list", self.http_endpoint);
        let pages: Vec<PageInfo> = reqwest::get(&url).await?.json().await?;
        Ok(pages)
    }

    /// Find the editor tab: the first page target whose URL contains the
    /// filter. An empty filter matches the first page target.
    pub async fn find_page(&self, url_filter: &str) -> Result<PageInfo> {
        let pages = self.list_pages().await?;
        pages
            .into_iter()
            .find(|p| p.page_type == "page" && p.url.contains(url_filter))
            .ok_or_else(|| {
                AutopressError::Browser(format!(
                    "No open page matches {:?}; is the translation editor open?",
                    url_filter
                ))
            })
    }

    /// Attach to a page target and return the flattened session id.
    pub async fn attach_page(&self, target_id: &str) -> Result<String> {
        let result = self
            .call(
                "Target.attachToTarget",
                Some(json!({
                    "targetId": target_id,
                    "flatten": true
                })),
                None,
            )
            .await?;

        let session_id = result["sessionId"]
            .as_str()
            .ok_or_else(|| AutopressError::Browser("Missing sessionId in attach response".to_string()))?
            .to_string();

        self.call("Runtime.enable", None, Some(&session_id)).await?;

        debug!("Attached to page {} (session {})", target_id, session_id);
        Ok(session_id)
    }

    /// Evaluate a JavaScript expression in the page and return its value.
    pub async fn evaluate(&self, session_id: &str, expression: &str) -> Result<Value> {
        let result = self
            .call(
                "Runtime.evaluate",
                Some(json!({
                    "expression": expression,
                    "returnByValue": true,
                    "awaitPromise": true,
                })),
                Some(session_id),
            )
            .await?;

        if let Some(exception) = result.get("exceptionDetails") {
            let text = exception["text"].as_str().unwrap_or("Unknown error");
            return Err(AutopressError::Browser(format!("Page script failed: {}", text)));
        }

        Ok(result["result"]["value"].clone())
    }
}

impl Drop for CdpClient {
    fn drop(&mut self) {
        self._recv_task.abort();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU64, Ordering};

    #[test]
    fn test_request_id_increment() {
        let id = AtomicU64::new(1);
        assert_eq!(id.fetch_add(1, Ordering::SeqCst), 1);
        assert_eq!(id.fetch_add(1, Ordering::SeqCst), 2);
        assert_eq!(id.load(Ordering::SeqCst), 3);
    }
}
