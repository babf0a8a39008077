//! HTTP client for the hosted planner service.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use url::Url;

use super::error::PlannerError;
use super::{
    ActionDecision, ActionRequest, AgentPlanner, DelegationDecision, DelegationRequest,
    WorkerPlanner,
};
use crate::config::Config;
use crate::error::{Error, Result};

/// Planner backed by the hosted decision API.
///
/// Requests are posted as `{"data": request}` with the API key in the
/// `x-api-key` header; responses carry the decision under `data`. Retries are
/// not done here; callers wrap calls in [`with_retry`](super::with_retry).
#[derive(Clone)]
pub struct HttpPlanner {
    client: reqwest::Client,
    base_url: Url,
    api_key: String,
}

#[derive(Serialize)]
struct RequestEnvelope<'a, T> {
    data: &'a T,
}

#[derive(Deserialize)]
struct ResponseEnvelope<T> {
    data: T,
}

impl HttpPlanner {
    pub fn new(config: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| Error::InvalidConfig(format!("failed to build HTTP client: {}", e)))?;

        let base_url = Url::parse(config.base_url.trim_end_matches('/'))
            .map_err(|e| Error::InvalidConfig(format!("invalid planner URL: {}", e)))?;
        if base_url.cannot_be_a_base() {
            return Err(Error::InvalidConfig(format!(
                "planner URL cannot take a path: {}",
                base_url
            )));
        }

        Ok(Self {
            client,
            base_url,
            api_key: config.api_key.clone(),
        })
    }

    /// Base URL with `segments` appended, each percent-encoded as one segment.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        // Always Ok: `new` rejects URLs that cannot be a base.
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// Parse Retry-After header if present.
    fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
        headers
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<u64>().ok())
            .map(Duration::from_secs)
    }

    async fn post<Req, Resp>(&self, url: Url, body: &Req) -> std::result::Result<Resp, PlannerError>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        tracing::debug!("POST {}", url);

        let response = self
            .client
            .post(url)
            .header("x-api-key", &self.api_key)
            .json(&RequestEnvelope { data: body })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    PlannerError::network_error(format!("Request timeout: {}", e))
                } else if e.is_connect() {
                    PlannerError::network_error(format!("Connection failed: {}", e))
                } else {
                    PlannerError::network_error(format!("Request failed: {}", e))
                }
            })?;

        let status = response.status();
        let retry_after = Self::parse_retry_after(response.headers());
        let text = response.text().await.map_err(|e| {
            PlannerError::network_error(format!("Failed to read response body: {}", e))
        })?;

        if !status.is_success() {
            return Err(PlannerError::from_status(status.as_u16(), text, retry_after));
        }

        let envelope: ResponseEnvelope<Resp> = serde_json::from_str(&text)
            .map_err(|e| PlannerError::parse_error(format!("{}: {}", e, truncate(&text, 200))))?;
        Ok(envelope.data)
    }
}

impl std::fmt::Debug for HttpPlanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpPlanner")
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

#[async_trait]
impl WorkerPlanner for HttpPlanner {
    async fn next_action(
        &self,
        request: &ActionRequest,
    ) -> std::result::Result<ActionDecision, PlannerError> {
        let url = self.endpoint(&["workers", request.worker_id.as_str(), "actions"]);
        self.post(url, request).await
    }
}

#[async_trait]
impl AgentPlanner for HttpPlanner {
    async fn next_delegation(
        &self,
        request: &DelegationRequest,
    ) -> std::result::Result<DelegationDecision, PlannerError> {
        let url = self.endpoint(&["agents", request.agent.as_str(), "actions"]);
        self.post(url, request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::PlannerErrorKind;
    use crate::task::Task;
    use serde_json::{json, Map};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    /// Serve exactly one HTTP response and hand back the raw request.
    async fn serve_once(
        status_line: &'static str,
        headers: &'static str,
        body: String,
    ) -> (String, JoinHandle<String>) {
        let response = format!(
            "HTTP/1.1 {}\r\ncontent-type: application/json\r\n{}content-length: {}\r\nconnection: close\r\n\r\n{}",
            status_line,
            headers,
            body.len(),
            body
        );
        serve_raw(response).await
    }

    /// Write `response` verbatim to the first connection, then close it.
    async fn serve_raw(response: String) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let request = read_request(&mut socket).await;
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            request
        });

        (format!("http://{}/v2", addr), handle)
    }

    async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);

            let text = String::from_utf8_lossy(&buf).to_string();
            if let Some(header_end) = text.find("\r\n\r\n") {
                let content_length = text[..header_end]
                    .lines()
                    .find_map(|line| {
                        let (name, value) = line.split_once(':')?;
                        if name.eq_ignore_ascii_case("content-length") {
                            value.trim().parse::<usize>().ok()
                        } else {
                            None
                        }
                    })
                    .unwrap_or(0);
                if buf.len() >= header_end + 4 + content_length {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&buf).to_string()
    }

    fn planner_for(base_url: String) -> HttpPlanner {
        let mut config = Config::new("test-key");
        config.base_url = base_url;
        config.request_timeout = Duration::from_secs(5);
        HttpPlanner::new(&config).unwrap()
    }

    fn action_request() -> ActionRequest {
        ActionRequest {
            worker_id: "weather".to_string(),
            description: "Reports the weather".to_string(),
            instruction: None,
            state: Map::new(),
            history: Vec::new(),
            functions: Vec::new(),
            task: Task::new("check NYC"),
            step: 0,
        }
    }

    #[tokio::test]
    async fn test_next_action_posts_envelope_and_parses_decision() {
        let body = json!({
            "data": {
                "status": "continue",
                "fn_id": "act-1",
                "name": "get_weather",
                "arguments": {"city": "NYC"}
            }
        })
        .to_string();
        let (base_url, server) = serve_once("200 OK", "", body).await;

        let decision = planner_for(base_url)
            .next_action(&action_request())
            .await
            .unwrap();
        let raw_request = server.await.unwrap();

        assert!(raw_request.starts_with("POST /v2/workers/weather/actions"));
        assert!(raw_request.to_lowercase().contains("x-api-key: test-key"));
        assert!(raw_request.contains(r#""data":{"#));
        assert!(matches!(decision, ActionDecision::Call { ref name, .. } if name == "get_weather"));
    }

    #[tokio::test]
    async fn test_rate_limit_carries_retry_after() {
        let (base_url, server) =
            serve_once("429 Too Many Requests", "retry-after: 2\r\n", "{}".to_string()).await;

        let err = planner_for(base_url)
            .next_action(&action_request())
            .await
            .unwrap_err();
        server.await.unwrap();

        assert_eq!(err.kind, PlannerErrorKind::RateLimited);
        assert_eq!(err.retry_after, Some(Duration::from_secs(2)));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_auth_and_server_errors_are_classified() {
        let (base_url, server) =
            serve_once("401 Unauthorized", "", r#"{"error":"bad key"}"#.to_string()).await;
        let err = planner_for(base_url)
            .next_action(&action_request())
            .await
            .unwrap_err();
        server.await.unwrap();
        assert_eq!(err.kind, PlannerErrorKind::Unauthorized);
        assert!(!err.is_transient());

        let (base_url, server) =
            serve_once("503 Service Unavailable", "", "{}".to_string()).await;
        let err = planner_for(base_url)
            .next_action(&action_request())
            .await
            .unwrap_err();
        server.await.unwrap();
        assert_eq!(err.kind, PlannerErrorKind::ServerError);
        assert_eq!(err.status_code, Some(503));
    }

    #[tokio::test]
    async fn test_malformed_decision_is_parse_error() {
        let body = json!({"data": {"status": "maybe"}}).to_string();
        let (base_url, server) = serve_once("200 OK", "", body).await;

        let err = planner_for(base_url)
            .next_action(&action_request())
            .await
            .unwrap_err();
        server.await.unwrap();
        assert_eq!(err.kind, PlannerErrorKind::ParseError);
    }

    #[tokio::test]
    async fn test_next_delegation_uses_agent_path() {
        let body = json!({"data": {"status": "done", "message": "all set"}}).to_string();
        let (base_url, server) = serve_once("200 OK", "", body).await;

        let request = DelegationRequest {
            agent: "forecaster".to_string(),
            goal: "keep users informed".to_string(),
            description: "weather agent".to_string(),
            state: Map::new(),
            workers: Vec::new(),
            history: Vec::new(),
            step: 0,
        };
        let decision = planner_for(base_url)
            .next_delegation(&request)
            .await
            .unwrap();
        let raw_request = server.await.unwrap();

        assert!(raw_request.starts_with("POST /v2/agents/forecaster/actions"));
        assert_eq!(decision, DelegationDecision::done("all set"));
    }

    #[tokio::test]
    async fn test_ids_are_escaped_as_single_path_segments() {
        let body = json!({"data": {"status": "done", "message": "ok"}}).to_string();
        let (base_url, server) = serve_once("200 OK", "", body).await;

        let mut request = action_request();
        request.worker_id = "weather/eu west".to_string();
        planner_for(base_url).next_action(&request).await.unwrap();
        let raw_request = server.await.unwrap();

        assert!(raw_request.starts_with("POST /v2/workers/weather%2Feu%20west/actions "));
    }

    #[tokio::test]
    async fn test_truncated_body_is_retryable_network_error() {
        let response = "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: 500\r\n\r\n{\"data\":"
            .to_string();
        let (base_url, server) = serve_raw(response).await;

        let err = planner_for(base_url)
            .next_action(&action_request())
            .await
            .unwrap_err();
        server.await.unwrap();

        assert_eq!(err.kind, PlannerErrorKind::NetworkError);
        assert!(err.is_transient());
    }
}
