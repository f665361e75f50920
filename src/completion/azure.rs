//! Azure OpenAI chat-completions adapter.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;

use super::{CompletionClient, CompletionError, CompletionRequest, FatalKind, TransientKind};
use crate::config::Config;

/// Chat-completions client for an Azure OpenAI deployment.
pub struct AzureOpenAiClient {
    http: Client,
    endpoint: String,
    api_key: String,
    deployment: String,
    api_version: String,
}

impl AzureOpenAiClient {
    /// Build a client from validated configuration.
    pub fn new(config: &Config) -> Result<Self, reqwest::Error> {
        let http = Client::builder()
            .user_agent("rustysum/0.1")
            .timeout(config.request_timeout)
            .build()?;
        tracing::debug!(
            endpoint = %config.endpoint,
            deployment = %config.deployment,
            "Initialized Azure OpenAI client"
        );
        Ok(Self {
            http,
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            deployment: config.deployment.clone(),
            api_version: config.api_version.clone(),
        })
    }

    fn url(&self) -> String {
        format!(
            "{}/openai/deployments/{}/chat/completions",
            self.endpoint.trim_end_matches('/'),
            self.deployment
        )
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[async_trait]
impl CompletionClient for AzureOpenAiClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String, CompletionError> {
        let payload = json!({
            "messages": [
                { "role": "system", "content": request.instructions },
                { "role": "user", "content": request.user_content },
            ],
            "temperature": request.temperature,
            "max_tokens": request.max_output_tokens,
        });

        let response = self
            .http
            .post(self.url())
            .query(&[("api-version", self.api_version.as_str())])
            .header("api-key", &self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, body));
        }

        let bytes = response.bytes().await.map_err(classify_body_error)?;
        let body: ChatResponse = serde_json::from_slice(&bytes).map_err(|error| {
            CompletionError::fatal(
                FatalKind::MalformedResponse,
                format!("failed to decode chat completion: {error}"),
            )
        })?;

        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .unwrap_or_default();

        if content.is_empty() {
            return Err(CompletionError::EmptyResponse);
        }
        Ok(content)
    }
}

fn classify_transport_error(error: reqwest::Error) -> CompletionError {
    if error.is_timeout() {
        CompletionError::transient(TransientKind::Timeout, error.to_string())
    } else if error.is_connect() || error.is_request() {
        CompletionError::transient(TransientKind::Connection, error.to_string())
    } else {
        CompletionError::fatal(FatalKind::InvalidRequest, error.to_string())
    }
}

/// Failures while streaming the body after a successful status line.
fn classify_body_error(error: reqwest::Error) -> CompletionError {
    let message = format!("failed to read chat completion body: {error}");
    if error.is_timeout() {
        CompletionError::transient(TransientKind::Timeout, message)
    } else {
        CompletionError::transient(TransientKind::Connection, message)
    }
}

fn classify_status(status: StatusCode, body: String) -> CompletionError {
    let message = format!("Azure OpenAI returned {status}: {body}");
    match status {
        StatusCode::TOO_MANY_REQUESTS => {
            CompletionError::transient(TransientKind::RateLimited, message)
        }
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => {
            CompletionError::transient(TransientKind::Timeout, message)
        }
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            CompletionError::fatal(FatalKind::Authentication, message)
        }
        status if status.is_server_error() => {
            CompletionError::transient(TransientKind::Server, message)
        }
        _ => CompletionError::fatal(FatalKind::InvalidRequest, message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    const TRUNCATED_REPLY: &[u8] = b"HTTP/1.1 200 OK\r\n\
        Content-Type: application/json\r\n\
        Content-Length: 200\r\n\r\n\
        {\"choices\": [{\"message\": ";

    fn config(endpoint: String, request_timeout: Duration) -> Config {
        Config {
            endpoint,
            api_key: "test-key".into(),
            deployment: "gpt-test".into(),
            api_version: "2024-07-01-preview".into(),
            request_timeout,
            max_attempts: 5,
        }
    }

    fn client_for(server: &MockServer) -> AzureOpenAiClient {
        let endpoint = format!("{}/", server.base_url());
        AzureOpenAiClient::new(&config(endpoint, Duration::from_secs(5))).expect("client")
    }

    async fn read_request(socket: &mut TcpStream) {
        let mut received = Vec::new();
        let mut buffer = [0u8; 1024];
        loop {
            let read = socket.read(&mut buffer).await.expect("read request");
            if read == 0 {
                return;
            }
            received.extend_from_slice(&buffer[..read]);
            let Some(head_end) = received.windows(4).position(|w| w == b"\r\n\r\n") else {
                continue;
            };
            let head = String::from_utf8_lossy(&received[..head_end]).to_ascii_lowercase();
            let body_len = head
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|value| value.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if received.len() >= head_end + 4 + body_len {
                return;
            }
        }
    }

    /// Serves one reply that promises 200 body bytes but sends only a few, then either stalls
    /// or closes the connection.
    async fn truncated_body_server(hang_up: bool) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let address = listener.local_addr().expect("local address");
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.expect("accept");
            read_request(&mut socket).await;
            socket.write_all(TRUNCATED_REPLY).await.expect("write");
            socket.flush().await.expect("flush");
            if !hang_up {
                tokio::time::sleep(Duration::from_secs(30)).await;
            }
        });
        format!("http://{address}")
    }

    fn request() -> CompletionRequest {
        CompletionRequest {
            instructions: "Summarize meetings.".into(),
            user_content: "Alice: ship it".into(),
            temperature: 0.2,
            max_output_tokens: 900,
        }
    }

    #[tokio::test]
    async fn returns_trimmed_message_content() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/openai/deployments/gpt-test/chat/completions")
                    .query_param("api-version", "2024-07-01-preview")
                    .header("api-key", "test-key");
                then.status(200).json_body(json!({
                    "choices": [{
                        "message": { "role": "assistant", "content": "  ## Key Points\n- ship  " }
                    }]
                }));
            })
            .await;

        let client = client_for(&server);
        let text = client.complete(request()).await.expect("completion");

        mock.assert();
        assert_eq!(text, "## Key Points\n- ship");
    }

    #[tokio::test]
    async fn null_content_is_an_empty_response() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST);
                then.status(200)
                    .json_body(json!({ "choices": [{ "message": { "content": null } }] }));
            })
            .await;

        let client = client_for(&server);
        let error = client.complete(request()).await.expect_err("empty");
        assert_eq!(error, CompletionError::EmptyResponse);
    }

    #[tokio::test]
    async fn rate_limit_is_transient() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST);
                then.status(429).body("slow down");
            })
            .await;

        let client = client_for(&server);
        let error = client.complete(request()).await.expect_err("429");
        match error {
            CompletionError::Transient {
                kind: TransientKind::RateLimited,
                message,
            } => assert!(message.contains("slow down")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn unauthorized_is_fatal() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST);
                then.status(401).body("bad key");
            })
            .await;

        let client = client_for(&server);
        let error = client.complete(request()).await.expect_err("401");
        assert!(matches!(
            error,
            CompletionError::Fatal {
                kind: FatalKind::Authentication,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn unexpected_body_is_malformed() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST);
                then.status(200).json_body(json!({ "unexpected": true }));
            })
            .await;

        let client = client_for(&server);
        let error = client.complete(request()).await.expect_err("decode");
        assert!(matches!(
            error,
            CompletionError::Fatal {
                kind: FatalKind::MalformedResponse,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn stalled_body_is_a_transient_timeout() {
        let endpoint = truncated_body_server(false).await;
        let settings = config(endpoint, Duration::from_millis(500));
        let client = AzureOpenAiClient::new(&settings).expect("client");

        let error = client.complete(request()).await.expect_err("stalled");

        assert!(error.is_transient(), "unexpected error: {error}");
        assert!(matches!(
            error,
            CompletionError::Transient {
                kind: TransientKind::Timeout,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn dropped_body_is_a_transient_connection_failure() {
        let endpoint = truncated_body_server(true).await;
        let settings = config(endpoint, Duration::from_secs(5));
        let client = AzureOpenAiClient::new(&settings).expect("client");

        let error = client.complete(request()).await.expect_err("dropped");

        assert!(matches!(
            error,
            CompletionError::Transient {
                kind: TransientKind::Connection,
                ..
            }
        ));
    }

    #[test]
    fn status_classification() {
        assert!(classify_status(StatusCode::BAD_GATEWAY, String::new()).is_transient());
        assert!(classify_status(StatusCode::GATEWAY_TIMEOUT, String::new()).is_transient());
        assert!(!classify_status(StatusCode::BAD_REQUEST, String::new()).is_transient());
        assert!(!classify_status(StatusCode::FORBIDDEN, String::new()).is_transient());
    }
}
