//! HTTP client for OpenAI-compatible chat-completions endpoints.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::GenerationClient;
use crate::config::Config;
use crate::error::{GenerationErrorKind, GuideError, Result};

/// Maximum number of characters of an error body kept in a failure message.
const ERROR_BODY_LIMIT: usize = 200;

/// Client for Groq, OpenAI, Ollama and any other chat-completions endpoint.
///
/// Each call is a single POST to `{base_url}/chat/completions`; there is no
/// retry or backoff.
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    max_tokens: u32,
    json_mode: bool,
}

impl OpenAiCompatibleClient {
    /// Creates a client for the given endpoint.
    ///
    /// # Errors
    ///
    /// Returns `GuideError::GenerationFailure` if the HTTP client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                GuideError::generation(
                    GenerationErrorKind::Other,
                    format!("Failed to create HTTP client: {e}"),
                )
            })?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key,
            max_tokens: 3000,
            json_mode: true,
        })
    }

    /// Creates a client from the loaded configuration.
    ///
    /// The API key is read from the environment variable named by the
    /// configuration; providers without one (local Ollama) send no key.
    ///
    /// # Errors
    ///
    /// Returns an authentication `GuideError::GenerationFailure` if the API
    /// key variable is configured but unset.
    pub fn from_config(config: &Config) -> Result<Self> {
        let api_key = match config.resolved_api_key_env() {
            Some(var) => Some(std::env::var(var).map_err(|_| {
                GuideError::generation(
                    GenerationErrorKind::Authentication,
                    format!("environment variable {var} is not set"),
                )
            })?),
            None => None,
        };

        tracing::debug!(
            provider = ?config.provider,
            base_url = config.resolved_base_url(),
            model = %config.model,
            "Creating generation client"
        );

        Ok(Self::new(
            config.resolved_base_url(),
            &config.model,
            api_key,
            Duration::from_secs(config.request_timeout_secs),
        )?
        .with_max_tokens(config.max_tokens))
    }

    /// Sets the completion token limit.
    #[must_use]
    pub const fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Enables or disables the `json_object` response format.
    #[must_use]
    pub const fn with_json_mode(mut self, json_mode: bool) -> Self {
        self.json_mode = json_mode;
        self
    }

    /// The configured model name.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    fn request_body(&self, system_prompt: &str, user_prompt: &str, temperature: f32) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system_prompt},
                {"role": "user", "content": user_prompt},
            ],
            "temperature": temperature,
            "max_tokens": self.max_tokens,
        });
        if self.json_mode {
            body["response_format"] = json!({"type": "json_object"});
        }
        body
    }
}

#[async_trait]
impl GenerationClient for OpenAiCompatibleClient {
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        temperature: f32,
    ) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.request_body(system_prompt, user_prompt, temperature);

        tracing::debug!(
            model = %self.model,
            temperature,
            prompt_chars = system_prompt.len() + user_prompt.len(),
            "Sending generation request"
        );

        let mut request = self.client.post(&url).json(&body);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await.map_err(|e| {
            GuideError::generation(GenerationErrorKind::Network, format!("Request failed: {e}"))
        })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            let detail: String = detail.chars().take(ERROR_BODY_LIMIT).collect();
            tracing::debug!(status = status.as_u16(), "Generation request rejected");
            return Err(GuideError::generation(
                GenerationErrorKind::from_status(status.as_u16()),
                format!("HTTP {status}: {detail}"),
            ));
        }

        let payload: Value = response.json().await.map_err(|e| {
            GuideError::generation(
                GenerationErrorKind::InvalidResponse,
                format!("Failed to parse response body: {e}"),
            )
        })?;

        extract_content(&payload)
    }
}

/// Pulls the first choice's message content out of a chat-completions payload.
fn extract_content(payload: &Value) -> Result<String> {
    payload
        .get("choices")
        .and_then(|choices| choices.get(0))
        .and_then(|choice| choice.get("message"))
        .and_then(|message| message.get("content"))
        .and_then(Value::as_str)
        .filter(|content| !content.trim().is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            GuideError::generation(
                GenerationErrorKind::InvalidResponse,
                "response contained no message content",
            )
        })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serves one canned HTTP response and returns the base URL.
    async fn serve_once(status_line: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 16 * 1024];
            let _ = socket.read(&mut buf).await;
            let response = format!(
                "HTTP/1.1 {status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
        });

        format!("http://{addr}")
    }

    fn client(base_url: &str) -> OpenAiCompatibleClient {
        OpenAiCompatibleClient::new(base_url, "test-model", None, Duration::from_secs(5)).unwrap()
    }

    fn kind_of(err: &GuideError) -> GenerationErrorKind {
        match err {
            GuideError::GenerationFailure { kind, .. } => *kind,
            other => unreachable!("expected a generation failure, got {other}"),
        }
    }

    #[test]
    fn test_request_body_shape() {
        let client = client("http://localhost/v1/").with_max_tokens(512);
        let body = client.request_body("sys", "usr", 0.5);

        assert_eq!(body["model"], "test-model");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "usr");
        assert_eq!(body["max_tokens"], 512);
        assert_eq!(body["response_format"]["type"], "json_object");
        assert_eq!(client.base_url, "http://localhost/v1");

        let plain = client.with_json_mode(false).request_body("s", "u", 0.1);
        assert!(plain.get("response_format").is_none());
    }

    #[test]
    fn test_extract_content() {
        let payload = json!({"choices": [{"message": {"role": "assistant", "content": "{\"a\":1}"}}]});
        assert_eq!(extract_content(&payload).unwrap(), "{\"a\":1}");

        let empty = json!({"choices": []});
        let err = extract_content(&empty).unwrap_err();
        assert_eq!(kind_of(&err), GenerationErrorKind::InvalidResponse);
    }

    #[tokio::test]
    async fn test_complete_success() {
        let base = serve_once(
            "200 OK",
            r#"{"choices":[{"message":{"role":"assistant","content":"{\"approved\":true}"}}]}"#,
        )
        .await;

        let text = client(&base).complete("sys", "usr", 0.3).await.unwrap();
        assert_eq!(text, r#"{"approved":true}"#);
    }

    #[tokio::test]
    async fn test_complete_rate_limited() {
        let base = serve_once("429 Too Many Requests", r#"{"error":"slow down"}"#).await;
        let err = client(&base).complete("sys", "usr", 0.3).await.unwrap_err();

        assert_eq!(kind_of(&err), GenerationErrorKind::RateLimit);
        assert!(err.is_recoverable());
    }

    #[tokio::test]
    async fn test_complete_unauthorized() {
        let base = serve_once("401 Unauthorized", r#"{"error":"bad key"}"#).await;
        let err = client(&base).complete("sys", "usr", 0.3).await.unwrap_err();

        assert_eq!(kind_of(&err), GenerationErrorKind::Authentication);
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_complete_server_error() {
        let base = serve_once("503 Service Unavailable", "{}").await;
        let err = client(&base).complete("sys", "usr", 0.3).await.unwrap_err();
        assert_eq!(kind_of(&err), GenerationErrorKind::Server);
    }

    #[tokio::test]
    async fn test_complete_missing_content() {
        let base = serve_once("200 OK", r#"{"choices":[{"message":{"content":""}}]}"#).await;
        let err = client(&base).complete("sys", "usr", 0.3).await.unwrap_err();
        assert_eq!(kind_of(&err), GenerationErrorKind::InvalidResponse);
    }

    #[tokio::test]
    async fn test_complete_connection_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = client(&format!("http://{addr}"))
            .complete("sys", "usr", 0.3)
            .await
            .unwrap_err();
        assert_eq!(kind_of(&err), GenerationErrorKind::Network);
    }

    #[test]
    fn test_from_config_without_key_for_ollama() {
        let config = Config {
            provider: crate::config::Provider::Ollama,
            ..Config::default()
        };
        let client = OpenAiCompatibleClient::from_config(&config).unwrap();
        assert!(client.api_key.is_none());
        assert_eq!(client.base_url, "http://127.0.0.1:11434/v1");
    }

    #[test]
    fn test_from_config_missing_key_is_authentication_failure() {
        let config = Config {
            api_key_env: Some("GUIDE_TEST_KEY_THAT_IS_NEVER_SET".to_string()),
            ..Config::default()
        };
        let err = OpenAiCompatibleClient::from_config(&config).unwrap_err();
        assert_eq!(kind_of(&err), GenerationErrorKind::Authentication);
    }
}
