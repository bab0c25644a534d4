use anyhow::{Context, Result};
use futures::Stream;
use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use std::time::Duration;
use tracing::{debug, error};

use crate::config::HttpConfig;
use crate::error::RelayError;
use crate::llm::stream::{StreamChunk, chunk_stream};
use crate::llm::types::{ChatMessage, ChatRequest};

/// Response header carrying the server-assigned conversation thread.
pub const THREAD_ID_HEADER: &str = "lb-thread-id";

pub fn build_http_client(cfg: &HttpConfig) -> Result<reqwest::Client> {
    let mut builder =
        reqwest::Client::builder().connect_timeout(Duration::from_millis(cfg.connect_timeout_ms));
    if let Some(ms) = cfg.request_timeout_ms {
        builder = builder.timeout(Duration::from_millis(ms));
    }
    builder.build().context("build http client")
}

pub fn bearer_headers(api_key: &str) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    let mut auth = HeaderValue::from_str(&format!("Bearer {api_key}"))
        .context("credential is not a valid header value")?;
    auth.set_sensitive(true);
    headers.insert(AUTHORIZATION, auth);
    Ok(headers)
}

#[derive(Debug)]
pub struct AgentResponse {
    pub thread_id: Option<String>,
    response: reqwest::Response,
}

impl AgentResponse {
    pub fn into_chunks(self) -> impl Stream<Item = StreamChunk> {
        chunk_stream(self.response.bytes_stream())
    }
}

/// Client for the main customer-service agent.
#[derive(Debug, Clone)]
pub struct AgentClient {
    pub endpoint: String,
    api_key: String,
    inner: reqwest::Client,
}

impl AgentClient {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>, inner: reqwest::Client) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            inner,
        }
    }

    /// Sends one user message and returns the streaming reply.
    ///
    /// Fails with [`RelayError::MainStatus`] on a non-2xx status and with
    /// [`RelayError::MissingBody`] when the reply has no body to stream.
    pub async fn send(&self, query: &str, thread_id: Option<&str>) -> Result<AgentResponse> {
        let req = ChatRequest {
            thread_id: thread_id.map(str::to_string),
            messages: vec![ChatMessage::user(query)],
        };

        if let Ok(payload) = serde_json::to_string_pretty(&req) {
            debug!(payload=%payload, endpoint=%self.endpoint, "sending chat payload (stream)");
        }

        let resp = self
            .inner
            .post(&self.endpoint)
            .headers(bearer_headers(&self.api_key)?)
            .json(&req)
            .send()
            .await
            .context("send chat request (stream)")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            error!(status=%status.as_u16(), body=%body, "main agent non-success status");
            return Err(RelayError::MainStatus { status, body }.into());
        }
        if status == StatusCode::NO_CONTENT || resp.content_length() == Some(0) {
            return Err(RelayError::MissingBody.into());
        }

        let thread_id = resp
            .headers()
            .get(THREAD_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(str::to_string);
        debug!(?thread_id, "main agent response received");

        Ok(AgentResponse {
            thread_id,
            response: resp,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use httptest::{Expectation, Server, matchers::*, responders::*};
    use serde_json::json;

    const SSE_BODY: &str = "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"hi\"}}]}\n\ndata: [DONE]\n";

    fn client_for(server: &Server) -> AgentClient {
        AgentClient::new(server.url_str("/chat"), "main-key", reqwest::Client::new())
    }

    #[tokio::test]
    async fn send_returns_thread_id_and_chunks() {
        let server = Server::run();
        server.expect(
            Expectation::matching(all_of![
                request::method_path("POST", "/chat"),
                request::headers(contains(key("authorization"))),
                request::body(json_decoded(eq(json!({
                    "messages": [{"role": "user", "content": "hello"}]
                })))),
            ])
            .respond_with(
                status_code(200)
                    .append_header(THREAD_ID_HEADER, "thread-7")
                    .body(SSE_BODY),
            ),
        );

        let resp = client_for(&server).send("hello", None).await.unwrap();
        assert_eq!(resp.thread_id.as_deref(), Some("thread-7"));
        let chunks: Vec<StreamChunk> = resp.into_chunks().collect().await;
        assert_eq!(
            chunks,
            vec![StreamChunk::Content("hi".into()), StreamChunk::End]
        );
    }

    #[tokio::test]
    async fn send_includes_thread_id_when_known() {
        let server = Server::run();
        server.expect(
            Expectation::matching(all_of![
                request::method_path("POST", "/chat"),
                request::body(json_decoded(eq(json!({
                    "threadId": "thread-7",
                    "messages": [{"role": "user", "content": "again"}]
                })))),
            ])
            .respond_with(status_code(200).body(SSE_BODY)),
        );

        let resp = client_for(&server).send("again", Some("thread-7")).await.unwrap();
        assert!(resp.thread_id.is_none());
    }

    #[tokio::test]
    async fn send_non_success_is_main_status_error() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("POST", "/chat"))
                .respond_with(status_code(401).body("bad key")),
        );
        let err = client_for(&server).send("hello", None).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RelayError>(),
            Some(RelayError::MainStatus { status, .. }) if status.as_u16() == 401
        ));
        assert!(format!("{err}").contains("bad key"));
    }

    #[tokio::test]
    async fn send_empty_body_is_missing_body() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("POST", "/chat"))
                .respond_with(status_code(204)),
        );
        let err = client_for(&server).send("hello", None).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RelayError>(),
            Some(RelayError::MissingBody)
        ));
    }

    #[test]
    fn bearer_headers_marks_credential_sensitive() {
        let headers = bearer_headers("k").unwrap();
        let auth = headers.get(AUTHORIZATION).unwrap();
        assert_eq!(auth.to_str().unwrap(), "Bearer k");
        assert!(auth.is_sensitive());
        assert!(bearer_headers("bad\nkey").is_err());
    }

    #[test]
    fn build_http_client_with_timeout() {
        let cfg = HttpConfig {
            connect_timeout_ms: 100,
            request_timeout_ms: Some(1_000),
        };
        assert!(build_http_client(&cfg).is_ok());
    }
}
