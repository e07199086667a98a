use crate::config::ServerConfig;
use crate::host::{
    HostClient, HostEvent, LogLevel, LogRecord, PromptPart, SubmitError, SERVICE_NAME,
};
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use reqwest::header::ACCEPT;
use reqwest::{Method, RequestBuilder};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Client for a running opencode server.
///
/// Talks to three endpoints:
///   GET  /event                      Server-Sent Events, one JSON event per frame
///   POST /log                        {service, level, message}
///   POST /session/{id}/prompt_async  {parts: [{type: "text", text}]}
///
/// When a project directory is configured it is sent as `?directory=` on
/// every request so the server resolves the right instance.
pub struct OpencodeClient {
    http: reqwest::Client,
    base_url: String,
    directory: Option<String>,
    request_timeout: Duration,
}

#[derive(Debug, Error)]
pub enum OpencodeError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("request to opencode failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("opencode returned {status} for {path}")]
    Status { status: u16, path: &'static str },
}

/// Stream of decoded host events. Ends when the server closes the connection.
pub type EventStream = BoxStream<'static, Result<HostEvent, OpencodeError>>;

#[derive(Serialize)]
struct PromptBody<'a> {
    parts: &'a [PromptPart],
}

impl OpencodeClient {
    pub fn new(config: &ServerConfig) -> Result<Self, OpencodeError> {
        // No overall timeout on the client: the event stream stays open
        // indefinitely. Per-request timeouts are applied to the short calls.
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(OpencodeError::Client)?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            directory: config
                .directory
                .as_ref()
                .map(|d| d.to_string_lossy().into_owned()),
            request_timeout: Duration::from_secs(config.request_timeout_secs),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self
            .http
            .request(method, format!("{}{}", self.base_url, path));
        match &self.directory {
            Some(dir) => builder.query(&[("directory", dir)]),
            None => builder,
        }
    }

    /// Open the server's event stream.
    ///
    /// Frames that are not valid events (including `session.idle` without a
    /// session id) are skipped.
    pub async fn subscribe(&self) -> Result<EventStream, OpencodeError> {
        let response = self
            .request(Method::GET, "/event")
            .header(ACCEPT, "text/event-stream")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(OpencodeError::Status {
                status: response.status().as_u16(),
                path: "/event",
            });
        }
        tracing::debug!(base_url = %self.base_url, "event stream connected");

        let mut decoder = SseDecoder::default();
        let events = response
            .bytes_stream()
            .map(move |chunk| match chunk {
                Ok(bytes) => decoder
                    .push(&bytes)
                    .into_iter()
                    .filter_map(|data| match HostEvent::from_json(&data) {
                        Ok(event) => Some(Ok(event)),
                        Err(e) => {
                            tracing::debug!(error = %e, data = %data, "skipping malformed event");
                            None
                        }
                    })
                    .collect::<Vec<_>>(),
                Err(e) => vec![Err(OpencodeError::Request(e))],
            })
            .flat_map(stream::iter)
            .boxed();

        Ok(events)
    }
}

#[async_trait]
impl HostClient for OpencodeClient {
    async fn log(&self, level: LogLevel, message: &str) {
        let record = LogRecord {
            service: SERVICE_NAME,
            level,
            message,
        };
        let result = self
            .request(Method::POST, "/log")
            .timeout(self.request_timeout)
            .json(&record)
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {}
            Ok(response) => {
                tracing::warn!(status = response.status().as_u16(), "host log rejected");
            }
            Err(e) => tracing::warn!(error = %e, "failed to write host log"),
        }
    }

    async fn prompt_async(
        &self,
        session_id: &str,
        parts: &[PromptPart],
    ) -> Result<(), SubmitError> {
        let response = self
            .request(Method::POST, &format!("/session/{session_id}/prompt_async"))
            .timeout(self.request_timeout)
            .json(&PromptBody { parts })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SubmitError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

/// Incremental Server-Sent Events decoder.
///
/// Feed raw body chunks with `push`; complete frames come back as their
/// joined `data` payloads. Partial lines are held until the next chunk.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buf: Vec<u8>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);
        let mut frames = Vec::new();

        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.buf.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(&['\n', '\r'][..]);

            if line.is_empty() {
                if !self.data.is_empty() {
                    frames.push(self.data.join("\n"));
                    self.data.clear();
                }
                continue;
            }
            // Comment / keep-alive
            if line.starts_with(':') {
                continue;
            }

            let (field, value) = match line.split_once(':') {
                Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
                None => (line, ""),
            };
            if field == "data" {
                self.data.push(value.to_string());
            }
        }

        frames
    }
}
