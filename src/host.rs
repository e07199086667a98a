//! Host-facing types: the events the host delivers and the client capability
//! the reactor calls back into.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Service name attached to every log record sent to the host.
pub const SERVICE_NAME: &str = "auto-continue";

/// Event type the host emits when a session stops producing activity.
pub const SESSION_IDLE: &str = "session.idle";

/// An event delivered by the host, reduced to what the reactor distinguishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    SessionIdle { session_id: String },
    Other { kind: String },
}

#[derive(Debug, Error)]
pub enum EventError {
    #[error("invalid event payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("session.idle event without properties.sessionID")]
    MissingSessionId,
}

/// Wire shape: `{"type": "...", "properties": {...}}`.
#[derive(Debug, Deserialize)]
struct RawEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    properties: Value,
}

impl HostEvent {
    pub fn idle(session_id: impl Into<String>) -> Self {
        HostEvent::SessionIdle {
            session_id: session_id.into(),
        }
    }

    /// Decode one JSON event payload from the host's event stream.
    pub fn from_json(payload: &str) -> Result<Self, EventError> {
        let raw: RawEvent = serde_json::from_str(payload)?;
        if raw.kind != SESSION_IDLE {
            return Ok(HostEvent::Other { kind: raw.kind });
        }
        let session_id = raw
            .properties
            .get("sessionID")
            .and_then(Value::as_str)
            .ok_or(EventError::MissingSessionId)?;
        Ok(HostEvent::idle(session_id))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Error,
}

/// Body of a host log record.
#[derive(Debug, Clone, Serialize)]
pub struct LogRecord<'a> {
    pub service: &'static str,
    pub level: LogLevel,
    pub message: &'a str,
}

/// One part of a prompt submitted into a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PromptPart {
    Text { text: String },
}

/// Failure reported by the prompt-submission transport.
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("host returned {status}: {body}")]
    Status { status: u16, body: String },
}

/// Capabilities the host exposes to the reactor.
#[async_trait]
pub trait HostClient: Send + Sync {
    /// Write a record to the host's log. Best-effort; never fails.
    async fn log(&self, level: LogLevel, message: &str);

    /// Submit a prompt into `session_id` without waiting for the agent's reply.
    async fn prompt_async(&self, session_id: &str, parts: &[PromptPart])
        -> Result<(), SubmitError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_idle_event() {
        let event =
            HostEvent::from_json(r#"{"type":"session.idle","properties":{"sessionID":"ses_1"}}"#)
                .unwrap();
        assert_eq!(event, HostEvent::idle("ses_1"));
    }

    #[test]
    fn test_parse_other_event_ignores_properties() {
        let event = HostEvent::from_json(
            r#"{"type":"message.updated","properties":{"info":{"id":"msg_1"}}}"#,
        )
        .unwrap();
        assert_eq!(
            event,
            HostEvent::Other {
                kind: "message.updated".to_string()
            }
        );
    }

    #[test]
    fn test_parse_event_without_properties() {
        let event = HostEvent::from_json(r#"{"type":"server.connected"}"#).unwrap();
        assert!(matches!(event, HostEvent::Other { .. }));
    }

    #[test]
    fn test_idle_event_without_session_id_is_rejected() {
        let err = HostEvent::from_json(r#"{"type":"session.idle","properties":{}}"#).unwrap_err();
        assert!(matches!(err, EventError::MissingSessionId));
    }

    #[test]
    fn test_non_json_payload_is_rejected() {
        assert!(matches!(
            HostEvent::from_json("not json").unwrap_err(),
            EventError::Json(_)
        ));
    }

    #[test]
    fn test_log_record_wire_shape() {
        let record = LogRecord {
            service: SERVICE_NAME,
            level: LogLevel::Error,
            message: "boom",
        };
        assert_eq!(
            serde_json::to_value(&record).unwrap(),
            serde_json::json!({"service": "auto-continue", "level": "error", "message": "boom"})
        );
    }

    #[test]
    fn test_prompt_part_wire_shape() {
        let part = PromptPart::Text {
            text: "continue".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&part).unwrap(),
            serde_json::json!({"type": "text", "text": "continue"})
        );
    }
}
