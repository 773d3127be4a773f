//! Messages delivered on a run's realtime channel.
//!
//! The service sends JSON objects with at least a `type` field. Known types
//! are decoded into [`ChannelMessage`] variants; anything else, including
//! known types with malformed fields, lands in [`ChannelMessage::Unknown`]
//! together with the raw structure so it can still be displayed.

use serde::{Deserialize, Deserializer};
use serde_json::{json, Value};

use crate::error::CoreError;

/// A decoded channel message.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelMessage {
    /// Informational line.
    Info { message: Option<String> },
    /// Error line reported by the service. Not terminal.
    Error { message: Option<String> },
    /// A step produced an artifact (usually a screenshot).
    Artifact {
        step: Option<String>,
        url: Option<String>,
    },
    /// Terminal event. `ok` is authoritative for the run outcome.
    RunEnd { ok: bool },
    /// The executor started the run.
    RunStart { message: Option<String> },
    /// A scenario step started.
    StepStart {
        step: Option<String>,
        action: Option<String>,
    },
    /// A scenario step finished.
    StepEnd {
        step: Option<String>,
        ok: bool,
        error: Option<String>,
    },
    /// A scenario step raised.
    StepError {
        step: Option<String>,
        error: Option<String>,
    },
    /// Unrecognized or malformed message.
    Unknown { kind: Option<String>, raw: Value },
}

/// Tagged wire form of the known message types.
#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Wire {
    Info {
        #[serde(default, deserialize_with = "label")]
        message: Option<String>,
    },
    Error {
        #[serde(default, deserialize_with = "label")]
        message: Option<String>,
    },
    Artifact {
        #[serde(default, deserialize_with = "label")]
        step: Option<String>,
        #[serde(default, deserialize_with = "label")]
        url: Option<String>,
    },
    RunEnd {
        #[serde(default, deserialize_with = "truthy")]
        ok: bool,
    },
    RunStart {
        #[serde(default, deserialize_with = "label")]
        message: Option<String>,
    },
    StepStart {
        #[serde(default, deserialize_with = "label")]
        step: Option<String>,
        #[serde(default, deserialize_with = "label")]
        action: Option<String>,
    },
    StepEnd {
        #[serde(default, deserialize_with = "label")]
        step: Option<String>,
        #[serde(default, deserialize_with = "truthy")]
        ok: bool,
        #[serde(default, deserialize_with = "label")]
        error: Option<String>,
    },
    StepError {
        #[serde(default, deserialize_with = "label")]
        step: Option<String>,
        #[serde(default, deserialize_with = "label")]
        error: Option<String>,
    },
}

impl From<Wire> for ChannelMessage {
    fn from(wire: Wire) -> Self {
        match wire {
            Wire::Info { message } => Self::Info { message },
            Wire::Error { message } => Self::Error { message },
            Wire::Artifact { step, url } => Self::Artifact { step, url },
            Wire::RunEnd { ok } => Self::RunEnd { ok },
            Wire::RunStart { message } => Self::RunStart { message },
            Wire::StepStart { step, action } => Self::StepStart { step, action },
            Wire::StepEnd { step, ok, error } => Self::StepEnd { step, ok, error },
            Wire::StepError { step, error } => Self::StepError { step, error },
        }
    }
}

/// Accepts strings, numbers and booleans as display labels; null is absent.
fn label<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}

/// Loose truthiness, so `"ok": 1` is not silently turned into an unknown event.
fn truthy<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => false,
        Value::Bool(b) => b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    })
}

impl ChannelMessage {
    /// Decode an already-parsed JSON value. Never fails.
    pub fn from_value(raw: &Value) -> Self {
        match serde_json::from_value::<Wire>(raw.clone()) {
            Ok(wire) => wire.into(),
            Err(_) => Self::Unknown {
                kind: raw.get("type").and_then(Value::as_str).map(str::to_owned),
                raw: raw.clone(),
            },
        }
    }

    /// The `type` label of this message.
    pub fn kind(&self) -> &str {
        match self {
            Self::Info { .. } => "info",
            Self::Error { .. } => "error",
            Self::Artifact { .. } => "artifact",
            Self::RunEnd { .. } => "run_end",
            Self::RunStart { .. } => "run_start",
            Self::StepStart { .. } => "step_start",
            Self::StepEnd { .. } => "step_end",
            Self::StepError { .. } => "step_error",
            Self::Unknown { kind, .. } => kind.as_deref().unwrap_or("unknown"),
        }
    }

    /// Returns the terminal outcome if this is a `run_end`.
    pub fn terminal_outcome(&self) -> Option<bool> {
        match self {
            Self::RunEnd { ok } => Some(*ok),
            _ => None,
        }
    }
}

/// A channel payload: the decoded message plus the structure it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub message: ChannelMessage,
    pub raw: Value,
}

impl InboundMessage {
    /// Parse a text frame. Fails only if the text is not a JSON object.
    pub fn parse(text: &str) -> Result<Self, CoreError> {
        let raw: Value =
            serde_json::from_str(text).map_err(|e| CoreError::Parse(e.to_string()))?;
        if !raw.is_object() {
            return Err(CoreError::Parse(format!(
                "expected a JSON object, got: {}",
                truncate_for_error(text)
            )));
        }
        Ok(Self::from_value(raw))
    }

    pub fn from_value(raw: Value) -> Self {
        Self {
            message: ChannelMessage::from_value(&raw),
            raw,
        }
    }

    /// A client-originated `info` line.
    pub fn info(text: impl Into<String>) -> Self {
        Self::from_value(json!({ "type": "info", "message": text.into() }))
    }

    /// A client-originated `error` line.
    pub fn error(text: impl Into<String>) -> Self {
        Self::from_value(json!({ "type": "error", "message": text.into() }))
    }

    /// One-line rendering: the raw `message`, else the raw `step`, else a
    /// JSON dump. Applies to every type, recognized or not.
    pub fn summary(&self) -> String {
        display_label(self.raw.get("message"))
            .or_else(|| display_label(self.raw.get("step")))
            .unwrap_or_else(|| self.raw.to_string())
    }
}

/// A field usable as a summary: non-empty strings, non-zero numbers and `true`.
fn display_label(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) if n.as_f64().is_some_and(|f| f != 0.0) => Some(n.to_string()),
        Value::Bool(true) => Some("true".to_owned()),
        other @ (Value::Array(_) | Value::Object(_)) => Some(other.to_string()),
        _ => None,
    }
}

fn truncate_for_error(text: &str) -> &str {
    match text.char_indices().nth(64) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_types() {
        let msg = InboundMessage::parse(r#"{"type":"info","message":"hello"}"#).unwrap();
        assert_eq!(
            msg.message,
            ChannelMessage::Info {
                message: Some("hello".into())
            }
        );

        let msg = InboundMessage::parse(
            r#"{"type":"artifact","step":"docs_page","url":"/artifacts/run1/1.png"}"#,
        )
        .unwrap();
        assert_eq!(
            msg.message,
            ChannelMessage::Artifact {
                step: Some("docs_page".into()),
                url: Some("/artifacts/run1/1.png".into()),
            }
        );

        let msg = InboundMessage::parse(r#"{"type":"run_end","ok":true}"#).unwrap();
        assert_eq!(msg.message.terminal_outcome(), Some(true));
    }

    #[test]
    fn test_run_end_without_ok_is_failure() {
        let msg = InboundMessage::parse(r#"{"type":"run_end"}"#).unwrap();
        assert_eq!(msg.message.terminal_outcome(), Some(false));
    }

    #[test]
    fn test_unknown_type_is_kept() {
        let msg = InboundMessage::parse(r#"{"type":"heartbeat","n":3}"#).unwrap();
        match &msg.message {
            ChannelMessage::Unknown { kind, raw } => {
                assert_eq!(kind.as_deref(), Some("heartbeat"));
                assert_eq!(raw["n"], 3);
            }
            other => panic!("expected Unknown, got {:?}", other),
        }
        assert_eq!(msg.message.kind(), "heartbeat");
        let dump = msg.summary();
        assert!(dump.contains(r#""type":"heartbeat""#));
        assert!(dump.contains(r#""n":3"#));
    }

    #[test]
    fn test_missing_type_is_unknown() {
        let msg = InboundMessage::parse(r#"{"message":"no type"}"#).unwrap();
        assert_eq!(msg.message.kind(), "unknown");
    }

    #[test]
    fn test_numeric_step_label() {
        let msg = InboundMessage::parse(r#"{"type":"step_start","step":2,"action":"click"}"#)
            .unwrap();
        assert_eq!(
            msg.message,
            ChannelMessage::StepStart {
                step: Some("2".into()),
                action: Some("click".into()),
            }
        );
        assert_eq!(msg.summary(), "2");
    }

    #[test]
    fn test_parse_failures() {
        assert!(InboundMessage::parse("not json").is_err());
        assert!(InboundMessage::parse("[1,2,3]").is_err());
    }

    #[test]
    fn test_summary_falls_back_to_dump() {
        let msg = InboundMessage::parse(r#"{"type":"run_end","ok":false}"#).unwrap();
        let dump = msg.summary();
        assert!(dump.contains(r#""ok":false"#));
        assert!(dump.contains(r#""type":"run_end""#));
    }

    #[test]
    fn test_summary_reads_message_of_any_type() {
        let msg = InboundMessage::parse(r#"{"type":"progress","message":"50% done"}"#).unwrap();
        assert_eq!(msg.message.kind(), "progress");
        assert_eq!(msg.summary(), "50% done");

        let msg = InboundMessage::parse(r#"{"message":"no type either"}"#).unwrap();
        assert_eq!(msg.summary(), "no type either");
    }

    #[test]
    fn test_summary_prefers_step_over_error() {
        let msg = InboundMessage::parse(r#"{"type":"step_end","step":"login","ok":false,"error":"timeout"}"#)
            .unwrap();
        assert_eq!(msg.summary(), "login");

        let msg = InboundMessage::parse(r#"{"type":"step_error","step":"login","error":"timeout"}"#)
            .unwrap();
        assert_eq!(msg.summary(), "login");
    }

    #[test]
    fn test_summary_skips_empty_message() {
        let msg = InboundMessage::parse(r#"{"type":"info","message":"","step":"checkout"}"#).unwrap();
        assert_eq!(msg.summary(), "checkout");
    }

    #[test]
    fn test_local_lines() {
        let msg = InboundMessage::error("channel error");
        assert_eq!(msg.message.kind(), "error");
        assert_eq!(msg.summary(), "channel error");
    }
}
