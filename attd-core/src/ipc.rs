//! Wire protocol between `att` clients and the `attd` daemon.
//!
//! One request per connection, no framing: the client writes a single JSON object
//! `{"command": ..., "data": {...}}` and the daemon answers with plain text lines.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

/// Maximum number of bytes the daemon reads from a connection.
pub const MAX_REQUEST_BYTES: usize = 1024;

/// Untyped request as it arrives on the socket.
#[derive(Debug, Serialize, Deserialize)]
pub struct RequestEnvelope {
    pub command: String,
    #[serde(default)]
    pub data: Map<String, Value>,
}

/// A validated client request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start {
        work: String,
        slack_id: String,
        api_key: String,
    },
    Track {
        slack_id: String,
        api_key: String,
    },
    Untrack {
        slack_id: String,
    },
}

/// Protocol failures. The `Display` text is the line sent back to the client.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Failed to parse input as JSON: {0}")]
    Decode(String),

    #[error("Unknown command")]
    UnknownCommand(String),

    #[error("Invalid or missing '{0}' value")]
    InvalidField(&'static str),
}

impl Command {
    /// Decode and validate one raw request.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let envelope: RequestEnvelope =
            serde_json::from_slice(bytes).map_err(|e| ProtocolError::Decode(e.to_string()))?;
        Self::from_envelope(envelope)
    }

    pub fn from_envelope(envelope: RequestEnvelope) -> Result<Self, ProtocolError> {
        let data = &envelope.data;
        match envelope.command.as_str() {
            "start" => Ok(Command::Start {
                work: required(data, "work")?,
                slack_id: required(data, "slack_id")?,
                api_key: required(data, "api_key")?,
            }),
            "track" => Ok(Command::Track {
                slack_id: required(data, "slack_id")?,
                api_key: required(data, "api_key")?,
            }),
            "untrack" => Ok(Command::Untrack {
                slack_id: required(data, "slack_id")?,
            }),
            _ => Err(ProtocolError::UnknownCommand(envelope.command)),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Command::Start { .. } => "start",
            Command::Track { .. } => "track",
            Command::Untrack { .. } => "untrack",
        }
    }

    pub fn slack_id(&self) -> &str {
        match self {
            Command::Start { slack_id, .. }
            | Command::Track { slack_id, .. }
            | Command::Untrack { slack_id } => slack_id,
        }
    }

    pub fn to_envelope(&self) -> RequestEnvelope {
        let mut data = Map::new();
        match self {
            Command::Start {
                work,
                slack_id,
                api_key,
            } => {
                data.insert("work".into(), Value::from(work.as_str()));
                data.insert("slack_id".into(), Value::from(slack_id.as_str()));
                data.insert("api_key".into(), Value::from(api_key.as_str()));
            }
            Command::Track { slack_id, api_key } => {
                data.insert("slack_id".into(), Value::from(slack_id.as_str()));
                data.insert("api_key".into(), Value::from(api_key.as_str()));
            }
            Command::Untrack { slack_id } => {
                data.insert("slack_id".into(), Value::from(slack_id.as_str()));
            }
        }
        RequestEnvelope {
            command: self.name().to_string(),
            data,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        // A map of strings always serializes
        serde_json::to_vec(&self.to_envelope()).unwrap_or_default()
    }
}

fn required(data: &Map<String, Value>, field: &'static str) -> Result<String, ProtocolError> {
    match data.get(field) {
        Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
        _ => Err(ProtocolError::InvalidField(field)),
    }
}

/// Text reply written back on the connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Protocol(ProtocolError),
    Started { status: String, body: String },
    StartFailed(String),
    Tracking { end_time: DateTime<Utc> },
    TrackFailed(String),
    Untracked { stopped: usize },
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Protocol(e) => writeln!(f, "{}", e),
            Reply::Started { status, body } => {
                write!(f, "Response Status: {}\nResponse Body: {}\n", status, body)
            }
            Reply::StartFailed(e) => writeln!(f, "Failed to start session: {}", e),
            Reply::Tracking { end_time } => writeln!(
                f,
                "Tracking started with end time: {}",
                end_time.to_rfc3339_opts(SecondsFormat::AutoSi, true)
            ),
            Reply::TrackFailed(e) => writeln!(f, "Failed to get session times: {}", e),
            Reply::Untracked { stopped } => writeln!(f, "Stopped {} reminder task(s)", stopped),
        }
    }
}

impl From<ProtocolError> for Reply {
    fn from(e: ProtocolError) -> Self {
        Reply::Protocol(e)
    }
}
