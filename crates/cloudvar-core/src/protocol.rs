//! Wire types for the cloud data protocol.
//!
//! Every payload is a small JSON text frame. Outbound frames are tagged by
//! `method` first, then the fields in the order the server expects:
//!
//! ```json
//! {"method":"handshake","user":"alice","project_id":"1194614729"}
//! {"method":"set","name":"☁ Score","value":42,"user":"alice","project_id":"1194614729"}
//! ```
//!
//! Inbound frames of interest are `set` notifications. The server may batch
//! several of them into one frame, one JSON object per line.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::constants::CLOUD_MARKER;

/// Canonical wire name: exactly one leading [`CLOUD_MARKER`].
///
/// Idempotent, so callers may pass the name with or without the marker.
pub fn canonical_name(name: &str) -> String {
    format!("{CLOUD_MARKER}{}", display_name(name))
}

/// Name with the marker removed, for presenting to users.
pub fn display_name(name: &str) -> &str {
    name.strip_prefix(CLOUD_MARKER).unwrap_or(name)
}

/// Value of a cloud variable: the server only stores numbers and strings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CloudValue {
    /// A JSON number, kept exactly as received.
    Number(serde_json::Number),
    /// A text value.
    Text(String),
}

impl CloudValue {
    /// Build a numeric value from a float. `None` for NaN and infinities.
    pub fn from_f64(value: f64) -> Option<Self> {
        serde_json::Number::from_f64(value).map(Self::Number)
    }

    /// Interpret user input: anything that parses as a JSON number is sent
    /// as a number, everything else as text.
    pub fn from_input(input: &str) -> Self {
        match serde_json::from_str::<serde_json::Number>(input.trim()) {
            Ok(number) => Self::Number(number),
            Err(_) => Self::Text(input.to_owned()),
        }
    }

    /// Numeric view of the value, if it is a number.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => n.as_f64(),
            Self::Text(_) => None,
        }
    }

    /// Text view of the value, if it is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Number(_) => None,
            Self::Text(s) => Some(s),
        }
    }
}

impl fmt::Display for CloudValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

macro_rules! cloud_value_from_int {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for CloudValue {
                fn from(value: $ty) -> Self {
                    Self::Number(value.into())
                }
            }
        )*
    };
}

cloud_value_from_int!(i8, i16, i32, i64, u8, u16, u32, u64);

impl From<&str> for CloudValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for CloudValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// Project identifier, sent back to the server with the type it was given.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProjectId {
    /// Numeric project id.
    Number(u64),
    /// Textual project id.
    Text(String),
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<u64> for ProjectId {
    fn from(value: u64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for ProjectId {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for ProjectId {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// A frame sent from client to server.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "method", rename_all = "lowercase")]
pub enum ClientFrame {
    /// Identifies the user and project for this connection.
    Handshake {
        /// Username.
        user: String,
        /// Project the session is bound to.
        project_id: ProjectId,
    },
    /// Assigns a new value to a variable.
    Set {
        /// Marker-prefixed variable name.
        name: String,
        /// New value.
        value: CloudValue,
        /// Username.
        user: String,
        /// Project the variable belongs to.
        project_id: ProjectId,
    },
}

impl ClientFrame {
    /// Serialize to the JSON text sent on the wire.
    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// A frame received from the server.
#[derive(Clone, Debug, PartialEq)]
pub enum InboundFrame {
    /// A variable took a new value.
    Set {
        /// Marker-prefixed variable name.
        name: String,
        /// The value.
        value: CloudValue,
    },
    /// Any other method; ignored by the recorder.
    Other {
        /// The declared method.
        method: String,
    },
}

/// An inbound frame that could not be understood.
#[derive(Debug, Error)]
#[error("malformed frame: {reason}")]
pub struct MalformedFrame {
    reason: String,
}

impl From<serde_json::Error> for MalformedFrame {
    fn from(err: serde_json::Error) -> Self {
        Self {
            reason: err.to_string(),
        }
    }
}

#[derive(Deserialize)]
struct SetPayload {
    name: String,
    value: CloudValue,
}

/// Parse one inbound text frame into its messages.
///
/// A frame holding a single JSON document yields one entry. A frame that is
/// not valid JSON as a whole but spans several lines is treated as one
/// message per non-empty line.
pub fn parse_frames(text: &str) -> Vec<Result<InboundFrame, MalformedFrame>> {
    match serde_json::from_str::<Value>(text) {
        Ok(value) => vec![classify(value)],
        Err(err) if !text.contains('\n') => vec![Err(err.into())],
        Err(_) => text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| {
                serde_json::from_str::<Value>(line)
                    .map_err(MalformedFrame::from)
                    .and_then(classify)
            })
            .collect(),
    }
}

fn classify(value: Value) -> Result<InboundFrame, MalformedFrame> {
    let Some(method) = value.get("method").and_then(Value::as_str) else {
        return Err(MalformedFrame {
            reason: "missing method".into(),
        });
    };
    if method != "set" {
        return Ok(InboundFrame::Other {
            method: method.to_owned(),
        });
    }
    let payload: SetPayload = serde_json::from_value(value)?;
    Ok(InboundFrame::Set {
        name: payload.name,
        value: payload.value,
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
