//! Wire envelope codec.
//!
//! One UTF-8 JSON object per message, in one of three shapes:
//! - Call:        `{"channel": "...", "args": [...]}`
//! - Reply:       `{"channel": "...", "result": <value>}`
//! - Error reply: `{"channel": "...", "error": "..."}`
//!
//! The protocol carries no per-call correlation id; replies are matched to
//! pending calls by channel name alone. That is a wire-format constraint the
//! codec preserves as-is.

use serde_json::{json, Value};

use pontoon_common::DecodeError;

/// Decoded form of one wire message.
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    /// A request or fire-and-forget event.
    Call { channel: String, args: Vec<Value> },
    /// A successful response to a call.
    Reply { channel: String, result: Value },
    /// A failed response to a call.
    Error { channel: String, error: String },
}

impl Envelope {
    pub fn call(channel: impl Into<String>, args: Vec<Value>) -> Self {
        Self::Call {
            channel: channel.into(),
            args,
        }
    }

    pub fn reply(channel: impl Into<String>, result: Value) -> Self {
        Self::Reply {
            channel: channel.into(),
            result,
        }
    }

    pub fn error(channel: impl Into<String>, error: impl Into<String>) -> Self {
        Self::Error {
            channel: channel.into(),
            error: error.into(),
        }
    }

    /// The channel this envelope belongs to. Never empty for a decoded envelope.
    pub fn channel(&self) -> &str {
        match self {
            Self::Call { channel, .. } => channel,
            Self::Reply { channel, .. } => channel,
            Self::Error { channel, .. } => channel,
        }
    }

    /// Serialize to the wire string.
    pub fn encode(&self) -> String {
        let value = match self {
            Self::Call { channel, args } => json!({ "channel": channel, "args": args }),
            Self::Reply { channel, result } => json!({ "channel": channel, "result": result }),
            Self::Error { channel, error } => json!({ "channel": channel, "error": error }),
        };
        value.to_string()
    }

    /// Parse a wire string. Malformed input yields a [`DecodeError`] value,
    /// never a panic.
    pub fn decode(raw: &str) -> Result<Self, DecodeError> {
        let value: Value =
            serde_json::from_str(raw).map_err(|e| DecodeError::InvalidJson(e.to_string()))?;
        let object = value.as_object().ok_or(DecodeError::NotAnObject)?;

        let channel = match object.get("channel") {
            None => return Err(DecodeError::MissingChannel),
            Some(Value::String(s)) => s.clone(),
            Some(_) => return Err(DecodeError::ChannelNotAString),
        };
        if channel.is_empty() {
            return Err(DecodeError::EmptyChannel);
        }

        // A message is exactly one of the three shapes; 'args' wins when
        // present so a call carrying a field named 'result' stays a call.
        if let Some(args) = object.get("args") {
            let args = match args {
                Value::Array(items) => items.clone(),
                // A lone value is accepted as a single-argument call.
                other => vec![other.clone()],
            };
            return Ok(Self::Call { channel, args });
        }
        if let Some(Value::String(error)) = object.get("error") {
            return Ok(Self::Error {
                channel,
                error: error.clone(),
            });
        }
        if let Some(result) = object.get("result") {
            return Ok(Self::Reply {
                channel,
                result: result.clone(),
            });
        }

        Err(DecodeError::UnknownShape)
    }
}
