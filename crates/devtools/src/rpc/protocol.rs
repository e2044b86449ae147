//! Wire envelope types
//!
//! Inbound messages are kept as the decoded JSON object so callers get the
//! payload back exactly as the remote sent it. Only `id` is pulled out up
//! front, because that is what correlation runs on.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Request ID - monotonically increasing, wraps back to 1
pub type RequestId = u64;

pub const JSONRPC_VERSION: &str = "2.0";

/// Request sent to the remote
#[derive(Debug, Clone, Serialize)]
pub struct OutboundRequest {
    pub id: RequestId,
    pub method: String,
    pub params: Value,
    pub jsonrpc: &'static str,
}

impl OutboundRequest {
    /// Missing params go out as an empty object.
    pub fn new(id: RequestId, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            id,
            method: method.into(),
            params: params.unwrap_or_else(|| Value::Object(Map::new())),
            jsonrpc: JSONRPC_VERSION,
        }
    }

    pub fn encode(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Error object carried in an inbound `error` field
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ProtocolError {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Any message read from the transport: a response, an event, or a reply
/// nobody is waiting for.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    id: Option<RequestId>,
    body: Map<String, Value>,
}

impl InboundMessage {
    /// Decode a text frame. Anything but a JSON object is rejected.
    pub fn decode(text: &str) -> serde_json::Result<Self> {
        let body: Map<String, Value> = serde_json::from_str(text)?;
        Ok(Self::from_map(body))
    }

    pub fn from_map(body: Map<String, Value>) -> Self {
        let id = body.get("id").and_then(Value::as_u64);
        Self { id, body }
    }

    pub fn id(&self) -> Option<RequestId> {
        self.id
    }

    pub fn method(&self) -> Option<&str> {
        self.body.get("method").and_then(Value::as_str)
    }

    pub fn result(&self) -> Option<&Value> {
        self.body.get("result")
    }

    pub fn params(&self) -> Option<&Value> {
        self.body.get("params")
    }

    /// Parsed `error` field. Shapes that don't fit `ProtocolError` are
    /// reported with code 0 and the raw JSON as the message.
    pub fn error(&self) -> Option<ProtocolError> {
        let raw = self.body.get("error")?;
        Some(
            serde_json::from_value(raw.clone()).unwrap_or_else(|_| ProtocolError {
                code: 0,
                message: raw.to_string(),
                data: None,
            }),
        )
    }

    pub fn body(&self) -> &Map<String, Value> {
        &self.body
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.body)
    }
}

impl TryFrom<Value> for InboundMessage {
    type Error = Value;

    fn try_from(value: Value) -> std::result::Result<Self, Value> {
        match value {
            Value::Object(body) => Ok(Self::from_map(body)),
            other => Err(other),
        }
    }
}
