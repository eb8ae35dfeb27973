//! Queue message envelope.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A unit of work travelling through a queue.
///
/// The wire form is JSON with camelCase keys:
///
/// ```json
/// {"body": {"id": 1}, "type": "test", "retryCount": 0, "headers": {}}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Payload.
    #[serde(default)]
    pub body: Map<String, Value>,
    /// Tag selecting the handler.
    #[serde(rename = "type")]
    pub message_type: String,
    /// Number of failed processing attempts so far.
    #[serde(default)]
    pub retry_count: u32,
    /// Free-form metadata, not interpreted by the queue.
    #[serde(default)]
    pub headers: Map<String, Value>,
}

impl Message {
    /// Create a message with an empty body.
    #[must_use]
    pub fn new(message_type: impl Into<String>) -> Self {
        Self {
            body: Map::new(),
            message_type: message_type.into(),
            retry_count: 0,
            headers: Map::new(),
        }
    }

    /// Replace the body.
    #[must_use]
    pub fn with_body(mut self, body: Map<String, Value>) -> Self {
        self.body = body;
        self
    }

    /// Set one body field.
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.body.insert(key.into(), value.into());
        self
    }

    /// Set one header.
    #[must_use]
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Encode for transport.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Decode a transported payload.
    pub fn from_json(payload: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(payload)
    }
}
