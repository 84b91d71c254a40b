//! JSON-RPC 2.0 message shapes used by the ACP wire protocol.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `-32700`: the server sent a message that could not be parsed as JSON.
pub const PARSE_ERROR: i64 = -32700;
/// `-32600`: the message was valid JSON but not a valid JSON-RPC request.
pub const INVALID_REQUEST: i64 = -32600;
/// `-32601`: no handler is registered for the requested method.
pub const METHOD_NOT_FOUND: i64 = -32601;
/// `-32602`: the request's params did not match what the method expects.
pub const INVALID_PARAMS: i64 = -32602;
/// `-32603`: a registered handler was invoked and itself returned an error.
pub const INTERNAL_ERROR: i64 = -32603;

/// An outgoing or incoming JSON-RPC request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Always `"2.0"`.
    pub jsonrpc: String,
    /// Correlation id, echoed back verbatim in the matching response.
    pub id: Value,
    /// Method name.
    pub method: String,
    /// Method parameters, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl Request {
    /// Build a request this session sends outbound, with a numeric id.
    #[must_use]
    pub fn new(id: u64, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: Value::from(id),
            method: method.into(),
            params,
        }
    }
}

/// A JSON-RPC error payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcError {
    /// Error code. See the module-level constants for the codes this
    /// session itself produces.
    pub code: i64,
    /// Human-readable message.
    pub message: String,
    /// Optional structured error data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    /// Construct an error with no structured data.
    #[must_use]
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// A `-32601 Method not found` error for an unhandled reverse request.
    #[must_use]
    pub fn method_not_found(method: &str) -> Self {
        Self::new(METHOD_NOT_FOUND, format!("method not found: {method}"))
    }

    /// A `-32603 Internal error` error wrapping a handler failure.
    #[must_use]
    pub fn internal(detail: impl std::fmt::Display) -> Self {
        Self::new(INTERNAL_ERROR, format!("internal error: {detail}"))
    }
}

/// A JSON-RPC response, carrying either a result or an error, never both.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// Always `"2.0"`.
    pub jsonrpc: String,
    /// Id of the request this responds to.
    pub id: Value,
    /// Successful result payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl Response {
    /// Build a success response.
    #[must_use]
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Build an error response.
    #[must_use]
    pub fn failure(id: Value, error: RpcError) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }
}

/// A JSON-RPC notification: a method call with no id and therefore no
/// response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    /// Always `"2.0"`.
    pub jsonrpc: String,
    /// Method name.
    pub method: String,
    /// Method parameters, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl Notification {
    /// Build a notification this session sends outbound.
    #[must_use]
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            method: method.into(),
            params,
        }
    }
}

/// A single line of ndjson, classified by the fields it carries.
///
/// JSON-RPC does not tag messages with a variant discriminator; a message
/// is a response if it carries `result` or `error`, a request if it
/// carries `id` and `method`, and a notification if it carries `method`
/// but no `id`. `RawMessage` captures the wire shape losslessly so
/// `classify` can apply that rule without guessing at intermediate
/// deserialization failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawMessage {
    /// Present on every well-formed message; not otherwise validated here.
    #[serde(default)]
    pub jsonrpc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

/// A classified inbound message.
#[derive(Debug, Clone)]
pub enum InboundMessage {
    /// A response to a request this session previously sent.
    Response(Response),
    /// A request the server is sending to this session (a reverse call).
    Request(Request),
    /// A notification with no response expected.
    Notification(Notification),
}

impl RawMessage {
    /// Classify a raw message, or `None` if it matches neither shape
    /// (missing `method` and missing `result`/`error`).
    #[must_use]
    pub fn classify(self) -> Option<InboundMessage> {
        if self.result.is_some() || self.error.is_some() {
            if let Some(id) = self.id {
                return Some(InboundMessage::Response(Response {
                    jsonrpc: self.jsonrpc.unwrap_or_else(|| "2.0".to_string()),
                    id,
                    result: self.result,
                    error: self.error,
                }));
            }
            return None;
        }

        if let Some(method) = self.method {
            return Some(match self.id {
                Some(id) => InboundMessage::Request(Request {
                    jsonrpc: self.jsonrpc.unwrap_or_else(|| "2.0".to_string()),
                    id,
                    method,
                    params: self.params,
                }),
                None => InboundMessage::Notification(Notification {
                    jsonrpc: self.jsonrpc.unwrap_or_else(|| "2.0".to_string()),
                    method,
                    params: self.params,
                }),
            });
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_response() {
        let raw: RawMessage =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":1,"result":{"ok":true}}"#).unwrap();
        assert!(matches!(raw.classify(), Some(InboundMessage::Response(_))));
    }

    #[test]
    fn classifies_request() {
        let raw: RawMessage = serde_json::from_str(
            r#"{"jsonrpc":"2.0","id":17,"method":"fs/read_text_file","params":{}}"#,
        )
        .unwrap();
        assert!(matches!(raw.classify(), Some(InboundMessage::Request(_))));
    }

    #[test]
    fn classifies_notification() {
        let raw: RawMessage =
            serde_json::from_str(r#"{"jsonrpc":"2.0","method":"session/update","params":{}}"#)
                .unwrap();
        assert!(matches!(raw.classify(), Some(InboundMessage::Notification(_))));
    }

    #[test]
    fn error_response_round_trips() {
        let response = Response::failure(Value::from(17), RpcError::method_not_found("fs/read_text_file"));
        let text = serde_json::to_string(&response).unwrap();
        let parsed: Response = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed.id, Value::from(17));
        assert_eq!(parsed.error.unwrap().code, METHOD_NOT_FOUND);
    }
}
