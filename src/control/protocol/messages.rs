//! Control protocol message types
//!
//! Frames on the wire are single JSON objects. A frame with `method` and `id`
//! is a request, `method` without `id` is a notification, and `id` without
//! `method` is a response carrying either `result` or `error`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{BridgeError, INTERNAL_ERROR, Result};
use crate::types::identifiers::RequestId;

/// Error object carried by an error response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcErrorBody {
    /// JSON-RPC error code
    pub code: i64,
    /// Human-readable message
    pub message: String,
    /// Optional structured data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcErrorBody {
    /// Build the error body answering an inbound request that failed
    #[must_use]
    pub fn from_error(err: &BridgeError) -> Self {
        Self {
            code: err.rpc_code(),
            message: err.to_string(),
            data: None,
        }
    }
}

impl From<RpcErrorBody> for BridgeError {
    fn from(body: RpcErrorBody) -> Self {
        Self::Rpc {
            code: body.code,
            message: body.message,
            data: body.data,
        }
    }
}

/// A classified frame received from the agent process
#[derive(Debug, Clone, PartialEq)]
pub enum IncomingMessage {
    /// Answer to one of our requests
    Response {
        /// Correlation id
        id: RequestId,
        /// `result` on success, `error` otherwise
        outcome: std::result::Result<Value, RpcErrorBody>,
    },
    /// Server-to-client request that expects an answer
    Request {
        /// Raw id, echoed back verbatim in the answer
        id: Value,
        /// Method name
        method: String,
        /// Parameters (`null` when absent)
        params: Value,
    },
    /// Fire-and-forget event
    Notification {
        /// Method name
        method: String,
        /// Parameters (`null` when absent)
        params: Value,
    },
}

impl IncomingMessage {
    /// Classify a decoded frame
    ///
    /// # Errors
    /// Returns a protocol error if the frame is not an object, has a non-string
    /// method, or has neither an id nor a method
    pub fn classify(frame: Value) -> Result<Self> {
        let Value::Object(mut map) = frame else {
            return Err(BridgeError::protocol("frame is not a JSON object"));
        };

        let id = map.remove("id").filter(|id| !id.is_null());
        let method = map.remove("method");
        let params = map.remove("params").unwrap_or(Value::Null);

        match (id, method) {
            (Some(id), Some(Value::String(method))) => Ok(Self::Request { id, method, params }),
            (None, Some(Value::String(method))) => Ok(Self::Notification { method, params }),
            (_, Some(other)) => Err(BridgeError::protocol(format!(
                "frame method is not a string: {other}"
            ))),
            (Some(id), None) => {
                let id = RequestId::from_wire(&id).ok_or_else(|| {
                    BridgeError::protocol(format!("response id is not a string or integer: {id}"))
                })?;
                let outcome = match map.remove("error") {
                    Some(error) if !error.is_null() => Err(serde_json::from_value(error.clone())
                        .unwrap_or_else(|_| RpcErrorBody {
                            code: INTERNAL_ERROR,
                            message: error.to_string(),
                            data: None,
                        })),
                    _ => Ok(map.remove("result").unwrap_or(Value::Null)),
                };
                Ok(Self::Response { id, outcome })
            }
            (None, None) => Err(BridgeError::protocol("frame has neither an id nor a method")),
        }
    }
}

/// A frame written to the agent process
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum OutgoingMessage {
    /// Client-to-server request
    Request {
        /// Correlation id
        id: u64,
        /// Method name
        method: String,
        /// Parameters
        params: Value,
    },
    /// Client-to-server notification
    Notification {
        /// Method name
        method: String,
        /// Parameters, omitted when `None`
        #[serde(skip_serializing_if = "Option::is_none")]
        params: Option<Value>,
    },
    /// Successful answer to an inbound request
    Response {
        /// Echoed request id
        id: Value,
        /// Handler result
        result: Value,
    },
    /// Failed answer to an inbound request
    Error {
        /// Echoed request id
        id: Value,
        /// Error body
        error: RpcErrorBody,
    },
}

impl OutgoingMessage {
    /// Serialize as one frame, without the trailing newline
    ///
    /// # Errors
    /// Returns error if serialization fails
    pub fn to_line(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
