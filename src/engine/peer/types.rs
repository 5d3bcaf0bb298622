// Keyhost Engine — Peer Protocol Types
//
// One JSON envelope carries every message kind. `type` selects the handler;
// the RPC kinds use `id` for correlation.

use crate::atoms::constants::{MSG_ERROR, MSG_EVENT, MSG_PING, MSG_PONG, MSG_RPC_REQUEST, MSG_RPC_RESPONSE};
use crate::atoms::constants::DEFAULT_RPC_TIMEOUT_MS;
use crate::atoms::error::EngineError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcErrorBody {
    pub code: i64,
    pub message: String,
}

impl From<&EngineError> for RpcErrorBody {
    fn from(e: &EngineError) -> Self {
        RpcErrorBody { code: e.rpc_code(), message: e.to_string() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcErrorBody>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl Message {
    fn bare(kind: &str) -> Self {
        Message {
            kind: kind.to_string(),
            id: None,
            method: None,
            params: None,
            result: None,
            error: None,
            payload: None,
        }
    }

    pub fn rpc_request(id: &str, method: &str, params: Value) -> Self {
        Message { id: Some(id.to_string()), method: Some(method.to_string()), params: Some(params), ..Self::bare(MSG_RPC_REQUEST) }
    }

    pub fn rpc_result(id: &str, result: Value) -> Self {
        Message { id: Some(id.to_string()), result: Some(result), ..Self::bare(MSG_RPC_RESPONSE) }
    }

    pub fn rpc_error(id: &str, error: RpcErrorBody) -> Self {
        Message { id: Some(id.to_string()), error: Some(error), ..Self::bare(MSG_RPC_RESPONSE) }
    }

    /// Out-of-band failure report (unknown type, undecodable request).
    pub fn error(id: Option<String>, code: i64, message: impl Into<String>) -> Self {
        Message { id, error: Some(RpcErrorBody { code, message: message.into() }), ..Self::bare(MSG_ERROR) }
    }

    pub fn event(payload: Value) -> Self {
        Message { payload: Some(payload), ..Self::bare(MSG_EVENT) }
    }

    pub fn ping() -> Self {
        Self::bare(MSG_PING)
    }

    pub fn pong(id: Option<String>) -> Self {
        Message { id, ..Self::bare(MSG_PONG) }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RpcOptions {
    pub timeout: Duration,
}

impl Default for RpcOptions {
    fn default() -> Self {
        RpcOptions { timeout: Duration::from_millis(DEFAULT_RPC_TIMEOUT_MS) }
    }
}

impl RpcOptions {
    pub fn with_timeout(timeout: Duration) -> Self {
        RpcOptions { timeout }
    }
}
