//! JSON-RPC 2.0 envelopes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use playbook_core::PlaybookError;
use playbook_core::error::codes;

/// A validated request envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: Value,
    /// Echoed back verbatim. `Null` when the caller sent none.
    #[serde(default)]
    pub id: Value,
}

impl JsonRpcRequest {
    /// Parse and validate a raw body. Failures come back as a ready-to-send
    /// `-32600` response carrying whatever id could be recovered.
    pub fn parse(body: &[u8]) -> Result<Self, JsonRpcResponse> {
        let value: Value = serde_json::from_slice(body).map_err(|e| {
            JsonRpcResponse::error(Value::Null, codes::INVALID_REQUEST, format!("parse error: {e}"))
        })?;
        let Value::Object(obj) = value else {
            return Err(JsonRpcResponse::error(
                Value::Null,
                codes::INVALID_REQUEST,
                "request must be a JSON object",
            ));
        };

        let id = obj.get("id").cloned().unwrap_or(Value::Null);
        let invalid = |msg: &str| JsonRpcResponse::error(id.clone(), codes::INVALID_REQUEST, msg);

        match obj.get("jsonrpc") {
            Some(Value::String(v)) if v == "2.0" => {}
            _ => return Err(invalid("jsonrpc must be \"2.0\"")),
        }
        let Some(Value::String(method)) = obj.get("method") else {
            return Err(invalid("method must be a string"));
        };

        Ok(Self {
            jsonrpc: "2.0".into(),
            method: method.clone(),
            params: obj.get("params").cloned().unwrap_or(Value::Null),
            id: id.clone(),
        })
    }

    /// Methods under `notifications/` get no response body.
    pub fn is_notification(&self) -> bool {
        self.method.starts_with("notifications/")
    }

    /// String parameter by name.
    pub fn param_str(&self, name: &str) -> Option<&str> {
        self.params.get(name).and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl JsonRpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            id,
            result: None,
            error: Some(RpcError {
                code,
                message: message.into(),
            }),
        }
    }

    /// Error response using the error's own code.
    pub fn from_error(id: Value, err: &PlaybookError) -> Self {
        Self::error(id, err.rpc_code(), err.to_string())
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(v: Value) -> Result<JsonRpcRequest, JsonRpcResponse> {
        JsonRpcRequest::parse(v.to_string().as_bytes())
    }

    #[test]
    fn valid_request() {
        let req = parse(json!({"jsonrpc": "2.0", "method": "ping", "id": 7})).unwrap();
        assert_eq!(req.method, "ping");
        assert_eq!(req.id, json!(7));
        assert!(req.params.is_null());
    }

    #[test]
    fn malformed_json() {
        let err = JsonRpcRequest::parse(b"{not json").unwrap_err();
        assert_eq!(err.error.unwrap().code, -32600);
    }

    #[test]
    fn non_object_body() {
        let err = parse(json!([1, 2])).unwrap_err();
        assert_eq!(err.error.unwrap().code, -32600);
    }

    #[test]
    fn wrong_version_keeps_id() {
        let err = parse(json!({"jsonrpc": "1.0", "method": "ping", "id": "abc"})).unwrap_err();
        assert_eq!(err.id, json!("abc"));
        assert_eq!(err.error.unwrap().code, -32600);
    }

    #[test]
    fn missing_method() {
        let err = parse(json!({"jsonrpc": "2.0", "id": 1})).unwrap_err();
        assert_eq!(err.error.unwrap().code, -32600);
        let err = parse(json!({"jsonrpc": "2.0", "method": 5, "id": 1})).unwrap_err();
        assert_eq!(err.error.unwrap().code, -32600);
    }

    #[test]
    fn notification_prefix() {
        let req = parse(json!({"jsonrpc": "2.0", "method": "notifications/initialized"})).unwrap();
        assert!(req.is_notification());
    }

    #[test]
    fn error_response_omits_result() {
        let resp = JsonRpcResponse::error(json!(1), -32601, "nope");
        let v = serde_json::to_value(&resp).unwrap();
        assert!(v.get("result").is_none());
        assert_eq!(v["error"]["code"], json!(-32601));
    }
}
