use serde_json::json;

use crate::gateway::GatewayError;

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({
        "code": code,
        "message": message.into(),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}

/// Remote errors are surfaced verbatim: code, message and details carry
/// through to the caller unchanged.
pub fn gateway_err(id: &str, e: &GatewayError) -> serde_json::Value {
    err(id, e.code(), e.message(), e.details())
}
