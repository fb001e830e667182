//! Wire-format types and the context-header encode/decode scheme (§6).
//!
//! Kept out of `nexus-core` deliberately: the core error taxonomy ([`nexus_core::RemoteError`])
//! has no opinion on serialization, while everything in this module exists only to go on or
//! come off the wire as JSON.

use std::collections::HashMap;

use nexus_core::{NexusError, RemoteError};
use nexus_hosting::{CALL_ID_STACK_KEY, CONTEXT_KEYS, ContextData};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Every propagated context key travels as an AMQP-style header under this prefix (§6.2).
pub const HEADER_PREFIX: &str = "nexus-rpc.";

/// A request body (§6.1): positional and keyword arguments for one method call.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RequestBody {
    #[serde(default)]
    pub args: Value,
    #[serde(default)]
    pub kwargs: Value,
}

/// A reply body (§6.1): exactly one of `result`/`error` is populated.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ReplyBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorEnvelope>,
}

impl ReplyBody {
    pub fn success(result: Value) -> Self {
        Self { result: Some(result), error: None }
    }

    pub fn failure(error: ErrorEnvelope) -> Self {
        Self { result: None, error: Some(error) }
    }
}

/// The serializable shape of a remote error (§6.1, §9 open question: resolved to a typed,
/// `serde`-capable envelope rather than a free-form string blob).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub exc_type: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traceback: Option<String>,
}

impl From<RemoteError> for ErrorEnvelope {
    fn from(err: RemoteError) -> Self {
        Self { exc_type: err.exc_type, value: err.value, traceback: err.traceback }
    }
}

impl From<ErrorEnvelope> for RemoteError {
    fn from(env: ErrorEnvelope) -> Self {
        RemoteError { exc_type: env.exc_type, value: env.value, traceback: env.traceback }
    }
}

/// Builds an [`ErrorEnvelope`] out of whatever [`NexusError`] a worker failed with (§6.1,
/// §8 scenario 7: "Method not found", and the general dispatch-failure path).
pub fn error_envelope_from(err: &NexusError) -> ErrorEnvelope {
    ErrorEnvelope {
        exc_type: err.code().to_string(),
        value: err.to_string(),
        traceback: None,
    }
}

/// Encodes `context_data` into AMQP-style message headers, one `nexus-rpc.<key>` entry per
/// allowed key present (§6.2). `call_id_stack` is encoded as a JSON-array *string*, matching
/// the rest of the wire format's convention of string-valued headers.
pub fn encode_context_headers(context_data: &ContextData) -> HashMap<String, String> {
    let mut headers = HashMap::new();
    for key in CONTEXT_KEYS {
        let Some(value) = context_data.get(*key) else {
            continue;
        };
        let encoded = if *key == CALL_ID_STACK_KEY {
            value.to_string()
        } else {
            match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            }
        };
        headers.insert(format!("{HEADER_PREFIX}{key}"), encoded);
    }
    headers
}

/// Decodes AMQP-style message headers back into `context_data`, stripping the
/// `nexus-rpc.` prefix and reconstituting `call_id_stack` as a JSON array (§6.2). Unknown
/// headers (no matching prefix, or a key outside [`CONTEXT_KEYS`]) are silently dropped.
pub fn decode_context_headers(headers: &HashMap<String, String>) -> ContextData {
    let mut data = ContextData::new();
    for (header_key, raw) in headers {
        let Some(key) = header_key.strip_prefix(HEADER_PREFIX) else {
            continue;
        };
        if !CONTEXT_KEYS.contains(&key) {
            continue;
        }
        let value = if key == CALL_ID_STACK_KEY {
            serde_json::from_str(raw).unwrap_or(Value::Array(Vec::new()))
        } else {
            Value::String(raw.clone())
        };
        data.insert(key.to_string(), value);
    }
    data
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_headers_round_trip_through_encode_decode() {
        let mut data = ContextData::new();
        data.insert("user_id".to_string(), Value::String("u-1".to_string()));
        data.insert(
            CALL_ID_STACK_KEY.to_string(),
            serde_json::json!(["svc.method.abc"]),
        );
        data.insert("ignored".to_string(), Value::String("dropped".to_string()));

        let headers = encode_context_headers(&data);
        assert_eq!(headers.get("nexus-rpc.user_id").unwrap(), "u-1");
        assert!(!headers.contains_key("nexus-rpc.ignored"));

        let decoded = decode_context_headers(&headers);
        assert_eq!(decoded.get("user_id").unwrap(), "u-1");
        assert_eq!(
            decoded.get(CALL_ID_STACK_KEY).unwrap(),
            &serde_json::json!(["svc.method.abc"])
        );
        assert!(!decoded.contains_key("ignored"));
    }

    #[test]
    fn reply_body_serializes_only_the_populated_side() {
        let ok = ReplyBody::success(Value::from(42));
        let json = serde_json::to_value(&ok).unwrap();
        assert_eq!(json["result"], 42);
        assert!(json.get("error").is_none());
    }
}
