//! Shared conversions between Parsec's domain types and `cel-interpreter`
//! values, used by both the validator filter and the claim mapper.

use crate::credential::ValidationResult;
use crate::error::ParsecError;
use crate::request::RequestAttributes;
use cel_interpreter::objects::{Key, Map as CelMap};
use cel_interpreter::Value as CelValue;
use std::collections::HashMap;
use std::sync::Arc;

pub(crate) fn cel_string(value: &str) -> CelValue {
    CelValue::String(Arc::new(value.to_string()))
}

pub(crate) fn cel_map(entries: Vec<(&str, CelValue)>) -> CelValue {
    let map: HashMap<Key, CelValue> = entries
        .into_iter()
        .map(|(k, v)| (Key::String(Arc::new(k.to_string())), v))
        .collect();
    CelValue::Map(CelMap { map: Arc::new(map) })
}

pub(crate) fn string_map_to_cel(entries: &HashMap<String, String>) -> CelValue {
    let map: HashMap<Key, CelValue> = entries
        .iter()
        .map(|(k, v)| (Key::String(Arc::new(k.clone())), cel_string(v)))
        .collect();
    CelValue::Map(CelMap { map: Arc::new(map) })
}

/// Converts a `serde_json::Value` into the equivalent CEL value, used both
/// for claims embedded in a [`ValidationResult`] and for decoded
/// data-source payloads.
pub(crate) fn json_to_cel(value: &serde_json::Value) -> CelValue {
    match value {
        serde_json::Value::Null => CelValue::Null,
        serde_json::Value::Bool(b) => CelValue::Bool(*b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                CelValue::Int(i)
            } else {
                CelValue::Float(n.as_f64().unwrap_or_default())
            }
        }
        serde_json::Value::String(s) => cel_string(s),
        serde_json::Value::Array(items) => CelValue::List(Arc::new(items.iter().map(json_to_cel).collect())),
        serde_json::Value::Object(fields) => {
            let map: HashMap<Key, CelValue> = fields
                .iter()
                .map(|(k, v)| (Key::String(Arc::new(k.clone())), json_to_cel(v)))
                .collect();
            CelValue::Map(CelMap { map: Arc::new(map) })
        }
    }
}

/// Converts a CEL value back into `serde_json::Value`, used to turn a claim
/// mapper's output map into the claim set the issuers consume.
pub(crate) fn cel_to_json(value: &CelValue) -> Result<serde_json::Value, ParsecError> {
    Ok(match value {
        CelValue::Null => serde_json::Value::Null,
        CelValue::Bool(b) => serde_json::Value::Bool(*b),
        CelValue::Int(i) => serde_json::Value::Number((*i).into()),
        CelValue::UInt(u) => serde_json::Value::Number((*u).into()),
        CelValue::Float(f) => serde_json::Number::from_f64(*f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        CelValue::String(s) => serde_json::Value::String(s.as_str().to_string()),
        CelValue::Bytes(b) => serde_json::Value::String(base64::Engine::encode(
            &base64::engine::general_purpose::STANDARD,
            b.as_slice(),
        )),
        CelValue::List(items) => {
            serde_json::Value::Array(items.iter().map(cel_to_json).collect::<Result<Vec<_>, _>>()?)
        }
        CelValue::Map(map) => {
            let mut object = serde_json::Map::new();
            for (key, v) in map.map.iter() {
                let key_str = match key {
                    Key::String(s) => s.as_str().to_string(),
                    Key::Int(i) => i.to_string(),
                    Key::Uint(u) => u.to_string(),
                    Key::Bool(b) => b.to_string(),
                };
                object.insert(key_str, cel_to_json(v)?);
            }
            serde_json::Value::Object(object)
        }
        other => return Err(ParsecError::Cel(format!("unsupported claim value: {other:?}"))),
    })
}

/// Materialises a [`ValidationResult`] as the CEL map shape the claim
/// mapper and validator filter both bind as `subject`/`actor`.
pub(crate) fn validation_result_to_cel(result: &ValidationResult) -> CelValue {
    let claims: HashMap<Key, CelValue> = result
        .claims
        .iter()
        .map(|(k, v)| (Key::String(Arc::new(k.clone())), json_to_cel(v)))
        .collect();

    cel_map(vec![
        ("subject", cel_string(&result.subject)),
        ("issuer", cel_string(&result.issuer)),
        ("trust_domain", cel_string(&result.trust_domain)),
        ("scope", cel_string(&result.scope)),
        (
            "audience",
            CelValue::List(Arc::new(result.audience.iter().map(|a| cel_string(a)).collect())),
        ),
        ("claims", CelValue::Map(CelMap { map: Arc::new(claims) })),
        (
            "issued_at",
            result.issued_at.map(|t| CelValue::Int(t.timestamp())).unwrap_or(CelValue::Null),
        ),
        (
            "expires_at",
            result.expires_at.map(|t| CelValue::Int(t.timestamp())).unwrap_or(CelValue::Null),
        ),
    ])
}

/// Materialises [`RequestAttributes`] as the CEL map shape bound as
/// `request`.
pub(crate) fn request_to_cel(request: &RequestAttributes) -> CelValue {
    cel_map(vec![
        ("method", cel_string(&request.method)),
        ("path", cel_string(&request.path)),
        ("host", cel_string(&request.host)),
        ("ip_address", cel_string(&request.ip_address)),
        ("user_agent", cel_string(&request.user_agent)),
        ("headers", string_map_to_cel(&request.headers)),
        ("additional", string_map_to_cel(&request.additional)),
    ])
}
