//! Firestore REST document encoding.
//!
//! Firestore wraps every field in a typed value (`{"stringValue": "ana"}`,
//! `{"integerValue": "200"}`). Integers travel as decimal strings.

use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::cloud::{encode_user_document, CloudUser};

/// Field paths written by a full upsert.
pub(crate) const USER_FIELDS: [&str; 4] = ["username", "password", "nivel", "timestamp"];

/// Document resource as returned by the REST API.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct FirestoreDocument {
    /// Full resource name, ending in the document id.
    pub name: String,
    #[serde(default)]
    pub fields: Map<String, Value>,
}

impl FirestoreDocument {
    /// Document id (last path segment of the resource name).
    pub fn id(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or(&self.name)
    }

    /// Fields with their type wrappers removed.
    pub fn plain_fields(&self) -> Map<String, Value> {
        decode_fields(&self.fields)
    }
}

/// Response from listing a collection.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ListDocumentsResponse {
    #[serde(default)]
    pub documents: Vec<FirestoreDocument>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

/// Wrap a plain JSON value in a Firestore typed value.
pub(crate) fn encode_value(value: &Value) -> Value {
    match value {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(b) => json!({ "booleanValue": b }),
        Value::Number(n) => match n.as_i64() {
            Some(i) => json!({ "integerValue": i.to_string() }),
            None => json!({ "doubleValue": n }),
        },
        Value::String(s) => json!({ "stringValue": s }),
        Value::Array(items) => {
            let values: Vec<Value> = items.iter().map(encode_value).collect();
            json!({ "arrayValue": { "values": values } })
        }
        Value::Object(map) => json!({ "mapValue": { "fields": encode_fields(map) } }),
    }
}

/// Remove the type wrapper from a Firestore value.
///
/// Unknown wrappers decode to `Null` so the document-level decoder can
/// apply its defaults.
pub(crate) fn decode_value(value: &Value) -> Value {
    let Some(wrapper) = value.as_object() else {
        return Value::Null;
    };

    if let Some(s) = wrapper.get("stringValue") {
        return s.clone();
    }
    if let Some(raw) = wrapper.get("integerValue") {
        return match raw {
            Value::String(s) => s.parse::<i64>().map(Value::from).unwrap_or_else(|_| raw.clone()),
            other => other.clone(),
        };
    }
    if let Some(d) = wrapper.get("doubleValue") {
        return d.clone();
    }
    if let Some(b) = wrapper.get("booleanValue") {
        return b.clone();
    }
    if let Some(array) = wrapper.get("arrayValue") {
        let items = array
            .get("values")
            .and_then(Value::as_array)
            .map(|values| values.iter().map(decode_value).collect())
            .unwrap_or_default();
        return Value::Array(items);
    }
    if let Some(map) = wrapper.get("mapValue") {
        let fields = map
            .get("fields")
            .and_then(Value::as_object)
            .map(decode_fields)
            .unwrap_or_default();
        return Value::Object(fields);
    }
    Value::Null
}

pub(crate) fn encode_fields(fields: &Map<String, Value>) -> Map<String, Value> {
    fields
        .iter()
        .map(|(key, value)| (key.clone(), encode_value(value)))
        .collect()
}

pub(crate) fn decode_fields(fields: &Map<String, Value>) -> Map<String, Value> {
    fields
        .iter()
        .map(|(key, value)| (key.clone(), decode_value(value)))
        .collect()
}

/// Request body for a full user upsert.
pub(crate) fn user_body(user: &CloudUser) -> Value {
    json!({ "fields": encode_fields(&encode_user_document(user)) })
}

/// Request body for a nivel update.
pub(crate) fn nivel_body(nivel: &str, timestamp: i64) -> Value {
    let mut fields = Map::new();
    fields.insert("nivel".to_string(), Value::from(nivel));
    fields.insert("timestamp".to_string(), Value::from(timestamp));
    json!({ "fields": encode_fields(&fields) })
}
