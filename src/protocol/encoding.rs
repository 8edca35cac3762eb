//! Query-string and JSON body encoding.

use crate::error::RequestError;
use bytes::Bytes;
use serde_json::Value;

/// One flattened `field=value` pair of a query string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryPair {
    /// Field name, including any `[sub]` / `[]` suffixes.
    pub field: String,
    /// Rendered value; `None` for JSON `null`.
    pub value: Option<String>,
}

impl QueryPair {
    /// Percent-escaped `field=value`, or just `field` when there is no value.
    pub fn encoded(&self) -> String {
        match &self.value {
            Some(value) => format!("{}={}", percent_escape(&self.field), percent_escape(value)),
            None => percent_escape(&self.field),
        }
    }
}

/// Percent-escape a query key or value (RFC 3986 unreserved set kept as-is).
pub fn percent_escape(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

/// Flatten a parameter mapping into query pairs.
///
/// Object keys are visited in ascending order so the output is stable.
/// Non-object top-level values produce no pairs.
pub fn query_pairs(params: &Value) -> Vec<QueryPair> {
    let mut pairs = Vec::new();
    collect_pairs(None, params, &mut pairs);
    pairs
}

fn collect_pairs(key: Option<&str>, value: &Value, out: &mut Vec<QueryPair>) {
    match value {
        Value::Object(map) => {
            let mut fields: Vec<&String> = map.keys().collect();
            fields.sort();
            for field in fields {
                let nested = match key {
                    Some(parent) => format!("{parent}[{field}]"),
                    None => field.clone(),
                };
                collect_pairs(Some(&nested), &map[field.as_str()], out);
            }
        }
        Value::Array(items) => {
            let Some(key) = key else { return };
            let nested = format!("{key}[]");
            for item in items {
                collect_pairs(Some(&nested), item, out);
            }
        }
        scalar => {
            let Some(key) = key else { return };
            out.push(QueryPair {
                field: key.to_string(),
                value: scalar_text(scalar),
            });
        }
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Encode a parameter mapping as a query string (without the leading `?`).
pub fn encode_query_string(params: &Value) -> String {
    query_pairs(params)
        .iter()
        .map(QueryPair::encoded)
        .collect::<Vec<_>>()
        .join("&")
}

/// Encode a parameter mapping as a JSON request body.
pub fn encode_json_body(params: &Value) -> Result<Bytes, RequestError> {
    Ok(Bytes::from(serde_json::to_vec(params)?))
}
