//! Provider response -> `MetricRecord`.
//!
//! Untyped JSON never leaves this module: callers get either a validated
//! record or an `ExtractionError` naming the offending field.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::ExtractionError;
use crate::types::{MetricRecord, ServiceKind, ServiceTarget, TimeRange};

/// JSON path of the request counter for each kind of service.
pub fn request_count_path(kind: ServiceKind) -> &'static [&'static str] {
    match kind {
        ServiceKind::Page => &["result", "all", "requests"],
        ServiceKind::Worker => &["result", "sum", "requests"],
    }
}

pub fn normalize(
    raw: &str,
    target: &ServiceTarget,
    window: TimeRange,
    fetched_at: DateTime<Utc>,
) -> Result<MetricRecord, ExtractionError> {
    let body = parse_envelope(raw, target)?;
    let count = read_count(&body, request_count_path(target.kind), target)?;
    MetricRecord::new(target.clone(), window, count, fetched_at)
}

/// Parse the API envelope, rejecting `success: false` responses.
pub(crate) fn parse_envelope(raw: &str, target: &ServiceTarget) -> Result<Value, ExtractionError> {
    let body: Value = serde_json::from_str(raw).map_err(|e| ExtractionError::Malformed {
        target: target.to_string(),
        reason: e.to_string(),
    })?;

    if body.get("success").and_then(Value::as_bool) == Some(false) {
        let message = body
            .get("errors")
            .and_then(Value::as_array)
            .map(|errs| {
                errs.iter()
                    .filter_map(|e| e.get("message").and_then(Value::as_str))
                    .collect::<Vec<_>>()
                    .join("; ")
            })
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| "no error message".to_string());
        return Err(ExtractionError::ProviderFailure {
            target: target.to_string(),
            message,
        });
    }

    Ok(body)
}

fn read_count(body: &Value, path: &[&str], target: &ServiceTarget) -> Result<u64, ExtractionError> {
    let mut node = body;
    for (depth, key) in path.iter().enumerate() {
        node = match node.get(key) {
            Some(v) if !v.is_null() => v,
            _ => {
                return Err(ExtractionError::MissingField {
                    target: target.to_string(),
                    field: path[..=depth].join("."),
                })
            }
        };
    }

    // Counts occasionally arrive as floats with a zero fraction.
    let count = node.as_u64().or_else(|| {
        node.as_f64()
            .filter(|f| *f >= 0.0 && f.fract() == 0.0 && *f <= u64::MAX as f64)
            .map(|f| f as u64)
    });

    count.ok_or_else(|| ExtractionError::InvalidField {
        target: target.to_string(),
        field: path.join("."),
        found: node.to_string(),
    })
}

/// Names listed by a discovery endpoint (`result[].name`).
pub fn service_names(raw: &str, target: &ServiceTarget) -> Result<Vec<String>, ExtractionError> {
    let body = parse_envelope(raw, target)?;
    let items = body
        .get("result")
        .and_then(Value::as_array)
        .ok_or_else(|| ExtractionError::MissingField {
            target: target.to_string(),
            field: "result".into(),
        })?;

    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            item.get("name")
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| ExtractionError::MissingField {
                    target: target.to_string(),
                    field: format!("result[{}].name", i),
                })
        })
        .collect()
}
