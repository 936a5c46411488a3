//! Server envelope normalization.
//!
//! The backend is inconsistent about response shapes: a payload may be a
//! bare object, wrapped under `data`, nested under a resource-specific key,
//! or a keyed list alongside `total`/`limit`. These two functions are the
//! only place that knowledge lives; every call site gets exactly a typed
//! entity or a canonical `Page<T>`.

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::warn;

use crate::error::ApiError;

use super::types::{ListParams, Page};

/// Strip an optional `{data: ...}` wrapper.
pub fn unwrap_data(value: Value) -> Value {
    match value {
        Value::Object(mut map) if map.contains_key("data") => {
            map.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    }
}

/// Decode a single entity, unwrapping `data` and an optional
/// resource-specific key first.
///
/// Missing required fields (notably `id`) fail with `ValidationFailed`;
/// optional fields take their typed defaults.
pub fn decode_entity<T: DeserializeOwned>(raw: Value, key: Option<&str>) -> Result<T, ApiError> {
    let mut value = unwrap_data(raw);

    if let Some(key) = key {
        if let Value::Object(ref mut map) = value {
            if let Some(inner) = map.remove(key) {
                value = inner;
            }
        }
    }

    serde_json::from_value(value)
        .map_err(|e| ApiError::validation(format!("malformed response: {}", e)))
}

/// Decode a list response into the canonical page shape.
///
/// Re-normalizing an already-canonical page returns it unchanged. The
/// server-reported `limit` wins over the requested page size when present;
/// the final fallback is 1 and the resolved page size is never 0.
pub fn decode_page<T: DeserializeOwned>(
    raw: Value,
    key: &str,
    params: &ListParams,
) -> Result<Page<T>, ApiError> {
    if is_canonical_page(&raw) {
        return from_value(raw);
    }

    let unwrapped = unwrap_data(raw);
    if is_canonical_page(&unwrapped) {
        return from_value(unwrapped);
    }

    let page = params.page.unwrap_or(1).max(1);

    let (list, total, limit) = match unwrapped {
        // Keyed list alongside total/limit.
        Value::Object(mut map) => {
            let list = map.remove(key);
            let total = map.get("total").and_then(Value::as_u64);
            let limit = map
                .get("limit")
                .and_then(Value::as_u64)
                .map(|l| l.min(u32::MAX as u64) as u32);
            (list, total, limit)
        }
        // A bare array carries no count envelope; its length is the total.
        Value::Array(items) => {
            let len = items.len() as u64;
            (Some(Value::Array(items)), Some(len), None)
        }
        _ => (None, None, None),
    };

    let page_size = resolve_page_size(limit, params.page_size);

    let total = match total {
        Some(total) => total,
        None => return Ok(Page::empty(page, page_size)),
    };

    let mut items: Vec<T> = match list {
        Some(list) => serde_json::from_value(list)
            .map_err(|e| ApiError::validation(format!("malformed list response: {}", e)))?,
        None => Vec::new(),
    };

    if items.len() > page_size as usize {
        warn!(
            key = key,
            items = items.len(),
            page_size = page_size,
            "server returned more items than the page size, truncating"
        );
        items.truncate(page_size as usize);
    }

    Ok(Page {
        items,
        total,
        page,
        page_size,
        total_pages: total_pages(total, page_size),
    })
}

/// `page_size = limit ?? requested ?? 1`, skipping non-positive values.
fn resolve_page_size(limit: Option<u32>, requested: Option<u32>) -> u32 {
    [limit, requested]
        .into_iter()
        .flatten()
        .find(|size| *size > 0)
        .unwrap_or(1)
}

fn total_pages(total: u64, page_size: u32) -> u32 {
    let pages = total.div_ceil(page_size as u64);
    pages.min(u32::MAX as u64) as u32
}

fn is_canonical_page(value: &Value) -> bool {
    match value {
        Value::Object(map) => ["items", "total", "page", "page_size", "total_pages"]
            .iter()
            .all(|field| map.contains_key(*field)),
        _ => false,
    }
}

fn from_value<T: DeserializeOwned>(value: Value) -> Result<Page<T>, ApiError> {
    serde_json::from_value(value)
        .map_err(|e| ApiError::validation(format!("malformed page response: {}", e)))
}
