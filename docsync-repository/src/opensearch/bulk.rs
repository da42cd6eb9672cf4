//! Bulk request body and response handling.
//!
//! The bulk body is newline-delimited JSON: an action header per operation,
//! followed by the document for index/create, `{"doc": ...}` for update and
//! nothing for delete.

use docsync_shared::BulkAction;
use serde_json::{json, Value};

use crate::errors::SearchError;
use crate::types::{BulkItemResult, BulkOperation, BulkResponse, ItemError};

/// Build the lines of a bulk request body.
pub fn build_bulk_body(operations: &[BulkOperation]) -> Vec<Value> {
    let mut body = Vec::with_capacity(operations.len() * 2);

    for op in operations {
        body.push(json!({ op.action.as_str(): { "_index": op.index, "_id": op.id } }));

        match (op.action, &op.source) {
            (BulkAction::Delete, _) => {}
            (BulkAction::Update, Some(doc)) => body.push(json!({ "doc": doc })),
            (BulkAction::Update, None) => body.push(json!({ "doc": {} })),
            (_, Some(source)) => body.push(source.clone()),
            (_, None) => body.push(json!({})),
        }
    }

    body
}

/// Parse a bulk response body.
///
/// Items are matched to `operations` by position; the backend answers in
/// request order.
pub fn parse_bulk_response(
    operations: &[BulkOperation],
    response: &Value,
) -> Result<BulkResponse, SearchError> {
    let items = response
        .get("items")
        .and_then(Value::as_array)
        .ok_or_else(|| SearchError::parse("bulk response has no items"))?;

    if items.len() != operations.len() {
        return Err(SearchError::parse(format!(
            "bulk response has {} items for {} operations",
            items.len(),
            operations.len()
        )));
    }

    let items = items
        .iter()
        .zip(operations)
        .map(|(item, op)| parse_item(item, op))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(BulkResponse {
        took: response.get("took").and_then(Value::as_u64).unwrap_or(0),
        items,
    })
}

fn parse_item(item: &Value, op: &BulkOperation) -> Result<BulkItemResult, SearchError> {
    let body = item
        .get(op.action.as_str())
        .or_else(|| item.as_object().and_then(|obj| obj.values().next()))
        .ok_or_else(|| SearchError::parse(format!("malformed bulk item for id {}", op.id)))?;

    let status = body
        .get("status")
        .and_then(Value::as_u64)
        .ok_or_else(|| SearchError::parse(format!("bulk item for id {} has no status", op.id)))?;

    let error = body.get("error").map(|error| match error {
        Value::String(reason) => ItemError {
            kind: "error".to_string(),
            reason: reason.clone(),
        },
        other => ItemError {
            kind: other
                .get("type")
                .and_then(Value::as_str)
                .unwrap_or("unknown_error")
                .to_string(),
            reason: other
                .get("reason")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        },
    });

    Ok(BulkItemResult {
        action: op.action,
        index: body
            .get("_index")
            .and_then(Value::as_str)
            .unwrap_or(&op.index)
            .to_string(),
        id: op.id.clone(),
        status: status as u16,
        result: body.get("result").and_then(Value::as_str).map(str::to_string),
        error,
    })
}
