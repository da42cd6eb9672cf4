//! Search and validate-query response handling.

use serde_json::Value;

use crate::errors::SearchError;
use crate::types::{QueryValidation, SearchHit, SearchResponse};

/// Parse a search response body.
pub fn parse_search_response(response: &Value) -> Result<SearchResponse, SearchError> {
    let hits = response
        .get("hits")
        .ok_or_else(|| SearchError::parse("search response has no hits"))?;

    // `total` is an object since OpenSearch 1.0, a bare number before.
    let total = match hits.get("total") {
        Some(Value::Number(n)) => n.as_u64().unwrap_or_default(),
        Some(total) => total.get("value").and_then(Value::as_u64).unwrap_or_default(),
        None => 0,
    };

    let hits = hits
        .get("hits")
        .and_then(Value::as_array)
        .map(|hits| hits.iter().filter_map(parse_hit).collect())
        .unwrap_or_default();

    Ok(SearchResponse {
        took: response.get("took").and_then(Value::as_u64).unwrap_or_default(),
        total,
        hits,
    })
}

fn parse_hit(hit: &Value) -> Option<SearchHit> {
    Some(SearchHit {
        index: hit.get("_index").and_then(Value::as_str).unwrap_or_default().to_string(),
        id: hit.get("_id").and_then(Value::as_str)?.to_string(),
        score: hit.get("_score").and_then(Value::as_f64),
        source: hit.get("_source").cloned(),
    })
}

/// Parse a validate-query response requested with `explain`.
///
/// A top-level `error` wins; otherwise the per-index explanations of the
/// failing indices are reported.
pub fn parse_validation(response: &Value) -> QueryValidation {
    let valid = response.get("valid").and_then(Value::as_bool).unwrap_or(false);
    if valid {
        return QueryValidation {
            valid,
            errors: Vec::new(),
        };
    }

    if let Some(error) = response.get("error").and_then(Value::as_str) {
        return QueryValidation {
            valid,
            errors: vec![error.to_string()],
        };
    }

    let errors = response
        .get("explanations")
        .and_then(Value::as_array)
        .map(|explanations| {
            explanations
                .iter()
                .filter(|e| !e.get("valid").and_then(Value::as_bool).unwrap_or(false))
                .filter_map(|e| {
                    e.get("error")
                        .or_else(|| e.get("explanation"))
                        .and_then(Value::as_str)
                        .map(str::to_string)
                })
                .collect()
        })
        .unwrap_or_default();

    QueryValidation { valid, errors }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_search_response() {
        let response = json!({
            "took": 3,
            "hits": {
                "total": {"value": 12, "relation": "eq"},
                "hits": [
                    {"_index": "country--v2", "_id": "7", "_score": 2.5},
                    {"_index": "country--v2", "_id": "3", "_score": 1.0, "_source": {"name": "Spain"}}
                ]
            }
        });

        let parsed = parse_search_response(&response).unwrap();
        assert_eq!(parsed.took, 3);
        assert_eq!(parsed.total, 12);
        assert_eq!(parsed.ids(), vec!["7", "3"]);
        assert_eq!(parsed.hits[0].source, None);
        assert_eq!(parsed.hits[1].source, Some(json!({"name": "Spain"})));
    }

    #[test]
    fn test_parse_legacy_total() {
        let parsed = parse_search_response(&json!({"hits": {"total": 4, "hits": []}})).unwrap();
        assert_eq!(parsed.total, 4);
        assert!(parsed.hits.is_empty());

        assert!(parse_search_response(&json!({"took": 1})).is_err());
    }

    #[test]
    fn test_parse_validation() {
        assert_eq!(
            parse_validation(&json!({"valid": true, "explanations": []})),
            QueryValidation {
                valid: true,
                errors: Vec::new()
            }
        );

        let top_level = parse_validation(&json!({"valid": false, "error": "no [query] registered for [mtch]"}));
        assert!(!top_level.valid);
        assert_eq!(top_level.errors, vec!["no [query] registered for [mtch]"]);

        let explained = parse_validation(&json!({
            "valid": false,
            "explanations": [
                {"index": "country", "valid": false, "error": "failed to parse date"},
                {"index": "country--v2", "valid": true, "explanation": "+*:*"}
            ]
        }));
        assert_eq!(explained.errors, vec!["failed to parse date"]);
    }
}
