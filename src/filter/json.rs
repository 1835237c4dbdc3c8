//! Builds a `Filter` from the JSON tree representation accepted by the
//! query endpoint as an alternative to the compact text syntax — the
//! same two-representations-one-tree approach as `filter/parser.rs`,
//! just with `serde_json` instead of a hand-rolled tokenizer.
//!
//! ```json
//! {"and": [{"type": "text/plain"}, {"not": {"meta-file": true}}]}
//! ```

use crate::error::{SlnError, SlnResult};
use serde_json::Value;

use super::tree::Filter;

pub fn build(value: &Value) -> SlnResult<Filter> {
    let obj = value
        .as_object()
        .ok_or_else(|| SlnError::Einval("filter JSON must be an object".into()))?;
    if obj.len() != 1 {
        return Err(SlnError::Einval("filter JSON object must have exactly one key".into()));
    }
    let (key, val) = obj.iter().next().expect("checked len == 1");

    match key.as_str() {
        "all" => Ok(Filter::All),
        "meta-file" => Ok(Filter::MetaFile),
        "type" => Ok(Filter::FileType(expect_str(val, "type")?)),
        "links-to" => Ok(Filter::LinksTo(expect_str(val, "links-to")?)),
        "linked-from" => Ok(Filter::LinkedFrom(expect_str(val, "linked-from")?)),
        "badge" => {
            let obj = val
                .as_object()
                .ok_or_else(|| SlnError::Einval("badge filter must be an object with field/value".into()))?;
            let field = obj
                .get("field")
                .and_then(Value::as_str)
                .ok_or_else(|| SlnError::Einval("badge filter missing \"field\"".into()))?;
            let value = obj
                .get("value")
                .and_then(Value::as_str)
                .ok_or_else(|| SlnError::Einval("badge filter missing \"value\"".into()))?;
            Ok(Filter::Badge { field: field.to_string(), value: value.to_string() })
        }
        "and" => Ok(Filter::and(build_list(val)?)),
        "or" => Ok(Filter::or(build_list(val)?)),
        "not" => Ok(Filter::not(build(val)?)),
        other => Err(SlnError::Einval(format!("unrecognized filter key: {other}"))),
    }
}

fn expect_str(value: &Value, key: &str) -> SlnResult<String> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| SlnError::Einval(format!("filter key \"{key}\" expects a string value")))
}

fn build_list(value: &Value) -> SlnResult<Vec<Filter>> {
    let items = value
        .as_array()
        .ok_or_else(|| SlnError::Einval("and/or filter expects an array".into()))?;
    items.iter().map(build).collect()
}
