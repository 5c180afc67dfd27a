//! Key values as comparable tokens.
//!
//! Rows from different sources disagree on scalar representation (`1` vs `"1"`),
//! so keys are compared by their textual form. A null component never matches.

use crate::error::OrmError;
use crate::executor::Row;
use serde_json::Value as JsonValue;

pub(crate) fn token(v: &JsonValue) -> Option<String> {
    match v {
        JsonValue::Null => None,
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Bool(b) => Some(if *b { "1" } else { "0" }.to_string()),
        other => Some(other.to_string()),
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) struct KeyTuple(Vec<String>);

impl KeyTuple {
    pub(crate) fn from_values(values: &[JsonValue]) -> Option<Self> {
        values.iter().map(token).collect::<Option<Vec<_>>>().map(KeyTuple)
    }

    pub(crate) fn from_row(row: &Row, columns: &[String]) -> Option<Self> {
        columns
            .iter()
            .map(|c| row.get(c).and_then(token))
            .collect::<Option<Vec<_>>>()
            .map(KeyTuple)
    }
}

/// Split a key given as one value (single-column keys) or an array (composite keys).
pub(crate) fn key_parts(key: &JsonValue, arity: usize) -> Result<Vec<JsonValue>, OrmError> {
    match key {
        JsonValue::Array(parts) if parts.len() == arity => Ok(parts.clone()),
        JsonValue::Array(parts) if arity > 1 => Err(OrmError::KeyArity {
            expected: arity,
            got: parts.len(),
        }),
        single if arity == 1 => Ok(vec![single.clone()]),
        _ => Err(OrmError::KeyArity { expected: arity, got: 1 }),
    }
}

/// Distinct non-null key tuples of `columns` across `rows`, in first-seen order.
pub(crate) fn distinct_keys(rows: &[Row], columns: &[String]) -> Vec<Vec<JsonValue>> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for row in rows {
        let Some(tuple) = KeyTuple::from_row(row, columns) else { continue };
        if seen.insert(tuple) {
            out.push(columns.iter().map(|c| row.get(c).cloned().unwrap_or(JsonValue::Null)).collect());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(pairs: &[(&str, JsonValue)]) -> Row {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn numbers_and_numeric_strings_match() {
        assert_eq!(KeyTuple::from_values(&[json!(1)]), KeyTuple::from_values(&[json!("1")]));
        assert_ne!(KeyTuple::from_values(&[json!("007")]), KeyTuple::from_values(&[json!(7)]));
        assert_eq!(KeyTuple::from_values(&[json!(1), JsonValue::Null]), None);
    }

    #[test]
    fn splits_single_and_composite_keys() {
        assert_eq!(key_parts(&json!(5), 1).unwrap(), vec![json!(5)]);
        assert_eq!(key_parts(&json!([5]), 1).unwrap(), vec![json!(5)]);
        assert_eq!(key_parts(&json!([1, "a"]), 2).unwrap(), vec![json!(1), json!("a")]);
        assert!(matches!(
            key_parts(&json!([1]), 2),
            Err(OrmError::KeyArity { expected: 2, got: 1 })
        ));
    }

    #[test]
    fn distinct_keys_skip_nulls_and_duplicates() {
        let rows = vec![
            row(&[("user_id", json!(2))]),
            row(&[("user_id", json!(1))]),
            row(&[("user_id", json!(2))]),
            row(&[("user_id", JsonValue::Null)]),
        ];
        let cols = vec!["user_id".to_string()];
        assert_eq!(distinct_keys(&rows, &cols), vec![vec![json!(2)], vec![json!(1)]]);
    }
}
