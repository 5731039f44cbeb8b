//! Structured filter translation.
//!
//! A filter expression is an ordered list of single-field conditions, combined with AND:
//!
//! ```json
//! [{"category": {"$eq": "tech"}}, {"tags": {"$in": ["a", "b"]}}, {"price": {"$range": [10, 50]}}]
//! ```
//!
//! [`translate`] validates that shape and produces a [`WireFilter`], which serializes
//! back to exactly the same JSON. Translation is pure and deterministic, so feeding a
//! wire filter back through [`translate`] yields an identical value.

use serde::{Serialize, Serializer};
use serde_json::{Map, Number, Value};

use crate::error::{Error, Result};

pub const OP_EQ: &str = "$eq";
pub const OP_IN: &str = "$in";
pub const OP_RANGE: &str = "$range";

/// A single validated operator.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterOp {
    /// Exact match against a scalar.
    Eq(Value),
    /// Match any of the listed scalars. An empty list matches nothing.
    In(Vec<Value>),
    /// Inclusive numeric range. The original numbers are kept so integers stay integers.
    Range { min: Number, max: Number },
}

impl FilterOp {
    pub fn operator(&self) -> &'static str {
        match self {
            Self::Eq(_) => OP_EQ,
            Self::In(_) => OP_IN,
            Self::Range { .. } => OP_RANGE,
        }
    }

    fn operand(&self) -> Value {
        match self {
            Self::Eq(value) => value.clone(),
            Self::In(values) => Value::Array(values.clone()),
            Self::Range { min, max } => {
                Value::Array(vec![Value::Number(min.clone()), Value::Number(max.clone())])
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterCondition {
    pub field: String,
    pub op: FilterOp,
}

impl FilterCondition {
    pub fn to_value(&self) -> Value {
        let mut op = Map::new();
        op.insert(self.op.operator().to_string(), self.op.operand());
        let mut cond = Map::new();
        cond.insert(self.field.clone(), Value::Object(op));
        Value::Object(cond)
    }
}

/// Backend-native filter: an ordered conjunction of conditions.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WireFilter {
    conditions: Vec<FilterCondition>,
}

impl WireFilter {
    pub fn conditions(&self) -> &[FilterCondition] {
        &self.conditions
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// `true` when some condition can never match (an empty `$in`). Since conditions
    /// are AND-combined, the whole filter then matches nothing.
    pub fn is_unsatisfiable(&self) -> bool {
        self.conditions
            .iter()
            .any(|c| matches!(&c.op, FilterOp::In(values) if values.is_empty()))
    }

    pub fn to_value(&self) -> Value {
        Value::Array(self.conditions.iter().map(FilterCondition::to_value).collect())
    }

    /// JSON text form, as the search endpoint expects it.
    pub fn to_json_string(&self) -> String {
        self.to_value().to_string()
    }
}

impl Serialize for WireFilter {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

/// Translate a structured condition list into a [`WireFilter`].
///
/// Fails on the first invalid condition; no partial filter is ever returned.
pub fn translate(conditions: &[Value]) -> Result<WireFilter> {
    let conditions = conditions
        .iter()
        .enumerate()
        .map(|(position, condition)| translate_condition(position, condition))
        .collect::<Result<Vec<_>>>()?;
    Ok(WireFilter { conditions })
}

/// Like [`translate`], treating `None` as "no filter".
pub fn translate_optional(conditions: Option<&[Value]>) -> Result<Option<WireFilter>> {
    match conditions {
        Some(list) if !list.is_empty() => translate(list).map(Some),
        _ => Ok(None),
    }
}

fn translate_condition(position: usize, condition: &Value) -> Result<FilterCondition> {
    let malformed = |reason: String| Error::MalformedFilter { position, reason };

    let object = condition
        .as_object()
        .ok_or_else(|| malformed(format!("expected an object, got {}", json_kind(condition))))?;

    let mut entries = object.iter();
    let (field, op_value) = match (entries.next(), entries.next()) {
        (Some(entry), None) => entry,
        (None, _) => return Err(malformed("condition names no field".into())),
        (Some(_), Some(_)) => {
            return Err(malformed(format!(
                "expected exactly one field per condition, found {}",
                object.len()
            )))
        }
    };

    if field.is_empty() {
        return Err(malformed("field name is empty".into()));
    }

    let ops = op_value.as_object().ok_or_else(|| {
        malformed(format!(
            "operator for field '{field}' must be an object like {{\"$eq\": value}}"
        ))
    })?;

    if let Some(unknown) = ops
        .keys()
        .find(|k| !matches!(k.as_str(), OP_EQ | OP_IN | OP_RANGE))
    {
        return Err(Error::UnsupportedOperator {
            field: field.clone(),
            operator: unknown.clone(),
        });
    }

    let mut ops_iter = ops.iter();
    let (operator, operand) = match (ops_iter.next(), ops_iter.next()) {
        (Some(op), None) => op,
        _ => {
            return Err(malformed(format!(
                "field '{field}' must carry exactly one operator, found {}",
                ops.len()
            )))
        }
    };

    let op = match operator.as_str() {
        OP_EQ => {
            if !is_scalar(operand) {
                return Err(malformed(format!(
                    "$eq on field '{field}' needs a string, number or boolean"
                )));
            }
            FilterOp::Eq(operand.clone())
        }
        OP_IN => {
            let values = operand.as_array().ok_or_else(|| {
                malformed(format!("$in on field '{field}' needs an array of values"))
            })?;
            if let Some(bad) = values.iter().find(|v| !is_scalar(v)) {
                return Err(malformed(format!(
                    "$in on field '{field}' contains a non-scalar {}",
                    json_kind(bad)
                )));
            }
            FilterOp::In(values.clone())
        }
        OP_RANGE => translate_range(field, operand)?,
        _ => unreachable!("operator keys validated above"),
    };

    Ok(FilterCondition {
        field: field.clone(),
        op,
    })
}

fn translate_range(field: &str, operand: &Value) -> Result<FilterOp> {
    let invalid = |reason: &str| Error::InvalidRange {
        field: field.to_string(),
        reason: reason.to_string(),
    };

    let bounds = operand
        .as_array()
        .filter(|a| a.len() == 2)
        .ok_or_else(|| invalid("expected a [min, max] pair"))?;

    let (min, max) = match (&bounds[0], &bounds[1]) {
        (Value::Number(min), Value::Number(max)) => (min, max),
        _ => return Err(invalid("bounds must be numbers")),
    };

    let (lo, hi) = (number_as_f64(min), number_as_f64(max));
    if lo > hi {
        return Err(invalid(&format!("min {min} is greater than max {max}")));
    }

    Ok(FilterOp::Range {
        min: min.clone(),
        max: max.clone(),
    })
}

fn number_as_f64(n: &Number) -> f64 {
    // Every serde_json number converts; the fallback only covers arbitrary precision.
    n.as_f64().unwrap_or(f64::NAN)
}

fn is_scalar(value: &Value) -> bool {
    matches!(value, Value::String(_) | Value::Number(_) | Value::Bool(_))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn conditions(value: Value) -> Vec<Value> {
        value.as_array().cloned().unwrap()
    }

    #[test]
    fn well_formed_filter_round_trips() {
        let input = json!([
            {"category": {"$eq": "tech"}},
            {"tags": {"$in": ["rust", "db", 3]}},
            {"price": {"$range": [10, 50.5]}},
            {"active": {"$eq": true}}
        ]);
        let wire = translate(&conditions(input.clone())).unwrap();
        assert_eq!(wire.to_value(), input);
        assert_eq!(serde_json::to_value(&wire).unwrap(), input);
    }

    #[test]
    fn translation_is_idempotent() {
        let input = conditions(json!([
            {"b": {"$range": [1, 1]}},
            {"a": {"$eq": "x"}}
        ]));
        let once = translate(&input).unwrap();
        let twice = translate(&conditions(once.to_value())).unwrap();
        assert_eq!(once, twice);
        assert_eq!(once.to_json_string(), twice.to_json_string());
    }

    #[test]
    fn order_is_preserved() {
        let wire = translate(&conditions(json!([
            {"z": {"$eq": 1}},
            {"a": {"$eq": 2}},
            {"m": {"$eq": 3}}
        ])))
        .unwrap();
        let fields: Vec<&str> = wire.conditions().iter().map(|c| c.field.as_str()).collect();
        assert_eq!(fields, vec!["z", "a", "m"]);
    }

    #[test]
    fn unknown_operator_names_field() {
        let err = translate(&conditions(json!([
            {"category": {"$eq": "tech"}},
            {"price": {"$gt": 10}}
        ])))
        .unwrap_err();
        assert_eq!(
            err,
            Error::UnsupportedOperator {
                field: "price".into(),
                operator: "$gt".into()
            }
        );
    }

    #[test]
    fn unknown_operator_wins_over_extra_keys() {
        let err = translate(&conditions(json!([
            {"price": {"$eq": 1, "$ne": 2}}
        ])))
        .unwrap_err();
        assert!(matches!(err, Error::UnsupportedOperator { ref field, .. } if field == "price"));
    }

    #[test]
    fn range_min_greater_than_max_fails() {
        let err = translate(&conditions(json!([{"price": {"$range": [50, 10]}}]))).unwrap_err();
        assert!(matches!(err, Error::InvalidRange { ref field, .. } if field == "price"));
    }

    #[test]
    fn range_equal_bounds_accepted() {
        let wire = translate(&conditions(json!([{"year": {"$range": [2024, 2024]}}]))).unwrap();
        assert_eq!(
            wire.conditions()[0].op,
            FilterOp::Range {
                min: Number::from(2024),
                max: Number::from(2024)
            }
        );
    }

    #[test]
    fn range_requires_numeric_pair() {
        for bad in [
            json!([{"p": {"$range": [1]}}]),
            json!([{"p": {"$range": [1, 2, 3]}}]),
            json!([{"p": {"$range": ["a", "b"]}}]),
            json!([{"p": {"$range": 5}}]),
        ] {
            let err = translate(&conditions(bad)).unwrap_err();
            assert!(matches!(err, Error::InvalidRange { .. }), "got {err:?}");
        }
    }

    #[test]
    fn empty_in_is_legal_and_unsatisfiable() {
        let wire = translate(&conditions(json!([{"status": {"$in": []}}]))).unwrap();
        assert!(wire.is_unsatisfiable());
        assert_eq!(wire.to_value(), json!([{"status": {"$in": []}}]));

        let wire = translate(&conditions(json!([{"status": {"$in": ["open"]}}]))).unwrap();
        assert!(!wire.is_unsatisfiable());
    }

    #[test]
    fn structural_errors_are_malformed() {
        for (bad, position) in [
            (json!(["not an object"]), 0),
            (json!([{"a": {"$eq": 1}}, {}]), 1),
            (json!([{"a": {"$eq": 1}, "b": {"$eq": 2}}]), 0),
            (json!([{"a": "plain"}]), 0),
            (json!([{"a": {}}]), 0),
            (json!([{"a": {"$eq": 1, "$in": [1]}}]), 0),
            (json!([{"a": {"$eq": null}}]), 0),
            (json!([{"a": {"$in": [[1]]}}]), 0),
            (json!([{"": {"$eq": 1}}]), 0),
        ] {
            let err = translate(&conditions(bad.clone())).unwrap_err();
            assert!(
                matches!(err, Error::MalformedFilter { position: p, .. } if p == position),
                "{bad} gave {err:?}"
            );
        }
    }

    #[test]
    fn optional_empty_is_none() {
        assert_eq!(translate_optional(None).unwrap(), None);
        assert_eq!(translate_optional(Some(&[])).unwrap(), None);
        assert!(translate_optional(Some(&[json!({"a": {"$eq": 1}})]))
            .unwrap()
            .is_some());
    }
}
