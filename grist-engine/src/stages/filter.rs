//! Filter stage
//!
//! Applies the conjunction of all filter conditions to each record: a record
//! passes iff every condition evaluates true. Records missing a referenced
//! field fail that condition (except for the explicit "match anything"
//! value). `contains` is a case-sensitive substring test.

use grist_core::domain::process::FilterOperator;
use grist_core::domain::record::Record;

use crate::error::ExecError;
use crate::stages::{coerce_number, coerce_text};
use crate::validator::{FilterValue, ResolvedFilter};

/// Apply the conjunction of `conditions` to `records`.
pub fn apply(records: &[Record], conditions: &[ResolvedFilter]) -> Result<Vec<Record>, ExecError> {
    let mut passed = Vec::new();
    for record in records {
        if matches(record, conditions)? {
            passed.push(record.clone());
        }
    }
    Ok(passed)
}

fn matches(record: &Record, conditions: &[ResolvedFilter]) -> Result<bool, ExecError> {
    for condition in conditions {
        if !evaluate(record, condition)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn evaluate(record: &Record, condition: &ResolvedFilter) -> Result<bool, ExecError> {
    let value = record.data.get(&condition.name);
    match &condition.value {
        FilterValue::Any => Ok(true),
        FilterValue::Number(target) => {
            let Some(actual) = coerce_number(&condition.name, value)? else {
                return Ok(false);
            };
            Ok(compare(actual, *target, condition.operator))
        }
        FilterValue::Text(target) => {
            let Some(actual) = coerce_text(&condition.name, value)? else {
                return Ok(false);
            };
            Ok(match condition.operator {
                FilterOperator::Eq => actual == *target,
                FilterOperator::Ne => actual != *target,
                FilterOperator::Contains => actual.contains(target.as_str()),
                // Validation never resolves a numeric operator to a text value.
                _ => false,
            })
        }
    }
}

fn compare(actual: f64, target: f64, operator: FilterOperator) -> bool {
    match operator {
        FilterOperator::Eq => actual == target,
        FilterOperator::Ne => actual != target,
        FilterOperator::Gt => actual > target,
        FilterOperator::Lt => actual < target,
        FilterOperator::Ge => actual >= target,
        FilterOperator::Le => actual <= target,
        FilterOperator::Contains => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grist_core::domain::repository::ParameterKind;
    use chrono::Utc;
    use uuid::Uuid;

    fn record(status: &str, amount: f64) -> Record {
        let mut data = serde_json::Map::new();
        data.insert("status".to_string(), serde_json::json!(status));
        data.insert("amount".to_string(), serde_json::json!(amount));
        Record {
            id: Uuid::new_v4(),
            repository_id: Uuid::new_v4(),
            data,
            version: 1,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn condition(
        name: &str,
        kind: ParameterKind,
        operator: FilterOperator,
        value: FilterValue,
    ) -> ResolvedFilter {
        ResolvedFilter {
            name: name.to_string(),
            kind,
            operator,
            value,
        }
    }

    fn records() -> Vec<Record> {
        vec![
            record("active", 10.0),
            record("active", 20.0),
            record("inactive", 5.0),
        ]
    }

    #[test]
    fn test_conjunction_keeps_only_records_matching_all_conditions() {
        let conditions = vec![
            condition(
                "status",
                ParameterKind::String,
                FilterOperator::Eq,
                FilterValue::Text("active".to_string()),
            ),
            condition(
                "amount",
                ParameterKind::Number,
                FilterOperator::Gt,
                FilterValue::Number(15.0),
            ),
        ];

        let result = apply(&records(), &conditions).unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].data["amount"], serde_json::json!(20.0));
    }

    #[test]
    fn test_condition_order_does_not_change_result() {
        let a = condition(
            "status",
            ParameterKind::String,
            FilterOperator::Eq,
            FilterValue::Text("active".to_string()),
        );
        let b = condition(
            "amount",
            ParameterKind::Number,
            FilterOperator::Le,
            FilterValue::Number(10.0),
        );

        let recs = records();
        let forward = apply(&recs, &[a.clone(), b.clone()]).unwrap();
        let reverse = apply(&recs, &[b, a]).unwrap();

        let forward_ids: Vec<_> = forward.iter().map(|r| r.id).collect();
        let reverse_ids: Vec<_> = reverse.iter().map(|r| r.id).collect();
        assert_eq!(forward_ids, reverse_ids);
    }

    #[test]
    fn test_empty_string_equality_matches_every_record() {
        let conditions = vec![condition(
            "status",
            ParameterKind::String,
            FilterOperator::Eq,
            FilterValue::Any,
        )];

        let result = apply(&records(), &conditions).unwrap();
        assert_eq!(result.len(), 3);
    }

    #[test]
    fn test_contains_is_case_sensitive() {
        let conditions = vec![condition(
            "status",
            ParameterKind::String,
            FilterOperator::Contains,
            FilterValue::Text("Act".to_string()),
        )];
        assert!(apply(&records(), &conditions).unwrap().is_empty());

        let conditions = vec![condition(
            "status",
            ParameterKind::String,
            FilterOperator::Contains,
            FilterValue::Text("act".to_string()),
        )];
        assert_eq!(apply(&records(), &conditions).unwrap().len(), 3);
    }

    #[test]
    fn test_record_missing_field_fails_condition() {
        let mut bare = record("active", 1.0);
        bare.data.remove("amount");
        let conditions = vec![condition(
            "amount",
            ParameterKind::Number,
            FilterOperator::Ge,
            FilterValue::Number(0.0),
        )];
        assert!(apply(&[bare], &conditions).unwrap().is_empty());
    }

    #[test]
    fn test_uncoercible_value_is_a_type_error() {
        let mut bad = record("active", 1.0);
        bad.data
            .insert("amount".to_string(), serde_json::json!("not-a-number"));
        let conditions = vec![condition(
            "amount",
            ParameterKind::Number,
            FilterOperator::Ge,
            FilterValue::Number(0.0),
        )];
        assert!(matches!(
            apply(&[bad], &conditions),
            Err(ExecError::TypeCoercion { .. })
        ));
    }
}
