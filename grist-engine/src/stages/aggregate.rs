//! Aggregation stage
//!
//! Computes the requested operations over the numeric values of each
//! aggregation parameter. Value order follows original record order, which
//! `first`/`last`/`mode` depend on. Null/absent values are excluded; `count`
//! and `unique` return 0 on an empty value set, every other operation
//! returns null.

use std::collections::HashMap;

use grist_core::domain::process::{AggregateOp, AggregationSpec};
use grist_core::domain::record::Record;
use serde::{Deserialize, Serialize};

use crate::error::ExecError;
use crate::stages::coerce_number;

/// Aggregation results for one parameter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterAggregates {
    pub property: String,
    /// Operation name → value; null when the operation is undefined for the
    /// value set (e.g. mean of nothing, sample variance of one value).
    pub results: serde_json::Map<String, serde_json::Value>,
}

/// Compute every requested aggregation over `records`.
pub fn apply(
    records: &[&Record],
    specs: &[AggregationSpec],
) -> Result<Vec<ParameterAggregates>, ExecError> {
    let mut output = Vec::with_capacity(specs.len());
    for spec in specs {
        let mut values = Vec::new();
        for record in records {
            if let Some(v) = coerce_number(&spec.name, record.data.get(&spec.name))? {
                values.push(v);
            }
        }

        let mut results = serde_json::Map::new();
        for op in &spec.operations {
            let value = match compute(&values, *op) {
                Some(v) => serde_json::json!(v),
                None => serde_json::Value::Null,
            };
            results.insert(op.to_string(), value);
        }
        output.push(ParameterAggregates {
            property: spec.name.clone(),
            results,
        });
    }
    Ok(output)
}

/// Compute one operation over an ordered value set.
pub fn compute(values: &[f64], op: AggregateOp) -> Option<f64> {
    match op {
        AggregateOp::Count => Some(values.len() as f64),
        AggregateOp::Unique => Some(distinct_count(values) as f64),
        _ if values.is_empty() => None,
        AggregateOp::Sum => Some(values.iter().sum()),
        AggregateOp::Min => Some(values.iter().copied().fold(f64::INFINITY, f64::min)),
        AggregateOp::Max => Some(values.iter().copied().fold(f64::NEG_INFINITY, f64::max)),
        AggregateOp::Mean => Some(values.iter().sum::<f64>() / values.len() as f64),
        AggregateOp::Median => Some(median(values)),
        AggregateOp::Std => sample_variance(values).map(f64::sqrt),
        AggregateOp::Var => sample_variance(values),
        AggregateOp::First => values.first().copied(),
        AggregateOp::Last => values.last().copied(),
        AggregateOp::Mode => mode(values),
        AggregateOp::Range => {
            let min = values.iter().copied().fold(f64::INFINITY, f64::min);
            let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            Some(max - min)
        }
    }
}

fn distinct_count(values: &[f64]) -> usize {
    let mut seen = std::collections::HashSet::new();
    for v in values {
        seen.insert(v.to_bits());
    }
    seen.len()
}

fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        sorted[mid]
    } else {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    }
}

/// Sample variance (n - 1 denominator); undefined for fewer than two values.
fn sample_variance(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let squared: f64 = values.iter().map(|v| (v - mean) * (v - mean)).sum();
    Some(squared / (values.len() - 1) as f64)
}

/// Most frequent value; ties broken by first encounter.
fn mode(values: &[f64]) -> Option<f64> {
    let mut counts: HashMap<u64, (usize, usize)> = HashMap::new();
    for (i, v) in values.iter().enumerate() {
        let entry = counts.entry(v.to_bits()).or_insert((0, i));
        entry.0 += 1;
    }
    counts
        .into_iter()
        .max_by(|a, b| a.1.0.cmp(&b.1.0).then(b.1.1.cmp(&a.1.1)))
        .map(|(bits, _)| f64::from_bits(bits))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn record(amount: f64) -> Record {
        let mut data = serde_json::Map::new();
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

    #[test]
    fn test_numeric_correctness_over_one_to_five() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(compute(&values, AggregateOp::Sum), Some(15.0));
        assert_eq!(compute(&values, AggregateOp::Mean), Some(3.0));
        assert_eq!(compute(&values, AggregateOp::Median), Some(3.0));
        assert_eq!(compute(&values, AggregateOp::Min), Some(1.0));
        assert_eq!(compute(&values, AggregateOp::Max), Some(5.0));
        assert_eq!(compute(&values, AggregateOp::Range), Some(4.0));
        assert_eq!(compute(&values, AggregateOp::Count), Some(5.0));
        assert_eq!(compute(&values, AggregateOp::Var), Some(2.5));

        let std = compute(&values, AggregateOp::Std).unwrap();
        assert!((std - 2.5f64.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn test_median_of_even_count_averages_middles() {
        assert_eq!(compute(&[1.0, 2.0, 3.0, 4.0], AggregateOp::Median), Some(2.5));
    }

    #[test]
    fn test_first_last_follow_record_order() {
        let values = [7.0, 3.0, 9.0];
        assert_eq!(compute(&values, AggregateOp::First), Some(7.0));
        assert_eq!(compute(&values, AggregateOp::Last), Some(9.0));
    }

    #[test]
    fn test_mode_ties_break_by_first_encountered() {
        assert_eq!(compute(&[2.0, 1.0, 1.0, 2.0], AggregateOp::Mode), Some(2.0));
        assert_eq!(compute(&[5.0, 5.0, 1.0], AggregateOp::Mode), Some(5.0));
    }

    #[test]
    fn test_unique_counts_distinct_values() {
        assert_eq!(
            compute(&[1.0, 1.0, 2.0, 3.0, 3.0], AggregateOp::Unique),
            Some(3.0)
        );
    }

    #[test]
    fn test_empty_input_yields_zero_counts_and_null_rest() {
        assert_eq!(compute(&[], AggregateOp::Count), Some(0.0));
        assert_eq!(compute(&[], AggregateOp::Unique), Some(0.0));
        assert_eq!(compute(&[], AggregateOp::Sum), None);
        assert_eq!(compute(&[], AggregateOp::Mean), None);
        assert_eq!(compute(&[], AggregateOp::Mode), None);
    }

    #[test]
    fn test_sample_statistics_undefined_for_single_value() {
        assert_eq!(compute(&[4.0], AggregateOp::Std), None);
        assert_eq!(compute(&[4.0], AggregateOp::Var), None);
    }

    #[test]
    fn test_apply_skips_null_values_and_reports_per_parameter() {
        let mut with_null = record(0.0);
        with_null
            .data
            .insert("amount".to_string(), serde_json::Value::Null);
        let records = [record(10.0), with_null, record(20.0)];
        let refs: Vec<&Record> = records.iter().collect();

        let specs = vec![AggregationSpec {
            name: "amount".to_string(),
            operations: vec![AggregateOp::Count, AggregateOp::Sum],
        }];
        let output = apply(&refs, &specs).unwrap();

        assert_eq!(output.len(), 1);
        assert_eq!(output[0].property, "amount");
        assert_eq!(output[0].results["count"], serde_json::json!(2.0));
        assert_eq!(output[0].results["sum"], serde_json::json!(30.0));
    }
}
