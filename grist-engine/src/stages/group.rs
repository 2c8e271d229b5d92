//! Group stage
//!
//! Partitions a record set into buckets keyed by the tuple of group-parameter
//! values. The resolved keys arrive sorted by name, so the composite key is
//! independent of the order the client listed the parameters in. Buckets
//! preserve first-encounter order.

use std::collections::HashMap;

use grist_core::domain::record::Record;
use grist_core::domain::repository::ParameterKind;

use crate::error::ExecError;
use crate::stages::{coerce_number, coerce_text};
use crate::validator::ResolvedKey;

/// Separator between key parts; never appears in rendered values.
const KEY_SEPARATOR: char = '\x1f';

/// One group bucket: the composite key and the member records.
#[derive(Debug)]
pub struct Bucket<'a> {
    pub key: String,
    pub members: Vec<&'a Record>,
}

/// Partition `records` into buckets by the values of `keys`.
pub fn apply<'a>(records: &'a [Record], keys: &[ResolvedKey]) -> Result<Vec<Bucket<'a>>, ExecError> {
    let mut buckets: Vec<Bucket<'a>> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for record in records {
        let key = composite_key(record, keys)?;
        match index.get(&key) {
            Some(&i) => buckets[i].members.push(record),
            None => {
                index.insert(key.clone(), buckets.len());
                buckets.push(Bucket {
                    key,
                    members: vec![record],
                });
            }
        }
    }

    Ok(buckets)
}

fn composite_key(record: &Record, keys: &[ResolvedKey]) -> Result<String, ExecError> {
    let mut parts = Vec::with_capacity(keys.len());
    for key in keys {
        let value = record.data.get(&key.name);
        let part = match key.kind {
            // Numbers render through f64 so 10 and 10.0 land in one bucket.
            ParameterKind::Number => coerce_number(&key.name, value)?
                .map(|n| n.to_string())
                .unwrap_or_default(),
            ParameterKind::String => coerce_text(&key.name, value)?.unwrap_or_default(),
        };
        parts.push(part);
    }
    Ok(parts.join(&KEY_SEPARATOR.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn record(status: &str, region: &str, amount: f64) -> Record {
        let mut data = serde_json::Map::new();
        data.insert("status".to_string(), serde_json::json!(status));
        data.insert("region".to_string(), serde_json::json!(region));
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

    fn keys(names: &[(&str, ParameterKind)]) -> Vec<ResolvedKey> {
        names
            .iter()
            .map(|(name, kind)| ResolvedKey {
                name: name.to_string(),
                kind: *kind,
            })
            .collect()
    }

    #[test]
    fn test_buckets_by_single_key() {
        let records = vec![
            record("active", "eu", 1.0),
            record("inactive", "eu", 2.0),
            record("active", "us", 3.0),
        ];
        let buckets = apply(&records, &keys(&[("status", ParameterKind::String)])).unwrap();

        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[0].key, "active");
        assert_eq!(buckets[0].members.len(), 2);
        assert_eq!(buckets[1].key, "inactive");
        assert_eq!(buckets[1].members.len(), 1);
    }

    #[test]
    fn test_composite_key_spans_all_parameters() {
        let records = vec![
            record("active", "eu", 1.0),
            record("active", "us", 2.0),
            record("active", "eu", 3.0),
        ];
        let buckets = apply(
            &records,
            &keys(&[
                ("region", ParameterKind::String),
                ("status", ParameterKind::String),
            ]),
        )
        .unwrap();

        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[0].members.len(), 2);
    }

    #[test]
    fn test_numeric_key_equality_ignores_representation() {
        let mut a = record("x", "eu", 10.0);
        a.data
            .insert("amount".to_string(), serde_json::json!(10));
        let b = record("y", "eu", 10.0);

        let records = [a, b];
        let buckets = apply(&records, &keys(&[("amount", ParameterKind::Number)])).unwrap();
        assert_eq!(buckets.len(), 1);
    }

    #[test]
    fn test_missing_value_groups_under_empty_key() {
        let mut bare = record("active", "eu", 1.0);
        bare.data.remove("status");
        let full = record("active", "eu", 2.0);

        let records = [bare, full];
        let buckets = apply(&records, &keys(&[("status", ParameterKind::String)])).unwrap();
        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[0].key, "");
    }
}
