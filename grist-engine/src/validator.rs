//! Pipeline validator
//!
//! Statically checks a `ProcessConfig` against a repository's parameter
//! schema before anything is persisted or executed. Pure: no side effects,
//! no I/O. On success returns a `ResolvedConfig` with parameter kinds
//! inlined so executors never re-consult the schema.

use std::collections::HashSet;

use grist_core::domain::process::{
    AggregationSpec, FilterOperator, ProcessConfig, StageKind,
};
use grist_core::domain::repository::{Parameter, ParameterKind};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// A validated configuration with parameter kinds resolved
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedConfig {
    /// Active stages in authoritative execution order.
    pub actions: Vec<StageKind>,
    /// Empty when the filter stage is inactive.
    pub filter: Vec<ResolvedFilter>,
    /// Group keys sorted by name, so bucket keys are independent of the
    /// order the client listed them in. Empty when inactive.
    pub group: Vec<ResolvedKey>,
    /// Empty when the aggregation stage is inactive.
    pub aggregation: Vec<AggregationSpec>,
}

/// A filter condition with its parameter kind and coerced value inlined
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedFilter {
    pub name: String,
    pub kind: ParameterKind,
    pub operator: FilterOperator,
    pub value: FilterValue,
}

/// A group key with its parameter kind inlined
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedKey {
    pub name: String,
    pub kind: ParameterKind,
}

/// Filter comparison target, coerced to the parameter's declared kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FilterValue {
    Text(String),
    Number(f64),
    /// Empty-string `==`/`!=` on a string parameter: no constraint on the
    /// field, every record matches.
    Any,
}

/// Validate a process configuration against a parameter schema.
pub fn validate(
    config: &ProcessConfig,
    schema: &[Parameter],
) -> Result<ResolvedConfig, ValidationError> {
    let actions = config.active_stages();
    if actions.is_empty() {
        return Err(ValidationError::NoActiveStage);
    }

    let mut resolved = ResolvedConfig {
        actions,
        filter: Vec::new(),
        group: Vec::new(),
        aggregation: Vec::new(),
    };

    if config.filter.active {
        if config.filter.parameters.is_empty() {
            return Err(ValidationError::EmptyStage {
                stage: StageKind::Filter,
            });
        }
        for condition in &config.filter.parameters {
            let kind = lookup(schema, StageKind::Filter, &condition.name)?;
            if !condition.operator.applies_to(kind) {
                return Err(ValidationError::InvalidOperator {
                    name: condition.name.clone(),
                    operator: condition.operator,
                    kind,
                });
            }
            let value = resolve_value(&condition.name, kind, condition.operator, &condition.value)?;
            resolved.filter.push(ResolvedFilter {
                name: condition.name.clone(),
                kind,
                operator: condition.operator,
                value,
            });
        }
    }

    if config.group.active {
        if config.group.parameters.is_empty() {
            return Err(ValidationError::EmptyStage {
                stage: StageKind::Group,
            });
        }
        let mut seen = HashSet::new();
        for name in &config.group.parameters {
            if !seen.insert(name.as_str()) {
                return Err(ValidationError::DuplicateGroupKey { name: name.clone() });
            }
            let kind = lookup(schema, StageKind::Group, name)?;
            resolved.group.push(ResolvedKey {
                name: name.clone(),
                kind,
            });
        }
        resolved.group.sort_by(|a, b| a.name.cmp(&b.name));
    }

    if config.aggregation.active {
        if config.aggregation.parameters.is_empty() {
            return Err(ValidationError::EmptyStage {
                stage: StageKind::Aggregation,
            });
        }
        for spec in &config.aggregation.parameters {
            let kind = lookup(schema, StageKind::Aggregation, &spec.name)?;
            if kind != ParameterKind::Number {
                return Err(ValidationError::NonNumericAggregation {
                    name: spec.name.clone(),
                });
            }
            if spec.operations.is_empty() {
                return Err(ValidationError::EmptyOperations {
                    name: spec.name.clone(),
                });
            }
            let mut seen = HashSet::new();
            for op in &spec.operations {
                if !seen.insert(*op) {
                    return Err(ValidationError::DuplicateOperation {
                        name: spec.name.clone(),
                        op: *op,
                    });
                }
            }
            resolved.aggregation.push(spec.clone());
        }
    }

    Ok(resolved)
}

fn lookup(
    schema: &[Parameter],
    stage: StageKind,
    name: &str,
) -> Result<ParameterKind, ValidationError> {
    schema
        .iter()
        .find(|p| p.name == name)
        .map(|p| p.kind)
        .ok_or_else(|| ValidationError::UnknownParameter {
            stage,
            name: name.to_string(),
        })
}

fn resolve_value(
    name: &str,
    kind: ParameterKind,
    operator: FilterOperator,
    value: &serde_json::Value,
) -> Result<FilterValue, ValidationError> {
    match kind {
        ParameterKind::Number => match value {
            serde_json::Value::Number(n) => n
                .as_f64()
                .map(FilterValue::Number)
                .ok_or(ValidationError::InvalidValue {
                    name: name.to_string(),
                    kind,
                }),
            serde_json::Value::String(s) => {
                s.parse::<f64>()
                    .map(FilterValue::Number)
                    .map_err(|_| ValidationError::InvalidValue {
                        name: name.to_string(),
                        kind,
                    })
            }
            serde_json::Value::Null => Err(ValidationError::MissingValue {
                name: name.to_string(),
            }),
            _ => Err(ValidationError::InvalidValue {
                name: name.to_string(),
                kind,
            }),
        },
        ParameterKind::String => {
            let text = match value {
                serde_json::Value::String(s) => Some(s.clone()),
                serde_json::Value::Null => None,
                serde_json::Value::Number(n) => Some(n.to_string()),
                _ => {
                    return Err(ValidationError::InvalidValue {
                        name: name.to_string(),
                        kind,
                    });
                }
            };
            let is_equality = matches!(operator, FilterOperator::Eq | FilterOperator::Ne);
            match text {
                Some(s) if s.is_empty() && is_equality => Ok(FilterValue::Any),
                None if is_equality => Ok(FilterValue::Any),
                Some(s) if !s.is_empty() => Ok(FilterValue::Text(s)),
                _ => Err(ValidationError::MissingValue {
                    name: name.to_string(),
                }),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grist_core::domain::process::{
        AggregateOp, FilterCondition, StageSpec,
    };

    fn schema() -> Vec<Parameter> {
        vec![
            Parameter {
                name: "status".to_string(),
                kind: ParameterKind::String,
            },
            Parameter {
                name: "amount".to_string(),
                kind: ParameterKind::Number,
            },
        ]
    }

    fn filter_config(conditions: Vec<FilterCondition>) -> ProcessConfig {
        ProcessConfig {
            filter: StageSpec {
                active: true,
                parameters: conditions,
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_rejects_config_with_no_active_stage() {
        let config = ProcessConfig::default();
        assert_eq!(
            validate(&config, &schema()),
            Err(ValidationError::NoActiveStage)
        );
    }

    #[test]
    fn test_rejects_active_stage_without_parameters() {
        let config = filter_config(vec![]);
        assert_eq!(
            validate(&config, &schema()),
            Err(ValidationError::EmptyStage {
                stage: StageKind::Filter
            })
        );
    }

    #[test]
    fn test_rejects_unknown_parameter() {
        let config = filter_config(vec![FilterCondition {
            name: "missing".to_string(),
            operator: FilterOperator::Eq,
            value: serde_json::json!("x"),
        }]);
        assert!(matches!(
            validate(&config, &schema()),
            Err(ValidationError::UnknownParameter { .. })
        ));
    }

    #[test]
    fn test_rejects_operator_invalid_for_type() {
        let config = filter_config(vec![FilterCondition {
            name: "status".to_string(),
            operator: FilterOperator::Gt,
            value: serde_json::json!("a"),
        }]);
        assert!(matches!(
            validate(&config, &schema()),
            Err(ValidationError::InvalidOperator { .. })
        ));

        let config = filter_config(vec![FilterCondition {
            name: "amount".to_string(),
            operator: FilterOperator::Contains,
            value: serde_json::json!(1),
        }]);
        assert!(matches!(
            validate(&config, &schema()),
            Err(ValidationError::InvalidOperator { .. })
        ));
    }

    #[test]
    fn test_empty_string_equality_resolves_to_match_anything() {
        let config = filter_config(vec![FilterCondition {
            name: "status".to_string(),
            operator: FilterOperator::Eq,
            value: serde_json::json!(""),
        }]);
        let resolved = validate(&config, &schema()).unwrap();
        assert_eq!(resolved.filter[0].value, FilterValue::Any);
    }

    #[test]
    fn test_empty_string_contains_is_missing_value() {
        let config = filter_config(vec![FilterCondition {
            name: "status".to_string(),
            operator: FilterOperator::Contains,
            value: serde_json::json!(""),
        }]);
        assert!(matches!(
            validate(&config, &schema()),
            Err(ValidationError::MissingValue { .. })
        ));
    }

    #[test]
    fn test_numeric_value_coerced_from_string() {
        let config = filter_config(vec![FilterCondition {
            name: "amount".to_string(),
            operator: FilterOperator::Ge,
            value: serde_json::json!("10.5"),
        }]);
        let resolved = validate(&config, &schema()).unwrap();
        assert_eq!(resolved.filter[0].value, FilterValue::Number(10.5));
    }

    #[test]
    fn test_group_keys_sorted_and_deduplicated() {
        let config = ProcessConfig {
            group: StageSpec {
                active: true,
                parameters: vec!["status".to_string(), "amount".to_string()],
            },
            ..Default::default()
        };
        let resolved = validate(&config, &schema()).unwrap();
        assert_eq!(resolved.group[0].name, "amount");
        assert_eq!(resolved.group[1].name, "status");

        let config = ProcessConfig {
            group: StageSpec {
                active: true,
                parameters: vec!["status".to_string(), "status".to_string()],
            },
            ..Default::default()
        };
        assert!(matches!(
            validate(&config, &schema()),
            Err(ValidationError::DuplicateGroupKey { .. })
        ));
    }

    #[test]
    fn test_aggregation_requires_numeric_parameter() {
        let config = ProcessConfig {
            aggregation: StageSpec {
                active: true,
                parameters: vec![AggregationSpec {
                    name: "status".to_string(),
                    operations: vec![AggregateOp::Sum],
                }],
            },
            ..Default::default()
        };
        assert!(matches!(
            validate(&config, &schema()),
            Err(ValidationError::NonNumericAggregation { .. })
        ));
    }

    #[test]
    fn test_aggregation_rejects_duplicate_operations() {
        let config = ProcessConfig {
            aggregation: StageSpec {
                active: true,
                parameters: vec![AggregationSpec {
                    name: "amount".to_string(),
                    operations: vec![AggregateOp::Sum, AggregateOp::Sum],
                }],
            },
            ..Default::default()
        };
        assert!(matches!(
            validate(&config, &schema()),
            Err(ValidationError::DuplicateOperation { .. })
        ));
    }
}
