//! Stage executors
//!
//! Pure functions transforming a record set per stage semantics. The
//! authoritative stage order (filter → group → aggregation) is enforced by
//! `crate::pipeline`, never trusted from client input.

pub mod aggregate;
pub mod filter;
pub mod group;

use grist_core::domain::repository::ParameterKind;

use crate::error::ExecError;

/// Coerce a record value to a number per its declared kind.
///
/// `None` for absent/null values (they simply fail conditions and are
/// excluded from aggregates); numeric strings coerce like the ingestion
/// path does.
pub(crate) fn coerce_number(
    parameter: &str,
    value: Option<&serde_json::Value>,
) -> Result<Option<f64>, ExecError> {
    match value {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::Number(n)) => Ok(n.as_f64()),
        Some(serde_json::Value::String(s)) => {
            s.parse::<f64>()
                .map(Some)
                .map_err(|_| ExecError::TypeCoercion {
                    parameter: parameter.to_string(),
                    value: s.clone(),
                    kind: ParameterKind::Number,
                })
        }
        Some(other) => Err(ExecError::TypeCoercion {
            parameter: parameter.to_string(),
            value: other.to_string(),
            kind: ParameterKind::Number,
        }),
    }
}

/// Coerce a record value to text per its declared kind.
pub(crate) fn coerce_text(
    parameter: &str,
    value: Option<&serde_json::Value>,
) -> Result<Option<String>, ExecError> {
    match value {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) => Ok(Some(s.clone())),
        Some(serde_json::Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(ExecError::TypeCoercion {
            parameter: parameter.to_string(),
            value: other.to_string(),
            kind: ParameterKind::String,
        }),
    }
}
