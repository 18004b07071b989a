//! Shared metric extraction for turbine events.
//!
//! Both sinks consume the same qualifying fields from an event; only the
//! final metric name format differs per backend, so extraction yields the
//! raw key parts and leaves assembly to the caller.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::{FieldValue, TurbineEvent};

/// Field prefixes that qualify as metrics. Everything else on an event is
/// operational metadata and is skipped.
pub const METRIC_FIELD_PREFIXES: [&str; 5] = [
    "rollingCount",
    "current",
    "isCircuitBreakerOpen",
    "latencyExecute",
    "latencyTotal",
];

static KEY_SCRUB: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("[^A-Za-z0-9_]+").expect("key scrub pattern is valid"));

/// Identity of one extracted metric, before backend-specific formatting.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MetricKey {
    pub cluster: String,
    pub event_name: String,
    pub resource_type: String,
    pub field: String,

    /// Set for samples derived from a percentile breakdown.
    pub percentile: Option<String>,
}

/// One metric extracted from an event.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSample {
    pub key: MetricKey,
    pub value: i64,
}

/// Contract violations of the upstream event format. These fail a single
/// event, never the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractError {
    MissingName,
    MissingType,
}

impl fmt::Display for ExtractError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtractError::MissingName => write!(f, "event is missing the required \"name\" field"),
            ExtractError::MissingType => write!(f, "event is missing the required \"type\" field"),
        }
    }
}

impl std::error::Error for ExtractError {}

fn is_metric_field(field: &str) -> bool {
    METRIC_FIELD_PREFIXES
        .iter()
        .any(|prefix| field.starts_with(prefix))
}

/// Collapse every run of characters outside `[A-Za-z0-9_]` to a single `_`.
pub fn sanitize_key(raw: &str) -> String {
    KEY_SCRUB.replace_all(raw, "_").into_owned()
}

/// Extract every qualifying metric from an event.
///
/// String-valued fields carry no numeric information and produce nothing;
/// booleans map to 1/0; floats are floored. A field with a value shape the
/// stream is not expected to carry is reported and skipped without affecting
/// the rest of the event.
pub fn extract_samples(event: &TurbineEvent) -> Result<Vec<MetricSample>, ExtractError> {
    let event_name = event
        .string_field("name")
        .ok_or(ExtractError::MissingName)?;
    let resource_type = event
        .string_field("type")
        .ok_or(ExtractError::MissingType)?;

    let mut samples = Vec::new();

    for (field, value) in &event.fields {
        if !is_metric_field(field) {
            continue;
        }

        let key = |percentile: Option<String>| MetricKey {
            cluster: event.cluster.clone(),
            event_name: event_name.to_string(),
            resource_type: resource_type.to_string(),
            field: field.clone(),
            percentile,
        };

        match value {
            FieldValue::Str(_) => {}
            FieldValue::Percentiles(percentiles) => {
                for (percentile, value) in percentiles {
                    samples.push(MetricSample {
                        key: key(Some(percentile.clone())),
                        value: value.floor() as i64,
                    });
                }
            }
            FieldValue::Bool(flag) => samples.push(MetricSample {
                key: key(None),
                value: i64::from(*flag),
            }),
            FieldValue::Int(value) => samples.push(MetricSample {
                key: key(None),
                value: *value,
            }),
            FieldValue::Float(value) => samples.push(MetricSample {
                key: key(None),
                value: value.floor() as i64,
            }),
            FieldValue::Unsupported(raw) => {
                debug!(cluster = %event.cluster, "unexpected value for field {field}: {raw}");
            }
        }
    }

    Ok(samples)
}
