pub mod actors;
pub mod config;
pub mod extract;
pub mod sinks;

use std::collections::{BTreeMap, HashMap};

use serde_json::Value;

/// One decoded frame from a turbine event stream, tagged with the cluster it
/// was read from.
#[derive(Debug, Clone, PartialEq)]
pub struct TurbineEvent {
    pub cluster: String,
    pub fields: HashMap<String, FieldValue>,
}

/// Value of a single event field.
///
/// Turbine events are flat JSON objects whose values are strings, booleans,
/// numbers, or percentile breakdowns (a map from percentile to value). Any
/// other shape is carried as `Unsupported` so the extraction dispatch stays
/// exhaustive and can report it.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Str(String),
    Bool(bool),
    Int(i64),
    Float(f64),
    Percentiles(BTreeMap<String, f64>),
    Unsupported(Value),
}

impl FieldValue {
    fn from_json(value: Value) -> Self {
        match value {
            Value::String(s) => FieldValue::Str(s),
            Value::Bool(b) => FieldValue::Bool(b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    FieldValue::Int(i)
                } else if let Some(f) = n.as_f64() {
                    FieldValue::Float(f)
                } else {
                    FieldValue::Unsupported(Value::Number(n))
                }
            }
            Value::Object(map) => {
                if map.values().all(Value::is_number) {
                    let percentiles = map
                        .into_iter()
                        .filter_map(|(pct, v)| v.as_f64().map(|f| (pct, f)))
                        .collect();
                    FieldValue::Percentiles(percentiles)
                } else {
                    FieldValue::Unsupported(Value::Object(map))
                }
            }
            other => FieldValue::Unsupported(other),
        }
    }
}

impl TurbineEvent {
    /// Decode the JSON payload of one `data: ` frame.
    pub fn parse(cluster: &str, payload: &str) -> serde_json::Result<Self> {
        let data: serde_json::Map<String, Value> = serde_json::from_str(payload)?;
        Ok(Self::from_json(cluster, data))
    }

    pub fn from_json(cluster: &str, data: serde_json::Map<String, Value>) -> Self {
        let fields = data
            .into_iter()
            .map(|(key, value)| (key, FieldValue::from_json(value)))
            .collect();

        Self {
            cluster: cluster.to_string(),
            fields,
        }
    }

    /// Look up a field that must hold a string, e.g. `name` or `type`.
    pub fn string_field(&self, key: &str) -> Option<&str> {
        match self.fields.get(key) {
            Some(FieldValue::Str(s)) => Some(s),
            _ => None,
        }
    }
}
