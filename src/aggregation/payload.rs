//! Raw cost payload shapes
//!
//! The cost API answers with one of two shapes. Shape detection happens
//! once here; everything downstream works on the typed variants.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::SchemaError;

/// Reserved keys inside a by-user entry that are not namespaces.
pub const TOTAL_COST_KEY: &str = "totalCost";
pub const WINDOW_KEY: &str = "window";

const UNKNOWN_NAMESPACE: &str = "unknown";

/// Reporting interval a payload describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Window {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, SchemaError> {
        if start > end {
            return Err(SchemaError::InvertedWindow {
                start: start.to_rfc3339(),
                end: end.to_rfc3339(),
            });
        }
        Ok(Self { start, end })
    }

    /// `None` when the value is not a `{start, end}` pair of RFC 3339
    /// timestamps. Only an inverted pair is an error.
    fn from_value(value: &Value) -> Result<Option<Self>, SchemaError> {
        let Ok(raw) = RawWindow::deserialize(value) else {
            return Ok(None);
        };
        match (parse_timestamp(raw.start.as_deref()), parse_timestamp(raw.end.as_deref())) {
            (Some(start), Some(end)) => Self::new(start, end).map(Some),
            _ => Ok(None),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawWindow {
    start: Option<String>,
    end: Option<String>,
}

fn parse_timestamp(text: Option<&str>) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text?.trim())
        .ok()
        .map(|parsed| parsed.with_timezone(&Utc))
}

/// One user's entry in the by-user shape.
#[derive(Debug, Clone, PartialEq)]
pub struct UserCosts {
    pub user: String,
    pub window: Option<Value>,
    /// Namespace costs in document order, reserved keys removed.
    pub namespaces: Vec<(String, f64)>,
}

/// One record in the flat shape.
#[derive(Debug, Clone, PartialEq)]
pub struct CostRecord {
    pub namespace: String,
    pub total_cost: f64,
    pub window: Option<Value>,
}

/// Wire form of a record. Absent and `null` fields read the same.
#[derive(Debug, Deserialize)]
struct RawRecord {
    #[serde(default)]
    namespace: Option<String>,
    #[serde(rename = "totalCost", default)]
    total_cost: Option<f64>,
    #[serde(default)]
    window: Option<Value>,
}

impl From<RawRecord> for CostRecord {
    fn from(raw: RawRecord) -> Self {
        Self {
            namespace: raw
                .namespace
                .filter(|namespace| !namespace.is_empty())
                .unwrap_or_else(|| UNKNOWN_NAMESPACE.to_string()),
            total_cost: raw.total_cost.unwrap_or(0.0),
            window: raw.window,
        }
    }
}

/// Cost payload as returned by the cost API.
#[derive(Debug, Clone, PartialEq)]
pub enum RawCostPayload {
    /// `{ user: { window, <namespace>: cost, totalCost } }`
    ByUser(Vec<UserCosts>),
    /// `[ { namespace, totalCost, window } ]`
    Records(Vec<CostRecord>),
}

impl RawCostPayload {
    /// Detect the payload shape.
    ///
    /// Returns `Ok(None)` when there is nothing to show: `null`, an empty
    /// object or an empty list.
    pub fn detect(value: &Value) -> Result<Option<Self>, SchemaError> {
        match value {
            Value::Null => Ok(None),
            Value::Object(map) if map.is_empty() => Ok(None),
            Value::Array(items) if items.is_empty() => Ok(None),
            Value::Object(map) => parse_by_user(map).map(|users| Some(Self::ByUser(users))),
            Value::Array(items) => parse_records(items).map(|records| Some(Self::Records(records))),
            other => Err(SchemaError::UnsupportedShape(json_kind(other))),
        }
    }

    pub(crate) fn entry_count(&self) -> usize {
        match self {
            Self::ByUser(users) => users.len(),
            Self::Records(records) => records.len(),
        }
    }

    /// Window of the first entry. Other entries are assumed to match and
    /// are not checked.
    ///
    /// A missing or unreadable window is `None`; the data is still usable.
    pub fn window(&self) -> Result<Option<Window>, SchemaError> {
        let first = match self {
            Self::ByUser(users) => users.first().and_then(|u| u.window.as_ref()),
            Self::Records(records) => records.first().and_then(|r| r.window.as_ref()),
        };
        let window = match first {
            Some(value) => Window::from_value(value)?,
            None => None,
        };
        if window.is_none() {
            tracing::debug!("First entry has no readable window: {:?}", first);
        }
        Ok(window)
    }
}

fn parse_by_user(map: &Map<String, Value>) -> Result<Vec<UserCosts>, SchemaError> {
    map.iter()
        .map(|(user, entry)| {
            let fields = entry.as_object().ok_or_else(|| SchemaError::EntryNotObject {
                user: user.clone(),
                kind: json_kind(entry),
            })?;

            let mut namespaces = Vec::with_capacity(fields.len());
            for (key, value) in fields {
                if key == TOTAL_COST_KEY || key == WINDOW_KEY {
                    continue;
                }
                let cost = match value {
                    Value::Null => 0.0,
                    other => other.as_f64().ok_or_else(|| SchemaError::InvalidCost {
                        user: user.clone(),
                        namespace: key.clone(),
                    })?,
                };
                check_cost(user, key, cost)?;
                namespaces.push((key.clone(), cost));
            }

            Ok(UserCosts {
                user: user.clone(),
                window: fields.get(WINDOW_KEY).cloned(),
                namespaces,
            })
        })
        .collect()
}

fn parse_records(items: &[Value]) -> Result<Vec<CostRecord>, SchemaError> {
    items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            if !item.is_object() {
                return Err(SchemaError::RecordNotObject {
                    index,
                    kind: json_kind(item),
                });
            }
            let record: CostRecord = RawRecord::deserialize(item)
                .map(CostRecord::from)
                .map_err(|err| SchemaError::InvalidRecord {
                    index,
                    reason: err.to_string(),
                })?;
            check_cost(&format!("record #{index}"), &record.namespace, record.total_cost)?;
            Ok(record)
        })
        .collect()
}

fn check_cost(owner: &str, namespace: &str, cost: f64) -> Result<(), SchemaError> {
    if cost.is_finite() && cost >= 0.0 {
        Ok(())
    } else {
        Err(SchemaError::NegativeCost {
            owner: owner.to_string(),
            namespace: namespace.to_string(),
            cost,
        })
    }
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
