use crate::error::CoercionError;
use crate::model::{generate_id, FieldType, Id};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Closed sum type over the value variants an EAV cell can hold.
///
/// Replaces dispatch on a type-tag string: every conversion is an exhaustive
/// match, checked at compile time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypedValue {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Date(DateTime<Utc>),
    Structured(Value),
}

impl TypedValue {
    /// Coerce a raw JSON value into the variant matching `target`.
    ///
    /// Fails with a `CoercionError` when the raw value cannot be cast, e.g.
    /// non-numeric text into `integer`.
    pub fn coerce(raw: &Value, target: FieldType) -> Result<TypedValue, CoercionError> {
        let fail = || CoercionError::new(raw, target);
        match target {
            FieldType::String => Ok(TypedValue::String(match raw {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                other => other.to_string(),
            })),
            FieldType::Integer => match raw {
                Value::Number(n) => n
                    .as_i64()
                    .or_else(|| n.as_f64().map(|f| f as i64))
                    .map(TypedValue::Int)
                    .ok_or_else(fail),
                Value::String(s) => s.trim().parse::<i64>().map(TypedValue::Int).map_err(|_| fail()),
                Value::Bool(b) => Ok(TypedValue::Int(i64::from(*b))),
                _ => Err(fail()),
            },
            FieldType::Float => match raw {
                Value::Number(n) => n.as_f64().map(TypedValue::Float).ok_or_else(fail),
                Value::String(s) => s.trim().parse::<f64>().map(TypedValue::Float).map_err(|_| fail()),
                Value::Bool(b) => Ok(TypedValue::Float(if *b { 1.0 } else { 0.0 })),
                _ => Err(fail()),
            },
            FieldType::Boolean => match raw {
                Value::Bool(b) => Ok(TypedValue::Bool(*b)),
                Value::Number(n) => Ok(TypedValue::Bool(n.as_f64().map(|f| f != 0.0).unwrap_or(true))),
                Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                    "true" | "yes" | "1" => Ok(TypedValue::Bool(true)),
                    "false" | "no" | "0" => Ok(TypedValue::Bool(false)),
                    _ => Err(fail()),
                },
                _ => Err(fail()),
            },
            FieldType::Date => match raw {
                Value::String(s) => parse_date(s).map(TypedValue::Date).ok_or_else(fail),
                Value::Number(n) => n
                    .as_i64()
                    .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
                    .map(TypedValue::Date)
                    .ok_or_else(fail),
                _ => Err(fail()),
            },
            // Structured types store the payload unchanged.
            FieldType::Json | FieldType::Array | FieldType::Object => {
                Ok(TypedValue::Structured(raw.clone()))
            }
        }
    }

    /// Convert an already-typed value to another declared type. Dates are
    /// rendered as ISO-8601 text on the way out, so a `date -> string`
    /// conversion preserves the timestamp.
    pub fn convert_to(&self, target: FieldType) -> Result<TypedValue, CoercionError> {
        TypedValue::coerce(&self.as_json(), target)
    }

    /// Emit the value as plain JSON data; dates become ISO-8601 text.
    pub fn as_json(&self) -> Value {
        match self {
            TypedValue::String(s) => Value::String(s.clone()),
            TypedValue::Int(i) => Value::Number((*i).into()),
            TypedValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            TypedValue::Bool(b) => Value::Bool(*b),
            TypedValue::Date(d) => Value::String(d.to_rfc3339()),
            TypedValue::Structured(v) => v.clone(),
        }
    }
}

fn parse_date(input: &str) -> Option<DateTime<Utc>> {
    let s = input.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(Utc.from_utc_datetime(&naive));
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?));
    }
    None
}

/// One EAV cell: the value of one field on one record.
///
/// Six alternative typed slots, exactly one of which holds the live value,
/// selected by the owning field's current type. `(record_id, field_id)` is
/// unique.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldValue {
    pub id: Id,
    pub record_id: Id,
    pub field_id: Id,
    pub value_text: Option<String>,
    pub value_int: Option<i64>,
    pub value_float: Option<f64>,
    pub value_bool: Option<bool>,
    pub value_date: Option<DateTime<Utc>>,
    pub value_json: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FieldValue {
    pub fn new(record_id: Id, field_id: Id) -> Self {
        let now = Utc::now();
        Self {
            id: generate_id(),
            record_id,
            field_id,
            value_text: None,
            value_int: None,
            value_float: None,
            value_bool: None,
            value_date: None,
            value_json: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Store a raw value into the slot matching the field's declared type,
    /// clearing every other slot first. `None` clears all slots (null).
    pub fn set_value(
        &mut self,
        field_type: FieldType,
        raw: Option<&Value>,
    ) -> Result<(), CoercionError> {
        self.clear();
        let raw = match raw {
            Some(Value::Null) | None => return Ok(()),
            Some(v) => v,
        };
        self.store(TypedValue::coerce(raw, field_type)?);
        Ok(())
    }

    /// Store an already-typed value, clearing the other slots.
    pub fn set_typed(&mut self, value: TypedValue) {
        self.clear();
        self.store(value);
    }

    /// Read the cell back as a typed value under the field's declared type.
    /// Returns `None` when the cell is null or the slot for that type is
    /// empty (e.g. rows not yet migrated after a type change).
    pub fn get_value(&self, field_type: FieldType) -> Option<TypedValue> {
        match field_type {
            FieldType::String => self.value_text.clone().map(TypedValue::String),
            FieldType::Integer => self.value_int.map(TypedValue::Int),
            FieldType::Float => self.value_float.map(TypedValue::Float),
            FieldType::Boolean => self.value_bool.map(TypedValue::Bool),
            FieldType::Date => self.value_date.map(TypedValue::Date),
            FieldType::Json | FieldType::Array | FieldType::Object => {
                self.value_json.clone().map(TypedValue::Structured)
            }
        }
    }

    /// Read the cell as plain JSON data (dates as ISO-8601 text).
    pub fn value_as_json(&self, field_type: FieldType) -> Option<Value> {
        self.get_value(field_type).map(|v| v.as_json())
    }

    pub fn is_null(&self) -> bool {
        self.value_text.is_none()
            && self.value_int.is_none()
            && self.value_float.is_none()
            && self.value_bool.is_none()
            && self.value_date.is_none()
            && self.value_json.is_none()
    }

    fn clear(&mut self) {
        self.value_text = None;
        self.value_int = None;
        self.value_float = None;
        self.value_bool = None;
        self.value_date = None;
        self.value_json = None;
        self.updated_at = Utc::now();
    }

    fn store(&mut self, value: TypedValue) {
        match value {
            TypedValue::String(s) => self.value_text = Some(s),
            TypedValue::Int(i) => self.value_int = Some(i),
            TypedValue::Float(f) => self.value_float = Some(f),
            TypedValue::Bool(b) => self.value_bool = Some(b),
            TypedValue::Date(d) => self.value_date = Some(d),
            TypedValue::Structured(v) => self.value_json = Some(v),
        }
    }
}
