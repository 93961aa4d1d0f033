//! Typed cell values and the declared types record fields bind them to.
//!
//! [`Value`] is the runtime representation moved between sheets and records,
//! [`ValueType`] is what a field declares. Enum types are described by a
//! static [`EnumType`] so the converter registry can synthesize a converter
//! for them the first time one is looked up.

use std::{fmt, str::FromStr};

use anyhow::{Result, anyhow};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeDelta, Utc};
use itertools::Itertools;
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

const MILLIS_PER_DAY: f64 = 86_400_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EnumType {
    pub name: &'static str,
    pub variants: &'static [&'static str],
}

impl EnumType {
    pub const fn new(name: &'static str, variants: &'static [&'static str]) -> Self {
        Self { name, variants }
    }

    pub fn value(&self, variant: &str) -> Option<EnumValue> {
        self.variants
            .iter()
            .find(|candidate| **candidate == variant)
            .map(|found| EnumValue {
                ty: *self,
                variant: found,
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EnumValue {
    pub ty: EnumType,
    pub variant: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    Text,
    Integer,
    Float,
    Boolean,
    Date,
    DateTime,
    Timestamp,
    Enum(EnumType),
    List,
}

impl ValueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueType::Text => "text",
            ValueType::Integer => "integer",
            ValueType::Float => "float",
            ValueType::Boolean => "boolean",
            ValueType::Date => "date",
            ValueType::DateTime => "datetime",
            ValueType::Timestamp => "timestamp",
            ValueType::Enum(ty) => ty.name,
            ValueType::List => "list",
        }
    }

    pub fn variants() -> &'static [&'static str] {
        &[
            "text", "integer", "float", "boolean", "date", "datetime", "timestamp",
        ]
    }

    pub fn is_enum(&self) -> bool {
        matches!(self, ValueType::Enum(_))
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Enum(ty) => write!(f, "enum {}", ty.name),
            other => f.write_str(other.as_str()),
        }
    }
}

impl FromStr for ValueType {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "text" | "string" => Ok(ValueType::Text),
            "integer" | "int" | "long" => Ok(ValueType::Integer),
            "float" | "double" | "number" => Ok(ValueType::Float),
            "boolean" | "bool" => Ok(ValueType::Boolean),
            "date" => Ok(ValueType::Date),
            "datetime" | "date-time" => Ok(ValueType::DateTime),
            "timestamp" => Ok(ValueType::Timestamp),
            _ => Err(anyhow!(
                "Unknown value type '{value}'. Supported types: {}",
                ValueType::variants().join(", ")
            )),
        }
    }
}

impl Serialize for ValueType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ValueType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let token = String::deserialize(deserializer)?;
        ValueType::from_str(&token).map_err(|err| de::Error::custom(err.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Text(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Timestamp(DateTime<Utc>),
    Enum(EnumValue),
    List(Vec<Value>),
}

impl Value {
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Text(_) => ValueType::Text,
            Value::Integer(_) => ValueType::Integer,
            Value::Float(_) => ValueType::Float,
            Value::Boolean(_) => ValueType::Boolean,
            Value::Date(_) => ValueType::Date,
            Value::DateTime(_) => ValueType::DateTime,
            Value::Timestamp(_) => ValueType::Timestamp,
            Value::Enum(value) => ValueType::Enum(value.ty),
            Value::List(_) => ValueType::List,
        }
    }

    pub fn as_display(&self) -> String {
        match self {
            Value::Text(s) => s.clone(),
            Value::Integer(i) => i.to_string(),
            Value::Float(f) => format_number(*f),
            Value::Boolean(b) => b.to_string(),
            Value::Date(d) => d.format("%Y-%m-%d").to_string(),
            Value::DateTime(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
            Value::Timestamp(ts) => ts.format("%Y-%m-%d %H:%M:%S").to_string(),
            Value::Enum(value) => value.variant.to_string(),
            Value::List(items) => items.iter().map(Value::as_display).join(","),
        }
    }

    /// Only text can be blank; numbers and dates never are, whatever their magnitude.
    pub fn is_blank(&self) -> bool {
        matches!(self, Value::Text(s) if s.trim().is_empty())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Value::Date(d) => Some(*d),
            Value::DateTime(dt) => Some(dt.date()),
            _ => None,
        }
    }

    pub fn as_datetime(&self) -> Option<NaiveDateTime> {
        match self {
            Value::Date(d) => d.and_hms_opt(0, 0, 0),
            Value::DateTime(dt) => Some(*dt),
            Value::Timestamp(ts) => Some(ts.naive_utc()),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::Timestamp(ts) => Some(*ts),
            _ => None,
        }
    }

    pub fn as_enum(&self) -> Option<EnumValue> {
        match self {
            Value::Enum(value) => Some(*value),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_display())
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Integer(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl From<NaiveDate> for Value {
    fn from(value: NaiveDate) -> Self {
        Value::Date(value)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(value: NaiveDateTime) -> Self {
        Value::DateTime(value)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(value: DateTime<Utc>) -> Self {
        Value::Timestamp(value)
    }
}

impl From<EnumValue> for Value {
    fn from(value: EnumValue) -> Self {
        Value::Enum(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Value::List(value)
    }
}

/// Whole floats render without a fractional part so `30.0` reads back as `30`.
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        (value as i64).to_string()
    } else {
        value.to_string()
    }
}

pub fn parse_naive_date(value: &str) -> Result<NaiveDate> {
    const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%m/%d/%Y", "%Y/%m/%d", "%d-%m-%Y"];
    for fmt in DATE_FORMATS {
        if let Ok(parsed) = NaiveDate::parse_from_str(value, fmt) {
            return Ok(parsed);
        }
    }
    Err(anyhow!("Failed to parse '{value}' as date"))
}

pub fn parse_naive_datetime(value: &str) -> Result<NaiveDateTime> {
    const DATETIME_FORMATS: &[&str] = &[
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%d/%m/%Y %H:%M:%S",
        "%m/%d/%Y %H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
    ];
    for fmt in DATETIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(value, fmt) {
            return Ok(parsed);
        }
    }
    parse_naive_date(value)
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .ok_or_else(|| anyhow!("Failed to parse '{value}' as datetime"))
}

fn excel_epoch() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1899, 12, 30)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
}

/// Converts a spreadsheet date serial (days since 1899-12-30) to a datetime.
pub fn excel_serial_to_datetime(serial: f64) -> Option<NaiveDateTime> {
    if !serial.is_finite() {
        return None;
    }
    let millis = (serial * MILLIS_PER_DAY).round() as i64;
    let delta = TimeDelta::try_milliseconds(millis)?;
    excel_epoch().checked_add_signed(delta)
}

pub fn datetime_to_excel_serial(value: NaiveDateTime) -> f64 {
    (value - excel_epoch()).num_milliseconds() as f64 / MILLIS_PER_DAY
}

#[cfg(test)]
mod tests {
    use super::*;

    const COLOR: EnumType = EnumType::new("Color", &["Red", "Green"]);

    #[test]
    fn value_type_parses_aliases() {
        assert_eq!(ValueType::from_str("String").unwrap(), ValueType::Text);
        assert_eq!(ValueType::from_str(" int ").unwrap(), ValueType::Integer);
        assert_eq!(ValueType::from_str("number").unwrap(), ValueType::Float);
        assert!(ValueType::from_str("decimal").is_err());
    }

    #[test]
    fn blankness_applies_to_text_only() {
        assert!(Value::from("   ").is_blank());
        assert!(!Value::Integer(0).is_blank());
        assert!(!Value::Float(0.0).is_blank());
        let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap();
        assert!(!Value::Date(epoch).is_blank());
    }

    #[test]
    fn display_flattens_lists_and_whole_floats() {
        let list = Value::List(vec![Value::from("a"), Value::Integer(2), Value::Float(3.0)]);
        assert_eq!(list.as_display(), "a,2,3");
        assert_eq!(Value::Float(2.5).as_display(), "2.5");
    }

    #[test]
    fn enum_type_resolves_declared_variants() {
        let green = COLOR.value("Green").expect("declared variant");
        assert_eq!(green.variant, "Green");
        assert_eq!(Value::Enum(green).value_type(), ValueType::Enum(COLOR));
        assert!(COLOR.value("Blue").is_none());
    }

    #[test]
    fn excel_serial_round_trips_through_datetime() {
        let dt = NaiveDateTime::parse_from_str("2024-03-15 10:00:00", "%Y-%m-%d %H:%M:%S").unwrap();
        let serial = datetime_to_excel_serial(dt);
        assert!((serial - (45366.0 + 10.0 / 24.0)).abs() < 1e-9);
        assert_eq!(excel_serial_to_datetime(serial), Some(dt));
    }

    #[test]
    fn parse_naive_datetime_accepts_plain_dates() {
        let parsed = parse_naive_datetime("2024-05-06").unwrap();
        assert_eq!(parsed.format("%H:%M:%S").to_string(), "00:00:00");
    }
}
