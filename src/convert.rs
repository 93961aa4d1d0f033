//! Pluggable conversion between typed values through a canonical string.
//!
//! Every [`TypeConverter`] knows how to encode values of one [`ValueType`] to
//! a canonical string and how to decode that string back. Converting from one
//! type to another goes through the source type's encoder and the target
//! type's decoder. Enum converters are synthesized on first lookup and cached.
//!
//! The registry guards its table with an `RwLock`, so one instance can be
//! shared by concurrent loads; the usual pattern is still one registry per
//! top-level operation, created with [`ConverterRegistry::default`].

use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, PoisonError, RwLock},
};

use chrono::{DateTime, Utc};
use log::debug;

use crate::{
    error::ConversionError,
    value::{EnumType, Value, ValueType, parse_naive_date, parse_naive_datetime},
};

pub trait TypeConverter: Send + Sync {
    fn value_type(&self) -> ValueType;

    /// Additional type this converter is registered under.
    fn alias(&self) -> Option<ValueType> {
        None
    }

    fn encode(&self, value: &Value) -> Result<String, ConversionError>;

    /// Returns `Ok(None)` when the canonical string denotes no value.
    fn decode(&self, canonical: &str) -> Result<Option<Value>, ConversionError>;
}

fn mismatch(value: &Value, expected: ValueType) -> ConversionError {
    ConversionError::invalid(
        value.as_display(),
        expected,
        format!("value is {}", value.value_type()),
    )
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TextConverter;

impl TypeConverter for TextConverter {
    fn value_type(&self) -> ValueType {
        ValueType::Text
    }

    fn encode(&self, value: &Value) -> Result<String, ConversionError> {
        match value {
            Value::Text(s) => Ok(s.clone()),
            other => Err(mismatch(other, ValueType::Text)),
        }
    }

    fn decode(&self, canonical: &str) -> Result<Option<Value>, ConversionError> {
        Ok(Some(Value::Text(canonical.to_string())))
    }
}

const I64_LOWER: f64 = i64::MIN as f64;
const I64_UPPER: f64 = i64::MAX as f64;

#[derive(Debug, Default, Clone, Copy)]
pub struct IntegerConverter;

impl TypeConverter for IntegerConverter {
    fn value_type(&self) -> ValueType {
        ValueType::Integer
    }

    fn encode(&self, value: &Value) -> Result<String, ConversionError> {
        match value {
            Value::Integer(i) => Ok(i.to_string()),
            other => Err(mismatch(other, ValueType::Integer)),
        }
    }

    fn decode(&self, canonical: &str) -> Result<Option<Value>, ConversionError> {
        let trimmed = canonical.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }
        if let Ok(parsed) = trimmed.parse::<i64>() {
            return Ok(Some(Value::Integer(parsed)));
        }
        match trimmed.parse::<f64>() {
            Ok(parsed) if !(I64_LOWER..I64_UPPER).contains(&parsed) => {
                Err(ConversionError::invalid(trimmed, ValueType::Integer, "out of range"))
            }
            Ok(parsed) if parsed.fract() == 0.0 => {
                Ok(Some(Value::Integer(parsed as i64)))
            }
            Ok(_) => Err(ConversionError::invalid(
                trimmed,
                ValueType::Integer,
                "value has a fractional part",
            )),
            Err(err) => Err(ConversionError::invalid(
                trimmed,
                ValueType::Integer,
                err.to_string(),
            )),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct FloatConverter;

impl TypeConverter for FloatConverter {
    fn value_type(&self) -> ValueType {
        ValueType::Float
    }

    fn encode(&self, value: &Value) -> Result<String, ConversionError> {
        match value {
            Value::Float(f) => Ok(f.to_string()),
            other => Err(mismatch(other, ValueType::Float)),
        }
    }

    fn decode(&self, canonical: &str) -> Result<Option<Value>, ConversionError> {
        let trimmed = canonical.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }
        trimmed
            .parse::<f64>()
            .map(|parsed| Some(Value::Float(parsed)))
            .map_err(|err| ConversionError::invalid(trimmed, ValueType::Float, err.to_string()))
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct BooleanConverter;

impl TypeConverter for BooleanConverter {
    fn value_type(&self) -> ValueType {
        ValueType::Boolean
    }

    fn encode(&self, value: &Value) -> Result<String, ConversionError> {
        match value {
            Value::Boolean(b) => Ok(b.to_string()),
            other => Err(mismatch(other, ValueType::Boolean)),
        }
    }

    fn decode(&self, canonical: &str) -> Result<Option<Value>, ConversionError> {
        let trimmed = canonical.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }
        let parsed = match trimmed.to_ascii_lowercase().as_str() {
            "true" | "t" | "yes" | "y" | "1" => true,
            "false" | "f" | "no" | "n" | "0" => false,
            _ => {
                return Err(ConversionError::invalid(
                    trimmed,
                    ValueType::Boolean,
                    "expected true/false, yes/no or 1/0",
                ));
            }
        };
        Ok(Some(Value::Boolean(parsed)))
    }
}

/// Dates, datetimes and timestamps share epoch milliseconds (UTC) as their
/// canonical form, so any of them converts into the others.
fn decode_instant(
    canonical: &str,
    value_type: ValueType,
) -> Result<Option<DateTime<Utc>>, ConversionError> {
    let trimmed = canonical.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    if let Ok(millis) = trimmed.parse::<i64>() {
        return DateTime::<Utc>::from_timestamp_millis(millis)
            .map(Some)
            .ok_or_else(|| {
                ConversionError::invalid(trimmed, value_type, "epoch milliseconds out of range")
            });
    }
    parse_naive_datetime(trimmed)
        .map(|naive| Some(naive.and_utc()))
        .map_err(|err| ConversionError::invalid(trimmed, value_type, err.to_string()))
}

fn encode_instant(value: &Value, value_type: ValueType) -> Result<String, ConversionError> {
    value
        .as_datetime()
        .map(|naive| naive.and_utc().timestamp_millis().to_string())
        .ok_or_else(|| mismatch(value, value_type))
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DateConverter;

impl TypeConverter for DateConverter {
    fn value_type(&self) -> ValueType {
        ValueType::Date
    }

    fn encode(&self, value: &Value) -> Result<String, ConversionError> {
        encode_instant(value, ValueType::Date)
    }

    fn decode(&self, canonical: &str) -> Result<Option<Value>, ConversionError> {
        if let Ok(date) = parse_naive_date(canonical.trim()) {
            return Ok(Some(Value::Date(date)));
        }
        Ok(decode_instant(canonical, ValueType::Date)?.map(|ts| Value::Date(ts.date_naive())))
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DateTimeConverter;

impl TypeConverter for DateTimeConverter {
    fn value_type(&self) -> ValueType {
        ValueType::DateTime
    }

    fn encode(&self, value: &Value) -> Result<String, ConversionError> {
        encode_instant(value, ValueType::DateTime)
    }

    fn decode(&self, canonical: &str) -> Result<Option<Value>, ConversionError> {
        Ok(decode_instant(canonical, ValueType::DateTime)?.map(|ts| Value::DateTime(ts.naive_utc())))
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TimestampConverter;

impl TypeConverter for TimestampConverter {
    fn value_type(&self) -> ValueType {
        ValueType::Timestamp
    }

    fn encode(&self, value: &Value) -> Result<String, ConversionError> {
        match value {
            Value::Timestamp(ts) => Ok(ts.timestamp_millis().to_string()),
            other => encode_instant(other, ValueType::Timestamp),
        }
    }

    fn decode(&self, canonical: &str) -> Result<Option<Value>, ConversionError> {
        Ok(decode_instant(canonical, ValueType::Timestamp)?.map(Value::Timestamp))
    }
}

/// Maps every declared variant to its own name.
#[derive(Debug, Clone, Copy)]
pub struct EnumConverter {
    ty: EnumType,
}

impl EnumConverter {
    pub fn new(ty: EnumType) -> Self {
        Self { ty }
    }
}

impl TypeConverter for EnumConverter {
    fn value_type(&self) -> ValueType {
        ValueType::Enum(self.ty)
    }

    fn encode(&self, value: &Value) -> Result<String, ConversionError> {
        match value {
            Value::Enum(v) if v.ty == self.ty => Ok(v.variant.to_string()),
            other => Err(mismatch(other, ValueType::Enum(self.ty))),
        }
    }

    fn decode(&self, canonical: &str) -> Result<Option<Value>, ConversionError> {
        let trimmed = canonical.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }
        self.ty
            .value(trimmed)
            .map(|v| Some(Value::Enum(v)))
            .ok_or_else(|| {
                ConversionError::invalid(
                    trimmed,
                    ValueType::Enum(self.ty),
                    format!("expected one of {}", self.ty.variants.join(", ")),
                )
            })
    }
}

pub struct ConverterRegistry {
    converters: RwLock<HashMap<ValueType, Arc<dyn TypeConverter>>>,
}

impl fmt::Debug for ConverterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let guard = self.converters.read().unwrap_or_else(PoisonError::into_inner);
        let mut types = guard.keys().map(ToString::to_string).collect::<Vec<_>>();
        types.sort();
        f.debug_struct("ConverterRegistry")
            .field("types", &types)
            .finish()
    }
}

impl Default for ConverterRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl ConverterRegistry {
    pub fn empty() -> Self {
        Self {
            converters: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_builtins() -> Self {
        let registry = Self::empty();
        registry.register(TextConverter);
        registry.register(IntegerConverter);
        registry.register(FloatConverter);
        registry.register(BooleanConverter);
        registry.register(DateConverter);
        registry.register(DateTimeConverter);
        registry.register(TimestampConverter);
        registry
    }

    /// Registers under the converter's type and its alias, replacing earlier entries.
    pub fn register<C>(&self, converter: C)
    where
        C: TypeConverter + 'static,
    {
        self.register_shared(Arc::new(converter));
    }

    pub fn register_shared(&self, converter: Arc<dyn TypeConverter>) {
        let mut guard = self.converters.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(alias) = converter.alias() {
            guard.insert(alias, Arc::clone(&converter));
        }
        guard.insert(converter.value_type(), converter);
    }

    pub fn find(&self, value_type: ValueType) -> Option<Arc<dyn TypeConverter>> {
        {
            let guard = self.converters.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(found) = guard.get(&value_type) {
                return Some(Arc::clone(found));
            }
        }
        let ValueType::Enum(ty) = value_type else {
            return None;
        };
        let mut guard = self.converters.write().unwrap_or_else(PoisonError::into_inner);
        let converter = guard.entry(value_type).or_insert_with(|| {
            debug!("Synthesized converter for enum {}", ty.name);
            Arc::new(EnumConverter::new(ty))
        });
        Some(Arc::clone(converter))
    }

    pub fn supports(&self, value_type: ValueType) -> bool {
        self.find(value_type).is_some()
    }

    /// Encodes `source` with its own converter and decodes the canonical
    /// string with the converter of `target`.
    pub fn convert(
        &self,
        source: Option<&Value>,
        target: ValueType,
    ) -> Result<Option<Value>, ConversionError> {
        let target_converter = self
            .find(target)
            .ok_or(ConversionError::Unsupported { value_type: target })?;
        let Some(source) = source else {
            return Ok(None);
        };
        let source_type = source.value_type();
        let source_converter = self
            .find(source_type)
            .ok_or(ConversionError::Unsupported {
                value_type: source_type,
            })?;
        let canonical = source_converter.encode(source)?;
        target_converter.decode(&canonical)
    }

    pub fn decode(&self, raw: &str, target: ValueType) -> Result<Option<Value>, ConversionError> {
        self.convert(Some(&Value::Text(raw.to_string())), target)
    }

    pub fn encode(&self, value: &Value) -> Result<String, ConversionError> {
        let value_type = value.value_type();
        self.find(value_type)
            .ok_or(ConversionError::Unsupported { value_type })?
            .encode(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    const LEVEL: EnumType = EnumType::new("Level", &["Low", "High"]);

    #[test]
    fn converts_between_builtin_types() {
        let registry = ConverterRegistry::default();
        assert_eq!(
            registry.decode("30", ValueType::Integer).unwrap(),
            Some(Value::Integer(30))
        );
        assert_eq!(
            registry
                .convert(Some(&Value::Integer(7)), ValueType::Float)
                .unwrap(),
            Some(Value::Float(7.0))
        );
        assert_eq!(
            registry
                .convert(Some(&Value::Float(7.0)), ValueType::Text)
                .unwrap(),
            Some(Value::from("7"))
        );
        assert_eq!(registry.decode("yes", ValueType::Boolean).unwrap(), Some(Value::Boolean(true)));
        assert_eq!(registry.convert(None, ValueType::Integer).unwrap(), None);
    }

    #[test]
    fn dates_share_epoch_millis_canonical_form() {
        let registry = ConverterRegistry::default();
        let date = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        let as_datetime = registry
            .convert(Some(&Value::Date(date)), ValueType::DateTime)
            .unwrap();
        assert_eq!(as_datetime, Some(Value::DateTime(date.and_hms_opt(0, 0, 0).unwrap())));
        assert_eq!(
            registry.encode(&Value::Date(date)).unwrap(),
            "1710460800000"
        );
        assert_eq!(
            registry.decode("2024-03-15", ValueType::Date).unwrap(),
            Some(Value::Date(date))
        );
    }

    #[test]
    fn enum_converters_are_synthesized_once() {
        let registry = ConverterRegistry::empty();
        registry.register(TextConverter);
        assert!(registry.find(ValueType::Enum(LEVEL)).is_some());
        let first = registry.find(ValueType::Enum(LEVEL)).unwrap();
        let second = registry.find(ValueType::Enum(LEVEL)).unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        let decoded = registry.decode("High", ValueType::Enum(LEVEL)).unwrap();
        assert_eq!(decoded, Some(Value::Enum(LEVEL.value("High").unwrap())));
        let err = registry.decode("Medium", ValueType::Enum(LEVEL)).unwrap_err();
        assert!(matches!(err, ConversionError::Invalid { .. }));
    }

    #[test]
    fn integers_outside_i64_are_rejected() {
        let registry = ConverterRegistry::default();
        for raw in ["1e20", "-1e20", "inf"] {
            let err = registry.decode(raw, ValueType::Integer).unwrap_err();
            assert!(matches!(err, ConversionError::Invalid { .. }), "{raw}: {err}");
        }
        let err = registry
            .convert(Some(&Value::Float(1e20)), ValueType::Integer)
            .unwrap_err();
        assert!(err.to_string().contains("out of range"), "{err}");
        assert_eq!(
            registry.decode("-9007199254740992", ValueType::Integer).unwrap(),
            Some(Value::Integer(-9_007_199_254_740_992))
        );
    }

    #[test]
    fn missing_converters_are_unsupported() {
        let registry = ConverterRegistry::empty();
        registry.register(TextConverter);
        let err = registry.decode("1", ValueType::Integer).unwrap_err();
        assert_eq!(
            err,
            ConversionError::Unsupported {
                value_type: ValueType::Integer
            }
        );
        let err = registry
            .convert(Some(&Value::Integer(1)), ValueType::Text)
            .unwrap_err();
        assert_eq!(
            err,
            ConversionError::Unsupported {
                value_type: ValueType::Integer
            }
        );
    }

    struct YesNoConverter;

    impl TypeConverter for YesNoConverter {
        fn value_type(&self) -> ValueType {
            ValueType::Boolean
        }

        fn alias(&self) -> Option<ValueType> {
            Some(ValueType::List)
        }

        fn encode(&self, value: &Value) -> Result<String, ConversionError> {
            match value {
                Value::Boolean(true) => Ok("Y".to_string()),
                _ => Ok("N".to_string()),
            }
        }

        fn decode(&self, canonical: &str) -> Result<Option<Value>, ConversionError> {
            Ok(Some(Value::Boolean(canonical.trim() == "Y")))
        }
    }

    #[test]
    fn registration_replaces_and_aliases() {
        let registry = ConverterRegistry::default();
        registry.register(YesNoConverter);
        assert_eq!(
            registry.decode("Y", ValueType::Boolean).unwrap(),
            Some(Value::Boolean(true))
        );
        assert_eq!(registry.encode(&Value::Boolean(false)).unwrap(), "N");
        assert!(registry.supports(ValueType::List));
    }
}
