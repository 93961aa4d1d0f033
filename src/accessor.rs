//! Get/set access to one field of a record, bound at schema-build time.

use std::{fmt, sync::Arc};

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use crate::{
    error::ConversionError,
    value::{EnumType, Value, ValueType},
};

type Getter<T> = Arc<dyn Fn(&T) -> Option<Value> + Send + Sync>;
type Setter<T> = Arc<dyn Fn(&mut T, Value) -> Result<(), ConversionError> + Send + Sync>;
type CatchAllSetter<T> = Arc<dyn Fn(&mut T, &str, String) + Send + Sync>;

/// Implemented by record enums stored as their variant name in a cell.
pub trait SheetEnum: Sized {
    const TYPE: EnumType;

    fn variant_name(&self) -> &'static str;

    fn from_variant(name: &str) -> Option<Self>;
}

pub struct FieldAccessor<T> {
    field_name: String,
    declared_type: ValueType,
    getter: Getter<T>,
    setter: Setter<T>,
}

impl<T> Clone for FieldAccessor<T> {
    fn clone(&self) -> Self {
        Self {
            field_name: self.field_name.clone(),
            declared_type: self.declared_type,
            getter: Arc::clone(&self.getter),
            setter: Arc::clone(&self.setter),
        }
    }
}

impl<T> fmt::Debug for FieldAccessor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldAccessor")
            .field("field_name", &self.field_name)
            .field("declared_type", &self.declared_type)
            .finish_non_exhaustive()
    }
}

fn mismatch(value: &Value, expected: ValueType) -> ConversionError {
    ConversionError::invalid(
        value.as_display(),
        expected,
        format!("field expects {expected}, got {}", value.value_type()),
    )
}

impl<T> FieldAccessor<T> {
    pub fn new<G, S>(
        field_name: impl Into<String>,
        declared_type: ValueType,
        getter: G,
        setter: S,
    ) -> Self
    where
        G: Fn(&T) -> Option<Value> + Send + Sync + 'static,
        S: Fn(&mut T, Value) -> Result<(), ConversionError> + Send + Sync + 'static,
    {
        Self {
            field_name: field_name.into(),
            declared_type,
            getter: Arc::new(getter),
            setter: Arc::new(setter),
        }
    }

    pub fn field_name(&self) -> &str {
        &self.field_name
    }

    pub fn declared_type(&self) -> ValueType {
        self.declared_type
    }

    pub fn get(&self, record: &T) -> Option<Value> {
        (self.getter)(record)
    }

    pub fn set(&self, record: &mut T, value: Value) -> Result<(), ConversionError> {
        (self.setter)(record, value)
    }

    fn typed<V, G, S, E>(
        field_name: impl Into<String>,
        declared_type: ValueType,
        getter: G,
        setter: S,
        extract: E,
    ) -> Self
    where
        V: Into<Value> + 'static,
        G: Fn(&T) -> Option<V> + Send + Sync + 'static,
        S: Fn(&mut T, V) + Send + Sync + 'static,
        E: Fn(Value) -> Option<V> + Send + Sync + 'static,
    {
        Self::new(
            field_name,
            declared_type,
            move |record| getter(record).map(Into::into),
            move |record, value| {
                let shown = value.clone();
                let typed = extract(value).ok_or_else(|| mismatch(&shown, declared_type))?;
                setter(record, typed);
                Ok(())
            },
        )
    }

    pub fn text<G, S>(field_name: impl Into<String>, getter: G, setter: S) -> Self
    where
        G: Fn(&T) -> Option<String> + Send + Sync + 'static,
        S: Fn(&mut T, String) + Send + Sync + 'static,
    {
        Self::typed(field_name, ValueType::Text, getter, setter, |value| match value {
            Value::Text(s) => Some(s),
            _ => None,
        })
    }

    pub fn integer<G, S>(field_name: impl Into<String>, getter: G, setter: S) -> Self
    where
        G: Fn(&T) -> Option<i64> + Send + Sync + 'static,
        S: Fn(&mut T, i64) + Send + Sync + 'static,
    {
        Self::typed(field_name, ValueType::Integer, getter, setter, |value| {
            value.as_i64()
        })
    }

    pub fn float<G, S>(field_name: impl Into<String>, getter: G, setter: S) -> Self
    where
        G: Fn(&T) -> Option<f64> + Send + Sync + 'static,
        S: Fn(&mut T, f64) + Send + Sync + 'static,
    {
        Self::typed(field_name, ValueType::Float, getter, setter, |value| {
            value.as_f64()
        })
    }

    pub fn boolean<G, S>(field_name: impl Into<String>, getter: G, setter: S) -> Self
    where
        G: Fn(&T) -> Option<bool> + Send + Sync + 'static,
        S: Fn(&mut T, bool) + Send + Sync + 'static,
    {
        Self::typed(field_name, ValueType::Boolean, getter, setter, |value| {
            value.as_bool()
        })
    }

    pub fn date<G, S>(field_name: impl Into<String>, getter: G, setter: S) -> Self
    where
        G: Fn(&T) -> Option<NaiveDate> + Send + Sync + 'static,
        S: Fn(&mut T, NaiveDate) + Send + Sync + 'static,
    {
        Self::typed(field_name, ValueType::Date, getter, setter, |value| {
            value.as_date()
        })
    }

    pub fn datetime<G, S>(field_name: impl Into<String>, getter: G, setter: S) -> Self
    where
        G: Fn(&T) -> Option<NaiveDateTime> + Send + Sync + 'static,
        S: Fn(&mut T, NaiveDateTime) + Send + Sync + 'static,
    {
        Self::typed(field_name, ValueType::DateTime, getter, setter, |value| {
            value.as_datetime()
        })
    }

    pub fn timestamp<G, S>(field_name: impl Into<String>, getter: G, setter: S) -> Self
    where
        G: Fn(&T) -> Option<DateTime<Utc>> + Send + Sync + 'static,
        S: Fn(&mut T, DateTime<Utc>) + Send + Sync + 'static,
    {
        Self::typed(field_name, ValueType::Timestamp, getter, setter, |value| {
            value.as_timestamp()
        })
    }

    pub fn enumeration<E, G, S>(field_name: impl Into<String>, getter: G, setter: S) -> Self
    where
        E: SheetEnum + 'static,
        G: Fn(&T) -> Option<E> + Send + Sync + 'static,
        S: Fn(&mut T, E) + Send + Sync + 'static,
    {
        let declared_type = ValueType::Enum(E::TYPE);
        Self::new(
            field_name,
            declared_type,
            move |record| {
                getter(record).and_then(|variant| {
                    E::TYPE
                        .value(variant.variant_name())
                        .map(Value::Enum)
                })
            },
            move |record, value| {
                let variant = value
                    .as_enum()
                    .filter(|v| v.ty == E::TYPE)
                    .and_then(|v| E::from_variant(v.variant))
                    .ok_or_else(|| mismatch(&value, declared_type))?;
                setter(record, variant);
                Ok(())
            },
        )
    }
}

/// Receives every `(title, text)` pair whose title no schema column claims.
pub struct CatchAllAccessor<T> {
    field_name: String,
    setter: CatchAllSetter<T>,
}

impl<T> Clone for CatchAllAccessor<T> {
    fn clone(&self) -> Self {
        Self {
            field_name: self.field_name.clone(),
            setter: Arc::clone(&self.setter),
        }
    }
}

impl<T> fmt::Debug for CatchAllAccessor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CatchAllAccessor")
            .field("field_name", &self.field_name)
            .finish_non_exhaustive()
    }
}

impl<T> CatchAllAccessor<T> {
    pub fn new<S>(field_name: impl Into<String>, setter: S) -> Self
    where
        S: Fn(&mut T, &str, String) + Send + Sync + 'static,
    {
        Self {
            field_name: field_name.into(),
            setter: Arc::new(setter),
        }
    }

    pub fn field_name(&self) -> &str {
        &self.field_name
    }

    pub fn set(&self, record: &mut T, title: &str, value: String) {
        (self.setter)(record, title, value)
    }
}
