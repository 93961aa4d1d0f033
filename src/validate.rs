//! Stateless rules evaluated against a decoded cell value.

use std::fmt;

use crate::{message::Message, value::Value};

/// Where the value being validated came from.
#[derive(Debug, Clone, Copy)]
pub struct RowContext<'a> {
    pub sheet_name: &'a str,
    /// 1-based, as shown by spreadsheet applications.
    pub row_number: usize,
    pub column_title: &'a str,
}

pub trait ValidationRule: fmt::Debug + Send + Sync {
    fn validate(&self, value: Option<&Value>, context: &RowContext<'_>) -> Option<Message>;
}

/// Absent values and blank text are empty; zero and epoch dates are not.
pub fn is_empty_value(value: Option<&Value>) -> bool {
    value.is_none_or(Value::is_blank)
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NotEmpty;

impl ValidationRule for NotEmpty {
    fn validate(&self, value: Option<&Value>, context: &RowContext<'_>) -> Option<Message> {
        is_empty_value(value).then(|| {
            Message::error(format!(
                "Field: {} is required at line {} in sheet {}.",
                context.column_title, context.row_number, context.sheet_name
            ))
        })
    }
}
