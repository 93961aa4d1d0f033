//! Schema-driven row reading.
//!
//! A [`RowReader`] walks one sheet: it binds the schema to the header row the
//! first time it is polled, then yields one [`RowRecord`] per data row until
//! the key column runs empty, the last populated row is passed, or a
//! fail-fast recorder trips. Binding failures and per-cell problems are
//! appended to the shared [`MessageRecorder`]; nothing is returned as an error.

use itertools::Itertools;
use log::{debug, info, warn};

use crate::{
    convert::ConverterRegistry,
    message::MessageRecorder,
    schema::{ColumnDefinition, SchemaDefinition},
    storage::SheetStorage,
    validate::{RowContext, is_empty_value},
    value::{Value, ValueType},
};

const HEADER_ROW: usize = 0;

/// A record together with where it was read from.
#[derive(Debug, Clone, PartialEq)]
pub struct RowRecord<T> {
    pub sheet_name: String,
    /// 1-based; the header is line 1.
    pub row_number: usize,
    pub data: T,
}

impl<T> RowRecord<T> {
    pub fn into_data(self) -> T {
        self.data
    }
}

#[derive(Debug, Clone, Copy)]
struct BoundField {
    column: usize,
    field: usize,
}

#[derive(Debug, Default)]
struct Binding {
    /// Key field first when the schema declares one.
    fields: Vec<BoundField>,
    extras: Vec<(usize, String)>,
    has_key: bool,
}

#[derive(Debug)]
enum ReaderState {
    Unbound,
    Bound(Binding),
    Terminated,
}

enum RowOutcome<T> {
    Record(RowRecord<T>),
    Skip,
    Terminate,
}

pub struct RowReader<'a, T, S: SheetStorage + ?Sized> {
    sheet: &'a S,
    schema: &'a SchemaDefinition<T>,
    registry: &'a ConverterRegistry,
    recorder: &'a mut MessageRecorder,
    state: ReaderState,
    next_row: usize,
    last_row: usize,
}

impl<'a, T, S> RowReader<'a, T, S>
where
    T: Default,
    S: SheetStorage + ?Sized,
{
    pub fn new(
        sheet: &'a S,
        schema: &'a SchemaDefinition<T>,
        registry: &'a ConverterRegistry,
        recorder: &'a mut MessageRecorder,
    ) -> Self {
        Self {
            sheet,
            schema,
            registry,
            recorder,
            state: ReaderState::Unbound,
            next_row: HEADER_ROW + 1,
            last_row: sheet.last_row_index().unwrap_or(HEADER_ROW),
        }
    }

    /// Binds the header on first call; returns whether rows can be read.
    pub fn bind(&mut self) -> bool {
        if matches!(self.state, ReaderState::Unbound) {
            self.state = match self.bind_header() {
                Some(binding) => ReaderState::Bound(binding),
                None => ReaderState::Terminated,
            };
        }
        matches!(self.state, ReaderState::Bound(_))
    }

    pub fn is_terminated(&self) -> bool {
        matches!(self.state, ReaderState::Terminated)
    }

    /// Titles in internal binding order, key first.
    pub fn bound_titles(&mut self) -> Vec<&str> {
        self.bind();
        match &self.state {
            ReaderState::Bound(binding) => binding
                .fields
                .iter()
                .filter_map(|bound| self.schema.field(bound.field))
                .map(ColumnDefinition::title)
                .collect(),
            _ => Vec::new(),
        }
    }

    fn bind_header(&mut self) -> Option<Binding> {
        let sheet_name = self.sheet.name().to_string();
        let mut binding = Binding::default();
        let wants_extras = self.schema.catch_all().is_some();
        let total = self.schema.fields().len();

        if let Some(last_column) = self.sheet.last_column_index(HEADER_ROW) {
            for column in 0..=last_column {
                let Some(title) = self
                    .sheet
                    .read_string(HEADER_ROW, column)
                    .filter(|title| !title.is_empty())
                else {
                    break;
                };
                match self.schema.position(&title) {
                    Some(field) if binding.fields.iter().all(|b| b.field != field) => {
                        binding.fields.push(BoundField { column, field });
                    }
                    Some(_) => debug!("Sheet '{sheet_name}': repeated title '{title}' ignored"),
                    None if wants_extras => binding.extras.push((column, title)),
                    None => debug!("Sheet '{sheet_name}': unmapped title '{title}' ignored"),
                }
                if binding.fields.len() == total && !wants_extras {
                    break;
                }
            }
        }

        let mut usable = true;
        if let Some(key) = self.schema.key_index() {
            match binding.fields.iter().position(|b| b.field == key) {
                Some(position) => {
                    let key_field = binding.fields.remove(position);
                    binding.fields.insert(0, key_field);
                    binding.has_key = true;
                }
                None => {
                    let title = self.schema.field(key).map(ColumnDefinition::title).unwrap_or_default();
                    self.recorder.append_error(format!(
                        "Key column: {title} is missing in sheet {sheet_name}."
                    ));
                    usable = false;
                }
            }
        }

        let missing = self
            .schema
            .fields()
            .iter()
            .enumerate()
            .filter(|(idx, column)| {
                column.is_required()
                    && binding.fields.iter().all(|b| b.field != *idx)
            })
            .map(|(_, column)| column.title())
            .collect::<Vec<_>>();
        if !missing.is_empty() {
            self.recorder.append_error(format!(
                "Required columns: {} are missing in sheet {sheet_name}.",
                missing.iter().join(", ")
            ));
            usable = false;
        }

        if !usable {
            warn!("Sheet '{sheet_name}' can't be bound to schema '{}'", self.schema.name());
            return None;
        }
        info!(
            "Sheet '{sheet_name}': bound {} column(s) to schema '{}', {} unmapped",
            binding.fields.len(),
            self.schema.name(),
            binding.extras.len()
        );
        Some(binding)
    }

    fn terminate(&mut self, reason: &str) {
        debug!("Sheet '{}': stopped reading at line {} ({reason})", self.sheet.name(), self.next_row);
        self.state = ReaderState::Terminated;
    }

    fn read_row(&mut self, row: usize) -> RowOutcome<T> {
        let ReaderState::Bound(binding) = &self.state else {
            return RowOutcome::Terminate;
        };
        let sheet_name = self.sheet.name();
        let row_number = row + 1;
        let mut data = T::default();
        let mut populated = false;

        for (position, bound) in binding.fields.iter().enumerate() {
            let Some(column) = self.schema.field(bound.field) else {
                continue;
            };
            let decoded = read_cell(self.sheet, self.registry, row, bound.column, column.declared_type());
            let value = match decoded {
                Ok(value) => value,
                Err(reason) => {
                    self.recorder.append_error(format!(
                        "Field: {} at line {row_number} in sheet {sheet_name} was skipped: {reason}",
                        column.title()
                    ));
                    if position == 0 && binding.has_key {
                        return RowOutcome::Skip;
                    }
                    continue;
                }
            };
            let empty = is_empty_value(value.as_ref());
            if position == 0 && binding.has_key && empty {
                return RowOutcome::Terminate;
            }
            if let Some(rule) = column.validation_rule() {
                let context = RowContext {
                    sheet_name,
                    row_number,
                    column_title: column.title(),
                };
                if let Some(message) = rule.validate(value.as_ref(), &context) {
                    self.recorder.record(message);
                }
            }
            let Some(value) = value.filter(|_| !empty) else {
                continue;
            };
            populated = true;
            if let Err(err) = column.accessor().set(&mut data, value) {
                self.recorder.append_error(format!(
                    "Field: {} at line {row_number} in sheet {sheet_name} was skipped: {err}",
                    column.title()
                ));
            }
        }

        if let Some(catch_all) = self.schema.catch_all() {
            for (column, title) in &binding.extras {
                if let Some(text) = self.sheet.read_string(row, *column).filter(|t| !t.is_empty()) {
                    populated = true;
                    catch_all.set(&mut data, title, text);
                }
            }
        }

        if !populated {
            return RowOutcome::Skip;
        }

        let mut record = RowRecord {
            sheet_name: sheet_name.to_string(),
            row_number,
            data,
        };
        if let Some(hook) = self.schema.post_row_hook() {
            hook(&mut record, &mut *self.recorder);
        }
        RowOutcome::Record(record)
    }
}

/// Native readers for strings, numbers and dates; everything else goes
/// through the cell text and the converter registry.
fn read_cell<S>(
    sheet: &S,
    registry: &ConverterRegistry,
    row: usize,
    column: usize,
    declared: ValueType,
) -> Result<Option<Value>, String>
where
    S: SheetStorage + ?Sized,
{
    let number = || sheet.read_number(row, column).map_err(|err| err.to_string());
    let date = || sheet.read_date(row, column).map_err(|err| err.to_string());
    match declared {
        ValueType::Text => Ok(sheet.read_string(row, column).map(Value::Text)),
        ValueType::Float => Ok(number()?.map(Value::Float)),
        ValueType::Integer => match number()? {
            Some(n) => registry
                .convert(Some(&Value::Float(n)), ValueType::Integer)
                .map_err(|err| err.to_string()),
            None => Ok(None),
        },
        ValueType::Date => Ok(date()?.map(|dt| Value::Date(dt.date()))),
        ValueType::DateTime => Ok(date()?.map(Value::DateTime)),
        ValueType::Timestamp => Ok(date()?.map(|dt| Value::Timestamp(dt.and_utc()))),
        other => match sheet.read_string(row, column) {
            Some(text) if !text.is_empty() => {
                registry.decode(&text, other).map_err(|err| err.to_string())
            }
            _ => Ok(None),
        },
    }
}

impl<T, S> Iterator for RowReader<'_, T, S>
where
    T: Default,
    S: SheetStorage + ?Sized,
{
    type Item = RowRecord<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.bind() {
            return None;
        }
        loop {
            if self.recorder.is_halted() {
                self.terminate("recorder halted");
                return None;
            }
            if self.next_row > self.last_row {
                self.terminate("end of sheet");
                return None;
            }
            let row = self.next_row;
            self.next_row += 1;
            match self.read_row(row) {
                RowOutcome::Record(record) => return Some(record),
                RowOutcome::Skip => continue,
                RowOutcome::Terminate => {
                    self.terminate("empty key");
                    return None;
                }
            }
        }
    }
}
