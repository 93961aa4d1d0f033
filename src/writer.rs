//! Cursor-based cell writer.
//!
//! [`RowWriter`] writes values left to right from a `(row, column)` cursor.
//! Every cell gets the first style available out of: the style passed for the
//! call, the column's default style, then the kind default (dates get the
//! date pattern format, numbers the default number format when one is set).
//! Dates are rounded through the date pattern before they are stored. After
//! each value the cursor moves past any merged block the cell belongs to.

use std::collections::HashMap;

use chrono::NaiveDateTime;
use log::trace;

use crate::{
    error::StorageError,
    schema::SchemaDefinition,
    storage::{CellValue, FormatId, MergedRegion, SheetStorage, StyleId},
    style::{CellStyle, DatePattern},
    value::Value,
};

pub struct RowWriter<'a, S: SheetStorage + ?Sized> {
    sheet: &'a mut S,
    row: usize,
    column: usize,
    date_pattern: DatePattern,
    date_style: StyleId,
    number_style: Option<StyleId>,
    data_formats: HashMap<String, FormatId>,
    styles: HashMap<CellStyle, StyleId>,
    named_styles: HashMap<String, StyleId>,
}

impl<'a, S> RowWriter<'a, S>
where
    S: SheetStorage + ?Sized,
{
    pub fn new(sheet: &'a mut S) -> Self {
        Self::with_date_pattern(sheet, DatePattern::default())
    }

    pub fn with_date_pattern(sheet: &'a mut S, date_pattern: DatePattern) -> Self {
        let mut writer = Self {
            sheet,
            row: 0,
            column: 0,
            date_pattern,
            date_style: 0,
            number_style: None,
            data_formats: HashMap::new(),
            styles: HashMap::new(),
            named_styles: HashMap::new(),
        };
        let date_format = CellStyle::from_data_format(writer.date_pattern.pattern());
        writer.date_style = writer.style_id(&date_format);
        writer
    }

    /// Number cells without a more specific style get this format.
    pub fn default_number_format(mut self, format: &str) -> Self {
        let style = CellStyle::from_data_format(format);
        self.number_style = Some(self.style_id(&style));
        self
    }

    pub fn date_pattern(&self) -> &DatePattern {
        &self.date_pattern
    }

    pub fn sheet(&self) -> &S {
        &*self.sheet
    }

    pub fn position(&self) -> (usize, usize) {
        (self.row, self.column)
    }

    pub fn locate(&mut self, row: usize, column: usize) -> &mut Self {
        self.row = row;
        self.column = column;
        self
    }

    pub fn new_line(&mut self) -> &mut Self {
        self.row += 1;
        self.column = 0;
        self
    }

    /// Moves past the cell under the cursor, skipping its merged block.
    pub fn next_column(&mut self) -> &mut Self {
        self.column += self.span_at_cursor();
        self
    }

    /// Declares a merged block anchored at the cursor; 1x1 is a no-op and a
    /// zero span is rejected.
    pub fn merge_cell(&mut self, row_span: usize, column_span: usize) -> Result<&mut Self, StorageError> {
        let (row, column) = (self.row, self.column);
        if row_span == 0 || column_span == 0 {
            return Err(StorageError::InvalidMergedRegion {
                first_row: row,
                last_row: (row + row_span).saturating_sub(1),
                first_column: column,
                last_column: (column + column_span).saturating_sub(1),
            });
        }
        if row_span > 1 || column_span > 1 {
            let region = MergedRegion::new(row, row + row_span - 1, column, column + column_span - 1)?;
            self.sheet.add_merged_region(region)?;
        }
        Ok(self)
    }

    fn data_format(&mut self, pattern: &str) -> FormatId {
        if let Some(id) = self.data_formats.get(pattern) {
            return *id;
        }
        let id = self.sheet.register_data_format(pattern);
        self.data_formats.insert(pattern.to_string(), id);
        id
    }

    /// Storage style for `style`, created once per distinct description.
    pub fn style_id(&mut self, style: &CellStyle) -> StyleId {
        if let Some(id) = self.styles.get(style) {
            return *id;
        }
        let format_id = style
            .data_format
            .as_deref()
            .filter(|format| !format.trim().is_empty())
            .map(|format| self.data_format(format));
        let id = self.sheet.create_cell_style(style, format_id);
        self.styles.insert(style.clone(), id);
        id
    }

    pub fn define_style(&mut self, name: impl Into<String>, style: &CellStyle) -> &mut Self {
        let id = self.style_id(style);
        self.named_styles.insert(name.into(), id);
        self
    }

    fn named_style(&self, name: &str) -> Result<StyleId, StorageError> {
        self.named_styles
            .get(name)
            .copied()
            .ok_or_else(|| StorageError::UnknownStyle(name.to_string()))
    }

    /// Makes a named style the default for the given columns.
    pub fn column_style<I>(&mut self, name: &str, columns: I) -> Result<&mut Self, StorageError>
    where
        I: IntoIterator<Item = usize>,
    {
        let id = self.named_style(name)?;
        for column in columns {
            self.sheet.set_column_style(column, id);
        }
        Ok(self)
    }

    pub fn write<I, V>(&mut self, values: I) -> &mut Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Option<Value>>,
    {
        for value in values {
            self.write_cell(value.into().as_ref(), None);
        }
        self
    }

    pub fn write_with_style<I, V>(&mut self, name: &str, values: I) -> Result<&mut Self, StorageError>
    where
        I: IntoIterator<Item = V>,
        V: Into<Option<Value>>,
    {
        let id = self.named_style(name)?;
        for value in values {
            self.write_cell(value.into().as_ref(), Some(id));
        }
        Ok(self)
    }

    /// Writes every schema column of `record` from the cursor, applying each
    /// column's declared style as the explicit style.
    pub fn write_record<T>(&mut self, schema: &SchemaDefinition<T>, record: &T) -> &mut Self {
        for column in schema.fields() {
            let explicit = column.cell_style().map(|style| self.style_id(style));
            let value = column.accessor().get(record);
            self.write_cell(value.as_ref(), explicit);
        }
        self
    }

    pub fn write_titles<T>(&mut self, schema: &SchemaDefinition<T>) -> &mut Self {
        self.write(schema.titles().into_iter().map(Value::from))
    }

    fn write_cell(&mut self, value: Option<&Value>, explicit: Option<StyleId>) {
        let (row, column) = (self.row, self.column);
        let column_style = self.sheet.column_style(column);
        let inherited = explicit.or(column_style);
        match value {
            None => {}
            Some(Value::Date(date)) => {
                let midnight = date.and_hms_opt(0, 0, 0).unwrap_or_default();
                self.write_date(midnight, inherited);
            }
            Some(Value::DateTime(datetime)) => self.write_date(*datetime, inherited),
            Some(Value::Timestamp(ts)) => self.write_date(ts.naive_utc(), inherited),
            Some(Value::Integer(i)) => {
                self.write_number(*i as f64, inherited);
            }
            Some(Value::Float(f)) => self.write_number(*f, inherited),
            Some(Value::Boolean(b)) => {
                self.store(CellValue::Boolean(*b), inherited);
            }
            Some(other) => {
                self.store(CellValue::Text(other.as_display()), inherited);
            }
        }
        trace!("Wrote {value:?} at ({row}, {column})");
        self.column += self.span_at_cursor();
    }

    fn write_date(&mut self, value: NaiveDateTime, inherited: Option<StyleId>) {
        let rounded = self.date_pattern.round(value);
        let style = inherited.unwrap_or(self.date_style);
        self.store(CellValue::Date(rounded), Some(style));
    }

    fn write_number(&mut self, value: f64, inherited: Option<StyleId>) {
        let style = inherited.or(self.number_style);
        self.store(CellValue::Number(value), style);
    }

    fn store(&mut self, value: CellValue, style: Option<StyleId>) {
        let (row, column) = (self.row, self.column);
        self.sheet.set_cell_value(row, column, value);
        if let Some(style) = style {
            self.sheet.set_cell_style(row, column, style);
        }
    }

    fn span_at_cursor(&self) -> usize {
        self.sheet
            .merged_region_spanning(self.row, self.column)
            .map(|region| region.last_column - self.column + 1)
            .unwrap_or(1)
    }
}
