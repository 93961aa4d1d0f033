//! Abstract sheet/cell storage plus the in-memory implementation.
//!
//! The mapping engine only talks to [`SheetStorage`] and [`WorkbookStorage`].
//! [`MemorySheet`] / [`MemoryWorkbook`] hold a fully materialized workbook;
//! `io_utils` fills them from binary files and saves them back.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;

use crate::{
    error::StorageError,
    style::CellStyle,
    value::{datetime_to_excel_serial, excel_serial_to_datetime, format_number, parse_naive_datetime},
};

pub type StyleId = usize;
pub type FormatId = usize;

/// Custom number formats start after the spreadsheet built-ins.
const FIRST_CUSTOM_FORMAT: FormatId = 164;

#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Text(String),
    Number(f64),
    Boolean(bool),
    Date(NaiveDateTime),
}

impl CellValue {
    pub fn kind(&self) -> &'static str {
        match self {
            CellValue::Text(_) => "text",
            CellValue::Number(_) => "number",
            CellValue::Boolean(_) => "boolean",
            CellValue::Date(_) => "date",
        }
    }

    pub fn as_display(&self) -> String {
        match self {
            CellValue::Text(s) => s.clone(),
            CellValue::Number(n) => format_number(*n),
            CellValue::Boolean(b) => b.to_string(),
            CellValue::Date(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Text(value.to_string())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::Text(value)
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number(value)
    }
}

impl From<bool> for CellValue {
    fn from(value: bool) -> Self {
        CellValue::Boolean(value)
    }
}

impl From<NaiveDateTime> for CellValue {
    fn from(value: NaiveDateTime) -> Self {
        CellValue::Date(value)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Cell {
    pub value: Option<CellValue>,
    pub style: Option<StyleId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredStyle {
    pub style: CellStyle,
    pub format_id: Option<FormatId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MergedRegion {
    pub first_row: usize,
    pub last_row: usize,
    pub first_column: usize,
    pub last_column: usize,
}

impl MergedRegion {
    pub fn new(
        first_row: usize,
        last_row: usize,
        first_column: usize,
        last_column: usize,
    ) -> Result<Self, StorageError> {
        let region = Self {
            first_row,
            last_row,
            first_column,
            last_column,
        };
        if last_row < first_row || last_column < first_column {
            return Err(StorageError::InvalidMergedRegion {
                first_row,
                last_row,
                first_column,
                last_column,
            });
        }
        Ok(region)
    }

    pub fn contains(&self, row: usize, column: usize) -> bool {
        (self.first_row..=self.last_row).contains(&row)
            && (self.first_column..=self.last_column).contains(&column)
    }

    pub fn overlaps(&self, other: &MergedRegion) -> bool {
        self.first_row <= other.last_row
            && other.first_row <= self.last_row
            && self.first_column <= other.last_column
            && other.first_column <= self.last_column
    }

    pub fn row_span(&self) -> usize {
        self.last_row - self.first_row + 1
    }

    pub fn column_span(&self) -> usize {
        self.last_column - self.first_column + 1
    }
}

pub trait SheetStorage {
    fn name(&self) -> &str;

    fn cell(&self, row: usize, column: usize) -> Option<&Cell>;

    /// Creates the row and cell on demand.
    fn cell_mut(&mut self, row: usize, column: usize) -> &mut Cell;

    fn has_row(&self, row: usize) -> bool;

    /// Index of the last row holding at least one value.
    fn last_row_index(&self) -> Option<usize>;

    /// Index of the last cell holding a value in `row`.
    fn last_column_index(&self, row: usize) -> Option<usize>;

    fn register_data_format(&mut self, pattern: &str) -> FormatId;

    fn create_cell_style(&mut self, style: &CellStyle, format_id: Option<FormatId>) -> StyleId;

    fn style(&self, id: StyleId) -> Option<&StoredStyle>;

    fn column_style(&self, column: usize) -> Option<StyleId>;

    fn set_column_style(&mut self, column: usize, style: StyleId);

    fn add_merged_region(&mut self, region: MergedRegion) -> Result<(), StorageError>;

    fn merged_region_spanning(&self, row: usize, column: usize) -> Option<MergedRegion>;

    fn set_cell_value(&mut self, row: usize, column: usize, value: CellValue) {
        self.cell_mut(row, column).value = Some(value);
    }

    fn set_cell_style(&mut self, row: usize, column: usize, style: StyleId) {
        self.cell_mut(row, column).style = Some(style);
    }

    fn value(&self, row: usize, column: usize) -> Option<&CellValue> {
        self.cell(row, column).and_then(|cell| cell.value.as_ref())
    }

    /// Any populated cell reads as trimmed text.
    fn read_string(&self, row: usize, column: usize) -> Option<String> {
        self.value(row, column)
            .map(|value| value.as_display().trim().to_string())
    }

    fn read_number(&self, row: usize, column: usize) -> Result<Option<f64>, StorageError> {
        let Some(value) = self.value(row, column) else {
            return Ok(None);
        };
        match value {
            CellValue::Number(n) => Ok(Some(*n)),
            CellValue::Date(dt) => Ok(Some(datetime_to_excel_serial(*dt))),
            CellValue::Text(s) if s.trim().is_empty() => Ok(None),
            CellValue::Text(s) => s.trim().parse::<f64>().map(Some).map_err(|_| {
                unreadable(row, column, "number", value)
            }),
            CellValue::Boolean(_) => Err(unreadable(row, column, "number", value)),
        }
    }

    fn read_date(&self, row: usize, column: usize) -> Result<Option<NaiveDateTime>, StorageError> {
        let Some(value) = self.value(row, column) else {
            return Ok(None);
        };
        match value {
            CellValue::Date(dt) => Ok(Some(*dt)),
            CellValue::Number(n) => excel_serial_to_datetime(*n)
                .map(Some)
                .ok_or_else(|| unreadable(row, column, "date", value)),
            CellValue::Text(s) if s.trim().is_empty() => Ok(None),
            CellValue::Text(s) => parse_naive_datetime(s.trim())
                .map(Some)
                .map_err(|_| unreadable(row, column, "date", value)),
            CellValue::Boolean(_) => Err(unreadable(row, column, "date", value)),
        }
    }
}

fn unreadable(row: usize, column: usize, expected: &'static str, found: &CellValue) -> StorageError {
    StorageError::UnreadableCell {
        row,
        column,
        expected,
        found: found.as_display(),
    }
}

pub trait WorkbookStorage {
    type Sheet: SheetStorage;

    fn sheet_count(&self) -> usize;

    fn sheet_at(&self, index: usize) -> Option<&Self::Sheet>;

    fn sheet_at_mut(&mut self, index: usize) -> Option<&mut Self::Sheet>;

    fn sheet_by_name(&self, name: &str) -> Option<&Self::Sheet>;

    /// Returns the named sheet, creating an empty one at the end when missing.
    fn sheet_or_create(&mut self, name: &str) -> &mut Self::Sheet;
}

#[derive(Debug, Clone, Default)]
pub struct MemorySheet {
    name: String,
    rows: BTreeMap<usize, BTreeMap<usize, Cell>>,
    formats: Vec<String>,
    styles: Vec<StoredStyle>,
    column_styles: BTreeMap<usize, StyleId>,
    merged_regions: Vec<MergedRegion>,
}

impl MemorySheet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Builds a text-only sheet; empty strings leave the cell absent.
    pub fn from_text_rows<R, C>(name: impl Into<String>, rows: R) -> Self
    where
        R: IntoIterator<Item = C>,
        C: IntoIterator,
        C::Item: AsRef<str>,
    {
        let mut sheet = Self::new(name);
        for (row_idx, row) in rows.into_iter().enumerate() {
            for (col_idx, text) in row.into_iter().enumerate() {
                let text = text.as_ref();
                if !text.is_empty() {
                    sheet.set_cell_value(row_idx, col_idx, CellValue::from(text));
                }
            }
        }
        sheet
    }

    pub fn merged_regions(&self) -> &[MergedRegion] {
        &self.merged_regions
    }

    pub fn formats(&self) -> &[String] {
        &self.formats
    }

    pub fn column_styles(&self) -> impl Iterator<Item = (usize, StyleId)> + '_ {
        self.column_styles.iter().map(|(column, id)| (*column, *id))
    }

    /// Populated cells in row-major order.
    pub fn cells(&self) -> impl Iterator<Item = (usize, usize, &Cell)> {
        self.rows.iter().flat_map(|(row_idx, cells)| {
            cells
                .iter()
                .map(move |(col_idx, cell)| (*row_idx, *col_idx, cell))
        })
    }
}

impl SheetStorage for MemorySheet {
    fn name(&self) -> &str {
        &self.name
    }

    fn cell(&self, row: usize, column: usize) -> Option<&Cell> {
        self.rows.get(&row).and_then(|cells| cells.get(&column))
    }

    fn cell_mut(&mut self, row: usize, column: usize) -> &mut Cell {
        self.rows
            .entry(row)
            .or_default()
            .entry(column)
            .or_default()
    }

    fn has_row(&self, row: usize) -> bool {
        self.rows.contains_key(&row)
    }

    fn last_row_index(&self) -> Option<usize> {
        self.rows
            .iter()
            .rev()
            .find(|(_, cells)| cells.values().any(|cell| cell.value.is_some()))
            .map(|(idx, _)| *idx)
    }

    fn last_column_index(&self, row: usize) -> Option<usize> {
        self.rows.get(&row).and_then(|cells| {
            cells
                .iter()
                .rev()
                .find(|(_, cell)| cell.value.is_some())
                .map(|(idx, _)| *idx)
        })
    }

    fn register_data_format(&mut self, pattern: &str) -> FormatId {
        let position = match self.formats.iter().position(|known| known == pattern) {
            Some(position) => position,
            None => {
                self.formats.push(pattern.to_string());
                self.formats.len() - 1
            }
        };
        FIRST_CUSTOM_FORMAT + position
    }

    fn create_cell_style(&mut self, style: &CellStyle, format_id: Option<FormatId>) -> StyleId {
        self.styles.push(StoredStyle {
            style: style.clone(),
            format_id,
        });
        self.styles.len() - 1
    }

    fn style(&self, id: StyleId) -> Option<&StoredStyle> {
        self.styles.get(id)
    }

    fn column_style(&self, column: usize) -> Option<StyleId> {
        self.column_styles.get(&column).copied()
    }

    fn set_column_style(&mut self, column: usize, style: StyleId) {
        self.column_styles.insert(column, style);
    }

    fn add_merged_region(&mut self, region: MergedRegion) -> Result<(), StorageError> {
        if self.merged_regions.iter().any(|known| known.overlaps(&region)) {
            return Err(StorageError::OverlappingMergedRegion {
                row: region.first_row,
                column: region.first_column,
            });
        }
        self.merged_regions.push(region);
        Ok(())
    }

    fn merged_region_spanning(&self, row: usize, column: usize) -> Option<MergedRegion> {
        self.merged_regions
            .iter()
            .find(|region| region.contains(row, column))
            .copied()
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryWorkbook {
    sheets: Vec<MemorySheet>,
}

impl MemoryWorkbook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_sheet(&mut self, sheet: MemorySheet) -> &mut MemorySheet {
        self.sheets.push(sheet);
        let last = self.sheets.len() - 1;
        &mut self.sheets[last]
    }

    pub fn sheets(&self) -> &[MemorySheet] {
        &self.sheets
    }
}

impl WorkbookStorage for MemoryWorkbook {
    type Sheet = MemorySheet;

    fn sheet_count(&self) -> usize {
        self.sheets.len()
    }

    fn sheet_at(&self, index: usize) -> Option<&MemorySheet> {
        self.sheets.get(index)
    }

    fn sheet_at_mut(&mut self, index: usize) -> Option<&mut MemorySheet> {
        self.sheets.get_mut(index)
    }

    fn sheet_by_name(&self, name: &str) -> Option<&MemorySheet> {
        self.sheets.iter().find(|sheet| sheet.name == name)
    }

    fn sheet_or_create(&mut self, name: &str) -> &mut MemorySheet {
        match self.sheets.iter().position(|sheet| sheet.name == name) {
            Some(index) => &mut self.sheets[index],
            None => self.add_sheet(MemorySheet::new(name)),
        }
    }
}
