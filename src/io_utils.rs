//! Workbook file I/O.
//!
//! Everything that touches binary workbook files flows through this module:
//!
//! - **Opening**: a file is tried as legacy `.xls` first, then as `.xlsx`,
//!   through `calamine`. Every sheet is materialized into a [`MemoryWorkbook`].
//! - **Saving**: `.csv` targets get the first sheet through the `csv` crate
//!   with `QuoteStyle::Always`; anything else is written as `.xlsx` with
//!   `rust_xlsxwriter`, carrying styles, column styles and merged regions.
//! - Dates are stored as spreadsheet serials with their style's number format.

use std::{
    collections::HashMap,
    fs::File,
    io::{BufWriter, Read, Seek, Write},
    path::Path,
};

use anyhow::{Context, Result, anyhow};
use calamine::{Data, Range, Reader, Xls, Xlsx, open_workbook};
use csv::QuoteStyle;
use log::debug;
use rust_xlsxwriter::{Color, Format, FormatAlign, FormatBorder, FormatPattern, Workbook, Worksheet};

use crate::{
    error::StorageOpenError,
    storage::{CellValue, MemorySheet, MemoryWorkbook, SheetStorage, StyleId, WorkbookStorage},
    style::{BorderStyle, CellStyle, DEFAULT_DATE_PATTERN, DatePattern, FillPattern, HorizontalAlignment},
    value::{datetime_to_excel_serial, excel_serial_to_datetime, parse_naive_datetime},
};

pub fn is_csv(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"))
}

/// Opens `path` as `.xls`, falling back to `.xlsx`.
pub fn open_workbook_file(path: &Path) -> Result<MemoryWorkbook, StorageOpenError> {
    let mut reasons = Vec::new();
    match open_workbook::<Xls<_>, _>(path) {
        Ok(mut workbook) => match load_sheets(&mut workbook) {
            Ok(loaded) => return Ok(loaded),
            Err(err) => reasons.push(format!("xls: {err:#}")),
        },
        Err(err) => reasons.push(format!("xls: {err}")),
    }
    debug!("{path:?} is not a legacy workbook, trying xlsx");
    match open_workbook::<Xlsx<_>, _>(path) {
        Ok(mut workbook) => match load_sheets(&mut workbook) {
            Ok(loaded) => return Ok(loaded),
            Err(err) => reasons.push(format!("xlsx: {err:#}")),
        },
        Err(err) => reasons.push(format!("xlsx: {err}")),
    }
    Err(StorageOpenError {
        path: path.to_path_buf(),
        reasons: reasons.join("; "),
    })
}

fn load_sheets<R, RS>(workbook: &mut R) -> Result<MemoryWorkbook>
where
    R: Reader<RS>,
    RS: Read + Seek,
{
    let mut loaded = MemoryWorkbook::new();
    for name in workbook.sheet_names() {
        let range = workbook
            .worksheet_range(&name)
            .map_err(|err| anyhow!("Reading sheet '{name}': {err:?}"))?;
        loaded.add_sheet(sheet_from_range(&name, &range));
    }
    Ok(loaded)
}

fn sheet_from_range(name: &str, range: &Range<Data>) -> MemorySheet {
    let mut sheet = MemorySheet::new(name);
    let (row_offset, column_offset) = range
        .start()
        .map(|(row, column)| (row as usize, column as usize))
        .unwrap_or_default();
    for (row, column, data) in range.used_cells() {
        if let Some(value) = cell_value(data) {
            sheet.set_cell_value(row_offset + row, column_offset + column, value);
        }
    }
    sheet
}

fn cell_value(data: &Data) -> Option<CellValue> {
    let value = match data {
        Data::Empty => return None,
        Data::String(text) => CellValue::Text(text.clone()),
        Data::Int(value) => CellValue::Number(*value as f64),
        Data::Float(value) => CellValue::Number(*value),
        Data::Bool(value) => CellValue::Boolean(*value),
        Data::DateTime(value) => excel_serial_to_datetime(value.as_f64())
            .map(CellValue::Date)
            .unwrap_or(CellValue::Number(value.as_f64())),
        Data::DateTimeIso(text) | Data::DurationIso(text) => parse_naive_datetime(text)
            .map(CellValue::Date)
            .unwrap_or_else(|_| CellValue::Text(text.clone())),
        Data::Error(err) => CellValue::Text(err.to_string()),
    };
    Some(value)
}

/// Writes `workbook` to `path`, as CSV when the extension says so.
pub fn save_workbook(workbook: &MemoryWorkbook, path: &Path) -> Result<()> {
    if is_csv(path) {
        let sheet = workbook
            .sheets()
            .first()
            .ok_or_else(|| anyhow!("Workbook has no sheet to write to {path:?}"))?;
        let mut writer = open_csv_writer(path)?;
        write_sheet_csv(sheet, &mut writer)?;
        return writer
            .flush()
            .with_context(|| format!("Flushing CSV output {path:?}"));
    }
    save_xlsx(workbook, path)
}

pub fn open_csv_writer(path: &Path) -> Result<csv::Writer<Box<dyn Write>>> {
    let base: Box<dyn Write> = Box::new(BufWriter::new(
        File::create(path).with_context(|| format!("Creating output file {path:?}"))?,
    ));
    let mut builder = csv::WriterBuilder::new();
    builder
        .quote_style(QuoteStyle::Always)
        .double_quote(true)
        .flexible(true);
    Ok(builder.from_writer(base))
}

fn write_sheet_csv<W: Write>(sheet: &MemorySheet, writer: &mut csv::Writer<W>) -> Result<()> {
    let Some(last_row) = sheet.last_row_index() else {
        return Ok(());
    };
    let width = (0..=last_row)
        .filter_map(|row| sheet.last_column_index(row))
        .max()
        .map_or(0, |column| column + 1);
    for row in 0..=last_row {
        let record = (0..width)
            .map(|column| csv_text(sheet, row, column))
            .collect::<Vec<_>>();
        writer
            .write_record(&record)
            .with_context(|| format!("Writing CSV row {}", row + 1))?;
    }
    Ok(())
}

fn csv_text(sheet: &MemorySheet, row: usize, column: usize) -> String {
    let Some(cell) = sheet.cell(row, column) else {
        return String::new();
    };
    match &cell.value {
        Some(CellValue::Date(value)) => {
            let pattern = cell
                .style
                .and_then(|id| sheet.style(id))
                .and_then(|stored| stored.style.data_format.as_deref())
                .unwrap_or(DEFAULT_DATE_PATTERN);
            value
                .format(DatePattern::new(pattern).chrono_format())
                .to_string()
        }
        Some(other) => other.as_display(),
        None => String::new(),
    }
}

fn save_xlsx(workbook: &MemoryWorkbook, path: &Path) -> Result<()> {
    let mut output = Workbook::new();
    for sheet in workbook.sheets() {
        let worksheet = output.add_worksheet();
        worksheet
            .set_name(sheet.name())
            .with_context(|| format!("Naming worksheet '{}'", sheet.name()))?;
        write_worksheet(sheet, worksheet)
            .with_context(|| format!("Writing worksheet '{}'", sheet.name()))?;
    }
    output
        .save(path)
        .with_context(|| format!("Saving workbook {path:?}"))?;
    debug!("Saved {} sheet(s) to {path:?}", workbook.sheet_count());
    Ok(())
}

fn coordinates(row: usize, column: usize) -> Result<(u32, u16)> {
    let row = u32::try_from(row).with_context(|| format!("Row {row} is out of range"))?;
    let column =
        u16::try_from(column).with_context(|| format!("Column {column} is out of range"))?;
    Ok((row, column))
}

fn write_worksheet(sheet: &MemorySheet, worksheet: &mut Worksheet) -> Result<()> {
    let mut formats: HashMap<StyleId, Format> = HashMap::new();
    let mut format_for = |id: StyleId| -> Option<Format> {
        if let Some(format) = formats.get(&id) {
            return Some(format.clone());
        }
        let format = to_format(&sheet.style(id)?.style);
        formats.insert(id, format.clone());
        Some(format)
    };

    for region in sheet.merged_regions() {
        let (first_row, first_column) = coordinates(region.first_row, region.first_column)?;
        let (last_row, last_column) = coordinates(region.last_row, region.last_column)?;
        worksheet.merge_range(first_row, first_column, last_row, last_column, "", &Format::new())?;
    }

    for (column, id) in sheet.column_styles() {
        let (_, column) = coordinates(0, column)?;
        if let Some(format) = format_for(id) {
            worksheet.set_column_format(column, &format)?;
        }
    }

    for (row, column, cell) in sheet.cells() {
        let (row, column) = coordinates(row, column)?;
        let format = cell.style.and_then(&mut format_for);
        let Some(value) = &cell.value else {
            continue;
        };
        match (value, format) {
            (CellValue::Text(text), Some(format)) => {
                worksheet.write_string_with_format(row, column, text, &format)?;
            }
            (CellValue::Text(text), None) => {
                worksheet.write_string(row, column, text)?;
            }
            (CellValue::Number(number), Some(format)) => {
                worksheet.write_number_with_format(row, column, *number, &format)?;
            }
            (CellValue::Number(number), None) => {
                worksheet.write_number(row, column, *number)?;
            }
            (CellValue::Boolean(flag), Some(format)) => {
                worksheet.write_boolean_with_format(row, column, *flag, &format)?;
            }
            (CellValue::Boolean(flag), None) => {
                worksheet.write_boolean(row, column, *flag)?;
            }
            (CellValue::Date(date), format) => {
                let format = format
                    .unwrap_or_else(|| Format::new().set_num_format(DEFAULT_DATE_PATTERN));
                worksheet.write_number_with_format(
                    row,
                    column,
                    datetime_to_excel_serial(*date),
                    &format,
                )?;
            }
        }
    }
    Ok(())
}

fn to_format(style: &CellStyle) -> Format {
    let mut format = Format::new();
    if let Some(num_format) = style.data_format.as_deref() {
        format = format.set_num_format(num_format);
    }
    if let Some(rgb) = style.fill_foreground_color {
        format = format.set_background_color(Color::RGB(rgb));
    }
    if let Some(pattern) = style.fill_pattern {
        format = format.set_pattern(match pattern {
            FillPattern::NoFill => FormatPattern::None,
            FillPattern::Solid => FormatPattern::Solid,
            FillPattern::Gray50 => FormatPattern::MediumGray,
            FillPattern::Gray25 => FormatPattern::LightGray,
        });
    }
    if let Some(alignment) = style.alignment {
        format = format.set_align(match alignment {
            HorizontalAlignment::General => FormatAlign::General,
            HorizontalAlignment::Left => FormatAlign::Left,
            HorizontalAlignment::Center => FormatAlign::Center,
            HorizontalAlignment::Right => FormatAlign::Right,
        });
    }
    if let Some(border) = style.border {
        format = format.set_border(match border {
            BorderStyle::None => FormatBorder::None,
            BorderStyle::Thin => FormatBorder::Thin,
            BorderStyle::Medium => FormatBorder::Medium,
            BorderStyle::Thick => FormatBorder::Thick,
            BorderStyle::Dashed => FormatBorder::Dashed,
        });
    }
    format
}
