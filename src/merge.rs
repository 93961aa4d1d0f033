use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use log::{error, info, warn};

use crate::{
    cli::Cli,
    dataset::{SOURCE_TITLE, SheetDataset, union},
    io_utils,
    storage::{MemorySheet, MemoryWorkbook, SheetStorage, WorkbookStorage},
    value::Value,
    writer::RowWriter,
};

pub const SUMMARY_SHEET: &str = "summary";

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MergeSummary {
    pub files_read: usize,
    pub files_skipped: usize,
    pub sheets_merged: usize,
    pub rows: usize,
}

/// Problems are logged, never returned: a failed merge still exits cleanly.
pub fn execute(args: &Cli) -> Result<()> {
    match merge_directory(&args.input_dir, &args.output) {
        Ok(summary) => info!(
            "✓ Merged {} row(s) from {} sheet(s) of {} file(s) into {:?} ({} file(s) skipped)",
            summary.rows, summary.sheets_merged, summary.files_read, args.output, summary.files_skipped
        ),
        Err(err) => error!("Merge of {:?} failed: {err:#}", args.input_dir),
    }
    Ok(())
}

pub fn merge_directory(input_dir: &Path, output: &Path) -> Result<MergeSummary> {
    let mut summary = MergeSummary::default();
    let mut merged = SheetDataset::default();
    for path in list_input_files(input_dir)? {
        let workbook = match io_utils::open_workbook_file(&path) {
            Ok(workbook) => workbook,
            Err(err) => {
                warn!("Skipping {path:?}: {err}");
                summary.files_skipped += 1;
                continue;
            }
        };
        summary.files_read += 1;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        for sheet in workbook.sheets() {
            let source = format!("{file_name}/{}", sheet.name());
            let dataset = SheetDataset::from_sheet(sheet, Some(source.as_str()));
            if dataset.is_empty() {
                continue;
            }
            info!("✓ Read {} row(s) from {source}", dataset.rows.len());
            summary.sheets_merged += 1;
            merged = union(merged, dataset);
        }
    }
    summary.rows = merged.rows.len();

    let workbook = summary_workbook(merged);
    io_utils::save_workbook(&workbook, output)
        .with_context(|| format!("Writing summary to {output:?}"))?;
    Ok(summary)
}

fn list_input_files(input_dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(input_dir)
        .with_context(|| format!("Listing input directory {input_dir:?}"))?;
    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("Reading entry of {input_dir:?}"))?;
        let is_file = entry
            .file_type()
            .with_context(|| format!("Inspecting {:?}", entry.path()))?
            .is_file();
        if is_file {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

/// One "summary" sheet: merged titles with the source marker last, then rows.
pub fn summary_workbook(mut dataset: SheetDataset) -> MemoryWorkbook {
    dataset.titles.retain(|title| title != SOURCE_TITLE);
    dataset.titles.push(SOURCE_TITLE.to_string());

    let mut workbook = MemoryWorkbook::new();
    let sheet = workbook.sheet_or_create(SUMMARY_SHEET);
    write_dataset(sheet, &dataset);
    workbook
}

fn write_dataset(sheet: &mut MemorySheet, dataset: &SheetDataset) {
    let mut writer = RowWriter::new(sheet);
    writer.write(dataset.titles.iter().map(|title| Value::from(title.as_str())));
    for row in &dataset.rows {
        writer
            .new_line()
            .write(dataset.row_values(row).map(|value| value.map(Value::from)));
    }
}
