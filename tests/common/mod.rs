#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use sheet_merge::{
    accessor::FieldAccessor,
    io_utils,
    schema::{ColumnDefinition, SchemaDefinition},
    storage::{MemorySheet, MemoryWorkbook},
};
use tempfile::{TempDir, tempdir};

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    /// Creates a fresh scratch directory for the current test case.
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    /// Returns the root path for all files owned by this workspace.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Creates a sub-directory and returns its path.
    pub fn dir(&self, name: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        std::fs::create_dir_all(&path).expect("create sub-directory");
        path
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(contents.as_bytes())
            .expect("write temp file contents");
        path
    }

    /// Saves an `.xlsx` workbook with one text-only sheet per entry.
    pub fn write_workbook(&self, name: &str, sheets: &[(&str, Vec<Vec<&str>>)]) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        let mut workbook = MemoryWorkbook::new();
        for (sheet_name, rows) in sheets {
            workbook.add_sheet(MemorySheet::from_text_rows(*sheet_name, rows.iter().cloned()));
        }
        io_utils::save_workbook(&workbook, &path).expect("save workbook");
        path
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Person {
    pub name: String,
    pub age: i64,
}

pub fn name_column() -> ColumnDefinition<Person> {
    ColumnDefinition::new(
        "Name",
        FieldAccessor::text("name", |p: &Person| Some(p.name.clone()), |p, v| p.name = v),
    )
}

pub fn age_column() -> ColumnDefinition<Person> {
    ColumnDefinition::new(
        "Age",
        FieldAccessor::integer("age", |p: &Person| Some(p.age), |p, v| p.age = v),
    )
}

/// `{Name (key, required), Age}`.
pub fn person_schema() -> SchemaDefinition<Person> {
    SchemaDefinition::builder("people")
        .key_column(name_column().required())
        .column(age_column())
        .build()
        .expect("valid schema")
}
