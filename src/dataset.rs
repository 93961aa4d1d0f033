//! Schema-less title/row bags and the union / dedup operations on them.

use std::collections::{BTreeMap, HashMap};

use log::debug;

use crate::storage::SheetStorage;

/// Title of the marker column naming the file and sheet a row came from.
pub const SOURCE_TITLE: &str = "source";

const FRAGMENT_SEPARATOR: char = ';';

pub type DatasetRow = BTreeMap<String, String>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SheetDataset {
    pub titles: Vec<String>,
    pub rows: Vec<DatasetRow>,
}

impl SheetDataset {
    pub fn new(titles: Vec<String>, rows: Vec<DatasetRow>) -> Self {
        Self { titles, rows }
    }

    /// Titles come from row 0 up to the first blank one; rows are read until
    /// the first absent or entirely empty row. When `source` is given every
    /// row also carries it under [`SOURCE_TITLE`].
    pub fn from_sheet<S>(sheet: &S, source: Option<&str>) -> Self
    where
        S: SheetStorage + ?Sized,
    {
        let titles = (0..)
            .map_while(|column| sheet.read_string(0, column).filter(|title| !title.is_empty()))
            .collect::<Vec<_>>();
        if titles.is_empty() {
            return Self::default();
        }

        let last_row = sheet.last_row_index().unwrap_or(0);
        let mut rows = Vec::new();
        for row in 1..=last_row {
            if !sheet.has_row(row) {
                break;
            }
            let mut values = titles
                .iter()
                .enumerate()
                .filter_map(|(column, title)| {
                    sheet
                        .read_string(row, column)
                        .map(|value| (title.clone(), value))
                })
                .collect::<DatasetRow>();
            if values.is_empty() {
                break;
            }
            if let Some(source) = source {
                values.insert(SOURCE_TITLE.to_string(), source.to_string());
            }
            rows.push(values);
        }
        debug!(
            "Sheet '{}': {} title(s), {} row(s)",
            sheet.name(),
            titles.len(),
            rows.len()
        );
        Self { titles, rows }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row_values<'a>(&'a self, row: &'a DatasetRow) -> impl Iterator<Item = Option<&'a str>> {
        self.titles
            .iter()
            .map(move |title| row.get(title).map(String::as_str))
    }
}

/// Titles of `a` followed by the titles of `b` that `a` lacks; rows stacked
/// unchanged.
pub fn union(mut a: SheetDataset, b: SheetDataset) -> SheetDataset {
    for title in b.titles {
        if !a.titles.contains(&title) {
            a.titles.push(title);
        }
    }
    a.rows.extend(b.rows);
    a
}

/// Folds rows sharing the value under `key_title` into one. Groups keep the
/// position of their first row; rows without a key pass through untouched.
pub fn dedup_by_key(dataset: SheetDataset, key_title: &str) -> SheetDataset {
    let SheetDataset { titles, rows } = dataset;
    let mut merged: Vec<DatasetRow> = Vec::with_capacity(rows.len());
    let mut groups: HashMap<String, usize> = HashMap::new();

    for row in rows {
        let key = row
            .get(key_title)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
            .map(str::to_string);
        let Some(key) = key else {
            merged.push(row);
            continue;
        };
        match groups.get(&key) {
            Some(&index) => merge_row(&mut merged[index], row),
            None => {
                groups.insert(key, merged.len());
                merged.push(row);
            }
        }
    }
    SheetDataset {
        titles,
        rows: merged,
    }
}

fn merge_row(existing: &mut DatasetRow, incoming: DatasetRow) {
    for (title, value) in incoming {
        let current = existing.entry(title).or_default();
        if current.is_empty() {
            *current = value;
        } else if !current.contains(value.as_str()) {
            current.push(FRAGMENT_SEPARATOR);
            current.push_str(&value);
        }
    }
}
