//! Whole-workbook helpers built on the row reader and writer.

use std::borrow::Borrow;

use log::info;

use crate::{
    convert::ConverterRegistry,
    message::MessageRecorder,
    reader::{RowReader, RowRecord},
    schema::SchemaDefinition,
    storage::WorkbookStorage,
    style::DatePattern,
    writer::RowWriter,
};

#[derive(Debug)]
pub struct WorkbookAssistant<W> {
    workbook: W,
    registry: ConverterRegistry,
    date_pattern: DatePattern,
    number_format: Option<String>,
}

impl<W: WorkbookStorage> WorkbookAssistant<W> {
    pub fn new(workbook: W) -> Self {
        Self {
            workbook,
            registry: ConverterRegistry::default(),
            date_pattern: DatePattern::default(),
            number_format: None,
        }
    }

    pub fn with_registry(mut self, registry: ConverterRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn date_pattern(mut self, pattern: DatePattern) -> Self {
        self.date_pattern = pattern;
        self
    }

    pub fn number_format(mut self, format: impl Into<String>) -> Self {
        self.number_format = Some(format.into());
        self
    }

    pub fn registry(&self) -> &ConverterRegistry {
        &self.registry
    }

    pub fn workbook(&self) -> &W {
        &self.workbook
    }

    pub fn into_workbook(self) -> W {
        self.workbook
    }

    /// Reads every sheet with `schema`, sharing one recorder.
    pub fn load_all_sheets<T: Default>(
        &self,
        schema: &SchemaDefinition<T>,
        recorder: &mut MessageRecorder,
    ) -> Vec<T> {
        self.load_all_sheets_filtered(schema, recorder, |_| true)
    }

    /// Like [`load_all_sheets`](Self::load_all_sheets), keeping only the rows
    /// `keep` accepts.
    pub fn load_all_sheets_filtered<T, F>(
        &self,
        schema: &SchemaDefinition<T>,
        recorder: &mut MessageRecorder,
        mut keep: F,
    ) -> Vec<T>
    where
        T: Default,
        F: FnMut(&RowRecord<T>) -> bool,
    {
        let mut records = Vec::new();
        for index in 0..self.workbook.sheet_count() {
            let Some(sheet) = self.workbook.sheet_at(index) else {
                continue;
            };
            let reader = RowReader::new(sheet, schema, &self.registry, recorder);
            records.extend(reader.filter(&mut keep).map(RowRecord::into_data));
        }
        info!(
            "Loaded {} record(s) for schema '{}' from {} sheet(s)",
            records.len(),
            schema.name(),
            self.workbook.sheet_count()
        );
        records
    }

    /// Writes a title row and one line per record, creating the sheet when
    /// missing.
    pub fn save_to_sheet<T, I>(
        &mut self,
        sheet_name: &str,
        schema: &SchemaDefinition<T>,
        records: I,
    ) -> &mut Self
    where
        I: IntoIterator,
        I::Item: Borrow<T>,
    {
        let sheet = self.workbook.sheet_or_create(sheet_name);
        let mut writer = RowWriter::with_date_pattern(sheet, self.date_pattern.clone());
        if let Some(format) = &self.number_format {
            writer = writer.default_number_format(format);
        }
        writer.write_titles(schema);
        let mut written = 0usize;
        for record in records {
            writer.new_line().write_record(schema, record.borrow());
            written += 1;
        }
        info!("Saved {written} record(s) to sheet '{sheet_name}'");
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        accessor::FieldAccessor,
        schema::ColumnDefinition,
        storage::{MemorySheet, MemoryWorkbook, SheetStorage},
    };

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Item {
        sku: String,
        qty: i64,
    }

    fn schema() -> SchemaDefinition<Item> {
        SchemaDefinition::builder("items")
            .key_column(ColumnDefinition::new(
                "SKU",
                FieldAccessor::text("sku", |i: &Item| Some(i.sku.clone()), |i, v| i.sku = v),
            ))
            .column(ColumnDefinition::new(
                "Qty",
                FieldAccessor::integer("qty", |i: &Item| Some(i.qty), |i, v| i.qty = v),
            ))
            .build()
            .unwrap()
    }

    #[test]
    fn loads_every_sheet_with_filter() {
        let mut workbook = MemoryWorkbook::new();
        workbook.add_sheet(MemorySheet::from_text_rows("a", [vec!["SKU", "Qty"], vec!["x", "1"]]));
        workbook.add_sheet(MemorySheet::from_text_rows(
            "b",
            [vec!["Qty", "SKU"], vec!["0", "y"], vec!["5", "z"]],
        ));
        let assistant = WorkbookAssistant::new(workbook);
        let mut recorder = MessageRecorder::new();
        let all = assistant.load_all_sheets(&schema(), &mut recorder);
        assert_eq!(all.len(), 3);
        let positive =
            assistant.load_all_sheets_filtered(&schema(), &mut recorder, |r| r.data.qty > 0);
        assert_eq!(
            positive.iter().map(|i| i.sku.as_str()).collect::<Vec<_>>(),
            vec!["x", "z"]
        );
        assert!(recorder.is_success());
    }

    #[test]
    fn save_creates_sheet_with_titles() {
        let items = vec![Item { sku: "x".into(), qty: 2 }];
        let mut assistant = WorkbookAssistant::new(MemoryWorkbook::new()).number_format("0");
        assistant.save_to_sheet("stock", &schema(), &items);
        let workbook = assistant.into_workbook();
        let sheet = workbook.sheet_by_name("stock").unwrap();
        assert_eq!(sheet.read_string(0, 1).as_deref(), Some("Qty"));
        assert_eq!(sheet.read_number(1, 1).unwrap(), Some(2.0));
    }
}
