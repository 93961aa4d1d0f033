//! Schema definitions binding sheet column titles to record fields.
//!
//! A [`SchemaDefinition`] is built once per record type through
//! [`SchemaDefinition::builder`] and is immutable afterwards; readers and
//! writers only borrow it. The builder enforces the structural rules (one key
//! column, one catch-all field, one post-row hook, unique titles) and reports
//! violations as a [`ConfigurationError`] from [`SchemaBuilder::build`].
//!
//! Schemas can also come from YAML: a [`SchemaLayout`] describes columns by
//! title and datatype and produces a `SchemaDefinition<DynamicRecord>`.

use std::{
    collections::BTreeMap,
    fmt,
    fs::File,
    io::BufReader,
    path::Path,
    sync::Arc,
};

use anyhow::{Context, Result};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    accessor::{CatchAllAccessor, FieldAccessor},
    error::{ConfigurationError, ConversionError},
    message::MessageRecorder,
    reader::RowRecord,
    style::CellStyle,
    validate::{NotEmpty, ValidationRule},
    value::{Value, ValueType},
};

pub type PostRowHook<T> = Arc<dyn Fn(&mut RowRecord<T>, &mut MessageRecorder) + Send + Sync>;

pub struct ColumnDefinition<T> {
    title: String,
    required: bool,
    validator: Option<Arc<dyn ValidationRule>>,
    accessor: FieldAccessor<T>,
    style: Option<CellStyle>,
}

impl<T> Clone for ColumnDefinition<T> {
    fn clone(&self) -> Self {
        Self {
            title: self.title.clone(),
            required: self.required,
            validator: self.validator.clone(),
            accessor: self.accessor.clone(),
            style: self.style.clone(),
        }
    }
}

impl<T> fmt::Debug for ColumnDefinition<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ColumnDefinition")
            .field("title", &self.title)
            .field("required", &self.required)
            .field("validator", &self.validator)
            .field("accessor", &self.accessor)
            .field("style", &self.style)
            .finish()
    }
}

impl<T> ColumnDefinition<T> {
    pub fn new(title: impl Into<String>, accessor: FieldAccessor<T>) -> Self {
        Self {
            title: title.into(),
            required: false,
            validator: None,
            accessor,
            style: None,
        }
    }

    /// The sheet must contain this column for any row to be read.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Shorthand for the [`NotEmpty`] validator.
    pub fn not_empty(self) -> Self {
        self.validator(NotEmpty)
    }

    pub fn validator<V>(mut self, rule: V) -> Self
    where
        V: ValidationRule + 'static,
    {
        self.validator = Some(Arc::new(rule));
        self
    }

    pub fn style(mut self, style: CellStyle) -> Self {
        self.style = Some(style);
        self
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn validation_rule(&self) -> Option<&dyn ValidationRule> {
        self.validator.as_deref()
    }

    pub fn accessor(&self) -> &FieldAccessor<T> {
        &self.accessor
    }

    pub fn cell_style(&self) -> Option<&CellStyle> {
        self.style.as_ref()
    }

    pub fn declared_type(&self) -> ValueType {
        self.accessor.declared_type()
    }
}

pub struct SchemaDefinition<T> {
    name: String,
    fields: Vec<ColumnDefinition<T>>,
    key_index: Option<usize>,
    catch_all: Option<CatchAllAccessor<T>>,
    post_row_hook: Option<PostRowHook<T>>,
}

impl<T> fmt::Debug for SchemaDefinition<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaDefinition")
            .field("name", &self.name)
            .field("fields", &self.fields)
            .field("key", &self.key_field().map(ColumnDefinition::title))
            .field("catch_all", &self.catch_all)
            .field("post_row_hook", &self.post_row_hook.is_some())
            .finish()
    }
}

impl<T> SchemaDefinition<T> {
    pub fn builder(name: impl Into<String>) -> SchemaBuilder<T> {
        SchemaBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[ColumnDefinition<T>] {
        &self.fields
    }

    pub fn field(&self, index: usize) -> Option<&ColumnDefinition<T>> {
        self.fields.get(index)
    }

    pub fn key_index(&self) -> Option<usize> {
        self.key_index
    }

    pub fn key_field(&self) -> Option<&ColumnDefinition<T>> {
        self.key_index.and_then(|idx| self.fields.get(idx))
    }

    pub fn catch_all(&self) -> Option<&CatchAllAccessor<T>> {
        self.catch_all.as_ref()
    }

    pub fn post_row_hook(&self) -> Option<&PostRowHook<T>> {
        self.post_row_hook.as_ref()
    }

    pub fn position(&self, title: &str) -> Option<usize> {
        self.fields.iter().position(|field| field.title == title)
    }

    pub fn titles(&self) -> Vec<&str> {
        self.fields.iter().map(ColumnDefinition::title).collect()
    }
}

/// Collects column descriptors; the first structural violation is kept and
/// returned by [`build`](Self::build).
pub struct SchemaBuilder<T> {
    name: String,
    fields: Vec<ColumnDefinition<T>>,
    key_index: Option<usize>,
    catch_all: Option<CatchAllAccessor<T>>,
    post_row_hook: Option<PostRowHook<T>>,
    error: Option<ConfigurationError>,
}

impl<T> SchemaBuilder<T> {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            key_index: None,
            catch_all: None,
            post_row_hook: None,
            error: None,
        }
    }

    fn fail(&mut self, error: ConfigurationError) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    pub fn column(mut self, column: ColumnDefinition<T>) -> Self {
        if self.fields.iter().any(|field| field.title == column.title) {
            let error = ConfigurationError::DuplicateTitle {
                schema: self.name.clone(),
                title: column.title.clone(),
            };
            self.fail(error);
            return self;
        }
        self.fields.push(column);
        self
    }

    /// Adds a column whose emptiness ends reading a sheet.
    pub fn key_column(mut self, column: ColumnDefinition<T>) -> Self {
        if let Some(existing) = self.key_index.and_then(|idx| self.fields.get(idx)) {
            let error = ConfigurationError::MultipleKeyFields {
                schema: self.name.clone(),
                first: existing.title.clone(),
                second: column.title.clone(),
            };
            self.fail(error);
            return self;
        }
        let before = self.fields.len();
        self = self.column(column);
        if self.fields.len() > before {
            self.key_index = Some(before);
        }
        self
    }

    pub fn catch_all(mut self, accessor: CatchAllAccessor<T>) -> Self {
        if let Some(existing) = &self.catch_all {
            let error = ConfigurationError::MultipleCatchAllFields {
                schema: self.name.clone(),
                first: existing.field_name().to_string(),
                second: accessor.field_name().to_string(),
            };
            self.fail(error);
            return self;
        }
        self.catch_all = Some(accessor);
        self
    }

    pub fn post_row_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut RowRecord<T>, &mut MessageRecorder) + Send + Sync + 'static,
    {
        if self.post_row_hook.is_some() {
            let error = ConfigurationError::MultiplePostRowHooks {
                schema: self.name.clone(),
            };
            self.fail(error);
            return self;
        }
        self.post_row_hook = Some(Arc::new(hook));
        self
    }

    pub fn build(self) -> Result<SchemaDefinition<T>, ConfigurationError> {
        if let Some(error) = self.error {
            return Err(error);
        }
        debug!(
            "Built schema '{}' with {} column(s), key {:?}",
            self.name,
            self.fields.len(),
            self.key_index.and_then(|idx| self.fields.get(idx)).map(|f| &f.title)
        );
        Ok(SchemaDefinition {
            name: self.name,
            fields: self.fields,
            key_index: self.key_index,
            catch_all: self.catch_all,
            post_row_hook: self.post_row_hook,
        })
    }
}

/// Record type produced by YAML-described schemas.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DynamicRecord {
    values: BTreeMap<String, Value>,
    extras: BTreeMap<String, String>,
}

impl DynamicRecord {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.values.get(field)
    }

    pub fn set(&mut self, field: impl Into<String>, value: Value) {
        self.values.insert(field.into(), value);
    }

    pub fn values(&self) -> &BTreeMap<String, Value> {
        &self.values
    }

    /// Cells under titles no column claimed, keyed by title.
    pub fn extras(&self) -> &BTreeMap<String, String> {
        &self.extras
    }
}

fn default_datatype() -> ValueType {
    ValueType::Text
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnLayout {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(default = "default_datatype")]
    pub datatype: ValueType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub key: bool,
    #[serde(default)]
    pub not_empty: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<CellStyle>,
}

impl ColumnLayout {
    pub fn field_name(&self) -> &str {
        self.field.as_deref().unwrap_or(&self.title)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaLayout {
    pub name: String,
    #[serde(default)]
    pub columns: Vec<ColumnLayout>,
    /// Field receiving unmatched titles into [`DynamicRecord::extras`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catch_all: Option<String>,
}

impl SchemaLayout {
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening schema layout {path:?}"))?;
        let reader = BufReader::new(file);
        serde_yaml::from_reader(reader)
            .with_context(|| format!("Parsing schema layout YAML {path:?}"))
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        serde_yaml::from_str(raw).context("Parsing schema layout YAML")
    }

    pub fn to_yaml_string(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Serializing schema layout to YAML")
    }

    pub fn to_schema(&self) -> Result<SchemaDefinition<DynamicRecord>, ConfigurationError> {
        let mut builder = SchemaDefinition::builder(self.name.clone());
        for column in &self.columns {
            if column.title.trim().is_empty() {
                return Err(ConfigurationError::InvalidLayout {
                    schema: self.name.clone(),
                    title: column.title.clone(),
                    reason: "title is blank".to_string(),
                });
            }
            if self.catch_all.as_deref() == Some(column.field_name()) {
                return Err(ConfigurationError::InvalidLayout {
                    schema: self.name.clone(),
                    title: column.title.clone(),
                    reason: format!("field '{}' is also the catch-all field", column.field_name()),
                });
            }
            let definition = layout_column(column);
            builder = if column.key {
                builder.key_column(definition)
            } else {
                builder.column(definition)
            };
        }
        if let Some(catch_all) = &self.catch_all {
            builder = builder.catch_all(CatchAllAccessor::new(
                catch_all.clone(),
                |record: &mut DynamicRecord, title, value| {
                    record.extras.insert(title.to_string(), value);
                },
            ));
        }
        builder.build()
    }
}

fn layout_column(column: &ColumnLayout) -> ColumnDefinition<DynamicRecord> {
    let datatype = column.datatype;
    let read_field = column.field_name().to_string();
    let write_field = read_field.clone();
    let accessor = FieldAccessor::new(
        read_field.clone(),
        datatype,
        move |record: &DynamicRecord| record.get(&read_field).cloned(),
        move |record: &mut DynamicRecord, value: Value| {
            if value.value_type() != datatype {
                return Err(ConversionError::invalid(
                    value.as_display(),
                    datatype,
                    format!("field '{write_field}' expects {datatype}"),
                ));
            }
            record.set(write_field.clone(), value);
            Ok(())
        },
    );
    let mut definition = ColumnDefinition::new(column.title.clone(), accessor);
    if column.required {
        definition = definition.required();
    }
    if column.not_empty {
        definition = definition.not_empty();
    }
    if let Some(style) = &column.style {
        definition = definition.style(style.clone());
    }
    definition
}
