mod common;

use std::collections::BTreeMap;

use chrono::NaiveDate;
use common::{Person, age_column, name_column, person_schema};
use sheet_merge::{
    accessor::{CatchAllAccessor, FieldAccessor, SheetEnum},
    convert::{ConverterRegistry, TextConverter},
    message::MessageRecorder,
    reader::RowReader,
    schema::{ColumnDefinition, SchemaDefinition, SchemaLayout},
    storage::{CellValue, MemorySheet, SheetStorage},
    value::{EnumType, Value},
};

fn read_people(sheet: &MemorySheet, recorder: &mut MessageRecorder) -> Vec<Person> {
    let schema = person_schema();
    let registry = ConverterRegistry::default();
    RowReader::new(sheet, &schema, &registry, recorder)
        .map(|record| record.data)
        .collect()
}

#[test]
fn blank_key_terminates_the_sheet() {
    let sheet = MemorySheet::from_text_rows(
        "people",
        [
            vec!["Name", "Age"],
            vec!["Alice", "30"],
            vec!["", "99"],
            vec!["Bob", "40"],
        ],
    );
    let mut recorder = MessageRecorder::new();
    let people = read_people(&sheet, &mut recorder);
    assert_eq!(
        people,
        vec![Person {
            name: "Alice".to_string(),
            age: 30
        }]
    );
    assert!(recorder.is_success());
}

#[test]
fn whitespace_key_also_terminates() {
    let mut sheet = MemorySheet::from_text_rows("people", [vec!["Name", "Age"], vec!["Ann", "1"]]);
    sheet.set_cell_value(2, 0, CellValue::from("   "));
    sheet.set_cell_value(2, 1, CellValue::from("2"));
    sheet.set_cell_value(3, 0, CellValue::from("Ben"));
    let mut recorder = MessageRecorder::new();
    assert_eq!(read_people(&sheet, &mut recorder).len(), 1);
}

#[test]
fn missing_required_columns_yield_nothing_and_one_error() {
    let schema = SchemaDefinition::builder("people")
        .key_column(name_column())
        .column(age_column().required())
        .column(ColumnDefinition::new(
            "Town",
            FieldAccessor::text("town", |_: &Person| None, |_, _| {}),
        )
        .required())
        .build()
        .unwrap();
    let sheet = MemorySheet::from_text_rows("people", [vec!["Name"], vec!["Alice"]]);
    let registry = ConverterRegistry::default();
    let mut recorder = MessageRecorder::new();
    let count = RowReader::new(&sheet, &schema, &registry, &mut recorder).count();
    assert_eq!(count, 0);
    assert_eq!(recorder.errors().len(), 1);
    let text = &recorder.errors()[0].text;
    assert!(text.contains("Age"), "{text}");
    assert!(text.contains("Town"), "{text}");
}

#[test]
fn missing_key_column_makes_sheet_unusable() {
    let sheet = MemorySheet::from_text_rows("people", [vec!["Age"], vec!["3"]]);
    let mut recorder = MessageRecorder::new();
    assert!(read_people(&sheet, &mut recorder).is_empty());
    assert_eq!(
        recorder.error_texts(),
        vec![
            "Key column: Name is missing in sheet people.",
            "Required columns: Name are missing in sheet people.",
        ]
    );
}

#[test]
fn missing_required_key_is_listed_with_other_required_columns() {
    let schema = SchemaDefinition::builder("people")
        .key_column(name_column().required())
        .column(age_column().required())
        .build()
        .unwrap();
    let sheet = MemorySheet::from_text_rows("people", [vec!["Town"], vec!["Oslo"]]);
    let registry = ConverterRegistry::default();
    let mut recorder = MessageRecorder::new();
    let count = RowReader::new(&sheet, &schema, &registry, &mut recorder).count();
    assert_eq!(count, 0);
    let required = recorder
        .error_texts()
        .into_iter()
        .filter(|text| text.starts_with("Required columns:"))
        .collect::<Vec<_>>();
    assert_eq!(
        required,
        vec!["Required columns: Name, Age are missing in sheet people."]
    );
}

#[test]
fn header_scan_stops_at_first_blank_title() {
    let sheet = MemorySheet::from_text_rows(
        "people",
        [vec!["Name", "", "Age"], vec!["Alice", "", "30"]],
    );
    let mut recorder = MessageRecorder::new();
    let people = read_people(&sheet, &mut recorder);
    assert_eq!(people[0].age, 0);
    assert_eq!(people[0].name, "Alice");
}

#[test]
fn records_carry_sheet_and_line() {
    let sheet = MemorySheet::from_text_rows(
        "people",
        [vec!["Name", "Age"], vec!["Alice", "30"], vec!["Bob", "40"]],
    );
    let schema = person_schema();
    let registry = ConverterRegistry::default();
    let mut recorder = MessageRecorder::new();
    let lines = RowReader::new(&sheet, &schema, &registry, &mut recorder)
        .map(|record| (record.sheet_name, record.row_number))
        .collect::<Vec<_>>();
    assert_eq!(
        lines,
        vec![("people".to_string(), 2), ("people".to_string(), 3)]
    );
}

#[test]
fn conversion_errors_skip_the_field_and_keep_the_row() {
    let sheet = MemorySheet::from_text_rows(
        "people",
        [vec!["Name", "Age"], vec!["Alice", "thirty"], vec!["Bob", "40"]],
    );
    let mut recorder = MessageRecorder::new();
    let people = read_people(&sheet, &mut recorder);
    assert_eq!(people.len(), 2);
    assert_eq!(people[0].age, 0);
    assert_eq!(people[1].age, 40);
    assert_eq!(recorder.errors().len(), 1);
    assert!(recorder.errors()[0].text.contains("line 2"));
}

#[test]
fn numeric_cells_bind_to_integer_fields() {
    let mut sheet = MemorySheet::from_text_rows("people", [vec!["Name", "Age"], vec!["Alice"]]);
    sheet.set_cell_value(1, 1, CellValue::Number(0.0));
    let mut recorder = MessageRecorder::new();
    let people = read_people(&sheet, &mut recorder);
    assert_eq!(people[0].age, 0);
    assert!(recorder.is_success());
}

#[test]
fn integer_overflow_skips_the_field_and_records_it() {
    let mut sheet = MemorySheet::from_text_rows("people", [vec!["Name", "Age"], vec!["Alice"]]);
    sheet.set_cell_value(1, 1, CellValue::Number(1e20));
    let mut recorder = MessageRecorder::new();
    let people = read_people(&sheet, &mut recorder);
    assert_eq!(people.len(), 1);
    assert_eq!(people[0].age, 0);
    assert_eq!(recorder.errors().len(), 1);
    assert!(recorder.errors()[0].text.contains("out of range"));
}

#[derive(Debug, Default, Clone, PartialEq)]
struct Ticket {
    number: i64,
    label: String,
}

#[test]
fn zero_key_does_not_end_the_sheet() {
    let schema = SchemaDefinition::builder("tickets")
        .key_column(ColumnDefinition::new(
            "Number",
            FieldAccessor::integer("number", |t: &Ticket| Some(t.number), |t, v| t.number = v),
        ))
        .column(ColumnDefinition::new(
            "Label",
            FieldAccessor::text("label", |t: &Ticket| Some(t.label.clone()), |t, v| t.label = v),
        ))
        .build()
        .unwrap();
    let mut sheet = MemorySheet::from_text_rows("tickets", [vec!["Number", "Label"]]);
    sheet.set_cell_value(1, 0, CellValue::Number(0.0));
    sheet.set_cell_value(1, 1, CellValue::from("zero"));
    sheet.set_cell_value(2, 0, CellValue::Number(7.0));
    sheet.set_cell_value(2, 1, CellValue::from("seven"));
    let registry = ConverterRegistry::default();
    let mut recorder = MessageRecorder::new();
    let tickets = RowReader::new(&sheet, &schema, &registry, &mut recorder)
        .map(|record| record.data)
        .collect::<Vec<_>>();
    assert_eq!(tickets.iter().map(|t| t.number).collect::<Vec<_>>(), vec![0, 7]);
    assert_eq!(tickets[0].label, "zero");
    assert!(recorder.is_success());
}

#[test]
fn unsupported_type_skips_the_field_and_keeps_the_row() {
    let registry = ConverterRegistry::empty();
    registry.register(TextConverter);
    let schema = SchemaDefinition::builder("members")
        .key_column(ColumnDefinition::new(
            "Name",
            FieldAccessor::text("name", |m: &Member| Some(m.name.clone()), |m, v| m.name = v),
        ))
        .column(ColumnDefinition::new(
            "Active",
            FieldAccessor::boolean("active", |m: &Member| Some(m.active), |m, v| m.active = v),
        ))
        .build()
        .unwrap();
    let sheet = MemorySheet::from_text_rows(
        "members",
        [vec!["Name", "Active"], vec!["Ann", "yes"], vec!["Ben", "no"]],
    );
    let mut recorder = MessageRecorder::new();
    let members = RowReader::new(&sheet, &schema, &registry, &mut recorder)
        .map(|record| record.data)
        .collect::<Vec<_>>();
    assert_eq!(
        members.iter().map(|m| m.name.as_str()).collect::<Vec<_>>(),
        vec!["Ann", "Ben"]
    );
    assert!(members.iter().all(|m| !m.active));
    assert_eq!(recorder.errors().len(), 2);
    assert!(recorder.errors()[0].text.contains("No converter registered for boolean"));
    assert!(recorder.errors()[0].text.contains("line 2"));
}

#[test]
fn not_empty_rule_reports_but_keeps_the_row() {
    let schema = SchemaDefinition::builder("people")
        .key_column(name_column())
        .column(age_column().not_empty())
        .build()
        .unwrap();
    let sheet = MemorySheet::from_text_rows("crew", [vec!["Name", "Age"], vec!["Alice"]]);
    let registry = ConverterRegistry::default();
    let mut recorder = MessageRecorder::new();
    let people = RowReader::new(&sheet, &schema, &registry, &mut recorder).collect::<Vec<_>>();
    assert_eq!(people.len(), 1);
    assert_eq!(
        recorder.error_texts(),
        vec!["Field: Age is required at line 2 in sheet crew."]
    );
}

#[test]
fn fail_fast_recorder_stops_reading() {
    let sheet = MemorySheet::from_text_rows(
        "people",
        [
            vec!["Name", "Age"],
            vec!["Alice", "x"],
            vec!["Bob", "40"],
            vec!["Cid", "50"],
        ],
    );
    let mut recorder = MessageRecorder::fail_fast();
    let people = read_people(&sheet, &mut recorder);
    assert_eq!(people.len(), 1);
    assert!(recorder.check().is_err());
}

#[test]
fn post_row_hook_sees_every_record() {
    let schema = SchemaDefinition::builder("people")
        .key_column(name_column())
        .column(age_column())
        .post_row_hook(|record, recorder| {
            if record.data.age > 100 {
                recorder.append_warning(format!("{} looks too old", record.data.name));
                record.data.age = 100;
            }
        })
        .build()
        .unwrap();
    let sheet = MemorySheet::from_text_rows(
        "people",
        [vec!["Name", "Age"], vec!["Old", "130"], vec!["Young", "3"]],
    );
    let registry = ConverterRegistry::default();
    let mut recorder = MessageRecorder::new();
    let people = RowReader::new(&sheet, &schema, &registry, &mut recorder)
        .map(|record| record.data.age)
        .collect::<Vec<_>>();
    assert_eq!(people, vec![100, 3]);
    assert_eq!(recorder.warning_texts(), vec!["Old looks too old"]);
}

#[derive(Debug, Default)]
struct Contact {
    phone: String,
    extras: BTreeMap<String, String>,
}

#[test]
fn catch_all_collects_unmapped_titles() {
    let schema = SchemaDefinition::builder("contacts")
        .key_column(ColumnDefinition::new(
            "Phone",
            FieldAccessor::text("phone", |c: &Contact| Some(c.phone.clone()), |c, v| c.phone = v),
        ))
        .catch_all(CatchAllAccessor::new("extras", |c: &mut Contact, title, value| {
            c.extras.insert(title.to_string(), value);
        }))
        .build()
        .unwrap();
    let sheet = MemorySheet::from_text_rows(
        "contacts",
        [vec!["Note", "Phone", "City"], vec!["vip", "555", ""]],
    );
    let registry = ConverterRegistry::default();
    let mut recorder = MessageRecorder::new();
    let contacts = RowReader::new(&sheet, &schema, &registry, &mut recorder).collect::<Vec<_>>();
    assert_eq!(contacts.len(), 1);
    let contact = &contacts[0].data;
    assert_eq!(contact.phone, "555");
    assert_eq!(contact.extras.len(), 1);
    assert_eq!(contact.extras["Note"], "vip");
}

#[derive(Debug, Default, Clone, Copy, PartialEq)]
enum Tier {
    #[default]
    Basic,
    Gold,
}

impl SheetEnum for Tier {
    const TYPE: EnumType = EnumType::new("Tier", &["Basic", "Gold"]);

    fn variant_name(&self) -> &'static str {
        match self {
            Tier::Basic => "Basic",
            Tier::Gold => "Gold",
        }
    }

    fn from_variant(name: &str) -> Option<Self> {
        match name {
            "Basic" => Some(Tier::Basic),
            "Gold" => Some(Tier::Gold),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
struct Member {
    name: String,
    tier: Tier,
    joined: Option<NaiveDate>,
    active: bool,
}

#[test]
fn enums_dates_and_booleans_decode_through_the_registry() {
    let schema = SchemaDefinition::builder("members")
        .key_column(ColumnDefinition::new(
            "Name",
            FieldAccessor::text("name", |m: &Member| Some(m.name.clone()), |m, v| m.name = v),
        ))
        .column(ColumnDefinition::new(
            "Tier",
            FieldAccessor::enumeration("tier", |m: &Member| Some(m.tier), |m, v| m.tier = v),
        ))
        .column(ColumnDefinition::new(
            "Joined",
            FieldAccessor::date("joined", |m: &Member| m.joined, |m, v| m.joined = Some(v)),
        ))
        .column(ColumnDefinition::new(
            "Active",
            FieldAccessor::boolean("active", |m: &Member| Some(m.active), |m, v| m.active = v),
        ))
        .build()
        .unwrap();
    let sheet = MemorySheet::from_text_rows(
        "members",
        [
            vec!["Name", "Tier", "Joined", "Active"],
            vec!["Ann", "Gold", "2024-03-15", "yes"],
            vec!["Ben", "Platinum", "", "no"],
        ],
    );
    let registry = ConverterRegistry::default();
    let mut recorder = MessageRecorder::new();
    let members = RowReader::new(&sheet, &schema, &registry, &mut recorder)
        .map(|record| record.data)
        .collect::<Vec<_>>();
    assert_eq!(members.len(), 2);
    assert_eq!(members[0].tier, Tier::Gold);
    assert_eq!(members[0].joined, NaiveDate::from_ymd_opt(2024, 3, 15));
    assert!(members[0].active);
    assert_eq!(members[1].tier, Tier::Basic);
    assert_eq!(members[1].joined, None);
    assert_eq!(recorder.errors().len(), 1);
    assert!(recorder.errors()[0].text.contains("Platinum"));
}

#[test]
fn schema_without_key_skips_empty_rows() {
    let schema = SchemaDefinition::builder("people")
        .column(name_column())
        .column(age_column())
        .build()
        .unwrap();
    let mut sheet = MemorySheet::from_text_rows("people", [vec!["Name", "Age"], vec!["Ann", "1"]]);
    sheet.set_cell_value(3, 0, CellValue::from("Ben"));
    let registry = ConverterRegistry::default();
    let mut recorder = MessageRecorder::new();
    let names = RowReader::new(&sheet, &schema, &registry, &mut recorder)
        .map(|record| record.data.name)
        .collect::<Vec<_>>();
    assert_eq!(names, vec!["Ann", "Ben"]);
}

#[test]
fn yaml_layout_reads_dynamic_records() {
    let layout = SchemaLayout::from_yaml_str(
        r#"
name: stock
catch_all: other
columns:
  - title: SKU
    field: sku
    key: true
  - title: Qty
    field: qty
    datatype: integer
    required: true
"#,
    )
    .unwrap();
    let schema = layout.to_schema().unwrap();
    let sheet = MemorySheet::from_text_rows(
        "stock",
        [vec!["SKU", "Qty", "Bin"], vec!["A-1", "4", "north"]],
    );
    let registry = ConverterRegistry::default();
    let mut recorder = MessageRecorder::new();
    let records = RowReader::new(&sheet, &schema, &registry, &mut recorder).collect::<Vec<_>>();
    assert_eq!(records.len(), 1);
    let record = &records[0].data;
    assert_eq!(record.get("sku"), Some(&Value::from("A-1")));
    assert_eq!(record.get("qty"), Some(&Value::Integer(4)));
    assert_eq!(record.extras()["Bin"], "north");
}
