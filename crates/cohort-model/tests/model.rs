//! Tests for cohort-model types.

use std::collections::BTreeMap;

use cohort_model::{ColumnKey, HistoryEntry, TableView, Value};

fn table() -> TableView {
    TableView::from_rows(
        "visits",
        ["id", "date", "score"],
        vec![
            vec![Value::from("1"), Value::from("2001-01-01"), Value::Integer(3)],
            vec![Value::from("1"), Value::from("2001-02-01"), Value::Null],
        ],
    )
    .expect("build table")
    .with_grouping_key("ID")
    .expect("grouping key")
    .with_date_column("date")
    .expect("date column")
}

#[test]
fn declared_columns_resolve_to_existing_keys() {
    let table = table();
    assert_eq!(table.grouping_key_column(), Some(&ColumnKey::name("id")));
    assert_eq!(table.date_column(), Some(&ColumnKey::name("date")));
    assert!(table.identifier_column().is_none());
}

#[test]
fn push_column_extends_every_row() {
    let mut table = table();
    table
        .push_column("flag", vec![Value::Bool(true), Value::Bool(false)])
        .expect("push column");
    assert_eq!(table.width(), 4);
    assert_eq!(table.rows()[1][3], Value::Bool(false));
    assert!(table.push_column("short", vec![Value::Null]).is_err());
}

#[test]
fn history_is_append_only_and_serializes() {
    let mut table = table();
    let mut parameters = BTreeMap::new();
    parameters.insert("keep".to_string(), "earliest".to_string());
    table.record(HistoryEntry::new("group_by_keep_one", parameters));
    assert_eq!(table.history().len(), 1);
    assert_eq!(
        table.history().last().map(|entry| entry.operation.as_str()),
        Some("group_by_keep_one")
    );

    let json = serde_json::to_value(table.history()).expect("serialize history");
    assert_eq!(json[0]["parameters"]["keep"], "earliest");
}

#[test]
fn grouped_columns_resolve_by_flattened_name() {
    let table = TableView::new("merged", [ColumnKey::grouped("labs", "date")]);
    assert_eq!(
        table.resolve_column(&ColumnKey::name("LABS.DATE")).expect("resolve"),
        0
    );
}

#[test]
fn values_round_trip_through_json() {
    let value = Value::from("2001-03-02");
    let json = serde_json::to_string(&value).expect("serialize");
    assert_eq!(json, r#"{"kind":"Text","value":"2001-03-02"}"#);
    let back: Value = serde_json::from_str(&json).expect("deserialize");
    assert_eq!(back, value);
}
