//! Tests for group-by-keep-one reduction.

use cohort_core::{DUPLICATE_MARKER_COLUMN, Keep, KeepOneOptions, group_by_keep_one};
use cohort_model::{ColumnKey, LinkageError, TAG_HAS_DUPLICATES, TableView, Value};

fn subjects(rows: &[(&str, &str, &str)]) -> TableView {
    TableView::from_rows(
        "subjects",
        ["id", "date", "record"],
        rows.iter()
            .map(|(id, date, record)| vec![Value::from(*id), Value::from(*date), Value::from(*record)])
            .collect(),
    )
    .expect("subjects")
    .with_grouping_key("id")
    .expect("grouping key")
    .with_date_column("date")
    .expect("date column")
}

fn column(table: &TableView, name: &str) -> Vec<Value> {
    table
        .column_values(&ColumnKey::name(name))
        .expect("column")
        .into_iter()
        .cloned()
        .collect()
}

#[test]
fn test_keep_all_collapses_shared_dates_when_dropping() {
    let table = subjects(&[
        ("2", "2001-03-02", "a"),
        ("2", "2001-03-02", "b"),
        ("3", "2001-08-01", "c"),
    ]);
    let options = KeepOneOptions::new(Keep::All).with_drop_duplicates(true);

    let reduced = group_by_keep_one(&table, &options).unwrap();

    assert_eq!(reduced.len(), 2);
    assert_eq!(column(&reduced, "record"), vec![Value::from("a"), Value::from("c")]);
}

#[test]
fn test_keep_all_marks_without_dropping() {
    let table = subjects(&[
        ("2", "2001-03-02", "a"),
        ("2", "2001-03-02", "b"),
        ("3", "2001-08-01", "c"),
    ]);

    let reduced = group_by_keep_one(&table, &KeepOneOptions::new(Keep::All)).unwrap();

    assert_eq!(reduced.len(), 3);
    assert_eq!(
        column(&reduced, DUPLICATE_MARKER_COLUMN),
        vec![Value::Bool(true), Value::Bool(true), Value::Bool(false)]
    );
    assert!(reduced.has_tag(TAG_HAS_DUPLICATES));
}

#[test]
fn test_keep_all_removes_undated_rows() {
    let table = subjects(&[
        ("1", "2001-01-01", "a"),
        ("1", "", "b"),
        ("1", "not a date", "c"),
    ]);

    let reduced = group_by_keep_one(&table, &KeepOneOptions::new(Keep::All)).unwrap();

    assert_eq!(column(&reduced, "record"), vec![Value::from("a")]);
}

#[test]
fn test_earliest_and_latest() {
    let table = subjects(&[
        ("1", "2001-05-01", "mid"),
        ("1", "2001-01-01", "first"),
        ("1", "2001-09-01", "last"),
        ("2", "2002-01-01", "only"),
    ]);

    let earliest = group_by_keep_one(&table, &KeepOneOptions::new(Keep::Earliest)).unwrap();
    assert_eq!(column(&earliest, "record"), vec![Value::from("first"), Value::from("only")]);

    let latest = group_by_keep_one(&table, &KeepOneOptions::new(Keep::Latest)).unwrap();
    assert_eq!(column(&latest, "record"), vec![Value::from("last"), Value::from("only")]);
    assert_eq!(latest.index(), &[2, 3]);
}

#[test]
fn test_ties_at_extreme() {
    let table = subjects(&[
        ("1", "2001-01-01", "z"),
        ("1", "2001-01-01", "y"),
        ("1", "2001-02-01", "later"),
    ]);

    let kept = group_by_keep_one(&table, &KeepOneOptions::new(Keep::Earliest)).unwrap();
    assert_eq!(column(&kept, "record"), vec![Value::from("z"), Value::from("y")]);
    assert_eq!(
        column(&kept, DUPLICATE_MARKER_COLUMN),
        vec![Value::Bool(true), Value::Bool(true)]
    );

    let by_identifier = KeepOneOptions::new(Keep::Earliest)
        .with_identifier("record")
        .with_drop_duplicates(true);
    let dropped = group_by_keep_one(&table, &by_identifier).unwrap();
    assert_eq!(column(&dropped, "record"), vec![Value::from("y")]);
}

#[test]
fn test_unparseable_date_fails_for_extremes() {
    let table = subjects(&[("1", "2001-01-01", "a"), ("1", "13/13/2001", "b")]);

    let err = group_by_keep_one(&table, &KeepOneOptions::new(Keep::Latest)).unwrap_err();

    assert!(matches!(err, LinkageError::DataQuality(_)));
}

#[test]
fn test_explicit_columns_resolve_case_insensitively() {
    let table = TableView::from_rows(
        "raw",
        ["Subject", "Visit"],
        vec![
            vec![Value::from("1"), Value::from("2001-01-01")],
            vec![Value::from("1"), Value::from("2001-02-01")],
        ],
    )
    .unwrap();
    let options = KeepOneOptions::new(Keep::Latest)
        .with_grouping_key("subject")
        .with_date("VISIT");

    let reduced = group_by_keep_one(&table, &options).unwrap();

    assert_eq!(reduced.index(), &[1]);
    let entry = reduced.history().last().unwrap();
    assert_eq!(entry.parameters["grouping_key"], "Subject");
    assert_eq!(entry.rows_before, 2);
    assert_eq!(entry.rows_after, 1);
}

#[test]
fn test_missing_grouping_key_is_fatal() {
    let table = TableView::new("raw", ["date"]).with_date_column("date").unwrap();

    assert!(group_by_keep_one(&table, &KeepOneOptions::default()).is_err());
}
