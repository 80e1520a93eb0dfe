//! Property tests for linkage and reduction invariants.

use std::collections::{BTreeMap, HashMap};

use chrono::{Duration, NaiveDate};
use proptest::prelude::*;

use cohort_core::{
    ABS_DAY_DIFFERENCE_COLUMN, DAY_DIFFERENCE_COLUMN, DateProximityOptions, GetMode, Keep,
    KeepOneOptions, Relation, date_proximity, group_by_keep_one,
};
use cohort_model::{ColumnKey, TableView, Value};

fn base_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2001, 1, 1).expect("valid date")
}

fn build(name: &str, rows: &[(u8, i64)]) -> TableView {
    TableView::from_rows(
        name,
        ["id", "date"],
        rows.iter()
            .map(|&(id, offset)| {
                vec![
                    Value::Integer(i64::from(id)),
                    Value::Date(base_date() + Duration::days(offset)),
                ]
            })
            .collect(),
    )
    .expect("table")
    .with_grouping_key("id")
    .expect("grouping key")
    .with_date_column("date")
    .expect("date column")
}

fn rows_strategy(max: usize) -> impl Strategy<Value = Vec<(u8, i64)>> {
    prop::collection::vec((0u8..4, 0i64..400), 0..max)
}

fn relation_strategy() -> impl Strategy<Value = Relation> {
    prop_oneof![
        Just(Relation::Earlier),
        Just(Relation::Later),
        Just(Relation::EarlierOrLater),
    ]
}

fn column(table: &TableView, name: &str) -> Vec<Value> {
    table
        .column_values(&ColumnKey::name(name))
        .expect("column")
        .into_iter()
        .cloned()
        .collect()
}

proptest! {
    #[test]
    fn matches_respect_window_and_relation(
        primary in rows_strategy(12),
        secondary in rows_strategy(20),
        window in 0i64..120,
        relation in relation_strategy(),
        all in any::<bool>(),
    ) {
        let options = DateProximityOptions::default()
            .with_window_days(window)
            .with_relation(relation)
            .with_get_mode(if all { GetMode::All } else { GetMode::Closest });
        let linked = date_proximity(&build("visits", &primary), &build("labs", &secondary), &options).unwrap();

        let signed = column(&linked, DAY_DIFFERENCE_COLUMN);
        let absolute = column(&linked, ABS_DAY_DIFFERENCE_COLUMN);
        for (signed, absolute) in signed.iter().zip(&absolute) {
            let difference = signed.as_i64().expect("matched rows carry a difference");
            prop_assert_eq!(absolute.as_i64(), Some(difference.abs()));
            prop_assert!(difference.abs() <= window);
            match relation {
                Relation::Earlier => prop_assert!(difference <= 0),
                Relation::Later => prop_assert!(difference >= 0),
                Relation::EarlierOrLater => {}
            }
        }
    }

    #[test]
    fn closest_without_duplicates_is_unique_per_anchor(
        primary in rows_strategy(12),
        secondary in rows_strategy(20),
    ) {
        let options = DateProximityOptions::default()
            .with_drop_duplicates(true)
            .with_dropna(false);
        let linked = date_proximity(&build("visits", &primary), &build("labs", &secondary), &options).unwrap();

        prop_assert_eq!(linked.len(), primary.len());
        let mut per_anchor: HashMap<u64, usize> = HashMap::new();
        for &index in linked.index() {
            *per_anchor.entry(index).or_default() += 1;
        }
        prop_assert!(per_anchor.values().all(|&count| count == 1));
    }

    #[test]
    fn keep_one_returns_group_extremes(rows in rows_strategy(30), latest in any::<bool>()) {
        let keep = if latest { Keep::Latest } else { Keep::Earliest };
        let table = build("subjects", &rows);
        let reduced = group_by_keep_one(&table, &KeepOneOptions::new(keep)).unwrap();

        let mut expected: BTreeMap<u8, i64> = BTreeMap::new();
        for &(id, offset) in &rows {
            let entry = expected.entry(id).or_insert(offset);
            *entry = if latest { (*entry).max(offset) } else { (*entry).min(offset) };
        }
        for row in reduced.rows() {
            let id = u8::try_from(row[0].as_i64().unwrap()).unwrap();
            let Value::Date(date) = row[1] else {
                panic!("date column holds dates");
            };
            prop_assert_eq!(date, base_date() + Duration::days(expected[&id]));
        }
        let groups: std::collections::BTreeSet<&Value> = reduced.rows().iter().map(|row| &row[0]).collect();
        prop_assert_eq!(groups.len(), expected.len());
    }

    #[test]
    fn keep_all_retains_every_dated_row(rows in rows_strategy(30)) {
        let table = build("subjects", &rows);
        let reduced = group_by_keep_one(&table, &KeepOneOptions::new(Keep::All)).unwrap();

        prop_assert_eq!(reduced.len(), table.len());
        let mut before: Vec<u64> = table.index().to_vec();
        let mut after: Vec<u64> = reduced.index().to_vec();
        before.sort_unstable();
        after.sort_unstable();
        prop_assert_eq!(before, after);
    }
}
