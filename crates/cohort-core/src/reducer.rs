//! Group-by-keep-one reduction.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span};

use cohort_model::{ColumnKey, ConfigError, Result, TAG_HAS_DUPLICATES, TableView, Value};

use crate::DUPLICATE_MARKER_COLUMN;
use crate::audit::Audit;
use crate::resolve::{InvalidDates, read_dates, resolve_role};

/// Which rows of a group survive the reduction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Keep {
    /// Every dated row, flagged when it shares its date with another row of
    /// the group.
    All,
    #[default]
    Earliest,
    Latest,
}

impl Keep {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Earliest => "earliest",
            Self::Latest => "latest",
        }
    }
}

impl FromStr for Keep {
    type Err = ConfigError;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(Self::All),
            "earliest" | "first" => Ok(Self::Earliest),
            "latest" | "last" => Ok(Self::Latest),
            _ => Err(ConfigError::InvalidOption {
                option: "keep",
                value: value.to_string(),
            }),
        }
    }
}

impl fmt::Display for Keep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters of [`group_by_keep_one`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeepOneOptions {
    /// Defaults to the table's declared grouping key.
    pub grouping_key: Option<ColumnKey>,
    /// Defaults to the table's declared date column.
    pub date: Option<ColumnKey>,
    pub keep: Keep,
    /// Orders tied rows; defaults to the declared identifier, then row order.
    pub identifier: Option<ColumnKey>,
    pub drop_duplicates: bool,
}

impl KeepOneOptions {
    pub fn new(keep: Keep) -> Self {
        Self {
            keep,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_grouping_key(mut self, column: impl Into<ColumnKey>) -> Self {
        self.grouping_key = Some(column.into());
        self
    }

    #[must_use]
    pub fn with_date(mut self, column: impl Into<ColumnKey>) -> Self {
        self.date = Some(column.into());
        self
    }

    #[must_use]
    pub fn with_identifier(mut self, column: impl Into<ColumnKey>) -> Self {
        self.identifier = Some(column.into());
        self
    }

    #[must_use]
    pub fn with_drop_duplicates(mut self, enable: bool) -> Self {
        self.drop_duplicates = enable;
        self
    }
}

struct Dated {
    row: usize,
    date: NaiveDate,
}

/// Reduce `table` to one representative row per grouping key.
///
/// The result carries a boolean [`DUPLICATE_MARKER_COLUMN`] (replacing any
/// existing column of that name) and is sorted by grouping key, date, then
/// identifier or original row order.
///
/// With [`Keep::All`], rows without a valid date are removed and the rest are
/// kept. With [`Keep::Earliest`] / [`Keep::Latest`], rows without a date are
/// ignored and an unparseable date is an error.
pub fn group_by_keep_one(table: &TableView, options: &KeepOneOptions) -> Result<TableView> {
    let span = info_span!("group_by_keep_one", table = %table.name(), keep = %options.keep);
    let _guard = span.enter();

    let key = resolve_role(
        table,
        options.grouping_key.as_ref(),
        table.grouping_key_column(),
        "grouping key",
    )?;
    let date = resolve_role(table, options.date.as_ref(), table.date_column(), "date")?;
    let identifier = options
        .identifier
        .as_ref()
        .or(table.identifier_column())
        .map(|column| table.resolve_column(column))
        .transpose()?;

    let audit = Audit::begin("group_by_keep_one", table.len())
        .param("grouping_key", &table.columns()[key])
        .param("date", &table.columns()[date])
        .param("keep", options.keep)
        .param("drop_duplicates", options.drop_duplicates)
        .param_opt("identifier", identifier.map(|position| &table.columns()[position]));

    let invalid = match options.keep {
        Keep::All => InvalidDates::Skip,
        Keep::Earliest | Keep::Latest => InvalidDates::Reject,
    };
    let dates = read_dates(table, date, invalid)?;

    let mut groups: BTreeMap<&Value, Vec<Dated>> = BTreeMap::new();
    let mut undated = 0usize;
    for (row, values) in table.rows().iter().enumerate() {
        match dates[row] {
            Some(date) => groups.entry(&values[key]).or_default().push(Dated { row, date }),
            None => undated += 1,
        }
    }
    debug!(groups = groups.len(), undated, "grouped rows");

    let tiebreak = |a: &Dated, b: &Dated| {
        a.date
            .cmp(&b.date)
            .then_with(|| match identifier {
                Some(column) => table.value(a.row, column).cmp(table.value(b.row, column)),
                None => std::cmp::Ordering::Equal,
            })
            .then_with(|| a.row.cmp(&b.row))
    };

    let mut selected: Vec<(usize, bool)> = Vec::with_capacity(table.len());
    let mut tie_groups = 0usize;
    for rows in groups.values_mut() {
        rows.sort_by(&tiebreak);
        let kept = match options.keep {
            Keep::All => mark_shared_dates(rows, options.drop_duplicates),
            Keep::Earliest | Keep::Latest => {
                let extreme = match options.keep {
                    Keep::Latest => rows.last(),
                    _ => rows.first(),
                }
                .map(|dated| dated.date);
                let tied: Vec<&Dated> = rows.iter().filter(|dated| Some(dated.date) == extreme).collect();
                let flagged = tied.len() > 1;
                let keep_count = if options.drop_duplicates { 1 } else { tied.len() };
                tied.iter()
                    .take(keep_count)
                    .map(|dated| (dated.row, flagged))
                    .collect()
            }
        };
        if kept.iter().any(|&(_, flagged)| flagged) {
            tie_groups += 1;
        }
        selected.extend(kept);
    }

    let order: Vec<usize> = selected.iter().map(|&(row, _)| row).collect();
    let markers: Vec<Value> = selected.iter().map(|&(_, flagged)| Value::Bool(flagged)).collect();
    let mut output = table.select_rows(&order);
    let marker = ColumnKey::name(DUPLICATE_MARKER_COLUMN);
    match output.column_position(&marker) {
        Some(position) => output.replace_column(position, markers)?,
        None => output.push_column(marker, markers)?,
    }
    if tie_groups > 0 {
        output.add_tag(TAG_HAS_DUPLICATES);
    }
    audit.finish(&mut output);
    info!(
        rows_before = table.len(),
        rows_after = output.len(),
        tie_groups,
        "reduced groups"
    );
    Ok(output)
}

/// Flag rows sharing their date with another row of the same group. With
/// `drop_duplicates`, only the first row of each shared date is kept.
fn mark_shared_dates(rows: &[Dated], drop_duplicates: bool) -> Vec<(usize, bool)> {
    let mut kept = Vec::with_capacity(rows.len());
    let mut start = 0;
    while start < rows.len() {
        let end = rows[start..]
            .iter()
            .position(|dated| dated.date != rows[start].date)
            .map_or(rows.len(), |offset| start + offset);
        let flagged = end - start > 1;
        let run = if drop_duplicates { &rows[start..=start] } else { &rows[start..end] };
        kept.extend(run.iter().map(|dated| (dated.row, flagged)));
        start = end;
    }
    kept
}
