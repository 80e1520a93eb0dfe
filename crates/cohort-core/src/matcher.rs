//! Date-window linkage of a secondary table onto a primary table.
//!
//! Every primary row is an *anchor*. Secondary rows sharing the anchor's
//! grouping key are candidates when their date lies within `window_days` of
//! the anchor date in the requested [`Relation`]. Depending on [`GetMode`],
//! either every candidate or only the closest ones are attached to the anchor.
//!
//! Result rows follow primary row order, then candidate order: ascending
//! absolute day difference, then the `left_link_identifier` value when one is
//! given, then secondary row order.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span};

use cohort_model::datetime::day_difference;
use cohort_model::{ColumnKey, ConfigError, Result, TAG_HAS_DUPLICATES, TableView, Value};

use crate::DUPLICATE_MARKER_COLUMN;
use crate::audit::Audit;
use crate::resolve::{InvalidDates, read_dates, resolve_role};

/// Signed difference in days, `secondary date - anchor date`.
pub const DAY_DIFFERENCE_COLUMN: &str = "day_difference";

/// Absolute value of [`DAY_DIFFERENCE_COLUMN`].
pub const ABS_DAY_DIFFERENCE_COLUMN: &str = "abs_day_difference";

pub const DEFAULT_WINDOW_DAYS: i64 = 90;

/// Temporal relation a candidate must have to its anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relation {
    /// Candidate on or before the anchor date.
    Earlier,
    /// Candidate on or after the anchor date.
    Later,
    #[default]
    EarlierOrLater,
}

impl Relation {
    pub fn admits(self, day_difference: i64) -> bool {
        match self {
            Self::Earlier => day_difference <= 0,
            Self::Later => day_difference >= 0,
            Self::EarlierOrLater => true,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Earlier => "earlier",
            Self::Later => "later",
            Self::EarlierOrLater => "earlier_or_later",
        }
    }
}

/// Which candidates are attached to an anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GetMode {
    All,
    #[default]
    Closest,
}

impl GetMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Closest => "closest",
        }
    }
}

/// Shape of the linked output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeMode {
    /// One row per matched anchor; unmatched anchors only when `dropna` is off.
    #[default]
    Partial,
    /// Every anchor, plus every candidate that ended up attached to no anchor.
    Full,
}

impl MergeMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Partial => "partial",
            Self::Full => "full",
        }
    }
}

macro_rules! impl_option_parsing {
    ($ty:ty, $option:literal, [$($text:literal => $variant:expr),+ $(,)?]) => {
        impl FromStr for $ty {
            type Err = ConfigError;

            fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
                match value.trim().to_ascii_lowercase().as_str() {
                    $($text => Ok($variant),)+
                    _ => Err(ConfigError::InvalidOption {
                        option: $option,
                        value: value.to_string(),
                    }),
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

impl_option_parsing!(Relation, "relation", [
    "earlier" => Relation::Earlier,
    "later" => Relation::Later,
    "earlier_or_later" => Relation::EarlierOrLater,
]);
impl_option_parsing!(GetMode, "get_mode", ["all" => GetMode::All, "closest" => GetMode::Closest]);
impl_option_parsing!(MergeMode, "merge_mode", ["partial" => MergeMode::Partial, "full" => MergeMode::Full]);

/// Whether tied candidates are flagged, and under which column name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DuplicatesIndicator {
    Enabled(bool),
    Column(String),
}

impl Default for DuplicatesIndicator {
    fn default() -> Self {
        Self::Enabled(false)
    }
}

impl DuplicatesIndicator {
    /// Column receiving the flag, if flagging is on.
    pub fn column(&self) -> Option<ColumnKey> {
        match self {
            Self::Enabled(true) => Some(ColumnKey::name(DUPLICATE_MARKER_COLUMN)),
            Self::Enabled(false) => None,
            Self::Column(name) => Some(ColumnKey::name(name.as_str())),
        }
    }
}

impl From<bool> for DuplicatesIndicator {
    fn from(value: bool) -> Self {
        Self::Enabled(value)
    }
}

impl From<&str> for DuplicatesIndicator {
    fn from(value: &str) -> Self {
        Self::Column(value.to_string())
    }
}

impl fmt::Display for DuplicatesIndicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Enabled(flag) => write!(f, "{flag}"),
            Self::Column(name) => f.write_str(name),
        }
    }
}

/// Parameters of [`date_proximity`].
///
/// Unset key and date columns fall back to the shared `grouping_key`/`date`
/// option, then to the column declared on each table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DateProximityOptions {
    pub grouping_key: Option<ColumnKey>,
    pub left_grouping_key: Option<ColumnKey>,
    pub right_grouping_key: Option<ColumnKey>,
    pub date: Option<ColumnKey>,
    pub left_date: Option<ColumnKey>,
    pub right_date: Option<ColumnKey>,
    pub window_days: i64,
    pub relation: Relation,
    pub get_mode: GetMode,
    pub merge_mode: MergeMode,
    /// Drop anchors without a match (partial merges only).
    pub dropna: bool,
    /// Keep only the first of several equally close candidates.
    pub drop_duplicates: bool,
    pub duplicates_indicator: DuplicatesIndicator,
    /// Secondary column ordering tied candidates instead of row position.
    pub left_link_identifier: Option<ColumnKey>,
    /// Appended to colliding primary and secondary column names.
    pub suffixes: (String, String),
}

impl Default for DateProximityOptions {
    fn default() -> Self {
        Self {
            grouping_key: None,
            left_grouping_key: None,
            right_grouping_key: None,
            date: None,
            left_date: None,
            right_date: None,
            window_days: DEFAULT_WINDOW_DAYS,
            relation: Relation::default(),
            get_mode: GetMode::default(),
            merge_mode: MergeMode::default(),
            dropna: true,
            drop_duplicates: false,
            duplicates_indicator: DuplicatesIndicator::default(),
            left_link_identifier: None,
            suffixes: ("_left".to_string(), "_right".to_string()),
        }
    }
}

impl DateProximityOptions {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_grouping_key(mut self, column: impl Into<ColumnKey>) -> Self {
        self.grouping_key = Some(column.into());
        self
    }

    #[must_use]
    pub fn with_grouping_keys(
        mut self,
        left: impl Into<ColumnKey>,
        right: impl Into<ColumnKey>,
    ) -> Self {
        self.left_grouping_key = Some(left.into());
        self.right_grouping_key = Some(right.into());
        self
    }

    #[must_use]
    pub fn with_date(mut self, column: impl Into<ColumnKey>) -> Self {
        self.date = Some(column.into());
        self
    }

    #[must_use]
    pub fn with_dates(mut self, left: impl Into<ColumnKey>, right: impl Into<ColumnKey>) -> Self {
        self.left_date = Some(left.into());
        self.right_date = Some(right.into());
        self
    }

    #[must_use]
    pub fn with_window_days(mut self, days: i64) -> Self {
        self.window_days = days;
        self
    }

    #[must_use]
    pub fn with_relation(mut self, relation: Relation) -> Self {
        self.relation = relation;
        self
    }

    #[must_use]
    pub fn with_get_mode(mut self, mode: GetMode) -> Self {
        self.get_mode = mode;
        self
    }

    #[must_use]
    pub fn with_merge_mode(mut self, mode: MergeMode) -> Self {
        self.merge_mode = mode;
        self
    }

    #[must_use]
    pub fn with_dropna(mut self, enable: bool) -> Self {
        self.dropna = enable;
        self
    }

    #[must_use]
    pub fn with_drop_duplicates(mut self, enable: bool) -> Self {
        self.drop_duplicates = enable;
        self
    }

    #[must_use]
    pub fn with_duplicates_indicator(mut self, indicator: impl Into<DuplicatesIndicator>) -> Self {
        self.duplicates_indicator = indicator.into();
        self
    }

    #[must_use]
    pub fn with_left_link_identifier(mut self, column: impl Into<ColumnKey>) -> Self {
        self.left_link_identifier = Some(column.into());
        self
    }

    #[must_use]
    pub fn with_suffixes(mut self, left: impl Into<String>, right: impl Into<String>) -> Self {
        self.suffixes = (left.into(), right.into());
        self
    }
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    row: usize,
    day_difference: i64,
    tied: bool,
}

impl Candidate {
    fn distance(self) -> i64 {
        self.day_difference.abs()
    }
}

/// Link `secondary` onto `primary` by grouping key and date proximity.
///
/// The result is named after `secondary`, keeps the primary row index of each
/// anchor, and declares the primary's grouping key and date columns.
///
/// # Errors
///
/// - [`ConfigError::NegativeWindow`] if `window_days < 0`
/// - [`ConfigError::UnknownColumn`] / [`ConfigError::MissingKey`] if a key or
///   date column cannot be resolved in either table
/// - [`cohort_model::DataQualityError::UnparseableDate`] if a date cell holds
///   something other than a date
pub fn date_proximity(
    primary: &TableView,
    secondary: &TableView,
    options: &DateProximityOptions,
) -> Result<TableView> {
    if options.window_days < 0 {
        return Err(ConfigError::NegativeWindow(options.window_days).into());
    }
    let span = info_span!(
        "date_proximity",
        primary = %primary.name(),
        secondary = %secondary.name()
    );
    let _guard = span.enter();

    let left_key = resolve_role(
        primary,
        options.left_grouping_key.as_ref().or(options.grouping_key.as_ref()),
        primary.grouping_key_column(),
        "grouping key",
    )?;
    let right_key = resolve_role(
        secondary,
        options.right_grouping_key.as_ref().or(options.grouping_key.as_ref()),
        secondary.grouping_key_column(),
        "grouping key",
    )?;
    let left_date = resolve_role(
        primary,
        options.left_date.as_ref().or(options.date.as_ref()),
        primary.date_column(),
        "date",
    )?;
    let right_date = resolve_role(
        secondary,
        options.right_date.as_ref().or(options.date.as_ref()),
        secondary.date_column(),
        "date",
    )?;
    let tiebreak = options
        .left_link_identifier
        .as_ref()
        .map(|key| secondary.resolve_column(key))
        .transpose()?;

    let audit = Audit::begin("date_proximity", secondary.len())
        .param("primary", primary.name())
        .param("secondary", secondary.name())
        .param("grouping_key", &primary.columns()[left_key])
        .param("date", &primary.columns()[left_date])
        .param("window_days", options.window_days)
        .param("relation", options.relation)
        .param("get_mode", options.get_mode)
        .param("merge_mode", options.merge_mode)
        .param("dropna", options.dropna)
        .param("drop_duplicates", options.drop_duplicates)
        .param("duplicates_indicator", &options.duplicates_indicator)
        .param_opt("left_link_identifier", options.left_link_identifier.as_ref());

    let anchor_dates = read_dates(primary, left_date, InvalidDates::Reject)?;
    let candidate_dates = read_dates(secondary, right_date, InvalidDates::Reject)?;

    let mut by_key: HashMap<&Value, Vec<usize>> = HashMap::new();
    for (row, values) in secondary.rows().iter().enumerate() {
        let key = &values[right_key];
        if key.is_null() || candidate_dates[row].is_none() {
            continue;
        }
        by_key.entry(key).or_default().push(row);
    }
    debug!(groups = by_key.len(), "indexed secondary rows");

    let layout = OutputLayout::new(primary, secondary, left_key, right_key, options)?;
    let mut output = layout.empty_table(primary, secondary, left_key, left_date)?;

    let mut is_candidate = vec![false; secondary.len()];
    let mut is_attached = vec![false; secondary.len()];
    let mut matched_anchors = 0usize;
    let mut tied_anchors = 0usize;

    for (anchor, anchor_values) in primary.rows().iter().enumerate() {
        let anchor_index = primary.index()[anchor];
        let key = &anchor_values[left_key];
        let candidates = match (anchor_dates[anchor], by_key.get(key)) {
            (Some(anchor_date), Some(rows)) if !key.is_null() => {
                collect_candidates(anchor_date, rows, &candidate_dates, options)
            }
            _ => Vec::new(),
        };
        for candidate in &candidates {
            is_candidate[candidate.row] = true;
        }
        let selected = select_candidates(candidates, secondary, tiebreak, options);
        if selected.is_empty() {
            if options.merge_mode == MergeMode::Full || !options.dropna {
                layout.push(&mut output, anchor_index, Some(anchor_values.as_slice()), None, None)?;
            }
            continue;
        }
        matched_anchors += 1;
        if selected.iter().any(|candidate| candidate.tied) {
            tied_anchors += 1;
        }
        for candidate in selected {
            is_attached[candidate.row] = true;
            layout.push(
                &mut output,
                anchor_index,
                Some(anchor_values.as_slice()),
                Some(secondary.rows()[candidate.row].as_slice()),
                Some(candidate),
            )?;
        }
    }

    if options.merge_mode == MergeMode::Full {
        let mut next_index = primary.index().iter().max().map_or(0, |max| max + 1);
        for row in 0..secondary.len() {
            if is_candidate[row] && !is_attached[row] {
                layout.push(
                    &mut output,
                    next_index,
                    None,
                    Some(secondary.rows()[row].as_slice()),
                    None,
                )?;
                next_index += 1;
            }
        }
    }

    output.inherit_metadata(secondary);
    if tied_anchors > 0 {
        output.add_tag(TAG_HAS_DUPLICATES);
    }
    audit.finish(&mut output);
    info!(
        anchors = primary.len(),
        matched_anchors,
        tied_anchors,
        rows = output.len(),
        "linked tables"
    );
    Ok(output)
}

fn collect_candidates(
    anchor_date: NaiveDate,
    rows: &[usize],
    candidate_dates: &[Option<NaiveDate>],
    options: &DateProximityOptions,
) -> Vec<Candidate> {
    rows.iter()
        .filter_map(|&row| {
            let date = candidate_dates[row]?;
            let difference = day_difference(anchor_date, date);
            (options.relation.admits(difference) && difference.abs() <= options.window_days).then_some(
                Candidate {
                    row,
                    day_difference: difference,
                    tied: false,
                },
            )
        })
        .collect()
}

fn select_candidates(
    mut candidates: Vec<Candidate>,
    secondary: &TableView,
    tiebreak: Option<usize>,
    options: &DateProximityOptions,
) -> Vec<Candidate> {
    candidates.sort_by(|a, b| {
        a.distance()
            .cmp(&b.distance())
            .then_with(|| match tiebreak {
                Some(column) => secondary
                    .value(a.row, column)
                    .cmp(secondary.value(b.row, column)),
                None => std::cmp::Ordering::Equal,
            })
            .then_with(|| a.row.cmp(&b.row))
    });
    let Some(best) = candidates.first().map(|candidate| candidate.distance()) else {
        return candidates;
    };
    let tied = candidates
        .iter()
        .filter(|candidate| candidate.distance() == best)
        .count()
        > 1;
    match options.get_mode {
        GetMode::Closest => {
            candidates.retain(|candidate| candidate.distance() == best);
            for candidate in &mut candidates {
                candidate.tied = tied;
            }
            if options.drop_duplicates {
                candidates.truncate(1);
            }
        }
        GetMode::All => {
            for candidate in &mut candidates {
                candidate.tied = tied && candidate.distance() == best;
            }
        }
    }
    candidates
}

/// Column layout of a linked table: primary columns, kept secondary columns,
/// the day-difference columns and the optional duplicate flag.
struct OutputLayout {
    columns: Vec<ColumnKey>,
    left_width: usize,
    left_key: usize,
    right_key: usize,
    /// The secondary key column is folded into the primary one.
    right_key_folded: bool,
    right_sources: Vec<usize>,
    indicator: bool,
}

impl OutputLayout {
    fn new(
        primary: &TableView,
        secondary: &TableView,
        left_key: usize,
        right_key: usize,
        options: &DateProximityOptions,
    ) -> Result<Self> {
        let right_key_folded = secondary.columns()[right_key] == primary.columns()[left_key];
        let right_sources: Vec<usize> = (0..secondary.width())
            .filter(|&position| !(right_key_folded && position == right_key))
            .collect();

        let mut generated = vec![
            ColumnKey::name(DAY_DIFFERENCE_COLUMN),
            ColumnKey::name(ABS_DAY_DIFFERENCE_COLUMN),
        ];
        let indicator_column = options.duplicates_indicator.column();
        if let Some(column) = &indicator_column {
            generated.push(column.clone());
        }

        let left_names: HashSet<&ColumnKey> = primary.columns().iter().collect();
        let right_names: HashSet<&ColumnKey> = right_sources
            .iter()
            .map(|&position| &secondary.columns()[position])
            .chain(generated.iter())
            .collect();
        let generated_names: HashSet<&ColumnKey> = generated.iter().collect();
        let (left_suffix, right_suffix) = &options.suffixes;

        let mut columns = Vec::with_capacity(primary.width() + right_sources.len() + generated.len());
        for key in primary.columns() {
            if right_names.contains(key) {
                columns.push(key.with_suffix(left_suffix));
            } else {
                columns.push(key.clone());
            }
        }
        for &position in &right_sources {
            let key = &secondary.columns()[position];
            if left_names.contains(key) || generated_names.contains(key) {
                columns.push(key.with_suffix(right_suffix));
            } else {
                columns.push(key.clone());
            }
        }
        columns.extend(generated);

        let mut seen = HashSet::with_capacity(columns.len());
        for key in &columns {
            if !seen.insert(key) {
                return Err(ConfigError::ColumnCollision {
                    table: secondary.name().to_string(),
                    column: key.to_string(),
                }
                .into());
            }
        }

        Ok(Self {
            columns,
            left_width: primary.width(),
            left_key,
            right_key,
            right_key_folded,
            right_sources,
            indicator: indicator_column.is_some(),
        })
    }

    fn empty_table(
        &self,
        primary: &TableView,
        secondary: &TableView,
        left_key: usize,
        left_date: usize,
    ) -> Result<TableView> {
        let mut table = TableView::new(secondary.name(), self.columns.clone())
            .with_grouping_key(self.columns[left_key].clone())?
            .with_date_column(self.columns[left_date].clone())?;
        if let Some(position) = primary
            .identifier_column()
            .and_then(|identifier| primary.column_position(identifier))
        {
            table = table.with_identifier(self.columns[position].clone())?;
        }
        Ok(table)
    }

    fn push(
        &self,
        output: &mut TableView,
        index: u64,
        anchor: Option<&[Value]>,
        candidate: Option<&[Value]>,
        matched: Option<Candidate>,
    ) -> Result<()> {
        let mut row = Vec::with_capacity(self.columns.len());
        match anchor {
            Some(values) => row.extend(values.iter().cloned()),
            None => {
                row.resize(self.left_width, Value::Null);
                if let (true, Some(values)) = (self.right_key_folded, candidate) {
                    row[self.left_key] = values[self.right_key].clone();
                }
            }
        }
        for &position in &self.right_sources {
            row.push(candidate.map_or(Value::Null, |values| values[position].clone()));
        }
        match matched {
            Some(candidate) => {
                row.push(Value::Integer(candidate.day_difference));
                row.push(Value::Integer(candidate.distance()));
            }
            None => {
                row.push(Value::Null);
                row.push(Value::Null);
            }
        }
        if self.indicator {
            row.push(Value::Bool(matched.is_some_and(|candidate| candidate.tied)));
        }
        output.push_indexed_row(index, row)
    }
}
