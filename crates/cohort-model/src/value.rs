use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::datetime::parse_date;

/// A single cell of a [`crate::TableView`].
///
/// Values are totally ordered so they can serve as grouping keys and
/// tie-break identifiers: `Null` sorts first, integers and floats compare
/// numerically with each other, and different kinds otherwise sort by kind.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value")]
pub enum Value {
    #[default]
    Null,
    Text(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    Date(NaiveDate),
}

/// Outcome of reading a value as a date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateCell {
    /// Null or blank.
    Missing,
    Valid(NaiveDate),
    /// Present but not a recognised date.
    Invalid,
}

impl DateCell {
    pub fn date(self) -> Option<NaiveDate> {
        match self {
            Self::Valid(date) => Some(date),
            Self::Missing | Self::Invalid => None,
        }
    }
}

impl Value {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    /// Build a value from a raw cell, mapping blank strings to `Null`.
    pub fn from_raw(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            Self::Null
        } else {
            Self::Text(trimmed.to_string())
        }
    }

    pub fn is_null(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Text(text) => text.trim().is_empty(),
            _ => false,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(flag) => Some(*flag),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(number) => Some(*number),
            _ => None,
        }
    }

    /// Interpret the value as a calendar date.
    pub fn to_date(&self) -> DateCell {
        match self {
            Self::Null => DateCell::Missing,
            Self::Date(date) => DateCell::Valid(*date),
            Self::Text(text) if text.trim().is_empty() => DateCell::Missing,
            Self::Text(text) => parse_date(text).map_or(DateCell::Invalid, DateCell::Valid),
            Self::Integer(number) => {
                parse_date(&number.to_string()).map_or(DateCell::Invalid, DateCell::Valid)
            }
            Self::Float(_) | Self::Bool(_) => DateCell::Invalid,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Null => 0,
            Self::Bool(_) => 1,
            Self::Integer(_) | Self::Float(_) => 2,
            Self::Date(_) => 3,
            Self::Text(_) => 4,
        }
    }

    /// Total order used for sorting and grouping.
    pub fn total_cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Null, Self::Null) => Ordering::Equal,
            (Self::Bool(a), Self::Bool(b)) => a.cmp(b),
            (Self::Integer(a), Self::Integer(b)) => a.cmp(b),
            (Self::Float(a), Self::Float(b)) => normalize_zero(*a).total_cmp(&normalize_zero(*b)),
            (Self::Integer(a), Self::Float(b)) => (*a as f64).total_cmp(&normalize_zero(*b)),
            (Self::Float(a), Self::Integer(b)) => normalize_zero(*a).total_cmp(&(*b as f64)),
            (Self::Date(a), Self::Date(b)) => a.cmp(b),
            (Self::Text(a), Self::Text(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

fn normalize_zero(value: f64) -> f64 {
    if value == 0.0 { 0.0 } else { value }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.total_cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        self.total_cmp(other)
    }
}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rank().hash(state);
        match self {
            Self::Null => {}
            Self::Bool(flag) => flag.hash(state),
            // Integers hash through their float form so `1 == 1.0` hashes alike.
            Self::Integer(number) => normalize_zero(*number as f64).to_bits().hash(state),
            Self::Float(number) => normalize_zero(*number).to_bits().hash(state),
            Self::Date(date) => date.hash(state),
            Self::Text(text) => text.hash(state),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Text(text) => f.write_str(text),
            Self::Integer(number) => write!(f, "{number}"),
            Self::Float(number) => f.write_str(&format_numeric(*number)),
            Self::Bool(flag) => write!(f, "{flag}"),
            Self::Date(date) => write!(f, "{}", date.format("%Y-%m-%d")),
        }
    }
}

/// Formats a floating-point number as a string without trailing zeros.
pub fn format_numeric(v: f64) -> String {
    let s = format!("{v}");
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        s
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<NaiveDate> for Value {
    fn from(value: NaiveDate) -> Self {
        Self::Date(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_sorts_first() {
        let mut values = vec![Value::from("b"), Value::Integer(3), Value::Null, Value::from("a")];
        values.sort();
        assert_eq!(
            values,
            vec![Value::Null, Value::Integer(3), Value::from("a"), Value::from("b")]
        );
    }

    #[test]
    fn integers_and_floats_compare_numerically() {
        assert_eq!(Value::Integer(1), Value::Float(1.0));
        assert!(Value::Integer(2) > Value::Float(1.5));
        assert_eq!(Value::Float(0.0), Value::Float(-0.0));
    }

    #[test]
    fn blank_text_is_a_missing_date() {
        assert_eq!(Value::from("  ").to_date(), DateCell::Missing);
        assert_eq!(Value::Null.to_date(), DateCell::Missing);
        assert_eq!(Value::from("later").to_date(), DateCell::Invalid);
        assert_eq!(
            Value::from("2001-03-02").to_date().date(),
            NaiveDate::from_ymd_opt(2001, 3, 2)
        );
    }

    #[test]
    fn display_formats_cells() {
        assert_eq!(Value::Null.to_string(), "");
        assert_eq!(Value::Float(2.50).to_string(), "2.5");
        assert_eq!(Value::Float(100.0).to_string(), "100");
        let date = NaiveDate::from_ymd_opt(2001, 3, 2).unwrap();
        assert_eq!(Value::Date(date).to_string(), "2001-03-02");
    }
}
