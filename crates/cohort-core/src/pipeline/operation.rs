use serde::{Deserialize, Serialize};

use cohort_model::{Result, TableView};

use crate::matcher::{DateProximityOptions, date_proximity};
use crate::reducer::{KeepOneOptions, group_by_keep_one};

/// Deferred transformation bound to a pipeline node.
///
/// Serialized with an explicit `kind`, so a pipeline configuration can spell
/// operations as plain tables:
///
/// ```toml
/// kind = "date_proximity"
/// primary = "visits"
/// window_days = 30
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Operation {
    /// Link the node's table onto the current table of node `primary`.
    DateProximity {
        primary: String,
        #[serde(flatten)]
        options: DateProximityOptions,
    },
    /// Reduce the node's table with [`group_by_keep_one`].
    KeepOne(KeepOneOptions),
}

impl Operation {
    pub fn date_proximity(primary: impl Into<String>, options: DateProximityOptions) -> Self {
        Self::DateProximity {
            primary: primary.into(),
            options,
        }
    }

    pub fn keep_one(options: KeepOneOptions) -> Self {
        Self::KeepOne(options)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::DateProximity { .. } => "date_proximity",
            Self::KeepOne(_) => "keep_one",
        }
    }

    /// Short human-readable description for reports.
    pub fn label(&self) -> String {
        match self {
            Self::DateProximity { primary, options } => format!(
                "date_proximity(primary={primary}, window={}d, relation={}, get={}, merge={})",
                options.window_days, options.relation, options.get_mode, options.merge_mode
            ),
            Self::KeepOne(options) => format!(
                "keep_one(keep={}, drop_duplicates={})",
                options.keep, options.drop_duplicates
            ),
        }
    }

    /// Nodes whose tables this operation reads, besides its own.
    pub fn dependencies(&self) -> Vec<&str> {
        match self {
            Self::DateProximity { primary, .. } => vec![primary.as_str()],
            Self::KeepOne(_) => Vec::new(),
        }
    }

    /// Run the operation against `table`. `lookup` yields the current table
    /// of another node.
    pub(crate) fn apply<'a>(
        &self,
        table: &TableView,
        lookup: impl Fn(&str) -> Result<&'a TableView>,
    ) -> Result<TableView> {
        match self {
            Self::DateProximity { primary, options } => {
                date_proximity(lookup(primary)?, table, options)
            }
            Self::KeepOne(options) => group_by_keep_one(table, options),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::GetMode;
    use crate::reducer::Keep;

    #[test]
    fn parses_from_toml() {
        let operation: Operation = toml::from_str(
            r#"
            kind = "date_proximity"
            primary = "visits"
            window_days = 30
            get_mode = "all"
            duplicates_indicator = "tied"
            "#,
        )
        .unwrap();
        let Operation::DateProximity { primary, options } = &operation else {
            panic!("expected date_proximity, got {operation:?}");
        };
        assert_eq!(primary, "visits");
        assert_eq!(options.window_days, 30);
        assert_eq!(options.get_mode, GetMode::All);
        assert!(options.dropna);
        assert_eq!(operation.dependencies(), vec!["visits"]);
    }

    #[test]
    fn keep_one_label() {
        let operation: Operation =
            toml::from_str("kind = \"keep_one\"\nkeep = \"latest\"").unwrap();
        assert_eq!(operation, Operation::keep_one(KeepOneOptions::new(Keep::Latest)));
        assert_eq!(operation.label(), "keep_one(keep=latest, drop_duplicates=false)");
        assert_eq!(operation.kind(), "keep_one");
    }
}
