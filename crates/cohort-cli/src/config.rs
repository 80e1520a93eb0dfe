//! TOML pipeline configuration for the `run` command.
//!
//! ```toml
//! output = "out/cohort.csv"
//! flatten = true
//!
//! [[table]]
//! name = "visits"
//! path = "visits.csv"
//! grouping_key = "patient"
//! date = "visit_date"
//!
//! [[table]]
//! name = "labs"
//! path = "labs.csv"
//! grouping_key = "patient"
//! date = "lab_date"
//! operation = { kind = "date_proximity", primary = "visits", window_days = 30 }
//!
//! [[field]]
//! origin = "labs"
//! column = "hba1c"
//! ```

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use cohort_core::{ConsolidateOptions, FieldSelection, Operation, PipelineGraph};
use cohort_ingest::{LoadOptions, load_table};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    #[serde(rename = "table")]
    pub tables: Vec<TableConfig>,
    #[serde(rename = "edge", default)]
    pub edges: Vec<EdgeConfig>,
    #[serde(rename = "field", default)]
    pub fields: Vec<FieldSelection>,
    /// Consolidated CSV; requires at least one `[[field]]`.
    pub output: Option<PathBuf>,
    /// Every node's final table is written here as `<name>.csv`.
    pub output_dir: Option<PathBuf>,
    #[serde(default)]
    pub flatten: bool,
    pub separator: Option<String>,
    #[serde(skip)]
    base_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TableConfig {
    pub name: String,
    pub path: PathBuf,
    pub grouping_key: Option<String>,
    pub date: Option<String>,
    pub identifier: Option<String>,
    pub delimiter: Option<char>,
    pub operation: Option<Operation>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EdgeConfig {
    pub from: String,
    pub to: String,
}

impl PipelineConfig {
    /// Read `path`; relative paths inside resolve against its directory.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("read pipeline config {}", path.display()))?;
        let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Self::parse(&text, base_dir).with_context(|| format!("parse pipeline config {}", path.display()))
    }

    pub fn parse(text: &str, base_dir: impl Into<PathBuf>) -> Result<Self> {
        let mut config: Self = toml::from_str(text)?;
        config.base_dir = base_dir.into();
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.tables.is_empty() {
            bail!("pipeline config declares no tables");
        }
        let mut names = HashSet::new();
        for table in &self.tables {
            if !names.insert(table.name.as_str()) {
                bail!("table {} is declared twice", table.name);
            }
        }
        if self.output.is_some() && self.fields.is_empty() {
            bail!("output is set but no [[field]] selects columns to consolidate");
        }
        Ok(())
    }

    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    pub fn output_path(&self) -> Option<PathBuf> {
        self.output.as_deref().map(|path| self.resolve(path))
    }

    pub fn output_dir(&self) -> Option<PathBuf> {
        self.output_dir.as_deref().map(|path| self.resolve(path))
    }

    pub fn consolidate_options(&self) -> ConsolidateOptions {
        let mut options = ConsolidateOptions::default().with_flatten(self.flatten);
        if let Some(separator) = &self.separator {
            options = options.with_separator(separator.as_str());
        }
        options
    }

    /// Load every table and wire the graph.
    ///
    /// Besides the declared `[[edge]]` entries, each `date_proximity` node
    /// gets an edge from its primary.
    pub fn build_graph(&self) -> Result<PipelineGraph> {
        let mut graph = PipelineGraph::new();
        for table in &self.tables {
            let path = self.resolve(&table.path);
            let view = load_table(&path, &table.load_options()?)
                .with_context(|| format!("load table {}", table.name))?;
            graph
                .add_node(view, table.operation.clone())
                .with_context(|| format!("add node {}", table.name))?;
        }
        for table in &self.tables {
            if let Some(Operation::DateProximity { primary, .. }) = &table.operation {
                graph
                    .add_edge(primary, &table.name)
                    .with_context(|| format!("link {} to primary {primary}", table.name))?;
            }
        }
        for edge in &self.edges {
            graph
                .add_edge(&edge.from, &edge.to)
                .with_context(|| format!("add edge {} -> {}", edge.from, edge.to))?;
        }
        Ok(graph)
    }
}

impl TableConfig {
    pub fn load_options(&self) -> Result<LoadOptions> {
        let mut options = LoadOptions::default().with_name(self.name.as_str());
        if let Some(column) = &self.grouping_key {
            options = options.with_grouping_key(column.as_str());
        }
        if let Some(column) = &self.date {
            options = options.with_date(column.as_str());
        }
        if let Some(column) = &self.identifier {
            options = options.with_identifier(column.as_str());
        }
        if let Some(delimiter) = self.delimiter {
            let Ok(byte) = u8::try_from(delimiter) else {
                bail!("delimiter {delimiter:?} of table {} is not a single byte", self.name);
            };
            options = options.with_delimiter(byte);
        }
        Ok(options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cohort_core::{GetMode, Keep};

    const CONFIG: &str = r#"
output = "out/cohort.csv"
flatten = true

[[table]]
name = "visits"
path = "visits.csv"
grouping_key = "patient"
date = "visit_date"

[[table]]
name = "labs"
path = "/data/labs.csv"
delimiter = ";"

[table.operation]
kind = "date_proximity"
primary = "visits"
window_days = 30
get_mode = "all"

[[table]]
name = "latest"
path = "visits.csv"
operation = { kind = "keep_one", keep = "latest" }

[[edge]]
from = "visits"
to = "latest"

[[field]]
origin = "labs"
column = "hba1c"
"#;

    #[test]
    fn parses_tables_operations_and_fields() {
        let config = PipelineConfig::parse(CONFIG, "/project").unwrap();

        assert_eq!(config.tables.len(), 3);
        let Some(Operation::DateProximity { primary, options }) = &config.tables[1].operation else {
            panic!("expected date_proximity");
        };
        assert_eq!(primary, "visits");
        assert_eq!(options.window_days, 30);
        assert_eq!(options.get_mode, GetMode::All);
        let Some(Operation::KeepOne(keep)) = &config.tables[2].operation else {
            panic!("expected keep_one");
        };
        assert_eq!(keep.keep, Keep::Latest);
        assert_eq!(config.edges, vec![EdgeConfig { from: "visits".into(), to: "latest".into() }]);
        assert_eq!(config.fields, vec![FieldSelection::new("labs", "hba1c")]);
        assert!(config.consolidate_options().flatten);
    }

    #[test]
    fn relative_paths_resolve_against_config_dir() {
        let config = PipelineConfig::parse(CONFIG, "/project").unwrap();

        assert_eq!(config.resolve(&config.tables[0].path), PathBuf::from("/project/visits.csv"));
        assert_eq!(config.resolve(&config.tables[1].path), PathBuf::from("/data/labs.csv"));
        assert_eq!(config.output_path(), Some(PathBuf::from("/project/out/cohort.csv")));
    }

    #[test]
    fn delimiter_maps_to_load_options() {
        let config = PipelineConfig::parse(CONFIG, "/project").unwrap();

        let options = config.tables[1].load_options().unwrap();
        assert_eq!(options.delimiter, b';');
        assert_eq!(options.name.as_deref(), Some("labs"));
    }

    #[test]
    fn duplicate_table_names_are_rejected() {
        let text = r#"
[[table]]
name = "a"
path = "a.csv"

[[table]]
name = "a"
path = "b.csv"
"#;
        let err = PipelineConfig::parse(text, ".").unwrap_err();
        assert!(err.to_string().contains("declared twice"));
    }

    #[test]
    fn output_requires_fields() {
        let text = r#"
output = "out.csv"

[[table]]
name = "a"
path = "a.csv"
"#;
        assert!(PipelineConfig::parse(text, ".").is_err());
    }

    #[test]
    fn unknown_operation_kind_is_rejected() {
        let text = r#"
[[table]]
name = "a"
path = "a.csv"
operation = { kind = "fuzzy_join" }
"#;
        assert!(PipelineConfig::parse(text, ".").is_err());
    }
}
