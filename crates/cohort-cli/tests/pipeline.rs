//! End-to-end runs of pipeline configurations against CSV files.

use std::fs;
use std::path::Path;

use cohort_cli::config::PipelineConfig;
use cohort_cli::pipeline::run_pipeline;
use cohort_model::{ColumnKey, Value};

const VISITS: &str = "patient,visit_date\nP1,2020-01-10\nP2,2020-02-01\n";
const LABS: &str = "patient,lab_date,hba1c\nP1,2020-01-05,6.1\nP1,2020-03-30,7.0\nP2,2019-06-01,5.5\n";

const CONFIG: &str = r#"
output = "out/cohort.csv"
output_dir = "out/nodes"
flatten = true

[[table]]
name = "visits"
path = "visits.csv"
grouping_key = "patient"
date = "visit_date"

[[table]]
name = "labs"
path = "labs.csv"
grouping_key = "patient"
date = "lab_date"
operation = { kind = "date_proximity", primary = "visits", window_days = 30 }

[[field]]
origin = "visits"
column = "visit_date"

[[field]]
origin = "labs"
column = "hba1c"
"#;

fn write_project(dir: &Path, config: &str) -> std::path::PathBuf {
    fs::write(dir.join("visits.csv"), VISITS).unwrap();
    fs::write(dir.join("labs.csv"), LABS).unwrap();
    let path = dir.join("pipeline.toml");
    fs::write(&path, config).unwrap();
    path
}

#[test]
fn pipeline_links_and_consolidates() {
    let dir = tempfile::tempdir().unwrap();
    let config = PipelineConfig::load(&write_project(dir.path(), CONFIG)).unwrap();

    let outcome = run_pipeline(&config).unwrap();

    assert!(outcome.graph.is_executed());
    assert_eq!(outcome.graph.table("labs").unwrap().len(), 1);
    let consolidated = outcome.consolidated.unwrap();
    assert_eq!(consolidated.len(), 2);
    let hba1c = consolidated
        .column_values(&ColumnKey::name("labs.hba1c"))
        .unwrap();
    assert_eq!(hba1c, vec![&Value::from("6.1"), &Value::Null]);

    let written = fs::read_to_string(dir.path().join("out/cohort.csv")).unwrap();
    let lines: Vec<&str> = written.lines().collect();
    assert_eq!(
        lines,
        vec![
            "_index,visits.visit_date,labs.hba1c",
            "0,2020-01-10,6.1",
            "1,2020-02-01,",
        ]
    );
    assert!(dir.path().join("out/nodes/visits.csv").exists());
    assert!(dir.path().join("out/nodes/labs.csv").exists());
    assert_eq!(outcome.written.len(), 3);
}

#[test]
fn execution_report_follows_dependencies() {
    let dir = tempfile::tempdir().unwrap();
    let config = PipelineConfig::load(&write_project(dir.path(), CONFIG)).unwrap();

    let outcome = run_pipeline(&config).unwrap();

    let report = outcome.graph.report().unwrap();
    assert_eq!(report.order(), vec!["visits", "labs"]);
    let labs = report.step("labs").unwrap();
    assert_eq!((labs.rows_before, labs.rows_after), (3, 1));
}

#[test]
fn missing_table_file_names_the_table() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_project(dir.path(), &CONFIG.replace("labs.csv", "missing.csv"));
    let config = PipelineConfig::load(&path).unwrap();

    let err = run_pipeline(&config).err().unwrap();

    assert!(format!("{err:#}").contains("load table labs"));
}

#[test]
fn unknown_primary_fails_while_wiring() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_project(dir.path(), &CONFIG.replace("primary = \"visits\"", "primary = \"clinic\""));
    let config = PipelineConfig::load(&path).unwrap();

    let err = run_pipeline(&config).err().unwrap();

    assert!(format!("{err:#}").contains("clinic"));
}
