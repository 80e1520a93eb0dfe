use cohort_core::{
    DateProximityOptions, ExecutionReport, Keep, KeepOneOptions, Operation, PipelineGraph,
    StepReport, group_by_keep_one,
};
use cohort_model::{TableView, Value};
use cohort_report::{
    execution_json, history_json, history_value, outline, render_execution, render_graph,
    render_history,
};

fn table(name: &str) -> TableView {
    TableView::from_rows(
        name,
        ["id", "date"],
        vec![
            vec![Value::from("1"), Value::from("2001-01-01")],
            vec![Value::from("1"), Value::from("2001-01-01")],
        ],
    )
    .unwrap()
    .with_grouping_key("id")
    .unwrap()
    .with_date_column("date")
    .unwrap()
}

fn graph() -> PipelineGraph {
    let mut graph = PipelineGraph::new();
    graph.add_node(table("visits"), None).unwrap();
    graph
        .add_node(
            table("labs"),
            Some(Operation::date_proximity("visits", DateProximityOptions::new())),
        )
        .unwrap();
    graph
        .add_node(
            table("vitals"),
            Some(Operation::keep_one(KeepOneOptions::new(Keep::Latest))),
        )
        .unwrap();
    graph.add_edge("visits", "labs").unwrap();
    graph.add_edge("labs", "vitals").unwrap();
    graph
}

#[test]
fn outline_lists_descendants_under_roots() {
    let graph = graph();
    insta::assert_snapshot!(outline(&graph).trim_end(), @r"
    visits
      -> labs [date_proximity(primary=visits, window=90d, relation=earlier_or_later, get=closest, merge=partial)]
        -> vitals [keep_one(keep=latest, drop_duplicates=false)]
    ");
}

#[test]
fn graph_tables_name_nodes_and_edges() {
    let mut graph = graph();
    graph.set_edge_attribute("visits", "labs", "kind", "linked").unwrap();

    let rendered = render_graph(&graph);

    for expected in ["visits", "labs", "vitals", "visits->labs", "labs->vitals", "kind=linked"] {
        assert!(rendered.contains(expected), "missing {expected} in\n{rendered}");
    }
}

#[test]
fn execution_report_serializes_steps() {
    let report = ExecutionReport {
        steps: vec![
            StepReport {
                node: "visits".to_string(),
                operation: None,
                rows_before: 2,
                rows_after: 2,
                elapsed_ms: 0,
            },
            StepReport {
                node: "vitals".to_string(),
                operation: Some("keep_one(keep=latest, drop_duplicates=false)".to_string()),
                rows_before: 2,
                rows_after: 2,
                elapsed_ms: 1,
            },
        ],
    };

    insta::assert_snapshot!(execution_json(&report).unwrap(), @r#"
    {
      "steps": [
        {
          "node": "visits",
          "operation": null,
          "rows_before": 2,
          "rows_after": 2,
          "elapsed_ms": 0
        },
        {
          "node": "vitals",
          "operation": "keep_one(keep=latest, drop_duplicates=false)",
          "rows_before": 2,
          "rows_after": 2,
          "elapsed_ms": 1
        }
      ]
    }
    "#);
    assert!(render_execution(&report).to_string().contains("vitals"));
}

#[test]
fn executed_graph_report_renders() {
    let mut graph = graph();
    graph.execute().unwrap();

    let table = render_execution(graph.report().unwrap()).to_string();

    assert!(table.contains("date_proximity"));
}

#[test]
fn history_includes_operations_and_tags() {
    let reduced = group_by_keep_one(&table("visits"), &KeepOneOptions::new(Keep::Earliest)).unwrap();

    let value = history_value(&reduced).unwrap();
    assert_eq!(value["table"], "visits");
    assert_eq!(value["tags"][0], "has_duplicates");
    assert_eq!(value["history"][0]["operation"], "group_by_keep_one");
    assert_eq!(value["history"][0]["parameters"]["keep"], "earliest");
    assert!(history_json(&reduced).unwrap().contains("\"rows_after\": 2"));
    assert!(render_history(&reduced).to_string().contains("group_by_keep_one"));
}
