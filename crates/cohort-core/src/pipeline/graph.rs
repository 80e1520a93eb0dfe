use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap, HashMap};
use std::time::Instant;

use petgraph::Direction;
use petgraph::algo::has_path_connecting;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use serde::Serialize;
use tracing::{debug, info, info_span};

use cohort_model::{LinkageError, Result, StructuralError, TableView};

use super::operation::Operation;

/// Attribute naming a node or edge.
pub const ATTR_NAME: &str = "name";
/// Attribute holding the label of a node's operation.
pub const ATTR_OPERATION: &str = "operation";
/// Attribute holding a node's current row count.
pub const ATTR_ROWS: &str = "rows";

#[derive(Debug, Clone)]
pub struct PipelineNode {
    name: String,
    table: TableView,
    operation: Option<Operation>,
    attributes: BTreeMap<String, String>,
}

impl PipelineNode {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table(&self) -> &TableView {
        &self.table
    }

    pub fn operation(&self) -> Option<&Operation> {
        self.operation.as_ref()
    }

    pub fn attributes(&self) -> &BTreeMap<String, String> {
        &self.attributes
    }

    fn attribute(&self, key: &str) -> Option<String> {
        match key {
            ATTR_NAME => Some(self.name.clone()),
            ATTR_OPERATION => self.operation.as_ref().map(Operation::label),
            ATTR_ROWS => Some(self.table.len().to_string()),
            _ => self.attributes.get(key).cloned(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineEdge {
    name: String,
    attributes: BTreeMap<String, String>,
}

impl PipelineEdge {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attributes(&self) -> &BTreeMap<String, String> {
        &self.attributes
    }

    fn attribute(&self, key: &str) -> Option<String> {
        match key {
            ATTR_NAME => Some(self.name.clone()),
            _ => self.attributes.get(key).cloned(),
        }
    }
}

/// Outcome of one node visit during [`PipelineGraph::execute`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepReport {
    pub node: String,
    pub operation: Option<String>,
    pub rows_before: usize,
    pub rows_after: usize,
    pub elapsed_ms: u64,
}

/// Per-node summary of the last successful execution, in visit order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExecutionReport {
    pub steps: Vec<StepReport>,
}

impl ExecutionReport {
    pub fn step(&self, node: &str) -> Option<&StepReport> {
        self.steps.iter().find(|step| step.node == node)
    }

    /// Node names in the order they were visited.
    pub fn order(&self) -> Vec<&str> {
        self.steps.iter().map(|step| step.node.as_str()).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum GraphState {
    #[default]
    Building,
    Executed,
}

/// Directed acyclic graph of named tables and the operations deriving them.
///
/// Nodes are keyed by their table's name. Edges record derivation
/// relationships and are kept acyclic on insertion. A node whose operation
/// reads another node's table (see [`Operation::dependencies`]) is also
/// visited after that node, with or without an explicit edge.
#[derive(Debug, Default)]
pub struct PipelineGraph {
    graph: DiGraph<PipelineNode, PipelineEdge>,
    nodes: HashMap<String, NodeIndex>,
    state: GraphState,
    report: Option<ExecutionReport>,
}

impl PipelineGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `table` as a node named after the table.
    pub fn add_node(&mut self, table: TableView, operation: Option<Operation>) -> Result<()> {
        let name = table.name().to_string();
        if self.nodes.contains_key(&name) {
            return Err(StructuralError::DuplicateNode(name).into());
        }
        debug!(node = %name, operation = ?operation.as_ref().map(Operation::kind), "adding node");
        let index = self.graph.add_node(PipelineNode {
            name: name.clone(),
            table,
            operation,
            attributes: BTreeMap::new(),
        });
        self.nodes.insert(name, index);
        self.invalidate();
        Ok(())
    }

    /// Connect `source` to `destination`. The graph is left untouched when
    /// the edge is rejected; adding an existing edge again is a no-op.
    pub fn add_edge(&mut self, source: &str, destination: &str) -> Result<()> {
        let from = self.index_of(source)?;
        let to = self.index_of(destination)?;
        if from == to {
            return Err(StructuralError::SelfLoop(source.to_string()).into());
        }
        if self.graph.find_edge(from, to).is_some() {
            return Ok(());
        }
        if has_path_connecting(&self.graph, to, from, None) {
            return Err(StructuralError::Cycle {
                from: source.to_string(),
                to: destination.to_string(),
            }
            .into());
        }
        self.graph.add_edge(
            from,
            to,
            PipelineEdge {
                name: format!("{source}->{destination}"),
                attributes: BTreeMap::new(),
            },
        );
        self.invalidate();
        Ok(())
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Node names in insertion order.
    pub fn node_names(&self) -> Vec<&str> {
        self.nodes().map(PipelineNode::name).collect()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &PipelineNode> {
        self.graph.node_indices().map(move |index| &self.graph[index])
    }

    /// `(source, destination, edge)` triples in insertion order.
    pub fn edges(&self) -> impl Iterator<Item = (&str, &str, &PipelineEdge)> {
        self.graph.edge_references().map(move |edge| {
            (
                self.graph[edge.source()].name.as_str(),
                self.graph[edge.target()].name.as_str(),
                edge.weight(),
            )
        })
    }

    pub fn node(&self, name: &str) -> Result<&PipelineNode> {
        Ok(&self.graph[self.index_of(name)?])
    }

    /// Current table of node `name`.
    pub fn table(&self, name: &str) -> Result<&TableView> {
        self.node(name).map(PipelineNode::table)
    }

    /// Nodes without incoming edges, in insertion order.
    pub fn root_nodes(&self) -> Vec<&PipelineNode> {
        self.graph
            .node_indices()
            .filter(|&index| {
                self.graph
                    .edges_directed(index, Direction::Incoming)
                    .next()
                    .is_none()
            })
            .map(|index| &self.graph[index])
            .collect()
    }

    /// The single entry point of the pipeline.
    ///
    /// # Errors
    ///
    /// [`StructuralError::NoRoot`] for an empty graph and
    /// [`StructuralError::MultipleRoots`] when several nodes lack incoming edges.
    pub fn get_root_node(&self) -> Result<&PipelineNode> {
        let roots = self.root_nodes();
        match roots.as_slice() {
            [root] => Ok(*root),
            [] => Err(StructuralError::NoRoot.into()),
            many => Err(StructuralError::MultipleRoots {
                roots: many.iter().map(|node| node.name.clone()).collect(),
            }
            .into()),
        }
    }

    /// Attribute `key` of node `name`: `name`, `operation`, `rows`, or one set
    /// with [`PipelineGraph::set_node_attribute`].
    pub fn get_node_data(&self, name: &str, key: &str) -> Result<Option<String>> {
        Ok(self.node(name)?.attribute(key))
    }

    /// Attribute `key` of the edge `source -> destination`.
    pub fn get_edge_data(&self, source: &str, destination: &str, key: &str) -> Result<Option<String>> {
        let edge = self.edge_index(source, destination)?;
        Ok(self.graph[edge].attribute(key))
    }

    pub fn set_node_attribute(
        &mut self,
        name: &str,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<()> {
        let index = self.index_of(name)?;
        self.graph[index].attributes.insert(key.into(), value.into());
        Ok(())
    }

    pub fn set_edge_attribute(
        &mut self,
        source: &str,
        destination: &str,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<()> {
        let edge = self.edge_index(source, destination)?;
        self.graph[edge].attributes.insert(key.into(), value.into());
        Ok(())
    }

    pub fn is_executed(&self) -> bool {
        self.state == GraphState::Executed
    }

    /// Summary of the last execution.
    ///
    /// # Errors
    ///
    /// [`StructuralError::NotExecuted`] unless [`PipelineGraph::execute`] has
    /// completed since the graph was last modified.
    pub fn report(&self) -> Result<&ExecutionReport> {
        match (&self.report, self.state) {
            (Some(report), GraphState::Executed) => Ok(report),
            _ => Err(StructuralError::NotExecuted.into()),
        }
    }

    /// Visit every node parents-first and replace each table that has an
    /// operation with the operation's result.
    ///
    /// Ties in the visit order are broken by insertion order. Execution stops
    /// at the first failing operation; tables of nodes visited before it keep
    /// their new contents and the graph stays unexecuted.
    pub fn execute(&mut self) -> Result<&ExecutionReport> {
        let span = info_span!("pipeline_execute", nodes = self.graph.node_count());
        let _guard = span.enter();
        self.state = GraphState::Building;
        self.report = None;

        let order = self.execution_order()?;
        let mut report = ExecutionReport::default();
        for index in order {
            report.steps.push(self.visit(index)?);
        }
        info!(steps = report.steps.len(), "pipeline executed");
        self.state = GraphState::Executed;
        Ok(self.report.insert(report))
    }

    fn visit(&mut self, index: NodeIndex) -> Result<StepReport> {
        let node = &self.graph[index];
        let span = info_span!("pipeline_node", node = %node.name);
        let _guard = span.enter();
        let rows_before = node.table.len();
        let Some(operation) = node.operation.clone() else {
            return Ok(StepReport {
                node: node.name.clone(),
                operation: None,
                rows_before,
                rows_after: rows_before,
                elapsed_ms: 0,
            });
        };

        let started = Instant::now();
        let result = operation
            .apply(&node.table, |name| self.table(name))
            .map_err(|err| LinkageError::operation(node.name.clone(), err))?;
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let node = &mut self.graph[index];
        let step = StepReport {
            node: node.name.clone(),
            operation: Some(operation.label()),
            rows_before,
            rows_after: result.len(),
            elapsed_ms,
        };
        info!(
            operation = operation.kind(),
            rows_before,
            rows_after = step.rows_after,
            "node executed"
        );
        node.table = result;
        Ok(step)
    }

    /// Kahn's algorithm over explicit edges plus operation dependencies,
    /// preferring the earliest inserted ready node.
    fn execution_order(&self) -> Result<Vec<NodeIndex>> {
        let count = self.graph.node_count();
        let mut dependents: Vec<Vec<NodeIndex>> = vec![Vec::new(); count];
        let mut pending = vec![0usize; count];
        for edge in self.graph.edge_references() {
            dependents[edge.source().index()].push(edge.target());
            pending[edge.target().index()] += 1;
        }
        for index in self.graph.node_indices() {
            let node = &self.graph[index];
            let Some(operation) = &node.operation else {
                continue;
            };
            for dependency in operation.dependencies() {
                let source = self.index_of(dependency)?;
                if source == index {
                    return Err(StructuralError::SelfLoop(node.name.clone()).into());
                }
                if self.graph.find_edge(source, index).is_none() {
                    dependents[source.index()].push(index);
                    pending[index.index()] += 1;
                }
            }
        }

        let mut ready: BinaryHeap<Reverse<usize>> = pending
            .iter()
            .enumerate()
            .filter(|&(_, &waiting)| waiting == 0)
            .map(|(position, _)| Reverse(position))
            .collect();
        let mut order = Vec::with_capacity(count);
        while let Some(Reverse(position)) = ready.pop() {
            let index = NodeIndex::new(position);
            order.push(index);
            for &dependent in &dependents[position] {
                pending[dependent.index()] -= 1;
                if pending[dependent.index()] == 0 {
                    ready.push(Reverse(dependent.index()));
                }
            }
        }

        if order.len() < count {
            return Err(self.blocked_dependency(&pending, &dependents).into());
        }
        debug!(
            order = ?order.iter().map(|&index| self.graph[index].name()).collect::<Vec<_>>(),
            "execution order"
        );
        Ok(order)
    }

    /// A dependency between two nodes left unscheduled by a cycle.
    fn blocked_dependency(&self, pending: &[usize], dependents: &[Vec<NodeIndex>]) -> StructuralError {
        for (position, targets) in dependents.iter().enumerate() {
            if pending[position] == 0 {
                continue;
            }
            if let Some(target) = targets.iter().find(|target| pending[target.index()] > 0) {
                return StructuralError::Cycle {
                    from: self.graph[NodeIndex::new(position)].name.clone(),
                    to: self.graph[*target].name.clone(),
                };
            }
        }
        StructuralError::NoRoot
    }

    fn index_of(&self, name: &str) -> Result<NodeIndex> {
        self.nodes
            .get(name)
            .copied()
            .ok_or_else(|| StructuralError::UnknownNode(name.to_string()).into())
    }

    fn edge_index(&self, source: &str, destination: &str) -> Result<petgraph::graph::EdgeIndex> {
        let from = self.index_of(source)?;
        let to = self.index_of(destination)?;
        self.graph.find_edge(from, to).ok_or_else(|| {
            StructuralError::UnknownEdge {
                from: source.to_string(),
                to: destination.to_string(),
            }
            .into()
        })
    }

    fn invalidate(&mut self) {
        self.state = GraphState::Building;
        self.report = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(name: &str) -> TableView {
        TableView::new(name, ["id", "date"])
    }

    #[test]
    fn edge_names_are_derived() {
        let mut graph = PipelineGraph::new();
        graph.add_node(node("a"), None).unwrap();
        graph.add_node(node("b"), None).unwrap();
        graph.add_edge("a", "b").unwrap();
        graph.add_edge("a", "b").unwrap();
        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.get_edge_data("a", "b", ATTR_NAME).unwrap().as_deref(), Some("a->b"));
        assert!(graph.get_edge_data("b", "a", ATTR_NAME).is_err());
    }

    #[test]
    fn self_loops_are_rejected() {
        let mut graph = PipelineGraph::new();
        graph.add_node(node("a"), None).unwrap();
        let err = graph.add_edge("a", "a").unwrap_err();
        assert!(matches!(err, LinkageError::Structural(StructuralError::SelfLoop(_))));
    }

    #[test]
    fn implicit_dependency_orders_execution() {
        use crate::matcher::DateProximityOptions;

        let mut graph = PipelineGraph::new();
        graph
            .add_node(node("labs"), Some(Operation::date_proximity("visits", DateProximityOptions::new())))
            .unwrap();
        graph.add_node(node("visits"), None).unwrap();
        let order: Vec<&str> = graph
            .execution_order()
            .unwrap()
            .into_iter()
            .map(|index| graph.graph[index].name())
            .collect();
        assert_eq!(order, vec!["visits", "labs"]);
    }

    #[test]
    fn mutation_resets_executed_state() {
        let mut graph = PipelineGraph::new();
        graph.add_node(node("a"), None).unwrap();
        graph.execute().unwrap();
        assert!(graph.report().is_ok());
        graph.add_node(node("b"), None).unwrap();
        assert!(matches!(
            graph.report().unwrap_err(),
            LinkageError::Structural(StructuralError::NotExecuted)
        ));
    }
}
