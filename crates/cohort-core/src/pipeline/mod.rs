//! Pipeline graph of tables and the deferred operations deriving them.

mod graph;
mod operation;

pub use graph::{
    ATTR_NAME, ATTR_OPERATION, ATTR_ROWS, ExecutionReport, PipelineEdge, PipelineGraph,
    PipelineNode, StepReport,
};
pub use operation::Operation;
