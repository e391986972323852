//! Derived workflow graph view of a step sequence.
//!
//! A sequence of N steps projects to N+2 nodes (start, the steps keyed by
//! identity, end) and N+1 edges. Every edge except the one into `end`
//! carries an insert-after affordance pointing at its source step; appending
//! at the tail is a distinct explicit action, so the terminal edge has none.

use serde::{Deserialize, Serialize};

use crate::sequence::StepSequence;
use crate::step::{ExecutionStatus, StepId};

/// Graph node identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeId {
    Start,
    Step { id: StepId },
    End,
}

/// Node of the projected workflow graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: NodeId,
    /// Display label: the step description, or the start/end marker.
    pub label: String,
    /// Execution status for step nodes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ExecutionStatus>,
}

/// Directed edge of the projected workflow graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphEdge {
    pub from: NodeId,
    pub to: NodeId,
    /// Identity to pass to `StepSequence::insert_after` when the operator
    /// uses this edge's insertion point. Absent on the edge into `end`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub insert_after: Option<StepId>,
}

/// Read-only graph projection, regenerated after every structural change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowGraph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

impl WorkflowGraph {
    /// Project the given sequence.
    pub fn project(sequence: &StepSequence) -> Self {
        let mut nodes = Vec::with_capacity(sequence.len() + 2);
        nodes.push(GraphNode {
            id: NodeId::Start,
            label: "start".to_string(),
            status: None,
        });
        for step in sequence.iter() {
            nodes.push(GraphNode {
                id: NodeId::Step { id: step.id },
                label: step.description.clone(),
                status: Some(step.status),
            });
        }
        nodes.push(GraphNode {
            id: NodeId::End,
            label: "end".to_string(),
            status: None,
        });

        let ids = sequence.ids();
        let mut edges = Vec::with_capacity(ids.len() + 1);
        let mut from = NodeId::Start;
        for &id in &ids {
            let to = NodeId::Step { id };
            // Insertion on the incoming edge lands after the previous step;
            // the edge out of start has no preceding step to anchor on.
            let insert_after = match from {
                NodeId::Step { id: source } => Some(source),
                _ => None,
            };
            edges.push(GraphEdge {
                from,
                to,
                insert_after,
            });
            from = to;
        }
        // The edge into end never carries an affordance; appending at the
        // tail is the explicit add-step action instead.
        edges.push(GraphEdge {
            from,
            to: NodeId::End,
            insert_after: None,
        });

        Self { nodes, edges }
    }
}
