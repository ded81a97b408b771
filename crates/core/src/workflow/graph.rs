use super::definition::Workflow;
use crate::processors::condition::branch_targets;
use crate::types::StepId;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{Bfs, EdgeRef};
use std::collections::HashMap;

/// How one step can hand control to another
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    /// Declared successor
    Successor,
    /// Branch target named in a condition step's config
    Branch,
}

/// Read-only graph view of a workflow, used for inspection
pub struct WorkflowGraph {
    graph: DiGraph<StepId, EdgeKind>,
    step_indices: HashMap<StepId, NodeIndex>,
    start: Option<NodeIndex>,
    dangling: Vec<(StepId, StepId)>,
}

impl WorkflowGraph {
    /// Build the graph from a workflow. Edges to unknown steps are recorded, not added.
    pub fn from_workflow(workflow: &Workflow) -> Self {
        let mut graph = DiGraph::new();
        let mut step_indices = HashMap::new();

        for step_id in workflow.steps.keys() {
            let node = graph.add_node(step_id.clone());
            step_indices.insert(step_id.clone(), node);
        }

        let mut dangling = Vec::new();
        for (step_id, step) in &workflow.steps {
            let from = step_indices[step_id];

            let successors = step.next_steps.iter().map(|id| (id.clone(), EdgeKind::Successor));
            let branches = branch_targets(&step.config)
                .into_iter()
                .map(|id| (id, EdgeKind::Branch));

            for (target, kind) in successors.chain(branches) {
                match step_indices.get(&target) {
                    Some(to) => {
                        graph.add_edge(from, *to, kind);
                    }
                    None => dangling.push((step_id.clone(), target)),
                }
            }
        }

        let start = workflow
            .start_step_id
            .as_ref()
            .and_then(|id| step_indices.get(id).copied());

        Self {
            graph,
            step_indices,
            start,
            dangling,
        }
    }

    /// Steps that can be reached from the start step, in breadth-first order
    pub fn reachable_steps(&self) -> Vec<StepId> {
        let Some(start) = self.start else {
            return Vec::new();
        };

        let mut bfs = Bfs::new(&self.graph, start);
        let mut steps = Vec::new();
        while let Some(node) = bfs.next(&self.graph) {
            steps.push(self.graph[node].clone());
        }
        steps
    }

    /// Steps no path from the start step reaches
    pub fn unreachable_steps(&self) -> Vec<StepId> {
        let reachable = self.reachable_steps();
        let mut steps: Vec<StepId> = self
            .step_indices
            .keys()
            .filter(|id| !reachable.contains(id))
            .cloned()
            .collect();
        steps.sort();
        steps
    }

    /// `(from, missing_target)` pairs for references to steps that do not exist
    pub fn dangling_references(&self) -> &[(StepId, StepId)] {
        &self.dangling
    }

    pub fn has_cycles(&self) -> bool {
        petgraph::algo::is_cyclic_directed(&self.graph)
    }

    /// Steps the given step can hand control to, including branch targets
    pub fn successors(&self, step_id: &StepId) -> Vec<(StepId, EdgeKind)> {
        let Some(node) = self.step_indices.get(step_id) else {
            return Vec::new();
        };

        let mut targets: Vec<(StepId, EdgeKind)> = self
            .graph
            .edges(*node)
            .map(|edge| (self.graph[edge.target()].clone(), *edge.weight()))
            .collect();
        // petgraph yields the newest edge first
        targets.reverse();
        targets
    }

    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.start.is_none() {
            warnings.push("workflow has no start step and cannot be executed".to_string());
        }

        for (from, target) in &self.dangling {
            warnings.push(format!(
                "step '{}' references unknown step '{}'",
                from, target
            ));
        }

        if self.start.is_some() {
            for step_id in self.unreachable_steps() {
                warnings.push(format!("step '{}' is unreachable from the start step", step_id));
            }
        }

        if self.has_cycles() {
            warnings.push("workflow contains a cycle; runs may not terminate".to_string());
        }

        warnings
    }
}
