//! Graph view of a workflow using petgraph.
//!
//! The definition stores nodes and edges as flat lists; this view indexes
//! them into a directed graph for validation, entry-node discovery and
//! edge selection during a run.

use crate::definition::Workflow;
use crate::edge::WorkflowEdge;
use crate::error::GraphError;
use crate::node::WorkflowNode;
use crate::trigger::WorkflowTrigger;
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Dfs;
use std::collections::{HashMap, HashSet};

/// Borrowed, indexed view of a workflow's nodes and edges.
#[derive(Debug)]
pub struct WorkflowGraph<'a> {
    graph: DiGraph<&'a WorkflowNode, &'a WorkflowEdge>,
    /// Map from node ID to petgraph's NodeIndex for O(1) lookup.
    node_index_map: HashMap<&'a str, NodeIndex>,
}

impl<'a> WorkflowGraph<'a> {
    /// Indexes a workflow's nodes and edges.
    ///
    /// # Errors
    ///
    /// Returns an error if two nodes share an ID or an edge's source or
    /// target does not exist.
    pub fn build(workflow: &'a Workflow) -> Result<Self, GraphError> {
        let mut graph = DiGraph::with_capacity(workflow.nodes.len(), workflow.edges.len());
        let mut node_index_map = HashMap::with_capacity(workflow.nodes.len());

        for node in &workflow.nodes {
            let index = graph.add_node(node);
            if node_index_map.insert(node.id.as_str(), index).is_some() {
                return Err(GraphError::DuplicateNode {
                    node_id: node.id.clone(),
                });
            }
        }

        for edge in &workflow.edges {
            let source = *node_index_map.get(edge.source.as_str()).ok_or_else(|| {
                GraphError::UnknownEdgeSource {
                    edge_id: edge.id.clone(),
                    node_id: edge.source.clone(),
                }
            })?;
            let target = *node_index_map.get(edge.target.as_str()).ok_or_else(|| {
                GraphError::UnknownEdgeTarget {
                    edge_id: edge.id.clone(),
                    node_id: edge.target.clone(),
                }
            })?;
            graph.add_edge(source, target, edge);
        }

        Ok(Self {
            graph,
            node_index_map,
        })
    }

    /// Returns a node by its ID.
    #[must_use]
    pub fn node(&self, node_id: &str) -> Option<&'a WorkflowNode> {
        let index = self.node_index_map.get(node_id)?;
        self.graph.node_weight(*index).copied()
    }

    /// Returns true if the graph contains the node.
    #[must_use]
    pub fn contains(&self, node_id: &str) -> bool {
        self.node_index_map.contains_key(node_id)
    }

    /// Returns the number of nodes in the graph.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Returns nodes that have no incoming edges, in definition order.
    pub fn root_nodes(&self) -> Vec<&'a WorkflowNode> {
        self.graph
            .node_indices()
            .filter(|&idx| self.graph.edges_directed(idx, Direction::Incoming).count() == 0)
            .filter_map(|idx| self.graph.node_weight(idx).copied())
            .collect()
    }

    /// Returns the outgoing edges of a node, in definition order.
    pub fn outgoing(&self, node_id: &str) -> Vec<&'a WorkflowEdge> {
        let Some(&index) = self.node_index_map.get(node_id) else {
            return Vec::new();
        };

        // petgraph walks adjacency lists newest-first
        let mut edges: Vec<_> = self
            .graph
            .edges_directed(index, Direction::Outgoing)
            .map(|edge| *edge.weight())
            .collect();
        edges.reverse();
        edges
    }

    /// Returns the incoming edges of a node, in definition order.
    pub fn incoming(&self, node_id: &str) -> Vec<&'a WorkflowEdge> {
        let Some(&index) = self.node_index_map.get(node_id) else {
            return Vec::new();
        };
        let mut edges: Vec<_> = self
            .graph
            .edges_directed(index, Direction::Incoming)
            .map(|edge| *edge.weight())
            .collect();
        edges.reverse();
        edges
    }

    /// Returns the IDs of every node reachable from the given nodes,
    /// including the nodes themselves.
    pub fn reachable_from(&self, node_ids: &[String]) -> HashSet<&'a str> {
        let mut dfs = Dfs::empty(&self.graph);
        let mut reachable = HashSet::new();
        for node_id in node_ids {
            let Some(&start) = self.node_index_map.get(node_id.as_str()) else {
                continue;
            };
            dfs.move_to(start);
            while let Some(index) = dfs.next(&self.graph) {
                if let Some(node) = self.graph.node_weight(index) {
                    reachable.insert(node.id.as_str());
                }
            }
        }
        reachable
    }

    /// Returns true if the graph contains a cycle.
    #[must_use]
    pub fn is_cyclic(&self) -> bool {
        petgraph::algo::is_cyclic_directed(&self.graph)
    }

    /// Validates structural invariants beyond what [`build`](Self::build)
    /// already checks.
    ///
    /// # Errors
    ///
    /// Returns an error if the graph is empty or contains a cycle.
    pub fn validate(&self) -> Result<(), GraphError> {
        if self.graph.node_count() == 0 {
            return Err(GraphError::EmptyWorkflow);
        }
        if self.is_cyclic() {
            return Err(GraphError::CycleDetected);
        }
        Ok(())
    }

    /// Resolves the entry nodes for a run.
    ///
    /// In order of preference: the run trigger's node, the nodes of the
    /// workflow's enabled declared triggers, then the root nodes.
    ///
    /// # Errors
    ///
    /// Returns an error if a referenced trigger node does not exist or no
    /// entry node can be found.
    pub fn entry_nodes(
        &self,
        run_trigger: &WorkflowTrigger,
        declared: &[WorkflowTrigger],
    ) -> Result<Vec<&'a WorkflowNode>, GraphError> {
        if let Some(node_id) = run_trigger.entry_node() {
            let node = self.node(node_id).ok_or_else(|| GraphError::NodeNotFound {
                node_id: node_id.to_string(),
            })?;
            return Ok(vec![node]);
        }

        let mut entries: Vec<&'a WorkflowNode> = Vec::new();
        for trigger in declared.iter().filter(|t| t.enabled) {
            let Some(node_id) = trigger.entry_node() else {
                continue;
            };
            let node = self.node(node_id).ok_or_else(|| GraphError::NodeNotFound {
                node_id: node_id.to_string(),
            })?;
            if !entries.iter().any(|n| n.id == node.id) {
                entries.push(node);
            }
        }
        if !entries.is_empty() {
            return Ok(entries);
        }

        let roots = self.root_nodes();
        if roots.is_empty() {
            return Err(GraphError::NoEntryNode);
        }
        Ok(roots)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trigger::TriggerKind;

    fn diamond() -> Workflow {
        Workflow::new("wf", "diamond")
            .with_node(WorkflowNode::new("a", "transform"))
            .with_node(WorkflowNode::new("b", "transform"))
            .with_node(WorkflowNode::new("c", "transform"))
            .with_node(WorkflowNode::new("d", "transform"))
            .with_edge(WorkflowEdge::new("ab", "a", "b"))
            .with_edge(WorkflowEdge::new("ac", "a", "c"))
            .with_edge(WorkflowEdge::new("bd", "b", "d"))
            .with_edge(WorkflowEdge::new("cd", "c", "d"))
    }

    #[test]
    fn build_indexes_nodes_and_edges() {
        let workflow = diamond();
        let graph = workflow.graph().expect("valid graph");
        assert_eq!(graph.node_count(), 4);
        assert!(graph.contains("d"));
        assert!(graph.validate().is_ok());
    }

    #[test]
    fn outgoing_keeps_definition_order() {
        let workflow = diamond();
        let graph = workflow.graph().expect("valid graph");
        let targets: Vec<_> = graph.outgoing("a").iter().map(|e| e.target.as_str()).collect();
        assert_eq!(targets, vec!["b", "c"]);
        assert!(graph.outgoing("d").is_empty());
        assert!(graph.outgoing("ghost").is_empty());
    }

    #[test]
    fn incoming_lists_every_predecessor() {
        let workflow = diamond();
        let graph = workflow.graph().expect("valid graph");
        let sources: Vec<_> = graph.incoming("d").iter().map(|e| e.source.as_str()).collect();
        assert_eq!(sources, vec!["b", "c"]);
        assert!(graph.incoming("a").is_empty());
    }

    #[test]
    fn reachability_follows_edges_from_every_start() {
        let workflow = diamond().with_node(WorkflowNode::new("island", "transform"));
        let graph = workflow.graph().expect("valid graph");

        let from_b = graph.reachable_from(&["b".to_string()]);
        assert_eq!(from_b, HashSet::from(["b", "d"]));

        let from_both = graph.reachable_from(&["c".to_string(), "island".to_string()]);
        assert_eq!(from_both, HashSet::from(["c", "d", "island"]));
    }

    #[test]
    fn duplicate_node_is_rejected() {
        let workflow = Workflow::new("wf", "dup")
            .with_node(WorkflowNode::new("a", "transform"))
            .with_node(WorkflowNode::new("a", "wait"));
        let err = workflow.graph().unwrap_err();
        assert_eq!(
            err,
            GraphError::DuplicateNode {
                node_id: "a".to_string()
            }
        );
    }

    #[test]
    fn dangling_edge_is_rejected() {
        let workflow = Workflow::new("wf", "dangling")
            .with_node(WorkflowNode::new("a", "transform"))
            .with_edge(WorkflowEdge::new("e1", "a", "ghost"));
        let err = workflow.graph().unwrap_err();
        assert!(matches!(
            err,
            GraphError::UnknownEdgeTarget { ref node_id, .. } if node_id == "ghost"
        ));

        let workflow = Workflow::new("wf", "dangling")
            .with_node(WorkflowNode::new("a", "transform"))
            .with_edge(WorkflowEdge::new("e1", "ghost", "a"));
        let err = workflow.graph().unwrap_err();
        assert!(matches!(err, GraphError::UnknownEdgeSource { .. }));
    }

    #[test]
    fn cycles_fail_validation() {
        let workflow = Workflow::new("wf", "loop")
            .with_node(WorkflowNode::new("a", "transform"))
            .with_node(WorkflowNode::new("b", "transform"))
            .with_edge(WorkflowEdge::new("ab", "a", "b"))
            .with_edge(WorkflowEdge::new("ba", "b", "a"));
        let graph = workflow.graph().expect("edges reference existing nodes");
        assert_eq!(graph.validate(), Err(GraphError::CycleDetected));
    }

    #[test]
    fn empty_workflow_fails_validation() {
        let workflow = Workflow::new("wf", "empty");
        let graph = workflow.graph().expect("empty graph builds");
        assert_eq!(graph.validate(), Err(GraphError::EmptyWorkflow));
    }

    #[test]
    fn entry_prefers_run_trigger_node() {
        let workflow = diamond();
        let graph = workflow.graph().expect("valid graph");
        let entries = graph
            .entry_nodes(&WorkflowTrigger::manual().at_node("c"), &[])
            .expect("entry");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, "c");
    }

    #[test]
    fn entry_uses_declared_triggers_then_roots() {
        let workflow = diamond();
        let graph = workflow.graph().expect("valid graph");

        let declared = vec![
            WorkflowTrigger::new(TriggerKind::Webhook).at_node("b"),
            WorkflowTrigger {
                enabled: false,
                ..WorkflowTrigger::new(TriggerKind::Schedule).at_node("c")
            },
        ];
        let entries = graph
            .entry_nodes(&WorkflowTrigger::manual(), &declared)
            .expect("entry");
        let ids: Vec<_> = entries.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["b"]);

        let entries = graph
            .entry_nodes(&WorkflowTrigger::manual(), &[])
            .expect("entry");
        let ids: Vec<_> = entries.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["a"]);
    }

    #[test]
    fn missing_trigger_node_is_not_found() {
        let workflow = diamond();
        let graph = workflow.graph().expect("valid graph");
        let err = graph
            .entry_nodes(&WorkflowTrigger::manual().at_node("ghost"), &[])
            .unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::NotFound);
    }
}
