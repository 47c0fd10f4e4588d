//! Layered placement for crawl graphs.
//!
//! Nodes are ranked by topological depth (sources at rank 0), ordered within
//! each rank by discovery order refined with one barycenter pass, then spaced
//! evenly around the rank's center line. Crawl graphs routinely contain
//! cycles; when no node is free of unranked predecessors the earliest
//! remaining node in discovery order is ranked next.

use petgraph::Direction::{Incoming, Outgoing};
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

use crate::graph::{GraphEdge, GraphNode, Position};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayoutDirection {
    #[default]
    LeftToRight,
    TopToBottom,
}

impl LayoutDirection {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "lr" | "left-to-right" | "horizontal" => Some(LayoutDirection::LeftToRight),
            "tb" | "top-to-bottom" | "vertical" => Some(LayoutDirection::TopToBottom),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayoutConfig {
    pub direction: LayoutDirection,
    /// Distance between consecutive ranks
    pub rank_spacing: f64,
    /// Distance between siblings within a rank
    pub node_spacing: f64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            direction: LayoutDirection::LeftToRight,
            rank_spacing: 250.0,
            node_spacing: 100.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NodePlacement {
    pub id: String,
    pub rank: usize,
    /// Slot within the rank
    pub order: usize,
    pub position: Position,
}

#[derive(Debug, Clone, Default)]
pub struct LayoutEngine {
    config: LayoutConfig,
}

impl LayoutEngine {
    pub fn new(config: LayoutConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LayoutConfig {
        &self.config
    }

    /// Placements come back in the same order as `nodes`. Edges whose
    /// endpoints are not in `nodes` are ignored.
    pub fn layout(&self, nodes: &[GraphNode], edges: &[GraphEdge]) -> Vec<NodePlacement> {
        let index: HashMap<&str, usize> = nodes
            .iter()
            .enumerate()
            .map(|(i, node)| (node.id.as_str(), i))
            .collect();

        let mut graph: DiGraph<(), ()> = DiGraph::with_capacity(nodes.len(), edges.len());
        for _ in nodes {
            graph.add_node(());
        }
        for edge in edges {
            if let (Some(&source), Some(&target)) =
                (index.get(edge.source.as_str()), index.get(edge.target.as_str()))
                && source != target
            {
                graph.update_edge(NodeIndex::new(source), NodeIndex::new(target), ());
            }
        }

        let ranks = assign_ranks(&graph);
        let orders = order_within_ranks(&graph, &ranks);

        let mut rank_sizes: HashMap<usize, usize> = HashMap::new();
        for &rank in &ranks {
            *rank_sizes.entry(rank).or_insert(0) += 1;
        }

        nodes
            .iter()
            .enumerate()
            .map(|(i, node)| {
                let rank = ranks[i];
                let order = orders[i];
                let siblings = rank_sizes[&rank];
                NodePlacement {
                    id: node.id.clone(),
                    rank,
                    order,
                    position: self.position_for(rank, order, siblings),
                }
            })
            .collect()
    }

    /// Lay out and write positions into `nodes`. Only `position` is touched.
    pub fn apply(&self, nodes: &mut [GraphNode], edges: &[GraphEdge]) {
        let placements = self.layout(nodes, edges);
        apply_placements(nodes, &placements);
    }

    fn position_for(&self, rank: usize, order: usize, siblings: usize) -> Position {
        let along = rank as f64 * self.config.rank_spacing;
        let center = (siblings.saturating_sub(1)) as f64 / 2.0;
        let across = (order as f64 - center) * self.config.node_spacing;

        match self.config.direction {
            LayoutDirection::LeftToRight => Position {
                x: along,
                y: across,
            },
            LayoutDirection::TopToBottom => Position {
                x: across,
                y: along,
            },
        }
    }
}

pub fn apply_placements(nodes: &mut [GraphNode], placements: &[NodePlacement]) {
    let by_id: HashMap<&str, Position> = placements
        .iter()
        .map(|p| (p.id.as_str(), p.position))
        .collect();
    for node in nodes.iter_mut() {
        if let Some(position) = by_id.get(node.id.as_str()) {
            node.position = *position;
        }
    }
}

/// Longest-path ranking. Self-loops are not present in `graph`.
fn assign_ranks(graph: &DiGraph<(), ()>) -> Vec<usize> {
    let n = graph.node_count();
    let mut remaining: Vec<usize> = graph
        .node_indices()
        .map(|idx| graph.neighbors_directed(idx, Incoming).count())
        .collect();
    let mut rank: Vec<Option<usize>> = vec![None; n];
    let mut ready: BTreeSet<usize> = (0..n).filter(|&i| remaining[i] == 0).collect();
    let mut next_unranked = 0;

    for _ in 0..n {
        let current = match ready.pop_first() {
            Some(i) => i,
            None => {
                // Cycle: fall back to discovery order
                while rank[next_unranked].is_some() {
                    next_unranked += 1;
                }
                next_unranked
            }
        };

        let r = graph
            .neighbors_directed(NodeIndex::new(current), Incoming)
            .filter_map(|pred| rank[pred.index()])
            .map(|r| r + 1)
            .max()
            .unwrap_or(0);
        rank[current] = Some(r);

        for succ in graph.neighbors_directed(NodeIndex::new(current), Outgoing) {
            let s = succ.index();
            if rank[s].is_none() {
                remaining[s] = remaining[s].saturating_sub(1);
                if remaining[s] == 0 {
                    ready.insert(s);
                }
            }
        }
    }

    rank.into_iter().map(|r| r.unwrap_or(0)).collect()
}

/// Slot of each node within its rank.
fn order_within_ranks(graph: &DiGraph<(), ()>, ranks: &[usize]) -> Vec<usize> {
    let max_rank = ranks.iter().copied().max().unwrap_or(0);
    let mut layers: Vec<Vec<usize>> = vec![Vec::new(); max_rank + 1];
    for (i, &rank) in ranks.iter().enumerate() {
        layers[rank].push(i);
    }

    let mut orders = vec![0usize; ranks.len()];
    for (slot, &i) in layers[0].iter().enumerate() {
        orders[i] = slot;
    }

    for rank in 1..layers.len() {
        let mut keyed: Vec<(f64, usize)> = layers[rank]
            .iter()
            .enumerate()
            .map(|(slot, &i)| {
                let preds: Vec<usize> = graph
                    .neighbors_directed(NodeIndex::new(i), Incoming)
                    .map(|p| p.index())
                    .filter(|&p| ranks[p] < rank)
                    .collect();
                let barycenter = if preds.is_empty() {
                    slot as f64
                } else {
                    preds.iter().map(|&p| orders[p] as f64).sum::<f64>() / preds.len() as f64
                };
                (barycenter, i)
            })
            .collect();
        keyed.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

        for (slot, &(_, i)) in keyed.iter().enumerate() {
            orders[i] = slot;
        }
        layers[rank] = keyed.into_iter().map(|(_, i)| i).collect();
    }

    orders
}
