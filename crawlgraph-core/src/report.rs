// Snapshot export for renderers and humans

use colored::Colorize;
use petgraph::dot::{Config, Dot};
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::error::Result;
use crate::graph::{GraphSnapshot, NodeKind, NodePayload};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SnapshotFormat {
    Text,
    Json,
    Dot,
}

impl SnapshotFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "text" | "txt" => Some(SnapshotFormat::Text),
            "json" => Some(SnapshotFormat::Json),
            "dot" | "graphviz" => Some(SnapshotFormat::Dot),
            _ => None,
        }
    }
}

pub fn render_snapshot(snapshot: &GraphSnapshot, format: SnapshotFormat) -> Result<String> {
    Ok(match format {
        SnapshotFormat::Text => generate_text_report(snapshot),
        SnapshotFormat::Json => generate_json_report(snapshot)?,
        SnapshotFormat::Dot => generate_dot_report(snapshot),
    })
}

pub fn generate_text_report(snapshot: &GraphSnapshot) -> String {
    let mut report = String::new();
    let rule = "━".repeat(60);

    report.push_str(&format!("{}\n", rule));
    report.push_str(&format!(
        "{} view  ·  snapshot {}  ·  {}\n",
        snapshot.view_mode.as_str().to_uppercase().bold(),
        snapshot.generation,
        snapshot.built_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    report.push_str(&format!("{}\n\n", rule));

    report.push_str(&format!("  Nodes:       {}\n", snapshot.nodes.len()));
    report.push_str(&format!("  Edges:       {}\n", snapshot.edges.len()));
    report.push_str(&format!("  In boundary: {}\n\n", snapshot.restricted_count()));

    let labels: HashMap<&str, &str> = snapshot
        .nodes
        .iter()
        .map(|n| (n.id.as_str(), n.label()))
        .collect();

    for node in &snapshot.nodes {
        let marker = if node.restricted {
            "●".green().to_string()
        } else {
            "○".dimmed().to_string()
        };
        let detail = match &node.payload {
            NodePayload::Page(page) => page.url.clone(),
            NodePayload::Domain(domain) => format!(
                "{} page{}, {} linked",
                domain.page_count,
                if domain.page_count == 1 { "" } else { "s" },
                domain.linked_hostnames.len()
            ),
        };
        report.push_str(&format!(
            "  {} {:<6} {}  {}\n",
            marker,
            node.id,
            node.label(),
            detail.dimmed()
        ));

        let targets: Vec<&str> = snapshot
            .edges
            .iter()
            .filter(|e| e.source == node.id)
            .map(|e| labels.get(e.target.as_str()).copied().unwrap_or(e.target.as_str()))
            .collect();
        for target in targets {
            report.push_str(&format!("           └─> {}\n", target));
        }
    }

    if !snapshot.diagnostics.is_empty() {
        report.push_str(&format!("\n{}\n", "Diagnostics".yellow().bold()));
        for diagnostic in &snapshot.diagnostics {
            report.push_str(&format!("  ⚠ {}\n", diagnostic));
        }
    }

    report
}

pub fn generate_json_report(snapshot: &GraphSnapshot) -> std::result::Result<String, serde_json::Error> {
    serde_json::to_string_pretty(snapshot)
}

struct DotEdge;

impl fmt::Display for DotEdge {
    fn fmt(&self, _f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Ok(())
    }
}

struct DotNode {
    label: String,
    kind: NodeKind,
    restricted: bool,
}

impl fmt::Display for DotNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label)
    }
}

pub fn generate_dot_report(snapshot: &GraphSnapshot) -> String {
    let mut graph: DiGraph<DotNode, DotEdge> = DiGraph::new();
    let mut index: HashMap<&str, NodeIndex> = HashMap::new();

    for node in &snapshot.nodes {
        let label = match &node.payload {
            NodePayload::Page(page) => page.url.clone(),
            NodePayload::Domain(domain) => domain.hostname.clone(),
        };
        let idx = graph.add_node(DotNode {
            label,
            kind: node.kind,
            restricted: node.restricted,
        });
        index.insert(node.id.as_str(), idx);
    }

    for edge in &snapshot.edges {
        if let (Some(&source), Some(&target)) =
            (index.get(edge.source.as_str()), index.get(edge.target.as_str()))
        {
            graph.add_edge(source, target, DotEdge);
        }
    }

    let dot = Dot::with_attr_getters(
        &graph,
        &[Config::EdgeNoLabel],
        &|_, _| String::new(),
        &|_, (_, node)| {
            let shape = match node.kind {
                NodeKind::Page => "box",
                NodeKind::Domain => "ellipse",
            };
            if node.restricted {
                format!("shape={} style=filled fillcolor=lightblue", shape)
            } else {
                format!("shape={}", shape)
            }
        },
    );

    format!("{}", dot)
}

pub fn save_report(content: &str, path: &Path) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(content.as_bytes())?;
    Ok(())
}
