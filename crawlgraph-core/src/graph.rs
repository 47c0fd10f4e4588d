use chrono::{DateTime, Utc};
use crawlgraph_source::{LinkRef, Page};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::layout::LayoutDirection;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
    /// One node per page
    #[default]
    Website,
    /// One node per hostname
    Domain,
}

impl ViewMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViewMode::Website => "website",
            ViewMode::Domain => "domain",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "website" | "page" | "pages" => Some(ViewMode::Website),
            "domain" | "domains" | "host" => Some(ViewMode::Domain),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefreshMode {
    #[default]
    Static,
    Live,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Page,
    Domain,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// How a domain is represented when it has no page of its own in the dataset.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "source", content = "value", rename_all = "lowercase")]
pub enum Representative {
    Page(Page),
    Link(LinkRef),
}

impl Representative {
    pub fn url(&self) -> &str {
        match self {
            Representative::Page(page) => &page.url,
            Representative::Link(link) => &link.url,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainAggregate {
    pub hostname: String,
    pub representative: Representative,
    pub linked_hostnames: BTreeSet<String>,
    pub page_count: usize,
    pub restricted: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum NodePayload {
    Page(Page),
    Domain(DomainAggregate),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphNode {
    pub id: String,
    pub kind: NodeKind,
    pub position: Position,
    /// Page inside its crawl boundary, or domain with at least one such page
    pub restricted: bool,
    pub payload: NodePayload,
}

impl GraphNode {
    pub fn label(&self) -> &str {
        match &self.payload {
            NodePayload::Page(page) => page.title.as_deref().unwrap_or(&page.url),
            NodePayload::Domain(domain) => &domain.hostname,
        }
    }

    pub fn url(&self) -> &str {
        match &self.payload {
            NodePayload::Page(page) => &page.url,
            NodePayload::Domain(domain) => domain.representative.url(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct GraphEdge {
    pub id: String,
    pub source: String,
    pub target: String,
}

/// Recoverable data-quality problems found while building a graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    MalformedUrl { url: String },
    MalformedLink { source: String, url: String },
    InvalidBoundaryPattern { pattern: String, error: String },
    DuplicateUrl { url: String },
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Diagnostic::MalformedUrl { url } => write!(f, "malformed page URL '{}'", url),
            Diagnostic::MalformedLink { source, url } => {
                write!(f, "malformed link '{}' on {}", url, source)
            }
            Diagnostic::InvalidBoundaryPattern { pattern, error } => {
                write!(f, "invalid boundary pattern '{}': {}", pattern, error)
            }
            Diagnostic::DuplicateUrl { url } => write!(f, "duplicate page URL '{}'", url),
        }
    }
}

/// Output of one graph-construction pass, before layout.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Graph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
    pub diagnostics: Vec<Diagnostic>,
}

impl Graph {
    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| n.id == id)
    }
}

/// Event emitted when a node is double-activated by the rendering layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Activation {
    OpenDetail { node_id: String, url: String },
    FocusDomain { hostname: String },
}

/// One immutable build+layout result.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphSnapshot {
    pub generation: u64,
    pub view_mode: ViewMode,
    pub direction: LayoutDirection,
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
    pub diagnostics: Vec<Diagnostic>,
    pub built_at: DateTime<Utc>,
}

impl GraphSnapshot {
    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn activate(&self, node_id: &str) -> Option<Activation> {
        let node = self.node(node_id)?;
        match &node.payload {
            NodePayload::Page(page) => Some(Activation::OpenDetail {
                node_id: node.id.clone(),
                url: page.url.clone(),
            }),
            NodePayload::Domain(domain) => Some(Activation::FocusDomain {
                hostname: domain.hostname.clone(),
            }),
        }
    }

    pub fn restricted_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.restricted).count()
    }
}
