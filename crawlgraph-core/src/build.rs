use crawlgraph_source::Page;
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, warn};
use url::Url;

use crate::boundary::BoundaryMatcher;
use crate::graph::{
    Diagnostic, DomainAggregate, Graph, GraphEdge, GraphNode, NodeKind, NodePayload, Position,
    Representative, ViewMode,
};
use crate::identity::IdentityMap;

/// Hostname of an absolute URL, or `None` if it has none.
pub fn parse_host(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_string()))
        .filter(|h| !h.is_empty())
}

pub fn build_graph(pages: &[Page], mode: ViewMode) -> Graph {
    match mode {
        ViewMode::Website => build_website_view(pages),
        ViewMode::Domain => build_domain_view(pages),
    }
}

/// One node per distinct page URL, one edge per link whose target is in the
/// dataset. Links to pages outside the dataset are dropped.
pub fn build_website_view(pages: &[Page]) -> Graph {
    let mut diagnostics = Vec::new();

    let valid: Vec<&Page> = pages
        .iter()
        .filter(|page| {
            if page.url.trim().is_empty() {
                warn!("Skipping page with empty URL");
                diagnostics.push(Diagnostic::MalformedUrl {
                    url: page.url.clone(),
                });
                false
            } else {
                true
            }
        })
        .collect();

    let identity = IdentityMap::build("p", &valid, |page| Some(page.url.clone()));
    for url in identity.duplicates() {
        warn!("Duplicate page URL {} in dataset, keeping the later record", url);
        diagnostics.push(Diagnostic::DuplicateUrl { url: url.clone() });
    }

    // Later records win the payload
    let mut winners: HashMap<&str, &Page> = HashMap::with_capacity(identity.len());
    for &page in &valid {
        winners.insert(page.url.as_str(), page);
    }

    let mut matcher = BoundaryMatcher::new();
    let mut nodes = Vec::with_capacity(identity.len());
    let mut edges = Vec::new();
    let mut pair_ordinals: HashMap<(String, String), usize> = HashMap::new();

    for url in identity.keys() {
        let (Some(page), Some(source)) = (winners.get(url.as_str()), identity.resolve(url)) else {
            continue;
        };

        nodes.push(GraphNode {
            id: source.to_string(),
            kind: NodeKind::Page,
            position: Position::default(),
            restricted: matcher.matches(&page.url, &page.owner.boundary_pattern),
            payload: NodePayload::Page((*page).clone()),
        });

        for link in &page.links {
            let Some(target) = identity.resolve(link.url.as_str()) else {
                debug!("Dropping dangling link {} -> {}", page.url, link.url);
                continue;
            };

            let ordinal = pair_ordinals
                .entry((source.to_string(), target.to_string()))
                .or_insert(0);
            edges.push(GraphEdge {
                id: format!("e{}-{}-{}", source, target, ordinal),
                source: source.to_string(),
                target: target.to_string(),
            });
            *ordinal += 1;
        }
    }

    diagnostics.extend(matcher.into_diagnostics());
    debug!(
        "Website view: {} nodes, {} edges from {} pages",
        nodes.len(),
        edges.len(),
        pages.len()
    );

    Graph {
        nodes,
        edges,
        diagnostics,
    }
}

struct DomainEntry {
    representative: Representative,
    linked: BTreeSet<String>,
    page_count: usize,
    restricted: bool,
}

impl DomainEntry {
    fn new(representative: Representative) -> Self {
        Self {
            representative,
            linked: BTreeSet::new(),
            page_count: 0,
            restricted: false,
        }
    }
}

/// One node per hostname, at most one edge per ordered hostname pair.
/// Self-links are kept as self-loops.
pub fn build_domain_view(pages: &[Page]) -> Graph {
    let mut diagnostics = Vec::new();
    let mut identity: IdentityMap<String> = IdentityMap::new("d");
    let mut domains: HashMap<String, DomainEntry> = HashMap::new();
    let mut matcher = BoundaryMatcher::new();

    for page in pages {
        let Some(host) = parse_host(&page.url) else {
            warn!("Skipping page with unparseable URL '{}'", page.url);
            diagnostics.push(Diagnostic::MalformedUrl {
                url: page.url.clone(),
            });
            continue;
        };

        identity.mint(host.clone());
        let in_boundary = matcher.matches(&page.url, &page.owner.boundary_pattern);
        let entry = domains
            .entry(host.clone())
            .or_insert_with(|| DomainEntry::new(Representative::Page(page.clone())));
        // First page seen beats a link seen earlier
        if entry.page_count == 0 {
            entry.representative = Representative::Page(page.clone());
        }
        entry.page_count += 1;
        entry.restricted |= in_boundary;

        for link in &page.links {
            let Some(target) = parse_host(&link.url) else {
                debug!("Skipping unparseable link '{}' on {}", link.url, page.url);
                diagnostics.push(Diagnostic::MalformedLink {
                    source: page.url.clone(),
                    url: link.url.clone(),
                });
                continue;
            };

            if let Some(entry) = domains.get_mut(&host) {
                entry.linked.insert(target.clone());
            }
            if identity.mint(target.clone()).fresh {
                domains.insert(target, DomainEntry::new(Representative::Link(link.clone())));
            }
        }
    }

    let mut hostnames: Vec<&String> = identity.keys().iter().collect();
    hostnames.sort();

    let mut nodes = Vec::with_capacity(hostnames.len());
    let mut edges = Vec::new();

    for hostname in hostnames {
        let (Some(id), Some(entry)) = (identity.resolve(hostname), domains.remove(hostname)) else {
            continue;
        };

        for target in &entry.linked {
            if let Some(target_id) = identity.resolve(target) {
                edges.push(GraphEdge {
                    id: format!("e{}-{}", id, target_id),
                    source: id.to_string(),
                    target: target_id.to_string(),
                });
            }
        }

        nodes.push(GraphNode {
            id: id.to_string(),
            kind: NodeKind::Domain,
            position: Position::default(),
            restricted: entry.restricted,
            payload: NodePayload::Domain(DomainAggregate {
                hostname: hostname.clone(),
                representative: entry.representative,
                linked_hostnames: entry.linked,
                page_count: entry.page_count,
                restricted: entry.restricted,
            }),
        });
    }

    diagnostics.extend(matcher.into_diagnostics());
    debug!(
        "Domain view: {} nodes, {} edges from {} pages",
        nodes.len(),
        edges.len(),
        pages.len()
    );

    Graph {
        nodes,
        edges,
        diagnostics,
    }
}
