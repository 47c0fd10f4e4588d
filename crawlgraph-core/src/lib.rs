pub mod boundary;
pub mod build;
pub mod error;
pub mod graph;
pub mod identity;
pub mod layout;
pub mod refresh;
pub mod report;

pub use build::{build_domain_view, build_graph, build_website_view, parse_host};
pub use error::GraphError;
pub use graph::{
    Activation, Diagnostic, DomainAggregate, Graph, GraphEdge, GraphNode, GraphSnapshot,
    NodeKind, NodePayload, Position, RefreshMode, Representative, ViewMode,
};
pub use layout::{LayoutConfig, LayoutDirection, LayoutEngine};
pub use refresh::{GraphView, RefreshConfig, RefreshController, RefreshHandle, RefreshPhase};

use colored::Colorize;

pub fn print_banner() {
    let banner = r#"
   ___                    _                         _
  / __|_ _ __ ___ __ __ _| |__ _ _ _ __ _ _ __  | |_
 | (__| '_/ _` \ V  V / | / _` | '_/ _` | '_ \ | ' \
  \___|_| \__,_|\_/\_/  |_\__, |_| \__,_| .__/ |_||_|
                          |___/         |_|
"#;
    println!("{}", banner.bright_cyan());
    println!(
        "  {} {}\n",
        "crawlgraph".bold(),
        env!("CARGO_PKG_VERSION").dimmed()
    );
}
