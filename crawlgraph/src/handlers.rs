use colored::Colorize;
use crawlgraph_core::graph::ViewMode;
use crawlgraph_core::layout::LayoutDirection;
use crawlgraph_core::refresh::{GraphView, RefreshPhase};
use crawlgraph_core::report::{SnapshotFormat, save_report};
use crawlgraph_source::{CrawlRecord, CrawlScope, DataSource, GraphQlSource, StaticSource};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::Level;

// Helper functions for the graph handler

pub fn parse_view_mode(value: &str) -> Result<ViewMode, String> {
    ViewMode::from_str(value).ok_or_else(|| format!("Unknown view mode '{}'", value))
}

pub fn parse_direction(value: &str) -> Result<LayoutDirection, String> {
    LayoutDirection::from_str(value).ok_or_else(|| format!("Unknown layout direction '{}'", value))
}

pub fn parse_format(value: &str) -> Result<SnapshotFormat, String> {
    SnapshotFormat::from_str(value).ok_or_else(|| format!("Unknown output format '{}'", value))
}

/// Record ids are trimmed; blanks are ignored. No ids means every record.
pub fn parse_scope<'a>(ids: impl IntoIterator<Item = &'a String>) -> CrawlScope {
    let ids: Vec<String> = ids
        .into_iter()
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .collect();
    CrawlScope::from_identifiers(ids)
}

/// Exactly one of `endpoint` or `input` must be given. `input` is tilde-expanded.
pub fn load_source(
    endpoint: Option<&str>,
    input: Option<&str>,
) -> Result<Arc<dyn DataSource>, String> {
    match (endpoint, input) {
        (Some(endpoint), None) => GraphQlSource::new(endpoint)
            .map(|source| Arc::new(source) as Arc<dyn DataSource>)
            .map_err(|e| format!("Failed to set up GraphQL source: {}", e)),
        (None, Some(input)) => {
            let path = expand_path(input);
            StaticSource::from_json_file(&path)
                .map(|source| Arc::new(source) as Arc<dyn DataSource>)
                .map_err(|e| format!("Failed to load {}: {}", path.display(), e))
        }
        (Some(_), Some(_)) => Err("Only one of --endpoint or --input may be given".to_string()),
        (None, None) => Err("Either --endpoint or --input must be provided".to_string()),
    }
}

pub fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).as_ref())
}

/// The banner shares stdout with rendered output, so it is only shown when
/// that output is text or goes to a file.
pub fn banner_enabled(quiet: bool, format: Option<&str>, output: Option<&Path>) -> bool {
    if quiet {
        return false;
    }
    output.is_some() || format.is_none_or(|f| parse_format(f) == Ok(SnapshotFormat::Text))
}

/// WARN by default, INFO with -v, DEBUG with -vv and above.
pub fn verbosity_level(count: u8) -> Level {
    match count {
        0 => Level::WARN,
        1 => Level::INFO,
        _ => Level::DEBUG,
    }
}

/// Save to `output` when given, otherwise print to stdout.
pub fn write_output(content: &str, output: Option<&Path>) -> Result<(), String> {
    match output {
        Some(path) => save_report(content, path)
            .map_err(|e| format!("Failed to write {}: {}", path.display(), e)),
        None => {
            print!("{}", content);
            if !content.ends_with('\n') {
                println!();
            }
            Ok(())
        }
    }
}

pub fn format_records(records: &[CrawlRecord]) -> String {
    if records.is_empty() {
        return format!("{}\n", "No crawl records found".dimmed());
    }

    let mut out = String::new();
    out.push_str(&format!(
        "{:<6} {:<8} {:<24} {}\n",
        "ID".bold(),
        "STATE".bold(),
        "LABEL".bold(),
        "URL".bold()
    ));
    for record in records {
        let state = if record.active {
            "active".green()
        } else {
            "inactive".dimmed()
        };
        out.push_str(&format!(
            "{:<6} {:<8} {:<24} {}\n",
            record.identifier, state, record.label, record.url
        ));
        out.push_str(&format!(
            "       boundary: {}\n",
            record.boundary_pattern.dimmed()
        ));
    }
    out
}

/// One-line status for live mode.
pub fn format_live_status(view: &GraphView) -> String {
    let phase = match view.phase {
        RefreshPhase::Idle => "idle".dimmed(),
        RefreshPhase::Fetching => "fetching".cyan(),
        RefreshPhase::Building => "building".cyan(),
        RefreshPhase::Ready => "ready".green(),
    };
    let generation = view
        .snapshot
        .as_ref()
        .map(|s| format!("snapshot {}", s.generation))
        .unwrap_or_else(|| "no snapshot".to_string());

    let mut status = format!("[{}] {} · {}", view.view_mode.as_str(), phase, generation);
    if view.stale {
        status.push_str(&format!(" · {}", "stale".yellow().bold()));
    }
    if let Some(error) = &view.last_error {
        status.push_str(&format!(" · {}", error.red()));
    }
    status
}
