use anyhow::{Context, anyhow};
use clap::ArgMatches;
use colored::Colorize;
use commands::command_argument_builder;
use crawlgraph::handlers::{
    banner_enabled, format_live_status, format_records, load_source, parse_direction, parse_format,
    parse_scope, parse_view_mode, verbosity_level, write_output,
};
use crawlgraph_core::graph::{GraphSnapshot, RefreshMode};
use crawlgraph_core::layout::LayoutConfig;
use crawlgraph_core::refresh::{RefreshConfig, RefreshController};
use crawlgraph_core::report::{SnapshotFormat, render_snapshot};
use crawlgraph_core::print_banner;
use crawlgraph_source::DataSource;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;
use url::Url;

mod commands;

#[tokio::main]
async fn main() {
    let cmd = command_argument_builder();
    let chosen_command = cmd.get_matches();
    let quiet = chosen_command.get_flag("quiet");

    tracing_subscriber::fmt()
        .with_max_level(verbosity_level(chosen_command.get_count("verbose")))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    // Show banner unless --quiet is set or stdout carries JSON/DOT
    let show_banner = match chosen_command.subcommand() {
        Some(("graph", primary_command)) => banner_enabled(
            quiet,
            primary_command.get_one::<String>("format").map(String::as_str),
            primary_command.get_one::<PathBuf>("output").map(PathBuf::as_path),
        ),
        _ => !quiet,
    };
    if show_banner {
        print_banner();
    }

    let result = match chosen_command.subcommand() {
        Some(("graph", primary_command)) => handle_graph(primary_command, quiet).await,
        Some(("records", primary_command)) => handle_records(primary_command).await,
        // No subcommand provided, just show the banner
        None => return,
        _ => unreachable!("clap should ensure we don't get here"),
    };

    if let Err(e) = result {
        eprintln!("{} {:#}", "✗".red().bold(), e);
        std::process::exit(1);
    }
}

fn spinner(quiet: bool, message: String) -> anyhow::Result<ProgressBar> {
    if quiet {
        return Ok(ProgressBar::hidden());
    }
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}")?);
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner.set_message(message);
    Ok(spinner)
}

async fn handle_graph(args: &ArgMatches, quiet: bool) -> anyhow::Result<()> {
    let endpoint = args.get_one::<Url>("endpoint").map(Url::as_str);
    let input = args.get_one::<String>("input").map(String::as_str);
    let source = load_source(endpoint, input).map_err(|e| anyhow!(e))?;

    let view_mode = parse_view_mode(arg_str(args, "mode", "website")).map_err(|e| anyhow!(e))?;
    let direction = parse_direction(arg_str(args, "direction", "lr")).map_err(|e| anyhow!(e))?;
    let format = parse_format(arg_str(args, "format", "text")).map_err(|e| anyhow!(e))?;
    let scope = parse_scope(args.get_many::<String>("record").into_iter().flatten());
    let output = args.get_one::<PathBuf>("output");
    let live = args.get_flag("live");
    let interval = Duration::from_secs(args.get_one::<u64>("interval").copied().unwrap_or(5));

    let config = RefreshConfig {
        view_mode,
        // A primed Live controller waits one interval before refetching
        refresh_mode: if live {
            RefreshMode::Live
        } else {
            RefreshMode::Static
        },
        scope,
        interval,
        stale_after: interval * 3,
        layout: LayoutConfig {
            direction,
            ..LayoutConfig::default()
        },
    };
    debug!("Refresh config: {:?}", config);

    let spinner = spinner(
        quiet,
        format!("Fetching crawled pages from {}", endpoint.or(input).unwrap_or("source")),
    )?;
    let mut controller = RefreshController::new(source, config);
    let primed = controller.prime().await;
    spinner.finish_and_clear();
    let snapshot = primed.context("Initial fetch failed")?;

    emit(&snapshot, format, output.map(|p| p.as_path()), quiet)?;
    if !live {
        return Ok(());
    }

    if !quiet {
        eprintln!(
            "{} Live mode, polling every {}s. Press Ctrl-C to stop.",
            "→".blue(),
            interval.as_secs()
        );
    }

    let (handle, task) = controller.spawn();

    let mut view = handle.subscribe();
    let mut shown = snapshot.generation;
    let mut last_status = String::new();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            changed = view.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = view.borrow_and_update().clone();
                if let Some(snapshot) = &current.snapshot
                    && snapshot.generation != shown
                {
                    shown = snapshot.generation;
                    emit(snapshot, format, output.map(|p| p.as_path()), quiet)?;
                }

                let status = format_live_status(&current);
                if !quiet && current.stale && status != last_status {
                    eprintln!("{}", status);
                }
                last_status = status;
            }
            _ = &mut ctrl_c => {
                debug!("Interrupted");
                break;
            }
        }
    }

    if handle.shutdown().await.is_err() {
        debug!("Refresh controller already stopped");
    }
    task.await?;
    Ok(())
}

fn emit(
    snapshot: &GraphSnapshot,
    format: SnapshotFormat,
    output: Option<&Path>,
    quiet: bool,
) -> anyhow::Result<()> {
    let content = render_snapshot(snapshot, format)?;
    write_output(&content, output).map_err(|e| anyhow!(e))?;

    if !quiet {
        if let Some(path) = output {
            eprintln!(
                "{} Snapshot {} written to {} ({} nodes, {} edges)",
                "✓".green().bold(),
                snapshot.generation,
                path.display(),
                snapshot.nodes.len(),
                snapshot.edges.len()
            );
        }
        if format != SnapshotFormat::Text && !snapshot.diagnostics.is_empty() {
            eprintln!(
                "{} {} data problems found, see diagnostics",
                "⚠".yellow(),
                snapshot.diagnostics.len()
            );
        }
    }
    Ok(())
}

async fn handle_records(args: &ArgMatches) -> anyhow::Result<()> {
    let endpoint = args.get_one::<Url>("endpoint").map(Url::as_str);
    let source = load_source(endpoint, None).map_err(|e| anyhow!(e))?;
    let records = source
        .records()
        .await
        .context("Failed to list crawl records")?;
    print!("{}", format_records(&records));
    Ok(())
}

fn arg_str<'a>(args: &'a ArgMatches, name: &str, default: &'a str) -> &'a str {
    args.get_one::<String>(name)
        .map(String::as_str)
        .unwrap_or(default)
}

pub const CLAP_STYLING: clap::builder::styling::Styles = clap::builder::styling::Styles::styled()
    .header(clap_cargo::style::HEADER)
    .usage(clap_cargo::style::USAGE)
    .literal(clap_cargo::style::LITERAL)
    .placeholder(clap_cargo::style::PLACEHOLDER)
    .error(clap_cargo::style::ERROR)
    .valid(clap_cargo::style::VALID)
    .invalid(clap_cargo::style::INVALID);
