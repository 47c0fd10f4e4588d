use crate::CLAP_STYLING;
use clap::{arg, command};
use url::Url;

pub(crate) fn command_argument_builder() -> clap::Command {
    clap::Command::new("crawlgraph")
        .version(env!("CARGO_PKG_VERSION"))
        .bin_name("crawlgraph")
        .styles(CLAP_STYLING)
        .arg(arg!(-q --"quiet" "Suppress banner and non-essential output").required(false))
        .arg(
            arg!(-v --"verbose" "Increase log verbosity (-v info, -vv debug)")
                .required(false)
                .action(clap::ArgAction::Count)
                .global(true),
        )
        .subcommand_required(false)
        .subcommand(
            command!("graph")
                .about(
                    "Build a link graph of crawled pages, either one node per page (website) \
                or one node per hostname (domain).",
                )
                .arg(
                    arg!(-e --"endpoint" <URL>)
                        .required(false)
                        .help("GraphQL endpoint serving crawled pages")
                        .value_parser(clap::value_parser!(Url))
                        .conflicts_with("input"),
                )
                .arg(
                    arg!(-i --"input" <PATH>)
                        .required(false)
                        .help("JSON dump of crawled pages")
                        .conflicts_with("endpoint"),
                )
                .arg(
                    arg!(-r --"record" <ID>)
                        .required(false)
                        .help("Only include pages owned by this crawl record (repeatable)")
                        .action(clap::ArgAction::Append),
                )
                .arg(
                    arg!(-m --"mode" <MODE>)
                        .required(false)
                        .help("Graph view: website or domain")
                        .value_parser(["website", "domain"])
                        .default_value("website"),
                )
                .arg(
                    arg!(-d --"direction" <DIR>)
                        .required(false)
                        .help("Layout direction: lr (left to right) or tb (top to bottom)")
                        .value_parser(["lr", "tb"])
                        .default_value("lr"),
                )
                .arg(
                    arg!(-f --"format" <FORMAT>)
                        .required(false)
                        .help("Output format: text, json, dot")
                        .value_parser(["text", "json", "dot"])
                        .default_value("text"),
                )
                .arg(
                    arg!(-o --"output" <PATH>)
                        .required(false)
                        .help("Write the graph to a file (default: display to screen)")
                        .value_parser(clap::value_parser!(std::path::PathBuf)),
                )
                .arg(
                    arg!(--"live")
                        .required(false)
                        .help("Keep polling the source and re-emit the graph on every change")
                        .action(clap::ArgAction::SetTrue),
                )
                .arg(
                    arg!(--"interval" <SECONDS>)
                        .required(false)
                        .help("Polling interval in live mode")
                        .value_parser(clap::value_parser!(u64).range(1..))
                        .default_value("5"),
                ),
        )
        .subcommand(
            command!("records")
                .about("List the crawl records known to the source")
                .arg(
                    arg!(-e --"endpoint" <URL>)
                        .required(true)
                        .help("GraphQL endpoint serving crawl records")
                        .value_parser(clap::value_parser!(Url)),
                ),
        )
}
