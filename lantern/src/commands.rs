use crate::CLAP_STYLING;
use clap::{arg, command};
use std::path::PathBuf;

fn trace_arg() -> clap::Arg {
    arg!(<TRACE>)
        .help("Page trace JSON: network records, main-thread tasks and paint timestamps")
        .value_parser(clap::value_parser!(PathBuf))
}

fn throttling_args(cmd: clap::Command) -> clap::Command {
    cmd.arg(
        arg!(-s --"settings" <PATH>)
            .required(false)
            .help("Throttling settings JSON file (camelCase keys)")
            .value_parser(clap::value_parser!(PathBuf))
            .conflicts_with("preset"),
    )
    .arg(
        arg!(-p --"preset" <NAME>)
            .required(false)
            .help("Named throttling preset (see `lantern presets`)")
            .default_value("mobile-slow-4g"),
    )
    .arg(
        arg!(-m --"method" <METHOD>)
            .required(false)
            .help("Throttling method: simulate, provided, devtools")
            .value_parser(["simulate", "provided", "devtools"]),
    )
}

fn output_args(cmd: clap::Command) -> clap::Command {
    cmd.arg(
        arg!(-o --"output" <PATH>)
            .required(false)
            .help("Save report to file (default: display to screen)"),
    )
    .arg(
        arg!(-f --"format" <FORMAT>)
            .required(false)
            .help("Report format: text, json, csv, markdown")
            .value_parser(["text", "json", "csv", "markdown", "md"])
            .default_value("text"),
    )
}

pub(crate) fn command_argument_builder() -> clap::Command {
    clap::Command::new("lantern")
        .version(env!("CARGO_PKG_VERSION"))
        .bin_name("lantern")
        .styles(CLAP_STYLING)
        .arg(arg!(-q --"quiet" "Suppress banner and non-essential output").required(false))
        .subcommand_required(false)
        .subcommand(output_args(throttling_args(
            command!("simulate")
                .about("Simulate the page load under the chosen throttling conditions")
                .arg(trace_arg())
                .arg(
                    arg!(--"flexible")
                        .required(false)
                        .help("Start ready requests in critical-path order instead of observed order")
                        .action(clap::ArgAction::SetTrue),
                ),
        )))
        .subcommand(output_args(throttling_args(
            command!("metrics")
                .about("Estimate First Contentful Paint, Largest Contentful Paint and Time to Interactive")
                .arg(trace_arg()),
        )))
        .subcommand(output_args(throttling_args(
            command!("savings")
                .about(
                    "Estimate the time a change would save: preloading, HTTP/2, smaller or \
                removed requests",
                )
                .arg(trace_arg())
                .arg(
                    arg!(--"preload" <URL>)
                        .required(false)
                        .help("Request to fetch as soon as the main document arrives (repeatable)")
                        .action(clap::ArgAction::Append),
                )
                .arg(
                    arg!(--"http2")
                        .required(false)
                        .help("Serve busy HTTP/1.1 origins over HTTP/2")
                        .action(clap::ArgAction::SetTrue),
                )
                .arg(
                    arg!(--"wasted-bytes" <URL_EQ_BYTES>)
                        .required(false)
                        .help("Bytes a request could shed, as URL=BYTES (repeatable)")
                        .action(clap::ArgAction::Append),
                )
                .arg(
                    arg!(--"remove" <URL>)
                        .required(false)
                        .help("Request that could be dropped entirely (repeatable)")
                        .action(clap::ArgAction::Append),
                ),
        )))
        .subcommand(
            command!("analyze")
                .about("Derive round-trip time, server response time and throughput from a trace")
                .arg(trace_arg())
                .arg(
                    arg!(-f --"format" <FORMAT>)
                        .required(false)
                        .help("Output format: text, json")
                        .value_parser(["text", "json"])
                        .default_value("text"),
                ),
        )
        .subcommand(command!("presets").about("List the built-in throttling presets"))
}
