use colored::Colorize;
use commands::command_argument_builder;
use lantern::handlers::{
    handle_analyze, handle_metrics, handle_presets, handle_savings, handle_simulate,
};
use lantern_core::print_banner;
use tracing_subscriber::EnvFilter;

mod commands;

#[tokio::main]
async fn main() {
    // Logs go to stderr so reports on stdout stay machine readable
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cmd = command_argument_builder();
    let chosen_command = cmd.get_matches();
    let quiet = chosen_command.get_flag("quiet");

    // Show banner unless --quiet flag is set
    if !quiet {
        print_banner();
    }

    if chosen_command.subcommand().is_none() {
        // No subcommand provided, just show the banner
        return;
    }

    let outcome = match chosen_command.subcommand() {
        Some(("simulate", primary_command)) => handle_simulate(primary_command, quiet).await,
        Some(("metrics", primary_command)) => handle_metrics(primary_command, quiet).await,
        Some(("savings", primary_command)) => handle_savings(primary_command, quiet).await,
        Some(("analyze", primary_command)) => handle_analyze(primary_command),
        Some(("presets", _)) => {
            handle_presets();
            Ok(())
        }
        _ => unreachable!("clap should ensure we don't get here"),
    };

    if let Err(e) = outcome {
        eprintln!("{} {}", "✗".red().bold(), e.to_string().red());
        for cause in e.chain().skip(1) {
            eprintln!("  {} {}", "caused by:".red(), cause);
        }
        std::process::exit(1);
    }
}

pub const CLAP_STYLING: clap::builder::styling::Styles = clap::builder::styling::Styles::styled()
    .header(clap_cargo::style::HEADER)
    .usage(clap_cargo::style::USAGE)
    .literal(clap_cargo::style::LITERAL)
    .placeholder(clap_cargo::style::PLACEHOLDER)
    .error(clap_cargo::style::ERROR)
    .valid(clap_cargo::style::VALID)
    .invalid(clap_cargo::style::INVALID);
