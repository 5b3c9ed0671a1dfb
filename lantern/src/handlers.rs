use anyhow::{Context, Result, anyhow, bail};
use clap::ArgMatches;
use colored::Colorize;
use futures::future::join_all;
use indicatif::{ProgressBar, ProgressStyle};
use lantern_core::report::{ReportFormat, gather_report_data, generate_report, save_report};
use lantern_core::savings::{Savings, Scenario, estimate_savings};
use lantern_core::{PageTrace, build_dependency_graph, estimate_metrics, load_page_trace};
use lantern_sim::network_analyzer::{self, NetworkAnalysis};
use lantern_sim::{
    DependencyGraph, SimulateOptions, SimulationResult, Simulator, Settings, ThrottlingMethod,
};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

// Helpers shared by the handlers

/// Load and parse a page trace
pub fn load_trace(path: &Path) -> Result<PageTrace> {
    load_page_trace(path).with_context(|| format!("Failed to load page trace {}", path.display()))
}

/// Resolve throttling settings: a settings file wins over a preset, and
/// `method` overrides whichever was chosen.
pub fn load_settings(
    settings_file: Option<&PathBuf>,
    preset: Option<&str>,
    method: Option<&str>,
) -> Result<Settings> {
    let mut settings = if let Some(path) = settings_file {
        let expanded = shellexpand::tilde(&path.to_string_lossy()).into_owned();
        let content = std::fs::read_to_string(&expanded)
            .with_context(|| format!("Failed to read settings file {}", expanded))?;
        Settings::from_json(&content).with_context(|| format!("Invalid settings in {}", expanded))?
    } else {
        let name = preset.unwrap_or("mobile-slow-4g");
        Settings::preset(name)?
    };

    if let Some(method) = method {
        settings.throttling_method = ThrottlingMethod::from_name(method)
            .ok_or_else(|| anyhow!("Unknown throttling method '{}'", method))?;
    }
    Ok(settings)
}

/// Parse a `URL=BYTES` pair. The split is at the last `=` so query
/// strings survive.
pub fn parse_wasted_bytes(value: &str) -> Result<(String, u64)> {
    let (url, bytes) = value
        .rsplit_once('=')
        .ok_or_else(|| anyhow!("Expected URL=BYTES, got '{}'", value))?;
    if url.is_empty() {
        bail!("Missing URL in '{}'", value);
    }
    let bytes = bytes
        .trim()
        .parse::<u64>()
        .with_context(|| format!("Invalid byte count in '{}'", value))?;
    Ok((url.to_string(), bytes))
}

/// Simulator for a trace under `settings`, seeded with the trace's own
/// observed network conditions.
pub fn build_simulator(trace: &PageTrace, settings: &Settings) -> Result<Simulator> {
    let analysis = network_analyzer::analyze(&trace.records);
    if analysis.is_none() {
        debug!("No measurable requests; falling back to default network conditions");
    }
    let options = settings.simulator_options(analysis.as_ref())?;
    Ok(Simulator::new(options)?)
}

/// Collect the scenarios requested on the `savings` command line.
pub fn scenarios_from_args(args: &ArgMatches) -> Result<Vec<Scenario>> {
    let mut scenarios = Vec::new();

    let preload: Vec<String> = args
        .get_many::<String>("preload")
        .map(|values| values.cloned().collect())
        .unwrap_or_default();
    if !preload.is_empty() {
        scenarios.push(Scenario::Preload(preload));
    }

    if args.get_flag("http2") {
        scenarios.push(Scenario::Http2);
    }

    if let Some(values) = args.get_many::<String>("wasted-bytes") {
        let mut wasted = BTreeMap::new();
        for value in values {
            let (url, bytes) = parse_wasted_bytes(value)?;
            *wasted.entry(url).or_insert(0u64) += bytes;
        }
        scenarios.push(Scenario::WastedBytes(wasted));
    }

    let remove: Vec<String> = args
        .get_many::<String>("remove")
        .map(|values| values.cloned().collect())
        .unwrap_or_default();
    if !remove.is_empty() {
        scenarios.push(Scenario::Remove(remove));
    }

    Ok(scenarios)
}

/// Print to stdout, or save to a tilde-expanded path.
pub fn write_output(content: &str, output: Option<&String>) -> Result<()> {
    match output {
        Some(path) => {
            let expanded = shellexpand::tilde(path).into_owned();
            save_report(content, Path::new(&expanded))
                .with_context(|| format!("Failed to write report to {}", expanded))?;
            eprintln!("{} Report saved to {}", "✓".green().bold(), expanded.bright_white());
        }
        None => print!("{}", content),
    }
    Ok(())
}

fn spinner(quiet: bool, message: &str) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
        spinner.set_style(style);
    }
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner.set_message(message.to_string());
    spinner
}

fn report_format(args: &ArgMatches) -> Result<ReportFormat> {
    let name = args
        .get_one::<String>("format")
        .map(String::as_str)
        .unwrap_or("text");
    ReportFormat::from_str(name).ok_or_else(|| anyhow!("Unknown report format '{}'", name))
}

/// Everything a subcommand needs: the trace, its graph and a simulator.
struct Prepared {
    trace: PageTrace,
    graph: Arc<DependencyGraph>,
    simulator: Arc<Simulator>,
}

fn prepare(args: &ArgMatches) -> Result<Prepared> {
    let trace_path = args
        .get_one::<PathBuf>("TRACE")
        .ok_or_else(|| anyhow!("A page trace is required"))?;
    let trace = load_trace(trace_path)?;

    let settings = load_settings(
        args.get_one::<PathBuf>("settings"),
        args.get_one::<String>("preset").map(String::as_str),
        args.get_one::<String>("method").map(String::as_str),
    )?;
    let simulator = build_simulator(&trace, &settings)?;
    let graph = build_dependency_graph(&trace).context("Failed to build dependency graph")?;
    info!(
        "Prepared {} nodes under {} throttling",
        graph.len(),
        settings.throttling_method.as_str()
    );

    Ok(Prepared {
        trace,
        graph: Arc::new(graph),
        simulator: Arc::new(simulator),
    })
}

// Concurrent runners

/// Run independent simulations of one graph on blocking tasks.
pub async fn run_simulations(
    graph: Arc<DependencyGraph>,
    simulator: Arc<Simulator>,
    runs: Vec<SimulateOptions>,
) -> Result<Vec<SimulationResult>> {
    let handles = runs.into_iter().map(|options| {
        let graph = Arc::clone(&graph);
        let simulator = Arc::clone(&simulator);
        tokio::task::spawn_blocking(move || simulator.simulate(&graph, &options))
    });

    join_all(handles)
        .await
        .into_iter()
        .map(|joined| -> Result<SimulationResult> {
            Ok(joined.context("Simulation task panicked")??)
        })
        .collect()
}

/// Estimate each savings scenario on its own blocking task.
pub async fn run_savings(
    graph: Arc<DependencyGraph>,
    simulator: Arc<Simulator>,
    scenarios: Vec<Scenario>,
) -> Result<Vec<Savings>> {
    let handles = scenarios.into_iter().map(|scenario| {
        let graph = Arc::clone(&graph);
        let simulator = Arc::clone(&simulator);
        tokio::task::spawn_blocking(move || {
            estimate_savings(&graph, &simulator, &scenario)
                .with_context(|| format!("Scenario '{}' failed", scenario.as_str()))
        })
    });

    join_all(handles)
        .await
        .into_iter()
        .map(|joined| -> Result<Savings> { joined.context("Savings task panicked")? })
        .collect()
}

// Subcommand handlers

pub async fn handle_simulate(args: &ArgMatches, quiet: bool) -> Result<()> {
    let format = report_format(args)?;
    let prepared = prepare(args)?;
    let flexible = args.get_flag("flexible");

    let progress = spinner(quiet, "Simulating page load...");
    let label = if flexible { "flexible" } else { "simulate" };
    let results = run_simulations(
        Arc::clone(&prepared.graph),
        Arc::clone(&prepared.simulator),
        vec![SimulateOptions::labeled(label).with_flexible_ordering(flexible)],
    )
    .await;
    progress.finish_and_clear();

    let result = results?
        .pop()
        .ok_or_else(|| anyhow!("Simulation produced no result"))?;
    let data = gather_report_data(&prepared.graph, &result, None, None);
    write_output(&generate_report(&data, format)?, args.get_one::<String>("output"))
}

pub async fn handle_metrics(args: &ArgMatches, quiet: bool) -> Result<()> {
    let format = report_format(args)?;
    let Prepared {
        trace,
        graph,
        simulator,
    } = prepare(args)?;

    let trace_lacks_paints = trace.timestamps.first_contentful_paint.is_none()
        || trace.timestamps.largest_contentful_paint.is_none();

    let progress = spinner(quiet, "Estimating metrics...");
    let metrics_task = {
        let graph = Arc::clone(&graph);
        let simulator = Arc::clone(&simulator);
        tokio::task::spawn_blocking(move || estimate_metrics(&graph, &trace, &simulator))
    };
    let baseline = run_simulations(
        Arc::clone(&graph),
        Arc::clone(&simulator),
        vec![SimulateOptions::labeled("metrics")],
    );
    let (metrics, baseline) = futures::join!(metrics_task, baseline);
    progress.finish_and_clear();

    let metrics = metrics
        .context("Metric task panicked")?
        .context("Failed to estimate metrics")?;
    if trace_lacks_paints {
        eprintln!(
            "{} Trace is missing paint timestamps; paint metrics were skipped",
            "⚠".yellow().bold()
        );
    }
    let result = baseline?
        .pop()
        .ok_or_else(|| anyhow!("Simulation produced no result"))?;
    let data = gather_report_data(&graph, &result, Some(metrics), None);
    write_output(&generate_report(&data, format)?, args.get_one::<String>("output"))
}

pub async fn handle_savings(args: &ArgMatches, quiet: bool) -> Result<()> {
    let format = report_format(args)?;
    let scenarios = scenarios_from_args(args)?;
    if scenarios.is_empty() {
        bail!("Nothing to estimate: pass --preload, --http2, --wasted-bytes or --remove");
    }
    let prepared = prepare(args)?;

    let progress = spinner(
        quiet,
        &format!("Estimating {} scenario(s)...", scenarios.len()),
    );
    let (savings, baseline) = futures::join!(
        run_savings(
            Arc::clone(&prepared.graph),
            Arc::clone(&prepared.simulator),
            scenarios
        ),
        run_simulations(
            Arc::clone(&prepared.graph),
            Arc::clone(&prepared.simulator),
            vec![SimulateOptions::labeled("savings")],
        )
    );
    progress.finish_and_clear();

    let result = baseline?
        .pop()
        .ok_or_else(|| anyhow!("Simulation produced no result"))?;
    let data = gather_report_data(&prepared.graph, &result, None, Some(savings?));
    write_output(&generate_report(&data, format)?, args.get_one::<String>("output"))
}

pub fn handle_analyze(args: &ArgMatches) -> Result<()> {
    let trace_path = args
        .get_one::<PathBuf>("TRACE")
        .ok_or_else(|| anyhow!("A page trace is required"))?;
    let trace = load_trace(trace_path)?;
    let analysis = network_analyzer::analyze(&trace.records)
        .ok_or_else(|| anyhow!("No measurable requests in {}", trace_path.display()))?;

    match args.get_one::<String>("format").map(String::as_str) {
        Some("json") => println!("{}", serde_json::to_string_pretty(&analysis)?),
        _ => print!("{}", format_analysis(&analysis)),
    }
    Ok(())
}

/// Human readable network analysis.
pub fn format_analysis(analysis: &NetworkAnalysis) -> String {
    let mut out = String::new();
    out.push_str(&format!("{}\n", "═".repeat(60)));
    out.push_str("  NETWORK ANALYSIS\n");
    out.push_str(&format!("{}\n\n", "═".repeat(60)));
    out.push_str(&format!("RTT:          {:.1} ms\n", analysis.rtt));
    if analysis.throughput.is_finite() {
        out.push_str(&format!(
            "Throughput:   {:.1} Kbps\n",
            analysis.throughput / 1024.0
        ));
    } else {
        out.push_str("Throughput:   unmeasured\n");
    }
    out.push('\n');

    for (origin, summary) in &analysis.rtt_by_origin {
        let additional = analysis
            .additional_rtt_by_origin
            .get(origin)
            .copied()
            .unwrap_or(0.0);
        let server = analysis
            .server_response_time_by_origin
            .get(origin)
            .map(|ms| format!("{:.1} ms", ms))
            .unwrap_or_else(|| "-".to_string());
        out.push_str(&format!("  {}\n", origin));
        out.push_str(&format!(
            "    rtt {:.1} ms (+{:.1}), {} samples, server response {}\n",
            summary.min, additional, summary.samples, server
        ));
    }
    out
}

pub fn handle_presets() {
    println!("{}", "═".repeat(60).bright_blue().bold());
    println!("{}", "  THROTTLING PRESETS".bright_white().bold());
    println!("{}", "═".repeat(60).bright_blue().bold());
    for preset in Settings::presets() {
        println!();
        println!("{} {}", "→".blue(), preset.name.bright_white().bold());
        println!("    {}", preset.description);
        println!(
            "    rtt {} ms, throughput {} Kbps, cpu x{}",
            preset.rtt_ms, preset.throughput_kbps, preset.cpu_slowdown_multiplier
        );
        println!(
            "    devtools: latency {} ms, down {} Kbps, up {} Kbps",
            preset.request_latency_ms, preset.download_throughput_kbps, preset.upload_throughput_kbps
        );
    }
}
