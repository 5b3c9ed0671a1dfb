// Report generation from simulation results

use crate::metrics::MetricEstimate;
use crate::savings::Savings;
use lantern_sim::{DependencyGraph, SimulationResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::File;
use std::io::Write;
use std::path::Path;

const HEAVY_RULE: &str = "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportFormat {
    Text,
    Json,
    Csv,
    Markdown,
}

impl ReportFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "text" => Some(ReportFormat::Text),
            "json" => Some(ReportFormat::Json),
            "csv" => Some(ReportFormat::Csv),
            "markdown" | "md" => Some(ReportFormat::Markdown),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRow {
    pub id: String,
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub start_time: f64,
    pub end_time: f64,
    pub duration: f64,
    pub on_critical_path: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportData {
    pub label: String,
    pub time_in_ms: f64,
    pub nodes: Vec<NodeRow>,
    pub critical_path: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<Vec<MetricEstimate>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub savings: Option<Vec<Savings>>,
    pub generated_at: String,
}

pub fn gather_report_data(
    graph: &DependencyGraph,
    result: &SimulationResult,
    metrics: Option<Vec<MetricEstimate>>,
    savings: Option<Vec<Savings>>,
) -> ReportData {
    let critical_path = result.critical_path(graph);
    let on_path: HashSet<&str> = critical_path.iter().map(String::as_str).collect();

    let nodes = result
        .timings_by_start()
        .into_iter()
        .map(|(id, timing)| {
            let node = graph.node_by_id(id);
            NodeRow {
                id: id.to_string(),
                kind: node.map_or("unknown", |n| n.kind_name()).to_string(),
                url: node.and_then(|n| n.url()).map(str::to_string),
                start_time: timing.start_time,
                end_time: timing.end_time,
                duration: timing.duration,
                on_critical_path: on_path.contains(id),
            }
        })
        .collect();

    ReportData {
        label: result.label.clone(),
        time_in_ms: result.time_in_ms,
        nodes,
        critical_path,
        metrics,
        savings,
        generated_at: chrono::Utc::now().to_rfc3339(),
    }
}

pub fn generate_report(data: &ReportData, format: ReportFormat) -> Result<String, serde_json::Error> {
    match format {
        ReportFormat::Text => Ok(generate_text_report(data)),
        ReportFormat::Json => generate_json_report(data),
        ReportFormat::Csv => Ok(generate_csv_report(data)),
        ReportFormat::Markdown => Ok(generate_markdown_report(data)),
    }
}

pub fn generate_text_report(data: &ReportData) -> String {
    let mut report = String::new();

    report.push_str(HEAVY_RULE);
    report.push_str("                        LANTERN PAGE LOAD SIMULATION\n");
    report.push_str(HEAVY_RULE);
    report.push('\n');

    report.push_str(&format!("Simulation:   {}\n", data.label));
    report.push_str(&format!("Load Time:    {:.0} ms\n", data.time_in_ms));
    report.push_str(&format!("Nodes:        {}\n", data.nodes.len()));
    report.push_str(&format!("Generated:    {}\n", data.generated_at));
    report.push('\n');

    if let Some(ref metrics) = data.metrics {
        section(&mut report, "METRIC ESTIMATES");
        for metric in metrics {
            report.push_str(&format!(
                "  {:<24} {:>8.0} ms   (optimistic {:.0}, pessimistic {:.0})\n",
                metric.name, metric.timing, metric.optimistic_estimate, metric.pessimistic_estimate
            ));
        }
        report.push('\n');
    }

    if let Some(ref savings) = data.savings {
        section(&mut report, "WHAT-IF SAVINGS");
        for entry in savings {
            report.push_str(&format!(
                "  {:<14} {:>8.0} ms saved   ({:.0} ms -> {:.0} ms)\n",
                entry.scenario, entry.wasted_ms, entry.before_ms, entry.after_ms
            ));
            for (url, saved) in &entry.per_url {
                report.push_str(&format!("      {}  -{:.0} ms\n", display_url(url), saved));
            }
        }
        report.push('\n');
    }

    section(&mut report, "CRITICAL PATH");
    for (idx, id) in data.critical_path.iter().enumerate() {
        let prefix = if idx + 1 == data.critical_path.len() { "└── " } else { "├── " };
        let label = data
            .nodes
            .iter()
            .find(|row| &row.id == id)
            .and_then(|row| row.url.as_deref())
            .map(display_url)
            .unwrap_or_else(|| id.clone());
        report.push_str(&format!("{}{}\n", prefix, label));
    }
    report.push('\n');

    section(&mut report, "TIMELINE");
    for row in &data.nodes {
        let marker = if row.on_critical_path { "*" } else { " " };
        let label = row.url.as_deref().map(display_url).unwrap_or_else(|| row.id.clone());
        report.push_str(&format!(
            "{} {:>8.0} {:>8.0} {:>8.0}  {:<8} {}\n",
            marker, row.start_time, row.end_time, row.duration, row.kind, label
        ));
    }
    report.push('\n');

    report.push_str(HEAVY_RULE);
    report.push_str("                          End of Report\n");
    report.push_str(HEAVY_RULE);
    report.push_str("\n* marks nodes on the critical path. Times in ms.\n\n");

    report
}

pub fn generate_json_report(data: &ReportData) -> Result<String, serde_json::Error> {
    let json_report = serde_json::json!({
        "report": {
            "metadata": {
                "generator": "Lantern",
                "version": env!("CARGO_PKG_VERSION"),
                "generated_at": data.generated_at,
                "format": "json"
            },
            "simulation": {
                "label": data.label,
                "time_in_ms": data.time_in_ms,
                "node_count": data.nodes.len(),
                "critical_path": data.critical_path
            },
            "nodes": data.nodes,
            "metrics": data.metrics,
            "savings": data.savings
        }
    });

    serde_json::to_string_pretty(&json_report)
}

pub fn generate_csv_report(data: &ReportData) -> String {
    let mut report = String::from("id,kind,url,start_time,end_time,duration,on_critical_path\n");
    for row in &data.nodes {
        report.push_str(&format!(
            "{},{},{},{:.3},{:.3},{:.3},{}\n",
            csv_field(&row.id),
            row.kind,
            csv_field(row.url.as_deref().unwrap_or("")),
            row.start_time,
            row.end_time,
            row.duration,
            row.on_critical_path
        ));
    }
    report
}

pub fn generate_markdown_report(data: &ReportData) -> String {
    let mut report = String::new();
    report.push_str(&format!("# Lantern simulation: {}\n\n", data.label));
    report.push_str(&format!("- **Load time:** {:.0} ms\n", data.time_in_ms));
    report.push_str(&format!("- **Nodes:** {}\n", data.nodes.len()));
    report.push_str(&format!("- **Generated:** {}\n\n", data.generated_at));

    if let Some(ref metrics) = data.metrics {
        report.push_str("## Metrics\n\n");
        report.push_str("| Metric | Estimate (ms) | Optimistic | Pessimistic |\n");
        report.push_str("|---|---:|---:|---:|\n");
        for metric in metrics {
            report.push_str(&format!(
                "| {} | {:.0} | {:.0} | {:.0} |\n",
                metric.name, metric.timing, metric.optimistic_estimate, metric.pessimistic_estimate
            ));
        }
        report.push('\n');
    }

    if let Some(ref savings) = data.savings {
        report.push_str("## Savings\n\n");
        report.push_str("| Scenario | Before (ms) | After (ms) | Saved (ms) |\n");
        report.push_str("|---|---:|---:|---:|\n");
        for entry in savings {
            report.push_str(&format!(
                "| {} | {:.0} | {:.0} | {:.0} |\n",
                entry.scenario, entry.before_ms, entry.after_ms, entry.wasted_ms
            ));
        }
        report.push('\n');
    }

    report.push_str("## Timeline\n\n");
    report.push_str("| Node | Kind | Start | End | Duration | Critical |\n");
    report.push_str("|---|---|---:|---:|---:|:---:|\n");
    for row in &data.nodes {
        let label = row.url.as_deref().map(display_url).unwrap_or_else(|| row.id.clone());
        report.push_str(&format!(
            "| `{}` | {} | {:.0} | {:.0} | {:.0} | {} |\n",
            label,
            row.kind,
            row.start_time,
            row.end_time,
            row.duration,
            if row.on_critical_path { "✓" } else { "" }
        ));
    }

    report
}

pub fn save_report(content: &str, path: &Path) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(content.as_bytes())?;
    Ok(())
}

fn section(report: &mut String, title: &str) {
    report.push_str(HEAVY_RULE);
    report.push_str(title);
    report.push('\n');
    report.push_str(HEAVY_RULE);
    report.push('\n');
}

/// Host and path, without scheme or query.
fn display_url(raw: &str) -> String {
    match url::Url::parse(raw) {
        Ok(parsed) => match parsed.host_str() {
            Some(host) => format!("{}{}", host, parsed.path()),
            None => raw.to_string(),
        },
        Err(_) => raw.to_string(),
    }
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
