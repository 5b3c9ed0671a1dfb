// Tests for report generation functionality

use lantern_core::metrics::MetricEstimate;
use lantern_core::report::{
    gather_report_data, generate_csv_report, generate_json_report, generate_markdown_report,
    generate_report, generate_text_report, save_report, NodeRow, ReportData, ReportFormat,
};
use lantern_core::savings::Savings;
use lantern_sim::{
    CpuNode, DependencyGraph, NetworkRecord, Node, SimulateOptions, Simulator, SimulatorOptions,
};
use std::collections::BTreeMap;

fn request(id: &str, url: &str, bytes: u64) -> Node {
    let mut record = NetworkRecord::new(id, url);
    record.transfer_size = Some(bytes);
    Node::network(record)
}

fn sample_graph() -> DependencyGraph {
    let mut graph = DependencyGraph::new(request("doc", "https://example.com/?q=1", 10_000));
    let root = graph.root();
    let script = graph
        .add_node(request("js", "https://example.com/app.js", 80_000))
        .unwrap();
    let image = graph
        .add_node(request("img", "https://example.com/logo.png", 2_000))
        .unwrap();
    let task = graph.add_node(Node::cpu("eval", CpuNode::new(0.0, 40.0))).unwrap();
    graph.add_dependency(script, root).unwrap();
    graph.add_dependency(image, root).unwrap();
    graph.add_dependency(task, script).unwrap();
    graph
}

fn sample_data() -> ReportData {
    let graph = sample_graph();
    let simulator = Simulator::new(SimulatorOptions::default()).unwrap();
    let result = simulator
        .simulate(&graph, &SimulateOptions::labeled("report"))
        .unwrap();
    gather_report_data(&graph, &result, None, None)
}

fn handmade_data() -> ReportData {
    ReportData {
        label: "handmade".to_string(),
        time_in_ms: 1234.4,
        nodes: vec![
            NodeRow {
                id: "1".to_string(),
                kind: "network".to_string(),
                url: Some("https://example.com/a,b.js".to_string()),
                start_time: 0.0,
                end_time: 600.0,
                duration: 600.0,
                on_critical_path: true,
            },
            NodeRow {
                id: "task".to_string(),
                kind: "cpu".to_string(),
                url: None,
                start_time: 600.0,
                end_time: 1234.4,
                duration: 634.4,
                on_critical_path: true,
            },
        ],
        critical_path: vec!["1".to_string(), "task".to_string()],
        metrics: Some(vec![MetricEstimate {
            name: "FirstContentfulPaint".to_string(),
            timing: 900.0,
            optimistic_estimate: 800.0,
            pessimistic_estimate: 1000.0,
            optimistic_node_count: 2,
            pessimistic_node_count: 2,
        }]),
        savings: Some(vec![Savings {
            scenario: "preload".to_string(),
            before_ms: 1234.4,
            after_ms: 1000.0,
            wasted_ms: 230.0,
            per_url: BTreeMap::from([("https://example.com/a,b.js".to_string(), 234.4)]),
        }]),
        generated_at: "2026-01-01T00:00:00+00:00".to_string(),
    }
}

// ============================================================================
// Report Format Tests
// ============================================================================

#[test]
fn test_report_format_from_str() {
    assert_eq!(ReportFormat::from_str("text"), Some(ReportFormat::Text));
    assert_eq!(ReportFormat::from_str("json"), Some(ReportFormat::Json));
    assert_eq!(ReportFormat::from_str("csv"), Some(ReportFormat::Csv));
    assert_eq!(ReportFormat::from_str("markdown"), Some(ReportFormat::Markdown));
    assert_eq!(ReportFormat::from_str("md"), Some(ReportFormat::Markdown));
}

#[test]
fn test_report_format_from_str_case_insensitive() {
    assert_eq!(ReportFormat::from_str("TEXT"), Some(ReportFormat::Text));
    assert_eq!(ReportFormat::from_str("Json"), Some(ReportFormat::Json));
}

#[test]
fn test_report_format_from_str_invalid() {
    assert!(ReportFormat::from_str("html").is_none());
    assert!(ReportFormat::from_str("pdf").is_none());
}

// ============================================================================
// Report Data Tests
// ============================================================================

#[test]
fn test_gather_report_data() {
    let data = sample_data();
    assert_eq!(data.label, "report");
    assert_eq!(data.nodes.len(), 4);
    assert_eq!(data.nodes[0].id, "doc");
    assert_eq!(data.nodes[0].kind, "network");
    assert!(data.time_in_ms > 0.0);
    assert!(data.metrics.is_none());
    assert!(data.savings.is_none());
}

#[test]
fn test_critical_path_rows_flagged() {
    let data = sample_data();
    assert_eq!(data.critical_path.first().map(String::as_str), Some("doc"));
    for row in &data.nodes {
        assert_eq!(row.on_critical_path, data.critical_path.contains(&row.id));
    }
    let cpu = data.nodes.iter().find(|row| row.id == "eval").unwrap();
    assert_eq!(cpu.kind, "cpu");
    assert!(cpu.url.is_none());
}

// ============================================================================
// Rendering Tests
// ============================================================================

#[test]
fn test_text_report() {
    let report = generate_text_report(&handmade_data());
    assert!(report.contains("LANTERN PAGE LOAD SIMULATION"));
    assert!(report.contains("Simulation:   handmade"));
    assert!(report.contains("Load Time:    1234 ms"));
    assert!(report.contains("METRIC ESTIMATES"));
    assert!(report.contains("WHAT-IF SAVINGS"));
    assert!(report.contains("example.com/a,b.js"));
    assert!(report.contains("End of Report"));
}

#[test]
fn test_text_report_omits_empty_sections() {
    let report = generate_text_report(&sample_data());
    assert!(!report.contains("METRIC ESTIMATES"));
    assert!(!report.contains("WHAT-IF SAVINGS"));
    assert!(report.contains("CRITICAL PATH"));
    assert!(report.contains("example.com/\n") || report.contains("example.com/ "));
}

#[test]
fn test_json_report() {
    let json = generate_json_report(&handmade_data()).unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    let report = &value["report"];
    assert_eq!(report["metadata"]["generator"], "Lantern");
    assert_eq!(report["simulation"]["label"], "handmade");
    assert_eq!(report["simulation"]["node_count"], 2);
    assert_eq!(report["nodes"][1]["id"], "task");
    assert_eq!(report["metrics"][0]["optimisticEstimate"], 800.0);
    assert_eq!(report["savings"][0]["wastedMs"], 230.0);
}

#[test]
fn test_csv_report_quotes_fields() {
    let csv = generate_csv_report(&handmade_data());
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines[0], "id,kind,url,start_time,end_time,duration,on_critical_path");
    assert_eq!(
        lines[1],
        "1,network,\"https://example.com/a,b.js\",0.000,600.000,600.000,true"
    );
    assert_eq!(lines[2], "task,cpu,,600.000,1234.400,634.400,true");
}

#[test]
fn test_markdown_report() {
    let markdown = generate_markdown_report(&handmade_data());
    assert!(markdown.starts_with("# Lantern simulation: handmade"));
    assert!(markdown.contains("| FirstContentfulPaint | 900 | 800 | 1000 |"));
    assert!(markdown.contains("| preload | 1234 | 1000 | 230 |"));
    assert!(markdown.contains("| `task` | cpu |"));
}

#[test]
fn test_generate_report_dispatch() {
    let data = handmade_data();
    assert_eq!(
        generate_report(&data, ReportFormat::Csv).unwrap(),
        generate_csv_report(&data)
    );
    assert_eq!(
        generate_report(&data, ReportFormat::Text).unwrap(),
        generate_text_report(&data)
    );
}

#[test]
fn test_save_report() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("report.txt");
    save_report("hello", &path).unwrap();
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "hello");
}
