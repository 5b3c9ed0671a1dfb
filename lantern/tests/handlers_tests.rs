use lantern::handlers::*;
use lantern_core::savings::Scenario;
use lantern_core::{build_dependency_graph, PageTrace};
use lantern_sim::{SimulateOptions, ThrottlingMethod};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::NamedTempFile;

const TRACE_JSON: &str = r#"{
    "mainDocumentUrl": "https://example.com/",
    "records": [
        {
            "requestId": "1",
            "url": "https://example.com/",
            "protocol": "http/1.1",
            "resourceType": "Document",
            "priority": "VeryHigh",
            "transferSize": 12000,
            "startTime": 0,
            "endTime": 400,
            "timing": {
                "dnsStart": 0, "dnsEnd": 10,
                "connectStart": 10, "connectEnd": 110,
                "sslStart": 60, "sslEnd": 110,
                "sendStart": 111, "sendEnd": 112,
                "receiveHeadersEnd": 300
            }
        },
        {
            "requestId": "2",
            "url": "https://example.com/app.js?v=2",
            "protocol": "http/1.1",
            "resourceType": "Script",
            "priority": "High",
            "transferSize": 60000,
            "startTime": 420,
            "endTime": 800,
            "initiatorRequestId": "1"
        }
    ],
    "tasks": [
        {"startTime": 810, "duration": 90, "attributableUrls": ["https://example.com/app.js?v=2"]}
    ],
    "timestamps": {"firstContentfulPaint": 700, "largestContentfulPaint": 750}
}"#;

fn trace_file() -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "{}", TRACE_JSON).unwrap();
    file
}

fn savings_command() -> clap::Command {
    clap::Command::new("savings")
        .arg(clap::arg!(--"preload" <URL>).action(clap::ArgAction::Append))
        .arg(clap::arg!(--"http2").action(clap::ArgAction::SetTrue))
        .arg(clap::arg!(--"wasted-bytes" <URL_EQ_BYTES>).action(clap::ArgAction::Append))
        .arg(clap::arg!(--"remove" <URL>).action(clap::ArgAction::Append))
}

// ============================================================================
// Argument Parsing Tests
// ============================================================================

#[test]
fn test_parse_wasted_bytes() {
    assert_eq!(
        parse_wasted_bytes("https://example.com/app.js=2048").unwrap(),
        ("https://example.com/app.js".to_string(), 2048)
    );
}

#[test]
fn test_parse_wasted_bytes_keeps_query_string() {
    assert_eq!(
        parse_wasted_bytes("https://example.com/app.js?v=2=100").unwrap(),
        ("https://example.com/app.js?v=2".to_string(), 100)
    );
}

#[test]
fn test_parse_wasted_bytes_invalid() {
    assert!(parse_wasted_bytes("https://example.com/app.js").is_err());
    assert!(parse_wasted_bytes("=100").is_err());
    assert!(parse_wasted_bytes("https://example.com/app.js=lots").is_err());
}

#[test]
fn test_scenarios_from_args() {
    let matches = savings_command().get_matches_from([
        "savings",
        "--preload",
        "https://example.com/a.js",
        "--preload",
        "https://example.com/b.js",
        "--http2",
        "--wasted-bytes",
        "https://example.com/a.js=100",
        "--wasted-bytes",
        "https://example.com/a.js=50",
    ]);
    let scenarios = scenarios_from_args(&matches).unwrap();
    assert_eq!(scenarios.len(), 3);
    assert_eq!(
        scenarios[0],
        Scenario::Preload(vec![
            "https://example.com/a.js".to_string(),
            "https://example.com/b.js".to_string()
        ])
    );
    assert_eq!(scenarios[1], Scenario::Http2);
    match &scenarios[2] {
        Scenario::WastedBytes(wasted) => assert_eq!(wasted["https://example.com/a.js"], 150),
        other => panic!("unexpected scenario {:?}", other),
    }
}

#[test]
fn test_scenarios_from_no_args() {
    let matches = savings_command().get_matches_from(["savings"]);
    assert!(scenarios_from_args(&matches).unwrap().is_empty());
}

// ============================================================================
// Loading Tests
// ============================================================================

#[test]
fn test_load_trace() {
    let file = trace_file();
    let trace = load_trace(file.path()).unwrap();
    assert_eq!(trace.records.len(), 2);
    assert_eq!(trace.tasks.len(), 1);
}

#[test]
fn test_load_trace_error_names_file() {
    let err = load_trace(&PathBuf::from("/nonexistent/trace.json")).unwrap_err();
    assert!(err.to_string().contains("/nonexistent/trace.json"));
}

#[test]
fn test_load_settings_preset() {
    let settings = load_settings(None, Some("desktop-dense-4g"), None).unwrap();
    assert_eq!(settings.rtt_ms, Some(40.0));
    assert_eq!(settings.throttling_method, ThrottlingMethod::Simulate);
}

#[test]
fn test_load_settings_defaults_to_mobile() {
    let settings = load_settings(None, None, None).unwrap();
    assert_eq!(settings.rtt_ms, Some(150.0));
}

#[test]
fn test_load_settings_file_and_method_override() -> Result<(), Box<dyn std::error::Error>> {
    let mut file = NamedTempFile::new()?;
    writeln!(file, r#"{{"rttMs": 90, "throughputKbps": 4096}}"#)?;
    let path = PathBuf::from(file.path());

    let settings = load_settings(Some(&path), Some("mobile-slow-4g"), Some("provided"))?;
    assert_eq!(settings.rtt_ms, Some(90.0));
    assert_eq!(settings.cpu_slowdown_multiplier, None);
    assert_eq!(settings.throttling_method, ThrottlingMethod::Provided);
    Ok(())
}

#[test]
fn test_load_settings_rejects_unknowns() {
    assert!(load_settings(None, Some("dial-up"), None).is_err());
    assert!(load_settings(None, None, Some("turbo")).is_err());
}

#[test]
fn test_build_simulator_from_trace() {
    let trace = PageTrace::from_json(TRACE_JSON).unwrap();
    let settings = load_settings(None, Some("mobile-regular-3g"), None).unwrap();
    let simulator = build_simulator(&trace, &settings).unwrap();
    assert_eq!(simulator.rtt(), 300.0);
    assert_eq!(simulator.options().cpu_slowdown_multiplier, 4.0);
}

// ============================================================================
// Concurrent Runner Tests
// ============================================================================

#[tokio::test]
async fn test_run_simulations_concurrently() {
    let trace = PageTrace::from_json(TRACE_JSON).unwrap();
    let settings = load_settings(None, None, None).unwrap();
    let simulator = Arc::new(build_simulator(&trace, &settings).unwrap());
    let graph = Arc::new(build_dependency_graph(&trace).unwrap());

    let runs = vec![
        SimulateOptions::labeled("a"),
        SimulateOptions::labeled("b").with_flexible_ordering(true),
        SimulateOptions::labeled("c"),
    ];
    let results = run_simulations(graph, simulator, runs).await.unwrap();

    let labels: Vec<&str> = results.iter().map(|r| r.label.as_str()).collect();
    assert_eq!(labels, vec!["a", "b", "c"]);
    assert_eq!(results[0].time_in_ms, results[2].time_in_ms);
    assert_eq!(results[0].node_timings.len(), 3);
}

#[tokio::test]
async fn test_run_savings_reports_each_scenario() {
    let trace = PageTrace::from_json(TRACE_JSON).unwrap();
    let settings = load_settings(None, None, None).unwrap();
    let simulator = Arc::new(build_simulator(&trace, &settings).unwrap());
    let graph = Arc::new(build_dependency_graph(&trace).unwrap());

    let scenarios = vec![
        Scenario::Http2,
        Scenario::Remove(vec!["https://example.com/app.js?v=2".to_string()]),
    ];
    let savings = run_savings(graph, simulator, scenarios).await.unwrap();
    assert_eq!(savings.len(), 2);
    assert_eq!(savings[0].scenario, "http2");
    assert_eq!(savings[1].scenario, "remove");
    assert!(savings[1].after_ms < savings[1].before_ms);
}

#[tokio::test]
async fn test_run_savings_unknown_url() {
    let trace = PageTrace::from_json(TRACE_JSON).unwrap();
    let settings = load_settings(None, None, None).unwrap();
    let simulator = Arc::new(build_simulator(&trace, &settings).unwrap());
    let graph = Arc::new(build_dependency_graph(&trace).unwrap());

    let scenarios = vec![Scenario::Preload(vec!["https://example.com/nope.js".to_string()])];
    let err = run_savings(graph, simulator, scenarios).await.unwrap_err();
    assert!(err.to_string().contains("preload"));
}

// ============================================================================
// Output Tests
// ============================================================================

#[test]
fn test_write_output_to_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.txt").to_string_lossy().into_owned();
    write_output("report body", Some(&path)).unwrap();
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "report body");
}

#[test]
fn test_format_analysis() {
    let trace = PageTrace::from_json(TRACE_JSON).unwrap();
    let analysis = lantern_sim::network_analyzer::analyze(&trace.records).unwrap();
    let text = format_analysis(&analysis);
    assert!(text.contains("NETWORK ANALYSIS"));
    assert!(text.contains("https://example.com"));
}
