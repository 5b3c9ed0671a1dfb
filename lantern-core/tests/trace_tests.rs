// Tests for page trace loading

use lantern_core::{load_page_trace, CoreError, PageTrace};
use lantern_sim::{RequestPriority, ResourceType};
use std::io::Write;
use tempfile::NamedTempFile;

const TRACE_JSON: &str = r#"{
    "mainDocumentUrl": "https://example.com/",
    "records": [
        {
            "requestId": "1",
            "url": "https://example.com/",
            "protocol": "h2",
            "resourceType": "Document",
            "priority": "VeryHigh",
            "transferSize": 14000,
            "startTime": 0,
            "endTime": 320,
            "timing": {
                "dnsStart": 0, "dnsEnd": 20,
                "connectStart": 20, "connectEnd": 120,
                "sslStart": 70, "sslEnd": 120,
                "sendStart": 121, "sendEnd": 122,
                "receiveHeadersEnd": 250
            }
        },
        {
            "requestId": "2",
            "url": "https://example.com/app.js",
            "resourceType": "Script",
            "priority": "High",
            "startTime": 330,
            "endTime": 500,
            "initiatorRequestId": "1"
        }
    ],
    "tasks": [
        {"startTime": 510, "duration": 80, "attributableUrls": ["https://example.com/app.js"]}
    ],
    "timestamps": {"firstContentfulPaint": 600}
}"#;

// ============================================================================
// Parsing Tests
// ============================================================================

#[test]
fn test_parse_trace() {
    let trace = PageTrace::from_json(TRACE_JSON).unwrap();
    assert_eq!(trace.records.len(), 2);
    assert_eq!(trace.tasks.len(), 1);
    assert_eq!(trace.timestamps.first_contentful_paint, Some(600.0));
    assert_eq!(trace.timestamps.largest_contentful_paint, None);

    let document = &trace.records[0];
    assert_eq!(document.resource_type, ResourceType::Document);
    assert_eq!(document.priority, RequestPriority::VeryHigh);
    assert_eq!(document.status_code, 200);
    assert_eq!(
        document.timing.as_ref().and_then(|t| t.time_to_first_byte()),
        Some(128.0)
    );

    let task = &trace.tasks[0];
    assert_eq!(task.end_time(), 590.0);
    assert!(!task.did_perform_layout);
    assert!(task.initiated_request_ids.is_empty());
}

#[test]
fn test_parse_minimal_trace() {
    let trace = PageTrace::from_json(r#"{"records": []}"#).unwrap();
    assert!(trace.records.is_empty());
    assert!(trace.tasks.is_empty());
    assert!(trace.main_document().is_none());
}

#[test]
fn test_parse_rejects_missing_records() {
    assert!(matches!(
        PageTrace::from_json("{}"),
        Err(CoreError::JsonError(_))
    ));
}

#[test]
fn test_main_document_by_url() {
    let trace = PageTrace::from_json(TRACE_JSON).unwrap();
    assert_eq!(trace.main_document().unwrap().request_id, "1");
}

#[test]
fn test_main_document_unmatched_url_uses_document() {
    let mut trace = PageTrace::from_json(TRACE_JSON).unwrap();
    trace.main_document_url = Some("https://elsewhere.com/".to_string());
    assert_eq!(trace.main_document().unwrap().request_id, "1");
}

#[test]
fn test_task_to_cpu_node() {
    let trace = PageTrace::from_json(TRACE_JSON).unwrap();
    let cpu = trace.tasks[0].to_cpu_node();
    assert_eq!(cpu.start_time, 510.0);
    assert_eq!(cpu.duration, 80.0);
    assert!(cpu.evaluates_script("https://example.com/app.js"));
}

// ============================================================================
// File Loading Tests
// ============================================================================

#[test]
fn test_load_page_trace_from_file() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "{}", TRACE_JSON).unwrap();

    let trace = load_page_trace(file.path()).unwrap();
    assert_eq!(trace.main_document_url.as_deref(), Some("https://example.com/"));
    assert_eq!(trace.records.len(), 2);
}

#[test]
fn test_load_page_trace_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let result = load_page_trace(&dir.path().join("missing.json"));
    assert!(matches!(result, Err(CoreError::IoError(_))));
}

#[test]
fn test_load_page_trace_invalid_json() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "not json").unwrap();
    assert!(matches!(
        load_page_trace(file.path()),
        Err(CoreError::JsonError(_))
    ));
}
