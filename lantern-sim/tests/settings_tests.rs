// Tests for throttling settings

use lantern_sim::network_analyzer::NetworkAnalysis;
use lantern_sim::simulator::{DEFAULT_RTT, DEFAULT_THROUGHPUT};
use lantern_sim::{SettingsError, Settings, Simulator, ThrottlingMethod};
use std::collections::BTreeMap;

fn observed() -> NetworkAnalysis {
    NetworkAnalysis {
        rtt: 80.0,
        throughput: 5_000_000.0,
        additional_rtt_by_origin: BTreeMap::from([("https://cdn.example.com".to_string(), 20.0)]),
        server_response_time_by_origin: BTreeMap::from([("https://example.com".to_string(), 45.0)]),
        rtt_by_origin: BTreeMap::new(),
        server_response_time_summary_by_origin: BTreeMap::new(),
    }
}

// ============================================================================
// Throttling Method Tests
// ============================================================================

#[test]
fn test_throttling_method_from_name() {
    assert_eq!(ThrottlingMethod::from_name("simulate"), Some(ThrottlingMethod::Simulate));
    assert_eq!(ThrottlingMethod::from_name("DevTools"), Some(ThrottlingMethod::Devtools));
    assert_eq!(ThrottlingMethod::from_name("provided"), Some(ThrottlingMethod::Provided));
    assert_eq!(ThrottlingMethod::from_name("fast"), None);
}

#[test]
fn test_default_method_is_simulate() {
    assert_eq!(Settings::default().throttling_method, ThrottlingMethod::Simulate);
}

// ============================================================================
// Preset Tests
// ============================================================================

#[test]
fn test_presets_listed() {
    let names: Vec<&str> = Settings::presets().iter().map(|p| p.name).collect();
    assert_eq!(names, vec!["mobile-slow-4g", "mobile-regular-3g", "desktop-dense-4g"]);
}

#[test]
fn test_mobile_slow_4g_preset() {
    let settings = Settings::preset("mobile-slow-4g").unwrap();
    assert_eq!(settings.rtt_ms, Some(150.0));
    assert_eq!(settings.throughput_kbps, Some(1638.4));
    assert_eq!(settings.request_latency_ms, Some(562.5));
    assert_eq!(settings.download_throughput_kbps, Some(1474.56));
    assert_eq!(settings.upload_throughput_kbps, Some(675.0));
    assert_eq!(settings.cpu_slowdown_multiplier, Some(4.0));
}

#[test]
fn test_unknown_preset() {
    assert_eq!(
        Settings::preset("dial-up"),
        Err(SettingsError::UnknownPreset("dial-up".to_string()))
    );
}

// ============================================================================
// JSON and Validation Tests
// ============================================================================

#[test]
fn test_settings_from_camel_case_json() {
    let json = r#"{
        "throttlingMethod": "devtools",
        "rttMs": 100,
        "throughputKbps": 2048,
        "cpuSlowdownMultiplier": 2,
        "requestLatencyMs": 375,
        "downloadThroughputKbps": 900,
        "uploadThroughputKbps": 300
    }"#;
    let settings = Settings::from_json(json).unwrap();
    assert_eq!(settings.throttling_method, ThrottlingMethod::Devtools);
    assert_eq!(settings.rtt_ms, Some(100.0));
    assert_eq!(settings.upload_throughput_kbps, Some(300.0));
}

#[test]
fn test_empty_json_uses_defaults() {
    let settings = Settings::from_json("{}").unwrap();
    assert_eq!(settings, Settings::default());
}

#[test]
fn test_malformed_json_rejected() {
    assert!(matches!(
        Settings::from_json("{\"rttMs\": "),
        Err(SettingsError::Parse(_))
    ));
}

#[test]
fn test_negative_values_rejected() {
    let json = r#"{"requestLatencyMs": -5}"#;
    assert_eq!(
        Settings::from_json(json),
        Err(SettingsError::InvalidValue {
            name: "requestLatencyMs",
            value: -5.0
        })
    );
}

#[test]
fn test_zero_rtt_rejected() {
    let settings = Settings {
        rtt_ms: Some(0.0),
        ..Default::default()
    };
    assert!(matches!(
        settings.validate(),
        Err(SettingsError::InvalidValue { name: "rttMs", .. })
    ));
}

#[test]
fn test_non_finite_values_rejected() {
    let settings = Settings {
        cpu_slowdown_multiplier: Some(f64::NAN),
        ..Default::default()
    };
    assert!(settings.validate().is_err());
}

// ============================================================================
// Simulator Option Resolution Tests
// ============================================================================

#[test]
fn test_simulate_method_uses_configured_values() {
    let settings = Settings::preset("mobile-regular-3g").unwrap();
    let options = settings.simulator_options(Some(&observed())).unwrap();
    assert_eq!(options.rtt, 300.0);
    assert_eq!(options.throughput, 700.0 * 1024.0);
    assert_eq!(options.cpu_slowdown_multiplier, 4.0);
    assert_eq!(options.layout_task_multiplier, 0.5);
    assert_eq!(options.additional_rtt_by_origin["https://cdn.example.com"], 20.0);
    assert_eq!(options.server_response_time_by_origin["https://example.com"], 45.0);
}

#[test]
fn test_simulate_method_falls_back_to_observed() {
    let options = Settings::default()
        .simulator_options(Some(&observed()))
        .unwrap();
    assert_eq!(options.rtt, 80.0);
    assert_eq!(options.throughput, 5_000_000.0);
    assert_eq!(options.cpu_slowdown_multiplier, 1.0);
}

#[test]
fn test_simulate_method_falls_back_to_defaults() {
    let options = Settings::default().simulator_options(None).unwrap();
    assert_eq!(options.rtt, DEFAULT_RTT);
    assert_eq!(options.throughput, DEFAULT_THROUGHPUT);
    assert!(options.additional_rtt_by_origin.is_empty());
}

#[test]
fn test_provided_method_replays_observed_conditions() {
    let settings = Settings {
        throttling_method: ThrottlingMethod::Provided,
        rtt_ms: Some(300.0),
        cpu_slowdown_multiplier: Some(4.0),
        ..Default::default()
    };
    let options = settings.simulator_options(Some(&observed())).unwrap();
    assert_eq!(options.rtt, 80.0);
    assert_eq!(options.cpu_slowdown_multiplier, 1.0);
    assert_eq!(options.layout_task_multiplier, 1.0);
}

#[test]
fn test_devtools_method_adjusts_latency_and_throughput() {
    let settings = Settings {
        throttling_method: ThrottlingMethod::Devtools,
        request_latency_ms: Some(375.0),
        download_throughput_kbps: Some(900.0),
        ..Default::default()
    };
    let options = settings.simulator_options(None).unwrap();
    assert_eq!(options.rtt, 100.0);
    assert!((options.throughput - 1024_000.0).abs() < 1e-6);
    assert_eq!(options.cpu_slowdown_multiplier, 1.0);
}

#[test]
fn test_devtools_without_values_uses_observed() {
    let settings = Settings {
        throttling_method: ThrottlingMethod::Devtools,
        ..Settings::preset("desktop-dense-4g").unwrap()
    };
    let options = settings.simulator_options(Some(&observed())).unwrap();
    assert_eq!(options.rtt, 80.0);
    assert_eq!(options.throughput, 5_000_000.0);
}

#[test]
fn test_resolved_options_build_a_simulator() {
    for preset in Settings::presets() {
        let options = Settings::preset(preset.name)
            .unwrap()
            .simulator_options(None)
            .unwrap();
        assert!(Simulator::new(options).is_ok());
    }
}
