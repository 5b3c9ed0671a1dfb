//! Throttling settings and the presets used for simulated runs.
//!
//! Settings are validated here, at construction, so the simulator can
//! assume non-negative finite inputs.

use crate::error::SettingsError;
use crate::network_analyzer::NetworkAnalysis;
use crate::simulator::{DEFAULT_RTT, DEFAULT_THROUGHPUT, SimulatorOptions};
use serde::{Deserialize, Serialize};

/// DevTools request latency is measured end to end; this converts it back
/// to a round trip.
pub const DEVTOOLS_RTT_ADJUSTMENT_FACTOR: f64 = 3.75;
/// DevTools throughput throttling only reaches about 90% of its target.
pub const DEVTOOLS_THROUGHPUT_ADJUSTMENT_FACTOR: f64 = 0.9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThrottlingMethod {
    /// Predict the load under the configured conditions.
    #[default]
    Simulate,
    /// The page was loaded under the conditions of interest; replay as observed.
    Provided,
    /// The browser throttled the load itself.
    Devtools,
}

impl ThrottlingMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThrottlingMethod::Simulate => "simulate",
            ThrottlingMethod::Provided => "provided",
            ThrottlingMethod::Devtools => "devtools",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "simulate" => Some(ThrottlingMethod::Simulate),
            "provided" => Some(ThrottlingMethod::Provided),
            "devtools" => Some(ThrottlingMethod::Devtools),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThrottlingPreset {
    pub name: &'static str,
    pub description: &'static str,
    pub rtt_ms: f64,
    pub throughput_kbps: f64,
    pub request_latency_ms: f64,
    pub download_throughput_kbps: f64,
    pub upload_throughput_kbps: f64,
    pub cpu_slowdown_multiplier: f64,
}

pub const PRESETS: [ThrottlingPreset; 3] = [
    ThrottlingPreset {
        name: "mobile-slow-4g",
        description: "Slow 4G on a mid-tier phone",
        rtt_ms: 150.0,
        throughput_kbps: 1638.4,
        request_latency_ms: 562.5,
        download_throughput_kbps: 1474.56,
        upload_throughput_kbps: 675.0,
        cpu_slowdown_multiplier: 4.0,
    },
    ThrottlingPreset {
        name: "mobile-regular-3g",
        description: "Regular 3G on a mid-tier phone",
        rtt_ms: 300.0,
        throughput_kbps: 700.0,
        request_latency_ms: 1125.0,
        download_throughput_kbps: 630.0,
        upload_throughput_kbps: 630.0,
        cpu_slowdown_multiplier: 4.0,
    },
    ThrottlingPreset {
        name: "desktop-dense-4g",
        description: "Dense 4G on a desktop",
        rtt_ms: 40.0,
        throughput_kbps: 10240.0,
        request_latency_ms: 0.0,
        download_throughput_kbps: 0.0,
        upload_throughput_kbps: 0.0,
        cpu_slowdown_multiplier: 1.0,
    },
];

/// Throttling configuration, read from camelCase JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub throttling_method: ThrottlingMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rtt_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub throughput_kbps: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_slowdown_multiplier: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_latency_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_throughput_kbps: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upload_throughput_kbps: Option<f64>,
}

impl Settings {
    pub fn presets() -> &'static [ThrottlingPreset] {
        &PRESETS
    }

    pub fn preset(name: &str) -> Result<Self, SettingsError> {
        let preset = PRESETS
            .iter()
            .find(|preset| preset.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| SettingsError::UnknownPreset(name.to_string()))?;

        Ok(Self {
            throttling_method: ThrottlingMethod::Simulate,
            rtt_ms: Some(preset.rtt_ms),
            throughput_kbps: Some(preset.throughput_kbps),
            cpu_slowdown_multiplier: Some(preset.cpu_slowdown_multiplier),
            request_latency_ms: Some(preset.request_latency_ms),
            download_throughput_kbps: Some(preset.download_throughput_kbps),
            upload_throughput_kbps: Some(preset.upload_throughput_kbps),
        })
    }

    pub fn from_json(json: &str) -> Result<Self, SettingsError> {
        let settings: Settings =
            serde_json::from_str(json).map_err(|e| SettingsError::Parse(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Rejects negative or non-finite values. RTT, throughput and the CPU
    /// multiplier must also be strictly positive when given.
    pub fn validate(&self) -> Result<(), SettingsError> {
        let checks = [
            ("rttMs", self.rtt_ms, true),
            ("throughputKbps", self.throughput_kbps, true),
            ("cpuSlowdownMultiplier", self.cpu_slowdown_multiplier, true),
            ("requestLatencyMs", self.request_latency_ms, false),
            ("downloadThroughputKbps", self.download_throughput_kbps, false),
            ("uploadThroughputKbps", self.upload_throughput_kbps, false),
        ];

        for (name, value, strictly_positive) in checks {
            let Some(value) = value else {
                continue;
            };
            let in_range = if strictly_positive {
                value > 0.0
            } else {
                value >= 0.0
            };
            if !value.is_finite() || !in_range {
                return Err(SettingsError::InvalidValue { name, value });
            }
        }
        Ok(())
    }

    /// Resolves these settings into simulator options. Values not given
    /// fall back to the observed network conditions, then to defaults.
    pub fn simulator_options(
        &self,
        analysis: Option<&NetworkAnalysis>,
    ) -> Result<SimulatorOptions, SettingsError> {
        self.validate()?;

        let observed_rtt = analysis.map(|a| a.rtt);
        let observed_throughput = analysis.map(|a| a.throughput);
        let mut options = SimulatorOptions::default();

        match self.throttling_method {
            ThrottlingMethod::Simulate => {
                options.rtt = self.rtt_ms.or(observed_rtt).unwrap_or(DEFAULT_RTT);
                options.throughput = self
                    .throughput_kbps
                    .map(|kbps| kbps * 1024.0)
                    .or(observed_throughput)
                    .unwrap_or(DEFAULT_THROUGHPUT);
                options.cpu_slowdown_multiplier = self.cpu_slowdown_multiplier.unwrap_or(1.0);
            }
            ThrottlingMethod::Provided => {
                options.rtt = observed_rtt.unwrap_or(DEFAULT_RTT);
                options.throughput = observed_throughput.unwrap_or(DEFAULT_THROUGHPUT);
                options.cpu_slowdown_multiplier = 1.0;
                options.layout_task_multiplier = 1.0;
            }
            ThrottlingMethod::Devtools => {
                options.rtt = self
                    .request_latency_ms
                    .filter(|latency| *latency > 0.0)
                    .map(|latency| latency / DEVTOOLS_RTT_ADJUSTMENT_FACTOR)
                    .or(observed_rtt)
                    .unwrap_or(DEFAULT_RTT);
                options.throughput = self
                    .download_throughput_kbps
                    .filter(|kbps| *kbps > 0.0)
                    .map(|kbps| kbps * 1024.0 / DEVTOOLS_THROUGHPUT_ADJUSTMENT_FACTOR)
                    .or(observed_throughput)
                    .unwrap_or(DEFAULT_THROUGHPUT);
                options.cpu_slowdown_multiplier = 1.0;
                options.layout_task_multiplier = 1.0;
            }
        }

        // An observed RTT of zero (e.g. a loopback capture) cannot drive the model.
        if options.rtt <= 0.0 {
            options.rtt = DEFAULT_RTT;
        }

        if let Some(analysis) = analysis {
            options.additional_rtt_by_origin = analysis
                .additional_rtt_by_origin
                .iter()
                .map(|(origin, rtt)| (origin.clone(), *rtt))
                .collect();
            options.server_response_time_by_origin = analysis
                .server_response_time_by_origin
                .iter()
                .map(|(origin, time)| (origin.clone(), *time))
                .collect();
        }

        Ok(options)
    }
}
