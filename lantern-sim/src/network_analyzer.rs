//! Derives network conditions from observed requests: round-trip time per
//! origin, server response time per origin, and achieved throughput.

use crate::record::{NetworkRecord, ResourceType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Share of a Document/XHR/Fetch TTFB assumed to be server think time.
const DYNAMIC_SERVER_RESPONSE_SHARE: f64 = 0.9;
/// Share of a static asset's TTFB assumed to be server think time.
const STATIC_SERVER_RESPONSE_SHARE: f64 = 0.4;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub min: f64,
    pub max: f64,
    pub avg: f64,
    pub median: f64,
    pub samples: usize,
}

impl Summary {
    pub fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);

        let len = sorted.len();
        let median = if len % 2 == 0 {
            (sorted[len / 2 - 1] + sorted[len / 2]) / 2.0
        } else {
            sorted[len / 2]
        };

        Some(Self {
            min: sorted[0],
            max: sorted[len - 1],
            avg: sorted.iter().sum::<f64>() / len as f64,
            median,
            samples: len,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkAnalysis {
    /// Baseline round-trip time: the fastest origin's minimum RTT.
    pub rtt: f64,
    /// Bits per second. Infinite when nothing measurable was downloaded.
    pub throughput: f64,
    pub additional_rtt_by_origin: BTreeMap<String, f64>,
    pub server_response_time_by_origin: BTreeMap<String, f64>,
    pub rtt_by_origin: BTreeMap<String, Summary>,
    pub server_response_time_summary_by_origin: BTreeMap<String, Summary>,
}

fn is_measurable(record: &NetworkRecord) -> bool {
    !record.is_non_network_protocol() && !record.failed && !record.is_cache_hit()
}

pub fn group_by_origin(records: &[NetworkRecord]) -> BTreeMap<String, Vec<&NetworkRecord>> {
    let mut groups: BTreeMap<String, Vec<&NetworkRecord>> = BTreeMap::new();
    for record in records {
        groups.entry(record.origin()).or_default().push(record);
    }
    groups
}

/// RTT samples taken from the TCP and TLS handshakes.
fn connection_rtt_samples(record: &NetworkRecord) -> Vec<f64> {
    let Some(timing) = record.timing.as_ref() else {
        return Vec::new();
    };
    if record.connection_reused {
        return Vec::new();
    }

    match (
        timing.connect_start,
        timing.connect_end,
        timing.ssl_start,
        timing.ssl_end,
    ) {
        (Some(connect_start), Some(connect_end), Some(ssl_start), Some(_))
            if ssl_start != connect_start =>
        {
            // TCP handshake, then a TLS handshake that takes one round trip.
            [ssl_start - connect_start, connect_end - ssl_start]
                .into_iter()
                .filter(|sample| *sample > 0.0)
                .collect()
        }
        (Some(connect_start), Some(connect_end), _, _) if connect_end > connect_start => {
            vec![connect_end - connect_start]
        }
        _ => Vec::new(),
    }
}

/// Rough RTT from TTFB with an assumed share of server think time removed.
fn coarse_rtt_sample(record: &NetworkRecord) -> Option<f64> {
    let ttfb = record.timing.as_ref()?.time_to_first_byte()?;
    let server_share = match record.resource_type {
        ResourceType::Document | ResourceType::Xhr | ResourceType::Fetch => {
            DYNAMIC_SERVER_RESPONSE_SHARE
        }
        _ => STATIC_SERVER_RESPONSE_SHARE,
    };
    let sample = ttfb * (1.0 - server_share);
    (sample > 0.0).then_some(sample)
}

pub fn estimate_rtt_by_origin(records: &[NetworkRecord]) -> BTreeMap<String, Summary> {
    let mut estimates = BTreeMap::new();
    for (origin, group) in group_by_origin(records) {
        let measurable: Vec<&NetworkRecord> =
            group.into_iter().filter(|r| is_measurable(r)).collect();

        let mut samples: Vec<f64> = measurable
            .iter()
            .flat_map(|record| connection_rtt_samples(record))
            .collect();
        if samples.is_empty() {
            samples = measurable
                .iter()
                .filter_map(|record| coarse_rtt_sample(record))
                .collect();
            if !samples.is_empty() {
                debug!("Using coarse TTFB-based RTT estimate for {}", origin);
            }
        }

        if let Some(summary) = Summary::from_values(&samples) {
            estimates.insert(origin, summary);
        }
    }
    estimates
}

/// Server think time per origin: TTFB minus the origin's round trip.
pub fn estimate_server_response_time_by_origin(
    records: &[NetworkRecord],
    rtt_by_origin: &BTreeMap<String, Summary>,
) -> BTreeMap<String, Summary> {
    let mut estimates = BTreeMap::new();
    for (origin, group) in group_by_origin(records) {
        let Some(rtt) = rtt_by_origin.get(&origin).map(|summary| summary.min) else {
            continue;
        };
        let samples: Vec<f64> = group
            .into_iter()
            .filter(|r| is_measurable(r))
            .filter_map(|record| record.timing.as_ref()?.time_to_first_byte())
            .map(|ttfb| (ttfb - rtt).max(0.0))
            .collect();
        if let Some(summary) = Summary::from_values(&samples) {
            estimates.insert(origin, summary);
        }
    }
    estimates
}

/// Bits per second over the time at least one response body was downloading.
pub fn estimate_throughput(records: &[NetworkRecord]) -> f64 {
    let mut total_bytes = 0u64;
    let mut intervals: Vec<(f64, f64)> = Vec::new();

    for record in records {
        if !is_measurable(record)
            || !(200..300).contains(&record.status_code)
            || record.end_time <= 0.0
        {
            continue;
        }
        let Some(bytes) = record.transfer_size else {
            continue;
        };
        let start = record.response_headers_end_time();
        if record.end_time < start {
            continue;
        }
        total_bytes += bytes;
        intervals.push((start, record.end_time));
    }

    intervals.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.total_cmp(&b.1)));
    let mut busy_time = 0.0;
    let mut current: Option<(f64, f64)> = None;
    for (start, end) in intervals {
        current = match current {
            Some((current_start, current_end)) if start <= current_end => {
                Some((current_start, current_end.max(end)))
            }
            Some((current_start, current_end)) => {
                busy_time += current_end - current_start;
                Some((start, end))
            }
            None => Some((start, end)),
        };
    }
    if let Some((start, end)) = current {
        busy_time += end - start;
    }

    if busy_time <= 0.0 {
        return f64::INFINITY;
    }
    (total_bytes as f64 * 8.0) / (busy_time / 1000.0)
}

/// Full analysis, or `None` when no request yields an RTT sample.
pub fn analyze(records: &[NetworkRecord]) -> Option<NetworkAnalysis> {
    let rtt_by_origin = estimate_rtt_by_origin(records);
    let rtt = rtt_by_origin
        .values()
        .map(|summary| summary.min)
        .reduce(f64::min)?;

    let additional_rtt_by_origin = rtt_by_origin
        .iter()
        .map(|(origin, summary)| (origin.clone(), summary.min - rtt))
        .collect();

    let server_response_time_summary_by_origin =
        estimate_server_response_time_by_origin(records, &rtt_by_origin);
    let server_response_time_by_origin = server_response_time_summary_by_origin
        .iter()
        .map(|(origin, summary)| (origin.clone(), summary.median))
        .collect();

    Some(NetworkAnalysis {
        rtt,
        throughput: estimate_throughput(records),
        additional_rtt_by_origin,
        server_response_time_by_origin,
        rtt_by_origin,
        server_response_time_summary_by_origin,
    })
}
