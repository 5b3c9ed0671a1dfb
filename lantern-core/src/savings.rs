// What-if savings estimators
//
// Each scenario simulates the page graph as observed and a mutated clone
// of it, then reports the time the change would have saved.

use crate::error::{CoreError, Result};
use lantern_sim::{DependencyGraph, NodeIndex, SimulateOptions, SimulationResult, Simulator};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Origins need at least this many HTTP/1.1 requests before upgrading
/// them to HTTP/2 is worth estimating.
pub const HTTP2_MINIMUM_REQUESTS_PER_ORIGIN: usize = 6;

/// Time saved rounded to the nearest 10 ms, never negative.
pub fn wasted_ms(before_ms: f64, after_ms: f64) -> f64 {
    ((before_ms - after_ms).max(0.0) / 10.0).round() * 10.0
}

#[derive(Debug, Clone, PartialEq)]
pub enum Scenario {
    /// Transfer sizes reduced by the given bytes per URL.
    WastedBytes(BTreeMap<String, u64>),
    /// Requests fetched as soon as the main document arrives.
    Preload(Vec<String>),
    /// HTTP/1.1 origins served over HTTP/2.
    Http2,
    /// Requests that download nothing.
    Remove(Vec<String>),
}

impl Scenario {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scenario::WastedBytes(_) => "wasted-bytes",
            Scenario::Preload(_) => "preload",
            Scenario::Http2 => "http2",
            Scenario::Remove(_) => "remove",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Savings {
    pub scenario: String,
    pub before_ms: f64,
    pub after_ms: f64,
    pub wasted_ms: f64,
    /// Per-URL end time improvement, where the scenario reports one.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub per_url: BTreeMap<String, f64>,
}

pub fn estimate_savings(
    graph: &DependencyGraph,
    simulator: &Simulator,
    scenario: &Scenario,
) -> Result<Savings> {
    match scenario {
        Scenario::WastedBytes(wasted_bytes) => estimate_byte_savings(graph, simulator, wasted_bytes),
        Scenario::Preload(urls) => estimate_preload_savings(graph, simulator, urls),
        Scenario::Http2 => estimate_http2_savings(graph, simulator),
        Scenario::Remove(urls) => estimate_removal_savings(graph, simulator, urls),
    }
}

fn network_indices_for(graph: &DependencyGraph, url: &str) -> Result<Vec<NodeIndex>> {
    let indices: Vec<NodeIndex> = graph
        .network_nodes()
        .filter(|(_, network)| network.url() == url)
        .map(|(index, _)| index)
        .collect();
    if indices.is_empty() {
        return Err(CoreError::UnknownUrl(url.to_string()));
    }
    Ok(indices)
}

fn compare(
    scenario: &Scenario,
    simulator: &Simulator,
    before: &DependencyGraph,
    after: &DependencyGraph,
    flexible_ordering: bool,
) -> Result<(SimulationResult, SimulationResult)> {
    let name = scenario.as_str();
    let before_result = simulator.simulate(
        before,
        &SimulateOptions::labeled(format!("{}-before", name)).with_flexible_ordering(flexible_ordering),
    )?;
    let after_result = simulator.simulate(
        after,
        &SimulateOptions::labeled(format!("{}-after", name)).with_flexible_ordering(flexible_ordering),
    )?;
    debug!(
        "{}: {:.0}ms before, {:.0}ms after",
        name, before_result.time_in_ms, after_result.time_in_ms
    );
    Ok((before_result, after_result))
}

fn savings_from(scenario: &Scenario, before_ms: f64, after_ms: f64) -> Savings {
    Savings {
        scenario: scenario.as_str().to_string(),
        before_ms,
        after_ms,
        wasted_ms: wasted_ms(before_ms, after_ms),
        per_url: BTreeMap::new(),
    }
}

pub fn estimate_byte_savings(
    graph: &DependencyGraph,
    simulator: &Simulator,
    wasted_bytes: &BTreeMap<String, u64>,
) -> Result<Savings> {
    let mut after = graph.clone_with_relationships();
    for (url, bytes) in wasted_bytes {
        for index in network_indices_for(&after, url)? {
            if let Some(network) = after.node_mut(index).and_then(|node| node.as_network_mut()) {
                let size = network
                    .transfer_size()
                    .or(network.record().resource_size)
                    .unwrap_or(0);
                network.set_transfer_size(size.saturating_sub(*bytes));
            }
        }
    }

    let scenario = Scenario::WastedBytes(wasted_bytes.clone());
    let (before, after) = compare(&scenario, simulator, graph, &after, false)?;
    Ok(savings_from(&scenario, before.time_in_ms, after.time_in_ms))
}

/// Preloaded requests lose their discovery chain: each depends only on
/// the main document. Both runs use flexible ordering so the preloaded
/// requests can jump the queue.
pub fn estimate_preload_savings(
    graph: &DependencyGraph,
    simulator: &Simulator,
    urls: &[String],
) -> Result<Savings> {
    let mut after = graph.clone_with_relationships();
    let root = after.root();
    for url in urls {
        for index in network_indices_for(&after, url)? {
            if index == root {
                continue;
            }
            after.remove_all_dependencies(index);
            after.add_dependency(index, root)?;
        }
    }

    let scenario = Scenario::Preload(urls.to_vec());
    let (before, after_result) = compare(&scenario, simulator, graph, &after, true)?;

    let mut per_url = BTreeMap::new();
    for url in urls {
        let mut saved: f64 = 0.0;
        for index in network_indices_for(&after, url)? {
            let id = after[index].id();
            if let (Some(b), Some(a)) = (before.timing(id), after_result.timing(id)) {
                saved = saved.max(b.end_time - a.end_time);
            }
        }
        per_url.insert(url.clone(), saved.max(0.0));
    }

    let mut savings = savings_from(&scenario, before.time_in_ms, after_result.time_in_ms);
    savings.per_url = per_url;
    Ok(savings)
}

pub fn estimate_http2_savings(graph: &DependencyGraph, simulator: &Simulator) -> Result<Savings> {
    let mut http1_by_origin: HashMap<String, Vec<NodeIndex>> = HashMap::new();
    for (index, network) in graph.network_nodes() {
        if network.record().protocol == "http/1.1" && !network.is_connectionless() {
            http1_by_origin
                .entry(network.origin().to_string())
                .or_default()
                .push(index);
        }
    }

    let mut after = graph.clone_with_relationships();
    for (origin, indices) in &http1_by_origin {
        if indices.len() < HTTP2_MINIMUM_REQUESTS_PER_ORIGIN {
            continue;
        }
        debug!("Upgrading {} requests on {} to h2", indices.len(), origin);
        for index in indices {
            let id = graph[*index].id();
            let Some(cloned) = after.index_of(id) else {
                continue;
            };
            if let Some(network) = after.node_mut(cloned).and_then(|node| node.as_network_mut()) {
                network.set_protocol("h2");
            }
        }
    }

    let scenario = Scenario::Http2;
    let (before, after) = compare(&scenario, simulator, graph, &after, false)?;
    Ok(savings_from(&scenario, before.time_in_ms, after.time_in_ms))
}

pub fn estimate_removal_savings(
    graph: &DependencyGraph,
    simulator: &Simulator,
    urls: &[String],
) -> Result<Savings> {
    let mut after = graph.clone_with_relationships();
    let root = after.root();
    for url in urls {
        for index in network_indices_for(&after, url)? {
            if index == root {
                continue;
            }
            if let Some(network) = after.node_mut(index).and_then(|node| node.as_network_mut()) {
                network.set_transfer_size(0);
            }
        }
    }

    let scenario = Scenario::Remove(urls.to_vec());
    let (before, after) = compare(&scenario, simulator, graph, &after, false)?;
    Ok(savings_from(&scenario, before.time_in_ms, after.time_in_ms))
}
