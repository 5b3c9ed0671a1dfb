//! Metric estimators built on the simulator.
//!
//! Each metric simulates two subgraphs of the page graph: an optimistic one
//! holding only what most likely gated the metric, and a pessimistic one
//! holding everything that plausibly could have. The two results are
//! blended with per-metric coefficients.

use crate::error::{CoreError, Result};
use crate::trace::PageTrace;
use lantern_sim::{
    DependencyGraph, Node, NodeKind, RequestPriority, ResourceType, SimulateOptions,
    SimulationResult, Simulator,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

/// CPU tasks at least this long (simulated) count as long tasks.
pub const LONG_TASK_THRESHOLD: f64 = 50.0;
/// CPU tasks shorter than this are left out of the optimistic TTI graph.
pub const INTERACTIVE_MINIMUM_TASK_DURATION: f64 = 20.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coefficients {
    pub intercept: f64,
    pub optimistic: f64,
    pub pessimistic: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricEstimate {
    pub name: String,
    pub timing: f64,
    pub optimistic_estimate: f64,
    pub pessimistic_estimate: f64,
    pub optimistic_node_count: usize,
    pub pessimistic_node_count: usize,
}

pub trait Metric {
    fn name(&self) -> &'static str;

    fn coefficients(&self) -> Coefficients;

    fn optimistic_graph(&self, graph: &DependencyGraph, trace: &PageTrace) -> Result<DependencyGraph>;

    fn pessimistic_graph(&self, graph: &DependencyGraph, trace: &PageTrace) -> Result<DependencyGraph>;

    /// Reads the metric off a simulation of one of this metric's graphs.
    fn estimate_from_simulation(&self, result: &SimulationResult, _graph: &DependencyGraph) -> f64 {
        result.time_in_ms
    }

    fn estimate(
        &self,
        graph: &DependencyGraph,
        trace: &PageTrace,
        simulator: &Simulator,
    ) -> Result<MetricEstimate> {
        let optimistic_graph = self.optimistic_graph(graph, trace)?;
        let pessimistic_graph = self.pessimistic_graph(graph, trace)?;

        let optimistic_strict = simulator.simulate(
            &optimistic_graph,
            &SimulateOptions::labeled(format!("optimistic{}", self.name())),
        )?;
        let optimistic_flexible = simulator.simulate(
            &optimistic_graph,
            &SimulateOptions::labeled(format!("optimisticFlex{}", self.name()))
                .with_flexible_ordering(true),
        )?;
        let pessimistic = simulator.simulate(
            &pessimistic_graph,
            &SimulateOptions::labeled(format!("pessimistic{}", self.name())),
        )?;

        let optimistic_estimate = self
            .estimate_from_simulation(&optimistic_strict, &optimistic_graph)
            .min(self.estimate_from_simulation(&optimistic_flexible, &optimistic_graph));
        let pessimistic_estimate = self.estimate_from_simulation(&pessimistic, &pessimistic_graph);

        let coefficients = self.coefficients();
        let timing = coefficients.intercept
            + coefficients.optimistic * optimistic_estimate
            + coefficients.pessimistic * pessimistic_estimate;
        debug!(
            "{}: optimistic {:.0}ms, pessimistic {:.0}ms, estimate {:.0}ms",
            self.name(),
            optimistic_estimate,
            pessimistic_estimate,
            timing
        );

        Ok(MetricEstimate {
            name: self.name().to_string(),
            timing,
            optimistic_estimate,
            pessimistic_estimate,
            optimistic_node_count: optimistic_graph.len(),
            pessimistic_node_count: pessimistic_graph.len(),
        })
    }
}

fn network_start_before(node: &Node, cutoff: f64) -> bool {
    node.is_network() && node.start_time() < cutoff
}

fn is_low_priority_image(node: &Node) -> bool {
    node.as_network().is_some_and(|network| {
        network.record().resource_type == ResourceType::Image && network.priority().is_low()
    })
}

/// URLs of requests started before `cutoff` that `keep` accepts.
fn urls_started_before<F>(graph: &DependencyGraph, cutoff: f64, keep: F) -> HashSet<String>
where
    F: Fn(&Node) -> bool,
{
    graph
        .nodes()
        .filter(|(_, node)| network_start_before(node, cutoff) && keep(node))
        .filter_map(|(_, node)| node.url().map(str::to_string))
        .collect()
}

/// Graph cut at a paint: kept requests started before the paint, plus
/// tasks that finished before it and either evaluated a kept request or,
/// when `include_layout` is set, performed layout.
fn first_paint_based_graph<F>(
    graph: &DependencyGraph,
    cutoff: f64,
    keep_request: F,
    include_layout: bool,
) -> DependencyGraph
where
    F: Fn(&Node) -> bool,
{
    let kept_urls = urls_started_before(graph, cutoff, &keep_request);
    graph.clone_with_filter(|node| match node.kind() {
        NodeKind::Network(_) => network_start_before(node, cutoff) && keep_request(node),
        NodeKind::Cpu(task) => {
            task.end_time() <= cutoff
                && ((include_layout && task.did_perform_layout)
                    || task.attributable_urls.iter().any(|url| kept_urls.contains(url)))
        }
    })
}

fn require(timestamp: Option<f64>, name: &'static str) -> Result<f64> {
    timestamp.ok_or(CoreError::MissingTimestamp(name))
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FirstContentfulPaint;

impl Metric for FirstContentfulPaint {
    fn name(&self) -> &'static str {
        "FirstContentfulPaint"
    }

    fn coefficients(&self) -> Coefficients {
        Coefficients {
            intercept: 0.0,
            optimistic: 0.5,
            pessimistic: 0.5,
        }
    }

    fn optimistic_graph(&self, graph: &DependencyGraph, trace: &PageTrace) -> Result<DependencyGraph> {
        let cutoff = require(trace.timestamps.first_contentful_paint, "firstContentfulPaint")?;
        Ok(first_paint_based_graph(
            graph,
            cutoff,
            |node| {
                node.as_network()
                    .is_some_and(|network| network.record().has_render_blocking_priority())
            },
            false,
        ))
    }

    fn pessimistic_graph(&self, graph: &DependencyGraph, trace: &PageTrace) -> Result<DependencyGraph> {
        let cutoff = require(trace.timestamps.first_contentful_paint, "firstContentfulPaint")?;
        Ok(first_paint_based_graph(graph, cutoff, |_| true, true))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LargestContentfulPaint;

impl Metric for LargestContentfulPaint {
    fn name(&self) -> &'static str {
        "LargestContentfulPaint"
    }

    fn coefficients(&self) -> Coefficients {
        Coefficients {
            intercept: 0.0,
            optimistic: 0.5,
            pessimistic: 0.5,
        }
    }

    fn optimistic_graph(&self, graph: &DependencyGraph, trace: &PageTrace) -> Result<DependencyGraph> {
        let cutoff = require(trace.timestamps.largest_contentful_paint, "largestContentfulPaint")?;
        Ok(first_paint_based_graph(
            graph,
            cutoff,
            |node| !is_low_priority_image(node),
            false,
        ))
    }

    fn pessimistic_graph(&self, graph: &DependencyGraph, trace: &PageTrace) -> Result<DependencyGraph> {
        let cutoff = require(trace.timestamps.largest_contentful_paint, "largestContentfulPaint")?;
        Ok(first_paint_based_graph(graph, cutoff, |_| true, true))
    }

    /// Low priority images are off screen and cannot be the LCP element.
    fn estimate_from_simulation(&self, result: &SimulationResult, graph: &DependencyGraph) -> f64 {
        result
            .last_end_time_where(|id, _| {
                graph
                    .node_by_id(id)
                    .is_some_and(|node| !is_low_priority_image(node))
            })
            .unwrap_or(result.time_in_ms)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Interactive;

impl Metric for Interactive {
    fn name(&self) -> &'static str {
        "Interactive"
    }

    fn coefficients(&self) -> Coefficients {
        Coefficients {
            intercept: 0.0,
            optimistic: 0.45,
            pessimistic: 0.55,
        }
    }

    fn optimistic_graph(&self, graph: &DependencyGraph, _trace: &PageTrace) -> Result<DependencyGraph> {
        Ok(graph.clone_with_filter(|node| match node.kind() {
            NodeKind::Cpu(task) => task.duration > INTERACTIVE_MINIMUM_TASK_DURATION,
            NodeKind::Network(network) => {
                let record = network.record();
                record.resource_type != ResourceType::Image
                    && (record.resource_type == ResourceType::Script
                        || network.priority() >= RequestPriority::High)
            }
        }))
    }

    fn pessimistic_graph(&self, graph: &DependencyGraph, _trace: &PageTrace) -> Result<DependencyGraph> {
        Ok(graph.clone_with_relationships())
    }

    /// The page is interactive once the last long task has ended.
    fn estimate_from_simulation(&self, result: &SimulationResult, graph: &DependencyGraph) -> f64 {
        let last_long_task_end = result
            .last_end_time_where(|id, timing| {
                timing.duration >= LONG_TASK_THRESHOLD
                    && graph.node_by_id(id).is_some_and(Node::is_cpu)
            })
            .unwrap_or(0.0);
        result.time_in_ms.max(last_long_task_end)
    }
}

/// Estimates FCP, then LCP and TTI, neither of which may come before FCP.
/// A metric whose paint timestamp is missing from the trace is skipped.
pub fn estimate_metrics(
    graph: &DependencyGraph,
    trace: &PageTrace,
    simulator: &Simulator,
) -> Result<Vec<MetricEstimate>> {
    let mut estimates = Vec::new();

    let fcp = match FirstContentfulPaint.estimate(graph, trace, simulator) {
        Ok(estimate) => Some(estimate),
        Err(CoreError::MissingTimestamp(name)) => {
            debug!("Skipping FirstContentfulPaint: no {} timestamp", name);
            None
        }
        Err(e) => return Err(e),
    };
    let floor = fcp.as_ref().map_or(0.0, |estimate| estimate.timing);
    estimates.extend(fcp);

    let later_metrics: [&dyn Metric; 2] = [&LargestContentfulPaint, &Interactive];
    for metric in later_metrics {
        match metric.estimate(graph, trace, simulator) {
            Ok(mut estimate) => {
                estimate.timing = estimate.timing.max(floor);
                estimates.push(estimate);
            }
            Err(CoreError::MissingTimestamp(name)) => {
                debug!("Skipping {}: no {} timestamp", metric.name(), name);
            }
            Err(e) => return Err(e),
        }
    }

    Ok(estimates)
}
