//! Discrete-event load simulator.
//!
//! Every `simulate` call builds its own run state (connection pool, DNS
//! cache, main-thread scheduler, timing maps), so one `Simulator` can be
//! shared by many concurrent runs over the same or cloned graphs.

use crate::connection_pool::{
    CONNECTIONS_PER_ORIGIN, ConnectionPool, ConnectionPoolOptions, DEFAULT_MAXIMUM_CONNECTIONS,
};
use crate::cpu::CpuScheduler;
use crate::dns_cache::DnsCache;
use crate::error::{GraphError, Result, SimulationError};
use crate::graph::{DependencyGraph, NetworkNode, NodeKind};
use crate::result::{NodeTiming, SimulationResult};
use crate::tcp_connection::{ConnectionTiming, DownloadOptions, TcpConnection};
use petgraph::graph::NodeIndex;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, info, warn};

pub const DEFAULT_RTT: f64 = 150.0;
/// 1.6 Mbps, in bits per second.
pub const DEFAULT_THROUGHPUT: f64 = 1638.4 * 1024.0;
pub const DEFAULT_MAXIMUM_CONCURRENT_REQUESTS: usize = 10;
pub const DEFAULT_CPU_SLOWDOWN_MULTIPLIER: f64 = 4.0;
pub const DEFAULT_LAYOUT_TASK_MULTIPLIER: f64 = 0.5;

const BYTES_PER_MEGABYTE: f64 = 1024.0 * 1024.0;

#[derive(Debug, Clone, PartialEq)]
pub struct SimulatorOptions {
    pub rtt: f64,
    /// Bits per second.
    pub throughput: f64,
    pub maximum_concurrent_requests: usize,
    pub cpu_slowdown_multiplier: f64,
    pub layout_task_multiplier: f64,
    pub additional_rtt_by_origin: HashMap<String, f64>,
    pub server_response_time_by_origin: HashMap<String, f64>,
    pub connections_per_origin: usize,
    pub maximum_connections: usize,
}

impl Default for SimulatorOptions {
    fn default() -> Self {
        Self {
            rtt: DEFAULT_RTT,
            throughput: DEFAULT_THROUGHPUT,
            maximum_concurrent_requests: DEFAULT_MAXIMUM_CONCURRENT_REQUESTS,
            cpu_slowdown_multiplier: DEFAULT_CPU_SLOWDOWN_MULTIPLIER,
            layout_task_multiplier: DEFAULT_LAYOUT_TASK_MULTIPLIER,
            additional_rtt_by_origin: HashMap::new(),
            server_response_time_by_origin: HashMap::new(),
            connections_per_origin: CONNECTIONS_PER_ORIGIN,
            maximum_connections: DEFAULT_MAXIMUM_CONNECTIONS,
        }
    }
}

impl SimulatorOptions {
    pub fn validate(&self) -> Result<()> {
        let invalid = |message: String| -> Result<()> {
            Err(SimulationError::InvalidOptions(message))
        };

        if !(self.rtt.is_finite() && self.rtt > 0.0) {
            return invalid(format!("rtt must be positive and finite, got {}", self.rtt));
        }
        // Infinite throughput is allowed: it means "bandwidth never limits".
        if self.throughput.is_nan() || self.throughput <= 0.0 {
            return invalid(format!("throughput must be positive, got {}", self.throughput));
        }
        for (name, value) in [
            ("cpu_slowdown_multiplier", self.cpu_slowdown_multiplier),
            ("layout_task_multiplier", self.layout_task_multiplier),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return invalid(format!("{} must be positive and finite, got {}", name, value));
            }
        }
        if self.maximum_concurrent_requests == 0
            || self.connections_per_origin == 0
            || self.maximum_connections == 0
        {
            return invalid("concurrency limits must be at least 1".to_string());
        }
        for (origin, value) in self
            .additional_rtt_by_origin
            .iter()
            .chain(self.server_response_time_by_origin.iter())
        {
            if !(value.is_finite() && *value >= 0.0) {
                return invalid(format!("per-origin timing for {} must be >= 0, got {}", origin, value));
            }
        }
        Ok(())
    }
}

/// Per-call options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimulateOptions {
    pub label: Option<String>,
    /// Let ready requests start in the order that best shortens the
    /// critical path instead of their original start order.
    pub flexible_ordering: bool,
}

impl SimulateOptions {
    pub fn labeled(label: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
            flexible_ordering: false,
        }
    }

    pub fn with_flexible_ordering(mut self, flexible_ordering: bool) -> Self {
        self.flexible_ordering = flexible_ordering;
        self
    }
}

#[derive(Debug, Clone)]
pub struct Simulator {
    options: SimulatorOptions,
    maximum_concurrent_requests: usize,
}

impl Simulator {
    pub fn new(options: SimulatorOptions) -> Result<Self> {
        options.validate()?;
        let saturated =
            TcpConnection::maximum_saturated_connections(options.rtt, options.throughput);
        let maximum_concurrent_requests = saturated
            .min(options.maximum_concurrent_requests)
            .max(1);

        Ok(Self {
            options,
            maximum_concurrent_requests,
        })
    }

    pub fn options(&self) -> &SimulatorOptions {
        &self.options
    }

    pub fn rtt(&self) -> f64 {
        self.options.rtt
    }

    pub fn throughput(&self) -> f64 {
        self.options.throughput
    }

    /// Effective cap on simultaneously in-flight requests.
    pub fn maximum_concurrent_requests(&self) -> usize {
        self.maximum_concurrent_requests
    }

    /// Simulates loading `graph`. The graph is only read; the same graph
    /// and options always produce the same result.
    pub fn simulate(
        &self,
        graph: &DependencyGraph,
        options: &SimulateOptions,
    ) -> Result<SimulationResult> {
        let label = options
            .label
            .clone()
            .unwrap_or_else(|| "unlabeled".to_string());

        if let Some(node) = graph.find_cycle() {
            return Err(GraphError::Cycle(graph[node].id().to_string()).into());
        }

        info!(
            "Starting simulation '{}' over {} nodes ({} ordering)",
            label,
            graph.len(),
            if options.flexible_ordering { "flexible" } else { "strict" }
        );

        let run = SimulationRun::new(self, graph, label, options.flexible_ordering)?;
        let result = run.run()?;

        info!(
            "Simulation '{}' finished in {:.0}ms",
            result.label, result.time_in_ms
        );
        Ok(result)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeState {
    NotReadyToStart,
    ReadyToStart,
    InProgress,
    Complete,
}

#[derive(Debug, Clone, Copy, Default)]
struct RunningTiming {
    queued_time: f64,
    start_time: f64,
    time_elapsed: f64,
    time_elapsed_overshoot: f64,
    bytes_downloaded: f64,
    estimated_time_elapsed: f64,
}

struct SimulationRun<'a> {
    graph: &'a DependencyGraph,
    label: String,
    flexible_ordering: bool,
    maximum_concurrent_requests: usize,
    throughput: f64,
    pool: ConnectionPool,
    dns: DnsCache,
    cpu: CpuScheduler,
    states: HashMap<NodeIndex, NodeState>,
    ready: BTreeSet<NodeIndex>,
    in_progress: BTreeSet<NodeIndex>,
    requests_in_flight: usize,
    completed: usize,
    timings: HashMap<NodeIndex, RunningTiming>,
    finished: BTreeMap<String, NodeTiming>,
    critical_weights: HashMap<NodeIndex, f64>,
}

impl<'a> SimulationRun<'a> {
    fn new(
        simulator: &Simulator,
        graph: &'a DependencyGraph,
        label: String,
        flexible_ordering: bool,
    ) -> Result<Self> {
        let options = &simulator.options;
        let pool = ConnectionPool::new(ConnectionPoolOptions {
            rtt: options.rtt,
            throughput: options.throughput,
            additional_rtt_by_origin: options.additional_rtt_by_origin.clone(),
            server_response_time_by_origin: options.server_response_time_by_origin.clone(),
            connections_per_origin: options.connections_per_origin,
            maximum_connections: options.maximum_connections,
        })?;
        let cpu = CpuScheduler::for_graph(
            graph,
            options.cpu_slowdown_multiplier,
            options.layout_task_multiplier,
        );

        for (_, network) in graph.network_nodes() {
            let record = network.record();
            if record.transfer_size.is_none() && !network.is_connectionless() {
                warn!(
                    "Request {} has no transfer size, using {} bytes",
                    record.url,
                    record.resource_size.unwrap_or(0)
                );
            }
        }

        let critical_weights = if flexible_ordering {
            critical_weights(graph, &cpu)?
        } else {
            HashMap::new()
        };

        Ok(Self {
            graph,
            label,
            flexible_ordering,
            maximum_concurrent_requests: simulator.maximum_concurrent_requests,
            throughput: options.throughput,
            pool,
            dns: DnsCache::new(options.rtt),
            cpu,
            states: graph
                .nodes()
                .map(|(node, _)| (node, NodeState::NotReadyToStart))
                .collect(),
            ready: BTreeSet::new(),
            in_progress: BTreeSet::new(),
            requests_in_flight: 0,
            completed: 0,
            timings: HashMap::new(),
            finished: BTreeMap::new(),
            critical_weights,
        })
    }

    fn run(mut self) -> Result<SimulationResult> {
        let total = self.states.len();
        // Besides the root, requests and tasks recorded without a known
        // initiator start at time zero.
        for source in self.graph.sources() {
            self.mark_ready(source, 0.0);
        }

        let mut total_elapsed = 0.0;
        while !self.ready.is_empty() || !self.in_progress.is_empty() {
            self.start_ready_nodes(total_elapsed)?;
            if self.in_progress.is_empty() {
                return Err(self.stalled(total));
            }

            self.update_network_capacity()?;

            let step = self.next_completion_time()?;
            if !step.is_finite() {
                return Err(SimulationError::NonFiniteTime {
                    label: self.label.clone(),
                });
            }
            total_elapsed += step;

            let active: Vec<NodeIndex> = self.in_progress.iter().copied().collect();
            for node in active {
                self.update_progress(node, step, total_elapsed)?;
            }
        }

        if self.completed != total {
            return Err(self.stalled(total));
        }

        Ok(SimulationResult {
            label: self.label,
            time_in_ms: total_elapsed,
            node_timings: self.finished,
        })
    }

    fn stalled(&self, total: usize) -> SimulationError {
        SimulationError::Stalled {
            label: self.label.clone(),
            completed: self.completed,
            total,
        }
    }

    fn state(&self, node: NodeIndex) -> NodeState {
        self.states
            .get(&node)
            .copied()
            .unwrap_or(NodeState::NotReadyToStart)
    }

    fn mark_ready(&mut self, node: NodeIndex, at: f64) {
        self.states.insert(node, NodeState::ReadyToStart);
        self.ready.insert(node);
        self.timings.insert(
            node,
            RunningTiming {
                queued_time: at,
                ..Default::default()
            },
        );
    }

    fn mark_in_progress(&mut self, node: NodeIndex, at: f64) {
        debug!("t={:.1} start {}", at, self.graph[node].id());
        self.states.insert(node, NodeState::InProgress);
        self.ready.remove(&node);
        self.in_progress.insert(node);
        if let Some(timing) = self.timings.get_mut(&node) {
            timing.start_time = at;
        }
    }

    fn mark_complete(
        &mut self,
        node: NodeIndex,
        at: f64,
        connection_timing: Option<ConnectionTiming>,
    ) {
        let graph = self.graph;
        debug!("t={:.1} complete {}", at, graph[node].id());
        self.states.insert(node, NodeState::Complete);
        self.in_progress.remove(&node);
        self.completed += 1;

        let timing = self.timings.get(&node).copied().unwrap_or_default();
        self.finished.insert(
            graph[node].id().to_string(),
            NodeTiming {
                start_time: timing.start_time,
                end_time: at,
                duration: at - timing.start_time,
                queued_time: timing.queued_time,
                connection_timing,
            },
        );

        if graph[node].is_cpu() {
            self.cpu.finish(node);
        }

        for dependent in graph.dependents(node) {
            if self.state(dependent) != NodeState::NotReadyToStart {
                continue;
            }
            let satisfied = graph
                .dependencies(dependent)
                .into_iter()
                .all(|dependency| self.state(dependency) == NodeState::Complete);
            if satisfied {
                self.mark_ready(dependent, at);
            }
        }
    }

    fn start_ready_nodes(&mut self, at: f64) -> Result<()> {
        let graph = self.graph;

        let front_is_ready = self
            .cpu
            .next_in_line()
            .is_some_and(|next| self.ready.contains(&next));
        if front_is_ready {
            if let Some(next) = self.cpu.start_next() {
                self.mark_in_progress(next, at);
            }
        }

        for node in self.ready_requests_in_order() {
            let Some(network) = graph[node].as_network() else {
                continue;
            };
            if network.is_connectionless() {
                self.mark_in_progress(node, at);
                continue;
            }
            if self.requests_in_flight >= self.maximum_concurrent_requests {
                continue;
            }
            if self.pool.acquire(node, network).is_none() {
                debug!("t={:.1} no connection for {}, waiting", at, network.url());
                continue;
            }
            self.requests_in_flight += 1;
            self.mark_in_progress(node, at);
        }

        Ok(())
    }

    /// Ready network nodes in the order they should try to start.
    fn ready_requests_in_order(&self) -> Vec<NodeIndex> {
        let graph = self.graph;
        let mut requests: Vec<NodeIndex> = self
            .ready
            .iter()
            .copied()
            .filter(|&node| graph[node].is_network())
            .collect();

        let by_original_start = |a: &NodeIndex, b: &NodeIndex| -> Ordering {
            graph[*a]
                .start_time()
                .total_cmp(&graph[*b].start_time())
                .then_with(|| a.cmp(b))
        };

        if self.flexible_ordering {
            let priority = |node: NodeIndex| graph[node].as_network().map(|n| n.priority());
            let weight = |node: NodeIndex| self.critical_weights.get(&node).copied().unwrap_or(0.0);
            requests.sort_by(|a, b| {
                priority(*b)
                    .cmp(&priority(*a))
                    .then_with(|| weight(*b).total_cmp(&weight(*a)))
                    .then_with(|| by_original_start(a, b))
            });
        } else {
            requests.sort_by(by_original_start);
        }
        requests
    }

    /// Splits the available bandwidth across in-flight requests. A request
    /// never gets more than it can use before its response is complete;
    /// what it leaves is shared among the others.
    fn update_network_capacity(&mut self) -> Result<()> {
        let graph = self.graph;
        let mut requests = Vec::with_capacity(self.requests_in_flight);
        let mut demands = Vec::with_capacity(self.requests_in_flight);
        for &node in &self.in_progress {
            let Some(network) = graph[node].as_network() else {
                continue;
            };
            if network.is_connectionless() {
                continue;
            }
            let downloaded = self.timings.get(&node).map_or(0.0, |timing| timing.bytes_downloaded);
            let connection = self.pool.active_connection(node)?;
            requests.push(node);
            demands.push(connection.throughput_demand(bytes_to_download(network) - downloaded));
        }

        let shares = if self.throughput.is_finite() {
            max_min_fair_shares(self.throughput, &demands)
        } else {
            vec![self.throughput; requests.len()]
        };
        for (node, share) in requests.into_iter().zip(shares) {
            self.pool.active_connection_mut(node)?.set_throughput(share);
        }
        Ok(())
    }

    fn next_completion_time(&mut self) -> Result<f64> {
        let active: Vec<NodeIndex> = self.in_progress.iter().copied().collect();
        let mut minimum = f64::INFINITY;
        for node in active {
            minimum = minimum.min(self.estimate_time_remaining(node)?);
        }
        Ok(minimum)
    }

    fn estimate_time_remaining(&mut self, node: NodeIndex) -> Result<f64> {
        let graph = self.graph;
        let timing = self.timings.get(&node).copied().unwrap_or_default();

        let estimate = match graph[node].kind() {
            NodeKind::Cpu(task) => self.cpu.estimate_duration(task) - timing.time_elapsed,
            NodeKind::Network(network) if network.is_connectionless() => {
                connectionless_duration(network) - timing.time_elapsed
            }
            NodeKind::Network(network) => {
                let dns_resolution_time =
                    self.dns
                        .time_until_resolution(network.host(), timing.start_time, true);
                let connection = self.pool.active_connection(node)?;
                let download = connection.simulate_download_until(
                    bytes_to_download(network) - timing.bytes_downloaded,
                    DownloadOptions {
                        time_already_elapsed: timing.time_elapsed,
                        maximum_time_to_elapse: f64::INFINITY,
                        dns_resolution_time,
                    },
                );
                download.time_elapsed + timing.time_elapsed_overshoot
            }
        };

        if let Some(timing) = self.timings.get_mut(&node) {
            timing.estimated_time_elapsed = estimate;
        }
        Ok(estimate)
    }

    fn update_progress(&mut self, node: NodeIndex, step: f64, total_elapsed: f64) -> Result<()> {
        let graph = self.graph;
        let timing = self.timings.get(&node).copied().unwrap_or_default();
        let is_finished = timing.estimated_time_elapsed == step;

        let network = match graph[node].kind() {
            NodeKind::Network(network) if !network.is_connectionless() => network,
            _ => {
                if is_finished {
                    self.mark_complete(node, total_elapsed, None);
                } else if let Some(timing) = self.timings.get_mut(&node) {
                    timing.time_elapsed += step;
                }
                return Ok(());
            }
        };

        let dns_resolution_time =
            self.dns
                .time_until_resolution(network.host(), timing.start_time, true);
        let connection = self.pool.active_connection_mut(node)?;
        let download = connection.simulate_download_until(
            bytes_to_download(network) - timing.bytes_downloaded,
            DownloadOptions {
                time_already_elapsed: timing.time_elapsed,
                maximum_time_to_elapse: step - timing.time_elapsed_overshoot,
                dns_resolution_time,
            },
        );
        connection.set_congestion_window(download.congestion_window);
        connection.set_h2_overflow_bytes_downloaded(download.extra_bytes_downloaded);

        if is_finished {
            connection.set_warmed(true);
            self.pool.release(node)?;
            self.requests_in_flight = self.requests_in_flight.saturating_sub(1);
            self.mark_complete(node, total_elapsed, Some(download.connection_timing));
        } else if let Some(timing) = self.timings.get_mut(&node) {
            timing.time_elapsed += download.time_elapsed;
            timing.time_elapsed_overshoot += download.time_elapsed - step;
            timing.bytes_downloaded += download.bytes_downloaded;
        }
        Ok(())
    }
}

fn bytes_to_download(network: &NetworkNode) -> f64 {
    let record = network.record();
    record
        .transfer_size
        .or(record.resource_size)
        .unwrap_or(0) as f64
}

/// Cost of a request served without touching the network.
fn connectionless_duration(network: &NetworkNode) -> f64 {
    let size_in_megabytes = network.record().resource_size.unwrap_or(0) as f64 / BYTES_PER_MEGABYTE;
    if network.is_non_network_protocol() {
        2.0 + 10.0 * size_in_megabytes
    } else {
        8.0 + 20.0 * size_in_megabytes
    }
}

/// Water-fills `capacity` over `demands`: every demand below the fair
/// share is met in full and the rest split what remains evenly.
fn max_min_fair_shares(capacity: f64, demands: &[f64]) -> Vec<f64> {
    let mut by_demand: Vec<usize> = (0..demands.len()).collect();
    by_demand.sort_by(|&a, &b| demands[a].total_cmp(&demands[b]));

    let mut shares = vec![0.0; demands.len()];
    let mut remaining = capacity;
    for (position, &index) in by_demand.iter().enumerate() {
        let fair = remaining / (demands.len() - position) as f64;
        let share = demands[index].min(fair);
        shares[index] = share;
        remaining -= share;
    }
    shares
}

/// Longest observed chain of work hanging off each node, the node's own
/// cost included. Flexible ordering starts heavier chains first.
fn critical_weights(
    graph: &DependencyGraph,
    cpu: &CpuScheduler,
) -> Result<HashMap<NodeIndex, f64>> {
    let order = graph.topological_order()?;

    let mut weights = HashMap::with_capacity(order.len());
    for &node in order.iter().rev() {
        let own = match graph[node].kind() {
            NodeKind::Network(network) => network.record().observed_duration(),
            NodeKind::Cpu(task) => cpu.estimate_duration(task),
        };
        let downstream = graph
            .dependents(node)
            .into_iter()
            .filter_map(|dependent| weights.get(&dependent).copied())
            .fold(0.0, f64::max);
        weights.insert(node, own + downstream);
    }
    Ok(weights)
}
