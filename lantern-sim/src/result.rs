use crate::graph::DependencyGraph;
use crate::tcp_connection::ConnectionTiming;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeTiming {
    pub start_time: f64,
    pub end_time: f64,
    pub duration: f64,
    /// When every dependency had finished and the node became ready.
    pub queued_time: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_timing: Option<ConnectionTiming>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationResult {
    pub label: String,
    pub time_in_ms: f64,
    /// Timings keyed by node id, so results of a graph and of its clones
    /// can be compared node for node.
    pub node_timings: BTreeMap<String, NodeTiming>,
}

impl SimulationResult {
    pub fn timing(&self, id: &str) -> Option<&NodeTiming> {
        self.node_timings.get(id)
    }

    /// Timings ordered by simulated start, then end, then id.
    pub fn timings_by_start(&self) -> Vec<(&str, &NodeTiming)> {
        let mut timings: Vec<(&str, &NodeTiming)> = self
            .node_timings
            .iter()
            .map(|(id, timing)| (id.as_str(), timing))
            .collect();
        timings.sort_by(|(a_id, a), (b_id, b)| {
            a.start_time
                .total_cmp(&b.start_time)
                .then_with(|| a.end_time.total_cmp(&b.end_time))
                .then_with(|| a_id.cmp(b_id))
        });
        timings
    }

    /// Latest end time among nodes accepted by `predicate`.
    pub fn last_end_time_where<P>(&self, predicate: P) -> Option<f64>
    where
        P: Fn(&str, &NodeTiming) -> bool,
    {
        self.node_timings
            .iter()
            .filter(|(id, timing)| predicate(id, timing))
            .map(|(_, timing)| timing.end_time)
            .reduce(f64::max)
    }

    /// Chain of node ids, root first, that determined the finish time:
    /// starting at the last node to finish, repeatedly step to the
    /// dependency that finished latest.
    pub fn critical_path(&self, graph: &DependencyGraph) -> Vec<String> {
        let last = self
            .node_timings
            .iter()
            .max_by(|(a_id, a), (b_id, b)| {
                a.end_time
                    .total_cmp(&b.end_time)
                    .then_with(|| b_id.cmp(a_id))
            })
            .map(|(id, _)| id.clone());

        let mut path = Vec::new();
        let mut seen = HashSet::new();
        let mut current = last;
        while let Some(id) = current.take() {
            if !seen.insert(id.clone()) {
                break;
            }
            if let Some(index) = graph.index_of(&id) {
                current = graph
                    .dependencies(index)
                    .into_iter()
                    .filter_map(|dependency| {
                        let dependency_id = graph[dependency].id();
                        self.timing(dependency_id)
                            .map(|timing| (dependency_id, timing.end_time))
                    })
                    .max_by(|(_, a), (_, b)| a.total_cmp(b))
                    .map(|(dependency_id, _)| dependency_id.to_string());
            }
            path.push(id);
        }
        path.reverse();
        path
    }
}
