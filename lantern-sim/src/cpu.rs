//! Single main-thread model.
//!
//! At most one CPU node runs at a time and runs to completion. Tasks run in
//! one fixed line, decided before the run starts: original trace order,
//! except that a task never comes before one of its own ancestors. A task
//! at the front of the line that is not ready yet holds the thread idle
//! rather than letting a later task jump ahead, so only the absolute
//! timing of main-thread work changes, never its order.

use crate::graph::{CpuNode, DependencyGraph};
use petgraph::graph::NodeIndex;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, VecDeque};

/// Upper bound on the simulated length of a single task, in ms.
pub const DEFAULT_MAXIMUM_CPU_TASK_DURATION: f64 = 10_000.0;

#[derive(Debug, Clone)]
pub struct CpuScheduler {
    slowdown_multiplier: f64,
    layout_task_multiplier: f64,
    line: VecDeque<NodeIndex>,
    running: Option<NodeIndex>,
}

impl CpuScheduler {
    /// `layout_task_multiplier` is applied on top of the slowdown
    /// multiplier for tasks that performed layout.
    pub fn new(slowdown_multiplier: f64, layout_task_multiplier: f64) -> Self {
        Self {
            slowdown_multiplier,
            layout_task_multiplier: slowdown_multiplier * layout_task_multiplier,
            line: VecDeque::new(),
            running: None,
        }
    }

    /// Scheduler that runs `graph`'s tasks in [`main_thread_order`].
    pub fn for_graph(
        graph: &DependencyGraph,
        slowdown_multiplier: f64,
        layout_task_multiplier: f64,
    ) -> Self {
        let mut scheduler = Self::new(slowdown_multiplier, layout_task_multiplier);
        scheduler.line = main_thread_order(graph).into();
        scheduler
    }

    pub fn is_idle(&self) -> bool {
        self.running.is_none()
    }

    /// Task that runs next, once the thread is free and the task is ready.
    pub fn next_in_line(&self) -> Option<NodeIndex> {
        if !self.is_idle() {
            return None;
        }
        self.line.front().copied()
    }

    /// Claims the thread for the task at the front of the line.
    pub fn start_next(&mut self) -> Option<NodeIndex> {
        if !self.is_idle() {
            return None;
        }
        let next = self.line.pop_front()?;
        self.running = Some(next);
        Some(next)
    }

    pub fn finish(&mut self, node: NodeIndex) {
        if self.running == Some(node) {
            self.running = None;
        }
    }

    /// Simulated duration of `task` under the configured slowdown.
    pub fn estimate_duration(&self, task: &CpuNode) -> f64 {
        let multiplier = if task.did_perform_layout {
            self.layout_task_multiplier
        } else {
            self.slowdown_multiplier
        };
        (task.duration * multiplier)
            .round()
            .min(DEFAULT_MAXIMUM_CPU_TASK_DURATION)
            .max(0.0)
    }
}

#[derive(Debug, PartialEq)]
struct Pending {
    start_time: f64,
    index: NodeIndex,
}

impl Eq for Pending {}

impl Ord for Pending {
    // Reversed so the max-heap pops the earliest node first.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .start_time
            .total_cmp(&self.start_time)
            .then_with(|| other.index.cmp(&self.index))
    }
}

impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// CPU nodes in the order the main thread runs them.
///
/// A topological walk of the whole graph that always takes the available
/// node with the earliest original start. When trace order already agrees
/// with the dependencies this is plain trace order. Nodes on a cycle are
/// left out.
pub fn main_thread_order(graph: &DependencyGraph) -> Vec<NodeIndex> {
    let mut waiting_on: HashMap<NodeIndex, usize> = graph
        .nodes()
        .map(|(index, _)| (index, graph.dependencies(index).len()))
        .collect();
    let mut available: BinaryHeap<Pending> = waiting_on
        .iter()
        .filter(|&(_, &count)| count == 0)
        .map(|(&index, _)| Pending {
            start_time: graph[index].start_time(),
            index,
        })
        .collect();

    let mut order = Vec::new();
    while let Some(Pending { index, .. }) = available.pop() {
        if graph[index].is_cpu() {
            order.push(index);
        }
        for dependent in graph.dependents(index) {
            if let Some(count) = waiting_on.get_mut(&dependent) {
                *count -= 1;
                if *count == 0 {
                    available.push(Pending {
                        start_time: graph[dependent].start_time(),
                        index: dependent,
                    });
                }
            }
        }
    }
    order
}
