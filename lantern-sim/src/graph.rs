//! Page dependency graph.
//!
//! Nodes live in a single arena (`petgraph::graph::DiGraph`). Every
//! dependency is stored exactly once, as an edge pointing from the
//! dependency to its dependent; both neighbour sets are read off that one
//! edge list, so there is no second copy of the relationships to keep in
//! sync.

use crate::error::GraphError;
use crate::record::{NetworkRecord, RequestPriority};
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::ops::Index;

/// A network request node.
///
/// Origin, host and scheme facts are derived from the URL once, at
/// construction, and stay in sync because the URL cannot be changed.
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkNode {
    record: NetworkRecord,
    origin: String,
    host: String,
    secure: bool,
    non_network: bool,
}

impl NetworkNode {
    pub fn new(record: NetworkRecord) -> Self {
        let origin = record.origin();
        let host = record.host();
        let secure = record.is_secure();
        let non_network = record.is_non_network_protocol();
        Self {
            record,
            origin,
            host,
            secure,
            non_network,
        }
    }

    pub fn record(&self) -> &NetworkRecord {
        &self.record
    }

    pub fn url(&self) -> &str {
        &self.record.url
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn is_secure(&self) -> bool {
        self.secure
    }

    pub fn is_h2(&self) -> bool {
        self.record.is_h2()
    }

    pub fn is_non_network_protocol(&self) -> bool {
        self.non_network
    }

    /// Requests served without a socket: non-network schemes and cache hits.
    pub fn is_connectionless(&self) -> bool {
        self.non_network || self.record.is_cache_hit()
    }

    pub fn priority(&self) -> RequestPriority {
        self.record.priority
    }

    pub fn transfer_size(&self) -> Option<u64> {
        self.record.transfer_size
    }

    pub fn set_transfer_size(&mut self, bytes: u64) {
        self.record.transfer_size = Some(bytes);
    }

    pub fn set_protocol(&mut self, protocol: impl Into<String>) {
        self.record.protocol = protocol.into();
    }

    pub fn set_priority(&mut self, priority: RequestPriority) {
        self.record.priority = priority;
    }
}

/// One interval of main-thread work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CpuNode {
    pub start_time: f64,
    pub duration: f64,
    #[serde(default)]
    pub attributable_urls: Vec<String>,
    #[serde(default)]
    pub did_perform_layout: bool,
}

impl CpuNode {
    pub fn new(start_time: f64, duration: f64) -> Self {
        Self {
            start_time,
            duration,
            attributable_urls: Vec::new(),
            did_perform_layout: false,
        }
    }

    pub fn end_time(&self) -> f64 {
        self.start_time + self.duration
    }

    pub fn evaluates_script(&self, url: &str) -> bool {
        self.attributable_urls.iter().any(|u| u == url)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Network(NetworkNode),
    Cpu(CpuNode),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    id: String,
    kind: NodeKind,
}

impl Node {
    pub fn network(record: NetworkRecord) -> Self {
        Self {
            id: record.request_id.clone(),
            kind: NodeKind::Network(NetworkNode::new(record)),
        }
    }

    pub fn cpu(id: impl Into<String>, task: CpuNode) -> Self {
        Self {
            id: id.into(),
            kind: NodeKind::Cpu(task),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn as_network(&self) -> Option<&NetworkNode> {
        match &self.kind {
            NodeKind::Network(network) => Some(network),
            NodeKind::Cpu(_) => None,
        }
    }

    pub fn as_network_mut(&mut self) -> Option<&mut NetworkNode> {
        match &mut self.kind {
            NodeKind::Network(network) => Some(network),
            NodeKind::Cpu(_) => None,
        }
    }

    pub fn as_cpu(&self) -> Option<&CpuNode> {
        match &self.kind {
            NodeKind::Cpu(cpu) => Some(cpu),
            NodeKind::Network(_) => None,
        }
    }

    pub fn is_network(&self) -> bool {
        matches!(self.kind, NodeKind::Network(_))
    }

    pub fn is_cpu(&self) -> bool {
        matches!(self.kind, NodeKind::Cpu(_))
    }

    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            NodeKind::Network(_) => "network",
            NodeKind::Cpu(_) => "cpu",
        }
    }

    /// Observed start time in the original load.
    pub fn start_time(&self) -> f64 {
        match &self.kind {
            NodeKind::Network(network) => network.record.start_time,
            NodeKind::Cpu(cpu) => cpu.start_time,
        }
    }

    /// Observed end time in the original load.
    pub fn end_time(&self) -> f64 {
        match &self.kind {
            NodeKind::Network(network) => network.record.end_time,
            NodeKind::Cpu(cpu) => cpu.end_time(),
        }
    }

    pub fn url(&self) -> Option<&str> {
        self.as_network().map(|n| n.url())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraversalDirection {
    /// Follow edges towards the nodes that wait on the current one.
    Dependents,
    /// Follow edges towards the nodes the current one waits on.
    Dependencies,
}

impl TraversalDirection {
    fn as_petgraph(self) -> Direction {
        match self {
            TraversalDirection::Dependents => Direction::Outgoing,
            TraversalDirection::Dependencies => Direction::Incoming,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DependencyGraph {
    graph: DiGraph<Node, ()>,
    ids: HashMap<String, NodeIndex>,
    root: NodeIndex,
}

impl DependencyGraph {
    /// Creates a graph whose root is the main document request.
    pub fn new(root: Node) -> Self {
        let mut graph = DiGraph::new();
        let id = root.id.clone();
        let root = graph.add_node(root);
        let ids = HashMap::from([(id, root)]);
        Self { graph, ids, root }
    }

    pub fn root(&self) -> NodeIndex {
        self.root
    }

    pub fn main_document(&self) -> &Node {
        &self.graph[self.root]
    }

    pub fn add_node(&mut self, node: Node) -> Result<NodeIndex, GraphError> {
        if self.ids.contains_key(&node.id) {
            return Err(GraphError::DuplicateNode(node.id));
        }
        let id = node.id.clone();
        let index = self.graph.add_node(node);
        self.ids.insert(id, index);
        Ok(index)
    }

    /// Makes `node` wait for `dependency`. Adding an existing edge is a no-op.
    pub fn add_dependency(
        &mut self,
        node: NodeIndex,
        dependency: NodeIndex,
    ) -> Result<(), GraphError> {
        self.check_index(node)?;
        self.check_index(dependency)?;
        if node == dependency {
            return Err(GraphError::SelfDependency(self.graph[node].id.clone()));
        }
        if self.graph.find_edge(dependency, node).is_none() {
            self.graph.add_edge(dependency, node, ());
        }
        Ok(())
    }

    pub fn remove_dependency(&mut self, node: NodeIndex, dependency: NodeIndex) -> bool {
        match self.graph.find_edge(dependency, node) {
            Some(edge) => {
                self.graph.remove_edge(edge);
                true
            }
            None => false,
        }
    }

    pub fn remove_all_dependencies(&mut self, node: NodeIndex) {
        // Edge removal swaps indices, so look the next edge up each time.
        while let Some(edge) = self
            .graph
            .edges_directed(node, Direction::Incoming)
            .next()
            .map(|e| e.id())
        {
            self.graph.remove_edge(edge);
        }
    }

    pub fn dependencies(&self, node: NodeIndex) -> Vec<NodeIndex> {
        self.neighbors(node, TraversalDirection::Dependencies)
    }

    pub fn dependents(&self, node: NodeIndex) -> Vec<NodeIndex> {
        self.neighbors(node, TraversalDirection::Dependents)
    }

    fn neighbors(&self, node: NodeIndex, direction: TraversalDirection) -> Vec<NodeIndex> {
        let mut neighbors: Vec<NodeIndex> = self
            .graph
            .neighbors_directed(node, direction.as_petgraph())
            .collect();
        neighbors.sort();
        neighbors
    }

    fn check_index(&self, index: NodeIndex) -> Result<(), GraphError> {
        if self.graph.node_weight(index).is_some() {
            Ok(())
        } else {
            Err(GraphError::UnknownNode(format!("#{}", index.index())))
        }
    }

    pub fn node(&self, index: NodeIndex) -> Option<&Node> {
        self.graph.node_weight(index)
    }

    pub fn node_mut(&mut self, index: NodeIndex) -> Option<&mut Node> {
        self.graph.node_weight_mut(index)
    }

    pub fn index_of(&self, id: &str) -> Option<NodeIndex> {
        self.ids.get(id).copied()
    }

    pub fn node_by_id(&self, id: &str) -> Option<&Node> {
        self.index_of(id).map(|index| &self.graph[index])
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeIndex, &Node)> {
        self.graph
            .node_indices()
            .map(move |index| (index, &self.graph[index]))
    }

    pub fn network_nodes(&self) -> impl Iterator<Item = (NodeIndex, &NetworkNode)> {
        self.nodes()
            .filter_map(|(index, node)| node.as_network().map(|network| (index, network)))
    }

    pub fn cpu_nodes(&self) -> impl Iterator<Item = (NodeIndex, &CpuNode)> {
        self.nodes()
            .filter_map(|(index, node)| node.as_cpu().map(|cpu| (index, cpu)))
    }

    /// Visits every node reachable from the root through its dependents,
    /// breadth first, exactly once.
    pub fn traverse<F>(&self, visit: F)
    where
        F: FnMut(NodeIndex, &[NodeIndex]),
    {
        self.traverse_from(self.root, TraversalDirection::Dependents, visit);
    }

    /// Breadth-first walk from `start`. The callback receives the node and
    /// the path that reached it, `start` first and the node itself last.
    /// Diamonds are visited once, through the first path found.
    pub fn traverse_from<F>(&self, start: NodeIndex, direction: TraversalDirection, mut visit: F)
    where
        F: FnMut(NodeIndex, &[NodeIndex]),
    {
        if self.graph.node_weight(start).is_none() {
            return;
        }

        let mut visited = HashSet::from([start]);
        let mut queue = VecDeque::from([vec![start]]);

        while let Some(path) = queue.pop_front() {
            let Some(&node) = path.last() else {
                continue;
            };
            visit(node, &path);

            for next in self.neighbors(node, direction) {
                if visited.insert(next) {
                    let mut next_path = path.clone();
                    next_path.push(next);
                    queue.push_back(next_path);
                }
            }
        }
    }

    /// Nodes reachable from `start` in breadth-first order, `start` included.
    pub fn collect_from(&self, start: NodeIndex, direction: TraversalDirection) -> Vec<NodeIndex> {
        let mut nodes = Vec::new();
        self.traverse_from(start, direction, |node, _| nodes.push(node));
        nodes
    }

    /// Nodes with no dependencies, in index order.
    pub fn sources(&self) -> Vec<NodeIndex> {
        self.graph
            .node_indices()
            .filter(|&index| {
                self.graph
                    .neighbors_directed(index, Direction::Incoming)
                    .next()
                    .is_none()
            })
            .collect()
    }

    /// Shortest chain of dependencies leading from the root to `node`,
    /// root first. Empty when the root is not an ancestor of `node`.
    pub fn dependency_chain(&self, node: NodeIndex) -> Vec<NodeIndex> {
        let mut chain = Vec::new();
        self.traverse_from(node, TraversalDirection::Dependencies, |visited, path| {
            if visited == self.root && chain.is_empty() {
                chain = path.iter().rev().copied().collect();
            }
        });
        chain
    }

    /// Whether `node` transitively waits on `other`.
    pub fn is_dependent_on(&self, node: NodeIndex, other: NodeIndex) -> bool {
        node != other
            && self
                .collect_from(node, TraversalDirection::Dependencies)
                .contains(&other)
    }

    pub fn find_cycle(&self) -> Option<NodeIndex> {
        petgraph::algo::toposort(&self.graph, None)
            .err()
            .map(|cycle| cycle.node_id())
    }

    pub fn topological_order(&self) -> Result<Vec<NodeIndex>, GraphError> {
        petgraph::algo::toposort(&self.graph, None)
            .map_err(|cycle| GraphError::Cycle(self.graph[cycle.node_id()].id.clone()))
    }

    /// Deep copy of the whole graph.
    pub fn clone_with_relationships(&self) -> DependencyGraph {
        self.clone_with_filter(|_| true)
    }

    /// Deep copy keeping the nodes `predicate` accepts plus everything
    /// they depend on. The root is always kept.
    ///
    /// Nodes are copied first, recording an old-to-new index table; edges
    /// are then rewired through that table. Relative node order is
    /// preserved, so tie-breaks in the simulator behave the same on the
    /// clone as on the original.
    pub fn clone_with_filter<P>(&self, predicate: P) -> DependencyGraph
    where
        P: Fn(&Node) -> bool,
    {
        let mut included = BTreeSet::from([self.root]);
        for index in self.graph.node_indices() {
            if included.contains(&index) || !predicate(&self.graph[index]) {
                continue;
            }
            included.extend(self.collect_from(index, TraversalDirection::Dependencies));
        }

        let mut graph = DiGraph::with_capacity(included.len(), included.len());
        let mut ids = HashMap::with_capacity(included.len());
        let mut remap: HashMap<NodeIndex, NodeIndex> = HashMap::with_capacity(included.len());
        for &old in &included {
            let node = self.graph[old].clone();
            let id = node.id.clone();
            let new = graph.add_node(node);
            ids.insert(id, new);
            remap.insert(old, new);
        }

        for &old in &included {
            for dependency in self.dependencies(old) {
                if let Some(&cloned_dependency) = remap.get(&dependency) {
                    graph.add_edge(cloned_dependency, remap[&old], ());
                }
            }
        }

        DependencyGraph {
            graph,
            ids,
            root: remap[&self.root],
        }
    }
}

impl Index<NodeIndex> for DependencyGraph {
    type Output = Node;

    fn index(&self, index: NodeIndex) -> &Node {
        &self.graph[index]
    }
}
