//! Bounded pool of simulated TCP connections.
//!
//! Connections are opened on demand, one in-flight request per connection,
//! up to a per-origin and a global limit. A finished request leaves its
//! connection warm and idle for the next request to the same origin. When
//! the global limit is reached, the connection that has been idle longest
//! is closed to make room for a new one.

use crate::error::{Result, SimulationError};
use crate::graph::NetworkNode;
use crate::tcp_connection::TcpConnection;
use petgraph::graph::NodeIndex;
use std::collections::{BTreeMap, HashMap, VecDeque};
use tracing::debug;

/// Browsers cap HTTP/1.1 connections per origin at six.
pub const CONNECTIONS_PER_ORIGIN: usize = 6;
/// Global socket cap, mirroring Chrome's socket pool.
pub const DEFAULT_MAXIMUM_CONNECTIONS: usize = 256;
pub const DEFAULT_SERVER_RESPONSE_TIME: f64 = 30.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(usize);

impl ConnectionId {
    pub fn index(&self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionPoolOptions {
    pub rtt: f64,
    pub throughput: f64,
    pub additional_rtt_by_origin: HashMap<String, f64>,
    pub server_response_time_by_origin: HashMap<String, f64>,
    pub connections_per_origin: usize,
    pub maximum_connections: usize,
}

impl ConnectionPoolOptions {
    pub fn new(rtt: f64, throughput: f64) -> Self {
        Self {
            rtt,
            throughput,
            additional_rtt_by_origin: HashMap::new(),
            server_response_time_by_origin: HashMap::new(),
            connections_per_origin: CONNECTIONS_PER_ORIGIN,
            maximum_connections: DEFAULT_MAXIMUM_CONNECTIONS,
        }
    }
}

#[derive(Debug, Clone)]
struct PooledConnection {
    origin: String,
    connection: TcpConnection,
}

#[derive(Debug, Clone)]
pub struct ConnectionPool {
    options: ConnectionPoolOptions,
    connections: BTreeMap<ConnectionId, PooledConnection>,
    by_origin: HashMap<String, Vec<ConnectionId>>,
    idle: VecDeque<ConnectionId>,
    in_use: HashMap<NodeIndex, ConnectionId>,
    next_id: usize,
}

impl ConnectionPool {
    pub fn new(options: ConnectionPoolOptions) -> Result<Self> {
        let positive = |value: f64| value > 0.0;
        if !positive(options.rtt) || !positive(options.throughput) {
            return Err(SimulationError::InvalidOptions(format!(
                "connection pool needs a positive rtt and throughput (rtt={}, throughput={})",
                options.rtt, options.throughput
            )));
        }
        if options.connections_per_origin == 0 || options.maximum_connections == 0 {
            return Err(SimulationError::InvalidOptions(
                "connection limits must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            options,
            connections: BTreeMap::new(),
            by_origin: HashMap::new(),
            idle: VecDeque::new(),
            in_use: HashMap::new(),
            next_id: 0,
        })
    }

    /// Hands `node` a connection to its origin, or `None` if every allowed
    /// connection is busy. Calling it again for the same node returns the
    /// connection it already holds.
    pub fn acquire(&mut self, node: NodeIndex, request: &NetworkNode) -> Option<ConnectionId> {
        if let Some(&id) = self.in_use.get(&node) {
            return Some(id);
        }

        let id = match self.find_idle_connection(request.origin()) {
            Some(id) => id,
            None => self.open_connection(request)?,
        };

        self.idle.retain(|&idle| idle != id);
        self.in_use.insert(node, id);
        Some(id)
    }

    /// Returns the node's connection to the idle queue.
    pub fn release(&mut self, node: NodeIndex) -> Result<ConnectionId> {
        let id = self.in_use.remove(&node).ok_or_else(|| {
            SimulationError::ConnectionState(format!(
                "node #{} released a connection it never acquired",
                node.index()
            ))
        })?;
        self.idle.push_back(id);
        Ok(id)
    }

    /// Warm idle connection to `origin` with the largest congestion window.
    fn find_idle_connection(&self, origin: &str) -> Option<ConnectionId> {
        let mut best: Option<(ConnectionId, f64)> = None;
        for &id in self.by_origin.get(origin)? {
            if !self.idle.contains(&id) {
                continue;
            }
            let window = self.connections[&id].connection.congestion_window();
            if best.is_none_or(|(_, best_window)| window > best_window) {
                best = Some((id, window));
            }
        }
        best.map(|(id, _)| id)
    }

    fn open_connection(&mut self, request: &NetworkNode) -> Option<ConnectionId> {
        let origin = request.origin();
        if self.origin_connection_count(origin) >= self.options.connections_per_origin {
            return None;
        }

        if self.connections.len() >= self.options.maximum_connections {
            let evicted = self.idle.pop_front()?;
            self.close(evicted);
        }

        let additional_rtt = self
            .options
            .additional_rtt_by_origin
            .get(origin)
            .copied()
            .unwrap_or(0.0);
        let server_response_time = self
            .options
            .server_response_time_by_origin
            .get(origin)
            .copied()
            .unwrap_or(DEFAULT_SERVER_RESPONSE_TIME);
        let connection = TcpConnection::new(
            self.options.rtt + additional_rtt,
            self.options.throughput,
            server_response_time,
            request.is_secure(),
            request.is_h2(),
        );

        let id = ConnectionId(self.next_id);
        self.next_id += 1;
        debug!("Opening connection {} to {}", id.0, origin);
        self.connections.insert(
            id,
            PooledConnection {
                origin: origin.to_string(),
                connection,
            },
        );
        self.by_origin.entry(origin.to_string()).or_default().push(id);
        Some(id)
    }

    fn close(&mut self, id: ConnectionId) {
        if let Some(pooled) = self.connections.remove(&id) {
            debug!("Evicting idle connection {} to {}", id.0, pooled.origin);
            if let Some(ids) = self.by_origin.get_mut(&pooled.origin) {
                ids.retain(|&other| other != id);
            }
        }
    }

    pub fn connection(&self, id: ConnectionId) -> Option<&TcpConnection> {
        self.connections.get(&id).map(|pooled| &pooled.connection)
    }

    pub fn connection_mut(&mut self, id: ConnectionId) -> Option<&mut TcpConnection> {
        self.connections.get_mut(&id).map(|pooled| &mut pooled.connection)
    }

    /// Connection currently held by `node`.
    pub fn active_connection(&self, node: NodeIndex) -> Result<&TcpConnection> {
        self.in_use
            .get(&node)
            .and_then(|id| self.connection(*id))
            .ok_or_else(|| Self::missing(node))
    }

    pub fn active_connection_mut(&mut self, node: NodeIndex) -> Result<&mut TcpConnection> {
        let id = *self.in_use.get(&node).ok_or_else(|| Self::missing(node))?;
        self.connection_mut(id).ok_or_else(|| Self::missing(node))
    }

    fn missing(node: NodeIndex) -> SimulationError {
        SimulationError::ConnectionState(format!("node #{} holds no connection", node.index()))
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn origin_connection_count(&self, origin: &str) -> usize {
        self.by_origin.get(origin).map_or(0, |ids| ids.len())
    }
}
