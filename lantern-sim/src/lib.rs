pub mod connection_pool;
pub mod cpu;
pub mod dns_cache;
pub mod error;
pub mod graph;
pub mod network_analyzer;
pub mod record;
pub mod result;
pub mod settings;
pub mod simulator;
pub mod tcp_connection;

pub use error::{GraphError, Result, SettingsError, SimulationError};
pub use graph::{CpuNode, DependencyGraph, NetworkNode, Node, NodeKind, TraversalDirection};
pub use network_analyzer::NetworkAnalysis;
pub use petgraph::graph::NodeIndex;
pub use record::{NetworkRecord, RequestPriority, ResourceTiming, ResourceType};
pub use result::{NodeTiming, SimulationResult};
pub use settings::{Settings, ThrottlingMethod, ThrottlingPreset};
pub use simulator::{SimulateOptions, Simulator, SimulatorOptions};
