use thiserror::Error;

/// Structural problems with a dependency graph.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    #[error("Duplicate node id: {0}")]
    DuplicateNode(String),

    #[error("Node {0} cannot depend on itself")]
    SelfDependency(String),

    #[error("Unknown node: {0}")]
    UnknownNode(String),

    #[error("Cycle detected at node {0}")]
    Cycle(String),

    #[error("No main document request found")]
    MissingMainDocument,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimulationError {
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("Simulation '{label}' stalled with {completed} of {total} nodes complete")]
    Stalled {
        label: String,
        completed: usize,
        total: usize,
    },

    #[error("Invalid simulator options: {0}")]
    InvalidOptions(String),

    #[error("Connection state error: {0}")]
    ConnectionState(String),

    #[error("Simulation '{label}' produced a non-finite clock value")]
    NonFiniteTime { label: String },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SettingsError {
    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: f64 },

    #[error("Unknown throttling preset: {0}")]
    UnknownPreset(String),

    #[error("Invalid settings JSON: {0}")]
    Parse(String),
}

pub type Result<T> = std::result::Result<T, SimulationError>;
