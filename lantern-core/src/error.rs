use lantern_sim::{GraphError, SettingsError, SimulationError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid page trace: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Graph error: {0}")]
    GraphError(#[from] GraphError),

    #[error("Simulation failed: {0}")]
    SimulationError(#[from] SimulationError),

    #[error("Settings error: {0}")]
    SettingsError(#[from] SettingsError),

    #[error("Page trace has no {0} timestamp")]
    MissingTimestamp(&'static str),

    #[error("No request for URL: {0}")]
    UnknownUrl(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
