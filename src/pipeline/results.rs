// 13.0.2: result types and errors for a pipeline run.

use serde::Serialize;

use crate::config::ConfigError;
use crate::events::DeployEvent;
use crate::ledger::LedgerError;
use crate::network::NetworkClass;
use crate::registry::RegistryError;

#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error("{component} needs {dependency}, which has no registry entry")]
    MissingDependency { component: String, dependency: String },

    #[error("provisioning {component} failed: {source}")]
    ProvisioningFailure { component: String, source: LedgerError },

    #[error("wiring action #{index} {action} failed: {source}")]
    WiringFailure {
        index: usize,
        action: String,
        source: LedgerError,
    },

    #[error("recording {key} in the registry failed: {source}")]
    ConfigWriteFailure { key: String, source: RegistryError },

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl DeployError {
    pub fn missing(component: impl Into<String>, dependency: impl Into<String>) -> Self {
        DeployError::MissingDependency {
            component: component.into(),
            dependency: dependency.into(),
        }
    }

    // Short kind name for the final diagnostic line
    pub fn kind(&self) -> &'static str {
        match self {
            DeployError::MissingDependency { .. } => "MissingDependency",
            DeployError::ProvisioningFailure { .. } => "ProvisioningFailure",
            DeployError::WiringFailure { .. } => "WiringFailure",
            DeployError::ConfigWriteFailure { .. } => "ConfigWriteFailure",
            DeployError::Registry(_) => "RegistryError",
            DeployError::Config(_) => "ConfigError",
        }
    }
}

/// What one stage did to the registry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StageReport {
    pub stage: String,
    // newly created and recorded
    pub created: Vec<String>,
    // already live on the ledger, found through the factory and recorded
    pub adopted: Vec<String>,
    // already recorded, reconnected
    pub bound: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub network: String,
    pub class: NetworkClass,
    pub backend: String,
    pub stages: Vec<StageReport>,
    pub wiring_applied: usize,
    pub wiring_verified: bool,
    pub events: Vec<DeployEvent>,
    // registry document as written, for the summary dump
    pub registry: String,
}

impl RunSummary {
    pub fn created(&self) -> Vec<&str> {
        self.stages
            .iter()
            .flat_map(|s| s.created.iter().map(String::as_str))
            .collect()
    }

    pub fn adopted(&self) -> Vec<&str> {
        self.stages
            .iter()
            .flat_map(|s| s.adopted.iter().map(String::as_str))
            .collect()
    }

    pub fn bound(&self) -> Vec<&str> {
        self.stages
            .iter()
            .flat_map(|s| s.bound.iter().map(String::as_str))
            .collect()
    }
}

#[derive(Debug, Clone)]
pub enum RunOutcome {
    // ephemeral network, nothing touched
    Skipped { network: String },
    Completed(RunSummary),
}

impl RunOutcome {
    pub fn summary(&self) -> Option<&RunSummary> {
        match self {
            RunOutcome::Completed(summary) => Some(summary),
            RunOutcome::Skipped { .. } => None,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, RunOutcome::Skipped { .. })
    }
}
