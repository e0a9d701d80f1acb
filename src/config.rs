// 5.0 config.rs: run settings in one place. network, registry location, confirmations.
// 5.1 presets per network class. production waits longer and always re-reads wiring.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::network::NetworkClass;
use crate::types::TokenAmount;

pub const DEFAULT_REGISTRY_PATH: &str = "migrations/config.json";

// allowance the treasury grants each spender. an overwrite, never an increment
pub const DEFAULT_ALLOWANCE_CEILING: &str = "9999999999999999999999999999";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployConfig {
    // Network name as given by the operator
    pub network: String,
    // Location of the address registry document
    pub registry_path: PathBuf,
    // Confirmations each transaction waits for before the run moves on
    pub confirmations: u32,
    // Token allowance ceiling for treasury approvals
    pub allowance_ceiling: TokenAmount,
    // Read every wiring effect back after the wiring phase
    pub verify_wiring: bool,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            network: "development".to_string(),
            registry_path: PathBuf::from(DEFAULT_REGISTRY_PATH),
            confirmations: 1,
            allowance_ceiling: default_allowance_ceiling(),
            verify_wiring: true,
        }
    }
}

fn default_allowance_ceiling() -> TokenAmount {
    TokenAmount::from_dec_str(DEFAULT_ALLOWANCE_CEILING).unwrap_or_else(|| TokenAmount::from_u64(u64::MAX))
}

impl DeployConfig {
    // Preset for the class the network name falls into
    pub fn for_network(network: &str) -> Self {
        let mut config = match NetworkClass::classify(network) {
            NetworkClass::Production => Self::production(),
            NetworkClass::StagingLike => Self::staging(),
            NetworkClass::Ephemeral => Self::ephemeral(),
        };
        config.network = network.trim().to_string();
        config
    }

    pub fn production() -> Self {
        Self {
            network: "mainnet".to_string(),
            confirmations: 3,
            ..Self::default()
        }
    }

    pub fn staging() -> Self {
        Self {
            network: "development".to_string(),
            confirmations: 1,
            ..Self::default()
        }
    }

    // never reaches the ledger, the gate stops it first
    pub fn ephemeral() -> Self {
        Self {
            network: "test".to_string(),
            confirmations: 0,
            verify_wiring: false,
            ..Self::default()
        }
    }

    pub fn with_registry(mut self, path: impl Into<PathBuf>) -> Self {
        self.registry_path = path.into();
        self
    }

    pub fn with_confirmations(mut self, confirmations: u32) -> Self {
        self.confirmations = confirmations;
        self
    }

    pub fn class(&self) -> NetworkClass {
        NetworkClass::classify(&self.network)
    }

    // Validate the configuration for internal consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.network.trim().is_empty() {
            return Err(ConfigError::InvalidNetwork {
                reason: "network name must not be empty".to_string(),
            });
        }

        if self.class() != NetworkClass::Ephemeral && self.confirmations == 0 {
            return Err(ConfigError::InvalidConfirmations {
                reason: format!("network {} needs at least 1 confirmation", self.network),
            });
        }

        if self.allowance_ceiling.is_zero() {
            return Err(ConfigError::InvalidAllowance {
                reason: "allowance ceiling must be positive".to_string(),
            });
        }

        if self.registry_path.as_os_str().is_empty() {
            return Err(ConfigError::InvalidRegistryPath {
                reason: "registry path must not be empty".to_string(),
            });
        }

        Ok(())
    }
}

// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid network: {reason}")]
    InvalidNetwork { reason: String },
    #[error("invalid confirmations: {reason}")]
    InvalidConfirmations { reason: String },
    #[error("invalid allowance: {reason}")]
    InvalidAllowance { reason: String },
    #[error("invalid registry path: {reason}")]
    InvalidRegistryPath { reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        let config = DeployConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.allowance_ceiling.to_string(), DEFAULT_ALLOWANCE_CEILING);
    }

    #[test]
    fn test_presets_by_network() {
        let bsc = DeployConfig::for_network("bsc");
        assert_eq!(bsc.confirmations, 3);
        assert_eq!(bsc.network, "bsc");
        assert!(bsc.validate().is_ok());

        let testnet = DeployConfig::for_network("bsctestnet");
        assert_eq!(testnet.confirmations, 1);
        assert!(testnet.verify_wiring);

        let test = DeployConfig::for_network("test");
        assert_eq!(test.class(), NetworkClass::Ephemeral);
        assert!(test.validate().is_ok());
    }

    #[test]
    fn test_zero_confirmations_rejected() {
        let config = DeployConfig::for_network("bsc").with_confirmations(0);
        assert!(matches!(config.validate(), Err(ConfigError::InvalidConfirmations { .. })));
    }

    #[test]
    fn test_empty_fields_rejected() {
        let mut config = DeployConfig::default();
        config.network = " ".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::InvalidNetwork { .. })));

        let config = DeployConfig::default().with_registry("");
        assert!(matches!(config.validate(), Err(ConfigError::InvalidRegistryPath { .. })));

        let mut config = DeployConfig::default();
        config.allowance_ceiling = TokenAmount::zero();
        assert!(matches!(config.validate(), Err(ConfigError::InvalidAllowance { .. })));
    }

    #[test]
    fn test_config_serialization() {
        let config = DeployConfig::for_network("bsctestnet").with_registry("/tmp/config.json");
        let json = serde_json::to_string(&config).unwrap();
        let back: DeployConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.network, "bsctestnet");
        assert_eq!(back.allowance_ceiling, config.allowance_ceiling);
    }
}
