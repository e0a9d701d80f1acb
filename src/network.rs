// 4.0 network.rs: the target network is resolved once, at entry, into a class.
// nothing downstream branches on the raw network name again.

use serde::{Deserialize, Serialize};
use std::fmt;

// networks whose state is thrown away after the run. never persist their addresses.
const EPHEMERAL_NETWORKS: &[&str] = &["test", "coverage"];

const STAGING_NETWORKS: &[&str] = &[
    "development",
    "develop",
    "local",
    "localhost",
    "ganache",
    "kovan",
    "rinkeby",
    "ropsten",
    "goerli",
    "sepolia",
];

const STAGING_MARKERS: &[&str] = &["testnet", "staging", "devnet"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkClass {
    Production,
    StagingLike,
    Ephemeral,
}

impl NetworkClass {
    pub fn classify(network: &str) -> Self {
        let name = network.trim().to_ascii_lowercase();

        if EPHEMERAL_NETWORKS.contains(&name.as_str()) {
            NetworkClass::Ephemeral
        } else if STAGING_NETWORKS.contains(&name.as_str())
            || STAGING_MARKERS.iter().any(|marker| name.contains(marker))
        {
            NetworkClass::StagingLike
        } else {
            NetworkClass::Production
        }
    }
}

impl fmt::Display for NetworkClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkClass::Production => f.write_str("production"),
            NetworkClass::StagingLike => f.write_str("staging"),
            NetworkClass::Ephemeral => f.write_str("ephemeral"),
        }
    }
}

/// Single gate check in front of the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkGate {
    network: String,
    class: NetworkClass,
}

impl NetworkGate {
    pub fn new(network: &str) -> Self {
        Self {
            network: network.trim().to_string(),
            class: NetworkClass::classify(network),
        }
    }

    pub fn network(&self) -> &str {
        &self.network
    }

    pub fn class(&self) -> NetworkClass {
        self.class
    }

    // false means: no ledger calls, no registry writes, not even opening the file
    pub fn permits_provisioning(&self) -> bool {
        self.class != NetworkClass::Ephemeral
    }
}
