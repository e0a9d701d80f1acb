// shield-deploy: deployment orchestrator for the ShieldEx margin/options protocol.
// registry-first architecture: the address registry is the only checkpoint, and every
// stage consults it before touching the ledger. re-runs only do the remaining work.
//
// file map (search X.0 for structs, X.1+ for logic):
//   1.x  types.rs: primitives: Address, TokenAmount, TxHash, Identity
//   2.x  abi.rs: call payloads: AbiValue, Deployment, Call, Effect
//   3.x  registry.rs: append-only name -> address map, flushed on every set
//   4.x  network.rs: network classification, ephemeral gate
//   5.x  config.rs: run settings, presets per network class
//   6.x  seed.rs: embedded price history for the formulas
//   7.x  component.rs: component descriptors, params, creation routines
//   8.x  ledger/: commit-confirmation seam
//   8.1  ledger/simulated.rs: in-memory chain (mocked)
//   9.x  plan.rs: declared stages, wiring list, order validation
//   10.x stage.rs: stage runner, live handles
//   11.x events.rs: provisioning events for audit
//   12.x wiring.rs: administrative cross-linking after provisioning
//   13.x pipeline/: the full run, errors, summary

// deployment core
pub mod component;
pub mod pipeline;
pub mod plan;
pub mod registry;
pub mod stage;
pub mod types;
pub mod wiring;

// inputs
pub mod config;
pub mod network;
pub mod seed;

// ledger integration
pub mod abi;
pub mod events;
pub mod ledger;

// re exports for convenience
pub use abi::{AbiValue, Call, Deployment, Effect};
pub use component::{Artifact, ComponentDescriptor, Creation, InitOp, Param, Stage};
pub use config::{ConfigError, DeployConfig};
pub use events::{DeployEvent, EventLog, EventPayload};
pub use ledger::{Ledger, LedgerError, Receipt, SimulatedLedger};
pub use network::{NetworkClass, NetworkGate};
pub use pipeline::{deploy, DeployError, RunOutcome, RunSummary, Signers, StageReport};
pub use plan::{DependencyResolver, DeploymentPlan};
pub use registry::{AddressRegistry, RegistryError};
pub use stage::{Handle, Handles, Origin, StageRunner};
pub use types::*;
pub use wiring::{WiringAction, WiringEngine, WiringOp};
