// 8.0 ledger/: the commit-confirmation channel components are created and called through.
// submission and confirmation are separate on the wire. the helpers below glue them
// into one blocking call so the pipeline never has two transactions in flight.

mod simulated;

pub use simulated::{ContractState, LedgerStats, SimulatedLedger, Submitted};

use serde::{Deserialize, Serialize};

use crate::abi::{AbiValue, Call, Deployment};
use crate::component::Artifact;
use crate::types::{Address, Identity, Timestamp, TxHash};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub tx_hash: TxHash,
    pub block: u64,
    pub confirmations: u32,
    // set for deployments and factory spawns
    pub contract_address: Option<Address>,
    pub confirmed_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("transaction rejected: {reason}")]
    Rejected { reason: String },

    #[error("transaction {tx} reverted: {reason}")]
    Reverted { tx: TxHash, reason: String },

    #[error("timed out waiting for {tx}")]
    Timeout { tx: TxHash },

    #[error("unknown transaction {tx}")]
    UnknownTx { tx: TxHash },

    #[error("no component deployed at {address}")]
    NoCode { address: Address },

    #[error("{slot} on {target} reads {actual}, expected {expected}")]
    Mismatch {
        target: Address,
        slot: String,
        expected: String,
        actual: String,
    },

    #[error("ledger backend: {message}")]
    Backend { message: String },
}

/// Execution backend the orchestrator provisions against.
pub trait Ledger {
    // Submit a component creation. returns once the ledger accepted it
    fn deploy(&mut self, deployment: &Deployment, from: &Identity) -> Result<TxHash, LedgerError>;

    // Submit an administrative call
    fn invoke(&mut self, call: &Call, from: &Identity) -> Result<TxHash, LedgerError>;

    // Block until `tx` has `confirmations` confirmations, reverted, or the backend gave up
    fn await_receipt(&mut self, tx: &TxHash, confirmations: u32) -> Result<Receipt, LedgerError>;

    // Artifact deployed at `address`, if any
    fn code_at(&self, address: &Address) -> Option<Artifact>;

    // Current value of field[key] on `target`
    fn read(&self, target: &Address, field: &str, key: &[AbiValue]) -> Option<Vec<AbiValue>>;

    fn backend_type(&self) -> &str;
}

/// Deploys and waits for the receipt. Returns the new component's address.
pub fn deploy_confirmed<L: Ledger + ?Sized>(
    ledger: &mut L,
    deployment: &Deployment,
    from: &Identity,
    confirmations: u32,
) -> Result<(Address, Receipt), LedgerError> {
    let tx = ledger.deploy(deployment, from)?;
    let receipt = ledger.await_receipt(&tx, confirmations)?;
    let address = receipt
        .contract_address
        .clone()
        .ok_or_else(|| LedgerError::Backend {
            message: format!("receipt for {tx} carries no contract address"),
        })?;
    Ok((address, receipt))
}

/// Submits a call and waits for the receipt.
pub fn invoke_confirmed<L: Ledger + ?Sized>(
    ledger: &mut L,
    call: &Call,
    from: &Identity,
    confirmations: u32,
) -> Result<Receipt, LedgerError> {
    let tx = ledger.invoke(call, from)?;
    ledger.await_receipt(&tx, confirmations)
}
