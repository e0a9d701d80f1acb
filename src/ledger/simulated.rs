// 8.1 ledger/simulated.rs: MOCKED. in-memory chain, would be RPC calls to a node in prod.
// components are storage maps; an administrative call is the field write its Effect describes.
// owner-only calls from anyone but the deployer revert, like the real access-control checks.

use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use super::{Ledger, LedgerError, Receipt};
use crate::abi::{slot, AbiValue, Call, Deployment, Effect};
use crate::component::Artifact;
use crate::registry::write_atomic;
use crate::types::{Address, Identity, Timestamp, TokenAmount, TxHash};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractState {
    pub artifact: Artifact,
    pub owner: Address,
    pub constructor_args: Vec<AbiValue>,
    pub storage: BTreeMap<String, Vec<AbiValue>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
// externally tagged. arbitrary_precision numbers do not survive internal tags
#[serde(rename_all = "snake_case")]
enum TxOutcome {
    Confirmed { receipt: Receipt },
    Reverted { reason: String },
}

// Counters over confirmed transactions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LedgerStats {
    pub deployments: usize,
    // children created by factories
    pub spawns: usize,
    // administrative calls that created nothing
    pub calls: usize,
    pub reverts: usize,
}

impl LedgerStats {
    pub fn creations(&self) -> usize {
        self.deployments + self.spawns
    }
}

// What was submitted, in order, for assertions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submitted {
    Deploy { deployment: Deployment, from: Address },
    Call { call: Call, from: Address },
}

#[derive(Debug, Clone, Default)]
struct Faults {
    // reject the creation submitted when this many creations have confirmed
    creation_at: Option<usize>,
    method: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct SimulatedLedger {
    nonce: u64,
    height: u64,
    contracts: BTreeMap<Address, ContractState>,
    receipts: BTreeMap<TxHash, TxOutcome>,
    #[serde(skip)]
    stats: LedgerStats,
    #[serde(skip)]
    submitted: Vec<Submitted>,
    #[serde(skip)]
    faults: Faults,
}

impl SimulatedLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a saved chain, or starts an empty one when `path` does not exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::new());
        }
        let raw = fs::read_to_string(path).map_err(|e| LedgerError::Backend {
            message: format!("reading {}: {e}", path.display()),
        })?;
        serde_json::from_str(&raw).map_err(|e| LedgerError::Backend {
            message: format!("parsing {}: {e}", path.display()),
        })
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), LedgerError> {
        let path = path.as_ref();
        let backend_err = |e: std::io::Error| LedgerError::Backend {
            message: format!("writing {}: {e}", path.display()),
        };
        let json = serde_json::to_string_pretty(self).map_err(|e| LedgerError::Backend {
            message: format!("encoding ledger state: {e}"),
        })?;
        write_atomic(path, json.as_bytes()).map_err(backend_err)
    }

    pub fn stats(&self) -> LedgerStats {
        self.stats
    }

    pub fn submitted(&self) -> &[Submitted] {
        &self.submitted
    }

    pub fn contract(&self, address: &Address) -> Option<&ContractState> {
        self.contracts.get(address)
    }

    pub fn contract_count(&self) -> usize {
        self.contracts.len()
    }

    // Forget submission history and counters, keep chain state
    pub fn reset_stats(&mut self) {
        self.stats = LedgerStats::default();
        self.submitted.clear();
    }

    /// Rejects the creation submitted after `n` more creations have confirmed. One-shot.
    pub fn fail_creation_after(&mut self, n: usize) {
        self.faults.creation_at = Some(self.stats.creations() + n);
    }

    /// Rejects the next submitted call to `method`. One-shot.
    pub fn fail_method(&mut self, method: &str) {
        self.faults.method = Some(method.to_string());
    }

    // one chain-wide nonce, so (creator, nonce) never repeats
    fn next_address(&mut self, creator: &Address) -> Address {
        self.nonce += 1;
        contract_address(creator, self.nonce)
    }

    fn next_tx(&mut self, from: &Address) -> TxHash {
        self.height += 1;
        let hash = Keccak256::digest(rlp_pair(&address_bytes(from), self.height));
        TxHash(format!("0x{}", hex::encode(hash)))
    }

    fn take_creation_fault(&mut self) -> bool {
        if self.faults.creation_at == Some(self.stats.creations()) {
            self.faults.creation_at = None;
            return true;
        }
        false
    }

    fn take_method_fault(&mut self, method: &str) -> bool {
        if self.faults.method.as_deref() == Some(method) {
            self.faults.method = None;
            return true;
        }
        false
    }

    fn confirm(&mut self, from: &Address, contract_address: Option<Address>) -> TxHash {
        let tx = self.next_tx(from);
        let receipt = Receipt {
            tx_hash: tx.clone(),
            block: self.height,
            confirmations: 0,
            contract_address,
            confirmed_at: Timestamp::now(),
        };
        self.receipts.insert(tx.clone(), TxOutcome::Confirmed { receipt });
        tx
    }

    fn revert(&mut self, from: &Address, reason: String) -> TxHash {
        let tx = self.next_tx(from);
        self.stats.reverts += 1;
        self.receipts.insert(tx.clone(), TxOutcome::Reverted { reason });
        tx
    }

    fn apply(&mut self, call: &Call, from: &Address) -> Result<Option<Address>, String> {
        let contract = self
            .contracts
            .get(&call.target)
            .ok_or_else(|| format!("no component at {}", call.target))?;

        if call.owner_only && &contract.owner != from {
            return Err(format!("{}: caller {from} is not the owner", call.method));
        }

        match &call.effect {
            Effect::Set { field, key, value } => {
                self.storage_mut(&call.target).insert(slot(field, key), value.clone());
                self.stats.calls += 1;
                Ok(None)
            }
            Effect::Credit { field, key, amount } => {
                let storage = self.storage_mut(&call.target);
                let entry = storage.entry(slot(field, key)).or_default();
                let current = match entry.first() {
                    Some(AbiValue::Uint(v)) => *v,
                    _ => TokenAmount::zero(),
                };
                *entry = vec![AbiValue::Uint(current.saturating_add(*amount))];
                self.stats.calls += 1;
                Ok(None)
            }
            Effect::Spawn { artifact, field, key } => {
                let slot_name = slot(field, key);
                if self
                    .contracts
                    .get(&call.target)
                    .is_some_and(|c| c.storage.contains_key(&slot_name))
                {
                    return Err(format!("{slot_name} already taken"));
                }
                let child = self.next_address(&call.target);
                self.contracts.insert(
                    child.clone(),
                    ContractState {
                        artifact: *artifact,
                        owner: call.target.clone(),
                        constructor_args: call.args.clone(),
                        storage: BTreeMap::new(),
                    },
                );
                self.storage_mut(&call.target)
                    .insert(slot_name, vec![AbiValue::Address(child.clone())]);
                self.stats.spawns += 1;
                Ok(Some(child))
            }
        }
    }

    fn storage_mut(&mut self, target: &Address) -> &mut BTreeMap<String, Vec<AbiValue>> {
        &mut self
            .contracts
            .entry(target.clone())
            .or_insert_with(|| ContractState {
                artifact: Artifact::MockToken,
                owner: Address::zero(),
                constructor_args: Vec::new(),
                storage: BTreeMap::new(),
            })
            .storage
    }
}

impl Ledger for SimulatedLedger {
    fn deploy(&mut self, deployment: &Deployment, from: &Identity) -> Result<TxHash, LedgerError> {
        self.submitted.push(Submitted::Deploy {
            deployment: deployment.clone(),
            from: from.address.clone(),
        });

        if self.take_creation_fault() {
            return Err(LedgerError::Rejected {
                reason: format!("{} creation refused by node", deployment.artifact),
            });
        }

        let address = self.next_address(&from.address);
        self.contracts.insert(
            address.clone(),
            ContractState {
                artifact: deployment.artifact,
                owner: from.address.clone(),
                constructor_args: deployment.args.clone(),
                storage: BTreeMap::new(),
            },
        );
        self.stats.deployments += 1;
        Ok(self.confirm(&from.address, Some(address)))
    }

    fn invoke(&mut self, call: &Call, from: &Identity) -> Result<TxHash, LedgerError> {
        self.submitted.push(Submitted::Call {
            call: call.clone(),
            from: from.address.clone(),
        });

        if !self.contracts.contains_key(&call.target) {
            return Err(LedgerError::NoCode {
                address: call.target.clone(),
            });
        }

        let spawns = matches!(call.effect, Effect::Spawn { .. });
        if (spawns && self.take_creation_fault()) || self.take_method_fault(&call.method) {
            return Err(LedgerError::Rejected {
                reason: format!("{} refused by node", call.method),
            });
        }

        match self.apply(call, &from.address) {
            Ok(created) => Ok(self.confirm(&from.address, created)),
            Err(reason) => Ok(self.revert(&from.address, reason)),
        }
    }

    fn await_receipt(&mut self, tx: &TxHash, confirmations: u32) -> Result<Receipt, LedgerError> {
        match self.receipts.get(tx) {
            Some(TxOutcome::Confirmed { receipt }) => {
                let mut receipt = receipt.clone();
                receipt.confirmations = confirmations;
                Ok(receipt)
            }
            Some(TxOutcome::Reverted { reason }) => Err(LedgerError::Reverted {
                tx: tx.clone(),
                reason: reason.clone(),
            }),
            None => Err(LedgerError::UnknownTx { tx: tx.clone() }),
        }
    }

    fn code_at(&self, address: &Address) -> Option<Artifact> {
        self.contracts.get(address).map(|c| c.artifact)
    }

    fn read(&self, target: &Address, field: &str, key: &[AbiValue]) -> Option<Vec<AbiValue>> {
        self.contracts
            .get(target)
            .and_then(|c| c.storage.get(&slot(field, key)))
            .cloned()
    }

    fn backend_type(&self) -> &str {
        "simulated"
    }
}

/// CREATE rule: keccak256(rlp([creator, nonce]))[12..].
pub fn contract_address(creator: &Address, nonce: u64) -> Address {
    let hash = Keccak256::digest(rlp_pair(&address_bytes(creator), nonce));
    Address::new_unchecked(format!("0x{}", hex::encode(&hash[12..])))
}

// 20 raw bytes for hex addresses, the text itself for anything else ("0xadmin" in tests)
fn address_bytes(address: &Address) -> Vec<u8> {
    let raw = address.as_str();
    raw.strip_prefix("0x")
        .and_then(|digits| hex::decode(digits).ok())
        .filter(|bytes| bytes.len() == 20)
        .unwrap_or_else(|| raw.as_bytes().to_vec())
}

// rlp([bytes, n])
fn rlp_pair(item: &[u8], n: u64) -> Vec<u8> {
    let mut content = rlp_bytes(item);
    content.extend(rlp_bytes(&trimmed_be(n)));

    let mut encoded = rlp_header(0xc0, content.len());
    encoded.extend(content);
    encoded
}

fn rlp_bytes(bytes: &[u8]) -> Vec<u8> {
    if let [single] = bytes {
        if *single < 0x80 {
            return vec![*single];
        }
    }
    let mut encoded = rlp_header(0x80, bytes.len());
    encoded.extend_from_slice(bytes);
    encoded
}

fn rlp_header(offset: u8, len: usize) -> Vec<u8> {
    if len < 56 {
        return vec![offset + len as u8];
    }
    let len_bytes = trimmed_be(len as u64);
    let mut header = vec![offset + 55 + len_bytes.len() as u8];
    header.extend(len_bytes);
    header
}

// big-endian without leading zeros, zero is empty
fn trimmed_be(n: u64) -> Vec<u8> {
    n.to_be_bytes().into_iter().skip_while(|b| *b == 0).collect()
}
