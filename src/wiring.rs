// 12.0 wiring.rs: the post-provisioning phase. closes the reference cycles constructors can't.
// every action is an overwrite, so the whole list is simply reapplied on each run.
// 12.1 order is the declared order. a later action may rely on roles an earlier one granted,
// and nothing checks that beyond the declaration itself.

use std::fmt;
use tracing::{debug, info};

use crate::abi::{AbiValue, Call, Effect};
use crate::config::DeployConfig;
use crate::events::{EventLog, EventPayload, WiringAppliedEvent, WiringVerifiedEvent};
use crate::ledger::{invoke_confirmed, Ledger, LedgerError};
use crate::pipeline::DeployError;
use crate::stage::Handles;
use crate::types::{Address, Authority, Identities, TokenAmount};

/// The administrative operation, with every component argument given by registry key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WiringOp {
    // approve(spender, ceiling), issued by the treasury
    Approve { spender: &'static str },
    SetPoolToken { token: &'static str },
    SetStableTokens {
        dai: &'static str,
        usdt: &'static str,
        usdc: &'static str,
    },
    // setKeeper(keeper, true) on components holding a keeper set
    SetKeeperRole { keeper: &'static str },
    // setKeeper(keeper) on components holding a single keeper
    SetKeeper { keeper: &'static str },
    SetLp2Keeper { keeper: &'static str },
    SetReward { reward: &'static str },
    SetRiskFund { fund: &'static str },
    SetUnderlyingAsset { pair: &'static str, asset: &'static str },
    SetBroker { broker: &'static str },
    SetLiquidator { liquidator: &'static str },
    SetBuyback { buyback: &'static str },
    SetReToken { pool: &'static str, index: u64 },
}

impl WiringOp {
    pub fn method(&self) -> &'static str {
        match self {
            WiringOp::Approve { .. } => "approve",
            WiringOp::SetPoolToken { .. } => "setPoolTokenAddr",
            WiringOp::SetStableTokens { .. } => "setStableContractAddress",
            WiringOp::SetKeeperRole { .. } | WiringOp::SetKeeper { .. } => "setKeeper",
            WiringOp::SetLp2Keeper { .. } => "setLP2Keeper",
            WiringOp::SetReward { .. } => "setSLDReward",
            WiringOp::SetRiskFund { .. } => "setRiskFundAddr",
            WiringOp::SetUnderlyingAsset { .. } => "addOrUpdateUnderlyingAsset",
            WiringOp::SetBroker { .. } => "setBrokerAddr",
            WiringOp::SetLiquidator { .. } => "setLiquidatorAddr",
            WiringOp::SetBuyback { .. } => "setBuybackAddr",
            WiringOp::SetReToken { .. } => "setReTokens",
        }
    }

    pub fn references(&self) -> Vec<&'static str> {
        match self {
            WiringOp::SetStableTokens { dai, usdt, usdc } => vec![*dai, *usdt, *usdc],
            WiringOp::Approve { spender: name }
            | WiringOp::SetPoolToken { token: name }
            | WiringOp::SetKeeperRole { keeper: name }
            | WiringOp::SetKeeper { keeper: name }
            | WiringOp::SetLp2Keeper { keeper: name }
            | WiringOp::SetReward { reward: name }
            | WiringOp::SetRiskFund { fund: name }
            | WiringOp::SetUnderlyingAsset { asset: name, .. }
            | WiringOp::SetBroker { broker: name }
            | WiringOp::SetLiquidator { liquidator: name }
            | WiringOp::SetBuyback { buyback: name }
            | WiringOp::SetReToken { pool: name, .. } => vec![*name],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WiringAction {
    pub target: &'static str,
    pub op: WiringOp,
    pub authority: Authority,
}

impl WiringAction {
    pub fn admin(target: &'static str, op: WiringOp) -> Self {
        Self {
            target,
            op,
            authority: Authority::Administrator,
        }
    }

    pub fn treasury(target: &'static str, op: WiringOp) -> Self {
        Self {
            target,
            op,
            authority: Authority::Treasury,
        }
    }

    // target first, then arguments in call order
    pub fn references(&self) -> Vec<&'static str> {
        let mut refs = vec![self.target];
        refs.extend(self.op.references());
        refs
    }

    /// Concrete call, with every key replaced by its live address.
    pub fn to_call(&self, handles: &Handles, identities: &Identities, ceiling: TokenAmount) -> Result<Call, DeployError> {
        let addr = |name: &'static str| -> Result<AbiValue, DeployError> {
            handles
                .address(name)
                .cloned()
                .map(AbiValue::Address)
                .ok_or_else(|| DeployError::missing(self.to_string(), name))
        };
        let target = handles
            .address(self.target)
            .cloned()
            .ok_or_else(|| DeployError::missing(self.to_string(), self.target))?;
        let method = self.op.method();

        let call = match &self.op {
            WiringOp::Approve { spender } => {
                let spender = addr(*spender)?;
                let owner = AbiValue::Address(identities.for_authority(self.authority).address.clone());
                let amount = AbiValue::Uint(ceiling);
                Call::new(
                    target,
                    method,
                    vec![spender.clone(), amount.clone()],
                    Effect::set("allowance", vec![owner, spender], vec![amount]),
                )
                .open_to_anyone()
            }
            WiringOp::SetStableTokens { dai, usdt, usdc } => {
                let tokens = vec![addr(*dai)?, addr(*usdt)?, addr(*usdc)?];
                Call::new(target, method, tokens.clone(), Effect::set("stableTokens", vec![], tokens))
            }
            WiringOp::SetKeeperRole { keeper } => {
                let keeper = addr(*keeper)?;
                Call::new(
                    target,
                    method,
                    vec![keeper.clone(), AbiValue::Bool(true)],
                    Effect::set("keepers", vec![keeper], vec![AbiValue::Bool(true)]),
                )
            }
            WiringOp::SetUnderlyingAsset { pair, asset } => {
                let pair = AbiValue::str(pair);
                let asset = addr(*asset)?;
                Call::new(
                    target,
                    method,
                    vec![pair.clone(), asset.clone()],
                    Effect::set("underlyingAssets", vec![pair], vec![asset]),
                )
            }
            WiringOp::SetReToken { pool, index } => {
                let pool = addr(*pool)?;
                let index = AbiValue::uint(*index);
                Call::new(
                    target,
                    method,
                    vec![pool.clone(), index.clone()],
                    Effect::set("reTokens", vec![index], vec![pool]),
                )
            }
            WiringOp::SetPoolToken { token: name }
            | WiringOp::SetKeeper { keeper: name }
            | WiringOp::SetLp2Keeper { keeper: name }
            | WiringOp::SetReward { reward: name }
            | WiringOp::SetRiskFund { fund: name }
            | WiringOp::SetBroker { broker: name }
            | WiringOp::SetLiquidator { liquidator: name }
            | WiringOp::SetBuyback { buyback: name } => {
                let value = addr(*name)?;
                Call::new(
                    target,
                    method,
                    vec![value.clone()],
                    Effect::set(single_field(&self.op), vec![], vec![value]),
                )
            }
        };
        Ok(call)
    }
}

// field written by the single-address setters
fn single_field(op: &WiringOp) -> &'static str {
    match op {
        WiringOp::SetPoolToken { .. } => "poolToken",
        WiringOp::SetKeeper { .. } => "keeper",
        WiringOp::SetLp2Keeper { .. } => "lp2Keeper",
        WiringOp::SetReward { .. } => "sldReward",
        WiringOp::SetRiskFund { .. } => "riskFund",
        WiringOp::SetBroker { .. } => "broker",
        WiringOp::SetLiquidator { .. } => "liquidator",
        WiringOp::SetBuyback { .. } => "buyback",
        _ => "",
    }
}

impl fmt::Display for WiringAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let args = match &self.op {
            WiringOp::SetUnderlyingAsset { pair, asset } => format!("\"{pair}\", {asset}"),
            WiringOp::SetReToken { pool, index } => format!("{pool}, {index}"),
            WiringOp::SetKeeperRole { keeper } => format!("{keeper}, true"),
            op => op.references().join(", "),
        };
        write!(f, "{}.{}({})", self.target, self.op.method(), args)?;
        if self.authority == Authority::Treasury {
            write!(f, " as treasury")?;
        }
        Ok(())
    }
}

pub struct WiringEngine {
    confirmations: u32,
    ceiling: TokenAmount,
}

impl WiringEngine {
    pub fn new(config: &DeployConfig) -> Self {
        Self {
            confirmations: config.confirmations,
            ceiling: config.allowance_ceiling,
        }
    }

    /// Every action as a concrete call, or the first unresolved reference.
    /// All or nothing, so a gap never leaves the list half applied.
    pub fn resolve(
        &self,
        actions: &[WiringAction],
        handles: &Handles,
        identities: &Identities,
    ) -> Result<Vec<Call>, DeployError> {
        actions
            .iter()
            .map(|action| action.to_call(handles, identities, self.ceiling))
            .collect()
    }

    /// Applies the list in order, one confirmed call at a time. Returns the number applied.
    pub fn apply_all<L: Ledger + ?Sized>(
        &self,
        actions: &[WiringAction],
        handles: &Handles,
        identities: &Identities,
        ledger: &mut L,
        events: &mut EventLog,
    ) -> Result<usize, DeployError> {
        let calls = self.resolve(actions, handles, identities)?;
        info!(actions = calls.len(), "applying wiring");

        for (index, (action, call)) in actions.iter().zip(&calls).enumerate() {
            let from = identities.for_authority(action.authority);
            debug!(index, %call, "wiring");

            let receipt = invoke_confirmed(ledger, call, from, self.confirmations).map_err(|source| {
                DeployError::WiringFailure {
                    index,
                    action: action.to_string(),
                    source,
                }
            })?;

            info!(index, "{action}");
            events.emit(EventPayload::WiringApplied(WiringAppliedEvent {
                index,
                action: action.to_string(),
                authority: action.authority,
                tx_hash: receipt.tx_hash,
            }));
        }

        Ok(calls.len())
    }

    /// Reads every action's field back and compares it with what the action wrote.
    pub fn verify<L: Ledger + ?Sized>(
        &self,
        actions: &[WiringAction],
        handles: &Handles,
        identities: &Identities,
        ledger: &L,
        events: &mut EventLog,
    ) -> Result<(), DeployError> {
        let calls = self.resolve(actions, handles, identities)?;

        for (index, (action, call)) in actions.iter().zip(&calls).enumerate() {
            check_effect(ledger, call).map_err(|source| DeployError::WiringFailure {
                index,
                action: action.to_string(),
                source,
            })?;
        }

        info!(actions = calls.len(), "wiring verified");
        events.emit(EventPayload::WiringVerified(WiringVerifiedEvent { actions: calls.len() }));
        Ok(())
    }
}

fn check_effect<L: Ledger + ?Sized>(ledger: &L, call: &Call) -> Result<(), LedgerError> {
    let (field, key, expected) = match &call.effect {
        Effect::Set { field, key, value } => (field, key, value),
        // wiring never credits or spawns
        Effect::Credit { .. } | Effect::Spawn { .. } => return Ok(()),
    };

    let actual = ledger.read(&call.target, field, key);
    if actual.as_ref() == Some(expected) {
        return Ok(());
    }

    Err(LedgerError::Mismatch {
        target: call.target.clone(),
        slot: call.effect.slot(),
        expected: crate::abi::render_args(expected),
        actual: actual.map_or_else(|| "nothing".to_string(), |v| crate::abi::render_args(&v)),
    })
}

/// Address the keeper field of `target` currently holds, if any.
pub fn read_keeper<L: Ledger + ?Sized>(ledger: &L, target: &Address) -> Option<Address> {
    ledger
        .read(target, "keeper", &[])
        .and_then(|values| values.first().and_then(AbiValue::as_address).cloned())
}
