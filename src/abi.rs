// 2.0 abi.rs: what crosses the ledger seam. argument values, constructor payloads,
// administrative calls and the field each call writes.
// 2.1 Effect is the observable half of a call: what a reader of the target sees afterwards.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::component::Artifact;
use crate::types::{Address, TokenAmount};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum AbiValue {
    Address(Address),
    Uint(TokenAmount),
    Bool(bool),
    Str(String),
    UintArray(Vec<TokenAmount>),
}

impl AbiValue {
    pub fn uint(value: u64) -> Self {
        AbiValue::Uint(TokenAmount::from_u64(value))
    }

    pub fn str(value: &str) -> Self {
        AbiValue::Str(value.to_string())
    }

    pub fn as_address(&self) -> Option<&Address> {
        match self {
            AbiValue::Address(address) => Some(address),
            _ => None,
        }
    }
}

impl fmt::Display for AbiValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbiValue::Address(address) => write!(f, "{address}"),
            AbiValue::Uint(amount) => write!(f, "{amount}"),
            AbiValue::Bool(flag) => write!(f, "{flag}"),
            AbiValue::Str(text) => write!(f, "\"{text}\""),
            AbiValue::UintArray(items) => write!(f, "[{} items]", items.len()),
        }
    }
}

/// Joins values the way a call trace prints them: `a, b, c`.
pub fn render_args(args: &[AbiValue]) -> String {
    args.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Storage slot name for a keyed field, e.g. `keepers[0xabc]`.
pub fn slot(field: &str, key: &[AbiValue]) -> String {
    if key.is_empty() {
        field.to_string()
    } else {
        format!("{field}[{}]", render_args(key))
    }
}

// 2.2: what a call does to its target, described as a field write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Effect {
    // field[key] = value, superseding whatever was there
    Set {
        field: String,
        key: Vec<AbiValue>,
        value: Vec<AbiValue>,
    },
    // field[key] += amount. creation-time mints only
    Credit {
        field: String,
        key: Vec<AbiValue>,
        amount: TokenAmount,
    },
    // factory creates a child component and records it at field[key]
    Spawn {
        artifact: Artifact,
        field: String,
        key: Vec<AbiValue>,
    },
}

impl Effect {
    pub fn set(field: &str, key: Vec<AbiValue>, value: Vec<AbiValue>) -> Self {
        Effect::Set {
            field: field.to_string(),
            key,
            value,
        }
    }

    pub fn slot(&self) -> String {
        match self {
            Effect::Set { field, key, .. }
            | Effect::Credit { field, key, .. }
            | Effect::Spawn { field, key, .. } => slot(field, key),
        }
    }
}

// Constructor payload for a new component
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deployment {
    pub artifact: Artifact,
    pub args: Vec<AbiValue>,
}

impl Deployment {
    pub fn new(artifact: Artifact, args: Vec<AbiValue>) -> Self {
        Self { artifact, args }
    }
}

impl fmt::Display for Deployment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "new {}({})", self.artifact, render_args(&self.args))
    }
}

// An administrative call against an existing component
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Call {
    pub target: Address,
    pub method: String,
    pub args: Vec<AbiValue>,
    pub effect: Effect,
    // only the component's owner may issue it
    pub owner_only: bool,
}

impl Call {
    pub fn new(target: Address, method: &str, args: Vec<AbiValue>, effect: Effect) -> Self {
        Self {
            target,
            method: method.to_string(),
            args,
            effect,
            owner_only: true,
        }
    }

    pub fn open_to_anyone(mut self) -> Self {
        self.owner_only = false;
        self
    }
}

impl fmt::Display for Call {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}({})", self.target, self.method, render_args(&self.args))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_names() {
        assert_eq!(slot("keeper", &[]), "keeper");

        let keeper = AbiValue::Address(Address::new_unchecked("0xabc"));
        assert_eq!(slot("keepers", &[keeper]), "keepers[0xabc]");
        assert_eq!(
            slot("allowance", &[AbiValue::str("a"), AbiValue::uint(2)]),
            "allowance[\"a\", 2]"
        );
    }

    #[test]
    fn call_renders_like_a_trace() {
        let target = Address::new_unchecked("0x01");
        let keeper = Address::new_unchecked("0x02");
        let call = Call::new(
            target,
            "setKeeper",
            vec![AbiValue::Address(keeper.clone()), AbiValue::Bool(true)],
            Effect::set("keepers", vec![AbiValue::Address(keeper)], vec![AbiValue::Bool(true)]),
        );

        assert_eq!(call.to_string(), "0x01.setKeeper(0x02, true)");
        assert_eq!(call.effect.slot(), "keepers[0x02]");
        assert!(call.owner_only);
        assert!(!call.open_to_anyone().owner_only);
    }

    #[test]
    fn arrays_render_compactly() {
        let series = AbiValue::UintArray(vec![TokenAmount::from_u64(1), TokenAmount::from_u64(2)]);
        assert_eq!(series.to_string(), "[2 items]");
    }
}
