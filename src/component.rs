// 7.0 component.rs: what a deployable unit looks like to the orchestrator.
// a registry key, the artifact to instantiate, how to fill its constructor, and how to create it.
// 7.1 business logic of the components themselves is out of reach. they are opaque here.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::abi::{AbiValue, Call, Effect};
use crate::seed::PriceHistory;
use crate::types::{Address, Authority, Identities, TokenAmount};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Artifact {
    AggregatorFactory,
    Aggregator,
    MockToken,
    #[serde(rename = "SLDBroker")]
    Broker,
    Formula,
    #[serde(rename = "SLDPublicPool")]
    PublicPool,
    #[serde(rename = "SLDRewards")]
    Rewards,
    #[serde(rename = "SLDPrivatePool")]
    PrivatePool,
    #[serde(rename = "SLDOption")]
    OptionMarket,
    #[serde(rename = "SLDLiquidator")]
    Liquidator,
    #[serde(rename = "SLDBuyBack")]
    BuyBack,
    UnderlyingAsset,
}

impl Artifact {
    pub fn contract_name(&self) -> &'static str {
        match self {
            Artifact::AggregatorFactory => "AggregatorFactory",
            Artifact::Aggregator => "Aggregator",
            Artifact::MockToken => "MockToken",
            Artifact::Broker => "SLDBroker",
            Artifact::Formula => "Formula",
            Artifact::PublicPool => "SLDPublicPool",
            Artifact::Rewards => "SLDRewards",
            Artifact::PrivatePool => "SLDPrivatePool",
            Artifact::OptionMarket => "SLDOption",
            Artifact::Liquidator => "SLDLiquidator",
            Artifact::BuyBack => "SLDBuyBack",
            Artifact::UnderlyingAsset => "UnderlyingAsset",
        }
    }
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.contract_name())
    }
}

// 7.2: one constructor argument, as declared. resolved against the registry at run time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Param {
    Literal(AbiValue),
    // address recorded under this registry key
    Component(&'static str),
    // address of the signing identity
    Identity(Authority),
    // expands to two arrays: timestamps[], values[]
    PriceHistory(PriceHistory),
}

impl Param {
    pub fn str(value: &str) -> Self {
        Param::Literal(AbiValue::str(value))
    }

    pub fn uint(value: u64) -> Self {
        Param::Literal(AbiValue::uint(value))
    }

    pub fn address(value: &str) -> Self {
        Param::Literal(AbiValue::Address(Address::new_unchecked(value)))
    }

    pub fn zero_address() -> Self {
        Param::Literal(AbiValue::Address(Address::zero()))
    }

    pub fn flag(value: bool) -> Self {
        Param::Literal(AbiValue::Bool(value))
    }

    pub fn dependency(&self) -> Option<&'static str> {
        match self {
            Param::Component(name) => Some(*name),
            _ => None,
        }
    }
}

// 7.3: calls made on a freshly created component, before it is recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitOp {
    // mint(identity, amount)
    Mint { to: Authority, amount: TokenAmount },
    // setKeeper(identity, true)
    GrantKeeper { to: Authority },
}

impl InitOp {
    pub fn to_call(&self, target: &Address, identities: &Identities) -> Call {
        match self {
            InitOp::Mint { to, amount } => {
                let holder = AbiValue::Address(identities.for_authority(*to).address.clone());
                Call::new(
                    target.clone(),
                    "mint",
                    vec![holder.clone(), AbiValue::Uint(*amount)],
                    Effect::Credit {
                        field: "balanceOf".to_string(),
                        key: vec![holder],
                        amount: *amount,
                    },
                )
            }
            InitOp::GrantKeeper { to } => {
                let keeper = AbiValue::Address(identities.for_authority(*to).address.clone());
                Call::new(
                    target.clone(),
                    "setKeeper",
                    vec![keeper.clone(), AbiValue::Bool(true)],
                    Effect::set("keepers", vec![keeper], vec![AbiValue::Bool(true)]),
                )
            }
        }
    }
}

// 7.4: the creation routine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Creation {
    // deploy a new instance, then run the init calls against it
    Deploy { params: Vec<Param>, init: Vec<InitOp> },
    // ask an already recorded factory to create the child at `slot`
    FactoryChild {
        factory: &'static str,
        slot: u64,
        params: Vec<Param>,
    },
}

impl Creation {
    pub fn params(&self) -> &[Param] {
        match self {
            Creation::Deploy { params, .. } | Creation::FactoryChild { params, .. } => params,
        }
    }
}

/// One deployable unit: registry key, artifact, constructor params and creation routine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentDescriptor {
    pub name: &'static str,
    pub label: &'static str,
    pub artifact: Artifact,
    pub creation: Creation,
}

impl ComponentDescriptor {
    pub fn deploy(name: &'static str, label: &'static str, artifact: Artifact, params: Vec<Param>) -> Self {
        Self {
            name,
            label,
            artifact,
            creation: Creation::Deploy {
                params,
                init: Vec::new(),
            },
        }
    }

    pub fn factory_child(
        name: &'static str,
        label: &'static str,
        factory: &'static str,
        slot: u64,
        params: Vec<Param>,
    ) -> Self {
        Self {
            name,
            label,
            artifact: Artifact::Aggregator,
            creation: Creation::FactoryChild { factory, slot, params },
        }
    }

    /// Adds a call run right after deployment. Factory children are owned by their
    /// factory, so the administrator could not run init calls on them.
    pub fn with_init(mut self, op: InitOp) -> Self {
        match &mut self.creation {
            Creation::Deploy { init, .. } => init.push(op),
            Creation::FactoryChild { .. } => {
                debug_assert!(false, "{}: init call {op:?} on a factory child", self.name);
            }
        }
        self
    }

    /// Registry keys that must be set before this component can be created.
    pub fn dependencies(&self) -> Vec<&'static str> {
        let mut deps = Vec::new();
        if let Creation::FactoryChild { factory, .. } = &self.creation {
            deps.push(*factory);
        }
        for name in self.creation.params().iter().filter_map(Param::dependency) {
            if !deps.contains(&name) {
                deps.push(name);
            }
        }
        deps
    }
}

/// Components provisioned together once everything before them is recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage {
    pub name: &'static str,
    pub components: Vec<ComponentDescriptor>,
}

impl Stage {
    pub fn new(name: &'static str, components: Vec<ComponentDescriptor>) -> Self {
        Self { name, components }
    }

    pub fn component_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.components.iter().map(|c| c.name)
    }
}
