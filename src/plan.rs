// 9.0 plan.rs: the protocol's deployment plan, hand-declared in dependency order.
// 9.1 stages break the dependency DAG into a fixed list. references that would form a
// cycle (pool <-> option, rewards <-> private pools) are left out of constructors and
// closed by the wiring list at the end.
// 9.2 registry keys are a shared file format. misspellings like "Aggreagator" are kept.

use crate::component::{Artifact, ComponentDescriptor, InitOp, Param, Stage};
use crate::pipeline::DeployError;
use crate::seed::{BTC_USD_HISTORY, ETH_USD_HISTORY};
use crate::types::{Authority, TokenAmount};
use crate::wiring::{WiringAction, WiringOp};

pub const RISK_FUND: &str = "RiskFundAddr";

pub const SLD_SUPPLY: &str = "1000000000000000000000000000";
pub const STABLE_SUPPLY: &str = "100000000000000000000000000000";

// one stablecoin market: token, its two pools and its option contract
struct Stable {
    symbol: &'static str,
    // log labels: token, public pool, private pool, option
    labels: [&'static str; 4],
    token: &'static str,
    token_name: &'static str,
    public_pool: &'static str,
    pool_name: &'static str,
    pool_symbol: &'static str,
    private_pool: &'static str,
    option: &'static str,
    // option id and reward reToken index
    index: u64,
    eth_pair: &'static str,
    btc_pair: &'static str,
}

const STABLES: [Stable; 3] = [
    Stable {
        symbol: "DAI",
        labels: ["DAI token", "DAI public pool", "DAI private pool", "DAI option"],
        token: "DAIAddr",
        token_name: "ShieldEx DAI",
        public_pool: "DAIPublicPoolAddr",
        pool_name: "Shield reDAI Token",
        pool_symbol: "reDAI",
        private_pool: "DAIPrivatePoolAddr",
        option: "DAIOptionAddr",
        index: 1,
        eth_pair: "ETHDAI",
        btc_pair: "BTCDAI",
    },
    Stable {
        symbol: "USDT",
        labels: ["USDT token", "USDT public pool", "USDT private pool", "USDT option"],
        token: "USDTAddr",
        token_name: "ShieldEx USDT",
        public_pool: "USDTPublicPoolAddr",
        pool_name: "Shield reUSDT Token",
        pool_symbol: "reUSDT",
        private_pool: "USDTPrivatePoolAddr",
        option: "USDTOptionAddr",
        index: 2,
        eth_pair: "ETHUSDT",
        btc_pair: "BTCUSDT",
    },
    Stable {
        symbol: "USDC",
        labels: ["USDC token", "USDC public pool", "USDC private pool", "USDC option"],
        token: "USDCAddr",
        token_name: "ShieldEx USDC",
        public_pool: "USDCPublicPoolAddr",
        pool_name: "Shield reUSDC Token",
        pool_symbol: "reUSDC",
        private_pool: "USDCPrivatePoolAddr",
        option: "USDCOptionAddr",
        index: 3,
        eth_pair: "ETHUSDC",
        btc_pair: "BTCUSDC",
    },
];

const FACTORY: &str = "AggregatorFactoryAddr";
const ETH_AGGREGATOR: &str = "ETHUSDAggreagator";
const BTC_AGGREGATOR: &str = "BTCUSDAggreagator";
const BNB_AGGREGATOR: &str = "BNBUSDAggreagator";
const SLD: &str = "SLDAddr";
const BROKER: &str = "BrokerAddr";
const ETH_FORMULA: &str = "ETHUSDFormulaAddr";
const BTC_FORMULA: &str = "BTCUSDFormulaAddr";
const REWARD: &str = "RewardAddr";
const LIQUIDATOR: &str = "LiquidatorAddr";
const BUYBACK: &str = "BuyBackAddr";
const ETH_ASSET: &str = "ETHUnderlyingAsset";
const BTC_ASSET: &str = "BTCUnderlyingAsset";

// aggregator children: key, label, pair, slot, upstream feed
const AGGREGATORS: [(&str, &str, &str, u64, &str); 3] = [
    (ETH_AGGREGATOR, "ETH/USD aggregator", "ETHUSDT", 0, "0x143db3CEEfbdfe5631aDD3E50f7614B6ba708BA7"),
    (BTC_AGGREGATOR, "BTC/USD aggregator", "BTCUSDT", 1, "0x5741306c21795FdCBb9b265Ea0255F499DFe515C"),
    (BNB_AGGREGATOR, "BNB/USD aggregator", "BNBUSD", 2, "0x2514895c72f50D8bd4B4F9b1110F0D6bD2c97526"),
];

/// Ordered stages, the keys the operator seeds, and the wiring list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentPlan {
    pub externals: Vec<&'static str>,
    pub stages: Vec<Stage>,
    pub wiring: Vec<WiringAction>,
}

impl DeploymentPlan {
    pub fn stage(&self, name: &str) -> Option<&Stage> {
        self.stages.iter().find(|s| s.name == name)
    }

    pub fn component_names(&self) -> Vec<&'static str> {
        self.stages.iter().flat_map(Stage::component_names).collect()
    }
}

pub struct DependencyResolver;

impl DependencyResolver {
    pub fn protocol_plan() -> DeploymentPlan {
        DeploymentPlan {
            externals: vec![RISK_FUND],
            stages: Self::stages(),
            wiring: Self::wiring(),
        }
    }

    pub fn stages() -> Vec<Stage> {
        vec![
            Self::aggregators(),
            Self::tokens(),
            Stage::new(
                "broker",
                vec![ComponentDescriptor::deploy(
                    BROKER,
                    "Broker",
                    Artifact::Broker,
                    stable_params(|s| s.token),
                )],
            ),
            Self::formulas(),
            Stage::new(
                "public pools",
                STABLES
                    .iter()
                    .map(|s| {
                        ComponentDescriptor::deploy(
                            s.public_pool,
                            s.labels[1],
                            Artifact::PublicPool,
                            vec![
                                Param::str(s.pool_name),
                                Param::str(s.pool_symbol),
                                Param::Component(RISK_FUND),
                                Param::Component(s.token),
                                Param::Component(ETH_FORMULA),
                            ],
                        )
                    })
                    .collect(),
            ),
            Stage::new(
                "reward distributor",
                vec![ComponentDescriptor::deploy(
                    REWARD,
                    "Rewards contract",
                    Artifact::Rewards,
                    std::iter::once(Param::Component(SLD))
                        .chain(stable_params(|s| s.public_pool))
                        .collect(),
                )],
            ),
            Stage::new(
                "private pools",
                STABLES
                    .iter()
                    .map(|s| {
                        ComponentDescriptor::deploy(
                            s.private_pool,
                            s.labels[2],
                            Artifact::PrivatePool,
                            vec![
                                Param::Component(s.public_pool),
                                Param::Component(s.token),
                                Param::Component(REWARD),
                                Param::Component(RISK_FUND),
                            ],
                        )
                    })
                    .collect(),
            ),
            Stage::new(
                "option markets",
                STABLES
                    .iter()
                    .map(|s| {
                        ComponentDescriptor::deploy(
                            s.option,
                            s.labels[3],
                            Artifact::OptionMarket,
                            vec![
                                Param::Component(s.public_pool),
                                Param::Component(s.private_pool),
                                Param::Component(RISK_FUND),
                                Param::Component(s.token),
                                Param::uint(s.index),
                            ],
                        )
                    })
                    .collect(),
            ),
            Stage::new(
                "liquidator",
                vec![ComponentDescriptor::deploy(
                    LIQUIDATOR,
                    "Liquidator",
                    Artifact::Liquidator,
                    [Param::Component(REWARD), Param::Component(RISK_FUND), Param::Component(BNB_AGGREGATOR)]
                        .into_iter()
                        .chain(stable_params(|s| s.token))
                        .collect(),
                )],
            ),
            Stage::new(
                "buyback",
                vec![ComponentDescriptor::deploy(
                    BUYBACK,
                    "Buyback",
                    Artifact::BuyBack,
                    std::iter::once(Param::Component(SLD))
                        .chain(stable_params(|s| s.token))
                        .collect(),
                )],
            ),
            Stage::new(
                "underlying assets",
                vec![
                    ComponentDescriptor::deploy(
                        ETH_ASSET,
                        "ETH underlying asset",
                        Artifact::UnderlyingAsset,
                        vec![Param::str("ETH"), Param::Component(ETH_FORMULA)],
                    ),
                    ComponentDescriptor::deploy(
                        BTC_ASSET,
                        "BTC underlying asset",
                        Artifact::UnderlyingAsset,
                        vec![Param::str("BTC"), Param::Component(BTC_FORMULA)],
                    ),
                ],
            ),
        ]
    }

    fn aggregators() -> Stage {
        let factory = ComponentDescriptor::deploy(FACTORY, "Aggregator Factory", Artifact::AggregatorFactory, vec![])
            .with_init(InitOp::GrantKeeper {
                to: Authority::Administrator,
            });

        let children = AGGREGATORS.iter().map(|(name, label, pair, slot, feed)| {
            ComponentDescriptor::factory_child(
                *name,
                *label,
                FACTORY,
                *slot,
                vec![
                    Param::str(pair),
                    Param::zero_address(),
                    Param::zero_address(),
                    Param::uint(*slot),
                    Param::address(feed),
                    Param::flag(false),
                ],
            )
        });

        Stage::new("price aggregators", std::iter::once(factory).chain(children).collect())
    }

    fn tokens() -> Stage {
        let sld = ComponentDescriptor::deploy(
            SLD,
            "SLD token",
            Artifact::MockToken,
            vec![Param::str("ShieldEx Token"), Param::str("SLD")],
        )
        .with_init(mint(SLD_SUPPLY));

        let stables = ["USDT", "USDC", "DAI"].into_iter().filter_map(|symbol| {
            STABLES.iter().find(|s| s.symbol == symbol).map(|s| {
                ComponentDescriptor::deploy(
                    s.token,
                    s.labels[0],
                    Artifact::MockToken,
                    vec![Param::str(s.token_name), Param::str(s.symbol)],
                )
                .with_init(mint(STABLE_SUPPLY))
            })
        });

        Stage::new("test tokens", std::iter::once(sld).chain(stables).collect())
    }

    fn formulas() -> Stage {
        Stage::new(
            "pricing formulas",
            vec![
                ComponentDescriptor::deploy(
                    ETH_FORMULA,
                    "ETHUSD Formula",
                    Artifact::Formula,
                    vec![
                        Param::str("ETHUSD Formula"),
                        Param::Component(ETH_AGGREGATOR),
                        Param::PriceHistory(ETH_USD_HISTORY),
                    ],
                ),
                ComponentDescriptor::deploy(
                    BTC_FORMULA,
                    "BTCUSD Formula",
                    Artifact::Formula,
                    vec![
                        Param::str("BTCUSD Formula"),
                        Param::Component(BTC_AGGREGATOR),
                        Param::PriceHistory(BTC_USD_HISTORY),
                    ],
                ),
            ],
        )
    }

    pub fn wiring() -> Vec<WiringAction> {
        let mut actions = Vec::new();

        // treasury allowances: every stablecoin to the DAI option, rewards and the liquidator
        for s in &STABLES {
            for spender in [STABLES[0].option, REWARD, LIQUIDATOR] {
                actions.push(WiringAction::treasury(s.token, WiringOp::Approve { spender }));
            }
        }

        for s in &STABLES {
            actions.push(WiringAction::admin(s.public_pool, WiringOp::SetPoolToken { token: s.token }));
        }

        actions.push(WiringAction::admin(
            BROKER,
            WiringOp::SetStableTokens {
                dai: STABLES[0].token,
                usdt: STABLES[1].token,
                usdc: STABLES[2].token,
            },
        ));

        for keeper in STABLES.iter().map(|s| s.private_pool).chain([LIQUIDATOR]) {
            actions.push(WiringAction::admin(REWARD, WiringOp::SetKeeperRole { keeper }));
        }

        for s in &STABLES {
            actions.push(WiringAction::admin(BROKER, WiringOp::SetKeeperRole { keeper: s.option }));
        }

        for s in &STABLES {
            actions.push(WiringAction::admin(s.public_pool, WiringOp::SetKeeper { keeper: s.option }));
            actions.push(WiringAction::admin(
                s.public_pool,
                WiringOp::SetLp2Keeper {
                    keeper: s.private_pool,
                },
            ));
        }

        for s in &STABLES {
            actions.push(WiringAction::admin(s.private_pool, WiringOp::SetKeeper { keeper: s.option }));
        }

        actions.push(WiringAction::admin(LIQUIDATOR, WiringOp::SetReward { reward: REWARD }));
        actions.push(WiringAction::admin(LIQUIDATOR, WiringOp::SetRiskFund { fund: RISK_FUND }));
        for s in &STABLES {
            actions.push(WiringAction::admin(LIQUIDATOR, WiringOp::SetKeeperRole { keeper: s.option }));
        }

        for s in &STABLES {
            actions.push(WiringAction::admin(
                s.option,
                WiringOp::SetUnderlyingAsset {
                    pair: s.eth_pair,
                    asset: ETH_ASSET,
                },
            ));
        }
        for s in &STABLES {
            actions.push(WiringAction::admin(
                s.option,
                WiringOp::SetUnderlyingAsset {
                    pair: s.btc_pair,
                    asset: BTC_ASSET,
                },
            ));
        }

        for op in [
            WiringOp::SetBroker { broker: BROKER },
            WiringOp::SetLiquidator { liquidator: LIQUIDATOR },
            WiringOp::SetBuyback { buyback: BUYBACK },
        ] {
            for s in &STABLES {
                actions.push(WiringAction::admin(s.option, op.clone()));
            }
        }

        for s in &STABLES {
            actions.push(WiringAction::admin(
                REWARD,
                WiringOp::SetReToken {
                    pool: s.public_pool,
                    index: s.index,
                },
            ));
        }

        actions
    }

    /// Checks declared order: every reference must come from an external, an earlier stage,
    /// or an earlier component of the same stage. Wiring may reference anything provisioned.
    pub fn validate(plan: &DeploymentPlan) -> Result<(), DeployError> {
        let mut available: Vec<&str> = plan.externals.clone();

        for stage in &plan.stages {
            for component in &stage.components {
                if let Some(missing) = component.dependencies().into_iter().find(|d| !available.contains(d)) {
                    return Err(DeployError::missing(component.name, missing));
                }
                available.push(component.name);
            }
        }

        for (index, action) in plan.wiring.iter().enumerate() {
            if let Some(missing) = action.references().into_iter().find(|r| !available.contains(r)) {
                return Err(DeployError::missing(format!("wiring action #{index} {action}"), missing));
            }
        }

        Ok(())
    }
}

fn mint(amount: &str) -> InitOp {
    InitOp::Mint {
        to: Authority::Administrator,
        // literals above always parse
        amount: TokenAmount::from_dec_str(amount).unwrap_or_default(),
    }
}

fn stable_params(key: fn(&Stable) -> &'static str) -> Vec<Param> {
    STABLES.iter().map(|s| Param::Component(key(s))).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::Creation;

    #[test]
    fn protocol_plan_is_correctly_ordered() {
        let plan = DependencyResolver::protocol_plan();
        assert!(DependencyResolver::validate(&plan).is_ok());
        assert_eq!(plan.stages.len(), 11);
        assert_eq!(plan.component_names().len(), 25);
    }

    #[test]
    fn stage_order_matches_the_dependency_chain() {
        let names: Vec<&str> = DependencyResolver::stages().iter().map(|s| s.name).collect();
        assert_eq!(
            names,
            vec![
                "price aggregators",
                "test tokens",
                "broker",
                "pricing formulas",
                "public pools",
                "reward distributor",
                "private pools",
                "option markets",
                "liquidator",
                "buyback",
                "underlying assets",
            ]
        );
    }

    #[test]
    fn swapped_stages_fail_validation() {
        let mut plan = DependencyResolver::protocol_plan();
        plan.stages.swap(4, 6);

        let err = DependencyResolver::validate(&plan).unwrap_err();
        assert!(matches!(
            err,
            DeployError::MissingDependency { ref component, ref dependency }
                if component == "DAIPrivatePoolAddr" && dependency == "DAIPublicPoolAddr"
        ));
    }

    #[test]
    fn wiring_to_unknown_component_fails_validation() {
        let mut plan = DependencyResolver::protocol_plan();
        plan.wiring.push(WiringAction::admin(BROKER, WiringOp::SetKeeperRole { keeper: "WBTCOptionAddr" }));

        assert!(matches!(
            DependencyResolver::validate(&plan),
            Err(DeployError::MissingDependency { ref dependency, .. }) if dependency == "WBTCOptionAddr"
        ));
    }

    #[test]
    fn token_supplies_are_literal() {
        let plan = DependencyResolver::protocol_plan();
        let tokens = plan.stage("test tokens").unwrap();
        let names: Vec<&str> = tokens.component_names().collect();
        assert_eq!(names, vec!["SLDAddr", "USDTAddr", "USDCAddr", "DAIAddr"]);

        for component in &tokens.components {
            let Creation::Deploy { init, .. } = &component.creation else {
                panic!("tokens are plain deployments");
            };
            let expected = if component.name == "SLDAddr" { SLD_SUPPLY } else { STABLE_SUPPLY };
            assert!(matches!(
                &init[..],
                [InitOp::Mint { amount, .. }] if amount.to_string() == expected
            ));
        }
    }

    #[test]
    fn wiring_list_shape() {
        let wiring = DependencyResolver::wiring();
        assert_eq!(wiring.len(), 52);

        let approvals = wiring.iter().take_while(|a| a.authority == Authority::Treasury).count();
        assert_eq!(approvals, 9);
        for (i, token) in ["DAIAddr", "USDTAddr", "USDCAddr"].into_iter().enumerate() {
            let spenders: Vec<&WiringOp> = wiring[i * 3..i * 3 + 3]
                .iter()
                .inspect(|a| assert_eq!(a.target, token))
                .map(|a| &a.op)
                .collect();
            assert_eq!(
                spenders,
                vec![
                    &WiringOp::Approve { spender: "DAIOptionAddr" },
                    &WiringOp::Approve { spender: REWARD },
                    &WiringOp::Approve { spender: LIQUIDATOR },
                ]
            );
        }
        assert!(wiring[approvals..].iter().all(|a| a.authority == Authority::Administrator));

        // the pool keeper points at the option of the same stablecoin
        assert!(wiring.contains(&WiringAction::admin(
            "DAIPublicPoolAddr",
            WiringOp::SetKeeper { keeper: "DAIOptionAddr" }
        )));
        assert_eq!(
            wiring.last(),
            Some(&WiringAction::admin(
                REWARD,
                WiringOp::SetReToken {
                    pool: "USDCPublicPoolAddr",
                    index: 3
                }
            ))
        );
    }

    #[test]
    fn aggregator_children_use_fixed_slots() {
        let stage = DependencyResolver::stages().remove(0);
        let slots: Vec<u64> = stage
            .components
            .iter()
            .filter_map(|c| match c.creation {
                Creation::FactoryChild { slot, .. } => Some(slot),
                _ => None,
            })
            .collect();
        assert_eq!(slots, vec![0, 1, 2]);
    }
}
