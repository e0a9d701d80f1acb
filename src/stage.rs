// 10.0 stage.rs: runs one stage against the registry.
// 10.1 per component: resolve dependencies, then bind if recorded, else create and record.
// the registry entry is written only after the creation routine fully confirmed,
// so a crash mid-component means the next run creates it again.

use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use crate::abi::{AbiValue, Call, Deployment, Effect};
use crate::component::{Artifact, ComponentDescriptor, Creation, InitOp, Param, Stage};
use crate::events::{ComponentBoundEvent, ComponentCreatedEvent, EventLog, EventPayload, StageCompletedEvent};
use crate::ledger::{deploy_confirmed, invoke_confirmed, Ledger, LedgerError};
use crate::pipeline::{DeployError, StageReport};
use crate::registry::AddressRegistry;
use crate::types::{Address, Identities, TxHash};

// field the aggregator factory records its children under
const FACTORY_CHILDREN: &str = "aggregators";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Created,
    Adopted,
    Bound,
    // operator-seeded, never created here
    External,
}

/// A live component the rest of the run can address, however it came to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handle {
    pub name: String,
    pub address: Address,
    pub artifact: Option<Artifact>,
    pub origin: Origin,
}

#[derive(Debug, Clone, Default)]
pub struct Handles {
    by_name: BTreeMap<String, Handle>,
}

impl Handles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, handle: Handle) {
        self.by_name.insert(handle.name.clone(), handle);
    }

    pub fn get(&self, name: &str) -> Option<&Handle> {
        self.by_name.get(name)
    }

    pub fn address(&self, name: &str) -> Option<&Address> {
        self.by_name.get(name).map(|h| &h.address)
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Handle> {
        self.by_name.values()
    }
}

pub struct StageRunner<'a, L: Ledger + ?Sized> {
    ledger: &'a mut L,
    identities: &'a Identities,
    confirmations: u32,
    handles: Handles,
    events: EventLog,
}

impl<'a, L: Ledger + ?Sized> StageRunner<'a, L> {
    pub fn new(ledger: &'a mut L, identities: &'a Identities, confirmations: u32) -> Self {
        Self {
            ledger,
            identities,
            confirmations,
            handles: Handles::new(),
            events: EventLog::new(),
        }
    }

    pub fn handles(&self) -> &Handles {
        &self.handles
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    pub fn into_parts(self) -> (Handles, EventLog) {
        (self.handles, self.events)
    }

    pub fn run_stage(&mut self, stage: &Stage, registry: &mut AddressRegistry) -> Result<StageReport, DeployError> {
        let mut report = StageReport {
            stage: stage.name.to_string(),
            ..StageReport::default()
        };

        for component in &stage.components {
            let origin = self.provision(component, registry)?;
            let name = component.name.to_string();
            match origin {
                Origin::Created => report.created.push(name),
                Origin::Adopted => report.adopted.push(name),
                Origin::Bound | Origin::External => report.bound.push(name),
            }
        }

        let reused = report.adopted.len() + report.bound.len();
        info!(
            stage = stage.name,
            created = report.created.len(),
            reused,
            "stage complete"
        );
        self.events.emit(EventPayload::StageCompleted(StageCompletedEvent {
            stage: stage.name.to_string(),
            created: report.created.len(),
            reused,
        }));

        Ok(report)
    }

    /// Binds an operator-seeded entry. Returns false when the registry has no such key.
    pub fn bind_external(&mut self, name: &str, registry: &AddressRegistry) -> Result<bool, DeployError> {
        match registry.get(name)? {
            Some(address) => {
                debug!(name, %address, "external bound");
                self.handles.insert(Handle {
                    name: name.to_string(),
                    address,
                    artifact: None,
                    origin: Origin::External,
                });
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn provision(&mut self, component: &ComponentDescriptor, registry: &mut AddressRegistry) -> Result<Origin, DeployError> {
        let dependencies = self.resolve_dependencies(component, registry)?;
        let args = self.resolve_args(component, registry, &dependencies)?;

        if let Some(address) = registry.get(component.name)? {
            self.bind(component, address, Origin::Bound)?;
            return Ok(Origin::Bound);
        }

        let (address, origin) = match &component.creation {
            Creation::Deploy { init, .. } => {
                let (address, tx, init_calls) = self.create(component, args, init)?;
                self.record(component, registry, &address)?;
                info!(name = component.name, %address, "{} created", component.label);
                self.events.emit(EventPayload::ComponentCreated(ComponentCreatedEvent {
                    name: component.name.to_string(),
                    artifact: component.artifact,
                    address: address.clone(),
                    tx_hash: tx,
                    init_calls,
                }));
                (address, Origin::Created)
            }
            Creation::FactoryChild { factory, slot, .. } => {
                let factory_address = dependencies.get(factory).cloned().ok_or_else(|| DeployError::missing(component.name, *factory))?;
                self.factory_child(component, registry, &factory_address, *slot, args)?
            }
        };

        self.handles.insert(Handle {
            name: component.name.to_string(),
            address,
            artifact: Some(component.artifact),
            origin,
        });
        Ok(origin)
    }

    fn resolve_dependencies(
        &self,
        component: &ComponentDescriptor,
        registry: &AddressRegistry,
    ) -> Result<BTreeMap<&'static str, Address>, DeployError> {
        let mut resolved = BTreeMap::new();
        for dependency in component.dependencies() {
            let address = registry
                .get(dependency)?
                .ok_or_else(|| DeployError::missing(component.name, dependency))?;
            resolved.insert(dependency, address);
        }
        Ok(resolved)
    }

    fn resolve_args(
        &self,
        component: &ComponentDescriptor,
        registry: &AddressRegistry,
        dependencies: &BTreeMap<&'static str, Address>,
    ) -> Result<Vec<AbiValue>, DeployError> {
        let mut args = Vec::new();
        for param in component.creation.params() {
            match param {
                Param::Literal(value) => args.push(value.clone()),
                Param::Component(name) => {
                    let address = dependencies
                        .get(name)
                        .cloned()
                        .ok_or_else(|| DeployError::missing(component.name, *name))?;
                    args.push(AbiValue::Address(address));
                }
                Param::Identity(authority) => {
                    args.push(AbiValue::Address(self.identities.for_authority(*authority).address.clone()));
                }
                Param::PriceHistory(history) => {
                    let points = history.resolve(registry)?;
                    args.push(AbiValue::UintArray(points.iter().map(|p| p.timestamp).collect()));
                    args.push(AbiValue::UintArray(points.iter().map(|p| p.value).collect()));
                }
            }
        }
        Ok(args)
    }

    fn bind(&mut self, component: &ComponentDescriptor, address: Address, origin: Origin) -> Result<(), DeployError> {
        let failure = |source| DeployError::ProvisioningFailure {
            component: component.name.to_string(),
            source,
        };

        match self.ledger.code_at(&address) {
            Some(artifact) if artifact == component.artifact => {}
            Some(artifact) => {
                return Err(failure(LedgerError::Mismatch {
                    target: address,
                    slot: "code".to_string(),
                    expected: component.artifact.to_string(),
                    actual: artifact.to_string(),
                }))
            }
            None => return Err(failure(LedgerError::NoCode { address })),
        }

        info!(name = component.name, %address, "{} already deployed", component.label);
        let event = ComponentBoundEvent {
            name: component.name.to_string(),
            artifact: component.artifact,
            address: address.clone(),
        };
        self.events.emit(match origin {
            Origin::Adopted => EventPayload::ComponentAdopted(event),
            _ => EventPayload::ComponentBound(event),
        });
        self.handles.insert(Handle {
            name: component.name.to_string(),
            address,
            artifact: Some(component.artifact),
            origin,
        });
        Ok(())
    }

    // deploy, then run the init calls. nothing is recorded until all of them confirmed
    fn create(
        &mut self,
        component: &ComponentDescriptor,
        args: Vec<AbiValue>,
        init: &[InitOp],
    ) -> Result<(Address, TxHash, usize), DeployError> {
        let failure = |source| DeployError::ProvisioningFailure {
            component: component.name.to_string(),
            source,
        };

        let deployment = Deployment::new(component.artifact, args);
        debug!(name = component.name, "deploying {deployment}");
        let (address, receipt) =
            deploy_confirmed(&mut *self.ledger, &deployment, &self.identities.admin, self.confirmations).map_err(failure)?;

        for op in init {
            let call = op.to_call(&address, self.identities);
            debug!(name = component.name, "init {call}");
            invoke_confirmed(&mut *self.ledger, &call, &self.identities.admin, self.confirmations).map_err(failure)?;
        }

        Ok((address, receipt.tx_hash, init.len()))
    }

    fn factory_child(
        &mut self,
        component: &ComponentDescriptor,
        registry: &mut AddressRegistry,
        factory: &Address,
        slot: u64,
        args: Vec<AbiValue>,
    ) -> Result<(Address, Origin), DeployError> {
        let key = [AbiValue::uint(slot)];

        // factory already made it on an earlier, interrupted run
        if let Some(existing) = self.read_child(factory, &key) {
            warn!(name = component.name, address = %existing, "adopting unrecorded factory child");
            self.bind(component, existing.clone(), Origin::Adopted)?;
            self.record(component, registry, &existing)?;
            return Ok((existing, Origin::Adopted));
        }

        let call = Call::new(
            factory.clone(),
            "createAggregator",
            args,
            Effect::Spawn {
                artifact: component.artifact,
                field: FACTORY_CHILDREN.to_string(),
                key: key.to_vec(),
            },
        );
        debug!(name = component.name, "spawning {call}");
        let receipt = invoke_confirmed(&mut *self.ledger, &call, &self.identities.admin, self.confirmations).map_err(|source| {
            DeployError::ProvisioningFailure {
                component: component.name.to_string(),
                source,
            }
        })?;

        let address = self
            .read_child(factory, &key)
            .ok_or_else(|| DeployError::ProvisioningFailure {
                component: component.name.to_string(),
                source: LedgerError::Backend {
                    message: format!("factory {factory} reports no aggregator at slot {slot}"),
                },
            })?;

        self.record(component, registry, &address)?;
        info!(name = component.name, %address, "{} created", component.label);
        self.events.emit(EventPayload::ComponentCreated(ComponentCreatedEvent {
            name: component.name.to_string(),
            artifact: component.artifact,
            address: address.clone(),
            tx_hash: receipt.tx_hash,
            init_calls: 0,
        }));
        Ok((address, Origin::Created))
    }

    fn read_child(&self, factory: &Address, key: &[AbiValue]) -> Option<Address> {
        self.ledger
            .read(factory, FACTORY_CHILDREN, key)
            .and_then(|values| values.first().and_then(AbiValue::as_address).cloned())
            .filter(|address| !address.is_zero())
    }

    fn record(&self, component: &ComponentDescriptor, registry: &mut AddressRegistry, address: &Address) -> Result<(), DeployError> {
        registry
            .set(component.name, address)
            .map_err(|source| DeployError::ConfigWriteFailure {
                key: component.name.to_string(),
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::SimulatedLedger;
    use crate::types::{Authority, TokenAmount};

    fn ids() -> Identities {
        Identities::new(Address::new_unchecked("0xadmin"), Address::new_unchecked("0xfund"))
    }

    fn token(name: &'static str, symbol: &str) -> ComponentDescriptor {
        ComponentDescriptor::deploy(name, name, Artifact::MockToken, vec![Param::str(symbol), Param::str(symbol)])
            .with_init(InitOp::Mint {
                to: Authority::Administrator,
                amount: TokenAmount::from_u64(1_000),
            })
    }

    fn aggregators() -> Stage {
        Stage::new(
            "price aggregators",
            vec![
                ComponentDescriptor::deploy("FactoryAddr", "factory", Artifact::AggregatorFactory, vec![])
                    .with_init(InitOp::GrantKeeper { to: Authority::Administrator }),
                ComponentDescriptor::factory_child("ChildAddr", "child", "FactoryAddr", 0, vec![Param::str("ETHUSDT")]),
            ],
        )
    }

    #[test]
    fn creates_then_binds() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = AddressRegistry::load(dir.path().join("config.json")).unwrap();
        let mut ledger = SimulatedLedger::new();
        let identities = ids();
        let stage = Stage::new("tokens", vec![token("AAddr", "A"), token("BAddr", "B")]);

        let mut runner = StageRunner::new(&mut ledger, &identities, 1);
        let first = runner.run_stage(&stage, &mut registry).unwrap();
        assert_eq!(first.created, vec!["AAddr", "BAddr"]);
        let recorded = registry.get("AAddr").unwrap().unwrap();
        assert_eq!(runner.handles().address("AAddr"), Some(&recorded));

        let second = runner.run_stage(&stage, &mut registry).unwrap();
        assert!(second.created.is_empty());
        assert_eq!(second.bound, vec!["AAddr", "BAddr"]);
        assert_eq!(runner.handles().get("BAddr").unwrap().origin, Origin::Bound);
    }

    #[test]
    fn missing_dependency_stops_before_any_call() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = AddressRegistry::load(dir.path().join("config.json")).unwrap();
        let mut ledger = SimulatedLedger::new();
        let identities = ids();
        let broker = ComponentDescriptor::deploy(
            "BrokerAddr",
            "broker",
            Artifact::Broker,
            vec![Param::Component("DAIAddr")],
        );

        let mut runner = StageRunner::new(&mut ledger, &identities, 1);
        let err = runner.run_stage(&Stage::new("broker", vec![broker]), &mut registry).unwrap_err();
        assert!(matches!(
            err,
            DeployError::MissingDependency { ref component, ref dependency }
                if component == "BrokerAddr" && dependency == "DAIAddr"
        ));
        assert_eq!(ledger.submitted().len(), 0);
    }

    #[test]
    fn rejected_creation_leaves_registry_without_the_entry() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = AddressRegistry::load(dir.path().join("config.json")).unwrap();
        let mut ledger = SimulatedLedger::new();
        ledger.fail_creation_after(1);
        let identities = ids();
        let stage = Stage::new("tokens", vec![token("AAddr", "A"), token("BAddr", "B")]);

        let err = StageRunner::new(&mut ledger, &identities, 1)
            .run_stage(&stage, &mut registry)
            .unwrap_err();
        assert!(matches!(err, DeployError::ProvisioningFailure { ref component, .. } if component == "BAddr"));
        assert!(registry.contains("AAddr"));
        assert!(!registry.contains("BAddr"));
    }

    #[test]
    fn recorded_address_without_code_is_a_provisioning_failure() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = AddressRegistry::load(dir.path().join("config.json")).unwrap();
        registry.set("AAddr", &Address::new_unchecked("0xgone")).unwrap();
        let mut ledger = SimulatedLedger::new();
        let identities = ids();

        let err = StageRunner::new(&mut ledger, &identities, 1)
            .run_stage(&Stage::new("tokens", vec![token("AAddr", "A")]), &mut registry)
            .unwrap_err();
        assert!(matches!(
            err,
            DeployError::ProvisioningFailure { source: LedgerError::NoCode { .. }, .. }
        ));
    }

    #[test]
    fn factory_children_are_spawned_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = AddressRegistry::load(dir.path().join("config.json")).unwrap();
        let mut ledger = SimulatedLedger::new();
        let identities = ids();

        let report = StageRunner::new(&mut ledger, &identities, 1)
            .run_stage(&aggregators(), &mut registry)
            .unwrap();
        assert_eq!(report.created, vec!["FactoryAddr", "ChildAddr"]);

        let child = registry.get("ChildAddr").unwrap().unwrap();
        assert_eq!(ledger.code_at(&child), Some(Artifact::Aggregator));
        assert_eq!(ledger.stats().spawns, 1);
    }

    #[test]
    fn unrecorded_factory_child_is_adopted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut ledger = SimulatedLedger::new();
        let identities = ids();

        let mut registry = AddressRegistry::load(&path).unwrap();
        StageRunner::new(&mut ledger, &identities, 1)
            .run_stage(&aggregators(), &mut registry)
            .unwrap();
        let child = registry.get("ChildAddr").unwrap().unwrap();
        let factory = registry.get("FactoryAddr").unwrap().unwrap();

        // the child spawned but the process died before recording it
        let fresh = dir.path().join("resumed.json");
        let mut resumed = AddressRegistry::load(&fresh).unwrap();
        resumed.set("FactoryAddr", &factory).unwrap();
        ledger.reset_stats();

        let report = StageRunner::new(&mut ledger, &identities, 1)
            .run_stage(&aggregators(), &mut resumed)
            .unwrap();
        assert_eq!(report.adopted, vec!["ChildAddr"]);
        assert_eq!(resumed.get("ChildAddr").unwrap(), Some(child));
        assert_eq!(ledger.stats().creations(), 0);
    }

    #[test]
    fn externals_bind_without_ledger_checks() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = AddressRegistry::load(dir.path().join("config.json")).unwrap();
        registry.set("RiskFundAddr", &Address::new_unchecked("0xfund")).unwrap();
        let mut ledger = SimulatedLedger::new();
        let identities = ids();

        let mut runner = StageRunner::new(&mut ledger, &identities, 1);
        assert!(runner.bind_external("RiskFundAddr", &registry).unwrap());
        assert!(!runner.bind_external("OtherAddr", &registry).unwrap());
        assert_eq!(runner.handles().get("RiskFundAddr").unwrap().origin, Origin::External);
    }
}
