// 13.1 pipeline/core.rs: one full run. gate → registry → identities → stages → wiring → summary.
// the registry is passed down explicitly. no stage ever sees a global copy.

use tracing::{info, warn};

use super::results::{DeployError, RunOutcome, RunSummary};
use crate::config::DeployConfig;
use crate::ledger::Ledger;
use crate::network::NetworkGate;
use crate::plan::{DependencyResolver, DeploymentPlan, RISK_FUND};
use crate::registry::AddressRegistry;
use crate::stage::StageRunner;
use crate::types::{Address, Identities};
use crate::wiring::WiringEngine;

/// Signing addresses handed in by the caller. Treasury falls back to the registry's risk fund.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signers {
    pub admin: Address,
    pub treasury: Option<Address>,
}

impl Signers {
    pub fn new(admin: Address) -> Self {
        Self { admin, treasury: None }
    }

    pub fn with_treasury(mut self, treasury: Address) -> Self {
        self.treasury = Some(treasury);
        self
    }

    fn resolve(&self, registry: &AddressRegistry) -> Result<Identities, DeployError> {
        let treasury = match &self.treasury {
            Some(treasury) => treasury.clone(),
            None => registry
                .get(RISK_FUND)?
                .ok_or_else(|| DeployError::missing("treasury identity", RISK_FUND))?,
        };
        Ok(Identities::new(self.admin.clone(), treasury))
    }
}

/// Runs the whole plan against `ledger`. Every failure is fatal and leaves the registry
/// holding exactly the components that were fully created, so a re-run picks up from there.
pub fn deploy<L: Ledger + ?Sized>(
    config: &DeployConfig,
    plan: &DeploymentPlan,
    ledger: &mut L,
    signers: &Signers,
) -> Result<RunOutcome, DeployError> {
    let gate = NetworkGate::new(&config.network);
    if !gate.permits_provisioning() {
        info!(network = gate.network(), "ephemeral network, nothing to deploy");
        return Ok(RunOutcome::Skipped {
            network: gate.network().to_string(),
        });
    }

    config.validate()?;
    let mut registry = AddressRegistry::load(&config.registry_path)?;
    DependencyResolver::validate(plan)?;
    let identities = signers.resolve(&registry)?;

    info!(
        network = gate.network(),
        class = %gate.class(),
        backend = ledger.backend_type(),
        registry = %config.registry_path.display(),
        recorded = registry.len(),
        "starting deployment"
    );

    let mut runner = StageRunner::new(&mut *ledger, &identities, config.confirmations);
    let mut stages = Vec::with_capacity(plan.stages.len());
    for stage in &plan.stages {
        stages.push(runner.run_stage(stage, &mut registry)?);
    }
    for external in &plan.externals {
        if !runner.bind_external(external, &registry)? {
            warn!(name = *external, "external entry not seeded");
        }
    }
    let (handles, mut events) = runner.into_parts();

    let engine = WiringEngine::new(config);
    let wiring_applied = engine.apply_all(&plan.wiring, &handles, &identities, &mut *ledger, &mut events)?;
    if config.verify_wiring {
        engine.verify(&plan.wiring, &handles, &identities, &*ledger, &mut events)?;
    }

    let summary = RunSummary {
        network: gate.network().to_string(),
        class: gate.class(),
        backend: ledger.backend_type().to_string(),
        stages,
        wiring_applied,
        wiring_verified: config.verify_wiring,
        events: events.into_events(),
        registry: registry.render()?,
    };

    info!(
        created = summary.created().len(),
        adopted = summary.adopted().len(),
        bound = summary.bound().len(),
        wiring = summary.wiring_applied,
        flushes = registry.flush_count(),
        "deployment complete"
    );

    Ok(RunOutcome::Completed(summary))
}
