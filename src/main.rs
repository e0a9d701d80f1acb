//! ShieldEx deployment runner.
//!
//! Provisions the protocol stage by stage against a ledger backend, records every
//! address in the registry as it goes, then wires the components together.
//! An interrupted run is resumed by running the same command again.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use shield_deploy::config::DEFAULT_REGISTRY_PATH;
use shield_deploy::*;

// first account of the default local dev chain
const DEV_ADMIN: &str = "0x90F8bf6A479f320ead074411a4B0e7944Ea8c9C1";

/// ShieldEx deployment runner
#[derive(Parser, Debug)]
#[command(name = "shield-deploy")]
#[command(about = "Provision and wire the ShieldEx protocol components")]
struct Cli {
    /// Address registry document
    #[arg(long, env = "SHIELD_REGISTRY", default_value = DEFAULT_REGISTRY_PATH, global = true)]
    registry: PathBuf,

    /// Simulated ledger state file. In-memory only when omitted
    #[arg(long, env = "SHIELD_LEDGER_STATE", global = true)]
    ledger_state: Option<PathBuf>,

    /// Administrator address, signs creations and wiring
    #[arg(long, env = "SHIELD_ADMIN", default_value = DEV_ADMIN, global = true)]
    admin: String,

    /// Treasury address, signs token approvals. Defaults to the registry's RiskFundAddr
    #[arg(long, env = "SHIELD_TREASURY", global = true)]
    treasury: Option<String>,

    /// Confirmations to wait for per transaction. Defaults to the network preset
    #[arg(long, global = true)]
    confirmations: Option<u32>,

    /// Debug logging (RUST_LOG still wins)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run every stage, then the wiring list
    Deploy {
        /// Target network. "test" and "coverage" are skipped entirely
        #[arg(short, long, env = "SHIELD_NETWORK", default_value = "development")]
        network: String,

        /// Don't read the wiring back after applying it
        #[arg(long)]
        no_verify: bool,
    },
    /// Print the declared stages and wiring list and check their order
    Plan,
    /// Print the registry
    Show,
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("{0}")]
    Deploy(#[from] DeployError),

    #[error("ledger state: {0}")]
    Ledger(#[from] LedgerError),

    #[error("registry: {0}")]
    Registry(#[from] RegistryError),

    #[error("invalid {flag} address {value:?}")]
    InvalidAddress { flag: &'static str, value: String },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(CliError::Deploy(e)) => {
            error!(kind = e.kind(), "{e}");
            error!("deployment aborted. fix the cause and re-run, recorded components are kept");
            ExitCode::FAILURE
        }
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    // a second init only happens under test harnesses
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

fn run(cli: &Cli) -> Result<(), CliError> {
    match &cli.command {
        Command::Deploy { network, no_verify } => run_deploy(cli, network, *no_verify),
        Command::Plan => print_plan(),
        Command::Show => {
            let registry = AddressRegistry::load(&cli.registry)?;
            println!("{}", registry.render()?);
            Ok(())
        }
    }
}

fn run_deploy(cli: &Cli, network: &str, no_verify: bool) -> Result<(), CliError> {
    let mut config = DeployConfig::for_network(network).with_registry(&cli.registry);
    if let Some(confirmations) = cli.confirmations {
        config = config.with_confirmations(confirmations);
    }
    if no_verify {
        config.verify_wiring = false;
    }

    let mut signers = Signers::new(parse_address("--admin", &cli.admin)?);
    if let Some(treasury) = &cli.treasury {
        signers = signers.with_treasury(parse_address("--treasury", treasury)?);
    }

    let mut ledger = match &cli.ledger_state {
        Some(path) => SimulatedLedger::open(path)?,
        None => SimulatedLedger::new(),
    };

    let plan = DependencyResolver::protocol_plan();
    let outcome = deploy(&config, &plan, &mut ledger, &signers);

    // chain state survives a failed run, same as on a real network
    let skipped = matches!(outcome, Ok(RunOutcome::Skipped { .. }));
    if let (Some(path), false) = (&cli.ledger_state, skipped) {
        if let Err(e) = ledger.save(path) {
            if outcome.is_ok() {
                return Err(e.into());
            }
            error!("ledger state not saved: {e}");
        }
    }

    match outcome? {
        RunOutcome::Skipped { network } => {
            info!(network = %network, "ephemeral network, registry left untouched");
        }
        RunOutcome::Completed(summary) => {
            let stats = ledger.stats();
            info!(
                deployments = stats.deployments,
                spawns = stats.spawns,
                calls = stats.calls,
                "ledger activity"
            );
            println!("========================= Deployment Summary =========================");
            println!("{}", summary.registry);
        }
    }
    Ok(())
}

fn print_plan() -> Result<(), CliError> {
    let plan = DependencyResolver::protocol_plan();
    DependencyResolver::validate(&plan)?;

    println!("externals: {}", plan.externals.join(", "));
    for (index, stage) in plan.stages.iter().enumerate() {
        println!("\nstage {}: {}", index + 1, stage.name);
        for component in &stage.components {
            let deps = component.dependencies();
            if deps.is_empty() {
                println!("  {} ({})", component.name, component.artifact);
            } else {
                println!("  {} ({}) <- {}", component.name, component.artifact, deps.join(", "));
            }
        }
    }

    println!("\nwiring:");
    for (index, action) in plan.wiring.iter().enumerate() {
        println!("  {index:>2}. {action}");
    }
    Ok(())
}

fn parse_address(flag: &'static str, value: &str) -> Result<Address, CliError> {
    Address::new(value)
        .filter(|address| address.as_str().starts_with("0x"))
        .ok_or_else(|| CliError::InvalidAddress {
            flag,
            value: value.to_string(),
        })
}
