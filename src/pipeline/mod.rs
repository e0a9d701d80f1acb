// 13.0: the deployment pipeline. gate check, registry load, stages in declared order,
// then the wiring list. single thread, one confirmed transaction at a time.

mod core;
mod results;

pub use core::{deploy, Signers};
pub use results::{DeployError, RunOutcome, RunSummary, StageReport};
