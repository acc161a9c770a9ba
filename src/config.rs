//! Per-run configuration.

use crate::executor::DEFAULT_STEP_LIMIT;
use crate::utils::ids;

/// Options resolved when a run is started through
/// [`Executor::run_configured`](crate::executor::Executor::run_configured).
///
/// A missing `run_id` is filled with a generated one; a missing `step_limit`
/// disables the defensive non-termination guard.
#[derive(Clone, Debug)]
pub struct RunConfig {
    pub run_id: Option<String>,
    pub step_limit: Option<u64>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            run_id: Some(ids::run_id()),
            step_limit: Some(DEFAULT_STEP_LIMIT),
        }
    }
}

impl RunConfig {
    pub fn new(run_id: Option<String>, step_limit: Option<u64>) -> Self {
        Self { run_id, step_limit }
    }
}
