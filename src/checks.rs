// src/checks.rs

//! Sandbox budget enforcement.
//!
//! Budgets come from `grader.yaml` (see `config::Budgets`). The wall-clock
//! budget is also enforced while waiting on the child; this check catches
//! the rest once the child has exited.

use crate::config::Budgets;
use crate::metrics::InvocationMetrics;
use crate::sandbox::SandboxError;

/// Budget values in the units the checks compare against.
#[derive(Debug, Clone)]
pub struct BudgetsResolved {
    /// Maximum allowed duration in milliseconds
    pub duration_ms: u64,

    /// Maximum allowed peak memory in KB (RSS)
    pub memory_kb: Option<u64>,

    /// Per-call timeout inside the sandbox
    pub call_timeout_ms: u64,
}

impl From<&Budgets> for BudgetsResolved {
    fn from(b: &Budgets) -> Self {
        Self {
            duration_ms: b.duration_ms,
            memory_kb: (b.memory_mb > 0).then(|| b.memory_mb * 1024),
            call_timeout_ms: b.call_timeout_ms,
        }
    }
}

/// Fails if any budget was exceeded.
///
/// A missing memory sample is not a failure: very short runs often finish
/// before the first sample.
pub fn check_budgets(
    metrics: &InvocationMetrics,
    budgets: &BudgetsResolved,
) -> Result<(), SandboxError> {
    if metrics.duration_ms > u128::from(budgets.duration_ms) {
        return Err(SandboxError::TimedOut {
            limit_ms: budgets.duration_ms,
        });
    }

    if let (Some(max_mem_kb), Some(actual_kb)) = (budgets.memory_kb, metrics.max_rss_kb) {
        if actual_kb > max_mem_kb {
            return Err(SandboxError::MemoryExceeded {
                used_mb: actual_kb / 1024,
                limit_mb: max_mem_kb / 1024,
            });
        }
    }

    Ok(())
}
