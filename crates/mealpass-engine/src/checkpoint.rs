//! Meal-period checkpoint: reconciliation followed by issuance.

use mealpass_core::error::MealPassResult;
use mealpass_core::models::meal::Meal;
use mealpass_core::repository::{
    EmployeeRepository, OptingPivotRepository, UserRepository, VoucherRepository,
};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::issuer::{IssueReport, VoucherIssuer};
use crate::reconciler::{ReconcileReport, Reconciler};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckpointOutcome {
    Completed {
        reconcile: ReconcileReport,
        issue: IssueReport,
    },
    /// Another checkpoint held the guard; nothing was done.
    AlreadyRunning,
}

/// Runs checkpoints one at a time. A trigger that arrives while a run
/// is in progress is dropped, not queued.
pub struct CheckpointRunner<U, E, P, V>
where
    U: UserRepository,
    E: EmployeeRepository,
    P: OptingPivotRepository,
    V: VoucherRepository,
{
    reconciler: Reconciler<U, E, P, V>,
    issuer: VoucherIssuer<U, E, P, V>,
    guard: Mutex<()>,
}

impl<U, E, P, V> CheckpointRunner<U, E, P, V>
where
    U: UserRepository,
    E: EmployeeRepository,
    P: OptingPivotRepository,
    V: VoucherRepository,
{
    pub fn new(reconciler: Reconciler<U, E, P, V>, issuer: VoucherIssuer<U, E, P, V>) -> Self {
        Self {
            reconciler,
            issuer,
            guard: Mutex::new(()),
        }
    }

    pub fn issuer(&self) -> &VoucherIssuer<U, E, P, V> {
        &self.issuer
    }

    pub async fn run(&self, meal: Meal) -> MealPassResult<CheckpointOutcome> {
        let Ok(_running) = self.guard.try_lock() else {
            warn!(%meal, "Checkpoint already running, trigger dropped");
            return Ok(CheckpointOutcome::AlreadyRunning);
        };

        let reconcile = self.reconciler.reconcile(meal).await;
        if !reconcile.is_success() {
            warn!(%meal, failed = ?reconcile.failed_steps, "Issuing after partial reconciliation");
        }

        let issue = match self.issuer.issue_vouchers_for_period(meal).await {
            Ok(report) => report,
            Err(e) => {
                error!(%meal, error = %e, "Checkpoint failed");
                return Err(e);
            }
        };

        info!(%meal, issued = issue.issued, "Checkpoint completed");
        Ok(CheckpointOutcome::Completed { reconcile, issue })
    }
}
