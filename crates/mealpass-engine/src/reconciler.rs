//! Opt-state reconciliation run before every issuance checkpoint.
//!
//! Keeps the cached `opt_status` on users in step with pivot history
//! and retires vouchers from earlier days. Steps run in a fixed order; each is
//! best-effort, so a failed step is recorded and the next one still
//! runs.

use std::fmt;
use std::sync::Arc;

use chrono::NaiveDate;
use mealpass_core::clock::{Clock, start_of_day};
use mealpass_core::error::MealPassResult;
use mealpass_core::models::meal::{Meal, TimeToFood};
use mealpass_core::models::opting_pivot::PivotStatus;
use mealpass_core::models::user::OptStatus;
use mealpass_core::repository::{
    EmployeeRepository, OptingPivotRepository, UserRepository, VoucherRepository,
};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileStep {
    VoucherExpiry,
    WfhExceptions,
    TemporaryBoundaries,
    BlanketRestore,
}

impl fmt::Display for ReconcileStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ReconcileStep::VoucherExpiry => "voucher-expiry",
            ReconcileStep::WfhExceptions => "wfh-exceptions",
            ReconcileStep::TemporaryBoundaries => "temporary-boundaries",
            ReconcileStep::BlanketRestore => "blanket-restore",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    pub meal: Meal,
    pub day: NaiveDate,
    pub expired_vouchers: u64,
    /// WFH temporary opt-ins in force today.
    pub wfh_exceptions: usize,
    /// Users restored to opt-in because their window has ended.
    pub ended_windows: usize,
    /// Users moved to opt-out-temp because their window starts today.
    pub started_windows: usize,
    pub restored_users: u64,
    pub failed_steps: Vec<ReconcileStep>,
}

impl ReconcileReport {
    pub fn is_success(&self) -> bool {
        self.failed_steps.is_empty()
    }
}

pub struct Reconciler<U, E, P, V>
where
    U: UserRepository,
    E: EmployeeRepository,
    P: OptingPivotRepository,
    V: VoucherRepository,
{
    user_repo: U,
    employee_repo: E,
    pivot_repo: P,
    voucher_repo: V,
    clock: Arc<dyn Clock>,
}

impl<U, E, P, V> Reconciler<U, E, P, V>
where
    U: UserRepository,
    E: EmployeeRepository,
    P: OptingPivotRepository,
    V: VoucherRepository,
{
    pub fn new(
        user_repo: U,
        employee_repo: E,
        pivot_repo: P,
        voucher_repo: V,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            user_repo,
            employee_repo,
            pivot_repo,
            voucher_repo,
            clock,
        }
    }

    #[instrument(skip(self))]
    pub async fn reconcile(&self, meal: Meal) -> ReconcileReport {
        let day = self.clock.today();
        let mut report = ReconcileReport {
            meal,
            day,
            expired_vouchers: 0,
            wfh_exceptions: 0,
            ended_windows: 0,
            started_windows: 0,
            restored_users: 0,
            failed_steps: Vec::new(),
        };

        match self.expire_vouchers(day).await {
            Ok(n) => report.expired_vouchers = n,
            Err(e) => fail(&mut report, ReconcileStep::VoucherExpiry, e),
        }

        match self.count_wfh_exceptions(day).await {
            Ok(n) => report.wfh_exceptions = n,
            Err(e) => fail(&mut report, ReconcileStep::WfhExceptions, e),
        }

        match self.sweep_boundaries(day).await {
            Ok((ended, started)) => {
                report.ended_windows = ended;
                report.started_windows = started;
            }
            Err(e) => fail(&mut report, ReconcileStep::TemporaryBoundaries, e),
        }

        match self.restore_lunch_dinner().await {
            Ok(n) => report.restored_users = n,
            Err(e) => fail(&mut report, ReconcileStep::BlanketRestore, e),
        }

        info!(
            expired = report.expired_vouchers,
            wfh = report.wfh_exceptions,
            ended = report.ended_windows,
            started = report.started_windows,
            restored = report.restored_users,
            success = report.is_success(),
            "Reconciliation finished"
        );
        report
    }

    /// Deactivate every voucher created before today. This covers the
    /// previous business day and anything a failed run left behind.
    async fn expire_vouchers(&self, day: NaiveDate) -> MealPassResult<u64> {
        self.voucher_repo
            .expire_created_before(start_of_day(day))
            .await
    }

    /// WFH exceptions are derived by the eligibility resolver from
    /// pivots; nothing is written here.
    async fn count_wfh_exceptions(&self, day: NaiveDate) -> MealPassResult<usize> {
        let pivots = self.pivot_repo.list_effective_on(day).await?;
        Ok(pivots
            .iter()
            .filter(|p| p.status == PivotStatus::OptInTemporarily)
            .count())
    }

    /// Ends before starts, so back-to-back windows leave the user
    /// opted out. Windows that ended on a day without a checkpoint are
    /// closed on the next run.
    async fn sweep_boundaries(&self, day: NaiveDate) -> MealPassResult<(usize, usize)> {
        let now = self.clock.now();

        let mut ended = 0;
        for pivot in self
            .pivot_repo
            .list_ended_by(PivotStatus::OptOutTemporarily, day)
            .await?
        {
            if self
                .user_repo
                .set_temporary_status(pivot.user_id, OptStatus::OptIn, now)
                .await?
                .is_some()
            {
                ended += 1;
            }
            self.pivot_repo.deactivate(pivot.id).await?;
        }

        let mut started = 0;
        for pivot in self
            .pivot_repo
            .list_starting_on(PivotStatus::OptOutTemporarily, day)
            .await?
        {
            if self
                .user_repo
                .set_temporary_status(pivot.user_id, OptStatus::OptOutTemp, now)
                .await?
                .is_some()
            {
                started += 1;
            } else {
                warn!(user_id = %pivot.user_id, "Temporary window start skipped");
            }
        }

        Ok((ended, started))
    }

    /// Lunch-dinner employees opt out per meal through pivots, so their
    /// cached status goes back to opt-in.
    async fn restore_lunch_dinner(&self) -> MealPassResult<u64> {
        let ids: Vec<Uuid> = self
            .employee_repo
            .list_by_time_to_food(TimeToFood::LunchDinner)
            .await?
            .into_iter()
            .map(|e| e.id)
            .collect();
        if ids.is_empty() {
            return Ok(0);
        }
        self.user_repo
            .restore_opt_in_for_employees(&ids, self.clock.now())
            .await
    }
}

fn fail(report: &mut ReconcileReport, step: ReconcileStep, err: impl fmt::Display) {
    error!(%step, error = %err, "Reconciliation step failed");
    report.failed_steps.push(step);
}
