//! Voucher issuance for one meal period.
//!
//! Issuance is idempotent: users already holding a voucher for
//! `(user, today, meal)` are skipped, and the unique index on that
//! triple turns a lost race into a skip rather than a duplicate.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::NaiveDate;
use mealpass_core::clock::Clock;
use mealpass_core::eligibility::{self, Eligibility, EligibilityInput};
use mealpass_core::error::{MealPassError, MealPassResult};
use mealpass_core::models::employee::Employee;
use mealpass_core::models::meal::Meal;
use mealpass_core::models::opting_pivot::OptingPivot;
use mealpass_core::models::voucher::CreateVoucher;
use mealpass_core::repository::{
    EmployeeRepository, OptingPivotRepository, UserRepository, VoucherRepository,
};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// Outcome of one issuance run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueReport {
    pub meal: Meal,
    pub day: NaiveDate,
    /// Users eligible for the meal today.
    pub eligible: usize,
    pub issued: usize,
    /// Eligible users that already held a voucher.
    pub skipped_existing: usize,
    pub failed: usize,
}

/// Batch voucher issuer.
pub struct VoucherIssuer<U, E, P, V>
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

impl<U, E, P, V> VoucherIssuer<U, E, P, V>
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

    /// Issue today's vouchers for `meal` to every eligible user.
    #[instrument(skip(self))]
    pub async fn issue_vouchers_for_period(&self, meal: Meal) -> MealPassResult<IssueReport> {
        let now = self.clock.now();
        let day = now.date_naive();

        let (eligible, holders) = match self.load(meal, day).await {
            Ok(loaded) => loaded,
            Err(e) => {
                error!(error = %e, %day, "Voucher issuance failed");
                return Err(e);
            }
        };

        let mut report = IssueReport {
            meal,
            day,
            eligible: eligible.len(),
            issued: 0,
            skipped_existing: 0,
            failed: 0,
        };

        for user_id in eligible {
            if holders.contains(&user_id) {
                report.skipped_existing += 1;
                continue;
            }
            let input = CreateVoucher {
                user_id,
                date_of_use: day,
                meal,
                created_at: now,
            };
            match self.voucher_repo.create(input).await {
                Ok(_) => report.issued += 1,
                Err(MealPassError::AlreadyExists { .. }) => report.skipped_existing += 1,
                Err(e) => {
                    warn!(%user_id, error = %e, "Voucher creation failed");
                    report.failed += 1;
                }
            }
        }

        if report.failed > 0 && report.issued == 0 {
            error!(failed = report.failed, %day, "Voucher issuance failed");
        }
        info!(
            eligible = report.eligible,
            issued = report.issued,
            skipped = report.skipped_existing,
            failed = report.failed,
            "Voucher issuance finished"
        );
        Ok(report)
    }

    /// Today's eligibility for a single user, as issuance would see it.
    pub async fn eligibility_for_user(&self, user_id: Uuid) -> MealPassResult<Eligibility> {
        let day = self.clock.today();
        let user = self.user_repo.get_by_id(user_id).await?;
        let employee = self.employee_repo.get_by_id(user.employee_id).await?;
        let pivots = self.pivot_repo.list_active_for_user(user_id).await?;

        Ok(eligibility::resolve(&EligibilityInput {
            user: &user,
            employee: &employee,
            pivots: &pivots,
            day,
        }))
    }

    async fn load(&self, meal: Meal, day: NaiveDate) -> MealPassResult<(Vec<Uuid>, HashSet<Uuid>)> {
        let users = self.user_repo.list_enabled().await?;
        let employees: HashMap<Uuid, Employee> = self
            .employee_repo
            .list()
            .await?
            .into_iter()
            .map(|e| (e.id, e))
            .collect();

        let mut pivots: HashMap<Uuid, Vec<OptingPivot>> = HashMap::new();
        for pivot in self.pivot_repo.list_effective_on(day).await? {
            pivots.entry(pivot.user_id).or_default().push(pivot);
        }

        let mut eligible = Vec::new();
        for user in &users {
            let Some(employee) = employees.get(&user.employee_id) else {
                warn!(user_id = %user.id, employee_id = %user.employee_id, "User has no employee profile");
                continue;
            };
            let decision = eligibility::resolve(&EligibilityInput {
                user,
                employee,
                pivots: pivots.get(&user.id).map(Vec::as_slice).unwrap_or(&[]),
                day,
            });
            if decision.for_meal(meal) {
                eligible.push(user.id);
            }
        }

        let holders = self
            .voucher_repo
            .list_holders(day, meal)
            .await?
            .into_iter()
            .collect();
        Ok((eligible, holders))
    }
}
