//! Absence accounting and warning escalation.
//!
//! An absence is an issued voucher that was never scanned and is no
//! longer active. Users over the period threshold climb the warning
//! counter one step per run; a monthly run that takes the counter to
//! the maximum revokes portal access.

use std::sync::Arc;

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use mealpass_core::clock::{Clock, is_last_saturday_of_month, start_of_day};
use mealpass_core::error::MealPassResult;
use mealpass_core::models::user::{OptStatus, User};
use mealpass_core::models::voucher::AbsenceCount;
use mealpass_core::repository::{
    EmployeeRepository, OptingPivotRepository, UserRepository, VoucherRepository,
};
use tracing::{info, instrument, warn};

use crate::config::{AbsencePeriod, EngineConfig};
use crate::mail::{MailNotifier, WarningKind, WarningMail, build_scan_history};

/// Periods due on `day`: weekly every Saturday, monthly first on the
/// last Saturday of the month.
pub fn accounting_periods(day: NaiveDate) -> Vec<AbsencePeriod> {
    if day.weekday() != Weekday::Sat {
        return Vec::new();
    }
    if is_last_saturday_of_month(day) {
        vec![AbsencePeriod::Monthly, AbsencePeriod::Weekly]
    } else {
        vec![AbsencePeriod::Weekly]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbsenceReport {
    pub period: AbsencePeriod,
    pub since: NaiveDate,
    pub over_threshold: usize,
    pub warned: usize,
    pub suspended: usize,
    /// Suspended, out of scope, or already at the warning cap.
    pub skipped: usize,
    pub failed: usize,
    pub mail_failures: usize,
}

enum Action {
    Skipped,
    Notified { kind: WarningKind, mail_sent: bool },
}

pub struct AbsenceAccountant<U, E, P, V, M>
where
    U: UserRepository,
    E: EmployeeRepository,
    P: OptingPivotRepository,
    V: VoucherRepository,
    M: MailNotifier,
{
    user_repo: U,
    employee_repo: E,
    pivot_repo: P,
    voucher_repo: V,
    mailer: M,
    config: EngineConfig,
    clock: Arc<dyn Clock>,
}

impl<U, E, P, V, M> AbsenceAccountant<U, E, P, V, M>
where
    U: UserRepository,
    E: EmployeeRepository,
    P: OptingPivotRepository,
    V: VoucherRepository,
    M: MailNotifier,
{
    pub fn new(
        user_repo: U,
        employee_repo: E,
        pivot_repo: P,
        voucher_repo: V,
        mailer: M,
        config: EngineConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            user_repo,
            employee_repo,
            pivot_repo,
            voucher_repo,
            mailer,
            config,
            clock,
        }
    }

    /// Run every period due today.
    pub async fn run_due(&self) -> MealPassResult<Vec<AbsenceReport>> {
        let mut reports = Vec::new();
        for period in accounting_periods(self.clock.today()) {
            reports.push(self.run_absence_accounting(period).await?);
        }
        Ok(reports)
    }

    #[instrument(skip(self), fields(period = period.as_str()))]
    pub async fn run_absence_accounting(&self, period: AbsencePeriod) -> MealPassResult<AbsenceReport> {
        let today = self.clock.today();
        let policy = self.config.policy(period);
        let since = today - Duration::days(policy.lookback_days);

        let counts = self
            .voucher_repo
            .count_absences_since(start_of_day(since))
            .await?;

        let mut report = AbsenceReport {
            period,
            since,
            over_threshold: 0,
            warned: 0,
            suspended: 0,
            skipped: 0,
            failed: 0,
            mail_failures: 0,
        };

        for count in counts.into_iter().filter(|c| c.absent_count > policy.threshold) {
            report.over_threshold += 1;
            let user_id = count.user_id;
            match self.account_user(period, &count, since, today).await {
                Ok(Action::Skipped) => report.skipped += 1,
                Ok(Action::Notified { kind, mail_sent }) => {
                    match kind {
                        WarningKind::Warning => report.warned += 1,
                        WarningKind::AccessRestricted => report.suspended += 1,
                    }
                    if !mail_sent {
                        report.mail_failures += 1;
                    }
                }
                Err(e) => {
                    warn!(%user_id, error = %e, "Absence accounting failed for user");
                    report.failed += 1;
                }
            }
        }

        info!(
            over_threshold = report.over_threshold,
            warned = report.warned,
            suspended = report.suspended,
            skipped = report.skipped,
            failed = report.failed,
            mail_failures = report.mail_failures,
            "Absence accounting finished"
        );
        Ok(report)
    }

    async fn account_user(
        &self,
        period: AbsencePeriod,
        count: &AbsenceCount,
        since: NaiveDate,
        today: NaiveDate,
    ) -> MealPassResult<Action> {
        let now = self.clock.now();
        let user = self.user_repo.get_by_id(count.user_id).await?;
        if user.is_deleted {
            return Ok(Action::Skipped);
        }
        let employee = self.employee_repo.get_by_id(user.employee_id).await?;
        if !employee.is_wfh && user.opt_status == OptStatus::OptOutPerm {
            return Ok(Action::Skipped);
        }

        let max = self.config.max_absent_warnings;
        let kind = match period {
            AbsencePeriod::Weekly => {
                if user.absent_warning_counter >= max {
                    return Ok(Action::Skipped);
                }
                if self.escalate(&user).await?.is_none() {
                    return Ok(Action::Skipped);
                }
                WarningKind::Warning
            }
            AbsencePeriod::Monthly => {
                let reached = if user.absent_warning_counter >= max {
                    true
                } else {
                    match self.escalate(&user).await? {
                        Some(updated) => updated.absent_warning_counter >= max,
                        None => return Ok(Action::Skipped),
                    }
                };
                if reached {
                    self.user_repo.suspend(user.id, now).await?;
                    info!(user_id = %user.id, "Portal access revoked");
                    WarningKind::AccessRestricted
                } else {
                    WarningKind::Warning
                }
            }
        };

        let vouchers = self
            .voucher_repo
            .list_for_user_since(user.id, start_of_day(since))
            .await?;
        let pivots = self
            .pivot_repo
            .list_for_user_between(user.id, since, today)
            .await?;

        let mail = WarningMail {
            user_id: user.id,
            email: user.email.clone(),
            full_name: employee.full_name(),
            employee_number: employee.employee_number.clone(),
            kind,
            period,
            absent_count: count.absent_count,
            history: build_scan_history(since, today, &vouchers, &pivots),
        };

        let mail_sent = match self.mailer.send_warning(mail).await {
            Ok(()) => true,
            Err(e) => {
                warn!(user_id = %user.id, error = %e, "Warning mail not delivered");
                false
            }
        };
        Ok(Action::Notified { kind, mail_sent })
    }

    async fn escalate(&self, user: &User) -> MealPassResult<Option<User>> {
        let updated = self
            .user_repo
            .increment_absent_warning(user.id, user.absent_warning_counter, self.clock.now())
            .await?;
        if updated.is_none() {
            warn!(user_id = %user.id, "Warning counter changed concurrently");
        }
        Ok(updated)
    }
}
