//! Voucher redemption and lookup of the voucher to present.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use mealpass_core::clock::{Clock, DailyWindow, window_contains};
use mealpass_core::error::{MealPassError, MealPassResult};
use mealpass_core::models::meal::Meal;
use mealpass_core::models::voucher::Voucher;
use mealpass_core::repository::{EmployeeRepository, UserRepository, VoucherRepository};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::config::EngineConfig;

/// Result of a scan. Every variant other than `Success` leaves the
/// voucher untouched.
#[derive(Debug, Clone, PartialEq)]
pub enum RedeemOutcome {
    Success(Voucher),
    NotFound,
    WrongOwner,
    AlreadyScanned,
    Expired,
}

impl RedeemOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RedeemOutcome::Success(_))
    }
}

pub struct RedemptionService<U, E, V>
where
    U: UserRepository,
    E: EmployeeRepository,
    V: VoucherRepository,
{
    user_repo: U,
    employee_repo: E,
    voucher_repo: V,
    config: EngineConfig,
    clock: Arc<dyn Clock>,
}

impl<U, E, V> RedemptionService<U, E, V>
where
    U: UserRepository,
    E: EmployeeRepository,
    V: VoucherRepository,
{
    pub fn new(
        user_repo: U,
        employee_repo: E,
        voucher_repo: V,
        config: EngineConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            user_repo,
            employee_repo,
            voucher_repo,
            config,
            clock,
        }
    }

    fn valid_since(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - Duration::hours(self.config.voucher_validity_hours)
    }

    fn window(&self, meal: Meal) -> DailyWindow {
        match meal {
            Meal::Lunch => self.config.lunch_window,
            Meal::Dinner => self.config.dinner_window,
        }
    }

    /// Redeem `voucher_id` on behalf of `user_id`.
    ///
    /// The conditional update is the only write. When it matches
    /// nothing the voucher is re-read to classify the failure; that read
    /// never feeds back into a write.
    #[instrument(skip(self))]
    pub async fn redeem(&self, voucher_id: Uuid, user_id: Uuid) -> MealPassResult<RedeemOutcome> {
        let now = self.clock.now();

        if let Some(voucher) = self
            .voucher_repo
            .mark_redeemed(voucher_id, user_id, self.valid_since(now), now)
            .await?
        {
            info!(%voucher_id, %user_id, meal = %voucher.meal, "Voucher redeemed");
            return Ok(RedeemOutcome::Success(voucher));
        }

        let voucher = match self.voucher_repo.get_by_id(voucher_id).await {
            Ok(v) => v,
            Err(MealPassError::NotFound { .. }) => return Ok(RedeemOutcome::NotFound),
            Err(e) => return Err(e),
        };

        let outcome = if voucher.user_id != user_id {
            RedeemOutcome::WrongOwner
        } else if voucher.is_scanned {
            RedeemOutcome::AlreadyScanned
        } else {
            RedeemOutcome::Expired
        };
        debug!(%voucher_id, %user_id, ?outcome, "Redemption refused");
        Ok(outcome)
    }

    /// The voucher the user should present right now.
    ///
    /// Only vouchers whose meal the employee is subscribed to and whose
    /// service window (opened on the voucher's day) contains now are
    /// returned.
    pub async fn get_active_voucher(&self, user_id: Uuid) -> MealPassResult<Voucher> {
        let now = self.clock.now();
        let user = self.user_repo.get_by_id(user_id).await?;
        let employee = self.employee_repo.get_by_id(user.employee_id).await?;
        let time_to_food = employee.time_to_food;

        let candidates = self
            .voucher_repo
            .list_redeemable_for_user(user_id, self.valid_since(now), now)
            .await?;

        candidates
            .into_iter()
            .find(|voucher| {
                let (start, end) = self.window(voucher.meal).bounds_on(voucher.date_of_use);
                time_to_food.includes(voucher.meal) && window_contains(now, start, end)
            })
            .ok_or_else(|| MealPassError::not_found("voucher", user_id))
    }
}
