//! Opt request service: temporary and permanent opt-outs, WFH
//! temporary opt-ins and the admin approval flow.
//!
//! Every request is validated here; accepted requests land as pivots
//! or notifications, and the reconciler moves the cached user status
//! at the next checkpoint. Permanent opt-outs change the user row
//! immediately through a conditional counter update.

use std::sync::Arc;

use chrono::{DateTime, Months, NaiveDate, NaiveTime, Utc};
use mealpass_core::clock::{Clock, at_time_on};
use mealpass_core::error::{MealPassError, MealPassResult};
use mealpass_core::models::meal::{Meal, MealSelection};
use mealpass_core::models::notification::{CreateNotification, Notification, NotificationType};
use mealpass_core::models::opting_pivot::{
    ApprovalStatus, CreateOptingPivot, OptingPivot, PivotStatus,
};
use mealpass_core::models::user::{OptStatus, PermanentOptOut, User};
use mealpass_core::repository::{
    EmployeeRepository, NotificationRepository, OptingPivotRepository, UserRepository,
};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::EngineError;

pub struct OptService<U, E, P, N>
where
    U: UserRepository,
    E: EmployeeRepository,
    P: OptingPivotRepository,
    N: NotificationRepository,
{
    user_repo: U,
    employee_repo: E,
    pivot_repo: P,
    notification_repo: N,
    config: EngineConfig,
    clock: Arc<dyn Clock>,
}

impl<U, E, P, N> OptService<U, E, P, N>
where
    U: UserRepository,
    E: EmployeeRepository,
    P: OptingPivotRepository,
    N: NotificationRepository,
{
    pub fn new(
        user_repo: U,
        employee_repo: E,
        pivot_repo: P,
        notification_repo: N,
        config: EngineConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            user_repo,
            employee_repo,
            pivot_repo,
            notification_repo,
            config,
            clock,
        }
    }

    async fn enabled_user(&self, user_id: Uuid) -> MealPassResult<User> {
        let user = self.user_repo.get_by_id(user_id).await?;
        if !user.is_enabled() {
            return Err(EngineError::UserDisabled.into());
        }
        Ok(user)
    }

    fn check_range(from: NaiveDate, to: NaiveDate, today: NaiveDate) -> Result<(), EngineError> {
        if from >= to || from < today {
            return Err(EngineError::InvalidDateRange { from, to });
        }
        Ok(())
    }

    fn cutoff(&self, meal: Meal) -> NaiveTime {
        match meal {
            Meal::Lunch => self.config.lunch_opt_out_cutoff,
            Meal::Dinner => self.config.dinner_opt_out_cutoff,
        }
    }

    /// Opt out of `selection` for the days `[from, to)`.
    #[instrument(skip(self))]
    pub async fn opt_out_for_period(
        &self,
        user_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
        selection: MealSelection,
    ) -> MealPassResult<OptingPivot> {
        let now = self.clock.now();
        let today = now.date_naive();

        // 1. Requester and dates.
        let user = self.enabled_user(user_id).await?;
        if user.opt_status == OptStatus::OptOutPerm {
            return Err(EngineError::AlreadyOptedOut.into());
        }
        Self::check_range(from, to, today)?;

        // 2. Meal selection against the subscription.
        let employee = self.employee_repo.get_by_id(user.employee_id).await?;
        let time_to_food = employee.time_to_food;
        match time_to_food.fixed_meal() {
            None if selection == MealSelection::Unspecified => {
                return Err(EngineError::MealSelectionRequired.into());
            }
            Some(meal) if !selection.covers(meal, time_to_food) => {
                return Err(EngineError::InvalidMealSelection.into());
            }
            _ => {}
        }
        let meals: Vec<Meal> = selection
            .meals(time_to_food)
            .into_iter()
            .filter(|meal| time_to_food.includes(*meal))
            .collect();

        // 3. Same-day cutoffs.
        if from == today {
            if let Some(meal) = meals
                .iter()
                .copied()
                .find(|meal| now >= at_time_on(today, self.cutoff(*meal)))
            {
                return Err(EngineError::CutoffPassed(meal).into());
            }
        }

        // 4. No overlap with another opt-out for a shared meal.
        let existing = self.pivot_repo.list_active_for_user(user_id).await?;
        let overlapping = existing.iter().any(|p| {
            p.status == PivotStatus::OptOutTemporarily
                && p.approval != ApprovalStatus::Rejected
                && p.overlaps(from, to)
                && p.meal_opted_out
                    .meals(time_to_food)
                    .iter()
                    .any(|meal| meals.contains(meal))
        });
        if overlapping {
            return Err(EngineError::OverlappingWindow("opt-out").into());
        }

        let pivot = self
            .pivot_repo
            .create(
                CreateOptingPivot {
                    user_id,
                    status: PivotStatus::OptOutTemporarily,
                    time_from: from,
                    time_to: to,
                    meal_opted_out: selection,
                    approval: ApprovalStatus::Approved,
                },
                now,
            )
            .await?;
        info!(%user_id, pivot_id = %pivot.id, %from, %to, "Temporary opt-out recorded");
        Ok(pivot)
    }

    /// WFH exception: receive vouchers for `[from, to)` despite a
    /// permanent opt-out.
    #[instrument(skip(self))]
    pub async fn temporary_opt_in(
        &self,
        user_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> MealPassResult<OptingPivot> {
        let now = self.clock.now();
        let user = self.enabled_user(user_id).await?;
        Self::check_range(from, to, now.date_naive())?;

        let employee = self.employee_repo.get_by_id(user.employee_id).await?;
        if !employee.is_wfh {
            return Err(EngineError::NotWorkFromHome.into());
        }

        let existing = self.pivot_repo.list_active_for_user(user_id).await?;
        if existing.iter().any(|p| {
            p.status == PivotStatus::OptInTemporarily
                && p.approval != ApprovalStatus::Rejected
                && p.overlaps(from, to)
        }) {
            return Err(EngineError::OverlappingWindow("opt-in").into());
        }

        let pivot = self
            .pivot_repo
            .create(
                CreateOptingPivot {
                    user_id,
                    status: PivotStatus::OptInTemporarily,
                    time_from: from,
                    time_to: to,
                    meal_opted_out: MealSelection::Unspecified,
                    approval: ApprovalStatus::Approved,
                },
                now,
            )
            .await?;
        info!(%user_id, pivot_id = %pivot.id, %from, %to, "Temporary opt-in recorded");
        Ok(pivot)
    }

    /// Consume one permanent opt-out.
    #[instrument(skip(self))]
    pub async fn opt_out_permanent(&self, user_id: Uuid) -> MealPassResult<User> {
        let now = self.clock.now();
        let user = self.enabled_user(user_id).await?;
        let employee = self.employee_repo.get_by_id(user.employee_id).await?;

        if let Some(meal) = employee.time_to_food.fixed_meal() {
            let blackout = match meal {
                Meal::Lunch => self.config.lunch_blackout(),
                Meal::Dinner => self.config.dinner_blackout(),
            };
            if blackout.contains(now) {
                return Err(EngineError::BlackoutWindow(meal).into());
            }
        }

        match user.opt_status {
            OptStatus::OptIn => {}
            OptStatus::OptOutPerm => return Err(EngineError::AlreadyOptedOut.into()),
            OptStatus::OptOutTemp => return Err(EngineError::NotOptedIn.into()),
        }
        if user.counter == 0 {
            return Err(EngineError::CounterExhausted.into());
        }

        let allowed_from = vec![OptStatus::OptIn];
        let change = PermanentOptOut {
            allowed_from: allowed_from.clone(),
            pivot: self.permanent_pivot(user_id, now.date_naive())?,
            approves: None,
        };
        let Some(updated) = self.user_repo.apply_permanent_opt_out(change, now).await? else {
            let current = self.user_repo.get_by_id(user_id).await?;
            return Err(refusal(&current, &allowed_from).into());
        };

        info!(%user_id, remaining = updated.counter, "Permanent opt-out applied");
        Ok(updated)
    }

    /// Ask an admin to restore opt-in.
    #[instrument(skip(self))]
    pub async fn request_opt_in(&self, user_id: Uuid) -> MealPassResult<Notification> {
        let user = self.enabled_user(user_id).await?;
        if user.opt_status == OptStatus::OptIn {
            return Err(EngineError::AlreadyOptedIn.into());
        }
        if user.counter == 0 {
            return Err(EngineError::CounterExhausted.into());
        }

        let pending = self.notification_repo.list_pending().await?;
        if pending
            .iter()
            .any(|n| n.user_id == user_id && n.notification_type == NotificationType::OptIn)
        {
            return Err(EngineError::RequestPending.into());
        }

        let notification = self
            .notification_repo
            .create(
                CreateNotification {
                    user_id,
                    notification_type: NotificationType::OptIn,
                    details: format!("{} requests opt-in from {}", user.email, user.opt_status.as_str()),
                },
                self.clock.now(),
            )
            .await?;
        info!(%user_id, notification_id = %notification.id, "Opt-in requested");
        Ok(notification)
    }

    /// Record an admin decision and apply its effect when approved.
    #[instrument(skip(self))]
    pub async fn resolve_notification(
        &self,
        notification_id: Uuid,
        approval: ApprovalStatus,
    ) -> MealPassResult<Notification> {
        if approval == ApprovalStatus::Pending {
            return Err(EngineError::InvalidDecision.into());
        }
        let now = self.clock.now();

        let notification = self.notification_repo.get_by_id(notification_id).await?;
        if notification.approval != ApprovalStatus::Pending {
            return Err(EngineError::NotificationDecided.into());
        }

        if approval == ApprovalStatus::Approved
            && notification.notification_type == NotificationType::OptOutPerm
        {
            return self.approve_permanent_opt_out(notification, now).await;
        }

        let decided = self
            .notification_repo
            .decide(notification_id, approval, now)
            .await?
            .ok_or(EngineError::NotificationDecided)?;

        if approval == ApprovalStatus::Approved {
            let user_id = decided.user_id;
            self.user_repo
                .set_opt_status(user_id, OptStatus::OptIn, now)
                .await?;
            info!(%user_id, "Opt-in restored");
        }

        Ok(decided)
    }

    /// The approval and its counter effect commit together; a request
    /// that can no longer be honoured stays pending.
    async fn approve_permanent_opt_out(
        &self,
        notification: Notification,
        now: DateTime<Utc>,
    ) -> MealPassResult<Notification> {
        let user_id = notification.user_id;
        let notification_id = notification.id;
        let allowed_from = vec![OptStatus::OptIn, OptStatus::OptOutTemp];
        let change = PermanentOptOut {
            allowed_from: allowed_from.clone(),
            pivot: self.permanent_pivot(user_id, now.date_naive())?,
            approves: Some(notification_id),
        };

        if self
            .user_repo
            .apply_permanent_opt_out(change, now)
            .await?
            .is_none()
        {
            let current = self.notification_repo.get_by_id(notification_id).await?;
            if current.approval != ApprovalStatus::Pending {
                return Err(EngineError::NotificationDecided.into());
            }
            let user = self.user_repo.get_by_id(user_id).await?;
            let err = refusal(&user, &allowed_from);
            warn!(%user_id, %notification_id, error = %err, "Approved opt-out could not be applied");
            return Err(err.into());
        }

        info!(%user_id, "Permanent opt-out approved");
        self.notification_repo.get_by_id(notification_id).await
    }

    /// Temporary windows of the user that start today or later.
    pub async fn upcoming_windows(&self, user_id: Uuid) -> MealPassResult<Vec<OptingPivot>> {
        let today = self.clock.today();
        let pivots = self.pivot_repo.list_active_for_user(user_id).await?;
        Ok(pivots
            .into_iter()
            .filter(|p| p.status != PivotStatus::OptOutPermanently && p.time_from >= today)
            .collect())
    }

    fn permanent_pivot(
        &self,
        user_id: Uuid,
        today: NaiveDate,
    ) -> MealPassResult<CreateOptingPivot> {
        let until = today
            .checked_add_months(Months::new(self.config.permanent_opt_out_months))
            .ok_or_else(|| MealPassError::Internal(format!("date overflow from {today}")))?;

        Ok(CreateOptingPivot {
            user_id,
            status: PivotStatus::OptOutPermanently,
            time_from: today,
            time_to: until,
            meal_opted_out: MealSelection::Unspecified,
            approval: ApprovalStatus::Approved,
        })
    }
}

/// Why a permanent opt-out did not apply to `user`.
fn refusal(user: &User, allowed_from: &[OptStatus]) -> EngineError {
    if !user.is_enabled() {
        EngineError::UserDisabled
    } else if user.opt_status == OptStatus::OptOutPerm {
        EngineError::AlreadyOptedOut
    } else if !allowed_from.contains(&user.opt_status) {
        EngineError::NotOptedIn
    } else {
        EngineError::CounterExhausted
    }
}
