//! Repository trait definitions for data access abstraction.
//!
//! All repository operations are async. Mutations that race with
//! request handlers (voucher redemption, counter changes, warning
//! escalation) are expressed as conditional updates: they return
//! `Ok(None)` when the expected prior state no longer holds instead of
//! writing blindly.

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::error::MealPassResult;
use crate::models::{
    employee::{CreateEmployee, Employee},
    meal::{Meal, TimeToFood},
    notification::{CreateNotification, Notification},
    opting_pivot::{ApprovalStatus, CreateOptingPivot, OptingPivot, PivotStatus},
    user::{CreateUser, OptStatus, PermanentOptOut, User},
    voucher::{AbsenceCount, CreateVoucher, Voucher},
};

pub trait EmployeeRepository: Send + Sync {
    fn create(&self, input: CreateEmployee) -> impl Future<Output = MealPassResult<Employee>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = MealPassResult<Employee>> + Send;
    fn list(&self) -> impl Future<Output = MealPassResult<Vec<Employee>>> + Send;
    fn list_by_time_to_food(
        &self,
        time_to_food: TimeToFood,
    ) -> impl Future<Output = MealPassResult<Vec<Employee>>> + Send;
}

pub trait UserRepository: Send + Sync {
    fn create(&self, input: CreateUser) -> impl Future<Output = MealPassResult<User>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = MealPassResult<User>> + Send;
    /// Users that are active and not suspended.
    fn list_enabled(&self) -> impl Future<Output = MealPassResult<Vec<User>>> + Send;
    /// Set the cached opt status unless the user is permanently opted
    /// out. Returns `None` when nothing was updated.
    fn set_temporary_status(
        &self,
        id: Uuid,
        status: OptStatus,
        now: DateTime<Utc>,
    ) -> impl Future<Output = MealPassResult<Option<User>>> + Send;
    /// Unconditionally set the cached opt status (admin decisions).
    fn set_opt_status(
        &self,
        id: Uuid,
        status: OptStatus,
        now: DateTime<Utc>,
    ) -> impl Future<Output = MealPassResult<User>> + Send;
    /// Decrement the permanent opt-out counter, set `opt-out-perm` and
    /// record the history pivot in one transaction. Applies only while
    /// the counter is positive, the status is one of `allowed_from`, the
    /// user is enabled and any approved notification is still pending.
    /// Returns `None`, with nothing written, otherwise.
    fn apply_permanent_opt_out(
        &self,
        change: PermanentOptOut,
        now: DateTime<Utc>,
    ) -> impl Future<Output = MealPassResult<Option<User>>> + Send;
    /// Force `opt-in` for enabled users of the given employees who are
    /// not permanently opted out. Returns the number of users touched.
    fn restore_opt_in_for_employees(
        &self,
        employee_ids: &[Uuid],
        now: DateTime<Utc>,
    ) -> impl Future<Output = MealPassResult<u64>> + Send;
    /// Increment the absence warning counter from `expected` to
    /// `expected + 1`.
    fn increment_absent_warning(
        &self,
        id: Uuid,
        expected: u32,
        now: DateTime<Utc>,
    ) -> impl Future<Output = MealPassResult<Option<User>>> + Send;
    /// Revoke portal access. Returns `None` if already suspended.
    fn suspend(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> impl Future<Output = MealPassResult<Option<User>>> + Send;
}

pub trait OptingPivotRepository: Send + Sync {
    fn create(
        &self,
        input: CreateOptingPivot,
        now: DateTime<Utc>,
    ) -> impl Future<Output = MealPassResult<OptingPivot>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = MealPassResult<OptingPivot>> + Send;
    /// Active, approved pivots whose window covers `day`.
    fn list_effective_on(
        &self,
        day: NaiveDate,
    ) -> impl Future<Output = MealPassResult<Vec<OptingPivot>>> + Send;
    /// Active pivots of a user, any window.
    fn list_active_for_user(
        &self,
        user_id: Uuid,
    ) -> impl Future<Output = MealPassResult<Vec<OptingPivot>>> + Send;
    /// Active, approved pivots of `status` whose window starts on `day`.
    fn list_starting_on(
        &self,
        status: PivotStatus,
        day: NaiveDate,
    ) -> impl Future<Output = MealPassResult<Vec<OptingPivot>>> + Send;
    /// Active, approved pivots of `status` whose window ended on or
    /// before `day`.
    fn list_ended_by(
        &self,
        status: PivotStatus,
        day: NaiveDate,
    ) -> impl Future<Output = MealPassResult<Vec<OptingPivot>>> + Send;
    /// Pivots of a user overlapping `[since, until)`, active or not.
    fn list_for_user_between(
        &self,
        user_id: Uuid,
        since: NaiveDate,
        until: NaiveDate,
    ) -> impl Future<Output = MealPassResult<Vec<OptingPivot>>> + Send;
    fn deactivate(&self, id: Uuid) -> impl Future<Output = MealPassResult<()>> + Send;
}

pub trait VoucherRepository: Send + Sync {
    fn create(&self, input: CreateVoucher) -> impl Future<Output = MealPassResult<Voucher>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = MealPassResult<Voucher>> + Send;
    /// Users already holding a voucher for `(day, meal)`.
    fn list_holders(
        &self,
        day: NaiveDate,
        meal: Meal,
    ) -> impl Future<Output = MealPassResult<Vec<Uuid>>> + Send;
    /// Unscanned, active vouchers of a user created after
    /// `valid_since` and no later than `now`, newest first.
    fn list_redeemable_for_user(
        &self,
        user_id: Uuid,
        valid_since: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> impl Future<Output = MealPassResult<Vec<Voucher>>> + Send;
    /// Compare-and-swap redemption: marks the voucher scanned and
    /// inactive only if it belongs to `user_id`, is unscanned, active
    /// and was created after `valid_since` and no later than `now`.
    /// Returns `None` when any of those no longer holds.
    fn mark_redeemed(
        &self,
        id: Uuid,
        user_id: Uuid,
        valid_since: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> impl Future<Output = MealPassResult<Option<Voucher>>> + Send;
    /// Deactivate every still-active voucher created before `until`.
    fn expire_created_before(
        &self,
        until: DateTime<Utc>,
    ) -> impl Future<Output = MealPassResult<u64>> + Send;
    /// Absence counts (unscanned and inactive) per user for vouchers
    /// created at or after `since`.
    fn count_absences_since(
        &self,
        since: DateTime<Utc>,
    ) -> impl Future<Output = MealPassResult<Vec<AbsenceCount>>> + Send;
    fn list_for_user_since(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> impl Future<Output = MealPassResult<Vec<Voucher>>> + Send;
}

pub trait NotificationRepository: Send + Sync {
    fn create(
        &self,
        input: CreateNotification,
        now: DateTime<Utc>,
    ) -> impl Future<Output = MealPassResult<Notification>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = MealPassResult<Notification>> + Send;
    /// Record an admin decision on a pending notification. Returns
    /// `None` if it was already decided.
    fn decide(
        &self,
        id: Uuid,
        approval: ApprovalStatus,
        now: DateTime<Utc>,
    ) -> impl Future<Output = MealPassResult<Option<Notification>>> + Send;
    fn list_pending(&self) -> impl Future<Output = MealPassResult<Vec<Notification>>> + Send;
}
