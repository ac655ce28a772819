//! SurrealDB implementation of [`UserRepository`].
//!
//! Every state change is an `UPDATE ... WHERE` on the expected prior
//! state; an empty result means the condition no longer held. The
//! permanent opt-out also writes its history pivot, so it runs as one
//! transaction.

use chrono::{DateTime, Utc};
use mealpass_core::error::MealPassResult;
use mealpass_core::models::user::{
    CreateUser, DEFAULT_OPT_OUT_COUNTER, OptStatus, PermanentOptOut, User,
};
use mealpass_core::repository::UserRepository;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use super::{format_date, parse_enum, parse_uuid};
use crate::error::{DbError, retry_on_conflict};

const ENTITY: &str = "user";

/// Counter decrement, status change, history pivot and optional
/// request approval, all or nothing.
const APPLY_PERMANENT_OPT_OUT: &str = "
BEGIN TRANSACTION;
LET $open = IF $notification = NONE { true } ELSE {
    (SELECT VALUE is_admin_approved
     FROM type::record('notification', $notification))[0] = 'pending'
};
LET $updated = (UPDATE type::record('user', $id) SET
    counter -= 1,
    opt_status = 'opt-out-perm',
    updated_at = $now
    WHERE counter > 0
    AND opt_status IN $allowed
    AND is_active = true AND is_deleted = false
    AND $open = true);
IF array::len($updated) > 0 {
    CREATE type::record('opting_pivot', $pivot_id) SET
        user_id = $id,
        opt_out_pivot_status = $status,
        opt_out_time_from = $time_from,
        opt_out_time_to = $time_to,
        meal_opted_out = $meal_opted_out,
        is_active = true,
        is_admin_approved = $approval,
        created_at = $now;
    IF $notification != NONE {
        UPDATE type::record('notification', $notification) SET
            is_admin_approved = 'approved',
            updated_at = $now;
    };
};
COMMIT TRANSACTION;
";

/// Row struct for queries where the UUID is already known.
#[derive(Debug, SurrealValue)]
struct UserRow {
    employee_id: String,
    email: String,
    opt_status: String,
    counter: u32,
    absent_warning_counter: u32,
    is_active: bool,
    is_deleted: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, SurrealValue)]
struct UserRowWithId {
    record_id: String,
    employee_id: String,
    email: String,
    opt_status: String,
    counter: u32,
    absent_warning_counter: u32,
    is_active: bool,
    is_deleted: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl UserRow {
    fn into_user(self, id: Uuid) -> Result<User, DbError> {
        Ok(User {
            id,
            employee_id: parse_uuid(ENTITY, "employee_id", &self.employee_id)?,
            email: self.email,
            opt_status: parse_enum(ENTITY, &self.opt_status)?,
            counter: self.counter,
            absent_warning_counter: self.absent_warning_counter,
            is_active: self.is_active,
            is_deleted: self.is_deleted,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

impl UserRowWithId {
    fn try_into_user(self) -> Result<User, DbError> {
        let id = parse_uuid(ENTITY, "id", &self.record_id)?;
        UserRow {
            employee_id: self.employee_id,
            email: self.email,
            opt_status: self.opt_status,
            counter: self.counter,
            absent_warning_counter: self.absent_warning_counter,
            is_active: self.is_active,
            is_deleted: self.is_deleted,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
        .into_user(id)
    }
}

/// SurrealDB implementation of the User repository.
#[derive(Clone)]
pub struct SurrealUserRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealUserRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }

    /// Run a conditional single-record update and return the row it
    /// produced, if the condition held.
    async fn update_one(
        &self,
        sql: &'static str,
        id: Uuid,
        binds: Vec<(&'static str, String)>,
        now: DateTime<Utc>,
    ) -> Result<Option<User>, DbError> {
        retry_on_conflict(|| {
            let binds = binds.clone();
            async move {
                let mut query = self
                    .db
                    .query(sql)
                    .bind(("id", id.to_string()))
                    .bind(("now", now));
                for (key, value) in binds {
                    query = query.bind((key, value));
                }
                let mut result = query
                    .await?
                    .check()
                    .map_err(|e| DbError::from_statement(ENTITY, e))?;
                let rows: Vec<UserRow> = result.take(0)?;
                rows.into_iter().next().map(|row| row.into_user(id)).transpose()
            }
        })
        .await
    }
}

impl<C: Connection> UserRepository for SurrealUserRepository<C> {
    async fn create(&self, input: CreateUser) -> MealPassResult<User> {
        let id = Uuid::new_v4();
        let id_str = id.to_string();
        let now = Utc::now();

        let result = self
            .db
            .query(
                "CREATE type::record('user', $id) SET \
                 employee_id = $employee_id, \
                 email = $email, \
                 opt_status = $opt_status, \
                 counter = $counter, \
                 absent_warning_counter = 0, \
                 is_active = true, \
                 is_deleted = false, \
                 created_at = $now, \
                 updated_at = $now",
            )
            .bind(("id", id_str.clone()))
            .bind(("employee_id", input.employee_id.to_string()))
            .bind(("email", input.email))
            .bind((
                "opt_status",
                input.opt_status.unwrap_or(OptStatus::OptIn).as_str().to_string(),
            ))
            .bind(("counter", input.counter.unwrap_or(DEFAULT_OPT_OUT_COUNTER)))
            .bind(("now", now))
            .await
            .map_err(DbError::from)?;

        let mut result = result
            .check()
            .map_err(|e| DbError::from_statement(ENTITY, e))?;

        let rows: Vec<UserRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: ENTITY.into(),
            id: id_str,
        })?;

        Ok(row.into_user(id)?)
    }

    async fn get_by_id(&self, id: Uuid) -> MealPassResult<User> {
        let id_str = id.to_string();

        let mut result = self
            .db
            .query("SELECT * FROM type::record('user', $id)")
            .bind(("id", id_str.clone()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<UserRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: ENTITY.into(),
            id: id_str,
        })?;

        Ok(row.into_user(id)?)
    }

    async fn list_enabled(&self) -> MealPassResult<Vec<User>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM user \
                 WHERE is_active = true AND is_deleted = false \
                 ORDER BY created_at ASC",
            )
            .await
            .map_err(DbError::from)?;

        let rows: Vec<UserRowWithId> = result.take(0).map_err(DbError::from)?;
        let users = rows
            .into_iter()
            .map(|row| row.try_into_user())
            .collect::<Result<Vec<_>, DbError>>()?;
        Ok(users)
    }

    async fn set_temporary_status(
        &self,
        id: Uuid,
        status: OptStatus,
        now: DateTime<Utc>,
    ) -> MealPassResult<Option<User>> {
        Ok(self
            .update_one(
                "UPDATE type::record('user', $id) SET \
                 opt_status = $status, updated_at = $now \
                 WHERE opt_status != 'opt-out-perm' AND is_deleted = false",
                id,
                vec![("status", status.as_str().to_string())],
                now,
            )
            .await?)
    }

    async fn set_opt_status(
        &self,
        id: Uuid,
        status: OptStatus,
        now: DateTime<Utc>,
    ) -> MealPassResult<User> {
        let updated = self
            .update_one(
                "UPDATE type::record('user', $id) SET \
                 opt_status = $status, updated_at = $now",
                id,
                vec![("status", status.as_str().to_string())],
                now,
            )
            .await?;
        Ok(updated.ok_or_else(|| DbError::NotFound {
            entity: ENTITY.into(),
            id: id.to_string(),
        })?)
    }

    async fn apply_permanent_opt_out(
        &self,
        change: PermanentOptOut,
        now: DateTime<Utc>,
    ) -> MealPassResult<Option<User>> {
        let id = change.pivot.user_id;
        let pivot_id = Uuid::new_v4().to_string();
        let allowed: Vec<String> = change
            .allowed_from
            .iter()
            .map(|s| s.as_str().to_string())
            .collect();
        let notification = change.approves.map(|n| n.to_string());
        let status = change.pivot.status;
        let approval = change.pivot.approval;
        let time_from = format_date(change.pivot.time_from);
        let time_to = format_date(change.pivot.time_to);
        let meal_opted_out = i64::from(change.pivot.meal_opted_out.code());

        retry_on_conflict(|| {
            let allowed = allowed.clone();
            let notification = notification.clone();
            let pivot_id = pivot_id.clone();
            let time_from = time_from.clone();
            let time_to = time_to.clone();
            async move {
                self.db
                    .query(APPLY_PERMANENT_OPT_OUT)
                    .bind(("id", id.to_string()))
                    .bind(("allowed", allowed))
                    .bind(("notification", notification))
                    .bind(("pivot_id", pivot_id))
                    .bind(("status", status.as_str().to_string()))
                    .bind(("time_from", time_from))
                    .bind(("time_to", time_to))
                    .bind(("meal_opted_out", meal_opted_out))
                    .bind(("approval", approval.as_str().to_string()))
                    .bind(("now", now))
                    .await?
                    .check()
                    .map_err(|e| DbError::from_statement(ENTITY, e))?;
                Ok(())
            }
        })
        .await?;

        // The pivot exists only if the transaction applied the change.
        let mut result = self
            .db
            .query("SELECT VALUE user_id FROM type::record('opting_pivot', $pivot_id)")
            .bind(("pivot_id", pivot_id))
            .await
            .map_err(DbError::from)?;
        let applied: Vec<String> = result.take(0).map_err(DbError::from)?;
        if applied.is_empty() {
            return Ok(None);
        }

        self.get_by_id(id).await.map(Some)
    }

    async fn restore_opt_in_for_employees(
        &self,
        employee_ids: &[Uuid],
        now: DateTime<Utc>,
    ) -> MealPassResult<u64> {
        if employee_ids.is_empty() {
            return Ok(0);
        }
        let ids: Vec<String> = employee_ids.iter().map(Uuid::to_string).collect();

        let touched = retry_on_conflict(|| {
            let ids = ids.clone();
            async move {
                let mut result = self
                    .db
                    .query(
                        "UPDATE user SET opt_status = 'opt-in', updated_at = $now \
                         WHERE employee_id IN $ids \
                         AND opt_status = 'opt-out-temp' \
                         AND is_active = true AND is_deleted = false",
                    )
                    .bind(("ids", ids))
                    .bind(("now", now))
                    .await?
                    .check()
                    .map_err(|e| DbError::from_statement(ENTITY, e))?;
                let rows: Vec<UserRow> = result.take(0)?;
                Ok(rows.len() as u64)
            }
        })
        .await?;

        Ok(touched)
    }

    async fn increment_absent_warning(
        &self,
        id: Uuid,
        expected: u32,
        now: DateTime<Utc>,
    ) -> MealPassResult<Option<User>> {
        let id_str = id.to_string();

        let updated = retry_on_conflict(|| {
            let id_str = id_str.clone();
            async move {
                let mut result = self
                    .db
                    .query(
                        "UPDATE type::record('user', $id) SET \
                         absent_warning_counter += 1, updated_at = $now \
                         WHERE absent_warning_counter = $expected \
                         AND is_deleted = false",
                    )
                    .bind(("id", id_str))
                    .bind(("expected", expected))
                    .bind(("now", now))
                    .await?
                    .check()
                    .map_err(|e| DbError::from_statement(ENTITY, e))?;
                let rows: Vec<UserRow> = result.take(0)?;
                rows.into_iter().next().map(|row| row.into_user(id)).transpose()
            }
        })
        .await?;

        Ok(updated)
    }

    async fn suspend(&self, id: Uuid, now: DateTime<Utc>) -> MealPassResult<Option<User>> {
        Ok(self
            .update_one(
                "UPDATE type::record('user', $id) SET \
                 is_deleted = true, updated_at = $now \
                 WHERE is_deleted = false",
                id,
                Vec::new(),
                now,
            )
            .await?)
    }
}
