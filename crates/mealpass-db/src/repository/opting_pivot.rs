//! SurrealDB implementation of [`OptingPivotRepository`].
//!
//! Window bounds are stored as `YYYY-MM-DD` strings; a pivot covers
//! `day` when `opt_out_time_from <= day < opt_out_time_to`.

use chrono::{DateTime, NaiveDate, Utc};
use mealpass_core::error::MealPassResult;
use mealpass_core::models::meal::MealSelection;
use mealpass_core::models::opting_pivot::{CreateOptingPivot, OptingPivot, PivotStatus};
use mealpass_core::repository::OptingPivotRepository;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use super::{format_date, parse_date, parse_enum, parse_uuid};
use crate::error::DbError;

const ENTITY: &str = "opting_pivot";

#[derive(Debug, SurrealValue)]
struct PivotRowWithId {
    record_id: String,
    user_id: String,
    opt_out_pivot_status: String,
    opt_out_time_from: String,
    opt_out_time_to: String,
    meal_opted_out: i64,
    is_active: bool,
    is_admin_approved: String,
    created_at: DateTime<Utc>,
}

impl PivotRowWithId {
    fn try_into_pivot(self) -> Result<OptingPivot, DbError> {
        let meal_opted_out = u8::try_from(self.meal_opted_out)
            .ok()
            .and_then(MealSelection::from_code)
            .ok_or_else(|| {
                DbError::corrupt(ENTITY, format!("invalid meal code {}", self.meal_opted_out))
            })?;
        Ok(OptingPivot {
            id: parse_uuid(ENTITY, "id", &self.record_id)?,
            user_id: parse_uuid(ENTITY, "user_id", &self.user_id)?,
            status: parse_enum(ENTITY, &self.opt_out_pivot_status)?,
            time_from: parse_date(ENTITY, &self.opt_out_time_from)?,
            time_to: parse_date(ENTITY, &self.opt_out_time_to)?,
            meal_opted_out,
            is_active: self.is_active,
            approval: parse_enum(ENTITY, &self.is_admin_approved)?,
            created_at: self.created_at,
        })
    }
}

fn into_pivots(rows: Vec<PivotRowWithId>) -> Result<Vec<OptingPivot>, DbError> {
    rows.into_iter().map(|row| row.try_into_pivot()).collect()
}

const SELECT: &str = "SELECT meta::id(id) AS record_id, * FROM opting_pivot";

/// SurrealDB implementation of the OptingPivot repository.
#[derive(Clone)]
pub struct SurrealOptingPivotRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealOptingPivotRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }

    /// `bound` compares one window column against `$day`.
    async fn list_on_boundary(
        &self,
        bound: &str,
        status: PivotStatus,
        day: NaiveDate,
    ) -> Result<Vec<OptingPivot>, DbError> {
        let sql = format!(
            "{SELECT} WHERE opt_out_pivot_status = $status \
             AND {bound} \
             AND is_active = true AND is_admin_approved = 'approved' \
             ORDER BY created_at ASC"
        );
        let mut result = self
            .db
            .query(&sql)
            .bind(("status", status.as_str().to_string()))
            .bind(("day", format_date(day)))
            .await?;
        let rows: Vec<PivotRowWithId> = result.take(0)?;
        into_pivots(rows)
    }
}

impl<C: Connection> OptingPivotRepository for SurrealOptingPivotRepository<C> {
    async fn create(
        &self,
        input: CreateOptingPivot,
        now: DateTime<Utc>,
    ) -> MealPassResult<OptingPivot> {
        let id = Uuid::new_v4();
        let id_str = id.to_string();

        let result = self
            .db
            .query(
                "CREATE type::record('opting_pivot', $id) SET \
                 user_id = $user_id, \
                 opt_out_pivot_status = $status, \
                 opt_out_time_from = $time_from, \
                 opt_out_time_to = $time_to, \
                 meal_opted_out = $meal_opted_out, \
                 is_active = true, \
                 is_admin_approved = $approval, \
                 created_at = $now",
            )
            .bind(("id", id_str.clone()))
            .bind(("user_id", input.user_id.to_string()))
            .bind(("status", input.status.as_str().to_string()))
            .bind(("time_from", format_date(input.time_from)))
            .bind(("time_to", format_date(input.time_to)))
            .bind(("meal_opted_out", i64::from(input.meal_opted_out.code())))
            .bind(("approval", input.approval.as_str().to_string()))
            .bind(("now", now))
            .await
            .map_err(DbError::from)?;

        result
            .check()
            .map_err(|e| DbError::from_statement(ENTITY, e))?;

        self.get_by_id(id).await
    }

    async fn get_by_id(&self, id: Uuid) -> MealPassResult<OptingPivot> {
        let id_str = id.to_string();

        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * \
                 FROM type::record('opting_pivot', $id)",
            )
            .bind(("id", id_str.clone()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<PivotRowWithId> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: ENTITY.into(),
            id: id_str,
        })?;

        Ok(row.try_into_pivot()?)
    }

    async fn list_effective_on(&self, day: NaiveDate) -> MealPassResult<Vec<OptingPivot>> {
        let sql = format!(
            "{SELECT} WHERE is_active = true \
             AND is_admin_approved = 'approved' \
             AND opt_out_time_from <= $day AND opt_out_time_to > $day"
        );
        let mut result = self
            .db
            .query(&sql)
            .bind(("day", format_date(day)))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<PivotRowWithId> = result.take(0).map_err(DbError::from)?;
        Ok(into_pivots(rows)?)
    }

    async fn list_active_for_user(&self, user_id: Uuid) -> MealPassResult<Vec<OptingPivot>> {
        let sql = format!(
            "{SELECT} WHERE user_id = $user_id AND is_active = true \
             ORDER BY opt_out_time_from ASC"
        );
        let mut result = self
            .db
            .query(&sql)
            .bind(("user_id", user_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<PivotRowWithId> = result.take(0).map_err(DbError::from)?;
        Ok(into_pivots(rows)?)
    }

    async fn list_starting_on(
        &self,
        status: PivotStatus,
        day: NaiveDate,
    ) -> MealPassResult<Vec<OptingPivot>> {
        Ok(self
            .list_on_boundary("opt_out_time_from = $day", status, day)
            .await?)
    }

    async fn list_ended_by(
        &self,
        status: PivotStatus,
        day: NaiveDate,
    ) -> MealPassResult<Vec<OptingPivot>> {
        Ok(self
            .list_on_boundary("opt_out_time_to <= $day", status, day)
            .await?)
    }

    async fn list_for_user_between(
        &self,
        user_id: Uuid,
        since: NaiveDate,
        until: NaiveDate,
    ) -> MealPassResult<Vec<OptingPivot>> {
        let sql = format!(
            "{SELECT} WHERE user_id = $user_id \
             AND opt_out_time_from < $until AND opt_out_time_to > $since \
             ORDER BY opt_out_time_from ASC"
        );
        let mut result = self
            .db
            .query(&sql)
            .bind(("user_id", user_id.to_string()))
            .bind(("since", format_date(since)))
            .bind(("until", format_date(until)))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<PivotRowWithId> = result.take(0).map_err(DbError::from)?;
        Ok(into_pivots(rows)?)
    }

    async fn deactivate(&self, id: Uuid) -> MealPassResult<()> {
        self.db
            .query(
                "UPDATE type::record('opting_pivot', $id) SET is_active = false \
                 WHERE is_active = true",
            )
            .bind(("id", id.to_string()))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(|e| DbError::from_statement(ENTITY, e))?;

        Ok(())
    }
}
