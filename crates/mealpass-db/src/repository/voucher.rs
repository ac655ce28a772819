//! SurrealDB implementation of [`VoucherRepository`].
//!
//! Redemption is a compare-and-swap: one `UPDATE ... WHERE` that only
//! matches an unscanned, active, still-valid voucher of the expected
//! owner. Optimistic transaction conflicts between concurrent scans are
//! retried; the retry then fails the condition and returns nothing.

use chrono::{DateTime, NaiveDate, Utc};
use mealpass_core::error::MealPassResult;
use mealpass_core::models::meal::Meal;
use mealpass_core::models::voucher::{AbsenceCount, CreateVoucher, Voucher};
use mealpass_core::repository::VoucherRepository;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::debug;
use uuid::Uuid;

use super::{format_date, parse_date, parse_uuid};
use crate::error::{DbError, retry_on_conflict};

const ENTITY: &str = "voucher";

#[derive(Debug, SurrealValue)]
struct VoucherRow {
    user_id: String,
    date_of_use: String,
    qr_opt_status: String,
    is_scanned: bool,
    is_active: bool,
    created_at: DateTime<Utc>,
    scanned_at: Option<DateTime<Utc>>,
}

#[derive(Debug, SurrealValue)]
struct VoucherRowWithId {
    record_id: String,
    user_id: String,
    date_of_use: String,
    qr_opt_status: String,
    is_scanned: bool,
    is_active: bool,
    created_at: DateTime<Utc>,
    scanned_at: Option<DateTime<Utc>>,
}

#[derive(Debug, SurrealValue)]
struct HolderRow {
    user_id: String,
}

#[derive(Debug, SurrealValue)]
struct AbsenceRow {
    user_id: String,
    absent_count: u64,
}

fn parse_meal(label: &str) -> Result<Meal, DbError> {
    Meal::from_label(label)
        .ok_or_else(|| DbError::corrupt(ENTITY, format!("unknown meal label {label:?}")))
}

fn row_to_voucher(row: VoucherRow, id: Uuid) -> Result<Voucher, DbError> {
    Ok(Voucher {
        id,
        user_id: parse_uuid(ENTITY, "user_id", &row.user_id)?,
        date_of_use: parse_date(ENTITY, &row.date_of_use)?,
        meal: parse_meal(&row.qr_opt_status)?,
        is_scanned: row.is_scanned,
        is_active: row.is_active,
        created_at: row.created_at,
        scanned_at: row.scanned_at,
    })
}

impl VoucherRowWithId {
    fn try_into_voucher(self) -> Result<Voucher, DbError> {
        let id = parse_uuid(ENTITY, "id", &self.record_id)?;
        row_to_voucher(
            VoucherRow {
                user_id: self.user_id,
                date_of_use: self.date_of_use,
                qr_opt_status: self.qr_opt_status,
                is_scanned: self.is_scanned,
                is_active: self.is_active,
                created_at: self.created_at,
                scanned_at: self.scanned_at,
            },
            id,
        )
    }
}

fn into_vouchers(rows: Vec<VoucherRowWithId>) -> Result<Vec<Voucher>, DbError> {
    rows.into_iter().map(|row| row.try_into_voucher()).collect()
}

/// SurrealDB implementation of the Voucher repository.
#[derive(Clone)]
pub struct SurrealVoucherRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealVoucherRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> VoucherRepository for SurrealVoucherRepository<C> {
    async fn create(&self, input: CreateVoucher) -> MealPassResult<Voucher> {
        let id = Uuid::new_v4();
        let id_str = id.to_string();

        let result = self
            .db
            .query(
                "CREATE type::record('voucher', $id) SET \
                 user_id = $user_id, \
                 date_of_use = $date_of_use, \
                 qr_opt_status = $meal, \
                 is_scanned = false, \
                 is_active = true, \
                 created_at = $created_at, \
                 scanned_at = NONE",
            )
            .bind(("id", id_str.clone()))
            .bind(("user_id", input.user_id.to_string()))
            .bind(("date_of_use", format_date(input.date_of_use)))
            .bind(("meal", input.meal.label().to_string()))
            .bind(("created_at", input.created_at))
            .await
            .map_err(DbError::from)?;

        let mut result = result
            .check()
            .map_err(|e| DbError::from_statement(ENTITY, e))?;

        let rows: Vec<VoucherRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: ENTITY.into(),
            id: id_str,
        })?;

        Ok(row_to_voucher(row, id)?)
    }

    async fn get_by_id(&self, id: Uuid) -> MealPassResult<Voucher> {
        let id_str = id.to_string();

        let mut result = self
            .db
            .query("SELECT * FROM type::record('voucher', $id)")
            .bind(("id", id_str.clone()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<VoucherRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: ENTITY.into(),
            id: id_str,
        })?;

        Ok(row_to_voucher(row, id)?)
    }

    async fn list_holders(&self, day: NaiveDate, meal: Meal) -> MealPassResult<Vec<Uuid>> {
        let mut result = self
            .db
            .query(
                "SELECT user_id FROM voucher \
                 WHERE date_of_use = $day AND qr_opt_status = $meal",
            )
            .bind(("day", format_date(day)))
            .bind(("meal", meal.label().to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<HolderRow> = result.take(0).map_err(DbError::from)?;
        let holders = rows
            .into_iter()
            .map(|row| parse_uuid(ENTITY, "user_id", &row.user_id))
            .collect::<Result<Vec<_>, DbError>>()?;
        Ok(holders)
    }

    async fn list_redeemable_for_user(
        &self,
        user_id: Uuid,
        valid_since: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> MealPassResult<Vec<Voucher>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM voucher \
                 WHERE user_id = $user_id \
                 AND is_scanned = false AND is_active = true \
                 AND created_at > $since AND created_at <= $now \
                 ORDER BY created_at DESC",
            )
            .bind(("user_id", user_id.to_string()))
            .bind(("since", valid_since))
            .bind(("now", now))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<VoucherRowWithId> = result.take(0).map_err(DbError::from)?;
        Ok(into_vouchers(rows)?)
    }

    async fn mark_redeemed(
        &self,
        id: Uuid,
        user_id: Uuid,
        valid_since: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> MealPassResult<Option<Voucher>> {
        let id_str = id.to_string();
        let user_id_str = user_id.to_string();

        let redeemed = retry_on_conflict(|| {
            let id_str = id_str.clone();
            let user_id_str = user_id_str.clone();
            async move {
                let mut result = self
                    .db
                    .query(
                        "UPDATE type::record('voucher', $id) SET \
                         is_scanned = true, \
                         is_active = false, \
                         scanned_at = $now \
                         WHERE user_id = $user_id \
                         AND is_scanned = false AND is_active = true \
                         AND created_at > $since AND created_at <= $now",
                    )
                    .bind(("id", id_str))
                    .bind(("user_id", user_id_str))
                    .bind(("since", valid_since))
                    .bind(("now", now))
                    .await?
                    .check()
                    .map_err(|e| DbError::from_statement(ENTITY, e))?;
                let rows: Vec<VoucherRow> = result.take(0)?;
                rows.into_iter()
                    .next()
                    .map(|row| row_to_voucher(row, id))
                    .transpose()
            }
        })
        .await?;

        debug!(voucher_id = %id, redeemed = redeemed.is_some(), "Redemption attempt");
        Ok(redeemed)
    }

    async fn expire_created_before(&self, until: DateTime<Utc>) -> MealPassResult<u64> {
        let expired = retry_on_conflict(|| async move {
            let mut result = self
                .db
                .query(
                    "UPDATE voucher SET is_active = false \
                     WHERE is_active = true AND created_at < $until",
                )
                .bind(("until", until))
                .await?
                .check()
                .map_err(|e| DbError::from_statement(ENTITY, e))?;
            let rows: Vec<VoucherRow> = result.take(0)?;
            Ok(rows.len() as u64)
        })
        .await?;

        Ok(expired)
    }

    async fn count_absences_since(&self, since: DateTime<Utc>) -> MealPassResult<Vec<AbsenceCount>> {
        let mut result = self
            .db
            .query(
                "SELECT user_id, count() AS absent_count FROM voucher \
                 WHERE is_scanned = false AND is_active = false \
                 AND created_at >= $since \
                 GROUP BY user_id",
            )
            .bind(("since", since))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<AbsenceRow> = result.take(0).map_err(DbError::from)?;
        let counts = rows
            .into_iter()
            .map(|row| {
                Ok(AbsenceCount {
                    user_id: parse_uuid(ENTITY, "user_id", &row.user_id)?,
                    absent_count: row.absent_count,
                })
            })
            .collect::<Result<Vec<_>, DbError>>()?;
        Ok(counts)
    }

    async fn list_for_user_since(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> MealPassResult<Vec<Voucher>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM voucher \
                 WHERE user_id = $user_id AND created_at >= $since \
                 ORDER BY created_at ASC",
            )
            .bind(("user_id", user_id.to_string()))
            .bind(("since", since))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<VoucherRowWithId> = result.take(0).map_err(DbError::from)?;
        Ok(into_vouchers(rows)?)
    }
}
