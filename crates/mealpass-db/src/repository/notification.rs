//! SurrealDB implementation of [`NotificationRepository`].

use chrono::{DateTime, Utc};
use mealpass_core::error::MealPassResult;
use mealpass_core::models::notification::{CreateNotification, Notification};
use mealpass_core::models::opting_pivot::ApprovalStatus;
use mealpass_core::repository::NotificationRepository;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use super::{parse_enum, parse_uuid};
use crate::error::{DbError, retry_on_conflict};

const ENTITY: &str = "notification";

#[derive(Debug, SurrealValue)]
struct NotificationRow {
    user_id: String,
    notification_type: String,
    notification_details: String,
    is_admin_approved: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, SurrealValue)]
struct NotificationRowWithId {
    record_id: String,
    user_id: String,
    notification_type: String,
    notification_details: String,
    is_admin_approved: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

fn row_to_notification(row: NotificationRow, id: Uuid) -> Result<Notification, DbError> {
    Ok(Notification {
        id,
        user_id: parse_uuid(ENTITY, "user_id", &row.user_id)?,
        notification_type: parse_enum(ENTITY, &row.notification_type)?,
        details: row.notification_details,
        approval: parse_enum(ENTITY, &row.is_admin_approved)?,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

impl NotificationRowWithId {
    fn try_into_notification(self) -> Result<Notification, DbError> {
        let id = parse_uuid(ENTITY, "id", &self.record_id)?;
        row_to_notification(
            NotificationRow {
                user_id: self.user_id,
                notification_type: self.notification_type,
                notification_details: self.notification_details,
                is_admin_approved: self.is_admin_approved,
                created_at: self.created_at,
                updated_at: self.updated_at,
            },
            id,
        )
    }
}

/// SurrealDB implementation of the Notification repository.
#[derive(Clone)]
pub struct SurrealNotificationRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealNotificationRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> NotificationRepository for SurrealNotificationRepository<C> {
    async fn create(
        &self,
        input: CreateNotification,
        now: DateTime<Utc>,
    ) -> MealPassResult<Notification> {
        let id = Uuid::new_v4();
        let id_str = id.to_string();

        let result = self
            .db
            .query(
                "CREATE type::record('notification', $id) SET \
                 user_id = $user_id, \
                 notification_type = $notification_type, \
                 notification_details = $details, \
                 is_admin_approved = 'pending', \
                 created_at = $now, \
                 updated_at = $now",
            )
            .bind(("id", id_str.clone()))
            .bind(("user_id", input.user_id.to_string()))
            .bind((
                "notification_type",
                input.notification_type.as_str().to_string(),
            ))
            .bind(("details", input.details))
            .bind(("now", now))
            .await
            .map_err(DbError::from)?;

        let mut result = result
            .check()
            .map_err(|e| DbError::from_statement(ENTITY, e))?;

        let rows: Vec<NotificationRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: ENTITY.into(),
            id: id_str,
        })?;

        Ok(row_to_notification(row, id)?)
    }

    async fn get_by_id(&self, id: Uuid) -> MealPassResult<Notification> {
        let id_str = id.to_string();

        let mut result = self
            .db
            .query("SELECT * FROM type::record('notification', $id)")
            .bind(("id", id_str.clone()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<NotificationRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: ENTITY.into(),
            id: id_str,
        })?;

        Ok(row_to_notification(row, id)?)
    }

    async fn decide(
        &self,
        id: Uuid,
        approval: ApprovalStatus,
        now: DateTime<Utc>,
    ) -> MealPassResult<Option<Notification>> {
        let id_str = id.to_string();

        let decided = retry_on_conflict(|| {
            let id_str = id_str.clone();
            async move {
                let mut result = self
                    .db
                    .query(
                        "UPDATE type::record('notification', $id) SET \
                         is_admin_approved = $approval, updated_at = $now \
                         WHERE is_admin_approved = 'pending'",
                    )
                    .bind(("id", id_str))
                    .bind(("approval", approval.as_str().to_string()))
                    .bind(("now", now))
                    .await?
                    .check()
                    .map_err(|e| DbError::from_statement(ENTITY, e))?;
                let rows: Vec<NotificationRow> = result.take(0)?;
                rows.into_iter()
                    .next()
                    .map(|row| row_to_notification(row, id))
                    .transpose()
            }
        })
        .await?;

        Ok(decided)
    }

    async fn list_pending(&self) -> MealPassResult<Vec<Notification>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM notification \
                 WHERE is_admin_approved = 'pending' \
                 ORDER BY created_at ASC",
            )
            .await
            .map_err(DbError::from)?;

        let rows: Vec<NotificationRowWithId> = result.take(0).map_err(DbError::from)?;
        let notifications = rows
            .into_iter()
            .map(|row| row.try_into_notification())
            .collect::<Result<Vec<_>, DbError>>()?;
        Ok(notifications)
    }
}
