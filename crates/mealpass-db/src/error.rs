//! Database-specific error types and conversions.

use mealpass_core::error::MealPassError;

/// Database-layer error type.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("SurrealDB error: {0}")]
    Surreal(#[from] surrealdb::Error),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Query failed: {0}")]
    Query(String),

    /// A unique index rejected the write.
    #[error("Duplicate record: {entity}")]
    Duplicate { entity: String },

    /// Optimistic transaction conflict; the statement can be retried.
    #[error("Transaction conflict: {0}")]
    Conflict(String),

    #[error("Record not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Corrupt row in {entity}: {message}")]
    Corrupt { entity: String, message: String },
}

impl DbError {
    /// Classify a statement error returned by `Response::check`.
    pub(crate) fn from_statement(entity: &str, err: surrealdb::Error) -> Self {
        let message = err.to_string();
        if message.contains("already contains") {
            DbError::Duplicate {
                entity: entity.into(),
            }
        } else if message.contains("can be retried") || message.contains("write conflict") {
            DbError::Conflict(message)
        } else {
            DbError::Query(message)
        }
    }

    pub(crate) fn corrupt(entity: &str, message: impl Into<String>) -> Self {
        DbError::Corrupt {
            entity: entity.into(),
            message: message.into(),
        }
    }

    pub fn is_conflict(&self) -> bool {
        match self {
            DbError::Conflict(_) => true,
            DbError::Surreal(e) => {
                let message = e.to_string();
                message.contains("can be retried") || message.contains("write conflict")
            }
            _ => false,
        }
    }
}

impl From<DbError> for MealPassError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => MealPassError::NotFound { entity, id },
            DbError::Duplicate { entity } => MealPassError::AlreadyExists { entity },
            other => MealPassError::Database(other.to_string()),
        }
    }
}

/// Attempts made for a statement that keeps hitting transaction
/// conflicts.
pub(crate) const CONFLICT_RETRIES: usize = 8;

/// Run `op` again while it fails with a retryable transaction conflict.
pub(crate) async fn retry_on_conflict<T, F, Fut>(mut op: F) -> Result<T, DbError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, DbError>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Err(e) if e.is_conflict() && attempt < CONFLICT_RETRIES => {
                tracing::debug!(attempt, error = %e, "Retrying after transaction conflict");
                attempt += 1;
            }
            other => return other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_maps_to_already_exists() {
        let err: MealPassError = DbError::Duplicate {
            entity: "voucher".into(),
        }
        .into();
        assert!(matches!(err, MealPassError::AlreadyExists { entity } if entity == "voucher"));
    }

    #[test]
    fn not_found_is_preserved() {
        let err: MealPassError = DbError::NotFound {
            entity: "user".into(),
            id: "42".into(),
        }
        .into();
        assert!(matches!(err, MealPassError::NotFound { .. }));
    }

    #[test]
    fn other_errors_become_database_errors() {
        let err: MealPassError = DbError::Query("boom".into()).into();
        assert!(matches!(err, MealPassError::Database(_)));
        assert!(!err.is_business());
    }

    #[tokio::test]
    async fn conflicts_are_retried_until_success() {
        let mut calls = 0;
        let out = retry_on_conflict(|| {
            calls += 1;
            let n = calls;
            async move {
                if n < 3 {
                    Err(DbError::Conflict("can be retried".into()))
                } else {
                    Ok(n)
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(out, 3);
    }

    #[tokio::test]
    async fn non_conflicts_are_not_retried() {
        let mut calls = 0;
        let out: Result<(), DbError> = retry_on_conflict(|| {
            calls += 1;
            async { Err(DbError::Query("syntax".into())) }
        })
        .await;
        assert!(out.is_err());
        assert_eq!(calls, 1);
    }
}
