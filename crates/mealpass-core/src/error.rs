//! Error types for the MealPass system.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MealPassError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Entity already exists: {entity}")]
    AlreadyExists { entity: String },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("State conflict: {reason}")]
    Conflict { reason: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Mail delivery failed: {0}")]
    Mail(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MealPassError {
    pub fn not_found(entity: &str, id: impl ToString) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Whether the error is a business outcome rather than an
    /// infrastructure failure.
    pub fn is_business(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. }
                | Self::AlreadyExists { .. }
                | Self::Validation { .. }
                | Self::Conflict { .. }
        )
    }
}

pub type MealPassResult<T> = Result<T, MealPassError>;
