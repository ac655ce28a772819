//! Business-rule violations raised by the engine.

use chrono::NaiveDate;
use mealpass_core::error::MealPassError;
use mealpass_core::models::meal::Meal;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no permanent opt-outs left")]
    CounterExhausted,

    #[error("user is already opted out")]
    AlreadyOptedOut,

    #[error("user is already opted in")]
    AlreadyOptedIn,

    #[error("user must be opted in")]
    NotOptedIn,

    #[error("an opt-in request is already pending")]
    RequestPending,

    #[error("window overlaps an active {0} window")]
    OverlappingWindow(&'static str),

    #[error("same-day {0} opt-out is closed")]
    CutoffPassed(Meal),

    #[error("permanent opt-out is not allowed during {0} service")]
    BlackoutWindow(Meal),

    #[error("invalid date range {from}..{to}")]
    InvalidDateRange { from: NaiveDate, to: NaiveDate },

    #[error("lunch-dinner employees must name the meal to opt out of")]
    MealSelectionRequired,

    #[error("meal selection does not match the employee's subscription")]
    InvalidMealSelection,

    #[error("temporary opt-in is only available to work-from-home employees")]
    NotWorkFromHome,

    #[error("user account is suspended or inactive")]
    UserDisabled,

    #[error("notification has already been decided")]
    NotificationDecided,

    #[error("a decision must be approved or rejected")]
    InvalidDecision,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<EngineError> for MealPassError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::CounterExhausted
            | EngineError::AlreadyOptedOut
            | EngineError::AlreadyOptedIn
            | EngineError::NotOptedIn
            | EngineError::RequestPending
            | EngineError::OverlappingWindow(_)
            | EngineError::NotificationDecided => MealPassError::Conflict {
                reason: err.to_string(),
            },
            EngineError::CutoffPassed(_)
            | EngineError::BlackoutWindow(_)
            | EngineError::InvalidDateRange { .. }
            | EngineError::MealSelectionRequired
            | EngineError::InvalidMealSelection
            | EngineError::NotWorkFromHome
            | EngineError::UserDisabled
            | EngineError::InvalidDecision
            | EngineError::InvalidConfig(_) => MealPassError::Validation {
                message: err.to_string(),
            },
        }
    }
}
