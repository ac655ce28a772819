//! Admin-approval notification model.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::opting_pivot::ApprovalStatus;
use crate::error::MealPassError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum NotificationType {
    /// Permanent opt-out awaiting approval.
    OptOutPerm,
    /// Opt-in after a permanent opt-out.
    OptIn,
}

impl NotificationType {
    pub fn as_str(self) -> &'static str {
        match self {
            NotificationType::OptOutPerm => "opt-out-perm",
            NotificationType::OptIn => "opt-in",
        }
    }
}

impl FromStr for NotificationType {
    type Err = MealPassError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "opt-out-perm" => Ok(NotificationType::OptOutPerm),
            "opt-in" => Ok(NotificationType::OptIn),
            other => Err(MealPassError::Parse(format!(
                "unknown notification type: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub notification_type: NotificationType,
    pub details: String,
    pub approval: ApprovalStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateNotification {
    pub user_id: Uuid,
    pub notification_type: NotificationType,
    pub details: String,
}
