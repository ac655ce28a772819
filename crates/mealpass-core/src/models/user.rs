//! User domain model.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::MealPassError;
use crate::models::opting_pivot::CreateOptingPivot;

/// Permanent opt-outs a new user is allowed.
pub const DEFAULT_OPT_OUT_COUNTER: u32 = 3;

/// Warnings after which portal access is revoked.
pub const MAX_ABSENT_WARNINGS: u32 = 3;

/// Coarse opt state cached on the user row.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum OptStatus {
    OptIn,
    OptOutTemp,
    OptOutPerm,
}

impl OptStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OptStatus::OptIn => "opt-in",
            OptStatus::OptOutTemp => "opt-out-temp",
            OptStatus::OptOutPerm => "opt-out-perm",
        }
    }
}

impl FromStr for OptStatus {
    type Err = MealPassError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "opt-in" => Ok(OptStatus::OptIn),
            "opt-out-temp" => Ok(OptStatus::OptOutTemp),
            "opt-out-perm" => Ok(OptStatus::OptOutPerm),
            other => Err(MealPassError::Parse(format!("unknown opt status: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub employee_id: Uuid,
    pub email: String,
    pub opt_status: OptStatus,
    /// Remaining permanent opt-outs.
    pub counter: u32,
    pub absent_warning_counter: u32,
    pub is_active: bool,
    /// Set when portal access is revoked.
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Active and not suspended.
    pub fn is_enabled(&self) -> bool {
        self.is_active && !self.is_deleted
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUser {
    pub employee_id: Uuid,
    pub email: String,
    /// Defaults to [`OptStatus::OptIn`].
    pub opt_status: Option<OptStatus>,
    /// Defaults to [`DEFAULT_OPT_OUT_COUNTER`].
    pub counter: Option<u32>,
}

/// A permanent opt-out applied as one unit: the counter decrement and
/// status change, the history pivot, and optionally the approval of
/// the admin request that asked for it.
#[derive(Debug, Clone)]
pub struct PermanentOptOut {
    /// Statuses the user may be in for the change to apply.
    pub allowed_from: Vec<OptStatus>,
    /// History record; its `user_id` names the user.
    pub pivot: CreateOptingPivot,
    /// Pending notification approved by this change. The change only
    /// applies while it is still pending.
    pub approves: Option<Uuid>,
}
