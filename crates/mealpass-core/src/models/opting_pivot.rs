//! Opting pivot: a time-ranged opt-out or temporary opt-in record.
//!
//! Pivots are append-only history. A pivot window is half-open: it
//! covers every day `d` with `time_from <= d < time_to`. The day named
//! by `time_to` is the day the user is back to their default state.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::meal::MealSelection;
use crate::error::MealPassError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum PivotStatus {
    OptOutPermanently,
    OptOutTemporarily,
    /// WFH exception.
    OptInTemporarily,
}

impl PivotStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PivotStatus::OptOutPermanently => "opt-out-permanently",
            PivotStatus::OptOutTemporarily => "opt-out-temporarily",
            PivotStatus::OptInTemporarily => "opt-in-temporarily",
        }
    }
}

impl FromStr for PivotStatus {
    type Err = MealPassError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "opt-out-permanently" => Ok(PivotStatus::OptOutPermanently),
            "opt-out-temporarily" => Ok(PivotStatus::OptOutTemporarily),
            "opt-in-temporarily" => Ok(PivotStatus::OptInTemporarily),
            other => Err(MealPassError::Parse(format!("unknown pivot status: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum ApprovalStatus {
    #[default]
    Approved,
    Pending,
    Rejected,
}

impl ApprovalStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ApprovalStatus::Approved => "approved",
            ApprovalStatus::Pending => "pending",
            ApprovalStatus::Rejected => "rejected",
        }
    }
}

impl FromStr for ApprovalStatus {
    type Err = MealPassError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "approved" => Ok(ApprovalStatus::Approved),
            "pending" => Ok(ApprovalStatus::Pending),
            "rejected" => Ok(ApprovalStatus::Rejected),
            other => Err(MealPassError::Parse(format!("unknown approval status: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OptingPivot {
    pub id: Uuid,
    pub user_id: Uuid,
    pub status: PivotStatus,
    pub time_from: NaiveDate,
    pub time_to: NaiveDate,
    pub meal_opted_out: MealSelection,
    pub is_active: bool,
    pub approval: ApprovalStatus,
    pub created_at: DateTime<Utc>,
}

impl OptingPivot {
    pub fn covers(&self, day: NaiveDate) -> bool {
        self.time_from <= day && day < self.time_to
    }

    /// Active and approved: the only pivots that affect eligibility.
    pub fn is_effective(&self) -> bool {
        self.is_active && self.approval == ApprovalStatus::Approved
    }

    pub fn overlaps(&self, from: NaiveDate, to: NaiveDate) -> bool {
        self.time_from < to && from < self.time_to
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOptingPivot {
    pub user_id: Uuid,
    pub status: PivotStatus,
    pub time_from: NaiveDate,
    pub time_to: NaiveDate,
    pub meal_opted_out: MealSelection,
    pub approval: ApprovalStatus,
}
