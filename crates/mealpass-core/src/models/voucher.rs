//! Voucher (QR master) domain model.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::meal::Meal;

/// A single-use meal voucher. Never deleted; the scan trail drives
/// absence accounting.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Voucher {
    pub id: Uuid,
    pub user_id: Uuid,
    pub date_of_use: NaiveDate,
    /// Stored as the meal label (`qr_opt_status`).
    pub meal: Meal,
    pub is_scanned: bool,
    pub is_active: bool,
    /// Anchor of the validity window.
    pub created_at: DateTime<Utc>,
    pub scanned_at: Option<DateTime<Utc>>,
}

impl Voucher {
    /// Issued but never redeemed, and no longer redeemable.
    pub fn is_absence(&self) -> bool {
        !self.is_scanned && !self.is_active
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateVoucher {
    pub user_id: Uuid,
    pub date_of_use: NaiveDate,
    pub meal: Meal,
    pub created_at: DateTime<Utc>,
}

/// Per-user absence count over a trailing window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbsenceCount {
    pub user_id: Uuid,
    pub absent_count: u64,
}
