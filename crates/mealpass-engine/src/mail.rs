//! Absence warning mail requests and the scan-history payload attached
//! to them.
//!
//! Delivery and templating live outside the engine; the engine only
//! hands a fully built [`WarningMail`] to a [`MailNotifier`].

use std::fmt;

use chrono::{Datelike, NaiveDate};
use mealpass_core::clock::is_weekend;
use mealpass_core::error::{MealPassError, MealPassResult};
use mealpass_core::models::meal::Meal;
use mealpass_core::models::opting_pivot::{ApprovalStatus, OptingPivot, PivotStatus};
use mealpass_core::models::voucher::Voucher;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::config::AbsencePeriod;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WarningKind {
    /// Absences over threshold; access unchanged.
    Warning,
    /// Final notice: portal access has been revoked.
    AccessRestricted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ScanStatus {
    Consumed,
    OptedOutPermanently,
    TemporarilyOptedOut,
    NotConsumed,
}

impl fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ScanStatus::Consumed => "consumed",
            ScanStatus::OptedOutPermanently => "Opted out permanently",
            ScanStatus::TemporarilyOptedOut => "Temporarily opted out",
            ScanStatus::NotConsumed => "Not consumed",
        })
    }
}

impl ScanStatus {
    pub fn scanner_status(self) -> &'static str {
        match self {
            ScanStatus::Consumed => "Scanner Success",
            _ => "Scanner Failed",
        }
    }
}

/// One line of the scan history attached to a warning mail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanHistoryRow {
    pub date: NaiveDate,
    /// `None` for opted-out days without a voucher.
    pub meal: Option<Meal>,
    pub status: ScanStatus,
}

/// Build the per-weekday scan history over `[since, until)`, newest
/// first. A day appears when it has a voucher or is covered by an
/// approved opt-out pivot. Pivots deactivated since still count.
pub fn build_scan_history(
    since: NaiveDate,
    until: NaiveDate,
    vouchers: &[Voucher],
    pivots: &[OptingPivot],
) -> Vec<ScanHistoryRow> {
    let opted_out = |day: NaiveDate| -> Option<ScanStatus> {
        let covering = |status: PivotStatus| {
            pivots.iter().any(|p| {
                p.status == status && p.approval == ApprovalStatus::Approved && p.covers(day)
            })
        };
        if covering(PivotStatus::OptOutPermanently) {
            Some(ScanStatus::OptedOutPermanently)
        } else if covering(PivotStatus::OptOutTemporarily) {
            Some(ScanStatus::TemporarilyOptedOut)
        } else {
            None
        }
    };

    let mut rows = Vec::new();
    let mut day = since;
    while day < until {
        if !is_weekend(day) {
            let issued: Vec<&Voucher> = vouchers.iter().filter(|v| v.date_of_use == day).collect();
            if issued.is_empty() {
                if let Some(status) = opted_out(day) {
                    rows.push(ScanHistoryRow {
                        date: day,
                        meal: None,
                        status,
                    });
                }
            } else {
                for voucher in issued {
                    let status = if voucher.is_scanned {
                        ScanStatus::Consumed
                    } else {
                        opted_out(day).unwrap_or(ScanStatus::NotConsumed)
                    };
                    rows.push(ScanHistoryRow {
                        date: day,
                        meal: Some(voucher.meal),
                        status,
                    });
                }
            }
        }
        match day.succ_opt() {
            Some(next) => day = next,
            None => break,
        }
    }

    rows.sort_by(|a, b| {
        b.date
            .cmp(&a.date)
            .then_with(|| a.meal.map(Meal::index).cmp(&b.meal.map(Meal::index)))
    });
    rows
}

/// A warning mail request for one user.
#[derive(Debug, Clone, Serialize)]
pub struct WarningMail {
    pub user_id: Uuid,
    pub email: String,
    pub full_name: String,
    pub employee_number: String,
    pub kind: WarningKind,
    pub period: AbsencePeriod,
    pub absent_count: u64,
    pub history: Vec<ScanHistoryRow>,
}

impl WarningMail {
    pub fn subject(&self) -> String {
        let period = match self.period {
            AbsencePeriod::Weekly => "Weekly",
            AbsencePeriod::Monthly => "Monthly",
        };
        match self.kind {
            WarningKind::Warning => format!("{period} Warning - High Absenteeism"),
            WarningKind::AccessRestricted => {
                format!("{period} Warning - High Absenteeism - Access Restricted")
            }
        }
    }

    /// Name for the scan-history attachment.
    pub fn attachment_name(&self, on: NaiveDate) -> String {
        format!(
            "{}_scan_details_{:04}{:02}{:02}.xlsx",
            self.employee_number,
            on.year(),
            on.month(),
            on.day()
        )
    }
}

/// Hand-off point to the mail delivery service.
pub trait MailNotifier: Send + Sync {
    fn send_warning(&self, mail: WarningMail) -> impl Future<Output = MealPassResult<()>> + Send;
}

/// Notifier that only records the request, with its history payload
/// as JSON, in the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogMailNotifier;

impl MailNotifier for LogMailNotifier {
    async fn send_warning(&self, mail: WarningMail) -> MealPassResult<()> {
        let history =
            serde_json::to_string(&mail.history).map_err(|e| MealPassError::Mail(e.to_string()))?;
        info!(
            user_id = %mail.user_id,
            email = %mail.email,
            kind = ?mail.kind,
            period = mail.period.as_str(),
            absent_count = mail.absent_count,
            subject = %mail.subject(),
            %history,
            "Warning mail requested"
        );
        Ok(())
    }
}
