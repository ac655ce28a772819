//! Engine configuration.

use chrono::NaiveTime;
use mealpass_core::clock::DailyWindow;
use mealpass_core::models::user::MAX_ABSENT_WARNINGS;

use crate::error::EngineError;

/// Absence accounting cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub enum AbsencePeriod {
    Weekly,
    Monthly,
}

impl AbsencePeriod {
    pub fn as_str(self) -> &'static str {
        match self {
            AbsencePeriod::Weekly => "weekly",
            AbsencePeriod::Monthly => "monthly",
        }
    }
}

/// Trailing window and threshold for one absence period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AbsencePolicy {
    /// Days counted back from the run day.
    pub lookback_days: i64,
    /// A user is over threshold when absences exceed this value.
    pub threshold: u64,
}

/// Configuration for the voucher engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Lunch service window (UTC).
    pub lunch_window: DailyWindow,
    /// Dinner service window (UTC). May run past midnight.
    pub dinner_window: DailyWindow,
    /// Same-day lunch opt-outs are refused from this time on.
    pub lunch_opt_out_cutoff: NaiveTime,
    /// Same-day dinner opt-outs are refused from this time on.
    pub dinner_opt_out_cutoff: NaiveTime,
    /// Voucher validity from issuance (default: 24 hours).
    pub voucher_validity_hours: i64,
    /// Length of the permanent opt-out record (default: 2 months).
    pub permanent_opt_out_months: u32,
    pub weekly: AbsencePolicy,
    pub monthly: AbsencePolicy,
    /// Warnings after which portal access is revoked (default: 3).
    pub max_absent_warnings: u32,
}

fn hm(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap_or(NaiveTime::MIN)
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lunch_window: DailyWindow::new(hm(12, 0), hm(14, 30)),
            dinner_window: DailyWindow::new(hm(19, 0), hm(1, 0)),
            lunch_opt_out_cutoff: hm(8, 0),
            dinner_opt_out_cutoff: hm(15, 0),
            voucher_validity_hours: 24,
            permanent_opt_out_months: 2,
            weekly: AbsencePolicy {
                lookback_days: 5,
                threshold: 2,
            },
            monthly: AbsencePolicy {
                lookback_days: 28,
                threshold: 12,
            },
            max_absent_warnings: MAX_ABSENT_WARNINGS,
        }
    }
}

impl EngineConfig {
    pub fn policy(&self, period: AbsencePeriod) -> AbsencePolicy {
        match period {
            AbsencePeriod::Weekly => self.weekly,
            AbsencePeriod::Monthly => self.monthly,
        }
    }

    /// Window in which lunch-only employees cannot opt out permanently.
    pub fn lunch_blackout(&self) -> DailyWindow {
        DailyWindow::new(self.lunch_opt_out_cutoff, self.lunch_window.end)
    }

    /// Dinner counterpart of [`Self::lunch_blackout`]; wraps past
    /// midnight with the dinner window.
    pub fn dinner_blackout(&self) -> DailyWindow {
        DailyWindow::new(self.dinner_opt_out_cutoff, self.dinner_window.end)
    }

    /// Reject inconsistent settings at startup.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.lunch_window.is_overnight() {
            return Err(EngineError::InvalidConfig(
                "lunch window must end after it starts".into(),
            ));
        }
        if self.lunch_opt_out_cutoff > self.lunch_window.start {
            return Err(EngineError::InvalidConfig(
                "lunch opt-out cutoff must not be after lunch starts".into(),
            ));
        }
        if self.dinner_opt_out_cutoff > self.dinner_window.start {
            return Err(EngineError::InvalidConfig(
                "dinner opt-out cutoff must not be after dinner starts".into(),
            ));
        }
        if self.voucher_validity_hours <= 0 {
            return Err(EngineError::InvalidConfig(
                "voucher validity must be positive".into(),
            ));
        }
        if self.weekly.lookback_days <= 0 || self.monthly.lookback_days <= 0 {
            return Err(EngineError::InvalidConfig(
                "absence lookback must be positive".into(),
            ));
        }
        if self.max_absent_warnings == 0 || self.max_absent_warnings > MAX_ABSENT_WARNINGS {
            return Err(EngineError::InvalidConfig(format!(
                "max absent warnings must be between 1 and {MAX_ABSENT_WARNINGS}"
            )));
        }
        Ok(())
    }
}
