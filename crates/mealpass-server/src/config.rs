//! Server configuration
//!
//! Loads configuration from the environment (and `.env` when present).
//! Malformed times or cron expressions abort startup.

use std::env;
use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::NaiveTime;
use cron::Schedule;
use mealpass_core::clock::{DailyWindow, parse_time_of_day};
use mealpass_db::DbConfig;
use mealpass_engine::EngineConfig;

const DEFAULT_LUNCH_SCHEDULE: &str = "0 0 4 * * Mon-Fri";
const DEFAULT_DINNER_SCHEDULE: &str = "0 0 16 * * Mon-Fri";
const DEFAULT_WARNING_MAIL_SCHEDULE: &str = "0 0 10 * * Sat";

#[derive(Debug, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub engine: EngineConfig,
    /// Lunch checkpoint (default: 04:00 UTC on weekdays)
    pub lunch_schedule: Schedule,
    /// Dinner checkpoint (default: 16:00 UTC on weekdays)
    pub dinner_schedule: Schedule,
    /// Absence accounting (default: 10:00 UTC on Saturdays)
    pub warning_mail_schedule: Schedule,
}

fn var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.into())
}

fn window(start_key: &str, start: &str, end_key: &str, end: &str) -> Result<DailyWindow> {
    let start = time(start_key, start)?;
    let end = time(end_key, end)?;
    Ok(DailyWindow::new(start, end))
}

fn time(key: &str, default: &str) -> Result<NaiveTime> {
    let raw = var_or(key, default);
    parse_time_of_day(&raw).with_context(|| format!("{key} is not a valid time of day"))
}

fn schedule(key: &str, default: &str) -> Result<Schedule> {
    let raw = var_or(key, default);
    Schedule::from_str(&raw).with_context(|| format!("{key} is not a valid cron expression: {raw:?}"))
}

impl Config {
    pub fn from_env() -> Result<Self> {
        // .env is optional.
        let _ = dotenvy::dotenv();

        let defaults = DbConfig::default();
        let db = DbConfig {
            url: var_or("SURREAL_URL", &defaults.url),
            namespace: var_or("SURREAL_NAMESPACE", &defaults.namespace),
            database: var_or("SURREAL_DATABASE", &defaults.database),
            username: var_or("SURREAL_USERNAME", &defaults.username),
            password: env::var("SURREAL_PASSWORD").context("SURREAL_PASSWORD must be set")?,
        };

        let engine = EngineConfig {
            lunch_window: window("LUNCH_START_UTC", "12:00:00.000", "LUNCH_END_UTC", "14:30:00.000")?,
            dinner_window: window(
                "DINNER_START_UTC",
                "19:00:00.000",
                "DINNER_END_UTC",
                "01:00:00.000",
            )?,
            lunch_opt_out_cutoff: time("ALLOWED_OPT_OUT_LUNCH", "08:00:00.000")?,
            dinner_opt_out_cutoff: time("ALLOWED_OPT_OUT_DINNER", "15:00:00.000")?,
            ..EngineConfig::default()
        };
        engine.validate().context("invalid meal window configuration")?;

        Ok(Self {
            db,
            engine,
            lunch_schedule: schedule("CRON_LUNCH_SCHEDULE", DEFAULT_LUNCH_SCHEDULE)?,
            dinner_schedule: schedule("CRON_DINNER_SCHEDULE", DEFAULT_DINNER_SCHEDULE)?,
            warning_mail_schedule: schedule(
                "CRON_WARNING_MAIL_SCHEDULE",
                DEFAULT_WARNING_MAIL_SCHEDULE,
            )?,
        })
    }
}
