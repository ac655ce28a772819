//! Cron-driven job loops.

use std::future::Future;

use chrono::Utc;
use cron::Schedule;
use tokio::time::{Duration, sleep};
use tracing::{debug, warn};

/// Run `job` at every upcoming time of `schedule` (UTC). Runs one job at
/// a time; a run that overlaps the next tick delays it.
pub async fn run_on_schedule<F, Fut>(name: &'static str, schedule: Schedule, mut job: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    loop {
        let Some(next) = schedule.upcoming(Utc).next() else {
            warn!(job = name, "Schedule has no upcoming runs, stopping");
            return;
        };
        let wait = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        debug!(job = name, next = %next, "Next run scheduled");
        sleep(wait).await;
        job().await;
    }
}
