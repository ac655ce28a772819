//! MealPass Server — runs the meal checkpoints and absence accounting
//! on their cron schedules.

mod config;
mod scheduler;

use std::sync::Arc;

use anyhow::Context;
use mealpass_core::clock::{Clock, SystemClock};
use mealpass_core::models::meal::Meal;
use mealpass_db::DbManager;
use mealpass_db::repository::{
    SurrealEmployeeRepository, SurrealOptingPivotRepository, SurrealUserRepository,
    SurrealVoucherRepository,
};
use mealpass_engine::{
    AbsenceAccountant, CheckpointOutcome, CheckpointRunner, LogMailNotifier, Reconciler,
    VoucherIssuer,
};
use surrealdb::Surreal;
use surrealdb::engine::remote::ws::Client;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::config::Config;

type Users = SurrealUserRepository<Client>;
type Employees = SurrealEmployeeRepository<Client>;
type Pivots = SurrealOptingPivotRepository<Client>;
type Vouchers = SurrealVoucherRepository<Client>;

type Runner = CheckpointRunner<Users, Employees, Pivots, Vouchers>;
type Accountant = AbsenceAccountant<Users, Employees, Pivots, Vouchers, LogMailNotifier>;

fn checkpoint_runner(db: &Surreal<Client>, clock: &Arc<dyn Clock>) -> Runner {
    let reconciler = Reconciler::new(
        SurrealUserRepository::new(db.clone()),
        SurrealEmployeeRepository::new(db.clone()),
        SurrealOptingPivotRepository::new(db.clone()),
        SurrealVoucherRepository::new(db.clone()),
        clock.clone(),
    );
    let issuer = VoucherIssuer::new(
        SurrealUserRepository::new(db.clone()),
        SurrealEmployeeRepository::new(db.clone()),
        SurrealOptingPivotRepository::new(db.clone()),
        SurrealVoucherRepository::new(db.clone()),
        clock.clone(),
    );
    CheckpointRunner::new(reconciler, issuer)
}

async fn run_checkpoint(runner: Arc<Runner>, meal: Meal) {
    match runner.run(meal).await {
        Ok(CheckpointOutcome::Completed { reconcile, issue }) => info!(
            %meal,
            reconciled = reconcile.is_success(),
            issued = issue.issued,
            "Checkpoint run finished"
        ),
        Ok(CheckpointOutcome::AlreadyRunning) => {}
        Err(e) => error!(%meal, error = %e, "Checkpoint run failed"),
    }
}

async fn run_accounting(accountant: Arc<Accountant>) {
    match accountant.run_due().await {
        Ok(reports) => info!(periods = reports.len(), "Absence accounting run finished"),
        Err(e) => error!(error = %e, "Absence accounting run failed"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("mealpass=info".parse()?))
        .json()
        .init();

    info!("Starting MealPass server...");

    let config = Config::from_env()?;
    let db = DbManager::connect(&config.db)
        .await
        .context("failed to connect to SurrealDB")?;
    let client = db.client().clone();
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let runner = Arc::new(checkpoint_runner(&client, &clock));
    let accountant = Arc::new(AbsenceAccountant::new(
        SurrealUserRepository::new(client.clone()),
        SurrealEmployeeRepository::new(client.clone()),
        SurrealOptingPivotRepository::new(client.clone()),
        SurrealVoucherRepository::new(client.clone()),
        LogMailNotifier,
        config.engine.clone(),
        clock.clone(),
    ));

    let lunch = {
        let runner = runner.clone();
        tokio::spawn(scheduler::run_on_schedule(
            "lunch-checkpoint",
            config.lunch_schedule.clone(),
            move || run_checkpoint(runner.clone(), Meal::Lunch),
        ))
    };
    let dinner = {
        let runner = runner.clone();
        tokio::spawn(scheduler::run_on_schedule(
            "dinner-checkpoint",
            config.dinner_schedule.clone(),
            move || run_checkpoint(runner.clone(), Meal::Dinner),
        ))
    };
    let accounting = tokio::spawn(scheduler::run_on_schedule(
        "absence-accounting",
        config.warning_mail_schedule.clone(),
        move || run_accounting(accountant.clone()),
    ));

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;

    lunch.abort();
    dinner.abort();
    accounting.abort();
    info!("MealPass server stopped.");
    Ok(())
}
