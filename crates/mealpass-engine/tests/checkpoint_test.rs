//! Integration tests for the checkpoint runner.

mod common;

use common::{Fixture, at, day};
use mealpass_core::models::meal::{Meal, TimeToFood};
use mealpass_core::repository::VoucherRepository;
use mealpass_engine::CheckpointOutcome;

#[tokio::test]
async fn checkpoint_reconciles_then_issues() {
    let fx = Fixture::new(at(2025, 3, 4, 4, 0)).await;
    let user = fx.member("E-1", TimeToFood::Lunch).await;
    let stale = fx.voucher(&user, Meal::Lunch, at(2025, 3, 3, 4, 0)).await;

    let outcome = fx.checkpoint().run(Meal::Lunch).await.unwrap();
    let CheckpointOutcome::Completed { reconcile, issue } = outcome else {
        panic!("checkpoint did not run");
    };
    assert_eq!(reconcile.expired_vouchers, 1);
    assert_eq!(issue.issued, 1);
    assert!(!fx.vouchers().get_by_id(stale.id).await.unwrap().is_active);
}

#[tokio::test]
async fn overlapping_triggers_issue_once() {
    let fx = Fixture::new(at(2025, 3, 4, 4, 0)).await;
    fx.member("E-1", TimeToFood::Lunch).await;
    fx.member("E-2", TimeToFood::LunchDinner).await;
    let runner = fx.checkpoint();

    let (a, b) = tokio::join!(runner.run(Meal::Lunch), runner.run(Meal::Lunch));
    let issued: usize = [a.unwrap(), b.unwrap()]
        .into_iter()
        .map(|outcome| match outcome {
            CheckpointOutcome::Completed { issue, .. } => issue.issued,
            CheckpointOutcome::AlreadyRunning => 0,
        })
        .sum();
    assert_eq!(issued, 2);

    let holders = fx
        .vouchers()
        .list_holders(day(2025, 3, 4), Meal::Lunch)
        .await
        .unwrap();
    assert_eq!(holders.len(), 2);
}
