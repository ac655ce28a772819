//! Integration tests for checkpoint reconciliation.

mod common;

use common::{Fixture, at, day};
use mealpass_core::models::meal::{Meal, MealSelection, TimeToFood};
use mealpass_core::models::user::OptStatus;
use mealpass_core::repository::{OptingPivotRepository, UserRepository, VoucherRepository};
use mealpass_engine::CheckpointOutcome;

#[tokio::test]
async fn temporary_window_moves_status_at_both_boundaries() {
    // Tuesday, before the lunch cutoff.
    let fx = Fixture::new(at(2025, 3, 4, 3, 0)).await;
    let user = fx.member("E-1", TimeToFood::Lunch).await;
    let pivot = fx
        .opt()
        .opt_out_for_period(
            user.id,
            day(2025, 3, 4),
            day(2025, 3, 7),
            MealSelection::Unspecified,
        )
        .await
        .unwrap();

    fx.set_now(at(2025, 3, 4, 4, 0));
    let report = fx.reconciler().reconcile(Meal::Lunch).await;
    assert!(report.is_success());
    assert_eq!(report.started_windows, 1);
    let during = fx.users().get_by_id(user.id).await.unwrap();
    assert_eq!(during.opt_status, OptStatus::OptOutTemp);

    let issued = fx
        .issuer()
        .issue_vouchers_for_period(Meal::Lunch)
        .await
        .unwrap();
    assert_eq!(issued.issued, 0);

    fx.set_now(at(2025, 3, 7, 4, 0));
    let report = fx.reconciler().reconcile(Meal::Lunch).await;
    assert_eq!(report.ended_windows, 1);
    let after = fx.users().get_by_id(user.id).await.unwrap();
    assert_eq!(after.opt_status, OptStatus::OptIn);
    let pivot = fx.pivots().get_by_id(pivot.id).await.unwrap();
    assert!(!pivot.is_active);
}

#[tokio::test]
async fn monday_expires_every_voucher_from_earlier_days() {
    let fx = Fixture::new(at(2025, 3, 10, 4, 0)).await;
    let user = fx.member("E-1", TimeToFood::LunchDinner).await;
    let lunch = fx.voucher(&user, Meal::Lunch, at(2025, 3, 7, 4, 0)).await;
    let dinner = fx.voucher(&user, Meal::Dinner, at(2025, 3, 7, 16, 0)).await;
    // Left active by a failed run on Friday.
    let older = fx.voucher(&user, Meal::Lunch, at(2025, 3, 6, 4, 0)).await;
    let today = fx.voucher(&user, Meal::Lunch, at(2025, 3, 10, 3, 0)).await;

    let report = fx.reconciler().reconcile(Meal::Lunch).await;
    assert_eq!(report.expired_vouchers, 3);

    let vouchers = fx.vouchers();
    assert!(!vouchers.get_by_id(lunch.id).await.unwrap().is_active);
    assert!(!vouchers.get_by_id(dinner.id).await.unwrap().is_active);
    assert!(!vouchers.get_by_id(older.id).await.unwrap().is_active);
    assert!(vouchers.get_by_id(today.id).await.unwrap().is_active);

    let absences = vouchers
        .count_absences_since(at(2025, 3, 3, 0, 0))
        .await
        .unwrap();
    assert_eq!(absences.len(), 1);
    assert_eq!(absences[0].absent_count, 3);
}

#[tokio::test]
async fn window_ending_on_saturday_closes_at_monday_checkpoint() {
    // Tuesday, before the lunch cutoff.
    let fx = Fixture::new(at(2025, 3, 4, 3, 0)).await;
    let user = fx.member("E-1", TimeToFood::Lunch).await;
    let pivot = fx
        .opt()
        .opt_out_for_period(
            user.id,
            day(2025, 3, 4),
            day(2025, 3, 8),
            MealSelection::Unspecified,
        )
        .await
        .unwrap();

    fx.set_now(at(2025, 3, 4, 4, 0));
    fx.reconciler().reconcile(Meal::Lunch).await;
    let during = fx.users().get_by_id(user.id).await.unwrap();
    assert_eq!(during.opt_status, OptStatus::OptOutTemp);

    // No checkpoint runs on the weekend.
    fx.set_now(at(2025, 3, 10, 4, 0));
    match fx.checkpoint().run(Meal::Lunch).await.unwrap() {
        CheckpointOutcome::Completed { reconcile, issue } => {
            assert_eq!(reconcile.ended_windows, 1);
            assert_eq!(issue.issued, 1);
        }
        other => panic!("expected a completed checkpoint, got {other:?}"),
    }

    let after = fx.users().get_by_id(user.id).await.unwrap();
    assert_eq!(after.opt_status, OptStatus::OptIn);
    assert!(!fx.pivots().get_by_id(pivot.id).await.unwrap().is_active);

    // Closed once; the next run finds nothing to end.
    fx.set_now(at(2025, 3, 11, 4, 0));
    let report = fx.reconciler().reconcile(Meal::Lunch).await;
    assert_eq!(report.ended_windows, 0);
}

#[tokio::test]
async fn lunch_dinner_users_are_restored_to_opt_in() {
    let fx = Fixture::new(at(2025, 3, 4, 4, 0)).await;
    let both = fx
        .member_with("E-1", TimeToFood::LunchDinner, false, Some(OptStatus::OptOutTemp), None)
        .await;
    let fixed = fx
        .member_with("E-2", TimeToFood::Lunch, false, Some(OptStatus::OptOutTemp), None)
        .await;
    let permanent = fx
        .member_with("E-3", TimeToFood::LunchDinner, false, Some(OptStatus::OptOutPerm), None)
        .await;

    let report = fx.reconciler().reconcile(Meal::Lunch).await;
    assert_eq!(report.restored_users, 1);

    let users = fx.users();
    assert_eq!(users.get_by_id(both.id).await.unwrap().opt_status, OptStatus::OptIn);
    assert_eq!(users.get_by_id(fixed.id).await.unwrap().opt_status, OptStatus::OptOutTemp);
    assert_eq!(
        users.get_by_id(permanent.id).await.unwrap().opt_status,
        OptStatus::OptOutPerm
    );
}

#[tokio::test]
async fn per_meal_opt_out_survives_reconciliation() {
    let fx = Fixture::new(at(2025, 3, 4, 3, 0)).await;
    let user = fx.member("E-1", TimeToFood::LunchDinner).await;
    fx.opt()
        .opt_out_for_period(user.id, day(2025, 3, 4), day(2025, 3, 5), MealSelection::Lunch)
        .await
        .unwrap();

    fx.set_now(at(2025, 3, 4, 4, 0));
    fx.reconciler().reconcile(Meal::Lunch).await;

    let eligibility = fx.issuer().eligibility_for_user(user.id).await.unwrap();
    assert!(!eligibility.lunch);
    assert!(eligibility.dinner);
}

#[tokio::test]
async fn permanent_status_is_never_overwritten_by_temporary_windows() {
    let fx = Fixture::new(at(2025, 3, 4, 3, 0)).await;
    let user = fx.member("E-1", TimeToFood::Lunch).await;
    fx.opt()
        .opt_out_for_period(user.id, day(2025, 3, 4), day(2025, 3, 5), MealSelection::Unspecified)
        .await
        .unwrap();
    fx.users()
        .set_opt_status(user.id, OptStatus::OptOutPerm, at(2025, 3, 4, 3, 30))
        .await
        .unwrap();

    fx.set_now(at(2025, 3, 4, 4, 0));
    let report = fx.reconciler().reconcile(Meal::Lunch).await;
    assert_eq!(report.started_windows, 0);
    let user = fx.users().get_by_id(user.id).await.unwrap();
    assert_eq!(user.opt_status, OptStatus::OptOutPerm);
}
