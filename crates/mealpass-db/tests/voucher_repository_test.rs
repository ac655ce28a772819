//! Integration tests for the Voucher repository using in-memory
//! SurrealDB.

mod common;

use std::sync::Arc;

use chrono::Duration;
use common::{at, day, employee_user, setup};
use mealpass_core::MealPassError;
use mealpass_core::models::meal::{Meal, TimeToFood};
use mealpass_core::models::voucher::CreateVoucher;
use mealpass_core::repository::VoucherRepository;
use mealpass_db::repository::SurrealVoucherRepository;

#[tokio::test]
async fn create_and_list_holders() {
    let db = setup().await;
    let (_, user) = employee_user(&db, "E-1", TimeToFood::LunchDinner).await;
    let repo = SurrealVoucherRepository::new(db);
    let issued_at = at(2025, 3, 4, 4, 0);

    let voucher = repo
        .create(CreateVoucher {
            user_id: user.id,
            date_of_use: day(2025, 3, 4),
            meal: Meal::Lunch,
            created_at: issued_at,
        })
        .await
        .unwrap();
    assert!(voucher.is_active);
    assert!(!voucher.is_scanned);
    assert_eq!(voucher.scanned_at, None);

    let lunch = repo.list_holders(day(2025, 3, 4), Meal::Lunch).await.unwrap();
    assert_eq!(lunch, vec![user.id]);
    let dinner = repo.list_holders(day(2025, 3, 4), Meal::Dinner).await.unwrap();
    assert!(dinner.is_empty());
}

#[tokio::test]
async fn duplicate_issue_is_rejected_by_index() {
    let db = setup().await;
    let (_, user) = employee_user(&db, "E-1", TimeToFood::Lunch).await;
    let repo = SurrealVoucherRepository::new(db);
    let input = CreateVoucher {
        user_id: user.id,
        date_of_use: day(2025, 3, 4),
        meal: Meal::Lunch,
        created_at: at(2025, 3, 4, 4, 0),
    };

    repo.create(input.clone()).await.unwrap();
    let err = repo.create(input).await.unwrap_err();
    assert!(matches!(err, MealPassError::AlreadyExists { .. }), "{err:?}");
}

#[tokio::test]
async fn redemption_is_conditional() {
    let db = setup().await;
    let (_, owner) = employee_user(&db, "E-1", TimeToFood::Lunch).await;
    let (_, other) = employee_user(&db, "E-2", TimeToFood::Lunch).await;
    let repo = SurrealVoucherRepository::new(db);
    let issued_at = at(2025, 3, 4, 4, 0);
    let voucher = repo
        .create(CreateVoucher {
            user_id: owner.id,
            date_of_use: day(2025, 3, 4),
            meal: Meal::Lunch,
            created_at: issued_at,
        })
        .await
        .unwrap();
    let now = at(2025, 3, 4, 12, 30);
    let since = now - Duration::hours(24);

    assert!(repo.mark_redeemed(voucher.id, other.id, since, now).await.unwrap().is_none());

    let redeemed = repo
        .mark_redeemed(voucher.id, owner.id, since, now)
        .await
        .unwrap()
        .expect("first scan succeeds");
    assert!(redeemed.is_scanned);
    assert!(!redeemed.is_active);
    assert_eq!(redeemed.scanned_at, Some(now));

    assert!(repo.mark_redeemed(voucher.id, owner.id, since, now).await.unwrap().is_none());
}

#[tokio::test]
async fn stale_voucher_is_not_redeemable() {
    let db = setup().await;
    let (_, user) = employee_user(&db, "E-1", TimeToFood::Dinner).await;
    let repo = SurrealVoucherRepository::new(db);
    let issued_at = at(2025, 3, 4, 16, 0);
    let voucher = repo
        .create(CreateVoucher {
            user_id: user.id,
            date_of_use: day(2025, 3, 4),
            meal: Meal::Dinner,
            created_at: issued_at,
        })
        .await
        .unwrap();

    let late = issued_at + Duration::hours(24) + Duration::seconds(1);
    let since = late - Duration::hours(24);
    assert!(repo.mark_redeemed(voucher.id, user.id, since, late).await.unwrap().is_none());
    assert!(repo.list_redeemable_for_user(user.id, since, late).await.unwrap().is_empty());
    assert!(repo.get_by_id(voucher.id).await.unwrap().is_active);
}

#[tokio::test]
async fn validity_ends_exactly_a_day_after_issue() {
    let db = setup().await;
    let (_, user) = employee_user(&db, "E-1", TimeToFood::Lunch).await;
    let repo = SurrealVoucherRepository::new(db);
    let issued_at = at(2025, 3, 4, 4, 0);
    let voucher = repo
        .create(CreateVoucher {
            user_id: user.id,
            date_of_use: day(2025, 3, 4),
            meal: Meal::Lunch,
            created_at: issued_at,
        })
        .await
        .unwrap();

    let boundary = issued_at + Duration::hours(24);
    let since = boundary - Duration::hours(24);
    assert!(repo.list_redeemable_for_user(user.id, since, boundary).await.unwrap().is_empty());
    assert!(repo.mark_redeemed(voucher.id, user.id, since, boundary).await.unwrap().is_none());

    let just_before = boundary - Duration::seconds(1);
    let since = just_before - Duration::hours(24);
    assert!(repo
        .mark_redeemed(voucher.id, user.id, since, just_before)
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn concurrent_redemption_succeeds_once() {
    let db = setup().await;
    let (_, user) = employee_user(&db, "E-1", TimeToFood::Lunch).await;
    let repo = Arc::new(SurrealVoucherRepository::new(db));
    let voucher = repo
        .create(CreateVoucher {
            user_id: user.id,
            date_of_use: day(2025, 3, 4),
            meal: Meal::Lunch,
            created_at: at(2025, 3, 4, 4, 0),
        })
        .await
        .unwrap();
    let now = at(2025, 3, 4, 12, 15);

    let mut handles = Vec::new();
    for _ in 0..16 {
        let repo = Arc::clone(&repo);
        handles.push(tokio::spawn(async move {
            repo.mark_redeemed(voucher.id, user.id, now - Duration::hours(24), now)
                .await
        }));
    }

    let mut successes = 0;
    for handle in handles {
        if handle.await.unwrap().unwrap().is_some() {
            successes += 1;
        }
    }
    assert_eq!(successes, 1);
}

#[tokio::test]
async fn expiry_and_absence_counts() {
    let db = setup().await;
    let (_, absent) = employee_user(&db, "E-1", TimeToFood::Lunch).await;
    let (_, present) = employee_user(&db, "E-2", TimeToFood::Lunch).await;
    let repo = SurrealVoucherRepository::new(db);

    for d in 3..=5 {
        for user in [&absent, &present] {
            repo.create(CreateVoucher {
                user_id: user.id,
                date_of_use: day(2025, 3, d),
                meal: Meal::Lunch,
                created_at: at(2025, 3, d, 4, 0),
            })
            .await
            .unwrap();
        }
    }
    let scan_day = at(2025, 3, 3, 12, 0);
    let present_vouchers = repo
        .list_for_user_since(present.id, at(2025, 3, 1, 0, 0))
        .await
        .unwrap();
    assert_eq!(present_vouchers.len(), 3);
    repo.mark_redeemed(present_vouchers[0].id, present.id, scan_day - Duration::hours(24), scan_day)
        .await
        .unwrap()
        .expect("redeemed");

    // Expire the 3rd and 4th; the 5th is still live.
    let expired = repo
        .expire_created_before(at(2025, 3, 5, 0, 0))
        .await
        .unwrap();
    assert_eq!(expired, 3);

    let mut counts = repo.count_absences_since(at(2025, 3, 1, 0, 0)).await.unwrap();
    counts.sort_by_key(|c| c.absent_count);
    assert_eq!(counts.len(), 2);
    assert_eq!(counts[0].user_id, present.id);
    assert_eq!(counts[0].absent_count, 1);
    assert_eq!(counts[1].user_id, absent.id);
    assert_eq!(counts[1].absent_count, 2);
}
