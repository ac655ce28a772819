//! Shared setup for repository integration tests.

#![allow(dead_code)]

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use mealpass_core::models::employee::{CreateEmployee, Employee};
use mealpass_core::models::meal::TimeToFood;
use mealpass_core::models::user::{CreateUser, User};
use mealpass_core::repository::{EmployeeRepository, UserRepository};
use mealpass_db::repository::{SurrealEmployeeRepository, SurrealUserRepository};
use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem};

pub async fn setup() -> Surreal<Db> {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    mealpass_db::run_migrations(&db).await.unwrap();
    db
}

pub fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
}

pub async fn employee_user(
    db: &Surreal<Db>,
    number: &str,
    time_to_food: TimeToFood,
) -> (Employee, User) {
    let employee = SurrealEmployeeRepository::new(db.clone())
        .create(CreateEmployee {
            employee_number: number.into(),
            first_name: "Test".into(),
            last_name: number.into(),
            time_to_food,
            is_wfh: false,
        })
        .await
        .unwrap();
    let user = SurrealUserRepository::new(db.clone())
        .create(CreateUser {
            employee_id: employee.id,
            email: format!("{number}@example.com"),
            opt_status: None,
            counter: None,
        })
        .await
        .unwrap();
    (employee, user)
}
