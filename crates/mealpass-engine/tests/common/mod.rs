//! Shared fixture for engine integration tests: in-memory SurrealDB,
//! a settable clock and a recording mail notifier.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use mealpass_core::clock::FixedClock;
use mealpass_core::error::{MealPassError, MealPassResult};
use mealpass_core::models::employee::CreateEmployee;
use mealpass_core::models::meal::{Meal, TimeToFood};
use mealpass_core::models::user::{CreateUser, OptStatus, User};
use mealpass_core::models::voucher::{CreateVoucher, Voucher};
use mealpass_core::repository::{EmployeeRepository, UserRepository, VoucherRepository};
use mealpass_db::repository::{
    SurrealEmployeeRepository, SurrealNotificationRepository, SurrealOptingPivotRepository,
    SurrealUserRepository, SurrealVoucherRepository,
};
use mealpass_engine::config::EngineConfig;
use mealpass_engine::mail::{MailNotifier, WarningMail};
use mealpass_engine::{
    AbsenceAccountant, CheckpointRunner, OptService, Reconciler, RedemptionService, VoucherIssuer,
};
use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem};

pub type Users = SurrealUserRepository<Db>;
pub type Employees = SurrealEmployeeRepository<Db>;
pub type Pivots = SurrealOptingPivotRepository<Db>;
pub type Vouchers = SurrealVoucherRepository<Db>;
pub type Notifications = SurrealNotificationRepository<Db>;

pub fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
}

/// Mail notifier that keeps every request it receives.
#[derive(Clone, Default)]
pub struct RecordingMailer {
    sent: Arc<Mutex<Vec<WarningMail>>>,
    fail: bool,
}

impl RecordingMailer {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<WarningMail> {
        self.sent.lock().unwrap().clone()
    }
}

impl MailNotifier for RecordingMailer {
    async fn send_warning(&self, mail: WarningMail) -> MealPassResult<()> {
        self.sent.lock().unwrap().push(mail);
        if self.fail {
            return Err(MealPassError::Mail("smtp unavailable".into()));
        }
        Ok(())
    }
}

pub struct Fixture {
    pub db: Surreal<Db>,
    pub clock: Arc<FixedClock>,
    pub config: EngineConfig,
}

impl Fixture {
    pub async fn new(now: DateTime<Utc>) -> Self {
        let db = Surreal::new::<Mem>(()).await.unwrap();
        db.use_ns("test").use_db("test").await.unwrap();
        mealpass_db::run_migrations(&db).await.unwrap();
        Self {
            db,
            clock: Arc::new(FixedClock::new(now)),
            config: EngineConfig::default(),
        }
    }

    pub fn users(&self) -> Users {
        SurrealUserRepository::new(self.db.clone())
    }

    pub fn employees(&self) -> Employees {
        SurrealEmployeeRepository::new(self.db.clone())
    }

    pub fn pivots(&self) -> Pivots {
        SurrealOptingPivotRepository::new(self.db.clone())
    }

    pub fn vouchers(&self) -> Vouchers {
        SurrealVoucherRepository::new(self.db.clone())
    }

    pub fn notifications(&self) -> Notifications {
        SurrealNotificationRepository::new(self.db.clone())
    }

    pub fn set_now(&self, now: DateTime<Utc>) {
        self.clock.set(now);
    }

    pub fn issuer(&self) -> VoucherIssuer<Users, Employees, Pivots, Vouchers> {
        VoucherIssuer::new(
            self.users(),
            self.employees(),
            self.pivots(),
            self.vouchers(),
            self.clock.clone(),
        )
    }

    pub fn reconciler(&self) -> Reconciler<Users, Employees, Pivots, Vouchers> {
        Reconciler::new(
            self.users(),
            self.employees(),
            self.pivots(),
            self.vouchers(),
            self.clock.clone(),
        )
    }

    pub fn checkpoint(&self) -> CheckpointRunner<Users, Employees, Pivots, Vouchers> {
        CheckpointRunner::new(self.reconciler(), self.issuer())
    }

    pub fn redemption(&self) -> RedemptionService<Users, Employees, Vouchers> {
        RedemptionService::new(
            self.users(),
            self.employees(),
            self.vouchers(),
            self.config.clone(),
            self.clock.clone(),
        )
    }

    pub fn opt(&self) -> OptService<Users, Employees, Pivots, Notifications> {
        OptService::new(
            self.users(),
            self.employees(),
            self.pivots(),
            self.notifications(),
            self.config.clone(),
            self.clock.clone(),
        )
    }

    pub fn accountant(
        &self,
        mailer: RecordingMailer,
    ) -> AbsenceAccountant<Users, Employees, Pivots, Vouchers, RecordingMailer> {
        AbsenceAccountant::new(
            self.users(),
            self.employees(),
            self.pivots(),
            self.vouchers(),
            mailer,
            self.config.clone(),
            self.clock.clone(),
        )
    }

    /// Employee plus portal user with default opt state.
    pub async fn member(&self, number: &str, time_to_food: TimeToFood) -> User {
        self.member_with(number, time_to_food, false, None, None).await
    }

    pub async fn member_with(
        &self,
        number: &str,
        time_to_food: TimeToFood,
        is_wfh: bool,
        opt_status: Option<OptStatus>,
        counter: Option<u32>,
    ) -> User {
        let employee = self
            .employees()
            .create(CreateEmployee {
                employee_number: number.into(),
                first_name: "Test".into(),
                last_name: number.into(),
                time_to_food,
                is_wfh,
            })
            .await
            .unwrap();
        self.users()
            .create(CreateUser {
                employee_id: employee.id,
                email: format!("{number}@example.com"),
                opt_status,
                counter,
            })
            .await
            .unwrap()
    }

    pub async fn voucher(
        &self,
        user: &User,
        meal: Meal,
        created_at: DateTime<Utc>,
    ) -> Voucher {
        self.vouchers()
            .create(CreateVoucher {
                user_id: user.id,
                date_of_use: created_at.date_naive(),
                meal,
                created_at,
            })
            .await
            .unwrap()
    }
}
