//! Eligibility resolver: decides, per meal, whether a user receives a
//! voucher on a given day.
//!
//! Pure function over the user's cached opt status, the employee
//! profile and the pivots that cover the day. The cached
//! [`OptStatus`] is only a fast path; the per-meal decision is always
//! re-derived from pivots.

use chrono::NaiveDate;

use crate::models::employee::Employee;
use crate::models::meal::Meal;
use crate::models::opting_pivot::{OptingPivot, PivotStatus};
use crate::models::user::{OptStatus, User};

/// Eligibility per meal period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Eligibility {
    pub lunch: bool,
    pub dinner: bool,
}

impl Eligibility {
    pub const NONE: Eligibility = Eligibility {
        lunch: false,
        dinner: false,
    };

    pub fn for_meal(&self, meal: Meal) -> bool {
        match meal {
            Meal::Lunch => self.lunch,
            Meal::Dinner => self.dinner,
        }
    }

    fn set(&mut self, meal: Meal, value: bool) {
        match meal {
            Meal::Lunch => self.lunch = value,
            Meal::Dinner => self.dinner = value,
        }
    }

    pub fn any(&self) -> bool {
        self.lunch || self.dinner
    }
}

/// Everything the resolver needs to know about one user on one day.
#[derive(Debug, Clone, Copy)]
pub struct EligibilityInput<'a> {
    pub user: &'a User,
    pub employee: &'a Employee,
    /// The user's pivots. Ineffective pivots and pivots not covering
    /// `day` are ignored.
    pub pivots: &'a [OptingPivot],
    pub day: NaiveDate,
}

impl<'a> EligibilityInput<'a> {
    fn effective(&self, status: PivotStatus) -> impl Iterator<Item = &'a OptingPivot> {
        let day = self.day;
        self.pivots
            .iter()
            .filter(move |p| p.status == status && p.is_effective() && p.covers(day))
    }

    fn has_wfh_exception(&self) -> bool {
        self.employee.is_wfh && self.effective(PivotStatus::OptInTemporarily).next().is_some()
    }

    fn opted_out_of(&self, meal: Meal) -> bool {
        let time_to_food = self.employee.time_to_food;
        self.effective(PivotStatus::OptOutTemporarily)
            .any(|p| p.meal_opted_out.covers(meal, time_to_food))
    }
}

pub fn resolve(input: &EligibilityInput<'_>) -> Eligibility {
    if !input.user.is_enabled() {
        return Eligibility::NONE;
    }

    let time_to_food = input.employee.time_to_food;
    let mut out = Eligibility::NONE;

    match input.user.opt_status {
        OptStatus::OptOutPerm => {
            if input.has_wfh_exception() {
                for meal in Meal::ALL {
                    out.set(meal, time_to_food.includes(meal));
                }
            }
        }
        OptStatus::OptOutTemp => {}
        OptStatus::OptIn => {
            for meal in Meal::ALL {
                out.set(meal, time_to_food.includes(meal) && !input.opted_out_of(meal));
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::*;
    use crate::models::meal::{MealSelection, TimeToFood};
    use crate::models::opting_pivot::ApprovalStatus;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 4).unwrap()
    }

    fn user(status: OptStatus) -> User {
        User {
            id: Uuid::new_v4(),
            employee_id: Uuid::new_v4(),
            email: "emp@example.com".into(),
            opt_status: status,
            counter: 3,
            absent_warning_counter: 0,
            is_active: true,
            is_deleted: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn employee(time_to_food: TimeToFood, is_wfh: bool) -> Employee {
        Employee {
            id: Uuid::new_v4(),
            employee_number: "E-1".into(),
            first_name: "Ada".into(),
            last_name: "Lovelace".into(),
            time_to_food,
            is_wfh,
            created_at: Utc::now(),
        }
    }

    fn pivot(status: PivotStatus, meal: MealSelection, from: i64, to: i64) -> OptingPivot {
        OptingPivot {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            status,
            time_from: today() + chrono::Duration::days(from),
            time_to: today() + chrono::Duration::days(to),
            meal_opted_out: meal,
            is_active: true,
            approval: ApprovalStatus::Approved,
            created_at: Utc::now(),
        }
    }

    fn run(u: &User, e: &Employee, pivots: &[OptingPivot]) -> Eligibility {
        resolve(&EligibilityInput {
            user: u,
            employee: e,
            pivots,
            day: today(),
        })
    }

    #[test]
    fn opted_in_fixed_meal_employee() {
        let e = employee(TimeToFood::Lunch, false);
        let got = run(&user(OptStatus::OptIn), &e, &[]);
        assert_eq!(got, Eligibility { lunch: true, dinner: false });
    }

    #[test]
    fn lunch_dinner_partial_opt_out() {
        let e = employee(TimeToFood::LunchDinner, false);
        let p = pivot(PivotStatus::OptOutTemporarily, MealSelection::Lunch, 0, 1);
        let got = run(&user(OptStatus::OptIn), &e, &[p]);
        assert!(!got.lunch);
        assert!(got.dinner);
    }

    #[test]
    fn unspecified_meal_removes_every_subscribed_meal() {
        let e = employee(TimeToFood::LunchDinner, false);
        let p = pivot(PivotStatus::OptOutTemporarily, MealSelection::Unspecified, 0, 1);
        assert_eq!(run(&user(OptStatus::OptIn), &e, &[p]), Eligibility::NONE);
    }

    #[test]
    fn fixed_meal_ignores_opt_out_for_other_meal() {
        let e = employee(TimeToFood::Dinner, false);
        let p = pivot(PivotStatus::OptOutTemporarily, MealSelection::Lunch, 0, 1);
        let got = run(&user(OptStatus::OptIn), &e, &[p]);
        assert_eq!(got, Eligibility { lunch: false, dinner: true });
    }

    #[test]
    fn window_ending_today_no_longer_applies() {
        let e = employee(TimeToFood::Lunch, false);
        let p = pivot(PivotStatus::OptOutTemporarily, MealSelection::Unspecified, -3, 0);
        assert!(run(&user(OptStatus::OptIn), &e, &[p]).lunch);
    }

    #[test]
    fn inactive_or_unapproved_pivots_are_ignored() {
        let e = employee(TimeToFood::Lunch, false);
        let mut inactive = pivot(PivotStatus::OptOutTemporarily, MealSelection::Unspecified, 0, 1);
        inactive.is_active = false;
        let mut pending = inactive.clone();
        pending.is_active = true;
        pending.approval = ApprovalStatus::Pending;
        assert!(run(&user(OptStatus::OptIn), &e, &[inactive, pending]).lunch);
    }

    #[test]
    fn temporary_status_excludes_every_meal() {
        let e = employee(TimeToFood::LunchDinner, false);
        assert_eq!(run(&user(OptStatus::OptOutTemp), &e, &[]), Eligibility::NONE);
    }

    #[test]
    fn permanent_opt_out_without_exception() {
        let e = employee(TimeToFood::Lunch, true);
        assert_eq!(run(&user(OptStatus::OptOutPerm), &e, &[]), Eligibility::NONE);
    }

    #[test]
    fn wfh_exception_overrides_permanent_opt_out() {
        let e = employee(TimeToFood::Dinner, true);
        let p = pivot(PivotStatus::OptInTemporarily, MealSelection::Unspecified, -1, 2);
        let got = run(&user(OptStatus::OptOutPerm), &e, &[p]);
        assert_eq!(got, Eligibility { lunch: false, dinner: true });
    }

    #[test]
    fn wfh_exception_requires_wfh_employee() {
        let e = employee(TimeToFood::Dinner, false);
        let p = pivot(PivotStatus::OptInTemporarily, MealSelection::Unspecified, 0, 2);
        assert_eq!(run(&user(OptStatus::OptOutPerm), &e, &[p]), Eligibility::NONE);
    }

    #[test]
    fn suspended_user_is_never_eligible() {
        let e = employee(TimeToFood::Lunch, false);
        let mut u = user(OptStatus::OptIn);
        u.is_deleted = true;
        assert_eq!(run(&u, &e, &[]), Eligibility::NONE);
    }
}
