//! Meal periods, employee meal subscriptions and per-meal opt-out codes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::MealPassError;

/// A meal period served by the cafeteria.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Meal {
    Lunch,
    Dinner,
}

impl Meal {
    pub const ALL: [Meal; 2] = [Meal::Lunch, Meal::Dinner];

    /// Checkpoint index used by the scheduler (1 = lunch, 2 = dinner).
    pub fn index(self) -> u8 {
        match self {
            Meal::Lunch => 1,
            Meal::Dinner => 2,
        }
    }

    pub fn from_index(index: u8) -> Option<Self> {
        match index {
            1 => Some(Meal::Lunch),
            2 => Some(Meal::Dinner),
            _ => None,
        }
    }

    /// Label stored on vouchers.
    pub fn label(self) -> &'static str {
        match self {
            Meal::Lunch => "Lunch",
            Meal::Dinner => "Dinner",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "Lunch" => Some(Meal::Lunch),
            "Dinner" => Some(Meal::Dinner),
            _ => None,
        }
    }
}

impl fmt::Display for Meal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Meal {
    type Err = MealPassError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "lunch" => Ok(Meal::Lunch),
            "dinner" => Ok(Meal::Dinner),
            other => Err(MealPassError::Parse(format!("unknown meal: {other}"))),
        }
    }
}

/// Which meals an employee is subscribed to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TimeToFood {
    Lunch,
    Dinner,
    LunchDinner,
}

impl TimeToFood {
    pub fn as_str(self) -> &'static str {
        match self {
            TimeToFood::Lunch => "lunch",
            TimeToFood::Dinner => "dinner",
            TimeToFood::LunchDinner => "lunch-dinner",
        }
    }

    pub fn includes(self, meal: Meal) -> bool {
        matches!(
            (self, meal),
            (TimeToFood::LunchDinner, _)
                | (TimeToFood::Lunch, Meal::Lunch)
                | (TimeToFood::Dinner, Meal::Dinner)
        )
    }

    /// The single meal for fixed-meal employees.
    pub fn fixed_meal(self) -> Option<Meal> {
        match self {
            TimeToFood::Lunch => Some(Meal::Lunch),
            TimeToFood::Dinner => Some(Meal::Dinner),
            TimeToFood::LunchDinner => None,
        }
    }
}

impl FromStr for TimeToFood {
    type Err = MealPassError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lunch" => Ok(TimeToFood::Lunch),
            "dinner" => Ok(TimeToFood::Dinner),
            "lunch-dinner" => Ok(TimeToFood::LunchDinner),
            other => Err(MealPassError::Parse(format!("unknown time_to_food: {other}"))),
        }
    }
}

/// The `meal_opted_out` code carried by an opting pivot.
///
/// `Unspecified` (code 0) means "every meal the employee is subscribed
/// to", for eligibility and issuance alike.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum MealSelection {
    #[default]
    Unspecified,
    Lunch,
    Dinner,
    Both,
}

impl MealSelection {
    pub fn code(self) -> u8 {
        match self {
            MealSelection::Unspecified => 0,
            MealSelection::Lunch => 1,
            MealSelection::Dinner => 2,
            MealSelection::Both => 3,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(MealSelection::Unspecified),
            1 => Some(MealSelection::Lunch),
            2 => Some(MealSelection::Dinner),
            3 => Some(MealSelection::Both),
            _ => None,
        }
    }

    /// Whether this selection removes `meal` for an employee with the
    /// given subscription.
    pub fn covers(self, meal: Meal, time_to_food: TimeToFood) -> bool {
        match self {
            MealSelection::Unspecified => time_to_food.includes(meal),
            MealSelection::Both => true,
            MealSelection::Lunch => meal == Meal::Lunch,
            MealSelection::Dinner => meal == Meal::Dinner,
        }
    }

    /// The set of meals named, resolved against the subscription.
    pub fn meals(self, time_to_food: TimeToFood) -> Vec<Meal> {
        Meal::ALL
            .into_iter()
            .filter(|meal| self.covers(*meal, time_to_food))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meal_index_roundtrip() {
        for meal in Meal::ALL {
            assert_eq!(Meal::from_index(meal.index()), Some(meal));
        }
        assert_eq!(Meal::from_index(0), None);
    }

    #[test]
    fn meal_parses_case_insensitively() {
        assert_eq!("lunch".parse::<Meal>().unwrap(), Meal::Lunch);
        assert_eq!("Dinner".parse::<Meal>().unwrap(), Meal::Dinner);
        assert!("brunch".parse::<Meal>().is_err());
    }

    #[test]
    fn unspecified_selection_follows_subscription() {
        let sel = MealSelection::Unspecified;
        assert!(sel.covers(Meal::Lunch, TimeToFood::Lunch));
        assert!(!sel.covers(Meal::Dinner, TimeToFood::Lunch));
        assert!(sel.covers(Meal::Lunch, TimeToFood::LunchDinner));
        assert!(sel.covers(Meal::Dinner, TimeToFood::LunchDinner));
    }

    #[test]
    fn specific_selection_ignores_subscription() {
        assert!(MealSelection::Lunch.covers(Meal::Lunch, TimeToFood::LunchDinner));
        assert!(!MealSelection::Lunch.covers(Meal::Dinner, TimeToFood::LunchDinner));
        assert_eq!(
            MealSelection::Both.meals(TimeToFood::Dinner),
            vec![Meal::Lunch, Meal::Dinner]
        );
    }

    #[test]
    fn selection_codes() {
        assert_eq!(MealSelection::from_code(3), Some(MealSelection::Both));
        assert_eq!(MealSelection::from_code(4), None);
        assert_eq!(MealSelection::Dinner.code(), 2);
    }
}
