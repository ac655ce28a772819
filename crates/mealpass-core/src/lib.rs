//! MealPass Core — domain models, repository traits, clock windows and
//! the eligibility resolver shared by every other crate.

pub mod clock;
pub mod eligibility;
pub mod error;
pub mod models;
pub mod repository;

pub use error::{MealPassError, MealPassResult};
