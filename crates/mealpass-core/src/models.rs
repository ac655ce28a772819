//! Domain models for MealPass.
//!
//! These are the core types shared across all crates.

pub mod employee;
pub mod meal;
pub mod notification;
pub mod opting_pivot;
pub mod user;
pub mod voucher;
