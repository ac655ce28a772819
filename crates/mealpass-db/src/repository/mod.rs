//! SurrealDB repository implementations.

mod employee;
mod notification;
mod opting_pivot;
mod user;
mod voucher;

pub use employee::SurrealEmployeeRepository;
pub use notification::SurrealNotificationRepository;
pub use opting_pivot::SurrealOptingPivotRepository;
pub use user::SurrealUserRepository;
pub use voucher::SurrealVoucherRepository;

use chrono::NaiveDate;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::DbError;

const DATE_FORMAT: &str = "%Y-%m-%d";

pub(crate) fn parse_uuid(entity: &str, field: &str, value: &str) -> Result<Uuid, DbError> {
    Uuid::parse_str(value).map_err(|e| DbError::corrupt(entity, format!("invalid {field}: {e}")))
}

pub(crate) fn parse_date(entity: &str, value: &str) -> Result<NaiveDate, DbError> {
    NaiveDate::parse_from_str(value, DATE_FORMAT)
        .map_err(|e| DbError::corrupt(entity, format!("invalid date {value:?}: {e}")))
}

pub(crate) fn format_date(day: NaiveDate) -> String {
    day.format(DATE_FORMAT).to_string()
}

pub(crate) fn parse_enum<T: FromStr>(entity: &str, value: &str) -> Result<T, DbError> {
    value
        .parse()
        .map_err(|_| DbError::corrupt(entity, format!("unexpected value {value:?}")))
}
