//! SurrealDB implementation of [`EmployeeRepository`].

use chrono::{DateTime, Utc};
use mealpass_core::error::MealPassResult;
use mealpass_core::models::employee::{CreateEmployee, Employee};
use mealpass_core::models::meal::TimeToFood;
use mealpass_core::repository::EmployeeRepository;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use super::{parse_enum, parse_uuid};
use crate::error::DbError;

const ENTITY: &str = "employee";

#[derive(Debug, SurrealValue)]
struct EmployeeRow {
    employee_number: String,
    first_name: String,
    last_name: String,
    time_to_food: String,
    is_wfh: bool,
    created_at: DateTime<Utc>,
}

#[derive(Debug, SurrealValue)]
struct EmployeeRowWithId {
    record_id: String,
    employee_number: String,
    first_name: String,
    last_name: String,
    time_to_food: String,
    is_wfh: bool,
    created_at: DateTime<Utc>,
}

fn row_to_employee(row: EmployeeRow, id: Uuid) -> Result<Employee, DbError> {
    Ok(Employee {
        id,
        employee_number: row.employee_number,
        first_name: row.first_name,
        last_name: row.last_name,
        time_to_food: parse_enum(ENTITY, &row.time_to_food)?,
        is_wfh: row.is_wfh,
        created_at: row.created_at,
    })
}

impl EmployeeRowWithId {
    fn try_into_employee(self) -> Result<Employee, DbError> {
        Ok(Employee {
            id: parse_uuid(ENTITY, "id", &self.record_id)?,
            employee_number: self.employee_number,
            first_name: self.first_name,
            last_name: self.last_name,
            time_to_food: parse_enum(ENTITY, &self.time_to_food)?,
            is_wfh: self.is_wfh,
            created_at: self.created_at,
        })
    }
}

/// SurrealDB implementation of the Employee repository.
#[derive(Clone)]
pub struct SurrealEmployeeRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealEmployeeRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> EmployeeRepository for SurrealEmployeeRepository<C> {
    async fn create(&self, input: CreateEmployee) -> MealPassResult<Employee> {
        let id = Uuid::new_v4();
        let id_str = id.to_string();

        let result = self
            .db
            .query(
                "CREATE type::record('employee', $id) SET \
                 employee_number = $employee_number, \
                 first_name = $first_name, \
                 last_name = $last_name, \
                 time_to_food = $time_to_food, \
                 is_wfh = $is_wfh",
            )
            .bind(("id", id_str.clone()))
            .bind(("employee_number", input.employee_number))
            .bind(("first_name", input.first_name))
            .bind(("last_name", input.last_name))
            .bind(("time_to_food", input.time_to_food.as_str().to_string()))
            .bind(("is_wfh", input.is_wfh))
            .await
            .map_err(DbError::from)?;

        let mut result = result
            .check()
            .map_err(|e| DbError::from_statement(ENTITY, e))?;

        let rows: Vec<EmployeeRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: ENTITY.into(),
            id: id_str,
        })?;

        Ok(row_to_employee(row, id)?)
    }

    async fn get_by_id(&self, id: Uuid) -> MealPassResult<Employee> {
        let id_str = id.to_string();

        let mut result = self
            .db
            .query("SELECT * FROM type::record('employee', $id)")
            .bind(("id", id_str.clone()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<EmployeeRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: ENTITY.into(),
            id: id_str,
        })?;

        Ok(row_to_employee(row, id)?)
    }

    async fn list(&self) -> MealPassResult<Vec<Employee>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM employee \
                 ORDER BY employee_number ASC",
            )
            .await
            .map_err(DbError::from)?;

        let rows: Vec<EmployeeRowWithId> = result.take(0).map_err(DbError::from)?;
        let employees = rows
            .into_iter()
            .map(|row| row.try_into_employee())
            .collect::<Result<Vec<_>, DbError>>()?;
        Ok(employees)
    }

    async fn list_by_time_to_food(&self, time_to_food: TimeToFood) -> MealPassResult<Vec<Employee>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM employee \
                 WHERE time_to_food = $time_to_food \
                 ORDER BY employee_number ASC",
            )
            .bind(("time_to_food", time_to_food.as_str().to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<EmployeeRowWithId> = result.take(0).map_err(DbError::from)?;
        let employees = rows
            .into_iter()
            .map(|row| row.try_into_employee())
            .collect::<Result<Vec<_>, DbError>>()?;
        Ok(employees)
    }
}
