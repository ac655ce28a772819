//! Schema definitions and migration runner for SurrealDB.
//!
//! All tables are SCHEMAFULL. UUIDs and calendar dates (`YYYY-MM-DD`)
//! are stored as strings so that date ranges compare lexically. Enums
//! are stored as strings with ASSERT constraints.

use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::info;

use crate::error::DbError;

const MIGRATION_TABLE_DDL: &str = "\
DEFINE TABLE IF NOT EXISTS _migration SCHEMAFULL;
DEFINE FIELD IF NOT EXISTS version ON TABLE _migration TYPE int;
DEFINE FIELD IF NOT EXISTS name ON TABLE _migration TYPE string;
DEFINE FIELD IF NOT EXISTS applied_at ON TABLE _migration TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX IF NOT EXISTS idx_migration_version ON TABLE _migration \
    COLUMNS version UNIQUE;
";

#[derive(Debug, SurrealValue)]
struct MigrationRecord {
    version: u32,
    #[allow(dead_code)]
    name: String,
}

struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

static MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "initial_schema",
        sql: SCHEMA_V1,
    },
    Migration {
        version: 2,
        name: "voucher_scan_indexes",
        sql: SCHEMA_V2,
    },
];

const SCHEMA_V1: &str = "\
-- =======================================================================
-- Employees (HR profile, read-only for the voucher engine)
-- =======================================================================
DEFINE TABLE employee SCHEMAFULL;
DEFINE FIELD employee_number ON TABLE employee TYPE string;
DEFINE FIELD first_name ON TABLE employee TYPE string;
DEFINE FIELD last_name ON TABLE employee TYPE string;
DEFINE FIELD time_to_food ON TABLE employee TYPE string \
    ASSERT $value IN ['lunch', 'dinner', 'lunch-dinner'];
DEFINE FIELD is_wfh ON TABLE employee TYPE bool DEFAULT false;
DEFINE FIELD created_at ON TABLE employee TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_employee_number ON TABLE employee \
    COLUMNS employee_number UNIQUE;

-- =======================================================================
-- Users (portal accounts)
-- =======================================================================
DEFINE TABLE user SCHEMAFULL;
DEFINE FIELD employee_id ON TABLE user TYPE string;
DEFINE FIELD email ON TABLE user TYPE string;
DEFINE FIELD opt_status ON TABLE user TYPE string \
    ASSERT $value IN ['opt-in', 'opt-out-temp', 'opt-out-perm'];
DEFINE FIELD counter ON TABLE user TYPE int ASSERT $value >= 0;
DEFINE FIELD absent_warning_counter ON TABLE user TYPE int \
    DEFAULT 0 ASSERT $value >= 0 AND $value <= 3;
DEFINE FIELD is_active ON TABLE user TYPE bool DEFAULT true;
DEFINE FIELD is_deleted ON TABLE user TYPE bool DEFAULT false;
DEFINE FIELD created_at ON TABLE user TYPE datetime;
DEFINE FIELD updated_at ON TABLE user TYPE datetime;
DEFINE INDEX idx_user_email ON TABLE user COLUMNS email UNIQUE;
DEFINE INDEX idx_user_employee ON TABLE user COLUMNS employee_id;

-- =======================================================================
-- Opting pivots (append-only opt history)
-- =======================================================================
DEFINE TABLE opting_pivot SCHEMAFULL;
DEFINE FIELD user_id ON TABLE opting_pivot TYPE string;
DEFINE FIELD opt_out_pivot_status ON TABLE opting_pivot TYPE string \
    ASSERT $value IN ['opt-out-permanently', 'opt-out-temporarily', \
    'opt-in-temporarily'];
DEFINE FIELD opt_out_time_from ON TABLE opting_pivot TYPE string;
DEFINE FIELD opt_out_time_to ON TABLE opting_pivot TYPE string;
DEFINE FIELD meal_opted_out ON TABLE opting_pivot TYPE int \
    DEFAULT 0 ASSERT $value >= 0 AND $value <= 3;
DEFINE FIELD is_active ON TABLE opting_pivot TYPE bool DEFAULT true;
DEFINE FIELD is_admin_approved ON TABLE opting_pivot TYPE string \
    ASSERT $value IN ['approved', 'pending', 'rejected'];
DEFINE FIELD created_at ON TABLE opting_pivot TYPE datetime;
DEFINE INDEX idx_pivot_user ON TABLE opting_pivot COLUMNS user_id;
DEFINE INDEX idx_pivot_from ON TABLE opting_pivot \
    COLUMNS opt_out_pivot_status, opt_out_time_from;
DEFINE INDEX idx_pivot_to ON TABLE opting_pivot \
    COLUMNS opt_out_pivot_status, opt_out_time_to;

-- =======================================================================
-- Vouchers (QR master records, never deleted)
-- =======================================================================
DEFINE TABLE voucher SCHEMAFULL;
DEFINE FIELD user_id ON TABLE voucher TYPE string;
DEFINE FIELD date_of_use ON TABLE voucher TYPE string;
DEFINE FIELD qr_opt_status ON TABLE voucher TYPE string \
    ASSERT $value IN ['Lunch', 'Dinner'];
DEFINE FIELD is_scanned ON TABLE voucher TYPE bool DEFAULT false;
DEFINE FIELD is_active ON TABLE voucher TYPE bool DEFAULT true;
DEFINE FIELD created_at ON TABLE voucher TYPE datetime;
DEFINE FIELD scanned_at ON TABLE voucher TYPE option<datetime>;
DEFINE INDEX idx_voucher_issue ON TABLE voucher \
    COLUMNS user_id, date_of_use, qr_opt_status UNIQUE;

-- =======================================================================
-- Notifications (admin approval requests)
-- =======================================================================
DEFINE TABLE notification SCHEMAFULL;
DEFINE FIELD user_id ON TABLE notification TYPE string;
DEFINE FIELD notification_type ON TABLE notification TYPE string \
    ASSERT $value IN ['opt-out-perm', 'opt-in'];
DEFINE FIELD notification_details ON TABLE notification TYPE string;
DEFINE FIELD is_admin_approved ON TABLE notification TYPE string \
    ASSERT $value IN ['approved', 'pending', 'rejected'];
DEFINE FIELD created_at ON TABLE notification TYPE datetime;
DEFINE FIELD updated_at ON TABLE notification TYPE datetime;
DEFINE INDEX idx_notification_user ON TABLE notification \
    COLUMNS user_id;
";

const SCHEMA_V2: &str = "\
DEFINE INDEX idx_voucher_created ON TABLE voucher COLUMNS created_at;
DEFINE INDEX idx_voucher_user_created ON TABLE voucher \
    COLUMNS user_id, created_at;
";

/// Run all pending migrations against the given SurrealDB client.
///
/// Creates a `_migration` tracking table on first run, then applies
/// each migration whose version exceeds the current maximum.
pub async fn run_migrations<C: Connection>(db: &Surreal<C>) -> Result<(), DbError> {
    db.query(MIGRATION_TABLE_DDL)
        .await?
        .check()
        .map_err(|e| DbError::Migration(e.to_string()))?;

    let mut result = db
        .query("SELECT * FROM _migration ORDER BY version DESC LIMIT 1")
        .await?;
    let records: Vec<MigrationRecord> = result.take(0)?;
    let current_version = records.first().map(|m| m.version).unwrap_or(0);

    for migration in MIGRATIONS {
        if migration.version <= current_version {
            continue;
        }

        info!(
            version = migration.version,
            name = migration.name,
            "Applying migration"
        );
        db.query(migration.sql).await?.check().map_err(|e| {
            DbError::Migration(format!(
                "Migration v{} '{}' failed: {}",
                migration.version, migration.name, e,
            ))
        })?;

        db.query("CREATE _migration SET version = $version, name = $name")
            .bind(("version", migration.version))
            .bind(("name", migration.name))
            .await?
            .check()
            .map_err(|e| {
                DbError::Migration(format!(
                    "Failed to record migration v{}: {}",
                    migration.version, e,
                ))
            })?;
    }

    Ok(())
}

/// Latest schema version known to this build.
pub fn latest_version() -> u32 {
    MIGRATIONS.last().map(|m| m.version).unwrap_or(0)
}
