//! Store access layer.
//!
//! The two collections of the service live in two flat tables:
//!
//! - `licenses(license)` with a unique constraint on the key
//! - `users(id, username, password, license)` indexed by username and license
//!
//! Every operation returns a [`SecureGoResult`]; store failures never abort
//! the process. Account creation is a single conditional insert and
//! license removal runs inside one transaction.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use sqlx::{query, query_as, query_scalar, FromRow};
use tracing::{error, info};

#[cfg(feature = "sqlite")]
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

#[cfg(feature = "postgres")]
use sqlx::postgres::{PgPool, PgPoolOptions};

use crate::config::DatabaseConfig;
use crate::errors::{SecureGoError, SecureGoResult};

#[cfg(feature = "sqlite")]
const SQLITE_SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS licenses (
        license TEXT NOT NULL UNIQUE
    )",
    "CREATE TABLE IF NOT EXISTS users (
        id       INTEGER PRIMARY KEY AUTOINCREMENT,
        username TEXT NOT NULL,
        password TEXT NOT NULL,
        license  TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_users_username ON users (username)",
    "CREATE INDEX IF NOT EXISTS idx_users_license ON users (license)",
];

#[cfg(feature = "postgres")]
const POSTGRES_SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS licenses (
        license TEXT NOT NULL UNIQUE
    )",
    "CREATE TABLE IF NOT EXISTS users (
        id       BIGSERIAL PRIMARY KEY,
        username TEXT NOT NULL,
        password TEXT NOT NULL,
        license  TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_users_username ON users (username)",
    "CREATE INDEX IF NOT EXISTS idx_users_license ON users (license)",
];

/// Insert attempts before a creation that keeps losing races is reported.
const CREATE_ACCOUNT_ATTEMPTS: usize = 3;

/// An account row.
///
/// `password` holds whatever the configured credential scheme produced.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct Account {
    pub username: String,
    pub password: String,
    pub license: String,
}

/// Outcome of [`Database::insert_license`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LicenseInsert {
    Inserted,
    AlreadyExists,
}

/// Outcome of [`Database::remove_license`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LicenseRemoval {
    /// Accounts that referenced the license and were deleted with it
    pub accounts_removed: u64,
    /// Whether the license row itself existed
    pub license_removed: bool,
}

/// Outcome of [`Database::create_account`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountCreation {
    Created,
    /// The referenced license is not in the store
    LicenseMissing,
    /// The exact (username, password, license) triple is already stored
    AlreadyExists,
    /// Single-account policy is on and another account holds the license
    LicenseTaken,
}

/// Unified store abstraction over SQLite and Postgres.
///
/// Available variants depend on enabled features:
/// - `sqlite` feature enables `Database::SQLite`
/// - `postgres` feature enables `Database::Postgres`
#[derive(Debug, Clone)]
pub enum Database {
    #[cfg(feature = "sqlite")]
    SQLite(SqlitePool),
    #[cfg(feature = "postgres")]
    Postgres(PgPool),
}

fn store_error(op: &str, e: sqlx::Error) -> SecureGoError {
    error!("{op} failed: {e}");
    SecureGoError::DatabaseError(e.to_string())
}

impl Database {
    /// Connect to the configured store and ping it.
    ///
    /// Both steps share `connect_timeout_secs`; exceeding it is a startup error.
    pub async fn connect(config: &DatabaseConfig) -> SecureGoResult<Arc<Self>> {
        let timeout = Duration::from_secs(config.connect_timeout_secs);

        let db = match config.db_type.as_str() {
            #[cfg(feature = "sqlite")]
            "sqlite" => {
                use std::str::FromStr;

                let options = SqliteConnectOptions::from_str(&config.sqlite_url)
                    .map_err(|e| {
                        SecureGoError::ConfigError(format!("invalid SQLite URL: {e}"))
                    })?
                    .create_if_missing(true);

                let pool = tokio::time::timeout(
                    timeout,
                    SqlitePoolOptions::new()
                        .acquire_timeout(timeout)
                        .connect_with(options),
                )
                .await
                .map_err(|_| {
                    SecureGoError::ServerError("timed out connecting to SQLite".to_string())
                })?
                .map_err(|e| {
                    error!("Failed to connect to SQLite: {e}");
                    SecureGoError::DatabaseError(format!("failed to connect to SQLite: {e}"))
                })?;

                Database::SQLite(pool)
            }
            #[cfg(not(feature = "sqlite"))]
            "sqlite" => {
                return Err(SecureGoError::ConfigError(
                    "SQLite support not compiled in. Enable the 'sqlite' feature.".to_string(),
                ))
            }
            #[cfg(feature = "postgres")]
            "postgres" => {
                let pool = tokio::time::timeout(
                    timeout,
                    PgPoolOptions::new()
                        .acquire_timeout(timeout)
                        .connect(&config.postgres_url),
                )
                .await
                .map_err(|_| {
                    SecureGoError::ServerError("timed out connecting to PostgreSQL".to_string())
                })?
                .map_err(|e| {
                    error!("Failed to connect to PostgreSQL: {e}");
                    SecureGoError::DatabaseError(format!("failed to connect to PostgreSQL: {e}"))
                })?;

                Database::Postgres(pool)
            }
            #[cfg(not(feature = "postgres"))]
            "postgres" => {
                return Err(SecureGoError::ConfigError(
                    "PostgreSQL support not compiled in. Enable the 'postgres' feature."
                        .to_string(),
                ))
            }
            other => {
                return Err(SecureGoError::ConfigError(format!(
                    "unsupported database type: {other}"
                )))
            }
        };

        tokio::time::timeout(timeout, db.ping())
            .await
            .map_err(|_| SecureGoError::ServerError("timed out pinging the store".to_string()))??;

        info!("Connected to {} store", db.db_type());
        Ok(Arc::new(db))
    }

    /// Open a private in-memory SQLite store with the schema applied.
    ///
    /// The pool is pinned to a single long-lived connection, since every
    /// SQLite in-memory connection is its own database.
    #[cfg(feature = "sqlite")]
    pub async fn connect_in_memory() -> SecureGoResult<Arc<Self>> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None::<Duration>)
            .max_lifetime(None::<Duration>)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| store_error("SQLite in-memory connect", e))?;

        let db = Database::SQLite(pool);
        db.migrate().await?;
        Ok(Arc::new(db))
    }

    /// Backend name, as used in configuration.
    pub fn db_type(&self) -> &'static str {
        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(_) => "sqlite",
            #[cfg(feature = "postgres")]
            Database::Postgres(_) => "postgres",
        }
    }

    /// Round-trip a trivial statement.
    pub async fn ping(&self) -> SecureGoResult<()> {
        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => {
                query("SELECT 1")
                    .execute(pool)
                    .await
                    .map_err(|e| store_error("SQLite ping", e))?;
            }
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => {
                query("SELECT 1")
                    .execute(pool)
                    .await
                    .map_err(|e| store_error("Postgres ping", e))?;
            }
        }
        Ok(())
    }

    /// Create tables and indexes if they do not exist yet.
    pub async fn migrate(&self) -> SecureGoResult<()> {
        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => {
                for statement in SQLITE_SCHEMA {
                    query(*statement)
                        .execute(pool)
                        .await
                        .map_err(|e| store_error("SQLite migrate", e))?;
                }
            }
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => {
                for statement in POSTGRES_SCHEMA {
                    query(*statement)
                        .execute(pool)
                        .await
                        .map_err(|e| store_error("Postgres migrate", e))?;
                }
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Licenses
    // ------------------------------------------------------------------

    /// Whether a license with this exact key exists.
    pub async fn license_exists(&self, license: &str) -> SecureGoResult<bool> {
        let found = match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => {
                query_scalar::<_, String>("SELECT license FROM licenses WHERE license = ? LIMIT 1")
                    .bind(license)
                    .fetch_optional(pool)
                    .await
                    .map_err(|e| store_error("SQLite license_exists", e))?
            }
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => {
                query_scalar::<_, String>("SELECT license FROM licenses WHERE license = $1 LIMIT 1")
                    .bind(license)
                    .fetch_optional(pool)
                    .await
                    .map_err(|e| store_error("Postgres license_exists", e))?
            }
        };

        Ok(found.is_some())
    }

    /// Insert a license unless the key is already taken.
    ///
    /// This is a single conditional write against the unique constraint,
    /// so concurrent inserts of the same key cannot both succeed.
    pub async fn insert_license(&self, license: &str) -> SecureGoResult<LicenseInsert> {
        let rows_affected = match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => query(
                "INSERT INTO licenses (license) VALUES (?) ON CONFLICT (license) DO NOTHING",
            )
            .bind(license)
            .execute(pool)
            .await
            .map_err(|e| store_error("SQLite insert_license", e))?
            .rows_affected(),
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => query(
                "INSERT INTO licenses (license) VALUES ($1) ON CONFLICT (license) DO NOTHING",
            )
            .bind(license)
            .execute(pool)
            .await
            .map_err(|e| store_error("Postgres insert_license", e))?
            .rows_affected(),
        };

        Ok(if rows_affected > 0 {
            LicenseInsert::Inserted
        } else {
            LicenseInsert::AlreadyExists
        })
    }

    /// Delete every account holding `license`, then the license itself.
    ///
    /// Accounts are removed even when the license row is already gone, so
    /// orphans left behind by earlier failures are cleaned up as well.
    pub async fn remove_license(&self, license: &str) -> SecureGoResult<LicenseRemoval> {
        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => {
                let mut tx = pool
                    .begin()
                    .await
                    .map_err(|e| store_error("SQLite remove_license begin", e))?;

                let accounts_removed = query("DELETE FROM users WHERE license = ?")
                    .bind(license)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| store_error("SQLite remove_license users", e))?
                    .rows_affected();

                let licenses_removed = query("DELETE FROM licenses WHERE license = ?")
                    .bind(license)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| store_error("SQLite remove_license", e))?
                    .rows_affected();

                tx.commit()
                    .await
                    .map_err(|e| store_error("SQLite remove_license commit", e))?;

                Ok(LicenseRemoval {
                    accounts_removed,
                    license_removed: licenses_removed > 0,
                })
            }
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => {
                let mut tx = pool
                    .begin()
                    .await
                    .map_err(|e| store_error("Postgres remove_license begin", e))?;

                let accounts_removed = query("DELETE FROM users WHERE license = $1")
                    .bind(license)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| store_error("Postgres remove_license users", e))?
                    .rows_affected();

                let licenses_removed = query("DELETE FROM licenses WHERE license = $1")
                    .bind(license)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| store_error("Postgres remove_license", e))?
                    .rows_affected();

                tx.commit()
                    .await
                    .map_err(|e| store_error("Postgres remove_license commit", e))?;

                Ok(LicenseRemoval {
                    accounts_removed,
                    license_removed: licenses_removed > 0,
                })
            }
        }
    }

    /// All non-empty license keys, in no particular order.
    pub async fn list_licenses(&self) -> SecureGoResult<Vec<String>> {
        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => {
                query_scalar::<_, String>("SELECT license FROM licenses WHERE license <> ''")
                    .fetch_all(pool)
                    .await
                    .map_err(|e| store_error("SQLite list_licenses", e))
            }
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => {
                query_scalar::<_, String>("SELECT license FROM licenses WHERE license <> ''")
                    .fetch_all(pool)
                    .await
                    .map_err(|e| store_error("Postgres list_licenses", e))
            }
        }
    }

    // ------------------------------------------------------------------
    // Accounts
    // ------------------------------------------------------------------

    /// Create an account if its license exists and policy allows it.
    ///
    /// The license check, the duplicate check and the optional
    /// single-account check are folded into one conditional insert. When
    /// nothing was written the blocking condition is read back to pick the
    /// outcome.
    pub async fn create_account(
        &self,
        account: &Account,
        single_account_per_license: bool,
    ) -> SecureGoResult<AccountCreation> {
        for _ in 0..CREATE_ACCOUNT_ATTEMPTS {
            if self
                .insert_account_if_allowed(account, single_account_per_license)
                .await?
            {
                return Ok(AccountCreation::Created);
            }

            if let Some(rejection) = self
                .account_rejection(account, single_account_per_license)
                .await?
            {
                return Ok(rejection);
            }
        }

        Err(SecureGoError::DatabaseError(format!(
            "account creation for {} kept racing concurrent writes",
            account.username
        )))
    }

    async fn insert_account_if_allowed(
        &self,
        account: &Account,
        single_account_per_license: bool,
    ) -> SecureGoResult<bool> {
        let rows_affected = match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => query(
                "INSERT INTO users (username, password, license) \
                 SELECT ?, ?, ? \
                 WHERE EXISTS (SELECT 1 FROM licenses WHERE license = ?) \
                 AND NOT EXISTS (SELECT 1 FROM users \
                     WHERE username = ? AND password = ? AND license = ?) \
                 AND (? = 0 OR NOT EXISTS (SELECT 1 FROM users WHERE license = ?))",
            )
            .bind(&account.username)
            .bind(&account.password)
            .bind(&account.license)
            .bind(&account.license)
            .bind(&account.username)
            .bind(&account.password)
            .bind(&account.license)
            .bind(single_account_per_license)
            .bind(&account.license)
            .execute(pool)
            .await
            .map_err(|e| store_error("SQLite create_account insert", e))?
            .rows_affected(),
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => query(
                "INSERT INTO users (username, password, license) \
                 SELECT $1::TEXT, $2::TEXT, $3::TEXT \
                 WHERE EXISTS (SELECT 1 FROM licenses WHERE license = $3) \
                 AND NOT EXISTS (SELECT 1 FROM users \
                     WHERE username = $1 AND password = $2 AND license = $3) \
                 AND (NOT $4::BOOLEAN OR NOT EXISTS (SELECT 1 FROM users WHERE license = $3))",
            )
            .bind(&account.username)
            .bind(&account.password)
            .bind(&account.license)
            .bind(single_account_per_license)
            .execute(pool)
            .await
            .map_err(|e| store_error("Postgres create_account insert", e))?
            .rows_affected(),
        };

        Ok(rows_affected > 0)
    }

    /// Why `account` cannot be inserted right now, checked in response order.
    async fn account_rejection(
        &self,
        account: &Account,
        single_account_per_license: bool,
    ) -> SecureGoResult<Option<AccountCreation>> {
        if !self.license_exists(&account.license).await? {
            return Ok(Some(AccountCreation::LicenseMissing));
        }

        let (duplicate, holder) = match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => {
                let duplicate = query_scalar::<_, i64>(
                    "SELECT id FROM users \
                     WHERE username = ? AND password = ? AND license = ? LIMIT 1",
                )
                .bind(&account.username)
                .bind(&account.password)
                .bind(&account.license)
                .fetch_optional(pool)
                .await
                .map_err(|e| store_error("SQLite create_account duplicate check", e))?;

                let holder =
                    query_scalar::<_, i64>("SELECT id FROM users WHERE license = ? LIMIT 1")
                        .bind(&account.license)
                        .fetch_optional(pool)
                        .await
                        .map_err(|e| store_error("SQLite create_account holder check", e))?;

                (duplicate.is_some(), holder.is_some())
            }
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => {
                let duplicate = query_scalar::<_, i64>(
                    "SELECT id FROM users \
                     WHERE username = $1 AND password = $2 AND license = $3 LIMIT 1",
                )
                .bind(&account.username)
                .bind(&account.password)
                .bind(&account.license)
                .fetch_optional(pool)
                .await
                .map_err(|e| store_error("Postgres create_account duplicate check", e))?;

                let holder =
                    query_scalar::<_, i64>("SELECT id FROM users WHERE license = $1 LIMIT 1")
                        .bind(&account.license)
                        .fetch_optional(pool)
                        .await
                        .map_err(|e| store_error("Postgres create_account holder check", e))?;

                (duplicate.is_some(), holder.is_some())
            }
        };

        Ok(if duplicate {
            Some(AccountCreation::AlreadyExists)
        } else if single_account_per_license && holder {
            Some(AccountCreation::LicenseTaken)
        } else {
            None
        })
    }

    /// First account stored under `username`, if any.
    pub async fn find_account(&self, username: &str) -> SecureGoResult<Option<Account>> {
        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => query_as::<_, Account>(
                "SELECT username, password, license FROM users \
                 WHERE username = ? ORDER BY id LIMIT 1",
            )
            .bind(username)
            .fetch_optional(pool)
            .await
            .map_err(|e| store_error("SQLite find_account", e)),
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => query_as::<_, Account>(
                "SELECT username, password, license FROM users \
                 WHERE username = $1 ORDER BY id LIMIT 1",
            )
            .bind(username)
            .fetch_optional(pool)
            .await
            .map_err(|e| store_error("Postgres find_account", e)),
        }
    }

    /// Whether any account is stored under `username`.
    pub async fn account_exists(&self, username: &str) -> SecureGoResult<bool> {
        let found = match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => {
                query_scalar::<_, i64>("SELECT id FROM users WHERE username = ? LIMIT 1")
                    .bind(username)
                    .fetch_optional(pool)
                    .await
                    .map_err(|e| store_error("SQLite account_exists", e))?
            }
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => {
                query_scalar::<_, i64>("SELECT id FROM users WHERE username = $1 LIMIT 1")
                    .bind(username)
                    .fetch_optional(pool)
                    .await
                    .map_err(|e| store_error("Postgres account_exists", e))?
            }
        };

        Ok(found.is_some())
    }

    /// Delete the first account matching `username` (and `license`, if given).
    ///
    /// Returns `Ok(true)` when a row was deleted.
    pub async fn remove_account(
        &self,
        username: &str,
        license: Option<&str>,
    ) -> SecureGoResult<bool> {
        let rows_affected = match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => {
                let statement = match license {
                    Some(license) => query(
                        "DELETE FROM users WHERE id = (\
                             SELECT id FROM users WHERE username = ? AND license = ? \
                             ORDER BY id LIMIT 1)",
                    )
                    .bind(username)
                    .bind(license),
                    None => query(
                        "DELETE FROM users WHERE id = (\
                             SELECT id FROM users WHERE username = ? ORDER BY id LIMIT 1)",
                    )
                    .bind(username),
                };

                statement
                    .execute(pool)
                    .await
                    .map_err(|e| store_error("SQLite remove_account", e))?
                    .rows_affected()
            }
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => {
                let statement = match license {
                    Some(license) => query(
                        "DELETE FROM users WHERE id = (\
                             SELECT id FROM users WHERE username = $1 AND license = $2 \
                             ORDER BY id LIMIT 1)",
                    )
                    .bind(username)
                    .bind(license),
                    None => query(
                        "DELETE FROM users WHERE id = (\
                             SELECT id FROM users WHERE username = $1 ORDER BY id LIMIT 1)",
                    )
                    .bind(username),
                };

                statement
                    .execute(pool)
                    .await
                    .map_err(|e| store_error("Postgres remove_account", e))?
                    .rows_affected()
            }
        };

        Ok(rows_affected > 0)
    }
}
