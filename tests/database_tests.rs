#![cfg(feature = "sqlite")]

use std::path::PathBuf;
use std::sync::Arc;

use sqlx::SqlitePool;
use uuid::Uuid;

use securego::config::DatabaseConfig;
use securego::errors::{SecureGoError, SecureGoResult};
use securego::server::database::{
    Account, AccountCreation, Database, LicenseInsert, LicenseRemoval,
};

async fn setup_in_memory_db() -> SecureGoResult<Arc<Database>> {
    Database::connect_in_memory().await
}

fn sqlite_pool(db: &Database) -> &SqlitePool {
    match db {
        Database::SQLite(pool) => pool,
        #[allow(unreachable_patterns)]
        _ => panic!("tests run against SQLite"),
    }
}

/// A SQLite file in the temp dir, removed (with its WAL files) on drop.
struct FileStore {
    path: PathBuf,
}

impl FileStore {
    fn new() -> Self {
        let path = std::env::temp_dir().join(format!("securego-{}.db", Uuid::new_v4()));
        Self { path }
    }

    async fn open(&self) -> SecureGoResult<Arc<Database>> {
        let config = DatabaseConfig {
            sqlite_url: format!("sqlite://{}", self.path.display()),
            ..DatabaseConfig::default()
        };
        let db = Database::connect(&config).await?;
        db.migrate().await?;
        Ok(db)
    }
}

impl Drop for FileStore {
    fn drop(&mut self) {
        for suffix in ["", "-wal", "-shm"] {
            let mut path = self.path.clone().into_os_string();
            path.push(suffix);
            let _ = std::fs::remove_file(path);
        }
    }
}

fn account(username: &str, password: &str, license: &str) -> Account {
    Account {
        username: username.to_string(),
        password: password.to_string(),
        license: license.to_string(),
    }
}

// =============================================================================
// Bootstrap
// =============================================================================

#[tokio::test]
async fn migrate_is_idempotent() -> SecureGoResult<()> {
    let db = setup_in_memory_db().await?;

    db.migrate().await?;
    db.migrate().await?;
    db.ping().await?;

    Ok(())
}

#[tokio::test]
async fn connect_rejects_unknown_backend() {
    let config = DatabaseConfig {
        db_type: "mongodb".to_string(),
        ..DatabaseConfig::default()
    };

    let result = Database::connect(&config).await;
    assert!(matches!(result, Err(SecureGoError::ConfigError(_))));
}

#[tokio::test]
async fn connect_to_sqlite_url_pings_the_store() -> SecureGoResult<()> {
    let config = DatabaseConfig {
        sqlite_url: "sqlite::memory:".to_string(),
        ..DatabaseConfig::default()
    };

    let db = Database::connect(&config).await?;
    assert_eq!(db.db_type(), "sqlite");

    Ok(())
}

// =============================================================================
// Licenses
// =============================================================================

#[tokio::test]
async fn insert_license_is_insert_if_absent() -> SecureGoResult<()> {
    let db = setup_in_memory_db().await?;

    assert_eq!(db.insert_license("LIC-1").await?, LicenseInsert::Inserted);
    assert_eq!(db.insert_license("LIC-1").await?, LicenseInsert::AlreadyExists);
    assert!(db.license_exists("LIC-1").await?);
    assert!(!db.license_exists("lic-1").await?, "keys are case sensitive");
    assert_eq!(db.list_licenses().await?, vec!["LIC-1".to_string()]);

    Ok(())
}

#[tokio::test]
async fn remove_license_reports_orphaned_accounts() -> SecureGoResult<()> {
    let db = setup_in_memory_db().await?;
    db.insert_license("LIC-1").await?;
    db.create_account(&account("alice", "pw", "LIC-1"), false)
        .await?;

    // Drop the license row alone to leave an orphaned account behind
    sqlx::query("DELETE FROM licenses WHERE license = ?")
        .bind("LIC-1")
        .execute(sqlite_pool(&db))
        .await
        .expect("delete license row");

    let removal = db.remove_license("LIC-1").await?;
    assert_eq!(
        removal,
        LicenseRemoval {
            accounts_removed: 1,
            license_removed: false,
        }
    );
    assert!(!db.account_exists("alice").await?);

    Ok(())
}

#[tokio::test]
async fn remove_license_counts_cascaded_accounts() -> SecureGoResult<()> {
    let db = setup_in_memory_db().await?;
    db.insert_license("LIC-1").await?;
    db.create_account(&account("alice", "pw", "LIC-1"), false)
        .await?;
    db.create_account(&account("bob", "pw", "LIC-1"), false)
        .await?;

    let removal = db.remove_license("LIC-1").await?;
    assert_eq!(removal.accounts_removed, 2);
    assert!(removal.license_removed);
    assert!(db.list_licenses().await?.is_empty());

    Ok(())
}

// =============================================================================
// Accounts
// =============================================================================

#[tokio::test]
async fn create_account_outcomes() -> SecureGoResult<()> {
    let db = setup_in_memory_db().await?;
    let alice = account("alice", "pw", "LIC-1");

    assert_eq!(
        db.create_account(&alice, false).await?,
        AccountCreation::LicenseMissing
    );
    assert!(!db.account_exists("alice").await?);

    db.insert_license("LIC-1").await?;
    assert_eq!(db.create_account(&alice, false).await?, AccountCreation::Created);
    assert_eq!(
        db.create_account(&alice, false).await?,
        AccountCreation::AlreadyExists
    );

    // Same username, different password: a distinct account
    let alice_again = account("alice", "other", "LIC-1");
    assert_eq!(
        db.create_account(&alice_again, true).await?,
        AccountCreation::LicenseTaken
    );
    assert_eq!(
        db.create_account(&alice_again, false).await?,
        AccountCreation::Created
    );

    Ok(())
}

#[tokio::test]
async fn find_account_returns_first_match() -> SecureGoResult<()> {
    let db = setup_in_memory_db().await?;
    db.insert_license("LIC-1").await?;
    db.insert_license("LIC-2").await?;
    db.create_account(&account("alice", "first", "LIC-1"), false)
        .await?;
    db.create_account(&account("alice", "second", "LIC-2"), false)
        .await?;

    let found = db.find_account("alice").await?;
    assert_eq!(found, Some(account("alice", "first", "LIC-1")));
    assert_eq!(db.find_account("bob").await?, None);

    Ok(())
}

#[tokio::test]
async fn remove_account_deletes_a_single_row() -> SecureGoResult<()> {
    let db = setup_in_memory_db().await?;
    db.insert_license("LIC-1").await?;
    db.create_account(&account("alice", "a", "LIC-1"), false)
        .await?;
    db.create_account(&account("alice", "b", "LIC-1"), false)
        .await?;

    assert!(!db.remove_account("alice", Some("LIC-2")).await?);
    assert!(db.remove_account("alice", Some("LIC-1")).await?);
    assert!(db.account_exists("alice").await?);

    assert!(db.remove_account("alice", None).await?);
    assert!(!db.account_exists("alice").await?);
    assert!(!db.remove_account("alice", None).await?);

    Ok(())
}

#[tokio::test]
async fn closed_store_surfaces_database_errors() -> SecureGoResult<()> {
    let db = setup_in_memory_db().await?;
    sqlite_pool(&db).close().await;

    assert!(matches!(
        db.license_exists("LIC-1").await,
        Err(SecureGoError::DatabaseError(_))
    ));
    assert!(matches!(
        db.create_account(&account("alice", "pw", "LIC-1"), false)
            .await,
        Err(SecureGoError::DatabaseError(_))
    ));

    Ok(())
}

// =============================================================================
// Concurrency (file-backed store, several pooled connections)
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_account_creations_all_succeed() -> SecureGoResult<()> {
    let store = FileStore::new();
    let db = store.open().await?;
    db.insert_license("LIC").await?;

    let tasks: Vec<_> = (0..64)
        .map(|i| {
            let db = db.clone();
            tokio::spawn(async move {
                db.create_account(&account(&format!("user{i}"), "pw", "LIC"), false)
                    .await
            })
        })
        .collect();

    for task in tasks {
        let outcome = task.await.expect("task panicked")?;
        assert_eq!(outcome, AccountCreation::Created);
    }

    let stored: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE license = ?")
        .bind("LIC")
        .fetch_one(sqlite_pool(&db))
        .await
        .expect("count users");
    assert_eq!(stored, 64);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_single_account_creations_admit_one_holder() -> SecureGoResult<()> {
    let store = FileStore::new();
    let db = store.open().await?;
    db.insert_license("SOLO").await?;

    let tasks: Vec<_> = (0..16)
        .map(|i| {
            let db = db.clone();
            tokio::spawn(async move {
                db.create_account(&account(&format!("user{i}"), "pw", "SOLO"), true)
                    .await
            })
        })
        .collect();

    let mut created = 0;
    for task in tasks {
        match task.await.expect("task panicked")? {
            AccountCreation::Created => created += 1,
            AccountCreation::LicenseTaken => {}
            other => panic!("unexpected outcome: {other:?}"),
        }
    }
    assert_eq!(created, 1);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_named_license_creations_insert_once() -> SecureGoResult<()> {
    let store = FileStore::new();
    let db = store.open().await?;

    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let db = db.clone();
            tokio::spawn(async move { db.insert_license("SAME").await })
        })
        .collect();

    let mut inserted = 0;
    for task in tasks {
        match task.await.expect("task panicked")? {
            LicenseInsert::Inserted => inserted += 1,
            LicenseInsert::AlreadyExists => {}
        }
    }

    assert_eq!(inserted, 1);
    assert_eq!(db.list_licenses().await?, vec!["SAME".to_string()]);

    Ok(())
}
