// src/server/mod.rs

//! Server-side components for SecureGo.
//!
//! This module contains:
//! - `database`  → store abstraction over SQLite/Postgres
//! - `handlers`  → shared state, response helpers, health check
//! - `accounts`  → account handlers
//! - `licenses`  → license handlers
//! - `routes`    → router builder
//! - `logging`   → tracing setup and request logging middleware

pub mod accounts;
pub mod database;
pub mod handlers;
pub mod licenses;
pub mod logging;
pub mod routes;

pub use accounts::{
    check_user_handler, create_user_handler, get_user_handler, remove_user_handler,
    remove_user_with_license_handler, UserResponse,
};
pub use database::{Account, AccountCreation, Database, LicenseInsert, LicenseRemoval};
pub use handlers::{
    health_handler, AppState, LicensePolicy, StatusResponse, StoreFailure, StoreFailureBody,
};
pub use licenses::{
    check_license_handler, create_named_license_handler, create_random_license_handler,
    list_licenses_handler, remove_license_handler, CreatedLicenseResponse, LicensesResponse,
};
pub use logging::{init_tracing, request_logging_middleware};
pub use routes::build_router;
