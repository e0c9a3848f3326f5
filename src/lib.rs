//! SecureGo - license key and account management service
//!
//! # Features
//!
//! - `server` - HTTP handlers, router and store. Enabled by default.
//! - `sqlite` - SQLite store backend. Enabled by default.
//! - `postgres` - PostgreSQL store backend.
//!
//! # Example
//!
//! ```rust,ignore
//! use securego::server::{build_router, AppState, Database};
//!
//! let db = Database::connect_in_memory().await?;
//! let app = build_router(AppState::new(db));
//! ```

pub mod config;
pub mod credentials;
pub mod errors;
pub mod license_key;

// Server-related modules (requires "server" feature)
#[cfg(feature = "server")]
#[path = "server/mod.rs"]
pub mod server;
