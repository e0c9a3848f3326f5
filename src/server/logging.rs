//! Request logging and tracing setup for SecureGo.
//!
//! This module provides:
//! - `init_tracing` to install the global subscriber
//! - A request middleware with request IDs and timing
//! - Structured domain event logging for licenses and accounts
//!
//! Passwords never reach the log: account events carry username and
//! license only.

use axum::{
    body::Body,
    extract::Request,
    http::{HeaderValue, Response},
    middleware::Next,
};
use std::time::Instant;
use tracing::{info, info_span, Instrument};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use crate::config::LoggingConfig;

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` wins over `logging.level` when set. Calling this twice is
/// harmless; the second install is ignored.
pub fn init_tracing(config: &LoggingConfig) {
    if !config.enabled {
        return;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.to_lowercase()));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// License lifecycle events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LicenseEvent {
    Created,
    Removed,
}

/// Account lifecycle events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountEvent {
    Created,
    Removed,
}

impl std::fmt::Display for LicenseEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LicenseEvent::Created => "created",
            LicenseEvent::Removed => "removed",
        };
        write!(f, "{}", s)
    }
}

impl std::fmt::Display for AccountEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AccountEvent::Created => "created",
            AccountEvent::Removed => "removed",
        };
        write!(f, "{}", s)
    }
}

/// Log a license state change.
pub fn log_license_event(event: LicenseEvent, license: &str, details: Option<&str>) {
    let span = info_span!("license_event", event = %event, license = %license);
    let _enter = span.enter();

    if let Some(d) = details {
        info!(details = %d, "License event occurred");
    } else {
        info!("License event occurred");
    }
}

/// Log an account state change.
pub fn log_account_event(event: AccountEvent, username: &str, license: Option<&str>) {
    let span = info_span!("account_event", event = %event, username = %username);
    let _enter = span.enter();

    if let Some(license) = license {
        info!(license = %license, "Account event occurred");
    } else {
        info!("Account event occurred");
    }
}

/// Header name for the request ID.
pub const REQUEST_ID_HEADER: &str = "X-Request-Id";

/// Generate a new unique request ID.
pub fn generate_request_id() -> String {
    Uuid::new_v4().to_string()
}

/// Logging middleware that tracks request timing and generates request IDs.
///
/// Path parameters can carry passwords (`createUser`), so only the route
/// prefix up to the second segment is recorded.
pub async fn request_logging_middleware(request: Request, next: Next) -> Response<Body> {
    let request_id = generate_request_id();
    let method = request.method().clone();
    let route = route_label(request.uri().path());

    let span = info_span!(
        "request",
        request_id = %request_id,
        method = %method,
        route = %route,
    );

    let start = Instant::now();

    let response = async move {
        info!("Started processing request");
        next.run(request).await
    }
    .instrument(span.clone())
    .await;

    let duration = start.elapsed();
    let status = response.status();

    let _enter = span.enter();
    info!(
        status = %status.as_u16(),
        duration_ms = %duration.as_millis(),
        "Request completed"
    );

    let (mut parts, body) = response.into_parts();
    if let Ok(header_value) = HeaderValue::from_str(&request_id) {
        parts.headers.insert(REQUEST_ID_HEADER, header_value);
    }

    Response::from_parts(parts, body)
}

/// First two path segments, e.g. `/securego/createUser`.
fn route_label(path: &str) -> String {
    let segments: Vec<&str> = path
        .split('/')
        .filter(|s| !s.is_empty())
        .take(2)
        .collect();
    format!("/{}", segments.join("/"))
}

/// Health check response structure.
#[derive(Debug, Clone, serde::Serialize)]
pub struct HealthResponse {
    /// "healthy" or "degraded"
    pub status: String,
    pub service: String,
    pub version: String,
    pub database: DatabaseHealth,
}

/// Store health status.
#[derive(Debug, Clone, serde::Serialize)]
pub struct DatabaseHealth {
    pub connected: bool,
    pub db_type: String,
}

impl HealthResponse {
    pub fn healthy(db_connected: bool, db_type: &str) -> Self {
        Self {
            status: if db_connected { "healthy" } else { "degraded" }.to_string(),
            service: "securego".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            database: DatabaseHealth {
                connected: db_connected,
                db_type: db_type.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_id_is_valid_uuid() {
        let id = generate_request_id();
        assert!(Uuid::parse_str(&id).is_ok());
    }

    #[test]
    fn route_label_drops_path_parameters() {
        assert_eq!(
            route_label("/securego/createUser/alice/hunter2/LIC123"),
            "/securego/createUser"
        );
        assert_eq!(route_label("/securego/getLicenses/"), "/securego/getLicenses");
        assert_eq!(route_label("/health"), "/health");
        assert_eq!(route_label("/"), "/");
    }

    #[test]
    fn health_response_degraded() {
        let health = HealthResponse::healthy(false, "sqlite");
        assert_eq!(health.status, "degraded");
        assert_eq!(health.service, "securego");
        assert!(!health.database.connected);
    }
}
