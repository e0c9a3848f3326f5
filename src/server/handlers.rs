use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::{LicenseConfig, SecureGoConfig};
use crate::credentials::{hasher_for_scheme, CredentialHasher, PlaintextCredentials};
use crate::errors::{SecureGoError, SecureGoResult};
use crate::license_key::DEFAULT_KEY_LENGTH;
use crate::server::database::Database;
use crate::server::logging::HealthResponse;

/// Issuing policy applied by the license and account handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LicensePolicy {
    /// Length of keys produced by `POST /securego/createLicense`
    pub key_length: usize,
    /// Reject a second account on a license that already has one
    pub single_account_per_license: bool,
}

impl Default for LicensePolicy {
    fn default() -> Self {
        Self {
            key_length: DEFAULT_KEY_LENGTH,
            single_account_per_license: false,
        }
    }
}

impl From<&LicenseConfig> for LicensePolicy {
    fn from(config: &LicenseConfig) -> Self {
        Self {
            key_length: config.key_length,
            single_account_per_license: config.single_account_per_license,
        }
    }
}

/// Shared application state for handlers.
///
/// The store handle is injected here rather than held in a global, so
/// tests can hand in an in-memory store.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub policy: LicensePolicy,
    pub credentials: Arc<dyn CredentialHasher>,
}

impl AppState {
    /// State with the default policy and plaintext credentials.
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            db,
            policy: LicensePolicy::default(),
            credentials: Arc::new(PlaintextCredentials),
        }
    }

    /// State configured from the loaded configuration.
    pub fn from_config(db: Arc<Database>, config: &SecureGoConfig) -> SecureGoResult<Self> {
        Ok(Self {
            db,
            policy: LicensePolicy::from(&config.license),
            credentials: hasher_for_scheme(&config.credentials.scheme)?,
        })
    }

    pub fn with_policy(mut self, policy: LicensePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_credentials(mut self, credentials: Arc<dyn CredentialHasher>) -> Self {
        self.credentials = credentials;
        self
    }
}

/// Body of every status-only response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
}

/// Build a status-only response.
pub fn status_response(code: StatusCode, status: &str) -> (StatusCode, Json<StatusResponse>) {
    (
        code,
        Json(StatusResponse {
            status: status.to_string(),
        }),
    )
}

/// Body of a 500 response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreFailureBody {
    pub status: String,
    pub error: String,
}

/// A store error scoped to one request.
///
/// Renders as HTTP 500 with `status` naming the failed operation and
/// `error` carrying the store's own message.
#[derive(Debug)]
pub struct StoreFailure {
    pub status: &'static str,
    pub source: SecureGoError,
}

impl StoreFailure {
    pub fn new(status: &'static str, source: SecureGoError) -> Self {
        Self { status, source }
    }

    /// Adapter for `map_err`.
    pub fn with(status: &'static str) -> impl FnOnce(SecureGoError) -> Self {
        move |source| Self::new(status, source)
    }
}

impl IntoResponse for StoreFailure {
    fn into_response(self) -> Response {
        let error = match self.source {
            SecureGoError::DatabaseError(msg) => msg,
            other => other.to_string(),
        };

        warn!(status = %self.status, error = %error, "Request failed on store error");

        let body = StoreFailureBody {
            status: self.status.to_string(),
            error,
        };

        (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
    }
}

/// `GET /health`
///
/// Always 200; `status` turns "degraded" when the store does not answer.
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let connected = state.db.ping().await.is_ok();
    Json(HealthResponse::healthy(connected, state.db.db_type()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_failure_is_500_with_raw_message() {
        let failure = StoreFailure::new(
            "Failed to check user in database",
            SecureGoError::DatabaseError("pool timed out".to_string()),
        );
        let response = failure.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn policy_from_config() {
        let config = LicenseConfig {
            key_length: 16,
            single_account_per_license: true,
        };
        let policy = LicensePolicy::from(&config);
        assert_eq!(policy.key_length, 16);
        assert!(policy.single_account_per_license);
    }

    #[test]
    fn default_policy_matches_defaults() {
        let policy = LicensePolicy::default();
        assert_eq!(policy.key_length, 10);
        assert!(!policy.single_account_per_license);
    }
}
