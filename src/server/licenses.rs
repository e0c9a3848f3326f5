//! License handlers.
//!
//! # Endpoints
//!
//! - `POST /securego/createLicense` - Create a random license key
//! - `POST /securego/createLicense/:name` - Create a named license key
//! - `POST /securego/removeLicense/:name` - Remove a license and its accounts
//! - `GET /securego/checkLicense/:name` - Check whether a license exists
//! - `GET /securego/getLicenses/` - List all license keys

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::errors::SecureGoError;
use crate::license_key::generate_license_key;
use crate::server::database::LicenseInsert;
use crate::server::handlers::{status_response, AppState, StatusResponse, StoreFailure};
use crate::server::logging::{log_license_event, LicenseEvent};

pub const LICENSE_CREATED: &str = "success";
pub const LICENSE_ALREADY_EXISTS: &str = "License already exists in database";
pub const CREATE_LICENSE_FAILED: &str = "Failed to create license";

pub const LICENSE_REMOVED: &str = "License removed from database";
pub const LICENSE_MISSING: &str = "This license doesn't exist in database";
pub const REMOVE_LICENSE_FAILED: &str = "Failed to remove license from database";

pub const LICENSE_EXISTS: &str = "License exists in database";
pub const LICENSE_NOT_IN_DATABASE: &str = "License doesn't exist in database";
pub const CHECK_LICENSE_FAILED: &str = "Failed to check license in database";

pub const LIST_LICENSES_FAILED: &str = "Failed to fetch licenses from database";

/// Attempts at drawing a random key that is not already taken.
const RANDOM_KEY_ATTEMPTS: usize = 10;

type StatusReply = Result<(StatusCode, Json<StatusResponse>), StoreFailure>;

/// Response body for a newly created license.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedLicenseResponse {
    pub status: String,
    pub license: String,
}

impl CreatedLicenseResponse {
    fn new(license: String) -> Self {
        Self {
            status: LICENSE_CREATED.to_string(),
            license,
        }
    }
}

/// Response body for `getLicenses`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicensesResponse {
    pub licenses: Vec<String>,
}

/// `POST /securego/createLicense`
///
/// Draws random keys until one is accepted by the store's unique
/// constraint.
pub async fn create_random_license_handler(
    State(state): State<AppState>,
) -> Result<Json<CreatedLicenseResponse>, StoreFailure> {
    for _ in 0..RANDOM_KEY_ATTEMPTS {
        let key = generate_license_key(state.policy.key_length);

        let outcome = state
            .db
            .insert_license(&key)
            .await
            .map_err(StoreFailure::with(CREATE_LICENSE_FAILED))?;

        match outcome {
            LicenseInsert::Inserted => {
                log_license_event(LicenseEvent::Created, &key, Some("random"));
                return Ok(Json(CreatedLicenseResponse::new(key)));
            }
            LicenseInsert::AlreadyExists => {
                warn!("Random license key collided with an existing key; retrying");
            }
        }
    }

    Err(StoreFailure::new(
        CREATE_LICENSE_FAILED,
        SecureGoError::ServerError(format!(
            "failed to generate unique license key after {RANDOM_KEY_ATTEMPTS} attempts"
        )),
    ))
}

/// `POST /securego/createLicense/:name`
///
/// An existing key is reported as such; nothing is written.
pub async fn create_named_license_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Response, StoreFailure> {
    info!("Creating license {}", name);

    let outcome = state
        .db
        .insert_license(&name)
        .await
        .map_err(StoreFailure::with(CREATE_LICENSE_FAILED))?;

    Ok(match outcome {
        LicenseInsert::Inserted => {
            log_license_event(LicenseEvent::Created, &name, None);
            Json(CreatedLicenseResponse::new(name)).into_response()
        }
        LicenseInsert::AlreadyExists => {
            status_response(StatusCode::OK, LICENSE_ALREADY_EXISTS).into_response()
        }
    })
}

/// `POST /securego/removeLicense/:name`
///
/// Removes every account holding the license, then the license itself.
pub async fn remove_license_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> StatusReply {
    info!("Removing license {}", name);

    let removal = state
        .db
        .remove_license(&name)
        .await
        .map_err(StoreFailure::with(REMOVE_LICENSE_FAILED))?;

    if removal.accounts_removed > 0 {
        info!(
            "Removed {} account(s) holding license {}",
            removal.accounts_removed, name
        );
    }

    if !removal.license_removed {
        return Ok(status_response(StatusCode::OK, LICENSE_MISSING));
    }

    let details = format!("{} account(s) removed", removal.accounts_removed);
    log_license_event(LicenseEvent::Removed, &name, Some(&details));
    Ok(status_response(StatusCode::OK, LICENSE_REMOVED))
}

/// `GET /securego/checkLicense/:name`
pub async fn check_license_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> StatusReply {
    let exists = state
        .db
        .license_exists(&name)
        .await
        .map_err(StoreFailure::with(CHECK_LICENSE_FAILED))?;

    let status = if exists {
        LICENSE_EXISTS
    } else {
        LICENSE_NOT_IN_DATABASE
    };
    Ok(status_response(StatusCode::OK, status))
}

/// `GET /securego/getLicenses/`
pub async fn list_licenses_handler(
    State(state): State<AppState>,
) -> Result<Json<LicensesResponse>, StoreFailure> {
    let licenses = state
        .db
        .list_licenses()
        .await
        .map_err(StoreFailure::with(LIST_LICENSES_FAILED))?;

    Ok(Json(LicensesResponse { licenses }))
}
