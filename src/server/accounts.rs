//! Account handlers.
//!
//! # Endpoints
//!
//! - `POST /securego/createUser/:username/:password/:license`
//! - `GET /securego/getUser/:name`
//! - `POST /securego/checkUser/:name`
//! - `POST /securego/removeUser/:username/:license`
//! - `POST /securego/removeUser/:username`
//!
//! "Not found" outcomes answer 200 with a descriptive `status`, except
//! `getUser`, which answers 404.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::server::database::{Account, AccountCreation};
use crate::server::handlers::{status_response, AppState, StatusResponse, StoreFailure};
use crate::server::logging::{log_account_event, AccountEvent};

pub const LICENSE_MISSING: &str = "License doesn't exist in database";
pub const ACCOUNT_CREATED: &str = "Account successfully created";
pub const ACCOUNT_ALREADY_EXISTS: &str = "This account already exists";
pub const LICENSE_ALREADY_TAKEN: &str = "An account with this license already exists";
pub const CREATE_ACCOUNT_FAILED: &str = "Failed to create account";

pub const USER_NOT_FOUND: &str = "User not found";
pub const FETCH_USER_FAILED: &str = "Error fetching user from database";

pub const USER_EXISTS: &str = "User exists in database";
pub const USER_MISSING: &str = "User doesn't exist in database";
pub const CHECK_USER_FAILED: &str = "Failed to check user in database";

pub const ACCOUNT_REMOVED: &str = "Account removed from database";
pub const ACCOUNT_MISSING: &str = "This account doesn't exist in database";
pub const REMOVE_ACCOUNT_FAILED: &str = "Failed to remove account from database";

type StatusReply = Result<(StatusCode, Json<StatusResponse>), StoreFailure>;

/// Response body for `getUser`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserResponse {
    pub username: String,
    pub password: String,
    pub license: String,
}

impl From<Account> for UserResponse {
    fn from(account: Account) -> Self {
        Self {
            username: account.username,
            password: account.password,
            license: account.license,
        }
    }
}

/// `POST /securego/createUser/:username/:password/:license`
pub async fn create_user_handler(
    State(state): State<AppState>,
    Path((username, password, license)): Path<(String, String, String)>,
) -> StatusReply {
    info!("Creating account username={} license={}", username, license);

    let account = Account {
        username,
        password: state.credentials.hash(&password),
        license,
    };

    let outcome = state
        .db
        .create_account(&account, state.policy.single_account_per_license)
        .await
        .map_err(StoreFailure::with(CREATE_ACCOUNT_FAILED))?;

    Ok(match outcome {
        AccountCreation::Created => {
            log_account_event(
                AccountEvent::Created,
                &account.username,
                Some(&account.license),
            );
            status_response(StatusCode::CREATED, ACCOUNT_CREATED)
        }
        AccountCreation::LicenseMissing => {
            warn!("Account creation for unknown license={}", account.license);
            status_response(StatusCode::OK, LICENSE_MISSING)
        }
        AccountCreation::AlreadyExists => status_response(StatusCode::OK, ACCOUNT_ALREADY_EXISTS),
        AccountCreation::LicenseTaken => {
            warn!(
                "License {} already has an account; rejecting username={}",
                account.license, account.username
            );
            status_response(StatusCode::OK, LICENSE_ALREADY_TAKEN)
        }
    })
}

/// `GET /securego/getUser/:name`
pub async fn get_user_handler(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<Response, StoreFailure> {
    let account = state
        .db
        .find_account(&username)
        .await
        .map_err(StoreFailure::with(FETCH_USER_FAILED))?;

    Ok(match account {
        Some(account) => Json(UserResponse::from(account)).into_response(),
        None => status_response(StatusCode::NOT_FOUND, USER_NOT_FOUND).into_response(),
    })
}

/// `POST /securego/checkUser/:name`
pub async fn check_user_handler(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> StatusReply {
    let exists = state
        .db
        .account_exists(&username)
        .await
        .map_err(StoreFailure::with(CHECK_USER_FAILED))?;

    let status = if exists { USER_EXISTS } else { USER_MISSING };
    Ok(status_response(StatusCode::OK, status))
}

/// `POST /securego/removeUser/:username/:license`
pub async fn remove_user_with_license_handler(
    State(state): State<AppState>,
    Path((username, license)): Path<(String, String)>,
) -> StatusReply {
    remove_user(&state, &username, Some(&license)).await
}

/// `POST /securego/removeUser/:username`
pub async fn remove_user_handler(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> StatusReply {
    remove_user(&state, &username, None).await
}

async fn remove_user(state: &AppState, username: &str, license: Option<&str>) -> StatusReply {
    info!("Removing account username={} license={:?}", username, license);

    let removed = state
        .db
        .remove_account(username, license)
        .await
        .map_err(StoreFailure::with(REMOVE_ACCOUNT_FAILED))?;

    if !removed {
        return Ok(status_response(StatusCode::OK, ACCOUNT_MISSING));
    }

    log_account_event(AccountEvent::Removed, username, license);
    Ok(status_response(StatusCode::OK, ACCOUNT_REMOVED))
}
