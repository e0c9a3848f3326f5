use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::server::accounts::{
    check_user_handler, create_user_handler, get_user_handler, remove_user_handler,
    remove_user_with_license_handler,
};
use crate::server::handlers::{health_handler, AppState};
use crate::server::licenses::{
    check_license_handler, create_named_license_handler, create_random_license_handler,
    list_licenses_handler, remove_license_handler,
};
use crate::server::logging::request_logging_middleware;

/// Build the main application router for the SecureGo server.
///
/// # Routes
///
/// ## Accounts
/// - `POST /securego/createUser/:username/:password/:license` - Create an account
/// - `GET /securego/getUser/:name` - Fetch an account by username
/// - `POST /securego/checkUser/:name` - Check whether a username exists
/// - `POST /securego/removeUser/:username/:license` - Remove an account
/// - `POST /securego/removeUser/:username` - Remove an account by username
///
/// ## Licenses
/// - `POST /securego/createLicense` - Create a random license key
/// - `POST /securego/createLicense/:name` - Create a named license key
/// - `POST /securego/removeLicense/:name` - Remove a license and its accounts
/// - `GET /securego/checkLicense/:name` - Check whether a license exists
/// - `GET /securego/getLicenses/` - List license keys (also without trailing slash)
///
/// ## Operations
/// - `GET /health` - Store connectivity
pub fn build_router(state: AppState) -> Router {
    Router::new()
        // Accounts
        .route(
            "/securego/createUser/:username/:password/:license",
            post(create_user_handler),
        )
        .route("/securego/getUser/:name", get(get_user_handler))
        .route("/securego/checkUser/:name", post(check_user_handler))
        .route(
            "/securego/removeUser/:username/:license",
            post(remove_user_with_license_handler),
        )
        .route("/securego/removeUser/:username", post(remove_user_handler))
        // Licenses
        .route(
            "/securego/createLicense",
            post(create_random_license_handler),
        )
        .route(
            "/securego/createLicense/:name",
            post(create_named_license_handler),
        )
        .route(
            "/securego/removeLicense/:name",
            post(remove_license_handler),
        )
        .route("/securego/checkLicense/:name", get(check_license_handler))
        .route("/securego/getLicenses/", get(list_licenses_handler))
        .route("/securego/getLicenses", get(list_licenses_handler))
        // Operations
        .route("/health", get(health_handler))
        .layer(middleware::from_fn(request_logging_middleware))
        .with_state(state)
}
