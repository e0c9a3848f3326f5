use securego::config::get_config;
use securego::errors::SecureGoResult;
use securego::server::{build_router, init_tracing, AppState, Database};
use tokio::net::TcpListener;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("SecureGo server failed: {e}");
        eprintln!("securego: {e}");
        std::process::exit(1);
    }
}

async fn run() -> SecureGoResult<()> {
    let config = get_config()?;
    init_tracing(&config.logging);

    let db = Database::connect(&config.database).await?;
    db.migrate().await?;
    info!("Successfully connected to {} store", db.db_type());

    let state = AppState::from_config(db, config)?;
    if state.policy.single_account_per_license {
        info!("Single-account-per-license policy is enabled");
    }

    let app = build_router(state);

    let addr = config.bind_address();
    let listener = TcpListener::bind(&addr).await?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("SecureGo server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
