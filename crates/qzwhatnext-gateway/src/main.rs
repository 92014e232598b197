//! qzWhatNext gateway — entry point.
//!
//! Reads configuration from environment variables (see [`config`]),
//! connects storage, and starts the axum HTTP service.

use std::sync::Arc;

use qzwhatnext_foundation::calendar::GoogleOAuth;
use qzwhatnext_foundation::inference::DisabledClassifier;
use qzwhatnext_foundation::persistence::SqliteStore;
use qzwhatnext_foundation::security::{JwtConfig, TokenCipher};
use qzwhatnext_gateway::config::AppConfig;
use qzwhatnext_gateway::server;
use qzwhatnext_gateway::state::AppState;
use qzwhatnext_kernel::clock::SystemClock;
use qzwhatnext_runtime::UserLocks;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Initialise structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("qzwhatnext_gateway=info".parse().unwrap()),
        )
        .init();

    let config = AppConfig::from_env();

    if config.jwt_secret == "change-me-in-production" {
        tracing::warn!(
            "JWT_SECRET_KEY is not set — using the development default. \
             Do not use this configuration in production."
        );
    }

    let cipher = match TokenCipher::from_base64_key(&config.token_encryption_key) {
        Ok(cipher) => cipher,
        Err(e) => {
            eprintln!("TOKEN_ENCRYPTION_KEY is unusable: {e}");
            std::process::exit(1);
        }
    };

    let store = match SqliteStore::connect_with_options(
        &config.database_url,
        config.db_pool_size,
        config.db_pool_timeout_sec,
    )
    .await
    {
        Ok(store) => Arc::new(store),
        Err(e) => {
            eprintln!("failed to connect storage: {e}");
            std::process::exit(1);
        }
    };

    let jwt = JwtConfig::new(
        config.jwt_secret.clone(),
        config.jwt_algorithm,
        config.jwt_expiration_hours,
    );
    let oauth = GoogleOAuth::new(
        config.google_client_id.clone(),
        config.google_client_secret.clone(),
    );

    tracing::info!(
        port = config.port,
        database = %config.database_url,
        calendar_id = %config.google_calendar_id,
        horizon_days = config.horizon_days,
        "qzWhatNext configuration loaded"
    );

    let port = config.port;
    let state = AppState {
        config,
        store,
        clock: Arc::new(SystemClock),
        jwt,
        cipher,
        oauth,
        locks: UserLocks::new(),
        classifier: Arc::new(DisabledClassifier),
    };

    if let Err(e) = server::serve(state, port).await {
        eprintln!("gateway error: {e}");
        std::process::exit(1);
    }
}
