use std::sync::Arc;

use dotenvy::dotenv;
use log::{error, info};

use taskserver::bootstrap;
use taskserver::config::AppConfig;
use taskserver::main_module::run_server;
use taskserver::security::AccountPasswordHasher;
use taskserver::session::SessionManager;
use taskserver::shared::state::AppState;
use taskserver::shared::utils::{create_conn, run_migrations};

#[tokio::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = AppConfig::from_env();

    let pool = create_conn(&config.database_url()).map_err(|e| {
        std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            format!("Database pool creation failed: {}", e),
        )
    })?;
    run_migrations(&pool).map_err(|e| std::io::Error::other(format!("Migrations failed: {}", e)))?;
    info!("Database ready");

    let session_conn = pool.get().map_err(|e| {
        std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            format!("Database connection failed: {}", e),
        )
    })?;
    let session_manager = Arc::new(tokio::sync::Mutex::new(SessionManager::new(session_conn)));

    let hasher = AccountPasswordHasher::with_defaults()
        .map_err(|e| std::io::Error::other(format!("Password hasher setup failed: {}", e)))?;

    let mut app_state = AppState {
        config: Some(config),
        conn: pool,
        session_manager,
        extensions: Default::default(),
    };
    app_state.extensions.insert(hasher);
    let app_state = Arc::new(app_state);

    if let Err(e) = bootstrap::run_seed(&app_state) {
        error!("Bootstrap seed failed: {}", e);
    }

    run_server(app_state).await
}
