//! HTTP server initialization and routing

use axum::{
    routing::{get, get_service},
    Router,
};
use log::{error, info, warn};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tower_cookies::CookieManagerLayer;
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

use crate::shared::state::AppState;

use super::{health_check, health_check_simple, shutdown_signal};

pub async fn run_server(app_state: Arc<AppState>) -> std::io::Result<()> {
    let api_router = Router::new()
        .route("/health", get(health_check_simple))
        .route("/api/health", get(health_check))
        .merge(crate::auth::configure_auth_routes())
        .merge(crate::directory::configure_users_routes())
        .merge(crate::directory::configure_teams_routes())
        .merge(crate::directory::configure_directory_ui_routes())
        .merge(crate::projects::configure_projects_routes())
        .merge(crate::tasks::configure_tasks_routes())
        .merge(crate::tasks::comments::configure_comments_routes())
        .merge(crate::tasks::dependencies::configure_dependencies_routes())
        .merge(crate::tasks::history::configure_history_routes())
        .merge(crate::tasks::time_logs::configure_time_logs_routes())
        .merge(crate::tasks::attachments::configure_attachments_routes())
        .merge(crate::tasks::ui::configure_tasks_ui_routes())
        .merge(crate::dashboard::configure_dashboard_routes())
        .merge(crate::dashboard::configure_dashboard_ui_routes());

    let static_dir = std::env::var("STATIC_DIR").unwrap_or_else(|_| "./static".to_string());
    let static_dir_exists = std::path::Path::new(&static_dir).exists();
    let use_embedded_ui = !static_dir_exists && crate::embedded_ui::has_embedded_ui();

    if static_dir_exists {
        info!("Serving UI from external folder: {}", static_dir);
    } else if use_embedded_ui {
        let file_count = crate::embedded_ui::list_embedded_files().len();
        info!(
            "External UI folder not found at '{}', using embedded UI ({} files)",
            static_dir, file_count
        );
    } else {
        warn!(
            "No UI available: folder '{}' not found and no embedded UI",
            static_dir
        );
    }

    let base_router = Router::new().merge(api_router.with_state(app_state.clone()));

    // GET /login needs its own route: the form POST on the same path keeps
    // the fallback from ever seeing it.
    let app_with_ui = if static_dir_exists {
        let login_page = std::path::Path::new(&static_dir).join("login.html");
        base_router
            .route("/login", get_service(ServeFile::new(login_page)))
            .nest_service("/static", ServeDir::new(&static_dir))
            .fallback_service(ServeDir::new(&static_dir))
    } else if use_embedded_ui {
        base_router
            .route("/login", get(crate::embedded_ui::serve_login_page))
            .merge(crate::embedded_ui::embedded_ui_router())
    } else {
        base_router
    };

    // Layers run bottom-up: tracing first, then CORS, then the cookie jar
    // the auth gate reads from.
    let app = app_with_ui
        .layer(axum::middleware::from_fn_with_state(
            app_state.clone(),
            crate::auth::auth_middleware,
        ))
        .layer(CookieManagerLayer::new())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let (host, port) = app_state
        .config
        .as_ref()
        .map(|c| (c.server.host.clone(), c.server.port))
        .unwrap_or_else(|| ("0.0.0.0".to_string(), 8080));
    let ip: IpAddr = host
        .parse()
        .unwrap_or_else(|_| IpAddr::V4(Ipv4Addr::UNSPECIFIED));
    let addr = SocketAddr::from((ip, port));

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            error!(
                "Failed to bind to {}: {} - is another instance running?",
                addr, e
            );
            return Err(e);
        }
    };
    info!("HTTP server listening on {}", addr);
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(std::io::Error::other)
}
