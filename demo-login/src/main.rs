use std::sync::Arc;

use axum::middleware::{from_fn, from_fn_with_state};
use tower_http::trace::TraceLayer;

use sessionkit_axum::{SessionConfig, csrf_guard, session_layer};

mod auth;
mod handlers;
mod server;

use crate::{
    auth::DemoAccount,
    handlers::AppState,
    server::{init_tracing, spawn_http_server},
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    init_tracing("demo_login");

    let config = SessionConfig::from_env()?;
    let sweep_interval = config.sweep_interval;
    let manager = sessionkit_axum::init(config).await?;
    let _sweeper = manager.spawn_expiry_sweep(sweep_interval);

    let state = AppState {
        checker: Arc::new(DemoAccount::from_env()),
    };

    let app = handlers::router(state)
        .layer(from_fn(csrf_guard))
        .layer(from_fn_with_state(manager, session_layer))
        .layer(TraceLayer::new_for_http());

    let port = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(3000);

    spawn_http_server(port, app).await?;
    Ok(())
}
