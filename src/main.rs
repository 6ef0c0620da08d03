use std::sync::Arc;

mod app;
mod auth;
mod config;
mod db;
mod error;
mod state;
mod users;

use crate::{config::AppConfig, state::AppState, users::repo::PgUserStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "accounts_api=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let config = AppConfig::from_env()?;
    if config.jwt.uses_default_secret() {
        tracing::warn!("JWT_SECRET not set; signing tokens with the built-in default key");
    }

    let db = db::connect(&config.database_url).await?;
    db::migrate(&db).await;

    let addr = config.bind_addr();
    let state = AppState::from_parts(&config, Arc::new(PgUserStore::new(db)));
    app::serve(app::build_app(state), &addr).await
}
