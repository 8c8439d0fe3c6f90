mod config;
mod db;
mod feed;
mod frame;
mod rate_limit;
mod routes;
mod services;
mod state;

use std::sync::Arc;

use tracing::{error, info};

use crate::config::{AppConfig, ConfigError, StoreKind};
use crate::feed::MessageStore;
use crate::feed::memory::InMemoryMessageStore;
use crate::feed::pg::PgMessageStore;
use crate::services::mailer::ResendMailer;

#[derive(Debug, thiserror::Error)]
enum StartupError {
    #[error("config: {0}")]
    Config(#[from] ConfigError),
    #[error("database init failed: {0}")]
    Db(#[from] sqlx::Error),
    #[error("server: {0}")]
    Io(#[from] std::io::Error),
}

#[tokio::main]
async fn main() {
    // A missing .env is normal outside local development.
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt::init();

    if let Err(e) = run().await {
        error!(error = %e, "devdesk exited");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), StartupError> {
    let config = AppConfig::from_env()?;
    let pool = db::init_pool(&config.database_url).await?;

    let store: Arc<dyn MessageStore> = match config.store {
        StoreKind::Postgres => Arc::new(PgMessageStore::new(pool.clone())),
        StoreKind::Memory => Arc::new(InMemoryMessageStore::new()),
    };
    info!(store = ?config.store, history_limit = config.feed.history_limit, "feed store ready");

    let mut state = state::AppState::new(pool, store, config.feed, config.access_codes);
    match &config.mail {
        Some(mail) => {
            state = state.with_mailer(Arc::new(ResendMailer::new(mail)), mail.contact_notify.clone());
            info!(from = %mail.from, "email delivery enabled");
        }
        None => info!("RESEND_API_KEY/RESEND_FROM not set; email delivery disabled"),
    }

    let app = routes::app(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;

    info!(port = config.port, "devdesk listening");
    axum::serve(listener, app).await?;
    Ok(())
}
