//! Folio - portfolio site API server
//! Mission: Serve published content, take contact messages, guard the admin surface

use anyhow::{Context, Result};
use clap::Parser;
use dotenv::dotenv;
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use folio_backend::{
    api::{create_router, AppState},
    auth::{JwtHandler, UserStore},
    config::AppConfig,
    db::Database,
    mailer::{LogTransport, MailTransport, Mailer, RelayTransport, DEFAULT_QUEUE_CAPACITY},
    middleware::RateLimiter,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize environment and logging
    load_env();
    init_tracing();

    let config = AppConfig::parse();
    config.validate().context("Invalid configuration")?;
    if config.uses_dev_secret() {
        warn!("⚠️ JWT_SECRET not set, using the development secret. Do not run like this in production");
    }

    info!("🚀 Folio API starting (v{})", env!("CARGO_PKG_VERSION"));

    let db = Arc::new(Database::open(&config.db_path)?);

    bootstrap_admin(&db, &config)?;

    let jwt = Arc::new(JwtHandler::with_ttl(&config.jwt_secret, config.token_ttl()));

    let limiter = RateLimiter::new();
    let sweeper = limiter.start_sweeper(config.sweep_period());

    let transport: Arc<dyn MailTransport> = match &config.mail_relay_url {
        Some(url) => {
            info!("📧 Mail relay: {}", url);
            Arc::new(RelayTransport::new(
                url.clone(),
                config.mail_relay_token.clone(),
                config.mail_from.clone(),
            )?)
        }
        None => {
            warn!("📧 MAIL_RELAY_URL not set, outgoing mail will only be logged");
            Arc::new(LogTransport)
        }
    };
    let (mailer, mail_worker) = Mailer::spawn(transport, DEFAULT_QUEUE_CAPACITY);

    let bind_addr = config.bind_addr;
    let state = AppState::new(db, jwt, limiter, mailer, Arc::new(config));
    let app = create_router(state);

    // Start server
    let listener = TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("Failed to bind {bind_addr}"))?;
    info!("🎯 API server listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("🛑 Shutting down");
    sweeper.stop().await;
    mail_worker.shutdown().await;

    Ok(())
}

/// Create the configured super admin on an empty database.
fn bootstrap_admin(db: &Arc<Database>, config: &AppConfig) -> Result<()> {
    let (Some(email), Some(password)) = (&config.admin_email, &config.admin_password) else {
        return Ok(());
    };

    let users = UserStore::new(db.clone(), config.bcrypt_cost);
    if !users.ensure_bootstrap_admin(&config.admin_name, email, password)? {
        info!("🔐 Accounts already exist, skipping bootstrap admin");
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}

/// Initialize tracing
fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "folio_backend=debug,folio=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn load_env() {
    // 1) Standard dotenv search (cwd + parents)
    let _ = dotenv();

    // 2) Also try the crate directory, for runs started from elsewhere
    let manifest_env = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
    if manifest_env.exists() {
        let _ = dotenv::from_path(&manifest_env);
    }
}
