//! Server configuration
//!
//! Every option can be given as a flag or through the environment (a `.env`
//! file is loaded first). Loaded once at startup.

use crate::auth::jwt::DEFAULT_TOKEN_TTL;
use crate::middleware::rate_limit::DEFAULT_SWEEP_PERIOD;
use anyhow::{bail, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::time::Duration;

/// Development signing secret. Startup warns when it is in use.
pub const DEV_JWT_SECRET: &str = "dev-secret-change-in-production-minimum-32-characters";

#[derive(Parser, Debug, Clone)]
#[command(name = "folio")]
#[command(about = "Portfolio site API server")]
pub struct AppConfig {
    /// Address to listen on
    #[arg(long, env = "FOLIO_BIND_ADDR", default_value = "0.0.0.0:3000")]
    pub bind_addr: SocketAddr,

    /// SQLite database file
    #[arg(long, env = "FOLIO_DB_PATH", default_value = "folio.db")]
    pub db_path: String,

    /// HMAC secret for signing credentials (at least 32 bytes)
    #[arg(long, env = "JWT_SECRET", default_value = DEV_JWT_SECRET, hide_env_values = true, hide_default_value = true)]
    pub jwt_secret: String,

    /// Credential lifetime in hours
    #[arg(long, env = "JWT_TTL_HOURS", default_value_t = DEFAULT_TOKEN_TTL.as_secs() / 3600)]
    pub jwt_ttl_hours: u64,

    /// bcrypt work factor
    #[arg(long, env = "BCRYPT_COST", default_value_t = bcrypt::DEFAULT_COST)]
    pub bcrypt_cost: u32,

    /// Seconds between sweeps of expired rate-limit entries
    #[arg(long, env = "RATE_LIMIT_SWEEP_SECS", default_value_t = DEFAULT_SWEEP_PERIOD.as_secs())]
    pub rate_limit_sweep_secs: u64,

    /// Allow self-registration after the first account exists
    #[arg(long, env = "ALLOW_REGISTRATION")]
    pub allow_registration: bool,

    /// Display name of the bootstrap super admin
    #[arg(long, env = "ADMIN_NAME", default_value = "Administrator")]
    pub admin_name: String,

    /// Email of the bootstrap super admin, created when no account exists
    #[arg(long, env = "ADMIN_EMAIL")]
    pub admin_email: Option<String>,

    #[arg(long, env = "ADMIN_PASSWORD", hide_env_values = true)]
    pub admin_password: Option<String>,

    /// HTTP mail relay endpoint; emails are only logged when unset
    #[arg(long, env = "MAIL_RELAY_URL")]
    pub mail_relay_url: Option<String>,

    #[arg(long, env = "MAIL_RELAY_TOKEN", hide_env_values = true)]
    pub mail_relay_token: Option<String>,

    /// Sender address on outgoing mail
    #[arg(long, env = "MAIL_FROM", default_value = "no-reply@localhost")]
    pub mail_from: String,

    /// Where contact form notifications go
    #[arg(long, env = "CONTACT_NOTIFY_EMAIL")]
    pub contact_notify_email: Option<String>,

    /// Site name used in outgoing mail
    #[arg(long, env = "SITE_NAME", default_value = "Portfolio")]
    pub site_name: String,
}

impl AppConfig {
    /// Reject settings the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.jwt_secret.len() < 32 {
            bail!("JWT_SECRET must be at least 32 bytes");
        }
        if self.jwt_ttl_hours == 0 {
            bail!("JWT_TTL_HOURS must be positive");
        }
        if !(4..=31).contains(&self.bcrypt_cost) {
            bail!("BCRYPT_COST must be between 4 and 31");
        }
        if self.rate_limit_sweep_secs == 0 {
            bail!("RATE_LIMIT_SWEEP_SECS must be positive");
        }
        if self.admin_email.is_some() != self.admin_password.is_some() {
            bail!("ADMIN_EMAIL and ADMIN_PASSWORD must be set together");
        }
        Ok(())
    }

    pub fn uses_dev_secret(&self) -> bool {
        self.jwt_secret == DEV_JWT_SECRET
    }

    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.jwt_ttl_hours * 3600)
    }

    pub fn sweep_period(&self) -> Duration {
        Duration::from_secs(self.rate_limit_sweep_secs)
    }
}
