//! CLI argument parsing, validation, and startup helpers.

use crate::ServerConfig;
use crate::auth::DEFAULT_BEARER_SCHEME;
use crate::credentials::DEFAULT_BCRYPT_COST;
use crate::db::{Database, UserRole};
use crate::jwt::{DEFAULT_ACCESS_TTL_SECS, DEFAULT_REFRESH_TTL_SECS, TokenLifetimes};
use crate::refresh::{MemoryRefreshStore, RefreshStore};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

const MIN_JWT_SECRET_LENGTH: usize = 32;

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

/// Backend for live refresh tokens.
#[derive(clap::ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SessionStore {
    /// `refresh_tokens` table in the database
    #[default]
    Sqlite,
    /// Process memory; every session ends on restart
    Memory,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "tokenkeep",
    about = "Email and password login with rotating refresh tokens"
)]
pub struct Args {
    /// Port to listen on
    #[arg(short, long, env = "TOKENKEEP_PORT", default_value = "7291")]
    pub port: u16,

    /// Path to SQLite database file
    #[arg(short, long, env = "TOKENKEEP_DATABASE", default_value = "tokenkeep.db")]
    pub database: String,

    /// Path to file containing JWT secret. Prefer using JWT_SECRET env var instead
    #[arg(long)]
    pub jwt_secret_file: Option<String>,

    /// Access token lifetime in seconds
    #[arg(long, env = "TOKENKEEP_ACCESS_TTL", default_value_t = DEFAULT_ACCESS_TTL_SECS)]
    pub access_ttl: u64,

    /// Refresh token lifetime in seconds, must exceed the access token lifetime
    #[arg(long, env = "TOKENKEEP_REFRESH_TTL", default_value_t = DEFAULT_REFRESH_TTL_SECS)]
    pub refresh_ttl: u64,

    /// Scheme tag expected in the Authorization header
    #[arg(long, env = "TOKENKEEP_BEARER_SCHEME", default_value = DEFAULT_BEARER_SCHEME,
        value_parser = validate_bearer_scheme)]
    pub bearer_scheme: String,

    /// Where live refresh tokens are kept
    #[arg(long, env = "TOKENKEEP_SESSION_STORE", default_value = "sqlite")]
    pub session_store: SessionStore,

    /// Timeout for a single session store call, in milliseconds
    #[arg(long, env = "TOKENKEEP_STORE_TIMEOUT_MS", default_value = "5000")]
    pub store_timeout_ms: u64,

    /// bcrypt cost factor for new password hashes
    #[arg(long, env = "TOKENKEEP_BCRYPT_COST", default_value_t = DEFAULT_BCRYPT_COST,
        value_parser = clap::value_parser!(u32).range(4..=31))]
    pub bcrypt_cost: u32,

    /// Promote an existing member to admin before starting. Takes effect at their next login
    #[arg(long, value_name = "EMAIL")]
    pub grant_admin: Option<String>,

    /// Log output format
    #[arg(short, long, default_value = "pretty")]
    pub log_format: LogFormat,
}

fn validate_bearer_scheme(s: &str) -> Result<String, String> {
    if s.is_empty() {
        return Err("Bearer scheme cannot be empty".to_string());
    }

    if s.chars().any(|c| !c.is_ascii_graphic()) {
        return Err(format!("Bearer scheme contains invalid characters: {}", s));
    }

    Ok(s.to_string())
}

/// Initialize logging based on the specified format.
pub fn init_logging(format: &LogFormat) {
    match format {
        LogFormat::Pretty => tracing_subscriber::fmt::init(),
        LogFormat::Json => tracing_subscriber::fmt().json().init(),
        LogFormat::Compact => tracing_subscriber::fmt().compact().init(),
    }
}

/// Load JWT secret from environment variable or file.
/// Returns None and logs an error if the secret cannot be loaded.
pub fn load_jwt_secret(jwt_secret_file: Option<&str>) -> Option<String> {
    let secret = if let Ok(secret) = std::env::var("JWT_SECRET") {
        // Clear the environment variable to prevent leaking
        // SAFETY: We're single-threaded at this point during startup,
        // and no other code is reading this environment variable.
        unsafe { std::env::remove_var("JWT_SECRET") };
        secret
    } else if let Some(path) = jwt_secret_file {
        match std::fs::read_to_string(path) {
            Ok(content) => content.trim().to_string(),
            Err(e) => {
                error!(path = %path, error = %e, "Failed to read JWT secret file");
                return None;
            }
        }
    } else {
        error!(
            "JWT secret is required. Set JWT_SECRET environment variable (recommended) or use --jwt-secret-file"
        );
        return None;
    };

    if secret.len() < MIN_JWT_SECRET_LENGTH {
        error!(
            "JWT secret is shorter than {} characters. Use a longer secret",
            MIN_JWT_SECRET_LENGTH
        );
        return None;
    }

    Some(secret)
}

/// Give the member with `email` the admin role.
/// Returns false and logs an error if there is no such member or the update fails.
pub async fn handle_grant_admin(db: &Database, email: &str) -> bool {
    let member = match db.users().get_by_email(email).await {
        Ok(Some(member)) => member,
        Ok(None) => {
            error!(email = %email, "No member with this email");
            return false;
        }
        Err(e) => {
            error!(error = %e, "Failed to look up member");
            return false;
        }
    };

    if member.role == UserRole::Admin {
        info!(email = %member.email, "Member is already an admin");
        return true;
    }

    match db.users().set_role(&member.uuid, UserRole::Admin).await {
        Ok(true) => {
            info!(email = %member.email, subject = %member.uuid, "Granted admin role");
            true
        }
        Ok(false) => {
            error!(email = %member.email, "Member disappeared before the role change");
            false
        }
        Err(e) => {
            error!(error = %e, "Failed to grant admin role");
            false
        }
    }
}

/// Build ServerConfig from validated arguments.
/// Returns None and logs an error if the token lifetimes are inconsistent.
pub fn build_config(args: &Args, db: Database, jwt_secret: String) -> Option<ServerConfig> {
    let lifetimes = match TokenLifetimes::new(args.access_ttl, args.refresh_ttl) {
        Ok(lifetimes) => lifetimes,
        Err(e) => {
            error!(error = %e, "Invalid token lifetimes");
            return None;
        }
    };

    let refresh_store: Arc<dyn RefreshStore> = match args.session_store {
        SessionStore::Sqlite => Arc::new(db.tokens()),
        SessionStore::Memory => Arc::new(MemoryRefreshStore::new()),
    };

    let mut config = ServerConfig::new(db, jwt_secret.into_bytes());
    config.lifetimes = lifetimes;
    config.bearer_scheme = args.bearer_scheme.clone();
    config.refresh_store = refresh_store;
    config.store_timeout = Duration::from_millis(args.store_timeout_ms);
    config.bcrypt_cost = args.bcrypt_cost;
    Some(config)
}

/// Open the database, logging errors if it fails.
pub async fn open_database(path: &str) -> Option<Database> {
    match Database::open(path).await {
        Ok(db) => {
            info!(path = %path, "Database opened");
            Some(db)
        }
        Err(e) => {
            error!(path = %path, error = %e, "Failed to open database");
            None
        }
    }
}
