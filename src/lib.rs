pub mod api;
pub mod auth;
pub mod cleanup;
pub mod cli;
pub mod credentials;
pub mod db;
pub mod jwt;
pub mod refresh;
pub mod service;

use api::create_api_router;
use auth::{PipelineState, authenticate};
use axum::{Router, middleware};
use credentials::BcryptVerifier;
use db::Database;
use jwt::{Clock, SystemClock, TokenCodec, TokenLifetimes};
use refresh::RefreshStore;
use service::AuthService;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

pub struct ServerConfig {
    /// Database connection (cloneable, uses connection pool internally)
    pub db: Database,
    /// HS256 secret for signing tokens
    pub jwt_secret: Vec<u8>,
    pub lifetimes: TokenLifetimes,
    /// Scheme tag expected in `Authorization` and reported as `grantType`
    pub bearer_scheme: String,
    /// Where live refresh tokens are kept
    pub refresh_store: Arc<dyn RefreshStore>,
    /// Upper bound on a single refresh store call
    pub store_timeout: Duration,
    pub bcrypt_cost: u32,
    pub clock: Arc<dyn Clock>,
}

impl ServerConfig {
    /// Defaults around a database, with refresh tokens kept in its `refresh_tokens` table.
    pub fn new(db: Database, jwt_secret: Vec<u8>) -> Self {
        let refresh_store = Arc::new(db.tokens());
        Self {
            db,
            jwt_secret,
            lifetimes: TokenLifetimes::default(),
            bearer_scheme: auth::DEFAULT_BEARER_SCHEME.to_string(),
            refresh_store,
            store_timeout: service::DEFAULT_STORE_TIMEOUT,
            bcrypt_cost: credentials::DEFAULT_BCRYPT_COST,
            clock: Arc::new(SystemClock),
        }
    }
}

/// Create the application router with the given configuration.
pub fn create_app(config: &ServerConfig) -> Router {
    let codec = Arc::new(TokenCodec::with_clock(
        &config.jwt_secret,
        config.lifetimes,
        config.clock.clone(),
    ));

    let service = Arc::new(
        AuthService::new(
            codec.clone(),
            config.refresh_store.clone(),
            Arc::new(config.db.users()),
            Arc::new(BcryptVerifier::new(config.bcrypt_cost)),
        )
        .with_store_timeout(config.store_timeout),
    );

    create_api_router(config.db.clone(), service, &config.bearer_scheme).layer(
        middleware::from_fn_with_state(
            PipelineState::new(codec, &config.bearer_scheme),
            authenticate,
        ),
    )
}

/// Run cleanup tasks and spawn background scheduler.
/// Call this before starting the server.
pub async fn init_cleanup(config: &ServerConfig) {
    let max_age = Duration::from_secs(config.lifetimes.refresh());
    cleanup::run_cleanup(config.refresh_store.as_ref(), max_age).await;
    cleanup::spawn_cleanup_scheduler(config.refresh_store.clone(), max_age);
}

/// Run the server on the given listener. This function blocks until the server exits.
/// Call `init_cleanup` before this to run cleanup on startup.
pub async fn run_server(config: ServerConfig, listener: TcpListener) -> Result<(), std::io::Error> {
    let app = create_app(&config);
    axum::serve(listener, app).await
}
