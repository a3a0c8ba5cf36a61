use clap::Parser;
use tokenkeep::cli::{
    Args, build_config, handle_grant_admin, init_logging, load_jwt_secret, open_database,
};
use tokenkeep::{init_cleanup, run_server};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let args = Args::parse();

    init_logging(&args.log_format);

    let Some(jwt_secret) = load_jwt_secret(args.jwt_secret_file.as_deref()) else {
        std::process::exit(1);
    };

    let Some(db) = open_database(&args.database).await else {
        std::process::exit(1);
    };

    if let Some(email) = args.grant_admin.as_deref() {
        if !handle_grant_admin(&db, email).await {
            std::process::exit(1);
        }
    }

    let Some(config) = build_config(&args, db, jwt_secret) else {
        std::process::exit(1);
    };

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| {
            error!(address = %addr, error = %e, "Failed to bind");
            std::process::exit(1);
        });

    init_cleanup(&config).await;

    match listener.local_addr() {
        Ok(local_addr) => info!(address = %local_addr, session_store = ?args.session_store, "Listening"),
        Err(e) => error!(error = %e, "Failed to read local address"),
    }

    if let Err(e) = run_server(config, listener).await {
        error!(error = %e, "Server error");
        std::process::exit(1);
    }
}
