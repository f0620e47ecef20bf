//! Roleguard server
//!
//! Run with: cargo run --release --features server --bin roleguard-server
//!
//! Configuration comes from `ROLEGUARD_*` environment variables; set
//! `RUST_LOG` to adjust logging (default `info`).

use roleguard::server::{serve, AppState};
use roleguard::{Config, RoleguardError, Store};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();

    let config = Config::from_env();
    tracing::info!(db = %config.db_path, strict = config.strict, "opening store");
    let store = match Store::open(&config.db_path) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "failed to open store");
            std::process::exit(1);
        }
    };

    if let (Some(id), Some(password)) = (&config.admin_id, &config.admin_password) {
        match store.bootstrap_admin(id, password) {
            Ok(()) => tracing::info!(admin = %id, "admin seeded"),
            Err(RoleguardError::AlreadyBootstrapped) => tracing::debug!("admin already seeded"),
            Err(RoleguardError::UserExists(_)) => {
                tracing::error!(admin = %id, "admin id belongs to an existing user");
                std::process::exit(1);
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to seed admin");
                std::process::exit(1);
            }
        }
    }

    if let Err(e) = serve(AppState::new(store, config)).await {
        tracing::error!(error = %e, "server stopped");
        std::process::exit(1);
    }
}
