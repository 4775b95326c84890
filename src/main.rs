//! gatehouse server binary.
//!
//! Run with:
//!   GATEHOUSE_SESSION_SECRET=$(openssl rand -hex 32) RUST_LOG=info cargo run
//!
//! Try:
//!   curl -i http://localhost:3000/healthz
//!   curl -i http://localhost:3000/auth/session/          # 401, no cookie
//!   curl -i -X POST http://localhost:3000/auth/login/ -d 'nope'   # 400

use std::process::ExitCode;
use std::sync::Arc;

use gatehouse::{App, Config, Server, api};
use tracing::error;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), gatehouse::Error> {
    let config = Arc::new(Config::from_env()?);
    config.log_summary();

    let app = App::new(Arc::clone(&config), api::routes())?;
    Server::new(config.listen_addr()).serve(app).await
}
