#![allow(clippy::manual_unwrap_or_default)]
#![allow(clippy::manual_unwrap_or)]
use base_agent::cli::{run, Cli};
use clap::Parser;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        tracing::error!("Fatal: {}", e.inner);
        eprintln!("Error: {}", e.inner);
        std::process::exit(1);
    }
}
