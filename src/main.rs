// main.rs
mod cli;
mod config;
mod engine;
mod entitlement;
mod events;
mod keepalive;
mod provider;
mod shell;
mod store;

use clap::Parser;

use cli::{Args, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init();

    let args = Args::parse();

    match args.command {
        Commands::Shell { user_id, data_dir } => shell::handle_shell(user_id, data_dir).await,
        Commands::Status { user_id, data_dir } => cli::handle_status(user_id, data_dir).await,
        Commands::Grant {
            user_id,
            credits,
            unlimited,
            data_dir,
        } => cli::handle_grant(user_id, credits, unlimited, data_dir).await,
    }
}
