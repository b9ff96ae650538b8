use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use colored::*;

use crate::config::Config;
use crate::engine::EntitlementEngine;
use crate::entitlement::MAX_ADS_PER_DAY;
use crate::events::Reply;
use crate::provider::FaceProvider;
use crate::store::EntitlementStore;

#[derive(Parser)]
#[command(name = "facebot")]
#[command(about = "Credit-gated AI face generator bot")]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the interactive conversation shell
    Shell {
        /// User id to converse as
        #[arg(long, default_value = "local")]
        user_id: String,
        /// Data directory path
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
    /// Show entitlement records
    Status {
        /// Show a single user instead of the whole table
        #[arg(long)]
        user_id: Option<String>,
        /// Data directory path
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
    /// Apply a confirmed purchase to a user
    Grant {
        /// User to credit
        #[arg(long)]
        user_id: String,
        /// Credits to add
        #[arg(long)]
        credits: Option<u32>,
        /// Grant an unlimited subscription instead
        #[arg(long)]
        unlimited: bool,
        /// Data directory path
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
}

pub async fn handle_status(user_id: Option<String>, data_dir: Option<PathBuf>) -> Result<()> {
    let config = Config::new(data_dir)?;
    let store = EntitlementStore::new(config.entitlements_file());
    let engine = EntitlementEngine::new(store, FaceProvider::new(&config.provider_endpoint));

    match user_id {
        Some(user_id) => match engine.record(&user_id).await {
            Some(record) => print_record(&user_id, &record),
            None => println!("{}: {}", "No record for user".yellow(), user_id),
        },
        None => {
            let table = engine.snapshot().await;
            if table.is_empty() {
                println!("{}", "No entitlement records yet".yellow());
                return Ok(());
            }

            println!("{} ({})", "Entitlement records".cyan().bold(), table.len());
            let mut user_ids: Vec<_> = table.keys().collect();
            user_ids.sort();
            for user_id in user_ids {
                println!();
                print_record(user_id, &table[user_id]);
            }
        }
    }

    Ok(())
}

fn print_record(user_id: &str, record: &crate::entitlement::EntitlementRecord) {
    println!("{}: {}", "User".cyan(), user_id);
    println!("  Name: {}", record.username.as_deref().unwrap_or("(not set)"));
    println!("  Credits: {}", record.credits);
    println!(
        "  Subscription: {}",
        if record.subscribed { "active".green() } else { "none".normal() }
    );
    println!("  Joined: {}", record.month_joined);
    println!("  Last reset: {}", record.last_reset);
    println!("  Ads today: {}/{}", record.ads_used_today, MAX_ADS_PER_DAY);
}

/// Entry point for the external payment-confirmation event: a confirmed
/// purchase lands here and is applied through the engine.
pub async fn handle_grant(
    user_id: String,
    credits: Option<u32>,
    unlimited: bool,
    data_dir: Option<PathBuf>,
) -> Result<()> {
    if credits.is_some() == unlimited {
        bail!("pass exactly one of --credits <N> or --unlimited");
    }

    let config = Config::new(data_dir)?;
    let store = EntitlementStore::new(config.entitlements_file());
    let engine = EntitlementEngine::new(store, FaceProvider::new(&config.provider_endpoint));

    let replies = match credits {
        Some(amount) => engine.grant_credits(&user_id, amount).await,
        None => engine.grant_unlimited(&user_id).await,
    };

    for reply in replies {
        if let Reply::Text { text, .. } = reply {
            println!("{}", text);
        }
    }

    Ok(())
}
