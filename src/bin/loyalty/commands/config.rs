//! Config command - show server configuration

use crate::client::LoyaltyClient;
use crate::style::*;
use anyhow::{Context, Result};

pub async fn run(url: &str) -> Result<()> {
    print_header("Loyalty Configuration");

    let client = LoyaltyClient::new(url);
    let config = client
        .get_config()
        .await
        .context("Failed to connect to server")?;

    println!();
    println!("Server:           {}", style_cyan(url));
    println!("Base rate:        {}%", config.base_rate_percent);
    println!("Referral share:   {}% per level", config.referral_share_percent);

    println!();
    println!("{}", style_bold("Streak milestones:"));
    for m in &config.streak_milestones {
        println!("  {:>3} days    +{} pts", m.days, m.bonus);
    }

    println!();
    println!("{}", style_bold("Expiration:"));
    println!(
        "  Points expire after {} days without activity",
        config.expiration.inactivity_days
    );
    println!(
        "  Warning at {} days, critical at {} days",
        config.expiration.warning_days, config.expiration.critical_days
    );

    println!();
    println!("{}", style_bold("Maintenance:"));
    if config.maintenance.enabled {
        println!("  Runs every {}s", config.maintenance.interval_secs);
    } else {
        println!("  {}", style_yellow("disabled"));
    }

    Ok(())
}
