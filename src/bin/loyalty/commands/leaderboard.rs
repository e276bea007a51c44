//! Leaderboard command

use crate::client::LoyaltyClient;
use crate::style::*;
use anyhow::Result;
use uuid::Uuid;

pub async fn run(url: &str, venue: Uuid, limit: u32) -> Result<()> {
    print_header("Venue Leaderboard");

    let client = LoyaltyClient::new(url);

    match client.get_leaderboard(venue, limit).await {
        Ok(entries) => {
            if entries.is_empty() {
                print_info("No members at this venue yet.");
                return Ok(());
            }

            println!();
            println!(
                "{:>4}  {:<20}  {:<10}  {:>12}  {:>10}  {:>6}",
                "Rank", "Member", "Tier", "Earned", "Balance", "Visits"
            );
            println!("{}", "─".repeat(72));

            for entry in &entries {
                let rank = format!("#{}", entry.rank);
                let rank_styled = if entry.rank == 1 {
                    style_yellow(&rank)
                } else if entry.rank <= 3 {
                    style_cyan(&rank)
                } else {
                    rank
                };

                println!(
                    "{:>4}  {:<20}  {:<10}  {:>12}  {:>10}  {:>6}",
                    rank_styled,
                    entry.name,
                    entry.tier.display_name(),
                    entry.points_earned.to_string(),
                    entry.points_balance.to_string(),
                    entry.total_visits
                );
            }

            println!();
            println!("Total members shown: {}", entries.len());
        }
        Err(e) => return Err(e.context("Failed to fetch leaderboard")),
    }

    Ok(())
}
