//! Status command - a member's standing at a venue

use crate::client::LoyaltyClient;
use crate::style::*;
use anyhow::Result;
use uuid::Uuid;

pub async fn run(url: &str, user: Uuid, venue: Uuid) -> Result<()> {
    print_header("Member Status");

    println!("Member: {}", style_dim(&user.to_string()));
    println!("Venue:  {}", style_dim(&venue.to_string()));
    println!();

    let client = LoyaltyClient::new(url);

    let membership = match client.get_membership(user, venue).await {
        Ok(m) => m,
        Err(e) => return Err(e.context("Failed to fetch membership")),
    };

    println!("Tier:             {}", style_tier(membership.tier));
    println!(
        "Balance:          {}",
        style_bold(&format!("{} pts", membership.points_balance))
    );
    println!("Lifetime earned:  {} pts", membership.points_earned);
    println!("Total spent:      {} EUR", membership.total_spent);
    println!("Visits:           {}", membership.total_visits);
    println!(
        "Streak:           {} days (best {})",
        style_cyan(&membership.current_streak.to_string()),
        membership.longest_streak
    );

    match client.get_progress(user, venue).await {
        Ok(progress) => {
            println!();
            println!("{}", style_bold("Tier progress:"));
            println!(
                "  Multiplier:     {}x at {} for {} days",
                progress.multiplier,
                style_tier(progress.current_tier),
                progress.days_at_current_tier
            );
            match (
                progress.next_tier,
                progress.next_tier_threshold,
                progress.amount_to_next_tier,
            ) {
                (Some(next), Some(threshold), Some(missing)) => {
                    println!(
                        "  Next tier:      {} at {} EUR ({:.0}%)",
                        style_tier(next),
                        threshold,
                        progress.progress_percentage
                    );
                    println!("  Still needed:   {} EUR", style_yellow(&missing.to_string()));
                }
                _ => print_success("Highest tier reached"),
            }
        }
        Err(e) => print_warning(&format!("Tier progress unavailable: {}", e)),
    }

    match client.get_expiration(user, venue).await {
        Ok(status) => {
            println!();
            match status.state.as_str() {
                "active" => print_info(&format!(
                    "Points valid for another {} days",
                    status.days_until_expiry
                )),
                "expiring_soon" => print_warning(&format!(
                    "{} pts expire in {} days",
                    status.points_at_risk, status.days_until_expiry
                )),
                "critical" => print_error(&format!(
                    "{} pts expire in {} days",
                    status.points_at_risk, status.days_until_expiry
                )),
                _ => print_error(&format!("{} pts have expired", status.points_at_risk)),
            }
        }
        Err(e) => print_warning(&format!("Expiration status unavailable: {}", e)),
    }

    Ok(())
}
