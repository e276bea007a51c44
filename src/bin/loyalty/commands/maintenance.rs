//! Maintenance command - run the expiration and tier sweep now

use crate::client::LoyaltyClient;
use crate::style::*;
use anyhow::Result;

pub async fn run(url: &str) -> Result<()> {
    print_header("Maintenance Sweep");

    let client = LoyaltyClient::new(url);
    let report = client.run_maintenance().await?;

    print_success(&format!(
        "Checked {} memberships",
        report.memberships_checked
    ));
    println!();
    println!(
        "Expired:     {} memberships ({} pts)",
        report.expired_memberships, report.points_expired
    );
    println!("Downgrades:  {}", report.downgrades);
    println!("Resets:      {}", report.resets);

    if !report.tier_changes.is_empty() {
        println!();
        println!("{}", style_bold("Tier changes:"));
        for change in &report.tier_changes {
            println!(
                "  {}  {} -> {}  {}",
                style_dim(&short_id(&change.user_id)),
                style_tier(change.from),
                style_tier(change.to),
                style_dim(&change.reason)
            );
        }
    }

    Ok(())
}
