//! History command - a member's point transactions

use crate::client::LoyaltyClient;
use crate::style::*;
use anyhow::Result;
use uuid::Uuid;

pub async fn run(
    url: &str,
    user: Uuid,
    venue: Option<Uuid>,
    entry_type: Option<&str>,
    page: u32,
    per_page: u32,
) -> Result<()> {
    print_header("Points History");

    let client = LoyaltyClient::new(url);

    match client
        .get_history(user, venue, entry_type, page, per_page)
        .await
    {
        Ok(history) => {
            if history.items.is_empty() {
                print_info("No transactions found.");
                return Ok(());
            }

            println!();
            println!(
                "{:<17}  {:<15}  {:>10}  {:>10}  {:<8}  Description",
                "Date", "Type", "Amount", "Balance", "Venue"
            );
            println!("{}", "─".repeat(90));

            for entry in &history.items {
                let amount = if entry.amount.is_negative() {
                    style_red(&format!("{:>10}", entry.amount))
                } else {
                    style_green(&format!("{:>10}", format!("+{}", entry.amount)))
                };
                println!(
                    "{:<17}  {:<15}  {}  {:>10}  {:<8}  {}",
                    entry.created_at.format("%Y-%m-%d %H:%M"),
                    entry.entry_type.as_str(),
                    amount,
                    entry.balance_after.to_string(),
                    style_dim(&short_id(&entry.venue_id)),
                    entry.description
                );
            }

            println!();
            println!(
                "Page {} of {} ({} transactions)",
                history.page,
                history.total_pages.max(1),
                history.total
            );
        }
        Err(e) => return Err(e.context("Failed to fetch history")),
    }

    Ok(())
}
