//! Transfer command - move stock between storage and the bar

use crate::client::{LoyaltyClient, TransferRequest};
use crate::style::*;
use anyhow::Result;

pub async fn run(url: &str, request: TransferRequest) -> Result<()> {
    print_header("Inventory Transfer");

    let client = LoyaltyClient::new(url);

    let resp = client.transfer(&request).await?;
    let item = resp.item;

    print_success(&format!(
        "Moved {} {} of {} from {} to {}",
        request.quantity, item.unit, item.name, request.from, request.to
    ));
    println!();
    println!("Storage:  {} {}", item.storage_quantity, item.unit);
    println!("Bar:      {} {}", item.bar_quantity, item.unit);

    let total = item.storage_quantity + item.bar_quantity;
    if total < item.min_stock_level {
        println!();
        print_warning(&format!(
            "{} is below its minimum stock ({} < {})",
            item.name, total, item.min_stock_level
        ));
    }

    Ok(())
}
