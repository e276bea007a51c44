//! Loyalty API Client
//!
//! Thin wrapper over the loyalty server's JSON API.

use anyhow::{anyhow, Result};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use afterdark_loyalty::ledger::{LedgerEntry, Page, VenueMembership};
use afterdark_loyalty::money::{Money, Multiplier, Percent, Points};
use afterdark_loyalty::tiers::MembershipTier;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Leaderboard entry
#[derive(Debug, Deserialize)]
pub struct LeaderboardEntry {
    pub rank: u32,
    pub name: String,
    pub tier: MembershipTier,
    pub points_earned: Points,
    pub points_balance: Points,
    pub total_visits: u32,
}

#[derive(Debug, Deserialize)]
struct LeaderboardResponse {
    entries: Vec<LeaderboardEntry>,
}

/// Tier progress of a membership
#[derive(Debug, Deserialize)]
pub struct TierProgress {
    pub current_tier: MembershipTier,
    pub next_tier: Option<MembershipTier>,
    pub next_tier_threshold: Option<Money>,
    pub progress_percentage: f64,
    pub amount_to_next_tier: Option<Money>,
    pub days_at_current_tier: i64,
    pub multiplier: Multiplier,
}

#[derive(Debug, Deserialize)]
pub struct ExpirationStatus {
    pub state: String,
    pub points_at_risk: Points,
    pub days_until_expiry: i64,
}

#[derive(Debug, Serialize)]
pub struct PinRequest<'a> {
    pub employee_id: Uuid,
    pub pin: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct VerifiedEmployee {
    pub name: String,
    pub role: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyPinResponse {
    pub valid: bool,
    pub employee: VerifiedEmployee,
}

#[derive(Debug, Serialize)]
pub struct TransferRequest {
    pub item_id: Uuid,
    pub from: String,
    pub to: String,
    pub quantity: i64,
    pub employee_id: Option<Uuid>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct InventoryItem {
    pub name: String,
    pub unit: String,
    pub storage_quantity: i64,
    pub bar_quantity: i64,
    pub min_stock_level: i64,
}

#[derive(Debug, Deserialize)]
pub struct TransferResponse {
    pub item: InventoryItem,
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    pub base_rate_percent: Percent,
    pub referral_share_percent: Percent,
    pub streak_milestones: Vec<StreakMilestone>,
    pub expiration: ExpirationWindows,
    pub maintenance: MaintenanceSchedule,
}

#[derive(Debug, Deserialize)]
pub struct StreakMilestone {
    pub days: u32,
    pub bonus: Points,
}

#[derive(Debug, Deserialize)]
pub struct ExpirationWindows {
    pub inactivity_days: u32,
    pub warning_days: u32,
    pub critical_days: u32,
}

#[derive(Debug, Deserialize)]
pub struct MaintenanceSchedule {
    pub enabled: bool,
    pub interval_secs: u64,
}

#[derive(Debug, Deserialize)]
pub struct TierChange {
    pub user_id: Uuid,
    pub from: MembershipTier,
    pub to: MembershipTier,
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct MaintenanceReport {
    pub memberships_checked: u32,
    pub expired_memberships: u32,
    pub points_expired: Points,
    pub downgrades: u32,
    pub resets: u32,
    pub tier_changes: Vec<TierChange>,
}

/// Loyalty API client
pub struct LoyaltyClient {
    client: Client,
    base_url: String,
}

impl LoyaltyClient {
    /// Create a new client pointing to a loyalty server
    pub fn new(server_url: &str) -> Self {
        // Build HTTP client with timeout, falling back to default client if builder fails
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: server_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Send a request and decode the body, or surface the server's error message
    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder, what: &str) -> Result<T> {
        let resp = request.send().await?;

        let status = resp.status();
        if status.is_success() {
            Ok(resp.json().await?)
        } else {
            let error_text = resp.text().await.unwrap_or_else(|_| "Unknown error".into());
            Err(anyhow!("{} failed ({}): {}", what, status, error_message(&error_text)))
        }
    }

    pub async fn get_config(&self) -> Result<ServerConfig> {
        self.send(self.client.get(self.url("config")), "Fetching config")
            .await
    }

    pub async fn get_membership(&self, user_id: Uuid, venue_id: Uuid) -> Result<VenueMembership> {
        let url = self.url(&format!("members/{}/venues/{}", user_id, venue_id));
        self.send(self.client.get(url), "Fetching membership").await
    }

    pub async fn get_progress(&self, user_id: Uuid, venue_id: Uuid) -> Result<TierProgress> {
        let url = self.url(&format!("members/{}/venues/{}/progress", user_id, venue_id));
        self.send(self.client.get(url), "Fetching tier progress")
            .await
    }

    pub async fn get_expiration(&self, user_id: Uuid, venue_id: Uuid) -> Result<ExpirationStatus> {
        let url = self.url(&format!("members/{}/venues/{}/expiration", user_id, venue_id));
        self.send(self.client.get(url), "Fetching expiration").await
    }

    pub async fn get_history(
        &self,
        user_id: Uuid,
        venue_id: Option<Uuid>,
        entry_type: Option<&str>,
        page: u32,
        per_page: u32,
    ) -> Result<Page<LedgerEntry>> {
        let mut query = vec![
            ("page", page.to_string()),
            ("per_page", per_page.to_string()),
        ];
        if let Some(venue_id) = venue_id {
            query.push(("venue_id", venue_id.to_string()));
        }
        if let Some(entry_type) = entry_type {
            query.push(("type", entry_type.to_string()));
        }
        let url = self.url(&format!("members/{}/transactions", user_id));
        self.send(self.client.get(url).query(&query), "Fetching history")
            .await
    }

    pub async fn get_leaderboard(&self, venue_id: Uuid, limit: u32) -> Result<Vec<LeaderboardEntry>> {
        let url = self.url(&format!("venues/{}/leaderboard", venue_id));
        let resp: LeaderboardResponse = self
            .send(
                self.client.get(url).query(&[("limit", limit)]),
                "Fetching leaderboard",
            )
            .await?;
        Ok(resp.entries)
    }

    pub async fn verify_pin(&self, employee_id: Uuid, pin: &str) -> Result<VerifyPinResponse> {
        let body = PinRequest { employee_id, pin };
        self.send(
            self.client.post(self.url("employees/verify-pin")).json(&body),
            "PIN verification",
        )
        .await
    }

    pub async fn transfer(&self, request: &TransferRequest) -> Result<TransferResponse> {
        self.send(
            self.client.post(self.url("inventory/transfer")).json(request),
            "Transfer",
        )
        .await
    }

    pub async fn run_maintenance(&self) -> Result<MaintenanceReport> {
        self.send(self.client.post(self.url("maintenance/run")), "Maintenance")
            .await
    }
}

/// Pull `error` out of a JSON error body, falling back to the raw text
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(String::from))
        .unwrap_or_else(|| body.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_new() {
        let client = LoyaltyClient::new("http://localhost:8080");
        assert_eq!(client.base_url, "http://localhost:8080");
    }

    #[test]
    fn test_client_strips_trailing_slash() {
        let client = LoyaltyClient::new("http://localhost:8080/");
        assert_eq!(client.base_url, "http://localhost:8080");
    }

    #[test]
    fn test_url() {
        let client = LoyaltyClient::new("http://localhost:8080");
        assert_eq!(
            client.url("/maintenance/run"),
            "http://localhost:8080/maintenance/run"
        );
        assert_eq!(client.url("config"), "http://localhost:8080/config");
    }

    #[test]
    fn test_error_message() {
        assert_eq!(error_message(r#"{"error":"Invalid PIN"}"#), "Invalid PIN");
        assert_eq!(error_message("Bad Gateway"), "Bad Gateway");
    }
}
