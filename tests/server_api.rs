use std::net::SocketAddr;
use std::sync::Arc;

use afterdark_loyalty::server::{create_router, AppState};
use afterdark_loyalty::{Config, LoyaltyService, Store};
use reqwest::StatusCode;
use serde_json::{json, Value};

async fn spawn_server() -> SocketAddr {
    let config = Config::default();
    let store = Store::in_memory().expect("in-memory store");
    let service = Arc::new(LoyaltyService::new(store, &config));
    let app = create_router(Arc::new(AppState {
        service,
        config,
        started_at: std::time::Instant::now(),
    }));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    addr
}

struct Api {
    http: reqwest::Client,
    base: String,
}

impl Api {
    async fn start() -> Self {
        let addr = spawn_server().await;
        Self {
            http: reqwest::Client::new(),
            base: format!("http://{}", addr),
        }
    }

    async fn get(&self, path: &str) -> (StatusCode, Value) {
        let resp = self
            .http
            .get(format!("{}{}", self.base, path))
            .send()
            .await
            .expect("request");
        let status = resp.status();
        (status, resp.json().await.expect("json body"))
    }

    async fn post(&self, path: &str, body: Value) -> (StatusCode, Value) {
        let resp = self
            .http
            .post(format!("{}{}", self.base, path))
            .json(&body)
            .send()
            .await
            .expect("request");
        let status = resp.status();
        (status, resp.json().await.expect("json body"))
    }

    async fn venue(&self) -> String {
        let (status, venue) = self
            .post(
                "/venues",
                json!({
                    "name": "Club Nord",
                    "margins": { "food": 50, "beverage": 50, "default": 50 }
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        venue["id"].as_str().expect("venue id").to_string()
    }

    async fn user(&self, name: &str, referrer: Option<&str>) -> String {
        let (status, user) = self
            .post("/users", json!({ "name": name, "referrer_id": referrer }))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        user["id"].as_str().expect("user id").to_string()
    }
}

#[tokio::test]
async fn health_and_config() {
    let api = Api::start().await;

    let (status, health) = api.get("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["healthy"], true);

    let (status, config) = api.get("/config").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(config["base_rate_percent"], "10.00");
    assert_eq!(config["streak_milestones"][0]["days"], 7);
    assert!(config.get("pin").is_none());
}

#[tokio::test]
async fn check_in_and_membership_flow() {
    let api = Api::start().await;
    let venue = api.venue().await;
    let sponsor = api.user("Ines", None).await;
    let member = api.user("Mara", Some(&sponsor)).await;

    let (status, outcome) = api
        .post(
            "/check-ins",
            json!({
                "user_id": member,
                "venue_id": venue,
                "method": "qr",
                "amount_total": "100.00",
                "amount_cash": 100
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(outcome["points_earned"], "10.00");
    assert_eq!(outcome["referral_payouts"][0]["level"], 1);
    assert_eq!(outcome["referral_payouts"][0]["points"], "2.50");

    let (status, membership) = api
        .get(&format!("/members/{}/venues/{}", member, venue))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(membership["points_balance"], "10.00");
    assert_eq!(membership["tier"], "bronze");
    assert_eq!(membership["total_visits"], 1);

    let (status, progress) = api
        .get(&format!("/members/{}/venues/{}/progress", member, venue))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(progress["next_tier"], "silver");
    assert_eq!(progress["amount_to_next_tier"], "400.00");

    let (status, history) = api
        .get(&format!(
            "/members/{}/transactions?type=referral_bonus",
            sponsor
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(history["total"], 1);
    assert_eq!(history["items"][0]["related_user_id"], member.as_str());

    let (status, board) = api
        .get(&format!("/venues/{}/leaderboard?limit=5", venue))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(board["entries"][0]["name"], "Mara");
    assert_eq!(board["entries"][1]["name"], "Ines");
}

#[tokio::test]
async fn error_statuses() {
    let api = Api::start().await;
    let venue = api.venue().await;
    let member = api.user("Mara", None).await;

    let (status, body) = api
        .post(
            "/check-ins",
            json!({
                "user_id": member,
                "venue_id": venue,
                "amount_total": 20,
                "amount_cash": 0,
                "amount_points": 20
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]
        .as_str()
        .unwrap_or_default()
        .contains("Insufficient points"));

    let (status, _) = api
        .get(&format!(
            "/members/{}/venues/{}",
            member,
            uuid::Uuid::new_v4()
        ))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, reward) = api
        .post(
            &format!("/venues/{}/rewards", venue),
            json!({ "name": "Cloakroom", "points_cost": 5, "stock": 0 }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _) = api
        .post(
            &format!("/rewards/{}/redeem", reward["id"].as_str().unwrap()),
            json!({ "user_id": member }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn employee_pin_verification() {
    let api = Api::start().await;
    let venue = api.venue().await;

    let (status, employee) = api
        .post(
            "/employees",
            json!({ "venue_id": venue, "name": "Jonas", "role": "bartender", "pin": "2580" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(employee.get("pin_hash").is_none());
    let id = employee["id"].as_str().unwrap().to_string();

    let (status, verified) = api
        .post(
            "/employees/verify-pin",
            json!({ "employee_id": id, "pin": "2580" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(verified["valid"], true);
    assert_eq!(verified["employee"]["role"], "bartender");

    let (status, body) = api
        .post(
            "/employees/verify-pin",
            json!({ "employee_id": id, "pin": "0000" }),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Invalid PIN");

    let (status, _) = api
        .post(
            "/employees/verify-pin",
            json!({ "employee_id": id, "pin": "12a4" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn inventory_transfer_and_low_stock() {
    let api = Api::start().await;
    let venue = api.venue().await;

    let (status, item) = api
        .post(
            &format!("/venues/{}/inventory", venue),
            json!({
                "name": "Tonic",
                "category": "mixers",
                "unit": "crates",
                "storage_quantity": 3,
                "min_stock_level": 4
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let item_id = item["id"].as_str().unwrap().to_string();

    let (status, moved) = api
        .post(
            "/inventory/transfer",
            json!({ "item_id": item_id, "from": "storage", "to": "bar", "quantity": 2 }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(moved["item"]["bar_quantity"], 2);

    let (status, _) = api
        .post(
            "/inventory/transfer",
            json!({ "item_id": item_id, "from": "storage", "to": "bar", "quantity": 5 }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, low) = api
        .get(&format!("/venues/{}/inventory/low-stock", venue))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(low[0]["item"]["name"], "Tonic");
    assert_eq!(low[0]["shortfall"], 1);
}

#[tokio::test]
async fn maintenance_run_reports() {
    let api = Api::start().await;
    let venue = api.venue().await;
    let member = api.user("Mara", None).await;
    api.post(
        "/check-ins",
        json!({ "user_id": member, "venue_id": venue, "amount_total": 10, "amount_cash": 10 }),
    )
    .await;

    let (status, report) = api.post("/maintenance/run", json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["memberships_checked"], 1);
    assert_eq!(report["expired_memberships"], 0);
}

#[tokio::test]
async fn malformed_requests_get_json_errors() {
    let api = Api::start().await;
    let venue = api.venue().await;

    let (status, body) = api
        .post("/employees/verify-pin", json!({ "pin": 1234 }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let (status, body) = api
        .post(
            "/check-ins",
            json!({ "venue_id": venue, "amount_total": 10, "amount_cash": 10 }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]
        .as_str()
        .unwrap_or_default()
        .contains("user_id"));

    let (status, body) = api.get("/venues/not-a-uuid/tier-config").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let (status, body) = api
        .get(&format!("/members/{}/transactions?page=first", uuid::Uuid::new_v4()))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let resp = api
        .http
        .post(format!("{}/users", api.base))
        .body("name=Mara")
        .send()
        .await
        .expect("request");
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = resp.json().await.expect("json body");
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn oversized_bills_are_rejected() {
    let api = Api::start().await;
    let venue = api.venue().await;
    let member = api.user("Mara", None).await;

    let (status, body) = api
        .post(
            "/check-ins",
            json!({
                "user_id": member,
                "venue_id": venue,
                "amount_total": "10000000000000000",
                "amount_cash": 0,
                "amount_points": "10000000000000000"
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let (status, _) = api
        .get(&format!("/members/{}/venues/{}", member, venue))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
