//! Loyalty HTTP server
//!
//! JSON API used by the member app, the staff tablets and the owner PWA.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        FromRequest, FromRequestParts, Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tracing::{error, info};
use uuid::Uuid;

use crate::badges::{BadgeConfig, BadgeProgress};
use crate::config::{Config, MaintenanceConfig};
use crate::error::LoyaltyError;
use crate::expiration::{ExpirationPolicy, ExpirationStatus};
use crate::inventory::{InventoryItem, LowStockItem};
use crate::ledger::{HistoryQuery, LedgerEntry, Page, VenueMembership};
use crate::money::Percent;
use crate::service::{
    CheckInOutcome, CheckInRequest, LoyaltyService, MaintenanceReport, MovementOutcome,
    MovementRequest, NewBadge, NewEmployee, NewInventoryItem, NewReward, NewUser, NewVenue,
    RedemptionOutcome, TransferOutcome, TransferRequest,
};
use crate::storage::{Employee, LeaderboardEntry, Reward, User, Venue};
use crate::streaks::StreakMilestone;
use crate::tiers::{TierProgress, VenueTierConfig};

pub struct AppState {
    pub service: Arc<LoyaltyService>,
    pub config: Config,
    pub started_at: std::time::Instant,
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/config", get(config_handler))
        .route("/users", post(register_user_handler))
        .route("/venues", post(create_venue_handler))
        .route(
            "/venues/:venue_id/tier-config",
            get(tier_config_handler).put(update_tier_config_handler),
        )
        .route("/venues/:venue_id/leaderboard", get(leaderboard_handler))
        .route("/venues/:venue_id/badges", post(create_badge_handler))
        .route("/venues/:venue_id/rewards", post(create_reward_handler))
        .route("/venues/:venue_id/inventory", post(create_item_handler))
        .route("/venues/:venue_id/inventory/low-stock", get(low_stock_handler))
        .route("/check-ins", post(check_in_handler))
        .route("/members/:user_id/venues/:venue_id", get(membership_handler))
        .route(
            "/members/:user_id/venues/:venue_id/progress",
            get(progress_handler),
        )
        .route(
            "/members/:user_id/venues/:venue_id/expiration",
            get(expiration_handler),
        )
        .route(
            "/members/:user_id/venues/:venue_id/badges",
            get(badge_progress_handler),
        )
        .route("/members/:user_id/transactions", get(transactions_handler))
        .route("/rewards/:reward_id/redeem", post(redeem_handler))
        .route("/employees", post(create_employee_handler))
        .route("/employees/verify-pin", post(verify_pin_handler))
        .route("/employees/set-pin", post(set_pin_handler))
        .route("/inventory/transfer", post(transfer_handler))
        .route("/inventory/movements", post(movement_handler))
        .route("/maintenance/run", post(maintenance_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ============================================================================
// ERRORS
// ============================================================================

pub struct ApiError(LoyaltyError);

impl From<LoyaltyError> for ApiError {
    fn from(e: LoyaltyError) -> Self {
        Self(e)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            LoyaltyError::Validation(_) | LoyaltyError::InsufficientPoints { .. } => {
                StatusCode::BAD_REQUEST
            }
            LoyaltyError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            LoyaltyError::Forbidden(_) => StatusCode::FORBIDDEN,
            LoyaltyError::NotFound(_) => StatusCode::NOT_FOUND,
            LoyaltyError::Conflict(_) => StatusCode::CONFLICT,
            LoyaltyError::Storage(_) | LoyaltyError::Serialization(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!("Request failed: {}", self.0);
            "Internal server error".to_string()
        } else {
            self.0.to_string()
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

macro_rules! rejection_as_validation {
    ($($rejection:ty),*) => {
        $(
            impl From<$rejection> for ApiError {
                fn from(rejection: $rejection) -> Self {
                    Self(LoyaltyError::validation(rejection.body_text()))
                }
            }
        )*
    };
}

rejection_as_validation!(JsonRejection, PathRejection, QueryRejection);

/// `Json` extractor that rejects with the API's JSON error body
#[derive(FromRequest)]
#[from_request(via(Json), rejection(ApiError))]
struct ApiJson<T>(T);

#[derive(FromRequestParts)]
#[from_request(via(Path), rejection(ApiError))]
struct ApiPath<T>(T);

#[derive(FromRequestParts)]
#[from_request(via(Query), rejection(ApiError))]
struct ApiQuery<T>(T);

type ApiResult<T> = Result<Json<T>, ApiError>;
type Created<T> = Result<(StatusCode, Json<T>), ApiError>;

fn created<T>(value: T) -> (StatusCode, Json<T>) {
    (StatusCode::CREATED, Json(value))
}

// ============================================================================
// STATUS
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub healthy: bool,
    pub uptime_secs: u64,
    pub version: String,
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        healthy: true,
        uptime_secs: state.started_at.elapsed().as_secs(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Public view of the running configuration; the PIN salt stays private
#[derive(Debug, Serialize, Deserialize)]
pub struct ConfigResponse {
    pub base_rate_percent: Percent,
    pub referral_share_percent: Percent,
    pub streak_milestones: Vec<StreakMilestone>,
    pub expiration: ExpirationPolicy,
    pub maintenance: MaintenanceConfig,
}

async fn config_handler(State(state): State<Arc<AppState>>) -> Json<ConfigResponse> {
    let calculator = state.service.calculator();
    Json(ConfigResponse {
        base_rate_percent: calculator.base_rate,
        referral_share_percent: calculator.referral_share,
        streak_milestones: state.service.streak_milestones().to_vec(),
        expiration: state.service.expiration_policy(),
        maintenance: state.config.maintenance.clone(),
    })
}

// ============================================================================
// USERS AND VENUES
// ============================================================================

async fn register_user_handler(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<NewUser>,
) -> Created<User> {
    Ok(created(state.service.register_user(request, Utc::now())?))
}

async fn create_venue_handler(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<NewVenue>,
) -> Created<Venue> {
    Ok(created(state.service.create_venue(request, Utc::now())?))
}

async fn tier_config_handler(
    State(state): State<Arc<AppState>>,
    ApiPath(venue_id): ApiPath<Uuid>,
) -> ApiResult<VenueTierConfig> {
    Ok(Json(state.service.venue_tier_config(venue_id)?))
}

async fn update_tier_config_handler(
    State(state): State<Arc<AppState>>,
    ApiPath(venue_id): ApiPath<Uuid>,
    ApiJson(config): ApiJson<VenueTierConfig>,
) -> ApiResult<VenueTierConfig> {
    Ok(Json(
        state
            .service
            .update_tier_config(venue_id, config, Utc::now())?,
    ))
}

#[derive(Debug, Deserialize)]
pub struct LeaderboardQuery {
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LeaderboardResponse {
    pub venue_id: Uuid,
    pub entries: Vec<LeaderboardEntry>,
}

async fn leaderboard_handler(
    State(state): State<Arc<AppState>>,
    ApiPath(venue_id): ApiPath<Uuid>,
    ApiQuery(query): ApiQuery<LeaderboardQuery>,
) -> ApiResult<LeaderboardResponse> {
    let entries = state
        .service
        .leaderboard(venue_id, query.limit.unwrap_or(10))?;
    Ok(Json(LeaderboardResponse { venue_id, entries }))
}

async fn create_badge_handler(
    State(state): State<Arc<AppState>>,
    ApiPath(venue_id): ApiPath<Uuid>,
    ApiJson(request): ApiJson<NewBadge>,
) -> Created<BadgeConfig> {
    Ok(created(
        state.service.create_badge(venue_id, request, Utc::now())?,
    ))
}

async fn create_reward_handler(
    State(state): State<Arc<AppState>>,
    ApiPath(venue_id): ApiPath<Uuid>,
    ApiJson(request): ApiJson<NewReward>,
) -> Created<Reward> {
    Ok(created(
        state.service.create_reward(venue_id, request, Utc::now())?,
    ))
}

// ============================================================================
// CHECK-INS AND MEMBERSHIPS
// ============================================================================

async fn check_in_handler(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<CheckInRequest>,
) -> Created<CheckInOutcome> {
    Ok(created(state.service.check_in(request, Utc::now())?))
}

async fn membership_handler(
    State(state): State<Arc<AppState>>,
    ApiPath((user_id, venue_id)): ApiPath<(Uuid, Uuid)>,
) -> ApiResult<VenueMembership> {
    Ok(Json(state.service.membership(user_id, venue_id)?))
}

async fn progress_handler(
    State(state): State<Arc<AppState>>,
    ApiPath((user_id, venue_id)): ApiPath<(Uuid, Uuid)>,
) -> ApiResult<TierProgress> {
    Ok(Json(
        state
            .service
            .tier_progress(user_id, venue_id, Utc::now())?,
    ))
}

async fn expiration_handler(
    State(state): State<Arc<AppState>>,
    ApiPath((user_id, venue_id)): ApiPath<(Uuid, Uuid)>,
) -> ApiResult<ExpirationStatus> {
    Ok(Json(
        state
            .service
            .expiration_status(user_id, venue_id, Utc::now())?,
    ))
}

async fn badge_progress_handler(
    State(state): State<Arc<AppState>>,
    ApiPath((user_id, venue_id)): ApiPath<(Uuid, Uuid)>,
) -> ApiResult<Vec<BadgeProgress>> {
    Ok(Json(
        state
            .service
            .badge_progress(user_id, venue_id, Utc::now())?,
    ))
}

async fn transactions_handler(
    State(state): State<Arc<AppState>>,
    ApiPath(user_id): ApiPath<Uuid>,
    ApiQuery(query): ApiQuery<HistoryQuery>,
) -> ApiResult<Page<LedgerEntry>> {
    Ok(Json(state.service.transactions(user_id, &query)?))
}

#[derive(Debug, Deserialize)]
pub struct RedeemRequest {
    pub user_id: Uuid,
}

async fn redeem_handler(
    State(state): State<Arc<AppState>>,
    ApiPath(reward_id): ApiPath<Uuid>,
    ApiJson(request): ApiJson<RedeemRequest>,
) -> Created<RedemptionOutcome> {
    Ok(created(state.service.redeem_reward(
        request.user_id,
        reward_id,
        Utc::now(),
    )?))
}

// ============================================================================
// EMPLOYEES
// ============================================================================

async fn create_employee_handler(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<NewEmployee>,
) -> Created<Employee> {
    Ok(created(state.service.create_employee(request, Utc::now())?))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PinRequest {
    pub employee_id: Uuid,
    pub pin: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VerifiedEmployee {
    pub id: Uuid,
    pub name: String,
    pub role: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VerifyPinResponse {
    pub valid: bool,
    pub employee: VerifiedEmployee,
}

async fn verify_pin_handler(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<PinRequest>,
) -> ApiResult<VerifyPinResponse> {
    let employee = state
        .service
        .verify_pin(request.employee_id, &request.pin)?;
    Ok(Json(VerifyPinResponse {
        valid: true,
        employee: VerifiedEmployee {
            id: employee.id,
            name: employee.name,
            role: employee.role,
        },
    }))
}

async fn set_pin_handler(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<PinRequest>,
) -> ApiResult<serde_json::Value> {
    state.service.set_pin(request.employee_id, &request.pin)?;
    Ok(Json(json!({ "success": true })))
}

// ============================================================================
// INVENTORY
// ============================================================================

async fn create_item_handler(
    State(state): State<Arc<AppState>>,
    ApiPath(venue_id): ApiPath<Uuid>,
    ApiJson(request): ApiJson<NewInventoryItem>,
) -> Created<InventoryItem> {
    Ok(created(state.service.create_inventory_item(
        venue_id,
        request,
        Utc::now(),
    )?))
}

async fn transfer_handler(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<TransferRequest>,
) -> Created<TransferOutcome> {
    Ok(created(
        state.service.transfer_inventory(request, Utc::now())?,
    ))
}

async fn movement_handler(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<MovementRequest>,
) -> Created<MovementOutcome> {
    Ok(created(state.service.record_movement(request, Utc::now())?))
}

async fn low_stock_handler(
    State(state): State<Arc<AppState>>,
    ApiPath(venue_id): ApiPath<Uuid>,
) -> ApiResult<Vec<LowStockItem>> {
    Ok(Json(state.service.low_stock(venue_id)?))
}

// ============================================================================
// MAINTENANCE
// ============================================================================

async fn maintenance_handler(State(state): State<Arc<AppState>>) -> ApiResult<MaintenanceReport> {
    Ok(Json(state.service.run_maintenance(Utc::now())?))
}

/// Spawn the periodic sweep: expiration, downgrades and tier resets
pub fn spawn_maintenance(
    service: Arc<LoyaltyService>,
    schedule: &MaintenanceConfig,
) -> tokio::task::JoinHandle<()> {
    let initial_delay = Duration::from_secs(schedule.initial_delay_secs);
    let every = Duration::from_secs(schedule.interval_secs);

    info!(
        "Background maintenance started (every {} seconds)",
        schedule.interval_secs
    );
    tokio::spawn(async move {
        tokio::time::sleep(initial_delay).await;

        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            if let Err(e) = service.run_maintenance(Utc::now()) {
                error!("Maintenance sweep failed: {}", e);
            }
        }
    })
}

/// Run the server
pub async fn run_server(
    host: &str,
    port: u16,
    service: Arc<LoyaltyService>,
    config: Config,
) -> anyhow::Result<()> {
    let state = Arc::new(AppState {
        service,
        config,
        started_at: std::time::Instant::now(),
    });

    let app = create_router(state);
    let addr = format!("{}:{}", host, port);

    info!("Starting loyalty server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(e: LoyaltyError) -> StatusCode {
        ApiError::from(e).status()
    }

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(
            status_of(LoyaltyError::validation("bad")),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(LoyaltyError::InsufficientPoints {
                available: crate::money::Points::ZERO,
                required: crate::money::Points::from_whole(5),
            }),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(LoyaltyError::Unauthorized("Invalid PIN".into())),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            status_of(LoyaltyError::Forbidden("Employee is inactive".into())),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status_of(LoyaltyError::not_found("Venue")),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(LoyaltyError::Conflict("out of stock".into())),
            StatusCode::CONFLICT
        );
    }
}
