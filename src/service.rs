//! Loyalty service
//!
//! Composes tiers, points, streaks, badges, expiration, PINs and inventory
//! over the [`Store`]. Every mutating call runs in a single transaction, so a
//! failed check-in or redemption leaves no partial state behind.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::badges::{BadgeConfig, BadgeProgress, MemberActivity};
use crate::config::Config;
use crate::error::{LoyaltyError, Result};
use crate::expiration::{ExpirationPolicy, ExpirationState, ExpirationStatus};
use crate::inventory::{
    self, InventoryItem, InventoryLocation, InventoryTransfer, LowStockItem, MovementType,
    StockMovement,
};
use crate::ledger::{
    EntryRefs, HistoryQuery, LedgerEntry, LedgerEntryType, Page, PageRequest, VenueMembership,
};
use crate::money::{Money, Multiplier, Points};
use crate::pin::{self, PinCheck};
use crate::points::{
    EarningMultipliers, OrderItem, PointsBreakdown, PointsCalculator, VenueMargins,
    REFERRAL_LEVELS,
};
use crate::storage::{
    CheckInRecord, Employee, LeaderboardEntry, Redemption, Repo, Reward, Store, User, Venue,
};
use crate::streaks::StreakMilestone;
use crate::tiers::{
    MembershipTier, TierChange, TierChangeReason, TierProgress, VenueTierConfig,
    MONTHLY_WINDOW_DAYS,
};

/// Largest rounding gap accepted between cash + points and the total
const AMOUNT_TOLERANCE: Money = Money::from_hundredths(1);

/// Largest bill a single check-in may carry
pub const MAX_BILL_AMOUNT: Money = Money::from_whole(1_000_000);

const DEFAULT_REWARD_VALID_DAYS: u32 = 30;
const MAX_LEADERBOARD: u32 = 100;

// ============================================================================
// REQUESTS AND OUTCOMES
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub name: String,
    #[serde(default)]
    pub referrer_id: Option<Uuid>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewVenue {
    pub name: String,
    #[serde(default)]
    pub points_multiplier: Option<Multiplier>,
    #[serde(default)]
    pub margins: Option<VenueMargins>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckInMethod {
    Nfc,
    Qr,
    #[default]
    Manual,
}

impl CheckInMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            CheckInMethod::Nfc => "nfc",
            CheckInMethod::Qr => "qr",
            CheckInMethod::Manual => "manual",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckInRequest {
    pub user_id: Uuid,
    pub venue_id: Uuid,
    #[serde(default)]
    pub method: CheckInMethod,
    #[serde(default)]
    pub amount_total: Money,
    #[serde(default)]
    pub amount_cash: Money,
    /// Euro value paid with points
    #[serde(default)]
    pub amount_points: Money,
    #[serde(default)]
    pub items: Vec<OrderItem>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReferralPayout {
    pub referrer_id: Uuid,
    pub level: u32,
    pub points: Points,
}

#[derive(Debug, Clone, Serialize)]
pub struct EarnedBadge {
    pub badge_id: Uuid,
    pub name: String,
    pub points_reward: Points,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckInOutcome {
    pub check_in: CheckInRecord,
    pub breakdown: PointsBreakdown,
    pub points_spent: Points,
    pub points_earned: Points,
    pub streak_bonus: Points,
    pub badges_earned: Vec<EarnedBadge>,
    pub referral_payouts: Vec<ReferralPayout>,
    pub tier_changes: Vec<TierChange>,
    pub membership: VenueMembership,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewReward {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub points_cost: Points,
    #[serde(default)]
    pub stock: Option<i64>,
    #[serde(default)]
    pub valid_days: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RedemptionOutcome {
    pub redemption: Redemption,
    pub points_balance: Points,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewBadge {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub required_visits: Option<u32>,
    #[serde(default)]
    pub required_spending: Option<Money>,
    #[serde(default)]
    pub required_referrals: Option<u32>,
    #[serde(default)]
    pub required_days: Option<u32>,
    #[serde(default)]
    pub points_reward: Points,
    #[serde(default)]
    pub bonus_multiplier: Option<Multiplier>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewEmployee {
    pub venue_id: Uuid,
    pub name: String,
    #[serde(default = "default_role")]
    pub role: String,
    #[serde(default)]
    pub pin: Option<String>,
}

fn default_role() -> String {
    "staff".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewInventoryItem {
    pub name: String,
    #[serde(default)]
    pub category: String,
    #[serde(default = "default_unit")]
    pub unit: String,
    #[serde(default)]
    pub storage_quantity: i64,
    #[serde(default)]
    pub bar_quantity: i64,
    #[serde(default)]
    pub min_stock_level: i64,
}

fn default_unit() -> String {
    "units".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransferRequest {
    pub item_id: Uuid,
    pub from: InventoryLocation,
    pub to: InventoryLocation,
    pub quantity: i64,
    #[serde(default)]
    pub employee_id: Option<Uuid>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransferOutcome {
    pub transfer: InventoryTransfer,
    pub item: InventoryItem,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MovementRequest {
    pub item_id: Uuid,
    pub movement_type: MovementType,
    #[serde(default)]
    pub location: Option<InventoryLocation>,
    pub quantity: i64,
    #[serde(default)]
    pub employee_id: Option<Uuid>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MovementOutcome {
    pub movement: StockMovement,
    pub item: InventoryItem,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MaintenanceReport {
    pub memberships_checked: u32,
    pub expired_memberships: u32,
    pub points_expired: Points,
    pub downgrades: u32,
    pub resets: u32,
    pub tier_changes: Vec<TierChange>,
}

// ============================================================================
// SERVICE
// ============================================================================

pub struct LoyaltyService {
    store: Store,
    calculator: PointsCalculator,
    milestones: Vec<StreakMilestone>,
    expiration: ExpirationPolicy,
    pin_salt: String,
}

impl LoyaltyService {
    pub fn new(store: Store, config: &Config) -> Self {
        Self {
            store,
            calculator: config.points.calculator(),
            milestones: config.streaks.milestones.clone(),
            expiration: config.expiration,
            pin_salt: config.pin.salt.clone(),
        }
    }

    pub fn expiration_policy(&self) -> ExpirationPolicy {
        self.expiration
    }

    pub fn calculator(&self) -> PointsCalculator {
        self.calculator
    }

    pub fn streak_milestones(&self) -> &[StreakMilestone] {
        &self.milestones
    }

    // ---- users and venues ----

    /// Register a user, linking up to five referrers above them
    pub fn register_user(&self, request: NewUser, now: DateTime<Utc>) -> Result<User> {
        let name = request.name.trim();
        if name.is_empty() {
            return Err(LoyaltyError::validation("name is required"));
        }

        self.store.write(|repo| {
            let mut chain = Vec::new();
            if let Some(referrer_id) = request.referrer_id {
                repo.require_user(referrer_id)?;
                chain.push(referrer_id);
                chain.extend(repo.referral_chain(referrer_id)?);
                chain.truncate(REFERRAL_LEVELS);
            }

            let user = User {
                id: Uuid::new_v4(),
                name: name.to_string(),
                referred_by: request.referrer_id,
                created_at: now,
            };
            repo.insert_user(&user)?;
            for (i, referrer_id) in chain.iter().enumerate() {
                repo.insert_referral_link(user.id, i as u32 + 1, *referrer_id)?;
            }

            info!(
                "Registered user {} ({} referral levels)",
                user.id,
                chain.len()
            );
            Ok(user)
        })
    }

    pub fn create_venue(&self, request: NewVenue, now: DateTime<Utc>) -> Result<Venue> {
        let name = request.name.trim();
        if name.is_empty() {
            return Err(LoyaltyError::validation("venue name is required"));
        }
        let points_multiplier = request.points_multiplier.unwrap_or(Multiplier::ONE);
        if !points_multiplier.is_positive() {
            return Err(LoyaltyError::validation("points multiplier must be positive"));
        }
        let margins = request.margins.unwrap_or_default();
        if !margins.is_valid() {
            return Err(LoyaltyError::validation("margins must be between 0 and 100"));
        }

        self.store.write(|repo| {
            let venue = Venue {
                id: Uuid::new_v4(),
                name: name.to_string(),
                is_active: true,
                points_multiplier,
                margins,
                total_check_ins: 0,
                total_revenue: Money::ZERO,
                total_points_issued: Points::ZERO,
                created_at: now,
            };
            repo.insert_venue(&venue)?;
            repo.save_tier_config(&VenueTierConfig::default_for(venue.id), now)?;
            info!("Created venue {} ({})", venue.name, venue.id);
            Ok(venue)
        })
    }

    pub fn venue(&self, venue_id: Uuid) -> Result<Venue> {
        self.store.read(|repo| repo.require_venue(venue_id))
    }

    pub fn venue_tier_config(&self, venue_id: Uuid) -> Result<VenueTierConfig> {
        self.store.read(|repo| {
            repo.require_venue(venue_id)?;
            load_tier_config(repo, venue_id)
        })
    }

    pub fn update_tier_config(
        &self,
        venue_id: Uuid,
        mut config: VenueTierConfig,
        now: DateTime<Utc>,
    ) -> Result<VenueTierConfig> {
        config.venue_id = venue_id;
        config.validate()?;
        self.store.write(|repo| {
            repo.require_venue(venue_id)?;
            repo.save_tier_config(&config, now)?;
            info!("Updated tier configuration for venue {}", venue_id);
            Ok(config)
        })
    }

    // ---- check-ins ----

    pub fn check_in(&self, request: CheckInRequest, now: DateTime<Utc>) -> Result<CheckInOutcome> {
        validate_amounts(&request)?;

        self.store.write(|repo| {
            let venue = repo.require_venue(request.venue_id)?;
            if !venue.is_active {
                return Err(LoyaltyError::validation(format!(
                    "{} is not accepting check-ins",
                    venue.name
                )));
            }
            let user = repo.require_user(request.user_id)?;
            let config = load_tier_config(repo, venue.id)?;
            let badges = repo.venue_badges(venue.id)?;
            let held: HashMap<Uuid, DateTime<Utc>> =
                repo.earned_badges(user.id, venue.id)?.into_iter().collect();

            let mut membership = repo
                .get_membership(user.id, venue.id)?
                .unwrap_or_else(|| VenueMembership::new(user.id, venue.id, now));
            let check_in_id = Uuid::new_v4();
            let refs = EntryRefs {
                check_in_id: Some(check_in_id),
                ..Default::default()
            };
            let mut entries: Vec<LedgerEntry> = Vec::new();
            let mut tier_changes = Vec::new();

            if let Some(change) = apply_period_reset(&config, &mut membership, now) {
                tier_changes.push(change);
            }

            let points_spent = Points::from_money(request.amount_points)
                .ok_or_else(|| LoyaltyError::validation("amount_points is too large"))?;
            if points_spent.is_positive() {
                entries.push(membership.post(
                    LedgerEntryType::Spend,
                    -points_spent,
                    format!("Paid {} EUR with points at {}", request.amount_points, venue.name),
                    refs,
                    now,
                )?);
            }

            let multipliers = EarningMultipliers {
                venue: venue.points_multiplier,
                tier: config.multiplier(membership.tier),
                badge: best_badge_multiplier(&badges, &held),
            };
            let breakdown = self.calculator.calculate_order(
                &venue.margins,
                &request.items,
                request.amount_total,
                request.amount_cash,
                multipliers,
            )?;
            if breakdown.total.is_positive() {
                entries.push(membership.post(
                    LedgerEntryType::Earn,
                    breakdown.total,
                    format!("Purchase at {}", venue.name),
                    refs,
                    now,
                )?);
            }

            let mut streak = membership.streak();
            let update = streak.record_visit(now, &self.milestones);
            membership.set_streak(streak);
            if update.new_visit_day {
                membership.total_visits += 1;
            }
            if update.bonus.is_positive() {
                entries.push(membership.post(
                    LedgerEntryType::StreakBonus,
                    update.bonus,
                    format!("{}-day visit streak", membership.current_streak),
                    refs,
                    now,
                )?);
                info!(
                    "User {} reached a {}-day streak at {}",
                    user.id, membership.current_streak, venue.name
                );
            }

            membership.total_spent += request.amount_total;
            membership.qualifying_spend += request.amount_total;
            membership.last_activity_at = now;

            let reached = config.tier_for(membership.qualifying_spend);
            if reached > membership.tier {
                let change = TierChange {
                    user_id: user.id,
                    venue_id: venue.id,
                    from: membership.tier,
                    to: reached,
                    reason: TierChangeReason::Spending,
                };
                info!(
                    "User {} upgraded from {} to {} at {}",
                    user.id, change.from, change.to, venue.name
                );
                membership.tier = reached;
                membership.tier_since = now;
                tier_changes.push(change);
            }

            let record = CheckInRecord {
                id: check_in_id,
                user_id: user.id,
                venue_id: venue.id,
                method: request.method.as_str().to_string(),
                amount_total: request.amount_total,
                amount_cash: request.amount_cash,
                amount_points: request.amount_points,
                points_spent,
                points_earned: breakdown.total,
                new_visit_day: update.new_visit_day,
                created_at: now,
            };
            repo.insert_check_in(&record, &serde_json::to_string(&breakdown)?)?;

            let activity = MemberActivity {
                total_visits: membership.total_visits,
                total_spent: membership.total_spent,
                referrals: repo.direct_referrals(user.id)?,
                visit_times: repo.visit_times(user.id, venue.id)?,
            };
            let mut badges_earned = Vec::new();
            for badge in badges
                .iter()
                .filter(|b| b.is_active && !held.contains_key(&b.id))
            {
                if !badge.evaluate(&activity, now).earned {
                    continue;
                }
                if !repo.award_badge(user.id, badge.id, venue.id, now)? {
                    continue;
                }
                if badge.points_reward.is_positive() {
                    entries.push(membership.post(
                        LedgerEntryType::BadgeBonus,
                        badge.points_reward,
                        format!("Badge earned: {}", badge.name),
                        refs,
                        now,
                    )?);
                }
                info!("User {} earned badge {} at {}", user.id, badge.name, venue.name);
                badges_earned.push(EarnedBadge {
                    badge_id: badge.id,
                    name: badge.name.clone(),
                    points_reward: badge.points_reward,
                });
            }

            repo.save_membership(&membership)?;
            for entry in &entries {
                repo.insert_ledger_entry(entry)?;
            }

            let referral_payouts =
                self.pay_referrals(repo, &venue, user.id, breakdown.total, check_in_id, now)?;

            let issued: Points = entries
                .iter()
                .filter(|e| e.entry_type.is_credit())
                .map(|e| e.amount)
                .chain(referral_payouts.iter().map(|p| p.points))
                .sum();
            repo.add_venue_stats(venue.id, request.amount_total, issued)?;

            info!(
                "Check-in {} by {} at {}: spent {}, earned {}, balance {}",
                check_in_id,
                user.id,
                venue.name,
                points_spent,
                breakdown.total,
                membership.points_balance
            );

            Ok(CheckInOutcome {
                check_in: record,
                points_earned: breakdown.total,
                breakdown,
                points_spent,
                streak_bonus: update.bonus,
                badges_earned,
                referral_payouts,
                tier_changes,
                membership,
            })
        })
    }

    /// Credit every referrer above `user_id` with their share at this venue
    fn pay_referrals(
        &self,
        repo: &Repo<'_>,
        venue: &Venue,
        user_id: Uuid,
        points_earned: Points,
        check_in_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<ReferralPayout>> {
        let reward = self.calculator.referral_reward(points_earned);
        if !reward.is_positive() {
            return Ok(Vec::new());
        }

        let mut payouts = Vec::new();
        for (i, referrer_id) in repo.referral_chain(user_id)?.into_iter().enumerate() {
            let level = i as u32 + 1;
            let mut membership = repo
                .get_membership(referrer_id, venue.id)?
                .unwrap_or_else(|| VenueMembership::new(referrer_id, venue.id, now));
            let entry = membership.post(
                LedgerEntryType::ReferralBonus,
                reward,
                format!("Level {} referral bonus at {}", level, venue.name),
                EntryRefs {
                    check_in_id: Some(check_in_id),
                    related_user_id: Some(user_id),
                    ..Default::default()
                },
                now,
            )?;
            repo.save_membership(&membership)?;
            repo.insert_ledger_entry(&entry)?;
            debug!(
                "Referral level {} paid {} points to {}",
                level, reward, referrer_id
            );
            payouts.push(ReferralPayout {
                referrer_id,
                level,
                points: reward,
            });
        }
        Ok(payouts)
    }

    // ---- membership views ----

    pub fn membership(&self, user_id: Uuid, venue_id: Uuid) -> Result<VenueMembership> {
        self.store
            .read(|repo| require_membership(repo, user_id, venue_id))
    }

    pub fn tier_progress(
        &self,
        user_id: Uuid,
        venue_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<TierProgress> {
        self.store.read(|repo| {
            let m = require_membership(repo, user_id, venue_id)?;
            let config = load_tier_config(repo, venue_id)?;
            Ok(config.progress(m.tier, m.qualifying_spend, m.tier_since, now))
        })
    }

    pub fn expiration_status(
        &self,
        user_id: Uuid,
        venue_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<ExpirationStatus> {
        self.store.read(|repo| {
            let m = require_membership(repo, user_id, venue_id)?;
            Ok(self.expiration.status(m.points_balance, m.last_activity_at, now))
        })
    }

    pub fn transactions(&self, user_id: Uuid, query: &HistoryQuery) -> Result<Page<LedgerEntry>> {
        let page = PageRequest::new(query.page, query.per_page)?;
        self.store.read(|repo| {
            repo.require_user(user_id)?;
            let (entries, total) = repo.ledger_page(user_id, query, page)?;
            Ok(Page::new(entries, page, total))
        })
    }

    pub fn leaderboard(&self, venue_id: Uuid, limit: u32) -> Result<Vec<LeaderboardEntry>> {
        let limit = limit.clamp(1, MAX_LEADERBOARD);
        self.store.read(|repo| {
            repo.require_venue(venue_id)?;
            repo.leaderboard(venue_id, limit)
        })
    }

    // ---- rewards ----

    pub fn create_reward(
        &self,
        venue_id: Uuid,
        request: NewReward,
        now: DateTime<Utc>,
    ) -> Result<Reward> {
        if request.name.trim().is_empty() {
            return Err(LoyaltyError::validation("reward name is required"));
        }
        if !request.points_cost.is_positive() {
            return Err(LoyaltyError::validation("points_cost must be positive"));
        }
        if matches!(request.stock, Some(s) if s < 0) {
            return Err(LoyaltyError::validation("stock must not be negative"));
        }
        let valid_days = request.valid_days.unwrap_or(DEFAULT_REWARD_VALID_DAYS);
        if valid_days == 0 {
            return Err(LoyaltyError::validation("valid_days must be positive"));
        }

        self.store.write(|repo| {
            repo.require_venue(venue_id)?;
            let reward = Reward {
                id: Uuid::new_v4(),
                venue_id,
                name: request.name.trim().to_string(),
                description: request.description,
                points_cost: request.points_cost,
                stock: request.stock,
                is_active: true,
                valid_days,
                created_at: now,
            };
            repo.insert_reward(&reward)?;
            info!("Created reward {} at venue {}", reward.name, venue_id);
            Ok(reward)
        })
    }

    pub fn redeem_reward(
        &self,
        user_id: Uuid,
        reward_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<RedemptionOutcome> {
        self.store.write(|repo| {
            repo.require_user(user_id)?;
            let reward = repo
                .get_reward(reward_id)?
                .ok_or_else(|| LoyaltyError::not_found(format!("Reward {}", reward_id)))?;
            if !reward.is_active {
                return Err(LoyaltyError::validation(format!(
                    "{} is no longer available",
                    reward.name
                )));
            }
            if reward.stock == Some(0) {
                return Err(LoyaltyError::Conflict(format!("{} is out of stock", reward.name)));
            }

            let mut membership = repo
                .get_membership(user_id, reward.venue_id)?
                .unwrap_or_else(|| VenueMembership::new(user_id, reward.venue_id, now));
            let entry = membership.post(
                LedgerEntryType::Redeem,
                -reward.points_cost,
                format!("Redeemed {}", reward.name),
                EntryRefs {
                    reward_id: Some(reward.id),
                    ..Default::default()
                },
                now,
            )?;
            membership.last_activity_at = now;
            repo.save_membership(&membership)?;
            repo.insert_ledger_entry(&entry)?;

            if let Some(stock) = reward.stock {
                repo.set_reward_stock(reward.id, Some(stock - 1))?;
            }

            let redemption = Redemption {
                id: Uuid::new_v4(),
                reward_id: reward.id,
                user_id,
                venue_id: reward.venue_id,
                points_spent: reward.points_cost,
                code: redemption_code(),
                status: "pending".to_string(),
                expires_at: now + Duration::days(reward.valid_days as i64),
                created_at: now,
            };
            repo.insert_redemption(&redemption)?;

            info!(
                "User {} redeemed {} for {} points (code {})",
                user_id, reward.name, reward.points_cost, redemption.code
            );
            Ok(RedemptionOutcome {
                redemption,
                points_balance: membership.points_balance,
            })
        })
    }

    // ---- badges ----

    pub fn create_badge(
        &self,
        venue_id: Uuid,
        request: NewBadge,
        now: DateTime<Utc>,
    ) -> Result<BadgeConfig> {
        let badge = BadgeConfig {
            id: Uuid::new_v4(),
            venue_id,
            name: request.name.trim().to_string(),
            description: request.description,
            required_visits: request.required_visits,
            required_spending: request.required_spending,
            required_referrals: request.required_referrals,
            required_days: request.required_days,
            points_reward: request.points_reward,
            bonus_multiplier: request.bonus_multiplier,
            is_active: true,
        };
        badge.validate()?;

        self.store.write(|repo| {
            repo.require_venue(venue_id)?;
            repo.insert_badge(&badge, now)?;
            info!("Created badge {} at venue {}", badge.name, venue_id);
            Ok(badge)
        })
    }

    pub fn badge_progress(
        &self,
        user_id: Uuid,
        venue_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<BadgeProgress>> {
        self.store.read(|repo| {
            let m = require_membership(repo, user_id, venue_id)?;
            let held: HashMap<Uuid, DateTime<Utc>> =
                repo.earned_badges(user_id, venue_id)?.into_iter().collect();
            let activity = MemberActivity {
                total_visits: m.total_visits,
                total_spent: m.total_spent,
                referrals: repo.direct_referrals(user_id)?,
                visit_times: repo.visit_times(user_id, venue_id)?,
            };

            Ok(repo
                .venue_badges(venue_id)?
                .into_iter()
                .filter(|b| b.is_active || held.contains_key(&b.id))
                .map(|b| match held.get(&b.id) {
                    Some(earned_at) => BadgeProgress {
                        badge_id: b.id,
                        name: b.name,
                        earned: true,
                        progress: 1.0,
                        earned_at: Some(*earned_at),
                    },
                    None => {
                        let eval = b.evaluate(&activity, now);
                        BadgeProgress {
                            badge_id: b.id,
                            name: b.name,
                            earned: false,
                            progress: eval.progress,
                            earned_at: None,
                        }
                    }
                })
                .collect())
        })
    }

    // ---- maintenance ----

    /// Expire stale balances, then apply reset policies and downgrades
    pub fn run_maintenance(&self, now: DateTime<Utc>) -> Result<MaintenanceReport> {
        let report = self.store.write(|repo| {
            let mut configs: HashMap<Uuid, VenueTierConfig> = HashMap::new();
            let mut report = MaintenanceReport::default();

            for mut m in repo.all_memberships()? {
                report.memberships_checked += 1;
                let mut changed = false;

                let status = self
                    .expiration
                    .status(m.points_balance, m.last_activity_at, now);
                if status.state == ExpirationState::Expired {
                    let expired = m.points_balance;
                    let entry = m.post(
                        LedgerEntryType::Expire,
                        -expired,
                        format!(
                            "Points expired after {} days without activity",
                            self.expiration.inactivity_days
                        ),
                        EntryRefs::default(),
                        now,
                    )?;
                    repo.insert_ledger_entry(&entry)?;
                    report.expired_memberships += 1;
                    report.points_expired += expired;
                    changed = true;
                    info!(
                        "Expired {} points of user {} at venue {}",
                        expired, m.user_id, m.venue_id
                    );
                }

                let config = match configs.entry(m.venue_id) {
                    Entry::Occupied(e) => e.into_mut(),
                    Entry::Vacant(e) => e.insert(load_tier_config(repo, m.venue_id)?),
                };

                if config.maintenance.reset_policy.reset_due(m.tier_since, now) {
                    let had_progress = m.tier != MembershipTier::Bronze
                        || m.qualifying_spend.is_positive();
                    if let Some(change) = apply_period_reset(config, &mut m, now) {
                        report.tier_changes.push(change);
                    }
                    if had_progress {
                        report.resets += 1;
                    }
                    changed = true;
                } else {
                    let recent = repo.spend_since(
                        m.user_id,
                        m.venue_id,
                        now - Duration::days(MONTHLY_WINDOW_DAYS),
                    )?;
                    if let Some(downgrade) =
                        config.check_maintenance(m.tier, m.tier_since, m.last_visit_at, recent, now)
                    {
                        info!(
                            "Downgrading user {} at venue {} from {} to {}: {}",
                            m.user_id, m.venue_id, m.tier, downgrade.to, downgrade.detail
                        );
                        report.tier_changes.push(TierChange {
                            user_id: m.user_id,
                            venue_id: m.venue_id,
                            from: m.tier,
                            to: downgrade.to,
                            reason: downgrade.reason,
                        });
                        report.downgrades += 1;
                        m.tier = downgrade.to;
                        m.tier_since = now;
                        m.qualifying_spend = m.qualifying_spend.min(config.minimum(downgrade.to));
                        changed = true;
                    }
                }

                if changed {
                    repo.save_membership(&m)?;
                }
            }

            Ok(report)
        })?;

        info!(
            "Maintenance: {} memberships checked, {} expired ({} points), {} downgrades, {} resets",
            report.memberships_checked,
            report.expired_memberships,
            report.points_expired,
            report.downgrades,
            report.resets
        );
        Ok(report)
    }

    // ---- employees ----

    pub fn create_employee(&self, request: NewEmployee, now: DateTime<Utc>) -> Result<Employee> {
        if request.name.trim().is_empty() {
            return Err(LoyaltyError::validation("employee name is required"));
        }
        let pin_hash = match request.pin.as_deref() {
            Some(p) if !pin::is_valid_pin(p) => {
                return Err(LoyaltyError::validation("PIN must be 4 digits"));
            }
            Some(p) => Some(pin::hash_pin(p, &self.pin_salt)),
            None => None,
        };

        self.store.write(|repo| {
            repo.require_venue(request.venue_id)?;
            let employee = Employee {
                id: Uuid::new_v4(),
                venue_id: request.venue_id,
                name: request.name.trim().to_string(),
                role: request.role,
                is_active: true,
                pin_hash,
                created_at: now,
            };
            repo.insert_employee(&employee)?;
            info!("Created employee {} at venue {}", employee.id, employee.venue_id);
            Ok(employee)
        })
    }

    pub fn set_pin(&self, employee_id: Uuid, new_pin: &str) -> Result<()> {
        if !pin::is_valid_pin(new_pin) {
            return Err(LoyaltyError::validation("PIN must be 4 digits"));
        }
        let hash = pin::hash_pin(new_pin, &self.pin_salt);
        self.store.write(|repo| {
            repo.get_employee(employee_id)?
                .ok_or_else(|| LoyaltyError::not_found("Employee"))?;
            repo.set_pin_hash(employee_id, &hash)?;
            info!("PIN updated for employee {}", employee_id);
            Ok(())
        })
    }

    /// Check an employee PIN; legacy plaintext PINs are rehashed on success
    pub fn verify_pin(&self, employee_id: Uuid, candidate: &str) -> Result<Employee> {
        if !pin::is_valid_pin(candidate) {
            return Err(LoyaltyError::validation("PIN must be 4 digits"));
        }

        self.store.write(|repo| {
            let employee = repo
                .get_employee(employee_id)?
                .ok_or_else(|| LoyaltyError::not_found("Employee"))?;
            if !employee.is_active {
                warn!("PIN attempt for inactive employee {}", employee_id);
                return Err(LoyaltyError::Forbidden("Employee is inactive".to_string()));
            }
            let Some(stored) = employee.pin_hash.as_deref() else {
                warn!("PIN attempt for employee {} without a PIN", employee_id);
                return Err(LoyaltyError::Unauthorized("Invalid PIN".to_string()));
            };

            match pin::check_pin(stored, candidate, &self.pin_salt) {
                PinCheck::Invalid => {
                    warn!("Failed PIN attempt for employee {}", employee_id);
                    Err(LoyaltyError::Unauthorized("Invalid PIN".to_string()))
                }
                PinCheck::Valid { upgraded_hash } => {
                    if let Some(hash) = upgraded_hash {
                        repo.set_pin_hash(employee_id, &hash)?;
                        info!("Upgraded legacy PIN of employee {} to a hash", employee_id);
                    }
                    debug!("PIN verified for employee {}", employee_id);
                    Ok(employee)
                }
            }
        })
    }

    // ---- inventory ----

    pub fn create_inventory_item(
        &self,
        venue_id: Uuid,
        request: NewInventoryItem,
        now: DateTime<Utc>,
    ) -> Result<InventoryItem> {
        let item = InventoryItem {
            id: Uuid::new_v4(),
            venue_id,
            name: request.name.trim().to_string(),
            category: request.category,
            unit: request.unit,
            storage_quantity: request.storage_quantity,
            bar_quantity: request.bar_quantity,
            min_stock_level: request.min_stock_level,
            updated_at: now,
        };
        item.validate()?;

        self.store.write(|repo| {
            repo.require_venue(venue_id)?;
            repo.insert_item(&item)?;
            info!("Added inventory item {} at venue {}", item.name, venue_id);
            Ok(item)
        })
    }

    pub fn transfer_inventory(
        &self,
        request: TransferRequest,
        now: DateTime<Utc>,
    ) -> Result<TransferOutcome> {
        self.store.write(|repo| {
            let mut item = require_item(repo, request.item_id)?;
            item.transfer(request.from, request.to, request.quantity)?;
            item.updated_at = now;
            repo.update_item_quantities(&item)?;

            let transfer = InventoryTransfer {
                id: Uuid::new_v4(),
                item_id: item.id,
                from_location: request.from,
                to_location: request.to,
                quantity: request.quantity,
                employee_id: request.employee_id,
                notes: request.notes,
                created_at: now,
            };
            repo.insert_transfer(&transfer)?;

            info!(
                "Moved {} {} of {} from {} to {}",
                transfer.quantity, item.unit, item.name, transfer.from_location, transfer.to_location
            );
            if item.is_low_stock() {
                warn!(
                    "{} is below its minimum stock ({} < {})",
                    item.name,
                    item.total_quantity(),
                    item.min_stock_level
                );
            }
            Ok(TransferOutcome { transfer, item })
        })
    }

    pub fn record_movement(
        &self,
        request: MovementRequest,
        now: DateTime<Utc>,
    ) -> Result<MovementOutcome> {
        self.store.write(|repo| {
            let mut item = require_item(repo, request.item_id)?;
            let (location, quantity_change, quantity_after) =
                item.apply_movement(request.movement_type, request.location, request.quantity)?;
            item.updated_at = now;
            repo.update_item_quantities(&item)?;

            let movement = StockMovement {
                id: Uuid::new_v4(),
                item_id: item.id,
                movement_type: request.movement_type,
                location,
                quantity_change,
                quantity_after,
                employee_id: request.employee_id,
                notes: request.notes,
                created_at: now,
            };
            repo.insert_movement(&movement)?;
            debug!(
                "{} {} of {} at {}",
                movement.movement_type.as_str(),
                quantity_change,
                item.name,
                location
            );
            Ok(MovementOutcome { movement, item })
        })
    }

    pub fn low_stock(&self, venue_id: Uuid) -> Result<Vec<LowStockItem>> {
        self.store.read(|repo| {
            repo.require_venue(venue_id)?;
            Ok(inventory::low_stock(repo.venue_items(venue_id)?))
        })
    }
}

// ============================================================================
// HELPERS
// ============================================================================

fn load_tier_config(repo: &Repo<'_>, venue_id: Uuid) -> Result<VenueTierConfig> {
    Ok(repo
        .get_tier_config(venue_id)?
        .unwrap_or_else(|| VenueTierConfig::default_for(venue_id)))
}

fn require_membership(repo: &Repo<'_>, user_id: Uuid, venue_id: Uuid) -> Result<VenueMembership> {
    repo.get_membership(user_id, venue_id)?
        .ok_or_else(|| LoyaltyError::not_found("Membership"))
}

fn require_item(repo: &Repo<'_>, item_id: Uuid) -> Result<InventoryItem> {
    repo.get_item(item_id)?
        .ok_or_else(|| LoyaltyError::not_found(format!("Inventory item {}", item_id)))
}

/// Drop the member back to Bronze when a reset period has started since
/// their last tier change
fn apply_period_reset(
    config: &VenueTierConfig,
    m: &mut VenueMembership,
    now: DateTime<Utc>,
) -> Option<TierChange> {
    if !config.maintenance.reset_policy.reset_due(m.tier_since, now) {
        return None;
    }
    let from = m.tier;
    m.tier = MembershipTier::Bronze;
    m.tier_since = now;
    m.qualifying_spend = Money::ZERO;

    if from == MembershipTier::Bronze {
        return None;
    }
    info!(
        "Tier period reset for user {} at venue {}: {} -> bronze",
        m.user_id, m.venue_id, from
    );
    Some(TierChange {
        user_id: m.user_id,
        venue_id: m.venue_id,
        from,
        to: MembershipTier::Bronze,
        reason: TierChangeReason::PeriodReset,
    })
}

fn best_badge_multiplier(badges: &[BadgeConfig], held: &HashMap<Uuid, DateTime<Utc>>) -> Multiplier {
    badges
        .iter()
        .filter(|b| b.is_active && held.contains_key(&b.id))
        .filter_map(|b| b.bonus_multiplier)
        .fold(Multiplier::ONE, Multiplier::max)
}

fn redemption_code() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_ascii_uppercase()
}

fn validate_amounts(request: &CheckInRequest) -> Result<()> {
    let (total, cash, points) = (
        request.amount_total,
        request.amount_cash,
        request.amount_points,
    );
    if total.is_negative() || cash.is_negative() || points.is_negative() {
        return Err(LoyaltyError::validation("amounts must not be negative"));
    }
    if [total, cash, points].iter().any(|a| *a > MAX_BILL_AMOUNT) {
        return Err(LoyaltyError::validation(format!(
            "amounts must not exceed {}",
            MAX_BILL_AMOUNT
        )));
    }

    // Visit without a purchase
    if total.is_zero() && cash.is_zero() && points.is_zero() {
        if !request.items.is_empty() {
            return Err(LoyaltyError::validation("items need an amount_total"));
        }
        return Ok(());
    }

    if !total.is_positive() {
        return Err(LoyaltyError::validation("amount_total must be positive"));
    }
    if (cash + points - total).abs() > AMOUNT_TOLERANCE {
        return Err(LoyaltyError::validation(format!(
            "cash ({}) + points ({}) must equal total ({})",
            cash, points, total
        )));
    }

    if !request.items.is_empty() {
        if request
            .items
            .iter()
            .any(|i| i.quantity == 0 || i.price.is_negative())
        {
            return Err(LoyaltyError::validation(
                "items need a positive quantity and a non-negative price",
            ));
        }
        let items_total = request
            .items
            .iter()
            .try_fold(Money::ZERO, |acc, item| acc.checked_add(item.subtotal()?))
            .ok_or_else(|| LoyaltyError::validation("item amounts are too large"))?;
        if (items_total - total).abs() > AMOUNT_TOLERANCE {
            return Err(LoyaltyError::validation(format!(
                "items add up to {} but amount_total is {}",
                items_total, total
            )));
        }
    }

    Ok(())
}
