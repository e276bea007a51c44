//! Tier configuration and progression
//!
//! Tiers are unlocked by qualifying spend at a venue. Each venue owner can
//! tune the thresholds, multipliers, perks and maintenance rules.
//!
//! Qualifying spend equals lifetime spend until a maintenance rule or a reset
//! policy lowers it. Downgrades clamp it to the new tier's minimum, so the
//! next purchase does not re-promote the member straight away.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{LoyaltyError, Result};
use crate::money::{Money, Multiplier, Points};

/// Window used for the monthly spending requirement
pub const MONTHLY_WINDOW_DAYS: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MembershipTier {
    Bronze,
    Silver,
    Gold,
    Platinum,
}

impl MembershipTier {
    pub const ALL: [MembershipTier; 4] = [
        MembershipTier::Bronze,
        MembershipTier::Silver,
        MembershipTier::Gold,
        MembershipTier::Platinum,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MembershipTier::Bronze => "bronze",
            MembershipTier::Silver => "silver",
            MembershipTier::Gold => "gold",
            MembershipTier::Platinum => "platinum",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            MembershipTier::Bronze => "Bronze",
            MembershipTier::Silver => "Silver",
            MembershipTier::Gold => "Gold",
            MembershipTier::Platinum => "Platinum",
        }
    }

    /// 1 for Bronze up to 4 for Platinum
    pub fn level(self) -> u8 {
        match self {
            MembershipTier::Bronze => 1,
            MembershipTier::Silver => 2,
            MembershipTier::Gold => 3,
            MembershipTier::Platinum => 4,
        }
    }

    pub fn next(self) -> Option<MembershipTier> {
        match self {
            MembershipTier::Bronze => Some(MembershipTier::Silver),
            MembershipTier::Silver => Some(MembershipTier::Gold),
            MembershipTier::Gold => Some(MembershipTier::Platinum),
            MembershipTier::Platinum => None,
        }
    }

    pub fn previous(self) -> Option<MembershipTier> {
        match self {
            MembershipTier::Bronze => None,
            MembershipTier::Silver => Some(MembershipTier::Bronze),
            MembershipTier::Gold => Some(MembershipTier::Silver),
            MembershipTier::Platinum => Some(MembershipTier::Gold),
        }
    }
}

impl fmt::Display for MembershipTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for MembershipTier {
    type Err = LoyaltyError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "bronze" => Ok(MembershipTier::Bronze),
            "silver" => Ok(MembershipTier::Silver),
            "gold" => Ok(MembershipTier::Gold),
            "platinum" => Ok(MembershipTier::Platinum),
            other => Err(LoyaltyError::validation(format!("unknown tier: {}", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierPerk {
    pub name: String,
    pub description: String,
}

impl TierPerk {
    fn new(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TierResetPolicy {
    #[default]
    Never,
    Annually,
    Quarterly,
    Monthly,
}

impl TierResetPolicy {
    /// True when a period boundary lies between `since` and `now`
    pub fn reset_due(self, since: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        if now <= since {
            return false;
        }
        match self {
            TierResetPolicy::Never => false,
            TierResetPolicy::Annually => now.year() > since.year(),
            TierResetPolicy::Quarterly => {
                (now.year(), now.month0() / 3) > (since.year(), since.month0() / 3)
            }
            TierResetPolicy::Monthly => (now.year(), now.month()) > (since.year(), since.month()),
        }
    }
}

/// Requirements and benefits of one tier at a venue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierLevel {
    pub min_spend: Money,
    pub multiplier: Multiplier,
    #[serde(default)]
    pub perks: Vec<TierPerk>,
    #[serde(default)]
    pub color: Option<String>,
}

/// Rules for keeping a tier once reached
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierMaintenance {
    /// Spend required over the trailing 30 days to keep the tier
    #[serde(default)]
    pub monthly_spending_required: Option<Money>,
    /// Days without a visit before dropping one tier
    #[serde(default)]
    pub inactivity_downgrade_after_days: Option<u32>,
    #[serde(default = "default_true")]
    pub has_grace_period: bool,
    #[serde(default = "default_grace_days")]
    pub grace_period_days: u32,
    #[serde(default)]
    pub reset_policy: TierResetPolicy,
}

fn default_true() -> bool {
    true
}

fn default_grace_days() -> u32 {
    30
}

impl Default for TierMaintenance {
    fn default() -> Self {
        Self {
            monthly_spending_required: None,
            inactivity_downgrade_after_days: None,
            has_grace_period: true,
            grace_period_days: 30,
            reset_policy: TierResetPolicy::Never,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VenueTierConfig {
    pub venue_id: Uuid,
    pub bronze: TierLevel,
    pub silver: TierLevel,
    pub gold: TierLevel,
    pub platinum: TierLevel,
    #[serde(default)]
    pub maintenance: TierMaintenance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TierChangeReason {
    Spending,
    Inactivity,
    MonthlySpending,
    PeriodReset,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierChange {
    pub user_id: Uuid,
    pub venue_id: Uuid,
    pub from: MembershipTier,
    pub to: MembershipTier,
    pub reason: TierChangeReason,
}

impl TierChange {
    pub fn is_upgrade(&self) -> bool {
        self.to > self.from
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TierProgress {
    pub current_tier: MembershipTier,
    pub next_tier: Option<MembershipTier>,
    pub current_spending: Money,
    pub next_tier_threshold: Option<Money>,
    pub progress_percentage: f64,
    pub amount_to_next_tier: Option<Money>,
    pub days_at_current_tier: i64,
    pub perks: Vec<TierPerk>,
    pub multiplier: Multiplier,
}

/// Outcome of a maintenance check for a single membership
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Downgrade {
    pub to: MembershipTier,
    pub reason: TierChangeReason,
    pub detail: String,
}

impl VenueTierConfig {
    pub fn default_for(venue_id: Uuid) -> Self {
        Self {
            venue_id,
            bronze: TierLevel {
                min_spend: Money::ZERO,
                multiplier: Multiplier::ONE,
                perks: vec![TierPerk::new(
                    "Points Earning",
                    "Earn 1x points on every purchase",
                )],
                color: None,
            },
            silver: TierLevel {
                min_spend: Money::from_whole(500),
                multiplier: Multiplier::from_hundredths(120),
                perks: vec![
                    TierPerk::new("Bonus Points", "Earn 1.2x points on every purchase"),
                    TierPerk::new("Birthday Bonus", "Special birthday reward"),
                ],
                color: None,
            },
            gold: TierLevel {
                min_spend: Money::from_whole(2000),
                multiplier: Multiplier::from_hundredths(150),
                perks: vec![
                    TierPerk::new("Premium Points", "Earn 1.5x points on every purchase"),
                    TierPerk::new("Birthday Bonus", "Enhanced birthday reward"),
                    TierPerk::new("Early Event Access", "Priority booking for events"),
                ],
                color: None,
            },
            platinum: TierLevel {
                min_spend: Money::from_whole(5000),
                multiplier: Multiplier::from_hundredths(200),
                perks: vec![
                    TierPerk::new("Maximum Points", "Earn 2x points on every purchase"),
                    TierPerk::new("VIP Birthday", "Exclusive birthday celebration"),
                    TierPerk::new("Early Event Access", "First access to all events"),
                    TierPerk::new("Reserved Seating", "Priority table reservations"),
                    TierPerk::new("Skip-the-Line", "Fast-track venue entry"),
                ],
                color: None,
            },
            maintenance: TierMaintenance::default(),
        }
    }

    pub fn level(&self, tier: MembershipTier) -> &TierLevel {
        match tier {
            MembershipTier::Bronze => &self.bronze,
            MembershipTier::Silver => &self.silver,
            MembershipTier::Gold => &self.gold,
            MembershipTier::Platinum => &self.platinum,
        }
    }

    pub fn minimum(&self, tier: MembershipTier) -> Money {
        self.level(tier).min_spend
    }

    pub fn multiplier(&self, tier: MembershipTier) -> Multiplier {
        self.level(tier).multiplier
    }

    pub fn perks(&self, tier: MembershipTier) -> &[TierPerk] {
        &self.level(tier).perks
    }

    /// Highest tier whose minimum is covered by `spend`
    pub fn tier_for(&self, spend: Money) -> MembershipTier {
        MembershipTier::ALL
            .iter()
            .rev()
            .copied()
            .find(|tier| spend >= self.minimum(*tier))
            .unwrap_or(MembershipTier::Bronze)
    }

    pub fn apply_multiplier(&self, points: Points, tier: MembershipTier) -> Points {
        points.times(self.multiplier(tier))
    }

    pub fn validate(&self) -> Result<()> {
        if !self.bronze.min_spend.is_zero() {
            return Err(LoyaltyError::validation("bronze minimum spend must be 0"));
        }

        for pair in MembershipTier::ALL.windows(2) {
            let (lower, upper) = (self.level(pair[0]), self.level(pair[1]));
            if upper.min_spend <= lower.min_spend {
                return Err(LoyaltyError::validation(format!(
                    "{} minimum spend must be above {}",
                    pair[1], pair[0]
                )));
            }
            if upper.multiplier < lower.multiplier {
                return Err(LoyaltyError::validation(format!(
                    "{} multiplier must not be below {}",
                    pair[1], pair[0]
                )));
            }
        }

        for tier in MembershipTier::ALL {
            if self.multiplier(tier) < Multiplier::ONE {
                return Err(LoyaltyError::validation(format!(
                    "{} multiplier must be at least 1.00",
                    tier
                )));
            }
        }

        let m = &self.maintenance;
        if let Some(days) = m.inactivity_downgrade_after_days {
            if !(30..=365).contains(&days) {
                return Err(LoyaltyError::validation(
                    "inactivity downgrade must be between 30 and 365 days",
                ));
            }
        }
        if let Some(required) = m.monthly_spending_required {
            if !required.is_positive() {
                return Err(LoyaltyError::validation(
                    "monthly spending requirement must be positive",
                ));
            }
        }

        Ok(())
    }

    pub fn progress(
        &self,
        tier: MembershipTier,
        spend: Money,
        tier_since: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> TierProgress {
        let days_at_current_tier = (now - tier_since).num_days().max(0);
        let perks = self.perks(tier).to_vec();
        let multiplier = self.multiplier(tier);

        let Some(next) = tier.next() else {
            return TierProgress {
                current_tier: tier,
                next_tier: None,
                current_spending: spend,
                next_tier_threshold: None,
                progress_percentage: 100.0,
                amount_to_next_tier: None,
                days_at_current_tier,
                perks,
                multiplier,
            };
        };

        let threshold = self.minimum(next);
        let floor = self.minimum(tier);
        let range = threshold - floor;
        let progress_percentage = if range.is_positive() {
            let done = (spend - floor).max(Money::ZERO);
            (done.to_f64() / range.to_f64() * 100.0).min(100.0)
        } else {
            0.0
        };

        TierProgress {
            current_tier: tier,
            next_tier: Some(next),
            current_spending: spend,
            next_tier_threshold: Some(threshold),
            progress_percentage,
            amount_to_next_tier: Some(threshold.saturating_sub(spend)),
            days_at_current_tier,
            perks,
            multiplier,
        }
    }

    /// Decide whether a member drops one tier.
    ///
    /// Inactivity is measured from the later of the last visit and the last
    /// tier change, so a member loses at most one tier per window.
    pub fn check_maintenance(
        &self,
        tier: MembershipTier,
        tier_since: DateTime<Utc>,
        last_visit_at: Option<DateTime<Utc>>,
        recent_spend: Money,
        now: DateTime<Utc>,
    ) -> Option<Downgrade> {
        let lower = tier.previous()?;
        let m = &self.maintenance;
        let grace = if m.has_grace_period {
            m.grace_period_days as i64
        } else {
            0
        };

        if let (Some(limit), Some(last_visit)) = (m.inactivity_downgrade_after_days, last_visit_at)
        {
            let reference = last_visit.max(tier_since);
            let idle_days = (now - reference).num_days();
            if idle_days > limit as i64 + grace {
                return Some(Downgrade {
                    to: lower,
                    reason: TierChangeReason::Inactivity,
                    detail: format!("Inactive for {} days", idle_days),
                });
            }
        }

        if let Some(required) = m.monthly_spending_required {
            // The trailing window only counts once it is complete
            let held_days = (now - tier_since).num_days();
            if held_days > grace.max(MONTHLY_WINDOW_DAYS) && recent_spend < required {
                return Some(Downgrade {
                    to: lower,
                    reason: TierChangeReason::MonthlySpending,
                    detail: format!(
                        "Spent {} in the last {} days, {} required",
                        recent_spend, MONTHLY_WINDOW_DAYS, required
                    ),
                });
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn config() -> VenueTierConfig {
        VenueTierConfig::default_for(Uuid::new_v4())
    }

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_tier_for_spending() {
        let cfg = config();
        assert_eq!(cfg.tier_for(Money::ZERO), MembershipTier::Bronze);
        assert_eq!(cfg.tier_for(Money::from_hundredths(49_999)), MembershipTier::Bronze);
        assert_eq!(cfg.tier_for(Money::from_whole(500)), MembershipTier::Silver);
        assert_eq!(cfg.tier_for(Money::from_whole(2000)), MembershipTier::Gold);
        assert_eq!(cfg.tier_for(Money::from_whole(12_000)), MembershipTier::Platinum);
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(config().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_thresholds() {
        let mut cfg = config();
        cfg.gold.min_spend = Money::from_whole(400);
        assert!(cfg.validate().is_err());

        let mut cfg = config();
        cfg.silver.multiplier = Multiplier::from_hundredths(90);
        assert!(cfg.validate().is_err());

        let mut cfg = config();
        cfg.maintenance.inactivity_downgrade_after_days = Some(10);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_progress_midway() {
        let cfg = config();
        let now = at(2026, 3, 10);
        let progress = cfg.progress(
            MembershipTier::Silver,
            Money::from_whole(1250),
            now - Duration::days(12),
            now,
        );
        assert_eq!(progress.next_tier, Some(MembershipTier::Gold));
        assert_eq!(progress.next_tier_threshold, Some(Money::from_whole(2000)));
        assert_eq!(progress.amount_to_next_tier, Some(Money::from_whole(750)));
        assert!((progress.progress_percentage - 50.0).abs() < 1e-9);
        assert_eq!(progress.days_at_current_tier, 12);
        assert_eq!(progress.multiplier, Multiplier::from_hundredths(120));
    }

    #[test]
    fn test_progress_at_top_tier() {
        let cfg = config();
        let now = at(2026, 3, 10);
        let progress = cfg.progress(MembershipTier::Platinum, Money::from_whole(9000), now, now);
        assert!(progress.next_tier.is_none());
        assert_eq!(progress.progress_percentage, 100.0);
        assert!(progress.amount_to_next_tier.is_none());
    }

    #[test]
    fn test_apply_multiplier() {
        let cfg = config();
        assert_eq!(
            cfg.apply_multiplier(Points::from_whole(10), MembershipTier::Gold),
            Points::from_whole(15)
        );
    }

    #[test]
    fn test_inactivity_downgrade_respects_grace() {
        let mut cfg = config();
        cfg.maintenance.inactivity_downgrade_after_days = Some(90);
        let now = at(2026, 6, 1);
        let since = now - Duration::days(400);

        // 100 idle days is inside 90 + 30 grace
        let verdict = cfg.check_maintenance(
            MembershipTier::Gold,
            since,
            Some(now - Duration::days(100)),
            Money::ZERO,
            now,
        );
        assert!(verdict.is_none());

        let verdict = cfg
            .check_maintenance(
                MembershipTier::Gold,
                since,
                Some(now - Duration::days(121)),
                Money::ZERO,
                now,
            )
            .unwrap();
        assert_eq!(verdict.to, MembershipTier::Silver);
        assert_eq!(verdict.reason, TierChangeReason::Inactivity);

        cfg.maintenance.has_grace_period = false;
        assert!(cfg
            .check_maintenance(
                MembershipTier::Gold,
                since,
                Some(now - Duration::days(100)),
                Money::ZERO,
                now,
            )
            .is_some());
    }

    #[test]
    fn test_bronze_never_downgrades() {
        let mut cfg = config();
        cfg.maintenance.inactivity_downgrade_after_days = Some(30);
        let now = at(2026, 6, 1);
        assert!(cfg
            .check_maintenance(
                MembershipTier::Bronze,
                now - Duration::days(500),
                Some(now - Duration::days(500)),
                Money::ZERO,
                now,
            )
            .is_none());
    }

    #[test]
    fn test_monthly_spending_requirement() {
        let mut cfg = config();
        cfg.maintenance.monthly_spending_required = Some(Money::from_whole(100));
        let now = at(2026, 6, 1);

        // Recently promoted members are inside the grace period
        assert!(cfg
            .check_maintenance(
                MembershipTier::Silver,
                now - Duration::days(10),
                Some(now),
                Money::ZERO,
                now,
            )
            .is_none());

        let verdict = cfg
            .check_maintenance(
                MembershipTier::Silver,
                now - Duration::days(45),
                Some(now),
                Money::from_whole(60),
                now,
            )
            .unwrap();
        assert_eq!(verdict.reason, TierChangeReason::MonthlySpending);

        assert!(cfg
            .check_maintenance(
                MembershipTier::Silver,
                now - Duration::days(45),
                Some(now),
                Money::from_whole(150),
                now,
            )
            .is_none());

        // Without a grace period the trailing window still has to be complete
        cfg.maintenance.has_grace_period = false;
        assert!(cfg
            .check_maintenance(
                MembershipTier::Silver,
                now - Duration::days(20),
                Some(now),
                Money::ZERO,
                now,
            )
            .is_none());
        let verdict = cfg
            .check_maintenance(
                MembershipTier::Silver,
                now - Duration::days(31),
                Some(now),
                Money::ZERO,
                now,
            )
            .unwrap();
        assert_eq!(verdict.reason, TierChangeReason::MonthlySpending);
    }

    #[test]
    fn test_reset_policy_boundaries() {
        let since = at(2025, 12, 20);
        assert!(!TierResetPolicy::Never.reset_due(since, at(2030, 1, 1)));
        assert!(TierResetPolicy::Annually.reset_due(since, at(2026, 1, 2)));
        assert!(!TierResetPolicy::Annually.reset_due(at(2026, 1, 2), at(2026, 12, 31)));
        assert!(TierResetPolicy::Quarterly.reset_due(at(2026, 3, 31), at(2026, 4, 1)));
        assert!(!TierResetPolicy::Quarterly.reset_due(at(2026, 4, 1), at(2026, 6, 30)));
        assert!(TierResetPolicy::Monthly.reset_due(at(2026, 5, 31), at(2026, 6, 1)));
        assert!(!TierResetPolicy::Monthly.reset_due(at(2026, 6, 1), at(2026, 6, 30)));
    }

    #[test]
    fn test_tier_parsing() {
        assert_eq!("GOLD".parse::<MembershipTier>().unwrap(), MembershipTier::Gold);
        assert!("diamond".parse::<MembershipTier>().is_err());
        assert!(MembershipTier::Platinum > MembershipTier::Silver);
    }
}
