//! Venue memberships and the points ledger
//!
//! Balances only move through [`VenueMembership::post`], which produces the
//! matching ledger entry and refuses to go below zero.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{LoyaltyError, Result};
use crate::money::{Money, Points};
use crate::streaks::StreakState;
use crate::tiers::MembershipTier;

pub const MAX_PER_PAGE: u32 = 100;
pub const DEFAULT_PER_PAGE: u32 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerEntryType {
    Earn,
    Spend,
    Redeem,
    ReferralBonus,
    StreakBonus,
    BadgeBonus,
    Expire,
    Adjust,
}

impl LedgerEntryType {
    pub fn as_str(self) -> &'static str {
        match self {
            LedgerEntryType::Earn => "earn",
            LedgerEntryType::Spend => "spend",
            LedgerEntryType::Redeem => "redeem",
            LedgerEntryType::ReferralBonus => "referral_bonus",
            LedgerEntryType::StreakBonus => "streak_bonus",
            LedgerEntryType::BadgeBonus => "badge_bonus",
            LedgerEntryType::Expire => "expire",
            LedgerEntryType::Adjust => "adjust",
        }
    }

    /// Entry types that add to the balance and to lifetime earnings
    pub fn is_credit(self) -> bool {
        matches!(
            self,
            LedgerEntryType::Earn
                | LedgerEntryType::ReferralBonus
                | LedgerEntryType::StreakBonus
                | LedgerEntryType::BadgeBonus
        )
    }
}

impl fmt::Display for LedgerEntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LedgerEntryType {
    type Err = LoyaltyError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "earn" => Ok(LedgerEntryType::Earn),
            "spend" => Ok(LedgerEntryType::Spend),
            "redeem" => Ok(LedgerEntryType::Redeem),
            "referral_bonus" => Ok(LedgerEntryType::ReferralBonus),
            "streak_bonus" => Ok(LedgerEntryType::StreakBonus),
            "badge_bonus" => Ok(LedgerEntryType::BadgeBonus),
            "expire" => Ok(LedgerEntryType::Expire),
            "adjust" => Ok(LedgerEntryType::Adjust),
            other => Err(LoyaltyError::validation(format!(
                "unknown transaction type: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    pub venue_id: Uuid,
    pub entry_type: LedgerEntryType,
    /// Signed change to the balance
    pub amount: Points,
    pub balance_before: Points,
    pub balance_after: Points,
    pub description: String,
    pub check_in_id: Option<Uuid>,
    pub reward_id: Option<Uuid>,
    pub related_user_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Optional references carried by a ledger entry
#[derive(Debug, Clone, Copy, Default)]
pub struct EntryRefs {
    pub check_in_id: Option<Uuid>,
    pub reward_id: Option<Uuid>,
    pub related_user_id: Option<Uuid>,
}

/// Per-user, per-venue loyalty record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VenueMembership {
    pub user_id: Uuid,
    pub venue_id: Uuid,
    pub tier: MembershipTier,
    pub tier_since: DateTime<Utc>,
    /// Spend counted towards the tier, lowered by downgrades and resets
    pub qualifying_spend: Money,
    pub total_spent: Money,
    pub points_balance: Points,
    pub points_earned: Points,
    pub points_spent: Points,
    pub total_visits: u32,
    pub current_streak: u32,
    pub longest_streak: u32,
    pub last_visit_at: Option<DateTime<Utc>>,
    pub last_activity_at: DateTime<Utc>,
    pub joined_at: DateTime<Utc>,
}

impl VenueMembership {
    pub fn new(user_id: Uuid, venue_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            venue_id,
            tier: MembershipTier::Bronze,
            tier_since: now,
            qualifying_spend: Money::ZERO,
            total_spent: Money::ZERO,
            points_balance: Points::ZERO,
            points_earned: Points::ZERO,
            points_spent: Points::ZERO,
            total_visits: 0,
            current_streak: 0,
            longest_streak: 0,
            last_visit_at: None,
            last_activity_at: now,
            joined_at: now,
        }
    }

    pub fn streak(&self) -> StreakState {
        StreakState {
            current_streak: self.current_streak,
            longest_streak: self.longest_streak,
            last_visit_at: self.last_visit_at,
        }
    }

    pub fn set_streak(&mut self, streak: StreakState) {
        self.current_streak = streak.current_streak;
        self.longest_streak = streak.longest_streak;
        self.last_visit_at = streak.last_visit_at;
    }

    /// Apply a signed balance change and build its ledger entry.
    ///
    /// Credits must be positive and debits negative; a debit larger than the
    /// balance fails with `InsufficientPoints` and leaves the membership as is.
    pub fn post(
        &mut self,
        entry_type: LedgerEntryType,
        amount: Points,
        description: impl Into<String>,
        refs: EntryRefs,
        now: DateTime<Utc>,
    ) -> Result<LedgerEntry> {
        if amount.is_zero() {
            return Err(LoyaltyError::validation("ledger amount must not be zero"));
        }
        if entry_type.is_credit() && amount.is_negative() {
            return Err(LoyaltyError::validation(format!(
                "{} entries must be positive",
                entry_type
            )));
        }
        if matches!(
            entry_type,
            LedgerEntryType::Spend | LedgerEntryType::Redeem | LedgerEntryType::Expire
        ) && amount.is_positive()
        {
            return Err(LoyaltyError::validation(format!(
                "{} entries must be negative",
                entry_type
            )));
        }

        let balance_before = self.points_balance;
        let balance_after = balance_before + amount;
        if balance_after.is_negative() {
            return Err(LoyaltyError::InsufficientPoints {
                available: balance_before,
                required: amount.abs(),
            });
        }

        self.points_balance = balance_after;
        if entry_type.is_credit() {
            self.points_earned += amount;
        }
        if matches!(entry_type, LedgerEntryType::Spend | LedgerEntryType::Redeem) {
            self.points_spent += amount.abs();
        }

        Ok(LedgerEntry {
            id: Uuid::new_v4(),
            user_id: self.user_id,
            venue_id: self.venue_id,
            entry_type,
            amount,
            balance_before,
            balance_after,
            description: description.into(),
            check_in_id: refs.check_in_id,
            reward_id: refs.reward_id,
            related_user_id: refs.related_user_id,
            created_at: now,
        })
    }
}

/// Transaction history filter
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryQuery {
    #[serde(default)]
    pub venue_id: Option<Uuid>,
    #[serde(default, rename = "type")]
    pub entry_type: Option<LedgerEntryType>,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub per_page: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub per_page: u32,
}

impl PageRequest {
    pub fn new(page: Option<u32>, per_page: Option<u32>) -> Result<Self> {
        let page = page.unwrap_or(1);
        let per_page = per_page.unwrap_or(DEFAULT_PER_PAGE);
        if page < 1 {
            return Err(LoyaltyError::validation("page must be at least 1"));
        }
        if !(1..=MAX_PER_PAGE).contains(&per_page) {
            return Err(LoyaltyError::validation(format!(
                "per_page must be between 1 and {}",
                MAX_PER_PAGE
            )));
        }
        Ok(Self { page, per_page })
    }

    pub fn offset(&self) -> i64 {
        (self.page as i64 - 1) * self.per_page as i64
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub per_page: u32,
    pub total: u64,
    pub total_pages: u64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, request: PageRequest, total: u64) -> Self {
        let per_page = request.per_page as u64;
        Self {
            items,
            page: request.page,
            per_page: request.per_page,
            total,
            total_pages: total.div_ceil(per_page),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn membership() -> VenueMembership {
        VenueMembership::new(Uuid::new_v4(), Uuid::new_v4(), Utc::now())
    }

    #[test]
    fn test_credit_and_debit() {
        let mut m = membership();
        let earn = m
            .post(
                LedgerEntryType::Earn,
                Points::from_whole(40),
                "Check-in",
                EntryRefs::default(),
                Utc::now(),
            )
            .unwrap();
        assert_eq!(earn.balance_before, Points::ZERO);
        assert_eq!(earn.balance_after, Points::from_whole(40));

        let spend = m
            .post(
                LedgerEntryType::Spend,
                Points::from_whole(-15),
                "Paid with points",
                EntryRefs::default(),
                Utc::now(),
            )
            .unwrap();
        assert_eq!(spend.balance_after, Points::from_whole(25));
        assert_eq!(m.points_earned, Points::from_whole(40));
        assert_eq!(m.points_spent, Points::from_whole(15));
    }

    #[test]
    fn test_overdraw_is_rejected() {
        let mut m = membership();
        let err = m
            .post(
                LedgerEntryType::Redeem,
                Points::from_whole(-1),
                "Free shot",
                EntryRefs::default(),
                Utc::now(),
            )
            .unwrap_err();
        assert!(matches!(err, LoyaltyError::InsufficientPoints { .. }));
        assert_eq!(m.points_balance, Points::ZERO);
    }

    #[test]
    fn test_sign_rules() {
        let mut m = membership();
        assert!(m
            .post(
                LedgerEntryType::Earn,
                Points::from_whole(-5),
                "bad",
                EntryRefs::default(),
                Utc::now()
            )
            .is_err());
        assert!(m
            .post(
                LedgerEntryType::Adjust,
                Points::ZERO,
                "bad",
                EntryRefs::default(),
                Utc::now()
            )
            .is_err());
    }

    #[test]
    fn test_entry_type_round_trip_names() {
        for t in [
            LedgerEntryType::ReferralBonus,
            LedgerEntryType::StreakBonus,
            LedgerEntryType::Expire,
        ] {
            assert_eq!(t.as_str().parse::<LedgerEntryType>().unwrap(), t);
            assert_eq!(
                serde_json::to_string(&t).unwrap(),
                format!("\"{}\"", t.as_str())
            );
        }
    }

    #[test]
    fn test_pagination() {
        assert!(PageRequest::new(Some(0), None).is_err());
        assert!(PageRequest::new(None, Some(101)).is_err());
        assert!(PageRequest::new(None, Some(0)).is_err());

        let req = PageRequest::new(Some(3), Some(10)).unwrap();
        assert_eq!(req.offset(), 20);

        let page: Page<u8> = Page::new(vec![], req, 21);
        assert_eq!(page.total_pages, 3);
        let empty: Page<u8> = Page::new(vec![], req, 0);
        assert_eq!(empty.total_pages, 0);
    }
}
