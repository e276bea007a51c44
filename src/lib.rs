//! AfterDark Loyalty - venue memberships for nightlife venues
//!
//! Members check in at venues, earn points on what they pay in cash, spend
//! points on bills and rewards, and climb venue-specific tiers.
//!
//! # How it works
//!
//! 1. A check-in records the bill and pays part of it with points
//! 2. Points are earned on the cash part, weighted by product margins
//! 3. Venue, tier and badge multipliers are applied on top
//! 4. Referrers up to five levels above the member receive a share
//! 5. A periodic sweep expires stale balances and applies tier downgrades
//!
//! # Rules
//!
//! - Balances are kept per venue and never go negative
//! - Every balance change is recorded in the points ledger
//! - Tiers follow qualifying spend; downgrades drop one tier at a time
//! - Amounts are fixed-point with two decimals

pub mod badges;
pub mod config;
pub mod error;
pub mod expiration;
pub mod inventory;
pub mod ledger;
pub mod money;
pub mod pin;
pub mod points;
pub mod server;
pub mod service;
pub mod storage;
pub mod streaks;
pub mod tiers;

pub use config::Config;
pub use error::{LoyaltyError, Result};
pub use money::{Money, Multiplier, Percent, Points};
pub use service::LoyaltyService;
pub use storage::Store;
pub use tiers::{MembershipTier, VenueTierConfig};
