//! SQLite storage for the loyalty service
//!
//! A single connection lives behind a mutex. Callers get a [`Repo`] through
//! [`Store::read`] or [`Store::write`]; `write` runs the closure inside one
//! transaction and commits only when it returns `Ok`.

use std::path::Path;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::badges::BadgeConfig;
use crate::error::{LoyaltyError, Result};
use crate::inventory::{
    InventoryItem, InventoryLocation, InventoryTransfer, MovementType, StockMovement,
};
use crate::ledger::{HistoryQuery, LedgerEntry, LedgerEntryType, PageRequest, VenueMembership};
use crate::money::{Money, Multiplier, Points};
use crate::points::VenueMargins;
use crate::tiers::{MembershipTier, VenueTierConfig};

const MIGRATIONS: &[(&str, &str)] = &[(
    "001_schema",
    include_str!("../migrations/001_schema.sql"),
)];

// ============================================================================
// RECORDS
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub referred_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Venue {
    pub id: Uuid,
    pub name: String,
    pub is_active: bool,
    pub points_multiplier: Multiplier,
    pub margins: VenueMargins,
    pub total_check_ins: i64,
    pub total_revenue: Money,
    pub total_points_issued: Points,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckInRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub venue_id: Uuid,
    pub method: String,
    pub amount_total: Money,
    pub amount_cash: Money,
    pub amount_points: Money,
    pub points_spent: Points,
    pub points_earned: Points,
    pub new_visit_day: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reward {
    pub id: Uuid,
    pub venue_id: Uuid,
    pub name: String,
    pub description: String,
    pub points_cost: Points,
    /// `None` means unlimited
    pub stock: Option<i64>,
    pub is_active: bool,
    /// Days a redemption code stays valid
    pub valid_days: u32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Redemption {
    pub id: Uuid,
    pub reward_id: Uuid,
    pub user_id: Uuid,
    pub venue_id: Uuid,
    pub points_spent: Points,
    pub code: String,
    pub status: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Employee {
    pub id: Uuid,
    pub venue_id: Uuid,
    pub name: String,
    pub role: String,
    pub is_active: bool,
    #[serde(skip)]
    pub pin_hash: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub rank: u32,
    pub user_id: Uuid,
    pub name: String,
    pub tier: MembershipTier,
    pub points_earned: Points,
    pub points_balance: Points,
    pub total_visits: u32,
}

// ============================================================================
// COLUMN MAPPINGS
// ============================================================================

macro_rules! text_column {
    ($($ty:ty),*) => {
        $(
            impl ToSql for $ty {
                fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                    Ok(ToSqlOutput::from(self.as_str()))
                }
            }

            impl FromSql for $ty {
                fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                    value
                        .as_str()?
                        .parse()
                        .map_err(|e: LoyaltyError| FromSqlError::Other(Box::new(e)))
                }
            }
        )*
    };
}

text_column!(MembershipTier, LedgerEntryType, InventoryLocation, MovementType);

fn json_column<T: serde::de::DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let text: String = row.get(idx)?;
    serde_json::from_str(&text).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

const USER_COLUMNS: &str = "id, name, referred_by, created_at";

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        name: row.get(1)?,
        referred_by: row.get(2)?,
        created_at: row.get(3)?,
    })
}

const VENUE_COLUMNS: &str = "id, name, is_active, points_multiplier, food_margin, beverage_margin, \
     default_margin, total_check_ins, total_revenue, total_points_issued, created_at";

fn venue_from_row(row: &Row<'_>) -> rusqlite::Result<Venue> {
    Ok(Venue {
        id: row.get(0)?,
        name: row.get(1)?,
        is_active: row.get(2)?,
        points_multiplier: row.get(3)?,
        margins: VenueMargins {
            food: row.get(4)?,
            beverage: row.get(5)?,
            default: row.get(6)?,
        },
        total_check_ins: row.get(7)?,
        total_revenue: row.get(8)?,
        total_points_issued: row.get(9)?,
        created_at: row.get(10)?,
    })
}

const MEMBERSHIP_COLUMNS: &str = "user_id, venue_id, tier, tier_since, qualifying_spend, \
     total_spent, points_balance, points_earned, points_spent, total_visits, current_streak, \
     longest_streak, last_visit_at, last_activity_at, joined_at";

fn membership_from_row(row: &Row<'_>) -> rusqlite::Result<VenueMembership> {
    Ok(VenueMembership {
        user_id: row.get(0)?,
        venue_id: row.get(1)?,
        tier: row.get(2)?,
        tier_since: row.get(3)?,
        qualifying_spend: row.get(4)?,
        total_spent: row.get(5)?,
        points_balance: row.get(6)?,
        points_earned: row.get(7)?,
        points_spent: row.get(8)?,
        total_visits: row.get(9)?,
        current_streak: row.get(10)?,
        longest_streak: row.get(11)?,
        last_visit_at: row.get(12)?,
        last_activity_at: row.get(13)?,
        joined_at: row.get(14)?,
    })
}

const LEDGER_COLUMNS: &str = "id, user_id, venue_id, type, amount, balance_before, balance_after, \
     description, check_in_id, reward_id, related_user_id, created_at";

fn ledger_from_row(row: &Row<'_>) -> rusqlite::Result<LedgerEntry> {
    Ok(LedgerEntry {
        id: row.get(0)?,
        user_id: row.get(1)?,
        venue_id: row.get(2)?,
        entry_type: row.get(3)?,
        amount: row.get(4)?,
        balance_before: row.get(5)?,
        balance_after: row.get(6)?,
        description: row.get(7)?,
        check_in_id: row.get(8)?,
        reward_id: row.get(9)?,
        related_user_id: row.get(10)?,
        created_at: row.get(11)?,
    })
}

const REWARD_COLUMNS: &str =
    "id, venue_id, name, description, points_cost, stock, is_active, valid_days, created_at";

fn reward_from_row(row: &Row<'_>) -> rusqlite::Result<Reward> {
    Ok(Reward {
        id: row.get(0)?,
        venue_id: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        points_cost: row.get(4)?,
        stock: row.get(5)?,
        is_active: row.get(6)?,
        valid_days: row.get(7)?,
        created_at: row.get(8)?,
    })
}

const BADGE_COLUMNS: &str = "id, venue_id, name, description, required_visits, required_spending, \
     required_referrals, required_days, points_reward, bonus_multiplier, is_active";

fn badge_from_row(row: &Row<'_>) -> rusqlite::Result<BadgeConfig> {
    Ok(BadgeConfig {
        id: row.get(0)?,
        venue_id: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        required_visits: row.get(4)?,
        required_spending: row.get(5)?,
        required_referrals: row.get(6)?,
        required_days: row.get(7)?,
        points_reward: row.get(8)?,
        bonus_multiplier: row.get(9)?,
        is_active: row.get(10)?,
    })
}

const EMPLOYEE_COLUMNS: &str = "id, venue_id, name, role, is_active, pin_hash, created_at";

fn employee_from_row(row: &Row<'_>) -> rusqlite::Result<Employee> {
    Ok(Employee {
        id: row.get(0)?,
        venue_id: row.get(1)?,
        name: row.get(2)?,
        role: row.get(3)?,
        is_active: row.get(4)?,
        pin_hash: row.get(5)?,
        created_at: row.get(6)?,
    })
}

const ITEM_COLUMNS: &str = "id, venue_id, name, category, unit, storage_quantity, bar_quantity, \
     min_stock_level, updated_at";

fn item_from_row(row: &Row<'_>) -> rusqlite::Result<InventoryItem> {
    Ok(InventoryItem {
        id: row.get(0)?,
        venue_id: row.get(1)?,
        name: row.get(2)?,
        category: row.get(3)?,
        unit: row.get(4)?,
        storage_quantity: row.get(5)?,
        bar_quantity: row.get(6)?,
        min_stock_level: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

// ============================================================================
// STORE
// ============================================================================

pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref())?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        debug!("SQLite journal mode: {}", mode);
        Self::init(conn)
    }

    pub fn in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(mut conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", true)?;
        run_migrations(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run read-only queries
    pub fn read<T>(&self, f: impl FnOnce(&Repo<'_>) -> Result<T>) -> Result<T> {
        let conn = self.conn.lock();
        f(&Repo { conn: &conn })
    }

    /// Run `f` in a transaction, rolled back when it fails
    pub fn write<T>(&self, f: impl FnOnce(&Repo<'_>) -> Result<T>) -> Result<T> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let out = f(&Repo { conn: &tx })?;
        tx.commit()?;
        Ok(out)
    }
}

fn run_migrations(conn: &mut Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version TEXT PRIMARY KEY,
            applied_at TEXT NOT NULL
        )",
    )?;

    for (version, sql) in MIGRATIONS {
        let applied: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM schema_migrations WHERE version = ?1)",
            params![version],
            |row| row.get(0),
        )?;
        if applied {
            debug!("Migration {} already applied", version);
            continue;
        }

        let tx = conn.transaction()?;
        tx.execute_batch(sql)?;
        tx.execute(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
            params![version, Utc::now()],
        )?;
        tx.commit()?;
        info!("Applied migration {}", version);
    }

    Ok(())
}

// ============================================================================
// REPOSITORY
// ============================================================================

pub struct Repo<'c> {
    conn: &'c Connection,
}

impl Repo<'_> {
    // ---- users and referrals ----

    pub fn insert_user(&self, user: &User) -> Result<()> {
        self.conn.execute(
            "INSERT INTO users (id, name, referred_by, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![user.id, user.name, user.referred_by, user.created_at],
        )?;
        Ok(())
    }

    pub fn get_user(&self, id: Uuid) -> Result<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS);
        Ok(self
            .conn
            .query_row(&sql, params![id], user_from_row)
            .optional()?)
    }

    pub fn require_user(&self, id: Uuid) -> Result<User> {
        self.get_user(id)?
            .ok_or_else(|| LoyaltyError::not_found(format!("User {}", id)))
    }

    pub fn insert_referral_link(&self, user_id: Uuid, level: u32, referrer_id: Uuid) -> Result<()> {
        self.conn.execute(
            "INSERT INTO referral_chains (user_id, level, referrer_id) VALUES (?1, ?2, ?3)",
            params![user_id, level, referrer_id],
        )?;
        Ok(())
    }

    /// Ancestors of a user, direct referrer first
    pub fn referral_chain(&self, user_id: Uuid) -> Result<Vec<Uuid>> {
        let mut stmt = self.conn.prepare(
            "SELECT referrer_id FROM referral_chains WHERE user_id = ?1 ORDER BY level ASC",
        )?;
        let chain = stmt
            .query_map(params![user_id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<Uuid>>>()?;
        Ok(chain)
    }

    /// Number of users this user referred directly
    pub fn direct_referrals(&self, user_id: Uuid) -> Result<u32> {
        let count: u32 = self.conn.query_row(
            "SELECT COUNT(*) FROM referral_chains WHERE referrer_id = ?1 AND level = 1",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    // ---- venues ----

    pub fn insert_venue(&self, venue: &Venue) -> Result<()> {
        self.conn.execute(
            "INSERT INTO venues (id, name, is_active, points_multiplier, food_margin, \
             beverage_margin, default_margin, total_check_ins, total_revenue, \
             total_points_issued, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                venue.id,
                venue.name,
                venue.is_active,
                venue.points_multiplier,
                venue.margins.food,
                venue.margins.beverage,
                venue.margins.default,
                venue.total_check_ins,
                venue.total_revenue,
                venue.total_points_issued,
                venue.created_at,
            ],
        )?;
        Ok(())
    }

    pub fn get_venue(&self, id: Uuid) -> Result<Option<Venue>> {
        let sql = format!("SELECT {} FROM venues WHERE id = ?1", VENUE_COLUMNS);
        Ok(self
            .conn
            .query_row(&sql, params![id], venue_from_row)
            .optional()?)
    }

    pub fn require_venue(&self, id: Uuid) -> Result<Venue> {
        self.get_venue(id)?
            .ok_or_else(|| LoyaltyError::not_found(format!("Venue {}", id)))
    }

    pub fn add_venue_stats(&self, id: Uuid, revenue: Money, points_issued: Points) -> Result<()> {
        self.conn.execute(
            "UPDATE venues SET total_check_ins = total_check_ins + 1, \
             total_revenue = total_revenue + ?2, \
             total_points_issued = total_points_issued + ?3 WHERE id = ?1",
            params![id, revenue, points_issued],
        )?;
        Ok(())
    }

    pub fn get_tier_config(&self, venue_id: Uuid) -> Result<Option<VenueTierConfig>> {
        Ok(self
            .conn
            .query_row(
                "SELECT config FROM tier_configs WHERE venue_id = ?1",
                params![venue_id],
                |row| json_column(row, 0),
            )
            .optional()?)
    }

    pub fn save_tier_config(&self, config: &VenueTierConfig, now: DateTime<Utc>) -> Result<()> {
        let json = serde_json::to_string(config)?;
        self.conn.execute(
            "INSERT INTO tier_configs (venue_id, config, updated_at) VALUES (?1, ?2, ?3) \
             ON CONFLICT(venue_id) DO UPDATE SET config = excluded.config, \
             updated_at = excluded.updated_at",
            params![config.venue_id, json, now],
        )?;
        Ok(())
    }

    // ---- memberships ----

    pub fn get_membership(&self, user_id: Uuid, venue_id: Uuid) -> Result<Option<VenueMembership>> {
        let sql = format!(
            "SELECT {} FROM memberships WHERE user_id = ?1 AND venue_id = ?2",
            MEMBERSHIP_COLUMNS
        );
        Ok(self
            .conn
            .query_row(&sql, params![user_id, venue_id], membership_from_row)
            .optional()?)
    }

    pub fn save_membership(&self, m: &VenueMembership) -> Result<()> {
        self.conn.execute(
            "INSERT INTO memberships (user_id, venue_id, tier, tier_since, qualifying_spend, \
             total_spent, points_balance, points_earned, points_spent, total_visits, \
             current_streak, longest_streak, last_visit_at, last_activity_at, joined_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15) \
             ON CONFLICT(user_id, venue_id) DO UPDATE SET \
             tier = excluded.tier, tier_since = excluded.tier_since, \
             qualifying_spend = excluded.qualifying_spend, total_spent = excluded.total_spent, \
             points_balance = excluded.points_balance, points_earned = excluded.points_earned, \
             points_spent = excluded.points_spent, total_visits = excluded.total_visits, \
             current_streak = excluded.current_streak, longest_streak = excluded.longest_streak, \
             last_visit_at = excluded.last_visit_at, last_activity_at = excluded.last_activity_at",
            params![
                m.user_id,
                m.venue_id,
                m.tier,
                m.tier_since,
                m.qualifying_spend,
                m.total_spent,
                m.points_balance,
                m.points_earned,
                m.points_spent,
                m.total_visits,
                m.current_streak,
                m.longest_streak,
                m.last_visit_at,
                m.last_activity_at,
                m.joined_at,
            ],
        )?;
        Ok(())
    }

    pub fn all_memberships(&self) -> Result<Vec<VenueMembership>> {
        let sql = format!(
            "SELECT {} FROM memberships ORDER BY venue_id, user_id",
            MEMBERSHIP_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], membership_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn leaderboard(&self, venue_id: Uuid, limit: u32) -> Result<Vec<LeaderboardEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT m.user_id, u.name, m.tier, m.points_earned, m.points_balance, m.total_visits \
             FROM memberships m JOIN users u ON u.id = m.user_id \
             WHERE m.venue_id = ?1 \
             ORDER BY m.points_earned DESC, m.total_visits DESC, m.joined_at ASC \
             LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![venue_id, limit], |row| {
                Ok(LeaderboardEntry {
                    rank: 0,
                    user_id: row.get(0)?,
                    name: row.get(1)?,
                    tier: row.get(2)?,
                    points_earned: row.get(3)?,
                    points_balance: row.get(4)?,
                    total_visits: row.get(5)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(rows
            .into_iter()
            .enumerate()
            .map(|(i, entry)| LeaderboardEntry {
                rank: i as u32 + 1,
                ..entry
            })
            .collect())
    }

    // ---- check-ins ----

    pub fn insert_check_in(&self, c: &CheckInRecord, breakdown_json: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO check_ins (id, user_id, venue_id, method, amount_total, amount_cash, \
             amount_points, points_spent, points_earned, breakdown, new_visit_day, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                c.id,
                c.user_id,
                c.venue_id,
                c.method,
                c.amount_total,
                c.amount_cash,
                c.amount_points,
                c.points_spent,
                c.points_earned,
                breakdown_json,
                c.new_visit_day,
                c.created_at,
            ],
        )?;
        Ok(())
    }

    /// First check-in time of each visit day
    pub fn visit_times(&self, user_id: Uuid, venue_id: Uuid) -> Result<Vec<DateTime<Utc>>> {
        let mut stmt = self.conn.prepare(
            "SELECT created_at FROM check_ins \
             WHERE user_id = ?1 AND venue_id = ?2 AND new_visit_day = 1 \
             ORDER BY created_at ASC",
        )?;
        let times = stmt
            .query_map(params![user_id, venue_id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<DateTime<Utc>>>>()?;
        Ok(times)
    }

    pub fn spend_since(&self, user_id: Uuid, venue_id: Uuid, since: DateTime<Utc>) -> Result<Money> {
        let total: Money = self.conn.query_row(
            "SELECT COALESCE(SUM(amount_total), 0) FROM check_ins \
             WHERE user_id = ?1 AND venue_id = ?2 AND created_at >= ?3",
            params![user_id, venue_id, since],
            |row| row.get(0),
        )?;
        Ok(total)
    }

    // ---- ledger ----

    pub fn insert_ledger_entry(&self, e: &LedgerEntry) -> Result<()> {
        self.conn.execute(
            "INSERT INTO point_transactions (id, user_id, venue_id, type, amount, \
             balance_before, balance_after, description, check_in_id, reward_id, \
             related_user_id, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                e.id,
                e.user_id,
                e.venue_id,
                e.entry_type,
                e.amount,
                e.balance_before,
                e.balance_after,
                e.description,
                e.check_in_id,
                e.reward_id,
                e.related_user_id,
                e.created_at,
            ],
        )?;
        Ok(())
    }

    /// One page of a user's history, newest first, with the total match count
    pub fn ledger_page(
        &self,
        user_id: Uuid,
        query: &HistoryQuery,
        page: PageRequest,
    ) -> Result<(Vec<LedgerEntry>, u64)> {
        const FILTER: &str =
            "user_id = ?1 AND (?2 IS NULL OR venue_id = ?2) AND (?3 IS NULL OR type = ?3)";

        let total: u64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM point_transactions WHERE {}", FILTER),
            params![user_id, query.venue_id, query.entry_type],
            |row| row.get(0),
        )?;

        let sql = format!(
            "SELECT {} FROM point_transactions WHERE {} \
             ORDER BY created_at DESC, rowid DESC LIMIT ?4 OFFSET ?5",
            LEDGER_COLUMNS, FILTER
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let entries = stmt
            .query_map(
                params![
                    user_id,
                    query.venue_id,
                    query.entry_type,
                    page.per_page,
                    page.offset()
                ],
                ledger_from_row,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok((entries, total))
    }

    // ---- rewards ----

    pub fn insert_reward(&self, r: &Reward) -> Result<()> {
        self.conn.execute(
            "INSERT INTO rewards (id, venue_id, name, description, points_cost, stock, \
             is_active, valid_days, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                r.id,
                r.venue_id,
                r.name,
                r.description,
                r.points_cost,
                r.stock,
                r.is_active,
                r.valid_days,
                r.created_at,
            ],
        )?;
        Ok(())
    }

    pub fn get_reward(&self, id: Uuid) -> Result<Option<Reward>> {
        let sql = format!("SELECT {} FROM rewards WHERE id = ?1", REWARD_COLUMNS);
        Ok(self
            .conn
            .query_row(&sql, params![id], reward_from_row)
            .optional()?)
    }

    pub fn set_reward_stock(&self, id: Uuid, stock: Option<i64>) -> Result<()> {
        self.conn.execute(
            "UPDATE rewards SET stock = ?2 WHERE id = ?1",
            params![id, stock],
        )?;
        Ok(())
    }

    pub fn insert_redemption(&self, r: &Redemption) -> Result<()> {
        self.conn.execute(
            "INSERT INTO redemptions (id, reward_id, user_id, venue_id, points_spent, code, \
             status, expires_at, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                r.id,
                r.reward_id,
                r.user_id,
                r.venue_id,
                r.points_spent,
                r.code,
                r.status,
                r.expires_at,
                r.created_at,
            ],
        )?;
        Ok(())
    }

    // ---- badges ----

    pub fn insert_badge(&self, b: &BadgeConfig, now: DateTime<Utc>) -> Result<()> {
        self.conn.execute(
            "INSERT INTO badges (id, venue_id, name, description, required_visits, \
             required_spending, required_referrals, required_days, points_reward, \
             bonus_multiplier, is_active, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                b.id,
                b.venue_id,
                b.name,
                b.description,
                b.required_visits,
                b.required_spending,
                b.required_referrals,
                b.required_days,
                b.points_reward,
                b.bonus_multiplier,
                b.is_active,
                now,
            ],
        )?;
        Ok(())
    }

    pub fn venue_badges(&self, venue_id: Uuid) -> Result<Vec<BadgeConfig>> {
        let sql = format!(
            "SELECT {} FROM badges WHERE venue_id = ?1 ORDER BY created_at ASC, name ASC",
            BADGE_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let badges = stmt
            .query_map(params![venue_id], badge_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(badges)
    }

    /// Badges a user holds at a venue, with the time they were earned
    pub fn earned_badges(&self, user_id: Uuid, venue_id: Uuid) -> Result<Vec<(Uuid, DateTime<Utc>)>> {
        let mut stmt = self.conn.prepare(
            "SELECT badge_id, earned_at FROM user_badges WHERE user_id = ?1 AND venue_id = ?2",
        )?;
        let earned = stmt
            .query_map(params![user_id, venue_id], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(earned)
    }

    /// Record a badge once; returns false when the user already had it
    pub fn award_badge(
        &self,
        user_id: Uuid,
        badge_id: Uuid,
        venue_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO user_badges (user_id, badge_id, venue_id, earned_at) \
             VALUES (?1, ?2, ?3, ?4)",
            params![user_id, badge_id, venue_id, now],
        )?;
        Ok(inserted > 0)
    }

    // ---- employees ----

    pub fn insert_employee(&self, e: &Employee) -> Result<()> {
        self.conn.execute(
            "INSERT INTO employees (id, venue_id, name, role, is_active, pin_hash, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                e.id,
                e.venue_id,
                e.name,
                e.role,
                e.is_active,
                e.pin_hash,
                e.created_at
            ],
        )?;
        Ok(())
    }

    pub fn get_employee(&self, id: Uuid) -> Result<Option<Employee>> {
        let sql = format!("SELECT {} FROM employees WHERE id = ?1", EMPLOYEE_COLUMNS);
        Ok(self
            .conn
            .query_row(&sql, params![id], employee_from_row)
            .optional()?)
    }

    pub fn set_pin_hash(&self, id: Uuid, pin_hash: &str) -> Result<()> {
        self.conn.execute(
            "UPDATE employees SET pin_hash = ?2 WHERE id = ?1",
            params![id, pin_hash],
        )?;
        Ok(())
    }

    // ---- inventory ----

    pub fn insert_item(&self, item: &InventoryItem) -> Result<()> {
        self.conn.execute(
            "INSERT INTO inventory_items (id, venue_id, name, category, unit, storage_quantity, \
             bar_quantity, min_stock_level, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                item.id,
                item.venue_id,
                item.name,
                item.category,
                item.unit,
                item.storage_quantity,
                item.bar_quantity,
                item.min_stock_level,
                item.updated_at,
            ],
        )?;
        Ok(())
    }

    pub fn get_item(&self, id: Uuid) -> Result<Option<InventoryItem>> {
        let sql = format!("SELECT {} FROM inventory_items WHERE id = ?1", ITEM_COLUMNS);
        Ok(self
            .conn
            .query_row(&sql, params![id], item_from_row)
            .optional()?)
    }

    pub fn update_item_quantities(&self, item: &InventoryItem) -> Result<()> {
        self.conn.execute(
            "UPDATE inventory_items SET storage_quantity = ?2, bar_quantity = ?3, \
             updated_at = ?4 WHERE id = ?1",
            params![
                item.id,
                item.storage_quantity,
                item.bar_quantity,
                item.updated_at
            ],
        )?;
        Ok(())
    }

    pub fn venue_items(&self, venue_id: Uuid) -> Result<Vec<InventoryItem>> {
        let sql = format!(
            "SELECT {} FROM inventory_items WHERE venue_id = ?1 ORDER BY name ASC",
            ITEM_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let items = stmt
            .query_map(params![venue_id], item_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(items)
    }

    pub fn insert_transfer(&self, t: &InventoryTransfer) -> Result<()> {
        self.conn.execute(
            "INSERT INTO inventory_transfers (id, item_id, from_location, to_location, quantity, \
             employee_id, notes, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                t.id,
                t.item_id,
                t.from_location,
                t.to_location,
                t.quantity,
                t.employee_id,
                t.notes,
                t.created_at,
            ],
        )?;
        Ok(())
    }

    pub fn transfer_count(&self, item_id: Uuid) -> Result<u64> {
        let count: u64 = self.conn.query_row(
            "SELECT COUNT(*) FROM inventory_transfers WHERE item_id = ?1",
            params![item_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub fn insert_movement(&self, m: &StockMovement) -> Result<()> {
        self.conn.execute(
            "INSERT INTO stock_movements (id, item_id, movement_type, location, quantity_change, \
             quantity_after, employee_id, notes, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                m.id,
                m.item_id,
                m.movement_type,
                m.location,
                m.quantity_change,
                m.quantity_after,
                m.employee_id,
                m.notes,
                m.created_at,
            ],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, 21, 30, 0).unwrap()
    }

    fn seed(repo: &Repo<'_>) -> (User, Venue) {
        let user = User {
            id: Uuid::new_v4(),
            name: "Mara".to_string(),
            referred_by: None,
            created_at: now(),
        };
        repo.insert_user(&user).unwrap();
        let venue = Venue {
            id: Uuid::new_v4(),
            name: "Das Wohnzimmer".to_string(),
            is_active: true,
            points_multiplier: Multiplier::ONE,
            margins: VenueMargins::default(),
            total_check_ins: 0,
            total_revenue: Money::ZERO,
            total_points_issued: Points::ZERO,
            created_at: now(),
        };
        repo.insert_venue(&venue).unwrap();
        (user, venue)
    }

    #[test]
    fn test_migrations_are_recorded_once() {
        let store = Store::in_memory().unwrap();
        let count: i64 = store
            .read(|repo| {
                Ok(repo
                    .conn
                    .query_row("SELECT COUNT(*) FROM schema_migrations", [], |r| r.get(0))?)
            })
            .unwrap();
        assert_eq!(count, MIGRATIONS.len() as i64);
    }

    #[test]
    fn test_membership_round_trip() {
        let store = Store::in_memory().unwrap();
        store
            .write(|repo| {
                let (user, venue) = seed(repo);
                let mut m = VenueMembership::new(user.id, venue.id, now());
                m.tier = MembershipTier::Gold;
                m.points_balance = Points::from_hundredths(12_345);
                m.last_visit_at = Some(now() - Duration::days(2));
                repo.save_membership(&m)?;

                let loaded = repo.get_membership(user.id, venue.id)?.unwrap();
                assert_eq!(loaded, m);

                m.points_balance = Points::ZERO;
                repo.save_membership(&m)?;
                assert_eq!(
                    repo.get_membership(user.id, venue.id)?.unwrap().points_balance,
                    Points::ZERO
                );
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_failed_write_rolls_back() {
        let store = Store::in_memory().unwrap();
        let (user, _) = store.write(|repo| Ok(seed(repo))).unwrap();

        let result: Result<()> = store.write(|repo| {
            repo.insert_user(&User {
                id: Uuid::new_v4(),
                name: "Ghost".to_string(),
                referred_by: Some(user.id),
                created_at: now(),
            })?;
            Err(LoyaltyError::validation("abort"))
        });
        assert!(result.is_err());

        let users: i64 = store
            .read(|repo| {
                Ok(repo
                    .conn
                    .query_row("SELECT COUNT(*) FROM users", [], |r| r.get(0))?)
            })
            .unwrap();
        assert_eq!(users, 1);
    }

    #[test]
    fn test_tier_config_upsert() {
        let store = Store::in_memory().unwrap();
        store
            .write(|repo| {
                let (_, venue) = seed(repo);
                assert!(repo.get_tier_config(venue.id)?.is_none());

                let mut cfg = VenueTierConfig::default_for(venue.id);
                repo.save_tier_config(&cfg, now())?;
                cfg.gold.min_spend = Money::from_whole(2500);
                repo.save_tier_config(&cfg, now())?;

                assert_eq!(repo.get_tier_config(venue.id)?, Some(cfg));
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_on_disk_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("loyalty.db");

        let venue_id = {
            let store = Store::open(&path).unwrap();
            store.write(|repo| Ok(seed(repo).1.id)).unwrap()
        };

        let store = Store::open(&path).unwrap();
        let venue = store.read(|repo| repo.require_venue(venue_id)).unwrap();
        assert_eq!(venue.name, "Das Wohnzimmer");
        assert_eq!(venue.margins, VenueMargins::default());
    }
}
