//! Points expiration after inactivity

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::money::Points;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpirationPolicy {
    /// Days after the last activity at which the balance expires
    pub inactivity_days: u32,
    pub warning_days: u32,
    pub critical_days: u32,
}

impl Default for ExpirationPolicy {
    fn default() -> Self {
        Self {
            inactivity_days: 180,
            warning_days: 30,
            critical_days: 7,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpirationState {
    Active,
    ExpiringSoon,
    Critical,
    Expired,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExpirationStatus {
    pub state: ExpirationState,
    pub points_at_risk: Points,
    pub expires_at: DateTime<Utc>,
    pub days_until_expiry: i64,
}

impl ExpirationPolicy {
    pub fn expires_at(&self, last_activity: DateTime<Utc>) -> DateTime<Utc> {
        last_activity + Duration::days(self.inactivity_days as i64)
    }

    pub fn status(
        &self,
        balance: Points,
        last_activity: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> ExpirationStatus {
        let expires_at = self.expires_at(last_activity);
        let days_until_expiry = (expires_at - now).num_days().max(0);

        let state = if !balance.is_positive() {
            ExpirationState::Active
        } else if now >= expires_at {
            ExpirationState::Expired
        } else if days_until_expiry <= self.critical_days as i64 {
            ExpirationState::Critical
        } else if days_until_expiry <= self.warning_days as i64 {
            ExpirationState::ExpiringSoon
        } else {
            ExpirationState::Active
        };

        ExpirationStatus {
            state,
            points_at_risk: if balance.is_positive() {
                balance
            } else {
                Points::ZERO
            },
            expires_at,
            days_until_expiry,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 7, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_states() {
        let policy = ExpirationPolicy::default();
        let balance = Points::from_whole(120);

        let fresh = policy.status(balance, now() - Duration::days(10), now());
        assert_eq!(fresh.state, ExpirationState::Active);
        assert_eq!(fresh.days_until_expiry, 170);

        let soon = policy.status(balance, now() - Duration::days(160), now());
        assert_eq!(soon.state, ExpirationState::ExpiringSoon);

        let critical = policy.status(balance, now() - Duration::days(175), now());
        assert_eq!(critical.state, ExpirationState::Critical);

        let expired = policy.status(balance, now() - Duration::days(180), now());
        assert_eq!(expired.state, ExpirationState::Expired);
        assert_eq!(expired.points_at_risk, balance);
    }

    #[test]
    fn test_empty_balance_never_expires() {
        let policy = ExpirationPolicy::default();
        let status = policy.status(Points::ZERO, now() - Duration::days(400), now());
        assert_eq!(status.state, ExpirationState::Active);
        assert_eq!(status.points_at_risk, Points::ZERO);
    }
}
