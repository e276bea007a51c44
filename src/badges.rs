//! Achievement badges
//!
//! A badge lists up to three thresholds (visits, spending, referrals). Each
//! present threshold contributes `min(1, actual / required)` to the progress
//! score and the badge is earned once all of them are met. With
//! `required_days` set, visits are counted within that trailing window only.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{LoyaltyError, Result};
use crate::money::{Money, Multiplier, Points};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BadgeConfig {
    pub id: Uuid,
    pub venue_id: Uuid,
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
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

/// What a member has done at a venue, as seen by badge rules
#[derive(Debug, Clone, Default)]
pub struct MemberActivity {
    pub total_visits: u32,
    pub total_spent: Money,
    pub referrals: u32,
    /// One timestamp per visit day
    pub visit_times: Vec<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BadgeProgress {
    pub badge_id: Uuid,
    pub name: String,
    pub earned: bool,
    /// 0.0 to 1.0
    pub progress: f64,
    pub earned_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    pub earned: bool,
    pub progress: f64,
}

fn ratio(actual: f64, required: f64) -> f64 {
    if required <= 0.0 {
        1.0
    } else {
        (actual / required).min(1.0)
    }
}

impl BadgeConfig {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(LoyaltyError::validation("badge name is required"));
        }
        if self.required_visits.is_none()
            && self.required_spending.is_none()
            && self.required_referrals.is_none()
        {
            return Err(LoyaltyError::validation(
                "badge needs at least one requirement",
            ));
        }
        if self.required_visits == Some(0) || self.required_referrals == Some(0) {
            return Err(LoyaltyError::validation("badge requirements must be positive"));
        }
        if matches!(self.required_spending, Some(s) if !s.is_positive()) {
            return Err(LoyaltyError::validation("badge spending must be positive"));
        }
        if self.required_days.is_some() && self.required_visits.is_none() {
            return Err(LoyaltyError::validation(
                "required_days only applies together with required_visits",
            ));
        }
        if self.required_days == Some(0) {
            return Err(LoyaltyError::validation("required_days must be positive"));
        }
        if self.points_reward.is_negative() {
            return Err(LoyaltyError::validation("points reward must not be negative"));
        }
        if matches!(self.bonus_multiplier, Some(m) if m < Multiplier::ONE) {
            return Err(LoyaltyError::validation(
                "bonus multiplier must be at least 1.00",
            ));
        }
        Ok(())
    }

    pub fn evaluate(&self, activity: &MemberActivity, now: DateTime<Utc>) -> Evaluation {
        let mut criteria = 0u32;
        let mut met = 0u32;
        let mut progress_sum = 0.0;

        if let Some(required) = self.required_visits {
            let visits = match self.required_days {
                Some(days) => {
                    let since = now - Duration::days(days as i64);
                    activity
                        .visit_times
                        .iter()
                        .filter(|t| **t > since && **t <= now)
                        .count() as u32
                }
                None => activity.total_visits,
            };
            criteria += 1;
            progress_sum += ratio(visits as f64, required as f64);
            if visits >= required {
                met += 1;
            }
        }

        if let Some(required) = self.required_spending {
            criteria += 1;
            progress_sum += ratio(activity.total_spent.to_f64(), required.to_f64());
            if activity.total_spent >= required {
                met += 1;
            }
        }

        if let Some(required) = self.required_referrals {
            criteria += 1;
            progress_sum += ratio(activity.referrals as f64, required as f64);
            if activity.referrals >= required {
                met += 1;
            }
        }

        if criteria == 0 {
            return Evaluation {
                earned: false,
                progress: 0.0,
            };
        }

        Evaluation {
            earned: met == criteria,
            progress: progress_sum / criteria as f64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn badge() -> BadgeConfig {
        BadgeConfig {
            id: Uuid::new_v4(),
            venue_id: Uuid::new_v4(),
            name: "Regular".to_string(),
            description: "Visit 10 times in 30 days".to_string(),
            required_visits: Some(10),
            required_spending: None,
            required_referrals: None,
            required_days: Some(30),
            points_reward: Points::from_whole(500),
            bonus_multiplier: None,
            is_active: true,
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 1, 23, 0, 0).unwrap()
    }

    #[test]
    fn test_visits_within_window() {
        let b = badge();
        let recent: Vec<_> = (0..10).map(|d| now() - Duration::days(d)).collect();
        let activity = MemberActivity {
            total_visits: 10,
            visit_times: recent,
            ..Default::default()
        };
        let eval = b.evaluate(&activity, now());
        assert!(eval.earned);
        assert_eq!(eval.progress, 1.0);
    }

    #[test]
    fn test_old_visits_do_not_count_for_window() {
        let b = badge();
        let mut times: Vec<_> = (0..5).map(|d| now() - Duration::days(d)).collect();
        times.extend((40..45).map(|d| now() - Duration::days(d)));
        let activity = MemberActivity {
            total_visits: 10,
            visit_times: times,
            ..Default::default()
        };
        let eval = b.evaluate(&activity, now());
        assert!(!eval.earned);
        assert!((eval.progress - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_multiple_criteria_average_progress() {
        let b = BadgeConfig {
            required_visits: Some(4),
            required_days: None,
            required_spending: Some(Money::from_whole(1000)),
            ..badge()
        };
        let activity = MemberActivity {
            total_visits: 4,
            total_spent: Money::from_whole(250),
            ..Default::default()
        };
        let eval = b.evaluate(&activity, now());
        assert!(!eval.earned);
        assert!((eval.progress - 0.625).abs() < 1e-9);
    }

    #[test]
    fn test_referral_badge() {
        let b = BadgeConfig {
            name: "Ambassador".to_string(),
            required_visits: None,
            required_days: None,
            required_referrals: Some(5),
            bonus_multiplier: Some(Multiplier::from_hundredths(110)),
            ..badge()
        };
        assert!(b.validate().is_ok());
        let activity = MemberActivity {
            referrals: 5,
            ..Default::default()
        };
        assert!(b.evaluate(&activity, now()).earned);
    }

    #[test]
    fn test_validation() {
        let no_requirements = BadgeConfig {
            required_visits: None,
            required_days: None,
            ..badge()
        };
        assert!(no_requirements.validate().is_err());

        let window_without_visits = BadgeConfig {
            required_visits: None,
            required_spending: Some(Money::from_whole(10)),
            ..badge()
        };
        assert!(window_without_visits.validate().is_err());

        let weak_multiplier = BadgeConfig {
            bonus_multiplier: Some(Multiplier::from_hundredths(90)),
            ..badge()
        };
        assert!(weak_multiplier.validate().is_err());
    }
}
