//! Visit streaks
//!
//! Days are UTC calendar days. A visit on the day after the last one extends
//! the streak; a gap restarts it at 1. Several visits on the same day count
//! once.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::money::Points;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreakMilestone {
    pub days: u32,
    pub bonus: Points,
}

pub fn default_milestones() -> Vec<StreakMilestone> {
    vec![
        StreakMilestone {
            days: 7,
            bonus: Points::from_whole(50),
        },
        StreakMilestone {
            days: 14,
            bonus: Points::from_whole(100),
        },
        StreakMilestone {
            days: 30,
            bonus: Points::from_whole(250),
        },
    ]
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreakState {
    pub current_streak: u32,
    pub longest_streak: u32,
    pub last_visit_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreakUpdate {
    /// False for a repeat visit on the same day
    pub new_visit_day: bool,
    pub bonus: Points,
}

impl StreakState {
    /// Record a visit at `now` and return the milestone bonus it unlocked
    pub fn record_visit(&mut self, now: DateTime<Utc>, milestones: &[StreakMilestone]) -> StreakUpdate {
        let today = now.date_naive();

        let new_visit_day = match self.last_visit_at.map(|t| t.date_naive()) {
            None => {
                self.current_streak = 1;
                true
            }
            Some(last) if last == today => false,
            // Out-of-order timestamps do not touch the streak
            Some(last) if last > today => false,
            Some(last) if last.succ_opt() == Some(today) => {
                self.current_streak += 1;
                true
            }
            Some(_) => {
                self.current_streak = 1;
                true
            }
        };

        if !new_visit_day {
            return StreakUpdate {
                new_visit_day,
                bonus: Points::ZERO,
            };
        }

        self.last_visit_at = Some(now);
        self.longest_streak = self.longest_streak.max(self.current_streak);

        let bonus = milestones
            .iter()
            .find(|m| m.days == self.current_streak)
            .map(|m| m.bonus)
            .unwrap_or(Points::ZERO);

        StreakUpdate {
            new_visit_day,
            bonus,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 22, 0, 0).unwrap()
    }

    #[test]
    fn test_first_visit_starts_streak() {
        let mut state = StreakState::default();
        let update = state.record_visit(start(), &default_milestones());
        assert!(update.new_visit_day);
        assert_eq!(state.current_streak, 1);
        assert_eq!(state.longest_streak, 1);
    }

    #[test]
    fn test_same_day_visit_is_ignored() {
        let mut state = StreakState::default();
        state.record_visit(start(), &default_milestones());
        let update = state.record_visit(start() + Duration::hours(1), &default_milestones());
        assert!(!update.new_visit_day);
        assert_eq!(state.current_streak, 1);
        assert_eq!(state.last_visit_at, Some(start()));
    }

    #[test]
    fn test_seven_day_milestone() {
        let mut state = StreakState::default();
        let milestones = default_milestones();
        let mut bonus = Points::ZERO;
        for day in 0..7 {
            bonus = state
                .record_visit(start() + Duration::days(day), &milestones)
                .bonus;
        }
        assert_eq!(state.current_streak, 7);
        assert_eq!(bonus, Points::from_whole(50));

        let eighth = state.record_visit(start() + Duration::days(7), &milestones);
        assert_eq!(eighth.bonus, Points::ZERO);
    }

    #[test]
    fn test_gap_resets_but_keeps_longest() {
        let mut state = StreakState::default();
        let milestones = default_milestones();
        for day in 0..3 {
            state.record_visit(start() + Duration::days(day), &milestones);
        }
        state.record_visit(start() + Duration::days(5), &milestones);
        assert_eq!(state.current_streak, 1);
        assert_eq!(state.longest_streak, 3);
    }
}
