//! Margin-based points calculation
//!
//! Points per item = amount × base rate × (category margin / venue max margin)
//! × product bonus. The order sum is then scaled by the venue multiplier, the
//! member's tier multiplier and the best badge multiplier they hold.
//!
//! Points are only earned on the cash part of a bill: when a member pays
//! partly with points, every item is scaled by `cash / total`.

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::error::{LoyaltyError, Result};
use crate::money::{div_round, Money, Multiplier, Percent, Points};

/// Default base rate: 10% of the purchase amount
pub const BASE_POINTS_RATE: Percent = Percent::from_hundredths(1_000);

/// Default share paid to each referrer: 25%
pub const REFERRAL_REWARD_SHARE: Percent = Percent::from_hundredths(2_500);

/// Depth of the referral chain
pub const REFERRAL_LEVELS: usize = 5;

/// Margin settings of a venue, used to weight categories against each other
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VenueMargins {
    pub food: Percent,
    pub beverage: Percent,
    pub default: Percent,
}

impl Default for VenueMargins {
    fn default() -> Self {
        Self {
            food: Percent::from_whole(30),
            beverage: Percent::from_whole(60),
            default: Percent::from_whole(40),
        }
    }
}

impl VenueMargins {
    pub fn margin_for(&self, category: &str) -> Percent {
        let category = category.to_ascii_lowercase();
        if category.contains("food") {
            self.food
        } else if category.contains("beverage") || category.contains("drink") {
            self.beverage
        } else {
            self.default
        }
    }

    /// Highest margin across categories; zero is treated as 100%
    pub fn max_margin(&self) -> Percent {
        let max = self.food.max(self.beverage).max(self.default);
        if max.is_positive() {
            max
        } else {
            Percent::HUNDRED
        }
    }

    pub fn is_valid(&self) -> bool {
        [self.food, self.beverage, self.default]
            .iter()
            .all(|m| m.is_valid_percentage())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    #[serde(default)]
    pub product_id: Option<Uuid>,
    pub name: String,
    #[serde(default = "default_category")]
    pub category: String,
    pub price: Money,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
    /// Product-level bonus, e.g. `2.00` to move stock
    #[serde(default)]
    pub bonus_multiplier: Option<Multiplier>,
}

fn default_category() -> String {
    "other".to_string()
}

fn default_quantity() -> u32 {
    1
}

impl OrderItem {
    /// Price × quantity, `None` on overflow
    pub fn subtotal(&self) -> Option<Money> {
        self.price.checked_mul(i64::from(self.quantity))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointsBreakdownItem {
    pub name: String,
    pub amount: Money,
    pub margin_percent: Percent,
    pub bonus_multiplier: Multiplier,
    pub points: Points,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointsBreakdown {
    pub base_points: Points,
    pub product_bonus: Points,
    pub venue_bonus: Points,
    pub tier_bonus: Points,
    pub badge_bonus: Points,
    pub total: Points,
    pub items: Vec<PointsBreakdownItem>,
}

/// Multipliers that apply on top of the item sum
#[derive(Debug, Clone, Copy)]
pub struct EarningMultipliers {
    pub venue: Multiplier,
    pub tier: Multiplier,
    pub badge: Multiplier,
}

impl Default for EarningMultipliers {
    fn default() -> Self {
        Self {
            venue: Multiplier::ONE,
            tier: Multiplier::ONE,
            badge: Multiplier::ONE,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PointsCalculator {
    pub base_rate: Percent,
    pub referral_share: Percent,
}

impl Default for PointsCalculator {
    fn default() -> Self {
        Self {
            base_rate: BASE_POINTS_RATE,
            referral_share: REFERRAL_REWARD_SHARE,
        }
    }
}

impl PointsCalculator {
    pub fn new(base_rate: Percent, referral_share: Percent) -> Self {
        Self {
            base_rate,
            referral_share,
        }
    }

    /// Points for a single amount, returned as (without bonus, with bonus)
    fn item_points(
        &self,
        amount: Money,
        margin: Percent,
        max_margin: Percent,
        bonus: Multiplier,
        cash_ratio: (Money, Money),
    ) -> Result<(Points, Points)> {
        if !amount.is_positive() || !max_margin.is_positive() {
            return Ok((Points::ZERO, Points::ZERO));
        }
        let (cash, total) = cash_ratio;
        if !total.is_positive() {
            return Ok((Points::ZERO, Points::ZERO));
        }

        // amount[h] × rate[h%] × margin[h%] × cash[h]
        // ---------------------------------------------
        //      10_000 × max_margin[h%] × total[h]
        let overflow = || LoyaltyError::validation("amount too large to calculate points");
        let num = [
            self.base_rate.hundredths(),
            margin.hundredths(),
            cash.hundredths(),
        ]
        .into_iter()
        .try_fold(amount.hundredths() as i128, |acc, f| acc.checked_mul(f as i128))
        .ok_or_else(overflow)?;
        let den = [max_margin.hundredths(), total.hundredths()]
            .into_iter()
            .try_fold(10_000i128, |acc, f| acc.checked_mul(f as i128))
            .ok_or_else(overflow)?;

        let bonused_num = num
            .checked_mul(bonus.hundredths() as i128)
            .ok_or_else(overflow)?;
        let bonused_den = den.checked_mul(100).ok_or_else(overflow)?;

        let base = i64::try_from(div_round(num, den)).map_err(|_| overflow())?;
        let bonused =
            i64::try_from(div_round(bonused_num, bonused_den)).map_err(|_| overflow())?;
        Ok((
            Points::from_hundredths(base),
            Points::from_hundredths(bonused),
        ))
    }

    /// Points for a purchase without item detail, at the given category
    pub fn simple_points(
        &self,
        amount: Money,
        category: &str,
        margins: &VenueMargins,
        bonus: Multiplier,
    ) -> Result<Points> {
        let (_, points) = self.item_points(
            amount,
            margins.margin_for(category),
            margins.max_margin(),
            bonus,
            (Money::from_whole(1), Money::from_whole(1)),
        )?;
        Ok(points)
    }

    /// Full breakdown for a bill.
    ///
    /// Without items the cash amount is weighted at the default margin.
    pub fn calculate_order(
        &self,
        margins: &VenueMargins,
        items: &[OrderItem],
        amount_total: Money,
        amount_cash: Money,
        multipliers: EarningMultipliers,
    ) -> Result<PointsBreakdown> {
        if !amount_cash.is_positive() {
            return Ok(PointsBreakdown::default());
        }

        let max_margin = margins.max_margin();
        let mut breakdown = PointsBreakdown::default();
        let mut bonused_sum = Points::ZERO;

        if items.is_empty() {
            let margin = margins.default;
            let (base, bonused) = self.item_points(
                amount_cash,
                margin,
                max_margin,
                Multiplier::ONE,
                (Money::from_whole(1), Money::from_whole(1)),
            )?;
            breakdown.base_points = base;
            bonused_sum = bonused;
            breakdown.items.push(PointsBreakdownItem {
                name: "Purchase".to_string(),
                amount: amount_cash,
                margin_percent: margin,
                bonus_multiplier: Multiplier::ONE,
                points: bonused,
            });
        } else {
            for item in items {
                let amount = item.subtotal().ok_or_else(|| {
                    LoyaltyError::validation(format!("subtotal of {} is too large", item.name))
                })?;
                let margin = margins.margin_for(&item.category);
                let bonus = item.bonus_multiplier.unwrap_or(Multiplier::ONE);
                let (base, bonused) = self.item_points(
                    amount,
                    margin,
                    max_margin,
                    bonus,
                    (amount_cash, amount_total),
                )?;
                breakdown.base_points += base;
                bonused_sum += bonused;
                breakdown.items.push(PointsBreakdownItem {
                    name: item.name.clone(),
                    amount,
                    margin_percent: margin,
                    bonus_multiplier: bonus,
                    points: bonused,
                });
            }
        }

        breakdown.product_bonus = bonused_sum - breakdown.base_points;

        let after_venue = bonused_sum.times(multipliers.venue);
        breakdown.venue_bonus = after_venue - bonused_sum;

        let after_tier = after_venue.times(multipliers.tier);
        breakdown.tier_bonus = after_tier - after_venue;

        let after_badge = after_tier.times(multipliers.badge);
        breakdown.badge_bonus = after_badge - after_tier;

        breakdown.total = after_badge;

        debug!(
            "Order points: base={} product={} venue={} tier={} badge={} total={}",
            breakdown.base_points,
            breakdown.product_bonus,
            breakdown.venue_bonus,
            breakdown.tier_bonus,
            breakdown.badge_bonus,
            breakdown.total
        );

        Ok(breakdown)
    }

    /// Reward paid to each referrer in the chain
    pub fn referral_reward(&self, points_earned: Points) -> Points {
        points_earned.percent(self.referral_share)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn margins() -> VenueMargins {
        VenueMargins {
            food: Percent::from_whole(30),
            beverage: Percent::from_whole(80),
            default: Percent::from_whole(50),
        }
    }

    fn item(name: &str, category: &str, price: i64, qty: u32, bonus: Option<i64>) -> OrderItem {
        OrderItem {
            product_id: None,
            name: name.to_string(),
            category: category.to_string(),
            price: Money::from_whole(price),
            quantity: qty,
            bonus_multiplier: bonus.map(Multiplier::from_hundredths),
        }
    }

    #[test]
    fn test_margin_lookup() {
        let m = margins();
        assert_eq!(m.margin_for("Food"), Percent::from_whole(30));
        assert_eq!(m.margin_for("beverages"), Percent::from_whole(80));
        assert_eq!(m.margin_for("soft drinks"), Percent::from_whole(80));
        assert_eq!(m.margin_for("merch"), Percent::from_whole(50));
        assert_eq!(m.max_margin(), Percent::from_whole(80));
    }

    #[test]
    fn test_zero_margins_fall_back_to_hundred() {
        let m = VenueMargins {
            food: Percent::ZERO,
            beverage: Percent::ZERO,
            default: Percent::ZERO,
        };
        assert_eq!(m.max_margin(), Percent::HUNDRED);
    }

    #[test]
    fn test_simple_points_examples() {
        let calc = PointsCalculator::default();
        let m = margins();
        // 100 × 10% × 80/80
        assert_eq!(
            calc.simple_points(Money::from_whole(100), "beverages", &m, Multiplier::ONE).unwrap(),
            Points::from_whole(10)
        );
        // 100 × 10% × 30/80
        assert_eq!(
            calc.simple_points(Money::from_whole(100), "food", &m, Multiplier::ONE).unwrap(),
            Points::from_hundredths(375)
        );
        // 2x bonus on drinks
        assert_eq!(
            calc.simple_points(
                Money::from_whole(100),
                "beverages",
                &m,
                Multiplier::from_hundredths(200)
            )
            .unwrap(),
            Points::from_whole(20)
        );
        assert_eq!(
            calc.simple_points(Money::ZERO, "food", &m, Multiplier::ONE).unwrap(),
            Points::ZERO
        );
    }

    #[test]
    fn test_order_breakdown() {
        let calc = PointsCalculator::default();
        let items = vec![
            item("Cocktail", "beverage", 12, 2, Some(200)),
            item("Burger", "food", 15, 1, None),
        ];
        let breakdown = calc.calculate_order(
            &margins(),
            &items,
            Money::from_whole(39),
            Money::from_whole(39),
            EarningMultipliers::default(),
        )
        .unwrap();

        // Cocktails: 24 × 10% × 1.0 = 2.40, doubled = 4.80
        // Burger: 15 × 10% × 0.375 = 0.5625 -> 0.56
        assert_eq!(breakdown.base_points, Points::from_hundredths(296));
        assert_eq!(breakdown.product_bonus, Points::from_hundredths(240));
        assert_eq!(breakdown.total, Points::from_hundredths(536));
        assert_eq!(breakdown.items.len(), 2);
        assert_eq!(breakdown.items[0].points, Points::from_hundredths(480));
    }

    #[test]
    fn test_points_only_on_cash_portion() {
        let calc = PointsCalculator::default();
        let items = vec![item("Champagne", "beverage", 100, 1, None)];
        let breakdown = calc.calculate_order(
            &margins(),
            &items,
            Money::from_whole(100),
            Money::from_whole(60),
            EarningMultipliers::default(),
        )
        .unwrap();
        assert_eq!(breakdown.total, Points::from_whole(6));

        let nothing = calc.calculate_order(
            &margins(),
            &items,
            Money::from_whole(100),
            Money::ZERO,
            EarningMultipliers::default(),
        )
        .unwrap();
        assert_eq!(nothing.total, Points::ZERO);
    }

    #[test]
    fn test_multiplier_stages() {
        let calc = PointsCalculator::default();
        let breakdown = calc.calculate_order(
            &margins(),
            &[item("Bottle", "beverage", 100, 1, None)],
            Money::from_whole(100),
            Money::from_whole(100),
            EarningMultipliers {
                venue: Multiplier::from_hundredths(110),
                tier: Multiplier::from_hundredths(150),
                badge: Multiplier::from_hundredths(110),
            },
        )
        .unwrap();
        assert_eq!(breakdown.base_points, Points::from_whole(10));
        assert_eq!(breakdown.venue_bonus, Points::from_whole(1));
        assert_eq!(breakdown.tier_bonus, Points::from_hundredths(550));
        assert_eq!(breakdown.badge_bonus, Points::from_hundredths(165));
        assert_eq!(breakdown.total, Points::from_hundredths(1815));
    }

    #[test]
    fn test_order_without_items_uses_default_margin() {
        let calc = PointsCalculator::default();
        let breakdown = calc.calculate_order(
            &margins(),
            &[],
            Money::from_whole(80),
            Money::from_whole(80),
            EarningMultipliers::default(),
        )
        .unwrap();
        // 80 × 10% × 50/80
        assert_eq!(breakdown.total, Points::from_whole(5));
    }

    #[test]
    fn test_oversized_items_are_rejected() {
        let calc = PointsCalculator::default();
        let mut huge = item("Yacht", "beverage", 0, u32::MAX, Some(1_000_000));
        huge.price = Money::from_hundredths(i64::MAX / 1_000);
        assert_eq!(huge.subtotal(), None);
        let err = calc
            .calculate_order(
                &margins(),
                &[huge],
                Money::from_whole(100),
                Money::from_whole(100),
                EarningMultipliers::default(),
            )
            .unwrap_err();
        assert!(matches!(err, LoyaltyError::Validation(_)));

        let bottle = item("Bottle", "beverage", 100_000_000_000, 1, Some(1_000_000));
        let err = calc
            .calculate_order(
                &margins(),
                &[bottle],
                Money::from_whole(100_000_000_000),
                Money::from_whole(100_000_000_000),
                EarningMultipliers::default(),
            )
            .unwrap_err();
        assert!(matches!(err, LoyaltyError::Validation(_)));
    }

    #[test]
    fn test_referral_reward() {
        let calc = PointsCalculator::default();
        assert_eq!(
            calc.referral_reward(Points::from_whole(10)),
            Points::from_hundredths(250)
        );
    }
}
