//! Fixed-point values with two decimals
//!
//! Euro amounts, points, multipliers and percentages are all carried as
//! signed hundredths. Scaling by ratios happens in `i128` and rounds once,
//! half away from zero.

use std::fmt;
use std::str::FromStr;

use rusqlite::types::{FromSql, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Points granted per euro when paying with points (10 points = 1 euro)
pub const POINTS_PER_EURO: i64 = 10;

/// Divide rounding half away from zero. `den` must be positive.
pub fn div_round(num: i128, den: i128) -> i128 {
    let half = den / 2;
    if num >= 0 {
        (num + half) / den
    } else {
        (num - half) / den
    }
}

/// Parse a decimal string such as `"12.5"`, `"-3"` or `"0.05"` into hundredths.
fn parse_hundredths(s: &str) -> Result<i64, ParseFixedError> {
    let s = s.trim();
    let (negative, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    let (whole, frac) = match digits.split_once('.') {
        Some((w, f)) => (w, f),
        None => (digits, ""),
    };
    if whole.is_empty() && frac.is_empty() {
        return Err(ParseFixedError(s.to_string()));
    }
    if !whole.chars().all(|c| c.is_ascii_digit()) || !frac.chars().all(|c| c.is_ascii_digit()) {
        return Err(ParseFixedError(s.to_string()));
    }

    let whole: i64 = if whole.is_empty() {
        0
    } else {
        whole.parse().map_err(|_| ParseFixedError(s.to_string()))?
    };

    // Third decimal decides rounding, anything past it is ignored
    let mut frac_digits = frac.bytes().map(|b| (b - b'0') as i64);
    let tenths = frac_digits.next().unwrap_or(0);
    let hundredths = frac_digits.next().unwrap_or(0);
    let round_up = frac_digits.next().map(|d| d >= 5).unwrap_or(false);

    let value = whole
        .checked_mul(100)
        .and_then(|v| v.checked_add(tenths * 10 + hundredths + i64::from(round_up)))
        .ok_or_else(|| ParseFixedError(s.to_string()))?;

    Ok(if negative { -value } else { value })
}

fn format_hundredths(value: i64, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let sign = if value < 0 { "-" } else { "" };
    let abs = value.unsigned_abs();
    write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseFixedError(pub String);

impl fmt::Display for ParseFixedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid decimal value: {:?}", self.0)
    }
}

impl std::error::Error for ParseFixedError {}

/// Accepts `"12.50"` as well as `12.5` on the wire
#[derive(Deserialize)]
#[serde(untagged)]
enum WireDecimal {
    Text(String),
    Int(i64),
    Float(f64),
}

impl WireDecimal {
    fn into_hundredths(self) -> Result<i64, String> {
        match self {
            WireDecimal::Text(s) => parse_hundredths(&s).map_err(|e| e.to_string()),
            WireDecimal::Int(i) => i
                .checked_mul(100)
                .ok_or_else(|| format!("decimal out of range: {}", i)),
            WireDecimal::Float(f) if f.is_finite() => Ok((f * 100.0).round() as i64),
            WireDecimal::Float(f) => Err(format!("invalid decimal value: {}", f)),
        }
    }
}

macro_rules! fixed2 {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(i64);

        impl $name {
            pub const ZERO: Self = Self(0);

            /// Build from hundredths (`1250` is `12.50`)
            pub const fn from_hundredths(hundredths: i64) -> Self {
                Self(hundredths)
            }

            pub const fn from_whole(whole: i64) -> Self {
                Self(whole * 100)
            }

            pub const fn hundredths(self) -> i64 {
                self.0
            }

            pub fn is_zero(self) -> bool {
                self.0 == 0
            }

            pub fn is_positive(self) -> bool {
                self.0 > 0
            }

            pub fn is_negative(self) -> bool {
                self.0 < 0
            }

            pub fn abs(self) -> Self {
                Self(self.0.abs())
            }

            pub fn max(self, other: Self) -> Self {
                Self(self.0.max(other.0))
            }

            pub fn min(self, other: Self) -> Self {
                Self(self.0.min(other.0))
            }

            pub fn checked_add(self, other: Self) -> Option<Self> {
                self.0.checked_add(other.0).map(Self)
            }

            pub fn checked_sub(self, other: Self) -> Option<Self> {
                self.0.checked_sub(other.0).map(Self)
            }

            /// Multiply by a whole factor, `None` on overflow
            pub fn checked_mul(self, factor: i64) -> Option<Self> {
                self.0.checked_mul(factor).map(Self)
            }

            /// Saturates at zero instead of going negative
            pub fn saturating_sub(self, other: Self) -> Self {
                Self((self.0 - other.0).max(0))
            }

            pub fn to_f64(self) -> f64 {
                self.0 as f64 / 100.0
            }
        }

        impl std::ops::Add for $name {
            type Output = Self;
            fn add(self, rhs: Self) -> Self {
                Self(self.0 + rhs.0)
            }
        }

        impl std::ops::AddAssign for $name {
            fn add_assign(&mut self, rhs: Self) {
                self.0 += rhs.0;
            }
        }

        impl std::ops::Sub for $name {
            type Output = Self;
            fn sub(self, rhs: Self) -> Self {
                Self(self.0 - rhs.0)
            }
        }

        impl std::ops::SubAssign for $name {
            fn sub_assign(&mut self, rhs: Self) {
                self.0 -= rhs.0;
            }
        }

        impl std::ops::Neg for $name {
            type Output = Self;
            fn neg(self) -> Self {
                Self(-self.0)
            }
        }

        impl std::iter::Sum for $name {
            fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
                Self(iter.map(|v| v.0).sum())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                format_hundredths(self.0, f)
            }
        }

        impl FromStr for $name {
            type Err = ParseFixedError;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                parse_hundredths(s).map(Self)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                WireDecimal::deserialize(deserializer)?
                    .into_hundredths()
                    .map(Self)
                    .map_err(serde::de::Error::custom)
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.0))
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                i64::column_result(value).map(Self)
            }
        }
    };
}

fixed2!(
    /// Euro amount
    Money
);
fixed2!(
    /// Loyalty points, venue scoped
    Points
);
fixed2!(
    /// Earning multiplier, `1.00` means no bonus
    Multiplier
);
fixed2!(
    /// Percentage in the 0-100 range
    Percent
);

impl Multiplier {
    pub const ONE: Self = Self(100);
}

impl Percent {
    pub const HUNDRED: Self = Self(10_000);
}

impl Points {
    /// Scale by a multiplier, rounding to two decimals
    pub fn times(self, multiplier: Multiplier) -> Self {
        Self(div_round(self.0 as i128 * multiplier.0 as i128, 100) as i64)
    }

    /// Take a percentage share, rounding to two decimals
    pub fn percent(self, share: Percent) -> Self {
        Self(div_round(self.0 as i128 * share.0 as i128, 10_000) as i64)
    }

    /// Points needed to pay the given euro amount, `None` on overflow
    pub fn from_money(amount: Money) -> Option<Self> {
        amount.0.checked_mul(POINTS_PER_EURO).map(Self)
    }

    /// Euro value of a points balance, rounded to the cent
    pub fn to_money(self) -> Money {
        Money(div_round(self.0 as i128, POINTS_PER_EURO as i128) as i64)
    }
}

impl Money {
    /// Scale by the ratio `num / den`, rounding to the cent. `den` must be positive.
    pub fn scale(self, num: Money, den: Money) -> Self {
        if den.0 <= 0 {
            return Money::ZERO;
        }
        Self(div_round(self.0 as i128 * num.0 as i128, den.0 as i128) as i64)
    }
}

impl Percent {
    pub fn is_valid_percentage(self) -> bool {
        (0..=10_000).contains(&self.0)
    }
}
