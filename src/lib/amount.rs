//! Money in minor units
//!
//! Every amount handled by the raffle is an integer number of kopiykas
//! (or cents). Conversion to major units only happens on display.

use serde::{Deserialize, Serialize};
use std::{fmt, ops};

/// A monetary value counted in minor units
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Amount(pub i64);

impl Amount {
    pub const ZERO: Self = Self(0);

    /// Build from a whole number of major units
    pub fn from_major(major: i64) -> Self {
        Self(major * 100)
    }

    /// Integral part in major units, truncated towards zero
    pub fn major(self) -> i64 {
        self.0 / 100
    }

    /// How many whole `unit`s fit into `self`
    ///
    /// Rounds towards negative infinity, so any negative amount
    /// (e.g. a withdrawal from the jar) fits zero or fewer times.
    /// `unit` must be strictly positive.
    pub fn times(self, unit: Amount) -> i64 {
        debug_assert!(unit.0 > 0);
        self.0.div_euclid(unit.0)
    }
}

impl ops::Add for Amount {
    type Output = Self;
    fn add(self, other: Self) -> Self {
        Self(self.0 + other.0)
    }
}

impl ops::AddAssign for Amount {
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl std::iter::Sum for Amount {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, |acc, a| acc + a)
    }
}

/// `1234567` is displayed as `12,345.67`
impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let digits = (abs / 100).to_string();
        let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
        for (i, c) in digits.chars().enumerate() {
            if i > 0 && (digits.len() - i) % 3 == 0 {
                grouped.push(',');
            }
            grouped.push(c);
        }
        write!(f, "{}{}.{:02}", sign, grouped, abs % 100)
    }
}
