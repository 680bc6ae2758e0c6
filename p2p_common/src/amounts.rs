use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, AddAssign, Neg, Sub, SubAssign},
};

use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

use crate::op;

/// Number of decimal places carried by [`TokenAmount`]. USDT on the supported chains uses 6.
pub const TOKEN_DECIMALS: u32 = 6;
/// Number of decimal places carried by [`FiatAmount`].
pub const FIAT_DECIMALS: u32 = 2;

const TOKEN_SCALE: i64 = 10i64.pow(TOKEN_DECIMALS);
const FIAT_SCALE: i64 = 10i64.pow(FIAT_DECIMALS);

#[derive(Debug, Clone, Error)]
#[error("Value cannot be represented as an amount: {0}")]
pub struct AmountConversionError(String);

//--------------------------------------     TokenAmount     ---------------------------------------------------------
/// A quantity of the escrowed token, stored as an integer number of the token's smallest unit (10^-6).
#[derive(Debug, Clone, Copy, Default, Type, PartialEq, Eq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct TokenAmount(i64);

op!(binary TokenAmount, Add, add);
op!(binary TokenAmount, Sub, sub);
op!(inplace TokenAmount, AddAssign, add_assign);
op!(inplace TokenAmount, SubAssign, sub_assign);
op!(unary TokenAmount, Neg, neg);

impl Sum for TokenAmount {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

impl From<i64> for TokenAmount {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl TryFrom<u64> for TokenAmount {
    type Error = AmountConversionError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        i64::try_from(value)
            .map(Self)
            .map_err(|_| AmountConversionError(format!("{value} is too large to convert to a token amount")))
    }
}

impl Display for TokenAmount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let scale = TOKEN_SCALE.unsigned_abs();
        write!(f, "{sign}{}.{:06}", abs / scale, abs % scale)
    }
}

impl TokenAmount {
    pub fn value(&self) -> i64 {
        self.0
    }

    /// Creates an amount from a whole number of tokens.
    pub fn from_tokens(tokens: i64) -> Self {
        Self(tokens * TOKEN_SCALE)
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Returns the given fraction of this amount, expressed in basis points, rounded towards zero.
    ///
    /// `TokenAmount::from_tokens(100).basis_points(80)` is 0.8 tokens.
    pub fn basis_points(&self, bps: u32) -> Self {
        let scaled = i128::from(self.0) * i128::from(bps) / 10_000;
        // |scaled| <= |self.0| for bps <= 10_000, and larger fractions are a configuration error caught upstream
        Self(i64::try_from(scaled).unwrap_or(i64::MAX))
    }

    /// The fiat value of this amount at `price` (fiat per whole token), rounded towards zero.
    pub fn total_at(&self, price: FiatAmount) -> FiatAmount {
        let total = i128::from(self.0) * i128::from(price.value()) / i128::from(TOKEN_SCALE);
        FiatAmount::from(i64::try_from(total).unwrap_or(i64::MAX))
    }
}

//--------------------------------------     FiatAmount      ---------------------------------------------------------
/// A fiat quantity (a price per token, or a total), stored as an integer number of hundredths.
#[derive(Debug, Clone, Copy, Default, Type, PartialEq, Eq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct FiatAmount(i64);

op!(binary FiatAmount, Add, add);
op!(binary FiatAmount, Sub, sub);

impl From<i64> for FiatAmount {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl Display for FiatAmount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let scale = FIAT_SCALE.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / scale, abs % scale)
    }
}

impl FiatAmount {
    pub fn value(&self) -> i64 {
        self.0
    }

    /// Creates an amount from a whole number of fiat units.
    pub fn from_units(units: i64) -> Self {
        Self(units * FIAT_SCALE)
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn display() {
        assert_eq!(TokenAmount::from(1_500_000).to_string(), "1.500000");
        assert_eq!(TokenAmount::from(-25).to_string(), "-0.000025");
        assert_eq!(FiatAmount::from(3_505).to_string(), "35.05");
        assert_eq!(FiatAmount::from_units(7).to_string(), "7.00");
    }

    #[test]
    fn commission_fractions() {
        let amount = TokenAmount::from_tokens(100);
        assert_eq!(amount.basis_points(80), TokenAmount::from(800_000));
        assert_eq!(amount.basis_points(10), TokenAmount::from(100_000));
        // rounds down at the smallest unit
        assert_eq!(TokenAmount::from(99).basis_points(80), TokenAmount::from(0));
    }

    #[test]
    fn fiat_totals() {
        let amount = TokenAmount::from_tokens(60);
        let price = FiatAmount::from_units(35);
        assert_eq!(amount.total_at(price), FiatAmount::from_units(2_100));
        let half = TokenAmount::from(500_000);
        assert_eq!(half.total_at(FiatAmount::from(3_333)), FiatAmount::from(1_666));
    }

    #[test]
    fn sums_and_serde() {
        let total: TokenAmount = [1, 2, 3].into_iter().map(TokenAmount::from_tokens).sum();
        assert_eq!(total, TokenAmount::from_tokens(6));
        let json = serde_json::to_string(&total).unwrap();
        assert_eq!(json, "6000000");
        let back: TokenAmount = serde_json::from_str(&json).unwrap();
        assert_eq!(back, total);
    }

    #[test]
    fn conversion_from_u64() {
        assert!(TokenAmount::try_from(u64::MAX).is_err());
        assert_eq!(TokenAmount::try_from(42u64).unwrap(), TokenAmount::from(42));
    }
}
