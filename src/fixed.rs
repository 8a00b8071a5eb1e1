/// Fixed-point decimal for prices and quantities
///
/// Every price and quantity on the wire and in snapshots is an integer scaled by 10^7.
/// Parsing and rendering go straight between the integer and its decimal string, so no
/// floating-point value ever touches book state.

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Number of fractional digits carried by every value.
pub const DECIMALS: usize = 7;

/// 10^DECIMALS
pub const SCALE: i64 = 10_000_000;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseFixedError {
    #[error("empty decimal string")]
    Empty,

    #[error("invalid character {0:?} in decimal string")]
    InvalidDigit(char),

    #[error("more than {DECIMALS} significant fractional digits in {0:?}")]
    TooManyDecimals(String),

    #[error("decimal {0:?} overflows a 64-bit fixed-point value")]
    Overflow(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct FixedPoint(i64);

impl FixedPoint {
    pub const ZERO: FixedPoint = FixedPoint(0);

    /// Wrap an already-scaled integer.
    pub const fn from_raw(raw: i64) -> Self {
        FixedPoint(raw)
    }

    /// The scaled integer.
    pub const fn raw(self) -> i64 {
        self.0
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub const fn is_positive(self) -> bool {
        self.0 > 0
    }

    /// Parse a decimal string such as `"0.0011000"` without going through `f64`.
    ///
    /// Fewer than seven fractional digits are right-padded; extra digits are accepted
    /// only when they are zeros, since anything else cannot be represented exactly.
    pub fn parse(s: &str) -> Result<Self, ParseFixedError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ParseFixedError::Empty);
        }

        let (negative, body) = match s.as_bytes()[0] {
            b'-' => (true, &s[1..]),
            b'+' => (false, &s[1..]),
            _ => (false, s),
        };

        let (int_part, frac_part) = match body.split_once('.') {
            Some((i, f)) => (i, f),
            None => (body, ""),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(ParseFixedError::Empty);
        }

        let overflow = || ParseFixedError::Overflow(s.to_string());

        let mut int_value: i64 = 0;
        for c in int_part.chars() {
            let digit = c.to_digit(10).ok_or(ParseFixedError::InvalidDigit(c))? as i64;
            int_value = int_value
                .checked_mul(10)
                .and_then(|v| v.checked_add(digit))
                .ok_or_else(overflow)?;
        }

        let mut frac_value: i64 = 0;
        for (idx, c) in frac_part.chars().enumerate() {
            let digit = c.to_digit(10).ok_or(ParseFixedError::InvalidDigit(c))? as i64;
            if idx < DECIMALS {
                frac_value = frac_value * 10 + digit;
            } else if digit != 0 {
                return Err(ParseFixedError::TooManyDecimals(s.to_string()));
            }
        }
        for _ in frac_part.len().min(DECIMALS)..DECIMALS {
            frac_value *= 10;
        }

        let raw = int_value
            .checked_mul(SCALE)
            .and_then(|v| v.checked_add(frac_value))
            .ok_or_else(overflow)?;

        Ok(FixedPoint(if negative { -raw } else { raw }))
    }
}

impl fmt::Display for FixedPoint {
    /// Always exactly seven fractional digits.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let scale = SCALE as u64;
        write!(f, "{}{}.{:0width$}", sign, abs / scale, abs % scale, width = DECIMALS)
    }
}

impl FromStr for FixedPoint {
    type Err = ParseFixedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FixedPoint::parse(s)
    }
}

impl Serialize for FixedPoint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for FixedPoint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        FixedPoint::parse(&s).map_err(de::Error::custom)
    }
}
