//! ## evsim-core::time
//! **Exact virtual time**
//!
//! [`VirtualTime`] is a signed Q64.64 fixed-point value: the high 64 bits count whole
//! ticks of the simulator's [`Resolution`], the low 64 bits hold a binary fraction of a
//! tick. Rate and period computations keep their sub-tick remainder instead of drifting.
//!
//! Arithmetic never wraps silently. The `checked_*` methods report [`TimeError`]; the
//! operators treat any error as fatal.

mod arith;
mod resolution;

use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, AddAssign, Div, Mul, Neg, Sub, SubAssign};

use thiserror::Error;

use crate::error::fatal;

pub use resolution::{ParseTimeUnitError, Resolution, TimeUnit};

/// 2^64 as a float, the scale between a tick and the raw representation.
const FRAC_SCALE: f64 = 18_446_744_073_709_551_616.0;

/// Digits printed after the point by `Display` when no precision is given.
const DEFAULT_DISPLAY_DIGITS: usize = 9;

/// Failures of virtual-time arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TimeError {
    #[error("virtual time overflow in {0}")]
    Overflow(&'static str),

    #[error("virtual time division by zero")]
    DivisionByZero,

    #[error("cannot build a virtual time from non-finite value {0}")]
    NotFinite(FloatBits),
}

/// An `f64` carried inside [`TimeError`] while keeping it `Eq`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FloatBits(u64);

impl From<f64> for FloatBits {
    fn from(value: f64) -> Self {
        FloatBits(value.to_bits())
    }
}

impl fmt::Display for FloatBits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", f64::from_bits(self.0))
    }
}

/// A point (or span) of simulated time.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct VirtualTime {
    raw: i128,
}

impl VirtualTime {
    pub const ZERO: VirtualTime = VirtualTime { raw: 0 };
    pub const ONE: VirtualTime = VirtualTime { raw: 1 << 64 };
    pub const MAX: VirtualTime = VirtualTime { raw: i128::MAX };
    pub const MIN: VirtualTime = VirtualTime { raw: i128::MIN };

    #[inline]
    pub const fn zero() -> Self {
        Self::ZERO
    }

    /// A whole number of ticks.
    #[inline]
    pub const fn from_integer(ticks: i64) -> Self {
        VirtualTime {
            raw: (ticks as i128) << 64,
        }
    }

    /// Builds a value from its integer and fractional halves.
    #[inline]
    pub const fn from_parts(integer: i64, fraction: u64) -> Self {
        VirtualTime {
            raw: ((integer as i128) << 64) | fraction as i128,
        }
    }

    /// Lossy conversion from a float number of ticks. Non-finite or out-of-range
    /// input is fatal; see [`VirtualTime::try_from_f64`].
    pub fn from_f64(ticks: f64) -> Self {
        Self::try_from_f64(ticks).unwrap_or_else(|e| fatal(e))
    }

    pub fn try_from_f64(ticks: f64) -> Result<Self, TimeError> {
        if !ticks.is_finite() {
            return Err(TimeError::NotFinite(ticks.into()));
        }
        // i64 range of the integer half.
        if ticks >= 9_223_372_036_854_775_808.0 || ticks < -9_223_372_036_854_775_808.0 {
            return Err(TimeError::Overflow("from_f64"));
        }
        Ok(VirtualTime {
            raw: (ticks * FRAC_SCALE) as i128,
        })
    }

    /// The integer half, rounded toward negative infinity.
    #[inline]
    pub const fn get_integer_part(self) -> i64 {
        (self.raw >> 64) as i64
    }

    /// The fractional half in units of 2^-64 tick.
    #[inline]
    pub const fn get_fraction(self) -> u64 {
        self.raw as u64
    }

    #[inline]
    pub fn to_f64(self) -> f64 {
        self.raw as f64 / FRAC_SCALE
    }

    #[inline]
    pub const fn is_zero(self) -> bool {
        self.raw == 0
    }

    #[inline]
    pub const fn is_negative(self) -> bool {
        self.raw < 0
    }

    #[inline]
    pub const fn is_positive(self) -> bool {
        self.raw > 0
    }

    /// Three-way comparison.
    #[inline]
    pub fn compare(self, other: VirtualTime) -> Ordering {
        self.cmp(&other)
    }

    pub fn abs(self) -> Self {
        self.checked_abs().unwrap_or_else(|e| fatal(e))
    }

    pub fn checked_abs(self) -> Result<Self, TimeError> {
        self.raw
            .checked_abs()
            .map(|raw| VirtualTime { raw })
            .ok_or(TimeError::Overflow("abs"))
    }

    pub fn checked_neg(self) -> Result<Self, TimeError> {
        self.raw
            .checked_neg()
            .map(|raw| VirtualTime { raw })
            .ok_or(TimeError::Overflow("neg"))
    }

    pub fn checked_add(self, rhs: VirtualTime) -> Result<Self, TimeError> {
        self.raw
            .checked_add(rhs.raw)
            .map(|raw| VirtualTime { raw })
            .ok_or(TimeError::Overflow("add"))
    }

    pub fn checked_sub(self, rhs: VirtualTime) -> Result<Self, TimeError> {
        self.raw
            .checked_sub(rhs.raw)
            .map(|raw| VirtualTime { raw })
            .ok_or(TimeError::Overflow("sub"))
    }

    /// Fixed-point product. Fails if the exact product does not fit in 128 bits.
    pub fn checked_mul(self, rhs: VirtualTime) -> Result<Self, TimeError> {
        let negative = self.is_negative() != rhs.is_negative();
        let magnitude = arith::umul(self.raw.unsigned_abs(), rhs.raw.unsigned_abs())
            .ok_or(TimeError::Overflow("mul"))?;
        Self::with_sign(magnitude, negative, "mul")
    }

    /// Fixed-point quotient.
    pub fn checked_div(self, rhs: VirtualTime) -> Result<Self, TimeError> {
        if rhs.is_zero() {
            return Err(TimeError::DivisionByZero);
        }
        let negative = self.is_negative() != rhs.is_negative();
        let magnitude = arith::udiv(self.raw.unsigned_abs(), rhs.raw.unsigned_abs())
            .ok_or(TimeError::Overflow("div"))?;
        Self::with_sign(magnitude, negative, "div")
    }

    /// Precomputes `1 / n` for use with [`VirtualTime::mul_by_invert`].
    ///
    /// The reciprocal is rounded so that `n * invert(n)` has integer part one,
    /// which keeps `k * n` scaled back down to exactly `k`.
    pub fn invert(n: u64) -> Self {
        Self::try_invert(n).unwrap_or_else(|e| fatal(e))
    }

    pub fn try_invert(n: u64) -> Result<Self, TimeError> {
        if n == 0 {
            return Err(TimeError::DivisionByZero);
        }
        Ok(VirtualTime {
            raw: arith::invert(n) as i128,
        })
    }

    /// Scales by a reciprocal from [`VirtualTime::invert`]. Cheaper than a division
    /// and meant for hot paths that convert by the same factor over and over.
    pub fn mul_by_invert(self, inverse: VirtualTime) -> Self {
        self.checked_mul_by_invert(inverse)
            .unwrap_or_else(|e| fatal(e))
    }

    pub fn checked_mul_by_invert(self, inverse: VirtualTime) -> Result<Self, TimeError> {
        let negative = self.is_negative() != inverse.is_negative();
        let magnitude =
            arith::umul_by_invert(self.raw.unsigned_abs(), inverse.raw.unsigned_abs())
                .ok_or(TimeError::Overflow("mul_by_invert"))?;
        Self::with_sign(magnitude, negative, "mul_by_invert")
    }

    /// Multiplies by a plain integer.
    pub fn checked_mul_int(self, factor: i64) -> Result<Self, TimeError> {
        self.raw
            .checked_mul(factor as i128)
            .map(|raw| VirtualTime { raw })
            .ok_or(TimeError::Overflow("mul"))
    }

    fn with_sign(magnitude: u128, negative: bool, op: &'static str) -> Result<Self, TimeError> {
        if negative {
            if magnitude > i128::MIN.unsigned_abs() {
                return Err(TimeError::Overflow(op));
            }
            Ok(VirtualTime {
                raw: 0i128.wrapping_sub_unsigned(magnitude),
            })
        } else {
            i128::try_from(magnitude)
                .map(|raw| VirtualTime { raw })
                .map_err(|_| TimeError::Overflow(op))
        }
    }
}

impl Add for VirtualTime {
    type Output = VirtualTime;

    fn add(self, rhs: VirtualTime) -> VirtualTime {
        self.checked_add(rhs).unwrap_or_else(|e| fatal(e))
    }
}

impl AddAssign for VirtualTime {
    fn add_assign(&mut self, rhs: VirtualTime) {
        *self = *self + rhs;
    }
}

impl Sub for VirtualTime {
    type Output = VirtualTime;

    fn sub(self, rhs: VirtualTime) -> VirtualTime {
        self.checked_sub(rhs).unwrap_or_else(|e| fatal(e))
    }
}

impl SubAssign for VirtualTime {
    fn sub_assign(&mut self, rhs: VirtualTime) {
        *self = *self - rhs;
    }
}

impl Neg for VirtualTime {
    type Output = VirtualTime;

    fn neg(self) -> VirtualTime {
        self.checked_neg().unwrap_or_else(|e| fatal(e))
    }
}

impl Mul for VirtualTime {
    type Output = VirtualTime;

    fn mul(self, rhs: VirtualTime) -> VirtualTime {
        self.checked_mul(rhs).unwrap_or_else(|e| fatal(e))
    }
}

impl Mul<i64> for VirtualTime {
    type Output = VirtualTime;

    fn mul(self, rhs: i64) -> VirtualTime {
        self.checked_mul_int(rhs).unwrap_or_else(|e| fatal(e))
    }
}

impl Div for VirtualTime {
    type Output = VirtualTime;

    fn div(self, rhs: VirtualTime) -> VirtualTime {
        self.checked_div(rhs).unwrap_or_else(|e| fatal(e))
    }
}

impl From<i64> for VirtualTime {
    fn from(ticks: i64) -> Self {
        VirtualTime::from_integer(ticks)
    }
}

impl fmt::Display for VirtualTime {
    /// Signed decimal, fraction rounded to `precision` digits (default 9, max 19).
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digits = f.precision().unwrap_or(DEFAULT_DISPLAY_DIGITS).min(19);
        let sign = if self.is_negative() { '-' } else { '+' };
        let magnitude = self.raw.unsigned_abs();
        let mut integer = magnitude >> 64;
        let fraction = magnitude & u64::MAX as u128;

        let scale = 10u128.pow(digits as u32);
        let mut decimals = (fraction * scale + (1u128 << 63)) >> 64;
        if decimals >= scale {
            decimals -= scale;
            integer += 1;
        }

        if digits == 0 {
            write!(f, "{sign}{integer}")
        } else {
            write!(f, "{sign}{integer}.{decimals:0digits$}")
        }
    }
}

impl fmt::Debug for VirtualTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VirtualTime({self})")
    }
}
