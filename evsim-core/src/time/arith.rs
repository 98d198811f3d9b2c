//! Unsigned 64.64 fixed-point kernels behind [`VirtualTime`](super::VirtualTime).
//!
//! Operands are magnitudes in Q64.64: the high 64 bits hold the integer part and the
//! low 64 bits the fraction. Signs are handled by the caller.

const LO_MASK: u128 = u64::MAX as u128;

#[inline]
fn split(v: u128) -> (u128, u128) {
    (v >> 64, v & LO_MASK)
}

/// Full-precision product, `(a * b) >> 64`.
///
/// Returns `None` when the true 256-bit product has nonzero bits above the
/// 192nd, i.e. when the result cannot be held in 128 bits.
pub(crate) fn umul(a: u128, b: u128) -> Option<u128> {
    let (a_hi, a_lo) = split(a);
    let (b_hi, b_lo) = split(b);

    let hi_hi = a_hi * b_hi;
    if hi_hi >> 64 != 0 {
        return None;
    }
    let lo_lo = (a_lo * b_lo) >> 64;

    (hi_hi << 64)
        .checked_add(a_hi * b_lo)?
        .checked_add(a_lo * b_hi)?
        .checked_add(lo_lo)
}

/// Product used with a precomputed reciprocal.
///
/// Skips the `lo * lo` term: the reciprocal's rounding already dominates it.
pub(crate) fn umul_by_invert(a: u128, inverse: u128) -> Option<u128> {
    let (a_hi, a_lo) = split(a);
    let (b_hi, b_lo) = split(inverse);

    let hi_hi = a_hi * b_hi;
    if hi_hi >> 64 != 0 {
        return None;
    }

    (hi_hi << 64)
        .checked_add(a_hi * b_lo)?
        .checked_add(a_lo * b_hi)
}

/// Quotient `(a << 64) / b`.
///
/// The integer half is one 128-by-128 division; the fraction comes from the
/// remainder shifted into the low half. `None` if the integer half needs more than
/// 64 bits. `b` must be nonzero.
pub(crate) fn udiv(a: u128, b: u128) -> Option<u128> {
    debug_assert!(b != 0);
    let int_part = a / b;
    if int_part >> 64 != 0 {
        return None;
    }
    let rem = a % b;

    let frac = if b >> 64 == 0 {
        // rem < b < 2^64, so the shift cannot overflow.
        (rem << 64) / b
    } else {
        long_divide_fraction(rem, b)
    };

    Some((int_part << 64) | frac)
}

/// Bit-serial division of `rem << 64` by `b` for divisors wider than 64 bits.
fn long_divide_fraction(mut rem: u128, b: u128) -> u128 {
    let mut frac = 0u128;
    for _ in 0..64 {
        let carry = rem >> 127;
        rem <<= 1;
        frac <<= 1;
        if carry == 1 || rem >= b {
            rem = rem.wrapping_sub(b);
            frac |= 1;
        }
    }
    frac
}

/// Reciprocal of `n` in Q64.64, rounded up when truncation would make
/// `n * (1/n)` fall short of one.
pub(crate) fn invert(n: u64) -> u128 {
    debug_assert!(n != 0);
    let one = 1u128 << 64;
    let mut inverse = one / n as u128;
    let check = umul_by_invert((n as u128) << 64, inverse).unwrap_or(0);
    if check >> 64 != 1 {
        inverse += 1;
    }
    inverse
}
