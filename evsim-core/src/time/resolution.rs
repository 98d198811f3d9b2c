use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{TimeError, VirtualTime};
use crate::error::fatal;

/// Decimal time units a simulation can be expressed in.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    S,
    Ms,
    Us,
    #[default]
    Ns,
    Ps,
    Fs,
}

impl TimeUnit {
    pub const ALL: [TimeUnit; 6] = [
        TimeUnit::S,
        TimeUnit::Ms,
        TimeUnit::Us,
        TimeUnit::Ns,
        TimeUnit::Ps,
        TimeUnit::Fs,
    ];

    /// Power of ten below one second.
    const fn exponent(self) -> u32 {
        match self {
            TimeUnit::S => 0,
            TimeUnit::Ms => 3,
            TimeUnit::Us => 6,
            TimeUnit::Ns => 9,
            TimeUnit::Ps => 12,
            TimeUnit::Fs => 15,
        }
    }

    const fn index(self) -> usize {
        self as usize
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            TimeUnit::S => "s",
            TimeUnit::Ms => "ms",
            TimeUnit::Us => "us",
            TimeUnit::Ns => "ns",
            TimeUnit::Ps => "ps",
            TimeUnit::Fs => "fs",
        }
    }
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown time unit `{0}` (expected one of s, ms, us, ns, ps, fs)")]
pub struct ParseTimeUnitError(String);

impl FromStr for TimeUnit {
    type Err = ParseTimeUnitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TimeUnit::ALL
            .into_iter()
            .find(|unit| unit.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ParseTimeUnitError(s.to_string()))
    }
}

/// How to move between one unit and the resolution tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Conversion {
    factor: u64,
    /// `true` when the unit is at least as coarse as a tick, so values are multiplied
    /// on the way in. Otherwise they are scaled down by `inverse`.
    from_mul: bool,
    inverse: VirtualTime,
}

/// The physical length of one [`VirtualTime`] tick.
///
/// Fixed when the simulator is built. Conversion tables for every unit are computed
/// once here so hot paths only multiply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    unit: TimeUnit,
    conversions: [Conversion; 6],
}

impl Resolution {
    pub fn new(unit: TimeUnit) -> Self {
        let conversions = TimeUnit::ALL.map(|other| {
            let from_mul = other.exponent() <= unit.exponent();
            let factor = 10u64.pow(other.exponent().abs_diff(unit.exponent()));
            Conversion {
                factor,
                from_mul,
                inverse: VirtualTime::invert(factor),
            }
        });
        Resolution { unit, conversions }
    }

    pub fn unit(&self) -> TimeUnit {
        self.unit
    }

    fn conversion(&self, unit: TimeUnit) -> &Conversion {
        &self.conversions[unit.index()]
    }

    /// `value` expressed in `unit`, as ticks.
    pub fn from_unit(&self, value: i64, unit: TimeUnit) -> VirtualTime {
        let conv = self.conversion(unit);
        let raw = VirtualTime::from_integer(value);
        if conv.from_mul {
            raw * conv.factor as i64
        } else {
            raw.mul_by_invert(conv.inverse)
        }
    }

    pub fn from_f64(&self, value: f64, unit: TimeUnit) -> VirtualTime {
        self.try_from_f64(value, unit).unwrap_or_else(|e| fatal(e))
    }

    /// Like [`Resolution::from_f64`], but reports values outside the tick range.
    pub fn try_from_f64(&self, value: f64, unit: TimeUnit) -> Result<VirtualTime, TimeError> {
        let conv = self.conversion(unit);
        if conv.from_mul {
            VirtualTime::try_from_f64(value * conv.factor as f64)
        } else {
            VirtualTime::try_from_f64(value / conv.factor as f64)
        }
    }

    /// Whole number of `unit` contained in `time`, rounded toward negative infinity.
    pub fn to_integer(&self, time: VirtualTime, unit: TimeUnit) -> i64 {
        let conv = self.conversion(unit);
        if conv.from_mul {
            time.mul_by_invert(conv.inverse).get_integer_part()
        } else {
            (time * conv.factor as i64).get_integer_part()
        }
    }

    pub fn to_f64(&self, time: VirtualTime, unit: TimeUnit) -> f64 {
        let conv = self.conversion(unit);
        if conv.from_mul {
            time.to_f64() / conv.factor as f64
        } else {
            time.to_f64() * conv.factor as f64
        }
    }

    /// Seconds as ticks, the unit configuration files use.
    pub fn from_seconds(&self, seconds: f64) -> VirtualTime {
        self.from_f64(seconds, TimeUnit::S)
    }

    pub fn try_from_seconds(&self, seconds: f64) -> Result<VirtualTime, TimeError> {
        self.try_from_f64(seconds, TimeUnit::S)
    }
}

impl Default for Resolution {
    fn default() -> Self {
        Resolution::new(TimeUnit::Ns)
    }
}
