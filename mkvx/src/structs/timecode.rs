//! Timecode representation
//!
//! Container timecodes are stored in TimecodeScale units; they are
//! normalised to nanoseconds as soon as they are read.

use std::fmt::{Display, Formatter};
use std::ops::{Add, Sub};

use serde::Serialize;

/// Default TimecodeScale: one tick per millisecond.
pub const DEFAULT_TIMECODE_SCALE: u64 = 1_000_000;

/// A presentation timecode in nanoseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Timecode(i64);

impl Timecode {
    pub const ZERO: Self = Self(0);

    pub const fn from_nanos(nanos: i64) -> Self {
        Self(nanos)
    }

    /// Converts a value in TimecodeScale ticks to a timecode.
    pub fn from_scaled(ticks: i64, scale: u64) -> Self {
        Self(ticks.saturating_mul(i64::try_from(scale).unwrap_or(i64::MAX)))
    }

    pub const fn as_nanos(&self) -> i64 {
        self.0
    }

    pub fn as_secs_f64(&self) -> f64 {
        self.0 as f64 / 1e9
    }

    /// Duration of `samples` at `sample_rate`, rounded to the nearest nanosecond.
    pub fn from_samples(samples: u64, sample_rate: u32) -> Option<Self> {
        if sample_rate == 0 {
            return None;
        }

        let rate = sample_rate as u128;
        let nanos = (samples as u128 * 1_000_000_000 + rate / 2) / rate;
        i64::try_from(nanos).ok().map(Self)
    }
}

impl Add for Timecode {
    type Output = Timecode;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0.saturating_add(rhs.0))
    }
}

impl Sub for Timecode {
    type Output = Timecode;

    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0.saturating_sub(rhs.0))
    }
}

impl Display for Timecode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let total = self.0.unsigned_abs();
        let nanos = total % 1_000_000_000;
        let secs = total / 1_000_000_000;
        let hours = secs / 3600;

        write!(
            f,
            "{sign}{hours:0width$}:{:02}:{:02}.{nanos:09}",
            (secs / 60) % 60,
            secs % 60,
            width = if hours >= 100 { 0 } else { 2 }
        )
    }
}

#[test]
fn print_timecode() {
    let tc = Timecode::from_scaled(3_723_456, DEFAULT_TIMECODE_SCALE);
    assert_eq!(format!("{tc}"), "01:02:03.456000000");
    assert_eq!(format!("{}", Timecode::from_nanos(-32_000_000)), "-00:00:00.032000000");
}

#[test]
fn sample_durations() {
    // one AC-3 frame at 48 kHz
    assert_eq!(
        Timecode::from_samples(1536, 48_000),
        Some(Timecode::from_nanos(32_000_000))
    );
    assert_eq!(
        Timecode::from_samples(1152, 44_100),
        Some(Timecode::from_nanos(26_122_449))
    );
    assert_eq!(Timecode::from_samples(1152, 0), None);
}
