//! Core data types for the storage layer.
//!
//! - [`Sample`]: one telemetry observation, keyed by its Unix-second timestamp
//! - [`BucketGroup`]: raw per-bucket aggregate (count and power sum) read back
//!   from the store before fill policy and energy integration are applied

use serde::{Deserialize, Serialize};

/// A telemetry observation stored in the `readings` table.
///
/// Samples are created by the collector only and never updated.
///
/// # Example
///
/// ```
/// use plugwatch::Sample;
///
/// let sample = Sample::new(1_700_000_000, 230.1, 0.45, 98.7);
/// assert_eq!(sample.ts, 1_700_000_000);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Unix timestamp in seconds; unique per row.
    pub ts: i64,
    /// RMS voltage in volts.
    pub voltage: f64,
    /// Current in amps.
    pub current: f64,
    /// Active power in watts.
    pub power: f64,
}

impl Sample {
    /// Create a sample. Negative or non-finite readings are stored as 0.
    pub fn new(ts: i64, voltage: f64, current: f64, power: f64) -> Self {
        Self {
            ts,
            voltage: non_negative(voltage),
            current: non_negative(current),
            power: non_negative(power),
        }
    }
}

fn non_negative(v: f64) -> f64 {
    if v.is_finite() && v > 0.0 { v } else { 0.0 }
}

/// Samples grouped into one bucket.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BucketGroup {
    /// Aligned bucket start (Unix seconds).
    pub start: i64,
    /// Number of contributing samples.
    pub count: u64,
    /// Sum of `power` over the contributing samples (watts).
    pub sum_power: f64,
}

impl BucketGroup {
    /// Merge another group for the same bucket into this one.
    pub fn merge(&mut self, other: &BucketGroup) {
        self.count += other.count;
        self.sum_power += other.sum_power;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_clamps_negative_and_nan() {
        let s = Sample::new(10, -1.0, f64::NAN, 5.5);
        assert_eq!(s.voltage, 0.0);
        assert_eq!(s.current, 0.0);
        assert_eq!(s.power, 5.5);
    }

    #[test]
    fn test_bucket_group_merge() {
        let mut a = BucketGroup {
            start: 60,
            count: 2,
            sum_power: 30.0,
        };
        a.merge(&BucketGroup {
            start: 60,
            count: 1,
            sum_power: 12.5,
        });
        assert_eq!(a.count, 3);
        assert_eq!(a.sum_power, 42.5);
    }
}
