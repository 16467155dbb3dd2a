//! Bucket assembly and energy integration.
//!
//! Energy and runtime are rectangular estimates: every stored sample is taken
//! to represent one full sampling interval at its reported power. Missed
//! collector ticks make both under-count.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Serialize;

use crate::aggregate::{FillPolicy, SeriesPlan};
use crate::storage::BucketGroup;

/// Power above which the load counts as running (watts).
pub const RUNTIME_THRESHOLD_WATTS: f64 = 10.0;

/// Energy in kWh for a sum of power readings taken `interval` apart.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use plugwatch::aggregate::energy_kwh;
///
/// let kwh = energy_kwh(600.0, Duration::from_secs(15));
/// assert!((kwh - 0.0025).abs() < 1e-12);
/// ```
pub fn energy_kwh(sum_power_watts: f64, interval: Duration) -> f64 {
    sum_power_watts * interval.as_secs_f64() / 3_600.0 / 1_000.0
}

/// Runtime in seconds for `count` samples taken `interval` apart.
pub fn runtime_seconds(count: u64, interval: Duration) -> u64 {
    count.saturating_mul(interval.as_secs())
}

/// One aggregated time bucket.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Bucket {
    /// Aligned start (Unix seconds).
    pub start: i64,
    pub sample_count: u64,
    /// Mean power of contributing samples (0 when empty).
    pub average_power: f64,
    pub energy_kwh: f64,
}

impl Bucket {
    /// Bucket with no contributing samples.
    pub fn empty(start: i64) -> Self {
        Self {
            start,
            sample_count: 0,
            average_power: 0.0,
            energy_kwh: 0.0,
        }
    }

    fn from_group(group: &BucketGroup, interval: Duration) -> Self {
        if group.count == 0 {
            return Self::empty(group.start);
        }
        Self {
            start: group.start,
            sample_count: group.count,
            average_power: group.sum_power / group.count as f64,
            energy_kwh: energy_kwh(group.sum_power, interval),
        }
    }
}

/// Turn raw groups into the buckets `plan` asks for.
///
/// Groups may arrive in any order and several may share a start; they are
/// merged. Groups whose start is not a bucket of the plan are ignored.
pub fn assemble<I>(plan: &SeriesPlan, groups: I, interval: Duration) -> Vec<Bucket>
where
    I: IntoIterator<Item = BucketGroup>,
{
    let first = plan.bucket_start(plan.start);
    let mut merged: BTreeMap<i64, BucketGroup> = BTreeMap::new();

    for group in groups {
        if group.start < first
            || group.start > plan.end_inclusive
            || plan.bucket_start(group.start) != group.start
        {
            tracing::debug!(start = group.start, "Dropping group outside plan");
            continue;
        }
        merged
            .entry(group.start)
            .and_modify(|g| g.merge(&group))
            .or_insert(group);
    }

    match plan.fill {
        FillPolicy::OmitEmpty => merged
            .values()
            .filter(|g| g.count > 0)
            .map(|g| Bucket::from_group(g, interval))
            .collect(),
        FillPolicy::ZeroFill => plan
            .bucket_starts()
            .map(|start| match merged.get(&start) {
                Some(g) => Bucket::from_group(g, interval),
                None => Bucket::empty(start),
            })
            .collect(),
    }
}
