//! Window planning.
//!
//! Every series query reduces to a [`SeriesPlan`]: an inclusive window, a
//! bucket width, the origin buckets are aligned to and a [`FillPolicy`].
//! Rolling views align to the epoch; calendar views align to the local
//! midnight that starts the window.

use std::time::Duration;

use chrono::{DateTime, Days, NaiveDate, NaiveTime, TimeZone};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

use crate::aggregate::AggregateError;
#[cfg(test)]
use crate::storage::{BucketGroup, Sample};

const MINUTE: i64 = 60;
const HOUR: i64 = 3_600;
const DAY: i64 = 86_400;

/// Default rolling span for minute buckets (2 hours).
pub const DEFAULT_MINUTE_SPAN: Duration = Duration::from_secs(2 * 3_600);

/// Default rolling span for hour buckets (48 hours).
pub const DEFAULT_HOUR_SPAN: Duration = Duration::from_secs(48 * 3_600);

/// Width of history buckets (10 minutes).
pub const HISTORY_BUCKET: Duration = Duration::from_secs(600);

/// Bucket width selector.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    EnumString,
    Display,
    AsRefStr,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    /// 60s buckets over a rolling window.
    #[default]
    Minute,
    /// 3600s buckets over a rolling window.
    Hour,
    /// 24 hourly buckets for today.
    Day,
    /// 7 daily buckets ending today.
    Week,
}

impl Granularity {
    /// Parse a user-supplied granularity (case-insensitive).
    pub fn parse(value: &str) -> Result<Self, AggregateError> {
        value.trim().parse().map_err(|_| {
            AggregateError::invalid(format!(
                "granularity must be minute|hour|day|week, got '{}'",
                value
            ))
        })
    }

    /// Bucket width in seconds.
    pub fn bucket_width(self) -> i64 {
        match self {
            Self::Minute => MINUTE,
            Self::Hour | Self::Day => HOUR,
            Self::Week => DAY,
        }
    }

    /// Whether the window ends at "now" and only populated buckets are emitted.
    pub fn is_rolling(self) -> bool {
        matches!(self, Self::Minute | Self::Hour)
    }

    /// Plan the series for this granularity as seen at `now`.
    ///
    /// The override only affects rolling granularities.
    pub fn plan<Tz: TimeZone>(
        self,
        now: &DateTime<Tz>,
        window: &WindowOverride,
    ) -> Result<SeriesPlan, AggregateError> {
        window.validate()?;
        match self {
            Self::Minute | Self::Hour => {
                let default = if self == Self::Minute {
                    DEFAULT_MINUTE_SPAN
                } else {
                    DEFAULT_HOUR_SPAN
                };
                let span = window.span_secs().unwrap_or(default.as_secs() as i64);
                Ok(SeriesPlan::rolling(now.timestamp(), span, self.bucket_width()))
            }
            Self::Day => {
                let midnight = local_midnight(&now.timezone(), now.date_naive())?;
                Ok(SeriesPlan::fixed(midnight, HOUR, 24))
            }
            Self::Week => {
                let first_day = now
                    .date_naive()
                    .checked_sub_days(Days::new(6))
                    .ok_or_else(|| AggregateError::invalid("date out of range"))?;
                let midnight = local_midnight(&now.timezone(), first_day)?;
                Ok(SeriesPlan::fixed(midnight, DAY, 7))
            }
        }
    }
}

/// Explicit span for rolling windows, in hours, days or weeks.
///
/// All present values must be finite and positive. When several are given the
/// first of hours, days, weeks wins.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WindowOverride {
    pub hours: Option<f64>,
    pub days: Option<f64>,
    pub weeks: Option<f64>,
}

impl WindowOverride {
    /// Build from raw query parameters. Empty strings count as absent.
    pub fn from_params(
        hours: Option<&str>,
        days: Option<&str>,
        weeks: Option<&str>,
    ) -> Result<Self, AggregateError> {
        let window = Self {
            hours: parse_param("hours", hours)?,
            days: parse_param("days", days)?,
            weeks: parse_param("weeks", weeks)?,
        };
        window.validate()?;
        Ok(window)
    }

    /// Reject non-finite or non-positive values.
    pub fn validate(&self) -> Result<(), AggregateError> {
        for (name, value) in [("hours", self.hours), ("days", self.days), ("weeks", self.weeks)] {
            if let Some(v) = value
                && !(v.is_finite() && v > 0.0)
            {
                return Err(AggregateError::invalid(format!(
                    "{} must be a positive number, got {}",
                    name, v
                )));
            }
        }
        Ok(())
    }

    /// Requested span in whole seconds (at least 1), if any.
    pub fn span_secs(&self) -> Option<i64> {
        let secs = if let Some(h) = self.hours {
            h * HOUR as f64
        } else if let Some(d) = self.days {
            d * DAY as f64
        } else {
            self.weeks? * (7 * DAY) as f64
        };
        Some((secs as i64).max(1))
    }
}

fn parse_param(name: &str, raw: Option<&str>) -> Result<Option<f64>, AggregateError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => s
            .parse::<f64>()
            .map(Some)
            .map_err(|_| AggregateError::invalid(format!("{} must be numeric, got '{}'", name, s))),
    }
}

/// What to emit for buckets without samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillPolicy {
    /// Leave them out.
    OmitEmpty,
    /// Emit them with zero count, power and energy.
    ZeroFill,
}

/// Fully resolved series query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeriesPlan {
    /// First second of the window.
    pub start: i64,
    /// Last second of the window.
    pub end_inclusive: i64,
    /// Bucket width in seconds.
    pub width: i64,
    /// Bucket boundaries are `origin + k * width`.
    pub origin: i64,
    pub fill: FillPolicy,
}

impl SeriesPlan {
    /// `[now - span, now]` with epoch-aligned buckets, omitting empty ones.
    pub fn rolling(now: i64, span: i64, width: i64) -> Self {
        Self {
            start: now.saturating_sub(span).max(0),
            end_inclusive: now,
            width,
            origin: 0,
            fill: FillPolicy::OmitEmpty,
        }
    }

    /// `count` zero-filled buckets of `width` starting exactly at `start`.
    pub fn fixed(start: i64, width: i64, count: i64) -> Self {
        Self {
            start,
            end_inclusive: start + count * width - 1,
            width,
            origin: start,
            fill: FillPolicy::ZeroFill,
        }
    }

    /// Start of the bucket containing `ts`.
    pub fn bucket_start(&self, ts: i64) -> i64 {
        self.origin + (ts - self.origin).div_euclid(self.width) * self.width
    }

    /// Whether `ts` lies inside the window.
    pub fn contains(&self, ts: i64) -> bool {
        ts >= self.start && ts <= self.end_inclusive
    }

    /// Every bucket start touching the window, ascending.
    pub fn bucket_starts(&self) -> impl Iterator<Item = i64> + '_ {
        let first = self.bucket_start(self.start);
        (0..)
            .map(move |i| first + i * self.width)
            .take_while(move |s| *s <= self.end_inclusive)
    }

    /// In-memory counterpart of the store's GROUP BY. Input order does not matter.
    #[cfg(test)]
    pub(crate) fn group(&self, samples: &[Sample]) -> Vec<BucketGroup> {
        samples
            .iter()
            .filter(|s| self.contains(s.ts))
            .map(|s| BucketGroup {
                start: self.bucket_start(s.ts),
                count: 1,
                sum_power: s.power,
            })
            .collect()
    }
}

/// First instant of `date` in `tz`.
///
/// Where a DST transition skips midnight the first existing local time of the
/// day is used.
pub fn local_midnight<Tz: TimeZone>(tz: &Tz, date: NaiveDate) -> Result<i64, AggregateError> {
    // Transitions happen on the hour or half hour.
    for minutes in (0..=180).step_by(30) {
        let time = NaiveTime::from_hms_opt(minutes / 60, minutes % 60, 0)
            .ok_or_else(|| AggregateError::invalid("invalid time of day"))?;
        if let Some(dt) = tz.from_local_datetime(&date.and_time(time)).earliest() {
            return Ok(dt.timestamp());
        }
    }
    Err(AggregateError::invalid(format!(
        "{} has no representable local midnight",
        date
    )))
}
