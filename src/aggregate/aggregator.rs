//! Stateless query layer over the sample reader.

use chrono::{DateTime, Days, Local, NaiveDate, TimeZone};
use serde::Serialize;

use crate::aggregate::bucket::{RUNTIME_THRESHOLD_WATTS, assemble, energy_kwh, runtime_seconds};
use crate::aggregate::window::{HISTORY_BUCKET, local_midnight};
use crate::aggregate::{AggregateError, Bucket, FillPolicy, Granularity, SeriesPlan, WindowOverride};
use crate::collector::SAMPLING_INTERVAL;
use crate::storage::SampleReader;

/// Today's totals.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DailySummary {
    pub today_energy_kwh: f64,
    pub daily_runtime_seconds: u64,
}

/// Bucketed series and daily summaries.
///
/// Methods ending in `_at`/`_in` take the clock and timezone explicitly; the
/// plain forms use the local timezone and the current time.
#[derive(Debug, Clone)]
pub struct Aggregator {
    reader: SampleReader,
}

impl Aggregator {
    pub fn new(reader: SampleReader) -> Self {
        Self { reader }
    }

    /// Series for `granularity` ending now.
    pub async fn series(
        &self,
        granularity: Granularity,
        window: &WindowOverride,
    ) -> Result<Vec<Bucket>, AggregateError> {
        self.series_at(granularity, window, &Local::now()).await
    }

    /// Series for `granularity` as seen at `now`.
    pub async fn series_at<Tz: TimeZone>(
        &self,
        granularity: Granularity,
        window: &WindowOverride,
        now: &DateTime<Tz>,
    ) -> Result<Vec<Bucket>, AggregateError> {
        let plan = granularity.plan(now, window)?;
        self.run(&plan).await
    }

    /// Energy and runtime since local midnight.
    pub async fn summary(&self) -> Result<DailySummary, AggregateError> {
        self.summary_at(&Local::now()).await
    }

    /// Energy and runtime since the midnight preceding `now`.
    pub async fn summary_at<Tz: TimeZone>(
        &self,
        now: &DateTime<Tz>,
    ) -> Result<DailySummary, AggregateError> {
        let midnight = local_midnight(&now.timezone(), now.date_naive())?;

        let sum_power = self.reader.sum_power_since(midnight).await?;
        let running = self
            .reader
            .count_power_above(RUNTIME_THRESHOLD_WATTS, midnight)
            .await?;

        Ok(DailySummary {
            today_energy_kwh: energy_kwh(sum_power, SAMPLING_INTERVAL),
            daily_runtime_seconds: runtime_seconds(running, SAMPLING_INTERVAL),
        })
    }

    /// Ten-minute average power over a local calendar day (`YYYY-MM-DD`).
    pub async fn history(&self, date: &str) -> Result<Vec<Bucket>, AggregateError> {
        self.history_in(date, &Local).await
    }

    /// Ten-minute average power over a calendar day in `tz`. Empty buckets are
    /// omitted.
    pub async fn history_in<Tz: TimeZone>(
        &self,
        date: &str,
        tz: &Tz,
    ) -> Result<Vec<Bucket>, AggregateError> {
        let plan = history_plan(date, tz)?;
        self.run(&plan).await
    }

    async fn run(&self, plan: &SeriesPlan) -> Result<Vec<Bucket>, AggregateError> {
        let groups = self
            .reader
            .bucket_groups(plan.start, plan.end_inclusive, plan.width, plan.origin)
            .await?;
        Ok(assemble(plan, groups, SAMPLING_INTERVAL))
    }
}

fn history_plan<Tz: TimeZone>(date: &str, tz: &Tz) -> Result<SeriesPlan, AggregateError> {
    let day = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d").map_err(|_| {
        AggregateError::invalid(format!("invalid date '{}', expected YYYY-MM-DD", date))
    })?;
    let next = day
        .checked_add_days(Days::new(1))
        .ok_or_else(|| AggregateError::invalid("date out of range"))?;

    let start = local_midnight(tz, day)?;
    let end = local_midnight(tz, next)?;

    Ok(SeriesPlan {
        start,
        end_inclusive: end - 1,
        width: HISTORY_BUCKET.as_secs() as i64,
        origin: start,
        fill: FillPolicy::OmitEmpty,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{Sample, StorageBuilder, StorageHandles};
    use chrono::{FixedOffset, Utc};

    async fn store_with(samples: &[Sample]) -> StorageHandles {
        let handles = StorageBuilder::new("sqlite::memory:").build().await.unwrap();
        for s in samples {
            handles.writer.upsert_sample(s).await.unwrap();
        }
        handles
    }

    fn at(ts: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(ts, 0).unwrap()
    }

    #[tokio::test]
    async fn test_minute_series_scenario() {
        let handles = store_with(&[
            Sample::new(0, 230.0, 0.4, 100.0),
            Sample::new(15, 230.0, 0.9, 200.0),
            Sample::new(30, 230.0, 1.3, 300.0),
        ])
        .await;
        let aggregator = Aggregator::new(handles.reader.clone());

        let buckets = aggregator
            .series_at(Granularity::Minute, &WindowOverride::default(), &at(45))
            .await
            .unwrap();

        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].start, 0);
        assert_eq!(buckets[0].sample_count, 3);
        assert!((buckets[0].average_power - 200.0).abs() < 1e-9);
        assert!((buckets[0].energy_kwh - 0.0025).abs() < 1e-12);

        handles.shutdown().await;
    }

    #[tokio::test]
    async fn test_rolling_series_omits_gaps_and_honors_override() {
        let now = 1_700_000_000 - 1_700_000_000 % 3_600 + 1_800;
        let handles = store_with(&[
            Sample::new(now - 7_000, 230.0, 0.1, 20.0),
            Sample::new(now - 120, 230.0, 0.1, 40.0),
            Sample::new(now - 60, 230.0, 0.1, 60.0),
        ])
        .await;
        let aggregator = Aggregator::new(handles.reader.clone());

        let buckets = aggregator
            .series_at(Granularity::Minute, &WindowOverride::default(), &at(now))
            .await
            .unwrap();
        assert_eq!(buckets.len(), 3);
        assert!(buckets.windows(2).all(|w| w[0].start < w[1].start));
        assert!(buckets.iter().all(|b| b.sample_count > 0 && b.start % 60 == 0));

        let one_hour = WindowOverride {
            hours: Some(1.0),
            ..Default::default()
        };
        let buckets = aggregator
            .series_at(Granularity::Minute, &one_hour, &at(now))
            .await
            .unwrap();
        assert_eq!(buckets.len(), 2);

        handles.shutdown().await;
    }

    #[tokio::test]
    async fn test_empty_day_has_24_zero_buckets() {
        let handles = store_with(&[]).await;
        let aggregator = Aggregator::new(handles.reader.clone());
        let tz = FixedOffset::east_opt(2 * 3_600).unwrap();
        let now = tz.with_ymd_and_hms(2024, 6, 1, 17, 45, 0).unwrap();
        let midnight = tz.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap().timestamp();

        let buckets = aggregator
            .series_at(Granularity::Day, &WindowOverride::default(), &now)
            .await
            .unwrap();

        assert_eq!(buckets.len(), 24);
        for (i, b) in buckets.iter().enumerate() {
            assert_eq!(b.start, midnight + i as i64 * 3_600);
            assert_eq!(*b, Bucket::empty(b.start));
        }

        handles.shutdown().await;
    }

    #[tokio::test]
    async fn test_week_partition_with_sparse_data() {
        let tz = FixedOffset::west_opt(5 * 3_600).unwrap();
        let now = tz.with_ymd_and_hms(2024, 6, 10, 8, 0, 0).unwrap();
        let first = tz.with_ymd_and_hms(2024, 6, 4, 0, 0, 0).unwrap().timestamp();

        let handles = store_with(&[
            Sample::new(first - 1, 230.0, 1.0, 999.0),
            Sample::new(first + 2 * 86_400 + 10, 230.0, 1.0, 100.0),
            Sample::new(first + 2 * 86_400 + 25, 230.0, 1.0, 300.0),
            Sample::new(first + 6 * 86_400 + 60, 230.0, 1.0, 50.0),
        ])
        .await;
        let aggregator = Aggregator::new(handles.reader.clone());

        let buckets = aggregator
            .series_at(Granularity::Week, &WindowOverride::default(), &now)
            .await
            .unwrap();

        let starts: Vec<i64> = buckets.iter().map(|b| b.start).collect();
        let expected: Vec<i64> = (0..7).map(|i| first + i * 86_400).collect();
        assert_eq!(starts, expected);

        let counts: Vec<u64> = buckets.iter().map(|b| b.sample_count).collect();
        assert_eq!(counts, vec![0, 0, 2, 0, 0, 0, 1]);
        assert!((buckets[2].average_power - 200.0).abs() < 1e-9);
        assert_eq!(buckets[3].energy_kwh, 0.0);

        handles.shutdown().await;
    }

    #[tokio::test]
    async fn test_sql_grouping_matches_pure_grouping() {
        // Pairs share a timestamp with different payloads.
        let samples: Vec<Sample> = (0..500)
            .map(|i| Sample::new(10_000 + (i / 2) * 30, 230.0, 0.5, (i % 13) as f64 * 10.0))
            .collect();
        let handles = store_with(&samples).await;
        let aggregator = Aggregator::new(handles.reader.clone());

        let plan = SeriesPlan::fixed(9_000, 3_600, 4);
        let from_sql = aggregator.run(&plan).await.unwrap();

        // The store kept only the first write per second.
        let stored = handles.reader.query_range(0, i64::MAX).await.unwrap();
        let mut shuffled = stored.clone();
        shuffled.reverse();
        let from_memory = assemble(&plan, plan.group(&shuffled), SAMPLING_INTERVAL);

        assert_eq!(from_sql.len(), from_memory.len());
        for (a, b) in from_sql.iter().zip(&from_memory) {
            assert_eq!(a.start, b.start);
            assert_eq!(a.sample_count, b.sample_count);
            assert!((a.energy_kwh - b.energy_kwh).abs() < 1e-9);
        }

        handles.shutdown().await;
    }

    #[tokio::test]
    async fn test_summary_counts_since_midnight() {
        let tz = FixedOffset::east_opt(0).unwrap();
        let now = tz.with_ymd_and_hms(2024, 3, 3, 12, 0, 0).unwrap();
        let midnight = tz.with_ymd_and_hms(2024, 3, 3, 0, 0, 0).unwrap().timestamp();

        let handles = store_with(&[
            Sample::new(midnight - 15, 230.0, 5.0, 1_000.0),
            Sample::new(midnight, 230.0, 1.0, 240.0),
            Sample::new(midnight + 15, 230.0, 0.0, 5.0),
            Sample::new(midnight + 30, 230.0, 0.0, 10.0),
            Sample::new(midnight + 45, 230.0, 1.0, 120.0),
        ])
        .await;
        let aggregator = Aggregator::new(handles.reader.clone());

        let summary = aggregator.summary_at(&now).await.unwrap();
        let expected_kwh = (240.0 + 5.0 + 10.0 + 120.0) * 15.0 / 3_600_000.0;
        assert!((summary.today_energy_kwh - expected_kwh).abs() < 1e-12);
        // Only readings strictly above 10 W count as running.
        assert_eq!(summary.daily_runtime_seconds, 30);

        handles.shutdown().await;
    }

    #[tokio::test]
    async fn test_history_ten_minute_buckets() {
        let tz = FixedOffset::east_opt(3_600).unwrap();
        let midnight = tz.with_ymd_and_hms(2024, 2, 29, 0, 0, 0).unwrap().timestamp();

        let handles = store_with(&[
            Sample::new(midnight - 1, 230.0, 1.0, 500.0),
            Sample::new(midnight + 5, 230.0, 1.0, 100.0),
            Sample::new(midnight + 599, 230.0, 1.0, 200.0),
            Sample::new(midnight + 600, 230.0, 1.0, 60.0),
            Sample::new(midnight + 86_399, 230.0, 1.0, 70.0),
            Sample::new(midnight + 86_400, 230.0, 1.0, 80.0),
        ])
        .await;
        let aggregator = Aggregator::new(handles.reader.clone());

        let buckets = aggregator.history_in("2024-02-29", &tz).await.unwrap();
        let points: Vec<(i64, f64)> = buckets.iter().map(|b| (b.start, b.average_power)).collect();
        assert_eq!(
            points,
            vec![
                (midnight, 150.0),
                (midnight + 600, 60.0),
                (midnight + 86_400 - 600, 70.0)
            ]
        );

        handles.shutdown().await;
    }

    #[tokio::test]
    async fn test_invalid_requests_are_rejected() {
        let handles = store_with(&[]).await;
        let aggregator = Aggregator::new(handles.reader.clone());

        for bad in ["", "2024-13-01", "2024/01/01", "yesterday", "2023-02-29"] {
            assert!(matches!(
                aggregator.history_in(bad, &Utc).await,
                Err(AggregateError::InvalidRequest(_))
            ));
        }

        let negative = WindowOverride {
            hours: Some(-2.0),
            ..Default::default()
        };
        assert!(matches!(
            aggregator
                .series_at(Granularity::Hour, &negative, &at(1_000_000))
                .await,
            Err(AggregateError::InvalidRequest(_))
        ));

        handles.shutdown().await;
    }

    #[tokio::test]
    async fn test_storage_failure_surfaces() {
        let handles = store_with(&[]).await;
        let aggregator = Aggregator::new(handles.reader.clone());
        handles.shutdown().await;

        assert!(matches!(
            aggregator.summary_at(&at(1_000_000)).await,
            Err(AggregateError::Storage(_))
        ));
    }
}
