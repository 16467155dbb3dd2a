//! Aggregation Layer
//!
//! Stateless queries turning stored samples into fixed-width time buckets.
//!
//! All four granularities run through one algorithm. A [`SeriesPlan`] fixes
//! the window, bucket width, alignment origin and [`FillPolicy`]; grouping
//! happens in SQL and [`assemble`] merges the groups and applies the fill
//! policy.
//!
//! | granularity | window                       | width  | fill       |
//! |-------------|------------------------------|--------|------------|
//! | minute      | now - 2h (override) .. now   | 60s    | omit empty |
//! | hour        | now - 48h (override) .. now  | 3600s  | omit empty |
//! | day         | today, local midnight        | 3600s  | 24 slots   |
//! | week        | 7 days ending today          | 86400s | 7 slots    |

mod aggregator;
mod bucket;
mod error;
mod window;

pub use aggregator::{Aggregator, DailySummary};
pub use bucket::{Bucket, RUNTIME_THRESHOLD_WATTS, assemble, energy_kwh, runtime_seconds};
pub use error::AggregateError;
pub use window::{
    DEFAULT_HOUR_SPAN, DEFAULT_MINUTE_SPAN, FillPolicy, Granularity, HISTORY_BUCKET, SeriesPlan,
    WindowOverride, local_midnight,
};
