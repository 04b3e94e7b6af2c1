//! Usage analytics: unique visitors (UV) and daily active users (DAU).
//!
//! Each calendar day owns one HyperLogLog (`uv:YYYYMMDD`) and one presence
//! bitmap (`dau:YYYYMMDD`) in the key-value store. Range queries merge the
//! per-day structures into a range key (`prefix:START_END`) and read the
//! merged result back:
//!
//! - UV merges by HyperLogLog union, so the figure is an estimate (~0.81%
//!   standard error) and a visitor seen on several days counts once.
//! - DAU merges by bitwise OR, so the figure is exact and means "active on at
//!   least one day in the range".

use std::sync::Arc;
use std::time::Instant;

use chrono_tz::Tz;
use metrics::histogram;
use thiserror::Error;
use time::{Date, OffsetDateTime};
use tracing::{debug, instrument};

use crate::application::repos::{KeyValueStore, StoreError};
use crate::domain::analytics::{DateRange, Metric};
use crate::domain::error::DomainError;
use crate::util::timezone::localized_date;

const METRIC_ANALYTICS_RANGE_MS: &str = "plaza_analytics_range_ms";

#[derive(Debug, Clone, Error)]
pub enum AnalyticsError {
    #[error(transparent)]
    InvalidArgument(#[from] DomainError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Clone)]
pub struct AnalyticsService {
    store: Arc<dyn KeyValueStore>,
    timezone: Tz,
}

impl AnalyticsService {
    /// `timezone` decides which calendar day "today" is.
    pub fn new(store: Arc<dyn KeyValueStore>, timezone: Tz) -> Self {
        Self { store, timezone }
    }

    pub fn today(&self) -> Date {
        localized_date(OffsetDateTime::now_utc(), self.timezone)
    }

    /// Count `visitor` (typically a client address) as a visitor today.
    pub async fn record_visit(&self, visitor: &str) -> Result<(), AnalyticsError> {
        self.record_visit_on(self.today(), visitor).await
    }

    pub async fn record_visit_on(&self, day: Date, visitor: &str) -> Result<(), AnalyticsError> {
        if visitor.trim().is_empty() {
            return Err(DomainError::validation("visitor id must not be empty").into());
        }

        let key = Metric::UniqueVisitors.day_key(day)?;
        self.store.approx_add(&key, visitor).await?;
        Ok(())
    }

    /// Estimated distinct visitors over every day in `range`.
    #[instrument(skip_all, fields(range = %range))]
    pub async fn count_unique_visitors(&self, range: DateRange) -> Result<u64, AnalyticsError> {
        let started_at = Instant::now();
        let sources = day_keys(Metric::UniqueVisitors, &range)?;
        let dest = Metric::UniqueVisitors.range_key(&range)?;

        let estimate = self.store.approx_union_cardinality(&dest, &sources).await?;

        record_latency(Metric::UniqueVisitors, started_at);
        debug!(days = range.len_days(), estimate, "Counted unique visitors");
        Ok(estimate)
    }

    /// Mark `user_id` active today. The id is used directly as a bit offset.
    pub async fn record_active_user(&self, user_id: u32) -> Result<(), AnalyticsError> {
        self.record_active_user_on(self.today(), user_id).await
    }

    pub async fn record_active_user_on(
        &self,
        day: Date,
        user_id: u32,
    ) -> Result<(), AnalyticsError> {
        let key = Metric::ActiveUsers.day_key(day)?;
        self.store.set_bit(&key, user_id, true).await?;
        Ok(())
    }

    /// Exact number of users active on at least one day in `range`.
    #[instrument(skip_all, fields(range = %range))]
    pub async fn count_active_users(&self, range: DateRange) -> Result<u64, AnalyticsError> {
        let started_at = Instant::now();
        let sources = day_keys(Metric::ActiveUsers, &range)?;
        let dest = Metric::ActiveUsers.range_key(&range)?;

        self.store.bit_or(&dest, &sources).await?;
        let active = self.store.bit_count(&dest).await?;

        record_latency(Metric::ActiveUsers, started_at);
        debug!(days = range.len_days(), active, "Counted active users");
        Ok(active)
    }
}

fn day_keys(metric: Metric, range: &DateRange) -> Result<Vec<String>, DomainError> {
    range.days().map(|day| metric.day_key(day)).collect()
}

fn record_latency(metric: Metric, started_at: Instant) {
    histogram!(METRIC_ANALYTICS_RANGE_MS, "metric" => metric.prefix())
        .record(started_at.elapsed().as_secs_f64() * 1000.0);
}
