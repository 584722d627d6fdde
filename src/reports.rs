// Report orchestration: resolve periods, query each window, aggregate and
// compare. Results are memoised through the cache port.
use serde::Serialize;
use tracing::{debug, info};

use crate::aggregate::{aggregate, compare_groups, ComparisonTable, Metric, SortDirection, SortKey};
use crate::cache::{CacheKey, CacheLookup, ReportCache};
use crate::detention::{pattern_summary, DetentionFilter, DetentionPattern};
use crate::error::Result;
use crate::period::{ComparisonPeriods, PeriodPolicy, PeriodWindow};
use crate::presentation::{daily_series, DailySeries};
use crate::store::{LoadingFilter, RecordStore};
use crate::types::Dimension;

#[derive(Debug, Clone, PartialEq)]
pub struct ComparativeRequest {
    pub dimension: Dimension,
    pub policy: PeriodPolicy,
    /// Restrict to one commodity/station.
    pub value: Option<String>,
    pub sort: Option<(SortKey, SortDirection)>,
}

impl ComparativeRequest {
    pub fn new(dimension: Dimension, policy: PeriodPolicy) -> Self {
        Self {
            dimension,
            policy,
            value: None,
            sort: None,
        }
    }

    fn cache_key(&self, periods: &ComparisonPeriods) -> CacheKey {
        vec![
            "comparative".to_string(),
            self.dimension.label().to_string(),
            periods.current.from.to_string(),
            periods.current.to.to_string(),
            periods.previous.from.to_string(),
            periods.previous.to.to_string(),
            self.value.clone().unwrap_or_default(),
        ]
    }
}

/// Headline numbers written next to the tables.
#[derive(Debug, Clone, Serialize)]
pub struct ReportSummary {
    pub dimension: Dimension,
    pub current_period: PeriodWindow,
    pub previous_period: PeriodWindow,
    pub groups: usize,
    pub current_records: usize,
    pub previous_records: usize,
    pub current_tonnage: f64,
    pub previous_tonnage: f64,
    pub variation_percent: f64,
}

pub fn summarize(table: &ComparisonTable) -> ReportSummary {
    ReportSummary {
        dimension: table.dimension,
        current_period: table.periods.current,
        previous_period: table.periods.previous,
        groups: table.rows.len(),
        current_records: table.total.current.records,
        previous_records: table.total.previous.records,
        current_tonnage: table.total.current.tonnage,
        previous_tonnage: table.total.previous.tonnage,
        variation_percent: table.total.variation_percent,
    }
}

pub struct ReportService<S, C> {
    store: S,
    cache: C,
}

impl<S, C> ReportService<S, C>
where
    S: RecordStore,
    C: ReportCache<ComparisonTable>,
{
    pub fn new(store: S, cache: C) -> Self {
        Self { store, cache }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Mutable store access; cached reports are dropped since any write may
    /// change them.
    pub fn store_mut(&mut self) -> &mut S {
        self.cache.invalidate_all();
        &mut self.store
    }

    /// Build a comparison table. Period validation happens before the store
    /// is touched.
    pub fn comparative(&mut self, request: &ComparativeRequest) -> Result<ComparisonTable> {
        let periods = request.policy.resolve()?;
        let key = request.cache_key(&periods);

        let mut table = match self.cache.get(&key) {
            CacheLookup::Fresh(table) => {
                debug!(?key, "comparative report served from cache");
                table
            }
            CacheLookup::Stale(_) | CacheLookup::Missing => {
                let table = self.compute(request, &periods)?;
                self.cache.put(key, table.clone());
                table
            }
        };
        if let Some((sort_key, direction)) = request.sort {
            table.sort_by(sort_key, direction);
        }
        Ok(table)
    }

    fn compute(
        &self,
        request: &ComparativeRequest,
        periods: &ComparisonPeriods,
    ) -> Result<ComparisonTable> {
        let dimension_filter = request
            .value
            .as_ref()
            .map(|v| (request.dimension, v.trim().to_string()));
        let query = |window: &PeriodWindow| LoadingFilter {
            date_from: window.from,
            date_to: window.to,
            dimension: dimension_filter.clone(),
        };

        let current_rows = self.store.query_loading_records(&query(&periods.current))?;
        let previous_rows = self.store.query_loading_records(&query(&periods.previous))?;

        let current = aggregate(&current_rows, request.dimension, &periods.current);
        let previous = aggregate(&previous_rows, request.dimension, &periods.previous);
        let mut table = compare_groups(&current, &previous);
        if let Some((_, value)) = &dimension_filter {
            table.ensure_row(value);
        }
        info!(
            policy = request.policy.name(),
            dimension = request.dimension.label(),
            current = %periods.current,
            previous = %periods.previous,
            groups = table.rows.len(),
            "built comparative report"
        );
        Ok(table)
    }

    /// Day-by-day `metric` over the table's current window for its top `n`
    /// groups by that metric.
    pub fn daily_trend(&self, table: &ComparisonTable, metric: Metric, n: usize) -> Result<DailySeries> {
        let window = table.periods.current;
        let records = self.store.query_loading_records(&LoadingFilter {
            date_from: window.from,
            date_to: window.to,
            dimension: None,
        })?;
        let keys: Vec<String> = table.top_n(metric, n).iter().map(|r| r.key.clone()).collect();
        debug!(groups = keys.len(), days = window.day_count(), "built daily trend");
        Ok(daily_series(&records, table.dimension, &window, &keys, metric))
    }

    pub fn detention_patterns(&self, filter: &DetentionFilter) -> Result<Vec<DetentionPattern>> {
        let records = self.store.query_detention_records()?;
        let selected: Vec<_> = filter.apply(&records).into_iter().cloned().collect();
        Ok(pattern_summary(&selected))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::error::ReportError;
    use crate::store::InMemoryStore;
    use crate::types::LoadingRecord;
    use chrono::NaiveDate;
    use std::cell::Cell;
    use std::time::Duration;

    fn d(m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, m, day).unwrap()
    }

    fn rec(date: NaiveDate, commodity: &str, wagons: i64, tonnage: f64) -> LoadingRecord {
        LoadingRecord {
            commodity: Some(commodity.into()),
            station: Some("BSP".into()),
            wagons,
            tonnage,
            ..LoadingRecord::new(date)
        }
    }

    /// Store wrapper that counts queries.
    struct CountingStore {
        inner: InMemoryStore,
        queries: Cell<usize>,
    }

    impl RecordStore for CountingStore {
        fn query_loading_records(&self, filter: &LoadingFilter) -> Result<Vec<LoadingRecord>> {
            self.queries.set(self.queries.get() + 1);
            self.inner.query_loading_records(filter)
        }
        fn query_detention_records(&self) -> Result<Vec<crate::types::DetentionRecord>> {
            self.inner.query_detention_records()
        }
        fn insert_loading(&mut self, record: LoadingRecord) -> Result<u64> {
            self.inner.insert_loading(record)
        }
        fn update_loading(&mut self, record: LoadingRecord) -> Result<()> {
            self.inner.update_loading(record)
        }
        fn get_loading(&self, id: u64) -> Option<LoadingRecord> {
            self.inner.get_loading(id)
        }
        fn insert_detention(&mut self, record: crate::types::DetentionRecord) -> Result<u64> {
            self.inner.insert_detention(record)
        }
        fn update_detention(&mut self, record: crate::types::DetentionRecord) -> Result<()> {
            self.inner.update_detention(record)
        }
    }

    fn service() -> ReportService<CountingStore, MemoryCache<ComparisonTable>> {
        let store = CountingStore {
            inner: InMemoryStore::with_records(
                vec![
                    rec(d(1, 10), "COAL", 10, 500.0),
                    rec(d(1, 11), "IRON", 4, 200.0),
                    rec(d(1, 20), "COAL", 12, 600.0),
                ],
                vec![],
            ),
            queries: Cell::new(0),
        };
        ReportService::new(store, MemoryCache::new(Duration::from_secs(60)))
    }

    fn rolling() -> PeriodPolicy {
        PeriodPolicy::RollingWindow {
            current: PeriodWindow::new(d(1, 20), d(1, 29)).unwrap(),
        }
    }

    #[test]
    fn rolling_comparison_end_to_end() {
        let mut svc = service();
        let table = svc
            .comparative(&ComparativeRequest::new(Dimension::Commodity, rolling()))
            .unwrap();
        assert_eq!(table.periods.previous, PeriodWindow::new(d(1, 10), d(1, 19)).unwrap());
        let coal = table.row("COAL").unwrap();
        assert_eq!(coal.variation_absolute, 100.0);
        assert_eq!(coal.variation_percent, 20.0);
        let iron = table.row("IRON").unwrap();
        assert_eq!(iron.current.wagons, 0);
        assert_eq!(iron.variation_percent, -100.0);
        assert_eq!(table.total.current.avg_per_day, 1.2);
    }

    #[test]
    fn invalid_range_fails_before_querying() {
        let mut svc = service();
        let policy = PeriodPolicy::ExplicitDualRange {
            current_from: Some(d(2, 1)),
            current_to: None,
            previous_from: Some(d(1, 1)),
            previous_to: Some(d(1, 31)),
        };
        let err = svc
            .comparative(&ComparativeRequest::new(Dimension::Commodity, policy))
            .unwrap_err();
        assert!(matches!(err, ReportError::Validation(_)));
        assert_eq!(svc.store().queries.get(), 0);
    }

    #[test]
    fn unmatched_value_yields_zero_row() {
        let mut svc = service();
        let mut request = ComparativeRequest::new(Dimension::Commodity, rolling());
        request.value = Some("SALT".into());
        let table = svc.comparative(&request).unwrap();
        assert_eq!(table.rows.len(), 1);
        let salt = table.row("SALT").unwrap();
        assert_eq!(salt.current.wagons, 0);
        assert_eq!(salt.variation_percent, 0.0);
        assert_eq!(table.total.current.wagons, 0);
    }

    #[test]
    fn repeated_request_uses_cache_until_store_changes() {
        let mut svc = service();
        let request = ComparativeRequest::new(Dimension::Station, rolling());
        svc.comparative(&request).unwrap();
        svc.comparative(&request).unwrap();
        assert_eq!(svc.store().queries.get(), 2);

        svc.store_mut()
            .insert_loading(rec(d(1, 21), "COAL", 1, 10.0))
            .unwrap();
        let table = svc.comparative(&request).unwrap();
        assert_eq!(svc.store().queries.get(), 4);
        assert_eq!(table.row("BSP").unwrap().current.wagons, 13);
    }

    #[test]
    fn requested_sort_is_applied() {
        let mut svc = service();
        let mut request = ComparativeRequest::new(Dimension::Commodity, rolling());
        request.sort = Some((SortKey::VariationAbsolute, SortDirection::Ascending));
        let table = svc.comparative(&request).unwrap();
        assert_eq!(table.rows[0].key, "IRON");
        let summary = summarize(&table);
        assert_eq!(summary.groups, 2);
        assert_eq!(summary.current_records, 1);
        assert_eq!(summary.previous_records, 2);
    }

    #[test]
    fn daily_trend_follows_top_groups_over_current_window() {
        let mut svc = service();
        svc.store_mut()
            .insert_loading(rec(d(1, 22), "IRON", 3, 150.0))
            .unwrap();
        let table = svc
            .comparative(&ComparativeRequest::new(Dimension::Commodity, rolling()))
            .unwrap();
        let trend = svc.daily_trend(&table, Metric::Wagons, 1).unwrap();

        assert_eq!(trend.dates.len(), 10);
        assert_eq!(trend.dates[0], d(1, 20));
        assert_eq!(trend.series.len(), 1);
        let coal = &trend.series[0];
        assert_eq!(coal.name, "COAL");
        assert_eq!(coal.values[0], 12.0);
        assert_eq!(coal.values[2], 0.0);
        assert_eq!(coal.values.iter().sum::<f64>(), 12.0);
    }
}
