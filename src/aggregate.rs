// Period aggregation and current-vs-previous comparison.
//
// Rows are grouped by commodity or station within each window, reduced to
// sums, and then joined on the dimension value so every value seen in either
// window produces exactly one comparison row.
use chrono::NaiveDate;
use clap::ValueEnum;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

use crate::error::ReportError;
use crate::period::{ComparisonPeriods, PeriodWindow};
use crate::types::{Dimension, LoadingRecord};
use crate::util::{percent_change, safe_div};

pub const TOTAL_KEY: &str = "TOTAL";

/// Per-group sums for one window.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct RawAggregate {
    /// Distinct dates with at least one record.
    pub rks: usize,
    pub records: usize,
    pub wagons: i64,
    pub units: f64,
    pub tonnage: f64,
    pub freight: f64,
    /// Wagons divided by the window's fixed day count.
    pub avg_per_day: f64,
}

impl RawAggregate {
    pub fn metric(&self, metric: Metric) -> f64 {
        metric.value(self)
    }
}

/// Numeric columns a report can be compared, sorted or charted by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Rks,
    Wagons,
    Units,
    Tonnage,
    Freight,
    AvgPerDay,
}

impl Metric {
    pub const ALL: [Metric; 6] = [
        Metric::Rks,
        Metric::Wagons,
        Metric::Units,
        Metric::Tonnage,
        Metric::Freight,
        Metric::AvgPerDay,
    ];

    pub fn value(&self, agg: &RawAggregate) -> f64 {
        match self {
            Metric::Rks => agg.rks as f64,
            Metric::Wagons => agg.wagons as f64,
            Metric::Units => agg.units,
            Metric::Tonnage => agg.tonnage,
            Metric::Freight => agg.freight,
            Metric::AvgPerDay => agg.avg_per_day,
        }
    }

    pub fn key(&self) -> &'static str {
        match self {
            Metric::Rks => "rks",
            Metric::Wagons => "wagons",
            Metric::Units => "units",
            Metric::Tonnage => "tonnage",
            Metric::Freight => "freight",
            Metric::AvgPerDay => "avg_per_day",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Metric::Rks => "Rks",
            Metric::Wagons => "Wagon",
            Metric::Units => "Units",
            Metric::Tonnage => "MT",
            Metric::Freight => "Freight",
            Metric::AvgPerDay => "Avg/Day",
        }
    }
}

#[derive(Default)]
struct Acc {
    dates: BTreeSet<NaiveDate>,
    records: usize,
    wagons: i64,
    units: f64,
    tonnage: f64,
    freight: f64,
}

impl Acc {
    fn add(&mut self, r: &LoadingRecord) {
        self.dates.insert(r.date);
        self.records += 1;
        self.wagons += r.wagons;
        self.units += r.units;
        self.tonnage += r.tonnage;
        self.freight += r.freight;
    }

    fn finish(self, day_count: i64) -> RawAggregate {
        RawAggregate {
            rks: self.dates.len(),
            records: self.records,
            wagons: self.wagons,
            units: self.units,
            tonnage: self.tonnage,
            freight: self.freight,
            avg_per_day: safe_div(self.wagons as f64, day_count as f64, 0.0),
        }
    }
}

/// One window's grouped result plus the ungrouped total.
#[derive(Debug, Clone, Serialize)]
pub struct Aggregation {
    pub dimension: Dimension,
    pub period: PeriodWindow,
    pub groups: BTreeMap<String, RawAggregate>,
    pub total: RawAggregate,
}

/// Group `records` inside `period` by `dimension`.
///
/// Records without a dimension value land in the `""` bucket.
pub fn aggregate(
    records: &[LoadingRecord],
    dimension: Dimension,
    period: &PeriodWindow,
) -> Aggregation {
    let mut groups: BTreeMap<String, Acc> = BTreeMap::new();
    let mut total = Acc::default();
    for r in records.iter().filter(|r| period.contains(r.date)) {
        groups
            .entry(r.dimension_value(dimension).to_string())
            .or_default()
            .add(r);
        total.add(r);
    }
    let day_count = period.day_count();
    Aggregation {
        dimension,
        period: *period,
        groups: groups
            .into_iter()
            .map(|(k, acc)| (k, acc.finish(day_count)))
            .collect(),
        total: total.finish(day_count),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonRow {
    pub key: String,
    pub current: RawAggregate,
    pub previous: RawAggregate,
    /// Tonnage change, current minus previous.
    pub variation_absolute: f64,
    pub variation_percent: f64,
    /// Set only on the synthetic total; a group may itself be named `TOTAL`.
    is_total: bool,
}

impl ComparisonRow {
    pub fn new(key: impl Into<String>, current: RawAggregate, previous: RawAggregate) -> Self {
        let (variation_absolute, variation_percent) = variation(&current, &previous, Metric::Tonnage);
        Self {
            key: key.into(),
            current,
            previous,
            variation_absolute,
            variation_percent,
            is_total: false,
        }
    }

    /// The synthetic TOTAL row, recomputed from the window sums.
    pub fn total(current: RawAggregate, previous: RawAggregate) -> Self {
        Self {
            is_total: true,
            ..Self::new(TOTAL_KEY, current, previous)
        }
    }

    /// Absolute and percentage change for any metric.
    pub fn variation(&self, metric: Metric) -> (f64, f64) {
        variation(&self.current, &self.previous, metric)
    }

    pub fn is_total(&self) -> bool {
        self.is_total
    }
}

fn variation(current: &RawAggregate, previous: &RawAggregate, metric: Metric) -> (f64, f64) {
    let cur = metric.value(current);
    let prev = metric.value(previous);
    (cur - prev, percent_change(cur, prev))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SortKey {
    Dimension,
    Current(Metric),
    Previous(Metric),
    VariationAbsolute,
    VariationPercent,
}

impl SortKey {
    fn compare(&self, a: &ComparisonRow, b: &ComparisonRow) -> Ordering {
        match self {
            SortKey::Dimension => a.key.cmp(&b.key),
            SortKey::Current(m) => cmp_f64(m.value(&a.current), m.value(&b.current)),
            SortKey::Previous(m) => cmp_f64(m.value(&a.previous), m.value(&b.previous)),
            SortKey::VariationAbsolute => cmp_f64(a.variation_absolute, b.variation_absolute),
            SortKey::VariationPercent => cmp_f64(a.variation_percent, b.variation_percent),
        }
    }
}

impl FromStr for SortKey {
    type Err = ReportError;

    /// Accepts `dimension`, `variation`, `variation_percent`, and
    /// `current_<metric>` / `previous_<metric>` (e.g. `current_tonnage`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase().replace('-', "_");
        match s.as_str() {
            "dimension" | "commodity" | "station" | "name" => return Ok(SortKey::Dimension),
            "variation" | "variation_absolute" => return Ok(SortKey::VariationAbsolute),
            "variation_percent" | "percent" => return Ok(SortKey::VariationPercent),
            _ => {}
        }
        let metric_for = |name: &str| Metric::ALL.into_iter().find(|m| m.key() == name);
        if let Some(m) = s.strip_prefix("current_").and_then(metric_for) {
            return Ok(SortKey::Current(m));
        }
        if let Some(m) = s.strip_prefix("previous_").and_then(metric_for) {
            return Ok(SortKey::Previous(m));
        }
        if let Some(m) = metric_for(&s) {
            return Ok(SortKey::Current(m));
        }
        Err(ReportError::validation(format!("unknown sort column `{}`", s)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, ValueEnum)]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

fn cmp_f64(a: f64, b: f64) -> Ordering {
    a.partial_cmp(&b).unwrap_or(Ordering::Equal)
}

/// Comparison rows, sorted, with the synthetic TOTAL kept apart so sorting
/// never moves it.
#[derive(Debug, Clone, Serialize)]
pub struct ComparisonTable {
    pub dimension: Dimension,
    pub periods: ComparisonPeriods,
    pub rows: Vec<ComparisonRow>,
    pub total: ComparisonRow,
}

impl ComparisonTable {
    /// Sort by `key`, ties broken by the dimension value. Descending is the
    /// exact reverse of ascending, ties included.
    pub fn sort_by(&mut self, key: SortKey, direction: SortDirection) {
        self.rows.sort_by(|a, b| {
            let ord = key.compare(a, b).then_with(|| a.key.cmp(&b.key));
            match direction {
                SortDirection::Ascending => ord,
                SortDirection::Descending => ord.reverse(),
            }
        });
    }

    /// Make sure `key` has a row, zero-filled if neither window had data.
    pub fn ensure_row(&mut self, key: &str) {
        if self.rows.iter().any(|r| r.key == key) {
            return;
        }
        self.rows.push(ComparisonRow::new(
            key,
            RawAggregate::default(),
            RawAggregate::default(),
        ));
        self.sort_by(SortKey::Dimension, SortDirection::Ascending);
    }

    /// Group row for `key`. The synthetic total lives in `total`, never here.
    pub fn row(&self, key: &str) -> Option<&ComparisonRow> {
        self.rows.iter().find(|r| r.key == key)
    }

    /// Rows followed by TOTAL, the order tables and exports render them in.
    pub fn rows_with_total(&self) -> impl Iterator<Item = &ComparisonRow> {
        self.rows.iter().chain(std::iter::once(&self.total))
    }

    /// The `n` rows with the largest current value of `metric`.
    pub fn top_n(&self, metric: Metric, n: usize) -> Vec<&ComparisonRow> {
        let mut ranked: Vec<&ComparisonRow> = self.rows.iter().collect();
        ranked.sort_by(|a, b| cmp_f64(metric.value(&b.current), metric.value(&a.current)));
        ranked.truncate(n);
        ranked
    }
}

/// Join two windows' aggregations into comparison rows plus TOTAL.
pub fn compare_groups(current: &Aggregation, previous: &Aggregation) -> ComparisonTable {
    let keys: BTreeSet<&String> = current.groups.keys().chain(previous.groups.keys()).collect();
    let rows = keys
        .into_iter()
        .map(|k| {
            ComparisonRow::new(
                k.clone(),
                current.groups.get(k).copied().unwrap_or_default(),
                previous.groups.get(k).copied().unwrap_or_default(),
            )
        })
        .collect();
    ComparisonTable {
        dimension: current.dimension,
        periods: ComparisonPeriods {
            current: current.period,
            previous: previous.period,
        },
        rows,
        total: ComparisonRow::total(current.total, previous.total),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn rec(date: NaiveDate, commodity: &str, wagons: i64, tonnage: f64) -> LoadingRecord {
        LoadingRecord {
            commodity: Some(commodity.to_string()),
            wagons,
            tonnage,
            ..LoadingRecord::new(date)
        }
    }

    fn window(from: NaiveDate, to: NaiveDate) -> PeriodWindow {
        PeriodWindow::new(from, to).unwrap()
    }

    #[test]
    fn worked_example_by_commodity() {
        let records = vec![
            rec(d(2025, 1, 1), "COAL", 10, 500.0),
            rec(d(2025, 1, 1), "COAL", 5, 250.0),
            rec(d(2025, 1, 2), "IRON", 8, 400.0),
        ];
        let agg = aggregate(&records, Dimension::Commodity, &window(d(2025, 1, 1), d(2025, 1, 2)));

        let coal = agg.groups["COAL"];
        assert_eq!((coal.rks, coal.wagons, coal.tonnage), (1, 15, 750.0));
        assert_eq!(coal.avg_per_day, 7.5);

        let iron = agg.groups["IRON"];
        assert_eq!((iron.rks, iron.wagons, iron.tonnage), (1, 8, 400.0));
        assert_eq!(iron.avg_per_day, 4.0);

        assert_eq!((agg.total.rks, agg.total.wagons, agg.total.tonnage), (2, 23, 1150.0));
        assert_eq!(agg.total.avg_per_day, 11.5);
    }

    #[test]
    fn rks_counts_distinct_dates() {
        let records = vec![
            rec(d(2025, 2, 1), "COAL", 1, 0.0),
            rec(d(2025, 2, 1), "COAL", 2, 0.0),
            rec(d(2025, 2, 1), "COAL", 3, 0.0),
            rec(d(2025, 2, 3), "COAL", 4, 0.0),
        ];
        let agg = aggregate(&records, Dimension::Commodity, &window(d(2025, 2, 1), d(2025, 2, 28)));
        assert_eq!(agg.groups["COAL"].rks, 2);
        assert_eq!(agg.groups["COAL"].records, 4);
        assert_eq!(agg.groups["COAL"].wagons, 10);
    }

    #[test]
    fn filter_includes_both_boundaries_only() {
        let records = vec![
            rec(d(2025, 3, 31), "A", 1, 1.0),
            rec(d(2025, 4, 1), "A", 10, 1.0),
            rec(d(2025, 4, 30), "A", 100, 1.0),
            rec(d(2025, 5, 1), "A", 1000, 1.0),
        ];
        let agg = aggregate(&records, Dimension::Commodity, &window(d(2025, 4, 1), d(2025, 4, 30)));
        assert_eq!(agg.total.wagons, 110);
    }

    #[test]
    fn missing_dimension_goes_to_unknown_bucket() {
        let mut blank = rec(d(2025, 1, 1), "  ", 2, 20.0);
        blank.station = None;
        let mut none = LoadingRecord::new(d(2025, 1, 1));
        none.wagons = 3;
        let agg = aggregate(&[blank, none], Dimension::Commodity, &window(d(2025, 1, 1), d(2025, 1, 1)));
        assert_eq!(agg.groups.len(), 1);
        assert_eq!(agg.groups[""].wagons, 5);
    }

    #[test]
    fn group_sums_match_ungrouped_totals() {
        let records: Vec<LoadingRecord> = (0..40)
            .map(|i| LoadingRecord {
                station: if i % 7 == 0 { None } else { Some(format!("ST{}", i % 4)) },
                units: i as f64 * 0.5,
                freight: i as f64 * 13.25,
                ..rec(d(2025, 1, 1 + (i % 20) as u32), &format!("C{}", i % 3), i, i as f64 * 10.0)
            })
            .collect();
        let period = window(d(2025, 1, 5), d(2025, 1, 15));
        for dimension in [Dimension::Commodity, Dimension::Station] {
            let agg = aggregate(&records, dimension, &period);
            let wagons: i64 = agg.groups.values().map(|g| g.wagons).sum();
            let units: f64 = agg.groups.values().map(|g| g.units).sum();
            let tonnage: f64 = agg.groups.values().map(|g| g.tonnage).sum();
            let freight: f64 = agg.groups.values().map(|g| g.freight).sum();
            assert_eq!(wagons, agg.total.wagons);
            assert!((units - agg.total.units).abs() < 1e-6);
            assert!((tonnage - agg.total.tonnage).abs() < 1e-6);
            assert!((freight - agg.total.freight).abs() < 1e-6);
            let expected: i64 = records
                .iter()
                .filter(|r| period.contains(r.date))
                .map(|r| r.wagons)
                .sum();
            assert_eq!(agg.total.wagons, expected);
        }
    }

    #[test]
    fn compare_unions_keys_and_guards_zero_previous() {
        let current = aggregate(
            &[rec(d(2025, 1, 2), "COAL", 5, 100.0), rec(d(2025, 1, 2), "SALT", 0, 0.0)],
            Dimension::Commodity,
            &window(d(2025, 1, 2), d(2025, 1, 2)),
        );
        let previous = aggregate(
            &[rec(d(2025, 1, 1), "IRON", 4, 80.0), rec(d(2025, 1, 1), "SALT", 0, 0.0)],
            Dimension::Commodity,
            &window(d(2025, 1, 1), d(2025, 1, 1)),
        );
        let table = compare_groups(&current, &previous);
        let keys: Vec<&str> = table.rows.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["COAL", "IRON", "SALT"]);

        let coal = table.row("COAL").unwrap();
        assert_eq!(coal.previous, RawAggregate::default());
        assert_eq!(coal.variation_percent, 100.0);

        let iron = table.row("IRON").unwrap();
        assert_eq!(iron.variation_absolute, -80.0);
        assert_eq!(iron.variation_percent, -100.0);

        let salt = table.row("SALT").unwrap();
        assert_eq!(salt.variation_percent, 0.0);
        assert!(table.rows_with_total().all(|r| r.variation_percent.is_finite()));
    }

    #[test]
    fn total_percent_is_recomputed_from_sums() {
        let current = aggregate(
            &[rec(d(2025, 1, 2), "A", 1, 300.0), rec(d(2025, 1, 2), "B", 1, 100.0)],
            Dimension::Commodity,
            &window(d(2025, 1, 2), d(2025, 1, 2)),
        );
        let previous = aggregate(
            &[rec(d(2025, 1, 1), "A", 1, 100.0), rec(d(2025, 1, 1), "B", 1, 100.0)],
            Dimension::Commodity,
            &window(d(2025, 1, 1), d(2025, 1, 1)),
        );
        let table = compare_groups(&current, &previous);
        // Rows are +200% and 0%; the mean of those would be 100%.
        assert_eq!(table.total.variation_absolute, 200.0);
        assert_eq!(table.total.variation_percent, 100.0);
        assert_eq!(table.row("A").unwrap().variation_percent, 200.0);
        assert_eq!(table.total.current.avg_per_day, 2.0);
    }

    fn sample_table() -> ComparisonTable {
        let current = aggregate(
            &[
                rec(d(2025, 1, 2), "D", 3, 30.0),
                rec(d(2025, 1, 2), "A", 3, 10.0),
                rec(d(2025, 1, 2), "C", 1, 20.0),
                rec(d(2025, 1, 2), "B", 3, 40.0),
            ],
            Dimension::Commodity,
            &window(d(2025, 1, 2), d(2025, 1, 2)),
        );
        let previous = aggregate(&[], Dimension::Commodity, &window(d(2025, 1, 1), d(2025, 1, 1)));
        compare_groups(&current, &previous)
    }

    fn keys(table: &ComparisonTable) -> Vec<String> {
        table.rows.iter().map(|r| r.key.clone()).collect()
    }

    #[test]
    fn sort_is_idempotent_and_reverses_exactly_with_ties() {
        // A, B and D tie on three wagons.
        let mut table = sample_table();
        let key = SortKey::Current(Metric::Wagons);
        table.sort_by(key, SortDirection::Ascending);
        let ascending = keys(&table);
        assert_eq!(ascending, vec!["C", "A", "B", "D"]);
        table.sort_by(key, SortDirection::Ascending);
        assert_eq!(keys(&table), ascending);

        table.sort_by(key, SortDirection::Descending);
        assert_eq!(keys(&table), vec!["D", "B", "A", "C"]);
        table.sort_by(key, SortDirection::Descending);
        assert_eq!(keys(&table), vec!["D", "B", "A", "C"]);

        let mut reversed = ascending.clone();
        reversed.reverse();
        assert_eq!(keys(&table), reversed);

        // Starting from a shuffled order changes nothing.
        table.rows.swap(0, 3);
        table.sort_by(key, SortDirection::Ascending);
        assert_eq!(keys(&table), ascending);
    }

    #[test]
    fn reversing_direction_reverses_distinct_keys() {
        let mut table = sample_table();
        let key = SortKey::Current(Metric::Tonnage);
        table.sort_by(key, SortDirection::Ascending);
        let mut ascending = keys(&table);
        assert_eq!(ascending, vec!["A", "C", "D", "B"]);
        table.sort_by(key, SortDirection::Descending);
        ascending.reverse();
        assert_eq!(keys(&table), ascending);
        assert_eq!(table.total.key, TOTAL_KEY);
        assert!(table.total.is_total());
    }

    #[test]
    fn group_named_total_stays_a_group() {
        let current = aggregate(
            &[rec(d(2025, 1, 2), "TOTAL", 5, 50.0), rec(d(2025, 1, 2), "COAL", 7, 70.0)],
            Dimension::Commodity,
            &window(d(2025, 1, 2), d(2025, 1, 2)),
        );
        let previous = aggregate(&[], Dimension::Commodity, &window(d(2025, 1, 1), d(2025, 1, 1)));
        let mut table = compare_groups(&current, &previous);

        let group = table.row("TOTAL").unwrap();
        assert_eq!(group.current.wagons, 5);
        assert!(!group.is_total());
        assert_eq!(table.total.current.wagons, 12);

        table.sort_by(SortKey::Current(Metric::Wagons), SortDirection::Descending);
        let flags: Vec<(&str, bool)> = table
            .rows_with_total()
            .map(|r| (r.key.as_str(), r.is_total()))
            .collect();
        assert_eq!(flags, vec![("COAL", false), ("TOTAL", false), ("TOTAL", true)]);
    }

    #[test]
    fn ensure_row_zero_fills_missing_value() {
        let mut table = sample_table();
        table.ensure_row("AA");
        let row = table.row("AA").unwrap();
        assert_eq!(row.current, RawAggregate::default());
        assert_eq!(row.variation_percent, 0.0);
        assert_eq!(keys(&table)[1], "AA");
        table.ensure_row("AA");
        assert_eq!(table.rows.len(), 5);
    }

    #[test]
    fn parses_sort_keys() {
        assert_eq!("dimension".parse::<SortKey>().unwrap(), SortKey::Dimension);
        assert_eq!(
            "previous-avg_per_day".parse::<SortKey>().unwrap(),
            SortKey::Previous(Metric::AvgPerDay)
        );
        assert_eq!("tonnage".parse::<SortKey>().unwrap(), SortKey::Current(Metric::Tonnage));
        assert!("colour".parse::<SortKey>().is_err());
    }

    #[test]
    fn top_n_ranks_by_current_metric() {
        let table = sample_table();
        let top: Vec<&str> = table.top_n(Metric::Tonnage, 2).iter().map(|r| r.key.as_str()).collect();
        assert_eq!(top, vec!["B", "D"]);
    }
}
