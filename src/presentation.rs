// View models for the comparison screens: flat table rows and chart series.
use chrono::NaiveDate;
use serde::Serialize;
use tabled::Tabled;

use crate::aggregate::{aggregate, ComparisonRow, ComparisonTable, Metric, RawAggregate};
use crate::config::DisplayConfig;
use crate::period::PeriodWindow;
use crate::types::{Dimension, LoadingRecord};
use crate::util::{format_currency, format_int, format_mt, format_number, format_signed_percent};

pub const UNKNOWN_LABEL: &str = "Unknown";

pub fn display_key(key: &str) -> &str {
    if key.is_empty() {
        UNKNOWN_LABEL
    } else {
        key
    }
}

/// One rendered line of a comparison table: current, previous and variation
/// column groups.
#[derive(Debug, Clone, Serialize, Tabled)]
pub struct ComparisonTableRow {
    #[serde(rename = "Name")]
    #[tabled(rename = "Name")]
    pub name: String,
    #[serde(rename = "Rks (Cur)")]
    #[tabled(rename = "Rks (Cur)")]
    pub current_rks: String,
    #[serde(rename = "Avg/Day (Cur)")]
    #[tabled(rename = "Avg/Day (Cur)")]
    pub current_avg_per_day: String,
    #[serde(rename = "Wagon (Cur)")]
    #[tabled(rename = "Wagon (Cur)")]
    pub current_wagons: String,
    #[serde(rename = "MT (Cur)")]
    #[tabled(rename = "MT (Cur)")]
    pub current_mt: String,
    #[serde(rename = "Freight (Cur)")]
    #[tabled(rename = "Freight (Cur)")]
    pub current_freight: String,
    #[serde(rename = "Rks (Prev)")]
    #[tabled(rename = "Rks (Prev)")]
    pub previous_rks: String,
    #[serde(rename = "Avg/Day (Prev)")]
    #[tabled(rename = "Avg/Day (Prev)")]
    pub previous_avg_per_day: String,
    #[serde(rename = "Wagon (Prev)")]
    #[tabled(rename = "Wagon (Prev)")]
    pub previous_wagons: String,
    #[serde(rename = "MT (Prev)")]
    #[tabled(rename = "MT (Prev)")]
    pub previous_mt: String,
    #[serde(rename = "Freight (Prev)")]
    #[tabled(rename = "Freight (Prev)")]
    pub previous_freight: String,
    #[serde(rename = "Variation in Units")]
    #[tabled(rename = "Variation in Units")]
    pub variation_units: String,
    #[serde(rename = "Variation in %age")]
    #[tabled(rename = "Variation in %age")]
    pub variation_percent: String,
}

struct Cells {
    rks: String,
    avg_per_day: String,
    wagons: String,
    mt: String,
    freight: String,
}

fn cells(agg: &RawAggregate, display: &DisplayConfig) -> Cells {
    Cells {
        rks: format_int(agg.rks),
        avg_per_day: format_number(agg.avg_per_day, 3),
        wagons: format_int(agg.wagons),
        mt: format_mt(agg.tonnage, display.tonnage_divisor),
        freight: format_currency(agg.freight, &display.currency_prefix),
    }
}

impl ComparisonTableRow {
    pub fn from_row(row: &ComparisonRow, display: &DisplayConfig) -> Self {
        let cur = cells(&row.current, display);
        let prev = cells(&row.previous, display);
        let variation_mt = row.variation_absolute / display.tonnage_divisor;
        let variation_units = format_number(variation_mt, 3);
        Self {
            name: display_key(&row.key).to_string(),
            current_rks: cur.rks,
            current_avg_per_day: cur.avg_per_day,
            current_wagons: cur.wagons,
            current_mt: cur.mt,
            current_freight: cur.freight,
            previous_rks: prev.rks,
            previous_avg_per_day: prev.avg_per_day,
            previous_wagons: prev.wagons,
            previous_mt: prev.mt,
            previous_freight: prev.freight,
            variation_units: if variation_units.starts_with('-') {
                variation_units
            } else {
                format!("+{}", variation_units)
            },
            variation_percent: format_signed_percent(row.variation_percent),
        }
    }
}

/// Rows in table order with TOTAL last.
pub fn table_rows(table: &ComparisonTable, display: &DisplayConfig) -> Vec<ComparisonTableRow> {
    table
        .rows_with_total()
        .map(|r| ComparisonTableRow::from_row(r, display))
        .collect()
}

/// Bar-chart data: the top `n` dimension values by current `metric`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartData {
    pub metric: Metric,
    pub labels: Vec<String>,
    pub current: Vec<f64>,
    pub previous: Vec<f64>,
}

pub fn chart_series(table: &ComparisonTable, metric: Metric, n: usize) -> ChartData {
    let top = table.top_n(metric, n);
    ChartData {
        metric,
        labels: top.iter().map(|r| display_key(&r.key).to_string()).collect(),
        current: top.iter().map(|r| metric.value(&r.current)).collect(),
        previous: top.iter().map(|r| metric.value(&r.previous)).collect(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Series {
    pub name: String,
    pub values: Vec<f64>,
}

/// Day-by-day values for selected dimension values across one window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailySeries {
    pub metric: Metric,
    pub dates: Vec<NaiveDate>,
    pub series: Vec<Series>,
}

pub fn daily_series(
    records: &[LoadingRecord],
    dimension: Dimension,
    period: &PeriodWindow,
    keys: &[String],
    metric: Metric,
) -> DailySeries {
    let in_period: Vec<LoadingRecord> = records
        .iter()
        .filter(|r| period.contains(r.date))
        .cloned()
        .collect();
    let dates: Vec<NaiveDate> = period.days().collect();
    let mut series: Vec<Series> = keys
        .iter()
        .map(|k| Series {
            name: display_key(k).to_string(),
            values: Vec::with_capacity(dates.len()),
        })
        .collect();

    for day in &dates {
        let window = PeriodWindow { from: *day, to: *day };
        let agg = aggregate(&in_period, dimension, &window);
        for (key, s) in keys.iter().zip(series.iter_mut()) {
            s.values
                .push(agg.groups.get(key).map_or(0.0, |g| metric.value(g)));
        }
    }
    DailySeries {
        metric,
        dates,
        series,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::compare_groups;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, day).unwrap()
    }

    fn rec(day: u32, commodity: &str, wagons: i64, tonnage: f64, freight: f64) -> LoadingRecord {
        LoadingRecord {
            commodity: Some(commodity.into()),
            wagons,
            tonnage,
            freight,
            ..LoadingRecord::new(d(day))
        }
    }

    fn table() -> (Vec<LoadingRecord>, ComparisonTable) {
        let records = vec![
            rec(1, "COAL", 40, 2_500_000.0, 150_000.0),
            rec(2, "COAL", 20, 1_500_000.0, 50_000.0),
            rec(2, "", 2, 0.0, 0.0),
            rec(3, "COAL", 30, 2_000_000.0, 100_000.0),
        ];
        let current = PeriodWindow::new(d(2), d(3)).unwrap();
        let previous = PeriodWindow::new(d(1), d(1)).unwrap();
        let table = compare_groups(
            &aggregate(&records, Dimension::Commodity, &current),
            &aggregate(&records, Dimension::Commodity, &previous),
        );
        (records, table)
    }

    #[test]
    fn rows_follow_display_conventions() {
        let (_, table) = table();
        let rows = table_rows(&table, &DisplayConfig::default());
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].name, UNKNOWN_LABEL);

        let coal = &rows[1];
        assert_eq!(coal.current_rks, "2");
        assert_eq!(coal.current_avg_per_day, "25.000");
        assert_eq!(coal.current_mt, "3.500");
        assert_eq!(coal.current_freight, "₹150,000.00");
        assert_eq!(coal.previous_mt, "2.500");
        assert_eq!(coal.variation_units, "+1.000");
        assert_eq!(coal.variation_percent, "+40.00%");

        let total = &rows[2];
        assert_eq!(total.name, "TOTAL");
        assert_eq!(total.current_wagons, "52");
        assert_eq!(total.current_avg_per_day, "26.000");
    }

    #[test]
    fn chart_takes_top_n_by_metric() {
        let (_, table) = table();
        let chart = chart_series(&table, Metric::Tonnage, 1);
        assert_eq!(chart.labels, vec!["COAL"]);
        assert_eq!(chart.current, vec![3_500_000.0]);
        assert_eq!(chart.previous, vec![2_500_000.0]);
    }

    #[test]
    fn daily_series_fills_empty_days_with_zero() {
        let (records, _) = table();
        let period = PeriodWindow::new(d(1), d(4)).unwrap();
        let series = daily_series(
            &records,
            Dimension::Commodity,
            &period,
            &["COAL".to_string()],
            Metric::Wagons,
        );
        assert_eq!(series.dates.len(), 4);
        assert_eq!(series.series[0].values, vec![40.0, 20.0, 30.0, 0.0]);
    }
}
