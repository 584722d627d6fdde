use chrono::NaiveDate;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use tabled::Tabled;

use crate::error::{ReportError, Result};
use crate::types::DetentionRecord;
use crate::util::{average, format_number, std_dev};

const MIN_SAMPLES: usize = 3;
const TOP_PATTERNS: usize = 3;
const LONG_DWELL_MINUTES: f64 = 180.0;
const ERRATIC_RATIO: f64 = 0.5;

pub const RECOMMEND_LONG_DWELL: &str =
    "Average detention exceeds 3 hours; review placement and release scheduling";
pub const RECOMMEND_ERRATIC: &str =
    "Detention times vary widely; standardise handling for this wagon type";
pub const RECOMMEND_STEADY: &str = "Detention is consistent; maintain current practice";

impl DetentionRecord {
    /// Arrival to departure, in minutes. Negative if the timestamps are out of order.
    pub fn duration_minutes(&self) -> f64 {
        (self.departure_time - self.arrival_time).num_seconds() as f64 / 60.0
    }

    pub fn display_minutes(&self) -> i64 {
        self.duration_minutes().round() as i64
    }

    /// Checks arrival <= placement <= release <= departure.
    pub fn validate(&self) -> Result<()> {
        let stages = [
            ("arrival", self.arrival_time),
            ("placement", self.placement_time),
            ("release", self.release_time),
            ("departure", self.departure_time),
        ];
        for pair in stages.windows(2) {
            let (earlier, a) = pair[0];
            let (later, b) = pair[1];
            if b < a {
                return Err(ReportError::validation(format!(
                    "rake {}: {} time {} is before {} time {}",
                    self.rake_id, later, b, earlier, a
                )));
            }
        }
        Ok(())
    }
}

/// Narrowing applied by the detention views; every field is optional.
#[derive(Debug, Clone, Default)]
pub struct DetentionFilter {
    pub station_id: Option<String>,
    pub wagon_type: Option<String>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl DetentionFilter {
    pub fn matches(&self, r: &DetentionRecord) -> bool {
        let arrival = r.arrival_time.date();
        self.station_id.as_ref().map_or(true, |s| &r.station_id == s)
            && self.wagon_type.as_ref().map_or(true, |w| &r.wagon_type == w)
            && self.from.map_or(true, |f| arrival >= f)
            && self.to.map_or(true, |t| arrival <= t)
    }

    pub fn apply<'a>(&self, records: &'a [DetentionRecord]) -> Vec<&'a DetentionRecord> {
        records.iter().filter(|r| self.matches(r)).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetentionPattern {
    pub station_id: String,
    pub wagon_type: String,
    pub count: usize,
    pub mean_minutes: f64,
    pub stddev_minutes: f64,
    pub confidence: f64,
    pub recommendation: &'static str,
}

#[derive(Debug, Clone, Serialize, Tabled)]
pub struct DetentionPatternRow {
    #[serde(rename = "Station")]
    #[tabled(rename = "Station")]
    pub station: String,
    #[serde(rename = "WagonType")]
    #[tabled(rename = "WagonType")]
    pub wagon_type: String,
    #[serde(rename = "Samples")]
    #[tabled(rename = "Samples")]
    pub samples: usize,
    #[serde(rename = "AvgMinutes")]
    #[tabled(rename = "AvgMinutes")]
    pub avg_minutes: String,
    #[serde(rename = "StdDev")]
    #[tabled(rename = "StdDev")]
    pub std_dev: String,
    #[serde(rename = "Confidence")]
    #[tabled(rename = "Confidence")]
    pub confidence: String,
    #[serde(rename = "Recommendation")]
    #[tabled(rename = "Recommendation")]
    pub recommendation: String,
}

impl From<&DetentionPattern> for DetentionPatternRow {
    fn from(p: &DetentionPattern) -> Self {
        Self {
            station: p.station_id.clone(),
            wagon_type: p.wagon_type.clone(),
            samples: p.count,
            avg_minutes: format_number(p.mean_minutes, 0),
            std_dev: format_number(p.stddev_minutes, 0),
            confidence: format_number(p.confidence, 0),
            recommendation: p.recommendation.to_string(),
        }
    }
}

/// Consistency score in 0..=100; more samples and a lower coefficient of
/// variation score higher.
fn confidence(count: usize, mean: f64, stddev: f64) -> f64 {
    let consistency = if stddev == 0.0 {
        1.0
    } else if mean == 0.0 {
        0.0
    } else {
        1.0 / (stddev / mean)
    };
    let score = (count as f64 / 10.0) * consistency * 100.0;
    if score.is_finite() {
        score.clamp(0.0, 100.0)
    } else {
        0.0
    }
}

fn recommendation(mean: f64, stddev: f64) -> &'static str {
    if mean > LONG_DWELL_MINUTES {
        RECOMMEND_LONG_DWELL
    } else if stddev > mean * ERRATIC_RATIO {
        RECOMMEND_ERRATIC
    } else {
        RECOMMEND_STEADY
    }
}

/// Top three `(station, wagon type)` groups by confidence, ignoring groups
/// with fewer than three records.
pub fn pattern_summary(records: &[DetentionRecord]) -> Vec<DetentionPattern> {
    let mut groups: BTreeMap<(&str, &str), Vec<f64>> = BTreeMap::new();
    for r in records {
        groups
            .entry((r.station_id.as_str(), r.wagon_type.as_str()))
            .or_default()
            .push(r.duration_minutes());
    }

    let mut patterns: Vec<DetentionPattern> = groups
        .into_iter()
        .filter(|(_, durations)| durations.len() >= MIN_SAMPLES)
        .map(|((station, wagon_type), durations)| {
            let mean = average(&durations);
            let stddev = std_dev(&durations);
            DetentionPattern {
                station_id: station.to_string(),
                wagon_type: wagon_type.to_string(),
                count: durations.len(),
                mean_minutes: mean,
                stddev_minutes: stddev,
                confidence: confidence(durations.len(), mean, stddev),
                recommendation: recommendation(mean, stddev),
            }
        })
        .collect();

    patterns.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(Ordering::Equal)
    });
    patterns.truncate(TOP_PATTERNS);
    patterns
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDateTime};

    fn at(hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 1, 10)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    fn dwell(station: &str, wagon: &str, minutes: i64) -> DetentionRecord {
        let arrival = at(6, 0);
        DetentionRecord {
            id: 0,
            station_id: station.into(),
            rake_id: format!("R-{}", minutes),
            wagon_type: wagon.into(),
            arrival_time: arrival,
            placement_time: arrival,
            release_time: arrival,
            departure_time: arrival + Duration::minutes(minutes),
        }
    }

    #[test]
    fn duration_is_arrival_to_departure() {
        let mut r = dwell("BSP", "BOXN", 0);
        r.departure_time = at(8, 30) + Duration::seconds(40);
        assert_eq!(r.display_minutes(), 151);
    }

    #[test]
    fn validate_rejects_out_of_order_stages() {
        let mut r = dwell("BSP", "BOXN", 60);
        r.placement_time = at(7, 0);
        r.release_time = at(6, 30);
        let err = r.validate().unwrap_err();
        assert!(err.to_string().contains("release time"));
        assert!(dwell("BSP", "BOXN", 60).validate().is_ok());
    }

    #[test]
    fn groups_below_three_samples_never_surface() {
        let records = vec![
            dwell("BSP", "BOXN", 10_000),
            dwell("BSP", "BOXN", 1),
            dwell("KRBA", "BCN", 100),
            dwell("KRBA", "BCN", 110),
            dwell("KRBA", "BCN", 120),
        ];
        let patterns = pattern_summary(&records);
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].station_id, "KRBA");
        assert_eq!(patterns[0].recommendation, RECOMMEND_STEADY);
    }

    #[test]
    fn identical_durations_are_fully_consistent() {
        let records: Vec<_> = (0..10).map(|_| dwell("BSP", "BOXN", 240)).collect();
        let patterns = pattern_summary(&records);
        assert_eq!(patterns[0].stddev_minutes, 0.0);
        assert_eq!(patterns[0].confidence, 100.0);
        assert_eq!(patterns[0].recommendation, RECOMMEND_LONG_DWELL);
    }

    #[test]
    fn confidence_scales_with_samples_and_spread() {
        // mean 100, stddev 50 (population) -> 0.4 * 2 * 100 = 80
        let records = vec![
            dwell("A", "X", 50),
            dwell("A", "X", 50),
            dwell("A", "X", 150),
            dwell("A", "X", 150),
        ];
        let p = &pattern_summary(&records)[0];
        assert_eq!(p.mean_minutes, 100.0);
        assert_eq!(p.stddev_minutes, 50.0);
        assert!((p.confidence - 80.0).abs() < 1e-9);
        assert_eq!(p.recommendation, RECOMMEND_STEADY);
    }

    #[test]
    fn erratic_groups_are_flagged() {
        let records = vec![dwell("A", "X", 10), dwell("A", "X", 20), dwell("A", "X", 150)];
        let p = &pattern_summary(&records)[0];
        assert!(p.stddev_minutes > p.mean_minutes * 0.5);
        assert_eq!(p.recommendation, RECOMMEND_ERRATIC);
    }

    #[test]
    fn keeps_top_three_by_confidence() {
        let mut records = Vec::new();
        for (station, n) in [("A", 3), ("B", 4), ("C", 5), ("D", 6)] {
            for _ in 0..n {
                records.push(dwell(station, "X", 60));
            }
        }
        let stations: Vec<String> = pattern_summary(&records)
            .into_iter()
            .map(|p| p.station_id)
            .collect();
        assert_eq!(stations, vec!["D", "C", "B"]);
    }

    #[test]
    fn filter_narrows_by_station_type_and_date() {
        let records = vec![dwell("A", "X", 10), dwell("A", "Y", 10), dwell("B", "X", 10)];
        let filter = DetentionFilter {
            station_id: Some("A".into()),
            wagon_type: Some("X".into()),
            ..DetentionFilter::default()
        };
        assert_eq!(filter.apply(&records).len(), 1);
        let later = DetentionFilter {
            from: NaiveDate::from_ymd_opt(2025, 1, 11),
            ..DetentionFilter::default()
        };
        assert!(later.apply(&records).is_empty());
    }
}
