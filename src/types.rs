use chrono::{NaiveDate, NaiveDateTime};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// One row of a loading import file, exactly as read. Every column is
/// optional so a single bad cell does not fail the whole row.
#[derive(Debug, Deserialize)]
pub struct RawLoadingRow {
    #[serde(rename = "Date", alias = "date")]
    pub date: Option<String>,
    #[serde(rename = "Station", alias = "station")]
    pub station: Option<String>,
    #[serde(rename = "Commodity", alias = "commodity")]
    pub commodity: Option<String>,
    #[serde(rename = "Wagons", alias = "wagons")]
    pub wagons: Option<String>,
    #[serde(rename = "Units", alias = "units")]
    pub units: Option<String>,
    #[serde(rename = "Tonnage", alias = "tonnage")]
    pub tonnage: Option<String>,
    #[serde(rename = "Freight", alias = "freight")]
    pub freight: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RawDetentionRow {
    #[serde(rename = "StationId", alias = "station_id")]
    pub station_id: Option<String>,
    #[serde(rename = "RakeId", alias = "rake_id")]
    pub rake_id: Option<String>,
    #[serde(rename = "WagonType", alias = "wagon_type")]
    pub wagon_type: Option<String>,
    #[serde(rename = "ArrivalTime", alias = "arrival_time")]
    pub arrival_time: Option<String>,
    #[serde(rename = "PlacementTime", alias = "placement_time")]
    pub placement_time: Option<String>,
    #[serde(rename = "ReleaseTime", alias = "release_time")]
    pub release_time: Option<String>,
    #[serde(rename = "DepartureTime", alias = "departure_time")]
    pub departure_time: Option<String>,
}

/// A single wagon-loading event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadingRecord {
    #[serde(default)]
    pub id: u64,
    pub date: NaiveDate,
    pub station: Option<String>,
    pub commodity: Option<String>,
    #[serde(default)]
    pub wagons: i64,
    #[serde(default)]
    pub units: f64,
    #[serde(default)]
    pub tonnage: f64,
    #[serde(default)]
    pub freight: f64,
}

impl LoadingRecord {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            id: 0,
            date,
            station: None,
            commodity: None,
            wagons: 0,
            units: 0.0,
            tonnage: 0.0,
            freight: 0.0,
        }
    }

    /// Value of the grouping column, with blanks folded into the empty key.
    pub fn dimension_value(&self, dimension: Dimension) -> &str {
        let value = match dimension {
            Dimension::Commodity => self.commodity.as_deref(),
            Dimension::Station => self.station.as_deref(),
        };
        value.map(str::trim).unwrap_or("")
    }
}

/// One rake's dwell at a station.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetentionRecord {
    #[serde(default)]
    pub id: u64,
    pub station_id: String,
    pub rake_id: String,
    pub wagon_type: String,
    pub arrival_time: NaiveDateTime,
    pub placement_time: NaiveDateTime,
    pub release_time: NaiveDateTime,
    pub departure_time: NaiveDateTime,
}

/// Grouping key for the comparative reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Dimension {
    Commodity,
    Station,
}

impl Dimension {
    pub fn label(&self) -> &'static str {
        match self {
            Dimension::Commodity => "Commodity",
            Dimension::Station => "Station",
        }
    }
}
