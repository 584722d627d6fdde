// Bulk import of loading and detention files.
//
// Rows are validated one at a time; a failing row is reported and skipped
// while every other row still loads.
use csv::ReaderBuilder;
use serde::Serialize;
use std::io::Read;
use std::path::Path;
use tracing::{info, warn};

use crate::error::Result;
use crate::types::{DetentionRecord, LoadingRecord, RawDetentionRow, RawLoadingRow};
use crate::util::{non_blank, parse_date_safe, parse_datetime_safe, parse_f64_safe, parse_i64_safe};

/// Outcome of an import: counts plus one message per rejected row.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImportReport {
    pub total_rows: usize,
    pub valid_rows: usize,
    pub errors: Vec<String>,
}

impl ImportReport {
    fn reject(&mut self, line: usize, message: impl AsRef<str>) {
        self.errors.push(format!("Row {}: {}", line, message.as_ref()));
    }
}

pub fn import_loading(path: &Path) -> Result<(Vec<LoadingRecord>, ImportReport)> {
    let file = std::fs::File::open(path)?;
    let (records, report) = import_loading_from(file)?;
    info!(
        path = %path.display(),
        total = report.total_rows,
        valid = report.valid_rows,
        rejected = report.errors.len(),
        "imported loading records"
    );
    Ok((records, report))
}

pub fn import_loading_from<R: Read>(input: R) -> Result<(Vec<LoadingRecord>, ImportReport)> {
    let mut rdr = ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_reader(input);
    let mut report = ImportReport::default();
    let mut records = Vec::new();

    for (idx, result) in rdr.deserialize::<RawLoadingRow>().enumerate() {
        // Header is line 1.
        let line = idx + 2;
        report.total_rows += 1;
        let row = match result {
            Ok(r) => r,
            Err(e) => {
                report.reject(line, e.to_string());
                continue;
            }
        };

        let date = match parse_date_safe(row.date.as_deref()) {
            Some(d) => d,
            None => {
                report.reject(
                    line,
                    format!("missing or invalid date `{}`", row.date.unwrap_or_default()),
                );
                continue;
            }
        };

        records.push(LoadingRecord {
            id: 0,
            date,
            station: non_blank(row.station),
            commodity: non_blank(row.commodity),
            wagons: numeric(line, "wagons", row.wagons.as_deref(), parse_i64_safe),
            units: numeric(line, "units", row.units.as_deref(), parse_f64_safe),
            tonnage: numeric(line, "tonnage", row.tonnage.as_deref(), parse_f64_safe),
            freight: numeric(line, "freight", row.freight.as_deref(), parse_f64_safe),
        });
        report.valid_rows += 1;
    }
    Ok((records, report))
}

// Optional numeric cells default to zero; an unreadable value is logged
// rather than failing the row.
fn numeric<T: Default>(
    line: usize,
    column: &str,
    raw: Option<&str>,
    parse: fn(Option<&str>) -> Option<T>,
) -> T {
    match parse(raw) {
        Some(v) => v,
        None => {
            if raw.map_or(false, |s| !s.trim().is_empty()) {
                warn!(line, column, value = raw.unwrap_or_default(), "unreadable number, using 0");
            }
            T::default()
        }
    }
}

pub fn import_detention(path: &Path) -> Result<(Vec<DetentionRecord>, ImportReport)> {
    let file = std::fs::File::open(path)?;
    let (records, report) = import_detention_from(file)?;
    info!(
        path = %path.display(),
        total = report.total_rows,
        valid = report.valid_rows,
        rejected = report.errors.len(),
        "imported detention records"
    );
    Ok((records, report))
}

pub fn import_detention_from<R: Read>(input: R) -> Result<(Vec<DetentionRecord>, ImportReport)> {
    let mut rdr = ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_reader(input);
    let mut report = ImportReport::default();
    let mut records = Vec::new();

    for (idx, result) in rdr.deserialize::<RawDetentionRow>().enumerate() {
        let line = idx + 2;
        report.total_rows += 1;
        let row = match result {
            Ok(r) => r,
            Err(e) => {
                report.reject(line, e.to_string());
                continue;
            }
        };

        let station_id = match non_blank(row.station_id) {
            Some(s) => s,
            None => {
                report.reject(line, "missing station");
                continue;
            }
        };
        let mut stamps = Vec::with_capacity(4);
        for (name, raw) in [
            ("arrival", &row.arrival_time),
            ("placement", &row.placement_time),
            ("release", &row.release_time),
            ("departure", &row.departure_time),
        ] {
            match parse_datetime_safe(raw.as_deref()) {
                Some(t) => stamps.push(t),
                None => {
                    report.reject(line, format!("missing or invalid {} time", name));
                    break;
                }
            }
        }
        if stamps.len() != 4 {
            continue;
        }

        let record = DetentionRecord {
            id: 0,
            station_id,
            rake_id: non_blank(row.rake_id).unwrap_or_default(),
            wagon_type: non_blank(row.wagon_type).unwrap_or_else(|| "Unspecified".into()),
            arrival_time: stamps[0],
            placement_time: stamps[1],
            release_time: stamps[2],
            departure_time: stamps[3],
        };
        if let Err(e) = record.validate() {
            report.reject(line, e.to_string());
            continue;
        }
        records.push(record);
        report.valid_rows += 1;
    }
    Ok((records, report))
}
