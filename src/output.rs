use clap::ValueEnum;
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::Path;
use std::str::FromStr;
use tabled::{builder::Builder, settings::Style, Table, Tabled};
use tracing::info;

use crate::aggregate::{ComparisonRow, ComparisonTable, Metric};
use crate::config::DisplayConfig;
use crate::error::{ReportError, Result};
use crate::presentation::display_key;
use crate::util::{format_number, safe_div};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExportFormat {
    Csv,
    Json,
    Markdown,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
            ExportFormat::Markdown => "md",
        }
    }
}

/// A column the caller may pick for export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportColumn {
    Name,
    Current(Metric),
    Previous(Metric),
    VariationAbsolute,
    VariationPercent,
}

enum Cell {
    Text(String),
    Number { value: f64, decimals: usize },
}

impl ExportColumn {
    /// Name, the per-window Rks/Avg/Wagon/MT/Freight groups, then variation.
    pub fn defaults() -> Vec<ExportColumn> {
        let shown = [
            Metric::Rks,
            Metric::AvgPerDay,
            Metric::Wagons,
            Metric::Tonnage,
            Metric::Freight,
        ];
        let mut columns = vec![ExportColumn::Name];
        columns.extend(shown.iter().map(|m| ExportColumn::Current(*m)));
        columns.extend(shown.iter().map(|m| ExportColumn::Previous(*m)));
        columns.push(ExportColumn::VariationAbsolute);
        columns.push(ExportColumn::VariationPercent);
        columns
    }

    pub fn key(&self) -> String {
        match self {
            ExportColumn::Name => "name".into(),
            ExportColumn::Current(m) => format!("current_{}", m.key()),
            ExportColumn::Previous(m) => format!("previous_{}", m.key()),
            ExportColumn::VariationAbsolute => "variation_units".into(),
            ExportColumn::VariationPercent => "variation_percent".into(),
        }
    }

    pub fn label(&self) -> String {
        match self {
            ExportColumn::Name => "Name".into(),
            ExportColumn::Current(m) => format!("{} (Cur)", m.label()),
            ExportColumn::Previous(m) => format!("{} (Prev)", m.label()),
            ExportColumn::VariationAbsolute => "Variation in Units".into(),
            ExportColumn::VariationPercent => "Variation in %age".into(),
        }
    }

    fn cell(&self, row: &ComparisonRow, display: &DisplayConfig) -> Cell {
        let metric_cell = |m: &Metric, value: f64| match m {
            Metric::Tonnage => Cell::Number {
                value: safe_div(value, display.tonnage_divisor, 0.0),
                decimals: 3,
            },
            Metric::Freight => Cell::Number { value, decimals: 2 },
            Metric::AvgPerDay => Cell::Number { value, decimals: 3 },
            Metric::Units => Cell::Number { value, decimals: 2 },
            Metric::Rks | Metric::Wagons => Cell::Number { value, decimals: 0 },
        };
        match self {
            ExportColumn::Name => Cell::Text(display_key(&row.key).to_string()),
            ExportColumn::Current(m) => metric_cell(m, m.value(&row.current)),
            ExportColumn::Previous(m) => metric_cell(m, m.value(&row.previous)),
            ExportColumn::VariationAbsolute => Cell::Number {
                value: safe_div(row.variation_absolute, display.tonnage_divisor, 0.0),
                decimals: 3,
            },
            ExportColumn::VariationPercent => Cell::Number {
                value: row.variation_percent,
                decimals: 2,
            },
        }
    }
}

impl FromStr for ExportColumn {
    type Err = ReportError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('-', "_");
        if wanted == "name" {
            return Ok(ExportColumn::Name);
        }
        let mut candidates = vec![ExportColumn::VariationAbsolute, ExportColumn::VariationPercent];
        for m in Metric::ALL {
            candidates.push(ExportColumn::Current(m));
            candidates.push(ExportColumn::Previous(m));
        }
        candidates
            .into_iter()
            .find(|c| c.key() == wanted)
            .ok_or_else(|| ReportError::validation(format!("unknown export column `{}`", s)))
    }
}

fn plain(cell: &Cell) -> String {
    match cell {
        Cell::Text(s) => s.clone(),
        Cell::Number { value, decimals } => format!("{:.*}", decimals, value),
    }
}

fn rounded(value: f64, decimals: usize) -> f64 {
    let scale = 10f64.powi(decimals as i32);
    (value * scale).round() / scale
}

/// Serialize the table (TOTAL last) restricted to `columns`.
pub fn export(
    table: &ComparisonTable,
    columns: &[ExportColumn],
    format: ExportFormat,
    display: &DisplayConfig,
) -> Result<Vec<u8>> {
    if columns.is_empty() {
        return Err(ReportError::validation("select at least one column to export"));
    }
    let rows: Vec<Vec<Cell>> = table
        .rows_with_total()
        .map(|r| columns.iter().map(|c| c.cell(r, display)).collect())
        .collect();

    let bytes = match format {
        ExportFormat::Csv => {
            let mut wtr = csv::Writer::from_writer(Vec::new());
            wtr.write_record(columns.iter().map(|c| c.label()))?;
            for row in &rows {
                wtr.write_record(row.iter().map(plain))?;
            }
            wtr.into_inner()
                .map_err(|e| ReportError::Io(e.into_error()))?
        }
        ExportFormat::Json => {
            let objects: Vec<Value> = rows
                .iter()
                .map(|row| {
                    let mut obj = Map::new();
                    for (column, cell) in columns.iter().zip(row) {
                        let value = match cell {
                            Cell::Text(s) => Value::from(s.clone()),
                            Cell::Number { value, decimals } => {
                                Value::from(rounded(*value, *decimals))
                            }
                        };
                        obj.insert(column.key(), value);
                    }
                    Value::Object(obj)
                })
                .collect();
            serde_json::to_vec_pretty(&objects)?
        }
        ExportFormat::Markdown => {
            let mut builder = Builder::default();
            builder.push_record(columns.iter().map(|c| c.label()));
            for row in &rows {
                builder.push_record(row.iter().map(|cell| match cell {
                    Cell::Text(s) => s.clone(),
                    Cell::Number { value, decimals } => format_number(*value, *decimals),
                }));
            }
            builder.build().with(Style::markdown()).to_string().into_bytes()
        }
    };
    Ok(bytes)
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

pub fn write_bytes(path: &Path, bytes: &[u8]) -> Result<()> {
    ensure_parent_dir(path)?;
    std::fs::write(path, bytes)?;
    info!(path = %path.display(), bytes = bytes.len(), "wrote export");
    Ok(())
}

pub fn write_csv<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    ensure_parent_dir(path)?;
    let mut wtr = csv::Writer::from_path(path)?;
    for r in rows {
        wtr.serialize(r)?;
    }
    wtr.flush()?;
    info!(path = %path.display(), rows = rows.len(), "wrote csv");
    Ok(())
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    ensure_parent_dir(path)?;
    let s = serde_json::to_string_pretty(value)?;
    std::fs::write(path, s)?;
    info!(path = %path.display(), "wrote json");
    Ok(())
}

pub fn preview_table_rows<T>(rows: &[T], max_rows: usize)
where
    T: Tabled + Clone,
{
    let slice: Vec<T> = rows.iter().cloned().take(max_rows).collect();
    if slice.is_empty() {
        println!("(no rows)\n");
        return;
    }
    let table_str = Table::new(slice).with(Style::markdown()).to_string();
    println!("{}\n", table_str);
}
