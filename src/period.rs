// Current/previous window resolution for the comparative reports.
use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use crate::error::{ReportError, Result};

/// Inclusive date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeriodWindow {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl PeriodWindow {
    pub fn new(from: NaiveDate, to: NaiveDate) -> Result<Self> {
        if to < from {
            return Err(ReportError::validation(format!(
                "period end {} is before start {}",
                to, from
            )));
        }
        Ok(Self { from, to })
    }

    /// Window of `days` calendar days ending on `to`.
    pub fn ending_on(to: NaiveDate, days: u32) -> Result<Self> {
        if days == 0 {
            return Err(ReportError::validation("window must span at least one day"));
        }
        Self::new(to - Duration::days(days as i64 - 1), to)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.from && date <= self.to
    }

    /// Calendar days spanned, both endpoints included.
    pub fn day_count(&self) -> i64 {
        (self.to - self.from).num_days() + 1
    }

    pub fn days(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.from.iter_days().take_while(move |d| *d <= self.to)
    }
}

impl fmt::Display for PeriodWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} to {}",
            self.from.format("%d-%m-%Y"),
            self.to.format("%d-%m-%Y")
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ComparisonPeriods {
    pub current: PeriodWindow,
    pub previous: PeriodWindow,
}

/// How the previous window is chosen for a report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeriodPolicy {
    /// Same span immediately before `current`.
    RollingWindow { current: PeriodWindow },
    /// Both ranges supplied by the caller; every endpoint is required.
    ExplicitDualRange {
        current_from: Option<NaiveDate>,
        current_to: Option<NaiveDate>,
        previous_from: Option<NaiveDate>,
        previous_to: Option<NaiveDate>,
    },
    /// Jan 1 through `today`, against the same span a year earlier.
    CalendarYearToDate { today: NaiveDate },
}

impl PeriodPolicy {
    pub fn name(&self) -> &'static str {
        match self {
            PeriodPolicy::RollingWindow { .. } => "rolling",
            PeriodPolicy::ExplicitDualRange { .. } => "explicit",
            PeriodPolicy::CalendarYearToDate { .. } => "year-to-date",
        }
    }

    pub fn resolve(&self) -> Result<ComparisonPeriods> {
        let periods = match self {
            PeriodPolicy::RollingWindow { current } => ComparisonPeriods {
                current: *current,
                previous: rolling_previous(current)?,
            },
            PeriodPolicy::ExplicitDualRange {
                current_from,
                current_to,
                previous_from,
                previous_to,
            } => ComparisonPeriods {
                current: PeriodWindow::new(
                    required(*current_from, "current period start")?,
                    required(*current_to, "current period end")?,
                )?,
                previous: PeriodWindow::new(
                    required(*previous_from, "previous period start")?,
                    required(*previous_to, "previous period end")?,
                )?,
            },
            PeriodPolicy::CalendarYearToDate { today } => year_to_date(*today)?,
        };
        debug!(
            policy = self.name(),
            current = %periods.current,
            previous = %periods.previous,
            "resolved comparison periods"
        );
        Ok(periods)
    }
}

fn required(date: Option<NaiveDate>, what: &str) -> Result<NaiveDate> {
    date.ok_or_else(|| ReportError::validation(format!("{} is required", what)))
}

fn rolling_previous(current: &PeriodWindow) -> Result<PeriodWindow> {
    let span = current.to - current.from;
    let previous_to = current.from - Duration::days(1);
    PeriodWindow::new(previous_to - span, previous_to)
}

fn year_to_date(today: NaiveDate) -> Result<ComparisonPeriods> {
    let current_start = NaiveDate::from_ymd_opt(today.year(), 1, 1)
        .ok_or_else(|| ReportError::validation(format!("no January 1st for {}", today)))?;
    let previous_start = NaiveDate::from_ymd_opt(today.year() - 1, 1, 1)
        .ok_or_else(|| ReportError::validation(format!("no prior year for {}", today)))?;
    Ok(ComparisonPeriods {
        current: PeriodWindow::new(current_start, today)?,
        previous: PeriodWindow::new(previous_start, shift_year(today, -1)?)?,
    })
}

fn shift_year(date: NaiveDate, years: i32) -> Result<NaiveDate> {
    let year = date.year() + years;
    // Feb 29 has no counterpart in a common year.
    let day = date.day().min(days_in_month(year, date.month()));
    NaiveDate::from_ymd_opt(year, date.month(), day)
        .ok_or_else(|| ReportError::validation(format!("cannot shift {} by {} years", date, years)))
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|first| first.pred_opt())
        .map(|last| last.day())
        .unwrap_or(28)
}
