// Command-line entry point.
//
// - `import` validates a loading or detention file and prints the row report.
// - `compare` builds a commodity/station comparison, previews it and exports it.
// - `detention` prints the top detention patterns.
use anyhow::{bail, Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing::{info, warn};

use rail_report::aggregate::{Metric, SortDirection, SortKey};
use rail_report::cache::MemoryCache;
use rail_report::config::Config;
use rail_report::detention::{DetentionFilter, DetentionPatternRow};
use rail_report::loader::{self, ImportReport};
use rail_report::output::{self, ExportColumn, ExportFormat};
use rail_report::period::{PeriodPolicy, PeriodWindow};
use rail_report::presentation::{chart_series, table_rows};
use rail_report::reports::{summarize, ComparativeRequest, ReportService};
use rail_report::store::InMemoryStore;
use rail_report::types::Dimension;
use rail_report::util::{format_int, format_signed_percent, parse_date_safe};

#[derive(Parser)]
#[command(name = "rail_report", about = "Railway loading and detention reports")]
struct Cli {
    /// JSON config file (defaults to $RAIL_REPORT_CONFIG or ./rail_report.json).
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[arg(long, global = true)]
    loading: Option<PathBuf>,
    #[arg(long, global = true)]
    detention: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum RecordKind {
    Loading,
    Detention,
}

#[derive(Clone, Copy, ValueEnum)]
enum PolicyArg {
    Rolling,
    Explicit,
    Ytd,
}

#[derive(Subcommand)]
enum Command {
    /// Validate an import file and report rejected rows.
    Import {
        #[arg(value_enum)]
        kind: RecordKind,
        file: PathBuf,
    },
    /// Compare a current period against its previous period.
    Compare {
        #[arg(long, value_enum, default_value = "commodity")]
        by: Dimension,
        #[arg(long, value_enum, default_value = "rolling")]
        policy: PolicyArg,
        #[arg(long, value_parser = parse_date_arg)]
        from: Option<NaiveDate>,
        #[arg(long, value_parser = parse_date_arg)]
        to: Option<NaiveDate>,
        #[arg(long, value_parser = parse_date_arg)]
        prev_from: Option<NaiveDate>,
        #[arg(long, value_parser = parse_date_arg)]
        prev_to: Option<NaiveDate>,
        /// Reference date for defaults and year-to-date (defaults to today).
        #[arg(long, value_parser = parse_date_arg)]
        today: Option<NaiveDate>,
        /// Restrict to a single commodity or station.
        #[arg(long)]
        value: Option<String>,
        /// Column to sort by, e.g. `current_tonnage` or `variation_percent`.
        #[arg(long)]
        sort: Option<SortKey>,
        #[arg(long)]
        desc: bool,
        #[arg(long, value_enum, default_value = "csv")]
        export: ExportFormat,
        /// Comma-separated export column keys.
        #[arg(long, value_delimiter = ',')]
        columns: Vec<ExportColumn>,
        #[arg(long)]
        out: Option<PathBuf>,
        #[arg(long, value_enum, default_value = "tonnage")]
        chart: Metric,
    },
    /// Show the most consistent detention patterns.
    Detention {
        #[arg(long)]
        station: Option<String>,
        #[arg(long)]
        wagon_type: Option<String>,
        #[arg(long, value_parser = parse_date_arg)]
        from: Option<NaiveDate>,
        #[arg(long, value_parser = parse_date_arg)]
        to: Option<NaiveDate>,
    },
}

fn parse_date_arg(s: &str) -> std::result::Result<NaiveDate, String> {
    parse_date_safe(Some(s)).ok_or_else(|| format!("`{}` is not a date (expected YYYY-MM-DD)", s))
}

fn print_import_report(label: &str, report: &ImportReport) {
    println!(
        "{}: {} of {} rows valid",
        label,
        format_int(report.valid_rows),
        format_int(report.total_rows)
    );
    for e in &report.errors {
        println!("  {}", e);
    }
    println!();
}

struct DateArgs {
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    prev_from: Option<NaiveDate>,
    prev_to: Option<NaiveDate>,
}

fn build_policy(
    policy: PolicyArg,
    dates: DateArgs,
    today: NaiveDate,
    default_window_days: u32,
) -> Result<PeriodPolicy> {
    let DateArgs {
        from,
        to,
        prev_from,
        prev_to,
    } = dates;
    Ok(match policy {
        PolicyArg::Rolling => {
            if prev_from.is_some() || prev_to.is_some() {
                bail!("--prev-from/--prev-to only apply to --policy explicit");
            }
            let current = match (from, to) {
                (Some(f), Some(t)) => PeriodWindow::new(f, t)?,
                (None, None) => PeriodWindow::ending_on(today, default_window_days)?,
                _ => bail!("--from and --to must be given together"),
            };
            PeriodPolicy::RollingWindow { current }
        }
        PolicyArg::Explicit => PeriodPolicy::ExplicitDualRange {
            current_from: from,
            current_to: to,
            previous_from: prev_from,
            previous_to: prev_to,
        },
        PolicyArg::Ytd => {
            if [from, to, prev_from, prev_to].iter().any(Option::is_some) {
                bail!("--policy ytd takes only --today");
            }
            PeriodPolicy::CalendarYearToDate { today }
        }
    })
}

fn load_store(config: &Config, need_loading: bool, need_detention: bool) -> Result<InMemoryStore> {
    let mut loading = Vec::new();
    let mut detention = Vec::new();
    if need_loading {
        let (records, report) = loader::import_loading(&config.loading_csv)
            .with_context(|| format!("reading {}", config.loading_csv.display()))?;
        if !report.errors.is_empty() {
            warn!(rejected = report.errors.len(), "some loading rows were skipped");
        }
        loading = records;
    }
    if need_detention {
        let (records, report) = loader::import_detention(&config.detention_csv)
            .with_context(|| format!("reading {}", config.detention_csv.display()))?;
        if !report.errors.is_empty() {
            warn!(rejected = report.errors.len(), "some detention rows were skipped");
        }
        detention = records;
    }
    Ok(InMemoryStore::with_records(loading, detention))
}

fn main() -> Result<()> {
    rail_report::init_tracing();
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::from_path(path)?,
        None => Config::load()?,
    };
    if let Some(path) = cli.loading {
        config.loading_csv = path;
    }
    if let Some(path) = cli.detention {
        config.detention_csv = path;
    }

    match cli.command {
        Command::Import { kind, file } => match kind {
            RecordKind::Loading => {
                let (_, report) = loader::import_loading(&file)?;
                print_import_report("Loading import", &report);
            }
            RecordKind::Detention => {
                let (_, report) = loader::import_detention(&file)?;
                print_import_report("Detention import", &report);
            }
        },
        Command::Compare {
            by,
            policy,
            from,
            to,
            prev_from,
            prev_to,
            today,
            value,
            sort,
            desc,
            export,
            columns,
            out,
            chart,
        } => {
            let today = today.unwrap_or_else(|| Local::now().date_naive());
            let policy = build_policy(
                policy,
                DateArgs {
                    from,
                    to,
                    prev_from,
                    prev_to,
                },
                today,
                config.default_window_days,
            )?;
            // Fail on a bad range before reading any files.
            let periods = policy.resolve()?;

            let store = load_store(&config, true, false)?;
            info!(rows = store.loading_len(), "loading records ready");
            let mut service =
                ReportService::new(store, MemoryCache::new(config.refresh_interval()));

            let mut request = ComparativeRequest::new(by, policy);
            request.value = value;
            request.sort = sort.map(|k| {
                let direction = if desc {
                    SortDirection::Descending
                } else {
                    SortDirection::Ascending
                };
                (k, direction)
            });
            let table = service.comparative(&request)?;
            let display = config.display();

            println!("Comparative Loading by {}", by.label());
            println!(
                "(Current: {}, Previous: {})\n",
                periods.current, periods.previous
            );
            let rows = table_rows(&table, &display);
            output::preview_table_rows(&rows, rows.len());

            let chart_data = chart_series(&table, chart, config.top_n);
            println!("Top {} by {}:", config.top_n, chart.label());
            for (label, (cur, prev)) in chart_data
                .labels
                .iter()
                .zip(chart_data.current.iter().zip(chart_data.previous.iter()))
            {
                println!("  {:<20} {:>16.3} {:>16.3}", label, cur, prev);
            }
            println!();

            let trend = service.daily_trend(&table, chart, config.top_n)?;
            let trend_path = config.output_dir.join("daily_trend.json");
            output::write_json(&trend_path, &trend)?;
            println!(
                "(Daily {} for the top {} over {} days exported to {})\n",
                chart.label(),
                trend.series.len(),
                trend.dates.len(),
                trend_path.display()
            );

            let columns = if columns.is_empty() {
                ExportColumn::defaults()
            } else {
                columns
            };
            let bytes = output::export(&table, &columns, export, &display)?;
            let path = out.unwrap_or_else(|| {
                config.output_dir.join(format!(
                    "comparative_{}.{}",
                    by.label().to_lowercase(),
                    export.extension()
                ))
            });
            output::write_bytes(&path, &bytes)?;
            println!("(Full table exported to {})\n", path.display());

            let summary = summarize(&table);
            let summary_path = config.output_dir.join("summary.json");
            output::write_json(&summary_path, &summary)?;
            println!(
                "Summary: {} groups, total variation {}",
                summary.groups,
                format_signed_percent(summary.variation_percent)
            );
        }
        Command::Detention {
            station,
            wagon_type,
            from,
            to,
        } => {
            let store = load_store(&config, false, true)?;
            info!(rows = store.detention_len(), "detention records ready");
            let service = ReportService::new(store, MemoryCache::new(config.refresh_interval()));
            let filter = DetentionFilter {
                station_id: station,
                wagon_type,
                from,
                to,
            };
            let patterns = service.detention_patterns(&filter)?;
            println!("Detention Patterns");
            println!("(Top 3 by confidence, >=3 records per station and wagon type)\n");
            let rows: Vec<DetentionPatternRow> = patterns.iter().map(Into::into).collect();
            output::preview_table_rows(&rows, rows.len());
            let path = config.output_dir.join("detention_patterns.csv");
            output::write_csv(&path, &rows)?;
            println!("(Patterns exported to {})\n", path.display());
        }
    }
    Ok(())
}
