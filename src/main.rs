use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use chrono::NaiveDate;
use clap::{ArgGroup, Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use training_sessions::aggregate::{self, SessionFilter};
use training_sessions::cache::SourceCache;
use training_sessions::ingest::IngestOptions;
use training_sessions::models::{DateRange, EvaluatorFilter, SessionField, SessionRecord};
use training_sessions::report;

#[derive(Parser)]
#[command(name = "training-sessions")]
#[command(about = "Training session summaries for evaluated advisors", long_about = None)]
struct Cli {
    /// Workbook (.xlsx, .xls, .ods) or CSV export holding one row per training session
    #[arg(
        long,
        global = true,
        env = "TRAINING_SESSIONS_FILE",
        default_value = "Entrenamiento_R3.xlsx"
    )]
    source: PathBuf,

    /// Field delimiter of a CSV source
    #[arg(
        long,
        global = true,
        env = "TRAINING_SESSIONS_DELIMITER",
        default_value_t = ','
    )]
    delimiter: char,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ScopeArgs {
    /// Evaluator to keep, or "all"
    #[arg(long, default_value = "all")]
    evaluator: String,
    /// First training date to include (YYYY-MM-DD)
    #[arg(long)]
    from: Option<NaiveDate>,
    /// Last training date to include (YYYY-MM-DD)
    #[arg(long)]
    to: Option<NaiveDate>,
}

#[derive(Subcommand)]
enum Commands {
    /// List distinct advisors or evaluators
    List {
        #[arg(long, value_enum, default_value = "advisor")]
        field: SessionField,
    },
    /// Print summary statistics for one advisor
    Summary {
        #[arg(long)]
        advisor: String,
        #[command(flatten)]
        scope: ScopeArgs,
        /// Emit the statistics as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print every session of one advisor
    Sessions {
        #[arg(long)]
        advisor: String,
        #[command(flatten)]
        scope: ScopeArgs,
    },
    /// Generate a markdown report
    #[command(group(
        ArgGroup::new("advisors")
            .args(["advisor", "all_advisors"])
            .required(true)
    ))]
    Report {
        #[arg(long)]
        advisor: Vec<String>,
        #[arg(long)]
        all_advisors: bool,
        #[command(flatten)]
        scope: ScopeArgs,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "training_sessions=info,warn".into()),
        )
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if !cli.delimiter.is_ascii() {
        bail!("delimiter must be a single ASCII character, got {:?}", cli.delimiter);
    }
    let options = IngestOptions {
        delimiter: cli.delimiter as u8,
    };
    let mut cache = SourceCache::new();

    match cli.command {
        Commands::List { field } => {
            let sessions = load(&mut cache, &cli.source, &options)?;
            let values = aggregate::list_distinct_values(&sessions, field);
            if values.is_empty() {
                println!("No values recorded.");
            }
            for value in values {
                println!("{value}");
            }
        }
        Commands::Summary {
            advisor,
            scope,
            json,
        } => {
            let sessions = load(&mut cache, &cli.source, &options)?;
            let filter = build_filter(&sessions, Some(advisor.clone()), &scope);
            let selected = filter.apply(&sessions);

            match aggregate::summarize(&selected) {
                Ok(stats) if json => {
                    println!("{}", serde_json::to_string_pretty(&stats)?);
                }
                Ok(stats) => {
                    println!("Summary for {advisor}:");
                    print!("{}", report::render_summary(&stats));
                }
                Err(empty) => {
                    tracing::info!(%advisor, "{empty}");
                    println!("No sessions found for the selected filters.");
                }
            }
        }
        Commands::Sessions { advisor, scope } => {
            let sessions = load(&mut cache, &cli.source, &options)?;
            let filter = build_filter(&sessions, Some(advisor.clone()), &scope);
            let selected = filter.apply(&sessions);

            if selected.is_empty() {
                println!("No sessions found for the selected filters.");
                return Ok(());
            }

            println!("Sessions for {advisor}:");
            println!();
            print!("{}", report::render_session_details(&selected));
        }
        Commands::Report {
            advisor,
            all_advisors,
            scope,
            out,
        } => {
            let sessions = load(&mut cache, &cli.source, &options)?;
            let shared = build_filter(&sessions, None, &scope);
            let advisors: Vec<String> = if all_advisors {
                aggregate::list_distinct_values(&sessions, SessionField::Advisor)
                    .into_iter()
                    .collect()
            } else {
                advisor
            };

            let sections: Vec<report::ReportSection> = advisors
                .into_iter()
                .map(|advisor| {
                    let filter = SessionFilter {
                        advisor: Some(advisor.clone()),
                        ..shared.clone()
                    };
                    report::ReportSection {
                        advisor,
                        sessions: filter.apply(&sessions),
                    }
                })
                .collect();

            let report =
                report::build_report(&shared.evaluator, shared.date_range.as_ref(), &sections);
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            tracing::info!(sections = sections.len(), "report generated");
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}

fn load(
    cache: &mut SourceCache,
    source: &Path,
    options: &IngestOptions,
) -> anyhow::Result<Arc<[SessionRecord]>> {
    cache
        .load(source, options)
        .with_context(|| format!("failed to load training sessions from {}", source.display()))
}

fn build_filter(
    sessions: &[SessionRecord],
    advisor: Option<String>,
    scope: &ScopeArgs,
) -> SessionFilter {
    SessionFilter {
        advisor,
        evaluator: EvaluatorFilter::from_selection(&scope.evaluator),
        date_range: resolve_range(sessions, scope.from, scope.to),
    }
}

/// A half-open range is completed with the earliest or latest training date on record.
fn resolve_range(
    sessions: &[SessionRecord],
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> Option<DateRange> {
    if from.is_none() && to.is_none() {
        return None;
    }

    let bounds = aggregate::date_bounds(sessions);
    let start = from
        .or(bounds.map(|range| range.start))
        .unwrap_or(NaiveDate::MIN);
    let end = to.or(bounds.map(|range| range.end)).unwrap_or(NaiveDate::MAX);

    if start > end {
        tracing::warn!(%start, %end, "date range is inverted and matches no sessions");
    }
    Some(DateRange::new(start, end))
}
