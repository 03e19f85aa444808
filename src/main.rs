use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};

mod columns;
mod ingest;
mod metrics;
mod models;
mod report;

use columns::{ColumnRoles, NamePolicy};
use models::{AnalysisExport, Table};

#[derive(Parser)]
#[command(name = "displacement-analysis")]
#[command(about = "Ground displacement and rainfall analysis for monitoring points", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show detected columns, row count and date range
    Inspect {
        #[arg(long)]
        csv: PathBuf,
        #[arg(long, default_value_t = 0)]
        skip_rows: usize,
    },
    /// Print per-point statistics and rainfall correlations
    Stats {
        #[arg(long)]
        csv: PathBuf,
        #[arg(long, default_value_t = 0)]
        skip_rows: usize,
        #[arg(long, value_delimiter = ',')]
        points: Vec<String>,
        #[arg(long)]
        rainfall_col: Option<String>,
    },
    /// Write a markdown analysis report
    Report {
        #[arg(long)]
        csv: PathBuf,
        #[arg(long, default_value_t = 0)]
        skip_rows: usize,
        #[arg(long, value_delimiter = ',')]
        points: Vec<String>,
        #[arg(long)]
        rainfall_col: Option<String>,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// Write the full derived result set as JSON for chart rendering
    Export {
        #[arg(long)]
        csv: PathBuf,
        #[arg(long, default_value_t = 0)]
        skip_rows: usize,
        #[arg(long, value_delimiter = ',')]
        points: Vec<String>,
        #[arg(long)]
        rainfall_col: Option<String>,
        #[arg(long, default_value = "analysis.json")]
        out: PathBuf,
    },
}

fn load_and_classify(csv: &Path, skip_rows: usize) -> anyhow::Result<(Table, ColumnRoles)> {
    let policy = NamePolicy::default();
    let table = ingest::load_table(csv, skip_rows, &policy)?;
    let roles = columns::classify(&table, &policy);
    Ok((table, roles))
}

fn run_analysis(
    csv: &Path,
    skip_rows: usize,
    points: &[String],
    rainfall_col: Option<&str>,
) -> anyhow::Result<AnalysisExport> {
    let (table, roles) = load_and_classify(csv, skip_rows)?;
    let selected = columns::select_points(&roles, points)?;
    let rainfall = columns::choose_rainfall(&roles, rainfall_col)?;
    Ok(metrics::analyze(&table, &selected, rainfall.as_deref()))
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Inspect { csv, skip_rows } => {
            let (table, roles) = load_and_classify(&csv, skip_rows)?;
            println!("Date column: {}", roles.date_column);
            println!(
                "Displacement points ({}): {}",
                roles.points.len(),
                if roles.points.is_empty() {
                    "none".to_string()
                } else {
                    roles.points.join(", ")
                }
            );
            println!(
                "Rainfall candidates: {}",
                if roles.rainfall_candidates.is_empty() {
                    "none".to_string()
                } else {
                    roles.rainfall_candidates.join(", ")
                }
            );
            if !roles.ignored.is_empty() {
                println!("Ignored columns: {}", roles.ignored.join(", "));
            }
            match table.date_range() {
                Some((first, last)) => println!(
                    "Rows: {} covering {} to {}",
                    table.row_count(),
                    first,
                    last
                ),
                None => println!("Rows: {} (no parseable dates)", table.row_count()),
            }
        }
        Commands::Stats {
            csv,
            skip_rows,
            points,
            rainfall_col,
        } => {
            let export = run_analysis(&csv, skip_rows, &points, rainfall_col.as_deref())?;

            println!("Per-point statistics:");
            for analysis in &export.point_analyses {
                match &analysis.stats {
                    Some(stats) => match &stats.velocity {
                        Some(velocity) => println!(
                            "- {}: total {:.3} mm over {} days, mean velocity {:.4} mm/day, max {:.4} on {}",
                            analysis.point,
                            stats.total_displacement,
                            stats.span_days,
                            velocity.mean_velocity,
                            velocity.max_velocity,
                            velocity.max_velocity_date
                        ),
                        None => println!(
                            "- {}: total {:.3} mm over {} days, no defined velocity samples",
                            analysis.point, stats.total_displacement, stats.span_days
                        ),
                    },
                    None => println!("- {}: insufficient data", analysis.point),
                }
            }

            if export.correlations.is_empty() {
                println!("No defined rainfall correlations.");
            } else {
                println!("Correlation with rainfall:");
                for correlation in &export.correlations {
                    println!(
                        "- {}: r = {:.3} ({})",
                        correlation.point,
                        correlation.r,
                        correlation.strength.label()
                    );
                }
            }
        }
        Commands::Report {
            csv,
            skip_rows,
            points,
            rainfall_col,
            out,
        } => {
            let export = run_analysis(&csv, skip_rows, &points, rainfall_col.as_deref())?;
            let report = report::build_report(&export);
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
        Commands::Export {
            csv,
            skip_rows,
            points,
            rainfall_col,
            out,
        } => {
            let export = run_analysis(&csv, skip_rows, &points, rainfall_col.as_deref())?;
            let json = serde_json::to_string_pretty(&export)?;
            std::fs::write(&out, json)?;
            println!(
                "Exported {} points and {} critical events to {}.",
                export.points.len(),
                export.critical_events.len(),
                out.display()
            );
        }
    }

    Ok(())
}
