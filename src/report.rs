use std::fmt::Write;

use chrono::NaiveDate;

use crate::models::{AnalysisExport, CriticalEvent};

/// High-rainfall events shown in the report; the JSON export carries them all.
const REPORT_RAINFALL_EVENT_LIMIT: usize = 5;

fn fmt_date(date: NaiveDate) -> String {
    date.format("%d/%m/%Y").to_string()
}

pub fn build_report(export: &AnalysisExport) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Displacement & Rainfall Analysis");
    let _ = writeln!(output);
    let _ = writeln!(output, "Date column: {}", export.date_column);
    let _ = writeln!(
        output,
        "Rainfall column: {}",
        export.rainfall_column.as_deref().unwrap_or("none detected")
    );
    let _ = writeln!(output, "Points analyzed: {}", export.points.join(", "));
    match (export.first_date, export.last_date) {
        (Some(first), Some(last)) => {
            let _ = writeln!(
                output,
                "Rows: {} covering {} to {}",
                export.row_count,
                fmt_date(first),
                fmt_date(last)
            );
        }
        _ => {
            let _ = writeln!(output, "Rows: {} (no parseable dates)", export.row_count);
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Displacement Velocities");

    for analysis in &export.point_analyses {
        match &analysis.stats {
            Some(stats) => {
                match &stats.velocity {
                    Some(velocity) => {
                        let _ = writeln!(
                            output,
                            "- {}: mean {:.4} mm/day, max {:.4}, min {:.4}, total {:.3} mm over {} days ({} observations)",
                            analysis.point,
                            velocity.mean_velocity,
                            velocity.max_velocity,
                            velocity.min_velocity,
                            stats.total_displacement,
                            stats.span_days,
                            stats.observation_count
                        );
                    }
                    None => {
                        let _ = writeln!(
                            output,
                            "- {}: total {:.3} mm over {} days; no defined velocity samples",
                            analysis.point, stats.total_displacement, stats.span_days
                        );
                    }
                }
            }
            None => {
                let _ = writeln!(
                    output,
                    "- {}: insufficient data (fewer than 2 valid observations)",
                    analysis.point
                );
            }
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Dates of Peak Velocity");

    let mut any_peak = false;
    for analysis in &export.point_analyses {
        if let Some(velocity) = analysis.stats.as_ref().and_then(|s| s.velocity.as_ref()) {
            let _ = writeln!(
                output,
                "- {}: {} at {:.4} mm/day",
                analysis.point,
                fmt_date(velocity.max_velocity_date),
                velocity.max_velocity
            );
            any_peak = true;
        }
    }
    if !any_peak {
        let _ = writeln!(output, "No velocity samples available.");
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Critical Events");
    let _ = writeln!(output);
    let _ = writeln!(output, "### Maximum Displacements");

    let max_events: Vec<&CriticalEvent> = export
        .critical_events
        .iter()
        .filter(|e| matches!(e, CriticalEvent::MaxDisplacement { .. }))
        .collect();
    if max_events.is_empty() {
        let _ = writeln!(output, "No events recorded.");
    } else {
        for event in max_events {
            if let CriticalEvent::MaxDisplacement { point, date, value } = event {
                let _ = writeln!(output, "- {}: {:.3} mm on {}", point, value, fmt_date(*date));
            }
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "### High Rainfall (above 90th percentile)");

    let rain_events: Vec<&CriticalEvent> = export
        .critical_events
        .iter()
        .filter(|e| matches!(e, CriticalEvent::HighRainfall { .. }))
        .collect();
    if rain_events.is_empty() {
        let _ = writeln!(output, "No events recorded.");
    } else {
        for event in rain_events.iter().take(REPORT_RAINFALL_EVENT_LIMIT) {
            if let CriticalEvent::HighRainfall { date, value } = event {
                let _ = writeln!(output, "- {:.1} mm on {}", value, fmt_date(*date));
            }
        }
        if rain_events.len() > REPORT_RAINFALL_EVENT_LIMIT {
            let _ = writeln!(
                output,
                "... and {} more in the JSON export",
                rain_events.len() - REPORT_RAINFALL_EVENT_LIMIT
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Correlation with Rainfall");

    if export.correlations.is_empty() {
        let _ = writeln!(output, "No defined correlations for this selection.");
    } else {
        for correlation in &export.correlations {
            let _ = writeln!(
                output,
                "- {}: r = {:.3} ({})",
                correlation.point,
                correlation.r,
                correlation.strength.label()
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Descriptive Statistics");

    for analysis in &export.point_analyses {
        match &analysis.describe {
            Some(d) => {
                let _ = writeln!(
                    output,
                    "- {}: n={} mean={:.4} min={:.3} q1={:.3} median={:.3} q3={:.3} max={:.3}",
                    analysis.point, d.count, d.mean, d.min, d.q1, d.median, d.q3, d.max
                );
            }
            None => {
                let _ = writeln!(output, "- {}: no data", analysis.point);
            }
        }
    }
    if let (Some(rain), Some(d)) = (&export.rainfall_column, &export.rainfall_describe) {
        let _ = writeln!(
            output,
            "- {}: n={} mean={:.4} min={:.3} q1={:.3} median={:.3} q3={:.3} max={:.3}",
            rain, d.count, d.mean, d.min, d.q1, d.median, d.q3, d.max
        );
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics;
    use crate::models::Table;

    fn sample_export() -> AnalysisExport {
        let table = Table {
            date_column: "FECHA".to_string(),
            columns: vec!["53763".to_string(), "rainfall (mm)".to_string()],
            dates: vec![
                NaiveDate::from_ymd_opt(2015, 4, 28),
                NaiveDate::from_ymd_opt(2015, 11, 30),
                NaiveDate::from_ymd_opt(2015, 12, 24),
            ],
            cells: vec![
                vec![Some(0.0), Some(0.0)],
                vec![Some(0.0395), Some(18.73)],
                vec![Some(-0.0882), Some(28.95)],
            ],
        };
        metrics::analyze(&table, &["53763".to_string()], Some("rainfall (mm)"))
    }

    #[test]
    fn report_contains_every_section() {
        let report = build_report(&sample_export());
        assert!(report.contains("## Displacement Velocities"));
        assert!(report.contains("## Dates of Peak Velocity"));
        assert!(report.contains("### Maximum Displacements"));
        assert!(report.contains("### High Rainfall"));
        assert!(report.contains("## Correlation with Rainfall"));
        assert!(report.contains("## Descriptive Statistics"));
        assert!(report.contains("- 53763:"));
        assert!(report.contains("28/04/2015"));
    }

    #[test]
    fn insufficient_data_is_reported_not_dropped() {
        let table = Table {
            date_column: "FECHA".to_string(),
            columns: vec!["101".to_string()],
            dates: vec![NaiveDate::from_ymd_opt(2015, 4, 28)],
            cells: vec![vec![Some(1.0)]],
        };
        let export = metrics::analyze(&table, &["101".to_string()], None);
        let report = build_report(&export);
        assert!(report.contains("101: insufficient data"));
        assert!(report.contains("Rainfall column: none detected"));
    }
}
