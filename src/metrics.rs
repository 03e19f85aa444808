use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;

use crate::models::{
    AnalysisExport, CorrelationResult, CriticalEvent, Describe, PointAnalysis, PointStats,
    Strength, Table, VelocitySample, VelocityStats,
};

/// Rainfall observations strictly above this table-wide percentile are
/// flagged as critical events.
pub const HIGH_RAINFALL_PERCENTILE: f64 = 0.9;

/// Per-step velocity over a series sorted ascending by date. Steps with
/// zero or negative elapsed days are discarded, as are non-finite values,
/// so division artifacts never reach the aggregates. Series of length 0
/// or 1 produce an empty sequence.
pub fn velocity_series(series: &[(NaiveDate, f64)]) -> Vec<VelocitySample> {
    let mut samples = Vec::new();
    for window in series.windows(2) {
        let (prev_date, prev_value) = window[0];
        let (date, value) = window[1];
        let days = (date - prev_date).num_days();
        if days <= 0 {
            continue;
        }
        let velocity = (value - prev_value) / days as f64;
        if velocity.is_finite() {
            samples.push(VelocitySample { date, velocity });
        }
    }
    samples
}

/// Aggregate statistics for one point series (sorted ascending by date).
/// Returns `None` when fewer than two valid observations exist; the
/// velocity block is absent when no velocity samples are defined.
pub fn point_statistics(series: &[(NaiveDate, f64)]) -> Option<PointStats> {
    if series.len() < 2 {
        return None;
    }
    let (first_date, first_value) = series[0];
    let (last_date, last_value) = series[series.len() - 1];

    let mut max_displacement = f64::NEG_INFINITY;
    let mut min_displacement = f64::INFINITY;
    for (_, value) in series {
        max_displacement = max_displacement.max(*value);
        min_displacement = min_displacement.min(*value);
    }

    Some(PointStats {
        total_displacement: last_value - first_value,
        max_displacement,
        min_displacement,
        span_days: (last_date - first_date).num_days(),
        observation_count: series.len(),
        velocity: velocity_stats(&velocity_series(series)),
    })
}

// Strict comparisons keep the first occurrence in date order on ties.
fn velocity_stats(samples: &[VelocitySample]) -> Option<VelocityStats> {
    let first = samples.first()?;
    let mut max = first;
    let mut min = first;
    let mut sum = 0.0;
    for sample in samples {
        sum += sample.velocity;
        if sample.velocity > max.velocity {
            max = sample;
        }
        if sample.velocity < min.velocity {
            min = sample;
        }
    }
    Some(VelocityStats {
        mean_velocity: sum / samples.len() as f64,
        max_velocity: max.velocity,
        min_velocity: min.velocity,
        max_velocity_date: max.date,
        min_velocity_date: min.date,
    })
}

/// Pearson's r between a point series and the rainfall series, inner-joined
/// on date (first value per date on either side). `None` when fewer than
/// two aligned pairs exist or either aligned side has zero variance.
pub fn correlation(
    point: &[(NaiveDate, f64)],
    rainfall: &[(NaiveDate, f64)],
) -> Option<f64> {
    let mut rain_by_date: HashMap<NaiveDate, f64> = HashMap::new();
    for (date, value) in rainfall {
        rain_by_date.entry(*date).or_insert(*value);
    }

    let mut pairs = Vec::new();
    let mut seen = HashSet::new();
    for (date, value) in point {
        if !seen.insert(*date) {
            continue;
        }
        if let Some(rain) = rain_by_date.get(date) {
            pairs.push((*value, *rain));
        }
    }
    pearson(&pairs)
}

fn pearson(pairs: &[(f64, f64)]) -> Option<f64> {
    if pairs.len() < 2 {
        return None;
    }
    let n = pairs.len() as f64;
    let mean_x = pairs.iter().map(|(x, _)| x).sum::<f64>() / n;
    let mean_y = pairs.iter().map(|(_, y)| y).sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (x, y) in pairs {
        let dx = x - mean_x;
        let dy = y - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }
    if var_x <= 0.0 || var_y <= 0.0 {
        return None;
    }
    let r = cov / (var_x.sqrt() * var_y.sqrt());
    r.is_finite().then_some(r)
}

pub fn correlation_results(
    table: &Table,
    points: &[String],
    rainfall: &str,
) -> Vec<CorrelationResult> {
    let rain_series = table.series(rainfall);
    points
        .iter()
        .filter_map(|point| {
            let r = correlation(&table.series(point), &rain_series)?;
            Some(CorrelationResult {
                point: point.clone(),
                r,
                strength: Strength::from_r(r),
            })
        })
        .collect()
}

/// Linear-interpolation percentile over the unsorted input, `q` in [0, 1].
pub fn percentile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let rank = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        Some(sorted[lo])
    } else {
        let fraction = rank - lo as f64;
        Some(sorted[lo] + (sorted[hi] - sorted[lo]) * fraction)
    }
}

/// Per point, the first-occurring row of its maximum value; for rainfall,
/// every row strictly above the table-wide 90th percentile. The percentile
/// is taken over all non-missing rainfall observations, not per point.
pub fn critical_events(
    table: &Table,
    points: &[String],
    rainfall: Option<&str>,
) -> Vec<CriticalEvent> {
    let mut events = Vec::new();

    for point in points {
        let series = table.series(point);
        let mut max: Option<(NaiveDate, f64)> = None;
        for (date, value) in series {
            match max {
                Some((_, best)) if value <= best => {}
                _ => max = Some((date, value)),
            }
        }
        if let Some((date, value)) = max {
            events.push(CriticalEvent::MaxDisplacement {
                point: point.clone(),
                date,
                value,
            });
        }
    }

    if let Some(rain) = rainfall {
        let values = table.column_values(rain);
        if let Some(threshold) = percentile(&values, HIGH_RAINFALL_PERCENTILE) {
            for (date, value) in table.series(rain) {
                if value > threshold {
                    events.push(CriticalEvent::HighRainfall { date, value });
                }
            }
        }
    }

    events
}

/// Descriptive statistics over non-missing values; sample standard
/// deviation, quartiles by linear interpolation. `None` for an empty column.
pub fn describe(values: &[f64]) -> Option<Describe> {
    if values.is_empty() {
        return None;
    }
    let count = values.len();
    let n = count as f64;
    let mean = values.iter().sum::<f64>() / n;
    let std = (count > 1).then(|| {
        (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0)).sqrt()
    });

    Some(Describe {
        count,
        mean,
        std,
        min: values.iter().copied().fold(f64::INFINITY, f64::min),
        q1: percentile(values, 0.25)?,
        median: percentile(values, 0.5)?,
        q3: percentile(values, 0.75)?,
        max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
    })
}

/// Run the full derivation over one normalized table: per-point statistics
/// and velocity series, critical events, correlations and descriptive
/// statistics. Pure with respect to its inputs; a point with insufficient
/// data is reported with absent statistics while other points compute.
pub fn analyze(table: &Table, points: &[String], rainfall: Option<&str>) -> AnalysisExport {
    let point_analyses: Vec<PointAnalysis> = points
        .iter()
        .map(|point| {
            let series = table.series(point);
            PointAnalysis {
                point: point.clone(),
                stats: point_statistics(&series),
                velocity_series: velocity_series(&series),
                describe: describe(&table.column_values(point)),
            }
        })
        .collect();

    let correlations = match rainfall {
        Some(rain) => correlation_results(table, points, rain),
        None => Vec::new(),
    };

    let (first_date, last_date) = match table.date_range() {
        Some((first, last)) => (Some(first), Some(last)),
        None => (None, None),
    };

    AnalysisExport {
        date_column: table.date_column.clone(),
        rainfall_column: rainfall.map(|r| r.to_string()),
        points: points.to_vec(),
        row_count: table.row_count(),
        first_date,
        last_date,
        point_analyses,
        critical_events: critical_events(table, points, rainfall),
        correlations,
        rainfall_describe: rainfall.and_then(|rain| describe(&table.column_values(rain))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    fn sample_series() -> Vec<(NaiveDate, f64)> {
        vec![
            (date(2015, 4, 28), 0.0),
            (date(2015, 11, 30), 0.0395),
            (date(2015, 12, 24), -0.0882),
        ]
    }

    fn sample_table() -> Table {
        Table {
            date_column: "FECHA".to_string(),
            columns: vec!["53763".to_string(), "rainfall (mm)".to_string()],
            dates: vec![
                Some(date(2015, 4, 28)),
                Some(date(2015, 11, 30)),
                Some(date(2015, 12, 24)),
            ],
            cells: vec![
                vec![Some(0.0), Some(0.0)],
                vec![Some(0.0395), Some(18.73)],
                vec![Some(-0.0882), Some(28.95)],
            ],
        }
    }

    #[test]
    fn short_series_yield_no_velocity_and_no_stats() {
        assert!(velocity_series(&[]).is_empty());
        let single = vec![(date(2015, 4, 28), 1.5)];
        assert!(velocity_series(&single).is_empty());
        assert!(point_statistics(&single).is_none());
        assert!(point_statistics(&[]).is_none());
    }

    #[test]
    fn velocity_arithmetic_matches_worked_example() {
        let samples = velocity_series(&sample_series());
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].date, date(2015, 11, 30));
        assert!((samples[0].velocity - 0.0395 / 216.0).abs() < 1e-12);
        assert_eq!(samples[1].date, date(2015, 12, 24));
        assert!((samples[1].velocity - (-0.0882 - 0.0395) / 24.0).abs() < 1e-12);
    }

    #[test]
    fn duplicate_dates_are_excluded_from_velocity() {
        let series = vec![
            (date(2015, 4, 28), 0.0),
            (date(2015, 4, 28), 5.0),
            (date(2015, 5, 28), 3.0),
        ];
        let samples = velocity_series(&series);
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].date, date(2015, 5, 28));
        assert!(samples.iter().all(|s| s.velocity.is_finite()));
    }

    #[test]
    fn total_displacement_is_last_minus_first() {
        let series = vec![
            (date(2015, 1, 1), 0.0),
            (date(2015, 2, 1), 5.0),
            (date(2015, 3, 1), -3.0),
        ];
        let stats = point_statistics(&series).unwrap();
        assert!((stats.total_displacement - (-3.0)).abs() < 1e-12);
        assert_eq!(stats.max_displacement, 5.0);
        assert_eq!(stats.min_displacement, -3.0);
        assert_eq!(stats.span_days, 59);
        assert_eq!(stats.observation_count, 3);
    }

    #[test]
    fn max_velocity_tie_resolves_to_first_occurrence() {
        // 1.0/day over both steps; the first step's end date must win.
        let series = vec![
            (date(2015, 1, 1), 0.0),
            (date(2015, 1, 11), 10.0),
            (date(2015, 1, 21), 20.0),
        ];
        let stats = point_statistics(&series).unwrap();
        let velocity = stats.velocity.unwrap();
        assert_eq!(velocity.max_velocity_date, date(2015, 1, 11));
        assert_eq!(velocity.min_velocity_date, date(2015, 1, 11));
    }

    #[test]
    fn velocity_block_absent_when_all_steps_are_degenerate() {
        let series = vec![(date(2015, 1, 1), 0.0), (date(2015, 1, 1), 5.0)];
        let stats = point_statistics(&series).unwrap();
        assert!(stats.velocity.is_none());
    }

    #[test]
    fn linear_rainfall_relation_correlates_strongly() {
        let rain = vec![
            (date(2015, 1, 1), 1.0),
            (date(2015, 2, 1), 2.0),
            (date(2015, 3, 1), 3.0),
            (date(2015, 4, 1), 4.0),
        ];
        let point: Vec<(NaiveDate, f64)> =
            rain.iter().map(|(d, v)| (*d, 2.0 * v)).collect();
        let r = correlation(&point, &rain).unwrap();
        assert!((r - 1.0).abs() < 1e-9);
        assert_eq!(Strength::from_r(r), Strength::Strong);
    }

    #[test]
    fn correlation_undefined_for_zero_variance_or_few_pairs() {
        let flat = vec![(date(2015, 1, 1), 2.0), (date(2015, 2, 1), 2.0)];
        let rain = vec![(date(2015, 1, 1), 1.0), (date(2015, 2, 1), 5.0)];
        assert!(correlation(&flat, &rain).is_none());

        let disjoint = vec![(date(2016, 1, 1), 1.0), (date(2016, 2, 1), 2.0)];
        assert!(correlation(&disjoint, &rain).is_none());
    }

    #[test]
    fn correlation_aligns_on_shared_dates_only() {
        let point = vec![
            (date(2015, 1, 1), 1.0),
            (date(2015, 2, 1), 2.0),
            (date(2015, 6, 1), 99.0),
            (date(2015, 3, 1), 3.0),
        ];
        let rain = vec![
            (date(2015, 1, 1), 10.0),
            (date(2015, 2, 1), 20.0),
            (date(2015, 3, 1), 30.0),
        ];
        let r = correlation(&point, &rain).unwrap();
        assert!((r - 1.0).abs() < 1e-9);
    }

    #[test]
    fn strength_buckets_follow_thresholds() {
        assert_eq!(Strength::from_r(-0.9), Strength::Strong);
        assert_eq!(Strength::from_r(0.5), Strength::Moderate);
        assert_eq!(Strength::from_r(0.3), Strength::Weak);
        assert_eq!(Strength::from_r(0.0), Strength::Weak);
    }

    #[test]
    fn percentile_interpolates_linearly() {
        let values = vec![1.0, 2.0, 3.0, 4.0];
        assert_eq!(percentile(&values, 0.5), Some(2.5));
        assert_eq!(percentile(&values, 0.25), Some(1.75));
        assert_eq!(percentile(&values, 0.0), Some(1.0));
        assert_eq!(percentile(&values, 1.0), Some(4.0));
        assert_eq!(percentile(&[], 0.5), None);
    }

    #[test]
    fn constant_rainfall_produces_no_high_rainfall_events() {
        let mut table = sample_table();
        for row in &mut table.cells {
            row[1] = Some(12.0);
        }
        let events = critical_events(&table, &[], Some("rainfall (mm)"));
        assert!(events.is_empty());
    }

    #[test]
    fn critical_events_cover_max_displacement_and_high_rainfall() {
        let table = sample_table();
        let points = vec!["53763".to_string()];
        let events = critical_events(&table, &points, Some("rainfall (mm)"));

        assert!(matches!(
            &events[0],
            CriticalEvent::MaxDisplacement { point, date: d, value }
                if point == "53763" && *d == date(2015, 11, 30) && (*value - 0.0395).abs() < 1e-12
        ));
        // p90 of [0.0, 18.73, 28.95] = 26.906; only 28.95 exceeds it.
        let rainfall: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, CriticalEvent::HighRainfall { .. }))
            .collect();
        assert_eq!(rainfall.len(), 1);
        assert!(matches!(
            rainfall[0],
            CriticalEvent::HighRainfall { date: d, value } if *d == date(2015, 12, 24) && (*value - 28.95).abs() < 1e-12
        ));
    }

    #[test]
    fn describe_reports_quartiles_and_sample_std() {
        let values = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let d = describe(&values).unwrap();
        assert_eq!(d.count, 5);
        assert_eq!(d.mean, 3.0);
        assert!((d.std.unwrap() - (2.5f64).sqrt()).abs() < 1e-12);
        assert_eq!(d.min, 1.0);
        assert_eq!(d.q1, 2.0);
        assert_eq!(d.median, 3.0);
        assert_eq!(d.q3, 4.0);
        assert_eq!(d.max, 5.0);

        let single = describe(&[7.0]).unwrap();
        assert!(single.std.is_none());
        assert!(describe(&[]).is_none());
    }

    #[test]
    fn insufficient_data_is_isolated_per_point() {
        let mut table = sample_table();
        table.columns.push("60000".to_string());
        for (i, row) in table.cells.iter_mut().enumerate() {
            row.push((i == 0).then_some(1.0));
        }
        let points = vec!["53763".to_string(), "60000".to_string()];
        let export = analyze(&table, &points, Some("rainfall (mm)"));

        assert_eq!(export.point_analyses.len(), 2);
        assert!(export.point_analyses[0].stats.is_some());
        assert!(export.point_analyses[1].stats.is_none());
        assert!(export.point_analyses[1].velocity_series.is_empty());
    }

    #[test]
    fn analysis_is_idempotent() {
        let table = sample_table();
        let points = vec!["53763".to_string()];
        let first = analyze(&table, &points, Some("rainfall (mm)"));
        let second = analyze(&table, &points, Some("rainfall (mm)"));
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }
}
