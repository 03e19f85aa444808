use chrono::NaiveDate;
use serde::Serialize;

/// A normalized table: parsed dates per row plus numeric cells for every
/// other column, in the original column order. Cells that failed coercion
/// are `None`; entirely empty input rows are dropped at load time.
#[derive(Debug, Clone)]
pub struct Table {
    pub date_column: String,
    pub columns: Vec<String>,
    pub dates: Vec<Option<NaiveDate>>,
    pub cells: Vec<Vec<Option<f64>>>,
}

impl Table {
    pub fn row_count(&self) -> usize {
        self.dates.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// The null-filtered series for one column: rows where both the date and
    /// the value are present, sorted ascending by date.
    pub fn series(&self, name: &str) -> Vec<(NaiveDate, f64)> {
        let Some(idx) = self.column_index(name) else {
            return Vec::new();
        };
        let mut series: Vec<(NaiveDate, f64)> = self
            .dates
            .iter()
            .zip(self.cells.iter())
            .filter_map(|(date, row)| {
                let date = (*date)?;
                let value = row.get(idx).copied().flatten()?;
                Some((date, value))
            })
            .collect();
        series.sort_by_key(|(date, _)| *date);
        series
    }

    /// All non-missing values of one column, in row order.
    pub fn column_values(&self, name: &str) -> Vec<f64> {
        let Some(idx) = self.column_index(name) else {
            return Vec::new();
        };
        self.cells
            .iter()
            .filter_map(|row| row.get(idx).copied().flatten())
            .collect()
    }

    /// Earliest and latest parsed date in the table.
    pub fn date_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        let mut dates = self.dates.iter().flatten();
        let first = *dates.next()?;
        let (min, max) = dates.fold((first, first), |(min, max), d| (min.min(*d), max.max(*d)));
        Some((min, max))
    }
}

/// One finite-difference velocity sample: displacement delta divided by
/// elapsed whole days since the previous valid observation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VelocitySample {
    pub date: NaiveDate,
    pub velocity: f64,
}

/// Velocity aggregates for one point. Absent from `PointStats` when the
/// series produced no defined velocity samples.
#[derive(Debug, Clone, Serialize)]
pub struct VelocityStats {
    pub mean_velocity: f64,
    pub max_velocity: f64,
    pub min_velocity: f64,
    pub max_velocity_date: NaiveDate,
    pub min_velocity_date: NaiveDate,
}

#[derive(Debug, Clone, Serialize)]
pub struct PointStats {
    pub total_displacement: f64,
    pub max_displacement: f64,
    pub min_displacement: f64,
    pub span_days: i64,
    pub observation_count: usize,
    pub velocity: Option<VelocityStats>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CriticalEvent {
    MaxDisplacement {
        point: String,
        date: NaiveDate,
        value: f64,
    },
    HighRainfall {
        date: NaiveDate,
        value: f64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Strength {
    Strong,
    Moderate,
    Weak,
}

impl Strength {
    pub fn from_r(r: f64) -> Strength {
        if r.abs() > 0.7 {
            Strength::Strong
        } else if r.abs() > 0.3 {
            Strength::Moderate
        } else {
            Strength::Weak
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Strength::Strong => "strong",
            Strength::Moderate => "moderate",
            Strength::Weak => "weak",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CorrelationResult {
    pub point: String,
    pub r: f64,
    pub strength: Strength,
}

/// Descriptive statistics for one column over its non-missing values.
/// `std` is the sample standard deviation and is absent for a single value.
#[derive(Debug, Clone, Serialize)]
pub struct Describe {
    pub count: usize,
    pub mean: f64,
    pub std: Option<f64>,
    pub min: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub max: f64,
}

/// Everything derived for one selected point. `stats` is absent when the
/// point has fewer than two valid observations.
#[derive(Debug, Clone, Serialize)]
pub struct PointAnalysis {
    pub point: String,
    pub stats: Option<PointStats>,
    pub velocity_series: Vec<VelocitySample>,
    pub describe: Option<Describe>,
}

/// The complete derived result set handed to the presentation adapter.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisExport {
    pub date_column: String,
    pub rainfall_column: Option<String>,
    pub points: Vec<String>,
    pub row_count: usize,
    pub first_date: Option<NaiveDate>,
    pub last_date: Option<NaiveDate>,
    pub point_analyses: Vec<PointAnalysis>,
    pub critical_events: Vec<CriticalEvent>,
    pub correlations: Vec<CorrelationResult>,
    pub rainfall_describe: Option<Describe>,
}
