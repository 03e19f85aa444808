use anyhow::bail;

use crate::models::Table;

/// Points preselected when present in the data, matching the monitoring
/// campaign this tool was built around.
pub const PREFERRED_POINTS: &[&str] = &["53763", "53834", "53948", "54092"];

/// How many points to fall back to when none of the preferred ones exist.
pub const DEFAULT_POINT_COUNT: usize = 4;

/// Name-matching policy for assigning semantic roles to columns. All
/// matching is case-insensitive substring matching on the trimmed name,
/// so the candidates live here as data rather than scattered conditionals.
#[derive(Debug, Clone)]
pub struct NamePolicy {
    pub date_markers: Vec<String>,
    pub rainfall_markers: Vec<String>,
    pub excluded_markers: Vec<String>,
}

impl Default for NamePolicy {
    fn default() -> Self {
        NamePolicy {
            date_markers: vec!["fecha".to_string()],
            rainfall_markers: vec!["rainfall".to_string(), "precipit".to_string()],
            excluded_markers: vec!["puntos".to_string(), "unnamed".to_string()],
        }
    }
}

impl NamePolicy {
    fn matches(markers: &[String], name: &str) -> bool {
        let lowered = name.trim().to_lowercase();
        markers.iter().any(|marker| lowered.contains(marker))
    }

    pub fn is_date_name(&self, name: &str) -> bool {
        Self::matches(&self.date_markers, name)
    }

    pub fn is_rainfall_name(&self, name: &str) -> bool {
        Self::matches(&self.rainfall_markers, name)
    }

    pub fn is_excluded_name(&self, name: &str) -> bool {
        let trimmed = name.trim();
        trimmed.is_empty() || Self::matches(&self.excluded_markers, name)
    }

    /// Displacement points carry pure numeric station codes as names.
    pub fn is_point_name(&self, name: &str) -> bool {
        let trimmed = name.trim();
        !trimmed.is_empty()
            && trimmed.chars().all(|c| c.is_ascii_digit())
            && !self.is_rainfall_name(name)
            && !self.is_excluded_name(name)
    }
}

/// Partition of a table's columns by semantic role, in column order.
#[derive(Debug, Clone)]
pub struct ColumnRoles {
    pub date_column: String,
    pub points: Vec<String>,
    pub rainfall_candidates: Vec<String>,
    pub ignored: Vec<String>,
}

pub fn classify(table: &Table, policy: &NamePolicy) -> ColumnRoles {
    let mut points = Vec::new();
    let mut rainfall_candidates = Vec::new();
    let mut ignored = Vec::new();

    for name in &table.columns {
        if policy.is_rainfall_name(name) {
            rainfall_candidates.push(name.clone());
        } else if policy.is_point_name(name) {
            points.push(name.clone());
        } else {
            ignored.push(name.clone());
        }
    }

    ColumnRoles {
        date_column: table.date_column.clone(),
        points,
        rainfall_candidates,
        ignored,
    }
}

/// The first rainfall candidate in column order wins unless the caller names
/// another candidate; naming a column that is not a candidate is an error.
pub fn choose_rainfall(
    roles: &ColumnRoles,
    requested: Option<&str>,
) -> anyhow::Result<Option<String>> {
    match requested {
        Some(name) => {
            if roles.rainfall_candidates.iter().any(|c| c == name) {
                Ok(Some(name.to_string()))
            } else {
                bail!(
                    "'{name}' is not a rainfall column; candidates: {}",
                    if roles.rainfall_candidates.is_empty() {
                        "none".to_string()
                    } else {
                        roles.rainfall_candidates.join(", ")
                    }
                );
            }
        }
        None => Ok(roles.rainfall_candidates.first().cloned()),
    }
}

/// Explicit default-selection rule: the preferred subset filtered to detected
/// points, else the first `DEFAULT_POINT_COUNT` detected points.
pub fn default_points(detected: &[String]) -> Vec<String> {
    let preferred: Vec<String> = PREFERRED_POINTS
        .iter()
        .filter(|p| detected.iter().any(|d| d == *p))
        .map(|p| p.to_string())
        .collect();

    if preferred.is_empty() {
        detected.iter().take(DEFAULT_POINT_COUNT).cloned().collect()
    } else {
        preferred
    }
}

pub fn select_points(
    roles: &ColumnRoles,
    requested: &[String],
) -> anyhow::Result<Vec<String>> {
    if requested.is_empty() {
        return Ok(default_points(&roles.points));
    }
    for name in requested {
        if !roles.points.iter().any(|p| p == name) {
            bail!(
                "'{name}' is not a detected displacement point; detected: {}",
                if roles.points.is_empty() {
                    "none".to_string()
                } else {
                    roles.points.join(", ")
                }
            );
        }
    }
    Ok(requested.to_vec())
}
