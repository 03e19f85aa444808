use std::io::Read;
use std::path::Path;

use anyhow::{bail, Context};
use chrono::NaiveDate;
use csv::{ReaderBuilder, StringRecord};

use crate::columns::NamePolicy;
use crate::models::Table;

/// Date formats tried in order. Day-first is what the monitoring exports
/// use; ISO is accepted as a fallback.
pub const DATE_FORMATS: &[&str] = &["%d/%m/%Y", "%Y-%m-%d", "%d-%m-%Y"];

pub fn load_table(path: &Path, skip_rows: usize, policy: &NamePolicy) -> anyhow::Result<Table> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    read_table(file, skip_rows, policy)
        .with_context(|| format!("failed to load {}", path.display()))
}

/// Parse raw tabular input into a normalized table: the date-like column is
/// parsed to real dates, every other column is numeric-coerced, and rows
/// with no content at all are dropped. Cells that fail parsing become
/// missing values rather than failing the load.
pub fn read_table(
    input: impl Read,
    skip_rows: usize,
    policy: &NamePolicy,
) -> anyhow::Result<Table> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(input);

    let records: Vec<StringRecord> = reader
        .records()
        .collect::<Result<_, _>>()
        .context("input is not tabular")?;

    let Some((header, data_rows)) = records
        .get(skip_rows..)
        .unwrap_or(&[])
        .split_first()
    else {
        bail!("no header row found after skipping {skip_rows} rows");
    };

    let names: Vec<String> = header.iter().map(|n| n.trim().to_string()).collect();
    let Some(date_idx) = names.iter().position(|n| policy.is_date_name(n)) else {
        bail!(
            "no date column found: no header matches {:?}; statistics cannot be computed",
            policy.date_markers
        );
    };

    let columns: Vec<String> = names
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != date_idx)
        .map(|(_, n)| n.clone())
        .collect();

    let mut dates = Vec::new();
    let mut cells = Vec::new();

    for record in data_rows {
        if record.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }
        dates.push(record.get(date_idx).and_then(parse_date));
        let row: Vec<Option<f64>> = (0..names.len())
            .filter(|i| *i != date_idx)
            .map(|i| record.get(i).and_then(coerce_numeric))
            .collect();
        cells.push(row);
    }

    Ok(Table {
        date_column: names[date_idx].clone(),
        columns,
        dates,
        cells,
    })
}

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(trimmed, format).ok())
}

/// Numeric coercion with decimal-comma normalization: "0,0395" parses as
/// 0.0395; anything unparseable or non-finite becomes missing.
pub fn coerce_numeric(raw: &str) -> Option<f64> {
    let cleaned = raw.trim().replace(',', ".");
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}
