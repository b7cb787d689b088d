//! Schema of the loaded-network export and the typed reader for it.
//!
//! The export is a wide table: one row per link, with the periodic values
//! spread across suffixed columns (`cspdEA`, `volAM_tot`, `vcMD`, ...) and
//! one volume column per time period and vehicle class (`volEA_da`, ...).
//! Column positions are resolved once from the CSV header into an explicit
//! column map; a missing column is a fatal configuration error.

use anyhow::{Context, Result, anyhow};
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use tracing::info;

/// Time periods of the five-period assignment, in model order.
pub const PERIODS: [&str; 5] = ["EA", "AM", "MD", "PM", "EV"];

/// Vehicle classes as they appear in the export's volume column suffixes.
pub const VEHICLE_CLASSES: [&str; 13] = [
    "da", "s2", "s3", "sm", "hv", "dat", "s2t", "s3t", "smt", "hvt", "daav", "s2av", "s3av",
];

/// Emission rates are published per coarse vehicle group, not per class.
/// Every class maps to exactly one group; an unmapped class means the class
/// list and this table have drifted apart, which callers treat as fatal.
pub fn vclass_group(vclass: &str) -> Option<&'static str> {
    match vclass {
        "da" | "dat" | "daav" | "s2" | "s2t" | "s2av" | "s3" | "s3t" | "s3av" => Some("auto"),
        "sm" | "smt" => Some("SM"),
        "hv" | "hvt" => Some("HV"),
        _ => None,
    }
}

/// Per-period scalar values carried by a link.
#[derive(Debug, Clone, Copy, Default)]
pub struct PeriodValues {
    /// Congested speed, mph.
    pub cspd: f64,
    /// Total volume across all vehicle classes.
    pub vol_tot: f64,
    /// Volume-to-capacity ratio.
    pub vc: f64,
    /// Congested travel time, minutes.
    pub ctim: f64,
}

/// One link row from the export, fully typed. Immutable once read.
#[derive(Debug, Clone)]
pub struct LinkRecord {
    pub a: i64,
    pub b: i64,
    /// Link length, miles.
    pub distance: f64,
    pub lanes: i64,
    /// Area type code.
    pub at: i64,
    /// Facility type code.
    pub ft: i64,
    /// Freeflow travel time, minutes.
    pub fft: f64,
    /// Indexed by [`PERIODS`] order.
    pub period_values: [PeriodValues; 5],
    /// Volume per (period, class), indexed by [`PERIODS`] x [`VEHICLE_CLASSES`].
    pub class_volumes: [[f64; 13]; 5],
}

/// Column positions resolved from the export header, built once per read.
struct ColumnMap {
    a: usize,
    b: usize,
    distance: usize,
    lanes: usize,
    at: usize,
    ft: usize,
    fft: usize,
    cspd: [usize; 5],
    vol_tot: [usize; 5],
    vc: [usize; 5],
    ctim: [usize; 5],
    class_vol: [[usize; 13]; 5],
}

impl ColumnMap {
    fn from_headers(headers: &csv::StringRecord) -> Result<Self> {
        let index: HashMap<&str, usize> = headers
            .iter()
            .enumerate()
            .map(|(i, name)| (name, i))
            .collect();

        let col = |name: &str| -> Result<usize> {
            index
                .get(name)
                .copied()
                .ok_or_else(|| anyhow!("link table is missing column '{name}'"))
        };

        let mut cspd = [0usize; 5];
        let mut vol_tot = [0usize; 5];
        let mut vc = [0usize; 5];
        let mut ctim = [0usize; 5];
        let mut class_vol = [[0usize; 13]; 5];
        for (p, period) in PERIODS.iter().enumerate() {
            cspd[p] = col(&format!("cspd{period}"))?;
            vol_tot[p] = col(&format!("vol{period}_tot"))?;
            vc[p] = col(&format!("vc{period}"))?;
            ctim[p] = col(&format!("ctim{period}"))?;
            for (c, vclass) in VEHICLE_CLASSES.iter().enumerate() {
                class_vol[p][c] = col(&format!("vol{period}_{vclass}"))?;
            }
        }

        Ok(ColumnMap {
            a: col("a")?,
            b: col("b")?,
            distance: col("distance")?,
            lanes: col("lanes")?,
            at: col("at")?,
            ft: col("ft")?,
            fft: col("fft")?,
            cspd,
            vol_tot,
            vc,
            ctim,
            class_vol,
        })
    }
}

fn float_field(record: &csv::StringRecord, col: usize, line: u64) -> Result<f64> {
    let raw = record
        .get(col)
        .ok_or_else(|| anyhow!("link table row at line {line} is short (no column {col})"))?;
    raw.trim()
        .parse::<f64>()
        .with_context(|| format!("bad numeric value '{raw}' in link table at line {line}"))
}

fn int_field(record: &csv::StringRecord, col: usize, line: u64) -> Result<i64> {
    // Integer-coded columns sometimes come through as "2.0"; truncate.
    Ok(float_field(record, col, line)? as i64)
}

/// Reads the full link export from `path`.
pub fn read_links(path: &Path) -> Result<Vec<LinkRecord>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("cannot open link table {}", path.display()))?;
    let links = read_links_from(file)
        .with_context(|| format!("reading link table {}", path.display()))?;
    info!(links = links.len(), path = %path.display(), "Read link table");
    Ok(links)
}

/// Reads link records from any CSV source. The header row is required.
pub fn read_links_from<R: Read>(source: R) -> Result<Vec<LinkRecord>> {
    let mut reader = csv::Reader::from_reader(source);
    let columns = ColumnMap::from_headers(reader.headers().context("reading link table header")?)?;

    let mut links = Vec::new();
    for row in reader.records() {
        let record = row.context("reading link table row")?;
        let line = record.position().map(|p| p.line()).unwrap_or(0);

        let mut period_values = [PeriodValues::default(); 5];
        let mut class_volumes = [[0f64; 13]; 5];
        for p in 0..PERIODS.len() {
            period_values[p] = PeriodValues {
                cspd: float_field(&record, columns.cspd[p], line)?,
                vol_tot: float_field(&record, columns.vol_tot[p], line)?,
                vc: float_field(&record, columns.vc[p], line)?,
                ctim: float_field(&record, columns.ctim[p], line)?,
            };
            for c in 0..VEHICLE_CLASSES.len() {
                class_volumes[p][c] = float_field(&record, columns.class_vol[p][c], line)?;
            }
        }

        links.push(LinkRecord {
            a: int_field(&record, columns.a, line)?,
            b: int_field(&record, columns.b, line)?,
            distance: float_field(&record, columns.distance, line)?,
            lanes: int_field(&record, columns.lanes, line)?,
            at: int_field(&record, columns.at, line)?,
            ft: int_field(&record, columns.ft, line)?,
            fft: float_field(&record, columns.fft, line)?,
            period_values,
            class_volumes,
        });
    }

    Ok(links)
}
