//! Loading and filtering of the three rate-lookup tables.
//!
//! Every table is filtered to the rows matching the requested scenario
//! filter keyword and year. An empty result is a [`LookupMiss`], which the
//! binary maps to its own exit status so callers can distinguish "wrong
//! filter/year" from real failures.

use crate::pipeline::buckets::VcRatioKey;
use anyhow::{Context, Result, anyhow, ensure};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use tracing::info;

/// Directory the rate tables are read from, relative to the run directory.
pub const LOOKUP_DIR: &str = "INPUT/metrics";

pub const DELAY_LOOKUP_FILE: &str = "nonRecurringDelayLookup.csv";
pub const COLLISION_LOOKUP_FILE: &str = "collisionLookup.csv";
pub const EMISSIONS_LOOKUP_FILE: &str = "emissionsLookup.csv";

/// A lookup table had zero rows for the requested filter and year.
#[derive(Debug)]
pub struct LookupMiss {
    pub table: String,
    pub filter: String,
    pub year: i32,
}

impl fmt::Display for LookupMiss {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "no {} lookup rows found for filter '{}' and year {}",
            self.table, self.filter, self.year
        )
    }
}

impl std::error::Error for LookupMiss {}

/// Non-recurring delay rates in hours per vehicle-mile, keyed by the
/// two-decimal vc-ratio string and the lane bucket (2, 3 or 4).
#[derive(Debug)]
pub struct DelayLookup {
    rates: HashMap<(VcRatioKey, i64), f64>,
}

impl DelayLookup {
    pub fn rate(&self, vc_ratio: &VcRatioKey, lane_bucket: i64) -> Option<f64> {
        self.rates.get(&(vc_ratio.clone(), lane_bucket)).copied()
    }

    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }
}

/// The delay table is wide over lane counts; serde handles the fixed names.
#[derive(Debug, Deserialize)]
struct DelayRow {
    filter: String,
    year: i32,
    vcratio: f64,
    #[serde(rename = "2lanes")]
    lanes2: f64,
    #[serde(rename = "3lanes")]
    lanes3: f64,
    #[serde(rename = "4lanes")]
    lanes4: f64,
}

/// Collision rates per 1,000,000 VMT, keyed by (facility bucket, area
/// bucket). Collision-type names are kept in the table's column order.
#[derive(Debug)]
pub struct CollisionLookup {
    pub collision_types: Vec<String>,
    rates: HashMap<(i64, i64), Vec<f64>>,
}

impl CollisionLookup {
    /// Rates aligned with `collision_types`, or `None` for bucket pairs the
    /// table does not cover (notably the excluded-link sentinel).
    pub fn rates(&self, collision_ft: i64, collision_at: i64) -> Option<&[f64]> {
        self.rates
            .get(&(collision_ft, collision_at))
            .map(|v| v.as_slice())
    }
}

/// Emission rates in grams per mile, keyed by (period, vehicle-class group,
/// capped integer speed). Pollutant names kept in the table's column order.
#[derive(Debug)]
pub struct EmissionsLookup {
    pub emission_types: Vec<String>,
    rates: HashMap<(String, String, i64), Vec<f64>>,
}

impl EmissionsLookup {
    pub fn rates(&self, timeperiod: &str, vclass_group: &str, speed: i64) -> Option<&[f64]> {
        self.rates
            .get(&(timeperiod.to_string(), vclass_group.to_string(), speed))
            .map(|v| v.as_slice())
    }
}

/// Loads the delay table, filters it, and pivots the per-lane-count columns
/// into (vcratio key, lanes) -> rate entries.
pub fn load_delay_lookup(dir: &Path, filter: &str, year: i32) -> Result<DelayLookup> {
    let path = dir.join(DELAY_LOOKUP_FILE);
    let mut reader = csv::Reader::from_path(&path)
        .with_context(|| format!("cannot open delay lookup {}", path.display()))?;

    let mut rates = HashMap::new();
    for row in reader.deserialize() {
        let row: DelayRow = row.context("reading delay lookup row")?;
        if row.filter != filter || row.year != year {
            continue;
        }
        // same formatter as the link-side key
        let key = VcRatioKey::from_ratio(row.vcratio);
        for (lanes, rate) in [(2, row.lanes2), (3, row.lanes3), (4, row.lanes4)] {
            ensure!(
                rates.insert((key.clone(), lanes), rate).is_none(),
                "duplicate delay lookup row for vcratio {key} with filter '{filter}' and year {year}"
            );
        }
    }

    if rates.is_empty() {
        return Err(LookupMiss {
            table: "nonRecurringDelay".to_string(),
            filter: filter.to_string(),
            year,
        }
        .into());
    }
    info!(entries = rates.len(), filter, year, "Loaded non-recurring delay lookup");
    Ok(DelayLookup { rates })
}

/// Loads and filters the collision table. Rate columns are discovered from
/// the header: everything except the key and filter columns.
pub fn load_collision_lookup(dir: &Path, filter: &str, year: i32) -> Result<CollisionLookup> {
    let path = dir.join(COLLISION_LOOKUP_FILE);
    let (collision_types, rates) =
        read_rate_table(&path, &["ft", "at"], filter, year).with_context(|| {
            format!("reading collision lookup {}", path.display())
        })?;

    if rates.is_empty() {
        return Err(LookupMiss {
            table: "collision".to_string(),
            filter: filter.to_string(),
            year,
        }
        .into());
    }

    let rates = rates
        .into_iter()
        .map(|(key, values)| {
            let ft = parse_int_key(&key[0], "ft")?;
            let at = parse_int_key(&key[1], "at")?;
            Ok(((ft, at), values))
        })
        .collect::<Result<HashMap<_, _>>>()?;

    info!(buckets = rates.len(), filter, year, "Loaded collision lookup");
    Ok(CollisionLookup {
        collision_types,
        rates,
    })
}

/// Loads and filters the emission table, keyed by (period, group, speed).
pub fn load_emissions_lookup(dir: &Path, filter: &str, year: i32) -> Result<EmissionsLookup> {
    let path = dir.join(EMISSIONS_LOOKUP_FILE);
    let (emission_types, rates) =
        read_rate_table(&path, &["period", "vclassgroup", "speed"], filter, year)
            .with_context(|| format!("reading emissions lookup {}", path.display()))?;

    if rates.is_empty() {
        return Err(LookupMiss {
            table: "emissions".to_string(),
            filter: filter.to_string(),
            year,
        }
        .into());
    }

    let rates = rates
        .into_iter()
        .map(|(mut key, values)| {
            let speed = parse_int_key(&key[2], "speed")?;
            let group = std::mem::take(&mut key[1]);
            let period = std::mem::take(&mut key[0]);
            Ok(((period, group, speed), values))
        })
        .collect::<Result<HashMap<_, _>>>()?;

    info!(entries = rates.len(), filter, year, "Loaded emissions lookup");
    Ok(EmissionsLookup {
        emission_types,
        rates,
    })
}

fn parse_int_key(raw: &str, column: &str) -> Result<i64> {
    raw.trim()
        .parse::<f64>()
        .map(|v| v as i64)
        .map_err(|_| anyhow!("bad integer value '{raw}' in lookup column '{column}'"))
}

/// Shared long-form rate-table reader: filters rows on (filter, year),
/// splits the named key columns from the rate columns, and returns the rate
/// column names in schema order alongside the filtered rows.
#[allow(clippy::type_complexity)]
fn read_rate_table(
    path: &Path,
    key_columns: &[&str],
    filter: &str,
    year: i32,
) -> Result<(Vec<String>, Vec<(Vec<String>, Vec<f64>)>)> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("cannot open lookup {}", path.display()))?;
    let headers = reader.headers().context("reading lookup header")?.clone();

    let position = |name: &str| -> Result<usize> {
        headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| anyhow!("lookup table is missing column '{name}'"))
    };

    let filter_col = position("filter")?;
    let year_col = position("year")?;
    let key_cols = key_columns
        .iter()
        .map(|name| position(name))
        .collect::<Result<Vec<_>>>()?;

    // Rate columns are whatever is left, in header order.
    let rate_cols: Vec<usize> = (0..headers.len())
        .filter(|i| *i != filter_col && *i != year_col && !key_cols.contains(i))
        .collect();
    let rate_names: Vec<String> = rate_cols.iter().map(|&i| headers[i].to_string()).collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.context("reading lookup row")?;
        if record.get(filter_col) != Some(filter) {
            continue;
        }
        let row_year = record
            .get(year_col)
            .and_then(|raw| raw.trim().parse::<i32>().ok());
        if row_year != Some(year) {
            continue;
        }

        let key: Vec<String> = key_cols
            .iter()
            .map(|&i| record.get(i).unwrap_or("").to_string())
            .collect();
        let values = rate_cols
            .iter()
            .map(|&i| {
                let raw = record.get(i).unwrap_or("");
                raw.trim()
                    .parse::<f64>()
                    .with_context(|| format!("bad rate value '{raw}' in {}", path.display()))
            })
            .collect::<Result<Vec<f64>>>()?;
        rows.push((key, values));
    }

    Ok((rate_names, rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn fixture_dir(name: &str, files: &[(&str, &str)]) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("hwynet_lookup_{name}"));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        for (file, content) in files {
            fs::write(dir.join(file), content).unwrap();
        }
        dir
    }

    const DELAY_CSV: &str = "\
filter,year,vcratio,2lanes,3lanes,4lanes
calib,2035,0.75,0.01,0.02,0.03
calib,2035,1.00,0.04,0.05,0.06
calib,2050,0.75,0.10,0.20,0.30
forecast,2035,0.75,0.50,0.60,0.70
";

    #[test]
    fn test_delay_lookup_filters_and_pivots() {
        let dir = fixture_dir("delay", &[(DELAY_LOOKUP_FILE, DELAY_CSV)]);
        let lookup = load_delay_lookup(&dir, "calib", 2035).unwrap();

        // 2 vcratio rows x 3 lane buckets
        assert_eq!(lookup.len(), 6);
        let key = VcRatioKey::from_ratio(0.75);
        assert_eq!(lookup.rate(&key, 3), Some(0.02));
        assert_eq!(lookup.rate(&key, 4), Some(0.03));
        let capped = VcRatioKey::from_ratio(1.0);
        assert_eq!(lookup.rate(&capped, 2), Some(0.04));
        // the 2050 and forecast rows are filtered out
        assert_eq!(lookup.rate(&key, 2), Some(0.01));
    }

    #[test]
    fn test_delay_lookup_rejects_duplicate_rows() {
        // two rows formatting to the same 0.75 key under the same filter/year
        let csv = "\
filter,year,vcratio,2lanes,3lanes,4lanes
calib,2035,0.75,0.01,0.02,0.03
calib,2035,0.75,0.07,0.08,0.09
";
        let dir = fixture_dir("delay_dup", &[(DELAY_LOOKUP_FILE, csv)]);
        let err = load_delay_lookup(&dir, "calib", 2035).unwrap_err();
        assert!(err.to_string().contains("duplicate"), "{err}");
        assert!(err.to_string().contains("0.75"), "{err}");
    }

    #[test]
    fn test_delay_lookup_miss_is_typed() {
        let dir = fixture_dir("delay_miss", &[(DELAY_LOOKUP_FILE, DELAY_CSV)]);
        let err = load_delay_lookup(&dir, "calib", 1999).unwrap_err();
        let miss = err.downcast_ref::<LookupMiss>().expect("LookupMiss");
        assert_eq!(miss.table, "nonRecurringDelay");
        assert_eq!(miss.year, 1999);
        assert!(err.to_string().contains("calib"));
    }

    const COLLISION_CSV: &str = "\
filter,year,ft,at,Motor Vehicle Fatality,Motor Vehicle Injury
calib,2035,2,4,5.0,50.0
calib,2035,3,4,8.0,80.0
forecast,2035,2,4,1.0,10.0
";

    #[test]
    fn test_collision_lookup_keeps_column_order() {
        let dir = fixture_dir("collision", &[(COLLISION_LOOKUP_FILE, COLLISION_CSV)]);
        let lookup = load_collision_lookup(&dir, "calib", 2035).unwrap();

        assert_eq!(
            lookup.collision_types,
            vec!["Motor Vehicle Fatality", "Motor Vehicle Injury"]
        );
        assert_eq!(lookup.rates(2, 4), Some(&[5.0, 50.0][..]));
        assert_eq!(lookup.rates(-1, 4), None);
    }

    const EMISSIONS_CSV: &str = "\
filter,year,period,vclassgroup,speed,CO2,PM10
calib,2035,EA,auto,30,400.0,0.5
calib,2035,EA,HV,30,1200.0,2.5
forecast,2035,EA,auto,30,1.0,1.0
";

    #[test]
    fn test_emissions_lookup_key_and_order() {
        let dir = fixture_dir("emissions", &[(EMISSIONS_LOOKUP_FILE, EMISSIONS_CSV)]);
        let lookup = load_emissions_lookup(&dir, "calib", 2035).unwrap();

        assert_eq!(lookup.emission_types, vec!["CO2", "PM10"]);
        assert_eq!(lookup.rates("EA", "auto", 30), Some(&[400.0, 0.5][..]));
        assert_eq!(lookup.rates("EA", "HV", 30), Some(&[1200.0, 2.5][..]));
        assert_eq!(lookup.rates("AM", "auto", 30), None);
    }

    #[test]
    fn test_emissions_lookup_miss() {
        let dir = fixture_dir("emissions_miss", &[(EMISSIONS_LOOKUP_FILE, EMISSIONS_CSV)]);
        let err = load_emissions_lookup(&dir, "unknown", 2035).unwrap_err();
        assert!(err.downcast_ref::<LookupMiss>().is_some());
    }
}
