//! CSV persistence for the aggregated metrics table.

use anyhow::{Context, Result, ensure};
use tracing::debug;

use crate::pipeline::aggregate::MetricsRow;
use csv::WriterBuilder;
use std::path::Path;

/// Default output location, relative to the run directory.
pub const OUTPUT_FILE: &str = "metrics/vmt_vht_metrics.csv";

/// Presentation headers for the fixed leading columns.
const LEADING_COLUMNS: [&str; 6] = [
    "timeperiod",
    "vehicle class",
    "VMT",
    "VHT",
    "Hypothetical Freeflow Time",
    "Non-Recurring Freeway Delay",
];

/// Writes the metrics table: the fixed leading columns, then one column per
/// collision type and per pollutant, in lookup schema order. Creates the
/// output directory if needed.
pub fn write_metrics(
    path: &Path,
    rows: &[MetricsRow],
    collision_types: &[String],
    emission_types: &[String],
) -> Result<()> {
    for row in rows {
        ensure!(
            row.collisions.len() == collision_types.len()
                && row.emissions.len() == emission_types.len(),
            "metrics row {}/{} carries {} collision and {} emission values, \
             expected {} and {}",
            row.timeperiod,
            row.vclass,
            row.collisions.len(),
            row.emissions.len(),
            collision_types.len(),
            emission_types.len()
        );
    }

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating output directory {}", parent.display()))?;
        }
    }
    debug!(path = %path.display(), rows = rows.len(), "Writing metrics CSV");

    let mut writer = WriterBuilder::new()
        .from_path(path)
        .with_context(|| format!("cannot create output file {}", path.display()))?;

    let mut header: Vec<&str> = LEADING_COLUMNS.to_vec();
    header.extend(collision_types.iter().map(String::as_str));
    header.extend(emission_types.iter().map(String::as_str));
    writer.write_record(&header)?;

    for row in rows {
        let mut record: Vec<String> = vec![
            row.timeperiod.to_string(),
            row.vclass.to_string(),
            row.vmt.to_string(),
            row.vht.to_string(),
            row.hypfft.to_string(),
            row.nrcdelay.to_string(),
        ];
        record.extend(row.collisions.iter().map(f64::to_string));
        record.extend(row.emissions.iter().map(f64::to_string));
        writer.write_record(&record)?;
    }

    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn sample_row() -> MetricsRow {
        MetricsRow {
            timeperiod: "AM",
            vclass: "da",
            vmt: 200.0,
            vht: 100.5,
            hypfft: 50.0,
            nrcdelay: 4.0,
            collisions: vec![0.001],
            emissions: vec![0.08, 0.0001],
        }
    }

    #[test]
    fn test_write_metrics_header_and_row() {
        let path = std::env::temp_dir().join("hwynet_output_test.csv");
        let _ = fs::remove_file(&path);

        write_metrics(
            &path,
            &[sample_row()],
            &["Fatality".to_string()],
            &["CO2".to_string(), "PM10".to_string()],
        )
        .unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let mut lines = content.lines();
        assert_eq!(
            lines.next().unwrap(),
            "timeperiod,vehicle class,VMT,VHT,Hypothetical Freeflow Time,\
             Non-Recurring Freeway Delay,Fatality,CO2,PM10"
        );
        let row = lines.next().unwrap();
        assert!(row.starts_with("AM,da,200,100.5,50,4,"), "{row}");

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_write_metrics_creates_directory() {
        let dir = std::env::temp_dir().join("hwynet_output_dir_test");
        let _ = fs::remove_dir_all(&dir);
        let path = dir.join("metrics").join("out.csv");

        write_metrics(
            &path,
            &[sample_row()],
            &["Fatality".to_string()],
            &["CO2".to_string(), "PM10".to_string()],
        )
        .unwrap();
        assert!(path.exists());

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_write_metrics_rejects_mismatched_rows() {
        let path = std::env::temp_dir().join("hwynet_output_mismatch_test.csv");
        let _ = fs::remove_file(&path);

        // sample_row carries 1 collision and 2 emission values; empty type
        // lists must fail before anything is written
        let err = write_metrics(&path, &[sample_row()], &[], &[]).unwrap_err();
        assert!(err.to_string().contains("expected 0 and 0"), "{err}");
        assert!(!path.exists());
    }
}
