//! Aggregation of per-row metrics to (timeperiod, vehicle class) totals.

use crate::pipeline::metrics::LinkClassMetrics;
use std::collections::BTreeMap;
use tracing::info;

/// One output row: summed metrics for a (timeperiod, vehicle class) group.
/// Collision and pollutant totals are already rescaled to absolute units.
#[derive(Debug, Clone)]
pub struct MetricsRow {
    pub timeperiod: &'static str,
    pub vclass: &'static str,
    pub vmt: f64,
    pub vht: f64,
    pub hypfft: f64,
    pub nrcdelay: f64,
    pub collisions: Vec<f64>,
    pub emissions: Vec<f64>,
}

/// Sums all metrics by (timeperiod, vclass), then rescales the collision
/// and pollutant sums from per-1,000,000-VMT rates to absolute totals.
/// Rows come out in lexicographic (timeperiod, vclass) order.
pub fn aggregate(rows: Vec<LinkClassMetrics>) -> Vec<MetricsRow> {
    let mut groups: BTreeMap<(&'static str, &'static str), MetricsRow> = BTreeMap::new();

    for row in rows {
        let entry = groups
            .entry((row.timeperiod, row.vclass))
            .or_insert_with(|| MetricsRow {
                timeperiod: row.timeperiod,
                vclass: row.vclass,
                vmt: 0.0,
                vht: 0.0,
                hypfft: 0.0,
                nrcdelay: 0.0,
                collisions: vec![0.0; row.collisions.len()],
                emissions: vec![0.0; row.emissions.len()],
            });
        entry.vmt += row.vmt;
        entry.vht += row.vht;
        entry.hypfft += row.hypfft;
        entry.nrcdelay += row.nrcdelay;
        for (total, value) in entry.collisions.iter_mut().zip(&row.collisions) {
            *total += value;
        }
        for (total, value) in entry.emissions.iter_mut().zip(&row.emissions) {
            *total += value;
        }
    }

    let mut out: Vec<MetricsRow> = groups.into_values().collect();
    for row in &mut out {
        // rates were per 1,000,000 VMT (collisions) and grams per mile,
        // i.e. metric tons per 1,000,000 VMT (emissions)
        for total in &mut row.collisions {
            *total /= 1_000_000.0;
        }
        for total in &mut row.emissions {
            *total /= 1_000_000.0;
        }
    }

    info!(groups = out.len(), "Aggregated metrics by timeperiod and vehicle class");
    out
}
