//! Per-row metric computation.
//!
//! Pure functions of the joined class rows. Collision and emission
//! contributions are left in raw rate x VMT form here; the aggregator
//! applies the per-1,000,000-VMT rescale after summing.

use crate::pipeline::buckets::FREEWAY_FTS;
use crate::pipeline::join::ClassRow;

/// Computed metrics for one (link, period, vehicle class) row.
#[derive(Debug, Clone)]
pub struct LinkClassMetrics {
    pub timeperiod: &'static str,
    pub vclass: &'static str,
    pub vmt: f64,
    pub vht: f64,
    /// VHT if every vehicle traveled at freeflow speed.
    pub hypfft: f64,
    /// Non-recurring delay in hours; zero off the freeway system.
    pub nrcdelay: f64,
    /// Raw rate x VMT per collision type, lookup column order.
    pub collisions: Vec<f64>,
    /// Raw rate x VMT per pollutant, lookup column order.
    pub emissions: Vec<f64>,
}

/// Computes per-row metrics. `n_collision_types` sizes the zero vector for
/// links excluded from the collision lookup.
pub fn compute_metrics(rows: &[ClassRow], n_collision_types: usize) -> Vec<LinkClassMetrics> {
    rows.iter()
        .map(|row| {
            let vmt = row.vol * row.distance;
            let vht = row.vol * row.ctim / 60.0;
            let hypfft = row.vol * row.fft / 60.0;

            // Non-recurring delay only applies on the freeway system,
            // regardless of how the collision bucket remapped the ft.
            let nrcdelay = if FREEWAY_FTS.contains(&row.ft) {
                row.nrcdelay_per_vmt * vmt
            } else {
                0.0
            };

            let collisions = match &row.collision_rates {
                Some(rates) => rates.iter().map(|rate| rate * vmt).collect(),
                None => vec![0.0; n_collision_types],
            };
            let emissions = row.emission_rates.iter().map(|rate| rate * vmt).collect();

            LinkClassMetrics {
                timeperiod: row.timeperiod,
                vclass: row.vclass,
                vmt,
                vht,
                hypfft,
                nrcdelay,
                collisions,
                emissions,
            }
        })
        .collect()
}
