//! The metrics pipeline: reshape the link export to long form, derive the
//! lookup join keys, join the three rate tables, compute per-row metrics,
//! and aggregate to (timeperiod, vehicle class) totals.

pub mod aggregate;
pub mod buckets;
pub mod join;
pub mod metrics;
pub mod reshape;

use crate::{lookup, network, output};
use anyhow::{Context, Result};
use std::path::Path;
use tracing::info;

/// Everything one run needs: input paths, lookup selection, output path.
#[derive(Debug)]
pub struct RunConfig<'a> {
    pub net_csv: &'a Path,
    pub lookup_dir: &'a Path,
    pub output_path: &'a Path,
    pub filter: &'a str,
    pub year: i32,
}

/// Runs the full pipeline. Nothing is written unless every stage succeeds.
pub fn run(config: &RunConfig) -> Result<()> {
    let links = network::read_links(config.net_csv)?;

    let link_periods = reshape::melt_periods(&links)?;
    let class_rows = reshape::melt_vehicle_classes(&links)?;

    let delay = lookup::load_delay_lookup(config.lookup_dir, config.filter, config.year)?;
    let collision = lookup::load_collision_lookup(config.lookup_dir, config.filter, config.year)?;
    let emissions = lookup::load_emissions_lookup(config.lookup_dir, config.filter, config.year)?;

    let keyed = buckets::derive_keys(link_periods);
    let rated = join::join_link_period_rates(keyed, &delay, &collision)?;
    let joined = join::join_class_rows(class_rows, &rated, &emissions)?;

    let per_row = metrics::compute_metrics(&joined, collision.collision_types.len());
    let summary = aggregate::aggregate(per_row);

    output::write_metrics(
        config.output_path,
        &summary,
        &collision.collision_types,
        &emissions.emission_types,
    )
    .context("writing metrics output")?;

    info!(path = %config.output_path.display(), "Wrote metrics");
    Ok(())
}
