//! Wide-to-long reshaping of the link table.
//!
//! The export carries one row per link with periodic values spread across
//! suffixed columns. The pipeline works on long tables instead: one row per
//! (link, period) and one per (link, period, vehicle class). Both melts are
//! strictly row-count preserving; a count change means the fixed period or
//! class configuration has drifted from the data and is fatal.

use crate::network::{LinkRecord, PERIODS, VEHICLE_CLASSES};
use anyhow::{Result, ensure};
use tracing::info;

/// One (link, period) row: the link's period-invariant attributes plus the
/// periodic values for this period.
#[derive(Debug, Clone)]
pub struct LinkPeriod {
    pub a: i64,
    pub b: i64,
    pub timeperiod: &'static str,
    pub distance: f64,
    pub lanes: i64,
    pub at: i64,
    pub ft: i64,
    pub fft: f64,
    pub cspd: f64,
    pub vol_tot: f64,
    pub vc: f64,
    pub ctim: f64,
}

/// One (link, period, vehicle class) row carrying that class's volume.
#[derive(Debug, Clone)]
pub struct LinkPeriodClass {
    pub a: i64,
    pub b: i64,
    pub timeperiod: &'static str,
    pub vclass: &'static str,
    pub vol: f64,
}

/// Melts the wide link table into one row per (link, period).
pub fn melt_periods(links: &[LinkRecord]) -> Result<Vec<LinkPeriod>> {
    let mut out = Vec::with_capacity(links.len() * PERIODS.len());
    for link in links {
        for (p, &timeperiod) in PERIODS.iter().enumerate() {
            let values = &link.period_values[p];
            out.push(LinkPeriod {
                a: link.a,
                b: link.b,
                timeperiod,
                distance: link.distance,
                lanes: link.lanes,
                at: link.at,
                ft: link.ft,
                fft: link.fft,
                cspd: values.cspd,
                vol_tot: values.vol_tot,
                vc: values.vc,
                ctim: values.ctim,
            });
        }
    }
    ensure!(
        out.len() == links.len() * PERIODS.len(),
        "period melt produced {} rows, expected {} links x {} periods",
        out.len(),
        links.len(),
        PERIODS.len()
    );
    info!(rows = out.len(), "Melted links to timeperiods");
    Ok(out)
}

/// Melts the wide link table into one row per (link, period, class).
pub fn melt_vehicle_classes(links: &[LinkRecord]) -> Result<Vec<LinkPeriodClass>> {
    let mut out = Vec::with_capacity(links.len() * PERIODS.len() * VEHICLE_CLASSES.len());
    for link in links {
        for (p, &timeperiod) in PERIODS.iter().enumerate() {
            for (c, &vclass) in VEHICLE_CLASSES.iter().enumerate() {
                out.push(LinkPeriodClass {
                    a: link.a,
                    b: link.b,
                    timeperiod,
                    vclass,
                    vol: link.class_volumes[p][c],
                });
            }
        }
    }
    ensure!(
        out.len() == links.len() * PERIODS.len() * VEHICLE_CLASSES.len(),
        "class melt produced {} rows, expected {} links x {} periods x {} classes",
        out.len(),
        links.len(),
        PERIODS.len(),
        VEHICLE_CLASSES.len()
    );
    info!(rows = out.len(), "Melted links to timeperiods x vehicle classes");
    Ok(out)
}
