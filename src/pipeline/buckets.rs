//! Bucketing rules that turn raw link attributes into lookup-table join
//! keys. Each function is pure and total; the rules must match the
//! published rate tables exactly.

use crate::pipeline::reshape::LinkPeriod;
use std::fmt;

/// Facility types treated as freeways: freeway-to-freeway connector,
/// freeway, managed freeway.
pub const FREEWAY_FTS: [i64; 3] = [1, 2, 8];

/// Sentinel facility bucket for links excluded from the collision lookup
/// (dummy links and links with no lanes).
pub const COLLISION_EXCLUDED: i64 = -1;

/// A volume-to-capacity ratio formatted to two decimals, used as a string
/// join key against the delay table. Both the link side and the lookup side
/// go through this same formatter, so the rounding convention cancels out.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VcRatioKey(String);

impl VcRatioKey {
    pub fn from_ratio(vc: f64) -> Self {
        VcRatioKey(format!("{vc:.2}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VcRatioKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The delay table carries rates for 2, 3 and 4 lanes only.
pub fn lane_bucket(lanes: i64) -> i64 {
    lanes.clamp(2, 4)
}

/// Delay rates top out at a vc ratio of 1.0.
pub fn vc_ratio_bucket(vc: f64) -> VcRatioKey {
    VcRatioKey::from_ratio(vc.min(1.0))
}

/// Collision facility bucket. Connectors (ft 1) and managed freeways (ft 8)
/// take plain-freeway rates; dummy links (ft 6) and zero-lane links are
/// excluded; everything above 4 uses the ft 4 rates.
pub fn collision_ft_bucket(ft: i64, lanes: i64) -> i64 {
    if ft == 6 || lanes <= 0 {
        return COLLISION_EXCLUDED;
    }
    let bucket = if ft == 1 || ft == 8 { 2 } else { ft };
    bucket.min(4)
}

/// Collision area bucket: area types below 4 use the at 4 rates.
pub fn collision_at_bucket(at: i64) -> i64 {
    at.max(4)
}

/// Emission speed bucket: congested speed truncated to an integer and
/// capped at 65, the highest speed the emission table carries.
pub fn emission_speed_bucket(cspd: f64) -> i64 {
    (cspd as i64).min(65)
}

/// A link-period row with all join keys derived.
#[derive(Debug, Clone)]
pub struct KeyedLinkPeriod {
    pub row: LinkPeriod,
    pub lane_bucket: i64,
    pub vc_ratio: VcRatioKey,
    pub collision_ft: i64,
    pub collision_at: i64,
    pub speed: i64,
}

/// Derives the bucketed join keys for every link-period row.
pub fn derive_keys(rows: Vec<LinkPeriod>) -> Vec<KeyedLinkPeriod> {
    rows.into_iter()
        .map(|row| KeyedLinkPeriod {
            lane_bucket: lane_bucket(row.lanes),
            vc_ratio: vc_ratio_bucket(row.vc),
            collision_ft: collision_ft_bucket(row.ft, row.lanes),
            collision_at: collision_at_bucket(row.at),
            speed: emission_speed_bucket(row.cspd),
            row,
        })
        .collect()
}
