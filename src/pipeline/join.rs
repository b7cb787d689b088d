//! Keyed joins of the rate tables onto the long link tables.
//!
//! Joins are explicit hash-map lookups with their cardinality contracts
//! checked afterwards: the delay and emission joins must match every row
//! (the result count may not change), the collision join is a left join
//! where only excluded-sentinel rows may go unmatched, and every vehicle
//! class must resolve to an emissions group. Any violation means the data
//! has drifted from the fixed configuration and is fatal.

use crate::lookup::{CollisionLookup, DelayLookup, EmissionsLookup};
use crate::network::vclass_group;
use crate::pipeline::buckets::{COLLISION_EXCLUDED, KeyedLinkPeriod};
use crate::pipeline::reshape::LinkPeriodClass;
use anyhow::{Result, anyhow, ensure};
use std::collections::HashMap;
use tracing::info;

/// A link-period row with its delay rate and (optional) collision rates.
#[derive(Debug, Clone)]
pub struct RatedLinkPeriod {
    pub keyed: KeyedLinkPeriod,
    /// Non-recurring delay, hours per vehicle-mile.
    pub nrcdelay_per_vmt: f64,
    /// Collision rates aligned with the lookup's collision types; `None`
    /// for excluded links, which contribute nothing.
    pub collision_rates: Option<Vec<f64>>,
}

/// A fully joined (link, period, class) row, ready for metric computation.
#[derive(Debug, Clone)]
pub struct ClassRow {
    pub timeperiod: &'static str,
    pub vclass: &'static str,
    pub vol: f64,
    pub distance: f64,
    pub ft: i64,
    pub fft: f64,
    pub ctim: f64,
    pub nrcdelay_per_vmt: f64,
    pub collision_rates: Option<Vec<f64>>,
    pub emission_rates: Vec<f64>,
}

/// Joins delay and collision rates onto the keyed link-period rows.
pub fn join_link_period_rates(
    rows: Vec<KeyedLinkPeriod>,
    delay: &DelayLookup,
    collision: &CollisionLookup,
) -> Result<Vec<RatedLinkPeriod>> {
    let expected = rows.len();
    let mut out = Vec::with_capacity(expected);

    for keyed in rows {
        let nrcdelay_per_vmt = delay
            .rate(&keyed.vc_ratio, keyed.lane_bucket)
            .ok_or_else(|| {
                anyhow!(
                    "no non-recurring delay rate for vcratio {} with {} lanes (link {}-{} {})",
                    keyed.vc_ratio,
                    keyed.lane_bucket,
                    keyed.row.a,
                    keyed.row.b,
                    keyed.row.timeperiod
                )
            })?;

        let collision_rates = collision
            .rates(keyed.collision_ft, keyed.collision_at)
            .map(|r| r.to_vec());
        if collision_rates.is_none() && keyed.collision_ft != COLLISION_EXCLUDED {
            return Err(anyhow!(
                "no collision rates for ft bucket {} and at bucket {} (link {}-{} {})",
                keyed.collision_ft,
                keyed.collision_at,
                keyed.row.a,
                keyed.row.b,
                keyed.row.timeperiod
            ));
        }

        out.push(RatedLinkPeriod {
            keyed,
            nrcdelay_per_vmt,
            collision_rates,
        });
    }

    ensure!(
        out.len() == expected,
        "rate join changed the link-period row count: {} -> {}",
        expected,
        out.len()
    );
    info!(rows = out.len(), "Joined delay and collision rates");
    Ok(out)
}

/// Transfers link-period attributes onto the class rows and joins the
/// vehicle-class group and emission rates.
pub fn join_class_rows(
    class_rows: Vec<LinkPeriodClass>,
    rated: &[RatedLinkPeriod],
    emissions: &EmissionsLookup,
) -> Result<Vec<ClassRow>> {
    let by_link_period: HashMap<(i64, i64, &str), &RatedLinkPeriod> = rated
        .iter()
        .map(|r| ((r.keyed.row.a, r.keyed.row.b, r.keyed.row.timeperiod), r))
        .collect();

    let expected = class_rows.len();
    let mut out = Vec::with_capacity(expected);

    for row in class_rows {
        let rated = by_link_period
            .get(&(row.a, row.b, row.timeperiod))
            .ok_or_else(|| {
                anyhow!(
                    "class row {}-{} {} has no matching link-period row",
                    row.a,
                    row.b,
                    row.timeperiod
                )
            })?;

        let group = vclass_group(row.vclass)
            .ok_or_else(|| anyhow!("vehicle class '{}' has no emissions group", row.vclass))?;

        let emission_rates = emissions
            .rates(row.timeperiod, group, rated.keyed.speed)
            .ok_or_else(|| {
                anyhow!(
                    "no emission rates for period {}, group {}, speed {} (link {}-{})",
                    row.timeperiod,
                    group,
                    rated.keyed.speed,
                    row.a,
                    row.b
                )
            })?
            .to_vec();

        out.push(ClassRow {
            timeperiod: row.timeperiod,
            vclass: row.vclass,
            vol: row.vol,
            distance: rated.keyed.row.distance,
            ft: rated.keyed.row.ft,
            fft: rated.keyed.row.fft,
            ctim: rated.keyed.row.ctim,
            nrcdelay_per_vmt: rated.nrcdelay_per_vmt,
            collision_rates: rated.collision_rates.clone(),
            emission_rates,
        });
    }

    ensure!(
        out.len() == expected,
        "emission join changed the class row count: {} -> {}",
        expected,
        out.len()
    );
    info!(rows = out.len(), "Joined class rows with emission rates");
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lookup::{
        COLLISION_LOOKUP_FILE, DELAY_LOOKUP_FILE, EMISSIONS_LOOKUP_FILE, load_collision_lookup,
        load_delay_lookup, load_emissions_lookup,
    };
    use crate::pipeline::buckets::derive_keys;
    use crate::pipeline::reshape::LinkPeriod;
    use std::fs;

    fn lookups(name: &str) -> (DelayLookup, CollisionLookup, EmissionsLookup) {
        let dir = std::env::temp_dir().join(format!("hwynet_join_{name}"));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join(DELAY_LOOKUP_FILE),
            "filter,year,vcratio,2lanes,3lanes,4lanes\n\
             calib,2035,0.60,0.01,0.02,0.03\n",
        )
        .unwrap();
        fs::write(
            dir.join(COLLISION_LOOKUP_FILE),
            "filter,year,ft,at,Fatality,Injury\n\
             calib,2035,2,4,5.0,50.0\n",
        )
        .unwrap();
        fs::write(
            dir.join(EMISSIONS_LOOKUP_FILE),
            "filter,year,period,vclassgroup,speed,CO2\n\
             calib,2035,AM,auto,30,400.0\n",
        )
        .unwrap();
        (
            load_delay_lookup(&dir, "calib", 2035).unwrap(),
            load_collision_lookup(&dir, "calib", 2035).unwrap(),
            load_emissions_lookup(&dir, "calib", 2035).unwrap(),
        )
    }

    fn link_period(ft: i64, lanes: i64) -> LinkPeriod {
        LinkPeriod {
            a: 1,
            b: 2,
            timeperiod: "AM",
            distance: 2.0,
            lanes,
            at: 4,
            ft,
            fft: 1.0,
            cspd: 30.0,
            vol_tot: 100.0,
            vc: 0.6,
            ctim: 2.0,
        }
    }

    #[test]
    fn test_delay_join_matches_every_row() {
        let (delay, collision, _) = lookups("delay_ok");
        let keyed = derive_keys(vec![link_period(2, 3)]);
        let rated = join_link_period_rates(keyed, &delay, &collision).unwrap();
        assert_eq!(rated.len(), 1);
        assert_eq!(rated[0].nrcdelay_per_vmt, 0.02);
        assert_eq!(rated[0].collision_rates, Some(vec![5.0, 50.0]));
    }

    #[test]
    fn test_missing_delay_rate_is_fatal() {
        let (delay, collision, _) = lookups("delay_miss");
        let mut row = link_period(2, 3);
        row.vc = 0.9; // no 0.90 entry in the fixture
        let err = join_link_period_rates(derive_keys(vec![row]), &delay, &collision).unwrap_err();
        assert!(err.to_string().contains("0.90"), "{err}");
    }

    #[test]
    fn test_excluded_links_carry_no_collision_rates() {
        let (delay, collision, _) = lookups("sentinel");
        let keyed = derive_keys(vec![link_period(6, 3)]); // dummy link
        let rated = join_link_period_rates(keyed, &delay, &collision).unwrap();
        assert_eq!(rated[0].collision_rates, None);
    }

    #[test]
    fn test_unmatched_collision_bucket_is_fatal() {
        let (delay, collision, _) = lookups("collision_miss");
        // ft 3 is not excluded and not in the fixture table
        let err =
            join_link_period_rates(derive_keys(vec![link_period(3, 3)]), &delay, &collision)
                .unwrap_err();
        assert!(err.to_string().contains("collision"), "{err}");
    }

    #[test]
    fn test_class_join_attaches_group_rates() {
        let (delay, collision, emissions) = lookups("class_ok");
        let rated =
            join_link_period_rates(derive_keys(vec![link_period(2, 3)]), &delay, &collision)
                .unwrap();
        let class_rows = vec![LinkPeriodClass {
            a: 1,
            b: 2,
            timeperiod: "AM",
            vclass: "da",
            vol: 100.0,
        }];
        let joined = join_class_rows(class_rows, &rated, &emissions).unwrap();
        assert_eq!(joined.len(), 1);
        assert_eq!(joined[0].emission_rates, vec![400.0]);
        assert_eq!(joined[0].distance, 2.0);
    }

    #[test]
    fn test_unmapped_vehicle_class_is_fatal() {
        let (delay, collision, emissions) = lookups("class_unmapped");
        let rated =
            join_link_period_rates(derive_keys(vec![link_period(2, 3)]), &delay, &collision)
                .unwrap();
        let class_rows = vec![LinkPeriodClass {
            a: 1,
            b: 2,
            timeperiod: "AM",
            vclass: "taxi",
            vol: 1.0,
        }];
        let err = join_class_rows(class_rows, &rated, &emissions).unwrap_err();
        assert!(err.to_string().contains("taxi"), "{err}");
    }

    #[test]
    fn test_missing_emission_rate_is_fatal() {
        let (delay, collision, emissions) = lookups("emission_miss");
        let mut row = link_period(2, 3);
        row.cspd = 55.0; // no speed-55 entry in the fixture
        let rated =
            join_link_period_rates(derive_keys(vec![row]), &delay, &collision).unwrap();
        let class_rows = vec![LinkPeriodClass {
            a: 1,
            b: 2,
            timeperiod: "AM",
            vclass: "da",
            vol: 1.0,
        }];
        let err = join_class_rows(class_rows, &rated, &emissions).unwrap_err();
        assert!(err.to_string().contains("speed 55"), "{err}");
    }
}
