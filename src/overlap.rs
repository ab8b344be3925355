use std::collections::BTreeSet;

use log::debug;
use rand::Rng;

use crate::{EnrichedRecord, GeoPoint, Postcode};

const JITTER_MIN: f64 = 0.0001; // degrees
const JITTER_MAX: f64 = 0.0005; // degrees

/// Nudge every row whose postcode appears more than once, so stacked markers
/// stay individually clickable. One direction per row, applied to both axes;
/// magnitudes drawn per axis. Unique postcodes never move.
pub fn scatter<R: Rng + ?Sized>(
    records: &mut [EnrichedRecord],
    duplicates: &BTreeSet<Postcode>,
    rng: &mut R,
) {
    let mut moved = 0_usize;
    for record in records.iter_mut() {
        if !duplicates.contains(&record.postcode) {
            continue;
        }
        let sign = if rng.gen_bool(0.5) { 1.0 } else { -1.0 };
        record.point = GeoPoint::new(
            record.point.latitude + sign * rng.gen_range(JITTER_MIN..JITTER_MAX),
            record.point.longitude + sign * rng.gen_range(JITTER_MIN..JITTER_MAX),
        );
        moved += 1;
    }
    debug!("scattered {moved} rows sharing a postcode");
}

/// Pin each row to the point the reference dataset assigned to the same
/// premises. First match in reference order wins; rows with no match keep
/// their own point.
pub fn align(records: &mut [EnrichedRecord], reference: &[EnrichedRecord]) {
    let mut aligned = 0_usize;
    for record in records.iter_mut() {
        let point = reference
            .iter()
            .find(|candidate| {
                match (record.property_reference(), candidate.property_reference()) {
                    (Some(a), Some(b)) => a == b,
                    _ => false,
                }
            })
            .map(|candidate| candidate.point);
        if let Some(point) = point {
            record.point = point;
            aligned += 1;
        }
    }
    debug!("aligned {aligned} rows to the reference dataset");
}
