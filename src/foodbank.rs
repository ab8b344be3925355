use std::path::Path;

use anyhow::{bail, Context, Result};
use log::{info, warn};

use crate::{
    config::Config,
    geocode::{Geocoder, Lookup, PostcodesIo},
    io, utils, DeliveryPoint, RawRecord,
};

// unlike the council tables, deliveries carry a ready-made postcode column
const POSTCODE_COLUMN: &str = "postcode";

/// Geocode the foodbank deliveries into their own `.data` file. The source
/// csv is supplied locally, there is nothing to download; an existing output
/// is kept as-is.
pub fn run(config: &Config) -> Result<()> {
    let data_path = config.foodbank_data_path();
    if data_path.exists() {
        info!("foodbank data already built at {}", data_path.display());
        return Ok(());
    }

    let csv_path = Path::new(&config.foodbank_csv);
    if !csv_path.exists() {
        bail!(
            "{} is missing; foodbank deliveries are supplied locally, not downloaded",
            csv_path.display()
        );
    }

    let records = io::read_records(csv_path)?;
    info!("geocoding {} foodbank deliveries", records.len());

    let geocoder = PostcodesIo::new(
        utils::agent(config.timeout()),
        &config.postcode_api_url,
        config.retry(),
    );
    let points = geocode_deliveries(records, &geocoder)?;

    io::write_json(&data_path, &points)?;
    info!("foodbank: {} points written to {}", points.len(), data_path.display());
    Ok(())
}

/// Rows the service can't place are dropped rather than kept for retry; a
/// missing postcode column means the wrong file entirely.
fn geocode_deliveries(
    records: Vec<RawRecord>,
    geocoder: &dyn Geocoder,
) -> Result<Vec<DeliveryPoint>> {
    let pb = utils::progress_bar(records.len() as u64);
    let mut points = Vec::new();
    let mut dropped = 0_usize;
    for (i, record) in records.into_iter().enumerate() {
        pb.inc(1);
        let postcode = record
            .get(POSTCODE_COLUMN)
            .with_context(|| format!("delivery {i} has no {POSTCODE_COLUMN:?} column"))?;
        match geocoder.lookup(postcode)? {
            Lookup::Found(point) => points.push(DeliveryPoint {
                point,
                fields: record,
            }),
            Lookup::NotFound | Lookup::RetryExhausted => dropped += 1,
        }
    }
    pb.finish_and_clear();

    if dropped > 0 {
        warn!("dropped {dropped} deliveries the service couldn't place");
    }
    Ok(points)
}
