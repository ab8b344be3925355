use std::{
    cmp::Reverse,
    collections::BTreeSet,
    path::{Path, PathBuf},
};

use anyhow::{bail, Result};
use itertools::Itertools;
use log::{info, warn};
use serde::Serialize;

use crate::{config::Config, io, pipeline, Dataset, EnrichedRecord};

// openstreetmap export scale
const MAP_SCALE: u32 = 25_000;

/// Work out what the plotting side needs: trim the extreme rates, compute the
/// bounding box of what's left and leave both, plus the data file locations,
/// in the params file.
pub fn run(config: &Config, cutoff: Option<usize>) -> Result<()> {
    let cutoff = cutoff.unwrap_or(config.cutoff);
    let records = pipeline::run(config, Dataset::Rates)?;
    let total = records.len();

    let kept = trim_top_rates(records, cutoff);
    info!("trimmed the {cutoff} highest rates, {} of {total} rows left", kept.len());
    let bbox = match Bbox::around(&kept) {
        Some(x) => x,
        None => bail!("no rows left after trimming the {cutoff} highest rates"),
    };

    let export_url = bbox.export_url(&config.map_export_url);
    if !Path::new(&config.map_png).exists() {
        warn!("{} is missing, export it from {export_url}", config.map_png);
    }

    let params = MapParams {
        bbox: &bbox,
        export_url: &export_url,
        scale: MAP_SCALE,
        cutoff,
        colourmap: &config.colourmap,
        high_res: config.high_res,
        records_kept: kept.len(),
        map_png: &config.map_png,
        rates_data: config.data_path(Dataset::Rates),
        empty_data: config.data_path(Dataset::Empty),
        foodbank_data: config.foodbank_data_path(),
    };
    for path in [&params.empty_data, &params.foodbank_data] {
        if !path.exists() {
            warn!("{} not built yet, the plot will be missing a layer", path.display());
        }
    }

    io::write_json(Path::new(&config.map_params_file), &params)?;
    info!("map parameters written to {}", config.map_params_file);
    Ok(())
}

/// Drop the n highest rateable values. A few dockyard-sized properties would
/// otherwise stretch the colour scale until everything else looks identical.
/// Ties at the boundary drop the earlier row; survivors keep their order.
pub fn trim_top_rates(records: Vec<EnrichedRecord>, cutoff: usize) -> Vec<EnrichedRecord> {
    let dropped: BTreeSet<usize> = records
        .iter()
        .enumerate()
        .sorted_by_key(|(_, record)| Reverse(record.rate))
        .take(cutoff)
        .map(|(i, _)| i)
        .collect();
    records
        .into_iter()
        .enumerate()
        .filter(|(i, _)| !dropped.contains(i))
        .map(|(_, record)| record)
        .collect()
}

#[derive(Debug, PartialEq, Serialize)]
pub struct Bbox {
    pub min_longitude: f64,
    pub max_longitude: f64,
    pub min_latitude: f64,
    pub max_latitude: f64,
}

impl Bbox {
    pub fn around(records: &[EnrichedRecord]) -> Option<Self> {
        let first = records.first()?;
        let mut bbox = Bbox {
            min_longitude: first.point.longitude,
            max_longitude: first.point.longitude,
            min_latitude: first.point.latitude,
            max_latitude: first.point.latitude,
        };
        for record in &records[1..] {
            bbox.min_longitude = bbox.min_longitude.min(record.point.longitude);
            bbox.max_longitude = bbox.max_longitude.max(record.point.longitude);
            bbox.min_latitude = bbox.min_latitude.min(record.point.latitude);
            bbox.max_latitude = bbox.max_latitude.max(record.point.latitude);
        }
        Some(bbox)
    }

    /// West,south,east,north with the 15 decimal places the export endpoint
    /// is usually driven with.
    pub fn export_url(&self, base: &str) -> String {
        format!(
            "{base}?bbox={:.15},{:.15},{:.15},{:.15}&scale={MAP_SCALE}&format=png",
            self.min_longitude, self.min_latitude, self.max_longitude, self.max_latitude
        )
    }
}

#[derive(Serialize)]
struct MapParams<'a> {
    bbox: &'a Bbox,
    export_url: &'a str,
    scale: u32,
    cutoff: usize,
    colourmap: &'a str,
    high_res: bool,
    records_kept: usize,
    map_png: &'a str,
    rates_data: PathBuf,
    empty_data: PathBuf,
    foodbank_data: PathBuf,
}
