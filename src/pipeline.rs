use anyhow::{bail, Result};
use log::info;

use crate::{
    config::Config,
    enrich::enrich,
    geocode::{Geocoder, PostcodesIo},
    io,
    overlap::{align, scatter},
    utils, Dataset, EnrichedRecord,
};

/// Build one dataset end to end: fetch the csv if it's missing, geocode every
/// row, resolve overlapping markers, persist the results. A dataset whose
/// `.data` file already exists is loaded as-is, so a finished batch never
/// hits the lookup service again.
pub fn run(config: &Config, dataset: Dataset) -> Result<Vec<EnrichedRecord>> {
    let data_path = config.data_path(dataset);
    if data_path.exists() {
        info!(
            "{} data already built, loading {}",
            dataset.slug(),
            data_path.display()
        );
        return io::load_enriched(&data_path);
    }

    let agent = utils::agent(config.timeout());

    let csv_path = config.csv_path(dataset);
    if !csv_path.exists() {
        io::download(&agent, &config.csv_url(dataset), &csv_path)?;
    }

    let geocoder = PostcodesIo::new(agent, &config.postcode_api_url, config.retry());
    build(config, dataset, &geocoder)
}

fn build(config: &Config, dataset: Dataset, geocoder: &dyn Geocoder) -> Result<Vec<EnrichedRecord>> {
    let records = io::read_records(&config.csv_path(dataset))?;
    info!("geocoding {} {} rows", records.len(), dataset.slug());

    let mut batch = enrich(records, geocoder)?;

    match dataset {
        // markers sharing a postcode get nudged apart
        Dataset::Rates => {
            let mut rng = config.jitter_rng();
            scatter(&mut batch.records, &batch.duplicate_postcodes, &mut rng);
        }
        // empty properties reuse the coordinates the rates build assigned
        Dataset::Empty => {
            let reference_path = config.data_path(Dataset::Rates);
            if !reference_path.exists() {
                bail!("no rates data yet, run `rates-map build rates` first");
            }
            let reference = io::load_enriched(&reference_path)?;
            align(&mut batch.records, &reference);
        }
    }

    let data_path = config.data_path(dataset);
    io::write_json(&data_path, &batch.records)?;
    io::write_failures(&config.failed_lookups_path(dataset), &batch.failed_lookups)?;
    io::write_failures(&config.failed_extractions_path(dataset), &batch.failed_extractions)?;

    info!(
        "{}: {} rows written to {}",
        dataset.slug(),
        batch.records.len(),
        data_path.display()
    );
    Ok(batch.records)
}
