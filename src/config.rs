use std::{
    fs::read_to_string,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use rand::{rngs::StdRng, SeedableRng};
use serde::Deserialize;

use crate::{geocode::RetryPolicy, Dataset};

const DEFAULT_CONFIG_FILE: &str = "rates-map.yaml";

/// Runtime settings for every stage. Any subset can be overridden from a
/// YAML file; everything else keeps the built-in value.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Council open-data host serving the source tables by filename.
    pub data_url: String,
    /// Postcode lookup service; one GET per postcode at `{url}/{postcode}`.
    pub postcode_api_url: String,
    /// OpenStreetMap export endpoint for the background image.
    pub map_export_url: String,
    pub rates_csv: String,
    pub empty_csv: String,
    /// Supplied locally, the deliveries are not published anywhere.
    pub foodbank_csv: String,
    pub map_png: String,
    /// Where the map stage leaves its parameters for the plotting side.
    pub map_params_file: String,
    /// Highest n rateable values dropped before the bounding box is worked out.
    pub cutoff: usize,
    /// Colour map name, handed through to the plotting side untouched.
    pub colourmap: String,
    pub high_res: bool,
    pub lookup_timeout_secs: u64,
    pub lookup_backoff_secs: u64,
    /// Attempts per lookup including the first; covers transport faults only.
    pub lookup_attempts: u32,
    /// Fix the overlap jitter for reproducible output; unset seeds from entropy.
    pub jitter_seed: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_url: "https://data.portsmouth.gov.uk/media/tables".to_string(),
            postcode_api_url: "https://api.postcodes.io/postcodes".to_string(),
            map_export_url: "https://render.openstreetmap.org/cgi-bin/export".to_string(),
            rates_csv: "ndr-properties-january-2022.csv".to_string(),
            empty_csv: "empty-commercial-properties-january-2022.csv".to_string(),
            foodbank_csv: "foodbank-deliveries.csv".to_string(),
            map_png: "map.png".to_string(),
            map_params_file: "map-params.json".to_string(),
            cutoff: 150,
            colourmap: "RdBu".to_string(),
            high_res: false,
            lookup_timeout_secs: 10,
            lookup_backoff_secs: 10,
            lookup_attempts: 2,
            jitter_seed: None,
        }
    }
}

impl Config {
    /// An explicit path must load; without one the default file is picked up
    /// when present and the built-ins apply when not.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))
            }
            None => Ok(Self::default()),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        serde_yaml::from_str(&raw)
            .with_context(|| format!("failed to parse config {}", path.display()))
    }

    pub fn csv_name(&self, dataset: Dataset) -> &str {
        match dataset {
            Dataset::Rates => &self.rates_csv,
            Dataset::Empty => &self.empty_csv,
        }
    }

    pub fn csv_path(&self, dataset: Dataset) -> PathBuf {
        PathBuf::from(self.csv_name(dataset))
    }

    /// Source URL for a dataset. A csv kept under a local directory is still
    /// published by bare filename upstream.
    pub fn csv_url(&self, dataset: Dataset) -> String {
        let name = self.csv_name(dataset);
        let file = Path::new(name)
            .file_name()
            .and_then(|x| x.to_str())
            .unwrap_or(name);
        format!("{}/{}", self.data_url, file)
    }

    pub fn data_path(&self, dataset: Dataset) -> PathBuf {
        PathBuf::from(format!("{}.data", self.csv_name(dataset)))
    }

    pub fn failed_lookups_path(&self, dataset: Dataset) -> PathBuf {
        PathBuf::from(format!("{}-failed-lookups.csv", self.csv_name(dataset)))
    }

    pub fn failed_extractions_path(&self, dataset: Dataset) -> PathBuf {
        PathBuf::from(format!("{}-failed-postcode-finds.csv", self.csv_name(dataset)))
    }

    pub fn foodbank_data_path(&self) -> PathBuf {
        PathBuf::from(format!("{}.data", self.foodbank_csv))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.lookup_timeout_secs)
    }

    pub fn retry(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.lookup_attempts.max(1),
            backoff: Duration::from_secs(self.lookup_backoff_secs),
        }
    }

    pub fn jitter_rng(&self) -> StdRng {
        match self.jitter_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }
}
