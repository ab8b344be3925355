use std::{collections::BTreeMap, fmt};

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::utils::round6;

pub const ADDRESS_COLUMN: &str = "Full Property Address";
pub const RATE_COLUMN: &str = "Current Rateable Value";
pub const PROPERTY_REF_COLUMN: &str = "Property Reference Number";
// the council exports ship a UTF-8 BOM glued onto the first header
pub const PROPERTY_REF_COLUMN_BOM: &str = "\u{feff}Property Reference Number";

/// Columns vary between the source tables, so rows stay dynamic maps.
pub type RawRecord = BTreeMap<String, String>;

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(transparent)]
pub struct Postcode(String);

impl Postcode {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Postcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Deserialize, Serialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude: round6(latitude),
            longitude: round6(longitude),
        }
    }
}

/// Serialises flat: the source columns sit next to `postcode`, `latitude`,
/// `longitude` and `rate` in one object, the layout the plotting side reads.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct EnrichedRecord {
    pub postcode: Postcode,
    // flattened struct must come before the flattened map, otherwise the map
    // swallows the latitude/longitude keys on the way back in
    #[serde(flatten)]
    pub point: GeoPoint,
    pub rate: i64,
    #[serde(flatten)]
    pub fields: RawRecord,
}

impl EnrichedRecord {
    /// Accepts the reference header with and without the leading BOM.
    pub fn property_reference(&self) -> Option<&str> {
        self.fields
            .get(PROPERTY_REF_COLUMN)
            .or_else(|| self.fields.get(PROPERTY_REF_COLUMN_BOM))
            .map(String::as_str)
    }
}

/// A geocoded foodbank delivery, flat like the enriched rows but with no rate.
#[derive(Clone, Debug, Serialize)]
pub struct DeliveryPoint {
    #[serde(flatten)]
    pub point: GeoPoint,
    #[serde(flatten)]
    pub fields: RawRecord,
}

/// The two council tables the pipeline builds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Dataset {
    /// Commercial properties and their rateable values
    Rates,
    /// Commercial properties currently standing empty
    Empty,
}

impl Dataset {
    pub fn slug(self) -> &'static str {
        match self {
            Self::Rates => "rates",
            Self::Empty => "empty",
        }
    }
}
