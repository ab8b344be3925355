use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use env_logger::Env;

use crate::config::Config;

mod config;
mod enrich;
mod foodbank;
mod geocode;
mod io;
mod map;
mod model;
mod overlap;
mod pipeline;
mod postcode;
mod utils;

pub use model::{
    Dataset, DeliveryPoint, EnrichedRecord, GeoPoint, Postcode, RawRecord, ADDRESS_COLUMN,
    PROPERTY_REF_COLUMN, PROPERTY_REF_COLUMN_BOM, RATE_COLUMN,
};

#[derive(Debug, Parser)]
#[command(name = "rates-map", about = "Geocode a city's business rates onto a map")]
struct Cli {
    /// Settings file (rates-map.yaml is picked up automatically)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Fetch and geocode one council dataset
    Build { dataset: Dataset },
    /// Geocode the foodbank deliveries
    Foodbank,
    /// Trim extreme rates and work out the map bounding box
    Map {
        /// Drop the highest n rateable values first
        #[arg(long)]
        cutoff: Option<usize>,
    },
    /// Run every stage in order
    All,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Command::Build { dataset } => {
            pipeline::run(&config, dataset)?;
        }
        Command::Foodbank => foodbank::run(&config)?,
        Command::Map { cutoff } => map::run(&config, cutoff)?,
        Command::All => {
            pipeline::run(&config, Dataset::Rates)?;
            pipeline::run(&config, Dataset::Empty)?;
            foodbank::run(&config)?;
            map::run(&config, None)?;
        }
    }

    Ok(())
}
