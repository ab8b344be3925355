use std::{thread::sleep, time::Duration};

use anyhow::Result;
use log::warn;
use serde::Deserialize;
use ureq::Agent;

use crate::GeoPoint;

/// What a lookup settled on. `NotFound` is the service answering "no such
/// postcode"; `RetryExhausted` is the network refusing to answer at all.
/// Both end up recorded against the row rather than aborting the batch.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Lookup {
    Found(GeoPoint),
    NotFound,
    RetryExhausted,
}

/// Anything that can turn a postcode into coordinates. The enrichment loop
/// only sees this, so tests run against a canned table instead of the wire.
pub trait Geocoder {
    fn lookup(&self, postcode: &str) -> Result<Lookup>;
}

#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    /// Total attempts per postcode, counting the first.
    pub attempts: u32,
    /// Pause before each retry.
    pub backoff: Duration,
}

/// Client for the postcodes.io bulk lookup service. One GET per postcode at
/// `{base}/{postcode}`; the agent percent-encodes the inner space.
pub struct PostcodesIo {
    agent: Agent,
    base_url: String,
    retry: RetryPolicy,
}

impl PostcodesIo {
    pub fn new(agent: Agent, base_url: &str, retry: RetryPolicy) -> Self {
        Self {
            agent,
            base_url: base_url.trim_end_matches('/').to_string(),
            retry,
        }
    }
}

impl Geocoder for PostcodesIo {
    fn lookup(&self, postcode: &str) -> Result<Lookup> {
        let url = format!("{}/{}", self.base_url, postcode);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.agent.get(&url).call() {
                Ok(response) => {
                    let response: PostcodeResponse = response.into_json()?;
                    return Ok(response.refine(postcode));
                }
                // unknown postcodes come back as a 404 with a json body
                Err(ureq::Error::Status(code, _)) => {
                    warn!("{postcode}: lookup answered status {code}");
                    return Ok(Lookup::NotFound);
                }
                Err(err) => {
                    if attempt >= self.retry.attempts {
                        warn!("{postcode}: giving up after {attempt} attempts ({err})");
                        return Ok(Lookup::RetryExhausted);
                    }
                    warn!(
                        "{postcode}: request failed ({err}), retrying in {}s",
                        self.retry.backoff.as_secs()
                    );
                    sleep(self.retry.backoff);
                }
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct PostcodeResponse {
    status: u16,
    result: Option<RawGeocoding>,
}

#[derive(Debug, Deserialize)]
struct RawGeocoding {
    // terminated postcodes carry null coordinates in an otherwise 200 reply
    latitude: Option<f64>,
    longitude: Option<f64>,
}

impl PostcodeResponse {
    fn refine(self, postcode: &str) -> Lookup {
        match self.result {
            Some(RawGeocoding {
                latitude: Some(latitude),
                longitude: Some(longitude),
            }) => Lookup::Found(GeoPoint::new(latitude, longitude)),
            _ => {
                warn!("{postcode}: no coordinates in reply (status {})", self.status);
                Lookup::NotFound
            }
        }
    }
}
