use std::sync::OnceLock;

use regex::Regex;

use crate::Postcode;

fn pattern() -> &'static Regex {
    // outward code, space, inward code; the R covers the GIR girobank relic
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new("[A-Z]{1,2}[0-9R][0-9A-Z]? [0-9][A-Z]{2}").expect("hardcoded")
    })
}

/// Pull the first thing shaped like a UK postcode out of a free-text address.
/// Addresses with no match are a real condition, not an error: plenty of the
/// council's rows carry partial addresses.
pub fn extract(address: &str) -> Option<Postcode> {
    pattern()
        .find(address)
        .map(|m| Postcode::new(m.as_str()))
}
