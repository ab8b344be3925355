use std::collections::BTreeSet;

use anyhow::{Context, Result};
use log::info;

use crate::{
    geocode::{Geocoder, Lookup},
    postcode, utils, EnrichedRecord, Postcode, RawRecord, ADDRESS_COLUMN, RATE_COLUMN,
};

/// Everything one enrichment pass produces. Failed rows keep their raw shape
/// so they can be re-fed to the pipeline once the source data is fixed.
#[derive(Debug, Default)]
pub struct Enrichment {
    pub records: Vec<EnrichedRecord>,
    /// Rows whose postcode the lookup service had no answer for.
    pub failed_lookups: Vec<RawRecord>,
    /// Rows whose address contained nothing shaped like a postcode.
    pub failed_extractions: Vec<RawRecord>,
    /// Postcodes seen on more than one row, lookup outcome regardless.
    pub duplicate_postcodes: BTreeSet<Postcode>,
}

/// Geocode a batch of raw rows, one lookup per row. Repeated postcodes are
/// looked up again rather than cached; the repeat itself is what the overlap
/// pass needs to know about. A missing column or an unparseable rateable
/// value means the source table changed shape, which stops the whole batch.
pub fn enrich(records: Vec<RawRecord>, geocoder: &dyn Geocoder) -> Result<Enrichment> {
    let mut outcome = Enrichment::default();
    let mut seen = BTreeSet::new();

    let pb = utils::progress_bar(records.len() as u64);
    for (i, record) in records.into_iter().enumerate() {
        pb.inc(1);

        let address = record
            .get(ADDRESS_COLUMN)
            .with_context(|| format!("record {i} has no {ADDRESS_COLUMN:?} column"))?;
        let postcode = match postcode::extract(address) {
            Some(x) => x,
            None => {
                outcome.failed_extractions.push(record);
                continue;
            }
        };

        if !seen.insert(postcode.clone()) {
            outcome.duplicate_postcodes.insert(postcode.clone());
        }

        match geocoder.lookup(postcode.as_str())? {
            Lookup::Found(point) => {
                let rate = record
                    .get(RATE_COLUMN)
                    .with_context(|| format!("record {i} has no {RATE_COLUMN:?} column"))?;
                let rate: i64 = rate.trim().parse().with_context(|| {
                    format!("record {i} has unusable rateable value {rate:?}")
                })?;
                outcome.records.push(EnrichedRecord {
                    postcode,
                    point,
                    rate,
                    fields: record,
                });
            }
            Lookup::NotFound | Lookup::RetryExhausted => outcome.failed_lookups.push(record),
        }
    }
    pb.finish_and_clear();

    info!(
        "geocoded {} rows ({} distinct postcodes, {} repeated), {} lookups failed, {} rows without a postcode",
        outcome.records.len(),
        seen.len(),
        outcome.duplicate_postcodes.len(),
        outcome.failed_lookups.len(),
        outcome.failed_extractions.len(),
    );
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, collections::BTreeMap};

    use crate::GeoPoint;

    use super::*;

    struct FakeGeocoder {
        table: BTreeMap<&'static str, Lookup>,
        calls: RefCell<Vec<String>>,
    }

    impl FakeGeocoder {
        fn new(table: BTreeMap<&'static str, Lookup>) -> Self {
            Self {
                table,
                calls: RefCell::new(Vec::new()),
            }
        }
    }

    impl Geocoder for FakeGeocoder {
        fn lookup(&self, postcode: &str) -> Result<Lookup> {
            self.calls.borrow_mut().push(postcode.to_string());
            Ok(self.table.get(postcode).copied().unwrap_or(Lookup::NotFound))
        }
    }

    fn record(address: &str, rate: &str) -> RawRecord {
        BTreeMap::from([
            (ADDRESS_COLUMN.to_string(), address.to_string()),
            (RATE_COLUMN.to_string(), rate.to_string()),
        ])
    }

    #[test]
    fn geocoded_row_keeps_all_source_columns() {
        let geocoder = FakeGeocoder::new(BTreeMap::from([(
            "PO1 2AB",
            Lookup::Found(GeoPoint::new(50.7989, -1.0912)),
        )]));
        let outcome = enrich(vec![record("10 High Street PO1 2AB", "15250")], &geocoder).unwrap();

        assert_eq!(outcome.records.len(), 1);
        let enriched = &outcome.records[0];
        assert_eq!(enriched.postcode, Postcode::new("PO1 2AB"));
        assert_eq!(enriched.point, GeoPoint::new(50.7989, -1.0912));
        assert_eq!(enriched.rate, 15250);
        assert_eq!(
            enriched.fields.get(ADDRESS_COLUMN).map(String::as_str),
            Some("10 High Street PO1 2AB")
        );
        assert!(outcome.failed_lookups.is_empty());
        assert!(outcome.failed_extractions.is_empty());
    }

    #[test]
    fn row_without_postcode_skips_the_lookup() {
        let geocoder = FakeGeocoder::new(BTreeMap::new());
        let outcome = enrich(vec![record("Land at rear of 12 High Street", "100")], &geocoder)
            .unwrap();

        assert!(outcome.records.is_empty());
        assert_eq!(outcome.failed_extractions.len(), 1);
        assert!(geocoder.calls.borrow().is_empty());
    }

    #[test]
    fn failed_lookup_keeps_the_raw_row() {
        let geocoder = FakeGeocoder::new(BTreeMap::from([("PO1 9ZZ", Lookup::NotFound)]));
        let outcome = enrich(vec![record("1 Nowhere Lane PO1 9ZZ", "100")], &geocoder).unwrap();

        assert!(outcome.records.is_empty());
        assert_eq!(outcome.failed_lookups.len(), 1);
        assert_eq!(
            outcome.failed_lookups[0].get(ADDRESS_COLUMN).map(String::as_str),
            Some("1 Nowhere Lane PO1 9ZZ")
        );
    }

    #[test]
    fn repeats_are_looked_up_again_and_recorded() {
        let geocoder = FakeGeocoder::new(BTreeMap::from([(
            "PO1 2AB",
            Lookup::Found(GeoPoint::new(50.7989, -1.0912)),
        )]));
        let outcome = enrich(
            vec![
                record("10 High Street PO1 2AB", "100"),
                record("11 High Street PO1 2AB", "200"),
            ],
            &geocoder,
        )
        .unwrap();

        assert_eq!(outcome.records.len(), 2);
        assert_eq!(geocoder.calls.borrow().len(), 2);
        assert!(outcome
            .duplicate_postcodes
            .contains(&Postcode::new("PO1 2AB")));
    }

    #[test]
    fn repeats_count_even_when_every_lookup_fails() {
        let geocoder = FakeGeocoder::new(BTreeMap::from([("PO1 9ZZ", Lookup::RetryExhausted)]));
        let outcome = enrich(
            vec![
                record("1 Nowhere Lane PO1 9ZZ", "100"),
                record("2 Nowhere Lane PO1 9ZZ", "200"),
            ],
            &geocoder,
        )
        .unwrap();

        assert_eq!(outcome.failed_lookups.len(), 2);
        assert!(outcome
            .duplicate_postcodes
            .contains(&Postcode::new("PO1 9ZZ")));
    }

    #[test]
    fn unusable_rateable_value_stops_the_batch() {
        let geocoder = FakeGeocoder::new(BTreeMap::from([(
            "PO1 2AB",
            Lookup::Found(GeoPoint::new(50.7989, -1.0912)),
        )]));
        let err = enrich(vec![record("10 High Street PO1 2AB", "n/a")], &geocoder).unwrap_err();
        assert!(err.to_string().contains("rateable value"));
    }

    #[test]
    fn missing_address_column_stops_the_batch() {
        let geocoder = FakeGeocoder::new(BTreeMap::new());
        let rows = vec![BTreeMap::from([("Street".to_string(), "High".to_string())])];
        assert!(enrich(rows, &geocoder).is_err());
    }

    #[test]
    fn outcome_sets_partition_the_input() {
        let geocoder = FakeGeocoder::new(BTreeMap::from([(
            "PO1 2AB",
            Lookup::Found(GeoPoint::new(50.7989, -1.0912)),
        )]));
        let rows = vec![
            record("10 High Street PO1 2AB", "100"),
            record("1 Nowhere Lane PO1 9ZZ", "200"),
            record("Land at rear of 12 High Street", "300"),
            record("11 High Street PO1 2AB", "400"),
        ];
        let total = rows.len();
        let outcome = enrich(rows, &geocoder).unwrap();

        assert_eq!(
            outcome.records.len() + outcome.failed_lookups.len() + outcome.failed_extractions.len(),
            total
        );
        // input order survives within each set
        assert_eq!(outcome.records[0].rate, 100);
        assert_eq!(outcome.records[1].rate, 400);
    }

    #[test]
    fn bom_headed_rows_enrich_cleanly() {
        let geocoder = FakeGeocoder::new(BTreeMap::from([(
            "PO1 2AB",
            Lookup::Found(GeoPoint::new(50.7989, -1.0912)),
        )]));
        let rows = vec![BTreeMap::from([
            (ADDRESS_COLUMN.to_string(), "1 High St PO1 2AB".to_string()),
            (RATE_COLUMN.to_string(), "10000".to_string()),
            (
                "\u{feff}Property Reference Number".to_string(),
                "R1".to_string(),
            ),
        ])];
        let outcome = enrich(rows, &geocoder).unwrap();

        assert!(outcome.failed_lookups.is_empty());
        assert!(outcome.failed_extractions.is_empty());
        let json = serde_json::to_value(&outcome.records).unwrap();
        assert_eq!(json[0]["postcode"], "PO1 2AB");
        assert_eq!(json[0]["latitude"], 50.7989);
        assert_eq!(json[0]["longitude"], -1.0912);
        assert_eq!(json[0]["rate"], 10000);
        // the quirky header comes through untouched
        assert_eq!(json[0]["\u{feff}Property Reference Number"], "R1");
        assert_eq!(outcome.records[0].property_reference(), Some("R1"));
    }

    #[test]
    fn rate_tolerates_surrounding_whitespace() {
        let geocoder = FakeGeocoder::new(BTreeMap::from([(
            "PO1 2AB",
            Lookup::Found(GeoPoint::new(50.7989, -1.0912)),
        )]));
        let outcome = enrich(vec![record("10 High Street PO1 2AB", " 15250 ")], &geocoder)
            .unwrap();
        assert_eq!(outcome.records[0].rate, 15250);
    }
}
