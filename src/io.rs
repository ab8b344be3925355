use std::{
    fs::{read_to_string, write},
    io::Read,
    path::Path,
};

use anyhow::{bail, Context, Result};
use log::info;
use serde::Serialize;
use ureq::Agent;

use crate::{EnrichedRecord, RawRecord};

pub fn read_records(path: &Path) -> Result<Vec<RawRecord>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let mut records = Vec::new();
    for row in reader.deserialize() {
        let row: RawRecord = row.with_context(|| format!("bad row in {}", path.display()))?;
        records.push(row);
    }
    Ok(records)
}

pub fn load_enriched(path: &Path) -> Result<Vec<EnrichedRecord>> {
    let raw =
        read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("failed to parse {}", path.display()))
}

pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let mut json = serde_json::to_string_pretty(value)?;
    json.push('\n');
    write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

/// An empty set writes no file. A row with columns differing from the first
/// row's means the batch mixed tables, which is fatal.
pub fn write_failures(path: &Path, records: &[RawRecord]) -> Result<()> {
    let first = match records.first() {
        Some(x) => x,
        None => return Ok(()),
    };
    let headers: Vec<&str> = first.keys().map(String::as_str).collect();

    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    writer.write_record(&headers)?;
    for (i, record) in records.iter().enumerate() {
        if !record.keys().map(String::as_str).eq(headers.iter().copied()) {
            bail!("failed row {i} has different columns to the first row");
        }
        writer.write_record(record.values())?;
    }
    writer.flush()?;
    Ok(())
}

pub fn download(agent: &Agent, url: &str, path: &Path) -> Result<()> {
    info!("fetching {url}");
    let response = agent
        .get(url)
        .call()
        .with_context(|| format!("failed to fetch {url}"))?;
    // buffer the whole body before creating the file: a fault mid-download
    // must leave nothing behind, later runs trust any csv already on disk
    let mut body = Vec::new();
    response
        .into_reader()
        .read_to_end(&mut body)
        .with_context(|| format!("failed to read {url}"))?;
    write(path, body).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use crate::{GeoPoint, Postcode, ADDRESS_COLUMN};

    use super::*;

    fn row(pairs: &[(&str, &str)]) -> RawRecord {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn csv_rows_become_keyed_records() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("table.csv");
        write(
            &path,
            "Full Property Address,Current Rateable Value\n10 High Street PO1 2AB,15250\n,\n",
        )
        .unwrap();

        let records = read_records(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(
            records[0].get(ADDRESS_COLUMN).map(String::as_str),
            Some("10 High Street PO1 2AB")
        );
        // blank cells still arrive, as empty strings
        assert_eq!(records[1].get(ADDRESS_COLUMN).map(String::as_str), Some(""));
    }

    #[test]
    fn enriched_data_survives_a_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("table.csv.data");
        let records = vec![EnrichedRecord {
            postcode: Postcode::new("PO1 2AB"),
            point: GeoPoint::new(50.7989, -1.0912),
            rate: 15250,
            fields: row(&[(ADDRESS_COLUMN, "10 High Street PO1 2AB")]),
        }];

        write_json(&path, &records).unwrap();
        let raw = read_to_string(&path).unwrap();
        assert!(raw.ends_with('\n'));
        // flat layout, one object per row
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value[0]["latitude"], 50.7989);
        assert_eq!(value[0][ADDRESS_COLUMN], "10 High Street PO1 2AB");

        let back = load_enriched(&path).unwrap();
        assert_eq!(back.len(), 1);
        assert_eq!(back[0].postcode, Postcode::new("PO1 2AB"));
        assert_eq!(back[0].rate, 15250);
    }

    #[test]
    fn empty_failure_set_writes_no_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("failed.csv");
        write_failures(&path, &[]).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn failed_rows_round_trip_through_csv() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("failed.csv");
        let rows = vec![
            row(&[(ADDRESS_COLUMN, "Land at rear of 12 High Street"), ("Ward", "Central")]),
            row(&[(ADDRESS_COLUMN, "The Old Mill"), ("Ward", "North")]),
        ];

        write_failures(&path, &rows).unwrap();
        let back = read_records(&path).unwrap();
        assert_eq!(back, rows);
    }

    #[test]
    fn mixed_columns_are_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("failed.csv");
        let rows = vec![
            row(&[(ADDRESS_COLUMN, "10 High Street")]),
            row(&[("Street", "High")]),
        ];
        assert!(write_failures(&path, &rows).is_err());
    }

    #[test]
    fn interrupted_download_leaves_no_file() {
        use std::io::Write;
        use std::net::TcpListener;
        use std::time::Duration;

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = std::thread::spawn(move || {
            let (mut socket, _) = listener.accept().unwrap();
            let mut request = [0_u8; 1024];
            let _ = socket.read(&mut request);
            // promise a kilobyte, deliver one line, hang up
            socket
                .write_all(
                    b"HTTP/1.1 200 OK\r\ncontent-length: 1000\r\n\r\n\
                      Full Property Address,Current Rateable Value\n",
                )
                .unwrap();
        });

        let dir = tempdir().unwrap();
        let path = dir.path().join("table.csv");
        let agent = crate::utils::agent(Duration::from_secs(5));

        let result = download(&agent, &format!("http://{addr}"), &path);
        server.join().unwrap();

        // a cut-off body is an error, not a half-written csv for the next
        // run to find
        assert!(result.is_err());
        assert!(!path.exists());
    }
}
