//! Durable Reading Log
//!
//! One append-only CSV file per route. The header is written once, when the
//! file is created (or found empty); every reading adds one row. Files are
//! never rewritten or truncated, so the log keeps the full history regardless
//! of in-memory eviction. Text fields are quoted, numbers are not.
//!
//! ```text
//! timestamp,crossing,route,traffic_min,normal_min,delay_min,traffic_level
//! "2026-10-15T17:05:00Z","san-ysidro","sy-north",17,9,8,"MODERATE"
//! ```

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use chrono::SecondsFormat;
use parking_lot::Mutex;
use serde::Serialize;

use crate::model::Reading;

/// Column names, in row order
pub const COLUMNS: [&str; 7] = [
    "timestamp",
    "crossing",
    "route",
    "traffic_min",
    "normal_min",
    "delay_min",
    "traffic_level",
];

/// Header line as written to disk
pub const HEADER: &str = "timestamp,crossing,route,traffic_min,normal_min,delay_min,traffic_level";

/// One log row, in column order
#[derive(Debug, Serialize)]
struct LogRow<'a> {
    timestamp: String,
    crossing: &'a str,
    route: &'a str,
    traffic_min: u32,
    normal_min: u32,
    delay_min: u32,
    traffic_level: &'static str,
}

impl<'a> From<&'a Reading> for LogRow<'a> {
    fn from(reading: &'a Reading) -> Self {
        Self {
            timestamp: reading.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
            crossing: reading.crossing.as_str(),
            route: reading.route.as_str(),
            traffic_min: reading.traffic_minutes,
            normal_min: reading.baseline_minutes,
            delay_min: reading.delay_minutes,
            traffic_level: reading.severity.as_str(),
        }
    }
}

/// Append-only log file for one route
#[derive(Debug)]
pub struct DurableLog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl DurableLog {
    /// Create a handle; the file itself is created on first append
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Location on disk
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one row, writing the header first if the file is new
    ///
    /// # Errors
    ///
    /// Any I/O error opening or writing the file.
    pub fn append(&self, reading: &Reading) -> io::Result<()> {
        let _guard = self.write_lock.lock();

        let file = match OpenOptions::new().create(true).append(true).open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                // Log directory vanished since startup
                if let Some(parent) = self.path.parent() {
                    fs::create_dir_all(parent)?;
                }
                OpenOptions::new().create(true).append(true).open(&self.path)?
            }
            Err(e) => return Err(e),
        };

        if file.metadata()?.len() == 0 {
            let mut header = csv::WriterBuilder::new()
                .has_headers(false)
                .from_writer(&file);
            header.write_record(COLUMNS)?;
            header.flush()?;
        }

        let mut rows = row_writer(&file);
        rows.serialize(LogRow::from(reading))?;
        rows.flush()
    }

    /// Entire file contents; empty if nothing was ever written
    ///
    /// # Errors
    ///
    /// Any I/O error other than the file not existing.
    pub fn read_all(&self) -> io::Result<Vec<u8>> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }
}

fn row_writer(file: &File) -> csv::Writer<&File> {
    csv::WriterBuilder::new()
        .has_headers(false)
        .quote_style(csv::QuoteStyle::NonNumeric)
        .from_writer(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::Severity;
    use crate::model::{CrossingId, RouteId};
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    fn reading(route: &str, traffic: u32) -> Reading {
        Reading {
            timestamp: Utc.with_ymd_and_hms(2026, 10, 15, 17, 5, 0).unwrap(),
            route: RouteId::new(route),
            crossing: CrossingId::new("san-ysidro"),
            traffic_minutes: traffic,
            baseline_minutes: 9,
            delay_minutes: traffic.saturating_sub(9),
            severity: Severity::Moderate,
            distance_km: 3.2,
            speed: None,
            weather: None,
        }
    }

    fn rows(log: &DurableLog) -> Vec<String> {
        String::from_utf8(log.read_all().unwrap())
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn test_row_layout() {
        let dir = TempDir::new().unwrap();
        let log = DurableLog::new(dir.path().join("sy-north.csv"));
        log.append(&reading("sy-north", 17)).unwrap();

        assert_eq!(
            rows(&log),
            vec![
                HEADER.to_string(),
                "\"2026-10-15T17:05:00Z\",\"san-ysidro\",\"sy-north\",17,9,8,\"MODERATE\"".to_string(),
            ]
        );
    }

    #[test]
    fn test_quotes_are_escaped() {
        let dir = TempDir::new().unwrap();
        let log = DurableLog::new(dir.path().join("lane.csv"));
        log.append(&reading("lane \"ready\", north", 17)).unwrap();

        assert!(rows(&log)[1].contains(",\"lane \"\"ready\"\", north\","));

        let bytes = log.read_all().unwrap();
        let mut reader = csv::Reader::from_reader(bytes.as_slice());
        let record = reader.records().next().unwrap().unwrap();
        assert_eq!(&record[2], "lane \"ready\", north");
        assert_eq!(&record[3], "17");
    }

    #[test]
    fn test_header_written_once() {
        let dir = TempDir::new().unwrap();
        let log = DurableLog::new(dir.path().join("sy-north.csv"));

        for traffic in [10, 12, 17] {
            log.append(&reading("sy-north", traffic)).unwrap();
        }

        let content = String::from_utf8(log.read_all().unwrap()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], HEADER);
        assert_eq!(content.matches(HEADER).count(), 1);
    }

    #[test]
    fn test_appends_to_existing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sy-north.csv");

        DurableLog::new(&path).append(&reading("sy-north", 10)).unwrap();
        // A new handle (e.g. after restart) keeps appending
        DurableLog::new(&path).append(&reading("sy-north", 11)).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 3);
    }

    #[test]
    fn test_missing_file_reads_empty() {
        let dir = TempDir::new().unwrap();
        let log = DurableLog::new(dir.path().join("never.csv"));
        assert!(log.read_all().unwrap().is_empty());
    }

    #[test]
    fn test_recreates_missing_directory() {
        let dir = TempDir::new().unwrap();
        let log = DurableLog::new(dir.path().join("nested").join("sy-north.csv"));
        log.append(&reading("sy-north", 10)).unwrap();
        assert!(log.path().exists());
    }
}
