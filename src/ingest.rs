//! # Bulk Ingestion
//!
//! Loads `Username, Artist, Track` CSV exports into the interaction store.
//! Each complete row becomes `User -LISTENED-> Song -BY-> Artist`; repeated rows
//! merge onto the same nodes and edges.
//!
//! Bad rows never abort a load. Rows missing a field are dropped and counted;
//! rows that fail to parse or to write are reported individually.

use crate::error::{RecommendError, Result};
use crate::model::{ArtistId, Listen, SongId, UserId};
use crate::store::InteractionStore;
use csv::{ReaderBuilder, StringRecord, Trim};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Rows per store transaction.
pub const INGEST_BATCH_SIZE: usize = 512;

const REQUIRED_COLUMNS: [&str; 3] = ["Username", "Artist", "Track"];

/// One raw CSV row before normalisation.
#[derive(Debug, Deserialize)]
pub struct ListenRecord {
    #[serde(rename = "Username")]
    pub username: Option<String>,
    #[serde(rename = "Artist")]
    pub artist: Option<String>,
    #[serde(rename = "Track")]
    pub track: Option<String>,
}

impl ListenRecord {
    /// `None` when any field is missing or blank.
    fn into_listen(self) -> Option<Listen> {
        Some(Listen {
            user: UserId::new(self.username.as_deref()?).ok()?,
            artist: ArtistId::new(self.artist.as_deref()?).ok()?,
            song: SongId::new(self.track.as_deref()?).ok()?,
        })
    }
}

/// A row that could not be loaded. `row` is the 1-based data row (header excluded).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestionRowError {
    pub row: u64,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub rows_read: u64,
    pub ingested: u64,
    pub dropped_incomplete: u64,
    pub failed: Vec<IngestionRowError>,
}

impl IngestReport {
    fn fail(&mut self, row: u64, reason: String) {
        warn!("Skipping row {row}: {reason}");
        self.failed.push(IngestionRowError { row, reason });
    }
}

pub fn ingest_csv<S: InteractionStore + ?Sized>(store: &mut S, path: &Path) -> Result<IngestReport> {
    info!("Ingesting listens from {}", path.display());
    let file = File::open(path)?;
    ingest_reader(store, file)
}

/// Reads CSV from any source.
///
/// # Errors
///
/// Fails on a missing required column, an I/O error while reading, or a store
/// failure that is not tied to a single row.
pub fn ingest_reader<S, R>(store: &mut S, source: R) -> Result<IngestReport>
where
    S: InteractionStore + ?Sized,
    R: Read,
{
    let mut reader = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .from_reader(source);
    let headers = reader.headers()?.clone();
    check_headers(&headers)?;

    let mut report = IngestReport::default();
    let mut batch: Vec<(u64, Listen)> = Vec::with_capacity(INGEST_BATCH_SIZE);
    let mut record = StringRecord::new();
    let mut row = 0;

    loop {
        row += 1;
        match reader.read_record(&mut record) {
            Ok(false) => break,
            Ok(true) => {}
            Err(e) if e.is_io_error() => return Err(e.into()),
            Err(e) => {
                report.rows_read += 1;
                report.fail(row, e.to_string());
                continue;
            }
        }
        report.rows_read += 1;

        let parsed: ListenRecord = match record.deserialize(Some(&headers)) {
            Ok(parsed) => parsed,
            Err(e) => {
                report.fail(row, e.to_string());
                continue;
            }
        };
        match parsed.into_listen() {
            Some(listen) => batch.push((row, listen)),
            None => report.dropped_incomplete += 1,
        }

        if batch.len() >= INGEST_BATCH_SIZE {
            flush(store, &mut batch, &mut report)?;
        }
    }
    flush(store, &mut batch, &mut report)?;

    info!(
        "Ingested {} of {} rows ({} incomplete, {} failed)",
        report.ingested,
        report.rows_read,
        report.dropped_incomplete,
        report.failed.len()
    );
    Ok(report)
}

fn check_headers(headers: &StringRecord) -> Result<()> {
    for column in REQUIRED_COLUMNS {
        if !headers.iter().any(|h| h == column) {
            return Err(RecommendError::invalid(format!(
                "CSV is missing required column `{column}`"
            )));
        }
    }
    Ok(())
}

fn flush<S: InteractionStore + ?Sized>(
    store: &mut S,
    batch: &mut Vec<(u64, Listen)>,
    report: &mut IngestReport,
) -> Result<()> {
    if batch.is_empty() {
        return Ok(());
    }
    let listens: Vec<Listen> = batch.iter().map(|(_, listen)| listen.clone()).collect();
    let outcomes = store.record_listens(&listens)?;
    for ((row, _), outcome) in batch.drain(..).zip(outcomes) {
        match outcome {
            Ok(()) => report.ingested += 1,
            Err(e) => report.fail(row, e.to_string()),
        }
    }
    debug!("Flushed batch, {} rows ingested so far", report.ingested);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Relation;
    use crate::store::SqliteStore;

    fn ingest(raw: &str) -> (SqliteStore, IngestReport) {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let report = ingest_reader(&mut store, raw.as_bytes()).unwrap();
        (store, report)
    }

    #[test]
    fn test_rows_are_normalised_and_merged() {
        let (store, report) = ingest(
            "Username,Artist,Track\n\
             Alice,Radiohead,Creep\n\
             \x20ALICE , radiohead,  CREEP\n\
             bob,Portishead,Roads\n",
        );
        assert_eq!(report.rows_read, 3);
        assert_eq!(report.ingested, 3);
        assert!(report.failed.is_empty());

        let stats = store.stats().unwrap();
        assert_eq!(stats.users, 2);
        assert_eq!(stats.songs, 2);
        assert_eq!(stats.listened, 2);

        let alice = UserId::new("alice").unwrap();
        let songs = store.songs_for(&alice, Relation::Listened).unwrap();
        assert!(songs.contains(&SongId::new("creep").unwrap()));
    }

    #[test]
    fn test_incomplete_rows_are_dropped() {
        let (store, report) = ingest(
            "Username,Artist,Track\n\
             alice,,creep\n\
             ,radiohead,creep\n\
             alice,radiohead\n\
             alice,radiohead,   \n\
             bob,portishead,roads\n",
        );
        assert_eq!(report.rows_read, 5);
        assert_eq!(report.dropped_incomplete, 4);
        assert_eq!(report.ingested, 1);
        assert_eq!(store.stats().unwrap().users, 1);
    }

    #[test]
    fn test_column_order_and_extra_columns_are_ignored() {
        let (store, report) = ingest("Track,Plays,Username,Artist\nroads,12,bob,portishead\n");
        assert_eq!(report.ingested, 1);
        let bob = UserId::new("bob").unwrap();
        assert!(store
            .songs_for(&bob, Relation::Listened)
            .unwrap()
            .contains(&SongId::new("roads").unwrap()));
    }

    #[test]
    fn test_missing_column_is_rejected() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let err = ingest_reader(&mut store, "Username,Artist\nalice,radiohead\n".as_bytes()).unwrap_err();
        assert!(matches!(err, RecommendError::InvalidArgument(_)));
    }

    #[test]
    fn test_invalid_utf8_row_is_reported_not_fatal() {
        let mut raw = b"Username,Artist,Track\nalice,radiohead,creep\n".to_vec();
        raw.extend_from_slice(b"bob,\xff\xfe,roads\n");
        raw.extend_from_slice(b"carol,portishead,roads\n");
        let mut store = SqliteStore::open_in_memory().unwrap();
        let report = ingest_reader(&mut store, raw.as_slice()).unwrap();
        assert_eq!(report.ingested, 2);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].row, 2);
    }

    #[test]
    fn test_batches_larger_than_one_transaction() {
        let mut raw = String::from("Username,Artist,Track\n");
        for i in 0..(INGEST_BATCH_SIZE + 10) {
            raw.push_str(&format!("user{},artist,song{}\n", i % 7, i));
        }
        let (store, report) = ingest(&raw);
        assert_eq!(report.ingested as usize, INGEST_BATCH_SIZE + 10);
        assert_eq!(store.stats().unwrap().listened, INGEST_BATCH_SIZE + 10);
    }
}
