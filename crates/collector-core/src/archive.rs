//! Batch archiving.
//!
//! Serializes a batch into a single ZIP container, one deflate entry per
//! message in arrival order. Entry names are the broker-assigned publish
//! timestamps; entry bodies are the raw payloads, verbatim.

use crate::error::{CollectorError, Result};
use crate::message::{Batch, InboundMessage};
use bytes::Bytes;
use chrono::SecondsFormat;
use std::io::{Cursor, Write};
use tracing::warn;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Serialize a batch into a self-describing ZIP archive.
///
/// Deterministic given the batch's messages and their timestamps. A message
/// without timestamp metadata still contributes an entry under a
/// sequence-derived name rather than failing the whole batch.
pub fn archive_batch(batch: &Batch) -> Result<Bytes> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for (index, message) in batch.iter().enumerate() {
        writer
            .start_file(entry_name(message, index), options)
            .map_err(|e| CollectorError::archive_with_source("failed to create archive entry", e))?;
        writer
            .write_all(&message.payload)
            .map_err(|e| CollectorError::archive_with_source("failed to write archive entry", e))?;
    }

    let cursor = writer
        .finish()
        .map_err(|e| CollectorError::archive_with_source("failed to finalize archive", e))?;
    Ok(Bytes::from(cursor.into_inner()))
}

// index keeps placeholder names unique even when several metadata-less
// messages share a fallback sequence
fn entry_name(message: &InboundMessage, index: usize) -> String {
    match message.published {
        Some(ts) => ts.to_rfc3339_opts(SecondsFormat::Nanos, true),
        None => {
            warn!(
                sequence = message.stream_sequence,
                index, "message has no publish timestamp, naming archive entry by sequence"
            );
            format!("seq-{}-{}", message.stream_sequence, index)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::RecordingAcker;
    use chrono::{DateTime, Utc};
    use std::io::Read;
    use std::sync::Arc;
    use zip::ZipArchive;

    fn message(seq: u64, published: Option<DateTime<Utc>>, payload: &str) -> InboundMessage {
        InboundMessage::new(
            Bytes::from(payload.to_string()),
            seq,
            published,
            Arc::new(RecordingAcker::new()),
        )
    }

    fn entries(archive: Bytes) -> Vec<(String, Vec<u8>)> {
        let mut zip = ZipArchive::new(Cursor::new(archive.to_vec())).unwrap();
        let mut out = Vec::new();
        for i in 0..zip.len() {
            let mut file = zip.by_index(i).unwrap();
            let mut body = Vec::new();
            file.read_to_end(&mut body).unwrap();
            out.push((file.name().to_string(), body));
        }
        out
    }

    #[test]
    fn archive_round_trips_one_entry_per_message() {
        let mut batch = Batch::with_capacity(3);
        let base = DateTime::parse_from_rfc3339("2024-03-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        batch.push(message(1, Some(base), "MSH|^~\\&|first"));
        batch.push(message(
            2,
            Some(base + chrono::Duration::seconds(1)),
            "MSH|^~\\&|second",
        ));
        batch.push(message(
            3,
            Some(base + chrono::Duration::seconds(2)),
            "MSH|^~\\&|third",
        ));

        let archived = archive_batch(&batch).unwrap();
        let entries = entries(archived);

        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].1, b"MSH|^~\\&|first");
        assert_eq!(entries[1].1, b"MSH|^~\\&|second");
        assert_eq!(entries[2].1, b"MSH|^~\\&|third");
        assert!(entries[0].0.starts_with("2024-03-01T12:00:00"));
        assert!(entries[1].0.starts_with("2024-03-01T12:00:01"));
    }

    #[test]
    fn missing_timestamp_falls_back_to_sequence_name() {
        let mut batch = Batch::with_capacity(2);
        batch.push(message(7, None, "no metadata"));
        batch.push(message(8, Some(Utc::now()), "with metadata"));

        let archived = archive_batch(&batch).unwrap();
        let entries = entries(archived);

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].0, "seq-7-0");
        assert_eq!(entries[0].1, b"no metadata");
    }

    #[test]
    fn metadata_less_messages_get_distinct_entry_names() {
        let mut batch = Batch::with_capacity(2);
        batch.push(message(0, None, "first"));
        batch.push(message(0, None, "second"));

        let archived = archive_batch(&batch).unwrap();
        let entries = entries(archived);

        assert_eq!(entries.len(), 2);
        assert_ne!(entries[0].0, entries[1].0);
        assert_eq!(entries[0].1, b"first");
        assert_eq!(entries[1].1, b"second");
    }

    #[test]
    fn single_message_batch_archives() {
        let mut batch = Batch::with_capacity(1);
        batch.push(message(42, Some(Utc::now()), "lonely"));

        let archived = archive_batch(&batch).unwrap();
        let entries = entries(archived);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].1, b"lonely");
    }
}
