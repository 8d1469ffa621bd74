//! Parquet encoding/decoding for lake artifacts.
//!
//! This module defines the canonical Parquet schemas for the three artifact
//! kinds:
//! - `metadata.parquet` (metadata table rows)
//! - `transcripts.parquet` (intermediate transcript rows)
//! - `analysis.parquet` (text-analysis table rows)
//!
//! The schemas here are the contract for the external SQL engine and the
//! catalog table definitions. Keep changes backwards-compatible.

use std::sync::Arc;

use arrow::array::{Array, ArrayRef, Int64Array, Int64Builder, ListArray, ListBuilder, StringArray, StringBuilder};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use bytes::Bytes;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;

use trendlake_core::error::{Error, Result};
use trendlake_core::records::{AnalysisRecord, TranscriptRecord, VideoRecord};
use trendlake_core::VideoId;

fn string_list_field(name: &str) -> Field {
    Field::new(
        name,
        DataType::List(Arc::new(Field::new("item", DataType::Utf8, true))),
        false,
    )
}

/// Arrow schema for metadata artifacts.
#[must_use]
pub fn metadata_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new("title", DataType::Utf8, true),
        Field::new("description", DataType::Utf8, true),
        Field::new("upload_date", DataType::Int64, false),
        Field::new("like_count", DataType::Int64, false),
        Field::new("repost_count", DataType::Int64, false),
        Field::new("comment_count", DataType::Int64, false),
        Field::new("view_count", DataType::Int64, false),
        Field::new("duration", DataType::Int64, false),
        Field::new("webpage_url", DataType::Utf8, false),
        Field::new("channel", DataType::Utf8, true),
        Field::new("timestamp", DataType::Int64, false),
        Field::new("track", DataType::Utf8, true),
        string_list_field("artists"),
        Field::new("artist", DataType::Utf8, true),
        Field::new("uploader", DataType::Utf8, true),
    ]))
}

/// Arrow schema for transcript artifacts.
#[must_use]
pub fn transcripts_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new("title", DataType::Utf8, true),
        Field::new("description", DataType::Utf8, true),
        Field::new("transcript", DataType::Utf8, true),
    ]))
}

/// Arrow schema for text-analysis artifacts.
#[must_use]
pub fn analysis_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new("uploader", DataType::Utf8, true),
        Field::new("description", DataType::Utf8, true),
        Field::new("title", DataType::Utf8, true),
        Field::new("transcript", DataType::Utf8, false),
        Field::new("language", DataType::Utf8, false),
        Field::new("category", DataType::Utf8, false),
        Field::new("summary", DataType::Utf8, false),
        string_list_field("keywords"),
    ]))
}

fn string_column<'a>(values: impl Iterator<Item = Option<&'a str>>) -> ArrayRef {
    let mut builder = StringBuilder::new();
    for value in values {
        builder.append_option(value);
    }
    Arc::new(builder.finish())
}

fn int64_column(values: impl Iterator<Item = i64>) -> ArrayRef {
    let mut builder = Int64Builder::new();
    for value in values {
        builder.append_value(value);
    }
    Arc::new(builder.finish())
}

fn string_list_column<'a>(values: impl Iterator<Item = &'a [String]>) -> ArrayRef {
    let mut builder = ListBuilder::new(StringBuilder::new());
    for list in values {
        for item in list {
            builder.values().append_value(item);
        }
        builder.append(true);
    }
    Arc::new(builder.finish())
}

fn write_batch(batch: &RecordBatch) -> Result<Bytes> {
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();
    let mut buffer = Vec::new();
    let mut writer = ArrowWriter::try_new(&mut buffer, batch.schema(), Some(props))
        .map_err(|e| Error::serialization(format!("failed to open parquet writer: {e}")))?;
    writer
        .write(batch)
        .map_err(|e| Error::serialization(format!("failed to write parquet batch: {e}")))?;
    writer
        .close()
        .map_err(|e| Error::serialization(format!("failed to finalize parquet file: {e}")))?;
    Ok(Bytes::from(buffer))
}

fn read_batches(bytes: Bytes) -> Result<Vec<RecordBatch>> {
    let reader = ParquetRecordBatchReaderBuilder::try_new(bytes)
        .map_err(|e| Error::serialization(format!("failed to open parquet file: {e}")))?
        .build()
        .map_err(|e| Error::serialization(format!("failed to build parquet reader: {e}")))?;
    reader
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::serialization(format!("failed to read parquet batches: {e}")))
}

fn strings(batch: &RecordBatch, name: &str) -> Result<StringArray> {
    let column = batch
        .column_by_name(name)
        .ok_or_else(|| Error::serialization(format!("missing column '{name}'")))?;
    column
        .as_any()
        .downcast_ref::<StringArray>()
        .cloned()
        .ok_or_else(|| Error::serialization(format!("column '{name}' is not utf8")))
}

fn int64s(batch: &RecordBatch, name: &str) -> Result<Int64Array> {
    let column = batch
        .column_by_name(name)
        .ok_or_else(|| Error::serialization(format!("missing column '{name}'")))?;
    column
        .as_any()
        .downcast_ref::<Int64Array>()
        .cloned()
        .ok_or_else(|| Error::serialization(format!("column '{name}' is not int64")))
}

fn string_lists(batch: &RecordBatch, name: &str) -> Result<ListArray> {
    let column = batch
        .column_by_name(name)
        .ok_or_else(|| Error::serialization(format!("missing column '{name}'")))?;
    column
        .as_any()
        .downcast_ref::<ListArray>()
        .cloned()
        .ok_or_else(|| Error::serialization(format!("column '{name}' is not a list")))
}

fn list_at(lists: &ListArray, row: usize) -> Result<Vec<String>> {
    let values = lists.value(row);
    let values = values
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| Error::serialization("list items are not utf8".to_string()))?;
    Ok((0..values.len())
        .map(|i| values.value(i).to_string())
        .collect())
}

fn opt(array: &StringArray, row: usize) -> Option<String> {
    if array.is_null(row) {
        None
    } else {
        Some(array.value(row).to_string())
    }
}

fn required(array: &StringArray, row: usize, name: &str) -> Result<String> {
    if array.is_null(row) {
        return Err(Error::serialization(format!(
            "unexpected null in column '{name}' at row {row}"
        )));
    }
    Ok(array.value(row).to_string())
}

fn video_id(array: &StringArray, row: usize) -> Result<VideoId> {
    VideoId::new(required(array, row, "id")?)
        .map_err(|e| Error::serialization(format!("invalid video ID at row {row}: {e}")))
}

/// Encodes metadata rows to a Parquet payload.
///
/// # Errors
///
/// Returns [`Error::Serialization`] if encoding fails.
pub fn encode_metadata(rows: &[VideoRecord]) -> Result<Bytes> {
    let batch = RecordBatch::try_new(
        metadata_schema(),
        vec![
            string_column(rows.iter().map(|r| Some(r.id.as_str()))),
            string_column(rows.iter().map(|r| r.title.as_deref())),
            string_column(rows.iter().map(|r| r.description.as_deref())),
            int64_column(rows.iter().map(|r| r.upload_date)),
            int64_column(rows.iter().map(|r| r.like_count)),
            int64_column(rows.iter().map(|r| r.repost_count)),
            int64_column(rows.iter().map(|r| r.comment_count)),
            int64_column(rows.iter().map(|r| r.view_count)),
            int64_column(rows.iter().map(|r| r.duration)),
            string_column(rows.iter().map(|r| Some(r.webpage_url.as_str()))),
            string_column(rows.iter().map(|r| r.channel.as_deref())),
            int64_column(rows.iter().map(|r| r.timestamp)),
            string_column(rows.iter().map(|r| r.track.as_deref())),
            string_list_column(rows.iter().map(|r| r.artists.as_slice())),
            string_column(rows.iter().map(|r| r.artist.as_deref())),
            string_column(rows.iter().map(|r| r.uploader.as_deref())),
        ],
    )
    .map_err(|e| Error::serialization(format!("failed to build metadata batch: {e}")))?;
    write_batch(&batch)
}

/// Decodes metadata rows from a Parquet payload.
///
/// # Errors
///
/// Returns [`Error::Serialization`] if the payload does not carry the
/// metadata schema.
pub fn decode_metadata(bytes: Bytes) -> Result<Vec<VideoRecord>> {
    let mut rows = Vec::new();
    for batch in read_batches(bytes)? {
        let ids = strings(&batch, "id")?;
        let titles = strings(&batch, "title")?;
        let descriptions = strings(&batch, "description")?;
        let upload_dates = int64s(&batch, "upload_date")?;
        let like_counts = int64s(&batch, "like_count")?;
        let repost_counts = int64s(&batch, "repost_count")?;
        let comment_counts = int64s(&batch, "comment_count")?;
        let view_counts = int64s(&batch, "view_count")?;
        let durations = int64s(&batch, "duration")?;
        let webpage_urls = strings(&batch, "webpage_url")?;
        let channels = strings(&batch, "channel")?;
        let timestamps = int64s(&batch, "timestamp")?;
        let tracks = strings(&batch, "track")?;
        let artists = string_lists(&batch, "artists")?;
        let artist = strings(&batch, "artist")?;
        let uploaders = strings(&batch, "uploader")?;

        for row in 0..batch.num_rows() {
            rows.push(VideoRecord {
                id: video_id(&ids, row)?,
                title: opt(&titles, row),
                description: opt(&descriptions, row),
                upload_date: upload_dates.value(row),
                like_count: like_counts.value(row),
                repost_count: repost_counts.value(row),
                comment_count: comment_counts.value(row),
                view_count: view_counts.value(row),
                duration: durations.value(row),
                webpage_url: required(&webpage_urls, row, "webpage_url")?,
                channel: opt(&channels, row),
                timestamp: timestamps.value(row),
                track: opt(&tracks, row),
                artists: list_at(&artists, row)?,
                artist: opt(&artist, row),
                uploader: opt(&uploaders, row),
            });
        }
    }
    Ok(rows)
}

/// Encodes transcript rows to a Parquet payload.
///
/// # Errors
///
/// Returns [`Error::Serialization`] if encoding fails.
pub fn encode_transcripts(rows: &[TranscriptRecord]) -> Result<Bytes> {
    let batch = RecordBatch::try_new(
        transcripts_schema(),
        vec![
            string_column(rows.iter().map(|r| Some(r.id.as_str()))),
            string_column(rows.iter().map(|r| r.title.as_deref())),
            string_column(rows.iter().map(|r| r.description.as_deref())),
            string_column(rows.iter().map(|r| r.transcript.as_deref())),
        ],
    )
    .map_err(|e| Error::serialization(format!("failed to build transcripts batch: {e}")))?;
    write_batch(&batch)
}

/// Decodes transcript rows from a Parquet payload.
///
/// # Errors
///
/// Returns [`Error::Serialization`] if the payload does not carry the
/// transcript schema.
pub fn decode_transcripts(bytes: Bytes) -> Result<Vec<TranscriptRecord>> {
    let mut rows = Vec::new();
    for batch in read_batches(bytes)? {
        let ids = strings(&batch, "id")?;
        let titles = strings(&batch, "title")?;
        let descriptions = strings(&batch, "description")?;
        let transcripts = strings(&batch, "transcript")?;

        for row in 0..batch.num_rows() {
            rows.push(TranscriptRecord {
                id: video_id(&ids, row)?,
                title: opt(&titles, row),
                description: opt(&descriptions, row),
                transcript: opt(&transcripts, row),
            });
        }
    }
    Ok(rows)
}

/// Encodes text-analysis rows to a Parquet payload.
///
/// # Errors
///
/// Returns [`Error::Serialization`] if encoding fails.
pub fn encode_analysis(rows: &[AnalysisRecord]) -> Result<Bytes> {
    let batch = RecordBatch::try_new(
        analysis_schema(),
        vec![
            string_column(rows.iter().map(|r| Some(r.id.as_str()))),
            string_column(rows.iter().map(|r| r.uploader.as_deref())),
            string_column(rows.iter().map(|r| r.description.as_deref())),
            string_column(rows.iter().map(|r| r.title.as_deref())),
            string_column(rows.iter().map(|r| Some(r.transcript.as_str()))),
            string_column(rows.iter().map(|r| Some(r.language.as_str()))),
            string_column(rows.iter().map(|r| Some(r.category.as_str()))),
            string_column(rows.iter().map(|r| Some(r.summary.as_str()))),
            string_list_column(rows.iter().map(|r| r.keywords.as_slice())),
        ],
    )
    .map_err(|e| Error::serialization(format!("failed to build analysis batch: {e}")))?;
    write_batch(&batch)
}

/// Decodes text-analysis rows from a Parquet payload.
///
/// # Errors
///
/// Returns [`Error::Serialization`] if the payload does not carry the
/// analysis schema.
pub fn decode_analysis(bytes: Bytes) -> Result<Vec<AnalysisRecord>> {
    let mut rows = Vec::new();
    for batch in read_batches(bytes)? {
        let ids = strings(&batch, "id")?;
        let uploaders = strings(&batch, "uploader")?;
        let descriptions = strings(&batch, "description")?;
        let titles = strings(&batch, "title")?;
        let transcripts = strings(&batch, "transcript")?;
        let languages = strings(&batch, "language")?;
        let categories = strings(&batch, "category")?;
        let summaries = strings(&batch, "summary")?;
        let keywords = string_lists(&batch, "keywords")?;

        for row in 0..batch.num_rows() {
            rows.push(AnalysisRecord {
                id: video_id(&ids, row)?,
                uploader: opt(&uploaders, row),
                description: opt(&descriptions, row),
                title: opt(&titles, row),
                transcript: required(&transcripts, row, "transcript")?,
                language: required(&languages, row, "language")?,
                category: required(&categories, row, "category")?,
                summary: required(&summaries, row, "summary")?,
                keywords: list_at(&keywords, row)?,
            });
        }
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_video(id: &str) -> VideoRecord {
        VideoRecord {
            id: VideoId::new(id).unwrap(),
            title: Some("title".into()),
            description: None,
            upload_date: 1_739_092_948_000,
            like_count: 10,
            repost_count: 2,
            comment_count: 3,
            view_count: 500,
            duration: 30,
            webpage_url: format!("https://example.com/v/{id}"),
            channel: Some("alice".into()),
            timestamp: 1_739_092_948,
            track: None,
            artists: vec!["alice".into(), "bob".into()],
            artist: Some("alice".into()),
            uploader: Some("alice".into()),
        }
    }

    #[test]
    fn metadata_roundtrip() {
        let rows = vec![sample_video("v1"), sample_video("v2")];
        let bytes = encode_metadata(&rows).expect("encode");
        let decoded = decode_metadata(bytes).expect("decode");
        assert_eq!(decoded, rows);
    }

    #[test]
    fn empty_artifact_still_carries_schema() {
        let bytes = encode_transcripts(&[]).expect("encode empty");
        let decoded = decode_transcripts(bytes).expect("decode empty");
        assert!(decoded.is_empty());
    }

    #[test]
    fn analysis_keywords_survive() {
        let rows = vec![AnalysisRecord {
            id: VideoId::new("v1").unwrap(),
            uploader: Some("alice".into()),
            description: None,
            title: Some("t".into()),
            transcript: "hello world".into(),
            language: "english".into(),
            category: "Comedy/Skits".into(),
            summary: "a short skit".into(),
            keywords: vec![
                "skit".into(),
                "comedy".into(),
                "funny".into(),
                "viral".into(),
                "trend".into(),
            ],
        }];
        let bytes = encode_analysis(&rows).expect("encode");
        let decoded = decode_analysis(bytes).expect("decode");
        assert_eq!(decoded, rows);
        assert_eq!(decoded[0].keywords.len(), 5);
    }

    #[test]
    fn decode_rejects_wrong_schema() {
        let bytes = encode_transcripts(&[]).expect("encode");
        let result = decode_metadata(bytes);
        assert!(result.is_err());
    }
}
