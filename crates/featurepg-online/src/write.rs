//! Write path: flatten records into rows and upsert them in batches
//!
//! Every (entity key, feature name) pair becomes one stored row. Rows are
//! written in fixed-size batches, one multi-row `INSERT ... ON CONFLICT`
//! statement per batch, and the caller's progress callback fires after each
//! batch commits.

use crate::connection::pg_error;
use crate::sql::{self, TableId, PARAMS_PER_ROW};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use featurepg_core::{serialize_entity_key, serialize_value, OnlineWriteRecord, Progress, Result};
use std::future::Future;
use tokio_postgres::types::ToSql;
use tokio_postgres::Client;

/// Rows per upsert statement
pub const DEFAULT_BATCH_SIZE: usize = 5000;

/// One physical row, ready to bind
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRow {
    pub entity_key: Vec<u8>,
    pub feature_name: String,
    pub value: Vec<u8>,
    /// Naive UTC
    pub event_ts: NaiveDateTime,
    /// Naive UTC
    pub created_ts: Option<NaiveDateTime>,
}

/// Serializes records and flattens them to one row per feature
///
/// Timestamps are normalized to naive UTC here. Record order is preserved;
/// within a record, rows are ordered by feature name.
pub fn flatten_records(records: &[OnlineWriteRecord]) -> Result<Vec<StoredRow>> {
    let mut rows = Vec::with_capacity(records.iter().map(|r| r.values.len()).sum());

    for record in records {
        let entity_key = serialize_entity_key(&record.entity_key)?;
        let event_ts = record.event_ts.to_naive_utc();
        let created_ts = record.created_ts.map(|ts| ts.to_naive_utc());

        let mut features: Vec<_> = record.values.iter().collect();
        features.sort_by(|a, b| a.0.cmp(b.0));

        for (feature_name, value) in features {
            rows.push(StoredRow {
                entity_key: entity_key.clone(),
                feature_name: feature_name.clone(),
                value: serialize_value(value)?,
                event_ts,
                created_ts,
            });
        }
    }

    Ok(rows)
}

/// Runs `execute` once per batch, reporting each completed batch
///
/// Stops at the first failing batch: earlier batches stay written and are
/// already reported, later batches are never attempted. Returns the number
/// of batches written.
pub async fn write_in_batches<'a, F, Fut>(
    rows: &'a [StoredRow],
    batch_size: usize,
    mut execute: F,
    mut progress: Option<Progress<'_>>,
) -> Result<usize>
where
    F: FnMut(&'a [StoredRow]) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let mut batches = 0;
    for batch in rows.chunks(batch_size.max(1)) {
        execute(batch).await?;
        batches += 1;

        if let Some(progress) = progress.as_deref_mut() {
            progress(batch.len());
        }
    }
    Ok(batches)
}

/// Upserts one batch with a single statement
pub async fn upsert_batch(client: &Client, table: &TableId, batch: &[StoredRow]) -> Result<()> {
    let timestamps: Vec<(DateTime<Utc>, Option<DateTime<Utc>>)> = batch
        .iter()
        .map(|row| {
            (
                Utc.from_utc_datetime(&row.event_ts),
                row.created_ts.map(|ts| Utc.from_utc_datetime(&ts)),
            )
        })
        .collect();

    let mut params: Vec<&(dyn ToSql + Sync)> = Vec::with_capacity(batch.len() * PARAMS_PER_ROW);
    for (row, (event_ts, created_ts)) in batch.iter().zip(&timestamps) {
        params.push(&row.entity_key);
        params.push(&row.feature_name);
        params.push(&row.value);
        params.push(event_ts);
        params.push(created_ts);
    }

    let statement = sql::upsert(table, batch.len());
    client
        .execute(statement.as_str(), &params)
        .await
        .map_err(|e| pg_error(&format!("upsert into {}", table), e))?;

    Ok(())
}
