//! Read path: one set-membership query, then reconcile rows with the request
//!
//! PostgreSQL returns rows in no particular order, so rows are grouped by
//! their raw key bytes once per read and every requested key is resolved
//! against that map in request order.

use crate::connection::pg_error;
use crate::sql::{self, TableId};
use chrono::{DateTime, NaiveDateTime, Utc};
use featurepg_core::{deserialize_value, OnlineReadResult, Result};
use std::collections::HashMap;
use tokio_postgres::{Client, Row};

/// A stored row as returned by the lookup query
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedRow {
    pub entity_key: Vec<u8>,
    pub feature_name: String,
    pub value: Vec<u8>,
    pub event_ts: Option<NaiveDateTime>,
}

/// Feature rows stored under one entity key
pub type RowGroup = Vec<(String, Vec<u8>, Option<NaiveDateTime>)>;

/// Fetches every row whose entity key is in `keys`
pub async fn fetch_rows(client: &Client, table: &TableId, keys: &[Vec<u8>]) -> Result<Vec<FetchedRow>> {
    let statement = sql::select_by_keys(table);
    let rows = client
        .query(statement.as_str(), &[&keys])
        .await
        .map_err(|e| pg_error(&format!("read from {}", table), e))?;

    rows.iter().map(|row| decode_row(row, table)).collect()
}

fn decode_row(row: &Row, table: &TableId) -> Result<FetchedRow> {
    let decode_err = |e| pg_error(&format!("decode row from {}", table), e);

    let event_ts: Option<DateTime<Utc>> = row.try_get(3).map_err(decode_err)?;
    Ok(FetchedRow {
        entity_key: row.try_get(0).map_err(decode_err)?,
        feature_name: row.try_get(1).map_err(decode_err)?,
        value: row.try_get(2).map_err(decode_err)?,
        event_ts: event_ts.map(|ts| ts.naive_utc()),
    })
}

/// Groups fetched rows by raw entity key bytes
pub fn group_rows(rows: Vec<FetchedRow>) -> HashMap<Vec<u8>, RowGroup> {
    let mut groups: HashMap<Vec<u8>, RowGroup> = HashMap::new();
    for row in rows {
        groups
            .entry(row.entity_key)
            .or_default()
            .push((row.feature_name, row.value, row.event_ts));
    }
    groups
}

/// Resolves each requested key, in order, against the grouped rows
///
/// Keys without rows yield [`OnlineReadResult::absent`]. A repeated key is
/// decoded once and its result cloned into every position it occupies.
pub fn reconcile(keys: &[Vec<u8>], groups: &HashMap<Vec<u8>, RowGroup>) -> Result<Vec<OnlineReadResult>> {
    let mut decoded: HashMap<&[u8], OnlineReadResult> = HashMap::new();
    let mut results = Vec::with_capacity(keys.len());

    for key in keys {
        if let Some(result) = decoded.get(key.as_slice()) {
            results.push(result.clone());
            continue;
        }

        let result = match groups.get(key) {
            Some(group) => decode_group(group)?,
            None => OnlineReadResult::absent(),
        };
        decoded.insert(key.as_slice(), result.clone());
        results.push(result);
    }

    Ok(results)
}

fn decode_group(group: &RowGroup) -> Result<OnlineReadResult> {
    let mut features = HashMap::with_capacity(group.len());
    let mut latest: Option<NaiveDateTime> = None;

    for (feature_name, value, event_ts) in group {
        features.insert(feature_name.clone(), deserialize_value(value)?);
        latest = latest.max(*event_ts);
    }

    Ok(OnlineReadResult {
        event_ts: latest,
        features: Some(features),
    })
}
