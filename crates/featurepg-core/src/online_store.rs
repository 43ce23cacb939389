//! Online store trait for low-latency feature serving
//!
//! An online store persists only the latest value of each
//! (entity key, feature name) pair and serves multi-key point reads. Schema
//! lifecycle calls (`update`, `teardown`) are issued by a provisioning flow
//! before any traffic reaches the store.
//!
//! ## Key Design Decisions
//!
//! 1. **Simple key-value model**: serialized entity key + feature name → value
//! 2. **Only latest values**: writes are upserts, no history is kept
//! 3. **Order-preserving reads**: one result per requested key, in request order
//! 4. **Sequential use**: methods take `&mut self`; one instance serves one
//!    caller at a time over a single connection
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! use featurepg_core::{EntityKey, FeatureView, OnlineStore};
//!
//! async fn serve<S: OnlineStore>(store: &mut S, config: &S::Config) -> featurepg_core::Result<()> {
//!     let view = FeatureView::new("driver_hourly_stats");
//!     let keys = vec![EntityKey::new("driver_id", 1001_i64)];
//!     let rows = store.online_read(config, &view, &keys, None).await?;
//!     assert_eq!(rows.len(), keys.len());
//!     Ok(())
//! }
//! ```

use crate::{Entity, EntityKey, Error, FeatureView, OnlineReadResult, OnlineWriteRecord, Result};
use async_trait::async_trait;

/// Progress callback invoked with the number of rows in each committed batch
pub type Progress<'a> = &'a mut (dyn FnMut(usize) + Send);

/// Outcome of a best-effort teardown
///
/// Teardown never fails its caller; a failure is reported here so callers can
/// inspect it if they choose.
#[derive(Debug)]
#[must_use = "teardown failures are only reported through this status"]
pub enum TeardownStatus {
    /// The schema and everything in it was dropped
    Completed,
    /// Dropping failed; the error has already been logged
    Failed(Error),
}

impl TeardownStatus {
    pub fn is_completed(&self) -> bool {
        matches!(self, TeardownStatus::Completed)
    }

    /// Converts into a `Result` for callers that do want to propagate
    pub fn into_result(self) -> Result<()> {
        match self {
            TeardownStatus::Completed => Ok(()),
            TeardownStatus::Failed(err) => Err(err),
        }
    }
}

/// Trait for online feature stores
///
/// `Config` is the store-specific configuration object; it also carries the
/// project name that namespaces physical tables.
#[async_trait]
pub trait OnlineStore: Send {
    type Config: Send + Sync;

    /// Write feature values (upsert semantics)
    ///
    /// Each record is flattened into one row per feature name. Rows are
    /// written in batches; `progress` is called once per committed batch with
    /// that batch's row count.
    ///
    /// # Semantics
    ///
    /// - Upsert: an existing (entity key, feature name) is overwritten
    /// - Atomic per batch, not across batches: a failure leaves earlier
    ///   batches committed and never attempts later ones
    async fn online_write_batch(
        &mut self,
        config: &Self::Config,
        table: &FeatureView,
        data: Vec<OnlineWriteRecord>,
        progress: Option<Progress<'_>>,
    ) -> Result<()>;

    /// Read the stored features for each entity key
    ///
    /// # Returns
    ///
    /// Exactly one [`OnlineReadResult`] per requested key, in request order.
    /// Keys with nothing stored yield [`OnlineReadResult::absent`]. Duplicate
    /// keys yield identical results.
    ///
    /// `requested_features` is accepted for interface compatibility; stores
    /// return every stored feature regardless.
    async fn online_read(
        &mut self,
        config: &Self::Config,
        table: &FeatureView,
        entity_keys: &[EntityKey],
        requested_features: Option<&[String]>,
    ) -> Result<Vec<OnlineReadResult>>;

    /// Reconcile physical storage with the set of feature views
    ///
    /// Drops storage for `tables_to_delete` and creates storage for
    /// `tables_to_keep`, all-or-nothing. Entities and `partial` are accepted
    /// for compatibility with the feature-definition model.
    async fn update(
        &mut self,
        config: &Self::Config,
        tables_to_delete: &[FeatureView],
        tables_to_keep: &[FeatureView],
        entities_to_delete: &[Entity],
        entities_to_keep: &[Entity],
        partial: bool,
    ) -> Result<()>;

    /// Remove all storage owned by the store (best effort)
    async fn teardown(
        &mut self,
        config: &Self::Config,
        tables: &[FeatureView],
        entities: &[Entity],
    ) -> TeardownStatus;

    /// Check if the online store is reachable
    async fn health_check(&mut self, config: &Self::Config) -> Result<()>;

    /// Get the name of this online store type (for logging)
    fn store_type(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_teardown_status_completed() {
        let status = TeardownStatus::Completed;
        assert!(status.is_completed());
        assert!(status.into_result().is_ok());
    }

    #[test]
    fn test_teardown_status_failed() {
        let status = TeardownStatus::Failed(Error::Teardown("schema missing".into()));
        assert!(!status.is_completed());
        assert!(matches!(status.into_result(), Err(Error::Teardown(_))));
    }

    #[test]
    fn test_progress_alias_accepts_closures() {
        let mut seen = Vec::new();
        {
            let mut record = |n: usize| seen.push(n);
            let progress: Progress<'_> = &mut record;
            progress(5000);
            progress(1);
        }
        assert_eq!(seen, vec![5000, 1]);
    }
}
