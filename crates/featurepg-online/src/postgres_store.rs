//! PostgreSQL online store
//!
//! Stores the latest value of each (entity key, feature name) pair in one
//! table per (project, feature view). Keys and values are opaque bytes.
//!
//! ## Table Schema
//!
//! ```sql
//! CREATE TABLE IF NOT EXISTS "{project}_{view}" (
//!     entity_key BYTEA,
//!     feature_name TEXT,
//!     value BYTEA,
//!     event_ts TIMESTAMPTZ,
//!     created_ts TIMESTAMPTZ,
//!     PRIMARY KEY (entity_key, feature_name)
//! );
//! CREATE INDEX IF NOT EXISTS "{project}_{view}_ek" ON "{project}_{view}" (entity_key);
//! ```
//!
//! ## Operation model
//!
//! - One connection per store, opened on first use (see [`ConnectionManager`])
//! - Writes: batched multi-row upserts, each batch autocommitted
//! - Reads: a single `entity_key = ANY($1)` query per call
//! - Schema updates: one transaction, all-or-nothing
//! - Teardown: best effort, reported through [`TeardownStatus`]

use crate::config::RepoConfig;
use crate::connection::{pg_error, ConnectionManager, ConnectionStatus};
use crate::read::{fetch_rows, group_rows, reconcile};
use crate::sql::{self, TableId, MAX_BIND_PARAMS, PARAMS_PER_ROW};
use crate::write::{flatten_records, upsert_batch, write_in_batches, DEFAULT_BATCH_SIZE};
use async_trait::async_trait;
use featurepg_core::{
    serialize_entity_key, Entity, EntityKey, Error, FeatureView, OnlineReadResult, OnlineStore,
    OnlineWriteRecord, Progress, Result, TeardownStatus,
};

/// PostgreSQL-backed online store
pub struct PostgresOnlineStore {
    connection: ConnectionManager,
    batch_size: usize,
}

impl Default for PostgresOnlineStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PostgresOnlineStore {
    /// Creates an unconnected store; the connection opens on first use
    pub fn new() -> Self {
        Self {
            connection: ConnectionManager::new(),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Overrides the number of rows per upsert statement
    pub fn with_batch_size(mut self, batch_size: usize) -> Result<Self> {
        let max = MAX_BIND_PARAMS / PARAMS_PER_ROW;
        if batch_size == 0 || batch_size > max {
            return Err(Error::invalid_input(format!(
                "batch size must be between 1 and {}, got {}",
                max, batch_size
            )));
        }
        self.batch_size = batch_size;
        Ok(self)
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Opens the connection eagerly
    ///
    /// Optional: every operation opens it on first use. Useful to surface
    /// connection errors at startup.
    pub async fn connect(&mut self, config: &RepoConfig) -> Result<()> {
        config.validate()?;
        self.connection.open(&config.online_store).await?;
        Ok(())
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        self.connection.status()
    }

    async fn drop_schema(&mut self, config: &RepoConfig) -> Result<()> {
        let statement = sql::drop_schema(config.online_store.schema())?;
        let client = self.connection.open(&config.online_store).await?;
        client
            .batch_execute(&statement)
            .await
            .map_err(|e| pg_error("drop schema", e))
    }
}

#[async_trait]
impl OnlineStore for PostgresOnlineStore {
    type Config = RepoConfig;

    async fn online_write_batch(
        &mut self,
        config: &RepoConfig,
        table: &FeatureView,
        data: Vec<OnlineWriteRecord>,
        progress: Option<Progress<'_>>,
    ) -> Result<()> {
        let table_id = TableId::new(&config.project, table)?;
        let rows = flatten_records(&data)?;
        if rows.is_empty() {
            return Ok(());
        }

        let client = &*self.connection.open(&config.online_store).await?;
        let table_ref = &table_id;
        let batches = write_in_batches(
            &rows,
            self.batch_size,
            move |batch| upsert_batch(client, table_ref, batch),
            progress,
        )
        .await?;

        tracing::debug!(
            table = %table_id,
            records = data.len(),
            rows_written = rows.len(),
            batches,
            "PostgreSQL write complete"
        );

        Ok(())
    }

    async fn online_read(
        &mut self,
        config: &RepoConfig,
        table: &FeatureView,
        entity_keys: &[EntityKey],
        requested_features: Option<&[String]>,
    ) -> Result<Vec<OnlineReadResult>> {
        let table_id = TableId::new(&config.project, table)?;
        if entity_keys.is_empty() {
            return Ok(vec![]);
        }

        // Not applied: every stored feature of a key is returned
        if let Some(requested) = requested_features {
            tracing::trace!(table = %table_id, requested = requested.len(), "requested_features ignored");
        }

        let keys = entity_keys
            .iter()
            .map(serialize_entity_key)
            .collect::<Result<Vec<_>>>()?;

        let client = &*self.connection.open(&config.online_store).await?;
        let rows = fetch_rows(client, &table_id, &keys).await?;
        let fetched = rows.len();

        let results = reconcile(&keys, &group_rows(rows))?;

        tracing::debug!(
            table = %table_id,
            keys = keys.len(),
            rows = fetched,
            found = results.iter().filter(|r| !r.is_absent()).count(),
            "PostgreSQL read complete"
        );

        Ok(results)
    }

    async fn update(
        &mut self,
        config: &RepoConfig,
        tables_to_delete: &[FeatureView],
        tables_to_keep: &[FeatureView],
        _entities_to_delete: &[Entity],
        _entities_to_keep: &[Entity],
        partial: bool,
    ) -> Result<()> {
        // Build every statement up front so an invalid identifier aborts
        // before anything reaches the database
        let store = &config.online_store;
        let mut statements = vec![sql::create_schema(store.db_schema.as_deref(), &store.user)?];
        for table in tables_to_delete {
            statements.push(sql::drop_table(&TableId::new(&config.project, table)?));
        }
        for table in tables_to_keep {
            let table_id = TableId::new(&config.project, table)?;
            statements.push(sql::create_table(&table_id));
            statements.push(sql::create_index(&table_id));
        }

        let client = self.connection.open(store).await?;
        let tx = client
            .transaction()
            .await
            .map_err(|e| pg_error("begin schema update", e))?;

        for statement in &statements {
            tx.batch_execute(statement)
                .await
                .map_err(|e| pg_error("schema update", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| pg_error("commit schema update", e))?;

        tracing::info!(
            project = %config.project,
            schema = %store.schema(),
            dropped = tables_to_delete.len(),
            kept = tables_to_keep.len(),
            partial,
            "PostgreSQL online schema updated"
        );

        Ok(())
    }

    async fn teardown(
        &mut self,
        config: &RepoConfig,
        _tables: &[FeatureView],
        _entities: &[Entity],
    ) -> TeardownStatus {
        let schema = config.online_store.schema().to_string();
        match self.drop_schema(config).await {
            Ok(()) => {
                tracing::info!(schema = %schema, "PostgreSQL online schema dropped");
                TeardownStatus::Completed
            }
            Err(err) => {
                tracing::error!(schema = %schema, error = %err, "Teardown failed");
                TeardownStatus::Failed(Error::Teardown(err.to_string()))
            }
        }
    }

    async fn health_check(&mut self, config: &RepoConfig) -> Result<()> {
        let client = self.connection.open(&config.online_store).await?;
        client
            .batch_execute("SELECT 1")
            .await
            .map_err(|e| pg_error("health check", e))
    }

    fn store_type(&self) -> &'static str {
        "postgres"
    }
}
