//! featurepg online store - PostgreSQL feature serving
//!
//! This crate stores the latest feature values per entity in PostgreSQL and
//! serves multi-key point reads for real-time inference.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                     PostgresOnlineStore                          │
//! ├──────────────────────────────────────────────────────────────────┤
//! │                                                                  │
//! │  provisioning ──► update()/teardown() ──► schema + tables        │
//! │                                                                  │
//! │  serving ──► online_write_batch() ──► batched upserts (5000)     │
//! │          ──► online_read()        ──► ANY($1) + reconcile        │
//! │                                                                  │
//! │                 one connection per store instance                │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use featurepg_online::{config, EntityKey, FeatureView, OnlineStore, OnlineWriteRecord, PostgresOnlineStore};
//!
//! let config = config::load("feature_store.yaml")?;
//! let view = FeatureView::new("driver_hourly_stats");
//! let mut store = PostgresOnlineStore::new();
//!
//! store.update(&config, &[], &[view.clone()], &[], &[], false).await?;
//!
//! let record = OnlineWriteRecord::new(EntityKey::new("driver_id", 1001_i64), chrono::Utc::now())
//!     .with_value("conv_rate", 0.87_f64);
//! let mut progress = |rows: usize| println!("wrote {rows} rows");
//! store.online_write_batch(&config, &view, vec![record], Some(&mut progress)).await?;
//!
//! let results = store
//!     .online_read(&config, &view, &[EntityKey::new("driver_id", 1001_i64)], None)
//!     .await?;
//! ```

// Re-export core types
pub use featurepg_core::{
    Entity, EntityKey, Error, FeatureView, OnlineReadResult, OnlineStore, OnlineWriteRecord,
    Progress, Result, TeardownStatus, Timestamp, Value,
};

pub mod config;
pub mod connection;
pub mod postgres_store;
pub mod read;
pub mod sql;
pub mod write;

pub use config::{PostgresConfig, RepoConfig};
pub use connection::{ConnectionManager, ConnectionStatus};
pub use postgres_store::PostgresOnlineStore;
pub use write::DEFAULT_BATCH_SIZE;
