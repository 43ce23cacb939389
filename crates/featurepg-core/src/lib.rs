//! # featurepg core library
//!
//! Shared types and traits for featurepg online stores.
//!
//! ## Key Components
//!
//! - **OnlineStore**: the trait every online store backend implements
//! - **Types**: entity keys, typed values, timestamps, write/read records
//! - **Codec**: deterministic binary encoding of entity keys and values
//! - **Errors**: strongly-typed error taxonomy
//!
//! ## Example Usage
//!
//! ```
//! use featurepg_core::{serialize_entity_key, EntityKey};
//!
//! let key = EntityKey::new("driver_id", 1001_i64);
//! let bytes = serialize_entity_key(&key).unwrap();
//! assert!(!bytes.is_empty());
//! ```

pub use codec::{deserialize_entity_key, deserialize_value, serialize_entity_key, serialize_value};
pub use error::{Error, Result};
pub use online_store::{OnlineStore, Progress, TeardownStatus};
pub use types::{
    Entity, EntityKey, FeatureView, OnlineReadResult, OnlineWriteRecord, Timestamp, Value,
};

pub mod codec;
mod error;
mod online_store;
mod types;

// Users can do `use featurepg_core::prelude::*` to get everything they need
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::online_store::{OnlineStore, Progress, TeardownStatus};
    pub use crate::types::{
        Entity, EntityKey, FeatureView, OnlineReadResult, OnlineWriteRecord, Timestamp, Value,
    };
}
