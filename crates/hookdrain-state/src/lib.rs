//! hookdrain-state — embedded state store for hookdrain.
//!
//! Backed by [redb](https://docs.rs/redb), provides persistent and in-memory
//! storage for drain checkpoints (scheduled re-entry), usage samples, and
//! the local lifecycle pause ledger.
//!
//! # Architecture
//!
//! All records are JSON-serialized into redb's `&[u8]` value columns.
//! Drain-scoped keys (`{group}/{instance}/{hook}`) and series-prefixed
//! sample keys (`{series}|{timestamp}`) enable prefix scans.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across async tasks.

pub mod error;
pub mod local;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use local::{StoreLifecycleController, StoreMetricSource};
pub use store::StateStore;
pub use types::*;
