//! redb table definitions for the hookdrain state store.
//!
//! Each table uses `&str` keys and `&[u8]` values (JSON-serialized domain types).
//! Drain-scoped keys follow `{group}/{instance}/{hook}`.

use redb::TableDefinition;

/// Drain checkpoints (`AttemptState`) keyed by `{group}/{instance}/{hook}`.
pub const CHECKPOINTS: TableDefinition<&str, &[u8]> = TableDefinition::new("checkpoints");

/// Lifecycle pauses keyed by `{group}/{instance}/{hook}`.
pub const PAUSES: TableDefinition<&str, &[u8]> = TableDefinition::new("pauses");

/// Usage samples keyed by `{series}|{timestamp:020}`.
pub const SAMPLES: TableDefinition<&str, &[u8]> = TableDefinition::new("samples");
