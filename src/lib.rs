//! SQLite data access and row-to-entity mapping for the Runar ecosystem.
//!
//! # Intention
//!
//! - Provide a thin API for executing SQL against SQLite and reading results.
//! - Map result rows onto plain entity structs by column name or column alias,
//!   with per-type metadata built once and cached.
//!
//! # Architectural Boundaries
//!
//! - Only data access and mapping code belongs here.
//! - No SQL generation, pooling, retries or schema management.
//! - Entities are flat: each property receives one column value.

pub mod cursor;
pub mod dynamic;
pub mod entity;
pub mod error;
pub mod mapper;
pub mod metadata;
pub mod sqlite;
pub mod value;

pub use cursor::{Cursor, MemoryCursor};
pub use dynamic::DynamicRow;
pub use entity::{parse_enum, Entity, Property};
pub use error::{ConversionError, Error, Result};
pub use mapper::{MapOptions, RowMapper, SkipFields};
pub use metadata::{ColumnAliasTable, MetadataCache, PropertyTable};
pub use sqlite::{Executor, Params, SimpleAccess, SimpleTransaction, SqliteConfig, SqliteCursor};
pub use value::{FromValue, Value};
