//! relmap: entity data mapping with lazily resolved relations.
//!
//! Rows are bound to [`Record`]s that mediate every column read and write
//! through casts and accessor hooks, resolve relations on demand (or in one
//! batch per relation for eager loads) and queue junction links until the
//! owner has a key.

pub mod case;
pub mod cast;
pub mod config;
pub mod entity;
pub mod error;
pub mod executor;
pub mod loader;
pub mod manager;
pub mod query;
pub mod record;
pub mod relation;
pub mod sql;
pub mod value;

pub use cast::{Cast, CastKind, DateFormat};
pub use config::{load_from_file, load_from_str, resolve, EntityConfig, EntityMapping, ForeignKey, Junction, ManagerConfig, PrimaryKey};
pub use entity::Entity;
pub use error::{ConfigError, OrmError};
pub use executor::{Executor, MemoryExecutor, PgExecutor, Row};
pub use loader::LazyLoader;
pub use manager::{EntityManager, EntityManagerBuilder};
pub use query::EntityQuery;
pub use record::Record;
pub use relation::{Relation, RelationResult};
pub use value::Value;
