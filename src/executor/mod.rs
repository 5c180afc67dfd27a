//! The SQL executor the mapping layer runs on.
//!
//! Records never talk to a database directly: they hand statements to an
//! [`Executor`]. [`PgExecutor`] runs them on PostgreSQL through sqlx;
//! [`MemoryExecutor`] keeps tables in process for tests and prototyping.

mod memory;
mod pg;

pub use memory::{LoggedStatement, MemoryExecutor, StatementKind};
pub use pg::PgExecutor;

use crate::error::OrmError;
use crate::sql::{Delete, Insert, Select, Update};
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::collections::HashMap;

/// One fetched row: column name -> raw storage value.
pub type Row = HashMap<String, JsonValue>;

#[async_trait]
pub trait Executor: Send + Sync {
    async fn fetch_all(&self, select: &Select) -> Result<Vec<Row>, OrmError>;

    /// Single-row fetch; `None` means no row matched.
    async fn fetch_one(&self, select: &Select) -> Result<Option<Row>, OrmError> {
        let mut select = select.clone();
        select.limit(1);
        Ok(self.fetch_all(&select).await?.into_iter().next())
    }

    /// Insert one row; returns the `returning` columns when requested.
    async fn insert(&self, insert: &Insert) -> Result<Option<Row>, OrmError>;

    async fn update(&self, update: &Update) -> Result<u64, OrmError>;

    async fn delete(&self, delete: &Delete) -> Result<u64, OrmError>;
}
