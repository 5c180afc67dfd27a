//! Batch relation resolution for eager loading.
//!
//! One [`LazyLoader`] serves every owner fetched by the same query: the first
//! `get_result` runs the batch, later calls only look up the owner's key.

use crate::config::EntityMapping;
use crate::error::OrmError;
use crate::executor::Row;
use crate::manager::EntityManager;
use crate::record::Record;
use crate::relation::key::{distinct_keys, KeyTuple};
use crate::relation::RelationResult;
use crate::sql::Select;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Where the batch comes from.
pub(crate) enum Source {
    /// Target rows carry the key matched against the owner (`target_key`).
    Direct { query: Select, target_key: Vec<String> },
    /// Junction rows pair owner keys with target keys. `query` is completed
    /// with the target keys found in `links`.
    Junction {
        links: Select,
        owner_columns: Vec<String>,
        related_columns: Vec<String>,
        query: Select,
        target_key: Vec<String>,
    },
}

struct Loaded {
    records: Vec<Record>,
    /// Owner key -> positions in `records`, in fetch order.
    index: HashMap<KeyTuple, Vec<usize>>,
}

pub struct LazyLoader {
    manager: EntityManager,
    target: Arc<EntityMapping>,
    owner_key: Vec<String>,
    source: Source,
    has_many: bool,
    loaded: OnceCell<Loaded>,
}

impl LazyLoader {
    pub(crate) fn new(
        manager: EntityManager,
        target: Arc<EntityMapping>,
        owner_key: Vec<String>,
        source: Source,
        has_many: bool,
    ) -> Self {
        LazyLoader {
            manager,
            target,
            owner_key,
            source,
            has_many,
            loaded: OnceCell::new(),
        }
    }

    pub fn has_many(&self) -> bool {
        self.has_many
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.initialized()
    }

    /// Run the batch if it has not run yet.
    pub async fn load(&self) -> Result<(), OrmError> {
        self.loaded().await.map(|_| ())
    }

    async fn loaded(&self) -> Result<&Loaded, OrmError> {
        self.loaded.get_or_try_init(|| self.fetch()).await
    }

    async fn fetch(&self) -> Result<Loaded, OrmError> {
        let executor = self.manager.executor();
        let mut index: HashMap<KeyTuple, Vec<usize>> = HashMap::new();
        let rows = match &self.source {
            Source::Direct { query, target_key } => {
                let rows = executor.fetch_all(query).await?;
                for (i, row) in rows.iter().enumerate() {
                    if let Some(key) = KeyTuple::from_row(row, target_key) {
                        index.entry(key).or_default().push(i);
                    }
                }
                rows
            }
            Source::Junction {
                links,
                owner_columns,
                related_columns,
                query,
                target_key,
            } => {
                let links = executor.fetch_all(links).await?;
                let mut owners_of: HashMap<KeyTuple, Vec<KeyTuple>> = HashMap::new();
                for link in &links {
                    if let (Some(owner), Some(related)) = (
                        KeyTuple::from_row(link, owner_columns),
                        KeyTuple::from_row(link, related_columns),
                    ) {
                        owners_of.entry(related).or_default().push(owner);
                    }
                }
                let keys = distinct_keys(&links, related_columns);
                let rows = if keys.is_empty() {
                    Vec::new()
                } else {
                    let mut query = query.clone();
                    query.where_in_tuple(target_key.clone(), keys);
                    executor.fetch_all(&query).await?
                };
                for (i, row) in rows.iter().enumerate() {
                    let Some(key) = KeyTuple::from_row(row, target_key) else { continue };
                    for owner in owners_of.get(&key).into_iter().flatten() {
                        index.entry(owner.clone()).or_default().push(i);
                    }
                }
                rows
            }
        };
        tracing::debug!(entity = self.target.name(), rows = rows.len(), "relation batch loaded");
        let records = rows.into_iter().map(|row| self.record(row)).collect();
        Ok(Loaded { records, index })
    }

    fn record(&self, row: Row) -> Record {
        Record::from_row(self.manager.clone(), Arc::clone(&self.target), row, false)
    }

    /// Matches for one owner: every match in fetch order for has-many
    /// relations, otherwise the first match.
    pub async fn get_result(&self, owner: &Record) -> Result<RelationResult, OrmError> {
        let values = owner.raw_values(&self.owner_key)?;
        let loaded = self.loaded().await?;
        let positions = KeyTuple::from_values(&values)
            .and_then(|key| loaded.index.get(&key))
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        let mut matches = positions.iter().map(|&i| loaded.records[i].clone());
        Ok(if self.has_many {
            RelationResult::Many(matches.collect())
        } else {
            RelationResult::One(matches.next())
        })
    }
}

impl fmt::Debug for LazyLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyLoader")
            .field("entity", &self.target.name())
            .field("owner_key", &self.owner_key)
            .field("has_many", &self.has_many)
            .field("loaded", &self.is_loaded())
            .finish()
    }
}
