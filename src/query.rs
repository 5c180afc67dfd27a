//! Queries over one entity type.

use crate::config::EntityMapping;
use crate::entity::Entity;
use crate::error::OrmError;
use crate::manager::{key_lookup, EntityManager};
use crate::record::Record;
use crate::relation::QueryCallback;
use crate::sql::{Delete, Select, Update};
use crate::value::Value;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::Arc;

/// Builder for fetching, updating or deleting rows of one entity.
///
/// Relations named with [`with`](EntityQuery::with) are loaded in one batch
/// per relation for all fetched records, the first time any of them asks.
pub struct EntityQuery {
    manager: EntityManager,
    mapping: Arc<EntityMapping>,
    select: Select,
    with: Vec<(String, Option<QueryCallback>)>,
    read_only: bool,
}

impl EntityQuery {
    pub(crate) fn new(manager: EntityManager, mapping: Arc<EntityMapping>) -> Self {
        let select = Select::new(mapping.table_name());
        EntityQuery {
            manager,
            mapping,
            select,
            with: Vec::new(),
            read_only: false,
        }
    }

    pub fn where_eq(mut self, column: &str, value: impl Into<JsonValue>) -> Self {
        self.select.where_eq(column, value);
        self
    }

    pub fn where_in<I, V>(mut self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<JsonValue>,
    {
        self.select.where_in(column, values.into_iter().map(Into::into));
        self
    }

    pub fn where_null(mut self, column: &str) -> Self {
        self.select.where_null(column);
        self
    }

    pub fn order_by(mut self, column: &str, ascending: bool) -> Self {
        self.select.order_by(column, ascending);
        self
    }

    pub fn limit(mut self, n: u64) -> Self {
        self.select.limit(n);
        self
    }

    pub fn offset(mut self, n: u64) -> Self {
        self.select.offset(n);
        self
    }

    /// Fetch only `columns`. Records from a projection are read-only.
    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.select.columns(columns);
        self.read_only = true;
        self
    }

    /// Eager-load a relation.
    pub fn with(mut self, relation: &str) -> Self {
        self.with.push((relation.to_string(), None));
        self
    }

    /// Eager-load a relation with a refinement of its batch query.
    pub fn with_filtered<F>(mut self, relation: &str, f: F) -> Self
    where
        F: Fn(&mut Select) + Send + Sync + 'static,
    {
        let f: QueryCallback = Arc::new(f);
        self.with.push((relation.to_string(), Some(f)));
        self
    }

    pub async fn all(self) -> Result<Vec<Record>, OrmError> {
        for (name, _) in &self.with {
            self.mapping.relation_named(name)?;
        }
        let rows = self.manager.executor().fetch_all(&self.select).await?;
        let mut loaders = HashMap::new();
        for (name, refine) in &self.with {
            let relation = self.mapping.relation_named(name)?;
            let loader = relation.lazy_loader(&self.manager, &self.mapping, &rows, refine.as_ref())?;
            loaders.insert(name.clone(), Arc::new(loader));
        }
        tracing::debug!(entity = self.mapping.name(), rows = rows.len(), with = self.with.len(), "entity query");
        Ok(rows
            .into_iter()
            .map(|row| {
                Record::from_row(self.manager.clone(), Arc::clone(&self.mapping), row, self.read_only)
                    .with_loaders(loaders.clone())
            })
            .collect())
    }

    pub async fn all_as<E: Entity>(self) -> Result<Vec<E>, OrmError> {
        Ok(self.all().await?.into_iter().map(E::from_record).collect())
    }

    pub async fn first(mut self) -> Result<Option<Record>, OrmError> {
        self.select.limit(1);
        Ok(self.all().await?.into_iter().next())
    }

    /// Fetch by primary key: a scalar, or an array for composite keys.
    pub async fn find(mut self, key: impl Into<JsonValue>) -> Result<Option<Record>, OrmError> {
        for condition in key_lookup(&self.mapping, &key.into())? {
            self.select.filter(condition);
        }
        self.first().await
    }

    /// Bulk update of every matching row. Values go through the column casts
    /// but not through setters. Returns the number of rows affected.
    pub async fn update<I, S, V>(self, values: I) -> Result<u64, OrmError>
    where
        I: IntoIterator<Item = (S, V)>,
        S: Into<String>,
        V: Into<Value>,
    {
        let format = self.manager.date_format();
        let mut raw = Vec::new();
        for (column, value) in values {
            let column: String = column.into();
            let value: Value = value.into();
            let value = match self.mapping.cast_for(&column) {
                Some(cast) => cast.set(value, format)?,
                None => value.into_raw(format)?,
            };
            raw.push((column, value));
        }
        let update = Update::new(self.mapping.table_name(), raw, self.select.conditions().to_vec());
        self.manager.executor().update(&update).await
    }

    /// Bulk delete of every matching row. Returns the number of rows affected.
    pub async fn delete(self) -> Result<u64, OrmError> {
        let delete = Delete::new(self.mapping.table_name(), self.select.conditions().to_vec());
        self.manager.executor().delete(&delete).await
    }
}
