//! Working state of one entity row.
//!
//! A [`Record`] owns the raw column values as the executor returned them, a
//! cache of cast domain values, the set of modified columns and the relations
//! resolved so far. Every read and write of an entity goes through it.

use crate::config::EntityMapping;
use crate::error::OrmError;
use crate::executor::Row;
use crate::loader::LazyLoader;
use crate::manager::EntityManager;
use crate::relation::{Refine, Relation, RelationResult, ShareOneOrMany};
use crate::sql::Select;
use crate::value::Value;
use serde_json::Value as JsonValue;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// A link or unlink issued before the owner had a key.
#[derive(Clone)]
struct PendingLink {
    relation: ShareOneOrMany,
    items: Vec<JsonValue>,
    link: bool,
}

#[derive(Clone)]
pub struct Record {
    manager: EntityManager,
    mapping: Arc<EntityMapping>,
    raw_columns: Row,
    columns: HashMap<String, Value>,
    loaders: HashMap<String, Arc<LazyLoader>>,
    modified: HashSet<String>,
    relations: HashMap<String, RelationResult>,
    pending_links: Vec<PendingLink>,
    /// Key values of the stored row, as last loaded or saved.
    persisted_key: Option<Vec<JsonValue>>,
    is_read_only: bool,
    is_new: bool,
    dehydrated: bool,
    deleted: bool,
}

impl Record {
    /// Record over a fetched row.
    pub(crate) fn from_row(manager: EntityManager, mapping: Arc<EntityMapping>, row: Row, read_only: bool) -> Self {
        let persisted_key = key_of(&mapping, &row);
        Record {
            manager,
            mapping,
            raw_columns: row,
            columns: HashMap::new(),
            loaders: HashMap::new(),
            modified: HashSet::new(),
            relations: HashMap::new(),
            pending_links: Vec::new(),
            persisted_key,
            is_read_only: read_only,
            is_new: false,
            dehydrated: false,
            deleted: false,
        }
    }

    /// Empty record that has not been inserted yet.
    pub(crate) fn new(manager: EntityManager, mapping: Arc<EntityMapping>) -> Self {
        Record {
            is_new: true,
            persisted_key: None,
            ..Record::from_row(manager, mapping, Row::new(), false)
        }
    }

    pub(crate) fn with_loaders(mut self, loaders: HashMap<String, Arc<LazyLoader>>) -> Self {
        self.loaders = loaders;
        self
    }

    pub fn manager(&self) -> &EntityManager {
        &self.manager
    }

    pub fn mapping(&self) -> &EntityMapping {
        &self.mapping
    }

    pub(crate) fn mapping_arc(&self) -> &Arc<EntityMapping> {
        &self.mapping
    }

    pub fn is_new(&self) -> bool {
        self.is_new
    }

    pub fn is_read_only(&self) -> bool {
        self.is_read_only
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    pub fn is_dehydrated(&self) -> bool {
        self.dehydrated
    }

    pub fn raw_columns(&self) -> &Row {
        &self.raw_columns
    }

    pub fn raw_column(&self, name: &str) -> Option<&JsonValue> {
        self.raw_columns.get(name)
    }

    /// Modified column names, sorted.
    pub fn modified_columns(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.modified.iter().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn is_modified(&self, name: &str) -> bool {
        self.modified.contains(name)
    }

    pub fn pending_link_count(&self) -> usize {
        self.pending_links.len()
    }

    pub(crate) fn persisted_key(&self) -> Option<&[JsonValue]> {
        self.persisted_key.as_deref()
    }

    /// Primary key as one value: a scalar, or an array for composite keys.
    pub fn key_value(&self) -> Result<JsonValue, OrmError> {
        let mut values = self.raw_values(self.mapping.key().columns())?;
        Ok(if values.len() == 1 {
            values.remove(0)
        } else {
            JsonValue::Array(values)
        })
    }

    /// Raw values of `columns`, bypassing casts and accessors.
    pub(crate) fn raw_values(&self, columns: &[String]) -> Result<Vec<JsonValue>, OrmError> {
        columns
            .iter()
            .map(|c| {
                self.raw_columns
                    .get(c)
                    .cloned()
                    .ok_or_else(|| OrmError::UnknownColumn(c.clone()))
            })
            .collect()
    }

    fn ensure_live(&self) -> Result<(), OrmError> {
        if self.deleted {
            return Err(OrmError::RecordDeleted);
        }
        Ok(())
    }

    /// Read a column through its cast and getter. Key columns are cast but
    /// never passed to a getter.
    pub async fn get_column(&mut self, name: &str) -> Result<Value, OrmError> {
        self.ensure_live()?;
        self.hydrate().await?;
        self.ensure_live()?;
        if let Some(value) = self.columns.get(name) {
            return Ok(value.clone());
        }
        let raw = self
            .raw_columns
            .get(name)
            .ok_or_else(|| OrmError::UnknownColumn(name.to_string()))?;
        let mut value = match self.mapping.cast_for(name) {
            Some(cast) => cast.get(raw, self.manager.date_format())?,
            None => Value::from_raw(raw),
        };
        if !self.mapping.key().contains(name) {
            if let Some(getter) = self.mapping.getter_for(name) {
                value = getter(value);
            }
        }
        self.columns.insert(name.to_string(), value.clone());
        Ok(value)
    }

    /// Write a column through its setter and cast.
    pub async fn set_column(&mut self, name: &str, value: impl Into<Value>) -> Result<(), OrmError> {
        if self.is_read_only {
            return Err(OrmError::ReadOnlyRecord);
        }
        self.ensure_live()?;
        self.hydrate().await?;
        self.ensure_live()?;
        let mut value = value.into();
        if let Some(setter) = self.mapping.setter_for(name) {
            value = setter(value);
        }
        let raw = match self.mapping.cast_for(name) {
            Some(cast) => cast.set(value, self.manager.date_format())?,
            None => value.into_raw(self.manager.date_format())?,
        };
        self.set_raw_column(name, raw);
        Ok(())
    }

    /// Store a raw value with no setter or cast. Marks the column modified.
    pub fn set_raw_column(&mut self, name: &str, raw: JsonValue) {
        self.modified.insert(name.to_string());
        self.columns.remove(name);
        self.raw_columns.insert(name.to_string(), raw);
    }

    /// Write every allowed column of `columns`. A fillable list wins over a
    /// guarded list; with neither, everything is written.
    pub async fn assign<I, S, V>(&mut self, columns: I) -> Result<(), OrmError>
    where
        I: IntoIterator<Item = (S, V)>,
        S: Into<String>,
        V: Into<Value>,
    {
        let columns = self
            .mapping
            .filter_assignable(columns.into_iter().map(|(k, v)| (k.into(), v.into())));
        for (name, value) in columns {
            self.set_column(&name, value).await?;
        }
        Ok(())
    }

    pub async fn get_related(&mut self, name: &str) -> Result<&RelationResult, OrmError> {
        self.get_related_with(name, None).await
    }

    /// Resolve a relation once and cache the result. `refine` only applies
    /// when the relation is resolved by this call.
    pub async fn get_related_with(&mut self, name: &str, refine: Refine<'_>) -> Result<&RelationResult, OrmError> {
        self.ensure_live()?;
        let mapping = Arc::clone(&self.mapping);
        let relation = mapping.relation_named(name)?;
        self.hydrate().await?;
        self.ensure_live()?;
        if !self.relations.contains_key(name) {
            let result = match self.loaders.get(name).cloned() {
                Some(loader) => loader.get_result(self).await?,
                None => relation.result(self, refine).await?,
            };
            self.relations.insert(name.to_string(), result);
        }
        self.relations
            .get(name)
            .ok_or_else(|| OrmError::UnknownRelation(name.to_string()))
    }

    /// Point a belongs-to relation at `related` (or clear it with `None`), or
    /// write this record's key into a has-one/has-many target.
    pub async fn set_related(&mut self, name: &str, related: Option<&mut Record>) -> Result<(), OrmError> {
        self.ensure_live()?;
        let mapping = Arc::clone(&self.mapping);
        match (mapping.relation_named(name)?, related) {
            (Relation::BelongsTo(relation), related) => {
                relation.add_related(self, related).await?;
                self.forget_relation(name);
                Ok(())
            }
            (Relation::HasOneOrMany(relation), Some(related)) => relation.add_related(self, related).await,
            (Relation::HasOneOrMany(_), None) => Err(OrmError::unsupported(name, "clearing with set_related")),
            (Relation::ShareOneOrMany(_), _) => Err(OrmError::unsupported(name, "set_related")),
        }
    }

    /// Add junction rows to a share relation. `items` are target keys.
    /// Queued until this record is saved when it is still new.
    pub async fn link<I>(&mut self, name: &str, items: I) -> Result<(), OrmError>
    where
        I: IntoIterator<Item = JsonValue>,
    {
        self.link_or_unlink(name, items.into_iter().collect(), true).await
    }

    pub async fn unlink<I>(&mut self, name: &str, items: I) -> Result<(), OrmError>
    where
        I: IntoIterator<Item = JsonValue>,
    {
        self.link_or_unlink(name, items.into_iter().collect(), false).await
    }

    async fn link_or_unlink(&mut self, name: &str, items: Vec<JsonValue>, link: bool) -> Result<(), OrmError> {
        self.ensure_live()?;
        let mapping = Arc::clone(&self.mapping);
        let Relation::ShareOneOrMany(relation) = mapping.relation_named(name)? else {
            return Err(OrmError::unsupported(name, if link { "link" } else { "unlink" }));
        };
        if self.is_new {
            self.pending_links.push(PendingLink {
                relation: relation.clone(),
                items,
                link,
            });
            return Ok(());
        }
        if link {
            relation.link(self, &items).await?;
        } else {
            relation.unlink(self, &items).await?;
        }
        self.forget_relation(name);
        Ok(())
    }

    /// Drop the cached result and any batch loader of `name`, so the next
    /// access runs an on-demand query.
    fn forget_relation(&mut self, name: &str) {
        self.relations.remove(name);
        self.loaders.remove(name);
    }

    /// Record the key produced by an insert. Composite keys are filled
    /// positionally. The record reloads itself on next access, then queued
    /// links are replayed in call order.
    pub async fn mark_as_saved(&mut self, key: Vec<JsonValue>) -> Result<(), OrmError> {
        let columns = self.mapping.key().columns().to_vec();
        if key.len() != columns.len() {
            return Err(OrmError::KeyArity {
                expected: columns.len(),
                got: key.len(),
            });
        }
        for (column, value) in columns.iter().zip(&key) {
            self.columns.remove(column);
            self.raw_columns.insert(column.clone(), value.clone());
        }
        self.persisted_key = Some(key);
        self.dehydrated = true;
        self.is_new = false;
        self.modified.clear();

        let pending = std::mem::take(&mut self.pending_links);
        if !pending.is_empty() {
            tracing::debug!(entity = self.mapping.name(), count = pending.len(), "replaying pending links");
        }
        for entry in pending {
            if entry.link {
                entry.relation.link(self, &entry.items).await?;
            } else {
                entry.relation.unlink(self, &entry.items).await?;
            }
        }
        Ok(())
    }

    pub fn mark_as_updated(&mut self, updated_at: Option<JsonValue>) {
        if let Some(ts) = updated_at {
            self.columns.remove("updated_at");
            self.raw_columns.insert("updated_at".to_string(), ts);
        }
        self.modified.clear();
    }

    pub fn mark_as_deleted(&mut self) {
        self.deleted = true;
    }

    /// Put modified key columns back to the stored key. Returns the restored columns.
    pub(crate) fn restore_key(&mut self) -> Vec<String> {
        let Some(persisted) = self.persisted_key.clone() else { return Vec::new() };
        let mut restored = Vec::new();
        for (column, value) in self.mapping.key().columns().iter().zip(persisted) {
            if self.modified.remove(column) {
                self.columns.remove(column);
                self.raw_columns.insert(column.clone(), value);
                restored.push(column.clone());
            }
        }
        restored
    }

    /// Reload the row after a key write. A missing row marks the record deleted.
    async fn hydrate(&mut self) -> Result<(), OrmError> {
        if !self.dehydrated {
            return Ok(());
        }
        let mut select = Select::new(self.mapping.table_name());
        for column in self.mapping.key().columns() {
            let value = self.raw_columns.get(column).cloned().unwrap_or(JsonValue::Null);
            select.where_eq(column.as_str(), value);
        }
        tracing::debug!(entity = self.mapping.name(), "rehydrating record");
        match self.manager.executor().fetch_one(&select).await? {
            Some(row) => {
                self.persisted_key = key_of(&self.mapping, &row);
                self.raw_columns = row;
                self.dehydrated = false;
            }
            None => {
                tracing::warn!(entity = self.mapping.name(), "row no longer exists; record marked deleted");
                self.deleted = true;
            }
        }
        self.columns.clear();
        self.relations.clear();
        self.loaders.clear();
        Ok(())
    }
}

fn key_of(mapping: &EntityMapping, row: &Row) -> Option<Vec<JsonValue>> {
    mapping
        .key()
        .columns()
        .iter()
        .map(|c| row.get(c).filter(|v| !v.is_null()).cloned())
        .collect()
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("entity", &self.mapping.name())
            .field("raw_columns", &self.raw_columns)
            .field("modified", &self.modified_columns())
            .field("relations", &self.relations.keys().collect::<Vec<_>>())
            .field("is_new", &self.is_new)
            .field("is_read_only", &self.is_read_only)
            .field("dehydrated", &self.dehydrated)
            .field("deleted", &self.deleted)
            .finish()
    }
}
