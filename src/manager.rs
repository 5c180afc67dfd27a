//! Entity manager: mapping registry, executor handle and persistence.

use crate::cast::DateFormat;
use crate::config::EntityMapping;
use crate::entity::Entity;
use crate::error::{ConfigError, OrmError};
use crate::executor::Executor;
use crate::query::EntityQuery;
use crate::record::Record;
use crate::relation::key::key_parts;
use crate::sql::{Condition, Delete, Insert, Select, Update};
use crate::value::Value;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

struct ManagerInner {
    executor: Arc<dyn Executor>,
    date_format: DateFormat,
    mappings: HashMap<String, Arc<EntityMapping>>,
}

/// Shared handle every record keeps. Cloning is cheap.
#[derive(Clone)]
pub struct EntityManager {
    inner: Arc<ManagerInner>,
}

pub struct EntityManagerBuilder {
    executor: Arc<dyn Executor>,
    date_format: DateFormat,
    mappings: Vec<EntityMapping>,
}

impl EntityManagerBuilder {
    pub fn date_format(mut self, format: DateFormat) -> Self {
        self.date_format = format;
        self
    }

    pub fn register(mut self, mapping: EntityMapping) -> Self {
        self.mappings.push(mapping);
        self
    }

    pub fn register_all(mut self, mappings: impl IntoIterator<Item = EntityMapping>) -> Self {
        self.mappings.extend(mappings);
        self
    }

    pub fn entity<E: Entity>(self) -> Self {
        self.register(E::mapping())
    }

    /// Check names are unique and every relation targets a registered entity.
    pub fn build(self) -> Result<EntityManager, ConfigError> {
        let mut mappings = HashMap::new();
        for mapping in self.mappings {
            let name = mapping.name().to_string();
            if mappings.insert(name.clone(), Arc::new(mapping)).is_some() {
                return Err(ConfigError::DuplicateEntity(name));
            }
        }
        for mapping in mappings.values() {
            if mapping.key().columns().is_empty() {
                return Err(ConfigError::InvalidPrimaryKey {
                    entity: mapping.name().to_string(),
                    column: String::new(),
                });
            }
            for relation in mapping.relations().values() {
                if !mappings.contains_key(relation.entity()) {
                    return Err(ConfigError::MissingReference {
                        kind: "relation target",
                        id: relation.entity().to_string(),
                    });
                }
            }
        }
        tracing::debug!(entities = mappings.len(), "entity manager ready");
        Ok(EntityManager {
            inner: Arc::new(ManagerInner {
                executor: self.executor,
                date_format: self.date_format,
                mappings,
            }),
        })
    }
}

impl EntityManager {
    pub fn builder(executor: Arc<dyn Executor>) -> EntityManagerBuilder {
        EntityManagerBuilder {
            executor,
            date_format: DateFormat::default(),
            mappings: Vec::new(),
        }
    }

    pub fn executor(&self) -> &dyn Executor {
        self.inner.executor.as_ref()
    }

    pub fn date_format(&self) -> &DateFormat {
        &self.inner.date_format
    }

    pub fn mapping(&self, entity: &str) -> Result<Arc<EntityMapping>, OrmError> {
        self.inner
            .mappings
            .get(entity)
            .cloned()
            .ok_or_else(|| OrmError::UnknownEntity(entity.to_string()))
    }

    pub fn query(&self, entity: &str) -> Result<EntityQuery, OrmError> {
        Ok(EntityQuery::new(self.clone(), self.mapping(entity)?))
    }

    pub fn query_as<E: Entity>(&self) -> Result<EntityQuery, OrmError> {
        self.query(E::mapping().name())
    }

    /// Empty unsaved record.
    pub fn new_record(&self, entity: &str) -> Result<Record, OrmError> {
        Ok(Record::new(self.clone(), self.mapping(entity)?))
    }

    /// Unsaved record with `data` assigned through fillable/guarded filtering.
    pub async fn create<I, S, V>(&self, entity: &str, data: I) -> Result<Record, OrmError>
    where
        I: IntoIterator<Item = (S, V)>,
        S: Into<String>,
        V: Into<Value>,
    {
        let mut record = self.new_record(entity)?;
        record.assign(data).await?;
        Ok(record)
    }

    /// Fetch by primary key: a scalar, or an array for composite keys.
    pub async fn find(&self, entity: &str, key: impl Into<JsonValue>) -> Result<Option<Record>, OrmError> {
        self.query(entity)?.find(key).await
    }

    pub(crate) async fn fetch_records(&self, mapping: &Arc<EntityMapping>, select: &Select) -> Result<Vec<Record>, OrmError> {
        let rows = self.executor().fetch_all(select).await?;
        Ok(rows
            .into_iter()
            .map(|row| Record::from_row(self.clone(), Arc::clone(mapping), row, false))
            .collect())
    }

    /// Insert a new record or write the modified columns of a stored one.
    ///
    /// Key columns of a stored record cannot be changed here: modified key
    /// columns are put back to the stored key.
    pub async fn save(&self, record: &mut Record) -> Result<bool, OrmError> {
        if record.is_read_only() {
            return Err(OrmError::ReadOnlyRecord);
        }
        if record.is_deleted() {
            return Err(OrmError::RecordDeleted);
        }
        let mapping = Arc::clone(record.mapping_arc());
        let key_columns = mapping.key().columns().to_vec();

        if record.is_new() {
            if mapping.has_timestamps() && record.raw_column("created_at").is_none() {
                let now = self.now()?;
                record.set_raw_column("created_at", now);
            }
            if let Some(generator) = mapping.generator() {
                let key = generator(record.raw_columns())?;
                if key.len() != key_columns.len() {
                    return Err(OrmError::KeyArity {
                        expected: key_columns.len(),
                        got: key.len(),
                    });
                }
                for (column, value) in key_columns.iter().zip(key) {
                    record.set_raw_column(column, value);
                }
            }
            let insert = Insert::new(mapping.table_name(), sorted_values(record, None)).returning(key_columns.clone());
            let returned = self.executor().insert(&insert).await?;
            let key: Vec<JsonValue> = key_columns
                .iter()
                .map(|c| {
                    returned
                        .as_ref()
                        .and_then(|row| row.get(c))
                        .filter(|v| !v.is_null())
                        .or_else(|| record.raw_column(c))
                        .cloned()
                        .unwrap_or(JsonValue::Null)
                })
                .collect();
            tracing::debug!(entity = mapping.name(), "record inserted");
            record.mark_as_saved(key).await?;
            return Ok(true);
        }

        let persisted = record
            .persisted_key()
            .map(<[JsonValue]>::to_vec)
            .ok_or_else(|| OrmError::UnknownColumn(key_columns.join(", ")))?;
        let restored = record.restore_key();
        if !restored.is_empty() {
            tracing::debug!(entity = mapping.name(), columns = ?restored, "key columns cannot change on save; restored");
        }
        let mut values = sorted_values(record, Some(key_columns.as_slice()));
        if values.is_empty() {
            record.mark_as_updated(None);
            return Ok(true);
        }
        let mut updated_at = None;
        if mapping.has_timestamps() {
            let now = self.now()?;
            values.retain(|(c, _)| c != "updated_at");
            values.push(("updated_at".to_string(), now.clone()));
            updated_at = Some(now);
        }
        let conditions = key_conditions(&key_columns, persisted);
        let affected = self
            .executor()
            .update(&Update::new(mapping.table_name(), values, conditions))
            .await?;
        tracing::debug!(entity = mapping.name(), affected, "record updated");
        record.mark_as_updated(updated_at);
        Ok(true)
    }

    /// Delete the stored row. New records have no row; returns `false` for them.
    pub async fn delete(&self, record: &mut Record) -> Result<bool, OrmError> {
        if record.is_read_only() {
            return Err(OrmError::ReadOnlyRecord);
        }
        if record.is_deleted() {
            return Err(OrmError::RecordDeleted);
        }
        if record.is_new() {
            return Ok(false);
        }
        let mapping = Arc::clone(record.mapping_arc());
        let key_columns = mapping.key().columns().to_vec();
        let persisted = match record.persisted_key() {
            Some(key) => key.to_vec(),
            None => record.raw_values(&key_columns)?,
        };
        let affected = self
            .executor()
            .delete(&Delete::new(mapping.table_name(), key_conditions(&key_columns, persisted)))
            .await?;
        record.mark_as_deleted();
        Ok(affected > 0)
    }

    fn now(&self) -> Result<JsonValue, OrmError> {
        let now = chrono::Utc::now().naive_utc();
        Ok(JsonValue::String(self.date_format().format(&now)?))
    }
}

/// Raw values to write, sorted by column. With `skip` set, only modified
/// columns outside `skip` are taken.
fn sorted_values(record: &Record, skip: Option<&[String]>) -> Vec<(String, JsonValue)> {
    let mut values: Vec<(String, JsonValue)> = match skip {
        None => record
            .raw_columns()
            .iter()
            .map(|(c, v)| (c.clone(), v.clone()))
            .collect(),
        Some(skip) => record
            .modified_columns()
            .into_iter()
            .filter(|c| !skip.iter().any(|k| k == c))
            .filter_map(|c| record.raw_column(c).map(|v| (c.to_string(), v.clone())))
            .collect(),
    };
    values.sort_by(|a, b| a.0.cmp(&b.0));
    values
}

pub(crate) fn key_conditions(columns: &[String], values: Vec<JsonValue>) -> Vec<Condition> {
    columns
        .iter()
        .zip(values)
        .map(|(c, v)| Condition::eq(c.as_str(), v))
        .collect()
}

/// Equality conditions on every key column for a key given as one value.
pub(crate) fn key_lookup(mapping: &EntityMapping, key: &JsonValue) -> Result<Vec<Condition>, OrmError> {
    let columns = mapping.key().columns();
    Ok(key_conditions(columns, key_parts(key, columns.len())?))
}

impl fmt::Debug for EntityManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.inner.mappings.keys().collect();
        names.sort();
        f.debug_struct("EntityManager")
            .field("date_format", &self.inner.date_format)
            .field("entities", &names)
            .finish()
    }
}
