//! Resolved entity mapping: config validated and flattened for runtime use.

use crate::case::{default_foreign_key_column, default_table_name};
use crate::cast::Cast;
use crate::config::ForeignKeyConfig;
use crate::error::{ConfigError, OrmError};
use crate::relation::Relation;
use crate::value::Value;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Getter or setter hook for one column.
pub type Accessor = Arc<dyn Fn(Value) -> Value + Send + Sync>;

/// Produces primary key values for a new record from its raw columns, before insert.
pub type KeyGenerator = Arc<dyn Fn(&HashMap<String, JsonValue>) -> Result<Vec<JsonValue>, OrmError> + Send + Sync>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PrimaryKey {
    columns: Vec<String>,
}

impl PrimaryKey {
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        PrimaryKey {
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn is_composite(&self) -> bool {
        self.columns.len() > 1
    }

    pub fn contains(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }
}

impl Default for PrimaryKey {
    fn default() -> Self {
        PrimaryKey::new(["id"])
    }
}

/// Pairs of (referenced key column, referencing column).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ForeignKey {
    pairs: Vec<(String, String)>,
}

impl ForeignKey {
    pub fn new<I, K, F>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, F)>,
        K: Into<String>,
        F: Into<String>,
    {
        ForeignKey {
            pairs: pairs.into_iter().map(|(k, f)| (k.into(), f.into())).collect(),
        }
    }

    pub fn single(key_column: impl Into<String>, foreign_column: impl Into<String>) -> Self {
        ForeignKey::new([(key_column.into(), foreign_column.into())])
    }

    /// Conventional foreign key referencing `entity`'s primary key, e.g. `id` -> `user_id`.
    pub fn for_entity(entity: &str, key: &PrimaryKey) -> Self {
        ForeignKey::new(
            key.columns()
                .iter()
                .map(|c| (c.clone(), default_foreign_key_column(entity, c))),
        )
    }

    /// Resolve a configured foreign key against the key it references.
    pub fn from_config(config: &ForeignKeyConfig, referenced: &PrimaryKey) -> Result<Self, ConfigError> {
        match config {
            ForeignKeyConfig::Single(column) => {
                if referenced.is_composite() {
                    return Err(ConfigError::Validation(format!(
                        "foreign key '{}' must map each of the composite key columns {:?}",
                        column,
                        referenced.columns()
                    )));
                }
                Ok(ForeignKey::single(referenced.columns()[0].clone(), column.clone()))
            }
            ForeignKeyConfig::Mapped(map) => {
                let mut pairs = Vec::with_capacity(referenced.columns().len());
                for key in referenced.columns() {
                    let column = map.get(key).ok_or_else(|| ConfigError::MissingReference {
                        kind: "foreign key column for",
                        id: key.clone(),
                    })?;
                    pairs.push((key.clone(), column.clone()));
                }
                Ok(ForeignKey { pairs })
            }
        }
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }

    pub fn key_columns(&self) -> Vec<String> {
        self.pairs.iter().map(|(k, _)| k.clone()).collect()
    }

    pub fn foreign_columns(&self) -> Vec<String> {
        self.pairs.iter().map(|(_, f)| f.clone()).collect()
    }
}

/// Junction table for share relations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Junction {
    pub table: String,
    /// Owner key -> junction column.
    pub owner: ForeignKey,
    /// Related key -> junction column.
    pub related: ForeignKey,
}

/// How one entity type maps onto its table.
#[derive(Clone)]
pub struct EntityMapping {
    name: String,
    table: String,
    primary_key: PrimaryKey,
    foreign_key: Option<ForeignKey>,
    casts: HashMap<String, Cast>,
    getters: HashMap<String, Accessor>,
    setters: HashMap<String, Accessor>,
    fillable: Option<Vec<String>>,
    guarded: Option<Vec<String>>,
    timestamps: bool,
    relations: HashMap<String, Relation>,
    key_generator: Option<KeyGenerator>,
}

impl EntityMapping {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        EntityMapping {
            table: default_table_name(&name),
            name,
            primary_key: PrimaryKey::default(),
            foreign_key: None,
            casts: HashMap::new(),
            getters: HashMap::new(),
            setters: HashMap::new(),
            fillable: None,
            guarded: None,
            timestamps: false,
            relations: HashMap::new(),
            key_generator: None,
        }
    }

    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    pub fn primary_key(mut self, key: PrimaryKey) -> Self {
        self.primary_key = key;
        self
    }

    pub fn foreign_key(mut self, key: ForeignKey) -> Self {
        self.foreign_key = Some(key);
        self
    }

    pub fn cast(mut self, column: impl Into<String>, cast: Cast) -> Self {
        self.casts.insert(column.into(), cast);
        self
    }

    pub fn getter<F>(mut self, column: impl Into<String>, f: F) -> Self
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        self.getters.insert(column.into(), Arc::new(f));
        self
    }

    pub fn setter<F>(mut self, column: impl Into<String>, f: F) -> Self
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        self.setters.insert(column.into(), Arc::new(f));
        self
    }

    pub fn fillable<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fillable = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    pub fn guarded<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.guarded = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    pub fn timestamps(mut self, enabled: bool) -> Self {
        self.timestamps = enabled;
        self
    }

    pub fn relation(mut self, name: impl Into<String>, relation: Relation) -> Self {
        self.relations.insert(name.into(), relation);
        self
    }

    pub fn key_generator<F>(mut self, f: F) -> Self
    where
        F: Fn(&HashMap<String, JsonValue>) -> Result<Vec<JsonValue>, OrmError> + Send + Sync + 'static,
    {
        self.key_generator = Some(Arc::new(f));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table_name(&self) -> &str {
        &self.table
    }

    pub fn key(&self) -> &PrimaryKey {
        &self.primary_key
    }

    /// Columns other entities use to reference this one.
    pub fn referencing_key(&self) -> ForeignKey {
        self.foreign_key
            .clone()
            .unwrap_or_else(|| ForeignKey::for_entity(&self.name, &self.primary_key))
    }

    pub fn cast_for(&self, column: &str) -> Option<&Cast> {
        self.casts.get(column)
    }

    pub fn getter_for(&self, column: &str) -> Option<&Accessor> {
        self.getters.get(column)
    }

    pub fn setter_for(&self, column: &str) -> Option<&Accessor> {
        self.setters.get(column)
    }

    pub fn fillable_columns(&self) -> Option<&[String]> {
        self.fillable.as_deref()
    }

    pub fn guarded_columns(&self) -> Option<&[String]> {
        self.guarded.as_deref()
    }

    pub fn has_timestamps(&self) -> bool {
        self.timestamps
    }

    pub fn relations(&self) -> &HashMap<String, Relation> {
        &self.relations
    }

    pub fn relation_named(&self, name: &str) -> Result<&Relation, OrmError> {
        self.relations
            .get(name)
            .ok_or_else(|| OrmError::UnknownRelation(name.to_string()))
    }

    pub fn generator(&self) -> Option<&KeyGenerator> {
        self.key_generator.as_ref()
    }

    /// Keep only the columns `assign` is allowed to write.
    pub fn filter_assignable<I>(&self, columns: I) -> Vec<(String, Value)>
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        let allowed = |name: &str| match (&self.fillable, &self.guarded) {
            (Some(fillable), _) => fillable.iter().any(|c| c == name),
            (None, Some(guarded)) => !guarded.iter().any(|c| c == name),
            (None, None) => true,
        };
        columns.into_iter().filter(|(name, _)| allowed(name)).collect()
    }
}

impl fmt::Debug for EntityMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityMapping")
            .field("name", &self.name)
            .field("table", &self.table)
            .field("primary_key", &self.primary_key)
            .field("casts", &self.casts)
            .field("getters", &self.getters.keys().collect::<Vec<_>>())
            .field("setters", &self.setters.keys().collect::<Vec<_>>())
            .field("fillable", &self.fillable)
            .field("guarded", &self.guarded)
            .field("timestamps", &self.timestamps)
            .field("relations", &self.relations.keys().collect::<Vec<_>>())
            .finish()
    }
}
