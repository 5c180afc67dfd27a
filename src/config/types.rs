//! Raw mapping config types, as deserialized from JSON.

use crate::cast::{DateFormat, DEFAULT_DATE_FORMAT};
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PrimaryKeyConfig {
    Single(String),
    Composite(Vec<String>),
}

impl PrimaryKeyConfig {
    pub fn columns(&self) -> Vec<String> {
        match self {
            PrimaryKeyConfig::Single(s) => vec![s.clone()],
            PrimaryKeyConfig::Composite(v) => v.clone(),
        }
    }
}

impl Default for PrimaryKeyConfig {
    fn default() -> Self {
        PrimaryKeyConfig::Single("id".into())
    }
}

/// Foreign key columns: a single column name, or key column -> foreign column.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ForeignKeyConfig {
    Single(String),
    Mapped(HashMap<String, String>),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKindConfig {
    BelongsTo,
    HasOne,
    HasMany,
    ShareOne,
    ShareMany,
}

impl RelationKindConfig {
    pub fn is_shared(self) -> bool {
        matches!(self, RelationKindConfig::ShareOne | RelationKindConfig::ShareMany)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JunctionConfig {
    pub table: String,
    /// Junction columns pointing at the owner's key.
    #[serde(default)]
    pub owner: Option<ForeignKeyConfig>,
    /// Junction columns pointing at the related entity's key.
    #[serde(default)]
    pub related: Option<ForeignKeyConfig>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RelationConfig {
    pub name: String,
    pub kind: RelationKindConfig,
    /// Target entity name.
    pub entity: String,
    #[serde(default)]
    pub foreign_key: Option<ForeignKeyConfig>,
    #[serde(default)]
    pub junction: Option<JunctionConfig>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EntityConfig {
    pub name: String,
    /// Defaults to the pluralized snake_case entity name.
    #[serde(default)]
    pub table: Option<String>,
    #[serde(default)]
    pub primary_key: PrimaryKeyConfig,
    /// How other entities name their columns referencing this one.
    #[serde(default)]
    pub foreign_key: Option<ForeignKeyConfig>,
    #[serde(default)]
    pub casts: HashMap<String, String>,
    #[serde(default)]
    pub fillable: Option<Vec<String>>,
    #[serde(default)]
    pub guarded: Option<Vec<String>>,
    #[serde(default)]
    pub timestamps: bool,
    #[serde(default)]
    pub relations: Vec<RelationConfig>,
}

/// Manager-wide settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ManagerConfig {
    #[serde(default = "default_date_format")]
    pub date_format: String,
    #[serde(default)]
    pub database_url: Option<String>,
}

fn default_date_format() -> String {
    DEFAULT_DATE_FORMAT.to_string()
}

impl Default for ManagerConfig {
    fn default() -> Self {
        ManagerConfig {
            date_format: default_date_format(),
            database_url: None,
        }
    }
}

impl ManagerConfig {
    pub fn date_format(&self) -> Result<DateFormat, ConfigError> {
        DateFormat::new(self.date_format.clone())
    }
}
