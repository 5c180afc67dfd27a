//! Load mapping config from JSON and resolve it into runtime mappings.

use crate::cast::{Cast, DEFAULT_DATE_FORMAT};
use crate::config::resolved::{EntityMapping, ForeignKey, Junction, PrimaryKey};
use crate::config::types::*;
use crate::config::validate;
use crate::error::ConfigError;
use crate::relation::{BelongsTo, HasOneOrMany, Relation, ShareOneOrMany};
use std::collections::HashMap;
use std::path::Path;

/// Parse entity configs from JSON: either an array of entities or an object
/// with an `entities` array.
pub fn load_from_str(json: &str) -> Result<Vec<EntityConfig>, ConfigError> {
    #[derive(serde::Deserialize)]
    #[serde(untagged)]
    enum Document {
        List(Vec<EntityConfig>),
        Wrapped { entities: Vec<EntityConfig> },
    }
    let doc: Document = serde_json::from_str(json).map_err(|e| ConfigError::Load(e.to_string()))?;
    Ok(match doc {
        Document::List(entities) | Document::Wrapped { entities } => entities,
    })
}

pub fn load_from_file(path: impl AsRef<Path>) -> Result<Vec<EntityConfig>, ConfigError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))?;
    load_from_str(&text)
}

impl ManagerConfig {
    /// Read `.env` if present, then `DATABASE_URL` and `RELMAP_DATE_FORMAT`.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let config = ManagerConfig {
            date_format: std::env::var("RELMAP_DATE_FORMAT").unwrap_or_else(|_| DEFAULT_DATE_FORMAT.to_string()),
            database_url: std::env::var("DATABASE_URL").ok(),
        };
        config.date_format()?;
        Ok(config)
    }
}

/// Build runtime mappings from configs (validates first).
pub fn resolve(entities: &[EntityConfig]) -> Result<Vec<EntityMapping>, ConfigError> {
    validate(entities)?;

    let keys: HashMap<&str, PrimaryKey> = entities
        .iter()
        .map(|e| (e.name.as_str(), PrimaryKey::new(e.primary_key.columns())))
        .collect();
    let mut referencing: HashMap<&str, ForeignKey> = HashMap::new();
    for e in entities {
        let key = &keys[e.name.as_str()];
        let fk = match &e.foreign_key {
            Some(fk) => ForeignKey::from_config(fk, key)?,
            None => ForeignKey::for_entity(&e.name, key),
        };
        referencing.insert(e.name.as_str(), fk);
    }

    let mut mappings = Vec::with_capacity(entities.len());
    for e in entities {
        let key = &keys[e.name.as_str()];
        let mut mapping = EntityMapping::new(e.name.clone())
            .primary_key(key.clone())
            .timestamps(e.timestamps);
        if let Some(table) = &e.table {
            mapping = mapping.table(table.clone());
        }
        if e.foreign_key.is_some() {
            mapping = mapping.foreign_key(referencing[e.name.as_str()].clone());
        }
        if let Some(fillable) = &e.fillable {
            mapping = mapping.fillable(fillable.iter().cloned());
        }
        if let Some(guarded) = &e.guarded {
            mapping = mapping.guarded(guarded.iter().cloned());
        }
        for (column, cast) in &e.casts {
            let cast: Cast = cast
                .parse()
                .map_err(|err| ConfigError::Validation(format!("entity {} column {}: {}", e.name, column, err)))?;
            mapping = mapping.cast(column.clone(), cast);
        }
        for r in &e.relations {
            let target_key = &keys[r.entity.as_str()];
            let relation = match r.kind {
                RelationKindConfig::BelongsTo => {
                    let mut rel = BelongsTo::new(r.entity.clone());
                    if let Some(fk) = &r.foreign_key {
                        rel = rel.foreign_key(ForeignKey::from_config(fk, target_key)?);
                    }
                    Relation::from(rel)
                }
                RelationKindConfig::HasOne | RelationKindConfig::HasMany => {
                    let mut rel = if r.kind == RelationKindConfig::HasMany {
                        HasOneOrMany::many(r.entity.clone())
                    } else {
                        HasOneOrMany::one(r.entity.clone())
                    };
                    if let Some(fk) = &r.foreign_key {
                        rel = rel.foreign_key(ForeignKey::from_config(fk, key)?);
                    }
                    Relation::from(rel)
                }
                RelationKindConfig::ShareOne | RelationKindConfig::ShareMany => {
                    let mut rel = if r.kind == RelationKindConfig::ShareMany {
                        ShareOneOrMany::many(r.entity.clone())
                    } else {
                        ShareOneOrMany::one(r.entity.clone())
                    };
                    if let Some(fk) = &r.foreign_key {
                        rel = rel.foreign_key(ForeignKey::from_config(fk, key)?);
                    }
                    if let Some(j) = &r.junction {
                        let owner = match (&j.owner, &r.foreign_key) {
                            (Some(fk), _) | (None, Some(fk)) => ForeignKey::from_config(fk, key)?,
                            (None, None) => referencing[e.name.as_str()].clone(),
                        };
                        let related = match &j.related {
                            Some(fk) => ForeignKey::from_config(fk, target_key)?,
                            None => referencing[r.entity.as_str()].clone(),
                        };
                        rel = rel.junction(Junction {
                            table: j.table.clone(),
                            owner,
                            related,
                        });
                    }
                    Relation::from(rel)
                }
            };
            mapping = mapping.relation(r.name.clone(), relation);
        }
        mappings.push(mapping);
    }
    tracing::debug!(entities = mappings.len(), "mapping config resolved");
    Ok(mappings)
}
