//! Share-one and share-many: owner and target joined through a junction table.

use super::{as_refine, refine_query, QueryCallback, Refine, RelationResult};
use crate::case::default_junction_table;
use crate::config::{EntityMapping, ForeignKey, Junction};
use crate::error::OrmError;
use crate::executor::Row;
use crate::loader::{LazyLoader, Source};
use crate::manager::EntityManager;
use crate::record::Record;
use crate::relation::key::{distinct_keys, key_parts};
use crate::sql::{Condition, Delete, Insert, Select};
use serde_json::Value as JsonValue;

/// Many-to-many through a junction table. The only relation kind that
/// supports `link` and `unlink`.
#[derive(Clone)]
pub struct ShareOneOrMany {
    entity: String,
    many: bool,
    foreign_key: Option<ForeignKey>,
    junction: Option<Junction>,
    filter: Option<QueryCallback>,
}

impl ShareOneOrMany {
    pub fn one(entity: impl Into<String>) -> Self {
        ShareOneOrMany {
            entity: entity.into(),
            many: false,
            foreign_key: None,
            junction: None,
            filter: None,
        }
    }

    pub fn many(entity: impl Into<String>) -> Self {
        ShareOneOrMany {
            many: true,
            ..ShareOneOrMany::one(entity)
        }
    }

    /// Junction columns holding the owner's key. Ignored when a full junction is set.
    pub fn foreign_key(mut self, key: ForeignKey) -> Self {
        self.foreign_key = Some(key);
        self
    }

    pub fn junction(mut self, junction: Junction) -> Self {
        self.junction = Some(junction);
        self
    }

    pub fn filter(mut self, f: QueryCallback) -> Self {
        self.filter = Some(f);
        self
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn is_many(&self) -> bool {
        self.many
    }

    fn empty(&self) -> RelationResult {
        if self.many {
            RelationResult::Many(Vec::new())
        } else {
            RelationResult::One(None)
        }
    }

    /// The configured junction, or the conventional one: table named after
    /// both entities, each side referenced by its own foreign key columns.
    pub fn resolve_junction(&self, owner: &EntityMapping, target: &EntityMapping) -> Junction {
        if let Some(junction) = &self.junction {
            return junction.clone();
        }
        Junction {
            table: default_junction_table(owner.name(), target.name()),
            owner: self.foreign_key.clone().unwrap_or_else(|| owner.referencing_key()),
            related: target.referencing_key(),
        }
    }

    pub(crate) async fn result(&self, owner: &Record, refine: Refine<'_>) -> Result<RelationResult, OrmError> {
        if owner.is_new() {
            return Ok(self.empty());
        }
        let manager = owner.manager();
        let target = manager.mapping(&self.entity)?;
        let junction = self.resolve_junction(owner.mapping(), &target);
        let owner_values = owner.raw_values(&junction.owner.key_columns())?;

        let mut links = Select::new(junction.table.as_str());
        for (column, value) in junction.owner.foreign_columns().into_iter().zip(owner_values) {
            links.where_eq(column, value);
        }
        let rows = manager.executor().fetch_all(&links).await?;
        let keys = distinct_keys(&rows, &junction.related.foreign_columns());
        if keys.is_empty() {
            return Ok(self.empty());
        }

        let mut select = Select::new(target.table_name());
        select.where_in_tuple(junction.related.key_columns(), keys);
        refine_query(&mut select, self.filter.as_ref(), refine);
        let found = manager.fetch_records(&target, &select).await?;
        Ok(if self.many {
            RelationResult::Many(found)
        } else {
            RelationResult::One(found.into_iter().next())
        })
    }

    pub(crate) fn lazy_loader(
        &self,
        manager: &EntityManager,
        owner: &EntityMapping,
        rows: &[Row],
        refine: Option<&QueryCallback>,
    ) -> Result<LazyLoader, OrmError> {
        let target = manager.mapping(&self.entity)?;
        let junction = self.resolve_junction(owner, &target);
        let owner_key = junction.owner.key_columns();
        let owner_columns = junction.owner.foreign_columns();
        let mut links = Select::new(junction.table.as_str());
        links.where_in_tuple(owner_columns.clone(), distinct_keys(rows, &owner_key));
        let mut query = Select::new(target.table_name());
        refine_query(&mut query, self.filter.as_ref(), as_refine(refine));
        Ok(LazyLoader::new(
            manager.clone(),
            target,
            owner_key,
            Source::Junction {
                links,
                owner_columns,
                related_columns: junction.related.foreign_columns(),
                query,
                target_key: junction.related.key_columns(),
            },
            self.many,
        ))
    }

    /// Insert one junction row per item. Items are target keys: a scalar, or
    /// an array for composite keys.
    pub(crate) async fn link(&self, owner: &Record, items: &[JsonValue]) -> Result<(), OrmError> {
        let manager = owner.manager();
        let target = manager.mapping(&self.entity)?;
        let junction = self.resolve_junction(owner.mapping(), &target);
        let owner_values = owner.raw_values(&junction.owner.key_columns())?;
        for item in items {
            let parts = key_parts(item, junction.related.pairs().len())?;
            let values: Vec<(String, JsonValue)> = junction
                .owner
                .foreign_columns()
                .into_iter()
                .zip(owner_values.iter().cloned())
                .chain(junction.related.foreign_columns().into_iter().zip(parts))
                .collect();
            manager.executor().insert(&Insert::new(junction.table.as_str(), values)).await?;
        }
        Ok(())
    }

    /// Delete the junction rows joining the owner to any of `items`.
    pub(crate) async fn unlink(&self, owner: &Record, items: &[JsonValue]) -> Result<(), OrmError> {
        if items.is_empty() {
            return Ok(());
        }
        let manager = owner.manager();
        let target = manager.mapping(&self.entity)?;
        let junction = self.resolve_junction(owner.mapping(), &target);
        let owner_values = owner.raw_values(&junction.owner.key_columns())?;
        let arity = junction.related.pairs().len();
        let keys = items
            .iter()
            .map(|item| key_parts(item, arity))
            .collect::<Result<Vec<_>, _>>()?;
        let mut conditions: Vec<Condition> = junction
            .owner
            .foreign_columns()
            .into_iter()
            .zip(owner_values)
            .map(|(column, value)| Condition::eq(column, value))
            .collect();
        conditions.push(Condition::is_in(junction.related.foreign_columns(), keys));
        manager.executor().delete(&Delete::new(junction.table.as_str(), conditions)).await?;
        Ok(())
    }
}
