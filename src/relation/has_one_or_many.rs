//! Has-one and has-many: target rows hold the owner's key.

use super::{as_refine, refine_query, QueryCallback, Refine, RelationResult};
use crate::config::{EntityMapping, ForeignKey};
use crate::error::OrmError;
use crate::executor::Row;
use crate::loader::{LazyLoader, Source};
use crate::manager::EntityManager;
use crate::record::Record;
use crate::relation::key::distinct_keys;
use crate::sql::Select;

/// Target rows hold a foreign key to the owner.
#[derive(Clone)]
pub struct HasOneOrMany {
    entity: String,
    many: bool,
    foreign_key: Option<ForeignKey>,
    filter: Option<QueryCallback>,
}

impl HasOneOrMany {
    pub fn one(entity: impl Into<String>) -> Self {
        HasOneOrMany {
            entity: entity.into(),
            many: false,
            foreign_key: None,
            filter: None,
        }
    }

    pub fn many(entity: impl Into<String>) -> Self {
        HasOneOrMany {
            many: true,
            ..HasOneOrMany::one(entity)
        }
    }

    /// Target columns holding the owner's key; pairs are (owner key column, target column).
    pub fn foreign_key(mut self, key: ForeignKey) -> Self {
        self.foreign_key = Some(key);
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

    fn resolve_key(&self, owner: &EntityMapping) -> ForeignKey {
        self.foreign_key.clone().unwrap_or_else(|| owner.referencing_key())
    }

    pub(crate) async fn result(&self, owner: &Record, refine: Refine<'_>) -> Result<RelationResult, OrmError> {
        if owner.is_new() {
            return Ok(self.empty());
        }
        let manager = owner.manager();
        let target = manager.mapping(&self.entity)?;
        let fk = self.resolve_key(owner.mapping());
        let values = owner.raw_values(&fk.key_columns())?;
        let mut select = Select::new(target.table_name());
        for (column, value) in fk.foreign_columns().into_iter().zip(values) {
            select.where_eq(column, value);
        }
        refine_query(&mut select, self.filter.as_ref(), refine);
        if !self.many {
            select.limit(1);
        }
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
        let fk = self.resolve_key(owner);
        let owner_key = fk.key_columns();
        let target_key = fk.foreign_columns();
        let mut query = Select::new(target.table_name());
        query.where_in_tuple(target_key.clone(), distinct_keys(rows, &owner_key));
        refine_query(&mut query, self.filter.as_ref(), as_refine(refine));
        Ok(LazyLoader::new(
            manager.clone(),
            target,
            owner_key,
            Source::Direct { query, target_key },
            self.many,
        ))
    }

    /// Write the owner's key into `related`'s foreign key columns. The related
    /// record still has to be saved.
    pub(crate) async fn add_related(&self, owner: &mut Record, related: &mut Record) -> Result<(), OrmError> {
        let fk = self.resolve_key(owner.mapping());
        for (key, column) in fk.pairs() {
            let value = owner.get_column(key).await?;
            related.set_column(column, value).await?;
        }
        Ok(())
    }
}
