//! Belongs-to: the owner row holds the foreign key.

use super::{as_refine, refine_query, QueryCallback, Refine, RelationResult};
use crate::config::{EntityMapping, ForeignKey};
use crate::error::OrmError;
use crate::executor::Row;
use crate::loader::{LazyLoader, Source};
use crate::manager::EntityManager;
use crate::record::Record;
use crate::relation::key::distinct_keys;
use crate::sql::Select;
use crate::value::Value;

/// The owner row holds a foreign key to one target row.
#[derive(Clone)]
pub struct BelongsTo {
    entity: String,
    foreign_key: Option<ForeignKey>,
    filter: Option<QueryCallback>,
}

impl BelongsTo {
    pub fn new(entity: impl Into<String>) -> Self {
        BelongsTo {
            entity: entity.into(),
            foreign_key: None,
            filter: None,
        }
    }

    /// Owner columns holding the target's key; pairs are (target key column, owner column).
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

    fn resolve_key(&self, target: &EntityMapping) -> ForeignKey {
        self.foreign_key.clone().unwrap_or_else(|| target.referencing_key())
    }

    pub(crate) async fn result(&self, owner: &Record, refine: Refine<'_>) -> Result<RelationResult, OrmError> {
        let manager = owner.manager();
        let target = manager.mapping(&self.entity)?;
        let fk = self.resolve_key(&target);
        let values = match owner.raw_values(&fk.foreign_columns()) {
            Err(OrmError::UnknownColumn(_)) if owner.is_new() => return Ok(RelationResult::One(None)),
            values => values?,
        };
        if values.iter().any(|v| v.is_null()) {
            return Ok(RelationResult::One(None));
        }
        let mut select = Select::new(target.table_name());
        for (column, value) in fk.key_columns().into_iter().zip(values) {
            select.where_eq(column, value);
        }
        refine_query(&mut select, self.filter.as_ref(), refine);
        select.limit(1);
        let found = manager.fetch_records(&target, &select).await?;
        Ok(RelationResult::One(found.into_iter().next()))
    }

    pub(crate) fn lazy_loader(
        &self,
        manager: &EntityManager,
        rows: &[Row],
        refine: Option<&QueryCallback>,
    ) -> Result<LazyLoader, OrmError> {
        let target = manager.mapping(&self.entity)?;
        let fk = self.resolve_key(&target);
        let owner_key = fk.foreign_columns();
        let target_key = fk.key_columns();
        let mut query = Select::new(target.table_name());
        query.where_in_tuple(target_key.clone(), distinct_keys(rows, &owner_key));
        refine_query(&mut query, self.filter.as_ref(), as_refine(refine));
        Ok(LazyLoader::new(
            manager.clone(),
            target,
            owner_key,
            Source::Direct { query, target_key },
            false,
        ))
    }

    /// Point the owner at `related`, or clear the foreign key when `None`.
    pub(crate) async fn add_related(&self, owner: &mut Record, related: Option<&mut Record>) -> Result<(), OrmError> {
        let target = owner.manager().mapping(&self.entity)?;
        let fk = self.resolve_key(&target);
        match related {
            None => {
                for column in fk.foreign_columns() {
                    owner.set_column(&column, Value::Null).await?;
                }
            }
            Some(related) => {
                let mut values = Vec::with_capacity(fk.pairs().len());
                for (key, _) in fk.pairs() {
                    values.push(related.get_column(key).await?);
                }
                for ((_, column), value) in fk.pairs().iter().zip(values) {
                    owner.set_column(column, value).await?;
                }
            }
        }
        Ok(())
    }
}
