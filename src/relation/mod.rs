//! Relation descriptors.
//!
//! A [`Relation`] is static mapping data: which entity it targets, which
//! columns connect the two sides and an optional refinement applied to every
//! target query. Records hand themselves to the descriptor to resolve or
//! mutate the relation.

mod belongs_to;
mod has_one_or_many;
pub(crate) mod key;
mod share_one_or_many;

pub use belongs_to::BelongsTo;
pub use has_one_or_many::HasOneOrMany;
pub use share_one_or_many::ShareOneOrMany;

use crate::config::{EntityMapping, ForeignKey};
use crate::entity::Entity;
use crate::error::OrmError;
use crate::executor::Row;
use crate::loader::LazyLoader;
use crate::manager::EntityManager;
use crate::record::Record;
use crate::sql::Select;
use std::fmt;
use std::sync::Arc;

/// Refinement applied to a relation's target query.
pub type QueryCallback = Arc<dyn Fn(&mut Select) + Send + Sync>;

/// Per-call refinement passed to [`Record::get_related_with`].
pub type Refine<'a> = Option<&'a (dyn Fn(&mut Select) + Send + Sync)>;

#[derive(Clone)]
pub enum Relation {
    BelongsTo(BelongsTo),
    HasOneOrMany(HasOneOrMany),
    ShareOneOrMany(ShareOneOrMany),
}

impl Relation {
    pub fn belongs_to(entity: impl Into<String>) -> Self {
        Relation::BelongsTo(BelongsTo::new(entity))
    }

    pub fn has_one(entity: impl Into<String>) -> Self {
        Relation::HasOneOrMany(HasOneOrMany::one(entity))
    }

    pub fn has_many(entity: impl Into<String>) -> Self {
        Relation::HasOneOrMany(HasOneOrMany::many(entity))
    }

    pub fn share_one(entity: impl Into<String>) -> Self {
        Relation::ShareOneOrMany(ShareOneOrMany::one(entity))
    }

    pub fn share_many(entity: impl Into<String>) -> Self {
        Relation::ShareOneOrMany(ShareOneOrMany::many(entity))
    }

    /// Explicit foreign key. For share relations these are the junction's
    /// owner-side columns.
    pub fn foreign_key(self, key: ForeignKey) -> Self {
        match self {
            Relation::BelongsTo(r) => Relation::BelongsTo(r.foreign_key(key)),
            Relation::HasOneOrMany(r) => Relation::HasOneOrMany(r.foreign_key(key)),
            Relation::ShareOneOrMany(r) => Relation::ShareOneOrMany(r.foreign_key(key)),
        }
    }

    pub fn filter<F>(self, f: F) -> Self
    where
        F: Fn(&mut Select) + Send + Sync + 'static,
    {
        let f: QueryCallback = Arc::new(f);
        match self {
            Relation::BelongsTo(r) => Relation::BelongsTo(r.filter(f)),
            Relation::HasOneOrMany(r) => Relation::HasOneOrMany(r.filter(f)),
            Relation::ShareOneOrMany(r) => Relation::ShareOneOrMany(r.filter(f)),
        }
    }

    /// Target entity name.
    pub fn entity(&self) -> &str {
        match self {
            Relation::BelongsTo(r) => r.entity(),
            Relation::HasOneOrMany(r) => r.entity(),
            Relation::ShareOneOrMany(r) => r.entity(),
        }
    }

    pub fn is_many(&self) -> bool {
        match self {
            Relation::BelongsTo(_) => false,
            Relation::HasOneOrMany(r) => r.is_many(),
            Relation::ShareOneOrMany(r) => r.is_many(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Relation::BelongsTo(_) => "belongs_to",
            Relation::HasOneOrMany(r) if r.is_many() => "has_many",
            Relation::HasOneOrMany(_) => "has_one",
            Relation::ShareOneOrMany(r) if r.is_many() => "share_many",
            Relation::ShareOneOrMany(_) => "share_one",
        }
    }

    /// Resolve the relation for one owner with on-demand queries.
    pub(crate) async fn result(&self, owner: &Record, refine: Refine<'_>) -> Result<RelationResult, OrmError> {
        match self {
            Relation::BelongsTo(r) => r.result(owner, refine).await,
            Relation::HasOneOrMany(r) => r.result(owner, refine).await,
            Relation::ShareOneOrMany(r) => r.result(owner, refine).await,
        }
    }

    /// Batch loader resolving this relation for every owner in `rows`.
    pub(crate) fn lazy_loader(
        &self,
        manager: &EntityManager,
        owner: &EntityMapping,
        rows: &[Row],
        refine: Option<&QueryCallback>,
    ) -> Result<LazyLoader, OrmError> {
        match self {
            Relation::BelongsTo(r) => r.lazy_loader(manager, rows, refine),
            Relation::HasOneOrMany(r) => r.lazy_loader(manager, owner, rows, refine),
            Relation::ShareOneOrMany(r) => r.lazy_loader(manager, owner, rows, refine),
        }
    }
}

impl From<BelongsTo> for Relation {
    fn from(r: BelongsTo) -> Self {
        Relation::BelongsTo(r)
    }
}

impl From<HasOneOrMany> for Relation {
    fn from(r: HasOneOrMany) -> Self {
        Relation::HasOneOrMany(r)
    }
}

impl From<ShareOneOrMany> for Relation {
    fn from(r: ShareOneOrMany) -> Self {
        Relation::ShareOneOrMany(r)
    }
}

impl fmt::Debug for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Relation")
            .field("kind", &self.kind())
            .field("entity", &self.entity())
            .finish()
    }
}

/// Apply the static relation filter, then the per-call refinement.
pub(crate) fn refine_query(select: &mut Select, filter: Option<&QueryCallback>, refine: Refine<'_>) {
    if let Some(f) = filter {
        f(select);
    }
    if let Some(f) = refine {
        f(select);
    }
}

pub(crate) fn as_refine(f: Option<&QueryCallback>) -> Refine<'_> {
    match f {
        Some(f) => {
            let f: &(dyn Fn(&mut Select) + Send + Sync) = f.as_ref();
            Some(f)
        }
        None => None,
    }
}

/// Resolved relation: one optional record, or an ordered list.
#[derive(Clone, Debug)]
pub enum RelationResult {
    One(Option<Record>),
    Many(Vec<Record>),
}

impl RelationResult {
    pub fn as_one(&self) -> Option<&Record> {
        match self {
            RelationResult::One(r) => r.as_ref(),
            RelationResult::Many(v) => v.first(),
        }
    }

    pub fn as_many(&self) -> &[Record] {
        match self {
            RelationResult::One(Some(r)) => std::slice::from_ref(r),
            RelationResult::One(None) => &[],
            RelationResult::Many(v) => v,
        }
    }

    pub fn into_one(self) -> Option<Record> {
        match self {
            RelationResult::One(r) => r,
            RelationResult::Many(v) => v.into_iter().next(),
        }
    }

    pub fn into_many(self) -> Vec<Record> {
        match self {
            RelationResult::One(r) => r.into_iter().collect(),
            RelationResult::Many(v) => v,
        }
    }

    pub fn len(&self) -> usize {
        self.as_many().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_entities<E: Entity>(self) -> Vec<E> {
        self.into_many().into_iter().map(E::from_record).collect()
    }
}
