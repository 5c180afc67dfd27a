//! Typed errors for mapping configuration and record access.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing reference: {kind} '{id}'")]
    MissingReference { kind: &'static str, id: String },
    #[error("invalid primary key: entity {entity} column {column}")]
    InvalidPrimaryKey { entity: String, column: String },
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),
    #[error("duplicate entity: {0}")]
    DuplicateEntity(String),
    #[error("config load: {0}")]
    Load(String),
    #[error("validation: {0}")]
    Validation(String),
}

#[derive(Error, Debug)]
pub enum OrmError {
    #[error("the record was deleted")]
    RecordDeleted,
    #[error("the record is read-only")]
    ReadOnlyRecord,
    #[error("unknown column '{0}'")]
    UnknownColumn(String),
    #[error("unknown relation '{0}'")]
    UnknownRelation(String),
    #[error("unsupported relation type: '{relation}' does not support {operation}")]
    UnsupportedRelationType {
        relation: String,
        operation: &'static str,
    },
    #[error("invalid cast type '{0}'")]
    InvalidCastType(String),
    #[error("conversion: {0}")]
    Conversion(String),
    #[error("unknown entity '{0}'")]
    UnknownEntity(String),
    #[error("key arity: expected {expected} value(s), got {got}")]
    KeyArity { expected: usize, got: usize },
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database: {0}")]
    Db(#[from] sqlx::Error),
    #[error("executor: {0}")]
    Executor(String),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}

impl OrmError {
    pub(crate) fn unsupported(relation: &str, operation: &'static str) -> Self {
        OrmError::UnsupportedRelationType {
            relation: relation.to_string(),
            operation,
        }
    }
}
