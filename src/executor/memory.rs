//! In-process tables interpreting the statement model directly.

use super::{Executor, Row};
use crate::error::OrmError;
use crate::relation::key::token;
use crate::sql::{Condition, Delete, Insert, Select, Update};
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoggedStatement {
    pub kind: StatementKind,
    pub table: String,
}

/// Executor over in-memory tables. Every statement is logged so callers can
/// check which tables were touched.
#[derive(Debug, Default)]
pub struct MemoryExecutor {
    tables: Mutex<HashMap<String, Vec<Row>>>,
    log: Mutex<Vec<LoggedStatement>>,
}

impl MemoryExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a table with JSON objects; non-object values are ignored.
    pub fn with_table(self, table: &str, rows: Vec<JsonValue>) -> Self {
        {
            let mut tables = lock(&self.tables);
            let entry = tables.entry(table.to_string()).or_default();
            for row in rows {
                if let JsonValue::Object(map) = row {
                    entry.push(map.into_iter().collect());
                }
            }
        }
        self
    }

    pub fn rows(&self, table: &str) -> Vec<Row> {
        lock(&self.tables).get(table).cloned().unwrap_or_default()
    }

    pub fn statements(&self) -> Vec<LoggedStatement> {
        lock(&self.log).clone()
    }

    pub fn count(&self, kind: StatementKind, table: &str) -> usize {
        lock(&self.log)
            .iter()
            .filter(|s| s.kind == kind && s.table == table)
            .count()
    }

    pub fn clear_log(&self) {
        lock(&self.log).clear();
    }

    fn record(&self, kind: StatementKind, table: &str) {
        tracing::debug!(?kind, table, "memory statement");
        lock(&self.log).push(LoggedStatement {
            kind,
            table: table.to_string(),
        });
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

fn matches(row: &Row, condition: &Condition) -> bool {
    match condition {
        Condition::Eq { column, value } if value.is_null() => row.get(column).map_or(true, JsonValue::is_null),
        Condition::Eq { column, value } => {
            let cell = row.get(column).and_then(token);
            cell.is_some() && cell == token(value)
        }
        Condition::IsNull { column } => row.get(column).map_or(true, JsonValue::is_null),
        Condition::In { columns, values } => values.iter().any(|tuple| {
            columns.len() == tuple.len()
                && columns.iter().zip(tuple).all(|(c, v)| {
                    let cell = row.get(c).and_then(token);
                    cell.is_some() && cell == token(v)
                })
        }),
    }
}

fn matches_all(row: &Row, conditions: &[Condition]) -> bool {
    conditions.iter().all(|c| matches(row, c))
}

fn compare(a: Option<&JsonValue>, b: Option<&JsonValue>) -> Ordering {
    match (a, b) {
        (Some(JsonValue::Number(x)), Some(JsonValue::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(JsonValue::String(x)), Some(JsonValue::String(y))) => x.cmp(y),
        (None | Some(JsonValue::Null), None | Some(JsonValue::Null)) => Ordering::Equal,
        (None | Some(JsonValue::Null), _) => Ordering::Less,
        (_, None | Some(JsonValue::Null)) => Ordering::Greater,
        (Some(x), Some(y)) => x.to_string().cmp(&y.to_string()),
    }
}

#[async_trait]
impl Executor for MemoryExecutor {
    async fn fetch_all(&self, select: &Select) -> Result<Vec<Row>, OrmError> {
        self.record(StatementKind::Select, select.table());
        let mut rows: Vec<Row> = lock(&self.tables)
            .get(select.table())
            .map(|rows| {
                rows.iter()
                    .filter(|r| matches_all(r, select.conditions()))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        if !select.ordering().is_empty() {
            rows.sort_by(|a, b| {
                select
                    .ordering()
                    .iter()
                    .map(|(col, asc)| {
                        let ord = compare(a.get(col), b.get(col));
                        if *asc {
                            ord
                        } else {
                            ord.reverse()
                        }
                    })
                    .find(|o| *o != Ordering::Equal)
                    .unwrap_or(Ordering::Equal)
            });
        }
        let offset = select.offset_value().unwrap_or(0) as usize;
        let limit = select.limit_value().map_or(usize::MAX, |n| n as usize);
        let rows = rows.into_iter().skip(offset).take(limit);
        Ok(match select.projection() {
            Some(cols) if !cols.is_empty() => rows
                .map(|r| {
                    cols.iter()
                        .map(|c| (c.clone(), r.get(c).cloned().unwrap_or(JsonValue::Null)))
                        .collect()
                })
                .collect(),
            _ => rows.collect(),
        })
    }

    async fn insert(&self, insert: &Insert) -> Result<Option<Row>, OrmError> {
        self.record(StatementKind::Insert, &insert.table);
        let mut tables = lock(&self.tables);
        let table = tables.entry(insert.table.clone()).or_default();
        let mut row: Row = insert.values.iter().cloned().collect();
        // Emulate a serial column for a missing single returning column.
        if let [column] = insert.returning.as_slice() {
            if row.get(column).map_or(true, JsonValue::is_null) {
                let next = table
                    .iter()
                    .filter_map(|r| r.get(column).and_then(JsonValue::as_i64))
                    .max()
                    .unwrap_or(0)
                    + 1;
                row.insert(column.clone(), JsonValue::from(next));
            }
        }
        let returned = if insert.returning.is_empty() {
            None
        } else {
            Some(
                insert
                    .returning
                    .iter()
                    .map(|c| (c.clone(), row.get(c).cloned().unwrap_or(JsonValue::Null)))
                    .collect(),
            )
        };
        table.push(row);
        Ok(returned)
    }

    async fn update(&self, update: &Update) -> Result<u64, OrmError> {
        self.record(StatementKind::Update, &update.table);
        let mut tables = lock(&self.tables);
        let mut affected = 0;
        if let Some(rows) = tables.get_mut(&update.table) {
            for row in rows.iter_mut().filter(|r| matches_all(r, &update.conditions)) {
                for (column, value) in &update.values {
                    row.insert(column.clone(), value.clone());
                }
                affected += 1;
            }
        }
        Ok(affected)
    }

    async fn delete(&self, delete: &Delete) -> Result<u64, OrmError> {
        self.record(StatementKind::Delete, &delete.table);
        let mut tables = lock(&self.tables);
        let Some(rows) = tables.get_mut(&delete.table) else { return Ok(0) };
        let before = rows.len();
        rows.retain(|r| !matches_all(r, &delete.conditions));
        Ok((before - rows.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn executor() -> MemoryExecutor {
        MemoryExecutor::new().with_table(
            "users",
            vec![
                json!({"id": 1, "name": "ann", "age": 30}),
                json!({"id": 2, "name": "bob", "age": 25}),
                json!({"id": 3, "name": "cy", "age": null}),
            ],
        )
    }

    #[tokio::test]
    async fn filters_orders_and_projects() {
        let ex = executor();
        let mut select = Select::new("users");
        select.where_in("id", vec![json!("1"), json!(2)]).order_by("age", true).columns(["name"]);
        let rows = ex.fetch_all(&select).await.unwrap();
        let names: Vec<_> = rows.iter().map(|r| r["name"].clone()).collect();
        assert_eq!(names, vec![json!("bob"), json!("ann")]);
        assert_eq!(rows[0].len(), 1);
    }

    #[tokio::test]
    async fn null_equality_matches_null_cells() {
        let ex = executor();
        let mut select = Select::new("users");
        select.where_eq("age", JsonValue::Null);
        let rows = ex.fetch_all(&select).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["id"], json!(3));
    }

    #[tokio::test]
    async fn insert_generates_serial_keys() {
        let ex = executor();
        let insert = Insert::new("users", vec![("name".into(), json!("dee"))]).returning(vec!["id".into()]);
        let returned = ex.insert(&insert).await.unwrap().unwrap();
        assert_eq!(returned["id"], json!(4));
        assert_eq!(ex.rows("users").len(), 4);
        assert_eq!(ex.count(StatementKind::Insert, "users"), 1);
    }

    #[tokio::test]
    async fn update_and_delete_report_affected_rows() {
        let ex = executor();
        let update = Update::new("users", vec![("age".into(), json!(31))], vec![Condition::eq("id", 1)]);
        assert_eq!(ex.update(&update).await.unwrap(), 1);
        let delete = Delete::new("users", vec![Condition::eq("name", "nobody")]);
        assert_eq!(ex.delete(&delete).await.unwrap(), 0);
        let delete = Delete::new("users", vec![Condition::eq("id", 2)]);
        assert_eq!(ex.delete(&delete).await.unwrap(), 1);
        let ages: Vec<_> = ex.rows("users").iter().map(|r| r["age"].clone()).collect();
        assert_eq!(ages, vec![json!(31), JsonValue::Null]);
    }
}
