//! Statement execution against PostgreSQL.

use super::{Executor, Row};
use crate::cast::DateFormat;
use crate::error::OrmError;
use crate::sql::{Delete, Insert, PgBindValue, QueryBuf, Select, Update};
use async_trait::async_trait;
use chrono::{NaiveDateTime, NaiveTime};
use serde_json::Value;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};

#[derive(Clone, Debug)]
pub struct PgExecutor {
    pool: PgPool,
    date_format: DateFormat,
}

impl PgExecutor {
    pub fn new(pool: PgPool) -> Self {
        PgExecutor {
            pool,
            date_format: DateFormat::default(),
        }
    }

    /// Format used to turn date and timestamp cells into text. Should match
    /// the manager's date format so `date` casts can read them back.
    pub fn with_date_format(mut self, format: DateFormat) -> Self {
        self.date_format = format;
        self
    }

    pub async fn connect(database_url: &str) -> Result<Self, OrmError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        Ok(PgExecutor::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn query_many(&self, q: &QueryBuf) -> Result<Vec<Row>, OrmError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let mut query = sqlx::query(&q.sql);
        for p in &q.params {
            query = query.bind(PgBindValue::from(p));
        }
        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(|row| row_to_map(row, &self.date_format)).collect()
    }

    async fn execute(&self, q: &QueryBuf) -> Result<u64, OrmError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "execute");
        let mut query = sqlx::query(&q.sql);
        for p in &q.params {
            query = query.bind(PgBindValue::from(p));
        }
        let done = query.execute(&self.pool).await?;
        Ok(done.rows_affected())
    }
}

#[async_trait]
impl Executor for PgExecutor {
    async fn fetch_all(&self, select: &Select) -> Result<Vec<Row>, OrmError> {
        self.query_many(&select.to_query()).await
    }

    async fn insert(&self, insert: &Insert) -> Result<Option<Row>, OrmError> {
        let q = insert.to_query();
        if insert.returning.is_empty() {
            self.execute(&q).await?;
            return Ok(None);
        }
        Ok(self.query_many(&q).await?.into_iter().next())
    }

    async fn update(&self, update: &Update) -> Result<u64, OrmError> {
        if update.values.is_empty() {
            return Ok(0);
        }
        self.execute(&update.to_query()).await
    }

    async fn delete(&self, delete: &Delete) -> Result<u64, OrmError> {
        self.execute(&delete.to_query()).await
    }
}

fn row_to_map(row: &PgRow, format: &DateFormat) -> Result<Row, OrmError> {
    use sqlx::Column;
    use sqlx::Row as _;
    row.columns()
        .iter()
        .map(|col| {
            let name = col.name();
            Ok((name.to_string(), cell_to_value(row, name, format)?))
        })
        .collect()
}

fn date_text(date: NaiveDateTime, format: &DateFormat) -> Result<Value, OrmError> {
    Ok(Value::String(format.format(&date)?))
}

fn cell_to_value(row: &PgRow, name: &str, format: &DateFormat) -> Result<Value, OrmError> {
    use sqlx::Row as _;
    if let Ok(Some(n)) = row.try_get::<Option<i16>, _>(name) {
        return Ok(Value::Number(n.into()));
    }
    if let Ok(Some(n)) = row.try_get::<Option<i32>, _>(name) {
        return Ok(Value::Number(n.into()));
    }
    if let Ok(Some(n)) = row.try_get::<Option<i64>, _>(name) {
        return Ok(Value::Number(n.into()));
    }
    if let Ok(Some(n)) = row.try_get::<Option<f32>, _>(name) {
        if let Some(n) = serde_json::Number::from_f64(f64::from(n)) {
            return Ok(Value::Number(n));
        }
    }
    if let Ok(Some(n)) = row.try_get::<Option<f64>, _>(name) {
        if let Some(n) = serde_json::Number::from_f64(n) {
            return Ok(Value::Number(n));
        }
    }
    if let Ok(Some(b)) = row.try_get::<Option<bool>, _>(name) {
        return Ok(Value::Bool(b));
    }
    if let Ok(Some(u)) = row.try_get::<Option<uuid::Uuid>, _>(name) {
        return Ok(Value::String(u.to_string()));
    }
    // Dates travel as strings in the executor's date format.
    if let Ok(Some(d)) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(name) {
        return date_text(d.naive_utc(), format);
    }
    if let Ok(Some(d)) = row.try_get::<Option<NaiveDateTime>, _>(name) {
        return date_text(d, format);
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::NaiveDate>, _>(name) {
        return date_text(d.and_time(NaiveTime::MIN), format);
    }
    if let Ok(Some(s)) = row.try_get::<Option<String>, _>(name) {
        return Ok(Value::String(s));
    }
    if let Ok(Some(j)) = row.try_get::<Option<serde_json::Value>, _>(name) {
        return Ok(j);
    }
    Ok(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cast::{Cast, CastKind};
    use chrono::NaiveDate;

    #[test]
    fn date_cells_use_the_configured_format() {
        let format = DateFormat::new("%d/%m/%Y").unwrap();
        let day = NaiveDate::from_ymd_opt(2020, 1, 2).unwrap().and_time(NaiveTime::MIN);
        let text = date_text(day, &format).unwrap();
        assert_eq!(text, Value::String("02/01/2020".into()));
        let read = Cast::new(CastKind::Date).get(&text, &format).unwrap();
        assert_eq!(read, crate::value::Value::Date(day));
    }
}
