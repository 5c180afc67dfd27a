//! Statement model for the executor, rendered to parameterized PostgreSQL.
//!
//! Identifiers come from entity mappings only; values always travel as parameters.

use serde_json::Value as JsonValue;

/// Quote identifier for PostgreSQL (safe: only from mappings).
fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

/// Quote a possibly schema-qualified table name ("schema.table").
fn quoted_table(table: &str) -> String {
    table.split('.').map(quoted).collect::<Vec<_>>().join(".")
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<JsonValue>,
}

impl QueryBuf {
    fn new() -> Self {
        QueryBuf {
            sql: String::new(),
            params: Vec::new(),
        }
    }

    fn push_param(&mut self, v: JsonValue) -> String {
        self.params.push(v);
        format!("${}", self.params.len())
    }
}

/// One WHERE predicate. Predicates of a statement are joined with AND.
#[derive(Clone, Debug, PartialEq)]
pub enum Condition {
    /// `column = value`; a null value renders as `IS NULL`.
    Eq { column: String, value: JsonValue },
    /// `column IN (...)`, or `(a, b) IN ((..), (..))` for several columns.
    In {
        columns: Vec<String>,
        values: Vec<Vec<JsonValue>>,
    },
    IsNull { column: String },
}

impl Condition {
    pub fn eq(column: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        Condition::Eq {
            column: column.into(),
            value: value.into(),
        }
    }

    pub fn is_in(columns: Vec<String>, values: Vec<Vec<JsonValue>>) -> Self {
        Condition::In { columns, values }
    }

    fn render(&self, q: &mut QueryBuf) -> String {
        match self {
            Condition::Eq { column, value } if value.is_null() => format!("{} IS NULL", quoted(column)),
            Condition::Eq { column, value } => {
                let ph = q.push_param(value.clone());
                format!("{} = {}", quoted(column), ph)
            }
            Condition::IsNull { column } => format!("{} IS NULL", quoted(column)),
            Condition::In { values, .. } if values.is_empty() => "1 = 0".to_string(),
            Condition::In { columns, values } if columns.len() == 1 => {
                let placeholders: Vec<String> = values
                    .iter()
                    .map(|tuple| q.push_param(tuple.first().cloned().unwrap_or(JsonValue::Null)))
                    .collect();
                format!("{} IN ({})", quoted(&columns[0]), placeholders.join(", "))
            }
            Condition::In { columns, values } => {
                let tuples: Vec<String> = values
                    .iter()
                    .map(|tuple| {
                        let phs: Vec<String> = tuple.iter().map(|v| q.push_param(v.clone())).collect();
                        format!("({})", phs.join(", "))
                    })
                    .collect();
                let cols: Vec<String> = columns.iter().map(|c| quoted(c)).collect();
                format!("({}) IN ({})", cols.join(", "), tuples.join(", "))
            }
        }
    }
}

fn where_clause(conditions: &[Condition], q: &mut QueryBuf) -> String {
    if conditions.is_empty() {
        return String::new();
    }
    let parts: Vec<String> = conditions.iter().map(|c| c.render(q)).collect();
    format!(" WHERE {}", parts.join(" AND "))
}

/// SELECT over one table with optional projection, filters, ordering and paging.
#[derive(Clone, Debug, PartialEq)]
pub struct Select {
    table: String,
    columns: Option<Vec<String>>,
    conditions: Vec<Condition>,
    order_by: Vec<(String, bool)>, // (column, is_ascending)
    limit: Option<u64>,
    offset: Option<u64>,
}

impl Select {
    pub fn new(table: impl Into<String>) -> Self {
        Select {
            table: table.into(),
            columns: None,
            conditions: Vec::new(),
            order_by: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    pub fn columns<I, S>(&mut self, columns: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    pub fn where_eq(&mut self, column: impl Into<String>, value: impl Into<JsonValue>) -> &mut Self {
        self.conditions.push(Condition::eq(column, value));
        self
    }

    pub fn where_in<I>(&mut self, column: impl Into<String>, values: I) -> &mut Self
    where
        I: IntoIterator<Item = JsonValue>,
    {
        self.conditions.push(Condition::In {
            columns: vec![column.into()],
            values: values.into_iter().map(|v| vec![v]).collect(),
        });
        self
    }

    /// Membership over several columns at once (composite keys).
    pub fn where_in_tuple(&mut self, columns: Vec<String>, values: Vec<Vec<JsonValue>>) -> &mut Self {
        self.conditions.push(Condition::In { columns, values });
        self
    }

    pub fn where_null(&mut self, column: impl Into<String>) -> &mut Self {
        self.conditions.push(Condition::IsNull { column: column.into() });
        self
    }

    pub fn filter(&mut self, condition: Condition) -> &mut Self {
        self.conditions.push(condition);
        self
    }

    pub fn order_by(&mut self, column: impl Into<String>, ascending: bool) -> &mut Self {
        self.order_by.push((column.into(), ascending));
        self
    }

    pub fn limit(&mut self, n: u64) -> &mut Self {
        self.limit = Some(n);
        self
    }

    pub fn offset(&mut self, n: u64) -> &mut Self {
        self.offset = Some(n);
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn projection(&self) -> Option<&[String]> {
        self.columns.as_deref()
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn ordering(&self) -> &[(String, bool)] {
        &self.order_by
    }

    pub fn limit_value(&self) -> Option<u64> {
        self.limit
    }

    pub fn offset_value(&self) -> Option<u64> {
        self.offset
    }

    pub fn to_query(&self) -> QueryBuf {
        let mut q = QueryBuf::new();
        let cols = match &self.columns {
            Some(cols) if !cols.is_empty() => cols.iter().map(|c| quoted(c)).collect::<Vec<_>>().join(", "),
            _ => "*".to_string(),
        };
        let where_sql = where_clause(&self.conditions, &mut q);
        let order_sql = if self.order_by.is_empty() {
            String::new()
        } else {
            let parts: Vec<String> = self
                .order_by
                .iter()
                .map(|(c, asc)| format!("{} {}", quoted(c), if *asc { "ASC" } else { "DESC" }))
                .collect();
            format!(" ORDER BY {}", parts.join(", "))
        };
        let limit_sql = self.limit.map(|n| format!(" LIMIT {}", n)).unwrap_or_default();
        let offset_sql = self.offset.map(|n| format!(" OFFSET {}", n)).unwrap_or_default();
        q.sql = format!(
            "SELECT {} FROM {}{}{}{}{}",
            cols,
            quoted_table(&self.table),
            where_sql,
            order_sql,
            limit_sql,
            offset_sql
        );
        q
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Insert {
    pub table: String,
    pub values: Vec<(String, JsonValue)>,
    /// Columns handed back by the executor after the insert (generated keys).
    pub returning: Vec<String>,
}

impl Insert {
    pub fn new(table: impl Into<String>, values: Vec<(String, JsonValue)>) -> Self {
        Insert {
            table: table.into(),
            values,
            returning: Vec::new(),
        }
    }

    pub fn returning(mut self, columns: Vec<String>) -> Self {
        self.returning = columns;
        self
    }

    pub fn to_query(&self) -> QueryBuf {
        let mut q = QueryBuf::new();
        let table = quoted_table(&self.table);
        let returning = if self.returning.is_empty() {
            String::new()
        } else {
            let cols: Vec<String> = self.returning.iter().map(|c| quoted(c)).collect();
            format!(" RETURNING {}", cols.join(", "))
        };
        if self.values.is_empty() {
            q.sql = format!("INSERT INTO {} DEFAULT VALUES{}", table, returning);
            return q;
        }
        let mut cols = Vec::with_capacity(self.values.len());
        let mut placeholders = Vec::with_capacity(self.values.len());
        for (name, value) in &self.values {
            cols.push(quoted(name));
            placeholders.push(q.push_param(value.clone()));
        }
        q.sql = format!(
            "INSERT INTO {} ({}) VALUES ({}){}",
            table,
            cols.join(", "),
            placeholders.join(", "),
            returning
        );
        q
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Update {
    pub table: String,
    pub values: Vec<(String, JsonValue)>,
    pub conditions: Vec<Condition>,
}

impl Update {
    pub fn new(table: impl Into<String>, values: Vec<(String, JsonValue)>, conditions: Vec<Condition>) -> Self {
        Update {
            table: table.into(),
            values,
            conditions,
        }
    }

    pub fn to_query(&self) -> QueryBuf {
        let mut q = QueryBuf::new();
        let sets: Vec<String> = self
            .values
            .iter()
            .map(|(name, value)| {
                let ph = q.push_param(value.clone());
                format!("{} = {}", quoted(name), ph)
            })
            .collect();
        let where_sql = where_clause(&self.conditions, &mut q);
        q.sql = format!("UPDATE {} SET {}{}", quoted_table(&self.table), sets.join(", "), where_sql);
        q
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Delete {
    pub table: String,
    pub conditions: Vec<Condition>,
}

impl Delete {
    pub fn new(table: impl Into<String>, conditions: Vec<Condition>) -> Self {
        Delete {
            table: table.into(),
            conditions,
        }
    }

    pub fn to_query(&self) -> QueryBuf {
        let mut q = QueryBuf::new();
        let where_sql = where_clause(&self.conditions, &mut q);
        q.sql = format!("DELETE FROM {}{}", quoted_table(&self.table), where_sql);
        q
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn renders_select_with_filters_and_paging() {
        let mut s = Select::new("users");
        s.where_eq("age", json!(33)).where_null("deleted_at").order_by("id", false).limit(10).offset(20);
        let q = s.to_query();
        assert_eq!(
            q.sql,
            "SELECT * FROM \"users\" WHERE \"age\" = $1 AND \"deleted_at\" IS NULL ORDER BY \"id\" DESC LIMIT 10 OFFSET 20"
        );
        assert_eq!(q.params, vec![json!(33)]);
    }

    #[test]
    fn renders_membership_filters() {
        let mut s = Select::new("blog.posts");
        s.columns(["id", "title"]).where_in("user_id", vec![json!(1), json!(2)]);
        let q = s.to_query();
        assert_eq!(q.sql, "SELECT \"id\", \"title\" FROM \"blog\".\"posts\" WHERE \"user_id\" IN ($1, $2)");

        let mut s = Select::new("t");
        s.where_in_tuple(vec!["a".into(), "b".into()], vec![vec![json!(1), json!("x")]]);
        assert_eq!(s.to_query().sql, "SELECT * FROM \"t\" WHERE (\"a\", \"b\") IN (($1, $2))");

        let mut s = Select::new("t");
        s.where_in("a", Vec::<JsonValue>::new());
        assert_eq!(s.to_query().sql, "SELECT * FROM \"t\" WHERE 1 = 0");
    }

    #[test]
    fn null_equality_renders_is_null() {
        let mut s = Select::new("t");
        s.where_eq("a", JsonValue::Null);
        let q = s.to_query();
        assert_eq!(q.sql, "SELECT * FROM \"t\" WHERE \"a\" IS NULL");
        assert!(q.params.is_empty());
    }

    #[test]
    fn renders_insert_update_delete() {
        let insert = Insert::new("users", vec![("name".into(), json!("ann"))]).returning(vec!["id".into()]);
        let q = insert.to_query();
        assert_eq!(q.sql, "INSERT INTO \"users\" (\"name\") VALUES ($1) RETURNING \"id\"");

        let update = Update::new("users", vec![("age".into(), json!(3))], vec![Condition::eq("id", 7)]);
        let q = update.to_query();
        assert_eq!(q.sql, "UPDATE \"users\" SET \"age\" = $1 WHERE \"id\" = $2");
        assert_eq!(q.params, vec![json!(3), json!(7)]);

        let delete = Delete::new("users", vec![Condition::eq("id", 7)]);
        assert_eq!(delete.to_query().sql, "DELETE FROM \"users\" WHERE \"id\" = $1");
    }

    #[test]
    fn quotes_embedded_quotes() {
        assert_eq!(quoted("we\"ird"), "\"we\"\"ird\"");
        let q = Insert::new("t", Vec::new()).to_query();
        assert_eq!(q.sql, "INSERT INTO \"t\" DEFAULT VALUES");
    }
}
