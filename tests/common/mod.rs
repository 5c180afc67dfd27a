#![allow(dead_code)]

use relmap::executor::MemoryExecutor;
use relmap::{Cast, CastKind, EntityManager, EntityMapping, Relation, Value};
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("relmap=debug")
        .with_test_writer()
        .try_init();
}

/// Four users, five posts keyed to users 1,1,2,2,3, three tags, and
/// post 1 tagged tag1+tag2, post 2 tagged tag1.
pub fn seeded() -> Arc<MemoryExecutor> {
    init_tracing();
    Arc::new(
        MemoryExecutor::new()
            .with_table(
                "users",
                vec![
                    json!({"id": 1, "name": "ann", "age": "30", "active": 1, "email": "ann@example.com"}),
                    json!({"id": 2, "name": "bob", "age": 25, "active": 0, "email": "bob@example.com"}),
                    json!({"id": 3, "name": "cy", "age": null, "active": 1, "email": null}),
                    json!({"id": 4, "name": "dee", "age": 41, "active": 1, "email": null}),
                ],
            )
            .with_table(
                "posts",
                vec![
                    json!({"id": 1, "user_id": 1, "title": "first"}),
                    json!({"id": 2, "user_id": 1, "title": "second"}),
                    json!({"id": 3, "user_id": 2, "title": "third"}),
                    json!({"id": 4, "user_id": 2, "title": "fourth"}),
                    json!({"id": 5, "user_id": 3, "title": "fifth"}),
                ],
            )
            .with_table(
                "tags",
                vec![
                    json!({"id": "tag1", "label": "rust"}),
                    json!({"id": "tag2", "label": "sql"}),
                    json!({"id": "tag3", "label": "orm"}),
                ],
            )
            .with_table(
                "post_tag",
                vec![
                    json!({"post_id": 1, "tag_id": "tag1"}),
                    json!({"post_id": 1, "tag_id": "tag2"}),
                    json!({"post_id": 2, "tag_id": "tag1"}),
                ],
            ),
    )
}

pub fn blog_mappings() -> Vec<EntityMapping> {
    vec![
        EntityMapping::new("user")
            .cast("age", Cast::nullable(CastKind::Integer))
            .cast("active", Cast::new(CastKind::Boolean))
            .guarded(["id"])
            .getter("name", |v| match v {
                Value::Text(s) => Value::Text(s.to_uppercase()),
                other => other,
            })
            .setter("email", |v| match v {
                Value::Text(s) => Value::Text(s.trim().to_lowercase()),
                other => other,
            })
            .relation("posts", Relation::has_many("post")),
        EntityMapping::new("post")
            .relation("author", Relation::belongs_to("user"))
            .relation("tags", Relation::share_many("tag")),
        EntityMapping::new("tag")
            .key_generator(|raw| Ok(vec![raw.get("id").cloned().unwrap_or(JsonValue::Null)]))
            .relation("articles", Relation::share_many("post")),
    ]
}

pub fn manager(executor: &Arc<MemoryExecutor>) -> EntityManager {
    EntityManager::builder(executor.clone())
        .register_all(blog_mappings())
        .build()
        .unwrap()
}

/// Column values of each record, in order.
pub async fn column_of(records: &mut [relmap::Record], column: &str) -> Vec<Value> {
    let mut out = Vec::with_capacity(records.len());
    for record in records.iter_mut() {
        out.push(record.get_column(column).await.unwrap());
    }
    out
}
