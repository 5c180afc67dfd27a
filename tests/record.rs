mod common;

use chrono::NaiveDate;
use common::{manager, seeded};
use relmap::executor::StatementKind;
use relmap::sql::{Condition, Delete, Insert};
use relmap::{Cast, CastKind, DateFormat, EntityManager, EntityMapping, Executor, MemoryExecutor, OrmError, Value};
use serde_json::json;
use std::sync::Arc;

#[tokio::test]
async fn assign_casts_string_to_integer() {
    let em = manager(&seeded());
    let mut user = em.create("user", [("age", "33")]).await.unwrap();
    assert!(user.is_new());
    assert_eq!(user.raw_column("age"), Some(&json!(33)));
    assert_eq!(user.get_column("age").await.unwrap(), Value::Int(33));
    assert_eq!(user.modified_columns(), vec!["age"]);
}

#[tokio::test]
async fn assign_skips_guarded_columns() {
    let em = manager(&seeded());
    let user = em
        .create("user", [("id", Value::from(99)), ("name", Value::from("eve"))])
        .await
        .unwrap();
    assert_eq!(user.raw_column("id"), None);
    assert_eq!(user.modified_columns(), vec!["name"]);
}

#[tokio::test]
async fn date_cast_uses_configured_format() {
    let executor = Arc::new(MemoryExecutor::new());
    let em = EntityManager::builder(executor)
        .date_format(DateFormat::new("%Y-%m-%d").unwrap())
        .register(EntityMapping::new("person").cast("dob", Cast::new(CastKind::Date)))
        .build()
        .unwrap();
    let mut person = em.new_record("person").unwrap();
    let dob = NaiveDate::from_ymd_opt(2020, 1, 2).unwrap();
    person.set_column("dob", dob).await.unwrap();
    assert_eq!(person.raw_column("dob"), Some(&json!("2020-01-02")));
    assert_eq!(person.get_column("dob").await.unwrap(), Value::from(dob));
}

#[tokio::test]
async fn writes_invalidate_cached_values() {
    let em = manager(&seeded());
    let mut user = em.find("user", 1).await.unwrap().unwrap();
    assert_eq!(user.get_column("age").await.unwrap(), Value::Int(30));
    user.set_column("age", 31).await.unwrap();
    assert_eq!(user.get_column("age").await.unwrap(), Value::Int(31));
    assert!(user.is_modified("age"));
    assert!(!user.is_modified("name"));
}

#[tokio::test]
async fn getters_and_setters_apply_to_non_key_columns() {
    let em = manager(&seeded());
    let mut user = em.find("user", 1).await.unwrap().unwrap();
    assert_eq!(user.get_column("name").await.unwrap(), Value::from("ANN"));
    assert_eq!(user.raw_column("name"), Some(&json!("ann")));
    assert_eq!(user.get_column("active").await.unwrap(), Value::Bool(true));

    user.set_column("email", "  Ann@Example.COM ").await.unwrap();
    assert_eq!(user.raw_column("email"), Some(&json!("ann@example.com")));
    user.set_column("active", false).await.unwrap();
    assert_eq!(user.raw_column("active"), Some(&json!(0)));
}

#[tokio::test]
async fn key_columns_skip_getters() {
    let executor = Arc::new(MemoryExecutor::new().with_table("items", vec![json!({"id": "7", "code": "a"})]));
    let em = EntityManager::builder(executor)
        .register(
            EntityMapping::new("item")
                .cast("id", Cast::new(CastKind::Integer))
                .getter("id", |_| Value::Int(-1))
                .getter("code", |_| Value::from("hooked")),
        )
        .build()
        .unwrap();
    let mut item = em.find("item", 7).await.unwrap().unwrap();
    assert_eq!(item.get_column("id").await.unwrap(), Value::Int(7));
    assert_eq!(item.get_column("code").await.unwrap(), Value::from("hooked"));
}

#[tokio::test]
async fn unknown_column_and_bad_conversions_fail() {
    let em = manager(&seeded());
    let mut user = em.find("user", 2).await.unwrap().unwrap();
    assert!(matches!(user.get_column("nope").await, Err(OrmError::UnknownColumn(c)) if c == "nope"));
    assert!(matches!(user.set_column("age", "abc").await, Err(OrmError::Conversion(_))));
    assert!(!user.is_modified("age"));
    assert_eq!(user.get_column("age").await.unwrap(), Value::Int(25));
}

#[tokio::test]
async fn read_only_records_reject_writes() {
    let em = manager(&seeded());
    let mut user = em
        .query("user")
        .unwrap()
        .columns(["id", "name"])
        .first()
        .await
        .unwrap()
        .unwrap();
    assert!(user.is_read_only());
    assert_eq!(user.get_column("name").await.unwrap(), Value::from("ANN"));
    assert!(matches!(user.set_column("name", "x").await, Err(OrmError::ReadOnlyRecord)));
    assert!(matches!(user.assign([("name", "x")]).await, Err(OrmError::ReadOnlyRecord)));
    assert!(matches!(em.save(&mut user).await, Err(OrmError::ReadOnlyRecord)));
}

#[tokio::test]
async fn deleted_records_reject_all_access() {
    let em = manager(&seeded());
    let mut user = em.find("user", 4).await.unwrap().unwrap();
    assert!(em.delete(&mut user).await.unwrap());
    assert!(user.is_deleted());
    assert!(matches!(user.get_column("name").await, Err(OrmError::RecordDeleted)));
    assert!(matches!(user.set_column("name", "x").await, Err(OrmError::RecordDeleted)));
    assert!(matches!(user.get_related("posts").await, Err(OrmError::RecordDeleted)));
    assert!(em.find("user", 4).await.unwrap().is_none());
}

#[tokio::test]
async fn saved_records_rehydrate_on_next_access() {
    let executor = seeded();
    let em = manager(&executor);
    let mut post = em.create("post", [("title", json!("new")), ("user_id", json!(4))]).await.unwrap();
    em.save(&mut post).await.unwrap();
    assert!(!post.is_new());
    assert!(post.is_dehydrated());
    assert!(post.modified_columns().is_empty());

    let selects = executor.count(StatementKind::Select, "posts");
    assert_eq!(post.get_column("id").await.unwrap(), Value::Int(6));
    assert_eq!(executor.count(StatementKind::Select, "posts"), selects + 1);
    assert!(!post.is_dehydrated());
    assert_eq!(post.get_column("title").await.unwrap(), Value::from("new"));
    assert_eq!(executor.count(StatementKind::Select, "posts"), selects + 1);
}

#[tokio::test]
async fn rehydrating_a_vanished_row_marks_the_record_deleted() {
    let executor = seeded();
    let em = manager(&executor);
    let mut post = em.create("post", [("title", json!("gone soon"))]).await.unwrap();
    em.save(&mut post).await.unwrap();
    let removed = executor
        .delete(&Delete::new("posts", vec![Condition::eq("id", 6)]))
        .await
        .unwrap();
    assert_eq!(removed, 1);

    assert!(matches!(post.get_column("title").await, Err(OrmError::RecordDeleted)));
    assert!(post.is_deleted());
    assert!(matches!(post.get_related("tags").await, Err(OrmError::RecordDeleted)));
}

#[tokio::test]
async fn rehydration_drops_cached_relations_and_batch_loaders() {
    let executor = seeded();
    let em = manager(&executor);
    let mut posts = em.query("post").unwrap().with("tags").all().await.unwrap();
    let post = &mut posts[0];
    assert_eq!(post.get_related("tags").await.unwrap().len(), 2);

    executor
        .insert(&Insert::new(
            "post_tag",
            vec![("post_id".to_string(), json!(1)), ("tag_id".to_string(), json!("tag3"))],
        ))
        .await
        .unwrap();
    // Still cached.
    assert_eq!(post.get_related("tags").await.unwrap().len(), 2);

    post.mark_as_saved(vec![json!(1)]).await.unwrap();
    assert!(post.is_dehydrated());
    let selects = executor.count(StatementKind::Select, "tags");
    assert_eq!(post.get_related("tags").await.unwrap().len(), 3);
    assert!(!post.is_dehydrated());
    assert_eq!(executor.count(StatementKind::Select, "tags"), selects + 1);
}
