mod common;

use common::{column_of, manager, seeded};
use relmap::executor::StatementKind;
use relmap::{OrmError, RelationResult, Value};
use serde_json::{json, Value as JsonValue};

#[tokio::test]
async fn eager_has_many_batches_one_query_for_all_owners() {
    let executor = seeded();
    let em = manager(&executor);
    let mut users = em.query("user").unwrap().with("posts").all().await.unwrap();
    assert_eq!(users.len(), 4);
    executor.clear_log();

    let mut counts = Vec::new();
    let mut first_titles = Vec::new();
    for user in users.iter_mut() {
        let mut posts = user.get_related("posts").await.unwrap().clone().into_many();
        counts.push(posts.len());
        first_titles.push(column_of(&mut posts, "title").await);
    }
    assert_eq!(counts, vec![2, 2, 1, 0]);
    assert_eq!(first_titles[0], vec![Value::from("first"), Value::from("second")]);
    assert_eq!(first_titles[2], vec![Value::from("fifth")]);
    assert!(first_titles[3].is_empty());
    assert_eq!(executor.count(StatementKind::Select, "posts"), 1);

    // Cached per record after the first access.
    users[0].get_related("posts").await.unwrap();
    assert_eq!(executor.statements().len(), 1);
}

#[tokio::test]
async fn on_demand_has_many_keeps_fetch_order() {
    let em = manager(&seeded());
    let mut user = em.find("user", 2).await.unwrap().unwrap();
    let mut posts = user.get_related("posts").await.unwrap().clone().into_many();
    assert_eq!(column_of(&mut posts, "id").await, vec![Value::Int(3), Value::Int(4)]);
}

#[tokio::test]
async fn belongs_to_resolves_and_batches() {
    let executor = seeded();
    let em = manager(&executor);
    let mut post = em.find("post", 3).await.unwrap().unwrap();
    let mut author = post.get_related("author").await.unwrap().clone().into_one().unwrap();
    assert_eq!(author.get_column("id").await.unwrap(), Value::Int(2));

    let mut posts = em.query("post").unwrap().with("author").all().await.unwrap();
    executor.clear_log();
    let mut authors = Vec::new();
    for post in posts.iter_mut() {
        let mut author = post.get_related("author").await.unwrap().clone().into_one().unwrap();
        authors.push(author.get_column("name").await.unwrap());
    }
    assert_eq!(
        authors,
        ["ANN", "ANN", "BOB", "BOB", "CY"].map(Value::from).to_vec()
    );
    assert_eq!(executor.count(StatementKind::Select, "users"), 1);
}

#[tokio::test]
async fn belongs_to_set_related_writes_foreign_key() {
    let em = manager(&seeded());
    let mut post = em.find("post", 1).await.unwrap().unwrap();
    assert!(post.get_related("author").await.unwrap().as_one().is_some());

    post.set_related("author", None).await.unwrap();
    assert_eq!(post.raw_column("user_id"), Some(&JsonValue::Null));
    assert!(post.is_modified("user_id"));
    assert!(post.get_related("author").await.unwrap().as_one().is_none());

    let mut bob = em.find("user", 2).await.unwrap().unwrap();
    post.set_related("author", Some(&mut bob)).await.unwrap();
    assert_eq!(post.raw_column("user_id"), Some(&json!(2)));
    let mut author = post.get_related("author").await.unwrap().clone().into_one().unwrap();
    assert_eq!(author.get_column("name").await.unwrap(), Value::from("BOB"));
}

#[tokio::test]
async fn has_many_set_related_writes_owner_key_into_target() {
    let em = manager(&seeded());
    let mut user = em.find("user", 4).await.unwrap().unwrap();
    let mut post = em.create("post", [("title", "draft")]).await.unwrap();
    user.set_related("posts", Some(&mut post)).await.unwrap();
    assert_eq!(post.raw_column("user_id"), Some(&json!(4)));

    assert!(matches!(
        user.set_related("posts", None).await,
        Err(OrmError::UnsupportedRelationType { .. })
    ));
    let mut tagged = em.find("post", 1).await.unwrap().unwrap();
    assert!(matches!(
        tagged.set_related("tags", None).await,
        Err(OrmError::UnsupportedRelationType { .. })
    ));
}

#[tokio::test]
async fn unknown_and_mismatched_relations_fail() {
    let em = manager(&seeded());
    let mut user = em.find("user", 1).await.unwrap().unwrap();
    assert!(matches!(user.get_related("friends").await, Err(OrmError::UnknownRelation(n)) if n == "friends"));
    assert!(matches!(
        user.link("posts", [json!(1)]).await,
        Err(OrmError::UnsupportedRelationType { .. })
    ));
}

#[tokio::test]
async fn share_many_resolves_through_the_junction() {
    let executor = seeded();
    let em = manager(&executor);
    let mut post = em.find("post", 1).await.unwrap().unwrap();
    let mut tags = post.get_related("tags").await.unwrap().clone().into_many();
    assert_eq!(column_of(&mut tags, "label").await, vec![Value::from("rust"), Value::from("sql")]);

    let mut tag = em.find("tag", "tag1").await.unwrap().unwrap();
    let mut articles = tag.get_related("articles").await.unwrap().clone().into_many();
    assert_eq!(column_of(&mut articles, "id").await, vec![Value::Int(1), Value::Int(2)]);
}

#[tokio::test]
async fn refinement_applies_to_the_target_query() {
    let em = manager(&seeded());
    let mut post = em.find("post", 1).await.unwrap().unwrap();
    let mut tags = post
        .get_related_with("tags", Some(&|q: &mut relmap::sql::Select| {
            q.order_by("label", false);
        }))
        .await
        .unwrap()
        .clone()
        .into_many();
    assert_eq!(column_of(&mut tags, "label").await, vec![Value::from("sql"), Value::from("rust")]);
}

#[tokio::test]
async fn eager_share_many_with_filter() {
    let executor = seeded();
    let em = manager(&executor);
    let mut posts = em
        .query("post")
        .unwrap()
        .where_in("id", [1, 2, 3])
        .with_filtered("tags", |q| {
            q.where_eq("label", "rust");
        })
        .all()
        .await
        .unwrap();
    executor.clear_log();
    let mut lens = Vec::new();
    for post in posts.iter_mut() {
        lens.push(post.get_related("tags").await.unwrap().len());
    }
    assert_eq!(lens, vec![1, 1, 0]);
    assert_eq!(executor.count(StatementKind::Select, "post_tag"), 1);
    assert_eq!(executor.count(StatementKind::Select, "tags"), 1);
}

#[tokio::test]
async fn links_on_new_records_replay_once_after_save() {
    let executor = seeded();
    let em = manager(&executor);
    let mut post = em.create("post", [("title", "linked")]).await.unwrap();
    post.link("tags", [json!("tag3"), json!("tag2")]).await.unwrap();
    post.unlink("tags", [json!("tag2")]).await.unwrap();
    assert_eq!(post.pending_link_count(), 2);
    assert_eq!(executor.count(StatementKind::Insert, "post_tag"), 0);
    assert_eq!(executor.count(StatementKind::Delete, "post_tag"), 0);

    em.save(&mut post).await.unwrap();
    assert_eq!(post.pending_link_count(), 0);
    assert_eq!(executor.count(StatementKind::Insert, "post_tag"), 2);
    assert_eq!(executor.count(StatementKind::Delete, "post_tag"), 1);
    let links: Vec<JsonValue> = executor
        .rows("post_tag")
        .into_iter()
        .filter(|r| r["post_id"] == json!(6))
        .map(|r| r["tag_id"].clone())
        .collect();
    assert_eq!(links, vec![json!("tag3")]);

    post.set_column("title", "renamed").await.unwrap();
    em.save(&mut post).await.unwrap();
    assert_eq!(executor.count(StatementKind::Insert, "post_tag"), 2);

    match post.get_related("tags").await.unwrap() {
        RelationResult::Many(tags) => assert_eq!(tags.len(), 1),
        other => panic!("unexpected result {:?}", other),
    }
}

#[tokio::test]
async fn links_on_stored_records_run_immediately() {
    let executor = seeded();
    let em = manager(&executor);
    let mut post = em.find("post", 2).await.unwrap().unwrap();
    assert_eq!(post.get_related("tags").await.unwrap().len(), 1);

    post.link("tags", [json!("tag2")]).await.unwrap();
    assert_eq!(executor.count(StatementKind::Insert, "post_tag"), 1);
    assert_eq!(post.get_related("tags").await.unwrap().len(), 2);

    post.unlink("tags", [json!("tag1"), json!("tag2")]).await.unwrap();
    assert_eq!(executor.count(StatementKind::Delete, "post_tag"), 1);
    assert!(post.get_related("tags").await.unwrap().is_empty());
}

#[tokio::test]
async fn set_related_on_an_eager_record_queries_the_new_target() {
    let em = manager(&seeded());
    let mut posts = em.query("post").unwrap().with("author").all().await.unwrap();
    let post = &mut posts[4];
    let mut author = post.get_related("author").await.unwrap().clone().into_one().unwrap();
    assert_eq!(author.get_column("id").await.unwrap(), Value::Int(3));

    let mut dee = em.find("user", 4).await.unwrap().unwrap();
    post.set_related("author", Some(&mut dee)).await.unwrap();
    let mut author = post.get_related("author").await.unwrap().clone().into_one().unwrap();
    assert_eq!(author.get_column("id").await.unwrap(), Value::Int(4));
}

#[tokio::test]
async fn link_on_an_eager_record_queries_the_junction_again() {
    let executor = seeded();
    let em = manager(&executor);
    let mut posts = em.query("post").unwrap().with("tags").all().await.unwrap();
    let post = &mut posts[1];
    assert_eq!(post.get_related("tags").await.unwrap().len(), 1);
    let selects = executor.count(StatementKind::Select, "post_tag");

    post.link("tags", [json!("tag2")]).await.unwrap();
    let mut tags = post.get_related("tags").await.unwrap().clone().into_many();
    assert_eq!(column_of(&mut tags, "label").await, vec![Value::from("rust"), Value::from("sql")]);
    assert_eq!(executor.count(StatementKind::Select, "post_tag"), selects + 1);

    post.unlink("tags", [json!("tag1")]).await.unwrap();
    assert_eq!(post.get_related("tags").await.unwrap().len(), 1);
}
