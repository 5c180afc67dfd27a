//! Example consumer: a separate Rust project that uses relmap as a dependency.
//!
//! Run from repo root: `cargo run -p example-consumer`
//! Or from this directory: `cargo run`
//!
//! Expects `users`, `posts`, `tags` and `post_tag` tables in the database
//! named by `DATABASE_URL`.

use relmap::{load_from_str, resolve, EntityManager, ManagerConfig, PgExecutor, RelationResult};
use serde_json::json;
use std::sync::Arc;

const BLOG: &str = r#"{
    "entities": [
        {"name": "user", "casts": {"age": "?int"}, "guarded": ["id"],
         "relations": [{"name": "posts", "kind": "has_many", "entity": "post"}]},
        {"name": "post", "timestamps": true,
         "relations": [
            {"name": "author", "kind": "belongs_to", "entity": "user"},
            {"name": "tags", "kind": "share_many", "entity": "tag"}
         ]},
        {"name": "tag", "relations": [{"name": "posts", "kind": "share_many", "entity": "post"}]}
    ]
}"#;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("relmap=info")),
        )
        .init();

    let config = ManagerConfig::from_env()?;
    let database_url = config
        .database_url
        .clone()
        .unwrap_or_else(|| "postgres://localhost/relmap".into());
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await?;

    let date_format = config.date_format()?;
    let executor = PgExecutor::new(pool).with_date_format(date_format.clone());
    let em = EntityManager::builder(Arc::new(executor))
        .date_format(date_format)
        .register_all(resolve(&load_from_str(BLOG)?)?)
        .build()?;

    let mut post = em.create("post", [("title", "Hello relmap")]).await?;
    if let Some(mut author) = em.query("user")?.order_by("id", true).first().await? {
        post.set_related("author", Some(&mut author)).await?;
    }
    post.link("tags", [json!(1)]).await?;
    em.save(&mut post).await?;
    tracing::info!(key = %post.key_value()?, "post saved");

    let mut users = em.query("user")?.with("posts").all().await?;
    for user in users.iter_mut() {
        let name = user.get_column("name").await?;
        if let RelationResult::Many(posts) = user.get_related("posts").await? {
            tracing::info!(?name, posts = posts.len(), "user");
        }
    }
    Ok(())
}
