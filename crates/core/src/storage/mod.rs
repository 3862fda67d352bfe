pub mod catalog;
pub mod counts;
pub mod lock;

pub use catalog::PgCatalog;

use anyhow::Context;

pub async fn connect(database_url: &str, max_connections: u32) -> anyhow::Result<sqlx::PgPool> {
    sqlx::postgres::PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
        .context("connect DATABASE_URL failed")
}
