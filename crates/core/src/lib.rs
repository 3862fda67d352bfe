pub mod backfill;
pub mod catalog;
pub mod domain;
pub mod ingest;
pub mod pricing;
pub mod storage;
pub mod time;

pub mod config {
    use crate::pricing::GroupingStrategy;
    use anyhow::Context;

    const DEFAULT_DB_MAX_CONNECTIONS: u32 = 5;

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub database_url: Option<String>,
        pub sentry_dsn: Option<String>,
        pub grouping: GroupingStrategy,
        pub db_max_connections: u32,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            let grouping = match std::env::var("PRICE_GROUPING") {
                Ok(s) if !s.trim().is_empty() => s
                    .parse::<GroupingStrategy>()
                    .context("invalid PRICE_GROUPING")?,
                _ => GroupingStrategy::default(),
            };

            let db_max_connections = std::env::var("DB_MAX_CONNECTIONS")
                .ok()
                .and_then(|s| s.parse::<u32>().ok())
                .filter(|n| *n >= 1)
                .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS);

            Ok(Self {
                database_url: std::env::var("DATABASE_URL").ok(),
                sentry_dsn: std::env::var("SENTRY_DSN").ok(),
                grouping,
                db_max_connections,
            })
        }

        pub fn require_database_url(&self) -> anyhow::Result<&str> {
            self.database_url
                .as_deref()
                .context("DATABASE_URL is required")
        }
    }
}
