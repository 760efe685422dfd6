use async_trait::async_trait;
use sqlx::PgPool;

use super::Notifier;

/// Announces topics to other processes with `pg_notify`.
///
/// The topic is used as the channel name with an empty payload.
#[derive(Clone)]
pub struct PgNotifier {
    pool: PgPool,
}

impl PgNotifier {
    pub fn new(pool: PgPool) -> Self {
        PgNotifier { pool }
    }
}

#[async_trait]
impl Notifier for PgNotifier {
    async fn publish(&self, topic: &str) -> anyhow::Result<()> {
        sqlx::query("SELECT pg_notify($1, '')")
            .bind(topic)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
