use anyhow::Context;

// Advisory locks are scoped to the Postgres session. This is a best-effort guard against two
// backfill runs writing the same delivery history rows.
const LOCK_NAMESPACE: i64 = 0x5354_4F43_4B50; // "STOCKP"
const BACKFILL_LOCK_SLOT: i64 = 1;

fn backfill_lock_key() -> i64 {
    LOCK_NAMESPACE ^ BACKFILL_LOCK_SLOT
}

pub async fn try_acquire_backfill_lock(
    conn: &mut sqlx::PgConnection,
) -> anyhow::Result<bool> {
    let key = backfill_lock_key();
    let acquired: (bool,) = sqlx::query_as("SELECT pg_try_advisory_lock($1)")
        .persistent(false)
        .bind(key)
        .fetch_one(&mut *conn)
        .await
        .with_context(|| format!("failed to acquire advisory lock (key={key})"))?;
    Ok(acquired.0)
}

pub async fn release_backfill_lock(conn: &mut sqlx::PgConnection) -> anyhow::Result<()> {
    let key = backfill_lock_key();
    sqlx::query("SELECT pg_advisory_unlock($1)")
        .persistent(false)
        .bind(key)
        .execute(&mut *conn)
        .await
        .with_context(|| format!("failed to release advisory lock (key={key})"))?;
    Ok(())
}
