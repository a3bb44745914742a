//! SQLite persistence for canonical messages and conversation summaries.
//!
//! Schema lives in `migrations/`; call [`run_migrations`] once at startup
//! before constructing the stores.

mod conversations;
mod messages;
mod rows;

use std::{str::FromStr, time::Duration};

use {
    anyhow::Context,
    sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    tracing::debug,
};

pub use {
    conversations::SqliteConversationStore, messages::SqliteMessageStore, sqlx::SqlitePool,
};

/// Open a pool for `url`, creating the database file if needed.
///
/// In-memory databases are per-connection in SQLite, so they get a single
/// connection that is never recycled.
pub async fn connect(url: &str, max_connections: u32) -> anyhow::Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(url)
        .with_context(|| format!("invalid database url: {url}"))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5));

    let in_memory = url.contains(":memory:") || url.contains("mode=memory");
    let pool = if in_memory {
        debug!(url, "using single-connection in-memory database");
        SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
    } else {
        SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await
    }
    .with_context(|| format!("failed to connect to {url}"))?;

    Ok(pool)
}

/// Run database migrations for the inbox tables.
pub async fn run_migrations(pool: &SqlitePool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("failed to run migrations")?;
    Ok(())
}

/// Row counts removed by [`clear`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cleared {
    pub messages: u64,
    pub conversations: u64,
}

/// Delete every message and conversation, keeping the schema.
pub async fn clear(pool: &SqlitePool) -> anyhow::Result<Cleared> {
    let mut tx = pool.begin().await.context("failed to begin transaction")?;
    let messages = sqlx::query("DELETE FROM messages")
        .execute(&mut *tx)
        .await
        .context("failed to clear messages")?
        .rows_affected();
    let conversations = sqlx::query("DELETE FROM conversations")
        .execute(&mut *tx)
        .await
        .context("failed to clear conversations")?
        .rows_affected();
    tx.commit().await.context("failed to commit clear")?;
    debug!(messages, conversations, "cleared inbox tables");
    Ok(Cleared {
        messages,
        conversations,
    })
}

#[allow(clippy::expect_used)]
#[cfg(test)]
pub(crate) async fn test_pool() -> SqlitePool {
    let pool = connect("sqlite::memory:", 1)
        .await
        .expect("in-memory pool");
    run_migrations(&pool).await.expect("migrations");
    pool
}
