use {
    async_trait::async_trait,
    chrono::{DateTime, Utc},
    inbox_messages::{
        CanonicalMessage, Error, MessagePatch, MessageStatus, MessageStore, Result, UpsertPlan,
        Upserted, plan_upsert,
    },
    sqlx::{SqliteConnection, SqlitePool},
};

use crate::rows::{self, MessageRow, decode_message, decode_messages, to_millis};

fn storage(context: &'static str) -> impl FnOnce(sqlx::Error) -> Error {
    move |e| Error::storage(context, e)
}

/// SQLite-backed canonical message store.
///
/// Upserts run inside `BEGIN IMMEDIATE`, which takes the database write lock
/// before the candidate lookup, so concurrent writers naming the same
/// identifier serialize and the second one sees the first one's row.
pub struct SqliteMessageStore {
    pool: SqlitePool,
}

impl SqliteMessageStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageStore for SqliteMessageStore {
    async fn upsert(&self, patch: MessagePatch) -> Result<Upserted> {
        // Dropping `tx` before commit (an error or a cancelled request) rolls
        // back and releases the write lock before the connection is reused.
        let mut tx = self
            .pool
            .begin_with("BEGIN IMMEDIATE")
            .await
            .map_err(storage("begin upsert"))?;
        let upserted = upsert_locked(&mut *tx, patch).await?;
        tx.commit().await.map_err(storage("commit upsert"))?;
        Ok(upserted)
    }

    async fn update_status(
        &self,
        identifier: &str,
        status: MessageStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<CanonicalMessage>> {
        let row = sqlx::query_as::<_, MessageRow>(
            "UPDATE messages
             SET status = ?1, status_updated_at = ?2, updated_at = ?2
             WHERE id = (
                 SELECT id FROM messages
                 WHERE id = ?3 OR meta_msg_id = ?3
                 ORDER BY (id = ?3) DESC
                 LIMIT 1
             )
             RETURNING *",
        )
        .bind(status.as_str())
        .bind(to_millis(at))
        .bind(identifier)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage("update message status"))?;

        row.map(decode_message).transpose()
    }

    async fn list_newest_first(
        &self,
        wa_id: &str,
        offset: u64,
        limit: u32,
    ) -> Result<Vec<CanonicalMessage>> {
        let rows = sqlx::query_as::<_, MessageRow>(
            "SELECT * FROM messages
             WHERE wa_id = ?
             ORDER BY timestamp DESC, created_at DESC, id DESC
             LIMIT ? OFFSET ?",
        )
        .bind(wa_id)
        .bind(i64::from(limit))
        .bind(i64::try_from(offset).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(storage("list messages"))?;

        decode_messages(rows)
    }
}

#[cfg(test)]
impl SqliteMessageStore {
    pub(crate) async fn get(&self, identifier: &str) -> Result<Option<CanonicalMessage>> {
        let row = sqlx::query_as::<_, MessageRow>(
            "SELECT * FROM messages
             WHERE id = ?1 OR meta_msg_id = ?1
             ORDER BY (id = ?1) DESC
             LIMIT 1",
        )
        .bind(identifier)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage("get message"))?;

        row.map(decode_message).transpose()
    }
}

/// Candidate lookup, merge decision and write. Caller holds the write lock.
async fn upsert_locked(conn: &mut SqliteConnection, patch: MessagePatch) -> Result<Upserted> {
    let ids = patch.identifiers();
    let primary = ids[0].to_string();
    let alternate = ids.get(1).copied().unwrap_or(ids[0]).to_string();

    let rows = sqlx::query_as::<_, MessageRow>(
        "SELECT * FROM messages
         WHERE id IN (?1, ?2) OR meta_msg_id IN (?1, ?2)",
    )
    .bind(&primary)
    .bind(&alternate)
    .fetch_all(&mut *conn)
    .await
    .map_err(storage("load upsert candidates"))?;
    let candidates = decode_messages(rows)?;

    let plan = plan_upsert(patch, &candidates, rows::now());
    match &plan {
        UpsertPlan::Insert(m) => insert(conn, m).await?,
        UpsertPlan::Update(m) => update(conn, m).await?,
    }
    Ok(plan.into_upserted())
}

async fn insert(conn: &mut SqliteConnection, m: &CanonicalMessage) -> Result<()> {
    sqlx::query(
        "INSERT INTO messages
         (id, meta_msg_id, wa_id, phone_number, contact_name, direction, message_type,
          message_body, message_url, timestamp, status, status_updated_at,
          webhook_metadata, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&m.id)
    .bind(&m.meta_msg_id)
    .bind(&m.wa_id)
    .bind(&m.phone_number)
    .bind(&m.contact_name)
    .bind(m.direction.as_str())
    .bind(m.message_type.as_str())
    .bind(&m.message_body)
    .bind(&m.message_url)
    .bind(to_millis(m.timestamp))
    .bind(m.status.as_str())
    .bind(m.status_updated_at.map(to_millis))
    .bind(m.webhook_metadata.to_string())
    .bind(to_millis(m.created_at))
    .bind(to_millis(m.updated_at))
    .execute(&mut *conn)
    .await
    .map_err(storage("insert message"))?;
    Ok(())
}

async fn update(conn: &mut SqliteConnection, m: &CanonicalMessage) -> Result<()> {
    sqlx::query(
        "UPDATE messages SET
           meta_msg_id = ?, contact_name = ?, direction = ?, message_type = ?,
           message_body = ?, message_url = ?, timestamp = ?, status = ?,
           status_updated_at = ?, webhook_metadata = ?, updated_at = ?
         WHERE id = ?",
    )
    .bind(&m.meta_msg_id)
    .bind(&m.contact_name)
    .bind(m.direction.as_str())
    .bind(m.message_type.as_str())
    .bind(&m.message_body)
    .bind(&m.message_url)
    .bind(to_millis(m.timestamp))
    .bind(m.status.as_str())
    .bind(m.status_updated_at.map(to_millis))
    .bind(m.webhook_metadata.to_string())
    .bind(to_millis(m.updated_at))
    .bind(&m.id)
    .execute(&mut *conn)
    .await
    .map_err(storage("update message"))?;
    Ok(())
}
