use {
    async_trait::async_trait,
    inbox_messages::{ConversationStore, ConversationSummary, Error, Result, SummaryPatch},
    sqlx::SqlitePool,
};

use crate::rows::{self, ConversationRow, decode_summary, to_millis};

/// SQLite-backed conversation summaries.
///
/// [`ConversationStore::apply`] is a single `INSERT .. ON CONFLICT` statement,
/// so concurrent patches for one conversation never lose an unread increment.
pub struct SqliteConversationStore {
    pool: SqlitePool,
}

impl SqliteConversationStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ConversationStore for SqliteConversationStore {
    async fn apply(&self, patch: SummaryPatch) -> Result<ConversationSummary> {
        let now = to_millis(rows::now());
        // Preview and type follow last_message_time: they only move when the
        // incoming message is at least as new as the stored one.
        let row = sqlx::query_as::<_, ConversationRow>(
            "INSERT INTO conversations
             (wa_id, phone_number, contact_name, last_message_time, last_message_preview,
              last_message_type, unread_count, created_at, updated_at)
             VALUES (?1, ?2, COALESCE(?3, ?1), ?4, ?5, ?6, ?7, ?8, ?8)
             ON CONFLICT(wa_id) DO UPDATE SET
               contact_name = COALESCE(?3, conversations.contact_name),
               last_message_preview = CASE
                 WHEN excluded.last_message_time >= conversations.last_message_time
                 THEN excluded.last_message_preview
                 ELSE conversations.last_message_preview END,
               last_message_type = CASE
                 WHEN excluded.last_message_time >= conversations.last_message_time
                 THEN excluded.last_message_type
                 ELSE conversations.last_message_type END,
               last_message_time = MAX(conversations.last_message_time, excluded.last_message_time),
               unread_count = conversations.unread_count + excluded.unread_count,
               updated_at = excluded.updated_at
             RETURNING *",
        )
        .bind(&patch.wa_id)
        .bind(&patch.phone_number)
        .bind(&patch.contact_name)
        .bind(to_millis(patch.message_time))
        .bind(&patch.preview)
        .bind(patch.message_type.as_str())
        .bind(i64::from(patch.unread_increment))
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| Error::storage("apply conversation summary", e))?;

        decode_summary(row)
    }

    async fn mark_read(&self, wa_id: &str) -> Result<()> {
        sqlx::query(
            "UPDATE conversations SET unread_count = 0, updated_at = ?
             WHERE wa_id = ? AND unread_count <> 0",
        )
        .bind(to_millis(rows::now()))
        .bind(wa_id)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::storage("mark conversation read", e))?;
        Ok(())
    }

    async fn list(&self, limit: u32) -> Result<Vec<ConversationSummary>> {
        let rows = sqlx::query_as::<_, ConversationRow>(
            "SELECT * FROM conversations
             ORDER BY last_message_time DESC, wa_id
             LIMIT ?",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::storage("list conversations", e))?;
        rows.into_iter().map(decode_summary).collect()
    }
}

#[cfg(test)]
impl SqliteConversationStore {
    pub(crate) async fn get(&self, wa_id: &str) -> Result<Option<ConversationSummary>> {
        let row =
            sqlx::query_as::<_, ConversationRow>("SELECT * FROM conversations WHERE wa_id = ?")
                .bind(wa_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| Error::storage("get conversation", e))?;
        row.map(decode_summary).transpose()
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        chrono::{DateTime, Utc},
        inbox_messages::MessageType,
    };

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    fn patch(wa_id: &str, preview: &str, secs: i64, unread: u32) -> SummaryPatch {
        SummaryPatch {
            wa_id: wa_id.into(),
            phone_number: wa_id.into(),
            contact_name: None,
            message_time: at(secs),
            preview: preview.into(),
            message_type: MessageType::Text,
            unread_increment: unread,
        }
    }

    async fn store() -> SqliteConversationStore {
        SqliteConversationStore::new(crate::test_pool().await)
    }

    #[tokio::test]
    async fn first_patch_creates_summary_named_after_conversation() {
        let store = store().await;
        let summary = store.apply(patch("111", "hi", 1000, 1)).await.unwrap();
        assert_eq!(summary.contact_name, "111");
        assert_eq!(summary.unread_count, 1);
        assert_eq!(summary.last_message_preview, "hi");
        assert_eq!(store.get("111").await.unwrap().unwrap(), summary);
    }

    #[tokio::test]
    async fn out_of_order_message_never_regresses() {
        let store = store().await;
        let mut named = patch("111", "newer", 2000, 1);
        named.contact_name = Some("Ravi".into());
        store.apply(named).await.unwrap();

        let mut older = patch("111", "older", 1000, 1);
        older.message_type = MessageType::Image;
        let summary = store.apply(older).await.unwrap();

        assert_eq!(summary.last_message_time, at(2000));
        assert_eq!(summary.last_message_preview, "newer");
        assert_eq!(summary.last_message_type, MessageType::Text);
        assert_eq!(summary.contact_name, "Ravi");
        assert_eq!(summary.unread_count, 2);
    }

    #[tokio::test]
    async fn mark_read_resets_unread() {
        let store = store().await;
        store.apply(patch("111", "a", 1000, 1)).await.unwrap();
        store.apply(patch("111", "b", 1001, 1)).await.unwrap();
        store.mark_read("111").await.unwrap();
        store.mark_read("unknown").await.unwrap();
        assert_eq!(store.get("111").await.unwrap().unwrap().unread_count, 0);
    }

    #[tokio::test]
    async fn list_is_newest_first_and_bounded() {
        let store = store().await;
        store.apply(patch("a", "x", 1000, 0)).await.unwrap();
        store.apply(patch("b", "x", 3000, 0)).await.unwrap();
        store.apply(patch("c", "x", 2000, 0)).await.unwrap();

        let list = store.list(2).await.unwrap();
        let order: Vec<&str> = list.iter().map(|c| c.wa_id.as_str()).collect();
        assert_eq!(order, vec!["b", "c"]);
    }
}
