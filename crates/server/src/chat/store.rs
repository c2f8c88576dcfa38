//! Message Store
//!
//! Durable log of direct messages between user pairs, backed by SQLite.
//! Rows are immutable apart from the `seen` flag, which only moves from
//! false to true.

use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use std::collections::HashMap;
use tracing::{debug, info};
use uuid::Uuid;

use crate::core::error::{Error, Result};
use crate::core::models::{Message, MessageId, Payload, UserId};

/// Persistence contract for direct messages.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Validate and persist a new message, returning the stored record.
    async fn append(&self, sender_id: &str, receiver_id: &str, payload: Payload) -> Result<Message>;

    /// All messages between the pair, in either direction, oldest first.
    async fn conversation(&self, user_a: &str, user_b: &str) -> Result<Vec<Message>>;

    /// Mark everything `other_user_id` sent to `viewer_id` as seen.
    /// Returns how many messages changed.
    async fn mark_conversation_read(&self, other_user_id: &str, viewer_id: &str) -> Result<u64>;

    /// Mark a single message as seen.
    async fn mark_message_read(&self, message_id: &str) -> Result<()>;

    /// Mark the listed messages addressed to `viewer_id` as seen, leaving
    /// anything else untouched. Returns how many messages changed.
    async fn mark_messages_read(&self, viewer_id: &str, message_ids: &[MessageId]) -> Result<u64>;

    /// Look up one message by id.
    async fn message(&self, message_id: &str) -> Result<Option<Message>>;

    /// Unseen message counts addressed to `viewer_id`, keyed by sender.
    async fn unseen_by_sender(&self, viewer_id: &str) -> Result<HashMap<UserId, u64>>;
}

/// Row layout of the `messages` table.
#[derive(Debug, sqlx::FromRow)]
struct MessageRow {
    id: String,
    sender_id: String,
    receiver_id: String,
    text: Option<String>,
    image_url: Option<String>,
    video_url: Option<String>,
    seen: bool,
    created_at: i64,
}

impl TryFrom<MessageRow> for Message {
    type Error = Error;

    fn try_from(row: MessageRow) -> Result<Self> {
        let payload = match (row.text, row.image_url, row.video_url) {
            (Some(text), None, None) => Payload::Text(text),
            (None, Some(url), None) => Payload::Image(url),
            (None, None, Some(url)) => Payload::Video(url),
            _ => {
                return Err(Error::Internal(format!(
                    "message {} has no single payload",
                    row.id
                )))
            }
        };
        let created_at = DateTime::<Utc>::from_timestamp_micros(row.created_at).ok_or_else(|| {
            Error::Internal(format!("message {} has invalid timestamp", row.id))
        })?;

        Ok(Message {
            id: row.id,
            sender_id: row.sender_id,
            receiver_id: row.receiver_id,
            payload,
            seen: row.seen,
            created_at,
        })
    }
}

/// Ids bound per UPDATE, well under SQLite's variable limit.
const MARK_BATCH: usize = 500;

const SELECT_MESSAGE: &str =
    "SELECT id, sender_id, receiver_id, text, image_url, video_url, seen, created_at FROM messages";

pub struct SqliteMessageStore {
    pool: SqlitePool,
}

impl SqliteMessageStore {
    pub async fn new(pool: SqlitePool) -> Result<Self> {
        let store = Self { pool };
        store.init_db().await?;
        info!("[Messages] Store initialized");
        Ok(store)
    }

    async fn init_db(&self) -> Result<()> {
        // `seq` breaks ties between messages created in the same microsecond
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                sender_id TEXT NOT NULL,
                receiver_id TEXT NOT NULL,
                text TEXT,
                image_url TEXT,
                video_url TEXT,
                seen INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL,
                CHECK ((text IS NOT NULL) + (image_url IS NOT NULL) + (video_url IS NOT NULL) = 1)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_messages_pair
             ON messages (sender_id, receiver_id, created_at)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_messages_unseen
             ON messages (receiver_id, seen, sender_id)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn validate_participants(sender_id: &str, receiver_id: &str) -> Result<()> {
    if sender_id.is_empty() || receiver_id.is_empty() {
        return Err(Error::validation("sender and receiver are required"));
    }
    if sender_id == receiver_id {
        return Err(Error::validation("cannot send a message to yourself"));
    }
    Ok(())
}

#[async_trait]
impl MessageStore for SqliteMessageStore {
    async fn append(&self, sender_id: &str, receiver_id: &str, payload: Payload) -> Result<Message> {
        validate_participants(sender_id, receiver_id)?;
        payload.validate()?;

        let message = Message {
            id: Uuid::new_v4().to_string(),
            sender_id: sender_id.to_string(),
            receiver_id: receiver_id.to_string(),
            payload,
            seen: false,
            // Stored at microsecond precision; keep the returned copy identical
            created_at: Utc::now().trunc_subsecs(6),
        };

        let (text, image_url, video_url) = match &message.payload {
            Payload::Text(text) => (Some(text.as_str()), None, None),
            Payload::Image(url) => (None, Some(url.as_str()), None),
            Payload::Video(url) => (None, None, Some(url.as_str())),
        };

        sqlx::query(
            "INSERT INTO messages (id, sender_id, receiver_id, text, image_url, video_url, seen, created_at)
             VALUES (?, ?, ?, ?, ?, ?, 0, ?)",
        )
        .bind(&message.id)
        .bind(&message.sender_id)
        .bind(&message.receiver_id)
        .bind(text)
        .bind(image_url)
        .bind(video_url)
        .bind(message.created_at.timestamp_micros())
        .execute(&self.pool)
        .await?;

        debug!(
            "[Messages] Appended {} {} -> {} ({})",
            message.id,
            message.sender_id,
            message.receiver_id,
            message.payload.kind()
        );

        Ok(message)
    }

    async fn conversation(&self, user_a: &str, user_b: &str) -> Result<Vec<Message>> {
        let rows: Vec<MessageRow> = sqlx::query_as(&format!(
            "{} WHERE (sender_id = ? AND receiver_id = ?) OR (sender_id = ? AND receiver_id = ?)
             ORDER BY created_at ASC, seq ASC",
            SELECT_MESSAGE
        ))
        .bind(user_a)
        .bind(user_b)
        .bind(user_b)
        .bind(user_a)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Message::try_from).collect()
    }

    async fn mark_conversation_read(&self, other_user_id: &str, viewer_id: &str) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE messages SET seen = 1 WHERE sender_id = ? AND receiver_id = ? AND seen = 0",
        )
        .bind(other_user_id)
        .bind(viewer_id)
        .execute(&self.pool)
        .await?;

        let updated = result.rows_affected();
        if updated > 0 {
            debug!(
                "[Messages] {} marked {} messages from {} as seen",
                viewer_id, updated, other_user_id
            );
        }
        Ok(updated)
    }

    async fn mark_message_read(&self, message_id: &str) -> Result<()> {
        // Matches the row even when it is already seen, so 0 means unknown id
        let result = sqlx::query("UPDATE messages SET seen = 1 WHERE id = ?")
            .bind(message_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(Error::not_found(format!("message {}", message_id)));
        }
        Ok(())
    }

    async fn mark_messages_read(&self, viewer_id: &str, message_ids: &[MessageId]) -> Result<u64> {
        let mut updated = 0;
        for batch in message_ids.chunks(MARK_BATCH) {
            let mut query = QueryBuilder::<Sqlite>::new(
                "UPDATE messages SET seen = 1 WHERE seen = 0 AND receiver_id = ",
            );
            query.push_bind(viewer_id);
            query.push(" AND id IN (");
            let mut ids = query.separated(", ");
            for id in batch {
                ids.push_bind(id.as_str());
            }
            ids.push_unseparated(")");

            updated += query.build().execute(&self.pool).await?.rows_affected();
        }

        if updated > 0 {
            debug!("[Messages] {} marked {} listed messages as seen", viewer_id, updated);
        }
        Ok(updated)
    }

    async fn message(&self, message_id: &str) -> Result<Option<Message>> {
        let row: Option<MessageRow> = sqlx::query_as(&format!("{} WHERE id = ?", SELECT_MESSAGE))
            .bind(message_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Message::try_from).transpose()
    }

    async fn unseen_by_sender(&self, viewer_id: &str) -> Result<HashMap<UserId, u64>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT sender_id, COUNT(*) FROM messages
             WHERE receiver_id = ? AND seen = 0
             GROUP BY sender_id",
        )
        .bind(viewer_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(sender, count)| (sender, count as u64))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::db;

    async fn store() -> SqliteMessageStore {
        let pool = db::connect(db::MEMORY_URL).await.unwrap();
        SqliteMessageStore::new(pool).await.unwrap()
    }

    fn text(s: &str) -> Payload {
        Payload::Text(s.to_string())
    }

    #[tokio::test]
    async fn test_append_every_variant() {
        let store = store().await;
        let payloads = [
            text("hello"),
            Payload::Image("https://cdn.test/a.png".into()),
            Payload::Video("https://cdn.test/v.mp4".into()),
        ];

        for (i, payload) in payloads.into_iter().enumerate() {
            let receiver = format!("receiver-{}", i);
            let sent = store.append("alice", &receiver, payload.clone()).await.unwrap();
            assert!(!sent.seen);
            assert_eq!(sent.payload, payload);

            let conversation = store.conversation("alice", &receiver).await.unwrap();
            assert_eq!(conversation, vec![sent]);
        }
    }

    #[tokio::test]
    async fn test_conversation_is_symmetric_and_ordered() {
        let store = store().await;
        let m1 = store.append("alice", "bob", text("one")).await.unwrap();
        let m2 = store.append("bob", "alice", text("two")).await.unwrap();
        let m3 = store.append("alice", "bob", text("three")).await.unwrap();
        // Unrelated pair must not leak in
        store.append("alice", "carol", text("other")).await.unwrap();

        let ab = store.conversation("alice", "bob").await.unwrap();
        let ba = store.conversation("bob", "alice").await.unwrap();
        assert_eq!(ab, ba);
        assert_eq!(
            ab.iter().map(|m| m.id.as_str()).collect::<Vec<_>>(),
            vec![m1.id.as_str(), m2.id.as_str(), m3.id.as_str()]
        );
        assert!(ab.windows(2).all(|w| w[0].created_at <= w[1].created_at));
    }

    #[tokio::test]
    async fn test_empty_conversation() {
        let store = store().await;
        assert!(store.conversation("alice", "bob").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_append_writes_nothing() {
        let store = store().await;

        let blank = store.append("alice", "bob", text("  ")).await;
        assert!(matches!(blank, Err(Error::Validation(_))));

        let bad_url = store
            .append("alice", "bob", Payload::Image("javascript:alert(1)".into()))
            .await;
        assert!(matches!(bad_url, Err(Error::Validation(_))));

        let to_self = store.append("alice", "alice", text("me")).await;
        assert!(matches!(to_self, Err(Error::Validation(_))));

        assert!(store.conversation("alice", "bob").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mark_conversation_read_is_directional_and_idempotent() {
        let store = store().await;
        store.append("alice", "bob", text("a1")).await.unwrap();
        store.append("alice", "bob", text("a2")).await.unwrap();
        store.append("bob", "alice", text("b1")).await.unwrap();

        assert_eq!(store.mark_conversation_read("alice", "bob").await.unwrap(), 2);
        assert_eq!(store.mark_conversation_read("alice", "bob").await.unwrap(), 0);

        let conversation = store.conversation("alice", "bob").await.unwrap();
        for message in conversation {
            // Only alice -> bob was read; bob's own message stays unseen
            assert_eq!(message.seen, message.sender_id == "alice");
        }
    }

    #[tokio::test]
    async fn test_mark_messages_read_only_touches_listed() {
        let store = store().await;
        let read = store.append("alice", "bob", text("read")).await.unwrap();
        let later = store.append("alice", "bob", text("later")).await.unwrap();
        let own = store.append("bob", "alice", text("own")).await.unwrap();

        // Ids not addressed to the viewer are ignored
        let ids = vec![read.id.clone(), own.id.clone()];
        assert_eq!(store.mark_messages_read("bob", &ids).await.unwrap(), 1);
        assert_eq!(store.mark_messages_read("bob", &ids).await.unwrap(), 0);
        assert_eq!(store.mark_messages_read("bob", &[]).await.unwrap(), 0);

        assert!(store.message(&read.id).await.unwrap().unwrap().seen);
        assert!(!store.message(&later.id).await.unwrap().unwrap().seen);
        assert!(!store.message(&own.id).await.unwrap().unwrap().seen);
        assert_eq!(store.unseen_by_sender("bob").await.unwrap()["alice"], 1);
    }

    #[tokio::test]
    async fn test_mark_message_read() {
        let store = store().await;
        let sent = store.append("alice", "bob", text("hi")).await.unwrap();

        store.mark_message_read(&sent.id).await.unwrap();
        store.mark_message_read(&sent.id).await.unwrap();
        assert!(store.message(&sent.id).await.unwrap().unwrap().seen);

        let missing = store.mark_message_read("no-such-id").await;
        assert!(matches!(missing, Err(Error::NotFound(_))));
        assert!(store.message("no-such-id").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unseen_by_sender() {
        let store = store().await;
        store.append("alice", "bob", text("1")).await.unwrap();
        store.append("alice", "bob", text("2")).await.unwrap();
        store.append("carol", "bob", text("3")).await.unwrap();
        store.append("bob", "alice", text("4")).await.unwrap();

        let counts = store.unseen_by_sender("bob").await.unwrap();
        assert_eq!(counts.len(), 2);
        assert_eq!(counts["alice"], 2);
        assert_eq!(counts["carol"], 1);

        store.mark_conversation_read("alice", "bob").await.unwrap();
        let counts = store.unseen_by_sender("bob").await.unwrap();
        assert!(!counts.contains_key("alice"));
    }
}
