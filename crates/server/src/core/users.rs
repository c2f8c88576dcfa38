//! User Directory
//!
//! Read access to the user table owned by the identity service.
//! Stored in the same SQLite database as the messages.

use async_trait::async_trait;
use sqlx::SqlitePool;
use tracing::info;

use crate::core::error::Result;
use crate::core::models::User;

/// Lookup of users known to the identity service.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Whether a user with this id exists.
    async fn exists(&self, user_id: &str) -> Result<bool>;

    /// Every user except `viewer_id`, ordered by display name.
    async fn others(&self, viewer_id: &str) -> Result<Vec<User>>;
}

pub struct SqliteUserDirectory {
    pool: SqlitePool,
}

impl SqliteUserDirectory {
    pub async fn new(pool: SqlitePool) -> Result<Self> {
        let directory = Self { pool };
        directory.init_db().await?;
        info!("[Users] Directory initialized");
        Ok(directory)
    }

    async fn init_db(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                display_name TEXT NOT NULL,
                avatar_url TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Provisioning hook for the identity service and fixtures.
    pub async fn insert(&self, user: &User) -> Result<()> {
        sqlx::query(
            "INSERT INTO users (id, display_name, avatar_url) VALUES (?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET display_name = excluded.display_name,
                                           avatar_url = excluded.avatar_url",
        )
        .bind(&user.id)
        .bind(&user.display_name)
        .bind(&user.avatar_url)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl UserDirectory for SqliteUserDirectory {
    async fn exists(&self, user_id: &str) -> Result<bool> {
        let row: Option<(String,)> = sqlx::query_as("SELECT id FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn others(&self, viewer_id: &str) -> Result<Vec<User>> {
        let users = sqlx::query_as::<_, User>(
            "SELECT id, display_name, avatar_url FROM users WHERE id != ? ORDER BY display_name, id",
        )
        .bind(viewer_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(users)
    }
}
