//! Chat server configuration

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use sqlx::SqlitePool;

use crate::chat::delivery::DeliveryRouter;
use crate::chat::presence::PresenceRegistry;
use crate::chat::store::{MessageStore, SqliteMessageStore};
use crate::chat::unseen::UnseenCounts;
use crate::core::db;
use crate::core::media::{LocalMediaStore, MediaStore};
use crate::core::users::{SqliteUserDirectory, UserDirectory};

/// Configuration for the Direct Chat Server
#[derive(Clone, Debug)]
pub struct ChatServerConfig {
    /// Address the HTTP listener binds to
    pub bind_addr: SocketAddr,
    /// SQLite connection URL for messages and the user table
    pub database_url: String,
    /// Directory for uploaded media
    pub media_dir: PathBuf,
    /// Externally reachable base URL, used to build media links
    pub public_url: String,
    /// Events buffered per connection before pushes are dropped
    pub push_buffer: usize,
    /// Max media upload size in MB
    pub max_media_mb: usize,
    /// Header carrying the caller identity set by the auth gateway
    pub identity_header: String,
}

impl Default for ChatServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 5000)),
            database_url: "sqlite:chat.sqlite".to_string(),
            media_dir: PathBuf::from("media"),
            public_url: "http://localhost:5000".to_string(),
            push_buffer: 64,
            max_media_mb: 50,
            identity_header: "x-user-id".to_string(),
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl ChatServerConfig {
    /// Read configuration from `CHAT_*` environment variables, falling back
    /// to defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bind_addr: env_or("CHAT_BIND_ADDR", defaults.bind_addr),
            database_url: env_or("CHAT_DATABASE_URL", defaults.database_url),
            media_dir: env_or("CHAT_MEDIA_DIR", defaults.media_dir),
            public_url: env_or("CHAT_PUBLIC_URL", defaults.public_url),
            push_buffer: env_or("CHAT_PUSH_BUFFER", defaults.push_buffer).max(1),
            max_media_mb: env_or("CHAT_MAX_MEDIA_MB", defaults.max_media_mb),
            identity_header: env_or("CHAT_IDENTITY_HEADER", defaults.identity_header)
                .to_ascii_lowercase(),
        }
    }

    /// Create config with custom base directory
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        let base = base_dir.into();
        Self {
            database_url: format!("sqlite:{}", base.join("chat.sqlite").display()),
            media_dir: base.join("media"),
            ..Self::default()
        }
    }

    /// Same as `with_base_dir` but with a private in-memory database.
    pub fn in_memory(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            database_url: db::MEMORY_URL.to_string(),
            ..Self::with_base_dir(base_dir)
        }
    }

    pub fn max_media_bytes(&self) -> usize {
        self.max_media_mb * 1024 * 1024
    }

    /// Request body cap: base64 inflates media by a third, plus JSON framing.
    pub fn max_body_bytes(&self) -> usize {
        self.max_media_bytes() / 3 * 4 + 64 * 1024
    }

    /// Ensure all directories exist
    pub async fn ensure_dirs(&self) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(&self.media_dir).await?;
        Ok(())
    }
}

/// App state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: ChatServerConfig,
    pub store: Arc<dyn MessageStore>,
    pub presence: Arc<PresenceRegistry>,
    pub router: Arc<DeliveryRouter>,
    pub unseen: Arc<UnseenCounts>,
    pub users: Arc<dyn UserDirectory>,
    pub media: Arc<dyn MediaStore>,
}

impl AppState {
    /// Open storage and wire every component from the config.
    pub async fn build(config: ChatServerConfig) -> anyhow::Result<Self> {
        config.ensure_dirs().await?;
        let pool = db::connect(&config.database_url).await?;
        Self::with_pool(config, pool).await
    }

    pub async fn with_pool(config: ChatServerConfig, pool: SqlitePool) -> anyhow::Result<Self> {
        let store: Arc<dyn MessageStore> = Arc::new(SqliteMessageStore::new(pool.clone()).await?);
        let users: Arc<dyn UserDirectory> = Arc::new(SqliteUserDirectory::new(pool).await?);
        let media: Arc<dyn MediaStore> = Arc::new(LocalMediaStore::new(
            config.media_dir.clone(),
            &config.public_url,
            config.max_media_bytes(),
        ));

        let presence = Arc::new(PresenceRegistry::new());
        let router = Arc::new(DeliveryRouter::new(store.clone(), presence.clone()));
        let unseen = Arc::new(UnseenCounts::new(store.clone()));

        Ok(Self {
            config,
            store,
            presence,
            router,
            unseen,
            users,
            media,
        })
    }
}
