//! Relational store for signed-in users: accounts and saved conversations.
//!
//! # Schema
//!
//! ```sql
//! users(id, name, email UNIQUE, email_verified, image, created_at)
//! accounts(id, user_id -> users ON DELETE CASCADE, provider, provider_account_id)
//! conversations(id, user_id -> users ON DELETE CASCADE, model, messages, created_at, updated_at)
//! ```
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::types::Json;
use std::str::FromStr;
use tracing::info;
use uuid::Uuid;

const SCHEMA: [&str; 4] = [
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id TEXT PRIMARY KEY,
        name TEXT,
        email TEXT NOT NULL UNIQUE,
        email_verified TEXT,
        image TEXT,
        created_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS accounts (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        provider TEXT NOT NULL,
        provider_account_id TEXT NOT NULL,
        UNIQUE (provider, provider_account_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS conversations (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        model TEXT NOT NULL,
        messages TEXT NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_conversations_user_updated ON conversations(user_id, updated_at DESC)",
];

const CONVERSATION_COLUMNS: &str = "id, user_id, model, messages, created_at, updated_at";

#[derive(sqlx::FromRow, Serialize, Clone, Debug, PartialEq)]
pub struct User {
    pub id: String,
    pub name: Option<String>,
    pub email: String,
    pub email_verified: Option<DateTime<Utc>>,
    pub image: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Question,
    Answer,
}

/// One bubble of a saved conversation, as the client renders it.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ConversationMessage {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

#[derive(sqlx::FromRow, Serialize, Clone, Debug)]
pub struct Conversation {
    pub id: String,
    pub user_id: String,
    pub model: String,
    pub messages: Json<Vec<ConversationMessage>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// What an identity provider tells us about a signed-in user.
#[derive(Clone, Debug, PartialEq)]
pub struct OAuthProfile {
    pub provider: String,
    pub provider_account_id: String,
    pub email: String,
    pub name: Option<String>,
    pub image: Option<String>,
}

#[derive(Clone, Debug)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn connect(url: &str) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true);
        // every connection to `:memory:` is its own database
        let in_memory = url.contains(":memory:");
        let pool = SqlitePoolOptions::new()
            .max_connections(if in_memory { 1 } else { 5 })
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.init_schema().await?;
        info!(url, "database ready");
        Ok(db)
    }

    async fn init_schema(&self) -> Result<(), sqlx::Error> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Finds or creates the user behind an identity-provider login. Returns
    /// `true` alongside the user when it was newly created.
    ///
    /// `None` when the email already belongs to a user who signed in with a different
    /// login: accounts are never linked by email alone.
    pub async fn upsert_oauth_user(&self, profile: &OAuthProfile) -> Result<Option<(User, bool)>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let linked: Option<User> = sqlx::query_as(
            "SELECT u.* FROM users u JOIN accounts a ON a.user_id = u.id \
             WHERE a.provider = ? AND a.provider_account_id = ?",
        )
        .bind(&profile.provider)
        .bind(&profile.provider_account_id)
        .fetch_optional(&mut *tx)
        .await?;
        if let Some(user) = linked {
            tx.commit().await?;
            return Ok(Some((user, false)));
        }

        let taken: Option<(String,)> = sqlx::query_as("SELECT id FROM users WHERE email = ?")
            .bind(&profile.email)
            .fetch_optional(&mut *tx)
            .await?;
        if taken.is_some() {
            return Ok(None);
        }

        let now = Utc::now();
        let name = profile
            .name
            .clone()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(placeholder_name);
        let user: User = sqlx::query_as(
            "INSERT INTO users (id, name, email, email_verified, image, created_at) \
             VALUES (?, ?, ?, ?, ?, ?) RETURNING *",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(name)
        .bind(&profile.email)
        .bind(now)
        .bind(&profile.image)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO accounts (id, user_id, provider, provider_account_id) VALUES (?, ?, ?, ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&user.id)
        .bind(&profile.provider)
        .bind(&profile.provider_account_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some((user, true)))
    }

    pub async fn find_user(&self, id: &str) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    /// Deletes the user with their accounts and conversations.
    pub async fn delete_user(&self, id: &str) -> Result<bool, sqlx::Error> {
        let done = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(done.rows_affected() > 0)
    }

    pub async fn list_conversations(&self, user_id: &str) -> Result<Vec<Conversation>, sqlx::Error> {
        sqlx::query_as(&format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE user_id = ? ORDER BY updated_at DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
    }

    /// Creates or replaces a conversation. `None` when the id is taken by another user.
    pub async fn upsert_conversation(
        &self,
        user_id: &str,
        id: &str,
        messages: Vec<ConversationMessage>,
        model: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Conversation>, sqlx::Error> {
        sqlx::query_as(&format!(
            "INSERT INTO conversations ({CONVERSATION_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?) \
             ON CONFLICT(id) DO UPDATE SET \
                 model = excluded.model, \
                 messages = excluded.messages, \
                 updated_at = excluded.updated_at \
             WHERE conversations.user_id = excluded.user_id \
             RETURNING {CONVERSATION_COLUMNS}"
        ))
        .bind(id)
        .bind(user_id)
        .bind(model)
        .bind(Json(messages))
        .bind(now)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn delete_conversation(&self, user_id: &str, id: &str) -> Result<Option<Conversation>, sqlx::Error> {
        sqlx::query_as(&format!(
            "DELETE FROM conversations WHERE id = ? AND user_id = ? RETURNING {CONVERSATION_COLUMNS}"
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
    }
}

fn placeholder_name() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("User-{}", &suffix[..6])
}
