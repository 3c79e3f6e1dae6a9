use anyhow::{Context, Result};
use rusqlite::Connection;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

/// Thread-safe SQLite store for the user registry.
#[derive(Clone)]
pub struct Storage {
    conn: Arc<Mutex<Connection>>,
}

/// One row of the user registry, written whenever a user talks to the bot.
#[derive(Debug, Clone, PartialEq)]
pub struct BotUser {
    pub user_id: i64,
    pub username: Option<String>,
    pub first_name: String,
}

impl Storage {
    /// Open or create the SQLite database at the given path and run migrations.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;

        // WAL for concurrent reads; journal_mode PRAGMA returns the resulting
        // mode, so it must go through query_row
        let _: String = conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;

        Self::run_migrations(&conn)?;

        info!("Storage initialized at: {}", path.display());
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Self::run_migrations(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn run_migrations(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS users (
                user_id INTEGER PRIMARY KEY,
                username TEXT,
                first_name TEXT NOT NULL,
                first_seen TEXT NOT NULL DEFAULT (datetime('now')),
                last_seen TEXT NOT NULL DEFAULT (datetime('now'))
            );
            ",
        )
        .context("Failed to run migrations")?;
        Ok(())
    }

    /// Insert the user or refresh username/first_name/last_seen on revisit.
    pub async fn upsert_user(&self, user: &BotUser) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO users (user_id, username, first_name)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(user_id) DO UPDATE SET
                username = excluded.username,
                first_name = excluded.first_name,
                last_seen = datetime('now')",
            rusqlite::params![user.user_id, user.username, user.first_name],
        )
        .context("Failed to upsert user")?;
        Ok(())
    }

    pub async fn count_users(&self) -> Result<i64> {
        let conn = self.conn.lock().await;
        let count = conn
            .query_row("SELECT count(*) FROM users", [], |row| row.get(0))
            .context("Failed to count users")?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_user(id: i64, name: &str) -> BotUser {
        BotUser {
            user_id: id,
            username: Some(format!("@{name}")),
            first_name: name.to_string(),
        }
    }

    #[tokio::test]
    async fn test_upsert_and_count() {
        let storage = Storage::open_in_memory().unwrap();
        storage.upsert_user(&make_user(1, "alice")).await.unwrap();
        storage.upsert_user(&make_user(2, "bob")).await.unwrap();
        assert_eq!(storage.count_users().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_upsert_same_user_is_idempotent() {
        let storage = Storage::open_in_memory().unwrap();
        storage.upsert_user(&make_user(1, "alice")).await.unwrap();
        storage.upsert_user(&make_user(1, "alice")).await.unwrap();
        assert_eq!(storage.count_users().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_upsert_refreshes_username() {
        let storage = Storage::open_in_memory().unwrap();
        storage.upsert_user(&make_user(7, "old")).await.unwrap();
        storage
            .upsert_user(&BotUser {
                user_id: 7,
                username: None,
                first_name: "new".to_string(),
            })
            .await
            .unwrap();

        let conn = storage.conn.lock().await;
        let (username, first_name): (Option<String>, String) = conn
            .query_row(
                "SELECT username, first_name FROM users WHERE user_id = 7",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(username, None);
        assert_eq!(first_name, "new");
    }
}
