use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;

/// Result of inserting a credential record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// A record for this username already exists; nothing was written.
    DuplicateKey,
}

/// Username → password-hash records.
pub trait CredentialStore {
    fn lookup(&mut self, username: &str) -> Result<Option<String>>;

    fn insert(&mut self, username: &str, password_hash: &str) -> Result<InsertOutcome>;
}

pub struct SqliteCredentialStore {
    conn: Connection,
}

impl SqliteCredentialStore {
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let path = db_path.as_ref();
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open credential store {}", path.display()))?;
        let mut store = Self { conn };
        store.ensure_schema()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let mut store = Self {
            conn: Connection::open_in_memory()?,
        };
        store.ensure_schema()?;
        Ok(store)
    }

    fn ensure_schema(&mut self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS users (
              username TEXT PRIMARY KEY,
              password TEXT NOT NULL
            );
            "#,
        )?;
        Ok(())
    }
}

impl CredentialStore for SqliteCredentialStore {
    fn lookup(&mut self, username: &str) -> Result<Option<String>> {
        let hash = self
            .conn
            .query_row(
                "SELECT password FROM users WHERE username = ?1",
                params![username],
                |row| row.get(0),
            )
            .optional()?;
        Ok(hash)
    }

    fn insert(&mut self, username: &str, password_hash: &str) -> Result<InsertOutcome> {
        let changed = self.conn.execute(
            "INSERT OR IGNORE INTO users (username, password) VALUES (?1, ?2)",
            params![username, password_hash],
        )?;
        if changed == 0 {
            Ok(InsertOutcome::DuplicateKey)
        } else {
            Ok(InsertOutcome::Inserted)
        }
    }
}

#[derive(Debug, Default)]
pub struct InMemoryCredentialStore {
    users: HashMap<String, String>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

impl CredentialStore for InMemoryCredentialStore {
    fn lookup(&mut self, username: &str) -> Result<Option<String>> {
        Ok(self.users.get(username).cloned())
    }

    fn insert(&mut self, username: &str, password_hash: &str) -> Result<InsertOutcome> {
        if self.users.contains_key(username) {
            return Ok(InsertOutcome::DuplicateKey);
        }
        self.users
            .insert(username.to_string(), password_hash.to_string());
        Ok(InsertOutcome::Inserted)
    }
}
