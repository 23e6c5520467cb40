//! User accounts.
//!
//! Detection sessions are gated behind a login. `Authenticator` validates
//! usernames, hashes passwords (see `password`), and stores records through a
//! `CredentialStore`. Classified failures are `CredentialError`s carried in
//! `anyhow::Error`; storage failures propagate unclassified.

pub mod password;
mod store;

pub use store::{CredentialStore, InMemoryCredentialStore, InsertOutcome, SqliteCredentialStore};

use anyhow::{Context, Result};
use regex::Regex;
use std::fmt;

use password::{hash_password, verify_password, DEFAULT_ROUNDS};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialError {
    DuplicateUser(String),
    /// Unknown user or wrong password.
    InvalidCredentials,
    InvalidUsername(String),
    EmptyPassword,
}

impl fmt::Display for CredentialError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialError::DuplicateUser(user) => write!(f, "user '{}' already exists", user),
            CredentialError::InvalidCredentials => f.write_str("invalid username or password"),
            CredentialError::InvalidUsername(user) => write!(
                f,
                "invalid username '{}' (3-32 characters: letters, digits, '_', '.', '-')",
                user
            ),
            CredentialError::EmptyPassword => f.write_str("password must not be empty"),
        }
    }
}

impl std::error::Error for CredentialError {}

const USERNAME_PATTERN: &str = r"^[A-Za-z0-9_.-]{3,32}$";

pub fn validate_username(username: &str) -> Result<()> {
    let pattern = Regex::new(USERNAME_PATTERN).context("invalid username pattern")?;
    if pattern.is_match(username) {
        Ok(())
    } else {
        Err(CredentialError::InvalidUsername(username.to_string()).into())
    }
}

pub struct Authenticator<S: CredentialStore> {
    store: S,
    rounds: u32,
}

impl<S: CredentialStore> Authenticator<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            rounds: DEFAULT_ROUNDS,
        }
    }

    /// Override the PBKDF2 iteration count for new hashes.
    pub fn with_rounds(mut self, rounds: u32) -> Self {
        self.rounds = rounds.max(1);
        self
    }

    pub fn signup(&mut self, username: &str, password: &str) -> Result<()> {
        validate_username(username)?;
        if password.is_empty() {
            return Err(CredentialError::EmptyPassword.into());
        }
        let hash = hash_password(password, self.rounds);
        match self.store.insert(username, &hash)? {
            InsertOutcome::Inserted => {
                log::info!("created account '{}'", username);
                Ok(())
            }
            InsertOutcome::DuplicateKey => {
                Err(CredentialError::DuplicateUser(username.to_string()).into())
            }
        }
    }

    pub fn login(&mut self, username: &str, password: &str) -> Result<()> {
        let Some(hash) = self.store.lookup(username)? else {
            log::warn!("login rejected for '{}'", username);
            return Err(CredentialError::InvalidCredentials.into());
        };
        if verify_password(password, &hash)? {
            log::info!("'{}' logged in", username);
            Ok(())
        } else {
            log::warn!("login rejected for '{}'", username);
            Err(CredentialError::InvalidCredentials.into())
        }
    }

    pub fn into_store(self) -> S {
        self.store
    }
}
