//! Contract for the user directory, plus an in-memory implementation.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::error::DirectoryError;
use crate::user::UserRecord;

/// Result of inserting a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// A new record was written.
    Created,
    /// A record for the email already existed; nothing was written.
    AlreadyExists,
}

/// Storage of user records keyed by verified email.
///
/// Implementations must be safe to share between concurrent requests.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Returns true if a record exists for `email`.
    async fn exists(&self, email: &str) -> gatehouse_core::Result<bool, DirectoryError>;

    /// Inserts a record for `email`, assigning a new internal ID.
    ///
    /// A uniqueness violation (a concurrent first login for the same email
    /// won the race) is reported as `InsertOutcome::AlreadyExists`, not as an error.
    async fn insert(
        &self,
        email: &str,
        name: &str,
    ) -> gatehouse_core::Result<InsertOutcome, DirectoryError>;

    /// Looks up the record for `email`.
    async fn find(&self, email: &str) -> gatehouse_core::Result<Option<UserRecord>, DirectoryError>;
}

/// A directory held in process memory.
#[derive(Debug, Default)]
pub struct InMemoryUserDirectory {
    users: RwLock<HashMap<String, UserRecord>>,
}

impl InMemoryUserDirectory {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of records.
    pub async fn len(&self) -> usize {
        self.users.read().await.len()
    }

    /// Returns true if the directory holds no records.
    pub async fn is_empty(&self) -> bool {
        self.users.read().await.is_empty()
    }

    /// Returns every record, in no particular order.
    pub async fn records(&self) -> Vec<UserRecord> {
        self.users.read().await.values().cloned().collect()
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn exists(&self, email: &str) -> gatehouse_core::Result<bool, DirectoryError> {
        Ok(self.users.read().await.contains_key(email))
    }

    async fn insert(
        &self,
        email: &str,
        name: &str,
    ) -> gatehouse_core::Result<InsertOutcome, DirectoryError> {
        let mut users = self.users.write().await;
        if users.contains_key(email) {
            return Ok(InsertOutcome::AlreadyExists);
        }
        users.insert(
            email.to_string(),
            UserRecord::new(email.to_string(), name.to_string()),
        );
        Ok(InsertOutcome::Created)
    }

    async fn find(&self, email: &str) -> gatehouse_core::Result<Option<UserRecord>, DirectoryError> {
        Ok(self.users.read().await.get(email).cloned())
    }
}
