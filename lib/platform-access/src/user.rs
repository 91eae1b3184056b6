//! User record type.
//!
//! A user is keyed by the email address the identity provider verified.
//! The directory assigns the internal `UserId` when the record is created;
//! records are never mutated or deleted by the authentication layer.

use chrono::{DateTime, Utc};
use gatehouse_core::UserId;
use serde::{Deserialize, Serialize};

/// A registered user of the application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    /// Internal user ID.
    id: UserId,
    /// Verified email address. Unique across records.
    email: String,
    /// Display name captured at first login.
    name: String,
    /// When the record was created.
    created_at: DateTime<Utc>,
}

impl UserRecord {
    /// Creates a new record with a generated ID.
    #[must_use]
    pub fn new(email: String, name: String) -> Self {
        Self {
            id: UserId::new(),
            email,
            name,
            created_at: Utc::now(),
        }
    }

    /// Reconstitutes a record from storage.
    #[must_use]
    pub fn with_all_fields(
        id: UserId,
        email: String,
        name: String,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            email,
            name,
            created_at,
        }
    }

    /// Returns the internal user ID.
    #[must_use]
    pub fn id(&self) -> UserId {
        self.id
    }

    /// Returns the verified email address.
    #[must_use]
    pub fn email(&self) -> &str {
        &self.email
    }

    /// Returns the display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns when the record was created.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}
