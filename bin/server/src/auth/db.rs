//! Postgres-backed user directory.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gatehouse_core::UserId;
use gatehouse_platform_access::{DirectoryError, InsertOutcome, UserDirectory, UserRecord};
use sqlx::{FromRow, PgPool};
use std::str::FromStr;

/// Row type for user queries.
#[derive(FromRow)]
struct UserRow {
    id: String,
    email: String,
    name: String,
    created_at: DateTime<Utc>,
}

impl UserRow {
    fn try_into_record(self) -> Result<UserRecord, DirectoryError> {
        let id = UserId::from_str(&self.id).map_err(|e| DirectoryError::Decode {
            details: format!("invalid user id '{}': {}", self.id, e),
        })?;
        Ok(UserRecord::with_all_fields(
            id,
            self.email,
            self.name,
            self.created_at,
        ))
    }
}

fn query_failed(e: sqlx::Error) -> DirectoryError {
    DirectoryError::Query {
        details: e.to_string(),
    }
}

/// Repository for user operations.
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    /// Creates a new user repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserDirectory for UserRepository {
    async fn exists(&self, email: &str) -> gatehouse_core::Result<bool, DirectoryError> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM users WHERE email = $1)")
                .bind(email)
                .fetch_one(&self.pool)
                .await
                .map_err(query_failed)?;
        Ok(exists)
    }

    async fn insert(
        &self,
        email: &str,
        name: &str,
    ) -> gatehouse_core::Result<InsertOutcome, DirectoryError> {
        let record = UserRecord::new(email.to_string(), name.to_string());

        let result = sqlx::query(
            r#"
            INSERT INTO users (id, email, name, created_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(record.id().to_string())
        .bind(record.email())
        .bind(record.name())
        .bind(record.created_at())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(InsertOutcome::Created),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Ok(InsertOutcome::AlreadyExists)
            }
            Err(e) => Err(query_failed(e).into()),
        }
    }

    async fn find(
        &self,
        email: &str,
    ) -> gatehouse_core::Result<Option<UserRecord>, DirectoryError> {
        let row: Option<UserRow> = sqlx::query_as(
            r#"
            SELECT id, email, name, created_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(query_failed)?;

        match row {
            Some(r) => Ok(Some(r.try_into_record()?)),
            None => Ok(None),
        }
    }
}
