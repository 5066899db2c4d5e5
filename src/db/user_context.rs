//! Per-user context records.

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::db::Db;
use crate::types::UserId;

const SELECT_BY_USER: &str = r#"
    SELECT
        meta::id(id) AS id,
        user_id,
        business_data,
        onboarding_status,
        settings,
        <string> created_at AS created_at,
        <string> updated_at AS updated_at
    FROM user_context
    WHERE user_id = $user_id
    LIMIT 1
"#;

/// Stored context for one user, as returned to API clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserContextRecord {
    /// Database record id; internal, not part of API responses.
    #[serde(skip_serializing)]
    pub id: String,
    pub user_id: String,
    pub business_data: Value,
    pub onboarding_status: String,
    pub settings: Value,
    /// RFC 3339 timestamp.
    pub created_at: String,
    /// RFC 3339 timestamp.
    pub updated_at: String,
}

/// Store for `user_context` rows.
#[derive(Clone)]
pub struct UserContextStore {
    db: Db,
}

impl UserContextStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Get the context for a user, if one exists.
    pub async fn get(&self, user_id: &UserId) -> Result<Option<UserContextRecord>> {
        let mut res = self
            .db
            .query(SELECT_BY_USER)
            .bind(("user_id", user_id.to_string()))
            .await?;

        let record: Option<UserContextRecord> = res.take(0)?;
        Ok(record)
    }

    /// Get the context for a user, creating a default one on first use.
    ///
    /// Returns the record and whether it was created by this call. Two
    /// concurrent first calls for the same user both succeed; the unique
    /// index on `user_id` makes one of them observe the other's row.
    pub async fn get_or_create(&self, user_id: &UserId) -> Result<(UserContextRecord, bool)> {
        if let Some(existing) = self.get(user_id).await? {
            debug!(user_id = %user_id, "User context already exists");
            return Ok((existing, false));
        }

        let query = format!(
            "CREATE user_context CONTENT {{ user_id: $user_id }} RETURN NONE; {}",
            SELECT_BY_USER
        );

        let mut res = self
            .db
            .query(query)
            .bind(("user_id", user_id.to_string()))
            .await?;

        let created: surrealdb::Result<Option<Value>> = res.take(0);
        let record: Option<UserContextRecord> = res.take(1)?;

        match (created, record) {
            (Ok(_), Some(record)) => {
                info!(user_id = %user_id, "Created user context");
                Ok((record, true))
            }
            (Err(err), Some(record)) => {
                debug!(user_id = %user_id, "User context created concurrently: {}", err);
                Ok((record, false))
            }
            (Err(err), None) => Err(err.into()),
            (Ok(_), None) => Err(anyhow!("Failed to create user context")),
        }
    }
}
