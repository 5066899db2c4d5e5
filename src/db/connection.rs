use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use surrealdb::Surreal;
use surrealdb::engine::any::Any;
use surrealdb::opt::auth::Root;

pub type Db = Surreal<Any>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub namespace: String,
    pub database: String,
    pub username: Option<String>,
    #[serde(skip_serializing)]
    pub password: Option<String>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: env::var("DATABASE_URL").unwrap_or_else(|_| "memory".to_string()),
            namespace: env::var("DATABASE_NAMESPACE").unwrap_or_else(|_| "chidi".to_string()),
            database: env::var("DATABASE_NAME").unwrap_or_else(|_| "gateway".to_string()),
            username: env::var("DATABASE_USERNAME").ok(),
            password: env::var("DATABASE_PASSWORD").ok(),
        }
    }
}

pub async fn create_connection(config: DatabaseConfig) -> Result<Db> {
    let db = surrealdb::engine::any::connect(config.url).await?;

    // Sign in if credentials are provided
    if let (Some(username), Some(password)) = (config.username, config.password) {
        db.signin(Root {
            username: &username,
            password: &password,
        })
        .await?;
    }

    db.use_ns(config.namespace).use_db(config.database).await?;

    Ok(db)
}

/// Define the `user_context` table. Safe to run on every startup.
pub async fn ensure_schema(db: &Db) -> Result<()> {
    let schema = r#"
        DEFINE TABLE IF NOT EXISTS user_context SCHEMAFULL;
        DEFINE FIELD IF NOT EXISTS user_id ON TABLE user_context TYPE string
            ASSERT string::len($value) > 0;
        DEFINE FIELD IF NOT EXISTS business_data ON TABLE user_context FLEXIBLE TYPE object DEFAULT {};
        DEFINE FIELD IF NOT EXISTS onboarding_status ON TABLE user_context TYPE string DEFAULT 'pending';
        DEFINE FIELD IF NOT EXISTS settings ON TABLE user_context FLEXIBLE TYPE object DEFAULT {};
        DEFINE FIELD IF NOT EXISTS created_at ON TABLE user_context TYPE datetime DEFAULT time::now();
        DEFINE FIELD IF NOT EXISTS updated_at ON TABLE user_context TYPE datetime VALUE time::now();
        DEFINE INDEX IF NOT EXISTS user_context_user_id ON TABLE user_context COLUMNS user_id UNIQUE;
    "#;

    db.query(schema).await?.check()?;

    Ok(())
}
