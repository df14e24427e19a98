use crate::constants::{DB_CHAT_RETENTION_DAYS, DB_PRAGMAS};
use crate::types::{AgentError, ConversationMessage, Result, UserAddress};
use sqlx::sqlite::SqlitePool;
use std::path::Path;

pub type DbPool = SqlitePool;

pub async fn init_db<P: AsRef<Path>>(path: P) -> Result<DbPool> {
    let path_str = match path.as_ref().to_str() {
        Some(s) => s,
        None => {
            return Err(AgentError::Internal(
                "Invalid database path: Path contains non-UTF8 characters".to_string(),
            )
            .into())
        }
    };
    let url = format!("sqlite:{}?mode=rwc", path_str);

    let pool = match SqlitePool::connect(&url).await {
        Ok(p) => p,
        Err(e) => return Err(AgentError::Database(e).into()),
    };

    configure_db(&pool).await?;

    if let Err(e) = sqlx::migrate!("./migrations").run(&pool).await {
        return Err(AgentError::Internal(format!("Migration failed: {}", e)).into());
    }

    verify_schema_version(&pool).await;

    if let Err(e) = cleanup_old_data(&pool, DB_CHAT_RETENTION_DAYS).await {
        tracing::warn!("Database cleanup failed: {}", e);
    }

    Ok(pool)
}

async fn configure_db(pool: &DbPool) -> Result<()> {
    for pragma in DB_PRAGMAS {
        if let Err(e) = sqlx::query(pragma).execute(pool).await {
            return Err(AgentError::Database(e).into());
        }
    }
    Ok(())
}

async fn verify_schema_version(pool: &DbPool) {
    let version_row: std::result::Result<(String,), sqlx::Error> =
        sqlx::query_as("SELECT value FROM schema_metadata WHERE key = 'schema_version'")
            .fetch_one(pool)
            .await;

    match version_row {
        Ok((version,)) => {
            tracing::info!("Database initialized. Schema version: {}", version);
        }
        Err(e) => {
            tracing::warn!("Could not verify schema version: {}", e);
        }
    }
}

/// Deletes chat history rows older than `retention_days`. Permission and wallet
/// rows are kept regardless of age.
pub async fn cleanup_old_data(
    pool: &DbPool,
    retention_days: i64,
) -> std::result::Result<u64, sqlx::Error> {
    let threshold = format!("-{} days", retention_days);

    let deleted = sqlx::query("DELETE FROM agent_chat_messages WHERE created_at < datetime('now', ?)")
        .bind(&threshold)
        .execute(pool)
        .await?;

    if deleted.rows_affected() > 0 {
        tracing::info!(
            "Cleanup complete: removed {} chat messages older than {} days.",
            deleted.rows_affected(),
            retention_days
        );
    }

    Ok(deleted.rows_affected())
}

/// Appends one message to the caller's chat history. Single insert, no reads.
pub async fn insert_chat_message(
    pool: &DbPool,
    user: &UserAddress,
    message: &ConversationMessage,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO agent_chat_messages (id, user_address, role, content) VALUES (?, ?, ?, ?)",
    )
    .bind(uuid::Uuid::new_v4().to_string())
    .bind(&user.0)
    .bind(message.role.to_string())
    .bind(&message.content)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get_chat_history(pool: &DbPool, user: &UserAddress) -> Result<Vec<(String, String)>> {
    let rows: Vec<(String, String)> = sqlx::query_as(
        "SELECT role, content FROM agent_chat_messages WHERE user_address = ? ORDER BY created_at, rowid",
    )
    .bind(&user.0)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
