//! SQLite session store (feature-gated).

use async_trait::async_trait;
use codeshare_core::{
    ChangeFeed,
    session::{
        ChangeKind, Language, SessionEvent, SessionId, SessionPatch, SessionRecord, now,
    },
    traits::{SessionStore, StoreError, Subscription},
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS sessions (
    id TEXT PRIMARY KEY NOT NULL,
    content TEXT NOT NULL,
    language TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
)";

type Row = (String, String, String, i64, i64);

fn internal(e: &sqlx::Error) -> StoreError {
    StoreError::Internal(e.to_string())
}

fn decode(row: Row) -> Result<SessionRecord, StoreError> {
    let (id, content, language, created_at, updated_at) = row;
    let id = SessionId::parse(&id).map_err(|e| StoreError::Internal(e.to_string()))?;
    let language = language
        .parse::<Language>()
        .map_err(|e| StoreError::Corrupt {
            id: id.clone(),
            reason: e.to_string(),
        })?;
    Ok(SessionRecord {
        id,
        content,
        language,
        created_at,
        updated_at,
    })
}

/// SQLite store implementation.
///
/// Change notifications are fanned out in-process, so only writers sharing
/// this instance are observed by its subscribers.
pub struct SqliteStore {
    pool: SqlitePool,
    feed: ChangeFeed,
}

impl SqliteStore {
    /// Connect and create the schema if needed.
    ///
    /// # Errors
    /// Returns error if database connection fails.
    pub async fn new(database_url: &str) -> Result<Self, StoreError> {
        let options = database_url
            .parse::<SqliteConnectOptions>()
            .map_err(|e| internal(&e))?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .connect_with(options)
            .await
            .map_err(|e| internal(&e))?;

        sqlx::query(SCHEMA)
            .execute(&pool)
            .await
            .map_err(|e| internal(&e))?;

        tracing::info!("SQLite session store ready at {database_url}");
        Ok(Self {
            pool,
            feed: ChangeFeed::new(),
        })
    }

    async fn fetch(&self, id: &SessionId) -> Result<Option<SessionRecord>, StoreError> {
        let row: Option<Row> = sqlx::query_as(
            "SELECT id, content, language, created_at, updated_at FROM sessions WHERE id = ?",
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| internal(&e))?;

        row.map(decode).transpose()
    }
}

#[async_trait]
impl SessionStore for SqliteStore {
    async fn get(&self, id: &SessionId) -> Result<Option<SessionRecord>, StoreError> {
        self.fetch(id).await
    }

    async fn insert(
        &self,
        id: &SessionId,
        content: &str,
        language: Language,
    ) -> Result<SessionRecord, StoreError> {
        let record = SessionRecord::new(id.clone(), content, language);
        let result = sqlx::query(
            "INSERT INTO sessions (id, content, language, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(record.id.as_str())
        .bind(&record.content)
        .bind(record.language.as_str())
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {}
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                return Err(StoreError::AlreadyExists(id.clone()));
            }
            Err(e) => return Err(internal(&e)),
        }

        self.feed
            .publish(SessionEvent::from_record(ChangeKind::Inserted, &record));
        Ok(record)
    }

    async fn update(&self, id: &SessionId, patch: SessionPatch) -> Result<(), StoreError> {
        if patch.is_empty() {
            return Ok(());
        }

        let result = sqlx::query(
            "UPDATE sessions
             SET content = COALESCE(?, content),
                 language = COALESCE(?, language),
                 updated_at = ?
             WHERE id = ?",
        )
        .bind(patch.content.as_deref())
        .bind(patch.language.map(Language::as_str))
        .bind(now())
        .bind(id.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| internal(&e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id.clone()));
        }

        // Re-read so subscribers get the full tuple, not just the patch.
        let event = match self.fetch(id).await? {
            Some(record) => SessionEvent::from_record(ChangeKind::Updated, &record),
            None => SessionEvent {
                id: id.clone(),
                kind: ChangeKind::Updated,
                content: patch.content,
                language: patch.language,
            },
        };
        self.feed.publish(event);
        Ok(())
    }

    async fn subscribe(&self, id: &SessionId) -> Result<Subscription, StoreError> {
        Ok(self.feed.subscribe(id))
    }
}
