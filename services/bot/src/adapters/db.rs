//! services/bot/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `DocumentStore`, `UserStateStore` and `UserDirectory` ports from the
//! `core` crate. It handles all interactions with the PostgreSQL database using `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shelfbot_core::domain::{
    Document, NewDocument, NormalizedMetadata, UserConversationState, UserId, UserProfile,
};
use shelfbot_core::ports::{
    DocumentFilter, DocumentStore, PortError, PortResult, UserDirectory, UserStateStore,
};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the durable-store ports.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

const DOCUMENT_COLUMNS: &str = "id, file_ref, file_name, file_size, title, author, subject, \
                                category, exam, year, edition, semester, created_at";

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct DocumentRecord {
    id: Uuid,
    file_ref: String,
    file_name: Option<String>,
    file_size: Option<i64>,
    title: String,
    author: Option<String>,
    subject: String,
    category: Option<String>,
    exam: Option<String>,
    year: Option<i32>,
    edition: Option<String>,
    semester: Option<String>,
    created_at: DateTime<Utc>,
}

impl DocumentRecord {
    fn to_domain(self) -> Document {
        Document {
            id: self.id,
            file_ref: self.file_ref,
            file_name: self.file_name,
            file_size: self.file_size,
            title: self.title,
            author: self.author,
            subject: self.subject,
            category: self.category,
            exam: self.exam,
            year: self.year,
            edition: self.edition,
            semester: self.semester,
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct UserStateRecord {
    user_id: i64,
    state: String,
    pending_document_id: Option<Uuid>,
}

impl UserStateRecord {
    /// Coerces the raw row into a valid domain state. A row claiming
    /// `AWAITING_METADATA` without a pending document id is treated as idle
    /// rather than trusted downstream.
    fn to_domain(self) -> UserConversationState {
        match (self.state.as_str(), self.pending_document_id) {
            ("AWAITING_METADATA", Some(pending)) => {
                UserConversationState::awaiting_metadata(self.user_id, pending)
            }
            _ => UserConversationState::idle(self.user_id),
        }
    }
}

//=========================================================================================
// `DocumentStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl DocumentStore for DbAdapter {
    async fn insert(&self, doc: NewDocument) -> PortResult<Document> {
        let sql = format!(
            "INSERT INTO documents (id, file_ref, file_name, file_size, title, subject, category) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {DOCUMENT_COLUMNS}"
        );
        let record = sqlx::query_as::<_, DocumentRecord>(&sql)
            .bind(Uuid::new_v4())
            .bind(&doc.file_ref)
            .bind(&doc.file_name)
            .bind(doc.file_size)
            .bind(&doc.title)
            .bind(&doc.subject)
            .bind(&doc.category)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        Ok(record.to_domain())
    }

    async fn update_metadata(&self, id: Uuid, metadata: &NormalizedMetadata) -> PortResult<()> {
        // Absent fields coalesce to their stored values, so a retry of the
        // same submission is idempotent and a partial edit doesn't clobber.
        let result = sqlx::query(
            "UPDATE documents SET \
                 title = COALESCE($2, title), \
                 author = COALESCE($3, author), \
                 subject = COALESCE($4, subject), \
                 exam = COALESCE($5, exam), \
                 year = COALESCE($6, year), \
                 edition = COALESCE($7, edition), \
                 semester = COALESCE($8, semester), \
                 updated_at = now() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(metadata.title.as_deref())
        .bind(metadata.author.as_deref())
        .bind(metadata.subject.as_deref())
        .bind(metadata.exam.as_deref())
        .bind(metadata.year)
        .bind(metadata.edition.as_deref())
        .bind(metadata.semester.as_deref())
        .execute(&self.pool)
        .await
        .map_err(|e| PortError::Unexpected(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Document {} not found", id)));
        }
        Ok(())
    }

    async fn find_by_file_ref(&self, file_ref: &str) -> PortResult<Document> {
        let sql = format!("SELECT {DOCUMENT_COLUMNS} FROM documents WHERE file_ref = $1");
        let record = sqlx::query_as::<_, DocumentRecord>(&sql)
            .bind(file_ref)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?
            .ok_or_else(|| PortError::NotFound(format!("No document with file ref {}", file_ref)))?;
        Ok(record.to_domain())
    }

    async fn query(&self, filter: DocumentFilter, limit: u32) -> PortResult<Vec<Document>> {
        let limit = i64::from(limit);
        let records = match filter {
            DocumentFilter::SubjectContains(term) => {
                let sql = format!(
                    "SELECT {DOCUMENT_COLUMNS} FROM documents \
                     WHERE subject ILIKE $1 ORDER BY created_at DESC LIMIT $2"
                );
                sqlx::query_as::<_, DocumentRecord>(&sql)
                    .bind(format!("%{}%", term))
                    .bind(limit)
                    .fetch_all(&self.pool)
                    .await
            }
            DocumentFilter::TitleContains(term) => {
                let sql = format!(
                    "SELECT {DOCUMENT_COLUMNS} FROM documents \
                     WHERE title ILIKE $1 ORDER BY created_at DESC LIMIT $2"
                );
                sqlx::query_as::<_, DocumentRecord>(&sql)
                    .bind(format!("%{}%", term))
                    .bind(limit)
                    .fetch_all(&self.pool)
                    .await
            }
            DocumentFilter::YearEquals(year) => {
                let sql = format!(
                    "SELECT {DOCUMENT_COLUMNS} FROM documents \
                     WHERE year = $1 ORDER BY created_at DESC LIMIT $2"
                );
                sqlx::query_as::<_, DocumentRecord>(&sql)
                    .bind(year)
                    .bind(limit)
                    .fetch_all(&self.pool)
                    .await
            }
            DocumentFilter::AnyFieldContains(term) => {
                let sql = format!(
                    "SELECT {DOCUMENT_COLUMNS} FROM documents \
                     WHERE title ILIKE $1 OR subject ILIKE $1 OR author ILIKE $1 \
                        OR exam ILIKE $1 OR file_name ILIKE $1 \
                     ORDER BY created_at DESC LIMIT $2"
                );
                sqlx::query_as::<_, DocumentRecord>(&sql)
                    .bind(format!("%{}%", term))
                    .bind(limit)
                    .fetch_all(&self.pool)
                    .await
            }
            DocumentFilter::Recent => {
                let sql = format!(
                    "SELECT {DOCUMENT_COLUMNS} FROM documents ORDER BY created_at DESC LIMIT $1"
                );
                sqlx::query_as::<_, DocumentRecord>(&sql)
                    .bind(limit)
                    .fetch_all(&self.pool)
                    .await
            }
        }
        .map_err(|e| PortError::Unexpected(e.to_string()))?;

        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }
}

//=========================================================================================
// `UserStateStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl UserStateStore for DbAdapter {
    async fn get(&self, user_id: UserId) -> PortResult<UserConversationState> {
        let record = sqlx::query_as::<_, UserStateRecord>(
            "SELECT user_id, state, pending_document_id FROM user_states WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| PortError::Unexpected(e.to_string()))?;

        // A missing row is the implicit idle state, not an error.
        Ok(record
            .map(UserStateRecord::to_domain)
            .unwrap_or_else(|| UserConversationState::idle(user_id)))
    }

    async fn set_awaiting(&self, user_id: UserId, pending_document_id: Uuid) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO user_states (user_id, state, pending_document_id, updated_at) \
             VALUES ($1, 'AWAITING_METADATA', $2, now()) \
             ON CONFLICT (user_id) DO UPDATE \
             SET state = EXCLUDED.state, \
                 pending_document_id = EXCLUDED.pending_document_id, \
                 updated_at = now()",
        )
        .bind(user_id)
        .bind(pending_document_id)
        .execute(&self.pool)
        .await
        .map_err(|e| PortError::Unexpected(e.to_string()))?;
        Ok(())
    }

    async fn clear(&self, user_id: UserId) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO user_states (user_id, state, pending_document_id, updated_at) \
             VALUES ($1, 'IDLE', NULL, now()) \
             ON CONFLICT (user_id) DO UPDATE \
             SET state = 'IDLE', pending_document_id = NULL, updated_at = now()",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(|e| PortError::Unexpected(e.to_string()))?;
        Ok(())
    }
}

//=========================================================================================
// `UserDirectory` Trait Implementation
//=========================================================================================

#[async_trait]
impl UserDirectory for DbAdapter {
    async fn save_profile(&self, profile: &UserProfile) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO users (id, username, first_name, last_name, is_bot, language_code, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, now()) \
             ON CONFLICT (id) DO UPDATE \
             SET username = EXCLUDED.username, \
                 first_name = EXCLUDED.first_name, \
                 last_name = EXCLUDED.last_name, \
                 is_bot = EXCLUDED.is_bot, \
                 language_code = EXCLUDED.language_code, \
                 updated_at = now()",
        )
        .bind(profile.id)
        .bind(&profile.username)
        .bind(&profile.first_name)
        .bind(&profile.last_name)
        .bind(profile.is_bot)
        .bind(&profile.language_code)
        .execute(&self.pool)
        .await
        .map_err(|e| PortError::Unexpected(e.to_string()))?;
        Ok(())
    }

    async fn set_authenticated(&self, user_id: UserId, authenticated: bool) -> PortResult<()> {
        // The profile row may not exist yet (it is written fire-and-forget),
        // so this is an upsert rather than a bare UPDATE.
        sqlx::query(
            "INSERT INTO users (id, is_authenticated, updated_at) VALUES ($1, $2, now()) \
             ON CONFLICT (id) DO UPDATE \
             SET is_authenticated = EXCLUDED.is_authenticated, updated_at = now()",
        )
        .bind(user_id)
        .bind(authenticated)
        .execute(&self.pool)
        .await
        .map_err(|e| PortError::Unexpected(e.to_string()))?;
        Ok(())
    }

    async fn is_authenticated(&self, user_id: UserId) -> PortResult<bool> {
        let row: Option<(bool,)> =
            sqlx::query_as("SELECT is_authenticated FROM users WHERE id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| PortError::Unexpected(e.to_string()))?;
        Ok(row.map(|(flag,)| flag).unwrap_or(false))
    }
}
