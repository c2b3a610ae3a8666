//! crates/shelfbot_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of specific external implementations like databases or the
//! chat platform's HTTP API.

use async_trait::async_trait;
use std::time::Instant;
use uuid::Uuid;

use crate::domain::{
    ChatId, Document, DocumentAnalysis, InlineResult, Keyboard, NewDocument, NormalizedMetadata,
    UserConversationState, UserId, UserProfile,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

/// A single predicate of the tiered document lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentFilter {
    /// Case-insensitive substring match on the subject field.
    SubjectContains(String),
    /// Case-insensitive substring match on the title field.
    TitleContains(String),
    /// Exact match on the numeric year field.
    YearEquals(i32),
    /// Case-insensitive substring match across title, subject, author, exam
    /// and file name. Used by the inline query path only.
    AnyFieldContains(String),
    /// Most recently created documents first, no predicate.
    Recent,
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Creates a pending document record and returns it with its assigned id.
    async fn insert(&self, doc: NewDocument) -> PortResult<Document>;

    /// Applies parsed metadata to an existing record. Absent fields keep
    /// their stored values, so a retry of the same submission is idempotent.
    async fn update_metadata(&self, id: Uuid, metadata: &NormalizedMetadata) -> PortResult<()>;

    /// Looks a document up by its transport file handle.
    /// Returns `PortError::NotFound` when no record matches.
    async fn find_by_file_ref(&self, file_ref: &str) -> PortResult<Document>;

    /// Runs one filtered lookup, returning at most `limit` documents.
    async fn query(&self, filter: DocumentFilter, limit: u32) -> PortResult<Vec<Document>>;
}

#[async_trait]
pub trait UserStateStore: Send + Sync {
    /// Fetches the durable conversation state. A missing row is the implicit
    /// `Idle` state, not an error.
    async fn get(&self, user_id: UserId) -> PortResult<UserConversationState>;

    /// Moves the user to `AwaitingMetadata` with the given pending document.
    async fn set_awaiting(&self, user_id: UserId, pending_document_id: Uuid) -> PortResult<()>;

    /// Resets the user to `Idle`. Safe to call when already idle.
    async fn clear(&self, user_id: UserId) -> PortResult<()>;
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Upserts the user's chat-platform profile details.
    async fn save_profile(&self, profile: &UserProfile) -> PortResult<()>;

    /// Sets or clears the durable authenticated flag.
    async fn set_authenticated(&self, user_id: UserId, authenticated: bool) -> PortResult<()>;

    /// Reads the durable authenticated flag. An unknown user is `false`.
    async fn is_authenticated(&self, user_id: UserId) -> PortResult<bool>;
}

#[async_trait]
pub trait TextAnalysisService: Send + Sync {
    /// Infers library metadata from text extracted from a document.
    /// Implementations may retry on rate limiting before giving up and
    /// returning a degraded fallback value.
    async fn analyze_document_text(
        &self,
        text: &str,
        file_name: &str,
    ) -> PortResult<DocumentAnalysis>;
}

#[async_trait]
pub trait MessageTransport: Send + Sync {
    /// Delivers a text reply and returns the transport's message id, which
    /// can later be passed to `edit_text`.
    async fn send_text(&self, chat: ChatId, text: &str) -> PortResult<i64>;

    /// Same as `send_text`, with an inline keyboard attached.
    async fn send_text_with_keyboard(
        &self,
        chat: ChatId,
        text: &str,
        keyboard: &Keyboard,
    ) -> PortResult<i64>;

    /// Replaces the text of a previously sent message.
    async fn edit_text(&self, chat: ChatId, message_id: i64, text: &str) -> PortResult<()>;

    /// Delivers a stored document by its file handle, with a caption.
    async fn send_document(&self, chat: ChatId, file_ref: &str, caption: &str) -> PortResult<()>;

    /// Shows a transient "typing" indicator in the chat.
    async fn notify_typing(&self, chat: ChatId) -> PortResult<()>;

    /// Acknowledges a callback query so the client stops its spinner.
    async fn answer_callback(&self, callback_id: &str) -> PortResult<()>;

    /// Delivers an inline-query result list.
    async fn answer_inline(
        &self,
        query_id: &str,
        results: Vec<InlineResult>,
        cache_secs: u32,
        personal: bool,
    ) -> PortResult<()>;

    /// Downloads a stored file's bytes for local processing.
    async fn fetch_file(&self, file_ref: &str) -> PortResult<Vec<u8>>;
}

//=========================================================================================
// Clock
//=========================================================================================

/// Monotonic time source used for session expiry. Tests substitute a manual
/// implementation to drive sessions past the inactivity window.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// The production clock.
#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}
