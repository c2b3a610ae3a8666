//! crates/shelfbot_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database or transport wire format.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Stable chat-platform identifier for a user (and for private chats, the chat).
pub type UserId = i64;

/// Identifier of the conversation a reply should be delivered to.
pub type ChatId = i64;

/// A document in the library, as stored durably.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: Uuid,
    /// Opaque file handle understood by the message transport.
    pub file_ref: String,
    pub file_name: Option<String>,
    pub file_size: Option<i64>,
    pub title: String,
    pub author: Option<String>,
    pub subject: String,
    pub category: Option<String>,
    pub exam: Option<String>,
    pub year: Option<i32>,
    pub edition: Option<String>,
    pub semester: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// The fields required to create a pending document record at upload time.
/// Metadata proper arrives later through the conversation state machine.
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub file_ref: String,
    pub file_name: Option<String>,
    pub file_size: Option<i64>,
    pub title: String,
    pub subject: String,
    pub category: String,
}

/// Output of the metadata parser. A field is present only when a recognized
/// alias matched and yielded a non-empty trimmed value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub exam: Option<String>,
    pub year: Option<i32>,
    pub edition: Option<String>,
    pub semester: Option<String>,
}

impl NormalizedMetadata {
    /// True when no line of the input was understood. Callers must treat this
    /// as a distinct "nothing understood" outcome and prompt the user rather
    /// than persist junk data.
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.author.is_none()
            && self.subject.is_none()
            && self.exam.is_none()
            && self.year.is_none()
            && self.edition.is_none()
            && self.semester.is_none()
    }
}

/// Where a user currently is in the document-intake conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationPhase {
    Idle,
    AwaitingMetadata,
}

/// Durable per-user conversation state. Invariant: `pending_document_id` is
/// set if and only if the phase is `AwaitingMetadata`. The constructors are
/// the only way to build one, which keeps the invariant by shape.
#[derive(Debug, Clone)]
pub struct UserConversationState {
    pub user_id: UserId,
    pub phase: ConversationPhase,
    pub pending_document_id: Option<Uuid>,
}

impl UserConversationState {
    pub fn idle(user_id: UserId) -> Self {
        Self {
            user_id,
            phase: ConversationPhase::Idle,
            pending_document_id: None,
        }
    }

    pub fn awaiting_metadata(user_id: UserId, pending_document_id: Uuid) -> Self {
        Self {
            user_id,
            phase: ConversationPhase::AwaitingMetadata,
            pending_document_id: Some(pending_document_id),
        }
    }
}

/// Chat-platform profile details, recorded fire-and-forget on every update.
#[derive(Debug, Clone)]
pub struct UserProfile {
    pub id: UserId,
    pub username: Option<String>,
    pub first_name: String,
    pub last_name: Option<String>,
    pub is_bot: bool,
    pub language_code: Option<String>,
}

/// What the analysis collaborator inferred from a document's extracted text.
#[derive(Debug, Clone)]
pub struct DocumentAnalysis {
    pub category: String,
    pub subject: String,
    pub title: String,
    pub year: Option<i32>,
    pub edition: Option<String>,
    pub semester: Option<String>,
    pub summary: Option<String>,
}

/// An inline keyboard attached to an outgoing message. The core treats this
/// as an opaque attachment; the transport adapter owns the wire encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keyboard {
    pub rows: Vec<Vec<Button>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Button {
    /// Sends a callback query with `data` back to the bot.
    Callback { label: String, data: String },
    /// Opens an inline query prefilled with `query` in a chat of the user's choice.
    SwitchInline { label: String, query: String },
    /// Opens an inline query prefilled with `query` in the current chat.
    SwitchInlineCurrent { label: String, query: String },
}

/// One entry of an inline-query answer.
#[derive(Debug, Clone)]
pub enum InlineResult {
    /// A document already known to the platform, referenced by its file handle.
    CachedDocument {
        id: String,
        title: String,
        description: String,
        file_ref: String,
        caption: String,
    },
    /// A plain text article, optionally carrying a keyboard.
    Article {
        id: String,
        title: String,
        description: String,
        message_text: String,
        keyboard: Option<Keyboard>,
    },
}
