//! services/bot/src/web/protocol.rs
//!
//! Defines the normalized inbound message the conversation layer operates on,
//! decoupled from the transport's wire shape. The webhook dispatcher builds
//! one `Inbound` per platform update that carries a sender.

use shelfbot_core::domain::{ChatId, UserProfile};

/// A document attached to an inbound message.
#[derive(Debug, Clone)]
pub struct DocumentAttachment {
    pub file_ref: String,
    pub file_name: Option<String>,
    pub mime_type: Option<String>,
    pub file_size: Option<i64>,
}

impl DocumentAttachment {
    /// Whether the attachment looks like a PDF, which gates the best-effort
    /// text-extraction enrichment.
    pub fn is_pdf(&self) -> bool {
        self.mime_type.as_deref() == Some("application/pdf")
            || self
                .file_name
                .as_deref()
                .is_some_and(|name| name.to_lowercase().ends_with(".pdf"))
    }
}

/// One normalized inbound chat message.
#[derive(Debug, Clone)]
pub struct Inbound {
    pub chat_id: ChatId,
    pub message_id: i64,
    pub sender: UserProfile,
    pub text: Option<String>,
    pub document: Option<DocumentAttachment>,
    /// True when the message reached the chat through an inline-mode relay;
    /// such documents must not re-trigger the upload flow.
    pub via_relay: bool,
    /// File handle of the document this message replies to, when any.
    pub reply_to_document: Option<String>,
}
