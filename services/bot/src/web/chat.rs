//! services/bot/src/web/chat.rs
//!
//! The conversation router. Invoked for text messages once the authorization
//! gate has cleared them; decides between metadata entry, an edit
//! continuation, a command, and a free-text search. First match wins.

use crate::error::BotError;
use crate::web::auth::CANCEL_COMMAND;
use crate::web::protocol::Inbound;
use crate::web::state::AppState;
use crate::web::{commands, search};
use shelfbot_core::domain::{ConversationPhase, Document, NormalizedMetadata};
use shelfbot_core::metadata::parse_metadata;
use shelfbot_core::ports::PortError;
use tracing::{error, warn};
use uuid::Uuid;

const OPERATION_CANCELLED: &str = "Operation cancelled.";
const METADATA_FORMAT_ERROR: &str = "Could not parse metadata. Please use the format:\n\n\
                                     name: Your Title\nsubject: Subject\n...\n\n\
                                     Or type /cancel to cancel.";
const METADATA_SAVE_FAILED: &str = "Failed to save metadata. Please try again.";
const EDIT_TARGET_MISSING: &str = "Could not find this file in the database.";

/// Routes one gated text message.
pub async fn route_text(app: &AppState, msg: &Inbound, text: &str) -> Result<(), BotError> {
    let user_id = msg.sender.id;

    // 1. + 2. The durable state machine takes precedence over everything.
    let state = app.user_states.get(user_id).await?;
    if state.phase == ConversationPhase::AwaitingMetadata {
        if text == CANCEL_COMMAND {
            app.user_states.clear(user_id).await?;
            app.transport.send_text(msg.chat_id, OPERATION_CANCELLED).await?;
            return Ok(());
        }
        // The constructors guarantee a pending id in this phase; a coerced
        // row without one reads back as idle and never reaches here.
        if let Some(pending) = state.pending_document_id {
            return handle_metadata_input(app, msg, text, pending).await;
        }
    }

    // 3. A reply to a document is an edit request.
    if let Some(file_ref) = &msg.reply_to_document {
        return handle_reply_edit(app, msg, file_ref).await;
    }

    // 4. Commands.
    if text.starts_with('/') {
        return commands::dispatch(app, msg, text).await;
    }

    // 5. Anything else is a search query.
    search::run_search(app, msg.chat_id, text).await
}

/// Applies a metadata submission to the pending document.
async fn handle_metadata_input(
    app: &AppState,
    msg: &Inbound,
    text: &str,
    pending: Uuid,
) -> Result<(), BotError> {
    // The indicator is cosmetic; ignore its failures.
    let _ = app.transport.notify_typing(msg.chat_id).await;

    let metadata = parse_metadata(text);
    if metadata.is_empty() {
        // Nothing understood: prompt and leave the state so the user can retry.
        app.transport.send_text(msg.chat_id, METADATA_FORMAT_ERROR).await?;
        return Ok(());
    }

    if let Err(error) = app.documents.update_metadata(pending, &metadata).await {
        error!(%error, document = %pending, "Metadata update failed");
        app.transport.send_text(msg.chat_id, METADATA_SAVE_FAILED).await?;
        return Ok(());
    }

    // The update landed; a failed reset only means the next message repeats
    // the (idempotent) submission, so it is not surfaced to the user.
    if let Err(error) = app.user_states.clear(msg.sender.id).await {
        warn!(%error, user = msg.sender.id, "Failed to reset conversation state");
    }

    app.transport
        .send_text(msg.chat_id, &confirmation_text(&metadata))
        .await?;
    Ok(())
}

/// Starts the edit continuation for the replied-to document.
async fn handle_reply_edit(app: &AppState, msg: &Inbound, file_ref: &str) -> Result<(), BotError> {
    let document = match app.documents.find_by_file_ref(file_ref).await {
        Ok(document) => document,
        Err(PortError::NotFound(_)) => {
            app.transport.send_text(msg.chat_id, EDIT_TARGET_MISSING).await?;
            return Ok(());
        }
        Err(error) => return Err(error.into()),
    };

    app.user_states.set_awaiting(msg.sender.id, document.id).await?;
    app.transport
        .send_text(msg.chat_id, &edit_prompt_text(&document))
        .await?;
    Ok(())
}

/// Confirmation summarizing only the fields that were present.
fn confirmation_text(metadata: &NormalizedMetadata) -> String {
    let mut text = String::from("*File information saved!*\n");
    if let Some(title) = &metadata.title {
        text.push_str(&format!("\nName: {}", title));
    }
    if let Some(author) = &metadata.author {
        text.push_str(&format!("\nAuthor: {}", author));
    }
    if let Some(subject) = &metadata.subject {
        text.push_str(&format!("\nSubject: {}", subject));
    }
    if let Some(exam) = &metadata.exam {
        text.push_str(&format!("\nExam: {}", exam));
    }
    if let Some(year) = metadata.year {
        text.push_str(&format!("\nYear: {}", year));
    }
    if let Some(edition) = &metadata.edition {
        text.push_str(&format!("\nEdition: {}", edition));
    }
    if let Some(semester) = &metadata.semester {
        text.push_str(&format!("\nSemester: {}", semester));
    }
    text
}

/// Edit prompt pre-filled from the document's current values.
fn edit_prompt_text(document: &Document) -> String {
    format!(
        "*Editing: {}*\n\nSend the new metadata to update it:\n```\nname: {}\nauthor: {}\nsubject: {}\n...\n```\n(Only send the fields you want to change. Type /cancel to stop)",
        document.title,
        document.title,
        document.author.as_deref().unwrap_or(""),
        document.subject,
    )
}

#[cfg(test)]
mod tests {
    use super::route_text;
    use crate::web::testing::{test_app, text_message};
    use shelfbot_core::domain::ConversationPhase;

    const USER: i64 = 7;

    #[tokio::test]
    async fn cancel_while_awaiting_metadata_returns_to_idle() {
        let app = test_app();
        let doc = app.seed_document("f-1", "Pending upload");
        app.set_awaiting(USER, doc.id);

        route_text(&app.state, &text_message(USER, "/cancel"), "/cancel").await.unwrap();

        assert_eq!(app.phase_of(USER), ConversationPhase::Idle);
        assert!(app.transport.last_text().contains("cancelled"));
    }

    #[tokio::test]
    async fn second_cancel_is_a_no_op_with_the_same_reply() {
        let app = test_app();
        let doc = app.seed_document("f-1", "Pending upload");
        app.set_awaiting(USER, doc.id);

        route_text(&app.state, &text_message(USER, "/cancel"), "/cancel").await.unwrap();
        let first = app.transport.last_text();
        route_text(&app.state, &text_message(USER, "/cancel"), "/cancel").await.unwrap();

        assert_eq!(app.phase_of(USER), ConversationPhase::Idle);
        assert_eq!(app.transport.last_text(), first);
    }

    #[tokio::test]
    async fn unparseable_metadata_prompts_and_keeps_the_state() {
        let app = test_app();
        let doc = app.seed_document("f-1", "Pending upload");
        app.set_awaiting(USER, doc.id);

        route_text(
            &app.state,
            &text_message(USER, "no colons here"),
            "no colons here",
        )
        .await
        .unwrap();

        assert_eq!(app.phase_of(USER), ConversationPhase::AwaitingMetadata);
        assert!(app.transport.last_text().contains("Could not parse metadata"));
    }

    #[tokio::test]
    async fn valid_metadata_persists_clears_state_and_confirms_present_fields() {
        let app = test_app();
        let doc = app.seed_document("f-1", "Pending upload");
        app.set_awaiting(USER, doc.id);

        route_text(
            &app.state,
            &text_message(USER, "name: HC Verma Vol 1\nyear: 2024"),
            "name: HC Verma Vol 1\nyear: 2024",
        )
        .await
        .unwrap();

        assert_eq!(app.phase_of(USER), ConversationPhase::Idle);
        let updated = app.documents.by_id(doc.id);
        assert_eq!(updated.title, "HC Verma Vol 1");
        assert_eq!(updated.year, Some(2024));

        let confirmation = app.transport.last_text();
        assert!(confirmation.contains("Name: HC Verma Vol 1"));
        assert!(confirmation.contains("Year: 2024"));
        assert!(!confirmation.contains("Author:"));
    }

    #[tokio::test]
    async fn failed_save_keeps_the_state_for_a_retry() {
        let app = test_app();
        let doc = app.seed_document("f-1", "Pending upload");
        app.set_awaiting(USER, doc.id);
        app.documents.fail_next_update();

        route_text(
            &app.state,
            &text_message(USER, "name: Retry Me"),
            "name: Retry Me",
        )
        .await
        .unwrap();

        assert_eq!(app.phase_of(USER), ConversationPhase::AwaitingMetadata);
        assert!(app.transport.last_text().contains("Failed to save metadata"));
    }

    #[tokio::test]
    async fn reply_to_an_unknown_document_reports_not_found() {
        let app = test_app();
        let mut msg = text_message(USER, "fix the title please");
        msg.reply_to_document = Some("unknown-ref".to_string());

        route_text(&app.state, &msg, "fix the title please").await.unwrap();

        assert_eq!(app.phase_of(USER), ConversationPhase::Idle);
        assert!(app.transport.last_text().contains("Could not find this file"));
    }

    #[tokio::test]
    async fn reply_to_a_known_document_enters_the_edit_flow() {
        let app = test_app();
        let doc = app.seed_document("f-9", "Calculus Primer");
        let mut msg = text_message(USER, "anything");
        msg.reply_to_document = Some("f-9".to_string());

        route_text(&app.state, &msg, "anything").await.unwrap();

        assert_eq!(app.phase_of(USER), ConversationPhase::AwaitingMetadata);
        assert_eq!(app.pending_of(USER), Some(doc.id));
        assert!(app.transport.last_text().contains("Editing: Calculus Primer"));
    }

    #[tokio::test]
    async fn free_text_outside_the_state_machine_searches() {
        let app = test_app();
        app.seed_full_document("f-1", "Concepts of Physics", "Physics");

        route_text(&app.state, &text_message(USER, "physics"), "physics").await.unwrap();

        assert!(app.documents.queries_issued() > 0);
        assert!(app.transport.sent_document_refs().contains(&"f-1".to_string()));
    }

    #[tokio::test]
    async fn unknown_commands_are_ignored() {
        let app = test_app();

        route_text(&app.state, &text_message(USER, "/frobnicate"), "/frobnicate").await.unwrap();

        assert_eq!(app.transport.sent_count(), 0);
        assert_eq!(app.documents.queries_issued(), 0);
    }
}
