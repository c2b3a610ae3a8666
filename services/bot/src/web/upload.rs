//! services/bot/src/web/upload.rs
//!
//! The document upload flow, invoked only after the authorization gate has
//! cleared a document message. Creates the pending record, moves the user to
//! the awaiting-metadata phase and sends the metadata instructions.

use crate::adapters::pdf;
use crate::error::BotError;
use crate::web::protocol::{DocumentAttachment, Inbound};
use crate::web::state::AppState;
use shelfbot_core::domain::{DocumentAnalysis, NewDocument};
use tracing::{debug, error, warn};

const STATUS_RECEIVED: &str = "File received! Saving...";
const UPLOAD_FAILED: &str = "Error processing file. Please try again.";

/// Handles an authorized document upload end to end.
pub async fn handle_document(app: &AppState, msg: &Inbound) -> Result<(), BotError> {
    let Some(attachment) = &msg.document else {
        return Ok(());
    };

    let status_id = app.transport.send_text(msg.chat_id, STATUS_RECEIVED).await?;

    match intake(app, msg, attachment).await {
        Ok(instructions) => {
            app.transport
                .edit_text(msg.chat_id, status_id, &instructions)
                .await?;
            Ok(())
        }
        Err(error) => {
            // State is left unchanged so the user can simply resend the file.
            error!(%error, user = msg.sender.id, "Upload intake failed");
            app.transport
                .edit_text(msg.chat_id, status_id, UPLOAD_FAILED)
                .await?;
            Ok(())
        }
    }
}

/// The fallible part of the flow: record creation, enrichment, state change.
/// Returns the instruction text for the status-message edit.
async fn intake(
    app: &AppState,
    msg: &Inbound,
    attachment: &DocumentAttachment,
) -> Result<String, BotError> {
    let title = attachment
        .file_name
        .clone()
        .unwrap_or_else(|| "Untitled".to_string());

    let record = app
        .documents
        .insert(NewDocument {
            file_ref: attachment.file_ref.clone(),
            file_name: attachment.file_name.clone(),
            file_size: attachment.file_size,
            title,
            subject: "Pending".to_string(),
            category: "Other".to_string(),
        })
        .await?;

    // Best-effort enrichment; every failure degrades to plain instructions.
    let suggestion = suggest_metadata(app, attachment).await;

    app.user_states
        .set_awaiting(msg.sender.id, record.id)
        .await?;

    let verbose = app.sessions.take_first_instructions(msg.sender.id);
    Ok(instructions_text(verbose, suggestion.as_ref()))
}

/// Downloads a PDF, extracts its leading text and asks the analysis
/// collaborator for metadata suggestions. Any failure is logged and turns
/// into `None`; an upload must never fail because analysis did.
async fn suggest_metadata(
    app: &AppState,
    attachment: &DocumentAttachment,
) -> Option<DocumentAnalysis> {
    let analysis = app.analysis.as_ref()?;
    if !attachment.is_pdf() {
        return None;
    }

    let bytes = match app.transport.fetch_file(&attachment.file_ref).await {
        Ok(bytes) => bytes,
        Err(error) => {
            warn!(%error, "Could not download file for analysis");
            return None;
        }
    };

    let extracted = match pdf::extract_text(&bytes) {
        Ok(extracted) => extracted,
        Err(error) => {
            warn!(%error, "PDF text extraction failed");
            return None;
        }
    };
    debug!(
        pages = extracted.page_count,
        truncated = extracted.truncated,
        "Extracted PDF text for analysis"
    );
    if extracted.text.trim().is_empty() {
        return None;
    }

    let file_name = attachment.file_name.as_deref().unwrap_or("document.pdf");
    match analysis
        .analyze_document_text(&extracted.text, file_name)
        .await
    {
        Ok(analysis) => Some(analysis),
        Err(error) => {
            warn!(%error, "Document analysis failed");
            None
        }
    }
}

/// The metadata instructions: a full template with an example on the first
/// upload of a session, a terse reminder afterwards. A suggestion block from
/// the analysis collaborator is appended when available.
fn instructions_text(verbose: bool, suggestion: Option<&DocumentAnalysis>) -> String {
    let mut text = if verbose {
        "*File saved!* Now please send the info in this format:\n\
         ```\n\
         name: [Document Name]\n\
         author: [Author Name]\n\
         subject: [Subject]\n\
         exam: [Exam Name]\n\
         year: [Year]\n\
         edition: [Edition]\n\
         semester: [Semester]\n\
         ```\n\
         *Example:*\n\
         ```\n\
         name: Concepts of Physics Vol 1\n\
         author: HC Verma\n\
         subject: Physics\n\
         exam: JEE Advanced\n\
         year: 2024\n\
         edition: 5th Edition\n\
         semester: 1st Sem\n\
         ```\n\
         You can skip any field by not including it. Just send the information as plain text.\n\n\
         Type /cancel to cancel this upload."
            .to_string()
    } else {
        "*File saved!* Send the metadata as `key: value` lines (name, author, subject, exam, \
         year, edition, semester), or type /cancel."
            .to_string()
    };

    if let Some(suggestion) = suggestion {
        text.push_str(&format!(
            "\n\nLooks like *{}* ({}). Copy and adjust:\n```\nname: {}\nsubject: {}\n",
            suggestion.title, suggestion.category, suggestion.title, suggestion.subject
        ));
        if let Some(year) = suggestion.year {
            text.push_str(&format!("year: {}\n", year));
        }
        if let Some(edition) = &suggestion.edition {
            text.push_str(&format!("edition: {}\n", edition));
        }
        if let Some(semester) = &suggestion.semester {
            text.push_str(&format!("semester: {}\n", semester));
        }
        text.push_str("```");
    }

    text
}

#[cfg(test)]
mod tests {
    use super::handle_document;
    use crate::web::testing::{document_message, test_app};
    use shelfbot_core::domain::ConversationPhase;

    const USER: i64 = 7;

    #[tokio::test]
    async fn upload_creates_a_pending_record_and_awaits_metadata() {
        let app = test_app();
        app.start_session(USER);

        handle_document(&app.state, &document_message(USER, "f-1", "irodov.pdf"))
            .await
            .unwrap();

        let record = app.documents.by_file_ref("f-1");
        assert_eq!(record.title, "irodov.pdf");
        assert_eq!(record.subject, "Pending");
        assert_eq!(app.phase_of(USER), ConversationPhase::AwaitingMetadata);
        assert_eq!(app.pending_of(USER), Some(record.id));
    }

    #[tokio::test]
    async fn first_upload_of_a_session_gets_the_verbose_instructions() {
        let app = test_app();
        app.start_session(USER);

        handle_document(&app.state, &document_message(USER, "f-1", "a.pdf"))
            .await
            .unwrap();
        let first = app.transport.last_edit();

        handle_document(&app.state, &document_message(USER, "f-2", "b.pdf"))
            .await
            .unwrap();
        let second = app.transport.last_edit();

        assert!(first.contains("Example:"));
        assert!(!second.contains("Example:"));
        assert!(second.contains("/cancel"));
    }

    #[tokio::test]
    async fn failed_insert_reports_and_leaves_state_unchanged() {
        let app = test_app();
        app.start_session(USER);
        app.documents.fail_next_insert();

        handle_document(&app.state, &document_message(USER, "f-1", "a.pdf"))
            .await
            .unwrap();

        assert_eq!(app.phase_of(USER), ConversationPhase::Idle);
        assert!(app.transport.last_edit().contains("Error processing file"));
    }
}
