//! services/bot/src/web/commands.rs
//!
//! Top-level commands reachable once the gate and the state machine have
//! passed on a message: `/start`, `/formats` (with its template callbacks),
//! `/search` and the bare `/cancel`.

use crate::adapters::telegram::CallbackQuery;
use crate::error::BotError;
use crate::web::protocol::Inbound;
use crate::web::state::AppState;
use crate::web::search;
use shelfbot_core::domain::{Button, Keyboard};

const WELCOME: &str = "Welcome! Send me a document and I'll help you organize it.\n\n\
                       Commands:\n\
                       /login - Authenticate for uploads\n\
                       /search - Search for files\n\
                       /formats - Get metadata templates\n\
                       /cancel - Cancel current operation";
const SEARCH_USAGE: &str = "Please provide a search term. Example: `/search Quantum Mechanics`";
const OPERATION_CANCELLED: &str = "Operation cancelled.";
const CHOOSE_TEMPLATE: &str = "Choose a template:";

/// Dispatches one slash command. Unknown commands are silently ignored —
/// they may belong to another bot in a group chat.
pub async fn dispatch(app: &AppState, msg: &Inbound, text: &str) -> Result<(), BotError> {
    if text == "/start" {
        app.transport.send_text(msg.chat_id, WELCOME).await?;
        return Ok(());
    }

    if text == "/formats" {
        let keyboard = Keyboard {
            rows: vec![
                vec![
                    template_button("Book", "tpl_book"),
                    template_button("Notes", "tpl_notes"),
                ],
                vec![
                    template_button("PYQ / Exam", "tpl_pyq"),
                    template_button("Novel", "tpl_novel"),
                ],
            ],
        };
        app.transport
            .send_text_with_keyboard(msg.chat_id, CHOOSE_TEMPLATE, &keyboard)
            .await?;
        return Ok(());
    }

    if text == "/cancel" {
        // Outside the metadata flow this is an idempotent reset.
        app.user_states.clear(msg.sender.id).await?;
        app.transport
            .send_text(msg.chat_id, OPERATION_CANCELLED)
            .await?;
        return Ok(());
    }

    if let Some(term) = text.strip_prefix("/search") {
        let term = term.trim();
        if term.is_empty() {
            app.transport.send_text(msg.chat_id, SEARCH_USAGE).await?;
            return Ok(());
        }
        return search::run_search(app, msg.chat_id, term).await;
    }

    Ok(())
}

fn template_button(label: &str, data: &str) -> Button {
    Button::Callback {
        label: label.to_string(),
        data: data.to_string(),
    }
}

/// Answers a `tpl_*` callback with a copyable metadata template.
pub async fn handle_template_callback(
    app: &AppState,
    callback: &CallbackQuery,
) -> Result<(), BotError> {
    let Some(data) = callback.data.as_deref() else {
        return Ok(());
    };
    let Some(kind) = data.strip_prefix("tpl_") else {
        return Ok(());
    };

    let (title, template) = match kind {
        "book" => ("Book", "name: \nauthor: \nsubject: \nyear: \nedition: "),
        "notes" => ("Notes", "name: \nsubject: \nsemester: \nauthor: "),
        "pyq" => ("PYQ / Exam", "name: \nsubject: \nexam: \nyear: "),
        "novel" => ("Novel", "name: \nauthor: \ngenre: \nyear: "),
        _ => return Ok(()),
    };

    app.transport.answer_callback(&callback.id).await?;

    let Some(message) = &callback.message else {
        return Ok(());
    };
    app.transport
        .send_text(
            message.chat.id,
            &format!("*{}*\n(Simply copy & fill)\n\n`{}`", title, template),
        )
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::dispatch;
    use crate::web::testing::{test_app, text_message};
    use shelfbot_core::domain::ConversationPhase;

    const USER: i64 = 7;

    #[tokio::test]
    async fn start_replies_with_the_welcome_text() {
        let app = test_app();

        dispatch(&app.state, &text_message(USER, "/start"), "/start").await.unwrap();

        assert!(app.transport.last_text().contains("Welcome!"));
    }

    #[tokio::test]
    async fn formats_sends_the_template_keyboard() {
        let app = test_app();

        dispatch(&app.state, &text_message(USER, "/formats"), "/formats").await.unwrap();

        assert!(app.transport.last_keyboard_text().contains("Choose a template"));
    }

    #[tokio::test]
    async fn bare_search_shows_usage() {
        let app = test_app();

        dispatch(&app.state, &text_message(USER, "/search"), "/search").await.unwrap();

        assert!(app.transport.last_text().contains("provide a search term"));
        assert_eq!(app.documents.queries_issued(), 0);
    }

    #[tokio::test]
    async fn search_with_a_term_runs_the_resolver() {
        let app = test_app();
        app.seed_full_document("f-1", "Concepts of Physics", "Physics");

        dispatch(
            &app.state,
            &text_message(USER, "/search physics"),
            "/search physics",
        )
        .await
        .unwrap();

        assert!(app.transport.sent_document_refs().contains(&"f-1".to_string()));
    }

    #[tokio::test]
    async fn cancel_outside_the_flow_is_an_idempotent_reset() {
        let app = test_app();

        dispatch(&app.state, &text_message(USER, "/cancel"), "/cancel").await.unwrap();

        assert_eq!(app.phase_of(USER), ConversationPhase::Idle);
        assert!(app.transport.last_text().contains("cancelled"));
    }
}
