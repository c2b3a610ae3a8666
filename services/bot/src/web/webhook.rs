//! services/bot/src/web/webhook.rs
//!
//! The transport boundary: receives platform updates over HTTP, normalizes
//! them and drives them through the gate and the router.

use crate::error::BotError;
use crate::web::auth::{self, Gate};
use crate::web::protocol::{DocumentAttachment, Inbound};
use crate::web::state::AppState;
use crate::web::{chat, commands, inline, upload};
use crate::adapters::telegram::{Message, Update};
use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;
use tracing::error;

const GENERIC_FAILURE: &str = "An error occurred. Please try again.";

/// `POST /webhook`. Returns 200 once the update is handled, 500 when
/// handling failed; non-POST methods get 405 from the method router.
pub async fn webhook_handler(
    State(app): State<Arc<AppState>>,
    Json(update): Json<Update>,
) -> StatusCode {
    match dispatch_update(&app, update).await {
        Ok(()) => StatusCode::OK,
        Err(error) => {
            error!(%error, "Failed to handle update");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// Routes one update to the matching handler.
pub async fn dispatch_update(app: &AppState, update: Update) -> Result<(), BotError> {
    if let Some(query) = update.inline_query {
        record_profile(app, query.from.to_profile());
        return inline::handle_inline_query(app, &query).await;
    }

    if let Some(callback) = update.callback_query {
        record_profile(app, callback.from.to_profile());
        return commands::handle_template_callback(app, &callback).await;
    }

    let Some(message) = update.message else {
        return Ok(());
    };
    // Messages without a sender (e.g. channel posts) are not conversations.
    let Some(inbound) = normalize(message) else {
        return Ok(());
    };

    record_profile(app, inbound.sender.clone());

    if auth::authorize(app, &inbound).await? == Gate::Handled {
        return Ok(());
    }

    let outcome = if inbound.document.is_some() && !inbound.via_relay {
        upload::handle_document(app, &inbound).await
    } else if let Some(text) = inbound.text.clone() {
        chat::route_text(app, &inbound, &text).await
    } else {
        Ok(())
    };

    // Conversation failures are reported to the user, not to the platform:
    // a 500 here would only make the platform redeliver the same update.
    if let Err(error) = outcome {
        error!(%error, user = inbound.sender.id, "Message handler failed");
        let _ = app.transport.send_text(inbound.chat_id, GENERIC_FAILURE).await;
    }
    Ok(())
}

/// Profile recording is a side effect off the critical path.
fn record_profile(app: &AppState, profile: shelfbot_core::domain::UserProfile) {
    let users = app.users.clone();
    app.background.submit("save_user_profile", async move {
        users.save_profile(&profile).await
    });
}

/// Converts a wire message into the normalized inbound shape.
fn normalize(message: Message) -> Option<Inbound> {
    let sender = message.from.as_ref()?.to_profile();
    let reply_to_document = message
        .reply_to_message
        .as_ref()
        .and_then(|replied| replied.document.as_ref())
        .map(|document| document.file_id.clone());

    Some(Inbound {
        chat_id: message.chat.id,
        message_id: message.message_id,
        sender,
        text: message.text,
        document: message.document.map(|document| DocumentAttachment {
            file_ref: document.file_id,
            file_name: document.file_name,
            mime_type: document.mime_type,
            file_size: document.file_size,
        }),
        via_relay: message.via_bot.is_some(),
        reply_to_document,
    })
}

#[cfg(test)]
mod tests {
    use super::dispatch_update;
    use crate::adapters::telegram::{Message, TgChat, TgDocument, Update};
    use crate::web::testing::{test_app, tg_user};

    fn update_with_text(user: i64, text: &str) -> Update {
        Update {
            update_id: 1,
            message: Some(Message {
                message_id: 10,
                from: Some(tg_user(user)),
                chat: TgChat { id: user },
                text: Some(text.to_string()),
                document: None,
                via_bot: None,
                reply_to_message: None,
            }),
            inline_query: None,
            callback_query: None,
        }
    }

    #[tokio::test]
    async fn a_document_update_from_a_stranger_is_challenged_not_routed() {
        let app = test_app();
        let update = Update {
            update_id: 1,
            message: Some(Message {
                message_id: 10,
                from: Some(tg_user(5)),
                chat: TgChat { id: 5 },
                text: None,
                document: Some(TgDocument {
                    file_id: "f-1".to_string(),
                    file_name: Some("a.pdf".to_string()),
                    mime_type: Some("application/pdf".to_string()),
                    file_size: Some(1024),
                }),
                via_bot: None,
                reply_to_message: None,
            }),
            inline_query: None,
            callback_query: None,
        };

        dispatch_update(&app.state, update).await.unwrap();

        assert!(app.transport.last_text().contains("must login"));
        assert!(app.documents.all().is_empty());
    }

    #[tokio::test]
    async fn a_senderless_update_is_dropped() {
        let app = test_app();
        let update = Update {
            update_id: 1,
            message: Some(Message {
                message_id: 10,
                from: None,
                chat: TgChat { id: 5 },
                text: Some("hello".to_string()),
                document: None,
                via_bot: None,
                reply_to_message: None,
            }),
            inline_query: None,
            callback_query: None,
        };

        dispatch_update(&app.state, update).await.unwrap();

        assert_eq!(app.transport.sent_count(), 0);
    }

    #[tokio::test]
    async fn command_during_pending_login_aborts_and_executes() {
        let app = test_app();
        dispatch_update(&app.state, update_with_text(5, "/login")).await.unwrap();
        app.transport.clear();

        dispatch_update(&app.state, update_with_text(5, "/start")).await.unwrap();

        assert!(!app.state.sessions.is_pending_login(5));
        assert!(app.transport.last_text().contains("Welcome!"));
    }
}
