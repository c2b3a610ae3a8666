//! services/bot/src/web/auth.rs
//!
//! The authorization gate. Every inbound chat message passes through
//! [`authorize`] before any other routing; the gate decides whether the
//! message belongs to the login flow, must be challenged, or may proceed.

use crate::error::BotError;
use crate::web::protocol::Inbound;
use crate::web::state::AppState;

pub const LOGIN_COMMAND: &str = "/login";
pub const CANCEL_COMMAND: &str = "/cancel";

const PROMPT_PASSWORD: &str = "Please enter the bot access password:";
const ALREADY_LOGGED_IN: &str = "You are already logged in!";
const LOGIN_CANCELLED: &str = "Login cancelled.";
const LOGIN_SUCCESS: &str =
    "Login successful! You can now upload documents (session valid for 10 min).";
const WRONG_PASSWORD: &str = "Incorrect password. Please try again or type /cancel.";
const SESSION_EXPIRED: &str = "Session expired due to inactivity. Please /login again.";
const MUST_LOGIN: &str = "You must login to upload documents. Use /login to authenticate.";

/// The gate's verdict on one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    /// The message was consumed by the gate; no further routing.
    Handled,
    /// The message is cleared for normal routing.
    Proceed,
}

/// Runs the per-user authorization state machine. The transitions are
/// evaluated in strict order: login handling preempts all other routing, and
/// password checking preempts generic command dispatch but yields to an
/// explicit command so users are never trapped mid-login.
pub async fn authorize(app: &AppState, msg: &Inbound) -> Result<Gate, BotError> {
    let user_id = msg.sender.id;
    let text = msg.text.as_deref();

    // 1. The login command itself.
    if text == Some(LOGIN_COMMAND) {
        if app.users.is_authenticated(user_id).await? {
            if app.sessions.is_live(user_id) {
                app.transport.send_text(msg.chat_id, ALREADY_LOGGED_IN).await?;
                return Ok(Gate::Handled);
            }
            // The durable flag outlived the session; force a fresh login.
            app.users.set_authenticated(user_id, false).await?;
        }
        app.sessions.begin_login(user_id);
        app.transport.send_text(msg.chat_id, PROMPT_PASSWORD).await?;
        return Ok(Gate::Handled);
    }

    // 2. Mid-login: the next message is treated as a password attempt.
    if app.sessions.is_pending_login(user_id) {
        let Some(text) = text else {
            // Ignore non-text updates while waiting for a password.
            return Ok(Gate::Handled);
        };

        if text == CANCEL_COMMAND {
            app.sessions.cancel_login(user_id);
            app.transport.send_text(msg.chat_id, LOGIN_CANCELLED).await?;
            return Ok(Gate::Handled);
        }

        // Any other command aborts the login and is processed normally.
        if text.starts_with('/') {
            app.sessions.cancel_login(user_id);
            return Ok(Gate::Proceed);
        }

        if app.config.access_passwords.iter().any(|p| p == text) {
            app.sessions.cancel_login(user_id);
            app.users.set_authenticated(user_id, true).await?;
            app.sessions.start_session(user_id);
            app.transport.send_text(msg.chat_id, LOGIN_SUCCESS).await?;
        } else {
            app.transport.send_text(msg.chat_id, WRONG_PASSWORD).await?;
        }
        return Ok(Gate::Handled);
    }

    // 3. Document uploads are privileged. Documents relayed through inline
    //    sharing are not uploads and skip this check.
    if msg.document.is_some() && !msg.via_relay {
        if app.users.is_authenticated(user_id).await? {
            if !app.sessions.is_live(user_id) {
                // Session expired or lost to a restart.
                app.users.set_authenticated(user_id, false).await?;
                app.sessions.remove(user_id);
                app.transport.send_text(msg.chat_id, SESSION_EXPIRED).await?;
                return Ok(Gate::Handled);
            }
            app.sessions.touch(user_id);
        } else {
            app.transport.send_text(msg.chat_id, MUST_LOGIN).await?;
            return Ok(Gate::Handled);
        }
    }

    // 4. Unrestricted actions: search, chat, help.
    Ok(Gate::Proceed)
}

#[cfg(test)]
mod tests {
    use super::{authorize, Gate};
    use crate::web::testing::{document_message, test_app, text_message, TestApp};
    use std::time::Duration;

    const USER: i64 = 99;

    async fn login(app: &TestApp) {
        authorize(&app.state, &text_message(USER, "/login")).await.unwrap();
        authorize(&app.state, &text_message(USER, "opensesame")).await.unwrap();
        app.transport.clear();
    }

    #[tokio::test]
    async fn login_prompts_for_password_and_consumes_the_message() {
        let app = test_app();
        let verdict = authorize(&app.state, &text_message(USER, "/login")).await.unwrap();

        assert_eq!(verdict, Gate::Handled);
        assert!(app.state.sessions.is_pending_login(USER));
        assert!(app.transport.last_text().contains("access password"));
    }

    #[tokio::test]
    async fn correct_password_creates_a_session_and_sets_the_durable_flag() {
        let app = test_app();
        authorize(&app.state, &text_message(USER, "/login")).await.unwrap();

        let verdict = authorize(&app.state, &text_message(USER, "opensesame")).await.unwrap();

        assert_eq!(verdict, Gate::Handled);
        assert!(!app.state.sessions.is_pending_login(USER));
        assert!(app.state.sessions.is_live(USER));
        assert!(app.directory.authenticated(USER));
        assert!(app.transport.last_text().contains("Login successful"));
    }

    #[tokio::test]
    async fn wrong_password_keeps_the_user_pending() {
        let app = test_app();
        authorize(&app.state, &text_message(USER, "/login")).await.unwrap();

        let verdict = authorize(&app.state, &text_message(USER, "letmein")).await.unwrap();

        assert_eq!(verdict, Gate::Handled);
        assert!(app.state.sessions.is_pending_login(USER));
        assert!(!app.directory.authenticated(USER));
        assert!(app.transport.last_text().contains("Incorrect password"));
    }

    #[tokio::test]
    async fn cancel_during_login_clears_the_pending_entry() {
        let app = test_app();
        authorize(&app.state, &text_message(USER, "/login")).await.unwrap();

        let verdict = authorize(&app.state, &text_message(USER, "/cancel")).await.unwrap();

        assert_eq!(verdict, Gate::Handled);
        assert!(!app.state.sessions.is_pending_login(USER));
        assert!(app.transport.last_text().contains("Login cancelled"));
    }

    #[tokio::test]
    async fn any_other_command_aborts_the_login_and_proceeds() {
        let app = test_app();
        authorize(&app.state, &text_message(USER, "/login")).await.unwrap();
        app.transport.clear();

        let verdict = authorize(&app.state, &text_message(USER, "/search physics")).await.unwrap();

        assert_eq!(verdict, Gate::Proceed);
        assert!(!app.state.sessions.is_pending_login(USER));
        // The gate itself stays silent; the command handler replies.
        assert!(app.transport.sent_count() == 0);
    }

    #[tokio::test]
    async fn non_text_updates_are_ignored_while_pending_login() {
        let app = test_app();
        authorize(&app.state, &text_message(USER, "/login")).await.unwrap();
        app.transport.clear();

        let verdict = authorize(&app.state, &document_message(USER, "f-1", "a.pdf")).await.unwrap();

        assert_eq!(verdict, Gate::Handled);
        assert_eq!(app.transport.sent_count(), 0);
        assert!(app.state.sessions.is_pending_login(USER));
    }

    #[tokio::test]
    async fn document_from_a_user_who_never_logged_in_is_challenged() {
        let app = test_app();

        let verdict = authorize(&app.state, &document_message(USER, "f-1", "a.pdf")).await.unwrap();

        assert_eq!(verdict, Gate::Handled);
        assert!(app.transport.last_text().contains("must login"));
        // Durable stores untouched.
        assert!(!app.directory.authenticated(USER));
        assert_eq!(app.directory.flag_writes(), 0);
    }

    #[tokio::test]
    async fn document_after_the_inactivity_window_expires_the_session() {
        let app = test_app();
        login(&app).await;

        app.clock.advance(Duration::from_secs(601));
        let verdict = authorize(&app.state, &document_message(USER, "f-1", "a.pdf")).await.unwrap();

        assert_eq!(verdict, Gate::Handled);
        assert!(app.transport.last_text().contains("Session expired"));
        assert!(!app.directory.authenticated(USER));
        assert!(!app.state.sessions.is_live(USER));
    }

    #[tokio::test]
    async fn document_within_the_window_proceeds_and_refreshes_activity() {
        let app = test_app();
        login(&app).await;

        app.clock.advance(Duration::from_secs(500));
        let verdict = authorize(&app.state, &document_message(USER, "f-1", "a.pdf")).await.unwrap();
        assert_eq!(verdict, Gate::Proceed);

        // The refresh keeps the session alive past the original deadline.
        app.clock.advance(Duration::from_secs(500));
        assert!(app.state.sessions.is_live(USER));
    }

    #[tokio::test]
    async fn relayed_documents_skip_the_upload_check() {
        let app = test_app();
        let mut msg = document_message(USER, "f-1", "a.pdf");
        msg.via_relay = true;

        let verdict = authorize(&app.state, &msg).await.unwrap();

        assert_eq!(verdict, Gate::Proceed);
        assert_eq!(app.transport.sent_count(), 0);
    }

    #[tokio::test]
    async fn login_while_already_live_short_circuits() {
        let app = test_app();
        login(&app).await;

        let verdict = authorize(&app.state, &text_message(USER, "/login")).await.unwrap();

        assert_eq!(verdict, Gate::Handled);
        assert!(app.transport.last_text().contains("already logged in"));
        assert!(!app.state.sessions.is_pending_login(USER));
    }

    #[tokio::test]
    async fn stale_durable_flag_forces_a_fresh_login() {
        let app = test_app();
        login(&app).await;

        // Session dies, durable flag survives (e.g. process kept running).
        app.clock.advance(Duration::from_secs(601));
        let verdict = authorize(&app.state, &text_message(USER, "/login")).await.unwrap();

        assert_eq!(verdict, Gate::Handled);
        assert!(!app.directory.authenticated(USER));
        assert!(app.state.sessions.is_pending_login(USER));
        assert!(app.transport.last_text().contains("access password"));
    }

    #[tokio::test]
    async fn plain_text_from_an_unauthenticated_user_proceeds() {
        let app = test_app();

        let verdict = authorize(&app.state, &text_message(USER, "physics notes")).await.unwrap();

        assert_eq!(verdict, Gate::Proceed);
        assert_eq!(app.transport.sent_count(), 0);
    }
}
