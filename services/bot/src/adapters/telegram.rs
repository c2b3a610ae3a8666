//! services/bot/src/adapters/telegram.rs
//!
//! This module contains the Telegram Bot API adapter: the serde wire types for
//! inbound updates and a `reqwest`-backed client that implements the
//! `MessageTransport` port from the `core` crate.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use shelfbot_core::domain::{Button, ChatId, InlineResult, Keyboard, UserProfile};
use shelfbot_core::ports::{MessageTransport, PortError, PortResult};

const DEFAULT_API_BASE: &str = "https://api.telegram.org";

//=========================================================================================
// Inbound Wire Types
//=========================================================================================

/// A single update delivered to the webhook.
#[derive(Debug, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
    pub inline_query: Option<InlineQuery>,
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub from: Option<TgUser>,
    pub chat: TgChat,
    pub text: Option<String>,
    pub document: Option<TgDocument>,
    /// Present when the message was sent through an inline-mode relay.
    pub via_bot: Option<TgUser>,
    pub reply_to_message: Option<Box<Message>>,
}

#[derive(Debug, Deserialize)]
pub struct TgChat {
    pub id: i64,
}

#[derive(Debug, Deserialize)]
pub struct TgUser {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    pub first_name: String,
    pub last_name: Option<String>,
    pub username: Option<String>,
    pub language_code: Option<String>,
}

impl TgUser {
    pub fn to_profile(&self) -> UserProfile {
        UserProfile {
            id: self.id,
            username: self.username.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            is_bot: self.is_bot,
            language_code: self.language_code.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TgDocument {
    pub file_id: String,
    pub file_name: Option<String>,
    pub mime_type: Option<String>,
    pub file_size: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct InlineQuery {
    pub id: String,
    pub from: TgUser,
    pub query: String,
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: TgUser,
    pub data: Option<String>,
    pub message: Option<Message>,
}

/// The Bot API response envelope shared by every method.
#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    result: Option<Value>,
    description: Option<String>,
}

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A `MessageTransport` implementation backed by the Telegram Bot HTTP API.
#[derive(Clone)]
pub struct TelegramApi {
    http: reqwest::Client,
    token: String,
    base_url: String,
}

impl TelegramApi {
    /// Creates a new `TelegramApi`. `TELEGRAM_API_BASE` overrides the public
    /// endpoint, which local Bot API servers and tests rely on.
    pub fn new(token: String) -> Self {
        let base_url =
            std::env::var("TELEGRAM_API_BASE").unwrap_or_else(|_| DEFAULT_API_BASE.to_string());
        Self {
            http: reqwest::Client::new(),
            token,
            base_url,
        }
    }

    /// Invokes one Bot API method and unwraps the response envelope.
    async fn call(&self, method: &str, payload: Value) -> PortResult<Value> {
        let url = format!("{}/bot{}/{}", self.base_url, self.token, method);
        let response = self
            .http
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| PortError::Unexpected(format!("{}: {}", method, e)))?;

        let envelope: ApiResponse = response
            .json()
            .await
            .map_err(|e| PortError::Unexpected(format!("{}: {}", method, e)))?;

        if !envelope.ok {
            return Err(PortError::Unexpected(format!(
                "{} failed: {}",
                method,
                envelope.description.unwrap_or_else(|| "unknown".to_string())
            )));
        }
        Ok(envelope.result.unwrap_or(Value::Null))
    }

    fn message_id_of(result: &Value) -> PortResult<i64> {
        result
            .get("message_id")
            .and_then(Value::as_i64)
            .ok_or_else(|| {
                PortError::Unexpected("Bot API response carried no message_id".to_string())
            })
    }
}

fn keyboard_to_wire(keyboard: &Keyboard) -> Value {
    let rows: Vec<Value> = keyboard
        .rows
        .iter()
        .map(|row| {
            row.iter()
                .map(|button| match button {
                    Button::Callback { label, data } => {
                        json!({ "text": label, "callback_data": data })
                    }
                    Button::SwitchInline { label, query } => {
                        json!({ "text": label, "switch_inline_query": query })
                    }
                    Button::SwitchInlineCurrent { label, query } => {
                        json!({ "text": label, "switch_inline_query_current_chat": query })
                    }
                })
                .collect::<Vec<_>>()
                .into()
        })
        .collect();
    json!({ "inline_keyboard": rows })
}

fn inline_result_to_wire(result: &InlineResult) -> Value {
    match result {
        InlineResult::CachedDocument {
            id,
            title,
            description,
            file_ref,
            caption,
        } => json!({
            "type": "document",
            "id": id,
            "title": title,
            "description": description,
            "document_file_id": file_ref,
            "caption": caption,
            "parse_mode": "Markdown",
        }),
        InlineResult::Article {
            id,
            title,
            description,
            message_text,
            keyboard,
        } => {
            let mut wire = json!({
                "type": "article",
                "id": id,
                "title": title,
                "description": description,
                "input_message_content": {
                    "message_text": message_text,
                    "parse_mode": "Markdown",
                },
            });
            if let Some(keyboard) = keyboard {
                wire["reply_markup"] = keyboard_to_wire(keyboard);
            }
            wire
        }
    }
}

//=========================================================================================
// `MessageTransport` Trait Implementation
//=========================================================================================

#[async_trait]
impl MessageTransport for TelegramApi {
    async fn send_text(&self, chat: ChatId, text: &str) -> PortResult<i64> {
        let result = self
            .call(
                "sendMessage",
                json!({ "chat_id": chat, "text": text, "parse_mode": "Markdown" }),
            )
            .await?;
        Self::message_id_of(&result)
    }

    async fn send_text_with_keyboard(
        &self,
        chat: ChatId,
        text: &str,
        keyboard: &Keyboard,
    ) -> PortResult<i64> {
        let result = self
            .call(
                "sendMessage",
                json!({
                    "chat_id": chat,
                    "text": text,
                    "parse_mode": "Markdown",
                    "reply_markup": keyboard_to_wire(keyboard),
                }),
            )
            .await?;
        Self::message_id_of(&result)
    }

    async fn edit_text(&self, chat: ChatId, message_id: i64, text: &str) -> PortResult<()> {
        self.call(
            "editMessageText",
            json!({
                "chat_id": chat,
                "message_id": message_id,
                "text": text,
                "parse_mode": "Markdown",
            }),
        )
        .await?;
        Ok(())
    }

    async fn send_document(&self, chat: ChatId, file_ref: &str, caption: &str) -> PortResult<()> {
        self.call(
            "sendDocument",
            json!({
                "chat_id": chat,
                "document": file_ref,
                "caption": caption,
                "parse_mode": "Markdown",
            }),
        )
        .await?;
        Ok(())
    }

    async fn notify_typing(&self, chat: ChatId) -> PortResult<()> {
        self.call(
            "sendChatAction",
            json!({ "chat_id": chat, "action": "typing" }),
        )
        .await?;
        Ok(())
    }

    async fn answer_callback(&self, callback_id: &str) -> PortResult<()> {
        self.call(
            "answerCallbackQuery",
            json!({ "callback_query_id": callback_id }),
        )
        .await?;
        Ok(())
    }

    async fn answer_inline(
        &self,
        query_id: &str,
        results: Vec<InlineResult>,
        cache_secs: u32,
        personal: bool,
    ) -> PortResult<()> {
        let wire_results: Vec<Value> = results.iter().map(inline_result_to_wire).collect();
        self.call(
            "answerInlineQuery",
            json!({
                "inline_query_id": query_id,
                "results": wire_results,
                "cache_time": cache_secs,
                "is_personal": personal,
            }),
        )
        .await?;
        Ok(())
    }

    async fn fetch_file(&self, file_ref: &str) -> PortResult<Vec<u8>> {
        // Two hops: getFile resolves the server-side path, then the file
        // endpoint serves the bytes.
        let result = self.call("getFile", json!({ "file_id": file_ref })).await?;
        let file_path = result
            .get("file_path")
            .and_then(Value::as_str)
            .ok_or_else(|| PortError::Unexpected("getFile returned no file_path".to_string()))?;

        let url = format!("{}/file/bot{}/{}", self.base_url, self.token, file_path);
        let bytes = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?
            .bytes()
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}
