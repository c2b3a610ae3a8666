//! services/bot/src/web/testing.rs
//!
//! In-memory fakes for the port traits plus a manual clock, shared by the
//! `#[cfg(test)]` modules of the web layer.

use crate::adapters::telegram::TgUser;
use crate::config::Config;
use crate::web::background::BackgroundTasks;
use crate::web::protocol::{DocumentAttachment, Inbound};
use crate::web::session::SessionManager;
use crate::web::state::AppState;
use async_trait::async_trait;
use chrono::Utc;
use shelfbot_core::domain::{
    ChatId, ConversationPhase, Document, InlineResult, Keyboard, NewDocument, NormalizedMetadata,
    UserConversationState, UserId, UserProfile,
};
use shelfbot_core::ports::{
    Clock, DocumentFilter, DocumentStore, MessageTransport, PortError, PortResult, UserDirectory,
    UserStateStore,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use uuid::Uuid;

//=========================================================================================
// Manual clock
//=========================================================================================

/// A `Clock` whose time only moves when a test advances it.
pub struct ManualClock {
    base: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.offset.lock().unwrap() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + *self.offset.lock().unwrap()
    }
}

//=========================================================================================
// Document store fake
//=========================================================================================

#[derive(Default)]
pub struct MemoryDocumentStore {
    documents: Mutex<Vec<Document>>,
    queries: Mutex<Vec<DocumentFilter>>,
    fail_next_insert: AtomicBool,
    fail_next_update: AtomicBool,
}

impl MemoryDocumentStore {
    pub fn push(&self, document: Document) {
        self.documents.lock().unwrap().push(document);
    }

    pub fn all(&self) -> Vec<Document> {
        self.documents.lock().unwrap().clone()
    }

    pub fn by_id(&self, id: Uuid) -> Document {
        self.all()
            .into_iter()
            .find(|d| d.id == id)
            .expect("document by id")
    }

    pub fn by_file_ref(&self, file_ref: &str) -> Document {
        self.all()
            .into_iter()
            .find(|d| d.file_ref == file_ref)
            .expect("document by file ref")
    }

    pub fn queries_issued(&self) -> usize {
        self.queries.lock().unwrap().len()
    }

    pub fn last_query(&self) -> Option<DocumentFilter> {
        self.queries.lock().unwrap().last().cloned()
    }

    pub fn fail_next_insert(&self) {
        self.fail_next_insert.store(true, Ordering::SeqCst);
    }

    pub fn fail_next_update(&self) {
        self.fail_next_update.store(true, Ordering::SeqCst);
    }

    fn matches(document: &Document, filter: &DocumentFilter) -> bool {
        let contains =
            |field: &str, term: &str| field.to_lowercase().contains(&term.to_lowercase());
        match filter {
            DocumentFilter::SubjectContains(term) => contains(&document.subject, term),
            DocumentFilter::TitleContains(term) => contains(&document.title, term),
            DocumentFilter::YearEquals(year) => document.year == Some(*year),
            DocumentFilter::AnyFieldContains(term) => {
                contains(&document.title, term)
                    || contains(&document.subject, term)
                    || document.author.as_deref().is_some_and(|f| contains(f, term))
                    || document.exam.as_deref().is_some_and(|f| contains(f, term))
                    || document
                        .file_name
                        .as_deref()
                        .is_some_and(|f| contains(f, term))
            }
            DocumentFilter::Recent => true,
        }
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn insert(&self, doc: NewDocument) -> PortResult<Document> {
        if self.fail_next_insert.swap(false, Ordering::SeqCst) {
            return Err(PortError::Unexpected("insert failed".to_string()));
        }
        let document = Document {
            id: Uuid::new_v4(),
            file_ref: doc.file_ref,
            file_name: doc.file_name,
            file_size: doc.file_size,
            title: doc.title,
            author: None,
            subject: doc.subject,
            category: Some(doc.category),
            exam: None,
            year: None,
            edition: None,
            semester: None,
            created_at: Utc::now(),
        };
        self.push(document.clone());
        Ok(document)
    }

    async fn update_metadata(&self, id: Uuid, metadata: &NormalizedMetadata) -> PortResult<()> {
        if self.fail_next_update.swap(false, Ordering::SeqCst) {
            return Err(PortError::Unexpected("update failed".to_string()));
        }
        let mut documents = self.documents.lock().unwrap();
        let document = documents
            .iter_mut()
            .find(|d| d.id == id)
            .ok_or_else(|| PortError::NotFound(format!("Document {} not found", id)))?;
        if let Some(title) = &metadata.title {
            document.title = title.clone();
        }
        if metadata.author.is_some() {
            document.author = metadata.author.clone();
        }
        if let Some(subject) = &metadata.subject {
            document.subject = subject.clone();
        }
        if metadata.exam.is_some() {
            document.exam = metadata.exam.clone();
        }
        if metadata.year.is_some() {
            document.year = metadata.year;
        }
        if metadata.edition.is_some() {
            document.edition = metadata.edition.clone();
        }
        if metadata.semester.is_some() {
            document.semester = metadata.semester.clone();
        }
        Ok(())
    }

    async fn find_by_file_ref(&self, file_ref: &str) -> PortResult<Document> {
        self.all()
            .into_iter()
            .find(|d| d.file_ref == file_ref)
            .ok_or_else(|| PortError::NotFound(format!("No document with file ref {}", file_ref)))
    }

    async fn query(&self, filter: DocumentFilter, limit: u32) -> PortResult<Vec<Document>> {
        self.queries.lock().unwrap().push(filter.clone());
        // Most recent first, like the SQL adapter's ORDER BY created_at DESC.
        Ok(self
            .all()
            .into_iter()
            .rev()
            .filter(|d| Self::matches(d, &filter))
            .take(limit as usize)
            .collect())
    }
}

//=========================================================================================
// User state store fake
//=========================================================================================

#[derive(Default)]
pub struct MemoryStateStore {
    states: Mutex<HashMap<UserId, UserConversationState>>,
}

impl MemoryStateStore {
    pub fn phase_of(&self, user_id: UserId) -> ConversationPhase {
        self.states
            .lock()
            .unwrap()
            .get(&user_id)
            .map(|s| s.phase)
            .unwrap_or(ConversationPhase::Idle)
    }

    pub fn pending_of(&self, user_id: UserId) -> Option<Uuid> {
        self.states
            .lock()
            .unwrap()
            .get(&user_id)
            .and_then(|s| s.pending_document_id)
    }

    pub fn put_awaiting(&self, user_id: UserId, pending: Uuid) {
        self.states.lock().unwrap().insert(
            user_id,
            UserConversationState::awaiting_metadata(user_id, pending),
        );
    }
}

#[async_trait]
impl UserStateStore for MemoryStateStore {
    async fn get(&self, user_id: UserId) -> PortResult<UserConversationState> {
        Ok(self
            .states
            .lock()
            .unwrap()
            .get(&user_id)
            .cloned()
            .unwrap_or_else(|| UserConversationState::idle(user_id)))
    }

    async fn set_awaiting(&self, user_id: UserId, pending_document_id: Uuid) -> PortResult<()> {
        self.put_awaiting(user_id, pending_document_id);
        Ok(())
    }

    async fn clear(&self, user_id: UserId) -> PortResult<()> {
        self.states
            .lock()
            .unwrap()
            .insert(user_id, UserConversationState::idle(user_id));
        Ok(())
    }
}

//=========================================================================================
// User directory fake
//=========================================================================================

#[derive(Default)]
pub struct MemoryDirectory {
    flags: Mutex<HashMap<UserId, bool>>,
    profiles: Mutex<Vec<UserProfile>>,
    flag_writes: AtomicUsize,
}

impl MemoryDirectory {
    pub fn authenticated(&self, user_id: UserId) -> bool {
        self.flags.lock().unwrap().get(&user_id).copied().unwrap_or(false)
    }

    pub fn flag_writes(&self) -> usize {
        self.flag_writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UserDirectory for MemoryDirectory {
    async fn save_profile(&self, profile: &UserProfile) -> PortResult<()> {
        self.profiles.lock().unwrap().push(profile.clone());
        Ok(())
    }

    async fn set_authenticated(&self, user_id: UserId, authenticated: bool) -> PortResult<()> {
        self.flag_writes.fetch_add(1, Ordering::SeqCst);
        self.flags.lock().unwrap().insert(user_id, authenticated);
        Ok(())
    }

    async fn is_authenticated(&self, user_id: UserId) -> PortResult<bool> {
        Ok(self.authenticated(user_id))
    }
}

//=========================================================================================
// Recording transport
//=========================================================================================

#[derive(Debug, Clone)]
pub enum Sent {
    Text { chat: ChatId, text: String },
    KeyboardText { chat: ChatId, text: String, keyboard: Keyboard },
    Edit { chat: ChatId, message_id: i64, text: String },
    Document { chat: ChatId, file_ref: String, caption: String },
    Typing { chat: ChatId },
    Callback { id: String },
    Inline(InlineAnswer),
}

#[derive(Debug, Clone)]
pub struct InlineAnswer {
    pub query_id: String,
    pub results: Vec<InlineResult>,
    pub cache_secs: u32,
    pub personal: bool,
}

#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<Sent>>,
    next_message_id: AtomicI64,
}

impl RecordingTransport {
    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    pub fn last_text(&self) -> String {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find_map(|s| match s {
                Sent::Text { text, .. } => Some(text.clone()),
                _ => None,
            })
            .expect("no text was sent")
    }

    pub fn last_edit(&self) -> String {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find_map(|s| match s {
                Sent::Edit { text, .. } => Some(text.clone()),
                _ => None,
            })
            .expect("no edit was sent")
    }

    pub fn last_keyboard_text(&self) -> String {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find_map(|s| match s {
                Sent::KeyboardText { text, .. } => Some(text.clone()),
                _ => None,
            })
            .expect("no keyboard message was sent")
    }

    pub fn sent_document_refs(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter_map(|s| match s {
                Sent::Document { file_ref, .. } => Some(file_ref.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn last_inline_answer(&self) -> InlineAnswer {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find_map(|s| match s {
                Sent::Inline(answer) => Some(answer.clone()),
                _ => None,
            })
            .expect("no inline answer was sent")
    }

    fn record(&self, entry: Sent) {
        self.sent.lock().unwrap().push(entry);
    }
}

#[async_trait]
impl MessageTransport for RecordingTransport {
    async fn send_text(&self, chat: ChatId, text: &str) -> PortResult<i64> {
        self.record(Sent::Text {
            chat,
            text: text.to_string(),
        });
        Ok(self.next_message_id.fetch_add(1, Ordering::SeqCst))
    }

    async fn send_text_with_keyboard(
        &self,
        chat: ChatId,
        text: &str,
        keyboard: &Keyboard,
    ) -> PortResult<i64> {
        self.record(Sent::KeyboardText {
            chat,
            text: text.to_string(),
            keyboard: keyboard.clone(),
        });
        Ok(self.next_message_id.fetch_add(1, Ordering::SeqCst))
    }

    async fn edit_text(&self, chat: ChatId, message_id: i64, text: &str) -> PortResult<()> {
        self.record(Sent::Edit {
            chat,
            message_id,
            text: text.to_string(),
        });
        Ok(())
    }

    async fn send_document(&self, chat: ChatId, file_ref: &str, caption: &str) -> PortResult<()> {
        self.record(Sent::Document {
            chat,
            file_ref: file_ref.to_string(),
            caption: caption.to_string(),
        });
        Ok(())
    }

    async fn notify_typing(&self, chat: ChatId) -> PortResult<()> {
        self.record(Sent::Typing { chat });
        Ok(())
    }

    async fn answer_callback(&self, callback_id: &str) -> PortResult<()> {
        self.record(Sent::Callback {
            id: callback_id.to_string(),
        });
        Ok(())
    }

    async fn answer_inline(
        &self,
        query_id: &str,
        results: Vec<InlineResult>,
        cache_secs: u32,
        personal: bool,
    ) -> PortResult<()> {
        self.record(Sent::Inline(InlineAnswer {
            query_id: query_id.to_string(),
            results,
            cache_secs,
            personal,
        }));
        Ok(())
    }

    async fn fetch_file(&self, file_ref: &str) -> PortResult<Vec<u8>> {
        Err(PortError::NotFound(format!(
            "test transport holds no file {}",
            file_ref
        )))
    }
}

//=========================================================================================
// Assembled test application
//=========================================================================================

pub struct TestApp {
    pub state: AppState,
    pub transport: Arc<RecordingTransport>,
    pub documents: Arc<MemoryDocumentStore>,
    pub user_states: Arc<MemoryStateStore>,
    pub directory: Arc<MemoryDirectory>,
    pub clock: Arc<ManualClock>,
}

impl TestApp {
    pub fn seed_document(&self, file_ref: &str, title: &str) -> Document {
        self.documents.push(make_document(file_ref, title, "Pending"));
        self.documents.by_file_ref(file_ref)
    }

    pub fn seed_full_document(&self, file_ref: &str, title: &str, subject: &str) -> Document {
        self.documents.push(make_document(file_ref, title, subject));
        self.documents.by_file_ref(file_ref)
    }

    pub fn set_awaiting(&self, user_id: UserId, pending: Uuid) {
        self.user_states.put_awaiting(user_id, pending);
    }

    pub fn phase_of(&self, user_id: UserId) -> ConversationPhase {
        self.user_states.phase_of(user_id)
    }

    pub fn pending_of(&self, user_id: UserId) -> Option<Uuid> {
        self.user_states.pending_of(user_id)
    }

    pub fn start_session(&self, user_id: UserId) {
        self.state.sessions.start_session(user_id);
    }
}

/// Builds an application wired entirely to in-memory fakes.
pub fn test_app() -> TestApp {
    let documents = Arc::new(MemoryDocumentStore::default());
    let user_states = Arc::new(MemoryStateStore::default());
    let directory = Arc::new(MemoryDirectory::default());
    let transport = Arc::new(RecordingTransport::default());
    let clock = Arc::new(ManualClock::new());

    let config = Arc::new(Config {
        bind_address: "127.0.0.1:0".parse().unwrap(),
        database_url: String::new(),
        log_level: tracing::Level::INFO,
        telegram_token: "test-token".to_string(),
        access_passwords: vec!["opensesame".to_string()],
        session_ttl: Duration::from_secs(600),
        openai_api_key: None,
        analysis_model: "gpt-4o-mini".to_string(),
    });

    let state = AppState {
        documents: documents.clone(),
        user_states: user_states.clone(),
        users: directory.clone(),
        transport: transport.clone(),
        analysis: None,
        sessions: SessionManager::new(config.session_ttl, clock.clone()),
        background: BackgroundTasks::new(),
        config,
    };

    TestApp {
        state,
        transport,
        documents,
        user_states,
        directory,
        clock,
    }
}

/// A fully populated document for seeding the fake store.
pub fn make_document(file_ref: &str, title: &str, subject: &str) -> Document {
    Document {
        id: Uuid::new_v4(),
        file_ref: file_ref.to_string(),
        file_name: Some(format!("{}.pdf", file_ref)),
        file_size: Some(1024),
        title: title.to_string(),
        author: None,
        subject: subject.to_string(),
        category: Some("Other".to_string()),
        exam: None,
        year: None,
        edition: None,
        semester: None,
        created_at: Utc::now(),
    }
}

pub fn tg_user(id: i64) -> TgUser {
    TgUser {
        id,
        is_bot: false,
        first_name: format!("user-{}", id),
        last_name: None,
        username: None,
        language_code: Some("en".to_string()),
    }
}

/// A plain text message from `user` in their private chat.
pub fn text_message(user: i64, text: &str) -> Inbound {
    Inbound {
        chat_id: user,
        message_id: 1,
        sender: tg_user(user).to_profile(),
        text: Some(text.to_string()),
        document: None,
        via_relay: false,
        reply_to_document: None,
    }
}

/// A document upload from `user` in their private chat.
pub fn document_message(user: i64, file_ref: &str, file_name: &str) -> Inbound {
    Inbound {
        chat_id: user,
        message_id: 1,
        sender: tg_user(user).to_profile(),
        text: None,
        document: Some(DocumentAttachment {
            file_ref: file_ref.to_string(),
            file_name: Some(file_name.to_string()),
            mime_type: Some("application/pdf".to_string()),
            file_size: Some(2048),
        }),
        via_relay: false,
        reply_to_document: None,
    }
}
