//! services/bot/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::config::Config;
use crate::web::background::BackgroundTasks;
use crate::web::session::SessionManager;
use shelfbot_core::ports::{
    DocumentStore, MessageTransport, TextAnalysisService, UserDirectory, UserStateStore,
};
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all
/// handlers. Collaborators are held behind their port traits, so tests swap
/// in in-memory fakes.
pub struct AppState {
    pub documents: Arc<dyn DocumentStore>,
    pub user_states: Arc<dyn UserStateStore>,
    pub users: Arc<dyn UserDirectory>,
    pub transport: Arc<dyn MessageTransport>,
    /// Absent when no analysis backend is configured; uploads then skip the
    /// metadata-suggestion enrichment.
    pub analysis: Option<Arc<dyn TextAnalysisService>>,
    pub sessions: SessionManager,
    pub background: BackgroundTasks,
    pub config: Arc<Config>,
}
