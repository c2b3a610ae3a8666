pub mod domain;
pub mod metadata;
pub mod ports;

pub use domain::{
    Button, ChatId, ConversationPhase, Document, DocumentAnalysis, InlineResult, Keyboard,
    NewDocument, NormalizedMetadata, UserConversationState, UserId, UserProfile,
};
pub use metadata::parse_metadata;
pub use ports::{
    Clock, DocumentFilter, DocumentStore, MessageTransport, PortError, PortResult, SystemClock,
    TextAnalysisService, UserDirectory, UserStateStore,
};
