pub mod analysis_llm;
pub mod db;
pub mod pdf;
pub mod telegram;

pub use analysis_llm::OpenAiAnalysisAdapter;
pub use db::DbAdapter;
pub use telegram::TelegramApi;
