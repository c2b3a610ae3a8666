//! services/bot/src/web/search.rs
//!
//! The search resolver: tiered lookups over the document store, deduplicated
//! into a single ranked result list, delivered as document sends.

use crate::error::BotError;
use crate::web::state::AppState;
use shelfbot_core::domain::{Button, ChatId, Document, Keyboard};
use shelfbot_core::ports::DocumentFilter;
use tracing::warn;

const TIER_LIMIT: u32 = 5;
const TERM_TOO_SHORT: &str = "Please send a longer search query (at least 2 characters).";

/// Resolves a free-text or `/search` term and delivers the results.
pub async fn run_search(app: &AppState, chat: ChatId, raw_term: &str) -> Result<(), BotError> {
    let term = raw_term.trim();
    if term.chars().count() < 2 {
        // Rejected before any backend query is issued.
        app.transport.send_text(chat, TERM_TOO_SHORT).await?;
        return Ok(());
    }

    let status_id = app
        .transport
        .send_text(chat, &format!("Searching for \"{}\"...", term))
        .await?;

    // Tiered lookups run in parallel; the year tier only exists for a
    // four-digit term.
    let subject_lookup = app
        .documents
        .query(DocumentFilter::SubjectContains(term.to_string()), TIER_LIMIT);
    let title_lookup = app
        .documents
        .query(DocumentFilter::TitleContains(term.to_string()), TIER_LIMIT);

    let (subject_hits, title_hits, year_hits) = match parse_year_term(term) {
        Some(year) => {
            let year_lookup = app
                .documents
                .query(DocumentFilter::YearEquals(year), TIER_LIMIT);
            let (subject, title, year) = futures::join!(subject_lookup, title_lookup, year_lookup);
            (subject?, title?, year?)
        }
        None => {
            let (subject, title) = futures::join!(subject_lookup, title_lookup);
            (subject?, title?, Vec::new())
        }
    };

    let results = merge_tiers(subject_hits, title_hits, year_hits);
    if results.is_empty() {
        app.transport
            .edit_text(chat, status_id, &format!("No files found for \"{}\".", term))
            .await?;
        return Ok(());
    }

    app.transport
        .edit_text(
            chat,
            status_id,
            &format!("*Search results for \"{}\":*", term),
        )
        .await?;

    for document in &results {
        let caption = document_caption(document);
        if let Err(error) = app
            .transport
            .send_document(chat, &document.file_ref, &caption)
            .await
        {
            // The stored file handle can go stale on the platform side.
            warn!(%error, title = %document.title, "Failed to send document");
            app.transport
                .send_text(
                    chat,
                    &format!(
                        "Could not send \"{}\" (file may have expired on the platform).",
                        document.title
                    ),
                )
                .await?;
        }
    }

    let keyboard = Keyboard {
        rows: vec![vec![Button::SwitchInline {
            label: "Search All Files".to_string(),
            query: term.to_string(),
        }]],
    };
    app.transport
        .send_text_with_keyboard(
            chat,
            "Don't see what you're looking for? Try searching all files:",
            &keyboard,
        )
        .await?;
    Ok(())
}

/// A term of exactly four digits doubles as a year filter.
fn parse_year_term(term: &str) -> Option<i32> {
    if term.len() == 4 && term.chars().all(|c| c.is_ascii_digit()) {
        term.parse().ok()
    } else {
        None
    }
}

/// Concatenates the tiers subject → title → year and deduplicates by
/// document id, keeping each document at its earliest tier position.
fn merge_tiers(
    subject_hits: Vec<Document>,
    title_hits: Vec<Document>,
    year_hits: Vec<Document>,
) -> Vec<Document> {
    let mut seen = std::collections::HashSet::new();
    subject_hits
        .into_iter()
        .chain(title_hits)
        .chain(year_hits)
        .filter(|document| seen.insert(document.id))
        .collect()
}

/// Metadata caption attached to a delivered document.
pub fn document_caption(document: &Document) -> String {
    let mut caption = format!("*{}*", document.title);
    if let Some(author) = &document.author {
        caption.push_str(&format!("\n{}", author));
    }
    caption.push_str(&format!("\n{}", document.subject));
    if let Some(exam) = &document.exam {
        caption.push_str(&format!(" | {}", exam));
    }
    if let Some(year) = document.year {
        caption.push_str(&format!(" | {}", year));
    }
    if let Some(edition) = &document.edition {
        caption.push_str(&format!("\n{}", edition));
    }
    if let Some(semester) = &document.semester {
        caption.push_str(&format!("\n{}", semester));
    }
    caption
}

#[cfg(test)]
mod tests {
    use super::{merge_tiers, parse_year_term, run_search};
    use crate::web::testing::{make_document, test_app};

    const CHAT: i64 = 7;

    #[tokio::test]
    async fn short_terms_are_rejected_without_querying_the_backend() {
        let app = test_app();

        run_search(&app.state, CHAT, " x ").await.unwrap();

        assert_eq!(app.documents.queries_issued(), 0);
        assert!(app.transport.last_text().contains("longer search query"));
    }

    #[tokio::test]
    async fn empty_results_report_no_files_found() {
        let app = test_app();

        run_search(&app.state, CHAT, "quantum").await.unwrap();

        assert!(app.transport.last_edit().contains("No files found for \"quantum\""));
        assert!(app.transport.sent_document_refs().is_empty());
    }

    #[tokio::test]
    async fn subject_hits_rank_above_title_hits() {
        let app = test_app();
        // Subject match inserted after the title match, so raw recency would
        // order them the other way around.
        app.seed_full_document("f-title", "Physics Problems", "Mathematics");
        app.seed_full_document("f-subject", "Irodov Solutions", "Physics");

        run_search(&app.state, CHAT, "physics").await.unwrap();

        let refs = app.transport.sent_document_refs();
        assert_eq!(refs, vec!["f-subject".to_string(), "f-title".to_string()]);
    }

    #[tokio::test]
    async fn four_digit_terms_add_a_trailing_year_tier() {
        let app = test_app();
        let mut by_year = make_document("f-year", "Old Paper", "History");
        by_year.year = Some(2024);
        app.documents.push(by_year);
        app.seed_full_document("f-title", "Syllabus 2024", "Admin");

        run_search(&app.state, CHAT, "2024").await.unwrap();

        let refs = app.transport.sent_document_refs();
        assert_eq!(refs, vec!["f-title".to_string(), "f-year".to_string()]);
    }

    #[test]
    fn duplicates_collapse_to_the_earliest_tier_position() {
        let shared = make_document("f-1", "Physics Vol 1", "Physics");
        let title_only = make_document("f-2", "Physics Vol 2", "Chemistry");

        let merged = merge_tiers(
            vec![shared.clone()],
            vec![title_only.clone(), shared.clone()],
            vec![shared],
        );

        let refs: Vec<_> = merged.iter().map(|d| d.file_ref.as_str()).collect();
        assert_eq!(refs, vec!["f-1", "f-2"]);
    }

    #[test]
    fn year_terms_must_be_exactly_four_digits() {
        assert_eq!(parse_year_term("2024"), Some(2024));
        assert_eq!(parse_year_term("202"), None);
        assert_eq!(parse_year_term("20245"), None);
        assert_eq!(parse_year_term("20x4"), None);
    }

    #[tokio::test]
    async fn results_are_followed_by_the_inline_search_keyboard() {
        let app = test_app();
        app.seed_full_document("f-1", "Concepts of Physics", "Physics");

        run_search(&app.state, CHAT, "physics").await.unwrap();

        let keyboard_text = app.transport.last_keyboard_text();
        assert!(keyboard_text.contains("searching all files"));
    }
}
