//! services/bot/src/web/inline.rs
//!
//! Inline-query handling: lets users search and share library documents from
//! any chat. Unrestricted, so it never touches the authorization gate.

use crate::adapters::telegram::InlineQuery;
use crate::error::BotError;
use crate::web::search::document_caption;
use crate::web::state::AppState;
use shelfbot_core::domain::{Button, Document, InlineResult, Keyboard};
use shelfbot_core::ports::DocumentFilter;

const RECENT_LIMIT: u32 = 20;
const SEARCH_LIMIT: u32 = 50;

/// Answers one inline query: recent documents when the query is empty, a
/// broad multi-field match otherwise, with a trailing "search again" entry.
pub async fn handle_inline_query(app: &AppState, query: &InlineQuery) -> Result<(), BotError> {
    let term = query.query.trim();

    if term.is_empty() {
        let recent = app
            .documents
            .query(DocumentFilter::Recent, RECENT_LIMIT)
            .await?;
        let results = recent
            .iter()
            .enumerate()
            .map(|(index, document)| document_to_result(document, index))
            .collect();
        app.transport
            .answer_inline(&query.id, results, 300, false)
            .await?;
        return Ok(());
    }

    let matches = app
        .documents
        .query(
            DocumentFilter::AnyFieldContains(term.to_string()),
            SEARCH_LIMIT,
        )
        .await?;

    let mut results: Vec<InlineResult> = matches
        .iter()
        .enumerate()
        .map(|(index, document)| document_to_result(document, index))
        .collect();

    // Always offer a way to refine, even when nothing matched.
    results.push(InlineResult::Article {
        id: "other_search".to_string(),
        title: "Other / Search Again".to_string(),
        description: format!("Tap to modify search for \"{}\"", term),
        message_text: format!(
            "Showing results for: *{}*\n\nIf you couldn't find your file, try refining your search.",
            term
        ),
        keyboard: Some(Keyboard {
            rows: vec![vec![Button::SwitchInlineCurrent {
                label: "Search Again".to_string(),
                query: term.to_string(),
            }]],
        }),
    });

    app.transport
        .answer_inline(&query.id, results, 10, true)
        .await?;
    Ok(())
}

/// Converts one document into a numbered inline result entry.
fn document_to_result(document: &Document, index: usize) -> InlineResult {
    let mut description = String::new();
    if let Some(author) = &document.author {
        description.push_str(author);
        description.push_str(" • ");
    }
    description.push_str(&document.subject);
    if let Some(exam) = &document.exam {
        description.push_str(&format!(" • {}", exam));
    }
    if let Some(year) = document.year {
        description.push_str(&format!(" • {}", year));
    }

    InlineResult::CachedDocument {
        id: document.id.to_string(),
        title: format!("{}. {}", index + 1, document.title),
        description,
        file_ref: document.file_ref.clone(),
        caption: document_caption(document),
    }
}

#[cfg(test)]
mod tests {
    use super::handle_inline_query;
    use crate::adapters::telegram::InlineQuery;
    use crate::web::testing::{test_app, tg_user};
    use shelfbot_core::domain::InlineResult;
    use shelfbot_core::ports::DocumentFilter;

    fn inline_query(text: &str) -> InlineQuery {
        InlineQuery {
            id: "q-1".to_string(),
            from: tg_user(7),
            query: text.to_string(),
        }
    }

    #[tokio::test]
    async fn empty_query_answers_with_recent_documents() {
        let app = test_app();
        app.seed_full_document("f-1", "Physics Vol 1", "Physics");
        app.seed_full_document("f-2", "Algebra", "Maths");

        handle_inline_query(&app.state, &inline_query("")).await.unwrap();

        let answer = app.transport.last_inline_answer();
        assert_eq!(answer.results.len(), 2);
        assert_eq!(app.documents.last_query(), Some(DocumentFilter::Recent));
    }

    #[tokio::test]
    async fn non_empty_query_matches_broadly_and_appends_search_again() {
        let app = test_app();
        app.seed_full_document("f-1", "Concepts of Physics", "Physics");

        handle_inline_query(&app.state, &inline_query("physics")).await.unwrap();

        let answer = app.transport.last_inline_answer();
        assert_eq!(answer.results.len(), 2);
        assert!(matches!(
            answer.results.first(),
            Some(InlineResult::CachedDocument { title, .. }) if title.starts_with("1. ")
        ));
        assert!(matches!(
            answer.results.last(),
            Some(InlineResult::Article { id, .. }) if id == "other_search"
        ));
        assert_eq!(
            app.documents.last_query(),
            Some(DocumentFilter::AnyFieldContains("physics".to_string()))
        );
    }
}
