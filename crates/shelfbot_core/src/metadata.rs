//! crates/shelfbot_core/src/metadata.rs
//!
//! Parses free-text `key: value` lines into a [`NormalizedMetadata`] record.
//!
//! Expected input shape:
//!
//! ```text
//! name: Physics Book
//! author: HC Verma
//! subject: Physics
//! year: 2024
//! ```

use crate::domain::NormalizedMetadata;

/// Converts user-supplied `key: value` lines into normalized metadata.
///
/// Each line is split on its *first* colon; the key is lower-cased and
/// trimmed, the value keeps any further colons. Unrecognized keys and empty
/// values are silently ignored, and when the same target field appears on
/// several lines the last one wins. An input with no parseable line yields
/// an empty record, never an error.
pub fn parse_metadata(text: &str) -> NormalizedMetadata {
    let mut metadata = NormalizedMetadata::default();

    for line in text.lines() {
        let trimmed = line.trim();
        let Some((raw_key, raw_value)) = trimmed.split_once(':') else {
            continue;
        };

        let key = raw_key.trim().to_lowercase();
        let value = raw_value.trim();
        if value.is_empty() {
            continue;
        }

        // Map common variations to standard fields.
        match key.as_str() {
            "name" | "title" | "document" | "doc" => metadata.title = Some(value.to_string()),
            "author" | "writer" | "by" => metadata.author = Some(value.to_string()),
            "subject" | "topic" | "course" | "genre" => {
                metadata.subject = Some(value.to_string());
            }
            "exam" | "test" | "examination" => metadata.exam = Some(value.to_string()),
            "year" | "yr" => {
                // Non-numeric years are dropped silently.
                if let Ok(year) = value.parse::<i32>() {
                    metadata.year = Some(year);
                }
            }
            "edition" | "ed" | "version" => metadata.edition = Some(value.to_string()),
            "semester" | "sem" | "term" => metadata.semester = Some(value.to_string()),
            _ => {}
        }
    }

    metadata
}

#[cfg(test)]
mod tests {
    use super::parse_metadata;

    #[test]
    fn parses_all_seven_fields() {
        let parsed = parse_metadata(
            "name: Concepts of Physics Vol 1\n\
             author: HC Verma\n\
             subject: Physics\n\
             exam: JEE Advanced\n\
             year: 2024\n\
             edition: 5th Edition\n\
             semester: 1st Sem",
        );

        assert_eq!(parsed.title.as_deref(), Some("Concepts of Physics Vol 1"));
        assert_eq!(parsed.author.as_deref(), Some("HC Verma"));
        assert_eq!(parsed.subject.as_deref(), Some("Physics"));
        assert_eq!(parsed.exam.as_deref(), Some("JEE Advanced"));
        assert_eq!(parsed.year, Some(2024));
        assert_eq!(parsed.edition.as_deref(), Some("5th Edition"));
        assert_eq!(parsed.semester.as_deref(), Some("1st Sem"));
    }

    #[test]
    fn last_occurrence_of_a_target_field_wins() {
        let parsed = parse_metadata("name: A\ntitle: B");
        assert_eq!(parsed.title.as_deref(), Some("B"));
        assert!(parsed.author.is_none());
    }

    #[test]
    fn aliases_map_to_standard_fields() {
        let parsed = parse_metadata("doc: Chemistry Notes\ntopic: Organic Chemistry\nyr: 2022");
        assert_eq!(parsed.title.as_deref(), Some("Chemistry Notes"));
        assert_eq!(parsed.subject.as_deref(), Some("Organic Chemistry"));
        assert_eq!(parsed.year, Some(2022));
    }

    #[test]
    fn non_numeric_year_is_dropped_without_error() {
        let parsed = parse_metadata("year: abc");
        assert!(parsed.is_empty());
    }

    #[test]
    fn unrecognized_keys_and_empty_values_are_ignored() {
        let parsed = parse_metadata("publisher: Pearson\nauthor:   \nsubject: Maths");
        assert!(parsed.author.is_none());
        assert_eq!(parsed.subject.as_deref(), Some("Maths"));
    }

    #[test]
    fn value_keeps_colons_after_the_first() {
        let parsed = parse_metadata("title: Physics: Principles and Problems");
        assert_eq!(
            parsed.title.as_deref(),
            Some("Physics: Principles and Problems")
        );
    }

    #[test]
    fn unparseable_input_yields_the_empty_record() {
        assert!(parse_metadata("just some chatter with no fields").is_empty());
        assert!(parse_metadata("").is_empty());
    }
}
