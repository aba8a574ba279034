//! Author list import from a Goodreads-style library export (CSV).

use crate::domain::normalize_text;
use crate::error::{AppError, Result};
use serde::Serialize;
use std::collections::HashMap;

const GENERIC_NAMES: [&str; 5] = ["various", "unknown", "anonymous", "editor", "translator"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthorCount {
    pub name: String,
    pub books: usize,
}

/// Trimmed, unquoted, single-spaced author name, or `None` for empty and
/// generic entries. Only a whole-name match is generic: "Various" is
/// skipped, "Stan Lee (Editor)" is kept.
pub fn clean_author_name(raw: &str) -> Option<String> {
    let name = normalize_text(raw);

    if name.is_empty() {
        return None;
    }

    let is_generic = GENERIC_NAMES
        .iter()
        .any(|generic| name.eq_ignore_ascii_case(generic));

    (!is_generic).then_some(name)
}

fn column(headers: &csv::StringRecord, name: &str) -> Option<usize> {
    headers
        .iter()
        .position(|h| h.trim().eq_ignore_ascii_case(name))
}

/// Distinct authors of an export, most books first (ties by name)
pub fn extract_authors(csv_text: &str) -> Result<Vec<AuthorCount>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(csv_text.as_bytes());

    let headers = reader
        .headers()
        .map_err(|e| AppError::Validation(format!("invalid CSV header: {}", e)))?
        .clone();
    let author_column = column(&headers, "author")
        .ok_or_else(|| AppError::Validation("CSV has no Author column".to_string()))?;
    let additional_column = column(&headers, "additional authors");

    // lowercased name -> (first spelling seen, book count)
    let mut counts: HashMap<String, (String, usize)> = HashMap::new();
    for row in reader.records() {
        let row = row.map_err(|e| AppError::Validation(format!("invalid CSV row: {}", e)))?;

        let main = row.get(author_column).into_iter();
        let additional = additional_column
            .and_then(|c| row.get(c))
            .into_iter()
            .flat_map(|names| names.split(','));

        for name in main.chain(additional).filter_map(clean_author_name) {
            counts
                .entry(name.to_lowercase())
                .and_modify(|(_, n)| *n += 1)
                .or_insert((name, 1));
        }
    }

    let mut authors: Vec<AuthorCount> = counts
        .into_values()
        .map(|(name, books)| AuthorCount { name, books })
        .collect();
    authors.sort_by(|a, b| b.books.cmp(&a.books).then_with(|| a.name.cmp(&b.name)));
    Ok(authors)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_author_name() {
        assert_eq!(clean_author_name("  N. K.   Jemisin "), Some("N. K. Jemisin".to_string()));
        assert_eq!(clean_author_name("\"Ted Chiang\""), Some("Ted Chiang".to_string()));
        assert_eq!(clean_author_name(""), None);
        assert_eq!(clean_author_name("Various"), None);
        assert_eq!(clean_author_name("UNKNOWN"), None);
        assert_eq!(clean_author_name("Anonymous"), None);
        assert_eq!(clean_author_name(" translator "), None);
    }

    #[test]
    fn test_annotated_names_are_kept() {
        assert_eq!(clean_author_name("Stan Lee (Editor)"), Some("Stan Lee (Editor)".to_string()));
        assert_eq!(clean_author_name("Unknown Author"), Some("Unknown Author".to_string()));
        assert_eq!(clean_author_name("Anonymous Collective"), Some("Anonymous Collective".to_string()));
    }

    #[test]
    fn test_additional_authors_are_counted() {
        let csv = "Title,Author,Additional Authors\n\
                   Good Omens,Terry Pratchett,Neil Gaiman\n\
                   Neverwhere,Neil Gaiman,\n\
                   The Long Earth,Terry Pratchett,\"Stephen Baxter, Various\"\n";

        let authors = extract_authors(csv).unwrap();
        assert_eq!(
            authors,
            vec![
                AuthorCount { name: "Neil Gaiman".to_string(), books: 2 },
                AuthorCount { name: "Terry Pratchett".to_string(), books: 2 },
                AuthorCount { name: "Stephen Baxter".to_string(), books: 1 },
            ]
        );
    }

    #[test]
    fn test_extract_authors_orders_by_book_count() {
        let csv = "Book Id,Title,Author,ISBN\n\
                   1,Kindred,Octavia E. Butler,\n\
                   2,Dawn,Octavia E. Butler,\n\
                   3,The Fifth Season,N. K. Jemisin,\n\
                   4,Beowulf,Anonymous,\n\
                   5,Parable of the Sower,octavia e. butler,\n\
                   6,Exhalation,Ted Chiang,\n";

        let authors = extract_authors(csv).unwrap();
        assert_eq!(
            authors,
            vec![
                AuthorCount { name: "Octavia E. Butler".to_string(), books: 3 },
                AuthorCount { name: "N. K. Jemisin".to_string(), books: 1 },
                AuthorCount { name: "Ted Chiang".to_string(), books: 1 },
            ]
        );
    }

    #[test]
    fn test_missing_author_column() {
        assert!(matches!(
            extract_authors("Title,ISBN\nDune,123\n"),
            Err(AppError::Validation(_))
        ));
    }
}
