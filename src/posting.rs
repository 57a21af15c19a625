use chrono::{DateTime, Utc};
use serde::Serialize;

/// Upper bound on the length of a canonical id.
pub const MAX_ID_LEN: usize = 200;

/// Company value used when a listing does not expose one.
pub const UNKNOWN_COMPANY: &str = "unknown";

/// One unit of work: a single source searched for a single term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchTask {
    pub source: String,
    pub term: String,
    pub locality: String,
}

impl SearchTask {
    pub fn new(source: &str, term: &str, locality: &str) -> Self {
        SearchTask {
            source: source.to_string(),
            term: term.to_string(),
            locality: locality.to_string(),
        }
    }
}

/// A posting extracted by an adapter but not yet checked against the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub id: String,
    pub title: String,
    pub company: String,
    pub location: String,
    pub link: String,
    pub source: String,
    pub high_value: bool,
}

impl Candidate {
    /// Builds a candidate, deriving its canonical id from source, title and company.
    pub fn new(
        source: &str,
        title: &str,
        company: &str,
        location: &str,
        link: &str,
        high_value: bool,
    ) -> Self {
        Candidate {
            id: canonical_id(source, title, company),
            title: title.to_string(),
            company: company.to_string(),
            location: location.to_string(),
            link: link.to_string(),
            source: source.to_string(),
            high_value,
        }
    }

    /// Stamps the candidate with its discovery time.
    pub fn into_posting(self, discovered_at: DateTime<Utc>) -> Posting {
        Posting {
            id: self.id,
            title: self.title,
            company: self.company,
            location: self.location,
            link: self.link,
            source: self.source,
            discovered_at,
            high_value: self.high_value,
        }
    }
}

/// A stored posting. Never mutated after insertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Posting {
    pub id: String,
    pub title: String,
    pub company: String,
    pub location: String,
    pub link: String,
    pub source: String,
    pub discovered_at: DateTime<Utc>,
    pub high_value: bool,
}

fn normalize(part: &str) -> String {
    part.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Deterministic identity for a posting.
///
/// Each component is whitespace-collapsed, lowercased and percent-encoded
/// before joining with `:`. The encoder escapes `:` itself, so distinct
/// triples never produce the same joined string before truncation.
pub fn canonical_id(source: &str, title: &str, company: &str) -> String {
    let mut id = [source, title, company]
        .iter()
        .map(|part| urlencoding::encode(&normalize(part)).into_owned())
        .collect::<Vec<_>>()
        .join(":");
    // percent-encoded output is pure ASCII, any byte index is a char boundary
    id.truncate(MAX_ID_LEN);
    id
}
