use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;

/// One internship posting as stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Offer {
    pub id: i64,
    pub title: String,
    pub company: String,
    pub location: String,
    pub duration: String,
    pub description: Option<String>,
    pub tags: Option<String>, // comma separated, order preserved
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub start_date: Option<String>,
    pub document_key: Option<String>, // object storage key of the attached PDF
    pub recruiter_id: i64,
}

impl Offer {
    /// Tags in the order the recruiter typed them, blanks dropped.
    pub fn tag_list(&self) -> Vec<String> {
        self.tags
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_owned)
            .collect()
    }

    /// Copies the recruiter-editable fields over this record.
    pub fn apply(&mut self, draft: OfferDraft) {
        self.title = draft.title;
        self.company = draft.company;
        self.location = draft.location;
        self.duration = draft.duration;
        self.description = draft.description;
        self.tags = draft.tags;
        self.start_date = draft.start_date;
    }
}

/// The fields a recruiter writes when creating or editing an offer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OfferDraft {
    pub title: String,
    pub company: String,
    pub location: String,
    pub duration: String,
    pub description: Option<String>,
    pub tags: Option<String>,
    pub start_date: Option<String>,
}

/// Title-cases a location the way recruiters expect to see it listed:
/// the first letter of every alphabetic run is upper-cased, the rest lower-cased.
pub fn title_case(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut prev_alpha = false;
    for c in input.chars() {
        if c.is_alphabetic() {
            if prev_alpha {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_alpha = true;
        } else {
            out.push(c);
            prev_alpha = false;
        }
    }
    out
}
