use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::catalog::{Facets, OfferFilter};
use super::repo_types::{title_case, Offer, OfferDraft};

#[derive(Debug, Serialize)]
pub struct OfferView {
    pub id: i64,
    pub title: String,
    pub company: String,
    pub location: String,
    pub duration: String,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub start_date: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub has_document: bool,
    pub recruiter_id: i64,
}

impl From<Offer> for OfferView {
    fn from(o: Offer) -> Self {
        let tags = o.tag_list();
        Self {
            id: o.id,
            title: o.title,
            company: o.company,
            location: o.location,
            duration: o.duration,
            description: o.description,
            tags,
            start_date: o.start_date,
            created_at: o.created_at,
            has_document: o.document_key.is_some(),
            recruiter_id: o.recruiter_id,
        }
    }
}

/// Response of `GET /offers`: matching offers plus every facet value in the corpus.
#[derive(Debug, Serialize)]
pub struct OfferListResponse {
    pub offers: Vec<OfferView>,
    pub facets: Facets,
    pub selected: OfferFilter,
}

/// Body of the create and edit endpoints.
#[derive(Debug, Deserialize)]
pub struct OfferForm {
    pub title: String,
    pub company: String,
    pub location: String,
    pub duration: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Option<String>,
    #[serde(default)]
    pub start_date: Option<String>,
}

// Column widths in migrations/0001_init.sql.
const SHORT_TEXT: usize = 50;
const TEXT: usize = 100;
const TAGS_TEXT: usize = 200;

fn bounded(field: &str, value: String, max: usize) -> Result<String, String> {
    if value.chars().count() > max {
        return Err(format!("{} must be at most {} characters", field, max));
    }
    Ok(value)
}

fn required(field: &str, value: String, max: usize) -> Result<String, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(format!("{} is required", field));
    }
    bounded(field, trimmed.to_string(), max)
}

fn optional(field: &str, value: Option<String>, max: usize) -> Result<Option<String>, String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .map(|v| bounded(field, v, max))
        .transpose()
}

impl OfferForm {
    /// Trims everything, rejects blank required fields and title-cases the location.
    /// Casing can lengthen a string (`ß` becomes `SS`), so the location is bounded after it.
    pub fn into_draft(self) -> Result<OfferDraft, String> {
        Ok(OfferDraft {
            title: required("title", self.title, TEXT)?,
            company: required("company", self.company, TEXT)?,
            location: bounded(
                "location",
                title_case(&required("location", self.location, usize::MAX)?),
                TEXT,
            )?,
            duration: required("duration", self.duration, SHORT_TEXT)?,
            description: optional("description", self.description, usize::MAX)?,
            tags: optional("tags", self.tags, TAGS_TEXT)?,
            start_date: optional("start_date", self.start_date, SHORT_TEXT)?,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct CreatedOfferResponse {
    pub id: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}
