use anyhow::Context;
use axum::extract::Multipart;
use bytes::Bytes;
use tracing::{info, warn};
use uuid::Uuid;

use crate::state::AppState;

const PDF_CONTENT_TYPE: &str = "application/pdf";
const PRESIGN_TTL_SECS: u64 = 30 * 60;

pub struct UploadItem {
    pub filename: String,
    pub body: Bytes,
}

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("{0} is required")]
    Missing(&'static str),
    #[error("only PDF files are accepted")]
    NotPdf,
    #[error("uploaded file is empty")]
    Empty,
    #[error("malformed multipart body: {0}")]
    Multipart(String),
}

/// Who a stored document belongs to; decides its key prefix.
#[derive(Debug, Clone, Copy)]
pub enum DocumentOwner {
    Offer(i64),
    Student(i64),
}

impl DocumentOwner {
    fn prefix(&self) -> String {
        match self {
            DocumentOwner::Offer(id) => format!("offers/{}", id),
            DocumentOwner::Student(id) => format!("cvs/{}", id),
        }
    }
}

fn allowed_file(filename: &str) -> bool {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false)
}

/// Drops any client-side directory and keeps a conservative character set.
fn secure_filename(filename: &str) -> String {
    let base = filename.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .filter_map(|c| match c {
            c if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') => Some(c),
            c if c.is_whitespace() => Some('_'),
            _ => None,
        })
        .collect();
    let cleaned = cleaned.trim_matches(|c| c == '.' || c == '_').to_string();
    if allowed_file(&cleaned) && cleaned.len() > ".pdf".len() {
        cleaned
    } else {
        "document.pdf".to_string()
    }
}

/// Pulls the named file field out of a multipart body and checks it is a non-empty PDF.
/// Other fields are skipped.
pub async fn read_pdf_field(
    mp: &mut Multipart,
    field_name: &'static str,
) -> Result<UploadItem, UploadError> {
    while let Some(field) = mp
        .next_field()
        .await
        .map_err(|e| UploadError::Multipart(e.to_string()))?
    {
        if field.name() != Some(field_name) {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        if filename.is_empty() {
            return Err(UploadError::Missing(field_name));
        }
        if !allowed_file(&filename) {
            return Err(UploadError::NotPdf);
        }
        let body = field
            .bytes()
            .await
            .map_err(|e| UploadError::Multipart(e.to_string()))?;
        if body.is_empty() {
            return Err(UploadError::Empty);
        }
        return Ok(UploadItem { filename, body });
    }
    Err(UploadError::Missing(field_name))
}

/// Uploads the document and returns its storage key.
pub async fn store_document(
    st: &AppState,
    owner: DocumentOwner,
    item: UploadItem,
) -> anyhow::Result<String> {
    let key = format!(
        "{}/{}_{}",
        owner.prefix(),
        Uuid::new_v4(),
        secure_filename(&item.filename)
    );
    let size = item.body.len();
    st.storage
        .put_object(&key, item.body, PDF_CONTENT_TYPE)
        .await
        .with_context(|| format!("put_object {}", key))?;
    info!(%key, size, "document stored");
    Ok(key)
}

/// Best effort: a leftover object is not worth failing the request over.
pub async fn discard_document(st: &AppState, key: &str) {
    if let Err(e) = st.storage.delete_object(key).await {
        warn!(error = %e, %key, "failed to delete document");
    }
}

pub async fn presign_document(st: &AppState, key: &str) -> anyhow::Result<String> {
    st.storage
        .presign_get(key, PRESIGN_TTL_SECS)
        .await
        .with_context(|| format!("presign url for {}", key))
}
