//! PDF attachments for offers and student CVs.

pub mod services;

pub use services::{
    discard_document, presign_document, read_pdf_field, store_document, DocumentOwner,
    UploadError, UploadItem,
};
