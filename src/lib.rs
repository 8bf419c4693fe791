pub mod app;
pub mod attachments;
pub mod auth;
pub mod config;
pub mod offers;
pub mod state;
pub mod storage;
