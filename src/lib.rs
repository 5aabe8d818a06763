pub mod auth;
pub mod config;
pub mod error;
pub mod forms;
pub mod media;
pub mod models;
pub mod openapi;
pub mod pdf;
pub mod repo;
pub mod routes;
pub mod security;
pub mod storage;

pub use config::AppConfig;
pub use routes::{config as configure, AppState};
pub use security::SecurityHeaders;
