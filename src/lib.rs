pub mod adapters;
pub mod analytics;
pub mod auth;
pub mod domain;
pub mod error;
pub mod media;
pub mod models;
pub mod openapi;
pub mod repo;
pub mod routes;
pub mod security;
pub mod store;
pub mod webhook;

// Re-export commonly used items for tests / external users
pub use routes::{config, AppState, SessionRegistry};
pub use security::SecurityHeaders;
pub use store::AppStore;
