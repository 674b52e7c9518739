//! Backend networking: HTTP client, wire types, and per-area services.
//!
//! DESIGN
//! ======
//! `api::ApiClient` owns transport concerns (base URL, bearer token,
//! timeouts, auth-failure sign-out). The per-area modules (`chat`, `users`,
//! `analysis`) layer typed endpoints on top and implement the backend traits
//! that the `state` managers consume.

pub mod analysis;
pub mod api;
pub mod cache;
pub mod chat;
pub mod error;
pub mod types;
pub mod users;

pub use api::ApiClient;
pub use error::ApiError;
