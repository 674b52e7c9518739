//! Per-view client state.
//!
//! DESIGN
//! ======
//! State is split by domain (`auth`, `chat`, `history`, `profile`) so each
//! view owns one small model. Managers are cheap `Clone` handles over
//! `Arc<Mutex<_>>`; locks are never held across an `.await`, and every
//! network-backed operation is guarded by an in-flight flag that rejects
//! re-entry instead of queueing it.

pub mod auth;
pub mod chat;
pub mod history;
pub mod profile;
