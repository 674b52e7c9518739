//! # dreamsearch
//!
//! Client core for the DreamSearch drawing-assessment and persona-chat
//! service.
//!
//! This crate contains the REST client (`net`), the per-view state managers
//! (`state`), the persona roster, and typed configuration. The `dreamsearch`
//! binary in `main.rs` drives these from a terminal.

pub mod config;
pub mod net;
pub mod persona;
pub mod state;
