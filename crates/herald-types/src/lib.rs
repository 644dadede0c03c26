//! Shared types for the Herald messaging backend.
//!
//! Domain models live in [`models`]; everything that travels over the
//! gateway socket is in [`events`]; REST request/response shapes and the
//! JWT claims are in [`api`].

pub mod api;
pub mod events;
pub mod models;
