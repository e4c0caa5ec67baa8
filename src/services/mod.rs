//! Domain services used by websocket and HTTP routes.
//!
//! ARCHITECTURE
//! ============
//! Service modules own business logic, registry state, and persistence
//! concerns so route handlers can stay focused on protocol translation and
//! auth plumbing.

pub mod broadcast;
pub mod identity;
pub mod presence;
pub mod session;
pub mod setlist;
pub mod sweep;
