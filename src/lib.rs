//! Band Together — realtime collaborative setlist service.
//!
//! ARCHITECTURE
//! ============
//! - `services::presence` — who is viewing/editing each setlist
//! - `services::broadcast` — per-setlist event channels
//! - `services::setlist` — persisted CRUD that publishes after commit
//! - `services::session` / `services::identity` — ticket auth for sockets
//! - `services::sweep` — background eviction of dead connections
//! - `routes` — REST surface plus the `/live` websocket gateway

pub mod db;
pub mod event;
pub mod routes;
pub mod services;
pub mod state;
