//! WS-ticket management for optional gateway authentication.
//!
//! ARCHITECTURE
//! ============
//! Websocket upgrades authenticate with one-time short-lived tickets instead
//! of bearer tokens in query params. A client first exchanges its identity
//! token over HTTPS for a ticket, then opens the socket with the ticket.
//! Connections without a ticket are accepted as unauthenticated guests.
//!
//! TRADE-OFFS
//! ==========
//! Ticket consumption is destructive (`DELETE ... RETURNING`) to guarantee
//! single use; this favors replay safety over reconnect convenience.

use std::fmt::Write;

use rand::Rng;
use sqlx::{PgPool, Row};
use uuid::Uuid;

pub(crate) fn bytes_to_hex(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(s, "{b:02x}");
    }
    s
}

/// Generate a short-lived 16-byte hex WS ticket.
#[must_use]
pub(crate) fn generate_ws_ticket() -> String {
    let bytes: [u8; 16] = rand::rng().random();
    bytes_to_hex(&bytes)
}

/// Authenticated identity resolved from a consumed ticket.
#[derive(Debug, Clone)]
pub struct TicketUser {
    pub id: Uuid,
    pub name: String,
}

/// Upsert a user row keyed by the external identity id and return our id.
///
/// # Errors
///
/// Returns a database error if the upsert fails.
pub async fn upsert_user(
    pool: &PgPool,
    external_id: &str,
    name: &str,
    email: Option<&str>,
) -> Result<Uuid, sqlx::Error> {
    let row = sqlx::query(
        "INSERT INTO users (id, external_id, name, email)
         VALUES ($1, $2, $3, $4)
         ON CONFLICT (external_id) DO UPDATE SET name = EXCLUDED.name, email = EXCLUDED.email
         RETURNING id",
    )
    .bind(Uuid::new_v4())
    .bind(external_id)
    .bind(name)
    .bind(email)
    .fetch_one(pool)
    .await?;

    Ok(row.get("id"))
}

/// Create a short-lived WS ticket for the given user.
///
/// # Errors
///
/// Returns a database error if the insert fails.
pub async fn create_ws_ticket(pool: &PgPool, user_id: Uuid) -> Result<String, sqlx::Error> {
    let ticket = generate_ws_ticket();
    sqlx::query("INSERT INTO ws_tickets (ticket, user_id) VALUES ($1, $2)")
        .bind(&ticket)
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(ticket)
}

/// Consume a WS ticket atomically, returning the user if still valid.
///
/// # Errors
///
/// Returns a database error if the delete/join fails.
pub async fn consume_ws_ticket(pool: &PgPool, ticket: &str) -> Result<Option<TicketUser>, sqlx::Error> {
    let row = sqlx::query(
        "WITH consumed AS (
             DELETE FROM ws_tickets
             WHERE ticket = $1 AND expires_at > now()
             RETURNING user_id
         )
         SELECT u.id, u.name FROM consumed c JOIN users u ON u.id = c.user_id",
    )
    .bind(ticket)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| TicketUser { id: r.get("id"), name: r.get("name") }))
}

/// Ephemeral display name for unauthenticated viewers.
#[must_use]
pub fn guest_name() -> String {
    let suffix: u16 = rand::rng().random_range(1000..10000);
    format!("Guest {suffix}")
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
