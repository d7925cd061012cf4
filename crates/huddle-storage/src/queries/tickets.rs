// SPDX-FileCopyrightText: 2026 Huddle Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ticket resolution: mapping transport chat identifiers to conversation
//! tickets.
//!
//! Tickets are owned by an external subsystem; the scheduler only reads
//! them. Chat identifiers arrive with transport-specific decoration
//! (`@s.whatsapp.net`, device suffixes) that must be stripped before
//! matching against the stored canonical key.

use huddle_core::HuddleError;
use rusqlite::params;

use crate::database::{Database, map_tr_err};
use crate::models::Ticket;

/// Transport suffixes that never distinguish conversations.
const TRANSPORT_SUFFIXES: [&str; 5] = [
    "@s.whatsapp.net",
    "@c.us",
    "@g.us",
    "@lid",
    "@broadcast",
];

/// Reduce a transport chat identifier to its canonical key.
///
/// Strips a known transport suffix and any numeric `:device` marker, so
/// `5511999990000:17@s.whatsapp.net` and `5511999990000@c.us` both
/// canonicalize to `5511999990000`. Unknown shapes pass through intact.
pub fn canonical_chat_key(chat_id: &str) -> String {
    let mut key = chat_id.trim();
    for suffix in TRANSPORT_SUFFIXES {
        if let Some(stripped) = key.strip_suffix(suffix) {
            key = stripped;
            break;
        }
    }
    if let Some((base, device)) = key.rsplit_once(':')
        && !device.is_empty()
        && device.bytes().all(|b| b.is_ascii_digit())
    {
        key = base;
    }
    key.to_string()
}

/// Resolve the ticket owning a chat, if one exists.
///
/// Tries an exact match on the canonical key first, then falls back to a
/// prefix match for keys that carry extra decoration the canonicalizer
/// does not know about. Returns `None` when the conversation has no
/// ticket yet -- callers decide the drop policy.
pub async fn resolve(
    db: &Database,
    chat_id: &str,
    client_id: &str,
) -> Result<Option<Ticket>, HuddleError> {
    let key = canonical_chat_key(chat_id);
    let client_id = client_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, chat_key, client_id, instance_id, created_at
                 FROM tickets WHERE chat_key = ?1 AND client_id = ?2
                 ORDER BY created_at ASC LIMIT 1",
            )?;
            match stmt.query_row(params![key, client_id], map_ticket_row) {
                Ok(ticket) => return Ok(Some(ticket)),
                Err(rusqlite::Error::QueryReturnedNoRows) => {}
                Err(e) => return Err(e.into()),
            }

            let mut stmt = conn.prepare(
                "SELECT id, chat_key, client_id, instance_id, created_at
                 FROM tickets WHERE client_id = ?2 AND chat_key LIKE ?1 || '%'
                 ORDER BY created_at ASC LIMIT 1",
            )?;
            match stmt.query_row(params![key, client_id], map_ticket_row) {
                Ok(ticket) => Ok(Some(ticket)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Insert a ticket. Operational/test seeding only -- production tickets
/// are provisioned by the external ticketing subsystem.
pub async fn insert(db: &Database, ticket: &Ticket) -> Result<(), HuddleError> {
    let ticket = ticket.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO tickets (id, chat_key, client_id, instance_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    ticket.id,
                    ticket.chat_key,
                    ticket.client_id,
                    ticket.instance_id,
                    ticket.created_at,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

fn map_ticket_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Ticket> {
    Ok(Ticket {
        id: row.get(0)?,
        chat_key: row.get(1)?,
        client_id: row.get(2)?,
        instance_id: row.get(3)?,
        created_at: row.get(4)?,
    })
}
