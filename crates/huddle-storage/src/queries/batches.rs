// SPDX-FileCopyrightText: 2026 Huddle Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message batch operations: ingestion, claims, and orphan repair.
//!
//! The claim is the only mutual-exclusion mechanism in the system: a
//! single conditional `UPDATE` whose affected-row count decides ownership.
//! No lock table, no transaction spanning reads and writes.

use huddle_core::HuddleError;
use rusqlite::params;

use crate::database::{Database, map_tr_err};
use crate::models::{BatchCounters, MessageBatch, RawMessage};

/// Append a message to the chat's open batch, creating one if none exists.
///
/// Returns the batch id. Messages keep arrival order (JSON array append).
/// An open batch is one that is neither claimed nor processed; a chat has
/// at most one at a time on this path.
pub async fn append_message(
    db: &Database,
    chat_id: &str,
    client_id: &str,
    instance_id: &str,
    message: &RawMessage,
) -> Result<String, HuddleError> {
    let chat_id = chat_id.to_string();
    let client_id = client_id.to_string();
    let instance_id = instance_id.to_string();
    let payload = serde_json::to_string(message)
        .map_err(|e| HuddleError::Internal(format!("unencodable message: {e}")))?;
    let now = crate::clock::now_rfc3339();

    db.connection()
        .call(move |conn| {
            let open: Option<String> = match conn.query_row(
                "SELECT id FROM message_batches
                 WHERE chat_id = ?1 AND client_id = ?2
                   AND processed_at IS NULL AND processing_started_at IS NULL
                 ORDER BY created_at ASC LIMIT 1",
                params![chat_id, client_id],
                |row| row.get(0),
            ) {
                Ok(id) => Some(id),
                Err(rusqlite::Error::QueryReturnedNoRows) => None,
                Err(e) => return Err(e.into()),
            };

            match open {
                Some(id) => {
                    conn.execute(
                        "UPDATE message_batches
                         SET messages = json_insert(messages, '$[#]', json(?2)),
                             last_updated = ?3
                         WHERE id = ?1",
                        params![id, payload, now],
                    )?;
                    Ok(id)
                }
                None => {
                    let id = uuid::Uuid::new_v4().to_string();
                    conn.execute(
                        "INSERT INTO message_batches
                             (id, chat_id, client_id, instance_id, messages,
                              created_at, last_updated)
                         VALUES (?1, ?2, ?3, ?4, json_array(json(?5)), ?6, ?6)",
                        params![id, chat_id, client_id, instance_id, payload, now],
                    )?;
                    Ok(id)
                }
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Select up to `limit` unclaimed batches in creation order.
///
/// With `orphaned_before`, restricts to batches created at or before the
/// cutoff (the orphan sweep path).
pub async fn select_unclaimed(
    db: &Database,
    limit: i64,
    orphaned_before: Option<&str>,
) -> Result<Vec<MessageBatch>, HuddleError> {
    let cutoff = orphaned_before.map(|s| s.to_string());
    db.connection()
        .call(move |conn| {
            let mut batches = Vec::new();
            match &cutoff {
                Some(cutoff) => {
                    let mut stmt = conn.prepare(
                        "SELECT id, chat_id, client_id, instance_id, messages,
                                created_at, last_updated, processing_started_at,
                                processing_by, processed_at
                         FROM message_batches
                         WHERE processed_at IS NULL AND processing_started_at IS NULL
                           AND created_at <= ?1
                         ORDER BY created_at ASC LIMIT ?2",
                    )?;
                    let rows = stmt.query_map(params![cutoff, limit], map_batch_row)?;
                    for row in rows {
                        batches.push(row?);
                    }
                }
                None => {
                    let mut stmt = conn.prepare(
                        "SELECT id, chat_id, client_id, instance_id, messages,
                                created_at, last_updated, processing_started_at,
                                processing_by, processed_at
                         FROM message_batches
                         WHERE processed_at IS NULL AND processing_started_at IS NULL
                         ORDER BY created_at ASC LIMIT ?1",
                    )?;
                    let rows = stmt.query_map(params![limit], map_batch_row)?;
                    for row in rows {
                        batches.push(row?);
                    }
                }
            }
            Ok(batches)
        })
        .await
        .map_err(map_tr_err)
}

/// Attempt to claim a batch for `claimant`.
///
/// Returns `true` only for the caller whose conditional update modified
/// the row; every concurrent contender gets `false` and must skip.
pub async fn claim(
    db: &Database,
    id: &str,
    claimant: &str,
    now: &str,
) -> Result<bool, HuddleError> {
    let id = id.to_string();
    let claimant = claimant.to_string();
    let now = now.to_string();
    db.connection()
        .call(move |conn| {
            let n = conn.execute(
                "UPDATE message_batches
                 SET processing_started_at = ?2, processing_by = ?3, last_updated = ?2
                 WHERE id = ?1 AND processing_started_at IS NULL AND processed_at IS NULL",
                params![id, now, claimant],
            )?;
            Ok(n == 1)
        })
        .await
        .map_err(map_tr_err)
}

/// Mark a batch processed (handed off to the debounce window). Terminal.
pub async fn mark_processed(db: &Database, id: &str, now: &str) -> Result<(), HuddleError> {
    let id = id.to_string();
    let now = now.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE message_batches SET processed_at = ?2, last_updated = ?2
                 WHERE id = ?1 AND processed_at IS NULL",
                params![id, now],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Fetch a single batch by id.
pub async fn get_batch(db: &Database, id: &str) -> Result<Option<MessageBatch>, HuddleError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, chat_id, client_id, instance_id, messages,
                        created_at, last_updated, processing_started_at,
                        processing_by, processed_at
                 FROM message_batches WHERE id = ?1",
            )?;
            match stmt.query_row(params![id], map_batch_row) {
                Ok(batch) => Ok(Some(batch)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Release claims held since before `claimed_before` on still-unprocessed
/// batches (crashed scanner). The batches become claimable again.
///
/// Returns the number of claims released.
pub async fn clear_stale_claims(
    db: &Database,
    claimed_before: &str,
    now: &str,
) -> Result<i64, HuddleError> {
    let claimed_before = claimed_before.to_string();
    let now = now.to_string();
    db.connection()
        .call(move |conn| {
            let n = conn.execute(
                "UPDATE message_batches
                 SET processing_started_at = NULL, processing_by = NULL, last_updated = ?2
                 WHERE processed_at IS NULL
                   AND processing_started_at IS NOT NULL
                   AND processing_started_at <= ?1",
                params![claimed_before, now],
            )?;
            Ok(n as i64)
        })
        .await
        .map_err(map_tr_err)
}

/// Force-mark batches created at or before `created_before` as processed,
/// stopping starvation loops. Returns the number of batches closed.
pub async fn force_process_older_than(
    db: &Database,
    created_before: &str,
    now: &str,
) -> Result<i64, HuddleError> {
    let created_before = created_before.to_string();
    let now = now.to_string();
    db.connection()
        .call(move |conn| {
            let n = conn.execute(
                "UPDATE message_batches SET processed_at = ?2, last_updated = ?2
                 WHERE processed_at IS NULL AND created_at <= ?1",
                params![created_before, now],
            )?;
            Ok(n as i64)
        })
        .await
        .map_err(map_tr_err)
}

/// Aggregate counts for health monitoring. `orphan_cutoff` bounds the age
/// past which a pending batch counts as orphaned.
pub async fn counters(db: &Database, orphan_cutoff: &str) -> Result<BatchCounters, HuddleError> {
    let cutoff = orphan_cutoff.to_string();
    db.connection()
        .call(move |conn| {
            let pending: i64 = conn.query_row(
                "SELECT COUNT(*) FROM message_batches
                 WHERE processed_at IS NULL AND processing_started_at IS NULL",
                [],
                |row| row.get(0),
            )?;
            let processing: i64 = conn.query_row(
                "SELECT COUNT(*) FROM message_batches
                 WHERE processed_at IS NULL AND processing_started_at IS NOT NULL",
                [],
                |row| row.get(0),
            )?;
            let orphaned: i64 = conn.query_row(
                "SELECT COUNT(*) FROM message_batches
                 WHERE processed_at IS NULL AND processing_started_at IS NULL
                   AND created_at <= ?1",
                params![cutoff],
                |row| row.get(0),
            )?;
            Ok(BatchCounters {
                pending,
                processing,
                orphaned,
            })
        })
        .await
        .map_err(map_tr_err)
}

fn map_batch_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<MessageBatch> {
    let messages_json: String = row.get(4)?;
    let messages: Vec<RawMessage> = serde_json::from_str(&messages_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(MessageBatch {
        id: row.get(0)?,
        chat_id: row.get(1)?,
        client_id: row.get(2)?,
        instance_id: row.get(3)?,
        messages,
        created_at: row.get(5)?,
        last_updated: row.get(6)?,
        processing_started_at: row.get(7)?,
        processing_by: row.get(8)?,
        processed_at: row.get(9)?,
    })
}
