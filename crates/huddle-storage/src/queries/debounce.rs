// SPDX-FileCopyrightText: 2026 Huddle Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-ticket debounce window operations.
//!
//! Arming, extension, and firing all go through conditional single-row
//! updates; the affected-row count is the sole arbiter of who fires.

use huddle_core::HuddleError;
use rusqlite::params;

use crate::database::{Database, map_tr_err};
use crate::models::DebounceState;

/// Arm the ticket's window, or extend it if already armed.
///
/// Always overwrites `debounce_until` (trailing-edge debounce: the window
/// tracks the *last* message) and resets the dispatch attempt budget --
/// a fresh burst deserves fresh retries.
pub async fn arm_or_extend(
    db: &Database,
    ticket_id: &str,
    until: &str,
    now: &str,
) -> Result<(), HuddleError> {
    let ticket_id = ticket_id.to_string();
    let until = until.to_string();
    let now = now.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO debounce_states
                     (ticket_id, scheduled, debounce_until, dispatch_attempts, last_updated)
                 VALUES (?1, 1, ?2, 0, ?3)
                 ON CONFLICT(ticket_id) DO UPDATE SET
                     scheduled = 1,
                     debounce_until = excluded.debounce_until,
                     dispatch_attempts = 0,
                     last_updated = excluded.last_updated",
                params![ticket_id, until, now],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Read the ticket's window state.
pub async fn get_state(
    db: &Database,
    ticket_id: &str,
) -> Result<Option<DebounceState>, HuddleError> {
    let ticket_id = ticket_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT ticket_id, scheduled, debounce_until, dispatch_attempts, last_updated
                 FROM debounce_states WHERE ticket_id = ?1",
            )?;
            match stmt.query_row(params![ticket_id], map_state_row) {
                Ok(state) => Ok(Some(state)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Attempt to win fire rights for an expired window.
///
/// Succeeds only if the window is armed and its deadline has passed as of
/// `now`; a concurrent extension or a faster worker makes this a no-op.
pub async fn claim_fire(db: &Database, ticket_id: &str, now: &str) -> Result<bool, HuddleError> {
    let ticket_id = ticket_id.to_string();
    let now = now.to_string();
    db.connection()
        .call(move |conn| {
            let n = conn.execute(
                "UPDATE debounce_states SET scheduled = 0, last_updated = ?2
                 WHERE ticket_id = ?1 AND scheduled = 1 AND debounce_until <= ?2",
                params![ticket_id, now],
            )?;
            Ok(n == 1)
        })
        .await
        .map_err(map_tr_err)
}

/// Re-arm the window after a failed dispatch, counting the attempt.
///
/// The update is conditional on `dispatch_attempts` still being under
/// `max_attempts`. Returns the new attempt count, or `None` when the cap
/// is reached and the window stays disarmed.
pub async fn rearm_for_retry(
    db: &Database,
    ticket_id: &str,
    until: &str,
    max_attempts: i64,
    now: &str,
) -> Result<Option<i64>, HuddleError> {
    let ticket_id = ticket_id.to_string();
    let until = until.to_string();
    let now = now.to_string();
    db.connection()
        .call(move |conn| {
            let n = conn.execute(
                "UPDATE debounce_states
                 SET scheduled = 1, debounce_until = ?2,
                     dispatch_attempts = dispatch_attempts + 1, last_updated = ?4
                 WHERE ticket_id = ?1 AND dispatch_attempts < ?3",
                params![ticket_id, until, max_attempts, now],
            )?;
            if n == 0 {
                return Ok(None);
            }
            let attempts: i64 = conn.query_row(
                "SELECT dispatch_attempts FROM debounce_states WHERE ticket_id = ?1",
                params![ticket_id],
                |row| row.get(0),
            )?;
            Ok(Some(attempts))
        })
        .await
        .map_err(map_tr_err)
}

/// Clear the attempt counter after a successful dispatch.
pub async fn reset_attempts(db: &Database, ticket_id: &str, now: &str) -> Result<(), HuddleError> {
    let ticket_id = ticket_id.to_string();
    let now = now.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE debounce_states SET dispatch_attempts = 0, last_updated = ?2
                 WHERE ticket_id = ?1",
                params![ticket_id, now],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Tickets whose windows are armed and due as of `now`, oldest deadline
/// first, bounded to `limit` (the cron scan working set).
pub async fn due_tickets(db: &Database, now: &str, limit: i64) -> Result<Vec<String>, HuddleError> {
    let now = now.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT ticket_id FROM debounce_states
                 WHERE scheduled = 1 AND debounce_until <= ?1
                 ORDER BY debounce_until ASC LIMIT ?2",
            )?;
            let rows = stmt.query_map(params![now, limit], |row| row.get(0))?;
            let mut tickets = Vec::new();
            for row in rows {
                tickets.push(row?);
            }
            Ok(tickets)
        })
        .await
        .map_err(map_tr_err)
}

/// Count windows armed but unfired past the staleness cutoff (lost
/// workers). These are exactly what the cron scan unsticks.
pub async fn count_stuck(db: &Database, cutoff: &str) -> Result<i64, HuddleError> {
    let cutoff = cutoff.to_string();
    db.connection()
        .call(move |conn| {
            let n: i64 = conn.query_row(
                "SELECT COUNT(*) FROM debounce_states
                 WHERE scheduled = 1 AND debounce_until <= ?1",
                params![cutoff],
                |row| row.get(0),
            )?;
            Ok(n)
        })
        .await
        .map_err(map_tr_err)
}

/// Tickets left disarmed with an exhausted attempt budget. Recovery
/// re-arms these so a persistently failing dispatcher cannot strand a
/// conversation forever.
pub async fn exhausted_tickets(
    db: &Database,
    max_attempts: i64,
    limit: i64,
) -> Result<Vec<String>, HuddleError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT ticket_id FROM debounce_states
                 WHERE scheduled = 0 AND dispatch_attempts >= ?1
                 ORDER BY last_updated ASC LIMIT ?2",
            )?;
            let rows = stmt.query_map(params![max_attempts, limit], |row| row.get(0))?;
            let mut tickets = Vec::new();
            for row in rows {
                tickets.push(row?);
            }
            Ok(tickets)
        })
        .await
        .map_err(map_tr_err)
}

fn map_state_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DebounceState> {
    let scheduled: i64 = row.get(1)?;
    Ok(DebounceState {
        ticket_id: row.get(0)?,
        scheduled: scheduled != 0,
        debounce_until: row.get(2)?,
        dispatch_attempts: row.get(3)?,
        last_updated: row.get(4)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{now_rfc3339, rfc3339_after};
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    #[tokio::test]
    async fn arm_creates_then_extend_overwrites_deadline() {
        let (db, _dir) = setup_db().await;

        let first = rfc3339_after(10);
        arm_or_extend(&db, "t-1", &first, &now_rfc3339()).await.unwrap();
        let state = get_state(&db, "t-1").await.unwrap().unwrap();
        assert!(state.scheduled);
        assert_eq!(state.debounce_until, first);

        let later = rfc3339_after(20);
        arm_or_extend(&db, "t-1", &later, &now_rfc3339()).await.unwrap();
        let state = get_state(&db, "t-1").await.unwrap().unwrap();
        assert_eq!(state.debounce_until, later, "extension wins");

        // Still exactly one row.
        let count: i64 = db
            .connection()
            .call(|conn| {
                conn.query_row("SELECT COUNT(*) FROM debounce_states", [], |row| row.get(0))
                    .map_err::<rusqlite::Error, _>(Into::into)
            })
            .await
            .unwrap();
        assert_eq!(count, 1);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn arm_resets_attempt_budget() {
        let (db, _dir) = setup_db().await;
        arm_or_extend(&db, "t-1", &rfc3339_after(-1), &now_rfc3339())
            .await
            .unwrap();
        assert!(claim_fire(&db, "t-1", &now_rfc3339()).await.unwrap());
        let attempts = rearm_for_retry(&db, "t-1", &rfc3339_after(5), 3, &now_rfc3339())
            .await
            .unwrap();
        assert_eq!(attempts, Some(1));

        // A new batch arming the window wipes the count.
        arm_or_extend(&db, "t-1", &rfc3339_after(10), &now_rfc3339())
            .await
            .unwrap();
        let state = get_state(&db, "t-1").await.unwrap().unwrap();
        assert_eq!(state.dispatch_attempts, 0);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn fire_claim_requires_armed_and_due() {
        let (db, _dir) = setup_db().await;

        // Not armed at all.
        assert!(!claim_fire(&db, "missing", &now_rfc3339()).await.unwrap());

        // Armed but not yet due.
        arm_or_extend(&db, "t-1", &rfc3339_after(60), &now_rfc3339())
            .await
            .unwrap();
        assert!(!claim_fire(&db, "t-1", &now_rfc3339()).await.unwrap());

        // Due now.
        arm_or_extend(&db, "t-1", &rfc3339_after(-1), &now_rfc3339())
            .await
            .unwrap();
        assert!(claim_fire(&db, "t-1", &now_rfc3339()).await.unwrap());

        // Consumed: second attempt loses.
        assert!(!claim_fire(&db, "t-1", &now_rfc3339()).await.unwrap());

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn fire_claim_is_exclusive_under_contention() {
        let (db, _dir) = setup_db().await;
        arm_or_extend(&db, "t-1", &rfc3339_after(-1), &now_rfc3339())
            .await
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..10 {
            let db = db.clone();
            handles.push(tokio::spawn(async move {
                claim_fire(&db, "t-1", &now_rfc3339()).await.unwrap()
            }));
        }
        let mut won = 0;
        for handle in handles {
            if handle.await.unwrap() {
                won += 1;
            }
        }
        assert_eq!(won, 1, "exactly one worker may fire");

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn rearm_stops_at_the_attempt_cap() {
        let (db, _dir) = setup_db().await;
        arm_or_extend(&db, "t-1", &rfc3339_after(-1), &now_rfc3339())
            .await
            .unwrap();

        for expected in 1..=3 {
            assert!(claim_fire(&db, "t-1", &now_rfc3339()).await.unwrap());
            let attempts = rearm_for_retry(&db, "t-1", &rfc3339_after(-1), 3, &now_rfc3339())
                .await
                .unwrap();
            assert_eq!(attempts, Some(expected));
        }

        // Budget spent: the conditional update refuses.
        assert!(claim_fire(&db, "t-1", &now_rfc3339()).await.unwrap());
        let attempts = rearm_for_retry(&db, "t-1", &rfc3339_after(-1), 3, &now_rfc3339())
            .await
            .unwrap();
        assert_eq!(attempts, None);

        let state = get_state(&db, "t-1").await.unwrap().unwrap();
        assert!(!state.scheduled, "window stays disarmed once exhausted");
        assert_eq!(state.dispatch_attempts, 3);

        let exhausted = exhausted_tickets(&db, 3, 10).await.unwrap();
        assert_eq!(exhausted, vec!["t-1".to_string()]);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn reset_attempts_clears_the_counter() {
        let (db, _dir) = setup_db().await;
        arm_or_extend(&db, "t-1", &rfc3339_after(-1), &now_rfc3339())
            .await
            .unwrap();
        assert!(claim_fire(&db, "t-1", &now_rfc3339()).await.unwrap());
        rearm_for_retry(&db, "t-1", &rfc3339_after(-1), 5, &now_rfc3339())
            .await
            .unwrap();

        reset_attempts(&db, "t-1", &now_rfc3339()).await.unwrap();
        let state = get_state(&db, "t-1").await.unwrap().unwrap();
        assert_eq!(state.dispatch_attempts, 0);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn due_tickets_selects_only_armed_and_expired() {
        let (db, _dir) = setup_db().await;

        arm_or_extend(&db, "due-late", &rfc3339_after(-5), &now_rfc3339())
            .await
            .unwrap();
        arm_or_extend(&db, "due-early", &rfc3339_after(-60), &now_rfc3339())
            .await
            .unwrap();
        arm_or_extend(&db, "future", &rfc3339_after(60), &now_rfc3339())
            .await
            .unwrap();
        arm_or_extend(&db, "fired", &rfc3339_after(-30), &now_rfc3339())
            .await
            .unwrap();
        assert!(claim_fire(&db, "fired", &now_rfc3339()).await.unwrap());

        let due = due_tickets(&db, &now_rfc3339(), 10).await.unwrap();
        assert_eq!(due, vec!["due-early".to_string(), "due-late".to_string()]);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn count_stuck_uses_the_cutoff() {
        let (db, _dir) = setup_db().await;
        arm_or_extend(&db, "stuck", &rfc3339_after(-600), &now_rfc3339())
            .await
            .unwrap();
        arm_or_extend(&db, "barely-due", &rfc3339_after(-1), &now_rfc3339())
            .await
            .unwrap();

        assert_eq!(count_stuck(&db, &rfc3339_after(-300)).await.unwrap(), 1);
        assert_eq!(count_stuck(&db, &now_rfc3339()).await.unwrap(), 2);

        db.close().await.unwrap();
    }
}
