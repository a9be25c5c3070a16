//! Release-control toggle: flips the student-facing visibility flag on a
//! single grade or on every member of a group snapshot. The bulk path is
//! gated by the incomplete-grades precondition before any write happens.

use log::warn;
use rusqlite::Connection;

use crate::aggregate::is_complete;
use crate::fetch::GradeRow;

#[derive(Debug, Clone, PartialEq)]
pub enum ReleaseOutcome {
    Applied {
        updated: usize,
    },
    /// Some per-id writes failed after the precondition passed. Never
    /// collapsed into a plain success.
    PartialFailure {
        updated: usize,
        failed_ids: Vec<String>,
    },
    /// Rejected before any write: releasing a group with incomplete
    /// grades is not allowed.
    PreconditionFailed {
        incomplete_ids: Vec<String>,
    },
}

/// Single-record toggle. Writing the already-current value is a no-op
/// that still succeeds. Returns false when no such grade exists.
pub fn set_released(conn: &Connection, grade_id: &str, value: bool) -> anyhow::Result<bool> {
    let changed = conn.execute(
        "UPDATE grades SET is_released = ? WHERE id = ?",
        (value as i64, grade_id),
    )?;
    Ok(changed > 0)
}

/// Apply one release value to every member of a group snapshot.
///
/// The check-then-act is not atomic against concurrent external writers;
/// the snapshot the caller grouped over is the authority for membership
/// and for the precondition.
pub fn set_released_for_group(
    conn: &Connection,
    members: &[GradeRow],
    value: bool,
) -> ReleaseOutcome {
    if value {
        let incomplete_ids: Vec<String> = members
            .iter()
            .filter(|g| !is_complete(g))
            .map(|g| g.id.clone())
            .collect();
        if !incomplete_ids.is_empty() {
            return ReleaseOutcome::PreconditionFailed { incomplete_ids };
        }
    }

    let mut updated = 0usize;
    let mut failed_ids = Vec::new();
    for g in members {
        match conn.execute(
            "UPDATE grades SET is_released = ? WHERE id = ?",
            (value as i64, g.id.as_str()),
        ) {
            // A member deleted between snapshot and write matches no row;
            // that is a failure for this id, not a silent success.
            Ok(0) => {
                warn!("release toggle matched no row for grade {}", g.id);
                failed_ids.push(g.id.clone());
            }
            Ok(_) => updated += 1,
            Err(e) => {
                warn!("release toggle failed for grade {}: {}", g.id, e);
                failed_ids.push(g.id.clone());
            }
        }
    }

    if failed_ids.is_empty() {
        ReleaseOutcome::Applied { updated }
    } else {
        ReleaseOutcome::PartialFailure {
            updated,
            failed_ids,
        }
    }
}
