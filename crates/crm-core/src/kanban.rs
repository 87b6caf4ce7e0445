//! Kanban position reindexer.
//!
//! Every status column keeps its contacts at the dense positions
//! `0..N-1`. Moving a card shifts only the siblings between the old and
//! the new slot, and the whole move is committed as one unit of work.
//!
//! The work is split in two:
//!
//! - [`plan_move`] is pure: given the moved contact's placement and the
//!   sibling lists, it returns every row that has to change.
//! - [`move_contact`] runs the plan against a [`Store`]: read, plan, write,
//!   commit. Any failure before the commit leaves the store untouched.
//!
//! Requested positions past the end of the target column are clamped to
//! the end, so a successful move never opens a gap.

use serde::{Deserialize, Serialize};

use crate::error::{CrmError, CrmResult, Entity};
use crate::models::{ContactPlacement, PositionUpdate, Sibling};
use crate::store::Store;

/// Request body of `POST /api/v1/kanban/move`.
#[derive(Debug, Clone, Deserialize)]
pub struct MoveRequest {
    pub contact_id: String,
    pub status_id: String,
    pub position: i64,
}

/// The moved contact's new placement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MoveOutcome {
    pub id: String,
    pub status_id: String,
    pub sort_order_in_status: i64,
}

/// Rows to write for one move. The moved contact's own write is last.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovePlan {
    /// Effective target position after clamping.
    pub position: i64,
    pub updates: Vec<PositionUpdate>,
}

/// Compute the sibling shifts for moving `current` to
/// (`target_status_id`, `requested_position`).
///
/// `source_siblings` is the contact's current column and is only read for
/// cross-column moves; `target_siblings` is the target column. Both lists
/// may contain the moved contact, which is skipped.
pub fn plan_move(
    current: &ContactPlacement,
    target_status_id: &str,
    requested_position: i64,
    source_siblings: &[Sibling],
    target_siblings: &[Sibling],
) -> MovePlan {
    let moved = current.contact_id.as_str();
    let others = |list: &[Sibling]| -> Vec<Sibling> {
        list.iter()
            .filter(|s| s.contact_id != moved)
            .cloned()
            .collect()
    };

    let target_others = others(target_siblings);
    let position = requested_position.clamp(0, target_others.len() as i64);
    let old = current.position;
    let mut updates = Vec::new();

    let shift = |s: &Sibling, status_id: &str, delta: i64| PositionUpdate {
        contact_id: s.contact_id.clone(),
        status_id: status_id.to_string(),
        position: s.position + delta,
    };

    if current.status_id.as_deref() == Some(target_status_id) {
        if old < position {
            updates.extend(
                target_others
                    .iter()
                    .filter(|s| s.position > old && s.position <= position)
                    .map(|s| shift(s, target_status_id, -1)),
            );
        } else if old > position {
            updates.extend(
                target_others
                    .iter()
                    .filter(|s| s.position >= position && s.position < old)
                    .map(|s| shift(s, target_status_id, 1)),
            );
        }
    } else {
        if let Some(source_status_id) = current.status_id.as_deref() {
            updates.extend(
                others(source_siblings)
                    .iter()
                    .filter(|s| s.position > old)
                    .map(|s| shift(s, source_status_id, -1)),
            );
        }
        updates.extend(
            target_others
                .iter()
                .filter(|s| s.position >= position)
                .map(|s| shift(s, target_status_id, 1)),
        );
    }

    updates.push(PositionUpdate {
        contact_id: current.contact_id.clone(),
        status_id: target_status_id.to_string(),
        position,
    });

    MovePlan { position, updates }
}

/// Shifts that close the gap left when a contact leaves a column.
///
/// Used by contact deletion and by status changes made outside the board.
pub fn plan_removal(
    status_id: &str,
    removed: &ContactPlacement,
    siblings: &[Sibling],
) -> Vec<PositionUpdate> {
    siblings
        .iter()
        .filter(|s| s.contact_id != removed.contact_id && s.position > removed.position)
        .map(|s| PositionUpdate {
            contact_id: s.contact_id.clone(),
            status_id: status_id.to_string(),
            position: s.position - 1,
        })
        .collect()
}

/// Move a contact to a status column and position, atomically.
///
/// Fails with [`CrmError::NotFound`] before any write if the contact or the
/// status does not exist, and with [`CrmError::Transaction`] if a write or
/// the commit fails (nothing is applied in that case).
pub async fn move_contact(store: &dyn Store, request: &MoveRequest) -> CrmResult<MoveOutcome> {
    if request.position < 0 {
        return Err(CrmError::invalid(format!(
            "position must be >= 0, got {}",
            request.position
        )));
    }

    let mut tx = store.begin().await.map_err(CrmError::Transaction)?;

    let current = tx
        .get_contact(&request.contact_id)
        .await?
        .ok_or_else(|| CrmError::not_found(Entity::Contact, &request.contact_id))?;

    if tx.get_status(&request.status_id).await?.is_none() {
        return Err(CrmError::not_found(Entity::Status, &request.status_id));
    }

    let source_siblings = match current.status_id.as_deref() {
        Some(source) if source != request.status_id => tx.list_siblings(source).await?,
        _ => Vec::new(),
    };
    let target_siblings = tx.list_siblings(&request.status_id).await?;

    let plan = plan_move(
        &current,
        &request.status_id,
        request.position,
        &source_siblings,
        &target_siblings,
    );

    for update in &plan.updates {
        tx.update_position(&update.contact_id, &update.status_id, update.position)
            .await
            .map_err(CrmError::Transaction)?;
    }
    tx.commit().await.map_err(CrmError::Transaction)?;

    Ok(MoveOutcome {
        id: current.contact_id,
        status_id: request.status_id.clone(),
        sort_order_in_status: plan.position,
    })
}
