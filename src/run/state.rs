//! Shared-state and activity merging.
//!
//! Snapshots replace wholesale; deltas mutate incrementally. Delta operations
//! apply in the fixed order add, update, remove, so a frame can replace an
//! item by id within itself. Updates and removes referencing unknown ids are
//! dropped silently, keeping the merge idempotent under replays.

use crate::protocol::{ActivityPatch, ActivityState, CanvasItem, StateDeltaOps};
use crate::run::session::CanvasState;
use tracing::debug;

/// Replace the canvas wholesale.
pub fn apply_state_snapshot(canvas: &mut CanvasState, items: Vec<CanvasItem>) {
    canvas.items = items;
}

/// Apply one delta frame: add, then update, then remove.
pub fn apply_state_delta(canvas: &mut CanvasState, ops: &StateDeltaOps) {
    for item in &ops.add {
        match canvas.items.iter_mut().find(|existing| existing.id == item.id) {
            // Re-adding an existing id replaces it in place; ids stay unique.
            Some(existing) => *existing = item.clone(),
            None => canvas.items.push(item.clone()),
        }
    }
    for item in &ops.update {
        match canvas.items.iter_mut().find(|existing| existing.id == item.id) {
            Some(existing) => *existing = item.clone(),
            None => debug!(id = %item.id, "update for unknown canvas item dropped"),
        }
    }
    for id in &ops.remove {
        let before = canvas.items.len();
        canvas.items.retain(|item| item.id != *id);
        if canvas.items.len() == before {
            debug!(%id, "remove for unknown canvas item dropped");
        }
    }
}

/// Replace the activity state wholesale.
pub fn apply_activity_snapshot(activity: &mut ActivityState, snapshot: ActivityState) {
    *activity = snapshot;
}

/// Patch the activity state field-wise; absent fields keep their prior value.
pub fn apply_activity_patch(activity: &mut ActivityState, patch: &ActivityPatch) {
    if let Some(status) = patch.status {
        activity.status = status;
    }
    if let Some(description) = &patch.description {
        activity.description = description.clone();
    }
    if let Some(progress) = patch.progress {
        activity.progress = Some(progress);
    }
}
