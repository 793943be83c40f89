//! Streaming tool-call assembly.
//!
//! Argument deltas are accumulated as an append-only character buffer and only
//! parsed at finalize time, because they may arrive in partial-JSON chunks
//! that are valid only once complete. A parse failure degrades to
//! `arguments: None` with the raw buffer retained; the call stays open for a
//! later result or error.

use crate::error::AssemblyError;
use crate::protocol::AgUiEvent;
use crate::run::session::{ToolCallRecord, ToolCallStatus};
use serde_json::Value;
use tracing::debug;

/// Transient accumulator for one in-flight tool call.
#[derive(Debug)]
struct ToolCallFragmentState {
    call_id: String,
    tool_name: String,
    args: String,
    started_at_us: u64,
}

impl ToolCallFragmentState {
    /// Parse the accumulated argument buffer into a pending record.
    fn finalize(self) -> ToolCallRecord {
        let (arguments, error) = parse_arguments(&self.args);
        ToolCallRecord {
            id: self.call_id,
            tool_name: self.tool_name,
            arguments,
            raw_arguments: self.args,
            result: None,
            error,
            status: ToolCallStatus::Pending,
            started_at_us: self.started_at_us,
            completed_at_us: None,
        }
    }
}

fn parse_arguments(buffer: &str) -> (Option<Value>, Option<String>) {
    if buffer.trim().is_empty() {
        return (Some(Value::Object(serde_json::Map::new())), None);
    }
    match serde_json::from_str(buffer) {
        Ok(value) => (Some(value), None),
        Err(err) => (None, Some(format!("unparseable tool arguments: {err}"))),
    }
}

/// State machine turning tool-call fragment events into [`ToolCallRecord`]s.
///
/// Records are handed to the caller at END time; RESULT and error events are
/// applied by the caller against its record list via [`complete_success`] /
/// [`complete_error`].
///
/// [`complete_success`]: ToolCallAssembler::complete_success
/// [`complete_error`]: ToolCallAssembler::complete_error
#[derive(Debug, Default)]
pub struct ToolCallAssembler {
    open: Option<ToolCallFragmentState>,
}

impl ToolCallAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_open_fragment(&self) -> bool {
        self.open.is_some()
    }

    /// Apply one event; returns any records finalized by it, in order.
    pub fn apply(&mut self, event: &AgUiEvent, timestamp_ms: u64) -> Vec<ToolCallRecord> {
        match event {
            AgUiEvent::ToolCallStart {
                tool_call_id,
                tool_call_name,
                ..
            } => {
                let mut finalized = Vec::new();
                if let Some(stale) = self.open.take() {
                    if stale.call_id == *tool_call_id {
                        self.open = Some(stale);
                        return finalized;
                    }
                    debug!(
                        stale_id = %stale.call_id,
                        new_id = %tool_call_id,
                        "implicit end of stale tool call fragment"
                    );
                    finalized.push(stale.finalize());
                }
                self.open = Some(ToolCallFragmentState {
                    call_id: tool_call_id.clone(),
                    tool_name: tool_call_name.clone(),
                    args: String::new(),
                    started_at_us: timestamp_ms.saturating_mul(1000),
                });
                finalized
            }
            AgUiEvent::ToolCallArgs {
                tool_call_id,
                delta,
            } => {
                match self.open.as_mut() {
                    Some(open) if open.call_id == *tool_call_id => open.args.push_str(delta),
                    _ => self.note_orphan(tool_call_id),
                }
                Vec::new()
            }
            AgUiEvent::ToolCallEnd { tool_call_id } => match self.open.take() {
                Some(open) if open.call_id == *tool_call_id => vec![open.finalize()],
                other => {
                    self.open = other;
                    self.note_orphan(tool_call_id);
                    Vec::new()
                }
            },
            _ => Vec::new(),
        }
    }

    /// Close the open fragment for `call_id` if one exists.
    ///
    /// Used when a result or error arrives without an explicit END.
    pub fn close_if_open(&mut self, call_id: &str) -> Option<ToolCallRecord> {
        match self.open.take() {
            Some(open) if open.call_id == call_id => Some(open.finalize()),
            other => {
                self.open = other;
                None
            }
        }
    }

    /// Finalize any open fragment (run termination or cancellation flush).
    pub fn flush(&mut self) -> Option<ToolCallRecord> {
        self.open.take().map(ToolCallFragmentState::finalize)
    }

    pub fn reset(&mut self) {
        self.open = None;
    }

    /// Attach a result to a finalized record: pending → success.
    ///
    /// `timestamp_ms` is the completing event's timestamp, so both endpoints
    /// of the duration share the event timeline.
    pub fn complete_success(record: &mut ToolCallRecord, result: Value, timestamp_ms: u64) {
        record.result = Some(result);
        record.status = ToolCallStatus::Success;
        record.completed_at_us = Some(timestamp_ms.saturating_mul(1000));
    }

    /// Mark a finalized record failed: pending → error.
    pub fn complete_error(record: &mut ToolCallRecord, message: String, timestamp_ms: u64) {
        record.error = Some(message);
        record.status = ToolCallStatus::Error;
        record.completed_at_us = Some(timestamp_ms.saturating_mul(1000));
    }

    fn note_orphan(&self, call_id: &str) {
        let err = AssemblyError::OrphanFragment {
            id: call_id.to_string(),
        };
        debug!(error = %err, "ignoring out-of-order tool call event");
    }
}
