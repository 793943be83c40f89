//! Domain model for one agent run.
//!
//! These are the finalized, UI-facing shapes derived from the raw event
//! stream. All mutation flows through the controller's dispatch path; external
//! readers treat them as read-only snapshots.

use crate::protocol::{ActivityState, CanvasItem, MessageRole, RawEvent};
use crate::run::consolidate::ConsolidatedEvent;
use serde::Serialize;

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// A finalized chat message. Immutable after creation.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Message {
    pub id: String,
    pub role: MessageRole,
    /// Full assembled text.
    pub content: String,
    /// Assembled reasoning trace, when the backend streamed one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking_content: Option<String>,
    /// Always false once finalized; kept for UI symmetry with in-flight views.
    pub is_streaming: bool,
    /// Receipt time of the opening fragment, unix milliseconds.
    pub created_at_ms: u64,
}

// ---------------------------------------------------------------------------
// Tool calls
// ---------------------------------------------------------------------------

/// Lifecycle status of one tool invocation.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallStatus {
    Pending,
    Success,
    Error,
}

/// A finalized tool invocation record.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ToolCallRecord {
    pub id: String,
    pub tool_name: String,
    /// Parsed arguments; `None` when the accumulated buffer was unparseable.
    pub arguments: Option<serde_json::Value>,
    /// Raw argument buffer, retained for display when parsing failed.
    pub raw_arguments: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub status: ToolCallStatus,
    /// Unix microseconds of the opening event receipt.
    pub started_at_us: u64,
    /// Set if and only if status is success or error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at_us: Option<u64>,
}

impl ToolCallRecord {
    /// Wall-clock duration in microseconds; `None` while pending.
    pub fn duration_micros(&self) -> Option<u64> {
        self.completed_at_us
            .map(|completed| completed.saturating_sub(self.started_at_us))
    }
}

// ---------------------------------------------------------------------------
// Canvas state
// ---------------------------------------------------------------------------

/// The backend-shared mid-run state: an ordered list of opaque items keyed by
/// stable id. Snapshot replaces wholesale; delta mutates by id.
#[derive(Debug, Clone, Serialize, PartialEq, Default)]
pub struct CanvasState {
    pub items: Vec<CanvasItem>,
}

// ---------------------------------------------------------------------------
// Run status
// ---------------------------------------------------------------------------

/// Run lifecycle state.
///
/// Monotonic except for the explicit cancelled transition, which is reachable
/// from pending or running only.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum RunStatus {
    Pending,
    Running,
    Finished,
    Error { message: String },
    Cancelled,
}

impl RunStatus {
    /// True for finished, error, and cancelled.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending | Self::Running)
    }
}

// ---------------------------------------------------------------------------
// Run session
// ---------------------------------------------------------------------------

/// Aggregate root for one run: every derived view the UI observes.
///
/// Snapshots handed to observers are clones; any UI-triggered change operates
/// on the copy.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RunSession {
    pub thread_id: String,
    /// Server-assigned id, known once RUN_STARTED arrives.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    pub status: RunStatus,
    /// Finalized messages in arrival order, append-only while active.
    pub messages: Vec<Message>,
    pub tool_calls: Vec<ToolCallRecord>,
    pub consolidated_log: Vec<ConsolidatedEvent>,
    pub canvas: CanvasState,
    pub activity: ActivityState,
    /// Complete unconsolidated event log, for inspection.
    #[serde(skip)]
    pub raw_event_log: Vec<RawEvent>,
}

impl RunSession {
    /// Fresh pending session for a thread.
    pub fn new(thread_id: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            run_id: None,
            status: RunStatus::Pending,
            messages: Vec::new(),
            tool_calls: Vec::new(),
            consolidated_log: Vec::new(),
            canvas: CanvasState::default(),
            activity: ActivityState::default(),
            raw_event_log: Vec::new(),
        }
    }
}
