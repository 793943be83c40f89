//! Typed AG-UI protocol event vocabulary.
//!
//! Each wire frame is one JSON object tagged by `type`. The enum below decodes
//! the fixed vocabulary into strongly-shaped variants so downstream state
//! machines never touch untyped payload maps.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::{SystemTime, UNIX_EPOCH};

// ---------------------------------------------------------------------------
// Roles
// ---------------------------------------------------------------------------

/// Author role carried by text-message events.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    Developer,
    #[default]
    Assistant,
    User,
    Tool,
}

// ---------------------------------------------------------------------------
// State / activity payload shapes
// ---------------------------------------------------------------------------

/// One opaque canvas entry carried by state snapshot/delta events.
///
/// The backend owns the shape of `data`; the client only keys on `id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CanvasItem {
    pub id: String,
    #[serde(default, flatten)]
    pub data: Value,
}

/// Add/update/remove operations carried by a `STATE_DELTA` frame.
///
/// Operations are applied in the fixed order add, update, remove.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct StateDeltaOps {
    #[serde(default)]
    pub add: Vec<CanvasItem>,
    #[serde(default)]
    pub update: Vec<CanvasItem>,
    #[serde(default)]
    pub remove: Vec<String>,
}

/// Coarse agent-activity phase reported by the backend.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ActivityStatus {
    #[default]
    Idle,
    Thinking,
    Generating,
    RunningTool,
    Waiting,
}

/// Partial activity update; absent fields keep their prior value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ActivityPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ActivityStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
}

/// Full activity state: carried by an `ACTIVITY_SNAPSHOT` frame and kept as
/// the merged "what the agent is doing now" model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ActivityState {
    #[serde(default)]
    pub status: ActivityStatus,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
}

// ---------------------------------------------------------------------------
// Event enum
// ---------------------------------------------------------------------------

/// One AG-UI protocol event.
///
/// Tag names and field casing follow the wire protocol. Decoding an unknown
/// tag or a frame missing required fields fails at the serde layer; the
/// decoder drops such frames without aborting the stream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum AgUiEvent {
    // Lifecycle
    #[serde(rename = "RUN_STARTED")]
    RunStarted {
        #[serde(rename = "threadId")]
        thread_id: String,
        #[serde(rename = "runId")]
        run_id: String,
    },
    #[serde(rename = "RUN_FINISHED")]
    RunFinished {
        #[serde(rename = "threadId", default)]
        thread_id: Option<String>,
        #[serde(rename = "runId", default)]
        run_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
    },
    #[serde(rename = "RUN_ERROR")]
    RunError {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },
    #[serde(rename = "STEP_STARTED")]
    StepStarted {
        #[serde(rename = "stepName")]
        step_name: String,
    },
    #[serde(rename = "STEP_FINISHED")]
    StepFinished {
        #[serde(rename = "stepName")]
        step_name: String,
    },

    // Text messages
    #[serde(rename = "TEXT_MESSAGE_START")]
    TextMessageStart {
        #[serde(rename = "messageId")]
        message_id: String,
        #[serde(default)]
        role: MessageRole,
    },
    #[serde(rename = "TEXT_MESSAGE_CONTENT")]
    TextMessageContent {
        #[serde(rename = "messageId")]
        message_id: String,
        delta: String,
    },
    /// Whole-message replacement variant of the content stream. A chunk with
    /// no open fragment opens one implicitly.
    #[serde(rename = "TEXT_MESSAGE_CHUNK")]
    TextMessageChunk {
        #[serde(rename = "messageId", default)]
        message_id: Option<String>,
        #[serde(default)]
        role: Option<MessageRole>,
        #[serde(default)]
        delta: Option<String>,
    },
    #[serde(rename = "TEXT_MESSAGE_END")]
    TextMessageEnd {
        #[serde(rename = "messageId")]
        message_id: String,
    },

    // Thinking trace
    #[serde(rename = "THINKING_TEXT_MESSAGE_START")]
    ThinkingTextMessageStart,
    #[serde(rename = "THINKING_TEXT_MESSAGE_CONTENT")]
    ThinkingTextMessageContent { delta: String },
    #[serde(rename = "THINKING_TEXT_MESSAGE_END")]
    ThinkingTextMessageEnd,

    // Tool calls
    #[serde(rename = "TOOL_CALL_START")]
    ToolCallStart {
        #[serde(rename = "toolCallId")]
        tool_call_id: String,
        #[serde(rename = "toolCallName")]
        tool_call_name: String,
        #[serde(rename = "parentMessageId", default)]
        parent_message_id: Option<String>,
    },
    #[serde(rename = "TOOL_CALL_ARGS")]
    ToolCallArgs {
        #[serde(rename = "toolCallId")]
        tool_call_id: String,
        delta: String,
    },
    #[serde(rename = "TOOL_CALL_END")]
    ToolCallEnd {
        #[serde(rename = "toolCallId")]
        tool_call_id: String,
    },
    #[serde(rename = "TOOL_CALL_RESULT")]
    ToolCallResult {
        #[serde(rename = "toolCallId")]
        tool_call_id: String,
        #[serde(rename = "messageId", default)]
        message_id: Option<String>,
        content: Value,
    },
    /// Explicit tool failure; closes the call with error status.
    #[serde(rename = "TOOL_CALL_ERROR")]
    ToolCallError {
        #[serde(rename = "toolCallId")]
        tool_call_id: String,
        message: String,
    },

    // State
    #[serde(rename = "STATE_SNAPSHOT")]
    StateSnapshot {
        #[serde(default)]
        items: Vec<CanvasItem>,
    },
    #[serde(rename = "STATE_DELTA")]
    StateDelta {
        #[serde(flatten)]
        ops: StateDeltaOps,
    },

    // Activity
    #[serde(rename = "ACTIVITY_SNAPSHOT")]
    ActivitySnapshot {
        #[serde(flatten)]
        activity: ActivityState,
    },
    #[serde(rename = "ACTIVITY_DELTA")]
    ActivityDelta {
        #[serde(flatten)]
        patch: ActivityPatch,
    },

    // Extension points
    #[serde(rename = "CUSTOM")]
    Custom {
        name: String,
        #[serde(default)]
        value: Value,
    },
    #[serde(rename = "RAW")]
    Raw { event: Value },
}

impl AgUiEvent {
    /// Wire tag for this event, for logs and passthrough display.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RunStarted { .. } => "RUN_STARTED",
            Self::RunFinished { .. } => "RUN_FINISHED",
            Self::RunError { .. } => "RUN_ERROR",
            Self::StepStarted { .. } => "STEP_STARTED",
            Self::StepFinished { .. } => "STEP_FINISHED",
            Self::TextMessageStart { .. } => "TEXT_MESSAGE_START",
            Self::TextMessageContent { .. } => "TEXT_MESSAGE_CONTENT",
            Self::TextMessageChunk { .. } => "TEXT_MESSAGE_CHUNK",
            Self::TextMessageEnd { .. } => "TEXT_MESSAGE_END",
            Self::ThinkingTextMessageStart => "THINKING_TEXT_MESSAGE_START",
            Self::ThinkingTextMessageContent { .. } => "THINKING_TEXT_MESSAGE_CONTENT",
            Self::ThinkingTextMessageEnd => "THINKING_TEXT_MESSAGE_END",
            Self::ToolCallStart { .. } => "TOOL_CALL_START",
            Self::ToolCallArgs { .. } => "TOOL_CALL_ARGS",
            Self::ToolCallEnd { .. } => "TOOL_CALL_END",
            Self::ToolCallResult { .. } => "TOOL_CALL_RESULT",
            Self::ToolCallError { .. } => "TOOL_CALL_ERROR",
            Self::StateSnapshot { .. } => "STATE_SNAPSHOT",
            Self::StateDelta { .. } => "STATE_DELTA",
            Self::ActivitySnapshot { .. } => "ACTIVITY_SNAPSHOT",
            Self::ActivityDelta { .. } => "ACTIVITY_DELTA",
            Self::Custom { .. } => "CUSTOM",
            Self::Raw { .. } => "RAW",
        }
    }
}

// ---------------------------------------------------------------------------
// Decoded frame envelope
// ---------------------------------------------------------------------------

/// One decoded protocol frame in arrival order.
///
/// `seq` is assigned by the decoder; `timestamp_ms` comes from the wire when
/// present, otherwise from receipt time. Immutable once decoded.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RawEvent {
    pub seq: u64,
    pub timestamp_ms: u64,
    pub event: AgUiEvent,
}

impl RawEvent {
    /// Wrap an event with a receipt timestamp.
    pub fn new(seq: u64, timestamp_ms: u64, event: AgUiEvent) -> Self {
        Self {
            seq,
            timestamp_ms,
            event,
        }
    }
}

/// Current wall-clock time in unix milliseconds.
pub fn now_unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_lifecycle_frame_with_camel_case_fields() {
        let raw = r#"{"type":"RUN_STARTED","threadId":"t1","runId":"r1"}"#;
        let event: AgUiEvent = serde_json::from_str(raw).expect("decode");
        assert_eq!(
            event,
            AgUiEvent::RunStarted {
                thread_id: "t1".into(),
                run_id: "r1".into(),
            }
        );
        assert_eq!(event.kind(), "RUN_STARTED");
    }

    #[test]
    fn decodes_text_content_and_round_trips() {
        let event = AgUiEvent::TextMessageContent {
            message_id: "m1".into(),
            delta: "Hello".into(),
        };
        let raw = serde_json::to_value(&event).expect("serialize");
        assert_eq!(raw["type"], json!("TEXT_MESSAGE_CONTENT"));
        assert_eq!(raw["messageId"], json!("m1"));
        let back: AgUiEvent = serde_json::from_value(raw).expect("decode");
        assert_eq!(back, event);
    }

    #[test]
    fn unknown_type_tag_fails_to_decode() {
        let raw = r#"{"type":"NOT_A_REAL_EVENT","x":1}"#;
        assert!(serde_json::from_str::<AgUiEvent>(raw).is_err());
    }

    #[test]
    fn missing_required_field_fails_to_decode() {
        // TEXT_MESSAGE_CONTENT requires both messageId and delta.
        let raw = r#"{"type":"TEXT_MESSAGE_CONTENT","messageId":"m1"}"#;
        assert!(serde_json::from_str::<AgUiEvent>(raw).is_err());
    }

    #[test]
    fn state_delta_defaults_missing_op_arrays() {
        let raw = r#"{"type":"STATE_DELTA","add":[{"id":"a","v":1}]}"#;
        let event: AgUiEvent = serde_json::from_str(raw).expect("decode");
        let AgUiEvent::StateDelta { ops } = event else {
            panic!("expected state delta");
        };
        assert_eq!(ops.add.len(), 1);
        assert_eq!(ops.add[0].id, "a");
        assert_eq!(ops.add[0].data["v"], json!(1));
        assert!(ops.update.is_empty());
        assert!(ops.remove.is_empty());
    }

    #[test]
    fn activity_delta_keeps_absent_fields_as_none() {
        let raw = r#"{"type":"ACTIVITY_DELTA","progress":0.5}"#;
        let event: AgUiEvent = serde_json::from_str(raw).expect("decode");
        let AgUiEvent::ActivityDelta { patch } = event else {
            panic!("expected activity delta");
        };
        assert_eq!(patch.progress, Some(0.5));
        assert!(patch.status.is_none());
        assert!(patch.description.is_none());
    }

    #[test]
    fn tool_call_result_accepts_structured_content() {
        let raw = r#"{"type":"TOOL_CALL_RESULT","toolCallId":"t1","content":{"n":3}}"#;
        let event: AgUiEvent = serde_json::from_str(raw).expect("decode");
        let AgUiEvent::ToolCallResult { content, .. } = event else {
            panic!("expected tool call result");
        };
        assert_eq!(content, json!({"n":3}));
    }

    #[test]
    fn text_chunk_tolerates_sparse_fields() {
        let raw = r#"{"type":"TEXT_MESSAGE_CHUNK","delta":"partial"}"#;
        let event: AgUiEvent = serde_json::from_str(raw).expect("decode");
        let AgUiEvent::TextMessageChunk {
            message_id, delta, ..
        } = event
        else {
            panic!("expected chunk");
        };
        assert!(message_id.is_none());
        assert_eq!(delta.as_deref(), Some("partial"));
    }
}
