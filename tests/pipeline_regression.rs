//! End-to-end pipeline regression: raw SSE bytes in, session model out.
//!
//! Exercises the full stack (transport trait, SSE decode, assembly,
//! consolidation, controller, driver task) against scripted streams,
//! including hostile chunk boundaries and malformed frames.

use async_trait::async_trait;
use soliplex_agui::driver::{spawn_run, StallPolicy};
use soliplex_agui::error::TransportError;
use soliplex_agui::run::{DisplayType, RunStatus, ToolCallStatus};
use soliplex_agui::testsupport::{init_test_logging, sse_data_block};
use soliplex_agui::transport::EventTransport;
use std::collections::VecDeque;
use serde_json::json;

/// Scripted transport replaying pre-split byte chunks.
struct ScriptedTransport {
    chunks: VecDeque<Vec<u8>>,
}

impl ScriptedTransport {
    fn new(stream: &str, chunk_len: usize) -> Self {
        let bytes = stream.as_bytes();
        let chunks = bytes
            .chunks(chunk_len.max(1))
            .map(<[u8]>::to_vec)
            .collect();
        Self { chunks }
    }
}

#[async_trait]
impl EventTransport for ScriptedTransport {
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        Ok(self.chunks.pop_front())
    }
}

fn agent_turn_stream() -> String {
    [
        r#"{"type":"RUN_STARTED","threadId":"t1","runId":"r1"}"#,
        r#"{"type":"STEP_STARTED","stepName":"research"}"#,
        r#"{"type":"TEXT_MESSAGE_START","messageId":"m1","role":"assistant"}"#,
        r#"{"type":"TEXT_MESSAGE_CONTENT","messageId":"m1","delta":"Looking that up"}"#,
        r#"{"type":"TEXT_MESSAGE_END","messageId":"m1"}"#,
        r#"{"type":"TOOL_CALL_START","toolCallId":"tc1","toolCallName":"search"}"#,
        r#"{"type":"TOOL_CALL_ARGS","toolCallId":"tc1","delta":"{\"query\":"}"#,
        r#"{"type":"TOOL_CALL_ARGS","toolCallId":"tc1","delta":"\"rust sse\"}"}"#,
        r#"{"type":"TOOL_CALL_END","toolCallId":"tc1"}"#,
        r#"{"type":"TOOL_CALL_RESULT","toolCallId":"tc1","content":{"hits":2}}"#,
        r#"{"type":"STATE_SNAPSHOT","items":[{"id":"doc","title":"Notes"}]}"#,
        r#"{"type":"STATE_DELTA","update":[{"id":"doc","title":"Notes v2"}]}"#,
        r#"{"type":"ACTIVITY_DELTA","status":"generating","description":"writing answer"}"#,
        r#"{"type":"STEP_FINISHED","stepName":"research"}"#,
        r#"{"type":"TEXT_MESSAGE_START","messageId":"m2","role":"assistant"}"#,
        r#"{"type":"TEXT_MESSAGE_CONTENT","messageId":"m2","delta":"Found 2 results."}"#,
        r#"{"type":"TEXT_MESSAGE_END","messageId":"m2"}"#,
        r#"{"type":"RUN_FINISHED"}"#,
    ]
    .iter()
    .map(|json| sse_data_block(json))
    .collect()
}

#[tokio::test]
async fn full_agent_turn_builds_complete_session() {
    init_test_logging();
    let transport = ScriptedTransport::new(&agent_turn_stream(), 4096);
    let (handle, _snapshots) = spawn_run(transport, "t1", StallPolicy::none());
    let session = handle.join().await.expect("task join");

    assert_eq!(session.status, RunStatus::Finished);
    assert_eq!(session.run_id.as_deref(), Some("r1"));

    assert_eq!(session.messages.len(), 2);
    assert_eq!(session.messages[0].content, "Looking that up");
    assert_eq!(session.messages[1].content, "Found 2 results.");

    assert_eq!(session.tool_calls.len(), 1);
    let call = &session.tool_calls[0];
    assert_eq!(call.tool_name, "search");
    assert_eq!(call.arguments, Some(json!({"query": "rust sse"})));
    assert_eq!(call.result, Some(json!({"hits": 2})));
    assert_eq!(call.status, ToolCallStatus::Success);

    assert_eq!(session.canvas.items.len(), 1);
    assert_eq!(session.canvas.items[0].data["title"], json!("Notes v2"));

    // One entry per logical group, ordered by opening time, plus
    // single-event passthroughs.
    let types: Vec<&DisplayType> = session
        .consolidated_log
        .iter()
        .map(|entry| &entry.display_type)
        .collect();
    assert!(types.contains(&&DisplayType::Step));
    assert!(types.contains(&&DisplayType::ToolCall));
    assert_eq!(
        types
            .iter()
            .filter(|t| ***t == DisplayType::TextMessage)
            .count(),
        2
    );
    let tool_entry = session
        .consolidated_log
        .iter()
        .find(|entry| entry.display_type == DisplayType::ToolCall)
        .expect("tool entry");
    assert_eq!(tool_entry.display_summary, "search → success");
    assert!(tool_entry.end_time_ms.is_some());

    assert_eq!(session.raw_event_log.len(), 18);
}

#[tokio::test]
async fn single_byte_chunking_yields_identical_session() {
    init_test_logging();
    let transport = ScriptedTransport::new(&agent_turn_stream(), 1);
    let (handle, _snapshots) = spawn_run(transport, "t1", StallPolicy::none());
    let session = handle.join().await.expect("task join");

    assert_eq!(session.status, RunStatus::Finished);
    assert_eq!(session.messages.len(), 2);
    assert_eq!(session.tool_calls.len(), 1);
    assert_eq!(session.raw_event_log.len(), 18);
}

#[tokio::test]
async fn multibyte_text_survives_single_byte_chunking() {
    init_test_logging();
    let stream: String = [
        r#"{"type":"RUN_STARTED","threadId":"t1","runId":"r1"}"#,
        r#"{"type":"TEXT_MESSAGE_START","messageId":"m1","role":"assistant"}"#,
        r#"{"type":"TEXT_MESSAGE_CONTENT","messageId":"m1","delta":"café ☕ — héllo"}"#,
        r#"{"type":"TEXT_MESSAGE_END","messageId":"m1"}"#,
        r#"{"type":"RUN_FINISHED"}"#,
    ]
    .iter()
    .map(|json| sse_data_block(json))
    .collect();

    // One byte per chunk splits every multi-byte character.
    let transport = ScriptedTransport::new(&stream, 1);
    let (handle, _snapshots) = spawn_run(transport, "t1", StallPolicy::none());
    let session = handle.join().await.expect("task join");

    assert_eq!(session.status, RunStatus::Finished);
    assert_eq!(session.messages.len(), 1);
    assert_eq!(session.messages[0].content, "café ☕ — héllo");
}

#[tokio::test]
async fn malformed_frame_is_skipped_without_losing_the_run() {
    init_test_logging();
    let stream: String = [
        r#"{"type":"RUN_STARTED","threadId":"t1","runId":"r1"}"#,
        "garbage that is not json",
        r#"{"type":"TEXT_MESSAGE_START","messageId":"m1","role":"assistant"}"#,
        r#"{"type":"TEXT_MESSAGE_CONTENT","messageId":"m1","delta":"survived"}"#,
        r#"{"type":"TEXT_MESSAGE_END","messageId":"m1"}"#,
        r#"{"type":"RUN_FINISHED"}"#,
    ]
    .iter()
    .map(|json| sse_data_block(json))
    .collect();

    let transport = ScriptedTransport::new(&stream, 64);
    let (handle, _snapshots) = spawn_run(transport, "t1", StallPolicy::none());
    let session = handle.join().await.expect("task join");

    assert_eq!(session.status, RunStatus::Finished);
    assert_eq!(session.messages.len(), 1);
    assert_eq!(session.messages[0].content, "survived");
    // The bad frame never reached the session.
    assert_eq!(session.raw_event_log.len(), 5);
}

#[tokio::test]
async fn unparseable_tool_arguments_keep_raw_buffer() {
    init_test_logging();
    let stream: String = [
        r#"{"type":"RUN_STARTED","threadId":"t1","runId":"r1"}"#,
        r#"{"type":"TOOL_CALL_START","toolCallId":"tc1","toolCallName":"search"}"#,
        r#"{"type":"TOOL_CALL_ARGS","toolCallId":"tc1","delta":"{\"query\": truncated"}"#,
        r#"{"type":"TOOL_CALL_END","toolCallId":"tc1"}"#,
        r#"{"type":"RUN_FINISHED"}"#,
    ]
    .iter()
    .map(|json| sse_data_block(json))
    .collect();

    let transport = ScriptedTransport::new(&stream, 64);
    let (handle, _snapshots) = spawn_run(transport, "t1", StallPolicy::none());
    let session = handle.join().await.expect("task join");

    let call = &session.tool_calls[0];
    assert!(call.arguments.is_none());
    assert_eq!(call.raw_arguments, "{\"query\": truncated");
    assert_eq!(call.status, ToolCallStatus::Pending);
}

#[tokio::test]
async fn backend_error_salvages_partial_message() {
    init_test_logging();
    let stream: String = [
        r#"{"type":"RUN_STARTED","threadId":"t1","runId":"r1"}"#,
        r#"{"type":"TEXT_MESSAGE_START","messageId":"m1","role":"assistant"}"#,
        r#"{"type":"TEXT_MESSAGE_CONTENT","messageId":"m1","delta":"half an ans"}"#,
        r#"{"type":"RUN_ERROR","message":"model overloaded","code":"overloaded"}"#,
    ]
    .iter()
    .map(|json| sse_data_block(json))
    .collect();

    let transport = ScriptedTransport::new(&stream, 64);
    let (handle, _snapshots) = spawn_run(transport, "t1", StallPolicy::none());
    let session = handle.join().await.expect("task join");

    let RunStatus::Error { message } = &session.status else {
        panic!("expected error status, got {:?}", session.status);
    };
    assert!(message.contains("model overloaded"));
    assert_eq!(session.messages.len(), 1);
    assert_eq!(session.messages[0].content, "half an ans");
    // The interrupted group is visible as unterminated.
    assert!(session
        .consolidated_log
        .iter()
        .any(|entry| entry.is_unterminated()));
}

#[tokio::test]
async fn events_after_finish_are_ignored() {
    init_test_logging();
    let stream: String = [
        r#"{"type":"RUN_STARTED","threadId":"t1","runId":"r1"}"#,
        r#"{"type":"RUN_FINISHED"}"#,
        r#"{"type":"TEXT_MESSAGE_START","messageId":"late","role":"assistant"}"#,
        r#"{"type":"TEXT_MESSAGE_CONTENT","messageId":"late","delta":"too late"}"#,
    ]
    .iter()
    .map(|json| sse_data_block(json))
    .collect();

    let transport = ScriptedTransport::new(&stream, 4096);
    let (handle, _snapshots) = spawn_run(transport, "t1", StallPolicy::none());
    let session = handle.join().await.expect("task join");

    assert_eq!(session.status, RunStatus::Finished);
    assert!(session.messages.is_empty());
    assert_eq!(session.raw_event_log.len(), 2);
}
