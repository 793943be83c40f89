//! Streaming text-message assembly.
//!
//! Buffers TEXT_MESSAGE / THINKING fragment events into complete [`Message`]s.
//! At most one fragment is open at a time; a start-event for a different id
//! finalizes the stale fragment first (implicit end). Out-of-order fragment
//! events are tolerated as no-ops.

use crate::error::AssemblyError;
use crate::protocol::{AgUiEvent, MessageRole};
use crate::run::session::Message;
use tracing::debug;

/// Transient accumulator for one in-flight message.
#[derive(Debug)]
struct MessageFragmentState {
    message_id: String,
    role: MessageRole,
    text: String,
    thinking: String,
    started_at_ms: u64,
}

impl MessageFragmentState {
    fn finalize(self) -> Message {
        Message {
            id: self.message_id,
            role: self.role,
            content: self.text,
            thinking_content: if self.thinking.is_empty() {
                None
            } else {
                Some(self.thinking)
            },
            is_streaming: false,
            created_at_ms: self.started_at_ms,
        }
    }
}

/// State machine turning fragment events into finalized messages.
#[derive(Debug, Default)]
pub struct TextMessageAssembler {
    open: Option<MessageFragmentState>,
    /// Thinking deltas that arrived before any fragment opened; attached to
    /// the next fragment.
    pending_thinking: String,
    /// Counter for ids synthesized when a chunk stream omits messageId.
    chunk_counter: u64,
}

impl TextMessageAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// True while a fragment is accumulating.
    pub fn has_open_fragment(&self) -> bool {
        self.open.is_some()
    }

    /// Apply one event; returns any messages finalized by it, in order.
    pub fn apply(&mut self, event: &AgUiEvent, timestamp_ms: u64) -> Vec<Message> {
        match event {
            AgUiEvent::TextMessageStart { message_id, role } => {
                let mut finalized = Vec::new();
                if let Some(stale) = self.open.take() {
                    if stale.message_id == *message_id {
                        // Duplicate start for the open id: keep accumulating.
                        self.open = Some(stale);
                        return finalized;
                    }
                    debug!(
                        stale_id = %stale.message_id,
                        new_id = %message_id,
                        "implicit end of stale message fragment"
                    );
                    finalized.push(stale.finalize());
                }
                self.open_fragment(message_id.clone(), *role, timestamp_ms);
                finalized
            }
            AgUiEvent::TextMessageContent { message_id, delta } => {
                match self.open.as_mut() {
                    Some(open) if open.message_id == *message_id => {
                        open.text.push_str(delta);
                    }
                    _ => self.note_orphan(message_id),
                }
                Vec::new()
            }
            AgUiEvent::TextMessageChunk {
                message_id,
                role,
                delta,
            } => self.apply_chunk(message_id.as_deref(), *role, delta.as_deref(), timestamp_ms),
            AgUiEvent::TextMessageEnd { message_id } => match self.open.take() {
                Some(open) if open.message_id == *message_id => vec![open.finalize()],
                other => {
                    self.open = other;
                    self.note_orphan(message_id);
                    Vec::new()
                }
            },
            AgUiEvent::ThinkingTextMessageStart | AgUiEvent::ThinkingTextMessageEnd => Vec::new(),
            AgUiEvent::ThinkingTextMessageContent { delta } => {
                match self.open.as_mut() {
                    Some(open) => open.thinking.push_str(delta),
                    None => self.pending_thinking.push_str(delta),
                }
                Vec::new()
            }
            _ => Vec::new(),
        }
    }

    /// Finalize any open fragment (run termination or cancellation flush).
    pub fn flush(&mut self) -> Option<Message> {
        self.open.take().map(MessageFragmentState::finalize)
    }

    /// Discard all accumulator state.
    pub fn reset(&mut self) {
        self.open = None;
        self.pending_thinking.clear();
        self.chunk_counter = 0;
    }

    /// Chunk events replace the accumulated text wholesale; a chunk with no
    /// open fragment opens one implicitly (chunked streams may omit START).
    fn apply_chunk(
        &mut self,
        message_id: Option<&str>,
        role: Option<MessageRole>,
        delta: Option<&str>,
        timestamp_ms: u64,
    ) -> Vec<Message> {
        let mut finalized = Vec::new();
        let switches_id = match (self.open.as_ref(), message_id) {
            (Some(open), Some(id)) => open.message_id != id,
            _ => false,
        };
        if switches_id {
            if let Some(stale) = self.open.take() {
                finalized.push(stale.finalize());
            }
        }
        if self.open.is_none() {
            let id = match message_id {
                Some(id) => id.to_string(),
                None => {
                    self.chunk_counter = self.chunk_counter.saturating_add(1);
                    format!("chunk-{}", self.chunk_counter)
                }
            };
            self.open_fragment(id, role.unwrap_or_default(), timestamp_ms);
        }
        if let (Some(open), Some(delta)) = (self.open.as_mut(), delta) {
            open.text.clear();
            open.text.push_str(delta);
        }
        finalized
    }

    fn open_fragment(&mut self, message_id: String, role: MessageRole, timestamp_ms: u64) {
        self.open = Some(MessageFragmentState {
            message_id,
            role,
            text: String::new(),
            thinking: std::mem::take(&mut self.pending_thinking),
            started_at_ms: timestamp_ms,
        });
    }

    fn note_orphan(&self, message_id: &str) {
        let err = AssemblyError::OrphanFragment {
            id: message_id.to_string(),
        };
        debug!(error = %err, "ignoring out-of-order text message event");
    }
}
