//! Run session controller: the single dispatch path for decoded events.
//!
//! Owns the [`RunSession`] and every accumulator feeding it. Each decoded
//! frame is folded in exactly once, in arrival order; observers only ever see
//! cloned snapshots. Events arriving after a terminal status are dropped.

use crate::error::{RunError, TransportError};
use crate::protocol::{now_unix_millis, AgUiEvent, RawEvent};
use crate::run::consolidate::{Consolidator, DisplayType, DEFAULT_RAW_EVENT_CAP};
use crate::run::messages::TextMessageAssembler;
use crate::run::session::{RunSession, RunStatus};
use crate::run::state;
use crate::run::tool_calls::ToolCallAssembler;
use tracing::{debug, info, warn};

pub struct RunSessionController {
    session: RunSession,
    messages: TextMessageAssembler,
    tool_calls: ToolCallAssembler,
    consolidator: Consolidator,
}

impl RunSessionController {
    pub fn new(thread_id: impl Into<String>) -> Self {
        Self::with_raw_event_cap(thread_id, DEFAULT_RAW_EVENT_CAP)
    }

    /// `raw_event_cap` bounds retained raw events per consolidated entry.
    pub fn with_raw_event_cap(thread_id: impl Into<String>, raw_event_cap: usize) -> Self {
        Self {
            session: RunSession::new(thread_id),
            messages: TextMessageAssembler::new(),
            tool_calls: ToolCallAssembler::new(),
            consolidator: Consolidator::new(raw_event_cap),
        }
    }

    pub fn session(&self) -> &RunSession {
        &self.session
    }

    /// Cloned view for observers; mutations on the clone never feed back.
    pub fn snapshot(&self) -> RunSession {
        self.session.clone()
    }

    /// Fold one decoded frame into the session.
    pub fn dispatch(&mut self, raw: RawEvent) {
        if self.session.status.is_terminal() {
            debug!(seq = raw.seq, kind = raw.event.kind(), "event after terminal status dropped");
            return;
        }
        self.consolidator
            .observe(&raw, &mut self.session.consolidated_log);

        match &raw.event {
            AgUiEvent::RunStarted { run_id, .. } => {
                info!(%run_id, "run started");
                self.session.run_id = Some(run_id.clone());
                self.session.status = RunStatus::Running;
            }
            AgUiEvent::RunFinished { .. } => {
                self.finish_streams();
                self.session.status = RunStatus::Finished;
                self.session.activity = Default::default();
            }
            AgUiEvent::RunError { message, code } => {
                warn!(message = %message, code = ?code, "run reported an error");
                self.finish_streams();
                let err = RunError::Backend {
                    message: message.clone(),
                    code: code.clone(),
                };
                self.session.status = RunStatus::Error {
                    message: err.to_string(),
                };
                self.session.activity = Default::default();
            }
            AgUiEvent::TextMessageStart { .. }
            | AgUiEvent::TextMessageContent { .. }
            | AgUiEvent::TextMessageChunk { .. }
            | AgUiEvent::TextMessageEnd { .. }
            | AgUiEvent::ThinkingTextMessageStart
            | AgUiEvent::ThinkingTextMessageContent { .. }
            | AgUiEvent::ThinkingTextMessageEnd => {
                let finalized = self.messages.apply(&raw.event, raw.timestamp_ms);
                self.session.messages.extend(finalized);
            }
            AgUiEvent::ToolCallStart { .. }
            | AgUiEvent::ToolCallArgs { .. }
            | AgUiEvent::ToolCallEnd { .. } => {
                let finalized = self.tool_calls.apply(&raw.event, raw.timestamp_ms);
                self.session.tool_calls.extend(finalized);
            }
            AgUiEvent::ToolCallResult {
                tool_call_id,
                content,
                ..
            } => {
                // RESULT may arrive without an explicit END.
                if let Some(record) = self.tool_calls.close_if_open(tool_call_id) {
                    self.session.tool_calls.push(record);
                }
                match self.find_tool_call_mut(tool_call_id) {
                    Some(record) => {
                        ToolCallAssembler::complete_success(
                            record,
                            content.clone(),
                            raw.timestamp_ms,
                        );
                    }
                    None => debug!(id = %tool_call_id, "result for unknown tool call dropped"),
                }
            }
            AgUiEvent::ToolCallError {
                tool_call_id,
                message,
            } => {
                if let Some(record) = self.tool_calls.close_if_open(tool_call_id) {
                    self.session.tool_calls.push(record);
                }
                match self.find_tool_call_mut(tool_call_id) {
                    Some(record) => {
                        ToolCallAssembler::complete_error(
                            record,
                            message.clone(),
                            raw.timestamp_ms,
                        );
                    }
                    None => debug!(id = %tool_call_id, "error for unknown tool call dropped"),
                }
            }
            AgUiEvent::StateSnapshot { items } => {
                state::apply_state_snapshot(&mut self.session.canvas, items.clone());
            }
            AgUiEvent::StateDelta { ops } => {
                state::apply_state_delta(&mut self.session.canvas, ops);
            }
            AgUiEvent::ActivitySnapshot { activity } => {
                state::apply_activity_snapshot(&mut self.session.activity, activity.clone());
            }
            AgUiEvent::ActivityDelta { patch } => {
                state::apply_activity_patch(&mut self.session.activity, patch);
            }
            AgUiEvent::StepStarted { .. }
            | AgUiEvent::StepFinished { .. }
            | AgUiEvent::Custom { .. }
            | AgUiEvent::Raw { .. } => {}
        }

        self.session.raw_event_log.push(raw);
    }

    /// User-initiated cancellation. Idempotent; a no-op once terminal.
    pub fn cancel(&mut self) {
        if self.session.status.is_terminal() {
            return;
        }
        info!(thread_id = %self.session.thread_id, "run cancelled");
        self.finish_streams();
        self.consolidator.append_marker(
            DisplayType::Cancelled,
            "cancelled by user",
            now_unix_millis(),
            &mut self.session.consolidated_log,
        );
        self.session.status = RunStatus::Cancelled;
        self.session.activity = Default::default();
    }

    /// No events arrived within the stall window; fail the run.
    pub fn mark_stalled(&mut self, window_secs: u64) {
        self.fail(RunError::Stalled { window_secs }.to_string());
    }

    /// The transport layer died mid-stream; fail the run.
    pub fn mark_transport_error(&mut self, err: &TransportError) {
        self.fail(err.to_string());
    }

    /// The stream ended before a terminal lifecycle event; fail the run.
    pub fn mark_truncated(&mut self) {
        self.fail("stream closed before run finished".to_string());
    }

    /// Drop everything and start a fresh pending session for `thread_id`.
    pub fn reset(&mut self, thread_id: impl Into<String>) {
        self.session = RunSession::new(thread_id);
        self.messages.reset();
        self.tool_calls.reset();
        self.consolidator.reset();
    }

    fn fail(&mut self, message: String) {
        if self.session.status.is_terminal() {
            return;
        }
        warn!(message = %message, "run failed");
        self.finish_streams();
        self.session.status = RunStatus::Error { message };
        self.session.activity = Default::default();
    }

    /// Best-effort finalization of in-flight fragments and open groups.
    fn finish_streams(&mut self) {
        if let Some(message) = self.messages.flush() {
            self.session.messages.push(message);
        }
        if let Some(record) = self.tool_calls.flush() {
            self.session.tool_calls.push(record);
        }
        self.consolidator.flush(&mut self.session.consolidated_log);
    }

    fn find_tool_call_mut(
        &mut self,
        call_id: &str,
    ) -> Option<&mut crate::run::session::ToolCallRecord> {
        // Most recent first: ids repeat across retries.
        self.session
            .tool_calls
            .iter_mut()
            .rev()
            .find(|record| record.id == call_id)
    }
}
