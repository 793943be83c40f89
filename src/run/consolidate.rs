//! Raw-event consolidation into a condensed, displayable log.
//!
//! Each logical operation (one streamed message, one tool call, one step)
//! collapses into a single entry. Entries are inserted when their group opens
//! and updated in place afterwards, so the log is ordered by group opening
//! time even though closing is deferred. Ungrouped events pass through as
//! single-event entries.

use crate::protocol::{AgUiEvent, RawEvent};
use crate::textutil::preview;
use serde::Serialize;
use std::collections::HashMap;

/// Character budget for derived display summaries.
const SUMMARY_PREVIEW_CHARS: usize = 80;
/// Default bound on retained raw events per consolidated group.
pub const DEFAULT_RAW_EVENT_CAP: usize = 64;

/// Display classification of a consolidated entry.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", tag = "kind")]
pub enum DisplayType {
    TextMessage,
    Thinking,
    ToolCall,
    Step,
    /// Marker appended when the user cancels the run.
    Cancelled,
    /// Ungrouped raw event, shown under its wire tag.
    Passthrough { raw_type: String },
}

/// One entry in the condensed log.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ConsolidatedEvent {
    pub display_type: DisplayType,
    pub id: String,
    pub start_time_ms: u64,
    /// Absent while streaming and for groups flushed before their close
    /// event arrived.
    pub end_time_ms: Option<u64>,
    /// Type-specific derived view: message text preview, tool name and
    /// status, step name.
    pub display_summary: String,
    /// Total raw events in the group; keeps counting past the retention cap.
    pub raw_event_count: u64,
    /// Retained raw events for expansion, bounded by the retention cap.
    pub raw_events: Vec<RawEvent>,
    /// True while the group is still accepting events.
    pub open: bool,
}

impl ConsolidatedEvent {
    /// A flushed group that never saw its close event.
    pub fn is_unterminated(&self) -> bool {
        !self.open && self.end_time_ms.is_none()
    }
}

/// Logical grouping key for open consolidation buffers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum GroupKey {
    Message(String),
    Thinking,
    ToolCall(String),
    Step(String),
}

/// Incremental consolidator writing into a session-owned log.
///
/// Holds only indices and per-group accumulators; the entries themselves live
/// in the `Vec<ConsolidatedEvent>` passed to each call so the session remains
/// the single owner of derived state.
#[derive(Debug)]
pub struct Consolidator {
    /// Index of each group's entry in the output log.
    groups: HashMap<GroupKey, usize>,
    /// Growing text (messages/thinking) or tool name, per group.
    accum: HashMap<GroupKey, String>,
    raw_event_cap: usize,
}

impl Default for Consolidator {
    fn default() -> Self {
        Self::new(DEFAULT_RAW_EVENT_CAP)
    }
}

impl Consolidator {
    pub fn new(raw_event_cap: usize) -> Self {
        Self {
            groups: HashMap::new(),
            accum: HashMap::new(),
            raw_event_cap,
        }
    }

    /// Discard all grouping state. The caller clears the log itself.
    pub fn reset(&mut self) {
        self.groups.clear();
        self.accum.clear();
    }

    /// Fold one raw event into the log.
    pub fn observe(&mut self, raw: &RawEvent, log: &mut Vec<ConsolidatedEvent>) {
        match &raw.event {
            AgUiEvent::TextMessageStart { message_id, .. } => {
                let key = GroupKey::Message(message_id.clone());
                self.open_group(key, DisplayType::TextMessage, message_id.clone(), raw, log);
            }
            AgUiEvent::TextMessageContent { message_id, delta } => {
                let key = GroupKey::Message(message_id.clone());
                if self.is_open(&key, log) {
                    self.accum.entry(key.clone()).or_default().push_str(delta);
                    self.touch(&key, raw, log);
                } else {
                    self.passthrough(raw, "unmatched text content", log);
                }
            }
            AgUiEvent::TextMessageChunk {
                message_id, delta, ..
            } => {
                let Some(id) = message_id else {
                    self.passthrough(raw, "anonymous text chunk", log);
                    return;
                };
                let key = GroupKey::Message(id.clone());
                // Chunked streams may omit START; open on first sight.
                if self.is_open(&key, log) {
                    self.touch(&key, raw, log);
                } else {
                    self.open_group(key.clone(), DisplayType::TextMessage, id.clone(), raw, log);
                }
                // A chunk carries the full replacement text, not an append.
                if let Some(delta) = delta {
                    self.accum.insert(key, delta.clone());
                }
            }
            AgUiEvent::TextMessageEnd { message_id } => {
                let key = GroupKey::Message(message_id.clone());
                if !self.close_group(&key, raw, log) {
                    self.passthrough(raw, "unmatched text end", log);
                }
            }
            AgUiEvent::ThinkingTextMessageStart => {
                self.open_group(
                    GroupKey::Thinking,
                    DisplayType::Thinking,
                    "thinking".to_string(),
                    raw,
                    log,
                );
            }
            AgUiEvent::ThinkingTextMessageContent { delta } => {
                if self.is_open(&GroupKey::Thinking, log) {
                    self.accum
                        .entry(GroupKey::Thinking)
                        .or_default()
                        .push_str(delta);
                    self.touch(&GroupKey::Thinking, raw, log);
                } else {
                    self.passthrough(raw, "unmatched thinking content", log);
                }
            }
            AgUiEvent::ThinkingTextMessageEnd => {
                if !self.close_group(&GroupKey::Thinking, raw, log) {
                    self.passthrough(raw, "unmatched thinking end", log);
                }
            }
            AgUiEvent::ToolCallStart {
                tool_call_id,
                tool_call_name,
                ..
            } => {
                let key = GroupKey::ToolCall(tool_call_id.clone());
                self.open_group(key.clone(), DisplayType::ToolCall, tool_call_id.clone(), raw, log);
                self.accum.insert(key.clone(), tool_call_name.clone());
                if let Some(entry) = self.entry_mut(&key, log) {
                    entry.display_summary = tool_call_name.clone();
                }
            }
            AgUiEvent::ToolCallArgs { tool_call_id, .. } => {
                let key = GroupKey::ToolCall(tool_call_id.clone());
                if self.is_open(&key, log) {
                    self.touch(&key, raw, log);
                } else {
                    self.passthrough(raw, "unmatched tool args", log);
                }
            }
            AgUiEvent::ToolCallEnd { tool_call_id } => {
                let key = GroupKey::ToolCall(tool_call_id.clone());
                if !self.close_group(&key, raw, log) {
                    self.passthrough(raw, "unmatched tool end", log);
                }
            }
            AgUiEvent::ToolCallResult { tool_call_id, .. } => {
                let key = GroupKey::ToolCall(tool_call_id.clone());
                let name = self.accum.get(&key).cloned().unwrap_or_default();
                // A result may land after END closed the group; update the
                // emitted entry in place.
                let cap = self.raw_event_cap;
                if let Some(entry) = self.entry_mut(&key, log) {
                    record_raw(entry, raw, cap);
                    entry.display_summary = format!("{name} → success");
                    entry.end_time_ms = Some(raw.timestamp_ms);
                    entry.open = false;
                } else {
                    self.passthrough(raw, "unmatched tool result", log);
                }
            }
            AgUiEvent::ToolCallError {
                tool_call_id,
                message,
            } => {
                let key = GroupKey::ToolCall(tool_call_id.clone());
                let name = self.accum.get(&key).cloned().unwrap_or_default();
                let cap = self.raw_event_cap;
                if let Some(entry) = self.entry_mut(&key, log) {
                    record_raw(entry, raw, cap);
                    entry.display_summary =
                        format!("{name} → error: {}", preview(message, SUMMARY_PREVIEW_CHARS));
                    entry.end_time_ms = Some(raw.timestamp_ms);
                    entry.open = false;
                } else {
                    self.passthrough(raw, "unmatched tool error", log);
                }
            }
            AgUiEvent::StepStarted { step_name } => {
                let key = GroupKey::Step(step_name.clone());
                self.open_group(key.clone(), DisplayType::Step, step_name.clone(), raw, log);
                if let Some(entry) = self.entry_mut(&key, log) {
                    entry.display_summary = step_name.clone();
                }
            }
            AgUiEvent::StepFinished { step_name } => {
                let key = GroupKey::Step(step_name.clone());
                if !self.close_group(&key, raw, log) {
                    self.passthrough(raw, "unmatched step finish", log);
                }
            }
            other => {
                let summary = passthrough_summary(other);
                self.passthrough(raw, &summary, log);
            }
        }
    }

    /// Close every still-open group without an end time (run termination,
    /// error, or cancellation). The UI renders these as unterminated.
    pub fn flush(&mut self, log: &mut Vec<ConsolidatedEvent>) {
        for (key, idx) in self.groups.drain() {
            let Some(entry) = log.get_mut(idx) else {
                continue;
            };
            if !entry.open {
                continue;
            }
            entry.open = false;
            if entry.display_type == DisplayType::TextMessage
                || entry.display_type == DisplayType::Thinking
            {
                let text = self.accum.get(&key).cloned().unwrap_or_default();
                entry.display_summary = preview(&text, SUMMARY_PREVIEW_CHARS);
            }
        }
        self.accum.clear();
    }

    /// Append a standalone marker entry (cancellation).
    pub fn append_marker(
        &mut self,
        display_type: DisplayType,
        summary: &str,
        timestamp_ms: u64,
        log: &mut Vec<ConsolidatedEvent>,
    ) {
        log.push(ConsolidatedEvent {
            display_type,
            id: String::new(),
            start_time_ms: timestamp_ms,
            end_time_ms: Some(timestamp_ms),
            display_summary: summary.to_string(),
            raw_event_count: 1,
            raw_events: Vec::new(),
            open: false,
        });
    }

    fn open_group(
        &mut self,
        key: GroupKey,
        display_type: DisplayType,
        id: String,
        raw: &RawEvent,
        log: &mut Vec<ConsolidatedEvent>,
    ) {
        // A reopened key starts a fresh group instance; the old entry stays
        // emitted at its original position.
        if self.is_open(&key, log) {
            self.touch(&key, raw, log);
            return;
        }
        let mut entry = ConsolidatedEvent {
            display_type,
            id,
            start_time_ms: raw.timestamp_ms,
            end_time_ms: None,
            display_summary: String::new(),
            raw_event_count: 0,
            raw_events: Vec::new(),
            open: true,
        };
        record_raw(&mut entry, raw, self.raw_event_cap);
        log.push(entry);
        self.groups.insert(key.clone(), log.len() - 1);
        self.accum.insert(key, String::new());
    }

    fn close_group(
        &mut self,
        key: &GroupKey,
        raw: &RawEvent,
        log: &mut Vec<ConsolidatedEvent>,
    ) -> bool {
        let cap = self.raw_event_cap;
        let text = self.accum.get(key).cloned();
        let Some(entry) = self.open_entry_mut(key, log) else {
            return false;
        };
        record_raw(entry, raw, cap);
        entry.end_time_ms = Some(raw.timestamp_ms);
        entry.open = false;
        if entry.display_type == DisplayType::TextMessage
            || entry.display_type == DisplayType::Thinking
        {
            entry.display_summary = preview(&text.unwrap_or_default(), SUMMARY_PREVIEW_CHARS);
        }
        true
    }

    fn passthrough(&mut self, raw: &RawEvent, summary: &str, log: &mut Vec<ConsolidatedEvent>) {
        log.push(ConsolidatedEvent {
            display_type: DisplayType::Passthrough {
                raw_type: raw.event.kind().to_string(),
            },
            id: String::new(),
            start_time_ms: raw.timestamp_ms,
            end_time_ms: Some(raw.timestamp_ms),
            display_summary: summary.to_string(),
            raw_event_count: 1,
            raw_events: vec![raw.clone()],
            open: false,
        });
    }

    fn touch(&mut self, key: &GroupKey, raw: &RawEvent, log: &mut Vec<ConsolidatedEvent>) {
        let cap = self.raw_event_cap;
        if let Some(entry) = self.open_entry_mut(key, log) {
            record_raw(entry, raw, cap);
        }
    }

    fn is_open(&self, key: &GroupKey, log: &[ConsolidatedEvent]) -> bool {
        self.groups
            .get(key)
            .and_then(|idx| log.get(*idx))
            .is_some_and(|entry| entry.open)
    }

    fn entry_mut<'a>(
        &self,
        key: &GroupKey,
        log: &'a mut [ConsolidatedEvent],
    ) -> Option<&'a mut ConsolidatedEvent> {
        self.groups.get(key).and_then(|idx| log.get_mut(*idx))
    }

    fn open_entry_mut<'a>(
        &self,
        key: &GroupKey,
        log: &'a mut [ConsolidatedEvent],
    ) -> Option<&'a mut ConsolidatedEvent> {
        self.entry_mut(key, log).filter(|entry| entry.open)
    }
}

fn record_raw(entry: &mut ConsolidatedEvent, raw: &RawEvent, cap: usize) {
    entry.raw_event_count = entry.raw_event_count.saturating_add(1);
    if entry.raw_events.len() < cap {
        entry.raw_events.push(raw.clone());
    }
}

fn passthrough_summary(event: &AgUiEvent) -> String {
    match event {
        AgUiEvent::RunStarted { run_id, .. } => format!("run {run_id} started"),
        AgUiEvent::RunFinished { .. } => "run finished".to_string(),
        AgUiEvent::RunError { message, .. } => {
            format!("run error: {}", preview(message, SUMMARY_PREVIEW_CHARS))
        }
        AgUiEvent::StateSnapshot { items } => format!("state snapshot ({} items)", items.len()),
        AgUiEvent::StateDelta { ops } => format!(
            "state delta (+{} ~{} -{})",
            ops.add.len(),
            ops.update.len(),
            ops.remove.len()
        ),
        AgUiEvent::ActivitySnapshot { activity } => {
            format!("activity: {}", preview(&activity.description, SUMMARY_PREVIEW_CHARS))
        }
        AgUiEvent::ActivityDelta { .. } => "activity update".to_string(),
        AgUiEvent::Custom { name, .. } => format!("custom: {name}"),
        AgUiEvent::Raw { .. } => "raw passthrough event".to_string(),
        other => other.kind().to_string(),
    }
}
