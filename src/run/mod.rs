//! Run-side state machines: assembly, consolidation, merging, control.

pub mod consolidate;
pub mod controller;
pub mod messages;
pub mod session;
pub mod state;
pub mod tool_calls;

pub use consolidate::{ConsolidatedEvent, Consolidator, DisplayType, DEFAULT_RAW_EVENT_CAP};
pub use controller::RunSessionController;
pub use messages::TextMessageAssembler;
pub use session::{
    CanvasState, Message, RunSession, RunStatus, ToolCallRecord, ToolCallStatus,
};
pub use tool_calls::ToolCallAssembler;
