//! AG-UI wire protocol: typed event vocabulary and SSE decoding.

mod decoder;
mod events;

pub use decoder::{decode_frame, EventDecoder, SseFrameBuffer};
pub use events::{
    now_unix_millis, ActivityPatch, ActivityState, ActivityStatus, AgUiEvent,
    CanvasItem, MessageRole, RawEvent, StateDeltaOps,
};
