//! Client-side processing pipeline for AG-UI agent event streams.
//!
//! Layers, bottom to top: [`transport`] yields raw byte chunks, [`protocol`]
//! reassembles SSE frames and decodes typed events, [`run`] folds events into
//! the session model, and [`driver`] owns the async task tying them together.

pub mod config;
pub mod driver;
pub mod error;
pub mod protocol;
pub mod run;
pub mod textutil;
pub mod transport;

#[doc(hidden)]
pub mod testsupport;

pub use config::{load_config, ClientConfig};
pub use driver::{spawn_run, RunHandle, StallPolicy};
pub use protocol::{AgUiEvent, EventDecoder, RawEvent};
pub use run::{RunSession, RunSessionController, RunStatus};
pub use transport::{EventTransport, HttpEventTransport, RunRequest};
