//! Async run driver.
//!
//! Owns the single task that pumps transport chunks through the decoder into
//! the controller. All session mutation happens on that task; observers watch
//! cloned snapshots. Cancellation is signalled over a watch channel and wins
//! the race against in-flight reads.

use crate::error::TransportError;
use crate::protocol::EventDecoder;
use crate::run::{RunSession, RunSessionController, RunStatus};
use crate::transport::EventTransport;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Stall detection policy: fail the run when no chunk arrives within the
/// window. The window restarts on every chunk.
#[derive(Debug, Clone, Copy, Default)]
pub struct StallPolicy {
    window: Option<Duration>,
}

impl StallPolicy {
    /// Never time out.
    pub fn none() -> Self {
        Self { window: None }
    }

    pub fn after(window: Duration) -> Self {
        Self {
            window: Some(window),
        }
    }
}

/// Handle to a spawned run.
///
/// Dropping the handle cancels the run.
pub struct RunHandle {
    cancel_tx: watch::Sender<bool>,
    task: JoinHandle<RunSession>,
}

impl RunHandle {
    /// Request cancellation. Safe to call repeatedly.
    pub fn cancel(&self) {
        let _ = self.cancel_tx.send(true);
    }

    /// Wait for the run task and take the final session.
    pub async fn join(self) -> Result<RunSession, tokio::task::JoinError> {
        self.task.await
    }
}

/// Spawn the run task for one stream.
///
/// The returned watch receiver holds the latest session snapshot; it is
/// updated after every decoded batch and once more at termination.
pub fn spawn_run<T>(
    transport: T,
    thread_id: impl Into<String>,
    policy: StallPolicy,
) -> (RunHandle, watch::Receiver<RunSession>)
where
    T: EventTransport + 'static,
{
    let mut controller = RunSessionController::new(thread_id);
    let (snapshot_tx, snapshot_rx) = watch::channel(controller.snapshot());
    let (cancel_tx, mut cancel_rx) = watch::channel(false);

    let task = tokio::spawn(async move {
        let mut transport = transport;
        let mut decoder = EventDecoder::new();
        loop {
            // The stall window is armed only once the run is underway; a
            // backend slow to emit its start event is not a stall.
            let window = match controller.session().status {
                RunStatus::Running => policy.window,
                _ => None,
            };
            let read = tokio::select! {
                // Cancellation (or a dropped handle) beats a pending read.
                _ = cancel_rx.changed() => {
                    controller.cancel();
                    break;
                }
                read = next_chunk_with_stall(&mut transport, window) => read,
            };
            match read {
                Ok(Some(chunk)) => {
                    for event in decoder.feed(&chunk) {
                        controller.dispatch(event);
                    }
                    let _ = snapshot_tx.send(controller.snapshot());
                    if controller.session().status.is_terminal() {
                        break;
                    }
                }
                Ok(None) => {
                    for event in decoder.finish() {
                        controller.dispatch(event);
                    }
                    if !controller.session().status.is_terminal() {
                        controller.mark_truncated();
                    }
                    break;
                }
                Err(ChunkError::Stalled(window_secs)) => {
                    controller.mark_stalled(window_secs);
                    break;
                }
                Err(ChunkError::Transport(err)) => {
                    controller.mark_transport_error(&err);
                    break;
                }
            }
        }
        let _ = snapshot_tx.send(controller.snapshot());
        controller.snapshot()
    });

    (RunHandle { cancel_tx, task }, snapshot_rx)
}

enum ChunkError {
    Stalled(u64),
    Transport(TransportError),
}

async fn next_chunk_with_stall<T: EventTransport>(
    transport: &mut T,
    window: Option<Duration>,
) -> Result<Option<Vec<u8>>, ChunkError> {
    match window {
        Some(window) => match tokio::time::timeout(window, transport.next_chunk()).await {
            Ok(read) => read.map_err(ChunkError::Transport),
            Err(_) => Err(ChunkError::Stalled(window.as_secs())),
        },
        None => transport.next_chunk().await.map_err(ChunkError::Transport),
    }
}
