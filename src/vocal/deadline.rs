//! Deadline-bounded adapter calls
//!
//! Adapters are blocking and may hang. Each call runs on its own worker
//! thread and the caller waits on a channel for at most the timeout. An
//! expired worker is detached and left to finish on its own; its result is
//! dropped.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeadlineError {
    #[error("{adapter} timed out after {timeout_ms} ms")]
    TimedOut { adapter: String, timeout_ms: u128 },

    #[error("{adapter} worker exited without a result")]
    WorkerLost { adapter: String },

    #[error("could not start {adapter} worker: {reason}")]
    Spawn { adapter: String, reason: String },
}

/// Run `call` on a worker thread, giving up after `timeout`
pub fn call_with_timeout<T, F>(adapter: &str, timeout: Duration, call: F) -> Result<T, DeadlineError>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    thread::Builder::new()
        .name(format!("adapter-{}", adapter))
        .spawn(move || {
            // The receiver is gone once the caller has timed out.
            let _ = tx.send(call());
        })
        .map_err(|e| DeadlineError::Spawn { adapter: adapter.to_string(), reason: e.to_string() })?;

    match rx.recv_timeout(timeout) {
        Ok(value) => Ok(value),
        Err(RecvTimeoutError::Timeout) => Err(DeadlineError::TimedOut {
            adapter: adapter.to_string(),
            timeout_ms: timeout.as_millis(),
        }),
        Err(RecvTimeoutError::Disconnected) => Err(DeadlineError::WorkerLost { adapter: adapter.to_string() }),
    }
}
