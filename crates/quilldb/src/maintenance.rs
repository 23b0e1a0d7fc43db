//! Background maintenance thread.
//!
//! One dedicated thread per engine instance. Every checkpoint interval it
//! flushes counter checkpoints, persists the tick high-water mark, and
//! retries queued cleanup tasks. Shutdown
//! wakes the thread through the condvar and joins it; the final counter
//! checkpoint is written by the engine after the join, so a graceful
//! shutdown never skips it.

use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{debug, warn};

use quilldb_storage::StorageEngine;

use crate::engine::EngineInner;

/// Handle to the running maintenance thread.
pub(crate) struct MaintenanceHandle {
    signal: Arc<(Mutex<bool>, Condvar)>,
    thread: Option<JoinHandle<()>>,
}

impl MaintenanceHandle {
    /// Signal the thread to stop and wait for it to finish its current
    /// pass.
    pub(crate) fn stop(mut self) {
        {
            let (lock, cvar) = &*self.signal;
            let mut stop = lock.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            *stop = true;
            cvar.notify_all();
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("maintenance thread panicked");
            }
        }
    }
}

/// Start the maintenance thread for `inner`.
pub(crate) fn spawn<E: StorageEngine + 'static>(
    inner: Arc<EngineInner<E>>,
    interval: Duration,
) -> std::io::Result<MaintenanceHandle> {
    let signal = Arc::new((Mutex::new(false), Condvar::new()));
    let thread_signal = Arc::clone(&signal);

    let thread = std::thread::Builder::new()
        .name("quilldb-maintenance".into())
        .spawn(move || run(&inner, &thread_signal, interval))?;

    Ok(MaintenanceHandle { signal, thread: Some(thread) })
}

fn run<E: StorageEngine>(
    inner: &EngineInner<E>,
    signal: &(Mutex<bool>, Condvar),
    interval: Duration,
) {
    let (lock, cvar) = signal;
    loop {
        {
            let stop = lock.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            let (stop, _) = cvar
                .wait_timeout(stop, interval)
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            if *stop {
                break;
            }
        }

        if let Err(e) = inner.counters.checkpoint_all(&inner.store) {
            warn!(error = %e, "periodic counter checkpoint failed");
        }
        if let Err(e) = inner.persist_tick() {
            warn!(error = %e, "tick persistence failed");
        }
        inner.run_pending_cleanups();

        let pending = inner.pending_cleanups();
        if pending > 0 {
            debug!(pending, "cleanup tasks still queued");
        }
    }
}
