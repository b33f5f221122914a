//! Cancellable periodic background thread.
//!
//! A [`PeriodicTask`] runs a tick closure, then waits for the interval on its stop channel,
//! so a stop request interrupts the wait immediately instead of after a full interval.
//! Tick errors and panics are logged and the loop continues; only a stop request (or
//! dropping the task handle) ends it.
//!
//! Shutdown:
//! - `stop()` raises the tick's [`StopFlag`], sends the stop signal and waits, up to a
//!   timeout, for the thread to drop its `done` sender. Once `stop()` returns `true` no
//!   further tick will start.
//! - A long tick is expected to check its [`StopFlag`] between units of work and return
//!   early. If the thread is still inside a tick past the timeout, the handle is detached
//!   and a warning is logged; the thread exits as soon as the tick returns.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, bounded, select};
use log::{debug, error, info, warn};
use quote_common::Result;

/// Raised once `stop()` has been requested; handed to every tick.
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    /// Whether the owning task has been asked to stop.
    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Handle to a running periodic thread.
pub struct PeriodicTask {
    name: String,
    stop_flag: StopFlag,
    stop_tx: Sender<()>,
    done_rx: Receiver<()>,
    handle: Option<JoinHandle<()>>,
}

impl PeriodicTask {
    /// Spawn a named thread calling `tick` every `interval`, starting immediately.
    pub fn spawn<F>(name: &str, interval: Duration, mut tick: F) -> Result<Self>
    where
        F: FnMut(&StopFlag) -> Result<()> + Send + 'static,
    {
        let stop_flag = StopFlag::default();
        let tick_flag = stop_flag.clone();
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let (done_tx, done_rx) = bounded::<()>(0);
        let thread_name = name.to_string();

        let handle = thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || {
                // Dropped when the loop ends, which is what `stop` waits for.
                let _done = done_tx;
                info!("{} started (interval {:?})", thread_name, interval);

                loop {
                    if stop_requested(&stop_rx) {
                        break;
                    }

                    match panic::catch_unwind(AssertUnwindSafe(|| tick(&tick_flag))) {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => warn!("{} tick failed: {}", thread_name, e),
                        Err(_) => error!("{} tick panicked; continuing", thread_name),
                    }

                    select! {
                        recv(stop_rx) -> _ => break,
                        default(interval) => {}
                    }
                }
                info!("{} stopped", thread_name);
            })?;

        Ok(Self {
            name: name.to_string(),
            stop_flag,
            stop_tx,
            done_rx,
            handle: Some(handle),
        })
    }

    /// Request the loop to exit and wait up to `timeout` for it.
    ///
    /// Returns `true` when the thread has terminated.
    pub fn stop(mut self, timeout: Duration) -> bool {
        self.stop_flag.raise();
        let _ = self.stop_tx.try_send(());

        match self.done_rx.recv_timeout(timeout) {
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    "{} did not stop within {:?}; detaching it",
                    self.name, timeout
                );
                self.handle.take();
                false
            }
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if let Some(handle) = self.handle.take() {
                    if handle.join().is_err() {
                        error!("{} thread panicked while exiting", self.name);
                    }
                }
                debug!("{} joined", self.name);
                true
            }
        }
    }
}

/// A pending signal or a dropped sender both mean "stop".
fn stop_requested(stop_rx: &Receiver<()>) -> bool {
    !matches!(stop_rx.try_recv(), Err(TryRecvError::Empty))
}
