//! Recurring timer owned by a single tracker instance.
//!
//! Each timer is one worker thread parked on a channel with a timeout. A
//! message (or a dropped sender) ends it; the callback can also end it by
//! returning [`ControlFlow::Break`]. Cancelling joins the thread, so once
//! `cancel` returns the callback will never run again.

use std::ops::ControlFlow;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, error};

#[derive(Debug)]
pub struct RepeatingTimer {
    name: &'static str,
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl RepeatingTimer {
    /// Call `callback` every `interval` until it breaks or the timer is
    /// cancelled. A panicking callback is logged and stops the timer.
    pub fn spawn<F>(name: &'static str, interval: Duration, mut callback: F) -> std::io::Result<Self>
    where
        F: FnMut() -> ControlFlow<()> + Send + 'static,
    {
        let (stop, stopped) = mpsc::channel::<()>();
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                loop {
                    match stopped.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }

                    match panic::catch_unwind(AssertUnwindSafe(&mut callback)) {
                        Ok(ControlFlow::Continue(())) => {}
                        Ok(ControlFlow::Break(())) => {
                            debug!(timer = name, "timer finished");
                            break;
                        }
                        Err(_) => {
                            error!(timer = name, "timer callback panicked; stopping");
                            break;
                        }
                    }
                }
            })?;

        Ok(Self {
            name,
            stop: Some(stop),
            handle: Some(handle),
        })
    }

    /// True until the worker thread has exited.
    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Stop the timer and wait for an in-flight callback to return.
    /// Safe to call more than once.
    pub fn cancel(&mut self) {
        if let Some(stop) = self.stop.take() {
            // The worker may already be gone; nothing to report then.
            let _ = stop.send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.thread().id() == thread::current().id() {
                // Cancelled from inside its own callback; the loop exits on
                // the next receive.
                return;
            }
            if handle.join().is_err() {
                error!(timer = self.name, "timer thread panicked");
            }
        }
    }
}

impl Drop for RepeatingTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}
