//! Cancellable periodic timer used for the keep-alive check.
//!
//! The timer thread waits on a stop channel with a timeout equal to the
//! period; a timeout means "tick", anything else means "stop". Stopping
//! joins the thread, so once [`PeriodicTimer::stop`] returns the callback
//! will never run again.

use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use log::{debug, warn};
use std::io;
use std::thread::{self, JoinHandle};
use std::time::Duration;

pub struct PeriodicTimer {
    name: String,
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl PeriodicTimer {
    /// Spawns a thread calling `tick` every `period` until stopped
    pub fn start<F>(name: &str, period: Duration, mut tick: F) -> io::Result<Self>
    where
        F: FnMut() + Send + 'static,
    {
        let (stop_tx, stop_rx) = bounded::<()>(1);

        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || loop {
                match stop_rx.recv_timeout(period) {
                    Err(RecvTimeoutError::Timeout) => tick(),
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            })?;

        debug!("Timer '{}' started with period {:?}", name, period);
        Ok(Self {
            name: name.to_string(),
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        })
    }

    /// Stops the timer and waits for its thread to exit. Idempotent.
    pub fn stop(&mut self) {
        // Dropping the sender disconnects the channel and wakes the thread
        drop(self.stop_tx.take());

        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Timer '{}' thread panicked", self.name);
            } else {
                debug!("Timer '{}' stopped", self.name);
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }
}

impl Drop for PeriodicTimer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_timer_ticks_until_stopped() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ticks);

        let mut timer = PeriodicTimer::start("test-timer", Duration::from_millis(10), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        thread::sleep(Duration::from_millis(100));
        timer.stop();
        assert!(!timer.is_running());

        let after_stop = ticks.load(Ordering::SeqCst);
        assert!(after_stop >= 1);

        thread::sleep(Duration::from_millis(50));
        assert_eq!(ticks.load(Ordering::SeqCst), after_stop);
    }

    #[test]
    fn test_stop_is_idempotent() {
        let mut timer = PeriodicTimer::start("idle-timer", Duration::from_secs(60), || {}).unwrap();
        timer.stop();
        timer.stop();
        assert!(!timer.is_running());
    }

    #[test]
    fn test_stop_does_not_wait_for_period() {
        let mut timer =
            PeriodicTimer::start("slow-timer", Duration::from_secs(3600), || {}).unwrap();
        let started = std::time::Instant::now();
        timer.stop();
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
