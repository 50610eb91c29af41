//! Background reachability polling
//!
//! [`StatusMonitor`] runs a check on its own thread right away and then once
//! per interval, handing every result to a callback. It only reports; it never
//! touches package state, so it can run alongside a sync.

use std::fmt;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerStatus {
    Online,
    Offline,
}

impl ServerStatus {
    pub fn from_reachable(reachable: bool) -> Self {
        if reachable {
            ServerStatus::Online
        } else {
            ServerStatus::Offline
        }
    }
}

impl fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerStatus::Online => write!(f, "online"),
            ServerStatus::Offline => write!(f, "offline"),
        }
    }
}

/// Handle to a running monitor; dropping it stops the thread.
pub struct StatusMonitor {
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl StatusMonitor {
    pub fn spawn<C, F>(interval: Duration, check: C, on_status: F) -> Self
    where
        C: Fn() -> ServerStatus + Send + 'static,
        F: Fn(ServerStatus) + Send + 'static,
    {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let handle = thread::spawn(move || loop {
            on_status(check());

            match stop_rx.recv_timeout(interval) {
                Err(RecvTimeoutError::Timeout) => continue,
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        });

        Self {
            stop: Some(stop_tx),
            handle: Some(handle),
        }
    }

    /// Stop polling and wait for an in-flight check to finish.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::warn!("Status monitor thread panicked");
            }
        }
    }
}

impl Drop for StatusMonitor {
    fn drop(&mut self) {
        self.shutdown();
    }
}
