//! The housekeeper
//!
//! One lightweight background task per registered chore, each on its own
//! interval: the demand-idle sweep, terminal-entry GC, and whatever else
//! the daemon wires in. Shutdown is idempotent and stops every chore.

use parking_lot::Mutex;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

pub struct Housekeeper {
    shutdown_tx: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Default for Housekeeper {
    fn default() -> Self {
        Self::new()
    }
}

impl Housekeeper {
    #[must_use]
    pub fn new() -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            shutdown_tx,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Run `chore` every `interval` until shutdown.
    pub fn register<F>(&self, name: &'static str, interval: Duration, chore: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let handle = tokio::spawn(async move {
            tracing::debug!(name, ?interval, "housekeeping chore registered");
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => chore(),
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            tracing::debug!(name, "housekeeping chore stopped");
                            return;
                        }
                    }
                }
            }
        });
        self.tasks.lock().push(handle);
    }

    /// Stop all chores; safe to call more than once.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        for handle in self.tasks.lock().drain(..) {
            handle.abort();
        }
    }
}

impl Drop for Housekeeper {
    fn drop(&mut self) {
        self.shutdown();
    }
}
