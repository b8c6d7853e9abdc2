use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Elapsed-seconds counter for one recording cycle. Counts up once per
/// second from 0 while running; `stop()` halts it and resets the published
/// value to 0. Nothing persists across sessions.
pub struct SessionClock {
    elapsed_tx: Arc<watch::Sender<u64>>,
    epoch: Arc<AtomicU64>,
    tick_task: Option<JoinHandle<()>>,
}

impl SessionClock {
    pub fn new() -> Self {
        let (elapsed_tx, _rx) = watch::channel(0u64);
        Self {
            elapsed_tx: Arc::new(elapsed_tx),
            epoch: Arc::new(AtomicU64::new(0)),
            tick_task: None,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.elapsed_tx.subscribe()
    }

    /// Resets the counter to 0 and begins incrementing once per second.
    pub fn start(&mut self) {
        self.halt();
        let _ = self.elapsed_tx.send(0);

        let my_epoch = self.epoch.load(Ordering::SeqCst);
        let tx = self.elapsed_tx.clone();
        let epoch = self.epoch.clone();
        self.tick_task = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));
            // The first tick of a tokio interval completes immediately.
            interval.tick().await;

            let mut secs: u64 = 0;
            loop {
                interval.tick().await;
                secs += 1;

                // The epoch check and the write share the channel lock, so a
                // tick that raced with stop() cannot land after the reset.
                let fresh = tx.send_if_modified(|v| {
                    if epoch.load(Ordering::SeqCst) != my_epoch {
                        return false;
                    }
                    *v = secs;
                    true
                });
                if !fresh {
                    break;
                }
            }
        }));
    }

    /// Halts incrementing and resets the published value to 0.
    pub fn stop(&mut self) {
        self.halt();
        let _ = self.elapsed_tx.send(0);
    }

    fn halt(&mut self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        if let Some(task) = self.tick_task.take() {
            task.abort();
        }
    }
}

impl Default for SessionClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SessionClock {
    fn drop(&mut self) {
        self.halt();
    }
}
