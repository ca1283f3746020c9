use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

enum Command<T> {
    Pending(T),
    Cancel,
}

/// Delays a value until input has been quiet for `delay`.
///
/// Every `set_pending` restarts the timer; `on_stable` fires once with the
/// latest value when the timer runs out. Dropping the handle cancels any
/// pending firing, and `on_stable` is never called after that: `on_stable`
/// runs under the same lock the drop takes, so a firing already in progress
/// completes before the drop returns.
///
/// Must be created inside a tokio runtime.
pub struct Debouncer<T> {
    tx: mpsc::UnboundedSender<Command<T>>,
    current: Arc<Mutex<T>>,
    disposed: Arc<Mutex<bool>>,
    task: JoinHandle<()>,
}

impl<T> Debouncer<T>
where
    T: Clone + Send + 'static,
{
    pub fn new<F>(initial: T, on_stable: F, delay: Duration) -> Self
    where
        F: FnMut(T) + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let disposed = Arc::new(Mutex::new(false));
        let task = tokio::spawn(run_timer(rx, delay, on_stable, disposed.clone()));
        Self {
            tx,
            current: Arc::new(Mutex::new(initial)),
            disposed,
            task,
        }
    }

    pub fn set_pending(&self, value: T) {
        if let Ok(mut current) = self.current.lock() {
            *current = value.clone();
        }
        let _ = self.tx.send(Command::Pending(value));
    }

    /// Replaces the held value from outside (e.g. a restored URL) without
    /// scheduling a firing. Cancels anything pending.
    pub fn sync(&self, value: T) {
        if let Ok(mut current) = self.current.lock() {
            *current = value;
        }
        let _ = self.tx.send(Command::Cancel);
    }

    pub fn current(&self) -> Option<T> {
        self.current.lock().ok().map(|v| v.clone())
    }

    pub fn dispose(self) {}
}

impl<T> Drop for Debouncer<T> {
    fn drop(&mut self) {
        *lock_gate(&self.disposed) = true;
        self.task.abort();
    }
}

async fn run_timer<T, F>(
    mut rx: mpsc::UnboundedReceiver<Command<T>>,
    delay: Duration,
    mut on_stable: F,
    disposed: Arc<Mutex<bool>>,
) where
    F: FnMut(T),
{
    let mut pending: Option<T> = None;
    loop {
        let value = match pending.take() {
            Some(value) => value,
            None => match rx.recv().await {
                Some(Command::Pending(value)) => {
                    pending = Some(value);
                    continue;
                }
                Some(Command::Cancel) => continue,
                None => return,
            },
        };

        tokio::select! {
            cmd = rx.recv() => match cmd {
                Some(Command::Pending(next)) => pending = Some(next),
                Some(Command::Cancel) => {}
                None => return,
            },
            _ = tokio::time::sleep(delay) => {
                let gate = lock_gate(&disposed);
                if *gate {
                    return;
                }
                on_stable(value);
            }
        }
    }
}

fn lock_gate(gate: &Mutex<bool>) -> MutexGuard<'_, bool> {
    gate.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
