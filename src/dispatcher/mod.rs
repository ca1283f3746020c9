use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::navigation::Navigator;
use crate::query::{self, QueryMap};
use crate::state::TableStateSnapshot;

/// Pushes table state into the URL.
///
/// Each dispatch serializes the snapshot over the navigator's current query
/// and replaces the current history entry. A map equal to the current one
/// is not sent again.
pub struct QueryDispatcher {
    navigator: Arc<dyn Navigator>,
    last: Mutex<Option<QueryMap>>,
}

impl QueryDispatcher {
    pub fn new(navigator: Arc<dyn Navigator>) -> Self {
        Self {
            navigator,
            last: Mutex::new(None),
        }
    }

    /// Returns the map that was navigated to, or `None` if nothing changed.
    pub fn dispatch(&self, snapshot: &TableStateSnapshot) -> Option<QueryMap> {
        let current = self.navigator.location().query;
        let next = query::serialize(snapshot, &current);

        let Ok(mut last) = self.last.lock() else {
            return None;
        };
        if next == current {
            tracing::debug!(query = %next, "query unchanged, skipping navigation");
            *last = Some(next);
            return None;
        }

        tracing::debug!(query = %next, "dispatching table query");
        if !self.navigator.replace(next.clone()) {
            return None;
        }
        *last = Some(next.clone());
        Some(next)
    }

    pub fn last_dispatched(&self) -> Option<QueryMap> {
        self.last.lock().ok().and_then(|l| l.clone())
    }

    /// Dispatches the current snapshot, then every newer one, until the
    /// store is dropped. Snapshots published while a dispatch is running
    /// collapse into the latest.
    pub async fn run(self: Arc<Self>, mut snapshots: watch::Receiver<TableStateSnapshot>) {
        loop {
            let snapshot = snapshots.borrow_and_update().clone();
            self.dispatch(&snapshot);
            if snapshots.changed().await.is_err() {
                tracing::debug!("table store dropped, dispatcher stopping");
                return;
            }
        }
    }

    pub fn spawn(
        self: &Arc<Self>,
        snapshots: watch::Receiver<TableStateSnapshot>,
    ) -> JoinHandle<()> {
        tokio::spawn(self.clone().run(snapshots))
    }
}
