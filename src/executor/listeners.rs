use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tracing::warn;

use crate::protocol::ExecEvent;

/// Subscriber to the events of the active run
pub trait RunListener: Send + Sync {
    fn on_event(&self, event: &ExecEvent) -> anyhow::Result<()>;
}

impl<F> RunListener for F
where
    F: Fn(&ExecEvent) -> anyhow::Result<()> + Send + Sync,
{
    fn on_event(&self, event: &ExecEvent) -> anyhow::Result<()> {
        self(event)
    }
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    entries: Vec<(u64, Arc<dyn RunListener>)>,
}

fn lock(registry: &Mutex<Registry>) -> MutexGuard<'_, Registry> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Fan-out list of run listeners, called in registration order
#[derive(Clone, Default)]
pub struct ListenerRegistry {
    inner: Arc<Mutex<Registry>>,
}

/// Deregisters one listener
#[derive(Debug, Clone)]
pub struct ListenerHandle {
    id: u64,
    registry: Weak<Mutex<Registry>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, listener: impl RunListener + 'static) -> ListenerHandle {
        let mut registry = lock(&self.inner);
        let id = registry.next_id;
        registry.next_id += 1;
        registry.entries.push((id, Arc::new(listener)));
        ListenerHandle {
            id,
            registry: Arc::downgrade(&self.inner),
        }
    }

    /// Deliver `event` to every listener registered when the call starts.
    /// A listener that fails or panics is logged and skipped; the rest still
    /// run. Returns the number of listeners that failed.
    pub fn dispatch(&self, event: &ExecEvent) -> usize {
        let snapshot: Vec<Arc<dyn RunListener>> = lock(&self.inner)
            .entries
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        let mut failures = 0;
        for listener in snapshot {
            match panic::catch_unwind(AssertUnwindSafe(|| listener.on_event(event))) {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    failures += 1;
                    warn!(kind = event.kind(), error = %err, "run listener failed");
                }
                Err(_) => {
                    failures += 1;
                    warn!(kind = event.kind(), "run listener panicked");
                }
            }
        }
        failures
    }

    pub fn len(&self) -> usize {
        lock(&self.inner).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        lock(&self.inner).entries.clear();
    }
}

impl std::fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("listeners", &self.len())
            .finish()
    }
}

impl ListenerHandle {
    /// Remove the listener. Returns false if it was already removed.
    pub fn remove(&self) -> bool {
        let Some(inner) = self.registry.upgrade() else {
            return false;
        };
        let mut registry = lock(&inner);
        let before = registry.entries.len();
        registry.entries.retain(|(id, _)| *id != self.id);
        registry.entries.len() != before
    }
}
