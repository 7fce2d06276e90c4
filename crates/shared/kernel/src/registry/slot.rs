use super::LifecycleError;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Lifecycle state of a registered resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceState {
    Uninitialized,
    Initializing,
    Ready,
    Closed,
}

/// One initialize-at-most-once resource cell.
///
/// The `OnceCell` provides the claim-construction step: arbitrary concurrent
/// first callers race on it, exactly one runs the constructor, the rest wait
/// and observe the same instance. Steady-state access after readiness takes
/// no lock. A failed construction leaves the cell empty so a later call may
/// retry.
#[derive(Debug)]
pub(super) struct Slot<T> {
    name: &'static str,
    cell: OnceCell<Arc<T>>,
    state: Mutex<ResourceState>,
}

impl<T> Slot<T> {
    pub(super) const fn new(name: &'static str) -> Self {
        Self { name, cell: OnceCell::const_new(), state: Mutex::new(ResourceState::Uninitialized) }
    }

    pub(super) fn state(&self) -> ResourceState {
        *self.state.lock()
    }

    /// Returns the instance, constructing it on first call.
    ///
    /// # Errors
    /// [`LifecycleError::Closed`] after shutdown; the constructor's error
    /// on a failed first initialization.
    pub(super) async fn get_or_init<F, Fut>(&self, ctor: F) -> Result<Arc<T>, LifecycleError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, LifecycleError>>,
    {
        if self.state() == ResourceState::Closed {
            return Err(LifecycleError::Closed { resource: self.name });
        }

        self.cell
            .get_or_try_init(|| async {
                *self.state.lock() = ResourceState::Initializing;
                match ctor().await {
                    Ok(value) => {
                        *self.state.lock() = ResourceState::Ready;
                        Ok(Arc::new(value))
                    }
                    Err(e) => {
                        *self.state.lock() = ResourceState::Uninitialized;
                        Err(e)
                    }
                }
            })
            .await
            .map(Arc::clone)
    }

    /// The instance, if construction already completed.
    pub(super) fn ready(&self) -> Option<&Arc<T>> {
        self.cell.get()
    }

    /// Transitions to `Closed`. Returns `false` when already closed, so
    /// callers can skip duplicate teardown work.
    pub(super) fn mark_closed(&self) -> bool {
        let mut state = self.state.lock();
        if *state == ResourceState::Closed {
            false
        } else {
            *state = ResourceState::Closed;
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_first_access_constructs_exactly_once() {
        let slot = Arc::new(Slot::<u64>::new("test"));
        let constructions = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let slot = Arc::clone(&slot);
            let constructions = Arc::clone(&constructions);
            handles.push(tokio::spawn(async move {
                slot.get_or_init(|| async {
                    constructions.fetch_add(1, Ordering::SeqCst);
                    tokio::task::yield_now().await;
                    Ok(7)
                })
                .await
                .expect("init")
            }));
        }

        let mut instances = Vec::new();
        for handle in handles {
            instances.push(handle.await.expect("join"));
        }

        assert_eq!(constructions.load(Ordering::SeqCst), 1, "exactly one construction");
        assert!(instances.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        assert_eq!(slot.state(), ResourceState::Ready);
    }

    #[tokio::test]
    async fn failed_construction_can_be_retried() {
        let slot = Slot::<u64>::new("test");

        let err = slot
            .get_or_init(|| async {
                Err(LifecycleError::Init {
                    resource: "test",
                    message: "boom".into(),
                    context: None,
                })
            })
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::Init { .. }));
        assert_eq!(slot.state(), ResourceState::Uninitialized);

        let value = slot.get_or_init(|| async { Ok(3) }).await.expect("retry succeeds");
        assert_eq!(*value, 3);
        assert_eq!(slot.state(), ResourceState::Ready);
    }

    #[tokio::test]
    async fn closed_slot_refuses_access() {
        let slot = Slot::<u64>::new("test");
        assert!(slot.mark_closed());
        assert!(!slot.mark_closed(), "second close is a no-op");

        let err = slot.get_or_init(|| async { Ok(1) }).await.unwrap_err();
        assert!(matches!(err, LifecycleError::Closed { resource: "test" }));
    }
}
