//! Per-key singleflight coalescing (spec §4.1).
//!
//! Concurrent callers arriving for the same key while a computation is in
//! flight all observe the same result. The computation itself runs
//! detached in a spawned task so that an individual caller abandoning its
//! wait (client disconnect, timeout) never cancels the shared work — only
//! the last reference to its `JoinHandle` would, and nothing here holds
//! one. A sharded concurrent map of in-flight entries, each gated by a
//! `tokio::sync::Notify`, generalized from a fixed response type to an
//! arbitrary factory output.

use std::{
    future::Future,
    sync::{Arc, OnceLock},
};

use dashmap::{mapref::entry::Entry as MapEntry, DashMap};
use log::debug;
use tokio::sync::Notify;

/// Whether a caller's `schedule` call ran the factory itself or coalesced
/// onto another caller's in-flight run.
///
/// Spec §9 flags the original "nested closure over a mutable `executed`
/// flag" as a footgun and recommends an explicit return type instead; this
/// is that explicit type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    /// This caller's arrival created the in-flight entry and ran `factory`.
    Owner,
    /// This caller coalesced onto an already in-flight computation.
    Coalesced,
}

impl Provenance {
    /// True if this caller ran the factory.
    pub fn is_owner(self) -> bool {
        matches!(self, Provenance::Owner)
    }
}

struct Slot<T, E> {
    notify: Notify,
    result: OnceLock<Result<Arc<T>, Arc<E>>>,
}

impl<T, E> Slot<T, E> {
    fn new() -> Self {
        Self { notify: Notify::new(), result: OnceLock::new() }
    }
}

/// Coalesces concurrent callers on the same key onto a single in-flight
/// asynchronous factory invocation.
pub struct WorkDispatcher<T, E> {
    inflight: Arc<DashMap<String, Arc<Slot<T, E>>>>,
}

impl<T, E> Clone for WorkDispatcher<T, E> {
    fn clone(&self) -> Self {
        Self { inflight: self.inflight.clone() }
    }
}

impl<T, E> Default for WorkDispatcher<T, E> {
    fn default() -> Self {
        Self { inflight: Arc::new(DashMap::new()) }
    }
}

impl<T, E> WorkDispatcher<T, E>
where
    T: Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    /// Creates an empty dispatcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `factory(key)`'s result exactly once per key among concurrent
    /// callers, returning the shared outcome and whether this caller was
    /// the one that ran it.
    ///
    /// `factory` runs in a detached task, so it keeps running for the
    /// remaining waiters even if this caller's own future is dropped.
    pub async fn schedule<F, Fut>(
        &self,
        key: impl Into<String>,
        factory: F,
    ) -> (Provenance, Result<Arc<T>, Arc<E>>)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let key = key.into();
        let (provenance, slot) = match self.inflight.entry(key.clone()) {
            MapEntry::Occupied(occupied) => {
                debug!("coalescing onto in-flight computation for key `{key}`");
                (Provenance::Coalesced, occupied.get().clone())
            }
            MapEntry::Vacant(vacant) => {
                debug!("became owner for key `{key}`");
                let slot: Arc<Slot<T, E>> = Arc::new(Slot::new());
                vacant.insert(slot.clone());
                self.spawn_owner(key.clone(), slot.clone(), factory);
                (Provenance::Owner, slot)
            }
        };

        // Canonical `Notify` pattern: construct the `notified()` future
        // before checking whether the result already landed, so a
        // publish-and-notify that happens concurrently can't be missed.
        let notified = slot.notify.notified();
        if let Some(result) = slot.result.get() {
            return (provenance, result.clone());
        }
        notified.await;
        let result = slot
            .result
            .get()
            .expect("owner publishes the result before calling notify_waiters")
            .clone();
        (provenance, result)
    }

    fn spawn_owner<F, Fut>(&self, key: String, slot: Arc<Slot<T, E>>, factory: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let inflight = self.inflight.clone();
        tokio::spawn(async move {
            let outcome = factory().await;
            let shared: Result<Arc<T>, Arc<E>> = match outcome {
                Ok(value) => Ok(Arc::new(value)),
                Err(error) => Err(Arc::new(error)),
            };
            // Remove-before-publish: a new arrival after this point starts
            // its own computation rather than piggybacking on a result
            // about to be handed out and dropped.
            inflight.remove(&key);
            let _ = slot.result.set(shared);
            slot.notify.notify_waiters();
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn single_caller_is_owner() {
        let dispatcher: WorkDispatcher<u32, String> = WorkDispatcher::new();
        let (provenance, result) =
            dispatcher.schedule("k", || async { Ok(42) }).await;
        assert_eq!(provenance, Provenance::Owner);
        assert_eq!(*result.unwrap(), 42);
    }

    #[tokio::test]
    async fn concurrent_callers_coalesce_onto_one_factory_run() {
        let dispatcher: WorkDispatcher<u32, String> = WorkDispatcher::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..50 {
            let dispatcher = dispatcher.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                dispatcher
                    .schedule("shared-key", move || {
                        let calls = calls.clone();
                        async move {
                            calls.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(20)).await;
                            Ok::<_, String>(7)
                        }
                    })
                    .await
            }));
        }

        let mut owners = 0;
        for handle in handles {
            let (provenance, result) = handle.await.unwrap();
            assert_eq!(*result.unwrap(), 7);
            if provenance.is_owner() {
                owners += 1;
            }
        }

        assert_eq!(owners, 1, "exactly one caller should run the factory");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn waiters_observe_the_same_failure_as_the_owner() {
        let dispatcher: WorkDispatcher<u32, String> = WorkDispatcher::new();

        let mut handles = Vec::new();
        for _ in 0..10 {
            let dispatcher = dispatcher.clone();
            handles.push(tokio::spawn(async move {
                dispatcher
                    .schedule("boom", || async {
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        Err::<u32, _>("upstream exploded".to_string())
                    })
                    .await
            }));
        }

        for handle in handles {
            let (_, result) = handle.await.unwrap();
            assert_eq!(*result.unwrap_err(), "upstream exploded");
        }
    }

    #[tokio::test]
    async fn a_new_key_after_completion_runs_a_fresh_factory() {
        let dispatcher: WorkDispatcher<u32, String> = WorkDispatcher::new();
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let calls = calls.clone();
            dispatcher
                .schedule("k", move || {
                    let calls = calls.clone();
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok::<_, String>(1)
                    }
                })
                .await;
        }

        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn abandoning_a_wait_does_not_stop_the_shared_factory() {
        let dispatcher: WorkDispatcher<u32, String> = WorkDispatcher::new();
        let completed = Arc::new(AtomicUsize::new(0));

        let owner_dispatcher = dispatcher.clone();
        let completed_clone = completed.clone();
        let owner = tokio::spawn(async move {
            owner_dispatcher
                .schedule("k", move || {
                    let completed = completed_clone.clone();
                    async move {
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        completed.fetch_add(1, Ordering::SeqCst);
                        Ok::<_, String>(9)
                    }
                })
                .await
        });

        // Give the owner a moment to register, then abandon a second wait
        // on the same key almost immediately by timing it out.
        tokio::time::sleep(Duration::from_millis(5)).await;
        let waiter_dispatcher = dispatcher.clone();
        let _ = tokio::time::timeout(
            Duration::from_millis(1),
            waiter_dispatcher.schedule("k", || async { Ok::<_, String>(0) }),
        )
        .await;

        let (_, result) = owner.await.unwrap();
        assert_eq!(*result.unwrap(), 9);
        assert_eq!(completed.load(Ordering::SeqCst), 1);
    }
}
