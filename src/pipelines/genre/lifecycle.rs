use crate::error::{PipelineError, Result};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tokio::time::Duration;

/// Lifecycle state of the shared model handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelState {
    /// Nothing loaded yet.
    Unloaded,
    /// A load is in flight.
    Loading,
    /// Model available for inference.
    Ready,
    /// Model released; can be initialized again.
    Disposed,
}

/// What an `initialize` call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// A model was already loaded; nothing happened.
    AlreadyReady,
    /// Another call is loading; this one returned without waiting.
    AlreadyLoading,
    /// The real artifact was loaded.
    Loaded,
    /// Loading failed and an untrained placeholder was installed.
    Placeholder,
    /// The model was disposed while this load was running; the result was dropped.
    Discarded,
}

/// Bounds how long callers wait for a model that is still loading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessPolicy {
    /// Granularity of the wait.
    pub poll_interval: Duration,
    /// Number of intervals before giving up.
    pub max_attempts: u32,
}

impl ReadinessPolicy {
    /// Total time a caller may wait. Saturates instead of overflowing.
    pub fn max_wait(&self) -> Duration {
        self.poll_interval.saturating_mul(self.max_attempts)
    }
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            max_attempts: 50,
        }
    }
}

enum Slot<M> {
    Unloaded,
    Loading { previous: ModelState },
    Ready { model: Arc<M>, placeholder: bool },
    Disposed,
}

impl<M> Slot<M> {
    fn state(&self) -> ModelState {
        match self {
            Slot::Unloaded => ModelState::Unloaded,
            Slot::Loading { .. } => ModelState::Loading,
            Slot::Ready { .. } => ModelState::Ready,
            Slot::Disposed => ModelState::Disposed,
        }
    }

    fn idle(state: ModelState) -> Self {
        match state {
            ModelState::Disposed => Slot::Disposed,
            _ => Slot::Unloaded,
        }
    }
}

struct Inner<M> {
    slot: Slot<M>,
    // bumped by dispose so in-flight loads know their result is stale
    epoch: u64,
}

/// Owns the single model handle and its state machine.
///
/// `initialize` is idempotent and never queues a second load; `dispose`
/// releases the handle and allows a fresh `initialize` later.
pub struct ModelLifecycle<M> {
    inner: Mutex<Inner<M>>,
    state_tx: watch::Sender<ModelState>,
}

impl<M> ModelLifecycle<M> {
    /// Create an empty lifecycle in the `Unloaded` state.
    pub fn new() -> Self {
        let (state_tx, _) = watch::channel(ModelState::Unloaded);
        Self {
            inner: Mutex::new(Inner {
                slot: Slot::Unloaded,
                epoch: 0,
            }),
            state_tx,
        }
    }

    /// Load a model unless one is loaded or loading.
    ///
    /// If `load` fails, `placeholder` is installed instead, unless `strict`
    /// is set, in which case the failure is returned. An error is returned
    /// only when no model could be installed; the state then goes back to
    /// where it was before the call.
    pub async fn initialize<L, Fut, P>(
        &self,
        load: L,
        placeholder: P,
        strict: bool,
    ) -> Result<LoadOutcome>
    where
        L: FnOnce() -> Fut,
        Fut: Future<Output = Result<M>>,
        P: FnOnce() -> Result<M>,
    {
        let epoch = {
            let mut inner = self.lock();
            match inner.slot {
                Slot::Ready { .. } => return Ok(LoadOutcome::AlreadyReady),
                Slot::Loading { .. } => return Ok(LoadOutcome::AlreadyLoading),
                Slot::Unloaded | Slot::Disposed => {}
            }
            let previous = inner.slot.state();
            inner.slot = Slot::Loading { previous };
            inner.epoch
        };
        self.publish(ModelState::Loading);

        let mut guard = LoadingGuard {
            lifecycle: self,
            epoch,
            armed: true,
        };

        let (model, placeholder_used) = match load().await {
            Ok(model) => (model, false),
            Err(e) if strict => {
                tracing::error!(error = %e, "model load failed");
                return Err(PipelineError::Load(format!("Failed to load model: {e}")));
            }
            Err(e) => {
                tracing::warn!(error = %e, "model load failed, substituting placeholder model");
                match placeholder() {
                    Ok(model) => (model, true),
                    Err(placeholder_err) => {
                        tracing::error!(error = %placeholder_err, "placeholder model construction failed");
                        return Err(PipelineError::Load(format!(
                            "Failed to load model ({e}) and to build a placeholder ({placeholder_err})"
                        )));
                    }
                }
            }
        };
        guard.armed = false;

        {
            let mut inner = self.lock();
            let still_current =
                inner.epoch == epoch && matches!(inner.slot, Slot::Loading { .. });
            if !still_current {
                tracing::info!("model disposed while loading, discarding result");
                return Ok(LoadOutcome::Discarded);
            }
            inner.slot = Slot::Ready {
                model: Arc::new(model),
                placeholder: placeholder_used,
            };
        }
        self.publish(ModelState::Ready);

        if placeholder_used {
            Ok(LoadOutcome::Placeholder)
        } else {
            Ok(LoadOutcome::Loaded)
        }
    }

    /// Current state.
    pub fn state(&self) -> ModelState {
        self.lock().slot.state()
    }

    /// `true` only in the `Ready` state.
    pub fn is_ready(&self) -> bool {
        self.state() == ModelState::Ready
    }

    /// `true` while a load is in flight.
    pub fn is_loading(&self) -> bool {
        self.state() == ModelState::Loading
    }

    /// `true` if the ready model is an untrained placeholder.
    pub fn is_placeholder(&self) -> bool {
        matches!(
            self.lock().slot,
            Slot::Ready {
                placeholder: true,
                ..
            }
        )
    }

    /// The loaded model, or [`PipelineError::NotReady`].
    pub fn handle(&self) -> Result<Arc<M>> {
        match &self.lock().slot {
            Slot::Ready { model, .. } => Ok(Arc::clone(model)),
            Slot::Loading { .. } => Err(PipelineError::NotReady("Model is still loading".into())),
            Slot::Unloaded => Err(PipelineError::NotReady(
                "Model not initialized. Call initialize() first.".into(),
            )),
            Slot::Disposed => Err(PipelineError::NotReady("Model has been disposed".into())),
        }
    }

    /// Watch state changes.
    pub fn subscribe(&self) -> watch::Receiver<ModelState> {
        self.state_tx.subscribe()
    }

    /// Wait until the model is ready, at most `policy.max_wait()`.
    pub async fn wait_until_ready(&self, policy: ReadinessPolicy) -> Result<Arc<M>> {
        let mut rx = self.subscribe();
        let ready = tokio::time::timeout(
            policy.max_wait(),
            rx.wait_for(|state| *state == ModelState::Ready),
        )
        .await
        .map(|changed| changed.is_ok())
        .unwrap_or(false);

        if !ready {
            return Err(PipelineError::NotReady(format!(
                "Model not ready after {} attempts ({} ms)",
                policy.max_attempts,
                policy.max_wait().as_millis()
            )));
        }
        self.handle()
    }

    /// Release the model. In-flight predictions keep their own reference
    /// until they finish.
    pub fn dispose(&self) {
        let previous = {
            let mut inner = self.lock();
            inner.epoch += 1;
            std::mem::replace(&mut inner.slot, Slot::Disposed)
        };
        match previous.state() {
            ModelState::Ready => tracing::info!("model disposed"),
            ModelState::Loading => tracing::info!("model disposed while loading"),
            _ => tracing::debug!("dispose called with no model loaded"),
        }
        self.publish(ModelState::Disposed);
    }

    fn publish(&self, state: ModelState) {
        self.state_tx.send_replace(state);
    }

    fn lock(&self) -> MutexGuard<'_, Inner<M>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<M> Default for ModelLifecycle<M> {
    fn default() -> Self {
        Self::new()
    }
}

// Puts the slot back to its pre-load state if the load fails or its future is dropped.
struct LoadingGuard<'a, M> {
    lifecycle: &'a ModelLifecycle<M>,
    epoch: u64,
    armed: bool,
}

impl<M> Drop for LoadingGuard<'_, M> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let reverted = {
            let mut guard = self.lifecycle.lock();
            let inner = &mut *guard;
            match inner.slot {
                Slot::Loading { previous } if inner.epoch == self.epoch => {
                    inner.slot = Slot::idle(previous);
                    Some(previous)
                }
                _ => None,
            }
        };
        if let Some(state) = reverted {
            self.lifecycle.publish(state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::oneshot;

    #[derive(Debug, PartialEq)]
    struct Dummy(&'static str);

    fn fail() -> PipelineError {
        PipelineError::Load("missing artifact".into())
    }

    async fn real(name: &'static str) -> Result<Dummy> {
        Ok(Dummy(name))
    }

    async fn broken() -> Result<Dummy> {
        Err(fail())
    }

    #[tokio::test]
    async fn second_initialize_is_a_no_op() {
        let lifecycle = ModelLifecycle::new();
        let counter = AtomicUsize::new(0);
        let loads = &counter;
        let load = move || async move {
            loads.fetch_add(1, Ordering::SeqCst);
            real("real").await
        };

        let first = lifecycle.initialize(load, || Ok(Dummy("fake")), false).await;
        let second = lifecycle.initialize(load, || Ok(Dummy("fake")), false).await;

        assert_eq!(first.unwrap(), LoadOutcome::Loaded);
        assert_eq!(second.unwrap(), LoadOutcome::AlreadyReady);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(*lifecycle.handle().unwrap(), Dummy("real"));
    }

    #[tokio::test]
    async fn failed_load_installs_placeholder() {
        let lifecycle = ModelLifecycle::new();
        let outcome = lifecycle
            .initialize(broken, || Ok(Dummy("fake")), false)
            .await
            .unwrap();

        assert_eq!(outcome, LoadOutcome::Placeholder);
        assert!(lifecycle.is_ready());
        assert!(lifecycle.is_placeholder());
        assert_eq!(*lifecycle.handle().unwrap(), Dummy("fake"));
    }

    #[tokio::test]
    async fn strict_mode_surfaces_load_errors() {
        let lifecycle = ModelLifecycle::new();
        let result = lifecycle
            .initialize(broken, || Ok(Dummy("fake")), true)
            .await;

        assert!(matches!(result, Err(PipelineError::Load(_))));
        assert_eq!(lifecycle.state(), ModelState::Unloaded);
    }

    #[tokio::test]
    async fn placeholder_failure_is_fatal_but_retryable() {
        let lifecycle = ModelLifecycle::new();
        let result = lifecycle.initialize(broken, || Err(fail()), false).await;
        assert!(matches!(result, Err(PipelineError::Load(_))));
        assert_eq!(lifecycle.state(), ModelState::Unloaded);

        let retry = lifecycle
            .initialize(|| real("real"), || Err(fail()), false)
            .await;
        assert_eq!(retry.unwrap(), LoadOutcome::Loaded);
        assert!(!lifecycle.is_placeholder());
    }

    #[tokio::test]
    async fn dispose_then_reinitialize() {
        let lifecycle = ModelLifecycle::new();
        lifecycle
            .initialize(|| real("one"), || Err(fail()), false)
            .await
            .unwrap();

        lifecycle.dispose();
        assert_eq!(lifecycle.state(), ModelState::Disposed);
        assert!(!lifecycle.is_ready());
        assert!(matches!(lifecycle.handle(), Err(PipelineError::NotReady(_))));

        let outcome = lifecycle
            .initialize(|| real("two"), || Err(fail()), false)
            .await
            .unwrap();
        assert_eq!(outcome, LoadOutcome::Loaded);
        assert_eq!(*lifecycle.handle().unwrap(), Dummy("two"));
    }

    #[tokio::test]
    async fn handle_outlives_dispose() {
        let lifecycle = ModelLifecycle::new();
        lifecycle
            .initialize(|| real("held"), || Err(fail()), false)
            .await
            .unwrap();

        let held = lifecycle.handle().unwrap();
        lifecycle.dispose();
        assert_eq!(*held, Dummy("held"));
        assert_eq!(Arc::strong_count(&held), 1);
    }

    #[tokio::test]
    async fn concurrent_initialize_does_not_queue_a_second_load() {
        let lifecycle = ModelLifecycle::new();
        let (release, gate) = oneshot::channel::<()>();

        let first = lifecycle.initialize(
            move || async move {
                let _ = gate.await;
                real("slow").await
            },
            || Err(fail()),
            false,
        );
        let second = async {
            let outcome = lifecycle
                .initialize(|| real("dup"), || Err(fail()), false)
                .await;
            assert!(lifecycle.is_loading());
            assert!(matches!(lifecycle.handle(), Err(PipelineError::NotReady(_))));
            let _ = release.send(());
            outcome
        };

        let (first, second) = tokio::join!(first, second);
        assert_eq!(first.unwrap(), LoadOutcome::Loaded);
        assert_eq!(second.unwrap(), LoadOutcome::AlreadyLoading);
        assert_eq!(*lifecycle.handle().unwrap(), Dummy("slow"));
    }

    #[tokio::test]
    async fn dispose_during_load_wins() {
        let lifecycle = ModelLifecycle::new();
        let (release, gate) = oneshot::channel::<()>();

        let load = lifecycle.initialize(
            move || async move {
                let _ = gate.await;
                real("late").await
            },
            || Err(fail()),
            false,
        );
        let dispose = async {
            lifecycle.dispose();
            let _ = release.send(());
        };

        let (outcome, _) = tokio::join!(load, dispose);
        assert_eq!(outcome.unwrap(), LoadOutcome::Discarded);
        assert_eq!(lifecycle.state(), ModelState::Disposed);
    }

    #[tokio::test]
    async fn dropped_initialize_reverts_loading_state() {
        let lifecycle = ModelLifecycle::<Dummy>::new();
        {
            let pending = lifecycle.initialize(
                futures::future::pending::<Result<Dummy>>,
                || Err(fail()),
                false,
            );
            futures::pin_mut!(pending);
            assert!(futures::poll!(pending.as_mut()).is_pending());
            assert!(lifecycle.is_loading());
        }
        assert_eq!(lifecycle.state(), ModelState::Unloaded);
    }

    #[test]
    fn max_wait_saturates_on_huge_policies() {
        let policy = ReadinessPolicy {
            poll_interval: Duration::from_millis(u64::MAX),
            max_attempts: u32::MAX,
        };
        assert_eq!(policy.max_wait(), Duration::MAX);
        assert_eq!(ReadinessPolicy::default().max_wait(), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn wait_until_ready_gives_up_after_bound() {
        let lifecycle = ModelLifecycle::<Dummy>::new();
        let started = tokio::time::Instant::now();

        let result = lifecycle.wait_until_ready(ReadinessPolicy::default()).await;

        assert!(matches!(result, Err(PipelineError::NotReady(_))));
        let waited = started.elapsed();
        assert!(waited >= Duration::from_secs(5));
        assert!(waited < Duration::from_millis(5100));
    }

    #[tokio::test(start_paused = true)]
    async fn wait_until_ready_returns_once_loaded() {
        let lifecycle = ModelLifecycle::new();

        let load = lifecycle.initialize(
            || async {
                tokio::time::sleep(Duration::from_millis(300)).await;
                real("real").await
            },
            || Err(fail()),
            false,
        );
        let wait = lifecycle.wait_until_ready(ReadinessPolicy::default());

        let (outcome, model) = tokio::join!(load, wait);
        assert_eq!(outcome.unwrap(), LoadOutcome::Loaded);
        assert_eq!(*model.unwrap(), Dummy("real"));
    }
}
