//! Service Container (§4.3): the lifecycle supervisor that owns a service's dependencies,
//! its bounded worker pool, and its managed-thread registries.
//!
//! # Design background
//! §5 resolves the source material's single-threaded cooperative model onto `tokio`'s
//! work-stealing executor: every suspension point becomes an `.await`, and the "mutex per
//! component" escape hatch the spec offers for preemptive runtimes is taken unconditionally.
//! [`DashMap`] covers the two managed-thread registries; a single `AtomicBool` arbitrates which
//! of a racing `stop()`/`kill()` pair gets to run the real shutdown sequence, collapsing
//! re-entrant calls per §4.3's idempotency requirement; a `watch` channel broadcasts the death
//! outcome to every `wait()` caller exactly once.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use dashmap::DashMap;
use nexus_core::{ContainerConfig, ErrorCategory, Logger, NexusError, NoopLogger};
use serde_json::Value;
use tokio::sync::{Notify, Semaphore, watch};
use tokio::task::AbortHandle;

use crate::dependency::{Dependency, DependencySet, Entrypoint};
use crate::worker::{Bindings, ContextData, Headers, Service, ServiceFactory, WorkerContext, WorkerOutcome, WorkerResultHandler};

/// Identifies one entry in a managed-thread registry; opaque beyond equality.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ManagedThreadId(u64);

/// A small counting wait-group: `inc`/`dec` around a managed thread's lifetime, `wait_idle`
/// suspends until the count returns to zero. Mirrors the teacher's task-tracker pattern
/// (atomic counter plus a waiter notification) adapted to `tokio::sync::Notify`.
#[derive(Default)]
struct ThreadGroup {
    count: AtomicU64,
    idle: Notify,
}

impl ThreadGroup {
    fn inc(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }

    fn dec(&self) {
        if self.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }

    async fn wait_idle(&self) {
        loop {
            if self.count.load(Ordering::SeqCst) == 0 {
                return;
            }
            let notified = self.idle.notified();
            if self.count.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// A death outcome: `Ok` for a graceful `stop()`, `Err` for `kill(exc)` (§4.3 `wait()`).
pub type DeathOutcome = Result<(), NexusError>;

/// Constructs a [`ServiceContainer`] from its immutable parts. Kept separate from the
/// container itself so that assembling a service (dependency wiring, factory, config) reads
/// as a distinct step from the container's own lifecycle API.
pub struct ContainerBuilder {
    service_name: Arc<str>,
    config: ContainerConfig,
    dependencies: DependencySet,
    service_factory: Arc<dyn ServiceFactory>,
    logger: Arc<dyn Logger>,
}

impl ContainerBuilder {
    pub fn new(service_name: impl Into<Arc<str>>, service_factory: Arc<dyn ServiceFactory>) -> Self {
        Self {
            service_name: service_name.into(),
            config: ContainerConfig::default(),
            dependencies: DependencySet::new(),
            service_factory,
            logger: Arc::new(NoopLogger),
        }
    }

    pub fn with_config(mut self, config: ContainerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_dependencies(mut self, dependencies: DependencySet) -> Self {
        self.dependencies = dependencies;
        self
    }

    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn build(self) -> Arc<ServiceContainer> {
        let (death_tx, death_rx) = watch::channel(None);
        let container = Arc::new(ServiceContainer {
            service_name: self.service_name,
            config: self.config,
            dependencies: self.dependencies,
            service_factory: self.service_factory,
            logger: self.logger,
            worker_semaphore: Arc::new(Semaphore::new(0)),
            next_thread_id: AtomicU64::new(0),
            active_threads: DashMap::new(),
            protected_threads: DashMap::new(),
            active_group: Arc::new(ThreadGroup::default()),
            protected_group: Arc::new(ThreadGroup::default()),
            shutdown_started: AtomicBool::new(false),
            death_tx,
            death_rx,
        });

        let weak = Arc::downgrade(&container);
        for dep in container.dependencies.all() {
            dep.bind_container(weak.clone());
        }

        container
    }
}

/// Owns the lifetime of one service, its dependencies, and all its concurrent work (§4.3).
pub struct ServiceContainer {
    service_name: Arc<str>,
    config: ContainerConfig,
    dependencies: DependencySet,
    service_factory: Arc<dyn ServiceFactory>,
    logger: Arc<dyn Logger>,
    /// Starts with zero permits; [`Self::start`] adds `max_workers` so that `spawn_worker`
    /// suspends cooperatively whenever the pool is saturated (§4.3).
    worker_semaphore: Arc<Semaphore>,
    next_thread_id: AtomicU64,
    active_threads: DashMap<ManagedThreadId, AbortHandle>,
    protected_threads: DashMap<ManagedThreadId, AbortHandle>,
    active_group: Arc<ThreadGroup>,
    protected_group: Arc<ThreadGroup>,
    shutdown_started: AtomicBool,
    death_tx: watch::Sender<Option<DeathOutcome>>,
    death_rx: watch::Receiver<Option<DeathOutcome>>,
}

impl ServiceContainer {
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn config(&self) -> &ContainerConfig {
        &self.config
    }

    pub fn dependencies(&self) -> &DependencySet {
        &self.dependencies
    }

    /// The container's injected logger (§11): RPC-subsystem components reach through this
    /// rather than taking their own, so a single logger sees every lifecycle and message
    /// boundary for a service.
    pub fn logger(&self) -> &Arc<dyn Logger> {
        &self.logger
    }

    fn log_transition(&self, message: &str, fields: &[(&str, std::borrow::Cow<'_, str>)]) {
        self.logger.info(message, fields);
    }

    /// `prepare` then `start` on every dependency (§4.3 `start`). Fails on the first
    /// dependency that raises; the caller is expected to [`Self::kill`] the container.
    pub async fn start(&self) -> Result<(), NexusError> {
        self.log_transition(
            "container starting",
            &[("service", self.service_name.as_ref().into())],
        );
        for dep in self.dependencies.all() {
            dep.prepare().await?;
        }
        for dep in self.dependencies.all() {
            dep.start().await?;
        }
        self.worker_semaphore.add_permits(self.config.max_workers);
        self.log_transition(
            "container started",
            &[("service", self.service_name.as_ref().into())],
        );
        Ok(())
    }

    /// Graceful shutdown in the strict order of §4.3 `stop()`. Idempotent: a losing race
    /// against a concurrent `stop()`/`kill()` simply awaits the winner's outcome.
    pub async fn stop(&self) -> DeathOutcome {
        if self.shutdown_started.swap(true, Ordering::AcqRel) {
            return self.wait().await;
        }
        self.run_graceful_stop().await
    }

    async fn run_graceful_stop(&self) -> DeathOutcome {
        self.log_transition(
            "container stopping",
            &[("service", self.service_name.as_ref().into())],
        );

        for entrypoint in self.dependencies.entrypoints() {
            if let Err(err) = entrypoint.stop().await {
                return self.finish_with_kill(err).await;
            }
        }

        // Step 2: wait for the worker pool to drain. Acquiring every permit blocks until no
        // worker is mid-execution; the permits are returned immediately afterwards.
        let _drain = self
            .worker_semaphore
            .acquire_many(self.config.max_workers as u32)
            .await;
        drop(_drain);

        for injection in self.dependencies.injections() {
            if let Err(err) = injection.stop().await {
                return self.finish_with_kill(err).await;
            }
        }

        for nested in self.dependencies.nested() {
            if let Err(err) = nested.stop().await {
                return self.finish_with_kill(err).await;
            }
        }

        self.cancel_registry(&self.active_threads, &self.active_group)
            .await;
        self.cancel_registry(&self.protected_threads, &self.protected_group)
            .await;

        self.log_transition(
            "container stopped",
            &[("service", self.service_name.as_ref().into())],
        );
        self.mark_dead(Ok(()));
        Ok(())
    }

    /// A dependency failed mid-`stop()`: that is a lifecycle error (§7), so the remainder of
    /// shutdown proceeds as a `kill` rather than a graceful stop.
    async fn finish_with_kill(&self, err: NexusError) -> DeathOutcome {
        self.run_kill(err.clone()).await;
        Err(err)
    }

    /// Ungraceful shutdown (§4.3 `kill`). Idempotent under the same `shutdown_started` gate
    /// as [`Self::stop`]; a losing race awaits the winner's death instead of re-running the
    /// shutdown sequence (§8 scenario 6, "double kill collapse").
    pub async fn kill(&self, exc: NexusError) {
        if self.shutdown_started.swap(true, Ordering::AcqRel) {
            let _ = self.wait().await;
            return;
        }
        self.run_kill(exc).await;
    }

    async fn run_kill(&self, exc: NexusError) {
        self.logger.error(
            "container killed",
            &[
                ("service", self.service_name.as_ref().into()),
                ("code", exc.code().into()),
            ],
        );

        for entrypoint in self.dependencies.entrypoints() {
            entrypoint.kill(&exc).await;
        }

        self.cancel_registry(&self.active_threads, &self.active_group)
            .await;

        for injection in self.dependencies.injections() {
            injection.kill(&exc).await;
        }
        for nested in self.dependencies.nested() {
            nested.kill(&exc).await;
        }

        self.cancel_registry(&self.protected_threads, &self.protected_group)
            .await;

        self.mark_dead(Err(exc));
    }

    /// Aborts every currently-registered handle in `registry` and waits for its group to
    /// drain, so that the supervisor tasks have finished their own bookkeeping before the
    /// caller proceeds to the next shutdown step.
    async fn cancel_registry(
        &self,
        registry: &DashMap<ManagedThreadId, AbortHandle>,
        group: &ThreadGroup,
    ) {
        for entry in registry.iter() {
            entry.value().abort();
        }
        group.wait_idle().await;
    }

    fn mark_dead(&self, outcome: DeathOutcome) {
        let _ = self.death_tx.send(Some(outcome));
    }

    /// Blocks until the container dies; propagates `kill`'s exception, or returns normally
    /// after `stop()` (§4.3 `wait`).
    pub async fn wait(&self) -> DeathOutcome {
        let mut rx = self.death_rx.clone();
        loop {
            if let Some(outcome) = rx.borrow_and_update().clone() {
                return outcome;
            }
            if rx.changed().await.is_err() {
                return Ok(());
            }
        }
    }

    /// Creates a fresh service instance, builds its [`WorkerContext`], and submits the worker
    /// to the bounded pool (§4.3 `spawn_worker`). Suspends cooperatively if the pool is
    /// saturated; returns the context once the worker has been admitted and scheduled.
    pub async fn spawn_worker(
        self: &Arc<Self>,
        provider: Arc<dyn Entrypoint>,
        args: Value,
        kwargs: Value,
        context_data: Option<ContextData>,
        handle_result: Option<Arc<dyn WorkerResultHandler>>,
    ) -> Arc<WorkerContext> {
        let permit = Arc::clone(&self.worker_semaphore)
            .acquire_owned()
            .await
            .expect("worker semaphore is never closed while the container is alive");

        let service = self.service_factory.create();
        let data: Headers = context_data.unwrap_or_default();
        let ctx = Arc::new(WorkerContext::new(
            Arc::clone(&self.service_name),
            provider.name().to_string(),
            args,
            kwargs,
            data,
            self.config.parent_calls_tracked,
        ));

        let container = Arc::clone(self);
        let ctx_for_task = Arc::clone(&ctx);
        let run = async move {
            let _permit = permit;
            container
                .run_worker(service, ctx_for_task, handle_result)
                .await
        };

        self.spawn_managed(run, false);
        ctx
    }

    /// Runs the invariant worker-execution sequence of §4.3. User-method errors are captured
    /// into the returned outcome and never escape as an `Err` here; only a lifecycle-hook
    /// failure does, which the managed-thread supervisor turns into a container `kill`.
    async fn run_worker(
        self: Arc<Self>,
        service: Arc<dyn Service>,
        ctx: Arc<WorkerContext>,
        handle_result: Option<Arc<dyn WorkerResultHandler>>,
    ) -> Result<(), NexusError> {
        let mut bindings = Bindings::new();
        for injection in self.dependencies.injections() {
            let value = injection.inject(&ctx).await;
            bindings.insert(injection.name().to_string(), value);
        }

        for dep in self.dependencies.all() {
            dep.worker_setup(&ctx).await?;
        }

        let outcome = match service.call(&ctx, &bindings).await {
            Ok(result) => WorkerOutcome::Success(result),
            Err(err) => WorkerOutcome::Failure(err),
        };

        for injection in self.dependencies.injections() {
            injection.worker_result(&ctx, &outcome).await;
        }

        for dep in self.dependencies.all() {
            dep.worker_teardown(&ctx).await?;
        }

        for injection in self.dependencies.injections() {
            injection.release(&ctx).await;
        }

        if let Some(handler) = handle_result {
            handler.handle_result(&ctx, &outcome).await;
        }

        Ok(())
    }

    /// Schedules `run` on the container's executor, registers it in the matching
    /// managed-thread registry, and links its exit to the container's kill path
    /// (§4.3 `spawn_managed_thread`).
    pub fn spawn_managed_thread<Fut>(self: &Arc<Self>, run: Fut, protected: bool) -> ManagedThreadId
    where
        Fut: Future<Output = Result<(), NexusError>> + Send + 'static,
    {
        self.spawn_managed(run, protected)
    }

    fn spawn_managed<Fut>(self: &Arc<Self>, run: Fut, protected: bool) -> ManagedThreadId
    where
        Fut: Future<Output = Result<(), NexusError>> + Send + 'static,
    {
        let id = ManagedThreadId(self.next_thread_id.fetch_add(1, Ordering::Relaxed));
        let join_handle = tokio::spawn(run);
        let abort_handle = join_handle.abort_handle();

        let group = if protected {
            Arc::clone(&self.protected_group)
        } else {
            Arc::clone(&self.active_group)
        };
        group.inc();

        if protected {
            self.protected_threads.insert(id, abort_handle);
        } else {
            self.active_threads.insert(id, abort_handle);
        }

        self.logger.debug(
            "managed thread registered",
            &[
                ("service", self.service_name.as_ref().into()),
                ("thread_id", id.0.to_string().into()),
                ("protected", protected.to_string().into()),
            ],
        );

        let container = Arc::clone(self);
        tokio::spawn(async move {
            let outcome = join_handle.await;
            container.on_managed_thread_exit(id, protected, outcome).await;
        });

        id
    }

    /// The managed-thread exit handler (§4.3): removes the entry from its registry, then
    /// classifies the outcome — cancellation is logged and ignored, a genuine error kills the
    /// container, a clean exit needs no further action.
    async fn on_managed_thread_exit(
        self: Arc<Self>,
        id: ManagedThreadId,
        protected: bool,
        outcome: Result<Result<(), NexusError>, tokio::task::JoinError>,
    ) {
        let (registry, group): (&DashMap<_, _>, &ThreadGroup) = if protected {
            (&self.protected_threads, &self.protected_group)
        } else {
            (&self.active_threads, &self.active_group)
        };
        registry.remove(&id);
        group.dec();
        self.logger.debug(
            "managed thread removed",
            &[
                ("service", self.service_name.as_ref().into()),
                ("thread_id", id.0.to_string().into()),
                ("protected", protected.to_string().into()),
            ],
        );

        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                self.kill(err).await;
            }
            Err(join_err) if join_err.is_cancelled() => {
                self.logger.debug(
                    "managed thread cancelled",
                    &[("service", self.service_name.as_ref().into())],
                );
            }
            Err(join_err) => {
                let err = NexusError::lifecycle("managed thread panicked", join_err);
                self.kill(err).await;
            }
        }
    }
}

impl std::fmt::Debug for ServiceContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceContainer")
            .field("service_name", &self.service_name)
            .field("max_workers", &self.config.max_workers)
            .finish()
    }
}

/// Distinguishes a cooperative cancellation from any error the cancelled code might itself
/// have raised (§5, §7). Used by dependencies that want to special-case being killed.
pub fn is_cancellation(err: &NexusError) -> bool {
    err.category() == ErrorCategory::Cancelled
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::Mutex as AsyncMutex;

    use super::*;
    use crate::dependency::Injection;

    struct EchoService;

    #[async_trait]
    impl Service for EchoService {
        async fn call(&self, ctx: &WorkerContext, _bindings: &Bindings) -> Result<Value, NexusError> {
            Ok(ctx.args().clone())
        }
    }

    struct EchoFactory;

    impl ServiceFactory for EchoFactory {
        fn create(&self) -> Arc<dyn Service> {
            Arc::new(EchoService)
        }
    }

    struct NoopEntrypoint {
        name: &'static str,
    }

    #[async_trait]
    impl Dependency for NoopEntrypoint {
        fn name(&self) -> &str {
            self.name
        }
    }
    impl Entrypoint for NoopEntrypoint {}

    /// An entrypoint/injection recorder used to assert lifecycle ordering invariants (§8).
    #[derive(Default)]
    struct OrderTrackingDependency {
        name: &'static str,
        log: Arc<AsyncMutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl Dependency for OrderTrackingDependency {
        fn name(&self) -> &str {
            self.name
        }

        async fn prepare(&self) -> Result<(), NexusError> {
            self.log.lock().await.push("prepare");
            Ok(())
        }

        async fn start(&self) -> Result<(), NexusError> {
            self.log.lock().await.push("start");
            Ok(())
        }

        async fn stop(&self) -> Result<(), NexusError> {
            self.log.lock().await.push("stop");
            Ok(())
        }
    }
    impl Entrypoint for OrderTrackingDependency {}

    #[async_trait]
    impl Injection for OrderTrackingDependency {
        async fn inject(&self, _ctx: &WorkerContext) -> Arc<dyn std::any::Any + Send + Sync> {
            Arc::new(())
        }
    }

    fn build_container(max_workers: usize) -> Arc<ServiceContainer> {
        ContainerBuilder::new("svc", Arc::new(EchoFactory))
            .with_config(ContainerConfig {
                max_workers,
                parent_calls_tracked: 10,
            })
            .build()
    }

    #[tokio::test]
    async fn start_then_stop_idle_container_invokes_every_dependency() {
        let log = Arc::new(AsyncMutex::new(Vec::new()));
        let mut deps = DependencySet::new();
        deps.add_entrypoint(Arc::new(OrderTrackingDependency {
            name: "entry",
            log: Arc::clone(&log),
        }));
        deps.add_injection(Arc::new(OrderTrackingDependency {
            name: "inject",
            log: Arc::clone(&log),
        }));

        let container = ContainerBuilder::new("svc", Arc::new(EchoFactory))
            .with_dependencies(deps)
            .build();

        container.start().await.unwrap();
        container.stop().await.unwrap();

        let entries = log.lock().await.clone();
        assert_eq!(
            entries.iter().filter(|e| **e == "prepare").count(),
            2,
            "prepare must run exactly once per dependency"
        );
        assert_eq!(entries.iter().filter(|e| **e == "start").count(), 2);
        assert_eq!(entries.iter().filter(|e| **e == "stop").count(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn at_most_max_workers_run_concurrently() {
        struct CountingService {
            concurrent: Arc<AtomicUsize>,
            max_seen: Arc<AtomicUsize>,
        }

        #[async_trait]
        impl Service for CountingService {
            async fn call(&self, _ctx: &WorkerContext, _bindings: &Bindings) -> Result<Value, NexusError> {
                let now = self.concurrent.fetch_add(1, AtomicOrdering::SeqCst) + 1;
                self.max_seen.fetch_max(now, AtomicOrdering::SeqCst);
                tokio::time::sleep(Duration::from_millis(30)).await;
                self.concurrent.fetch_sub(1, AtomicOrdering::SeqCst);
                Ok(Value::Null)
            }
        }
        struct CountingFactory {
            concurrent: Arc<AtomicUsize>,
            max_seen: Arc<AtomicUsize>,
        }
        impl ServiceFactory for CountingFactory {
            fn create(&self) -> Arc<dyn Service> {
                Arc::new(CountingService {
                    concurrent: Arc::clone(&self.concurrent),
                    max_seen: Arc::clone(&self.max_seen),
                })
            }
        }

        let concurrent = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));
        let container = ContainerBuilder::new(
            "svc",
            Arc::new(CountingFactory {
                concurrent: Arc::clone(&concurrent),
                max_seen: Arc::clone(&max_seen),
            }),
        )
        .with_config(ContainerConfig {
            max_workers: 1,
            parent_calls_tracked: 10,
        })
        .build();
        container.start().await.unwrap();

        let entrypoint: Arc<dyn Entrypoint> = Arc::new(NoopEntrypoint { name: "m" });
        let first = container
            .spawn_worker(Arc::clone(&entrypoint), Value::Null, Value::Null, None, None);
        let second = container
            .spawn_worker(Arc::clone(&entrypoint), Value::Null, Value::Null, None, None);
        tokio::join!(first, second);

        container.stop().await.unwrap();
        assert_eq!(max_seen.load(AtomicOrdering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn kill_propagates_through_wait() {
        let container = build_container(4);
        container.start().await.unwrap();

        let c = Arc::clone(&container);
        c.spawn_managed_thread(
            async { Err(NexusError::user_code("foobar")) },
            false,
        );

        let err = container.wait().await.unwrap_err();
        assert_eq!(err.to_string().contains("foobar"), true);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn double_kill_collapses_to_first_exception() {
        let container = build_container(4);
        container.start().await.unwrap();

        container.spawn_managed_thread(async { Err(NexusError::user_code("first")) }, false);
        container.spawn_managed_thread(async { Err(NexusError::user_code("second")) }, false);

        let err = container.wait().await.unwrap_err();
        // Either may legitimately win the race to set shutdown_started first; the invariant
        // under test is that exactly one of them determines the recorded exception and a
        // second call collapses rather than re-running shutdown.
        assert!(err.to_string().contains("first") || err.to_string().contains("second"));
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let container = build_container(4);
        container.start().await.unwrap();
        container.stop().await.unwrap();
        container.stop().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn graceful_stop_waits_for_in_flight_worker() {
        struct SlowService {
            started: Arc<tokio::sync::Notify>,
        }

        #[async_trait]
        impl Service for SlowService {
            async fn call(&self, _ctx: &WorkerContext, _bindings: &Bindings) -> Result<Value, NexusError> {
                self.started.notify_one();
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok(Value::Null)
            }
        }
        struct SlowFactory {
            started: Arc<tokio::sync::Notify>,
        }
        impl ServiceFactory for SlowFactory {
            fn create(&self) -> Arc<dyn Service> {
                Arc::new(SlowService {
                    started: Arc::clone(&self.started),
                })
            }
        }

        let started = Arc::new(tokio::sync::Notify::new());
        let container = ContainerBuilder::new("svc", Arc::new(SlowFactory { started: Arc::clone(&started) }))
            .with_config(ContainerConfig {
                max_workers: 1,
                parent_calls_tracked: 10,
            })
            .build();
        container.start().await.unwrap();

        let entrypoint: Arc<dyn Entrypoint> = Arc::new(NoopEntrypoint { name: "m" });
        let c = Arc::clone(&container);
        let ep = Arc::clone(&entrypoint);
        let worker = tokio::spawn(async move {
            c.spawn_worker(ep, Value::Null, Value::Null, None, None).await;
        });

        started.notified().await;
        container.stop().await.unwrap();
        worker.await.unwrap();
    }
}
