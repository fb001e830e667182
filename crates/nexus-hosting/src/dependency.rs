//! Dependency lifecycle capabilities and the container-owned [`DependencySet`].
//!
//! # Design background
//! The source framework classifies providers by runtime capability rather than by static
//! inheritance: a provider "is" an entrypoint or an injection because of which methods it
//! implements, not because of which base class it subclasses. Rust has no dynamic
//! `isinstance`-style capability check that plays well with object safety, so this crate
//! takes the re-architecture the design notes explicitly invite: classification happens once,
//! explicitly, at registration time (`DependencySet::add_entrypoint` /
//! `add_injection` / `add_nested`), and the three views are simply three `Vec`s.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use nexus_core::NexusError;

use crate::container::ServiceContainer;
use crate::worker::{WorkerContext, WorkerOutcome};

/// Lifecycle hooks shared by every dependency, regardless of capability.
///
/// All hooks default to a no-op success so that a dependency only needs to override what it
/// actually cares about — most injections never need `kill` to do anything beyond the
/// default, for instance.
#[async_trait]
pub trait Dependency: Send + Sync {
    /// A short, stable name used in logs and in [`Injection`] binding lookups.
    fn name(&self) -> &str;

    /// Called once, immediately after the container is constructed and before `prepare`.
    ///
    /// The container and its dependencies are mutually referential (§9 design notes: "cyclic
    /// references between providers and the container become back-references"), but a
    /// `DependencySet` must exist before a container can be built around it. This hook closes
    /// the cycle with a non-owning handle instead of requiring dependencies to be constructed
    /// with the container already in hand. Most dependencies never need it; the RPC providers
    /// use it to reach [`ServiceContainer::spawn_worker`]/[`ServiceContainer::spawn_managed_thread`].
    fn bind_container(&self, _container: Weak<ServiceContainer>) {}

    async fn prepare(&self) -> Result<(), NexusError> {
        Ok(())
    }

    async fn start(&self) -> Result<(), NexusError> {
        Ok(())
    }

    async fn stop(&self) -> Result<(), NexusError> {
        Ok(())
    }

    /// Ungraceful shutdown. Unlike the other hooks this cannot fail outward: a dependency
    /// being killed has no one left to report a further failure to, so it should log and
    /// swallow its own cleanup errors.
    async fn kill(&self, _cause: &NexusError) {}

    /// Runs once per worker, after injections have bound their values, before the user
    /// method body executes (§4.3 step 2).
    async fn worker_setup(&self, _ctx: &WorkerContext) -> Result<(), NexusError> {
        Ok(())
    }

    /// Runs once per worker, after the user method body and after injections have observed
    /// the outcome (§4.3 step 5).
    async fn worker_teardown(&self, _ctx: &WorkerContext) -> Result<(), NexusError> {
        Ok(())
    }
}

/// A dependency that accepts external triggers and asks the container to spawn workers
/// (glossary: Entrypoint). Carries no extra methods over [`Dependency`] — its distinct role
/// is purely about which [`DependencySet`] view it is registered into.
pub trait Entrypoint: Dependency {}

/// A dependency that provides a value bound for the duration of one worker
/// (glossary: Injection).
#[async_trait]
pub trait Injection: Dependency {
    /// Produces the value bound into the worker's [`crate::worker::Bindings`] under
    /// [`Dependency::name`] (§4.3 step 1).
    async fn inject(&self, ctx: &WorkerContext) -> Arc<dyn std::any::Any + Send + Sync>;

    /// Observes the user method's outcome (§4.3 step 4). Never fails outward — an injection
    /// that cannot process a result should log rather than kill the container over a single
    /// worker's bookkeeping.
    async fn worker_result(&self, _ctx: &WorkerContext, _outcome: &WorkerOutcome) {}

    /// Releases whatever `inject` acquired (§4.3 step 6).
    async fn release(&self, _ctx: &WorkerContext) {}
}

/// The three disjoint views over a container's dependencies, plus fan-out application.
///
/// Ordering *within* a view is unspecified per §4.2; this implementation preserves
/// registration order, which is a valid (if arbitrary) total order and keeps behaviour
/// reproducible in tests.
#[derive(Default, Clone)]
pub struct DependencySet {
    entrypoints: Vec<Arc<dyn Entrypoint>>,
    injections: Vec<Arc<dyn Injection>>,
    nested: Vec<Arc<dyn Dependency>>,
}

impl DependencySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_entrypoint(&mut self, entrypoint: Arc<dyn Entrypoint>) {
        self.entrypoints.push(entrypoint);
    }

    pub fn add_injection(&mut self, injection: Arc<dyn Injection>) {
        self.injections.push(injection);
    }

    pub fn add_nested(&mut self, dependency: Arc<dyn Dependency>) {
        self.nested.push(dependency);
    }

    pub fn entrypoints(&self) -> &[Arc<dyn Entrypoint>] {
        &self.entrypoints
    }

    pub fn injections(&self) -> &[Arc<dyn Injection>] {
        &self.injections
    }

    pub fn nested(&self) -> &[Arc<dyn Dependency>] {
        &self.nested
    }

    /// Every dependency across all three views, entrypoints first, in the order §4.3's
    /// `start`/`worker_setup`/`worker_teardown` fan-out wants to see them.
    pub fn all(&self) -> Vec<Arc<dyn Dependency>> {
        let mut out: Vec<Arc<dyn Dependency>> = Vec::with_capacity(
            self.entrypoints.len() + self.injections.len() + self.nested.len(),
        );
        out.extend(self.entrypoints.iter().map(|e| e.clone() as Arc<dyn Dependency>));
        out.extend(self.injections.iter().map(|i| i.clone() as Arc<dyn Dependency>));
        out.extend(self.nested.iter().cloned());
        out
    }
}
