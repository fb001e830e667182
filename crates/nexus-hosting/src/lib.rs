//! The Service Container (§4.3): per-service lifecycle and concurrency supervisor.
//!
//! This crate owns the hardest 35% of the core per the component budget — worker pool
//! admission, dependency (entrypoint/injection) lifecycle fan-out, managed-thread
//! supervision, and the ordered start/stop/kill state machine. It knows nothing about
//! brokers or the wire format; `nexus-rpc` builds its consumer/responder/proxy on top of the
//! [`Dependency`]/[`Entrypoint`]/[`Injection`] capability traits and the
//! [`ServiceContainer`] handle exposed here.

mod container;
mod dependency;
mod worker;

pub use container::{ContainerBuilder, DeathOutcome, ManagedThreadId, ServiceContainer, is_cancellation};
pub use dependency::{Dependency, DependencySet, Entrypoint, Injection};
pub use worker::{
    Bindings, CALL_ID_STACK_KEY, CONTEXT_KEYS, ContextData, Headers, Service, ServiceFactory,
    WorkerContext, WorkerOutcome, WorkerResultHandler,
};
