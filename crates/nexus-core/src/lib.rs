//! Shared contracts for the nexus microservice runtime: error taxonomy, identifiers,
//! structured logging and typed configuration.
//!
//! This crate carries no concurrency or broker logic of its own — it exists so that
//! `nexus-hosting` (the Service Container) and `nexus-rpc` (the RPC subsystem) agree on one
//! error type, one identifier scheme and one logging seam instead of each rolling their own.

mod config;
mod error;
mod ids;
mod logging;

pub use config::{ContainerConfig, RpcConfig};
pub use error::{ErrorCategory, NexusError, RemoteError, codes};
pub use ids::{CallId, CorrelationId, UniqueId};
pub use logging::{Field, LogRecord, LogSeverity, Logger, NoopLogger, TracingLogger};
