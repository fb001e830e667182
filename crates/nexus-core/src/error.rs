//! Error taxonomy shared by the container and RPC subsystems.
//!
//! # Design background
//! The container's death signal and the RPC subsystem's remote-error reporting both need
//! the same thing: a small, stable set of error *kinds* that a host can pattern-match on by
//! `code` rather than by scraping `Display` text. [`ErrorCategory`] carries the kind;
//! [`NexusError`] is the concrete, owned error value that flows out of `wait()` and across
//! the wire inside a reply envelope.
//!
//! Leaf variants are derived with `thiserror`; the outer [`NexusError`] wraps them by hand so
//! that `source()` chaining and `code()`/`category()` stay available regardless of which leaf
//! produced the failure.

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

/// Coarse classification of a [`NexusError`], independent of its specific `code`.
///
/// Hosts use this to decide broad policy (alert vs. log, retry vs. surface) without
/// maintaining an exhaustive match over every `code` the runtime can produce.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Failure inside a dependency lifecycle hook (`prepare`/`start`/`stop`/`worker_setup`/...)
    /// or inside a managed thread. Always fatal to the owning container.
    Lifecycle,
    /// The user's method body raised. Scoped to the one request; never kills the container.
    UserCode,
    /// An inbound RPC did not match any registered entrypoint.
    Dispatch,
    /// An error value received back across the wire from a remote peer.
    Remote,
    /// Cooperative cancellation delivered by `kill`; distinct from any error the cancelled
    /// code itself might have raised.
    Cancelled,
}

/// The runtime's single owned error type.
///
/// Every fallible path in `nexus-hosting` and `nexus-rpc` that is not itself a generic `io`
/// failure from an injected `Broker` ultimately produces one of these, so that a container's
/// death cause and a proxy's `RemoteError` share one shape.
#[derive(Debug, Clone)]
pub struct NexusError {
    code: &'static str,
    category: ErrorCategory,
    message: Arc<str>,
    source: Option<Arc<dyn StdError + Send + Sync>>,
}

impl NexusError {
    /// Builds a new error with no source chain.
    pub fn new(code: &'static str, category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            code,
            category,
            message: Arc::from(message.into()),
            source: None,
        }
    }

    /// Attaches an underlying cause, available later through [`StdError::source`].
    pub fn with_source(
        code: &'static str,
        category: ErrorCategory,
        message: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self {
            code,
            category,
            message: Arc::from(message.into()),
            source: Some(Arc::new(source)),
        }
    }

    /// Wraps an arbitrary lifecycle-hook failure. The resulting error always carries
    /// [`ErrorCategory::Lifecycle`] and code [`codes::LIFECYCLE_HOOK_FAILED`].
    pub fn lifecycle(message: impl Into<String>, source: impl StdError + Send + Sync + 'static) -> Self {
        Self::with_source(codes::LIFECYCLE_HOOK_FAILED, ErrorCategory::Lifecycle, message, source)
    }

    /// Wraps a user method panic or returned error into a non-fatal, request-scoped error.
    pub fn user_code(message: impl Into<String>) -> Self {
        Self::new(codes::USER_CODE_FAILED, ErrorCategory::UserCode, message)
    }

    /// The canonical `MethodNotFound` dispatch error (§4.4/§8 scenario 7).
    pub fn method_not_found(service: &str, method: &str) -> Self {
        Self::new(
            codes::METHOD_NOT_FOUND,
            ErrorCategory::Dispatch,
            format!("no entrypoint registered for {service}.{method}"),
        )
    }

    /// Cooperative-cancellation marker delivered by `kill`.
    pub fn cancelled() -> Self {
        Self::new(codes::CANCELLED, ErrorCategory::Cancelled, "cancelled by container kill")
    }

    pub fn code(&self) -> &'static str {
        self.code
    }

    pub fn category(&self) -> ErrorCategory {
        self.category
    }
}

impl fmt::Display for NexusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl StdError for NexusError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source.as_deref().map(|s| s as &(dyn StdError + 'static))
    }
}

/// Stable error codes. Hosts are expected to match on these rather than on `Display` text.
pub mod codes {
    pub const LIFECYCLE_HOOK_FAILED: &str = "nexus.container.lifecycle_hook_failed";
    pub const USER_CODE_FAILED: &str = "nexus.rpc.user_code_failed";
    pub const METHOD_NOT_FOUND: &str = "nexus.rpc.method_not_found";
    pub const CANCELLED: &str = "nexus.container.cancelled";
    pub const REMOTE_ERROR: &str = "nexus.rpc.remote_error";
}

/// The error a [`crate::error::NexusError`] is reconstructed from once it crosses the wire,
/// i.e. the typed counterpart of the reply envelope's `error` field.
///
/// Grounded in §6.1/§7: the wire format is a stable `{exc_type, value, traceback}` struct
/// rather than a language-specific repr.
#[derive(Debug, Clone, thiserror::Error)]
#[error("remote error ({exc_type}): {value}")]
pub struct RemoteError {
    pub exc_type: String,
    pub value: String,
    pub traceback: Option<String>,
}

impl From<RemoteError> for NexusError {
    fn from(remote: RemoteError) -> Self {
        NexusError::with_source(
            codes::REMOTE_ERROR,
            ErrorCategory::Remote,
            format!("{}: {}", remote.exc_type, remote.value),
            remote,
        )
    }
}
