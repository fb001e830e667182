//! Opaque identifiers used for call-chain tracing and RPC correlation.

use std::fmt;

/// A freshly generated, practically-unique identifier (§3 `unique_id`).
///
/// Backed by UUIDv4. Nothing downstream parses the internal structure; it is treated as an
/// opaque token that happens to be unique, not as a UUID specifically.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct UniqueId(String);

impl UniqueId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UniqueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An opaque correlation ID linking an RPC request to its reply (glossary: Correlation ID).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CorrelationId(String);

impl CorrelationId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for CorrelationId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// One entry of a call-ID stack: `"{service_name}.{method_name}.{unique_id}"` (§3 `call_id`).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CallId(String);

impl CallId {
    pub fn new(service_name: &str, method_name: &str, unique_id: &UniqueId) -> Self {
        Self(format!("{service_name}.{method_name}.{unique_id}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
