//! Worker Context (§3/§4.1): the immutable per-invocation record threaded through a single
//! worker's lifetime, plus the [`Service`]/[`Bindings`] seam the container dispatches into.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use nexus_core::{CallId, NexusError, UniqueId};
use serde_json::Value;

/// Reserved header key under which a caller's call-ID stack travels in `data` (§3).
pub const CALL_ID_STACK_KEY: &str = "call_id_stack";

/// The context keys allowed to cross an RPC hop (§6.2).
pub const CONTEXT_KEYS: &[&str] = &["language", "user_id", "auth_token", CALL_ID_STACK_KEY];

/// Propagated headers carried alongside a worker invocation. Headers travel the wire as JSON,
/// so values are kept as [`serde_json::Value`] rather than a fully dynamic `Any` map — there is
/// no host-local-only header that never leaves the process in this design.
pub type Headers = HashMap<String, Value>;

/// The subset of [`Headers`] permitted to cross an RPC hop (§3 `context_data`).
pub type ContextData = HashMap<String, Value>;

/// Values injections bind onto a worker for the duration of one invocation (§4.3 step 1).
///
/// The source framework sets these as attributes on a dynamically-typed service instance;
/// here each injection's [`crate::dependency::Dependency::name`] keys into a type-erased map
/// that the [`Service::call`] implementation downcasts out of.
#[derive(Default, Clone)]
pub struct Bindings {
    values: HashMap<String, Arc<dyn Any + Send + Sync>>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Arc<dyn Any + Send + Sync>) {
        self.values.insert(name.into(), value);
    }

    /// Looks up a binding by name and downcasts it to `T`. Returns `None` on a missing name
    /// or a type mismatch — a programmer error a caller is expected to catch in development.
    pub fn get<T: Send + Sync + 'static>(&self, name: &str) -> Option<Arc<T>> {
        self.values.get(name)?.clone().downcast::<T>().ok()
    }
}

/// Created once per invocation; immutable after construction (§3, §4.1).
#[derive(Clone, Debug)]
pub struct WorkerContext {
    service_name: Arc<str>,
    method_name: Arc<str>,
    args: Value,
    kwargs: Value,
    parent_call_stack: Vec<String>,
    unique_id: UniqueId,
    call_id: CallId,
    call_id_stack: Vec<String>,
    context_data: ContextData,
}

impl WorkerContext {
    /// Computes every field of §3 deterministically from the caller's propagated `data`.
    ///
    /// `data` is consumed: `call_id_stack` is extracted (and removed) from it per §3, the
    /// remaining entries are filtered down to [`CONTEXT_KEYS`] to seed `context_data`.
    pub fn new(
        service_name: impl Into<Arc<str>>,
        method_name: impl Into<Arc<str>>,
        args: Value,
        kwargs: Value,
        mut data: Headers,
        parent_calls_tracked: usize,
    ) -> Self {
        let service_name = service_name.into();
        let method_name = method_name.into();

        let parent_call_stack: Vec<String> = data
            .remove(CALL_ID_STACK_KEY)
            .and_then(|value| serde_json::from_value(value).ok())
            .unwrap_or_default();

        let unique_id = UniqueId::generate();
        let call_id = CallId::new(&service_name, &method_name, &unique_id);

        let mut call_id_stack: Vec<String> = if parent_call_stack.len() > parent_calls_tracked {
            parent_call_stack[parent_call_stack.len() - parent_calls_tracked..].to_vec()
        } else {
            parent_call_stack.clone()
        };
        call_id_stack.push(call_id.as_str().to_string());

        let mut context_data: ContextData = data
            .into_iter()
            .filter(|(key, _)| CONTEXT_KEYS.contains(&key.as_str()))
            .collect();
        context_data.insert(
            CALL_ID_STACK_KEY.to_string(),
            serde_json::to_value(&call_id_stack).expect("a Vec<String> always serializes"),
        );

        Self {
            service_name,
            method_name,
            args,
            kwargs,
            parent_call_stack,
            unique_id,
            call_id,
            call_id_stack,
            context_data,
        }
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn method_name(&self) -> &str {
        &self.method_name
    }

    pub fn args(&self) -> &Value {
        &self.args
    }

    pub fn kwargs(&self) -> &Value {
        &self.kwargs
    }

    pub fn parent_call_stack(&self) -> &[String] {
        &self.parent_call_stack
    }

    pub fn unique_id(&self) -> &UniqueId {
        &self.unique_id
    }

    pub fn call_id(&self) -> &CallId {
        &self.call_id
    }

    pub fn call_id_stack(&self) -> &[String] {
        &self.call_id_stack
    }

    /// Last element of `parent_call_stack`, if non-empty (§3).
    pub fn immediate_parent_call_id(&self) -> Option<&str> {
        self.parent_call_stack.last().map(String::as_str)
    }

    pub fn context_data(&self) -> &ContextData {
        &self.context_data
    }
}

/// Either side of a worker's method invocation (§4.3 step 3), passed to `worker_result` and
/// to a `handle_result` callback. Never both populated; the enum makes that structurally
/// explicit rather than relying on an `Option<T>, Option<E>` pair that could both be `Some`.
#[derive(Clone, Debug)]
pub enum WorkerOutcome {
    Success(Value),
    Failure(NexusError),
}

impl WorkerOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, WorkerOutcome::Success(_))
    }

    pub fn result(&self) -> Option<&Value> {
        match self {
            WorkerOutcome::Success(value) => Some(value),
            WorkerOutcome::Failure(_) => None,
        }
    }

    pub fn error(&self) -> Option<&NexusError> {
        match self {
            WorkerOutcome::Success(_) => None,
            WorkerOutcome::Failure(err) => Some(err),
        }
    }
}

/// The fresh-per-worker object the container dispatches a method call into (§4.3 step 3).
///
/// A real service implements this once; the container creates a new instance per worker via
/// [`ServiceFactory`] so that no state leaks between concurrent invocations.
#[async_trait]
pub trait Service: Send + Sync {
    async fn call(&self, ctx: &WorkerContext, bindings: &Bindings) -> Result<Value, NexusError>;
}

/// Produces a fresh [`Service`] instance per worker (§4.3 `spawn_worker`: "creates a fresh
/// service instance").
pub trait ServiceFactory: Send + Sync {
    fn create(&self) -> Arc<dyn Service>;
}

/// A `handle_result` callback bound by an entrypoint provider (§4.3 step 7, §4.5).
#[async_trait]
pub trait WorkerResultHandler: Send + Sync {
    async fn handle_result(&self, ctx: &WorkerContext, outcome: &WorkerOutcome);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stack_data(stack: &[&str]) -> Headers {
        let mut data = Headers::new();
        data.insert(
            CALL_ID_STACK_KEY.to_string(),
            serde_json::to_value(stack).unwrap(),
        );
        data
    }

    #[test]
    fn stack_depth_truncates_to_parent_calls_tracked_plus_one() {
        let stack: Vec<String> = (0..100).map(|n| n.to_string()).collect();
        let refs: Vec<&str> = stack.iter().map(String::as_str).collect();
        let ctx = WorkerContext::new(
            "baz",
            "long",
            Value::Null,
            Value::Null,
            stack_data(&refs),
            1,
        );

        assert_eq!(ctx.call_id_stack().len(), 2);
        assert_eq!(ctx.call_id_stack()[0], "99");
        assert!(ctx.call_id_stack()[1].starts_with("baz.long."));
        assert_eq!(ctx.parent_call_stack(), stack.as_slice());
    }

    #[test]
    fn empty_parent_stack_yields_single_entry_stack() {
        let ctx = WorkerContext::new(
            "grandparent",
            "grandparent_do",
            Value::Null,
            Value::Null,
            Headers::new(),
            10,
        );
        assert!(ctx.parent_call_stack().is_empty());
        assert_eq!(ctx.call_id_stack().len(), 1);
        assert!(ctx.immediate_parent_call_id().is_none());
    }

    #[test]
    fn context_data_only_carries_allowed_keys() {
        let mut data = stack_data(&["0"]);
        data.insert("user_id".to_string(), Value::String("u1".into()));
        data.insert("secret".to_string(), Value::String("nope".into()));

        let ctx = WorkerContext::new("svc", "m", Value::Null, Value::Null, data, 10);
        assert!(ctx.context_data().contains_key("user_id"));
        assert!(!ctx.context_data().contains_key("secret"));
        assert!(ctx.context_data().contains_key(CALL_ID_STACK_KEY));
    }

    proptest::proptest! {
        #[test]
        fn stack_never_exceeds_tracked_plus_one(
            stack in proptest::collection::vec("[a-z]{1,4}", 0..40),
            tracked in 0usize..20,
        ) {
            let refs: Vec<&str> = stack.iter().map(String::as_str).collect();
            let ctx = WorkerContext::new("svc", "m", Value::Null, Value::Null, stack_data(&refs), tracked);
            proptest::prop_assert!(ctx.call_id_stack().len() <= tracked + 1);
        }
    }
}
