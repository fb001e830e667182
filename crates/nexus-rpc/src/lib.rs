//! The RPC subsystem (§4.4–§4.9): request consumer, entrypoint provider, responder, reply
//! listener and service/method proxy, all built on `nexus-hosting`'s [`nexus_hosting::ServiceContainer`]
//! and talking to a transport through the narrow [`Broker`] port.
//!
//! This crate knows nothing about lifecycle or worker-pool admission — it only turns broker
//! deliveries into `spawn_worker` calls and worker outcomes back into broker publishes.

mod broker;
mod consumer;
mod entrypoint;
mod envelope;
mod proxy;
mod reply_listener;
mod responder;
mod signal;

pub use broker::{Broker, Delivery, InMemoryBroker, OutboundMessage, RetryPolicy};
pub use consumer::{EntrypointCallback, RpcConsumer};
pub use entrypoint::RpcEntrypointProvider;
pub use envelope::{
    ErrorEnvelope, HEADER_PREFIX, ReplyBody, RequestBody, decode_context_headers,
    encode_context_headers, error_envelope_from,
};
pub use proxy::{BoundServiceProxy, ServiceProxy};
pub use reply_listener::ReplyListener;
pub use responder::Responder;
