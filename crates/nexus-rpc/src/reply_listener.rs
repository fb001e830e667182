//! The Reply Listener (§4.7): one shared, per-container reply queue that every
//! [`crate::proxy::ServiceProxy`] call addresses as its `reply_to`.
//!
//! Registered as a *nested* dependency (§4.2: neither an entrypoint nor an injection) because
//! proxies hold a direct `Arc` to it rather than discovering it through [`nexus_hosting::DependencySet`].
//! Its dispatch loop runs as a *protected* managed thread: in-flight proxy calls may still be
//! waiting on a reply while the container is draining its active worker pool during a graceful
//! stop, so it must outlive that step (§4.3, §8 scenario 2).

use std::sync::{Arc, OnceLock, Weak};

use async_trait::async_trait;
use dashmap::DashMap;
use nexus_core::{Logger, NexusError, RpcConfig};
use nexus_hosting::{Dependency, ServiceContainer};
use tokio::sync::{Notify, mpsc, oneshot};
use uuid::Uuid;

use crate::broker::{Broker, Delivery};
use crate::envelope::ReplyBody;
use crate::signal::OnceSignal;

pub struct ReplyListener {
    broker: Arc<dyn Broker>,
    exchange: String,
    service_name: Arc<str>,
    container: OnceLock<Weak<ServiceContainer>>,
    routing_key: OnceLock<Arc<str>>,
    reply_events: DashMap<String, oneshot::Sender<ReplyBody>>,
    stop_notify: Notify,
    stopped: OnceSignal,
    self_ref: Weak<ReplyListener>,
}

impl ReplyListener {
    pub fn new(broker: Arc<dyn Broker>, service_name: impl Into<Arc<str>>, config: &RpcConfig) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            broker,
            exchange: config.rpc_exchange.clone(),
            service_name: service_name.into(),
            container: OnceLock::new(),
            routing_key: OnceLock::new(),
            reply_events: DashMap::new(),
            stop_notify: Notify::new(),
            stopped: OnceSignal::new(),
            self_ref: weak.clone(),
        })
    }

    /// The routing key callers address their request's `reply_to` at (§4.7). Only meaningful
    /// after `prepare()` has run, i.e. after the owning container has started.
    pub fn routing_key(&self) -> Arc<str> {
        self.routing_key
            .get()
            .cloned()
            .expect("ReplyListener.prepare() runs before any proxy call is possible")
    }

    /// Registers interest in the reply correlated by `correlation_id`, returning a receiver
    /// that resolves once the matching reply arrives (§4.7/§4.8).
    pub fn get_reply_event(&self, correlation_id: impl Into<String>) -> oneshot::Receiver<ReplyBody> {
        let (tx, rx) = oneshot::channel();
        self.reply_events.insert(correlation_id.into(), tx);
        rx
    }

    /// Drops a previously-registered reply event without waiting for it, e.g. once a proxy
    /// call's own timeout has elapsed.
    pub fn forget_reply_event(&self, correlation_id: &str) {
        self.reply_events.remove(correlation_id);
    }

    async fn run_loop(self: Arc<Self>, mut rx: mpsc::Receiver<Delivery>) -> Result<(), NexusError> {
        loop {
            tokio::select! {
                biased;
                _ = self.stop_notify.notified() => break,
                delivery = rx.recv() => {
                    match delivery {
                        Some(delivery) => self.dispatch(delivery).await,
                        None => break,
                    }
                }
            }
        }
        self.stopped.fire().await;
        Ok(())
    }

    async fn dispatch(&self, delivery: Delivery) {
        delivery.ack().await;

        let Some(correlation_id) = delivery.correlation_id.as_ref() else {
            return;
        };
        let Some((_, sender)) = self.reply_events.remove(correlation_id) else {
            // Nobody is waiting any more (a forgotten/timed-out call, or a duplicate delivery).
            return;
        };
        if let Ok(body) = serde_json::from_slice::<ReplyBody>(&delivery.body) {
            let _ = sender.send(body);
        }
    }
}

#[async_trait]
impl Dependency for ReplyListener {
    fn name(&self) -> &str {
        "reply_listener"
    }

    fn bind_container(&self, container: Weak<ServiceContainer>) {
        let _ = self.container.set(container);
    }

    async fn prepare(&self) -> Result<(), NexusError> {
        let routing_key: Arc<str> = Arc::from(Uuid::new_v4().to_string());
        let queue_name = format!("rpc.reply-{}-{routing_key}", self.service_name);
        let rx = self
            .broker
            .declare_and_consume(&queue_name, &self.exchange, &routing_key, false)
            .await?;
        let _ = self.routing_key.set(routing_key);

        let container = self
            .container
            .get()
            .and_then(Weak::upgrade)
            .expect("bind_container always runs before prepare (§4.3 `build`)");
        let this = self
            .self_ref
            .upgrade()
            .expect("ReplyListener is alive for the duration of its own prepare()");
        container.spawn_managed_thread(async move { this.run_loop(rx).await }, true);
        Ok(())
    }

    async fn stop(&self) -> Result<(), NexusError> {
        self.stop_notify.notify_waiters();
        self.stopped.wait().await;
        Ok(())
    }
}
