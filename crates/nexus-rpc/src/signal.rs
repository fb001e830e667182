//! A tiny "fired exactly once, awaited by everyone interested" primitive, shared by the
//! consumer's and reply listener's dispatch-loop teardown (§4.4, §4.7): unregistering the last
//! provider must block until the loop has actually stopped consuming, not merely been asked to.

use tokio::sync::{Mutex, oneshot};

pub(crate) struct OnceSignal {
    tx: Mutex<Option<oneshot::Sender<()>>>,
    rx: Mutex<Option<oneshot::Receiver<()>>>,
}

impl OnceSignal {
    pub(crate) fn new() -> Self {
        let (tx, rx) = oneshot::channel();
        Self {
            tx: Mutex::new(Some(tx)),
            rx: Mutex::new(Some(rx)),
        }
    }

    pub(crate) async fn fire(&self) {
        if let Some(tx) = self.tx.lock().await.take() {
            let _ = tx.send(());
        }
    }

    pub(crate) async fn wait(&self) {
        let rx = self.rx.lock().await.take();
        if let Some(rx) = rx {
            let _ = rx.await;
        }
    }
}
