use async_trait::async_trait;
use roomsync_backend_traits::{
    BackendError, ChangeEvent, EventSink, Identity, SubscriptionHandle, Topic, Transport,
    TypingSignal,
};

use crate::{MemoryBackend, Subscriber};

#[async_trait]
impl Transport for MemoryBackend {
    async fn subscribe(
        &self,
        _identity: &Identity,
        topic: Topic,
        sink: EventSink,
    ) -> Result<SubscriptionHandle, BackendError> {
        self.check_identity()?;
        let (fault, delay) = {
            let mut faults = self.faults.write();
            (faults.fail_next_subscribe.take(), faults.subscribe_delay)
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = fault {
            return Err(err);
        }

        let mut inner = self.inner.write();
        inner.next_id += 1;
        let handle = SubscriptionHandle(inner.next_id);
        tracing::debug!(%topic, %handle, "subscribed");
        inner.subscribers.insert(handle, Subscriber { topic, sink });
        Ok(handle)
    }

    async fn unsubscribe(&self, handle: SubscriptionHandle) {
        if let Some(sub) = self.inner.write().subscribers.remove(&handle) {
            tracing::debug!(topic = %sub.topic, %handle, "unsubscribed");
        }
    }

    async fn broadcast(
        &self,
        _identity: &Identity,
        topic: Topic,
        signal: TypingSignal,
    ) -> Result<(), BackendError> {
        self.check_identity()?;
        self.publish(&topic, ChangeEvent::Broadcast(signal));
        Ok(())
    }
}
