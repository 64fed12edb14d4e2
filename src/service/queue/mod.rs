pub mod nats;

use std::{ops::Deref, sync::Arc};

use async_trait::async_trait;

use crate::base::types::Res;

// Traits.

/// Generic queue trait that clients must implement.
///
/// The queue is the only coupling point between the ingress and responder stages.
/// Delivery is at-least-once; duplicates are tolerated rather than prevented.
#[async_trait]
pub trait GenericQueueClient: Send + Sync + 'static {
    /// Publish one encoded event on the configured topic.
    ///
    /// Returns the identifier the queue assigned to the message.
    async fn publish(&self, payload: Vec<u8>) -> Res<String>;
}

// Structs.

/// Queue client for the application.
///
/// This is trivially cloneable and can be passed around without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct QueueClient {
    inner: Arc<dyn GenericQueueClient>,
}

impl Deref for QueueClient {
    type Target = dyn GenericQueueClient;

    fn deref(&self) -> &Self::Target {
        &*self.inner
    }
}

impl QueueClient {
    pub fn new(inner: Arc<dyn GenericQueueClient>) -> Self {
        Self { inner }
    }
}
