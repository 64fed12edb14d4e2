//! NATS JetStream queue integration.
//!
//! Events are published to a single subject on a work-queue stream. The
//! responder reads them back through a durable pull consumer, handles each
//! delivery in its own task, and acks or naks it from the handler's result.

use std::{future::Future, pin::pin, sync::Arc, time::Duration};

use async_nats::jetstream::{
    self, AckKind,
    consumer::pull,
    stream::{Config as StreamConfig, RetentionPolicy, StorageType},
};
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use tokio::task::JoinSet;
use tracing::{Instrument, error, info, info_span, instrument, warn};

use crate::base::{
    config::Config,
    types::{Res, Void},
};

use super::{GenericQueueClient, QueueClient};

/// How long a delivery may stay unacknowledged before it is redelivered.
const ACK_WAIT: Duration = Duration::from_secs(300);

/// Deliveries after which a message is given up on.
const MAX_DELIVER: i64 = 5;

/// Unprocessed events older than this are dropped by the stream.
const MAX_AGE: Duration = Duration::from_secs(24 * 3600);

// Extra methods on `QueueClient` applied by the nats implementation.

impl QueueClient {
    /// Connects to NATS and returns a publishing queue client.
    pub async fn nats(config: &Config) -> Res<Self> {
        let client = NatsQueueClient::connect(config).await?;
        Ok(Self { inner: Arc::new(client) })
    }
}

// Specific implementations.

/// NATS JetStream queue client implementation.
#[derive(Clone)]
pub struct NatsQueueClient {
    js: jetstream::Context,
    stream: String,
    subject: String,
}

impl NatsQueueClient {
    /// Connect to the server and make sure the stream exists.
    #[instrument(name = "NatsQueueClient::connect", skip_all)]
    pub async fn connect(config: &Config) -> Res<Self> {
        let client = async_nats::connect(&config.nats_url).await?;
        let js = jetstream::new(client);

        // `get_or_create_stream` is idempotent, so this is safe on every startup.
        js.get_or_create_stream(StreamConfig {
            name: config.queue_stream.clone(),
            subjects: vec![config.queue_subject.clone()],
            retention: RetentionPolicy::WorkQueue,
            storage: StorageType::File,
            max_age: MAX_AGE,
            ..Default::default()
        })
        .await?;

        info!("Connected to NATS at {} (stream `{}`)", config.nats_url, config.queue_stream);

        Ok(Self {
            js,
            stream: config.queue_stream.clone(),
            subject: config.queue_subject.clone(),
        })
    }

    /// Consume queued events until Ctrl-C.
    ///
    /// Each delivery runs `handler` in its own task; `Ok` acks the message and
    /// `Err` naks it so the queue redelivers it.
    pub async fn consume<F, Fut>(&self, consumer_name: &str, handler: F) -> Void
    where
        F: Fn(Vec<u8>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Void> + Send + 'static,
    {
        let stream = self.js.get_stream(&self.stream).await?;
        let consumer = stream
            .get_or_create_consumer(
                consumer_name,
                pull::Config {
                    durable_name: Some(consumer_name.to_string()),
                    filter_subject: self.subject.clone(),
                    ack_wait: ACK_WAIT,
                    max_deliver: MAX_DELIVER,
                    ..Default::default()
                },
            )
            .await?;

        let messages = consumer.messages().await?.filter_map(|next| async move {
            match next {
                Ok(message) => Some(message),
                Err(err) => {
                    error!("Error while receiving from queue: {}", err);
                    None
                }
            }
        });
        let handler = Arc::new(handler);

        info!("Consuming `{}` as `{}` ...", self.subject, consumer_name);

        let shutdown = async {
            let _ = tokio::signal::ctrl_c().await;
        };

        dispatch(messages, shutdown, move |message: jetstream::Message| {
            let handler = handler.clone();
            let sequence = message.info().map(|info| info.stream_sequence).unwrap_or_default();

            async move {
                info!("Received a message: {}", sequence);

                let outcome = (*handler)(message.payload.to_vec()).await;

                let acked = match &outcome {
                    Ok(()) => message.ack().await,
                    Err(err) => {
                        error!("Error while handling: {}", err);
                        message.ack_with(AckKind::Nak(None)).await
                    }
                };

                if let Err(err) = acked {
                    error!("Failed to acknowledge message {}: {}", sequence, err);
                }
            }
            .instrument(info_span!("delivery", sequence))
        })
        .await;

        Ok(())
    }
}

/// Run `handle` for every item in its own task until `shutdown` resolves or
/// `items` ends, then wait for the tasks still in flight.
async fn dispatch<S, T, H, Fut>(items: S, shutdown: impl Future<Output = ()>, handle: H)
where
    S: Stream<Item = T>,
    H: Fn(T) -> Fut,
    Fut: Future<Output = ()> + Send + 'static,
{
    let mut items = pin!(items);
    let mut shutdown = pin!(shutdown);
    let mut tasks = JoinSet::new();

    loop {
        tokio::select! {
            next = items.next() => match next {
                Some(item) => {
                    tasks.spawn(handle(item));
                }
                None => {
                    warn!("Queue consumer stream ended.");
                    break;
                }
            },
            _ = &mut shutdown => {
                info!("Shutting down queue consumer ...");
                break;
            }
            Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                if let Err(err) = joined {
                    error!("Delivery task failed: {}", err);
                }
            }
        }
    }

    if !tasks.is_empty() {
        info!("Waiting for {} in-flight deliveries ...", tasks.len());
    }

    while let Some(joined) = tasks.join_next().await {
        if let Err(err) = joined {
            error!("Delivery task failed: {}", err);
        }
    }
}

#[async_trait]
impl GenericQueueClient for NatsQueueClient {
    #[instrument(skip_all)]
    async fn publish(&self, payload: Vec<u8>) -> Res<String> {
        let ack = self.js.publish(self.subject.clone(), payload.into()).await?.await?;

        Ok(ack.sequence.to_string())
    }
}

// Tests.
