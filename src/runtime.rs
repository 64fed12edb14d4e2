//! Runtime services and shared state for each stage of slack-gemini-bot.

use tracing::instrument;

use crate::{
    base::{
        config::Config,
        types::{Res, Void},
    },
    interaction::responder,
    service::{
        chat::ChatClient,
        llm::LlmClient,
        queue::{QueueClient, nats::NatsQueueClient},
        webhook,
    },
};

/// Runtime context of the publish stage.
///
/// Holds the configuration and the queue the webhook publishes to.
#[derive(Clone)]
pub struct IngressRuntime {
    /// The configuration for the application.
    pub config: Config,
    /// The queue client instance.
    pub queue: QueueClient,
}

impl IngressRuntime {
    /// Create a new ingress runtime instance.
    #[instrument(skip_all)]
    pub async fn new(config: Config) -> Res<Self> {
        let queue = QueueClient::nats(&config).await?;

        Ok(Self { config, queue })
    }

    /// Serve the webhook until shutdown.
    pub async fn start(&self) -> Void {
        webhook::serve(self.config.clone(), self.queue.clone()).await
    }
}

/// Runtime context of the subscribe stage.
///
/// This struct holds the chat and LLM clients along with the queue consumer.
/// It is designed to be trivially cloneable.
#[derive(Clone)]
pub struct ResponderRuntime {
    /// The configuration for the application.
    pub config: Config,
    /// The chat client instance.
    pub chat: ChatClient,
    /// The LLM client instance.
    pub llm: LlmClient,
    /// The queue the responder consumes from.
    pub consumer: NatsQueueClient,
}

impl ResponderRuntime {
    /// Create a new responder runtime instance.
    #[instrument(skip_all)]
    pub async fn new(config: Config) -> Res<Self> {
        config.validate_responder()?;

        // Initialize the LLM client.
        let llm = LlmClient::gemini(&config);

        // Initialize the chat client.
        let chat = ChatClient::slack(&config)?;

        // Initialize the queue consumer.
        let consumer = NatsQueueClient::connect(&config).await?;

        Ok(Self { config, chat, llm, consumer })
    }

    /// Answer queued events until shutdown.
    pub async fn start(&self) -> Void {
        let chat = self.chat.clone();
        let llm = self.llm.clone();

        self.consumer
            .consume(&self.config.queue_consumer, move |payload| {
                let chat = chat.clone();
                let llm = llm.clone();

                async move { responder::handle_delivery(&payload, &chat, &llm).await }
            })
            .await
    }
}
