pub mod gemini;

use crate::base::types::{Content, ModelResponse, Part, Res};
use async_trait::async_trait;
use std::ops::Deref;
use std::sync::Arc;

// Traits.

/// Generic LLM client trait that clients must implement.
///
/// This trait defines the core functionality for interacting with generative models.
/// Implementing this trait allows different model providers to be used with the responder.
#[async_trait]
pub trait GenericLlmClient: Send + Sync + 'static {
    /// Generate a single-turn response from a list of text and binary parts.
    async fn generate_content(&self, parts: Vec<Part>) -> Res<ModelResponse>;

    /// Continue a chat session seeded with `history` by sending the next user turn.
    ///
    /// The history alternates between user and model turns and does not include
    /// the turn being sent.
    async fn send_chat_message(&self, history: Vec<Content>, parts: Vec<Part>) -> Res<ModelResponse>;
}

// Structs.

/// LLM client for the application.
///
/// This is trivially cloneable and can be passed around without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct LlmClient {
    inner: Arc<dyn GenericLlmClient>,
}

impl Deref for LlmClient {
    type Target = dyn GenericLlmClient;

    fn deref(&self) -> &Self::Target {
        &*self.inner
    }
}

impl LlmClient {
    pub fn new(inner: Arc<dyn GenericLlmClient>) -> Self {
        Self { inner }
    }
}
