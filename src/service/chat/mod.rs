pub mod slack;

use std::{ops::Deref, sync::Arc};

use async_trait::async_trait;

use crate::base::types::{Blob, Res, ThreadMessage, Void};

// Traits.

/// Generic "chat" trait that clients must implement.
///
/// This trait defines the core functionality for interacting with chat platforms
/// like Slack. Implementing this trait allows different chat services to be used
/// with the responder.
#[async_trait]
pub trait GenericChatClient: Send + Sync + 'static {
    /// Look up the bot user ID.
    ///
    /// This is a cheap, idempotent call that is made once per invocation rather
    /// than cached across invocations.
    async fn bot_user_id(&self) -> Res<String>;

    /// Get every message in a thread, oldest first.
    ///
    /// The last message is the one that triggered the current invocation.
    async fn get_thread_replies(&self, channel_id: &str, thread_ts: &str) -> Res<Vec<ThreadMessage>>;

    /// Post a markdown message to a channel, threaded under `thread_ts` unless it is empty.
    async fn post_message(&self, channel_id: &str, thread_ts: &str, text: &str) -> Void;

    /// Upload a file to a channel thread, with `initial_comment` unless it is empty.
    async fn upload_file(&self, channel_id: &str, thread_ts: &str, file_name: &str, blob: &Blob, initial_comment: &str) -> Void;

    /// Download a private file with the bot's credentials.
    ///
    /// Any non-success status is an error.
    async fn download_file(&self, url: &str) -> Res<Vec<u8>>;
}

// Structs.

/// Chat client for the application.
///
/// It is designed to be trivially cloneable, allowing it to be passed around
/// without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct ChatClient {
    inner: Arc<dyn GenericChatClient>,
}

impl Deref for ChatClient {
    type Target = dyn GenericChatClient;

    fn deref(&self) -> &Self::Target {
        &*self.inner
    }
}

impl ChatClient {
    pub fn new(inner: Arc<dyn GenericChatClient>) -> Self {
        Self { inner }
    }
}
