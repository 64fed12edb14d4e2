use serde::{Deserialize, Serialize};

pub type Err = anyhow::Error;
pub type Res<T> = Result<T, Err>;
pub type Void = Res<()>;

// Queue types.

/// The kind of chat event that triggered a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    /// The bot was explicitly mentioned (`app_mention`).
    Mention,
    /// A plain channel, group, or direct message (`message`).
    Message,
}

/// The kind of conversation an event was posted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelType {
    /// A public channel.
    Channel,
    /// A private channel.
    Group,
    /// A direct message with the bot.
    Im,
    /// A multi-person direct message.
    Mpim,
    #[default]
    #[serde(other)]
    Unknown,
}

impl ChannelType {
    /// Whether this is a public channel, where the bot only answers when mentioned.
    pub fn is_public(&self) -> bool {
        matches!(self, ChannelType::Channel)
    }
}

/// The event record passed from the ingress stage to the responder.
///
/// Built once from the raw webhook event, encoded into a single queue message,
/// and decoded once on the other side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedEvent {
    pub kind: EventKind,
    pub channel: String,
    pub channel_type: ChannelType,
    pub user: String,
    pub text: String,
    pub ts: String,
    /// Timestamp of the thread root; empty when the message is not in a thread.
    pub thread_ts: String,
    pub file_urls: Vec<String>,
}

impl NormalizedEvent {
    /// Encode the event into the queue wire format.
    pub fn encode(&self) -> Res<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Decode an event from the queue wire format.
    pub fn decode(bytes: &[u8]) -> Res<Self> {
        Ok(bincode::deserialize(bytes)?)
    }

    pub fn is_in_thread(&self) -> bool {
        !self.thread_ts.is_empty()
    }
}

// Chat types.

/// A single message fetched from a thread.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ThreadMessage {
    /// Author of the message; `None` for messages without a user (e.g., integrations).
    pub user: Option<String>,
    pub text: String,
    pub file_urls: Vec<String>,
}

// LLM types.

/// Binary content with its detected MIME type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    pub mime_type: String,
    pub data: Vec<u8>,
}

/// A unit of content within a model request or response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Part {
    Text(String),
    Blob(Blob),
}

/// Who authored a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

/// One conversation turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Content {
    pub role: Role,
    pub parts: Vec<Part>,
}

/// One alternative output from the model.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Candidate {
    pub parts: Vec<Part>,
}

/// The model's answer to one request.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ModelResponse {
    pub candidates: Vec<Candidate>,
}

// Tests.
