//! Webhook classification and filtering for the publish stage.
//!
//! A webhook body is either a handshake challenge, an event worth forwarding,
//! or something to drop. Forwarded events are normalized and published to the
//! queue exactly once per accepted delivery.

use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::{
    base::types::{ChannelType, EventKind, NormalizedEvent, Res},
    service::queue::QueueClient,
};

/// Message subtypes that are bookkeeping rather than something a person said.
const IGNORED_SUBTYPES: &[&str] = &["message_changed", "message_deleted", "channel_join", "channel_leave", "bot_message"];

static MENTION: OnceLock<Regex> = OnceLock::new();

/// Get the regex for any user mention token.
fn mention() -> &'static Regex {
    MENTION.get_or_init(|| Regex::new(r"<@\w+>").unwrap())
}

// Wire types.

/// The outer webhook envelope.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WebhookPayload {
    UrlVerification { challenge: String },
    EventCallback { event: Value },
    #[serde(other)]
    Unsupported,
}

/// The inner event of an `event_callback`.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InnerEvent {
    AppMention(MessageFields),
    Message(MessageFields),
    #[serde(other)]
    Unsupported,
}

/// The fields shared by `app_mention` and `message` events.
#[derive(Debug, Default, Deserialize)]
pub struct MessageFields {
    #[serde(default)]
    pub subtype: Option<String>,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub channel_type: ChannelType,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub ts: Option<String>,
    #[serde(default)]
    pub thread_ts: Option<String>,
    #[serde(default)]
    pub files: Vec<FileFields>,
}

/// The part of a shared file the bot cares about.
#[derive(Debug, Default, Deserialize)]
pub struct FileFields {
    #[serde(default)]
    pub url_private_download: Option<String>,
}

/// What the ingress stage decided to do with a webhook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ingress {
    /// Echo this challenge back and stop.
    Challenge(String),
    /// Publish this event.
    Forward(NormalizedEvent),
    /// Accept the delivery but do nothing.
    Drop,
}

// Functions.

/// Parse a webhook body.
pub fn parse_webhook(body: &[u8]) -> Res<WebhookPayload> {
    Ok(serde_json::from_slice(body)?)
}

/// Decide what to do with a parsed webhook.
#[instrument(skip_all)]
pub fn classify(payload: WebhookPayload, forward_app_mentions: bool) -> Ingress {
    let event = match payload {
        WebhookPayload::UrlVerification { challenge } => return Ingress::Challenge(challenge),
        WebhookPayload::EventCallback { event } => event,
        WebhookPayload::Unsupported => {
            warn!("Unsupported event type.");
            return Ingress::Drop;
        }
    };

    let event_type = event.get("type").and_then(Value::as_str).unwrap_or_default().to_string();

    let inner = match serde_json::from_value::<InnerEvent>(event) {
        Ok(inner) => inner,
        Err(err) => {
            warn!("Malformed `{}` event: {}", event_type, err);
            return Ingress::Drop;
        }
    };

    match inner {
        InnerEvent::AppMention(fields) => {
            if !forward_app_mentions {
                debug!("AppMentionEvent: {:?}", fields);
                return Ingress::Drop;
            }

            normalize(EventKind::Mention, fields)
        }
        InnerEvent::Message(fields) => {
            if let Some(subtype) = fields.subtype.as_deref().filter(|s| IGNORED_SUBTYPES.contains(s)) {
                debug!("Skipping `{}` message.", subtype);
                return Ingress::Drop;
            }

            let in_thread = fields.thread_ts.as_deref().is_some_and(|ts| !ts.is_empty());
            let mentioned = fields.text.as_deref().is_some_and(|text| mention().is_match(text));

            if fields.channel_type.is_public() && !in_thread && !mentioned {
                return Ingress::Drop;
            }

            debug!("MessageEvent: {:?}", fields);

            normalize(EventKind::Message, fields)
        }
        InnerEvent::Unsupported => {
            warn!("Unsupported innerEvent type: {}", event_type);
            Ingress::Drop
        }
    }
}

/// Build the queue record from the raw event fields.
fn normalize(kind: EventKind, fields: MessageFields) -> Ingress {
    let user = fields.user.unwrap_or_default();
    if user.is_empty() {
        debug!("Skipping event without an author.");
        return Ingress::Drop;
    }

    Ingress::Forward(NormalizedEvent {
        kind,
        channel: fields.channel.unwrap_or_default(),
        channel_type: fields.channel_type,
        user,
        text: fields.text.unwrap_or_default(),
        ts: fields.ts.unwrap_or_default(),
        thread_ts: fields.thread_ts.unwrap_or_default(),
        file_urls: fields.files.into_iter().filter_map(|f| f.url_private_download).collect(),
    })
}

/// Encode and publish an accepted event.
#[instrument(skip_all)]
pub async fn publish_event(queue: &QueueClient, event: &NormalizedEvent) -> Res<String> {
    let payload = event.encode()?;
    let id = queue.publish(payload).await?;

    info!("Published a message: {}", id);

    Ok(id)
}

// Tests.
