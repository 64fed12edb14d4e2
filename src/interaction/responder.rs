//! The subscribe stage: turn one queued event into at most one reply.
//!
//! Every failure after the event is decoded is logged and ends the invocation
//! without a reply; the user simply gets no answer rather than a partial one.

use chrono::Utc;
use futures::future::join_all;
use tracing::{Instrument, debug, error, info, instrument, warn};

use crate::{
    base::{
        markdown::to_slack_markdown,
        types::{Blob, Content, EventKind, ModelResponse, NormalizedEvent, Part, Res, Role, ThreadMessage, Void},
    },
    interaction::attachments::fetch_blobs,
    service::{chat::ChatClient, llm::LlmClient},
};

/// The post-processed model output.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Reply {
    /// Text parts, converted to Slack markdown and joined by newlines.
    pub text: String,
    /// Binary parts generated by the model.
    pub blobs: Vec<Blob>,
}

impl Reply {
    pub fn is_empty(&self) -> bool {
        self.text.is_empty() && self.blobs.is_empty()
    }
}

/// Handle one queued delivery.
///
/// Returns an error only when the delivery itself is unusable (undecodable
/// payload, identity lookup failure) so the queue can redeliver it. Failures
/// while producing the reply are logged and swallowed.
#[instrument(skip_all)]
pub async fn handle_delivery(payload: &[u8], chat: &ChatClient, llm: &LlmClient) -> Void {
    let event = NormalizedEvent::decode(payload)?;

    // The identity is looked up once per invocation and threaded through.
    let bot_user_id = chat.bot_user_id().await?;

    if event.user == bot_user_id {
        debug!("Ignoring the bot's own message.");
        return Ok(());
    }

    debug!("{:?}: {:?}", event.kind, event);

    let result = respond(&event, &bot_user_id, chat, llm).in_current_span().await;

    if let Err(err) = &result {
        error!("Error while handling: {}", err);
    }

    Ok(())
}

/// Pick the conversation case, generate an answer, and deliver it.
#[instrument(skip_all, fields(channel = %event.channel, ts = %event.ts))]
async fn respond(event: &NormalizedEvent, bot_user_id: &str, chat: &ChatClient, llm: &LlmClient) -> Void {
    let mentioned = event.text.contains(&mention_token(bot_user_id));
    let prompt = remove_mention(&event.text, bot_user_id);

    if prompt.is_empty() && event.file_urls.is_empty() {
        debug!("Nothing to send.");
        return Ok(());
    }

    let (reply, post_thread_ts) = match (event.kind, event.is_in_thread()) {
        (EventKind::Mention, _) => {
            let reply = generate_answer(&prompt, &event.file_urls, chat, llm).await?;
            (reply, reply_thread_ts(event))
        }
        (EventKind::Message, false) => {
            // Mention or direct message.
            if event.channel_type.is_public() && !mentioned {
                return Ok(());
            }

            let reply = generate_answer(&prompt, &event.file_urls, chat, llm).await?;
            (reply, if mentioned { event.ts.as_str() } else { "" })
        }
        (EventKind::Message, true) => {
            let reply = generate_chat_answer(event, &prompt, bot_user_id, chat, llm).await?;
            (reply, event.thread_ts.as_str())
        }
    };

    match reply {
        Some(reply) if !reply.is_empty() => deliver(event, reply, post_thread_ts, chat).await,
        _ => Ok(()),
    }
}

/// Single-turn generation from the prompt and its attachments.
async fn generate_answer(prompt: &str, file_urls: &[String], chat: &ChatClient, llm: &LlmClient) -> Res<Option<Reply>> {
    let parts = build_parts(prompt, file_urls, chat).await;
    if parts.is_empty() {
        return Ok(None);
    }

    let response = llm.generate_content(parts).await.map_err(|e| anyhow::anyhow!("Failed to get Gemini's response: {}", e))?;

    Ok(Some(join_response(response)))
}

/// Continue a thread the bot is already part of.
///
/// Only threads whose previous message came from the bot are answered.
async fn generate_chat_answer(event: &NormalizedEvent, prompt: &str, bot_user_id: &str, chat: &ChatClient, llm: &LlmClient) -> Res<Option<Reply>> {
    let messages = chat.get_thread_replies(&event.channel, &event.thread_ts).await?;

    let Some((_, earlier)) = messages.split_last() else {
        return Ok(None);
    };

    if earlier.last().and_then(|m| m.user.as_deref()) != Some(bot_user_id) {
        info!("Thread was not continued from the bot; not answering.");
        return Ok(None);
    }

    for (i, message) in messages.iter().enumerate() {
        debug!("msgs[{}]: {:?}", i, message);
    }

    let (history, parts) = tokio::join!(build_history(earlier, bot_user_id, chat), build_parts(prompt, &event.file_urls, chat));
    if parts.is_empty() {
        return Ok(None);
    }

    let response = llm
        .send_chat_message(history, parts)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to get Gemini's response: {}", e))?;

    Ok(Some(join_response(response)))
}

/// Post the reply as a message, or upload its first file with the text as comment.
async fn deliver(event: &NormalizedEvent, reply: Reply, post_thread_ts: &str, chat: &ChatClient) -> Void {
    let Some(blob) = reply.blobs.first() else {
        chat.post_message(&event.channel, post_thread_ts, &reply.text).await?;
        info!("Posted reply.");
        return Ok(());
    };

    if reply.blobs.len() > 1 {
        warn!("Model returned {} files; only the first is uploaded.", reply.blobs.len());
    }

    let file_name = format!("file_{}.{}", Utc::now().timestamp(), file_extension(&blob.mime_type));
    chat.upload_file(&event.channel, reply_thread_ts(event), &file_name, blob, &reply.text).await?;
    info!("Uploaded reply file `{}`.", file_name);

    Ok(())
}

// Helpers.

/// The literal mention token for a user.
fn mention_token(user_id: &str) -> String {
    format!("<@{user_id}>")
}

/// Strip the bot's mention token and surrounding whitespace.
pub fn remove_mention(text: &str, bot_user_id: &str) -> String {
    text.replace(&mention_token(bot_user_id), "").trim().to_string()
}

/// The thread root if there is one, else the trigger message itself.
fn reply_thread_ts(event: &NormalizedEvent) -> &str {
    if event.is_in_thread() { &event.thread_ts } else { &event.ts }
}

/// The file extension for a generated file, e.g. `png` for `image/png`.
fn file_extension(mime_type: &str) -> &str {
    let essence = mime_type.split(';').next().unwrap_or_default().trim();
    essence.rsplit('/').next().filter(|s| !s.is_empty()).unwrap_or("bin")
}

/// One text part (if any) followed by the fetched attachments.
async fn build_parts(text: &str, file_urls: &[String], chat: &ChatClient) -> Vec<Part> {
    let mut parts = Vec::new();

    if !text.is_empty() {
        parts.push(Part::Text(text.to_string()));
    }

    parts.extend(fetch_blobs(chat, file_urls).await.into_iter().map(Part::Blob));

    parts
}

/// Convert earlier thread messages into model history.
///
/// Turns are built concurrently, each fetching its own attachments; turns that
/// end up with no content are left out.
async fn build_history(messages: &[ThreadMessage], bot_user_id: &str, chat: &ChatClient) -> Vec<Content> {
    let turns = messages.iter().map(|message| async move {
        let role = if message.user.as_deref() == Some(bot_user_id) { Role::Model } else { Role::User };
        let parts = build_parts(&remove_mention(&message.text, bot_user_id), &message.file_urls, chat).await;

        Content { role, parts }
    });

    join_all(turns).await.into_iter().filter(|turn| !turn.parts.is_empty()).collect()
}

/// Collect the first candidate's parts into a reply.
pub fn join_response(response: ModelResponse) -> Reply {
    let mut texts = Vec::new();
    let mut blobs = Vec::new();

    for part in response.candidates.into_iter().next().map(|c| c.parts).unwrap_or_default() {
        match part {
            Part::Text(text) => texts.push(to_slack_markdown(&text)),
            Part::Blob(blob) => blobs.push(blob),
        }
    }

    Reply { text: texts.join("\n"), blobs }
}

// Tests.
