//! Chat service integration for slack-gemini-bot.
//!
//! This module provides functionality for interacting with Slack:
//! - Looking up the bot identity
//! - Retrieving thread replies
//! - Posting messages and uploading files
//! - Downloading private files
//!
//! It implements the `GenericChatClient` trait on top of `slack-morphism`, with
//! file downloads going through `reqwest` and the bot token as bearer credential.

use crate::base::{
    config::Config,
    types::{Blob, Res, ThreadMessage, Void},
};
use async_trait::async_trait;
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::connect::HttpConnector;
use slack_morphism::prelude::*;
use tracing::{debug, info, instrument};

use std::sync::Arc;

use super::{ChatClient, GenericChatClient};

// Type aliases.

type FullClient = slack_morphism::SlackClient<SlackClientHyperConnector<HttpsConnector<HttpConnector>>>;

// Extra methods on `ChatClient` applied by the slack implementation.

impl ChatClient {
    /// Creates a new Slack chat client.
    pub fn slack(config: &Config) -> Res<Self> {
        let client = SlackChatClient::new(config)?;
        Ok(Self { inner: Arc::new(client) })
    }
}

// Structs.

/// Slack client implementation.
#[derive(Clone)]
struct SlackChatClient {
    bot_token: SlackApiToken,
    client: Arc<FullClient>,
    http: reqwest::Client,
}

impl SlackChatClient {
    /// Create a new Slack chat client.
    #[instrument(name = "SlackChatClient::new", skip_all)]
    pub fn new(config: &Config) -> Res<Self> {
        let bot_token = SlackApiToken::new(SlackApiTokenValue(config.slack_bot_token.clone()));

        let https_connector = HttpsConnector::<HttpConnector>::builder().with_native_roots()?.https_only().enable_all_versions().build();
        let connector = SlackClientHyperConnector::with_connector(https_connector);
        let client = Arc::new(slack_morphism::SlackClient::new(connector));

        Ok(Self {
            bot_token,
            client,
            http: reqwest::Client::new(),
        })
    }
}

#[async_trait]
impl GenericChatClient for SlackChatClient {
    #[instrument(skip(self))]
    async fn bot_user_id(&self) -> Res<String> {
        let session = self.client.open_session(&self.bot_token);
        let bot_user = session.auth_test().await.map_err(|e| anyhow::anyhow!("Failed to look up bot identity: {}", e))?;

        debug!("Slack bot user ID: {}", bot_user.user_id.0);

        Ok(bot_user.user_id.0)
    }

    #[instrument(skip(self))]
    async fn get_thread_replies(&self, channel_id: &str, thread_ts: &str) -> Res<Vec<ThreadMessage>> {
        let request = SlackApiConversationsRepliesRequest::new(SlackChannelId(channel_id.to_string()), SlackTs(thread_ts.to_string()));
        let session = self.client.open_session(&self.bot_token);

        let response = session.conversations_replies(&request).await.map_err(|e| anyhow::anyhow!("Failed to get thread content: {}", e))?;

        let messages = response.messages.into_iter().map(thread_message_from_history).collect::<Vec<_>>();

        info!("Fetched {} messages from thread {}", messages.len(), thread_ts);

        Ok(messages)
    }

    #[instrument(skip(self, text))]
    async fn post_message(&self, channel_id: &str, thread_ts: &str, text: &str) -> Void {
        let section = SlackSectionBlock::new().with_text(SlackBlockText::MarkDown(SlackBlockMarkDownText::new(text.to_string())));
        let message = SlackMessageContent::new().with_text(text.to_string()).with_blocks(vec![section.into()]);

        let mut request = SlackApiChatPostMessageRequest::new(SlackChannelId(channel_id.to_string()), message);
        if !thread_ts.is_empty() {
            request = request.with_thread_ts(SlackTs(thread_ts.to_string()));
        }

        let session = self.client.open_session(&self.bot_token);

        session.chat_post_message(&request).await.map_err(|e| anyhow::anyhow!("Failed to post message: {}", e))?;

        Ok(())
    }

    #[instrument(skip(self, blob, initial_comment))]
    async fn upload_file(&self, channel_id: &str, thread_ts: &str, file_name: &str, blob: &Blob, initial_comment: &str) -> Void {
        let session = self.client.open_session(&self.bot_token);

        // Reserve an upload URL.

        let reserve = SlackApiFilesGetUploadUrlExternalRequest::new(file_name.to_string(), blob.data.len());
        let reserved = session
            .get_upload_url_external(&reserve)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to reserve file upload: {}", e))?;

        // Send the bytes.

        let upload = SlackApiFilesUploadViaUrlRequest::new(reserved.upload_url, blob.data.clone(), blob.mime_type.clone());
        session.files_upload_via_url(&upload).await.map_err(|e| anyhow::anyhow!("Failed to upload file: {}", e))?;

        // Share it in the thread.

        let file = SlackApiFilesComplete::new(reserved.file_id).with_title(file_name.to_string());
        let mut complete = SlackApiFilesCompleteUploadExternalRequest::new(vec![file])
            .with_channel_id(SlackChannelId(channel_id.to_string()))
            .with_thread_ts(SlackTs(thread_ts.to_string()));
        if !initial_comment.is_empty() {
            complete = complete.with_initial_comment(initial_comment.to_string());
        }

        session
            .files_complete_upload_external(&complete)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to share uploaded file: {}", e))?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn download_file(&self, url: &str) -> Res<Vec<u8>> {
        download_with_bearer(&self.http, &self.bot_token.token_value.0, url).await
    }
}

// Helpers.

/// Download `url` with `token` as bearer credential.
pub(crate) async fn download_with_bearer(http: &reqwest::Client, token: &str, url: &str) -> Res<Vec<u8>> {
    let response = http.get(url).bearer_auth(token).send().await?.error_for_status()?;
    let bytes = response.bytes().await?;

    Ok(bytes.to_vec())
}

/// Flatten a Slack history message into the parts the responder needs.
fn thread_message_from_history(message: SlackHistoryMessage) -> ThreadMessage {
    let file_urls = message
        .content
        .files
        .unwrap_or_default()
        .into_iter()
        .filter_map(|file| file.url_private_download.map(|url| url.to_string()))
        .collect();

    ThreadMessage {
        user: message.sender.user.map(|u| u.0),
        text: message.content.text.unwrap_or_default(),
        file_urls,
    }
}

// Tests.
