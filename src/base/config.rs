//! Load configuration via `config` crate with env-override support.

use std::{net::SocketAddr, ops::Deref, sync::Arc};

use serde::Deserialize;

use super::types::Res;

/// Default Gemini model to use.
fn default_gemini_model() -> String {
    "gemini-1.5-flash".to_string()
}

/// Default Gemini REST endpoint.
fn default_gemini_api_base() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

/// Default NATS server.
fn default_nats_url() -> String {
    "nats://localhost:4222".to_string()
}

/// Default JetStream stream name.
fn default_queue_stream() -> String {
    "SLACK_GEMINI_BOT".to_string()
}

/// Default topic that normalized events are published to.
fn default_queue_subject() -> String {
    "slack-gemini-bot.events".to_string()
}

/// Default durable consumer name for the responder.
fn default_queue_consumer() -> String {
    "responder".to_string()
}

/// Default address for the webhook listener.
fn default_webhook_bind() -> String {
    "0.0.0.0:8080".to_string()
}

/// Default route for the webhook listener.
fn default_webhook_path() -> String {
    "/slack/events".to_string()
}

/// Configuration for the slack-gemini-bot application.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub inner: Arc<ConfigInner>,
}

impl Deref for Config {
    type Target = ConfigInner;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ConfigInner {
    /// Slack bot token (`SLACK_BOT_TOKEN`).
    /// Also used as the bearer credential for private file downloads.
    pub slack_bot_token: String,
    /// Slack signing secret (`SLACK_SIGNING_SECRET`).
    /// When empty, webhook signatures are not verified.
    #[serde(default)]
    pub slack_signing_secret: String,
    /// Gemini API key (`GEMINI_API_KEY`).
    #[serde(default)]
    pub gemini_api_key: String,
    /// Gemini model to use (`GEMINI_MODEL`).
    #[serde(default = "default_gemini_model")]
    pub gemini_model: String,
    /// Gemini REST endpoint (`GEMINI_API_BASE`).
    #[serde(default = "default_gemini_api_base")]
    pub gemini_api_base: String,
    /// NATS server URL (`NATS_URL`).
    #[serde(default = "default_nats_url")]
    pub nats_url: String,
    /// JetStream stream holding queued events (`QUEUE_STREAM`).
    #[serde(default = "default_queue_stream")]
    pub queue_stream: String,
    /// Subject that normalized events are published on (`QUEUE_SUBJECT`).
    #[serde(default = "default_queue_subject")]
    pub queue_subject: String,
    /// Durable consumer name used by the responder (`QUEUE_CONSUMER`).
    #[serde(default = "default_queue_consumer")]
    pub queue_consumer: String,
    /// Address the webhook listener binds to (`WEBHOOK_BIND`).
    #[serde(default = "default_webhook_bind")]
    pub webhook_bind: String,
    /// Route the webhook listener serves (`WEBHOOK_PATH`).
    #[serde(default = "default_webhook_path")]
    pub webhook_path: String,
    /// Enqueue `app_mention` events as well as `message` events (`FORWARD_APP_MENTIONS`).
    ///
    /// Slack delivers both for a mention in a channel the bot is in, so this is off by default.
    #[serde(default)]
    pub forward_app_mentions: bool,
    /// Verbose event logging (`DEBUG`).
    #[serde(default)]
    pub debug: bool,
}

impl Config {
    pub fn load(explicit_path: Option<&std::path::Path>) -> Res<Self> {
        let mut cfg = config::Config::builder().add_source(config::Environment::default().prefix("SLACK_GEMINI_BOT"));

        if let Some(p) = explicit_path {
            cfg = cfg.add_source(config::File::from(p.to_path_buf()));
        } else if std::path::Path::new(".hidden/config.toml").exists() {
            cfg = cfg.add_source(config::File::with_name(".hidden/config.toml"));
        }

        let result = Config {
            inner: Arc::new(cfg.build()?.try_deserialize()?),
        };

        result.validate()?;

        Ok(result)
    }

    /// Check the settings every stage depends on.
    pub fn validate(&self) -> Res<()> {
        if self.slack_bot_token.is_empty() {
            return Err(anyhow::anyhow!("Slack bot token must be set."));
        }

        if self.queue_subject.is_empty() {
            return Err(anyhow::anyhow!("Queue subject must not be empty."));
        }

        if self.webhook_bind.parse::<SocketAddr>().is_err() {
            return Err(anyhow::anyhow!("Webhook bind address `{}` is not a socket address.", self.webhook_bind));
        }

        if !self.webhook_path.starts_with('/') {
            return Err(anyhow::anyhow!("Webhook path must start with `/`."));
        }

        Ok(())
    }

    /// Check the settings only the responder depends on.
    pub fn validate_responder(&self) -> Res<()> {
        if self.gemini_api_key.is_empty() {
            return Err(anyhow::anyhow!("Gemini API key must be set."));
        }

        if self.gemini_model.is_empty() {
            return Err(anyhow::anyhow!("Gemini model must not be empty."));
        }

        Ok(())
    }
}

// Tests.
