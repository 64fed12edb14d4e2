//! Library root for `slack-gemini-bot`.
//!
//! Slack-gemini-bot relays Slack conversations to Gemini in two decoupled stages:
//! - The publish stage receives Slack Events API webhooks, filters them, and
//!   enqueues a normalized record of each event worth answering
//! - The subscribe stage consumes those records, builds a prompt from the text,
//!   its attachments and (for threads) the conversation so far, and posts the
//!   model's answer back to Slack
//!
//! The stages only share the queue and the wire format of `NormalizedEvent`.
//! Every external system sits behind a trait so each stage can be tested in isolation.

pub mod base;
pub mod interaction;
pub mod runtime;
pub mod service;

use base::{config::Config, types::Void};
use rustls::crypto;
use tracing::info;

/// Install the process-wide TLS crypto provider.
fn install_crypto_provider() -> Void {
    if crypto::CryptoProvider::get_default().is_some() {
        return Ok(());
    }

    crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install the TLS crypto provider."))
}

/// Run the publish stage: serve the Slack webhook and enqueue accepted events.
pub async fn publish(config: Config) -> Void {
    info!("Starting slack-gemini-bot publisher ...");

    install_crypto_provider()?;

    let runtime = runtime::IngressRuntime::new(config).await?;

    runtime.start().await
}

/// Run the subscribe stage: consume queued events and answer them.
pub async fn subscribe(config: Config) -> Void {
    info!("Starting slack-gemini-bot responder ...");

    install_crypto_provider()?;

    let runtime = runtime::ResponderRuntime::new(config).await?;

    runtime.start().await
}
