//! Service integrations for external APIs and clients.
//!
//! This module contains implementations for the services used by slack-gemini-bot:
//! - Chat services (e.g., Slack)
//! - LLM services (e.g., Gemini)
//! - Queue services (e.g., NATS JetStream)
//! - The inbound webhook endpoint
//!
//! Each client module defines both generic traits and concrete implementations,
//! allowing for extensibility and easy testing.

pub mod chat;
pub mod llm;
pub mod queue;
pub mod webhook;
