//! Event handling for slack-gemini-bot.
//!
//! This module holds the logic of both stages:
//! - Classifying and filtering webhook events before they are queued
//! - Answering queued events with the model
//! - Fetching attachments concurrently for a prompt

pub mod attachments;
pub mod ingress;
pub mod responder;
