//! Core components, types, and utilities for the slack-gemini-bot.
//!
//! This module contains fundamental building blocks used throughout the application:
//! - Configuration handling and environment variables.
//! - Queue, chat, and model types.
//! - Markdown and content-type helpers.

pub mod config;
pub mod markdown;
pub mod sniff;
pub mod types;
