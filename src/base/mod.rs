//! Core components, types, and utilities for the stale-bot.
//!
//! This module contains fundamental building blocks used throughout the application:
//! - Configuration handling and environment variables.
//! - Default comment templates posted on issues.
//! - Issue snapshot types and result handling.

pub mod config;
pub mod messages;
pub mod types;
