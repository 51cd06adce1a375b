//! Service integrations for external APIs and clients.
//!
//! This module contains the integrations used by the stale-bot:
//! - Issue tracker services (e.g., GitHub)
//! - The retry combinator every external call goes through
//!
//! Each service module defines both a generic trait and concrete implementations,
//! allowing for extensibility and easy testing.

pub mod issues;
pub mod retry;
