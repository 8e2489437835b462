//! Relay unread Gmail messages with a given subject to a Telegram chat.
//!
//! Each cycle authenticates, searches `is:unread subject:"…"`, forwards every
//! hit (split into numbered parts when it is too long for one chat message)
//! and then clears its `UNREAD` label.

pub mod auth;
pub mod chat;
pub mod config;
pub mod daemon;
pub mod domain;
pub mod error;
pub mod mail;
