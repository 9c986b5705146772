//! WhatsApp Gateway - single-session HTTP relay
//!
//! Exposes one WhatsApp web-client session (driven by an external automation
//! engine) as a small JSON API: send messages, check registration, list chats,
//! reconnect, logout.

pub mod ack;
pub mod config;
pub mod engine;
pub mod error;
pub mod number;
pub mod server;
pub mod session;

pub use error::{Error, Result};
