//! External messaging engine seam
//!
//! The engine (authentication handshake, QR pairing, transport, chat sync)
//! is a black box behind [`MessengerEngine`]. The production implementation
//! bridges to an automation sidecar over HTTP/JSON; tests substitute a mock.

use crate::config::Config;
use crate::error::Result;
use async_trait::async_trait;
use serde::Deserialize;

/// Result of a successful send
#[derive(Debug, Clone, Deserialize)]
pub struct SentMessage {
    pub id: String,
    pub ack: i64,
}

/// Most recent message in a chat, as reported by the engine
#[derive(Debug, Clone, Deserialize)]
pub struct LastMessage {
    pub body: String,
    pub timestamp: i64,
}

/// A chat as reported by the engine
#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: String,
    pub name: String,
    pub is_group: bool,
    pub last_message: Option<LastMessage>,
}

/// The authenticated account's own info
#[derive(Debug, Clone, Deserialize)]
pub struct SelfInfo {
    pub pushname: String,
    pub number: String,
    pub platform: String,
}

/// Lifecycle events emitted by the engine
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum EngineEvent {
    /// Pairing QR code issued; payload is the code to scan
    Qr(String),
    Authenticated,
    Ready,
    AuthFailure(String),
    Disconnected(String),
}

/// Operations the gateway needs from the messaging engine.
///
/// All calls are fallible; transport or engine failures surface as
/// [`Error::Upstream`]. `poll_events` blocks until the engine has lifecycle
/// events to report (or its long-poll window expires with an empty batch).
#[async_trait]
pub trait MessengerEngine: Send + Sync {
    /// Start (or restart) the pairing/authentication handshake.
    /// Completion is signaled via lifecycle events, not this call's return.
    async fn initialize(&self) -> Result<()>;

    /// Whether an address is registered on the messaging network
    async fn is_registered(&self, address: &str) -> Result<bool>;

    /// Send a text message to a canonical address
    async fn send_message(&self, address: &str, body: &str) -> Result<SentMessage>;

    /// All chats known to the session, most recent first
    async fn get_chats(&self) -> Result<Vec<Chat>>;

    /// Info about the authenticated account
    async fn self_info(&self) -> Result<SelfInfo>;

    /// Log out, invalidating the persisted credentials
    async fn logout(&self) -> Result<()>;

    /// Tear down the live session, releasing engine resources
    async fn destroy(&self) -> Result<()>;

    /// Wait for the next batch of lifecycle events
    async fn poll_events(&self) -> Result<Vec<EngineEvent>>;
}

/// HTTP/JSON bridge to the engine sidecar process.
///
/// The sidecar owns the headless browser session and persists credentials
/// under `session_id` so restarts do not require re-pairing.
pub struct HttpEngine {
    client: reqwest::Client,
    base_url: String,
    session_id: String,
}

#[derive(Debug, Deserialize)]
struct RegisteredResponse {
    registered: bool,
}

impl HttpEngine {
    pub fn new(config: &Config) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.engine_url.trim_end_matches('/').to_string(),
            session_id: config.session_id.clone(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/session/{}/{}", self.base_url, self.session_id, path)
    }

    async fn post(&self, path: &str) -> Result<()> {
        self.client
            .post(self.url(path))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[async_trait]
impl MessengerEngine for HttpEngine {
    async fn initialize(&self) -> Result<()> {
        self.post("start").await
    }

    async fn is_registered(&self, address: &str) -> Result<bool> {
        let resp: RegisteredResponse = self
            .client
            .get(self.url(&format!("registered/{}", address)))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(resp.registered)
    }

    async fn send_message(&self, address: &str, body: &str) -> Result<SentMessage> {
        let sent: SentMessage = self
            .client
            .post(self.url("messages"))
            .json(&serde_json::json!({ "to": address, "body": body }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(sent)
    }

    async fn get_chats(&self) -> Result<Vec<Chat>> {
        let chats: Vec<Chat> = self
            .client
            .get(self.url("chats"))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(chats)
    }

    async fn self_info(&self) -> Result<SelfInfo> {
        let info: SelfInfo = self
            .client
            .get(self.url("info"))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(info)
    }

    async fn logout(&self) -> Result<()> {
        self.post("logout").await
    }

    async fn destroy(&self) -> Result<()> {
        self.post("destroy").await
    }

    async fn poll_events(&self) -> Result<Vec<EngineEvent>> {
        let events: Vec<EngineEvent> = self
            .client
            .get(self.url("events"))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(events)
    }
}

impl std::fmt::Debug for HttpEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpEngine")
            .field("base_url", &self.base_url)
            .field("session_id", &self.session_id)
            .finish()
    }
}
