//! Session lifecycle management
//!
//! Owns the single engine handle and the session state machine:
//! Initializing -> AwaitingAuthentication -> Ready -> Disconnected, with
//! Disconnected -> Initializing on reconnect and a direct drop to
//! Disconnected on authentication failure.

use crate::config::Config;
use crate::engine::{EngineEvent, MessengerEngine};
use crate::error::{Error, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

/// Where the session currently is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Initializing,
    AwaitingAuthentication,
    Ready,
    Disconnected,
}

impl SessionState {
    /// Reduction reported by /status
    pub fn connection_label(&self) -> &'static str {
        match self {
            SessionState::Ready => "connected",
            _ => "disconnected",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionState::Initializing => "initializing",
            SessionState::AwaitingAuthentication => "awaiting_authentication",
            SessionState::Ready => "ready",
            SessionState::Disconnected => "disconnected",
        };
        write!(f, "{}", name)
    }
}

/// Manager for the one process-wide engine session
pub struct SessionManager {
    engine: Arc<dyn MessengerEngine>,
    state: Arc<RwLock<SessionState>>,
    /// Whether the engine is holding a live session handle. Distinct from
    /// [`SessionState`]: a disconnect event drops the state but the handle
    /// survives until an explicit destroy.
    handle_live: Arc<AtomicBool>,
    reconnect_delay: Duration,
}

impl SessionManager {
    pub fn new(engine: Arc<dyn MessengerEngine>, config: &Config) -> Arc<Self> {
        Arc::new(Self {
            engine,
            state: Arc::new(RwLock::new(SessionState::Disconnected)),
            handle_live: Arc::new(AtomicBool::new(false)),
            reconnect_delay: Duration::from_millis(config.reconnect_delay_ms),
        })
    }

    pub async fn state(&self) -> SessionState {
        *self.state.read().await
    }

    pub async fn is_ready(&self) -> bool {
        self.state().await == SessionState::Ready
    }

    /// The engine handle, gated on readiness. Messaging operations go
    /// through here so a non-ready session never reaches the engine.
    pub async fn engine(&self) -> Result<Arc<dyn MessengerEngine>> {
        if self.is_ready().await {
            Ok(Arc::clone(&self.engine))
        } else {
            Err(Error::NotReady)
        }
    }

    /// Trigger pairing/authentication. Returns once the engine has accepted
    /// the request; completion arrives later as lifecycle events.
    pub async fn initialize(&self) -> Result<()> {
        initialize_engine(&self.engine, &self.state, &self.handle_live).await
    }

    /// Single transition function for engine lifecycle events
    pub async fn apply_event(&self, event: EngineEvent) {
        let mut state = self.state.write().await;
        match event {
            EngineEvent::Qr(code) => {
                info!(qr = %code, "QR code issued, scan with the phone to pair");
                *state = SessionState::AwaitingAuthentication;
            }
            EngineEvent::Authenticated => {
                info!("authenticated, waiting for session to come up");
                *state = SessionState::AwaitingAuthentication;
            }
            EngineEvent::Ready => {
                info!("session ready, messaging operations unlocked");
                self.handle_live.store(true, Ordering::SeqCst);
                *state = SessionState::Ready;
            }
            EngineEvent::AuthFailure(msg) => {
                warn!(reason = %msg, "authentication failed");
                *state = SessionState::Disconnected;
            }
            EngineEvent::Disconnected(reason) => {
                warn!(reason = %reason, "session disconnected");
                *state = SessionState::Disconnected;
            }
        }
    }

    /// Tear down the current session handle (if one exists, even after a
    /// disconnect event) and schedule a fresh initialization. Returns
    /// immediately; the handshake completes asynchronously. The fixed delay
    /// lets the engine's teardown settle before the new handshake starts;
    /// the sidecar exposes no teardown-complete signal to await instead.
    pub async fn reconnect(&self) -> Result<()> {
        if self.handle_live.load(Ordering::SeqCst) {
            info!("destroying current session before reconnect");
            self.engine.destroy().await?;
            self.handle_live.store(false, Ordering::SeqCst);
        }
        *self.state.write().await = SessionState::Disconnected;

        let engine = Arc::clone(&self.engine);
        let state = Arc::clone(&self.state);
        let handle_live = Arc::clone(&self.handle_live);
        let delay = self.reconnect_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = initialize_engine(&engine, &state, &handle_live).await {
                error!("re-initialization failed: {}", e);
            }
        });

        Ok(())
    }

    /// Log out of the messaging account. After this, persisted credentials
    /// are invalid and a reconnect is required to pair again.
    pub async fn logout(&self) -> Result<()> {
        if self.is_ready().await {
            self.engine.logout().await?;
            *self.state.write().await = SessionState::Disconnected;
            info!("logged out");
        }
        Ok(())
    }

    /// Best-effort teardown for process shutdown
    pub async fn shutdown(&self) {
        if let Err(e) = self.engine.destroy().await {
            warn!("engine teardown on shutdown failed: {}", e);
        }
        self.handle_live.store(false, Ordering::SeqCst);
        *self.state.write().await = SessionState::Disconnected;
    }
}

async fn initialize_engine(
    engine: &Arc<dyn MessengerEngine>,
    state: &RwLock<SessionState>,
    handle_live: &AtomicBool,
) -> Result<()> {
    *state.write().await = SessionState::Initializing;
    info!("initializing engine session");

    if let Err(e) = engine.initialize().await {
        *state.write().await = SessionState::Disconnected;
        return Err(e);
    }
    handle_live.store(true, Ordering::SeqCst);
    Ok(())
}

/// Drive engine lifecycle events into the state machine.
///
/// Runs until the process exits; poll failures are logged and retried
/// after a short pause so a restarting sidecar does not kill the pump.
/// Empty batches are paced too, in case the sidecar answers immediately
/// instead of long-polling.
pub fn spawn_event_pump(manager: Arc<SessionManager>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match manager.engine.poll_events().await {
                Ok(events) if events.is_empty() => {
                    tokio::time::sleep(Duration::from_millis(250)).await;
                }
                Ok(events) => {
                    for event in events {
                        manager.apply_event(event).await;
                    }
                }
                Err(e) => {
                    warn!("event poll failed: {}", e);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Chat, SelfInfo, SentMessage};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Mock engine recording lifecycle calls
    #[derive(Default)]
    struct MockEngine {
        initialize_calls: AtomicUsize,
        destroy_calls: AtomicUsize,
        logout_calls: AtomicUsize,
        poll_calls: AtomicUsize,
        fail_destroy: bool,
        fail_logout: bool,
    }

    #[async_trait]
    impl MessengerEngine for MockEngine {
        async fn initialize(&self) -> Result<()> {
            self.initialize_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn is_registered(&self, _address: &str) -> Result<bool> {
            Ok(true)
        }

        async fn send_message(&self, _address: &str, _body: &str) -> Result<SentMessage> {
            Ok(SentMessage {
                id: "msg-1".to_string(),
                ack: 1,
            })
        }

        async fn get_chats(&self) -> Result<Vec<Chat>> {
            Ok(Vec::new())
        }

        async fn self_info(&self) -> Result<SelfInfo> {
            Ok(SelfInfo {
                pushname: "Test".to_string(),
                number: "5511999999999".to_string(),
                platform: "android".to_string(),
            })
        }

        async fn logout(&self) -> Result<()> {
            self.logout_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_logout {
                return Err(Error::Upstream("logout failed".to_string()));
            }
            Ok(())
        }

        async fn destroy(&self) -> Result<()> {
            self.destroy_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_destroy {
                return Err(Error::Upstream("destroy failed".to_string()));
            }
            Ok(())
        }

        async fn poll_events(&self) -> Result<Vec<EngineEvent>> {
            self.poll_calls.fetch_add(1, Ordering::SeqCst);
            Ok(Vec::new())
        }
    }

    fn manager_with(engine: Arc<MockEngine>) -> Arc<SessionManager> {
        SessionManager::new(engine, &Config::for_test())
    }

    async fn wait_for_state(manager: &SessionManager, want: SessionState) {
        for _ in 0..100 {
            if manager.state().await == want {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("state never reached {:?}", want);
    }

    #[tokio::test]
    async fn test_lifecycle_transitions() {
        let manager = manager_with(Arc::new(MockEngine::default()));
        assert_eq!(manager.state().await, SessionState::Disconnected);

        manager.initialize().await.unwrap();
        assert_eq!(manager.state().await, SessionState::Initializing);

        manager.apply_event(EngineEvent::Qr("2@code".to_string())).await;
        assert_eq!(manager.state().await, SessionState::AwaitingAuthentication);

        manager.apply_event(EngineEvent::Authenticated).await;
        assert_eq!(manager.state().await, SessionState::AwaitingAuthentication);

        manager.apply_event(EngineEvent::Ready).await;
        assert_eq!(manager.state().await, SessionState::Ready);
        assert!(manager.is_ready().await);

        manager
            .apply_event(EngineEvent::Disconnected("NAVIGATION".to_string()))
            .await;
        assert_eq!(manager.state().await, SessionState::Disconnected);
    }

    #[tokio::test]
    async fn test_auth_failure_drops_to_disconnected() {
        let manager = manager_with(Arc::new(MockEngine::default()));
        manager.apply_event(EngineEvent::Qr("2@code".to_string())).await;
        manager
            .apply_event(EngineEvent::AuthFailure("bad credentials".to_string()))
            .await;
        assert_eq!(manager.state().await, SessionState::Disconnected);
    }

    #[tokio::test]
    async fn test_engine_gated_on_readiness() {
        let manager = manager_with(Arc::new(MockEngine::default()));
        assert!(matches!(manager.engine().await, Err(Error::NotReady)));

        manager.apply_event(EngineEvent::Ready).await;
        assert!(manager.engine().await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_destroys_then_reinitializes() {
        let engine = Arc::new(MockEngine::default());
        let manager = manager_with(Arc::clone(&engine));
        manager.apply_event(EngineEvent::Ready).await;

        manager.reconnect().await.unwrap();
        assert_eq!(engine.destroy_calls.load(Ordering::SeqCst), 1);
        assert!(!manager.is_ready().await);

        // The delayed re-initialization runs after the settle period
        wait_for_state(&manager, SessionState::Initializing).await;
        assert_eq!(engine.initialize_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_after_disconnect_still_destroys() {
        let engine = Arc::new(MockEngine::default());
        let manager = manager_with(Arc::clone(&engine));
        manager.apply_event(EngineEvent::Ready).await;
        manager
            .apply_event(EngineEvent::Disconnected("NAVIGATION".to_string()))
            .await;

        // The handle outlives the disconnect event, so it still gets torn down
        manager.reconnect().await.unwrap();
        assert_eq!(engine.destroy_calls.load(Ordering::SeqCst), 1);

        wait_for_state(&manager, SessionState::Initializing).await;
        assert_eq!(engine.initialize_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_without_session_skips_destroy() {
        let engine = Arc::new(MockEngine::default());
        let manager = manager_with(Arc::clone(&engine));

        manager.reconnect().await.unwrap();
        assert_eq!(engine.destroy_calls.load(Ordering::SeqCst), 0);

        wait_for_state(&manager, SessionState::Initializing).await;
    }

    #[tokio::test]
    async fn test_reconnect_surfaces_teardown_error() {
        let engine = Arc::new(MockEngine {
            fail_destroy: true,
            ..MockEngine::default()
        });
        let manager = manager_with(Arc::clone(&engine));
        manager.apply_event(EngineEvent::Ready).await;

        let result = manager.reconnect().await;
        assert!(matches!(result, Err(Error::Upstream(_))));
    }

    #[tokio::test]
    async fn test_logout_when_ready() {
        let engine = Arc::new(MockEngine::default());
        let manager = manager_with(Arc::clone(&engine));
        manager.apply_event(EngineEvent::Ready).await;

        manager.logout().await.unwrap();
        assert_eq!(engine.logout_calls.load(Ordering::SeqCst), 1);
        assert_eq!(manager.state().await, SessionState::Disconnected);
    }

    #[tokio::test]
    async fn test_logout_when_not_ready_is_noop() {
        let engine = Arc::new(MockEngine::default());
        let manager = manager_with(Arc::clone(&engine));

        manager.logout().await.unwrap();
        assert_eq!(engine.logout_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_initialize_failure_resets_state() {
        struct FailingEngine;

        #[async_trait]
        impl MessengerEngine for FailingEngine {
            async fn initialize(&self) -> Result<()> {
                Err(Error::Upstream("sidecar down".to_string()))
            }
            async fn is_registered(&self, _a: &str) -> Result<bool> {
                unreachable!()
            }
            async fn send_message(&self, _a: &str, _b: &str) -> Result<SentMessage> {
                unreachable!()
            }
            async fn get_chats(&self) -> Result<Vec<Chat>> {
                unreachable!()
            }
            async fn self_info(&self) -> Result<SelfInfo> {
                unreachable!()
            }
            async fn logout(&self) -> Result<()> {
                unreachable!()
            }
            async fn destroy(&self) -> Result<()> {
                unreachable!()
            }
            async fn poll_events(&self) -> Result<Vec<EngineEvent>> {
                Ok(Vec::new())
            }
        }

        let manager = SessionManager::new(Arc::new(FailingEngine), &Config::for_test());
        assert!(manager.initialize().await.is_err());
        assert_eq!(manager.state().await, SessionState::Disconnected);
    }

    #[tokio::test]
    async fn test_event_pump_paces_empty_batches() {
        let engine = Arc::new(MockEngine::default());
        let manager = manager_with(Arc::clone(&engine));

        // The mock answers empty batches instantly; the pump must not spin
        let pump = spawn_event_pump(Arc::clone(&manager));
        tokio::time::sleep(Duration::from_millis(100)).await;
        pump.abort();

        let polls = engine.poll_calls.load(Ordering::SeqCst);
        assert!(polls >= 1 && polls <= 3, "pump polled {} times", polls);
    }

    #[test]
    fn test_connection_label() {
        assert_eq!(SessionState::Ready.connection_label(), "connected");
        assert_eq!(SessionState::Initializing.connection_label(), "disconnected");
        assert_eq!(
            SessionState::AwaitingAuthentication.connection_label(),
            "disconnected"
        );
        assert_eq!(SessionState::Disconnected.connection_label(), "disconnected");
    }

    #[test]
    fn test_state_display() {
        assert_eq!(SessionState::Ready.to_string(), "ready");
        assert_eq!(
            SessionState::AwaitingAuthentication.to_string(),
            "awaiting_authentication"
        );
    }
}
