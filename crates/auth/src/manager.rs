//! The three-step token ladder.

use crate::{AuthError, FileTokenStore, Token};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Broker-side auth operations the ladder depends on.
///
/// The probe maps to a lightweight profile call; refresh runs the broker's
/// refresh flow, which may require an interactive PIN and then fails with
/// [`AuthError::InteractiveRequired`].
#[async_trait]
pub trait AuthFlow: Send + Sync {
    /// Validate the access token against the broker.
    async fn probe(&self, access_token: &str) -> Result<(), AuthError>;

    /// Exchange refresh material for a fresh token.
    async fn refresh(&self, refresh_token: &str) -> Result<Token, AuthError>;
}

/// Outcome of the ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenStatus {
    /// Token is valid and recently probed.
    Valid,
    /// Operator must complete an interactive login.
    NeedsInteractive,
}

/// Manager configuration.
#[derive(Debug, Clone)]
pub struct TokenManagerConfig {
    /// Local-expiry safety skew (ms).
    pub expiry_skew_ms: i64,
    /// How recent the last successful probe must be (ms).
    pub probe_window_ms: i64,
}

impl Default for TokenManagerConfig {
    fn default() -> Self {
        Self {
            expiry_skew_ms: 5 * 60 * 1_000,
            probe_window_ms: 15 * 60 * 1_000,
        }
    }
}

struct ManagerState {
    token: Option<Token>,
    last_probe_ms: Option<i64>,
}

/// Process-global token manager.
///
/// Refresh is serialized behind a mutex: concurrent callers that observe an
/// auth failure cooperate on one refresh and then resume.
pub struct TokenManager {
    store: FileTokenStore,
    flow: Arc<dyn AuthFlow>,
    config: TokenManagerConfig,
    state: Mutex<ManagerState>,
}

impl TokenManager {
    /// Create a manager over the given store and flow.
    pub fn new(store: FileTokenStore, flow: Arc<dyn AuthFlow>, config: TokenManagerConfig) -> Self {
        Self {
            store,
            flow,
            config,
            state: Mutex::new(ManagerState {
                token: None,
                last_probe_ms: None,
            }),
        }
    }

    /// Run the ladder: load saved material, probe, refresh if needed,
    /// otherwise surface the interactive requirement.
    pub async fn ensure_valid(&self, now_ms: i64) -> Result<TokenStatus, AuthError> {
        let mut state = self.state.lock().await;

        if state.token.is_none() {
            match self.store.load() {
                Ok((token, last_probe_ms)) => {
                    state.token = Some(token);
                    state.last_probe_ms = last_probe_ms;
                }
                Err(AuthError::NoToken) => return Ok(TokenStatus::NeedsInteractive),
                Err(e) => return Err(e),
            }
        }

        // Step 1: saved token with a recent successful probe.
        let token = state.token.as_ref().cloned().ok_or(AuthError::NoToken)?;
        let locally_ok = !token.is_expired(now_ms, self.config.expiry_skew_ms);
        let probe_recent = state
            .last_probe_ms
            .is_some_and(|t| now_ms - t <= self.config.probe_window_ms);

        if locally_ok {
            if probe_recent {
                return Ok(TokenStatus::Valid);
            }
            match self.flow.probe(token.expose_access()).await {
                Ok(()) => {
                    state.last_probe_ms = Some(now_ms);
                    self.store.save(&token, Some(now_ms))?;
                    return Ok(TokenStatus::Valid);
                }
                Err(e) => {
                    warn!(error = %e, "profile probe failed, attempting refresh");
                }
            }
        }

        // Step 2: refresh when material is available.
        if let Some(refresh_token) = token.expose_refresh() {
            match self.flow.refresh(refresh_token).await {
                Ok(fresh) => {
                    self.flow.probe(fresh.expose_access()).await.map_err(|e| {
                        AuthError::RefreshFailed(format!("refreshed token failed probe: {e}"))
                    })?;
                    self.store.save(&fresh, Some(now_ms))?;
                    info!("token refreshed");
                    state.token = Some(fresh);
                    state.last_probe_ms = Some(now_ms);
                    return Ok(TokenStatus::Valid);
                }
                Err(AuthError::InteractiveRequired) => {
                    return Ok(TokenStatus::NeedsInteractive)
                }
                Err(e) => {
                    warn!(error = %e, "token refresh failed");
                }
            }
        }

        // Step 3: out of automated options.
        Ok(TokenStatus::NeedsInteractive)
    }

    /// Quick gate used by the scheduler: valid without side effects.
    pub async fn is_valid(&self, now_ms: i64) -> bool {
        let state = self.state.lock().await;
        let Some(token) = state.token.as_ref() else {
            return false;
        };
        !token.is_expired(now_ms, self.config.expiry_skew_ms)
            && state
                .last_probe_ms
                .is_some_and(|t| now_ms - t <= self.config.probe_window_ms)
    }

    /// Current access token for request headers, if one is loaded.
    pub async fn access_token(&self) -> Option<String> {
        let state = self.state.lock().await;
        state
            .token
            .as_ref()
            .map(|t| t.expose_access().to_string())
    }

    /// Install a token obtained through an interactive login.
    pub async fn install(&self, token: Token, now_ms: i64) -> Result<(), AuthError> {
        self.flow.probe(token.expose_access()).await?;
        self.store.save(&token, Some(now_ms))?;
        let mut state = self.state.lock().await;
        state.token = Some(token);
        state.last_probe_ms = Some(now_ms);
        Ok(())
    }

    /// React to an `AUTH_EXPIRED` from the broker: drop probe recency and
    /// re-run the ladder.
    pub async fn recover(&self, now_ms: i64) -> Result<TokenStatus, AuthError> {
        {
            let mut state = self.state.lock().await;
            state.last_probe_ms = None;
        }
        self.ensure_valid(now_ms).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    struct MockFlow {
        probe_ok: AtomicBool,
        refresh_ok: AtomicBool,
        interactive: AtomicBool,
        probes: AtomicU32,
        refreshes: AtomicU32,
    }

    impl MockFlow {
        fn new(probe_ok: bool, refresh_ok: bool) -> Arc<Self> {
            Arc::new(Self {
                probe_ok: AtomicBool::new(probe_ok),
                refresh_ok: AtomicBool::new(refresh_ok),
                interactive: AtomicBool::new(false),
                probes: AtomicU32::new(0),
                refreshes: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl AuthFlow for MockFlow {
        async fn probe(&self, _access_token: &str) -> Result<(), AuthError> {
            self.probes.fetch_add(1, Ordering::SeqCst);
            if self.probe_ok.load(Ordering::SeqCst) {
                Ok(())
            } else {
                Err(AuthError::ProbeFailed("401".into()))
            }
        }

        async fn refresh(&self, _refresh_token: &str) -> Result<Token, AuthError> {
            self.refreshes.fetch_add(1, Ordering::SeqCst);
            if self.interactive.load(Ordering::SeqCst) {
                return Err(AuthError::InteractiveRequired);
            }
            if self.refresh_ok.load(Ordering::SeqCst) {
                // A successful refresh fixes the probe too.
                self.probe_ok.store(true, Ordering::SeqCst);
                Ok(Token::new("fresh", Some("refresh".into()), 0, i64::MAX, "APP", None))
            } else {
                Err(AuthError::RefreshFailed("denied".into()))
            }
        }
    }

    fn manager_with(
        flow: Arc<MockFlow>,
        token: Option<(Token, Option<i64>)>,
    ) -> (TokenManager, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::new(dir.path().join("token.json"));
        if let Some((token, probe)) = token {
            store.save(&token, probe).unwrap();
        }
        (
            TokenManager::new(store, flow, TokenManagerConfig::default()),
            dir,
        )
    }

    fn live_token() -> Token {
        Token::new("live", Some("refresh".into()), 0, i64::MAX, "APP", None)
    }

    #[tokio::test]
    async fn test_valid_token_with_recent_probe_skips_network() {
        let flow = MockFlow::new(true, true);
        let now = 1_000_000;
        let (manager, _dir) = manager_with(flow.clone(), Some((live_token(), Some(now - 1_000))));

        let status = manager.ensure_valid(now).await.unwrap();
        assert_eq!(status, TokenStatus::Valid);
        assert_eq!(flow.probes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_stale_probe_triggers_reprobe() {
        let flow = MockFlow::new(true, true);
        let now = 100_000_000;
        let (manager, _dir) = manager_with(flow.clone(), Some((live_token(), Some(0))));

        let status = manager.ensure_valid(now).await.unwrap();
        assert_eq!(status, TokenStatus::Valid);
        assert_eq!(flow.probes.load(Ordering::SeqCst), 1);
        assert!(manager.is_valid(now).await);
    }

    #[tokio::test]
    async fn test_failed_probe_falls_through_to_refresh() {
        let flow = MockFlow::new(false, true);
        let now = 100_000_000;
        let (manager, _dir) = manager_with(flow.clone(), Some((live_token(), None)));

        let status = manager.ensure_valid(now).await.unwrap();
        assert_eq!(status, TokenStatus::Valid);
        assert_eq!(flow.refreshes.load(Ordering::SeqCst), 1);
        assert_eq!(manager.access_token().await.as_deref(), Some("fresh"));
    }

    #[tokio::test]
    async fn test_interactive_required_surfaces() {
        let flow = MockFlow::new(false, false);
        flow.interactive.store(true, Ordering::SeqCst);
        let (manager, _dir) = manager_with(flow, Some((live_token(), None)));

        let status = manager.ensure_valid(1_000).await.unwrap();
        assert_eq!(status, TokenStatus::NeedsInteractive);
    }

    #[tokio::test]
    async fn test_no_saved_token_needs_interactive() {
        let flow = MockFlow::new(true, true);
        let (manager, _dir) = manager_with(flow, None);
        let status = manager.ensure_valid(0).await.unwrap();
        assert_eq!(status, TokenStatus::NeedsInteractive);
    }

    #[tokio::test]
    async fn test_recover_forces_reprobe() {
        let flow = MockFlow::new(true, true);
        let now = 1_000_000;
        let (manager, _dir) = manager_with(flow.clone(), Some((live_token(), Some(now))));

        assert_eq!(manager.ensure_valid(now).await.unwrap(), TokenStatus::Valid);
        assert_eq!(flow.probes.load(Ordering::SeqCst), 0);

        // Broker said AUTH_EXPIRED: recency is dropped, probe must rerun.
        assert_eq!(manager.recover(now).await.unwrap(), TokenStatus::Valid);
        assert_eq!(flow.probes.load(Ordering::SeqCst), 1);
    }
}
