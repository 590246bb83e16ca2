//! Session table: one isolated conversation context per session id.
//!
//! The table itself sits behind a std `Mutex` that is only held long enough
//! to look up a handle. Each context has its own async mutex, held for the
//! whole turn, so turns within a session are serialized while independent
//! sessions proceed concurrently.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use parley_core::config::ContextConfig;
use parley_core::{ParleyConfig, ResolvedCommand, Timestamp};
use tracing::{debug, info};
use uuid::Uuid;

use crate::context::{ConversationContext, ConversationSummary};
use crate::error::DialogError;
use crate::resolver::IntentResolver;
use crate::snapshot::{import_or_reset, ContextSnapshot};

type SessionHandle = Arc<tokio::sync::Mutex<ConversationContext>>;

pub struct SessionManager {
    resolver: IntentResolver,
    sessions: Mutex<HashMap<Uuid, SessionHandle>>,
}

impl SessionManager {
    pub fn new(config: &ParleyConfig) -> Self {
        Self::with_resolver(IntentResolver::new(config))
    }

    pub fn with_resolver(resolver: IntentResolver) -> Self {
        Self {
            resolver,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn resolver(&self) -> &IntentResolver {
        &self.resolver
    }

    fn context_config(&self) -> &ContextConfig {
        self.resolver.context_config()
    }

    fn table(&self) -> Result<std::sync::MutexGuard<'_, HashMap<Uuid, SessionHandle>>, DialogError> {
        self.sessions.lock().map_err(|_| DialogError::LockPoisoned)
    }

    fn handle(&self, session_id: Uuid) -> Result<SessionHandle, DialogError> {
        self.table()?
            .get(&session_id)
            .cloned()
            .ok_or(DialogError::SessionNotFound(session_id))
    }

    /// Start a session with an empty context.
    pub fn create_session(&self) -> Result<Uuid, DialogError> {
        self.create_session_at(Timestamp::now())
    }

    pub fn create_session_at(&self, now: Timestamp) -> Result<Uuid, DialogError> {
        let session_id = Uuid::new_v4();
        let ctx = ConversationContext::new(session_id, self.context_config(), now);
        self.table()?
            .insert(session_id, Arc::new(tokio::sync::Mutex::new(ctx)));
        info!(session_id = %session_id, "Session created");
        Ok(session_id)
    }

    pub fn session_count(&self) -> Result<usize, DialogError> {
        Ok(self.table()?.len())
    }

    /// Resolve an utterance within a session at the current time.
    pub async fn resolve(&self, session_id: Uuid, text: &str) -> Result<ResolvedCommand, DialogError> {
        self.resolve_at(session_id, text, Timestamp::now()).await
    }

    /// Resolve an utterance as if received at `now`. A context idle past the
    /// session timeout is replaced by a fresh one first.
    pub async fn resolve_at(
        &self,
        session_id: Uuid,
        text: &str,
        now: Timestamp,
    ) -> Result<ResolvedCommand, DialogError> {
        let handle = self.handle(session_id)?;
        let mut ctx = handle.lock().await;
        let timeout = self.context_config().session_timeout_minutes;
        if ctx.is_expired(now, timeout) {
            info!(session_id = %session_id, "Session idle past timeout, starting fresh context");
            *ctx = ConversationContext::new(session_id, self.context_config(), now);
        }
        Ok(self.resolver.resolve_at(&mut ctx, text, now).await)
    }

    /// Drop a session. Returns whether it existed.
    pub fn end_session(&self, session_id: Uuid) -> Result<bool, DialogError> {
        let removed = self.table()?.remove(&session_id).is_some();
        if removed {
            info!(session_id = %session_id, "Session ended");
        }
        Ok(removed)
    }

    /// Drop every session idle past the timeout. Sessions mid-turn are
    /// skipped. Returns how many were removed.
    pub fn purge_expired_at(&self, now: Timestamp) -> Result<usize, DialogError> {
        let timeout = self.context_config().session_timeout_minutes;
        let mut table = self.table()?;
        let before = table.len();
        table.retain(|_, handle| match handle.try_lock() {
            Ok(ctx) => !ctx.is_expired(now, timeout),
            Err(_) => true,
        });
        let purged = before - table.len();
        if purged > 0 {
            info!(purged, remaining = table.len(), "Expired sessions purged");
        }
        Ok(purged)
    }

    pub fn purge_expired(&self) -> Result<usize, DialogError> {
        self.purge_expired_at(Timestamp::now())
    }

    /// Serialize a session's committed context.
    pub async fn export(&self, session_id: Uuid) -> Result<String, DialogError> {
        let handle = self.handle(session_id)?;
        let ctx = handle.lock().await;
        let json = ContextSnapshot::capture(&ctx).to_json()?;
        debug!(session_id = %session_id, bytes = json.len(), "Context exported");
        Ok(json)
    }

    /// Load a snapshot into a session. A bad snapshot resets the session to
    /// a fresh context and returns `Ok(false)`.
    pub async fn import(&self, session_id: Uuid, json: &str) -> Result<bool, DialogError> {
        let handle = self.handle(session_id)?;
        let mut ctx = handle.lock().await;
        Ok(import_or_reset(&mut ctx, json, self.context_config(), Timestamp::now()))
    }

    pub async fn summary(&self, session_id: Uuid) -> Result<ConversationSummary, DialogError> {
        let handle = self.handle(session_id)?;
        let ctx = handle.lock().await;
        Ok(ctx.summary(Timestamp::now()))
    }

    pub async fn clear_context(&self, session_id: Uuid) -> Result<(), DialogError> {
        let handle = self.handle(session_id)?;
        handle.lock().await.clear_context();
        Ok(())
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new(&ParleyConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::Intent;

    #[tokio::test]
    async fn test_unknown_session() {
        let manager = SessionManager::default();
        let err = manager.resolve(Uuid::new_v4(), "hello").await.unwrap_err();
        assert!(matches!(err, DialogError::SessionNotFound(_)));
    }

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        let manager = SessionManager::default();
        let a = manager.create_session_at(Timestamp(0)).unwrap();
        let b = manager.create_session_at(Timestamp(0)).unwrap();
        assert_eq!(manager.session_count().unwrap(), 2);

        manager
            .resolve_at(a, "What's the weather in Seattle?", Timestamp(1))
            .await
            .unwrap();
        let other = manager
            .resolve_at(b, "What about tomorrow?", Timestamp(2))
            .await
            .unwrap();
        assert!(other.clarification_needed);
        assert!(other.param("location").is_none());
    }

    #[tokio::test]
    async fn test_idle_session_starts_fresh() {
        let manager = SessionManager::default();
        let id = manager.create_session_at(Timestamp(0)).unwrap();
        manager
            .resolve_at(id, "What's the weather in Seattle?", Timestamp(0))
            .await
            .unwrap();
        manager
            .resolve_at(id, "Set a timer for 5 minutes", Timestamp(31 * 60))
            .await
            .unwrap();
        let handle = manager.handle(id).unwrap();
        let ctx = handle.lock().await;
        assert_eq!(ctx.history().len(), 1);
        assert_eq!(ctx.last_intent(), Some(Intent::Timer));
        assert!(ctx.variable("last_location").is_none());
    }

    #[tokio::test]
    async fn test_purge_expired_and_end() {
        let manager = SessionManager::default();
        let old = manager.create_session_at(Timestamp(0)).unwrap();
        let recent = manager.create_session_at(Timestamp(1_500)).unwrap();

        assert_eq!(manager.purge_expired_at(Timestamp(1_900)).unwrap(), 1);
        assert!(manager.handle(old).is_err());
        assert!(manager.end_session(recent).unwrap());
        assert!(!manager.end_session(recent).unwrap());
        assert_eq!(manager.session_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_clear_context() {
        let manager = SessionManager::default();
        let id = manager.create_session().unwrap();
        manager.resolve(id, "Play some jazz").await.unwrap();
        manager.clear_context(id).await.unwrap();
        let summary = manager.summary(id).await.unwrap();
        assert_eq!(summary.total_turns, 1);
        assert!(summary.context_variables.is_empty());
    }
}
