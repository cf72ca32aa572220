// service/directory_service.rs
use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;
use tokio::time::{interval, Duration};
use uuid::Uuid;

use crate::dtos::chatdtos::SessionQuery;
use crate::feed::{next_event, ChangeFeed, FeedEvent};
use crate::models::agentmodel::AgentProfile;
use crate::models::chatmodels::{ChatSession, SessionStatus};
use crate::remote::supportapi::SupportApi;
use crate::service::error::ServiceError;
use crate::utils::optimistic::Rollback;

/// Agent-facing working set of non-terminal support sessions. The cache is
/// owned here and mutated only through the documented operations; the
/// change feed is the primary freshness mechanism and the interval refetch
/// is the fallback.
pub struct SessionDirectory {
    remote: Arc<dyn SupportApi>,
    feed: Arc<ChangeFeed>,
    agent: AgentProfile,
    refresh_every: Duration,
    cache: RwLock<HashMap<Uuid, ChatSession>>,
}

impl SessionDirectory {
    pub fn new(
        remote: Arc<dyn SupportApi>,
        feed: Arc<ChangeFeed>,
        agent: AgentProfile,
        refresh_every: Duration,
    ) -> Self {
        Self {
            remote,
            feed,
            agent,
            refresh_every,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn agent(&self) -> &AgentProfile {
        &self.agent
    }

    /// Refetch the open-session set and replace the cache. A failed fetch
    /// leaves the stale-but-consistent cache in place.
    pub async fn refresh(&self) {
        match self.remote.fetch_open_sessions().await {
            Ok(sessions) => {
                let fresh: HashMap<Uuid, ChatSession> = sessions
                    .into_iter()
                    .filter(|s| !s.status.is_terminal())
                    .map(|s| (s.id, s))
                    .collect();
                *self.cache.write().await = fresh;
            }
            Err(e) => {
                tracing::warn!("Session refresh failed, keeping cached list: {}", e);
            }
        }
    }

    /// Filtered, ordered view of the working set: priority descending,
    /// ties by most recent activity, recomputed in full on every call.
    pub async fn list_sessions(&self, query: &SessionQuery) -> Vec<ChatSession> {
        let term = query.search.as_deref().unwrap_or("");

        let cache = self.cache.read().await;
        let mut sessions: Vec<ChatSession> = cache
            .values()
            .filter(|s| s.matches_search(term))
            .cloned()
            .collect();
        drop(cache);

        sessions.sort_by(|a, b| {
            b.priority
                .rank()
                .cmp(&a.priority.rank())
                .then(b.last_activity_at.cmp(&a.last_activity_at))
                .then(a.id.cmp(&b.id))
        });
        sessions
    }

    pub async fn get(&self, session_id: Uuid) -> Option<ChatSession> {
        self.cache.read().await.get(&session_id).cloned()
    }

    pub async fn waiting_count(&self) -> usize {
        self.cache
            .read()
            .await
            .values()
            .filter(|s| s.status == SessionStatus::Waiting)
            .count()
    }

    /// Claim a waiting session for the current agent. The cache flips to
    /// `active` immediately; a failed remote claim restores the exact
    /// prior state and surfaces the error.
    pub async fn assign(&self, session_id: Uuid) -> Result<(), ServiceError> {
        let snapshot = {
            let mut cache = self.cache.write().await;
            let session = cache
                .get(&session_id)
                .ok_or(ServiceError::SessionNotFound(session_id))?;

            if session.status == SessionStatus::Active {
                match session.assigned_agent {
                    Some(agent_id) if agent_id == self.agent.id => return Ok(()),
                    Some(agent_id) => {
                        return Err(ServiceError::AlreadyAssigned {
                            session_id,
                            agent_id,
                        })
                    }
                    None => {}
                }
            }
            if !session.status.can_transition_to(SessionStatus::Active) {
                return Err(ServiceError::InvalidTransition {
                    from: session.status,
                    to: SessionStatus::Active,
                });
            }

            let snapshot = Rollback::capture(&*cache);
            if let Some(session) = cache.get_mut(&session_id) {
                session.status = SessionStatus::Active;
                session.assigned_agent = Some(self.agent.id);
                session.last_activity_at = Utc::now();
            }
            snapshot
        };

        match self.remote.assign_session(session_id, self.agent.id).await {
            Ok(_) => {
                snapshot.commit();
                // Revalidate so server-stamped fields replace the guesses
                self.refresh().await;
                Ok(())
            }
            Err(e) => {
                tracing::warn!("Assign of session {} failed: {}", session_id, e);
                snapshot.restore(&mut *self.cache.write().await);
                Err(e.into())
            }
        }
    }

    /// Resolve a session and drop it from the working set. Only an active
    /// session can be resolved; closing a session that is unknown or
    /// already resolved is a no-op.
    pub async fn close(&self, session_id: Uuid) -> Result<(), ServiceError> {
        let snapshot = {
            let mut cache = self.cache.write().await;
            let session = match cache.get(&session_id) {
                Some(session) => session,
                None => return Ok(()),
            };

            if !session.status.can_transition_to(SessionStatus::Resolved) {
                return Err(ServiceError::InvalidTransition {
                    from: session.status,
                    to: SessionStatus::Resolved,
                });
            }

            let snapshot = Rollback::capture(&*cache);
            cache.remove(&session_id);
            snapshot
        };

        match self.remote.close_session(session_id).await {
            Ok(_) => {
                snapshot.commit();
                Ok(())
            }
            Err(e) => {
                tracing::warn!("Close of session {} failed: {}", session_id, e);
                snapshot.restore(&mut *self.cache.write().await);
                Err(e.into())
            }
        }
    }

    /// Bump a session's activity clock after a local optimistic send.
    pub(crate) async fn touch_activity(&self, session_id: Uuid) {
        if let Some(session) = self.cache.write().await.get_mut(&session_id) {
            session.last_activity_at = Utc::now();
        }
    }

    /// Poll/feed loop. Any change on the session collection invalidates
    /// the cache immediately; the interval tick is the safety net when the
    /// feed goes quiet or away.
    pub async fn run_forever(self: Arc<Self>, shutdown: impl std::future::Future<Output = ()>) {
        let mut rx = Some(self.feed.subscribe());
        let mut tick = interval(self.refresh_every);
        let mut shutdown = Box::pin(shutdown);

        self.refresh().await;

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("SessionDirectory: shutdown requested, exiting loop");
                    break;
                }
                _ = tick.tick() => {
                    self.refresh().await;
                }
                event = next_event(&mut rx) => {
                    if matches!(event, Some(FeedEvent::Session { .. }) | None) {
                        self.refresh().await;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::chatmodels::SessionPriority;
    use crate::remote::memorydb::MemoryBackend;
    use crate::remote::supportapi::{NewMessage, RemoteError};
    use async_trait::async_trait;
    use tokio::sync::Notify;

    fn agent() -> AgentProfile {
        AgentProfile::new(Uuid::new_v4(), "Chi Nwosu")
    }

    fn directory(backend: &Arc<MemoryBackend>, feed: &Arc<ChangeFeed>) -> Arc<SessionDirectory> {
        Arc::new(SessionDirectory::new(
            backend.clone(),
            feed.clone(),
            agent(),
            Duration::from_secs(10),
        ))
    }

    #[tokio::test]
    async fn assign_flips_session_before_remote_confirms() {
        // The remote claim is gated open only after the cache has
        // already been checked.
        let feed = Arc::new(ChangeFeed::new(64));
        let backend = Arc::new(MemoryBackend::new(feed.clone()));
        let session =
            backend.create_waiting_session("Ada Obi", SessionPriority::Medium, Some("Deposit"));

        let gate = Arc::new(Notify::new());
        let gated = Arc::new(GatedApi {
            inner: backend.clone(),
            gate: gate.clone(),
        });
        let dir = Arc::new(SessionDirectory::new(
            gated,
            feed.clone(),
            agent(),
            Duration::from_secs(10),
        ));
        dir.refresh().await;

        let assign = tokio::spawn({
            let dir = dir.clone();
            async move { dir.assign(session.id).await }
        });

        // The remote call is still parked on the gate here.
        tokio::time::sleep(Duration::from_millis(20)).await;
        let cached = dir.get(session.id).await.unwrap();
        assert_eq!(cached.status, SessionStatus::Active);
        assert_eq!(cached.assigned_agent, Some(dir.agent().id));

        gate.notify_one();
        assign.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn failed_assign_rolls_back_exactly() {
        let feed = Arc::new(ChangeFeed::new(64));
        let backend = Arc::new(MemoryBackend::new(feed.clone()));
        let session =
            backend.create_waiting_session("Ada Obi", SessionPriority::High, Some("Deposit"));
        let dir = directory(&backend, &feed);
        dir.refresh().await;

        let before = dir.list_sessions(&SessionQuery::default()).await;
        backend.set_fail_writes(true);

        let err = dir.assign(session.id).await.unwrap_err();
        assert!(matches!(err, ServiceError::Remote(_)));
        assert_eq!(dir.list_sessions(&SessionQuery::default()).await, before);
    }

    #[tokio::test]
    async fn failed_close_rolls_back_exactly() {
        let feed = Arc::new(ChangeFeed::new(64));
        let backend = Arc::new(MemoryBackend::new(feed.clone()));
        let session = backend.create_waiting_session("Bola", SessionPriority::Low, None);
        let dir = directory(&backend, &feed);
        dir.refresh().await;
        dir.assign(session.id).await.unwrap();

        let before = dir.list_sessions(&SessionQuery::default()).await;
        backend.set_fail_writes(true);

        let err = dir.close(session.id).await.unwrap_err();
        assert!(matches!(err, ServiceError::Remote(_)));
        assert_eq!(dir.list_sessions(&SessionQuery::default()).await, before);
    }

    #[tokio::test]
    async fn close_removes_session_and_is_idempotent() {
        let feed = Arc::new(ChangeFeed::new(64));
        let backend = Arc::new(MemoryBackend::new(feed.clone()));
        let session = backend.create_waiting_session("Bola", SessionPriority::Medium, None);
        let dir = directory(&backend, &feed);
        dir.refresh().await;
        dir.assign(session.id).await.unwrap();

        dir.close(session.id).await.unwrap();
        assert!(dir.get(session.id).await.is_none());

        // Second close finds nothing to do and raises nothing.
        dir.close(session.id).await.unwrap();
        assert!(dir.get(session.id).await.is_none());
    }

    #[tokio::test]
    async fn close_on_unclaimed_session_is_rejected() {
        let feed = Arc::new(ChangeFeed::new(64));
        let backend = Arc::new(MemoryBackend::new(feed.clone()));
        let session = backend.create_waiting_session("Bola", SessionPriority::Medium, None);
        let dir = directory(&backend, &feed);
        dir.refresh().await;

        let err = dir.close(session.id).await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::InvalidTransition {
                from: SessionStatus::Waiting,
                to: SessionStatus::Resolved,
            }
        ));
        // The session stays in the working set untouched.
        assert_eq!(
            dir.get(session.id).await.unwrap().status,
            SessionStatus::Waiting
        );
    }

    #[tokio::test]
    async fn search_filters_to_matching_sessions() {
        // One match among five.
        let feed = Arc::new(ChangeFeed::new(64));
        let backend = Arc::new(MemoryBackend::new(feed.clone()));
        backend.create_waiting_session("urgent-cust", SessionPriority::Urgent, None);
        for name in ["Ada", "Bola", "Chidi", "Dayo"] {
            backend.create_waiting_session(name, SessionPriority::Medium, None);
        }
        let dir = directory(&backend, &feed);
        dir.refresh().await;

        let hits = dir
            .list_sessions(&SessionQuery {
                search: Some("urgent-cust".into()),
            })
            .await;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].customer_name, "urgent-cust");
    }

    #[tokio::test]
    async fn listing_orders_by_priority_then_activity() {
        let feed = Arc::new(ChangeFeed::new(64));
        let backend = Arc::new(MemoryBackend::new(feed.clone()));
        backend.create_waiting_session("low", SessionPriority::Low, None);
        let older_urgent = backend.create_waiting_session("urgent-1", SessionPriority::Urgent, None);
        tokio::time::sleep(Duration::from_millis(5)).await;
        let newer_urgent = backend.create_waiting_session("urgent-2", SessionPriority::Urgent, None);
        backend.create_waiting_session("high", SessionPriority::High, None);

        let dir = directory(&backend, &feed);
        dir.refresh().await;

        let listed = dir.list_sessions(&SessionQuery::default()).await;
        let names: Vec<&str> = listed.iter().map(|s| s.customer_name.as_str()).collect();
        assert_eq!(names, vec!["urgent-2", "urgent-1", "high", "low"]);
        assert_eq!(listed[0].id, newer_urgent.id);
        assert_eq!(listed[1].id, older_urgent.id);
    }

    #[tokio::test]
    async fn feed_event_refreshes_the_working_set() {
        let feed = Arc::new(ChangeFeed::new(64));
        let backend = Arc::new(MemoryBackend::new(feed.clone()));
        let dir = Arc::new(SessionDirectory::new(
            backend.clone(),
            feed.clone(),
            agent(),
            Duration::from_millis(200),
        ));

        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let loop_handle = tokio::spawn(dir.clone().run_forever(async {
            let _ = stop_rx.await;
        }));

        // Let the loop subscribe before the insert is published.
        tokio::time::sleep(Duration::from_millis(50)).await;
        let session = backend.create_waiting_session("Ada", SessionPriority::Medium, None);

        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        loop {
            if dir.get(session.id).await.is_some() {
                break;
            }
            assert!(tokio::time::Instant::now() < deadline, "session never appeared");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let _ = stop_tx.send(());
        loop_handle.await.unwrap();
    }

    #[tokio::test]
    async fn assign_on_foreign_active_session_errors() {
        let feed = Arc::new(ChangeFeed::new(64));
        let backend = Arc::new(MemoryBackend::new(feed.clone()));
        let session = backend.create_waiting_session("Ada", SessionPriority::Medium, None);
        let other_agent = Uuid::new_v4();
        backend.assign_session(session.id, other_agent).await.unwrap();

        let dir = directory(&backend, &feed);
        dir.refresh().await;

        let err = dir.assign(session.id).await.unwrap_err();
        assert!(matches!(err, ServiceError::AlreadyAssigned { agent_id, .. } if agent_id == other_agent));
    }

    /// Holds mutations on a gate so the optimistic window is observable.
    struct GatedApi {
        inner: Arc<MemoryBackend>,
        gate: Arc<Notify>,
    }

    #[async_trait]
    impl SupportApi for GatedApi {
        async fn fetch_open_sessions(&self) -> Result<Vec<ChatSession>, RemoteError> {
            self.inner.fetch_open_sessions().await
        }

        async fn fetch_messages(
            &self,
            session_id: Uuid,
        ) -> Result<Vec<crate::models::chatmodels::ChatMessage>, RemoteError> {
            self.inner.fetch_messages(session_id).await
        }

        async fn create_message(
            &self,
            draft: NewMessage,
        ) -> Result<crate::models::chatmodels::ChatMessage, RemoteError> {
            self.gate.notified().await;
            self.inner.create_message(draft).await
        }

        async fn assign_session(
            &self,
            session_id: Uuid,
            agent_id: Uuid,
        ) -> Result<ChatSession, RemoteError> {
            self.gate.notified().await;
            self.inner.assign_session(session_id, agent_id).await
        }

        async fn close_session(&self, session_id: Uuid) -> Result<ChatSession, RemoteError> {
            self.gate.notified().await;
            self.inner.close_session(session_id).await
        }

        async fn mark_messages_read(&self, message_ids: Vec<Uuid>) -> Result<(), RemoteError> {
            self.inner.mark_messages_read(message_ids).await
        }
    }
}
