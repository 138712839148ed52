use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use log::info;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use crate::session::{Session, SessionError};
use crate::sink::Sink;

/// The set of live subscriber sessions, and the broadcaster over them.
///
/// Cheap to clone; clones share the same set.
#[derive(Clone)]
pub struct Registry {
    sessions: Arc<RwLock<Vec<Session>>>,
    shutdown: CancellationToken,
    send_timeout: Option<Duration>,
    next_id: Arc<AtomicU64>,
}

impl Registry {
    /// Create a registry. `send_timeout` bounds how long a broadcast waits
    /// on a single session before that session is dropped as stalled.
    pub fn new(send_timeout: Option<Duration>) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(Vec::new())),
            shutdown: CancellationToken::new(),
            send_timeout,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Open a session on `sink` and register it until it terminates.
    pub async fn new_session<S: Sink>(&self, sink: S) -> Result<Session, SessionError> {
        let mut sessions = self.sessions.write().await;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (session, dispatch) = Session::create(id, sink, &self.shutdown, self.send_timeout)?;
        sessions.push(session.clone());

        let registry = self.clone();
        let gone = session.clone();
        dispatch.spawn(async move { registry.remove(&gone).await });

        info!("session {} opened, count {}", session.id(), sessions.len());
        Ok(session)
    }

    async fn remove(&self, session: &Session) {
        let mut sessions = self.sessions.write().await;
        if let Some(pos) = sessions.iter().position(|s| s.same_as(session)) {
            sessions.remove(pos);
            info!("session {} closed, count {}", session.id(), sessions.len());
        }
    }

    /// Hand `payload` to every active session, one after the other.
    ///
    /// Each hand-off waits for that session's dispatch task, so a slow
    /// client delays the sessions after it. Session failures are not
    /// reported here; a failed session just drops out of the set.
    pub async fn broadcast(&self, payload: impl Into<Arc<[u8]>>) {
        let payload = payload.into();
        let sessions = self.sessions.read().await;
        for session in sessions.iter() {
            session.send(Arc::clone(&payload)).await;
        }
    }

    /// Number of registered sessions.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Cancel every session, present and future.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(None)
    }
}
