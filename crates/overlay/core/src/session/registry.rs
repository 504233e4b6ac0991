//! Registry of live sessions keyed by peer and session id.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use libp2p::PeerId;
use parking_lot::RwLock;
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tracing::debug;

/// Process-unique session number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub peer: PeerId,
    pub id: SessionId,
}

/// Which path created the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum SessionSource {
    Bootstrap,
    Discovery,
    Inbound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum SessionState {
    Open,
    ReadClosed,
    WriteClosed,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Half {
    Read,
    Write,
}

#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub key: SessionKey,
    pub source: SessionSource,
    pub state: SessionState,
    pub age: Duration,
}

#[derive(Debug)]
struct Entry {
    source: SessionSource,
    state: SessionState,
    opened_at: Instant,
    tasks: Vec<AbortHandle>,
}

#[derive(Debug, Default)]
struct Inner {
    next_id: AtomicU64,
    sessions: RwLock<HashMap<SessionKey, Entry>>,
}

/// Shared handle to the set of live sessions.
///
/// An entry exists from registration until both of its halves have exited or it
/// is closed explicitly with [`close_peer`](Self::close_peer) or
/// [`close_all`](Self::close_all).
#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    inner: Arc<Inner>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn register(&self, peer: PeerId, source: SessionSource) -> SessionKey {
        let id = SessionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let key = SessionKey { peer, id };
        let len = {
            let mut sessions = self.inner.sessions.write();
            sessions.insert(
                key,
                Entry {
                    source,
                    state: SessionState::Open,
                    opened_at: Instant::now(),
                    tasks: Vec::new(),
                },
            );
            sessions.len()
        };
        metrics::counter!("overlay.sessions.opened_total", "source" => <&'static str>::from(source))
            .increment(1);
        metrics::gauge!("overlay.sessions.active").set(len as f64);
        key
    }

    /// Attach the task handles of a registered session. Handles of a session that
    /// was closed in the meantime are aborted right away.
    pub(crate) fn attach(&self, key: SessionKey, tasks: Vec<AbortHandle>) {
        let mut sessions = self.inner.sessions.write();
        match sessions.get_mut(&key) {
            Some(entry) => entry.tasks = tasks,
            None => {
                drop(sessions);
                tasks.iter().for_each(AbortHandle::abort);
            }
        }
    }

    pub(crate) fn half_closed(&self, key: SessionKey, half: Half) {
        let mut sessions = self.inner.sessions.write();
        let Some(entry) = sessions.get_mut(&key) else {
            return;
        };
        entry.state = match (entry.state, half) {
            (SessionState::Open, Half::Read) => SessionState::ReadClosed,
            (SessionState::Open, Half::Write) => SessionState::WriteClosed,
            (SessionState::ReadClosed, Half::Write) | (SessionState::WriteClosed, Half::Read) => {
                SessionState::Closed
            }
            (state, _) => state,
        };
        if entry.state == SessionState::Closed {
            sessions.remove(&key);
            debug!(peer = %key.peer, session = %key.id, "session closed");
        }
        metrics::gauge!("overlay.sessions.active").set(sessions.len() as f64);
    }

    /// Current state. Sessions that are no longer registered report `Closed`.
    pub fn state(&self, key: &SessionKey) -> SessionState {
        self.inner
            .sessions
            .read()
            .get(key)
            .map_or(SessionState::Closed, |e| e.state)
    }

    pub fn len(&self) -> usize {
        self.inner.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn count_for(&self, peer: &PeerId) -> usize {
        self.inner
            .sessions
            .read()
            .keys()
            .filter(|k| &k.peer == peer)
            .count()
    }

    pub fn sessions(&self) -> Vec<SessionInfo> {
        let now = Instant::now();
        let mut out: Vec<_> = self
            .inner
            .sessions
            .read()
            .iter()
            .map(|(key, entry)| SessionInfo {
                key: *key,
                source: entry.source,
                state: entry.state,
                age: now.saturating_duration_since(entry.opened_at),
            })
            .collect();
        out.sort_by_key(|info| info.key.id);
        out
    }

    /// Abort both halves of every session with `peer`. Returns how many were closed.
    pub fn close_peer(&self, peer: &PeerId) -> usize {
        self.close_where(|key| &key.peer == peer)
    }

    /// Abort every session.
    pub fn close_all(&self) -> usize {
        self.close_where(|_| true)
    }

    fn close_where(&self, mut pred: impl FnMut(&SessionKey) -> bool) -> usize {
        let closed: Vec<Entry> = {
            let mut sessions = self.inner.sessions.write();
            let keys: Vec<SessionKey> = sessions.keys().filter(|k| pred(k)).copied().collect();
            let closed = keys.iter().filter_map(|k| sessions.remove(k)).collect();
            metrics::gauge!("overlay.sessions.active").set(sessions.len() as f64);
            closed
        };
        for entry in &closed {
            entry.tasks.iter().for_each(AbortHandle::abort);
        }
        closed.len()
    }
}

/// Reports one half's exit to the registry when dropped, including on abort.
#[derive(Debug)]
pub(crate) struct HalfGuard {
    registry: SessionRegistry,
    key: SessionKey,
    half: Half,
}

impl HalfGuard {
    pub(crate) fn new(registry: SessionRegistry, key: SessionKey, half: Half) -> Self {
        Self {
            registry,
            key,
            half,
        }
    }
}

impl Drop for HalfGuard {
    fn drop(&mut self) {
        self.registry.half_closed(self.key, self.half);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_machine() {
        let registry = SessionRegistry::new();
        let peer = PeerId::random();
        let key = registry.register(peer, SessionSource::Inbound);

        assert_eq!(registry.state(&key), SessionState::Open);
        registry.half_closed(key, Half::Read);
        assert_eq!(registry.state(&key), SessionState::ReadClosed);
        registry.half_closed(key, Half::Read);
        assert_eq!(registry.state(&key), SessionState::ReadClosed);
        registry.half_closed(key, Half::Write);
        assert_eq!(registry.state(&key), SessionState::Closed);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_guard_reports_on_drop() {
        let registry = SessionRegistry::new();
        let key = registry.register(PeerId::random(), SessionSource::Discovery);

        drop(HalfGuard::new(registry.clone(), key, Half::Write));
        assert_eq!(registry.state(&key), SessionState::WriteClosed);
    }

    #[test]
    fn test_ids_are_unique_per_peer() {
        let registry = SessionRegistry::new();
        let peer = PeerId::random();
        let a = registry.register(peer, SessionSource::Bootstrap);
        let b = registry.register(peer, SessionSource::Inbound);

        assert_ne!(a, b);
        assert_eq!(registry.count_for(&peer), 2);
        assert_eq!(registry.count_for(&PeerId::random()), 0);

        let listed: Vec<_> = registry.sessions().into_iter().map(|s| s.key).collect();
        assert_eq!(listed, vec![a, b]);
    }

    #[test]
    fn test_close_peer_only_touches_that_peer() {
        let registry = SessionRegistry::new();
        let a = PeerId::random();
        let b = PeerId::random();
        registry.register(a, SessionSource::Discovery);
        registry.register(a, SessionSource::Inbound);
        let kept = registry.register(b, SessionSource::Inbound);

        assert_eq!(registry.close_peer(&a), 2);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.state(&kept), SessionState::Open);
        assert_eq!(registry.close_all(), 1);
        assert!(registry.is_empty());
    }
}
