use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use iqversion_core::error::{Result, VersionError};
use iqversion_core::protocol::{Stanza, VersionIq};

use crate::dispatch::{StanzaFilter, StanzaListener};
use crate::transport::features::FeatureSet;

static CONN_SEQ: AtomicU64 = AtomicU64::new(1);

/// Process-unique connection identity (registry key).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    fn next() -> Self {
        Self(CONN_SEQ.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Runs once when the connection is closed or its last handle is dropped.
pub type CloseHook = Box<dyn FnOnce(ConnectionId) + Send>;

struct Subscription {
    filter: StanzaFilter,
    listener: Arc<dyn StanzaListener>,
}

struct ConnectionInner {
    id: ConnectionId,
    tx: mpsc::Sender<String>,
    listeners: RwLock<Vec<Subscription>>,
    close_hooks: Mutex<Vec<CloseHook>>,
    closed: AtomicBool,
    features: FeatureSet,
}

impl ConnectionInner {
    fn shutdown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let hooks = match self.close_hooks.lock() {
            Ok(mut g) => std::mem::take(&mut *g),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        for hook in hooks {
            hook(self.id);
        }
        if let Ok(mut g) = self.listeners.write() {
            g.clear();
        }
        tracing::debug!(conn = %self.id, "connection closed");
    }
}

impl Drop for ConnectionInner {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Shared handle to one connection. Cloning is cheap.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

/// Non-owning handle; does not keep the connection open.
#[derive(Clone)]
pub struct WeakConnection {
    inner: Weak<ConnectionInner>,
}

impl WeakConnection {
    pub fn upgrade(&self) -> Option<Connection> {
        self.inner.upgrade().map(|inner| Connection { inner })
    }
}

impl Connection {
    /// New connection with an outbound queue of `capacity` frames.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let inner = ConnectionInner {
            id: ConnectionId::next(),
            tx,
            listeners: RwLock::new(Vec::new()),
            close_hooks: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
            features: FeatureSet::new(),
        };
        (
            Self {
                inner: Arc::new(inner),
            },
            rx,
        )
    }

    pub fn id(&self) -> ConnectionId {
        self.inner.id
    }

    pub fn features(&self) -> &FeatureSet {
        &self.inner.features
    }

    pub fn downgrade(&self) -> WeakConnection {
        WeakConnection {
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Serialize and queue a version stanza.
    pub fn send(&self, iq: &VersionIq) -> Result<()> {
        self.send_raw(iq.to_xml()?)
    }

    /// Queue a raw outbound frame without waiting.
    pub fn send_raw(&self, frame: String) -> Result<()> {
        if self.is_closed() {
            return Err(VersionError::NotConnected);
        }
        self.inner.tx.try_send(frame).map_err(|e| match e {
            TrySendError::Full(_) => VersionError::Internal("outbound queue full".into()),
            TrySendError::Closed(_) => VersionError::NotConnected,
        })
    }

    pub fn subscribe(&self, filter: StanzaFilter, listener: Arc<dyn StanzaListener>) {
        if self.is_closed() {
            return;
        }
        if let Ok(mut g) = self.inner.listeners.write() {
            g.push(Subscription { filter, listener });
        }
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners.read().map(|g| g.len()).unwrap_or(0)
    }

    /// Register a teardown hook. On an already closed connection the hook
    /// runs immediately.
    pub fn on_close(&self, hook: CloseHook) {
        if !self.is_closed() {
            if let Ok(mut g) = self.inner.close_hooks.lock() {
                // re-check under the lock: shutdown takes the hooks under it
                if !self.is_closed() {
                    g.push(hook);
                    return;
                }
            }
        }
        hook(self.inner.id);
    }

    /// Close the connection. Idempotent.
    pub fn close(&self) {
        self.inner.shutdown();
    }

    /// Feed one raw inbound stanza to the matching listeners.
    ///
    /// Unparseable input is logged and dropped; it never reaches listeners.
    pub fn deliver(&self, raw: &str) {
        if self.is_closed() {
            return;
        }
        let stanza = match Stanza::parse(raw) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(conn = %self.id(), error = %e, "dropping malformed stanza");
                return;
            }
        };

        // Snapshot so listeners can call back into the connection.
        let matched: Vec<Arc<dyn StanzaListener>> = match self.inner.listeners.read() {
            Ok(g) => g
                .iter()
                .filter(|s| s.filter.matches(&stanza))
                .map(|s| Arc::clone(&s.listener))
                .collect(),
            Err(_) => return,
        };

        if matched.is_empty() {
            tracing::trace!(conn = %self.id(), "no listener for stanza");
        }
        for listener in matched {
            listener.process(&stanza);
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.inner.id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn close_hooks_run_once_on_close() {
        let (conn, _rx) = Connection::new(4);
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        conn.on_close(Box::new(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        }));
        conn.close();
        conn.close();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(matches!(conn.send_raw("<x/>".into()), Err(VersionError::NotConnected)));
    }

    #[test]
    fn close_hooks_run_when_last_handle_drops() {
        let (conn, _rx) = Connection::new(4);
        let id = conn.id();
        let seen = Arc::new(AtomicU64::new(0));
        let s = Arc::clone(&seen);
        conn.on_close(Box::new(move |closed| {
            s.store(closed.get(), Ordering::SeqCst);
        }));
        let weak = conn.downgrade();
        let second = conn.clone();
        drop(conn);
        assert_eq!(seen.load(Ordering::SeqCst), 0);
        drop(second);
        assert_eq!(seen.load(Ordering::SeqCst), id.get());
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn hook_on_closed_connection_runs_immediately() {
        let (conn, _rx) = Connection::new(4);
        conn.close();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        conn.on_close(Box::new(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn deliver_routes_by_filter_and_drops_garbage() {
        let (conn, _rx) = Connection::new(4);
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        conn.subscribe(
            StanzaFilter::version_query(),
            Arc::new(move |_: &Stanza| {
                h.fetch_add(1, Ordering::SeqCst);
            }),
        );
        conn.deliver("<iq type='get' id='a'><query xmlns='jabber:iq:version'/></iq>");
        conn.deliver("<iq type='get' id='b'><ping xmlns='urn:xmpp:ping'/></iq>");
        conn.deliver("<iq type='get' id='c'><query xmlns='jabber:iq:version'>");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn full_queue_is_an_error() {
        let (conn, _rx) = Connection::new(1);
        assert!(conn.send_raw("<a/>".into()).is_ok());
        assert!(matches!(conn.send_raw("<b/>".into()), Err(VersionError::Internal(_))));
    }
}
