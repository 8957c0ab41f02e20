use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::oneshot;

use iqversion_core::error::{ErrorCondition, Result, VersionError};
use iqversion_core::protocol::version::NAMESPACE;
use iqversion_core::protocol::{IqType, Jid, SoftwareVersion, Stanza, VersionIq};

use crate::clock::{Clock, SystemClock};
use crate::dispatch::{StanzaFilter, StanzaListener};
use crate::obs::metrics::{ManagerStats, StatsSnapshot};
use crate::transport::{Connection, ConnectionId, WeakConnection};
use crate::version::flood::{FloodDecision, FloodGuard, DEFAULT_MIN_INTERVAL_MS};

/// Default deadline for `query_version`.
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 5_000;

/// Construction parameters shared by every manager a registry creates.
#[derive(Debug, Clone)]
pub struct VersionSettings {
    /// Minimum gap between two replies on one connection; zero disables.
    pub min_interval: Duration,
    /// Identity to answer with from the start.
    pub identity: Option<SoftwareVersion>,
    pub request_timeout: Duration,
}

impl Default for VersionSettings {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_millis(DEFAULT_MIN_INTERVAL_MS),
            identity: None,
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
        }
    }
}

struct Pending {
    to: Jid,
    tx: oneshot::Sender<VersionIq>,
}

/// Per-connection `jabber:iq:version` handler.
///
/// Answers inbound queries with the configured identity (subject to the
/// flood guard) and correlates replies to queries issued through
/// `query_version`. Holds only a weak handle to its connection.
pub struct VersionManager {
    conn: WeakConnection,
    conn_id: ConnectionId,
    identity: RwLock<Option<SoftwareVersion>>,
    flood: Mutex<FloodGuard>,
    clock: Arc<dyn Clock>,
    pending: DashMap<String, Pending>,
    request_timeout: Duration,
    stats: ManagerStats,
}

impl VersionManager {
    /// Create a manager for `conn` with the wall clock.
    pub fn attach(conn: &Connection, settings: &VersionSettings) -> Arc<Self> {
        Self::attach_with_clock(conn, settings, Arc::new(SystemClock))
    }

    /// Create a manager, advertise the feature and subscribe to `conn`.
    pub fn attach_with_clock(
        conn: &Connection,
        settings: &VersionSettings,
        clock: Arc<dyn Clock>,
    ) -> Arc<Self> {
        let manager = Arc::new(Self {
            conn: conn.downgrade(),
            conn_id: conn.id(),
            identity: RwLock::new(settings.identity.clone()),
            flood: Mutex::new(FloodGuard::new(settings.min_interval)),
            clock,
            pending: DashMap::new(),
            request_timeout: settings.request_timeout,
            stats: ManagerStats::default(),
        });

        conn.features().add_feature(NAMESPACE);
        conn.subscribe(
            StanzaFilter::version_query().or(StanzaFilter::version_reply()),
            Arc::clone(&manager) as Arc<dyn StanzaListener>,
        );
        tracing::debug!(conn = %conn.id(), "version manager attached");
        manager
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.conn_id
    }

    /// Replace the advertised identity. Replies already sent are unaffected.
    pub fn set_version(&self, version: SoftwareVersion) {
        if !version.is_complete() {
            // Still answered; peers may reject a result without name or version.
            tracing::warn!(conn = %self.conn_id, "identity is missing name or version");
        }
        match self.identity.write() {
            Ok(mut g) => *g = Some(version),
            Err(poisoned) => *poisoned.into_inner() = Some(version),
        }
    }

    /// Stop answering queries.
    pub fn clear_version(&self) {
        match self.identity.write() {
            Ok(mut g) => *g = None,
            Err(poisoned) => *poisoned.into_inner() = None,
        }
    }

    pub fn own_version(&self) -> Option<SoftwareVersion> {
        self.identity.read().ok().and_then(|g| g.clone())
    }

    pub fn set_min_interval(&self, min_interval: Duration) {
        if let Ok(mut g) = self.flood.lock() {
            g.set_min_interval(min_interval);
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.flood
            .lock()
            .map(|g| g.min_interval())
            .unwrap_or(Duration::from_millis(DEFAULT_MIN_INTERVAL_MS))
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Number of issued queries still waiting for a reply.
    pub fn pending_requests(&self) -> usize {
        self.pending.len()
    }

    /// Answer an inbound version query. Never fails; the worst case is that
    /// no reply is sent.
    pub fn handle_query(&self, query: &VersionIq) {
        if !query.is_query() {
            return;
        }
        self.stats.queries_received.inc();

        let Some(identity) = self.own_version() else {
            self.stats.unconfigured_dropped.inc();
            tracing::debug!(conn = %self.conn_id, id = %query.id, "no identity configured, ignoring query");
            return;
        };

        let now = self.clock.now_millis();
        let decision = match self.flood.lock() {
            Ok(mut g) => g.check(now),
            // Poisoned guard: fail closed.
            Err(_) => FloodDecision::Suppress,
        };
        if decision == FloodDecision::Suppress {
            self.stats.flood_suppressed.inc();
            tracing::debug!(conn = %self.conn_id, id = %query.id, "version query suppressed by flood guard");
            return;
        }

        let Some(conn) = self.conn.upgrade() else {
            tracing::debug!(conn = %self.conn_id, "connection gone, dropping reply");
            return;
        };
        let reply = VersionIq::result_for(query, identity);
        match conn.send(&reply) {
            Ok(()) => {
                self.stats.replies_sent.inc();
                tracing::debug!(conn = %self.conn_id, id = %reply.id, "version reply sent");
            }
            Err(e) => {
                self.stats.send_failed.inc();
                tracing::warn!(conn = %self.conn_id, id = %reply.id, error = %e, "version reply send failed");
            }
        }
    }

    /// Build a query for `to` with a fresh correlation id.
    pub fn request(&self, to: Jid) -> VersionIq {
        VersionIq::query(to)
    }

    /// Ask `to` for its software version, waiting up to the configured
    /// request timeout.
    pub async fn query_version(&self, to: Jid) -> Result<SoftwareVersion> {
        self.query_version_with_timeout(to, self.request_timeout).await
    }

    pub async fn query_version_with_timeout(
        &self,
        to: Jid,
        timeout: Duration,
    ) -> Result<SoftwareVersion> {
        let request = self.request(to.clone());
        let id = request.id.clone();
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id.clone(), Pending { to, tx });
        // Removes the entry on every exit, including a caller dropping this future.
        let _pending = PendingGuard {
            pending: &self.pending,
            id: &id,
        };

        {
            let conn = self.conn.upgrade().ok_or(VersionError::NotConnected)?;
            conn.send(&request)?;
        }
        self.stats.requests_sent.inc();

        let reply = match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) => return Err(VersionError::NotConnected),
            Err(_) => {
                self.stats.requests_timed_out.inc();
                tracing::debug!(conn = %self.conn_id, id = %id, "version query timed out");
                return Err(VersionError::Timeout);
            }
        };

        match reply.kind {
            IqType::Result => Ok(reply.payload.unwrap_or_default()),
            IqType::Error => Err(VersionError::Remote(
                reply.error.unwrap_or(ErrorCondition::InternalServerError),
            )),
            other => Err(VersionError::BadRequest(format!(
                "unexpected reply type: {other}"
            ))),
        }
    }

    fn complete(&self, reply: &VersionIq) {
        let spoofed = match self.pending.get(&reply.id) {
            None => {
                tracing::debug!(conn = %self.conn_id, id = %reply.id, "unsolicited version reply");
                return;
            }
            Some(p) => matches!(&reply.from, Some(from) if *from != p.to),
        };
        if spoofed {
            tracing::warn!(conn = %self.conn_id, id = %reply.id, "version reply from unexpected sender");
            return;
        }
        if let Some((_, p)) = self.pending.remove(&reply.id) {
            let _ = p.tx.send(reply.clone());
        }
    }
}

struct PendingGuard<'a> {
    pending: &'a DashMap<String, Pending>,
    id: &'a str,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        // Already gone when `complete` delivered the reply.
        self.pending.remove(self.id);
    }
}

impl StanzaListener for VersionManager {
    fn process(&self, stanza: &Stanza) {
        let Stanza::Version(iq) = stanza else { return };
        match iq.kind {
            IqType::Get => self.handle_query(iq),
            IqType::Result | IqType::Error => self.complete(iq),
            IqType::Set => {}
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::clock::ManualClock;

    fn query(id: &str) -> VersionIq {
        VersionIq {
            id: id.into(),
            kind: IqType::Get,
            from: Some(Jid::new("romeo@montague.net/orchard").unwrap()),
            to: Some(Jid::new("juliet@capulet.com/balcony").unwrap()),
            payload: None,
            error: None,
        }
    }

    #[test]
    fn attach_advertises_and_subscribes_once() {
        let (conn, _rx) = Connection::new(8);
        let _m = VersionManager::attach(&conn, &VersionSettings::default());
        assert!(conn.features().includes(NAMESPACE));
        assert_eq!(conn.listener_count(), 1);
    }

    #[test]
    fn later_identity_change_does_not_touch_sent_reply() {
        let (conn, mut rx) = Connection::new(8);
        let clock = Arc::new(ManualClock::new(0));
        let m = VersionManager::attach_with_clock(&conn, &VersionSettings::default(), clock.clone());

        m.set_version(SoftwareVersion::new("Psi", "1.0"));
        m.handle_query(&query("a"));
        m.set_version(SoftwareVersion::new("Psi", "2.0"));

        let frame = rx.try_recv().unwrap();
        assert!(frame.contains("<version>1.0</version>"));
    }

    #[test]
    fn cleared_identity_stops_replies() {
        let (conn, mut rx) = Connection::new(8);
        let clock = Arc::new(ManualClock::new(0));
        let settings = VersionSettings {
            identity: Some(SoftwareVersion::new("Psi", "1.0")),
            ..Default::default()
        };
        let m = VersionManager::attach_with_clock(&conn, &settings, clock.clone());
        m.clear_version();
        m.handle_query(&query("a"));
        assert!(rx.try_recv().is_err());
        assert_eq!(m.stats().unconfigured_dropped, 1);
    }

    #[test]
    fn reply_after_connection_dropped_is_silent() {
        let (conn, _rx) = Connection::new(8);
        let settings = VersionSettings {
            identity: Some(SoftwareVersion::new("Psi", "1.0")),
            ..Default::default()
        };
        let m = VersionManager::attach(&conn, &settings);
        drop(conn);
        m.handle_query(&query("a"));
        assert_eq!(m.stats().replies_sent, 0);
    }

    #[test]
    fn incomplete_identity_is_still_answered() {
        let (conn, mut rx) = Connection::new(8);
        let m = VersionManager::attach(&conn, &VersionSettings::default());
        let os_only = SoftwareVersion {
            os: Some("Plan 9".into()),
            ..Default::default()
        };
        assert!(!os_only.is_complete());
        m.set_version(os_only.clone());
        assert_eq!(m.own_version(), Some(os_only));

        m.handle_query(&query("a"));
        let frame = rx.try_recv().unwrap();
        assert!(frame.contains("<os>Plan 9</os>"));
        assert!(!frame.contains("<name>"));
    }

    #[test]
    fn huge_min_interval_saturates() {
        let (conn, mut rx) = Connection::new(8);
        let clock = Arc::new(ManualClock::new(0));
        let settings = VersionSettings {
            identity: Some(SoftwareVersion::new("Psi", "1.0")),
            ..Default::default()
        };
        let m = VersionManager::attach_with_clock(&conn, &settings, clock.clone());
        m.set_min_interval(Duration::MAX);
        assert_eq!(m.min_interval(), Duration::from_millis(u64::MAX));

        m.handle_query(&query("a"));
        clock.advance(365 * 24 * 3600 * 1_000);
        m.handle_query(&query("b"));
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
        assert_eq!(m.stats().flood_suppressed, 1);
    }

    #[test]
    fn min_interval_is_adjustable() {
        let (conn, _rx) = Connection::new(8);
        let m = VersionManager::attach(&conn, &VersionSettings::default());
        assert_eq!(m.min_interval(), Duration::from_millis(100));
        m.set_min_interval(Duration::ZERO);
        assert_eq!(m.min_interval(), Duration::ZERO);
    }
}
