use std::sync::Arc;

use dashmap::DashMap;

use crate::clock::{Clock, SystemClock};
use crate::config::ClientConfig;
use crate::obs::metrics;
use crate::transport::{Connection, ConnectionId};
use crate::version::manager::{VersionManager, VersionSettings};

type Managers = DashMap<ConnectionId, Arc<VersionManager>>;

/// Connection -> manager map.
///
/// Construct once and share by reference. Entries are created on first
/// lookup and removed by the connection's close hook, so the registry never
/// outlives (or keeps alive) the connections it serves.
pub struct VersionRegistry {
    managers: Arc<Managers>,
    settings: VersionSettings,
    clock: Arc<dyn Clock>,
}

impl VersionRegistry {
    pub fn new(settings: VersionSettings) -> Self {
        Self::with_clock(settings, Arc::new(SystemClock))
    }

    pub fn with_clock(settings: VersionSettings, clock: Arc<dyn Clock>) -> Self {
        Self {
            managers: Arc::new(DashMap::new()),
            settings,
            clock,
        }
    }

    pub fn from_config(cfg: &ClientConfig) -> Self {
        Self::new(cfg.settings())
    }

    pub fn settings(&self) -> &VersionSettings {
        &self.settings
    }

    /// The manager for `conn`, created on first call.
    ///
    /// Concurrent callers for the same connection all get the same instance;
    /// creation happens under the map's entry lock.
    pub fn instance_for(&self, conn: &Connection) -> Arc<VersionManager> {
        let id = conn.id();
        if let Some(m) = self.managers.get(&id) {
            return Arc::clone(m.value());
        }

        let mut created = false;
        let manager = Arc::clone(
            self.managers
                .entry(id)
                .or_insert_with(|| {
                    created = true;
                    VersionManager::attach_with_clock(conn, &self.settings, Arc::clone(&self.clock))
                })
                .value(),
        );

        // Outside the entry lock: on a closed connection the hook runs inline
        // and removes the entry again.
        if created {
            let managers = Arc::downgrade(&self.managers);
            conn.on_close(Box::new(move |id| {
                if let Some(managers) = managers.upgrade() {
                    managers.remove(&id);
                    tracing::debug!(conn = %id, "version manager released");
                }
            }));
        }
        manager
    }

    pub fn get(&self, id: ConnectionId) -> Option<Arc<VersionManager>> {
        self.managers.get(&id).map(|m| Arc::clone(m.value()))
    }

    pub fn len(&self) -> usize {
        self.managers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.managers.is_empty()
    }

    /// Prometheus text for every live manager, ordered by connection.
    pub fn render_metrics(&self) -> String {
        let mut rows: Vec<(ConnectionId, _)> = self
            .managers
            .iter()
            .map(|e| (*e.key(), e.value().stats()))
            .collect();
        rows.sort_by_key(|(id, _)| *id);
        let rows: Vec<(String, _)> = rows.into_iter().map(|(id, s)| (id.to_string(), s)).collect();
        metrics::render(&rows)
    }
}

impl Default for VersionRegistry {
    fn default() -> Self {
        Self::new(VersionSettings::default())
    }
}
