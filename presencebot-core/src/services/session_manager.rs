// File: presencebot-core/src/services/session_manager.rs

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures_util::future::join_all;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn};

use presencebot_common::models::{Credential, PresenceConfig};
use presencebot_common::traits::repository_traits::{ActiveHolderStore, ConfigStore, CredentialStore};

use crate::session::{Session, SessionDeps, SessionSnapshot};
use crate::utils::MemoryProbe;
use crate::Error;

/// Manager-level thresholds and periods.
#[derive(Debug, Clone)]
pub struct ManagerSettings {
    pub health_interval: Duration,
    /// Memory usage (percent) above which a cleanup pass runs.
    pub cleanup_threshold: f64,
    /// Memory usage (percent) above which degraded sessions get restarted.
    pub restart_threshold: f64,
    /// Minimum time between two restarts of the same (holder, credential).
    pub restart_spacing: Duration,
    /// Pause between stopping a session and starting its replacement.
    pub restart_pause: Duration,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            health_interval: Duration::from_secs(60),
            cleanup_threshold: 75.0,
            restart_threshold: 95.0,
            restart_spacing: Duration::from_secs(15 * 60),
            restart_pause: Duration::from_secs(5),
        }
    }
}

/// The stores a manager reads holders' data from.
#[derive(Clone)]
pub struct ManagerStores {
    pub credentials: Arc<dyn CredentialStore>,
    pub configs: Arc<dyn ConfigStore>,
    pub active: Arc<dyn ActiveHolderStore>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartFailure {
    /// Masked credential.
    pub credential: String,
    pub reason: String,
}

/// Outcome of starting a holder's sessions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StartReport {
    pub success: bool,
    pub success_count: usize,
    pub failed_count: usize,
    pub total_count: usize,
    pub failures: Vec<StartFailure>,
}

#[derive(Debug, Clone)]
pub struct HolderStart {
    pub report: StartReport,
    pub used_default_config: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HealthReport {
    pub usage_percent: f64,
    pub pruned_images: Option<usize>,
    pub pruned_sessions: usize,
    pub restarted: usize,
}

/// Registry of running sessions, keyed by holder.
pub struct SessionManager {
    stores: ManagerStores,
    deps: SessionDeps,
    memory: Arc<dyn MemoryProbe>,
    settings: ManagerSettings,

    sessions: DashMap<String, Vec<Arc<Session>>>,
    holder_locks: DashMap<String, Arc<Mutex<()>>>,
    restart_history: DashMap<(String, String), Instant>,
}

impl SessionManager {
    pub fn new(
        stores: ManagerStores,
        deps: SessionDeps,
        memory: Arc<dyn MemoryProbe>,
        settings: ManagerSettings,
    ) -> Self {
        Self {
            stores,
            deps,
            memory,
            settings,
            sessions: DashMap::new(),
            holder_locks: DashMap::new(),
            restart_history: DashMap::new(),
        }
    }

    pub fn settings(&self) -> &ManagerSettings {
        &self.settings
    }

    fn holder_lock(&self, holder: &str) -> Arc<Mutex<()>> {
        self.holder_locks
            .entry(holder.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn sessions_of(&self, holder: &str) -> Vec<Arc<Session>> {
        self.sessions
            .get(holder)
            .map(|s| s.value().clone())
            .unwrap_or_default()
    }

    /// Replaces whatever `holder` is running with one session per credential.
    pub async fn start_session(
        &self,
        holder: &str,
        credentials: Vec<Credential>,
        config: PresenceConfig,
    ) -> Result<StartReport, Error> {
        config.validate()?;
        let mut config = config;
        if config.trim_oversized() {
            warn!("(SessionManager) config for '{}' was oversized and got trimmed", holder);
        }
        let config = Arc::new(config);

        let lock = self.holder_lock(holder);
        let _guard = lock.lock().await;

        self.stop_locked(holder).await;
        Ok(self.start_locked(holder, credentials, config).await)
    }

    async fn start_locked(
        &self,
        holder: &str,
        credentials: Vec<Credential>,
        config: Arc<PresenceConfig>,
    ) -> StartReport {
        let total_count = credentials.len();
        let mut failures = Vec::new();
        let mut pending = Vec::new();

        for credential in credentials {
            if !credential.is_well_formed() {
                info!(
                    "(SessionManager) invalid token format for '{}': {}",
                    holder,
                    credential.mask()
                );
                failures.push(StartFailure {
                    credential: credential.mask(),
                    reason: "Invalid token format".to_string(),
                });
                continue;
            }
            pending.push(Session::new(holder, credential, Arc::clone(&config), self.deps.clone()));
        }

        let results = join_all(pending.iter().map(|s| s.start())).await;

        let mut running = Vec::new();
        for (session, result) in pending.into_iter().zip(results) {
            match result {
                Ok(identity) => {
                    info!("(SessionManager) [+] READY : [{}] for '{}'", identity.username, holder);
                    running.push(session);
                }
                Err(e) => {
                    warn!(
                        "(SessionManager) [-] {} failed to start: {:?}",
                        session.credential().mask(),
                        e
                    );
                    failures.push(StartFailure {
                        credential: session.credential().mask(),
                        reason: e.to_string(),
                    });
                    session.stop().await;
                }
            }
        }

        let success_count = running.len();
        if success_count > 0 {
            self.sessions.insert(holder.to_string(), running);
            if let Err(e) = self.stores.active.add(holder).await {
                error!("(SessionManager) could not persist active holder '{}': {:?}", holder, e);
            }
            info!("(SessionManager) added '{}' to active streams", holder);
        }

        StartReport {
            success: success_count > 0,
            success_count,
            failed_count: failures.len(),
            total_count,
            failures,
        }
    }

    /// Loads the holder's credentials and config from the stores and starts
    /// streaming. Store failures are returned as errors.
    pub async fn start_for_holder(&self, holder: &str) -> Result<HolderStart, Error> {
        let credentials = self.stores.credentials.get(holder).await?;
        if credentials.is_empty() {
            return Err(Error::NotFound(format!("no credentials stored for '{holder}'")));
        }
        let lookup = self.stores.configs.get(holder).await?;
        let report = self.start_session(holder, credentials, lookup.config).await?;
        Ok(HolderStart {
            report,
            used_default_config: lookup.is_default,
        })
    }

    /// Stops every session of `holder`. False when nothing was running.
    pub async fn stop_session(&self, holder: &str) -> bool {
        let lock = self.holder_lock(holder);
        let _guard = lock.lock().await;
        self.stop_locked(holder).await
    }

    async fn stop_locked(&self, holder: &str) -> bool {
        let Some((_, sessions)) = self.sessions.remove(holder) else {
            return false;
        };
        for session in &sessions {
            session.stop().await;
        }
        if let Err(e) = self.stores.active.remove(holder).await {
            error!("(SessionManager) could not clear active holder '{}': {:?}", holder, e);
        }
        info!("(SessionManager) removed '{}' from active streams", holder);
        true
    }

    /// Shutdown path. The active-holder record is left as is so the same
    /// holders come back on the next boot.
    pub async fn stop_all(&self) {
        let holders: Vec<String> = self.sessions.iter().map(|e| e.key().clone()).collect();
        for holder in holders {
            let lock = self.holder_lock(&holder);
            let _guard = lock.lock().await;
            if let Some((_, sessions)) = self.sessions.remove(&holder) {
                for session in &sessions {
                    session.stop().await;
                }
            }
        }
        info!("(SessionManager) all streams stopped");
    }

    pub fn is_active(&self, holder: &str) -> bool {
        self.sessions_of(holder).iter().any(|s| !s.is_terminated())
    }

    pub fn active_count(&self, holder: &str) -> usize {
        self.sessions_of(holder)
            .iter()
            .filter(|s| !s.is_terminated())
            .count()
    }

    /// True once any session of the holder is connected and has published.
    pub fn is_streaming(&self, holder: &str) -> bool {
        self.sessions_of(holder)
            .iter()
            .any(|s| s.connection_status().is_connected() && s.publish_count() > 0)
    }

    pub fn snapshots(&self, holder: &str) -> Vec<SessionSnapshot> {
        self.sessions_of(holder).iter().map(|s| s.snapshot()).collect()
    }

    pub fn holders(&self) -> Vec<String> {
        self.sessions.iter().map(|e| e.key().clone()).collect()
    }

    /// Brings back every holder recorded as streaming. Holders without
    /// credentials are dropped from the record. Returns how many started.
    pub async fn restore_active(&self) -> Result<usize, Error> {
        let holders = self.stores.active.list().await?;
        info!("(SessionManager) restoring {} active holder(s)", holders.len());

        let mut restored = 0;
        for holder in holders {
            let credentials = match self.stores.credentials.get(&holder).await {
                Ok(c) => c,
                Err(e) => {
                    error!("(SessionManager) could not load credentials for '{}': {:?}", holder, e);
                    continue;
                }
            };
            if credentials.is_empty() {
                warn!("(SessionManager) '{}' has no credentials; dropping from active list", holder);
                if let Err(e) = self.stores.active.remove(&holder).await {
                    error!("(SessionManager) could not clear '{}': {:?}", holder, e);
                }
                continue;
            }
            match self.start_for_holder(&holder).await {
                Ok(start) if start.report.success => {
                    restored += 1;
                    info!(
                        "(SessionManager) restored '{}' ({}/{} sessions)",
                        holder, start.report.success_count, start.report.total_count
                    );
                }
                Ok(start) => warn!(
                    "(SessionManager) restore of '{}' started nothing ({} failed)",
                    holder, start.report.failed_count
                ),
                Err(e) => error!("(SessionManager) restore of '{}' failed: {:?}", holder, e),
            }
        }
        Ok(restored)
    }

    /// Deletes a stored credential. A running holder is restarted without it,
    /// or stopped when it was the last one.
    pub async fn remove_credential(&self, holder: &str, value: &str) -> Result<bool, Error> {
        let removed = self.stores.credentials.remove(holder, value).await?;
        if !removed {
            return Ok(false);
        }

        let running = self
            .sessions_of(holder)
            .iter()
            .any(|s| s.credential().value == value);
        if running {
            let remaining = self.stores.credentials.get(holder).await?;
            if remaining.is_empty() {
                self.stop_session(holder).await;
            } else {
                let config = self.stores.configs.get(holder).await?.config;
                self.start_session(holder, remaining, config).await?;
            }
        }
        Ok(true)
    }

    /// Drops image-cache entries past their lifetime.
    pub fn cleanup(&self) -> usize {
        let pruned = self.deps.image_cache.prune_expired();
        debug!("(SessionManager) cleanup pruned {} cached image(s)", pruned);
        pruned
    }

    /// Removes sessions that ended on their own (credential rejected on
    /// reconnect). Holders left with nothing are stopped.
    pub async fn prune_terminated(&self) -> usize {
        let mut pruned = 0;
        for holder in self.holders() {
            let lock = self.holder_lock(&holder);
            let _guard = lock.lock().await;

            let mut emptied = false;
            if let Some(mut entry) = self.sessions.get_mut(&holder) {
                let before = entry.len();
                entry.retain(|s| !s.is_terminated());
                pruned += before - entry.len();
                emptied = entry.is_empty();
            }
            if emptied {
                self.stop_locked(&holder).await;
            }
        }
        pruned
    }

    fn is_problematic(&self, session: &Session) -> bool {
        let slow = session
            .latency()
            .is_some_and(|l| l > self.deps.timings.latency_threshold);
        slow || !session.connection_status().is_connected()
    }

    /// Restarts sessions with high latency or a lost connection, at most
    /// once per `restart_spacing` for each (holder, credential).
    pub async fn restart_problematic(&self) -> usize {
        let mut restarted = 0;
        for holder in self.holders() {
            let lock = self.holder_lock(&holder);
            let _guard = lock.lock().await;

            for session in self.sessions_of(&holder) {
                if session.is_terminated() || !self.is_problematic(&session) {
                    continue;
                }
                let key = (holder.clone(), session.credential().value.clone());
                let recent = self
                    .restart_history
                    .get(&key)
                    .is_some_and(|at| at.elapsed() < self.settings.restart_spacing);
                if recent {
                    continue;
                }
                self.restart_history.insert(key, Instant::now());
                if self.restart_one(&holder, &session).await {
                    restarted += 1;
                }
            }
        }
        restarted
    }

    async fn restart_one(&self, holder: &str, old: &Arc<Session>) -> bool {
        info!(
            "(SessionManager) restarting stream due to connectivity issues: {}",
            old.credential().mask()
        );
        old.stop().await;
        self.cleanup();
        sleep(self.settings.restart_pause).await;

        let fresh = Session::new(
            holder,
            old.credential().clone(),
            Arc::clone(old.config()),
            self.deps.clone(),
        );
        let started = fresh.start().await;

        if let Some(mut entry) = self.sessions.get_mut(holder) {
            entry.retain(|s| !Arc::ptr_eq(s, old));
            if started.is_ok() {
                entry.push(Arc::clone(&fresh));
            }
        }

        match started {
            Ok(_) => {
                info!("(SessionManager) restarted {}", old.credential().mask());
                true
            }
            Err(e) => {
                warn!("(SessionManager) restart of {} failed: {:?}", old.credential().mask(), e);
                fresh.stop().await;
                false
            }
        }
    }

    /// One health sweep: cleanup above the first threshold, restarts above
    /// the second.
    pub async fn run_health_check(&self) -> HealthReport {
        let mut report = HealthReport {
            pruned_sessions: self.prune_terminated().await,
            ..HealthReport::default()
        };

        report.usage_percent = self.memory.usage_percent();
        if report.usage_percent > self.settings.cleanup_threshold {
            warn!("(HealthSweep) memory at {:.1}%, cleaning up", report.usage_percent);
            report.pruned_images = Some(self.cleanup());
            report.usage_percent = self.memory.usage_percent();
        }
        if report.usage_percent > self.settings.restart_threshold {
            warn!("(HealthSweep) memory still at {:.1}%, restarting degraded streams", report.usage_percent);
            report.restarted = self.restart_problematic().await;
        }
        report
    }
}
