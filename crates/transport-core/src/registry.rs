//! Session registry - tracks which guests are in flight and which are done.
//!
//! # Architecture
//!
//! The registry owns two disjoint collections keyed by guest ID: `active`
//! (connected sessions awaiting delivery) and `done` (guests with a confirmed
//! delivery). One run is `refresh` → `deliver_all` → `disconnect_all`.
//!
//! Deliveries run as independent tasks bounded by a semaphore. Each task locks
//! its session for the duration of the transfer while the registry keeps a
//! handle to it, so even a panicked delivery can still be logged out. Only
//! the registry itself touches `active` and `done`, so updates are serialized
//! without a lock.
//!
//! A failed delivery logs out right away, so its guest can be picked up by
//! the next `refresh` without ever holding two logins. Delivered sessions
//! wait in a teardown list until `disconnect_all`; their guests are done and
//! are never re-admitted.

use crate::completion::CompletionLog;
use crate::config::RegistryConfig;
use crate::error::{CoreError, Disposition, Result};
use crate::payload::PayloadSelector;
use crate::report::RunReport;
use crate::session::{open_session, GuestSession};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use transport_host::{ErrorKind, GuestId, HostApi, PowerState};

/// A session lent to a delivery task.
type SharedSession = Arc<Mutex<Box<dyn GuestSession>>>;

/// Which step of a session an error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Connect,
    Deliver,
}

/// Orchestrates one delivery cycle over all running guests.
///
/// # Thread Safety
///
/// All mutating operations take `&mut self`; the registry is meant to be
/// owned by a single driver. Construct one per run.
pub struct SessionRegistry {
    host: Arc<dyn HostApi>,
    selector: Arc<PayloadSelector>,
    config: RegistryConfig,
    active: HashMap<GuestId, Box<dyn GuestSession>>,
    done: HashSet<GuestId>,
    /// Delivered sessions that still hold a login.
    teardown: Vec<SharedSession>,
    completion_log: Option<CompletionLog>,
    report: RunReport,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new(
        host: Arc<dyn HostApi>,
        selector: PayloadSelector,
        config: RegistryConfig,
    ) -> Self {
        tracing::info!(
            payload_dir = %selector.dir().display(),
            max_concurrent = config.max_concurrent,
            "Creating session registry"
        );
        Self {
            host,
            selector: Arc::new(selector),
            config,
            active: HashMap::new(),
            done: HashSet::new(),
            teardown: Vec::new(),
            completion_log: None,
            report: RunReport::default(),
        }
    }

    /// Persist completions to `log` and treat guests already in it as done.
    pub async fn with_completion_log(mut self, log: CompletionLog) -> Result<Self> {
        let recorded = log.load().await?;
        tracing::info!(
            path = %log.path().display(),
            recorded = recorded.len(),
            "Using durable completion log"
        );
        self.done.extend(recorded);
        self.completion_log = Some(log);
        Ok(self)
    }

    /// Get the registry configuration.
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Counters accumulated so far.
    pub fn report(&self) -> &RunReport {
        &self.report
    }

    /// Whether `id` has a session awaiting delivery.
    pub fn is_active(&self, id: GuestId) -> bool {
        self.active.contains_key(&id)
    }

    /// Whether `id` has a confirmed delivery.
    pub fn is_done(&self, id: GuestId) -> bool {
        self.done.contains(&id)
    }

    /// IDs of guests with an active session.
    pub fn active_ids(&self) -> Vec<GuestId> {
        let mut ids: Vec<_> = self.active.keys().copied().collect();
        ids.sort();
        ids
    }

    /// IDs of guests with a confirmed delivery.
    pub fn done_ids(&self) -> Vec<GuestId> {
        let mut ids: Vec<_> = self.done.iter().copied().collect();
        ids.sort();
        ids
    }

    /// Whether `active` and `done` share no guest.
    pub fn is_disjoint(&self) -> bool {
        self.active.keys().all(|id| !self.done.contains(id))
    }

    /// Enumerate running guests and connect a session for each new one.
    ///
    /// Only ever adds to `active`. Guests that are already active or done
    /// are skipped, as are stopped guests and unsupported OS families. A
    /// failed login records nothing, so the guest is tried again on the next
    /// refresh.
    ///
    /// # Returns
    ///
    /// The number of sessions added.
    ///
    /// # Errors
    ///
    /// Returns an error only if the host could not enumerate guests at all.
    pub async fn refresh(&mut self) -> Result<usize> {
        let guests = self.host.list_running_guests().await?;
        tracing::debug!(count = guests.len(), "Discovered running guests");
        self.report.discovered += guests.len();

        let mut added = 0;
        for guest in guests {
            let id = guest.id;
            if self.active.contains_key(&id) {
                tracing::trace!(guest_id = %id, "Guest already has a session");
                continue;
            }
            if self.done.contains(&id) {
                tracing::debug!(guest_id = %id, "Guest already delivered, skipping");
                self.report.already_done += 1;
                continue;
            }
            if guest.state != PowerState::Running {
                tracing::trace!(guest_id = %id, state = %guest.state, "Guest not running, skipping");
                continue;
            }

            let os = guest.os;
            let Some(mut session) = open_session(
                guest,
                Arc::clone(&self.host),
                Arc::clone(&self.selector),
                &self.config,
            ) else {
                tracing::debug!(guest_id = %id, os = %os, "Unsupported OS family, skipping");
                self.report.unsupported += 1;
                continue;
            };

            match session.connect().await {
                Ok(()) => {
                    tracing::info!(guest_id = %id, os = %os, "Session connected");
                    self.active.insert(id, session);
                    self.report.connected += 1;
                    added += 1;
                }
                Err(e) => self.record_failure(id, Phase::Connect, &e),
            }
        }

        debug_assert!(self.is_disjoint());
        Ok(added)
    }

    /// Deliver the payload to every active session.
    ///
    /// Every session leaves `active`. Successes move their guest to `done`
    /// and keep their login until [`disconnect_all`](Self::disconnect_all).
    /// Failures log out immediately and are dropped without a record, which
    /// leaves the guest eligible for the next refresh.
    ///
    /// # Returns
    ///
    /// The number of confirmed deliveries.
    pub async fn deliver_all(&mut self) -> usize {
        if self.active.is_empty() {
            tracing::debug!("No active sessions to deliver to");
            return 0;
        }

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent.max(1)));
        let mut in_flight: HashMap<GuestId, SharedSession> = HashMap::new();
        let mut tasks = JoinSet::new();
        for (id, session) in self.active.drain() {
            let session = Arc::new(Mutex::new(session));
            in_flight.insert(id, Arc::clone(&session));
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                // Held until this delivery finishes
                let _permit = semaphore.acquire_owned().await.ok();
                let start = Instant::now();
                let result = session.lock().await.deliver_payload().await;
                (id, result, start.elapsed())
            });
        }
        tracing::debug!(count = tasks.len(), "Deliveries started");

        let mut delivered = 0;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((id, result, elapsed)) => {
                    let Some(session) = in_flight.remove(&id) else {
                        continue;
                    };
                    if self.settle(id, result, elapsed).await == Disposition::Done {
                        delivered += 1;
                        self.teardown.push(session);
                    } else {
                        self.release(&session).await;
                    }
                }
                Err(e) => {
                    tracing::error!(error = ?e, "Delivery task panicked");
                    self.report.exec_failures += 1;
                }
            }
        }

        // Whatever is left belonged to a panicked task
        for (id, session) in in_flight {
            tracing::warn!(guest_id = %id, "Releasing session of panicked delivery");
            self.release(&session).await;
        }

        debug_assert!(self.active.is_empty());
        debug_assert!(self.is_disjoint());
        delivered
    }

    /// Apply one delivery outcome to the registry state.
    async fn settle(
        &mut self,
        id: GuestId,
        result: Result<()>,
        elapsed: Duration,
    ) -> Disposition {
        match result {
            Ok(()) => {
                self.done.insert(id);
                self.report.delivered += 1;
                tracing::debug!(
                    guest_id = %id,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Guest marked done"
                );
                if let Some(log) = &self.completion_log {
                    if let Err(e) = log.record(id).await {
                        tracing::warn!(guest_id = %id, error = %e, "Failed to record completion");
                    }
                }
                Disposition::Done
            }
            Err(e) => {
                self.record_failure(id, Phase::Deliver, &e);
                e.disposition()
            }
        }
    }

    /// Log out of a session that leaves the registry without a delivery.
    async fn release(&mut self, session: &SharedSession) {
        self.report.disconnects += 1;
        if !Self::disconnect_one(session.lock().await.as_mut()).await {
            self.report.teardown_failures += 1;
        }
    }

    fn record_failure(&mut self, id: GuestId, phase: Phase, err: &CoreError) {
        match (phase, err.host_kind()) {
            (_, Some(ErrorKind::GuestGone)) => self.report.gone += 1,
            (Phase::Connect, _) => self.report.auth_failures += 1,
            (Phase::Deliver, _) => self.report.exec_failures += 1,
        }

        match err.disposition() {
            Disposition::Retry => {
                tracing::warn!(guest_id = %id, ?phase, error = %err, "Guest failed, will retry on next run");
            }
            Disposition::Drop | Disposition::Done => {
                tracing::warn!(guest_id = %id, ?phase, error = %err, "Guest dropped");
            }
        }
    }

    /// Log out of every active or delivered session.
    ///
    /// Logout failures are logged and swallowed; they never change which
    /// guests are active or done. Each session is logged out at most once.
    ///
    /// # Returns
    ///
    /// The number of sessions disconnected.
    pub async fn disconnect_all(&mut self) -> usize {
        let pending = std::mem::take(&mut self.teardown);
        let count = self.active.len() + pending.len();
        tracing::debug!(count, "Disconnecting sessions");

        let mut failures = 0;
        for session in self.active.values_mut() {
            if !Self::disconnect_one(session.as_mut()).await {
                failures += 1;
            }
        }
        for session in &pending {
            if !Self::disconnect_one(session.lock().await.as_mut()).await {
                failures += 1;
            }
        }

        self.report.disconnects += count;
        self.report.teardown_failures += failures;
        count
    }

    async fn disconnect_one(session: &mut dyn GuestSession) -> bool {
        match session.disconnect().await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(guest_id = %session.guest_id(), error = %e, "Logout failed");
                false
            }
        }
    }

    /// One full cycle: discover, deliver, tear down.
    ///
    /// Per-guest failures never abort the cycle. A failed enumeration is
    /// logged and leaves nothing to deliver.
    pub async fn run(&mut self) -> RunReport {
        let start = Instant::now();
        tracing::info!("Starting delivery run");

        match self.refresh().await {
            Ok(added) => tracing::debug!(added, "Refresh complete"),
            Err(e) => tracing::error!(error = %e, "Guest discovery failed"),
        }
        self.deliver_all().await;
        self.disconnect_all().await;

        let report = self.report.clone();
        tracing::info!(
            discovered = report.discovered,
            delivered = report.delivered,
            already_done = report.already_done,
            unsupported = report.unsupported,
            auth_failures = report.auth_failures,
            exec_failures = report.exec_failures,
            gone = report.gone,
            teardown_failures = report.teardown_failures,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Delivery run complete"
        );
        report
    }
}
