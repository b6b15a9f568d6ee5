//! Resource Lock Table with Deadlock Detection
//!
//! Named resources locked by named holders:
//! - Shared and exclusive modes
//! - Wait-for graph between holders, checked on every blocked request
//! - Bounded, polling acquisition that turns a would-be hang into `LockTimeout`
//! - Lease expiry and background cleanup
//! - Background detection that aborts a victim holder's locks

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use contend_core::{ContendError, Result};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

// ==============================================================================
// Type Aliases
// ==============================================================================

pub type LockId = String;
pub type HolderId = String;

// ==============================================================================
// Lock Data Model
// ==============================================================================

/// A lock currently held on a resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeldLock {
    pub lock_id: LockId,
    pub resource_id: String,
    pub mode: LockMode,
    pub holder: HolderId,
    pub acquired_at: DateTime<Utc>,
    /// After this instant the lock may be reclaimed by cleanup
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockMode {
    /// Many holders at once
    Shared,
    /// One holder only
    Exclusive,
}

/// Lock request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockRequest {
    pub resource_id: String,
    pub mode: LockMode,
    /// How long `acquire` keeps retrying before giving up
    pub wait: Duration,
    /// Lease length; the table default when `None`
    pub lease: Option<Duration>,
}

impl LockRequest {
    pub fn shared(resource_id: impl Into<String>, wait: Duration) -> Self {
        Self {
            resource_id: resource_id.into(),
            mode: LockMode::Shared,
            wait,
            lease: None,
        }
    }

    pub fn exclusive(resource_id: impl Into<String>, wait: Duration) -> Self {
        Self {
            resource_id: resource_id.into(),
            mode: LockMode::Exclusive,
            wait,
            lease: None,
        }
    }

    pub fn with_lease(mut self, lease: Duration) -> Self {
        self.lease = Some(lease);
        self
    }
}

/// Result of a non-blocking acquisition attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Acquisition {
    Acquired(HeldLock),
    /// Another holder has an incompatible lock
    WouldBlock {
        blocking_lock_id: LockId,
        holder: HolderId,
    },
    /// Waiting would close a cycle in the wait-for graph
    Deadlock { cycle: Vec<HolderId> },
}

/// Lock statistics for monitoring
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LockStatistics {
    pub total_acquired: u64,
    pub total_released: u64,
    pub total_conflicts: u64,
    pub total_deadlocks: u64,
    pub total_timeouts: u64,
    pub active_locks: usize,
    pub waiting_holders: usize,
}

// ==============================================================================
// Wait-For Graph
// ==============================================================================

/// Directed graph: an edge waiter -> holder means the waiter is blocked on the holder
#[derive(Debug, Default)]
pub struct WaitForGraph {
    edges: HashMap<HolderId, HashSet<HolderId>>,
    reverse_edges: HashMap<HolderId, HashSet<HolderId>>,
}

impl WaitForGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_wait_edge(&mut self, waiter: HolderId, holder: HolderId) {
        self.edges
            .entry(waiter.clone())
            .or_default()
            .insert(holder.clone());
        self.reverse_edges.entry(holder).or_default().insert(waiter);
    }

    pub fn remove_wait_edge(&mut self, waiter: &HolderId, holder: &HolderId) {
        if let Some(holders) = self.edges.get_mut(waiter) {
            holders.remove(holder);
            if holders.is_empty() {
                self.edges.remove(waiter);
            }
        }

        if let Some(waiters) = self.reverse_edges.get_mut(holder) {
            waiters.remove(waiter);
            if waiters.is_empty() {
                self.reverse_edges.remove(holder);
            }
        }
    }

    /// Drop every edge leaving `waiter` (it is no longer blocked)
    pub fn remove_waiter(&mut self, waiter: &HolderId) {
        if let Some(holders) = self.edges.remove(waiter) {
            for holder in holders {
                if let Some(waiters) = self.reverse_edges.get_mut(&holder) {
                    waiters.remove(waiter);
                    if waiters.is_empty() {
                        self.reverse_edges.remove(&holder);
                    }
                }
            }
        }
    }

    /// Drop every edge touching `holder`, in either direction
    pub fn remove_holder(&mut self, holder: &HolderId) {
        self.remove_waiter(holder);

        if let Some(waiters) = self.reverse_edges.remove(holder) {
            for waiter in waiters {
                if let Some(holders) = self.edges.get_mut(&waiter) {
                    holders.remove(holder);
                    if holders.is_empty() {
                        self.edges.remove(&waiter);
                    }
                }
            }
        }
    }

    /// Find any cycle (DFS)
    pub fn detect_cycle(&self) -> Option<Vec<HolderId>> {
        let mut visited = HashSet::new();
        let mut on_stack = HashSet::new();
        let mut path = Vec::new();

        for holder in self.edges.keys() {
            if !visited.contains(holder) {
                if let Some(cycle) = self.dfs(holder, &mut visited, &mut on_stack, &mut path) {
                    return Some(cycle);
                }
            }
        }

        None
    }

    fn dfs(
        &self,
        holder: &HolderId,
        visited: &mut HashSet<HolderId>,
        on_stack: &mut HashSet<HolderId>,
        path: &mut Vec<HolderId>,
    ) -> Option<Vec<HolderId>> {
        visited.insert(holder.clone());
        on_stack.insert(holder.clone());
        path.push(holder.clone());

        if let Some(neighbors) = self.edges.get(holder) {
            for neighbor in neighbors {
                if !visited.contains(neighbor) {
                    if let Some(cycle) = self.dfs(neighbor, visited, on_stack, path) {
                        return Some(cycle);
                    }
                } else if on_stack.contains(neighbor) {
                    if let Some(start) = path.iter().position(|h| h == neighbor) {
                        return Some(path[start..].to_vec());
                    }
                }
            }
        }

        on_stack.remove(holder);
        path.pop();
        None
    }

    /// Shortest wait chain from `source` to `target` (BFS), both ends included
    pub fn find_path(&self, source: &HolderId, target: &HolderId) -> Option<Vec<HolderId>> {
        let mut parents: HashMap<HolderId, HolderId> = HashMap::new();
        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();
        queue.push_back(source.clone());
        visited.insert(source.clone());

        while let Some(current) = queue.pop_front() {
            if &current == target {
                let mut path = vec![current.clone()];
                let mut cursor = current;
                while let Some(parent) = parents.get(&cursor) {
                    path.push(parent.clone());
                    cursor = parent.clone();
                }
                path.reverse();
                return Some(path);
            }

            if let Some(neighbors) = self.edges.get(&current) {
                for neighbor in neighbors {
                    if visited.insert(neighbor.clone()) {
                        parents.insert(neighbor.clone(), current.clone());
                        queue.push_back(neighbor.clone());
                    }
                }
            }
        }

        None
    }

    pub fn has_path(&self, source: &HolderId, target: &HolderId) -> bool {
        self.find_path(source, target).is_some()
    }

    pub fn statistics(&self) -> WaitGraphStatistics {
        WaitGraphStatistics {
            total_edges: self.edges.values().map(|s| s.len()).sum(),
            waiting_holders: self.edges.len(),
            max_wait_depth: self
                .edges
                .keys()
                .map(|h| self.depth(h, &mut HashSet::new()))
                .max()
                .unwrap_or(0),
        }
    }

    fn depth(&self, holder: &HolderId, visited: &mut HashSet<HolderId>) -> usize {
        if !visited.insert(holder.clone()) {
            return 0;
        }

        let deepest = self
            .edges
            .get(holder)
            .and_then(|neighbors| neighbors.iter().map(|n| self.depth(n, visited)).max())
            .unwrap_or(0);

        visited.remove(holder);
        1 + deepest
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaitGraphStatistics {
    pub total_edges: usize,
    pub waiting_holders: usize,
    pub max_wait_depth: usize,
}

// ==============================================================================
// Deadlock Detector
// ==============================================================================

/// A detected wait cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deadlock {
    pub cycle: Vec<HolderId>,
    pub detected_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DeadlockStatistics {
    pub total_detected: u64,
    pub total_resolved: u64,
    pub last_detection: Option<DateTime<Utc>>,
}

/// Wait-for graph plus detection bookkeeping
#[derive(Debug)]
pub struct DeadlockDetector {
    graph: RwLock<WaitForGraph>,
    detection_interval: Duration,
    stats: RwLock<DeadlockStatistics>,
}

impl DeadlockDetector {
    pub fn new(detection_interval: Duration) -> Self {
        Self {
            graph: RwLock::new(WaitForGraph::new()),
            detection_interval,
            stats: RwLock::new(DeadlockStatistics::default()),
        }
    }

    pub fn add_wait(&self, waiter: HolderId, holder: HolderId) {
        self.graph.write().add_wait_edge(waiter, holder);
    }

    pub fn remove_wait(&self, waiter: &HolderId, holder: &HolderId) {
        self.graph.write().remove_wait_edge(waiter, holder);
    }

    pub fn remove_waiter(&self, waiter: &HolderId) {
        self.graph.write().remove_waiter(waiter);
    }

    pub fn remove_holder(&self, holder: &HolderId) {
        self.graph.write().remove_holder(holder);
    }

    /// The cycle `waiter` would close by waiting on `holder`, if any
    fn cycle_through(&self, waiter: &HolderId, holder: &HolderId) -> Option<Vec<HolderId>> {
        let graph = self.graph.read();
        let mut path = graph.find_path(holder, waiter)?;
        // path runs holder .. waiter; rotate so the cycle starts at the waiter
        path.pop();
        path.insert(0, waiter.clone());
        Some(path)
    }

    fn record(&self, cycle: Vec<HolderId>) -> Deadlock {
        let now = Utc::now();
        let mut stats = self.stats.write();
        stats.total_detected += 1;
        stats.last_detection = Some(now);
        info!("Deadlock detected involving {} holders: {:?}", cycle.len(), cycle);
        Deadlock {
            cycle,
            detected_at: now,
        }
    }

    /// Check the whole graph for a cycle
    pub fn check_deadlock(&self) -> Option<Deadlock> {
        let cycle = self.graph.read().detect_cycle()?;
        Some(self.record(cycle))
    }

    /// Abort the last holder of the cycle
    pub fn select_victim(&self, deadlock: &Deadlock) -> Option<HolderId> {
        deadlock.cycle.last().cloned()
    }

    fn mark_resolved(&self) {
        self.stats.write().total_resolved += 1;
    }

    pub fn statistics(&self) -> DeadlockStatistics {
        self.stats.read().clone()
    }

    pub fn graph_statistics(&self) -> WaitGraphStatistics {
        self.graph.read().statistics()
    }

    pub fn detection_interval(&self) -> Duration {
        self.detection_interval
    }
}

// ==============================================================================
// Lock Compatibility
// ==============================================================================

/// Only shared/shared can coexist
pub fn is_compatible(held: LockMode, requested: LockMode) -> bool {
    matches!((held, requested), (LockMode::Shared, LockMode::Shared))
}

/// First lock held by someone else that conflicts with the request
fn find_conflict<'a>(
    existing: &'a [HeldLock],
    requested: LockMode,
    holder: &HolderId,
) -> Option<&'a HeldLock> {
    existing
        .iter()
        .find(|lock| &lock.holder != holder && !is_compatible(lock.mode, requested))
}

// ==============================================================================
// Lock Table State
// ==============================================================================

#[derive(Debug, Default)]
struct TableState {
    locks: DashMap<LockId, HeldLock>,
    by_resource: DashMap<String, HashSet<LockId>>,
    by_holder: DashMap<HolderId, HashSet<LockId>>,
    lock_counter: AtomicU64,
    stats: RwLock<LockStatistics>,
}

impl TableState {
    fn next_lock_id(&self) -> LockId {
        let n = self.lock_counter.fetch_add(1, Ordering::SeqCst);
        format!("lock_{}", n)
    }

    fn insert(&self, lock: HeldLock) {
        self.by_resource
            .entry(lock.resource_id.clone())
            .or_default()
            .insert(lock.lock_id.clone());
        self.by_holder
            .entry(lock.holder.clone())
            .or_default()
            .insert(lock.lock_id.clone());
        self.locks.insert(lock.lock_id.clone(), lock);

        let mut stats = self.stats.write();
        stats.total_acquired += 1;
        stats.active_locks = self.locks.len();
    }

    fn remove(&self, lock_id: &LockId) -> Option<HeldLock> {
        let (_, lock) = self.locks.remove(lock_id)?;

        if let Some(mut ids) = self.by_resource.get_mut(&lock.resource_id) {
            ids.remove(lock_id);
        }
        self.by_resource.remove_if(&lock.resource_id, |_, ids| ids.is_empty());

        if let Some(mut ids) = self.by_holder.get_mut(&lock.holder) {
            ids.remove(lock_id);
        }
        self.by_holder.remove_if(&lock.holder, |_, ids| ids.is_empty());

        let mut stats = self.stats.write();
        stats.total_released += 1;
        stats.active_locks = self.locks.len();

        Some(lock)
    }

    fn collect(&self, ids: Option<HashSet<LockId>>) -> Vec<HeldLock> {
        let mut locks: Vec<HeldLock> = ids
            .unwrap_or_default()
            .iter()
            .filter_map(|id| self.locks.get(id).map(|l| l.clone()))
            .collect();
        locks.sort_by(|a, b| a.acquired_at.cmp(&b.acquired_at));
        locks
    }

    fn resource_locks(&self, resource_id: &str) -> Vec<HeldLock> {
        self.collect(self.by_resource.get(resource_id).map(|ids| ids.clone()))
    }

    fn holder_locks(&self, holder: &HolderId) -> Vec<HeldLock> {
        self.collect(self.by_holder.get(holder).map(|ids| ids.clone()))
    }

    fn expired(&self, now: DateTime<Utc>) -> Vec<HeldLock> {
        self.locks
            .iter()
            .filter(|entry| entry.value().expires_at < now)
            .map(|entry| entry.value().clone())
            .collect()
    }
}

/// Clears a polling holder's wait edges however `acquire` ends, including cancellation
struct WaitRegistration<'a> {
    detector: &'a DeadlockDetector,
    holder: &'a HolderId,
}

impl Drop for WaitRegistration<'_> {
    fn drop(&mut self) {
        self.detector.remove_waiter(self.holder);
    }
}

// ==============================================================================
// Lock Table
// ==============================================================================

/// Resource locks with deadlock detection
#[derive(Debug)]
pub struct LockTable {
    state: TableState,
    detector: DeadlockDetector,
    /// Serializes the conflict check with the insert that depends on it
    admission: Mutex<()>,
    default_lease: Duration,
    poll_interval: Duration,
}

impl LockTable {
    pub fn new(default_lease: Duration, detection_interval: Duration) -> Self {
        Self {
            state: TableState::default(),
            detector: DeadlockDetector::new(detection_interval),
            admission: Mutex::new(()),
            default_lease,
            poll_interval: Duration::from_millis(10),
        }
    }

    /// How often a blocked `acquire` retries
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn detector(&self) -> &DeadlockDetector {
        &self.detector
    }

    /// Try to acquire a lock without waiting
    ///
    /// A `WouldBlock` answer leaves no wait edge behind; only a polling `acquire` is a
    /// waiter as far as deadlock detection is concerned.
    pub fn try_acquire(&self, holder: &HolderId, request: &LockRequest) -> Result<Acquisition> {
        self.admit(holder, request, false)
    }

    /// Like `try_acquire`, but records `holder -> blocker` on `WouldBlock`
    fn try_acquire_waiting(&self, holder: &HolderId, request: &LockRequest) -> Result<Acquisition> {
        self.admit(holder, request, true)
    }

    fn admit(&self, holder: &HolderId, request: &LockRequest, waiting: bool) -> Result<Acquisition> {
        let lease = request.lease.unwrap_or(self.default_lease);
        let lease = ChronoDuration::from_std(lease)
            .map_err(|e| ContendError::invalid_input(format!("Invalid lease: {}", e)))?;

        let _admission = self.admission.lock();
        let existing = self.state.resource_locks(&request.resource_id);

        if let Some(blocking) = find_conflict(&existing, request.mode, holder) {
            self.state.stats.write().total_conflicts += 1;

            if let Some(cycle) = self.detector.cycle_through(holder, &blocking.holder) {
                self.detector.record(cycle.clone());
                self.state.stats.write().total_deadlocks += 1;
                return Ok(Acquisition::Deadlock { cycle });
            }

            if waiting {
                // The blocker may have changed since the last poll
                self.detector.remove_waiter(holder);
                self.detector
                    .add_wait(holder.clone(), blocking.holder.clone());
            }

            return Ok(Acquisition::WouldBlock {
                blocking_lock_id: blocking.lock_id.clone(),
                holder: blocking.holder.clone(),
            });
        }

        let now = Utc::now();
        let lock = HeldLock {
            lock_id: self.state.next_lock_id(),
            resource_id: request.resource_id.clone(),
            mode: request.mode,
            holder: holder.clone(),
            acquired_at: now,
            expires_at: now + lease,
        };

        self.state.insert(lock.clone());
        self.detector.remove_waiter(holder);

        debug!(
            "Lock acquired: {} ({:?}) on {} by {}",
            lock.lock_id, lock.mode, lock.resource_id, holder
        );

        Ok(Acquisition::Acquired(lock))
    }

    /// Acquire a lock, retrying for at most `request.wait`
    ///
    /// # Errors
    ///
    /// `Deadlock` if waiting would close a cycle, `LockTimeout` when the wait runs out.
    /// Both leave the holder's existing locks untouched.
    pub async fn acquire(&self, holder: &HolderId, request: &LockRequest) -> Result<HeldLock> {
        let started = Instant::now();
        let mut attempts = 0;
        let _waiting = WaitRegistration {
            detector: &self.detector,
            holder,
        };

        loop {
            attempts += 1;
            match self.try_acquire_waiting(holder, request)? {
                Acquisition::Acquired(lock) => return Ok(lock),
                Acquisition::Deadlock { cycle } => {
                    return Err(ContendError::deadlock(format!(
                        "waiting for {} would close the cycle {}",
                        request.resource_id,
                        cycle.join(" -> ")
                    )));
                }
                Acquisition::WouldBlock { holder: blocker, .. } => {
                    if started.elapsed() >= request.wait {
                        self.state.stats.write().total_timeouts += 1;
                        warn!(
                            "{} gave up waiting on {} (held by {})",
                            holder, request.resource_id, blocker
                        );
                        return Err(ContendError::lock_timeout(
                            request.resource_id.clone(),
                            started.elapsed(),
                            attempts,
                        ));
                    }

                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }
    }

    pub fn release(&self, lock_id: &LockId) -> Result<()> {
        let lock = self
            .state
            .remove(lock_id)
            .ok_or_else(|| ContendError::not_found("lock", lock_id))?;

        self.detector.remove_holder(&lock.holder);
        debug!(
            "Lock released: {} on {} by {}",
            lock.lock_id, lock.resource_id, lock.holder
        );
        Ok(())
    }

    /// Release every lock `holder` has; returns how many
    pub fn release_holder(&self, holder: &HolderId) -> usize {
        let locks = self.state.holder_locks(holder);
        let count = locks
            .iter()
            .filter(|lock| self.state.remove(&lock.lock_id).is_some())
            .count();

        self.detector.remove_holder(holder);
        info!("Released {} lock(s) held by {}", count, holder);
        count
    }

    pub fn list(&self) -> Vec<HeldLock> {
        let mut locks: Vec<HeldLock> = self
            .state
            .locks
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        locks.sort_by(|a, b| a.acquired_at.cmp(&b.acquired_at));
        locks
    }

    pub fn list_for_holder(&self, holder: &HolderId) -> Vec<HeldLock> {
        self.state.holder_locks(holder)
    }

    pub fn list_for_resource(&self, resource_id: &str) -> Vec<HeldLock> {
        self.state.resource_locks(resource_id)
    }

    pub fn is_locked(&self, resource_id: &str) -> bool {
        !self.state.resource_locks(resource_id).is_empty()
    }

    pub fn get(&self, lock_id: &LockId) -> Result<HeldLock> {
        self.state
            .locks
            .get(lock_id)
            .map(|l| l.clone())
            .ok_or_else(|| ContendError::not_found("lock", lock_id))
    }

    /// Release every lock whose lease ended before `now`
    pub fn cleanup_expired_at(&self, now: DateTime<Utc>) -> usize {
        let mut cleaned = 0;
        for lock in self.state.expired(now) {
            match self.release(&lock.lock_id) {
                Ok(()) => {
                    info!("Expired lock released: {} (expired at {})", lock.lock_id, lock.expires_at);
                    cleaned += 1;
                }
                // Released concurrently
                Err(e) => debug!("Skipping expired lock {}: {}", lock.lock_id, e),
            }
        }
        cleaned
    }

    pub fn cleanup_expired(&self) -> usize {
        self.cleanup_expired_at(Utc::now())
    }

    pub async fn run_cleanup_loop(&self, interval: Duration) {
        info!("Starting lock cleanup loop with interval {:?}", interval);

        loop {
            tokio::time::sleep(interval).await;

            let cleaned = self.cleanup_expired();
            if cleaned > 0 {
                debug!("Cleaned up {} expired lock(s)", cleaned);
            }
        }
    }

    /// One detection pass: find a cycle, abort its victim. Returns the victim.
    pub fn detect_and_resolve(&self) -> Option<HolderId> {
        let deadlock = self.detector.check_deadlock()?;
        let victim = self.detector.select_victim(&deadlock)?;

        warn!(
            "Aborting {} to break the cycle {}",
            victim,
            deadlock.cycle.join(" -> ")
        );
        self.release_holder(&victim);
        self.detector.mark_resolved();
        self.state.stats.write().total_deadlocks += 1;

        Some(victim)
    }

    pub async fn run_detection_loop(&self) {
        let interval = self.detector.detection_interval();
        info!("Starting deadlock detection loop with interval {:?}", interval);

        loop {
            tokio::time::sleep(interval).await;
            self.detect_and_resolve();
        }
    }

    pub fn statistics(&self) -> LockStatistics {
        let mut stats = self.state.stats.read().clone();
        stats.active_locks = self.state.locks.len();
        stats.waiting_holders = self.detector.graph_statistics().waiting_holders;
        stats
    }

    pub fn deadlock_statistics(&self) -> DeadlockStatistics {
        self.detector.statistics()
    }

    pub fn wait_graph_statistics(&self) -> WaitGraphStatistics {
        self.detector.graph_statistics()
    }
}
