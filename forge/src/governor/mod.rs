//! # Resource governor: bounded concurrency over agent calls
//!
//! A counting semaphore caps concurrent agent invocations at
//! `max_concurrent` (config `[agent_resources]`, default 5). Acquire never
//! rejects — callers wait. Every acquire hands back a [`Lease`] that
//! releases the slot on drop, so the slot is returned on every exit path,
//! normal or panicking. [`ResourceGovernor::cleanup_oldest`] exists for
//! operational recovery only: it force-releases the earliest outstanding
//! lease and logs a warning.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use chrono::{DateTime, Utc};
use once_cell::sync::OnceCell;
use serde::Serialize;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::logfab::{LogEvent, LogManager, LogSource};

/// One outstanding usage. Exists only while its lease is held.
#[derive(Clone, Debug)]
pub struct AgentUsage {
    pub agent_name: String,
    pub started_at: DateTime<Utc>,
    pub task_id: Option<String>,
    started: Instant,
}

/// Point-in-time view of one active usage.
#[derive(Clone, Debug, Serialize)]
pub struct UsageSnapshot {
    pub agent_name: String,
    pub task_id: Option<String>,
    pub duration_seconds: f64,
}

/// Governor statistics for monitoring endpoints and tests.
#[derive(Clone, Debug, Serialize)]
pub struct GovernorStats {
    pub max_concurrent: usize,
    pub active_agents: usize,
    pub available_slots: usize,
    pub total_acquired: u64,
    pub total_released: u64,
    pub active_usage: Vec<UsageSnapshot>,
}

struct Inner {
    max_concurrent: usize,
    semaphore: Arc<Semaphore>,
    active: Mutex<BTreeMap<u64, AgentUsage>>,
    next_key: AtomicU64,
    total_acquired: AtomicU64,
    total_released: AtomicU64,
    logs: Arc<LogManager>,
}

impl Inner {
    /// Removes the usage record; true when it still existed (i.e. the lease
    /// was not force-released earlier).
    fn finish(&self, key: u64) -> bool {
        let removed = self.active.lock().expect("governor lock poisoned").remove(&key);
        match removed {
            Some(usage) => {
                self.total_released.fetch_add(1, Ordering::SeqCst);
                self.logs.emit(
                    LogEvent::debug(format!(
                        "agent '{}' slot released after {:.2}s",
                        usage.agent_name,
                        usage.started.elapsed().as_secs_f64()
                    ))
                    .source(LogSource::Infrastructure),
                );
                true
            }
            None => false,
        }
    }
}

/// Shared, clonable governor handle.
#[derive(Clone)]
pub struct ResourceGovernor {
    inner: Arc<Inner>,
}

impl ResourceGovernor {
    pub fn new(max_concurrent: usize, logs: Arc<LogManager>) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            inner: Arc::new(Inner {
                max_concurrent,
                semaphore: Arc::new(Semaphore::new(max_concurrent)),
                active: Mutex::new(BTreeMap::new()),
                next_key: AtomicU64::new(1),
                total_acquired: AtomicU64::new(0),
                total_released: AtomicU64::new(0),
                logs,
            }),
        }
    }

    /// Process-wide default (5 slots). The composition root normally builds
    /// its own from config; lazy init for contexts that have none.
    pub fn global() -> ResourceGovernor {
        static GLOBAL: OnceCell<ResourceGovernor> = OnceCell::new();
        GLOBAL
            .get_or_init(|| ResourceGovernor::new(5, LogManager::global()))
            .clone()
    }

    /// Waits for a free slot and records the usage. Never fails: the
    /// semaphore is never closed while the governor is alive.
    pub async fn acquire(&self, agent_name: &str, task_id: Option<&str>) -> Lease {
        let permit = Arc::clone(&self.inner.semaphore)
            .acquire_owned()
            .await
            .expect("governor semaphore closed");
        let key = self.inner.next_key.fetch_add(1, Ordering::SeqCst);
        self.inner.total_acquired.fetch_add(1, Ordering::SeqCst);
        let usage = AgentUsage {
            agent_name: agent_name.to_string(),
            started_at: Utc::now(),
            task_id: task_id.map(str::to_string),
            started: Instant::now(),
        };
        {
            let mut active = self.inner.active.lock().expect("governor lock poisoned");
            active.insert(key, usage);
            self.inner.logs.emit(
                LogEvent::debug(format!(
                    "agent '{}' slot acquired ({}/{} active)",
                    agent_name,
                    active.len(),
                    self.inner.max_concurrent
                ))
                .source(LogSource::Infrastructure),
            );
        }
        Lease {
            inner: Arc::clone(&self.inner),
            key,
            permit: Some(permit),
        }
    }

    pub fn stats(&self) -> GovernorStats {
        let active = self.inner.active.lock().expect("governor lock poisoned");
        GovernorStats {
            max_concurrent: self.inner.max_concurrent,
            active_agents: active.len(),
            available_slots: self.inner.max_concurrent.saturating_sub(active.len()),
            total_acquired: self.inner.total_acquired.load(Ordering::SeqCst),
            total_released: self.inner.total_released.load(Ordering::SeqCst),
            active_usage: active
                .values()
                .map(|u| UsageSnapshot {
                    agent_name: u.agent_name.clone(),
                    task_id: u.task_id.clone(),
                    duration_seconds: u.started.elapsed().as_secs_f64(),
                })
                .collect(),
        }
    }

    /// Force-releases the earliest outstanding lease. Operational recovery
    /// only; the abandoned lease's later drop is a no-op.
    pub fn cleanup_oldest(&self) {
        let oldest = {
            let mut active = self.inner.active.lock().expect("governor lock poisoned");
            let key = match active.keys().next().copied() {
                Some(key) => key,
                None => return,
            };
            active.remove(&key)
        };
        if let Some(usage) = oldest {
            self.inner.total_released.fetch_add(1, Ordering::SeqCst);
            self.inner.semaphore.add_permits(1);
            self.inner.logs.emit(
                LogEvent::warning(format!(
                    "force-released slot held by agent '{}'",
                    usage.agent_name
                ))
                .source(LogSource::Infrastructure),
            );
        }
    }
}

/// Scoped slot. Dropping it returns the slot; if the governor already
/// force-released this usage, the held permit is forgotten instead so the
/// slot is not double-counted.
pub struct Lease {
    inner: Arc<Inner>,
    key: u64,
    permit: Option<OwnedSemaphorePermit>,
}

impl Drop for Lease {
    fn drop(&mut self) {
        let existed = self.inner.finish(self.key);
        if let Some(permit) = self.permit.take() {
            if existed {
                drop(permit);
            } else {
                permit.forget();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn quiet_logs() -> Arc<LogManager> {
        Arc::new(LogManager::new(crate::logfab::LogFabricConfig {
            enable_console: false,
            enable_file: false,
            ..Default::default()
        }))
    }

    #[tokio::test]
    async fn acquire_and_release_balance() {
        let governor = ResourceGovernor::new(2, quiet_logs());
        {
            let _a = governor.acquire("planner", Some("t1")).await;
            let _b = governor.acquire("coder", Some("t1")).await;
            let stats = governor.stats();
            assert_eq!(stats.active_agents, 2);
            assert_eq!(stats.available_slots, 0);
        }
        let stats = governor.stats();
        assert_eq!(stats.active_agents, 0);
        assert_eq!(stats.total_acquired, 2);
        assert_eq!(stats.total_released, 2);
    }

    #[tokio::test]
    async fn acquire_blocks_when_full() {
        let governor = ResourceGovernor::new(1, quiet_logs());
        let held = governor.acquire("a", None).await;
        let second = {
            let governor = governor.clone();
            tokio::spawn(async move {
                let _lease = governor.acquire("b", None).await;
            })
        };
        // The second acquire cannot finish while the first lease is held.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!second.is_finished());
        drop(held);
        tokio::time::timeout(Duration::from_secs(1), second)
            .await
            .expect("second acquire should proceed after release")
            .unwrap();
    }

    #[tokio::test]
    async fn active_never_exceeds_max() {
        let governor = ResourceGovernor::new(2, quiet_logs());
        let mut handles = Vec::new();
        for i in 0..5 {
            let governor = governor.clone();
            handles.push(tokio::spawn(async move {
                let _lease = governor.acquire(&format!("agent-{}", i), None).await;
                tokio::time::sleep(Duration::from_millis(10)).await;
            }));
        }
        for _ in 0..20 {
            assert!(governor.stats().active_agents <= 2);
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        for handle in handles {
            handle.await.unwrap();
        }
        let stats = governor.stats();
        assert_eq!(stats.total_acquired, 5);
        assert_eq!(stats.total_released, 5);
        assert_eq!(stats.active_agents, 0);
    }

    #[tokio::test]
    async fn cleanup_oldest_force_releases_earliest() {
        let governor = ResourceGovernor::new(1, quiet_logs());
        let stuck = governor.acquire("stuck", None).await;
        governor.cleanup_oldest();
        assert_eq!(governor.stats().active_agents, 0);

        // Slot is usable again even while the stale lease is still alive.
        let fresh =
            tokio::time::timeout(Duration::from_secs(1), governor.acquire("fresh", None))
                .await
                .expect("slot should be available after cleanup");
        drop(fresh);
        drop(stuck);
        let stats = governor.stats();
        // Force release + normal release of `fresh`; the stale lease's drop
        // must not release a third time.
        assert_eq!(stats.total_acquired, 2);
        assert_eq!(stats.total_released, 2);
        assert_eq!(stats.available_slots, 1);
    }

    #[tokio::test]
    async fn stats_expose_active_usage() {
        let governor = ResourceGovernor::new(3, quiet_logs());
        let _lease = governor.acquire("researcher", Some("task-7")).await;
        let stats = governor.stats();
        assert_eq!(stats.active_usage.len(), 1);
        assert_eq!(stats.active_usage[0].agent_name, "researcher");
        assert_eq!(stats.active_usage[0].task_id.as_deref(), Some("task-7"));
    }
}
