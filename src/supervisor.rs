// =============================================================================
// Supervisor — explicit lifecycle and health aggregation for subsystems
// =============================================================================
//
// The teacher's `main.rs` spawns one `tokio::spawn` per subsystem and never
// looks at them again — a panicked task just silently stops updating state.
// `Supervisor` keeps a handle and a named health status per subsystem so
// shutdown can wait for every task to actually finish (graceful, draining)
// instead of dropping the runtime out from under them, and so the dashboard
// can show which subsystem, if any, has gone quiet.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SubsystemHealth {
    Starting,
    Running,
    Paused,
    Stopped,
    Crashed,
}

struct Registered {
    health: SubsystemHealth,
    last_heartbeat: Instant,
    handle: Option<JoinHandle<()>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubsystemStatus {
    pub name: String,
    pub health: SubsystemHealth,
    pub last_heartbeat_age_ms: u64,
}

/// Tracks every long-running task the engine spawns and exposes a single
/// health rollup plus a graceful-shutdown join.
pub struct Supervisor {
    subsystems: RwLock<HashMap<String, Registered>>,
}

impl Supervisor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            subsystems: RwLock::new(HashMap::new()),
        })
    }

    /// Register a subsystem's task handle under `name`. Call once per
    /// `tokio::spawn` at startup.
    pub fn register(&self, name: impl Into<String>, handle: JoinHandle<()>) {
        let name = name.into();
        self.subsystems.write().insert(
            name.clone(),
            Registered {
                health: SubsystemHealth::Starting,
                last_heartbeat: Instant::now(),
                handle: Some(handle),
            },
        );
        info!(subsystem = %name, "subsystem registered");
    }

    /// Subsystems call this periodically from inside their own loop to prove
    /// liveness; a subsystem that stops heartbeating without crashing (stuck
    /// in a long await, for instance) is indistinguishable from dead after
    /// its staleness window passes.
    pub fn heartbeat(&self, name: &str) {
        let mut subsystems = self.subsystems.write();
        if let Some(entry) = subsystems.get_mut(name) {
            entry.last_heartbeat = Instant::now();
            if entry.health == SubsystemHealth::Starting {
                entry.health = SubsystemHealth::Running;
            }
        }
    }

    pub fn set_health(&self, name: &str, health: SubsystemHealth) {
        if let Some(entry) = self.subsystems.write().get_mut(name) {
            entry.health = health;
        }
    }

    /// Health rollup for the dashboard: a stale heartbeat (no update within
    /// `stale_after`) is reported as crashed even if the task hasn't
    /// panicked, since an unresponsive loop is operationally the same thing.
    pub fn status(&self, stale_after: Duration) -> Vec<SubsystemStatus> {
        let subsystems = self.subsystems.read();
        subsystems
            .iter()
            .map(|(name, entry)| {
                let age = entry.last_heartbeat.elapsed();
                let health = if entry.health == SubsystemHealth::Running && age > stale_after {
                    SubsystemHealth::Crashed
                } else {
                    entry.health
                };
                SubsystemStatus {
                    name: name.clone(),
                    health,
                    last_heartbeat_age_ms: age.as_millis() as u64,
                }
            })
            .collect()
    }

    pub fn is_healthy(&self, stale_after: Duration) -> bool {
        self.status(stale_after)
            .iter()
            .all(|s| matches!(s.health, SubsystemHealth::Running | SubsystemHealth::Starting | SubsystemHealth::Paused))
    }

    /// Abort every registered task and wait briefly for them to unwind.
    /// Called once, from the Ctrl+C handler, after state has been persisted.
    pub async fn shutdown(&self, drain_timeout: Duration) {
        let handles: Vec<(String, JoinHandle<()>)> = {
            let mut subsystems = self.subsystems.write();
            subsystems
                .iter_mut()
                .filter_map(|(name, entry)| entry.handle.take().map(|h| (name.clone(), h)))
                .collect()
        };

        for (name, handle) in handles {
            handle.abort();
            match tokio::time::timeout(drain_timeout, handle).await {
                Ok(Ok(())) => info!(subsystem = %name, "subsystem drained cleanly"),
                Ok(Err(e)) if e.is_cancelled() => info!(subsystem = %name, "subsystem aborted"),
                Ok(Err(e)) => warn!(subsystem = %name, error = %e, "subsystem task panicked"),
                Err(_) => warn!(subsystem = %name, "subsystem did not drain within timeout"),
            }
            self.set_health(&name, SubsystemHealth::Stopped);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn heartbeat_promotes_starting_to_running() {
        let sup = Supervisor::new();
        sup.register("screener", tokio::spawn(async {}));
        sup.heartbeat("screener");
        let status = sup.status(Duration::from_secs(60));
        assert_eq!(status[0].health, SubsystemHealth::Running);
    }

    #[tokio::test]
    async fn stale_heartbeat_reports_crashed() {
        let sup = Supervisor::new();
        sup.register("screener", tokio::spawn(async {}));
        sup.heartbeat("screener");
        let status = sup.status(Duration::from_millis(0));
        assert_eq!(status[0].health, SubsystemHealth::Crashed);
    }

    #[tokio::test]
    async fn shutdown_stops_all_subsystems() {
        let sup = Supervisor::new();
        sup.register(
            "worker",
            tokio::spawn(async {
                tokio::time::sleep(Duration::from_secs(60)).await;
            }),
        );
        sup.shutdown(Duration::from_millis(100)).await;
        assert_eq!(sup.status(Duration::from_secs(60))[0].health, SubsystemHealth::Stopped);
    }
}
