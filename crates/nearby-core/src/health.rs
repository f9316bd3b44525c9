//! Component health for the proximity service.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Tracked service components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Component {
    RecordStore,
    ChangeLog,
    SpatialIndex,
    HotZones,
    IndexSync,
}

impl Component {
    pub const ALL: [Component; 5] = [
        Component::RecordStore,
        Component::ChangeLog,
        Component::SpatialIndex,
        Component::HotZones,
        Component::IndexSync,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Component::RecordStore => "record_store",
            Component::ChangeLog => "change_log",
            Component::SpatialIndex => "spatial_index",
            Component::HotZones => "hot_zones",
            Component::IndexSync => "index_sync",
        }
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Last observed state of one component; the string is the operator-facing reason.
#[derive(Debug, Clone, PartialEq)]
pub enum ComponentStatus {
    Healthy,
    /// Serving, but with stale or partial data
    Degraded(String),
    /// Not serving
    Unhealthy(String),
    /// Registered, not yet probed
    Unknown,
}

impl ComponentStatus {
    pub fn label(&self) -> &'static str {
        match self {
            ComponentStatus::Healthy => "healthy",
            ComponentStatus::Degraded(_) => "degraded",
            ComponentStatus::Unhealthy(_) => "unhealthy",
            ComponentStatus::Unknown => "unknown",
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            ComponentStatus::Degraded(reason) | ComponentStatus::Unhealthy(reason) => {
                Some(reason.as_str())
            }
            _ => None,
        }
    }
}

/// Service-wide verdict, the worst status across components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Unhealthy => "unhealthy",
        }
    }
}

/// Component registry shared by the scheduler, the service and `/health`.
///
/// `Unknown` components do not pull the verdict down, so a freshly built
/// service reports healthy until a probe says otherwise.
pub struct HealthCheck {
    components: RwLock<HashMap<Component, ComponentStatus>>,
    started_at: Instant,
    sync_loop_running: AtomicBool,
}

impl HealthCheck {
    pub fn new() -> Self {
        Self {
            components: RwLock::new(HashMap::new()),
            started_at: Instant::now(),
            sync_loop_running: AtomicBool::new(false),
        }
    }

    /// Start tracking `component` as `Unknown`.
    pub fn register_component(&self, component: Component) {
        self.set(component, ComponentStatus::Unknown);
    }

    pub fn mark_healthy(&self, component: Component) {
        self.set(component, ComponentStatus::Healthy);
    }

    pub fn mark_degraded(&self, component: Component, reason: &str) {
        self.set(component, ComponentStatus::Degraded(reason.to_string()));
    }

    pub fn mark_unhealthy(&self, component: Component, reason: &str) {
        self.set(component, ComponentStatus::Unhealthy(reason.to_string()));
    }

    fn set(&self, component: Component, status: ComponentStatus) {
        self.components.write().insert(component, status);
    }

    pub fn get_component_status(&self, component: Component) -> Option<ComponentStatus> {
        self.components.read().get(&component).cloned()
    }

    pub fn get_all_statuses(&self) -> HashMap<Component, ComponentStatus> {
        self.components.read().clone()
    }

    pub fn overall_status(&self) -> HealthStatus {
        self.components
            .read()
            .values()
            .map(|status| match status {
                ComponentStatus::Unhealthy(_) => HealthStatus::Unhealthy,
                ComponentStatus::Degraded(_) => HealthStatus::Degraded,
                ComponentStatus::Healthy | ComponentStatus::Unknown => HealthStatus::Healthy,
            })
            .max()
            .unwrap_or(HealthStatus::Healthy)
    }

    /// True unless some component is unhealthy; degraded still serves searches.
    pub fn is_operational(&self) -> bool {
        self.overall_status() != HealthStatus::Unhealthy
    }

    pub fn sync_loop_started(&self) {
        self.sync_loop_running.store(true, Ordering::Release);
    }

    pub fn sync_loop_stopped(&self) {
        self.sync_loop_running.store(false, Ordering::Release);
    }

    /// Whether the background index-sync loop is running.
    pub fn is_sync_loop_running(&self) -> bool {
        self.sync_loop_running.load(Ordering::Acquire)
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }
}

impl Default for HealthCheck {
    fn default() -> Self {
        Self::new()
    }
}
