use crate::alerts::AlertEvent;
use crate::reading::SensorReading;

/// Component lifecycle states
#[derive(Debug, Clone, PartialEq)]
pub enum ComponentState {
    Stopped,
    Starting,
    Running,
    Stopping,
    Failed,
}

/// System shutdown reason
#[derive(Debug, Clone, PartialEq)]
pub enum ShutdownReason {
    Signal(String),
    Error(String),
    UserRequest,
    /// The configured `run_for_seconds` elapsed
    RunLimit,
}

/// Result of a single sampling and evaluation pass (used by `--dry-run`)
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub reading: SensorReading,
    pub registered: bool,
    pub uploaded: bool,
    pub alerts: Vec<(AlertEvent, bool)>,
}

impl CycleReport {
    pub fn is_healthy(&self) -> bool {
        self.registered && self.uploaded && self.alerts.iter().all(|(_, delivered)| *delivered)
    }
}
