use crate::config::ScheduleConfig;
use crate::device::DeviceStatus;
use crate::reading::SensorReading;
use crate::thresholds::ThresholdSet;

/// Fixed-interval trigger on the monotonic clock.
///
/// Firing records the loop-iteration start time passed in, not the time the
/// task finished, so a slow task does not push its own schedule back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntervalTimer {
    interval_ms: u64,
    last_fired_ms: Option<u64>,
}

impl IntervalTimer {
    /// Timer that is due on the first check
    pub fn new(interval_ms: u64) -> Self {
        Self {
            interval_ms,
            last_fired_ms: None,
        }
    }

    /// Timer whose first firing is one interval after `start_ms`
    pub fn starting_at(interval_ms: u64, start_ms: u64) -> Self {
        Self {
            interval_ms,
            last_fired_ms: Some(start_ms),
        }
    }

    pub fn interval_ms(&self) -> u64 {
        self.interval_ms
    }

    pub fn is_due(&self, now_ms: u64) -> bool {
        match self.last_fired_ms {
            Some(last) => now_ms.saturating_sub(last) >= self.interval_ms,
            None => true,
        }
    }

    /// Returns true and re-arms the timer if it is due at `now_ms`
    pub fn fire(&mut self, now_ms: u64) -> bool {
        if self.is_due(now_ms) {
            self.last_fired_ms = Some(now_ms);
            true
        } else {
            false
        }
    }
}

/// The scheduler's named timers
#[derive(Debug, Clone)]
pub struct TaskTimers {
    pub sample: IntervalTimer,
    pub upload: IntervalTimer,
    pub liveness: IntervalTimer,
    pub assignment: IntervalTimer,
    pub report: IntervalTimer,
}

impl TaskTimers {
    /// Sampling and upload run on the first iteration; the remote
    /// bookkeeping tasks wait one interval since registration just ran.
    pub fn new(schedule: &ScheduleConfig, start_ms: u64) -> Self {
        Self {
            sample: IntervalTimer::new(schedule.sample_interval_ms),
            upload: IntervalTimer::new(schedule.upload_interval_ms),
            liveness: IntervalTimer::starting_at(schedule.liveness_interval_ms, start_ms),
            assignment: IntervalTimer::starting_at(schedule.assignment_interval_ms, start_ms),
            report: IntervalTimer::starting_at(schedule.report_interval_ms, start_ms),
        }
    }
}

/// Everything the scheduler loop owns between iterations
#[derive(Debug, Clone)]
pub struct SchedulerContext {
    pub timers: TaskTimers,
    pub reading: SensorReading,
    pub thresholds: ThresholdSet,
    pub device_status: Option<DeviceStatus>,
    pub remote_available: bool,
    pub network_connected: bool,
    pub started_at_ms: u64,
}

impl SchedulerContext {
    pub fn new(schedule: &ScheduleConfig, thresholds: ThresholdSet, start_ms: u64) -> Self {
        Self {
            timers: TaskTimers::new(schedule, start_ms),
            reading: SensorReading::default(),
            thresholds,
            device_status: None,
            remote_available: false,
            network_connected: false,
            started_at_ms: start_ms,
        }
    }

    /// Record remote reachability; true when it changed
    pub fn set_remote_available(&mut self, available: bool) -> bool {
        let changed = self.remote_available != available;
        self.remote_available = available;
        changed
    }

    /// Record network link state; true when it changed
    pub fn set_network_connected(&mut self, connected: bool) -> bool {
        let changed = self.network_connected != connected;
        self.network_connected = connected;
        changed
    }

    pub fn uptime_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.started_at_ms)
    }
}
