use crate::alerts::AlertEvent;
use crate::classifier::Orientation;
use crate::device::DeviceStatus;
use crate::error::EventBusError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::SystemTime;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Events that can occur in the parcel monitor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ParcelEvent {
    /// Sensors were sampled and classified
    ReadingSampled {
        temperature: Option<f32>,
        humidity: Option<f32>,
        climate_valid: bool,
        orientation: Orientation,
        vibration: bool,
        timestamp: SystemTime,
    },
    /// An alert passed the resend gate and was handed to the remote store
    AlertRaised { alert: AlertEvent, delivered: bool },
    /// A telemetry upload cycle finished
    UploadCompleted { success: bool, timestamp: SystemTime },
    /// The remote store went from reachable to unreachable or back
    RemoteAvailabilityChanged {
        reachable: bool,
        timestamp: SystemTime,
    },
    /// The back end assigned or released this device
    DeviceStatusChanged {
        status: DeviceStatus,
        timestamp: SystemTime,
    },
    /// Network link came up or went down
    NetworkStatusChanged {
        connected: bool,
        timestamp: SystemTime,
    },
    /// Simulation scenario switched
    ScenarioChanged {
        scenario: String,
        timestamp: SystemTime,
    },
    /// A system error occurred in a component
    SystemError { component: String, error: String },
    /// System shutdown requested
    ShutdownRequested {
        timestamp: SystemTime,
        reason: String,
    },
}

impl ParcelEvent {
    /// Get the timestamp of the event
    pub fn timestamp(&self) -> SystemTime {
        match self {
            ParcelEvent::ReadingSampled { timestamp, .. } => *timestamp,
            ParcelEvent::UploadCompleted { timestamp, .. } => *timestamp,
            ParcelEvent::RemoteAvailabilityChanged { timestamp, .. } => *timestamp,
            ParcelEvent::DeviceStatusChanged { timestamp, .. } => *timestamp,
            ParcelEvent::NetworkStatusChanged { timestamp, .. } => *timestamp,
            ParcelEvent::ScenarioChanged { timestamp, .. } => *timestamp,
            ParcelEvent::ShutdownRequested { timestamp, .. } => *timestamp,
            ParcelEvent::AlertRaised { .. } | ParcelEvent::SystemError { .. } => {
                SystemTime::now()
            }
        }
    }

    /// Get a human-readable description of the event
    pub fn description(&self) -> String {
        match self {
            ParcelEvent::ReadingSampled {
                temperature,
                humidity,
                climate_valid,
                orientation,
                vibration,
                ..
            } => {
                let climate = match (climate_valid, temperature, humidity) {
                    (true, Some(t), Some(h)) => format!("{:.1}°C {:.1}%", t, h),
                    _ => "climate invalid".to_string(),
                };
                format!(
                    "Reading: {}, {}{}",
                    climate,
                    orientation,
                    if *vibration { ", vibrating" } else { "" }
                )
            }
            ParcelEvent::AlertRaised { alert, delivered } => {
                format!(
                    "{} alert ({:?}): {}{}",
                    alert.kind,
                    alert.severity,
                    alert.message,
                    if *delivered { "" } else { " [undelivered]" }
                )
            }
            ParcelEvent::UploadCompleted { success, .. } => {
                format!("Upload {}", if *success { "succeeded" } else { "failed" })
            }
            ParcelEvent::RemoteAvailabilityChanged { reachable, .. } => {
                format!(
                    "Remote store {}",
                    if *reachable { "reachable" } else { "unreachable" }
                )
            }
            ParcelEvent::DeviceStatusChanged { status, .. } => {
                format!("Device status: {}", status)
            }
            ParcelEvent::NetworkStatusChanged { connected, .. } => {
                format!(
                    "Network {}",
                    if *connected { "connected" } else { "disconnected" }
                )
            }
            ParcelEvent::ScenarioChanged { scenario, .. } => {
                format!("Scenario switched to {}", scenario)
            }
            ParcelEvent::SystemError { component, error } => {
                format!("Error in {}: {}", component, error)
            }
            ParcelEvent::ShutdownRequested { reason, .. } => {
                format!("Shutdown requested: {}", reason)
            }
        }
    }

    /// Get the event type as a string for filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            ParcelEvent::ReadingSampled { .. } => "reading_sampled",
            ParcelEvent::AlertRaised { .. } => "alert_raised",
            ParcelEvent::UploadCompleted { .. } => "upload_completed",
            ParcelEvent::RemoteAvailabilityChanged { .. } => "remote_availability_changed",
            ParcelEvent::DeviceStatusChanged { .. } => "device_status_changed",
            ParcelEvent::NetworkStatusChanged { .. } => "network_status_changed",
            ParcelEvent::ScenarioChanged { .. } => "scenario_changed",
            ParcelEvent::SystemError { .. } => "system_error",
            ParcelEvent::ShutdownRequested { .. } => "shutdown_requested",
        }
    }
}

/// Async event bus for component coordination using broadcast channels
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ParcelEvent>,
}

impl EventBus {
    /// Create a new event bus with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to events and get a receiver
    pub fn subscribe(&self) -> broadcast::Receiver<ParcelEvent> {
        self.sender.subscribe()
    }

    /// Publish an event to all subscribers.
    ///
    /// Returns the number of receivers; publishing with nobody listening is
    /// not an error for a monitor that may run headless.
    pub async fn publish(&self, event: ParcelEvent) -> Result<usize, EventBusError> {
        match &event {
            ParcelEvent::AlertRaised { alert, .. } => {
                warn!("Alert: {} ({})", alert.message, alert.kind);
            }
            ParcelEvent::SystemError { component, error } => {
                error!("System error in {}: {}", component, error);
            }
            ParcelEvent::RemoteAvailabilityChanged { reachable, .. } => {
                if *reachable {
                    info!("Remote store reachable");
                } else {
                    warn!("Remote store unreachable");
                }
            }
            ParcelEvent::DeviceStatusChanged { status, .. } => {
                info!("Device status: {}", status);
            }
            ParcelEvent::ShutdownRequested { reason, .. } => {
                info!("Shutdown requested: {}", reason);
            }
            _ => debug!("Event: {}", event.description()),
        }

        if self.sender.receiver_count() == 0 {
            return Ok(0);
        }

        self.sender
            .send(event)
            .map_err(|e| EventBusError::PublishFailed {
                details: e.to_string(),
            })
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Check if there are any active subscribers
    pub fn has_subscribers(&self) -> bool {
        self.sender.receiver_count() > 0
    }
}

/// Accepts events whose [`ParcelEvent::event_type`] is listed
#[derive(Debug, Clone)]
pub struct EventFilter {
    event_types: Vec<&'static str>,
}

impl EventFilter {
    pub fn event_types(event_types: Vec<&'static str>) -> Self {
        Self { event_types }
    }

    /// Check if an event passes this filter
    pub fn matches(&self, event: &ParcelEvent) -> bool {
        self.event_types.contains(&event.event_type())
    }
}

/// Event receiver with filtering
pub struct EventReceiver {
    receiver: broadcast::Receiver<ParcelEvent>,
    filter: EventFilter,
    name: String,
}

impl EventReceiver {
    /// Create a new event receiver with a filter
    pub fn new(receiver: broadcast::Receiver<ParcelEvent>, filter: EventFilter, name: String) -> Self {
        Self {
            receiver,
            filter,
            name,
        }
    }

    /// Try to receive an event without blocking
    pub fn try_recv(&mut self) -> Result<Option<ParcelEvent>, EventBusError> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.filter.matches(&event) {
                        return Ok(Some(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => {
                    return Ok(None);
                }
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    warn!("Receiver '{}' lagged behind by {} events", self.name, n);
                    return Err(EventBusError::Lagged { skipped: n });
                }
                Err(broadcast::error::TryRecvError::Closed) => {
                    return Err(EventBusError::ChannelClosed);
                }
            }
        }
    }
}

/// Running counters over the event stream, used by the health report
#[derive(Debug, Default, Clone)]
pub struct EventMetrics {
    pub total_events: u64,
    pub events_by_type: HashMap<&'static str, u64>,
    pub alerts_raised: u64,
    pub alerts_undelivered: u64,
    pub uploads_ok: u64,
    pub uploads_failed: u64,
    pub last_event_time: Option<SystemTime>,
}

impl EventMetrics {
    pub fn record_event(&mut self, event: &ParcelEvent) {
        self.total_events += 1;
        *self.events_by_type.entry(event.event_type()).or_insert(0) += 1;
        self.last_event_time = Some(event.timestamp());

        match event {
            ParcelEvent::AlertRaised { delivered, .. } => {
                self.alerts_raised += 1;
                if !delivered {
                    self.alerts_undelivered += 1;
                }
            }
            ParcelEvent::UploadCompleted { success, .. } => {
                if *success {
                    self.uploads_ok += 1;
                } else {
                    self.uploads_failed += 1;
                }
            }
            _ => {}
        }
    }

    pub fn count(&self, event_type: &str) -> u64 {
        self.events_by_type.get(event_type).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::{AlertKind, AlertValue, Severity};
    use tokio::time::{timeout, Duration};

    fn sample_alert() -> AlertEvent {
        AlertEvent {
            kind: AlertKind::Temperature,
            severity: Severity::Critical,
            message: "Temperature exceeded maximum".to_string(),
            value: AlertValue::Number(45.0),
            threshold: Some(40.0),
            timestamp: 1_700_000_000_000,
            resolved: false,
        }
    }

    #[tokio::test]
    async fn test_event_bus_basic_operations() {
        let event_bus = EventBus::new(10);
        let mut receiver = event_bus.subscribe();

        let subscriber_count = event_bus
            .publish(ParcelEvent::AlertRaised {
                alert: sample_alert(),
                delivered: true,
            })
            .await
            .unwrap();
        assert_eq!(subscriber_count, 1);

        match receiver.recv().await.unwrap() {
            ParcelEvent::AlertRaised { alert, delivered } => {
                assert_eq!(alert.kind, AlertKind::Temperature);
                assert!(delivered);
            }
            _ => panic!("Unexpected event type"),
        }
    }

    #[tokio::test]
    async fn test_publish_without_subscribers() {
        let event_bus = EventBus::new(10);
        let count = event_bus
            .publish(ParcelEvent::UploadCompleted {
                success: true,
                timestamp: SystemTime::now(),
            })
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let event_bus = EventBus::new(10);
        let mut receiver1 = event_bus.subscribe();
        let mut receiver2 = event_bus.subscribe();

        assert_eq!(event_bus.subscriber_count(), 2);

        event_bus
            .publish(ParcelEvent::NetworkStatusChanged {
                connected: false,
                timestamp: SystemTime::now(),
            })
            .await
            .unwrap();

        let _ = timeout(Duration::from_millis(100), receiver1.recv())
            .await
            .unwrap()
            .unwrap();
        let _ = timeout(Duration::from_millis(100), receiver2.recv())
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_filtered_receiver() {
        let event_bus = EventBus::new(10);
        let receiver = event_bus.subscribe();
        let filter = EventFilter::event_types(vec!["device_status_changed"]);
        let mut filtered_receiver = EventReceiver::new(receiver, filter, "test".to_string());

        event_bus
            .publish(ParcelEvent::UploadCompleted {
                success: true,
                timestamp: SystemTime::now(),
            })
            .await
            .unwrap();
        event_bus
            .publish(ParcelEvent::DeviceStatusChanged {
                status: DeviceStatus::Assigned,
                timestamp: SystemTime::now(),
            })
            .await
            .unwrap();

        let received = filtered_receiver.try_recv().unwrap();
        assert!(matches!(
            received,
            Some(ParcelEvent::DeviceStatusChanged {
                status: DeviceStatus::Assigned,
                ..
            })
        ));
        assert!(filtered_receiver.try_recv().unwrap().is_none());
    }

    #[test]
    fn test_metrics_counts_alerts_and_uploads() {
        let mut metrics = EventMetrics::default();
        metrics.record_event(&ParcelEvent::AlertRaised {
            alert: sample_alert(),
            delivered: false,
        });
        metrics.record_event(&ParcelEvent::UploadCompleted {
            success: true,
            timestamp: SystemTime::now(),
        });
        metrics.record_event(&ParcelEvent::UploadCompleted {
            success: false,
            timestamp: SystemTime::now(),
        });

        assert_eq!(metrics.total_events, 3);
        assert_eq!(metrics.alerts_raised, 1);
        assert_eq!(metrics.alerts_undelivered, 1);
        assert_eq!(metrics.uploads_ok, 1);
        assert_eq!(metrics.uploads_failed, 1);
        assert_eq!(metrics.count("upload_completed"), 2);
        assert!(metrics.last_event_time.is_some());
    }

    #[test]
    fn test_event_properties() {
        let event = ParcelEvent::ShutdownRequested {
            timestamp: SystemTime::now(),
            reason: "keyboard".to_string(),
        };
        assert_eq!(event.event_type(), "shutdown_requested");
        assert_eq!(event.description(), "Shutdown requested: keyboard");
    }
}
