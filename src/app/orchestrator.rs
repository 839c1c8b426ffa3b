use super::context::SchedulerContext;
use super::types::{ComponentState, ShutdownReason};
use crate::alerts::AlertGate;
use crate::clock::{Clock, SystemClock};
use crate::config::ParcelwatchConfig;
use crate::device::DeviceIdentity;
use crate::error::{ParcelwatchError, Result};
use crate::events::{EventBus, EventFilter, EventMetrics, EventReceiver};
#[cfg(feature = "keyboard")]
use crate::keyboard_input::KeyboardInputHandler;
use crate::network::{NetworkLink, StaticNetworkLink};
use crate::reconciler::DeviceStateReconciler;
use crate::sensors::simulated::shared_scenario;
use crate::sensors::{
    ClimateDriver, ClimateSource, MotionDriver, MotionSource, Scenario, SharedScenario,
    SimulatedClimate, SimulatedMotion,
};
use crate::store::{DeviceStore, RemoteStore, StorePaths};
use crate::telemetry::TelemetryUploader;
use crate::thresholds::ThresholdResolver;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex};
use tokio_util::sync::CancellationToken;

/// Handles for steering the simulated hardware at runtime
#[derive(Clone)]
pub struct SimulationControls {
    pub scenario: SharedScenario,
    pub network: StaticNetworkLink,
}

/// Collaborators the engine runs against
pub struct EngineParts {
    pub store: Arc<dyn RemoteStore>,
    pub clock: Arc<dyn Clock>,
    pub network: Arc<dyn NetworkLink>,
    pub climate_driver: Option<Box<dyn ClimateDriver>>,
    pub motion_driver: Option<Box<dyn MotionDriver>>,
    pub controls: Option<SimulationControls>,
}

impl EngineParts {
    /// Host wiring: system clock, static network link and the simulated
    /// drivers following the configured scenario
    pub fn simulated(config: &ParcelwatchConfig, store: Arc<dyn RemoteStore>) -> Result<Self> {
        Self::simulated_with_clock(config, store, Arc::new(SystemClock::new()))
    }

    pub fn simulated_with_clock(
        config: &ParcelwatchConfig,
        store: Arc<dyn RemoteStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let initial: Scenario = config
            .sensors
            .scenario
            .parse()
            .map_err(|e: String| ParcelwatchError::component("sensors".to_string(), e))?;
        let scenario = shared_scenario(initial);
        let link = StaticNetworkLink::new(&config.network);

        let climate_driver: Option<Box<dyn ClimateDriver>> = if config.sensors.climate_enabled {
            Some(Box::new(SimulatedClimate::new(Arc::clone(&scenario))))
        } else {
            None
        };
        let motion_driver: Option<Box<dyn MotionDriver>> = if config.sensors.motion_enabled {
            Some(Box::new(SimulatedMotion::new(Arc::clone(&scenario))))
        } else {
            None
        };

        Ok(Self {
            store,
            clock,
            network: Arc::new(link.clone()),
            climate_driver,
            motion_driver,
            controls: Some(SimulationControls {
                scenario,
                network: link,
            }),
        })
    }
}

/// Main application coordinator: owns the engine components and drives the
/// scheduler loop
pub struct ParcelwatchOrchestrator {
    pub(super) config: ParcelwatchConfig,
    pub(super) event_bus: Arc<EventBus>,
    pub(super) clock: Arc<dyn Clock>,
    pub(super) network: Arc<dyn NetworkLink>,

    // Engine
    pub(super) climate: Option<ClimateSource>,
    pub(super) motion: Option<MotionSource>,
    pub(super) reconciler: DeviceStateReconciler,
    pub(super) uploader: TelemetryUploader,
    pub(super) context: SchedulerContext,
    pub(super) metrics: EventMetrics,
    pub(super) controls: Option<SimulationControls>,

    #[cfg(feature = "keyboard")]
    pub(super) keyboard_handler: Option<KeyboardInputHandler>,
    pub(super) keyboard_enabled: bool,

    // Lifecycle management
    pub(super) component_states: Arc<Mutex<HashMap<String, ComponentState>>>,
    pub(super) shutdown_sender: Option<oneshot::Sender<ShutdownReason>>,
    pub(super) shutdown_receiver: Option<oneshot::Receiver<ShutdownReason>>,
    pub(super) shutdown_requests: EventReceiver,
    pub(super) cancellation_token: CancellationToken,
}

impl ParcelwatchOrchestrator {
    /// Create a new orchestrator with the given configuration and collaborators
    pub fn new(config: ParcelwatchConfig, parts: EngineParts) -> Result<Self> {
        let identity = DeviceIdentity::from_config(&config.device)?;
        let event_bus = Arc::new(EventBus::new(config.system.event_bus_capacity));
        let (shutdown_sender, shutdown_receiver) = oneshot::channel();

        let shutdown_requests = EventReceiver::new(
            event_bus.subscribe(),
            EventFilter::event_types(vec!["shutdown_requested"]),
            "orchestrator".to_string(),
        );

        let store = DeviceStore::new(
            parts.store,
            StorePaths::new(&config.remote.base_path, &identity.device_name),
            Duration::from_millis(config.remote.timeout_ms),
        );
        let defaults = config.thresholds.defaults();

        let reconciler = DeviceStateReconciler::new(
            store.clone(),
            identity,
            defaults,
            config.remote.mirror_to_device_root,
        );
        let uploader = TelemetryUploader::new(
            store,
            ThresholdResolver::new(defaults),
            AlertGate::new(&config.alerts),
        );

        let climate = parts.climate_driver.map(|driver| {
            ClimateSource::new(
                driver,
                Arc::clone(&parts.clock),
                config.sensors.climate_min_interval_ms,
            )
        });
        let motion = parts
            .motion_driver
            .map(|driver| MotionSource::new(driver, Arc::clone(&parts.clock)));

        let context =
            SchedulerContext::new(&config.schedule, defaults, parts.clock.monotonic_ms());

        #[cfg(feature = "keyboard")]
        let keyboard_handler = parts
            .controls
            .clone()
            .map(|controls| KeyboardInputHandler::new(Arc::clone(&event_bus), controls));

        Ok(Self {
            config,
            event_bus,
            clock: parts.clock,
            network: parts.network,
            climate,
            motion,
            reconciler,
            uploader,
            context,
            metrics: EventMetrics::default(),
            controls: parts.controls,
            #[cfg(feature = "keyboard")]
            keyboard_handler,
            keyboard_enabled: false, // Enable via set_keyboard_enabled()
            component_states: Arc::new(Mutex::new(HashMap::new())),
            shutdown_sender: Some(shutdown_sender),
            shutdown_receiver: Some(shutdown_receiver),
            shutdown_requests,
            cancellation_token: CancellationToken::new(),
        })
    }

    /// Enable or disable interactive keyboard control of the simulation
    pub fn set_keyboard_enabled(&mut self, enabled: bool) {
        self.keyboard_enabled = enabled;
    }

    pub fn event_bus(&self) -> Arc<EventBus> {
        Arc::clone(&self.event_bus)
    }

    pub fn identity(&self) -> &DeviceIdentity {
        self.reconciler.identity()
    }

    pub fn context(&self) -> &SchedulerContext {
        &self.context
    }

    pub fn metrics(&self) -> &EventMetrics {
        &self.metrics
    }

    pub fn is_registered(&self) -> bool {
        self.reconciler.is_registered()
    }

    pub fn controls(&self) -> Option<&SimulationControls> {
        self.controls.as_ref()
    }

    /// Token cancelled when the orchestrator shuts down
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }
}
