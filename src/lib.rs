pub mod alerts;
pub mod app;
pub mod classifier;
pub mod clock;
pub mod config;
pub mod device;
pub mod error;
pub mod events;
pub mod network;
pub mod reading;
pub mod reconciler;
pub mod sensors;
pub mod store;
pub mod telemetry;
pub mod thresholds;

#[cfg(feature = "keyboard")]
pub mod keyboard_input;

pub use alerts::{evaluate, AlertEvent, AlertGate, AlertKind, AlertValue, Severity};
pub use app::{
    ComponentState, CycleReport, EngineParts, ParcelwatchOrchestrator, SchedulerContext,
    ShutdownReason, SimulationControls,
};
pub use classifier::{classify, classify_orientation, detect_vibration, MotionState, Orientation};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::ParcelwatchConfig;
pub use device::{DeviceIdentity, DeviceRecord, DeviceStatus};
pub use error::{ParcelwatchError, Result, SensorError, StoreError};
pub use events::{EventBus, EventFilter, EventMetrics, EventReceiver, ParcelEvent};
pub use network::{NetworkInfo, NetworkLink, StaticNetworkLink};
pub use reading::{ClimateReading, MotionReading, SensorReading, Vector3};
pub use reconciler::DeviceStateReconciler;
pub use store::{DeviceStore, MemoryStore, RemoteStore, StorePaths};
pub use telemetry::{TelemetrySnapshot, TelemetryUploader};
pub use thresholds::{ThresholdResolver, ThresholdSet};

#[cfg(feature = "http-store")]
pub use store::HttpStore;

#[cfg(feature = "keyboard")]
pub use keyboard_input::KeyboardInputHandler;
