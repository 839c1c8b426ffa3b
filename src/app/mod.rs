mod context;
mod orchestrator;
mod runtime;
mod shutdown;
mod startup;
mod state;
mod tasks;
mod types;


pub use context::{IntervalTimer, SchedulerContext, TaskTimers};
pub use orchestrator::{EngineParts, ParcelwatchOrchestrator, SimulationControls};
pub use types::{ComponentState, CycleReport, ShutdownReason};
