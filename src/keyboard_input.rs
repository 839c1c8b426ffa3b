use crate::app::SimulationControls;
use crate::error::Result;
use crate::events::{EventBus, ParcelEvent};
use crate::sensors::Scenario;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::runtime::Handle;
use tokio::task;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// What a key press asks the simulation to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    SwitchScenario(Scenario),
    ToggleNetwork,
    Quit,
}

/// Digits 1-9 pick a scenario in `Scenario::ALL` order, `n` toggles the
/// network link, `q`/Esc quits
pub fn action_for_key(code: KeyCode) -> Option<KeyAction> {
    match code {
        KeyCode::Char(c @ '1'..='9') => {
            let index = c as usize - '1' as usize;
            Scenario::ALL
                .get(index)
                .copied()
                .map(KeyAction::SwitchScenario)
        }
        KeyCode::Char('n') | KeyCode::Char('N') => Some(KeyAction::ToggleNetwork),
        KeyCode::Char('q') | KeyCode::Esc => Some(KeyAction::Quit),
        _ => None,
    }
}

/// Apply an action to the simulated hardware and describe it as an event.
/// Network changes are only applied; the scheduler notices the link state
/// itself and publishes the change.
fn apply_action(action: KeyAction, controls: &SimulationControls) -> Option<ParcelEvent> {
    match action {
        KeyAction::SwitchScenario(scenario) => {
            *controls.scenario.write() = scenario;
            info!("Scenario switched to {}", scenario);
            Some(ParcelEvent::ScenarioChanged {
                scenario: scenario.to_string(),
                timestamp: SystemTime::now(),
            })
        }
        KeyAction::ToggleNetwork => {
            let connected = controls.network.toggle();
            info!(
                "Network link {}",
                if connected { "restored" } else { "dropped" }
            );
            None
        }
        KeyAction::Quit => Some(ParcelEvent::ShutdownRequested {
            timestamp: SystemTime::now(),
            reason: "User requested via keyboard".to_string(),
        }),
    }
}

/// Keyboard input handler for steering the simulated sensors
pub struct KeyboardInputHandler {
    event_bus: Arc<EventBus>,
    controls: SimulationControls,
    cancellation_token: CancellationToken,
}

impl KeyboardInputHandler {
    /// Create a new keyboard input handler
    pub fn new(event_bus: Arc<EventBus>, controls: SimulationControls) -> Self {
        Self {
            event_bus,
            controls,
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Start listening for keyboard input
    pub async fn start(&self) -> Result<()> {
        info!("Starting keyboard input handler - 1-9 switch scenario, n toggles network, q quits");
        for (index, scenario) in Scenario::ALL.iter().enumerate() {
            info!("  {} = {}", index + 1, scenario);
        }

        let event_bus = Arc::clone(&self.event_bus);
        let controls = self.controls.clone();
        let cancellation_token = self.cancellation_token.clone();
        let runtime_handle = Handle::current();

        // Spawn a blocking task to handle keyboard input
        task::spawn_blocking(move || {
            // Enable raw mode to capture individual key presses
            if let Err(e) = enable_raw_mode() {
                error!("Failed to enable raw mode for keyboard input: {}", e);
                return;
            }

            debug!("Raw mode enabled - keyboard handler active");

            loop {
                if cancellation_token.is_cancelled() {
                    debug!("Keyboard input handler stopping");
                    break;
                }

                match event::poll(Duration::from_millis(100)) {
                    Ok(true) => {
                        let key_event = match event::read() {
                            Ok(Event::Key(key_event)) if key_event.kind == KeyEventKind::Press => {
                                key_event
                            }
                            _ => continue,
                        };

                        let Some(action) = action_for_key(key_event.code) else {
                            debug!("Key pressed: {:?}", key_event.code);
                            continue;
                        };

                        if let Some(event) = apply_action(action, &controls) {
                            let event_bus_clone = Arc::clone(&event_bus);
                            runtime_handle.spawn(async move {
                                if let Err(e) = event_bus_clone.publish(event).await {
                                    warn!("Failed to publish keyboard event: {}", e);
                                }
                            });
                        }

                        if action == KeyAction::Quit {
                            info!("Quit key pressed - requesting shutdown");
                            break;
                        }
                    }
                    Ok(false) => {}
                    Err(e) => {
                        warn!("Error polling for keyboard events: {}", e);
                    }
                }
            }

            if let Err(e) = disable_raw_mode() {
                error!("Failed to disable raw mode: {}", e);
            } else {
                debug!("Raw mode disabled");
            }

            debug!("Keyboard input handler task exited");
        });

        Ok(())
    }

    /// Stop the keyboard input handler
    pub async fn stop(&self) -> Result<()> {
        info!("Stopping keyboard input handler");
        self.cancellation_token.cancel();

        // Give the task a moment to clean up and disable raw mode
        tokio::time::sleep(Duration::from_millis(200)).await;

        // Ensure raw mode is disabled even if the task didn't clean up properly
        let _ = disable_raw_mode();

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ParcelwatchConfig;
    use crate::network::{NetworkLink, StaticNetworkLink};
    use crate::sensors::simulated::shared_scenario;

    fn controls() -> SimulationControls {
        SimulationControls {
            scenario: shared_scenario(Scenario::Calm),
            network: StaticNetworkLink::new(&ParcelwatchConfig::default().network),
        }
    }

    #[test]
    fn test_key_mapping() {
        assert_eq!(
            action_for_key(KeyCode::Char('1')),
            Some(KeyAction::SwitchScenario(Scenario::Calm))
        );
        assert_eq!(
            action_for_key(KeyCode::Char('9')),
            Some(KeyAction::SwitchScenario(Scenario::Flaky))
        );
        assert_eq!(action_for_key(KeyCode::Char('0')), None);
        assert_eq!(action_for_key(KeyCode::Char('n')), Some(KeyAction::ToggleNetwork));
        assert_eq!(action_for_key(KeyCode::Esc), Some(KeyAction::Quit));
        assert_eq!(action_for_key(KeyCode::Char(' ')), None);
    }

    #[test]
    fn test_apply_actions() {
        let controls = controls();

        let event = apply_action(KeyAction::SwitchScenario(Scenario::Heatwave), &controls);
        assert_eq!(*controls.scenario.read(), Scenario::Heatwave);
        assert!(matches!(
            event,
            Some(ParcelEvent::ScenarioChanged { ref scenario, .. }) if scenario == "heatwave"
        ));

        assert!(apply_action(KeyAction::ToggleNetwork, &controls).is_none());
        assert!(!controls.network.is_connected());

        assert!(matches!(
            apply_action(KeyAction::Quit, &controls),
            Some(ParcelEvent::ShutdownRequested { .. })
        ));
    }

    #[tokio::test]
    async fn test_keyboard_handler_stop() {
        let event_bus = Arc::new(EventBus::new(100));
        let handler = KeyboardInputHandler::new(event_bus, controls());

        assert!(!handler.cancellation_token.is_cancelled());
        handler.stop().await.unwrap();
        assert!(handler.cancellation_token.is_cancelled());
    }
}
