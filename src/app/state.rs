use super::{ComponentState, ParcelwatchOrchestrator};
use std::collections::HashMap;
use tracing::debug;

impl ParcelwatchOrchestrator {
    /// Update component state
    pub async fn set_component_state(&self, component: &str, state: ComponentState) {
        let mut states = self.component_states.lock().await;
        let previous = states.insert(component.to_string(), state.clone());
        if previous.as_ref() != Some(&state) {
            debug!("Component '{}' state changed to: {:?}", component, state);
        }
    }

    /// Get component state
    pub async fn get_component_state(&self, component: &str) -> Option<ComponentState> {
        let states = self.component_states.lock().await;
        states.get(component).cloned()
    }

    /// Get all component states
    pub async fn get_all_component_states(&self) -> HashMap<String, ComponentState> {
        let states = self.component_states.lock().await;
        states.clone()
    }
}
