//! Read-merge-write reconciliation of the device record with the back end.

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::device::{assignment_from_value, DeviceIdentity, DeviceRecord, DeviceStatus, PreservedFields};
use crate::error::StoreError;
use crate::network::NetworkInfo;
use crate::store::DeviceStore;
use crate::thresholds::ThresholdSet;

pub struct DeviceStateReconciler {
    store: DeviceStore,
    identity: DeviceIdentity,
    default_thresholds: ThresholdSet,
    mirror_to_device_root: bool,
    registered: bool,
    status: Option<DeviceStatus>,
}

impl DeviceStateReconciler {
    pub fn new(
        store: DeviceStore,
        identity: DeviceIdentity,
        default_thresholds: ThresholdSet,
        mirror_to_device_root: bool,
    ) -> Self {
        Self {
            store,
            identity,
            default_thresholds,
            mirror_to_device_root,
            registered: false,
            status: None,
        }
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    /// Whether a registration write has succeeded since startup
    pub fn is_registered(&self) -> bool {
        self.registered
    }

    /// Last known assignment status
    pub fn status(&self) -> Option<DeviceStatus> {
        self.status
    }

    /// Register the device without clobbering back-end owned fields.
    ///
    /// The stored record is always read first. A failed read aborts the
    /// write-back: an unreachable record must not be mistaken for a new
    /// device. The returned record is what was written to the info path.
    pub async fn register(
        &mut self,
        network: NetworkInfo,
        now_ms: u64,
    ) -> Result<DeviceRecord, StoreError> {
        let paths = self.store.paths().clone();
        info!("Registering {} at {}", self.identity, paths.root());

        let existing = self.store.get(&paths.info()).await?;
        match &existing {
            Some(_) => debug!("Found existing device record"),
            None => info!("No existing device record, registering as new"),
        }

        let preserved = PreservedFields::from_existing(existing.as_ref());
        if preserved.is_assigned() {
            info!(
                "Device is assigned to {}, keeping back-end thresholds",
                preserved.assignment()
            );
        }

        let record = DeviceRecord::merged(
            &self.identity,
            network,
            &preserved,
            now_ms,
            self.default_thresholds,
        );

        let body = serde_json::to_value(&record).map_err(|e| StoreError::Malformed {
            path: paths.info(),
            details: e.to_string(),
        })?;

        self.store.patch(&paths.info(), &body).await?;

        if self.mirror_to_device_root {
            if let Err(e) = self.store.patch(paths.root(), &body).await {
                warn!("Device root mirror write failed: {}", e);
            }
        }

        self.registered = true;
        self.status = Some(record.status);
        info!("Device registered ({})", record.status);

        Ok(record)
    }

    /// Bump `info/lastSeen` only
    pub async fn refresh_liveness(&mut self, now_ms: u64) -> Result<(), StoreError> {
        let path = self.store.paths().last_seen();
        self.store
            .put(&path, &Value::String(now_ms.to_string()))
            .await?;
        debug!("lastSeen refreshed to {}", now_ms);
        Ok(())
    }

    /// Re-read the assignment and update the status indicator. Returns the
    /// new status when it differs from the previous one.
    pub async fn refresh_assignment(&mut self) -> Result<Option<DeviceStatus>, StoreError> {
        let path = self.store.paths().assigned_parcel_id();
        let value = self.store.get(&path).await?;
        let status = DeviceStatus::from_assignment(&assignment_from_value(value.as_ref()));

        let previous = self.status.replace(status);
        if previous == Some(status) {
            Ok(None)
        } else {
            info!("Device status now: {}", status);
            Ok(Some(status))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeviceConfig;
    use crate::store::{MemoryStore, RemoteStore, StorePaths};
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    const ROOT: &str = "SmartParcels/TRACEON_A1B2C3";

    fn identity() -> DeviceIdentity {
        DeviceIdentity::from_config(&DeviceConfig {
            name_prefix: "TRACEON_".to_string(),
            mac_address: "24:6F:28:A1:B2:C3".to_string(),
            firmware_version: "1.0.0".to_string(),
            mdns_hostname: "traceon".to_string(),
        })
        .unwrap()
    }

    fn network() -> NetworkInfo {
        NetworkInfo {
            ip_address: "10.0.0.7".to_string(),
            wifi_ssid: "dock-4".to_string(),
            local_access: "http://10.0.0.7".to_string(),
            mdns_access: "http://traceon.local".to_string(),
        }
    }

    fn reconciler(memory: &Arc<MemoryStore>, mirror: bool) -> DeviceStateReconciler {
        let store = DeviceStore::new(
            memory.clone(),
            StorePaths::new("SmartParcels", "TRACEON_A1B2C3"),
            Duration::from_secs(1),
        );
        DeviceStateReconciler::new(store, identity(), ThresholdSet::default(), mirror)
    }

    #[tokio::test]
    async fn test_register_fresh_device() {
        let memory = Arc::new(MemoryStore::new());
        let mut reconciler = reconciler(&memory, true);

        let record = reconciler.register(network(), 1_000).await.unwrap();
        assert!(reconciler.is_registered());
        assert_eq!(record.status, DeviceStatus::Available);

        let info = memory.snapshot(&format!("{}/info", ROOT)).unwrap();
        assert_eq!(info["registeredAt"], "1000");
        assert_eq!(info["status"], "available");
        assert_eq!(info["thresholds"]["vibration"], 15.0);

        // Mirrored onto the device root
        let root = memory.snapshot(ROOT).unwrap();
        assert_eq!(root["deviceName"], "TRACEON_A1B2C3");
    }

    #[tokio::test]
    async fn test_register_twice_only_moves_last_seen() {
        let memory = Arc::new(MemoryStore::with_tree(json!({
            "SmartParcels": {"TRACEON_A1B2C3": {"info": {
                "assignedParcelId": "PCL-9",
                "registeredAt": "500",
                "thresholds": {"temperature": {"min": 2.0, "max": 8.0}, "vibration": 4.0}
            }}}
        })));
        let mut reconciler = reconciler(&memory, false);

        reconciler.register(network(), 1_000).await.unwrap();
        let first = memory.snapshot(&format!("{}/info", ROOT)).unwrap();

        reconciler.register(network(), 2_000).await.unwrap();
        let second = memory.snapshot(&format!("{}/info", ROOT)).unwrap();

        assert_eq!(second["registeredAt"], "500");
        assert_eq!(second["assignedParcelId"], "PCL-9");
        assert_eq!(second["status"], "assigned");
        assert_eq!(second["lastSeen"], "2000");
        // Operator thresholds survive untouched
        assert_eq!(second["thresholds"]["temperature"]["max"], 8.0);
        assert_eq!(second["thresholds"]["vibration"], 4.0);

        let mut first = first;
        let mut second = second;
        first.as_object_mut().unwrap().remove("lastSeen");
        second.as_object_mut().unwrap().remove("lastSeen");
        assert_eq!(first, second);

        assert_eq!(reconciler.status(), Some(DeviceStatus::Assigned));
    }

    #[tokio::test]
    async fn test_register_writes_back_stored_values_verbatim() {
        let memory = Arc::new(MemoryStore::with_tree(json!({
            "SmartParcels": {"TRACEON_A1B2C3": {"info": {
                "assignedParcelId": 42,
                "registeredAt": 1690000000123.7
            }}}
        })));
        let mut reconciler = reconciler(&memory, false);

        let record = reconciler.register(network(), 1_000).await.unwrap();
        assert_eq!(record.status, DeviceStatus::Assigned);

        let info = memory.snapshot(&format!("{}/info", ROOT)).unwrap();
        assert_eq!(info["assignedParcelId"], json!(42));
        assert_eq!(info["registeredAt"], json!(1690000000123.7));

        memory
            .put(&format!("{}/info/assignedParcelId", ROOT), &json!(" PCL-9 "))
            .await
            .unwrap();
        reconciler.register(network(), 2_000).await.unwrap();
        assert_eq!(
            memory.snapshot(&format!("{}/info/assignedParcelId", ROOT)),
            Some(json!(" PCL-9 "))
        );
    }

    #[tokio::test]
    async fn test_failed_mirror_write_still_registers() {
        let memory = Arc::new(MemoryStore::new());
        memory.reject_writes_to(ROOT);
        let mut reconciler = reconciler(&memory, true);

        let record = reconciler.register(network(), 1_000).await.unwrap();
        assert!(reconciler.is_registered());
        assert_eq!(reconciler.status(), Some(DeviceStatus::Available));
        assert_eq!(record.status, DeviceStatus::Available);

        let info = memory.snapshot(&format!("{}/info", ROOT)).unwrap();
        assert_eq!(info["deviceName"], "TRACEON_A1B2C3");
        assert_eq!(info["registeredAt"], "1000");
        assert!(memory.snapshot(&format!("{}/deviceName", ROOT)).is_none());

        let methods: Vec<&str> = memory.calls().iter().map(|c| c.method).collect();
        assert_eq!(methods, vec!["GET", "PATCH", "PATCH"]);
    }

    #[tokio::test]
    async fn test_failed_read_skips_write_back() {
        let memory = Arc::new(MemoryStore::new());
        memory.set_offline(true);
        let mut reconciler = reconciler(&memory, true);

        assert!(reconciler.register(network(), 1_000).await.is_err());
        assert!(!reconciler.is_registered());

        let calls = memory.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].method, "GET");
    }

    #[tokio::test]
    async fn test_register_reads_before_writing() {
        let memory = Arc::new(MemoryStore::new());
        let mut reconciler = reconciler(&memory, true);
        reconciler.register(network(), 1_000).await.unwrap();

        let methods: Vec<&str> = memory.calls().iter().map(|c| c.method).collect();
        assert_eq!(methods, vec!["GET", "PATCH", "PATCH"]);
    }

    #[tokio::test]
    async fn test_refresh_liveness_writes_only_last_seen() {
        let memory = Arc::new(MemoryStore::new());
        let mut reconciler = reconciler(&memory, false);
        reconciler.register(network(), 1_000).await.unwrap();
        memory.clear_calls();

        reconciler.refresh_liveness(31_000).await.unwrap();

        let calls = memory.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].method, "PUT");
        assert_eq!(calls[0].path, format!("{}/info/lastSeen", ROOT));
        assert_eq!(
            memory.snapshot(&format!("{}/info/lastSeen", ROOT)),
            Some(json!("31000"))
        );
        assert_eq!(
            memory.snapshot(&format!("{}/info/registeredAt", ROOT)),
            Some(json!("1000"))
        );
    }

    #[tokio::test]
    async fn test_refresh_assignment_reports_changes() {
        let memory = Arc::new(MemoryStore::new());
        let mut reconciler = reconciler(&memory, false);
        reconciler.register(network(), 1_000).await.unwrap();

        assert_eq!(reconciler.refresh_assignment().await.unwrap(), None);

        let path = format!("{}/info/assignedParcelId", ROOT);
        memory.put(&path, &json!("PCL-1")).await.unwrap();
        assert_eq!(
            reconciler.refresh_assignment().await.unwrap(),
            Some(DeviceStatus::Assigned)
        );
        assert_eq!(reconciler.refresh_assignment().await.unwrap(), None);

        memory.put(&path, &json!("")).await.unwrap();
        assert_eq!(
            reconciler.refresh_assignment().await.unwrap(),
            Some(DeviceStatus::Available)
        );
    }
}
