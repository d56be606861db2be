// ── Poll snapshot ──
//
// The result of one successful poll. Replaced wholesale on every success;
// a failed poll leaves the previous snapshot in place, so consumers always
// see a complete, internally consistent device set.

use chrono::{DateTime, Utc};

use raptly_api::{DeviceCategory, DeviceInventory, DeviceRecord};

/// The coordinator's best-known device data from one successful poll.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceSnapshot {
    pub temperature_controllers: Vec<DeviceRecord>,
    pub hydrometers: Vec<DeviceRecord>,
    pub fermentation_chambers: Vec<DeviceRecord>,
    pub brewzillas: Vec<DeviceRecord>,
    /// All records merged in fixed category order.
    pub devices: Vec<DeviceRecord>,
    /// When the poll producing this snapshot succeeded.
    pub observed_at: DateTime<Utc>,
}

impl DeviceSnapshot {
    /// Build a snapshot from one full inventory pass, stamped now.
    pub(crate) fn from_inventory(inventory: DeviceInventory) -> Self {
        let devices: Vec<DeviceRecord> = inventory.iter().cloned().collect();
        Self {
            temperature_controllers: inventory.temperature_controllers,
            hydrometers: inventory.hydrometers,
            fermentation_chambers: inventory.fermentation_chambers,
            brewzillas: inventory.brewzillas,
            devices,
            observed_at: Utc::now(),
        }
    }

    /// Records for one category.
    pub fn category(&self, category: DeviceCategory) -> &[DeviceRecord] {
        match category {
            DeviceCategory::TemperatureController => &self.temperature_controllers,
            DeviceCategory::Hydrometer => &self.hydrometers,
            DeviceCategory::FermentationChamber => &self.fermentation_chambers,
            DeviceCategory::BrewZilla => &self.brewzillas,
        }
    }

    /// Look up a device in the merged list by its identifier.
    pub fn device(&self, id: &str) -> Option<&DeviceRecord> {
        self.devices.iter().find(|record| record.id() == Some(id))
    }

    /// Total record count across all categories.
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use serde_json::json;

    use super::*;

    fn record(value: serde_json::Value) -> DeviceRecord {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn merged_list_follows_category_order() {
        let snapshot = DeviceSnapshot::from_inventory(DeviceInventory {
            temperature_controllers: vec![record(json!({"id": "c1"}))],
            hydrometers: vec![record(json!({"id": "h1"}))],
            fermentation_chambers: vec![],
            brewzillas: vec![record(json!({"id": "b1"}))],
        });
        let ids: Vec<_> = snapshot.devices.iter().filter_map(DeviceRecord::id).collect();
        assert_eq!(ids, ["c1", "h1", "b1"]);
        assert_eq!(snapshot.len(), 3);
        assert_eq!(snapshot.category(DeviceCategory::Hydrometer).len(), 1);
    }

    #[test]
    fn device_lookup_skips_records_without_an_id() {
        let snapshot = DeviceSnapshot::from_inventory(DeviceInventory {
            hydrometers: vec![record(json!({"name": "orphan"})), record(json!({"id": "h1"}))],
            ..DeviceInventory::default()
        });
        assert_eq!(snapshot.device("h1").unwrap().id(), Some("h1"));
        assert!(snapshot.device("missing").is_none());
        assert_eq!(snapshot.len(), 2);
    }
}
