// RAPT cloud data model
//
// Device payloads are kept verbatim as JSON objects: the cloud's schema is
// not under our control and drifts between firmware releases, so records
// expose typed accessors for the handful of fields this crate relies on and
// hand everything else through untouched.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ── Device categories ────────────────────────────────────────────────

/// The four fixed device partitions the cloud exposes.
///
/// Each category is fetched from its own endpoint and reported
/// independently, then merged (in [`ALL`](Self::ALL) order) into one flat
/// list for discovery purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceCategory {
    TemperatureController,
    Hydrometer,
    FermentationChamber,
    BrewZilla,
}

impl DeviceCategory {
    /// Fixed fetch order; also the merge order for snapshots.
    pub const ALL: [Self; 4] = [
        Self::TemperatureController,
        Self::Hydrometer,
        Self::FermentationChamber,
        Self::BrewZilla,
    ];

    /// Endpoint path for this category, relative to the API base.
    pub fn endpoint_path(self) -> &'static str {
        match self {
            Self::TemperatureController => "/TemperatureControllers/GetTemperatureControllers",
            Self::Hydrometer => "/Hydrometers/GetHydrometers",
            Self::FermentationChamber => "/FermentationChambers/GetFermentationChambers",
            Self::BrewZilla => "/BrewZillas/GetBrewZillas",
        }
    }

    /// The `deviceType` tag the cloud uses for records in this category.
    pub fn device_type(self) -> &'static str {
        match self {
            Self::TemperatureController => "TemperatureController",
            Self::Hydrometer => "Hydrometer",
            Self::FermentationChamber => "FermentationChamber",
            Self::BrewZilla => "BrewZilla",
        }
    }

    /// Human-readable label, used in logs and default device names.
    pub fn label(self) -> &'static str {
        match self {
            Self::TemperatureController => "temperature controller",
            Self::Hydrometer => "hydrometer",
            Self::FermentationChamber => "fermentation chamber",
            Self::BrewZilla => "BrewZilla",
        }
    }
}

impl fmt::Display for DeviceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ── Device records ───────────────────────────────────────────────────

/// One device as returned by the cloud, kept verbatim.
///
/// Sensor values may sit directly on the record or inside the most recent
/// telemetry sample; [`sensor_value`](Self::sensor_value) probes in that
/// order (direct field wins).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceRecord(Map<String, Value>);

impl DeviceRecord {
    /// The stable device identifier.
    ///
    /// Missing, empty, and non-string values all yield `None`; such records
    /// still appear in snapshots but are excluded from discovery tracking.
    pub fn id(&self) -> Option<&str> {
        self.0
            .get("id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
    }

    /// The user-assigned device name, if any.
    pub fn name(&self) -> Option<&str> {
        self.0.get("name").and_then(Value::as_str)
    }

    /// The cloud's `deviceType` tag, if present.
    pub fn device_type(&self) -> Option<&str> {
        self.0.get("deviceType").and_then(Value::as_str)
    }

    /// A field read straight off the record.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// The most recent telemetry sample (`telemetry[0]`), if present.
    pub fn latest_telemetry(&self) -> Option<&Map<String, Value>> {
        self.0
            .get("telemetry")?
            .as_array()?
            .first()?
            .as_object()
    }

    /// Probe for a sensor value: the record's own field first, then the
    /// most recent telemetry sample.
    pub fn sensor_value(&self, key: &str) -> Option<&Value> {
        if let Some(value) = self.0.get(key) {
            return Some(value);
        }
        self.latest_telemetry().and_then(|sample| sample.get(key))
    }

    /// Whether [`sensor_value`](Self::sensor_value) would find `key`.
    pub fn has_sensor(&self, key: &str) -> bool {
        self.sensor_value(key).is_some()
    }

    /// Coerce a sensor value to a number.
    ///
    /// Accepts JSON numbers and numeric strings. Booleans yield `None`:
    /// scaling flags onto a numeric range is a host display convention,
    /// not a property of the data.
    pub fn sensor_number(&self, key: &str) -> Option<f64> {
        match self.sensor_value(key)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// The raw field map.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }
}

impl From<Map<String, Value>> for DeviceRecord {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}

// ── Device inventory ─────────────────────────────────────────────────

/// One full pass over the four fetch endpoints.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceInventory {
    pub temperature_controllers: Vec<DeviceRecord>,
    pub hydrometers: Vec<DeviceRecord>,
    pub fermentation_chambers: Vec<DeviceRecord>,
    pub brewzillas: Vec<DeviceRecord>,
}

impl DeviceInventory {
    /// Records for one category.
    pub fn category(&self, category: DeviceCategory) -> &[DeviceRecord] {
        match category {
            DeviceCategory::TemperatureController => &self.temperature_controllers,
            DeviceCategory::Hydrometer => &self.hydrometers,
            DeviceCategory::FermentationChamber => &self.fermentation_chambers,
            DeviceCategory::BrewZilla => &self.brewzillas,
        }
    }

    /// All records, in fixed category order.
    pub fn iter(&self) -> impl Iterator<Item = &DeviceRecord> {
        DeviceCategory::ALL
            .iter()
            .flat_map(|category| self.category(*category).iter())
    }

    /// Total record count across all categories.
    pub fn len(&self) -> usize {
        DeviceCategory::ALL
            .iter()
            .map(|category| self.category(*category).len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
