use chrono::{DateTime, Local, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Payload of `GET /sensor/latest`.
///
/// Every key must be present; a key may be `null` when the node has not
/// reported that quantity yet.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LatestReading {
    #[serde(deserialize_with = "nullable")]
    pub temperature: Option<f64>,
    #[serde(deserialize_with = "nullable")]
    pub humidity: Option<f64>,
    #[serde(deserialize_with = "nullable")]
    pub light: Option<f64>,
    #[serde(deserialize_with = "nullable")]
    pub wind: Option<f64>,
}

// With `deserialize_with` serde no longer treats a missing key as `None`,
// so absent keys fail the whole payload while explicit nulls are accepted.
fn nullable<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<f64>::deserialize(deserializer)
}

impl LatestReading {
    pub fn into_snapshot(self, captured_at: DateTime<Utc>) -> SensorSnapshot {
        SensorSnapshot {
            temperature: self.temperature,
            humidity: self.humidity,
            light: self.light,
            wind: self.wind,
            captured_at,
        }
    }
}

/// Point-in-time copy of the sensor node's readings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorSnapshot {
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub light: Option<f64>,
    pub wind: Option<f64>,
    pub captured_at: DateTime<Utc>,
}

/// Chart point derived from a snapshot at capture time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorSample {
    pub time: String,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub light: Option<f64>,
    pub wind: Option<f64>,
}

impl SensorSample {
    pub fn from_snapshot(snapshot: &SensorSnapshot) -> Self {
        Self {
            time: snapshot
                .captured_at
                .with_timezone(&Local)
                .format("%H:%M:%S")
                .to_string(),
            temperature: snapshot.temperature,
            humidity: snapshot.humidity,
            light: snapshot.light,
            wind: snapshot.wind,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DeviceId {
    Fan,
    AirConditioner,
    Lightbulb,
    WarningLight,
}

impl DeviceId {
    pub const ALL: [DeviceId; 4] = [
        DeviceId::Fan,
        DeviceId::AirConditioner,
        DeviceId::Lightbulb,
        DeviceId::WarningLight,
    ];

    /// Name used in command bodies and the activity log.
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceId::Fan => "fan",
            DeviceId::AirConditioner => "airConditioner",
            DeviceId::Lightbulb => "lightbulb",
            DeviceId::WarningLight => "warningLight",
        }
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceId {
    type Err = crate::errors::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DeviceId::ALL
            .into_iter()
            .find(|id| id.as_str() == s)
            .ok_or_else(|| crate::errors::Error::Validation(format!("Unknown device: {}", s)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Switch {
    On,
    Off,
}

impl From<bool> for Switch {
    fn from(on: bool) -> Self {
        if on {
            Switch::On
        } else {
            Switch::Off
        }
    }
}

impl From<Switch> for bool {
    fn from(switch: Switch) -> Self {
        switch == Switch::On
    }
}

/// Payload of `GET /led/status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceStatusReport {
    pub fan: Switch,
    pub air_conditioner: Switch,
    pub lightbulb: Switch,
    #[serde(rename = "warning")]
    pub warning_light: Switch,
}

impl DeviceStatusReport {
    pub fn states(&self) -> BTreeMap<DeviceId, bool> {
        BTreeMap::from([
            (DeviceId::Fan, self.fan.into()),
            (DeviceId::AirConditioner, self.air_conditioner.into()),
            (DeviceId::Lightbulb, self.lightbulb.into()),
            (DeviceId::WarningLight, self.warning_light.into()),
        ])
    }
}

/// Body of `POST /led/control`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlCommand {
    pub device_name: DeviceId,
    pub active: Switch,
}

/// A user's request to switch a device, alive until the command resolves.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlIntent {
    pub id: Uuid,
    pub device: DeviceId,
    pub desired: bool,
    pub issued_at: DateTime<Utc>,
}

impl ControlIntent {
    pub fn new(device: DeviceId, desired: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            device,
            desired,
            issued_at: Utc::now(),
        }
    }

    pub fn command(&self) -> ControlCommand {
        ControlCommand {
            device_name: self.device,
            active: self.desired.into(),
        }
    }
}

/// Row of the raw sensor log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorLogEntry {
    pub id: i64,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub light: Option<f64>,
    #[serde(default)]
    pub wind: Option<f64>,
    pub timestamp: NaiveDateTime,
}

/// Row of the device-activity log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceLogEntry {
    pub id: i64,
    pub device_name: String,
    pub active: Switch,
    pub timestamp: NaiveDateTime,
}

/// Envelope shared by both paginated endpoints.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageResponse<T> {
    pub content: Vec<T>,
    pub total_items: u64,
    #[serde(default)]
    pub current_page: Option<u32>,
    #[serde(default)]
    pub page_size: Option<u32>,
}

/// One page of a log, always replaced as a whole.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageResult<T> {
    pub items: Vec<T>,
    pub total_items: u64,
    /// 1-based, as reported by the server.
    pub current_page: u32,
    pub page_size: u32,
}

impl<T> PageResult<T> {
    /// Missing pagination fields fall back to what was requested.
    pub fn from_response(response: PageResponse<T>, requested_page: u32, requested_size: u32) -> Self {
        Self {
            items: response.content,
            total_items: response.total_items,
            current_page: response.current_page.unwrap_or(requested_page),
            page_size: response.page_size.unwrap_or(requested_size),
        }
    }

    pub fn total_pages(&self) -> u32 {
        if self.page_size == 0 {
            return 0;
        }
        self.total_items.div_ceil(u64::from(self.page_size)) as u32
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct WarningCount {
    pub count: u64,
}
