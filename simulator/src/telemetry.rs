use chrono::{Local, NaiveDateTime};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// One row of the sensor log, also served as the latest reading.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorReading {
    pub id: u64,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub light: Option<f64>,
    pub wind: Option<f64>,
    pub timestamp: NaiveDateTime,
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

/// One row of the device-activity log.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceActivity {
    pub id: u64,
    pub device_name: String,
    pub active: Switch,
    pub timestamp: NaiveDateTime,
}

pub fn now() -> NaiveDateTime {
    Local::now().naive_local()
}

/// Readings stay in range but occasionally spike, and the humidity sensor
/// sometimes drops out.
pub fn generate_reading(rng: &mut impl Rng, id: u64, timestamp: NaiveDateTime) -> SensorReading {
    let temperature = if rng.gen_bool(0.05) {
        rng.gen_range(-50.0..100.0) // 5% outliers
    } else {
        rng.gen_range(18.0..34.0)
    };

    let humidity = if rng.gen_bool(0.02) {
        None
    } else {
        Some(rng.gen_range(30.0..90.0))
    };

    let light: f64 = rng.gen_range(0.0..1000.0);

    let wind = if rng.gen_bool(0.05) {
        rng.gen_range(60.0..100.0) // 5% gusts
    } else {
        rng.gen_range(0.0..30.0)
    };

    SensorReading {
        id,
        temperature: Some(round1(temperature)),
        humidity: humidity.map(round1),
        light: Some(light.round()),
        wind: Some(round1(wind)),
        timestamp,
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
