//! In-memory sensor log, device state and device-activity log.

use crate::telemetry::{DeviceActivity, SensorReading, Switch};
use chrono::{NaiveDate, NaiveDateTime, Timelike};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, VecDeque};

pub const DEVICES: [&str; 4] = ["fan", "airConditioner", "lightbulb", "warningLight"];
pub const WARNING_LIGHT: &str = "warningLight";

const DEFAULT_PAGE_SIZE: u32 = 10;
const MAX_PAGE_SIZE: u32 = 100;

const SENSOR_FILTERS: [&str; 5] = ["temperature", "humidity", "light", "wind", "timestamp"];
const SENSOR_SORTS: [&str; 6] = ["id", "temperature", "humidity", "light", "wind", "timestamp"];
const DEVICE_FILTERS: [&str; 3] = ["deviceName", "active", "timestamp"];
const DEVICE_SORTS: [&str; 4] = ["id", "deviceName", "active", "timestamp"];

/// Rejected query parameters, answered with 400.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BadRequest(pub String);

/// Paging, sorting and one optional filter, parsed from a query string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogQuery {
    pub page_number: u32,
    pub page_size: u32,
    pub sort_by: String,
    pub descending: bool,
    pub filter: Option<(String, String)>,
}

impl LogQuery {
    fn parse(params: &HashMap<String, String>, filters: &[&str], sorts: &[&str]) -> Result<Self, BadRequest> {
        let page_number = parse_number(params, "pageNumber", 0)?;
        let page_size = parse_number(params, "pageSize", DEFAULT_PAGE_SIZE)?;
        if page_size == 0 || page_size > MAX_PAGE_SIZE {
            return Err(BadRequest(format!("pageSize must be 1..={}", MAX_PAGE_SIZE)));
        }

        let sort_by = params
            .get("sortBy")
            .cloned()
            .unwrap_or_else(|| "timestamp".to_string());
        if !sorts.contains(&sort_by.as_str()) {
            return Err(BadRequest(format!("Cannot sort by {}", sort_by)));
        }

        let descending = match params.get("sortDirection").map(String::as_str) {
            None | Some("desc") => true,
            Some("asc") => false,
            Some(other) => return Err(BadRequest(format!("Unknown sort direction {}", other))),
        };

        let filter = filters
            .iter()
            .find_map(|field| params.get(*field).map(|value| (field.to_string(), value.clone())));

        Ok(Self {
            page_number,
            page_size,
            sort_by,
            descending,
            filter,
        })
    }
}

fn parse_number(params: &HashMap<String, String>, key: &str, default: u32) -> Result<u32, BadRequest> {
    match params.get(key) {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|_| BadRequest(format!("{} must be a non-negative integer, got {:?}", key, raw))),
    }
}

/// A timestamp filter matches either a calendar day or a clock minute.
enum TimeFilter {
    Day(NaiveDate),
    Minute(u32, u32),
}

impl TimeFilter {
    fn parse(value: &str) -> Result<Self, BadRequest> {
        if let Ok(day) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
            return Ok(TimeFilter::Day(day));
        }
        if let Some((hour, minute)) = value.split_once(':') {
            if let (Ok(hour), Ok(minute)) = (hour.parse::<u32>(), minute.parse::<u32>()) {
                if hour < 24 && minute < 60 {
                    return Ok(TimeFilter::Minute(hour, minute));
                }
            }
        }
        Err(BadRequest(format!("Timestamp filter {:?} must be YYYY-MM-DD or HH:MM", value)))
    }

    fn matches(&self, timestamp: &NaiveDateTime) -> bool {
        match self {
            TimeFilter::Day(day) => timestamp.date() == *day,
            TimeFilter::Minute(hour, minute) => timestamp.hour() == *hour && timestamp.minute() == *minute,
        }
    }
}

fn parse_integer(field: &str, value: &str) -> Result<i64, BadRequest> {
    value
        .parse()
        .map_err(|_| BadRequest(format!("Filter {} needs an integer, got {:?}", field, value)))
}

fn same_integer(value: Option<f64>, wanted: i64) -> bool {
    value.is_some_and(|v| v.round() as i64 == wanted)
}

fn compare_optional(a: Option<f64>, b: Option<f64>) -> Ordering {
    a.partial_cmp(&b).unwrap_or(Ordering::Equal)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub content: Vec<T>,
    pub total_items: usize,
    /// 1-based.
    pub current_page: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_size: Option<u32>,
    pub total_pages: u32,
}

fn paginate<T: Clone>(rows: Vec<T>, query: &LogQuery) -> Page<T> {
    let total_items = rows.len();
    let page_size = query.page_size as usize;
    let content = rows
        .into_iter()
        .skip(query.page_number as usize * page_size)
        .take(page_size)
        .collect();

    Page {
        content,
        total_items,
        current_page: query.page_number + 1,
        page_size: Some(query.page_size),
        total_pages: total_items.div_ceil(page_size) as u32,
    }
}

/// Device state as reported by `/led/status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceStatus {
    pub fan: Switch,
    pub air_conditioner: Switch,
    pub lightbulb: Switch,
    pub warning: Switch,
}

pub struct Store {
    readings: VecDeque<SensorReading>,
    history_limit: usize,
    next_reading_id: u64,
    devices: BTreeMap<&'static str, bool>,
    /// Capped at `history_limit` like the readings.
    activity: VecDeque<DeviceActivity>,
    next_activity_id: u64,
}

impl Store {
    pub fn new(history_limit: usize) -> Self {
        Self {
            readings: VecDeque::new(),
            history_limit: history_limit.max(1),
            next_reading_id: 1,
            devices: DEVICES.into_iter().map(|name| (name, false)).collect(),
            activity: VecDeque::new(),
            next_activity_id: 1,
        }
    }

    pub fn next_reading_id(&mut self) -> u64 {
        let id = self.next_reading_id;
        self.next_reading_id += 1;
        id
    }

    pub fn record_reading(&mut self, reading: SensorReading) {
        if self.readings.len() == self.history_limit {
            self.readings.pop_front();
        }
        self.readings.push_back(reading);
    }

    pub fn latest(&self) -> Option<&SensorReading> {
        self.readings.back()
    }

    pub fn status(&self) -> DeviceStatus {
        let on = |name: &str| Switch::from(self.devices.get(name).copied().unwrap_or(false));
        DeviceStatus {
            fan: on("fan"),
            air_conditioner: on("airConditioner"),
            lightbulb: on("lightbulb"),
            warning: on(WARNING_LIGHT),
        }
    }

    /// Switches a device and logs the change. Returns whether the state changed.
    pub fn set_device(&mut self, name: &str, on: bool, at: NaiveDateTime) -> Result<bool, BadRequest> {
        let (key, state) = self
            .devices
            .iter_mut()
            .find(|(key, _)| **key == name)
            .ok_or_else(|| BadRequest(format!("Unknown device {}", name)))?;

        let changed = *state != on;
        *state = on;

        let id = self.next_activity_id;
        self.next_activity_id += 1;
        if self.activity.len() == self.history_limit {
            self.activity.pop_front();
        }
        self.activity.push_back(DeviceActivity {
            id,
            device_name: key.to_string(),
            active: on.into(),
            timestamp: at,
        });
        Ok(changed)
    }

    pub fn sensor_log(&self, params: &HashMap<String, String>) -> Result<Page<SensorReading>, BadRequest> {
        let query = LogQuery::parse(params, &SENSOR_FILTERS, &SENSOR_SORTS)?;

        let mut rows: Vec<SensorReading> = match &query.filter {
            None => self.readings.iter().cloned().collect(),
            Some((field, value)) if field == "timestamp" => {
                let filter = TimeFilter::parse(value)?;
                self.readings
                    .iter()
                    .filter(|r| filter.matches(&r.timestamp))
                    .cloned()
                    .collect()
            }
            Some((field, value)) => {
                let wanted = parse_integer(field, value)?;
                self.readings
                    .iter()
                    .filter(|r| {
                        let reading = match field.as_str() {
                            "temperature" => r.temperature,
                            "humidity" => r.humidity,
                            "light" => r.light,
                            _ => r.wind,
                        };
                        same_integer(reading, wanted)
                    })
                    .cloned()
                    .collect()
            }
        };

        rows.sort_by(|a, b| {
            let ordering = match query.sort_by.as_str() {
                "id" => a.id.cmp(&b.id),
                "temperature" => compare_optional(a.temperature, b.temperature),
                "humidity" => compare_optional(a.humidity, b.humidity),
                "light" => compare_optional(a.light, b.light),
                "wind" => compare_optional(a.wind, b.wind),
                _ => a.timestamp.cmp(&b.timestamp),
            };
            if query.descending {
                ordering.reverse()
            } else {
                ordering
            }
        });

        Ok(paginate(rows, &query))
    }

    /// Same envelope as the sensor log, minus `pageSize`.
    pub fn device_log(&self, params: &HashMap<String, String>) -> Result<Page<DeviceActivity>, BadRequest> {
        let query = LogQuery::parse(params, &DEVICE_FILTERS, &DEVICE_SORTS)?;

        let mut rows: Vec<DeviceActivity> = match &query.filter {
            None => self.activity.iter().cloned().collect(),
            Some((field, value)) if field == "timestamp" => {
                let filter = TimeFilter::parse(value)?;
                self.activity
                    .iter()
                    .filter(|a| filter.matches(&a.timestamp))
                    .cloned()
                    .collect()
            }
            Some((field, value)) if field == "active" => {
                let wanted = match value.as_str() {
                    "on" => Switch::On,
                    "off" => Switch::Off,
                    _ => return Err(BadRequest(format!("Filter active must be on or off, got {:?}", value))),
                };
                self.activity
                    .iter()
                    .filter(|a| a.active == wanted)
                    .cloned()
                    .collect()
            }
            Some((_, value)) => self
                .activity
                .iter()
                .filter(|a| a.device_name == *value)
                .cloned()
                .collect(),
        };

        rows.sort_by(|a, b| {
            let ordering = match query.sort_by.as_str() {
                "id" => a.id.cmp(&b.id),
                "deviceName" => a.device_name.cmp(&b.device_name),
                "active" => (a.active == Switch::On).cmp(&(b.active == Switch::On)),
                _ => a.timestamp.cmp(&b.timestamp),
            };
            if query.descending {
                ordering.reverse()
            } else {
                ordering
            }
        });

        let mut page = paginate(rows, &query);
        page.page_size = None;
        Ok(page)
    }

    /// Warning-light activations on `day`.
    pub fn warning_count(&self, day: NaiveDate) -> usize {
        self.activity
            .iter()
            .filter(|a| a.device_name == WARNING_LIGHT && a.active == Switch::On && a.timestamp.date() == day)
            .count()
    }
}
