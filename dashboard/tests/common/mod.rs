#![allow(dead_code)]

use async_trait::async_trait;
use chrono::NaiveDate;
use dashboard::model::{
    ControlCommand, DeviceLogEntry, DeviceStatusReport, LatestReading, PageResult, SensorLogEntry,
    Switch,
};
use dashboard::query::PageQuery;
use dashboard::{Error, RemoteApi, Result};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub const LOG_TOTAL_ITEMS: u64 = 42;

/// Scriptable stand-in for the sensor/actuator service.
pub struct FakeApi {
    /// Served by `latest_reading`; `None` answers 503.
    pub reading: Mutex<Option<LatestReading>>,
    /// When set, each call reports wind equal to the call number.
    pub wind_counts_calls: AtomicBool,
    pub reading_delay: Mutex<Duration>,
    pub reading_calls: AtomicUsize,

    pub status: Mutex<Option<DeviceStatusReport>>,
    /// The report is taken when the call arrives and answered after this delay.
    pub status_delay: Mutex<Duration>,

    pub control_delay: Mutex<Duration>,
    pub fail_control: AtomicBool,
    pub controls: Mutex<Vec<(String, Switch)>>,

    /// Per-call delays for log requests, consumed in order; empty means no delay.
    pub log_delays: Mutex<VecDeque<Duration>>,
    pub fail_logs: AtomicBool,
    pub log_queries: Mutex<Vec<PageQuery>>,

    pub fail_warnings: AtomicBool,
}

impl Default for FakeApi {
    fn default() -> Self {
        Self {
            reading: Mutex::new(Some(reading(24.0, 60.0, 350.0, 5.0))),
            wind_counts_calls: AtomicBool::new(false),
            reading_delay: Mutex::new(Duration::ZERO),
            reading_calls: AtomicUsize::new(0),
            status: Mutex::new(Some(status(false, false, false, false))),
            status_delay: Mutex::new(Duration::ZERO),
            control_delay: Mutex::new(Duration::ZERO),
            fail_control: AtomicBool::new(false),
            controls: Mutex::new(Vec::new()),
            log_delays: Mutex::new(VecDeque::new()),
            fail_logs: AtomicBool::new(false),
            log_queries: Mutex::new(Vec::new()),
            fail_warnings: AtomicBool::new(false),
        }
    }
}

pub fn reading(temperature: f64, humidity: f64, light: f64, wind: f64) -> LatestReading {
    LatestReading {
        temperature: Some(temperature),
        humidity: Some(humidity),
        light: Some(light),
        wind: Some(wind),
    }
}

pub fn status(fan: bool, air_conditioner: bool, lightbulb: bool, warning_light: bool) -> DeviceStatusReport {
    DeviceStatusReport {
        fan: fan.into(),
        air_conditioner: air_conditioner.into(),
        lightbulb: lightbulb.into(),
        warning_light: warning_light.into(),
    }
}

fn unavailable() -> Error {
    Error::Status {
        status: 503,
        body: "unavailable".to_string(),
    }
}

async fn pause(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

impl FakeApi {
    pub fn set_reading(&self, reading: Option<LatestReading>) {
        *self.reading.lock().unwrap() = reading;
    }

    pub fn set_status(&self, status: Option<DeviceStatusReport>) {
        *self.status.lock().unwrap() = status;
    }

    pub fn queries(&self) -> Vec<PageQuery> {
        self.log_queries.lock().unwrap().clone()
    }

    fn next_log_delay(&self) -> Duration {
        self.log_delays.lock().unwrap().pop_front().unwrap_or(Duration::ZERO)
    }

    /// Pages are clamped to the last one, the way a real pager answers.
    fn page_for(&self, query: &PageQuery) -> (u32, u32) {
        let last_page = LOG_TOTAL_ITEMS.div_ceil(u64::from(query.page_size)) as u32;
        (query.page().min(last_page), query.page_size)
    }
}

fn timestamp() -> chrono::NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 10, 1)
        .unwrap()
        .and_hms_opt(10, 0, 0)
        .unwrap()
}

#[async_trait]
impl RemoteApi for FakeApi {
    async fn latest_reading(&self) -> Result<LatestReading> {
        let call = self.reading_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let delay = *self.reading_delay.lock().unwrap();
        pause(delay).await;

        let reading = self.reading.lock().unwrap().clone().ok_or_else(unavailable)?;
        if self.wind_counts_calls.load(Ordering::SeqCst) {
            return Ok(LatestReading {
                wind: Some(call as f64),
                ..reading
            });
        }
        Ok(reading)
    }

    async fn device_status(&self) -> Result<DeviceStatusReport> {
        let report = *self.status.lock().unwrap();
        let delay = *self.status_delay.lock().unwrap();
        pause(delay).await;
        report.ok_or_else(unavailable)
    }

    async fn control(&self, command: &ControlCommand) -> Result<String> {
        self.controls
            .lock()
            .unwrap()
            .push((command.device_name.to_string(), command.active));
        let delay = *self.control_delay.lock().unwrap();
        pause(delay).await;

        if self.fail_control.load(Ordering::SeqCst) {
            return Err(Error::Status {
                status: 500,
                body: "Device did not acknowledge the command".to_string(),
            });
        }
        Ok(format!("Successfully controlled : {}", command.device_name))
    }

    async fn sensor_log(&self, query: &PageQuery) -> Result<PageResult<SensorLogEntry>> {
        self.log_queries.lock().unwrap().push(query.clone());
        let call = self.log_queries.lock().unwrap().len() as i64;
        pause(self.next_log_delay()).await;

        if self.fail_logs.load(Ordering::SeqCst) {
            return Err(unavailable());
        }

        let temperature = match query.filter() {
            Some(("temperature", value)) => value.parse().ok(),
            _ => None,
        };
        let (current_page, page_size) = self.page_for(query);
        Ok(PageResult {
            items: vec![SensorLogEntry {
                id: call,
                temperature,
                humidity: Some(55.0),
                light: Some(300.0),
                wind: Some(4.0),
                timestamp: timestamp(),
            }],
            total_items: LOG_TOTAL_ITEMS,
            current_page,
            page_size,
        })
    }

    async fn device_log(&self, query: &PageQuery) -> Result<PageResult<DeviceLogEntry>> {
        self.log_queries.lock().unwrap().push(query.clone());
        let call = self.log_queries.lock().unwrap().len() as i64;
        pause(self.next_log_delay()).await;

        if self.fail_logs.load(Ordering::SeqCst) {
            return Err(unavailable());
        }

        let device_name = match query.filter() {
            Some(("deviceName", value)) => value.to_string(),
            _ => "fan".to_string(),
        };
        let (current_page, page_size) = self.page_for(query);
        Ok(PageResult {
            items: vec![DeviceLogEntry {
                id: call,
                device_name,
                active: Switch::On,
                timestamp: timestamp(),
            }],
            total_items: LOG_TOTAL_ITEMS,
            current_page,
            page_size,
        })
    }

    async fn warning_count(&self) -> Result<u64> {
        if self.fail_warnings.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        Ok(3)
    }
}
