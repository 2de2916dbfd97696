//! Recurring fetch of the latest reading and device status.

use crate::cache::WindCache;
use crate::client::RemoteApi;
use crate::devices::{DeviceEpochs, DeviceStore};
use crate::errors::Result;
use crate::metrics::{POLLS_TOTAL, POLL_FAILURES_TOTAL, STALE_RESULTS_TOTAL};
use crate::model::{DeviceStatusReport, SensorSample, SensorSnapshot};
use crate::validate::validate;
use crate::window::TimeSeriesWindow;
use chrono::Utc;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

pub const DEFAULT_WIND_WARNING_THRESHOLD: f64 = 70.0;

#[derive(Debug, Clone)]
pub struct PollerConfig {
    pub interval: Duration,
    pub window_capacity: usize,
    pub poll_devices: bool,
    pub wind_warning_threshold: f64,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(5000),
            window_capacity: 5,
            poll_devices: true,
            wind_warning_threshold: DEFAULT_WIND_WARNING_THRESHOLD,
        }
    }
}

/// What readers see. Replaced whole on every applied cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryState {
    pub snapshot: Option<SensorSnapshot>,
    pub high_wind: bool,
    pub samples: Vec<SensorSample>,
    /// Number of cycles applied since the poller was created.
    pub applied_cycles: u64,
}

/// Ties an async operation to the poller run that started it.
#[derive(Debug, Clone)]
pub struct Liveness {
    current: Arc<AtomicU64>,
    generation: u64,
}

impl Liveness {
    pub fn is_live(&self) -> bool {
        self.current.load(Ordering::Acquire) == self.generation
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

pub struct Poller {
    api: Arc<dyn RemoteApi>,
    config: PollerConfig,
    devices: DeviceStore,
    telemetry: Arc<watch::Sender<TelemetryState>>,
    cache: Option<WindCache>,
    generation: Arc<AtomicU64>,
    task: Option<JoinHandle<()>>,
}

impl Poller {
    pub fn new(api: Arc<dyn RemoteApi>, config: PollerConfig, devices: DeviceStore) -> Self {
        Self {
            api,
            config,
            devices,
            telemetry: Arc::new(watch::Sender::new(TelemetryState::default())),
            cache: None,
            generation: Arc::new(AtomicU64::new(0)),
            task: None,
        }
    }

    /// Persists the window to `cache` after every applied cycle.
    pub fn with_cache(mut self, cache: WindCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Seeds the window from the cache, if one is configured.
    pub async fn restore(&self) -> Result<usize> {
        let Some(cache) = &self.cache else {
            return Ok(0);
        };
        let points = cache.load().await?;
        let window = TimeSeriesWindow::with_samples(
            self.config.window_capacity,
            points.into_iter().map(SensorSample::from),
        );
        let restored = window.len();
        self.telemetry.send_modify(|state| state.samples = window.snapshot());
        info!("Restored {} samples from {}", restored, cache.path().display());
        Ok(restored)
    }

    pub fn subscribe(&self) -> watch::Receiver<TelemetryState> {
        self.telemetry.subscribe()
    }

    pub fn current(&self) -> TelemetryState {
        self.telemetry.borrow().clone()
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Fetches once right away, then every `interval`. Restarts if running.
    pub fn start(&mut self) -> Liveness {
        self.stop();

        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let liveness = Liveness {
            current: Arc::clone(&self.generation),
            generation,
        };

        let cycle = PollCycle {
            api: Arc::clone(&self.api),
            config: self.config.clone(),
            devices: self.devices.clone(),
            telemetry: Arc::clone(&self.telemetry),
            cache: self.cache.clone(),
        };
        let window = TimeSeriesWindow::with_samples(
            self.config.window_capacity,
            self.telemetry.borrow().samples.clone(),
        );

        info!(
            "Starting poller (generation {}, every {:?}, window {})",
            generation, self.config.interval, self.config.window_capacity
        );
        self.task = Some(tokio::spawn(run_poller(cycle, liveness.clone(), window)));
        liveness
    }

    /// Stops the schedule. Nothing from the stopped run is applied afterwards.
    pub fn stop(&mut self) {
        // Bump first: a cycle racing the abort on another worker sees a dead token.
        self.generation.fetch_add(1, Ordering::AcqRel);
        // Wait out a cycle that is mid-write; it saw the old generation.
        self.telemetry.send_if_modified(|_| false);
        if let Some(task) = self.task.take() {
            task.abort();
            info!("Poller stopped");
        }
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.stop();
    }
}

struct PollCycle {
    api: Arc<dyn RemoteApi>,
    config: PollerConfig,
    devices: DeviceStore,
    telemetry: Arc<watch::Sender<TelemetryState>>,
    cache: Option<WindCache>,
}

struct CycleResult {
    snapshot: SensorSnapshot,
    devices: Option<(DeviceStatusReport, DeviceEpochs)>,
}

async fn run_poller(cycle: PollCycle, liveness: Liveness, mut window: TimeSeriesWindow<SensorSample>) {
    let mut ticker = interval(cycle.config.interval);
    // A slow fetch delays the next one instead of stacking requests.
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        if !liveness.is_live() {
            break;
        }

        POLLS_TOTAL.inc();
        match cycle.fetch().await {
            Ok(result) => {
                if !cycle.apply(result, &mut window, &liveness).await {
                    STALE_RESULTS_TOTAL.inc();
                    debug!("Discarding poll result from stopped generation {}", liveness.generation());
                    break;
                }
            }
            Err(e) => {
                POLL_FAILURES_TOTAL.inc();
                warn!("Poll failed, keeping previous state: {}", e);
            }
        }
    }
}

impl PollCycle {
    /// Either every requested piece arrives valid or nothing is applied.
    async fn fetch(&self) -> Result<CycleResult> {
        let reading = self.api.latest_reading().await?;
        validate(&reading)?;

        let devices = if self.config.poll_devices {
            let observed = self.devices.epochs();
            Some((self.api.device_status().await?, observed))
        } else {
            None
        };

        Ok(CycleResult {
            snapshot: reading.into_snapshot(Utc::now()),
            devices,
        })
    }

    /// Returns false, leaving shared state untouched, once the run is stopped.
    async fn apply(
        &self,
        result: CycleResult,
        window: &mut TimeSeriesWindow<SensorSample>,
        liveness: &Liveness,
    ) -> bool {
        window.append(SensorSample::from_snapshot(&result.snapshot));
        let high_wind = result
            .snapshot
            .wind
            .is_some_and(|wind| wind > self.config.wind_warning_threshold);
        let samples = window.snapshot();

        // Checked under the channel lock, which `Poller::stop` also takes, so
        // nothing from this cycle lands after `stop` returns.
        let devices = &self.devices;
        let applied = self.telemetry.send_if_modified(|state| {
            if !liveness.is_live() {
                return false;
            }
            *state = TelemetryState {
                snapshot: Some(result.snapshot),
                high_wind,
                samples,
                applied_cycles: state.applied_cycles + 1,
            };
            if let Some((report, observed)) = &result.devices {
                devices.refresh_confirmed(report, observed);
            }
            true
        });
        if !applied {
            return false;
        }

        if let Some(cache) = &self.cache {
            if let Err(e) = cache.store(&window.snapshot()).await {
                warn!("Failed to write wind cache {}: {}", cache.path().display(), e);
            }
        }
        true
    }
}
