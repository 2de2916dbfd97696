//! Device status and the optimistic command dispatcher.
//!
//! Each device moves `Idle -> Pending -> Idle`. While pending, the
//! optimistic value shows the requested state; the command resolves to
//! either a confirmation or a rollback to the last confirmed value, and a
//! rollback raises a [`Notice`].

use crate::client::RemoteApi;
use crate::errors::{Error, Result};
use crate::metrics::{COMMANDS_TOTAL, COMMAND_FAILURES_TOTAL, STALE_RESULTS_TOTAL};
use crate::model::{ControlIntent, DeviceId, DeviceStatusReport};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const NOTICE_CAPACITY: usize = 32;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeviceControl {
    /// Last value acknowledged by the service.
    pub confirmed: bool,
    /// Value shown to the user.
    pub optimistic: bool,
    /// A command for this device is in flight.
    pub pending: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceBoard {
    #[serde(flatten)]
    controls: BTreeMap<DeviceId, DeviceControl>,
    /// Bumped on every local transition of a device.
    #[serde(skip)]
    epochs: BTreeMap<DeviceId, u64>,
}

impl Default for DeviceBoard {
    fn default() -> Self {
        Self {
            controls: DeviceId::ALL
                .into_iter()
                .map(|id| (id, DeviceControl::default()))
                .collect(),
            epochs: BTreeMap::new(),
        }
    }
}

impl DeviceBoard {
    pub fn get(&self, device: DeviceId) -> DeviceControl {
        self.controls.get(&device).copied().unwrap_or_default()
    }

    fn epoch(&self, device: DeviceId) -> u64 {
        self.epochs.get(&device).copied().unwrap_or(0)
    }

    fn entry(&mut self, device: DeviceId) -> &mut DeviceControl {
        self.controls.entry(device).or_default()
    }

    /// Marks a local transition; status read before it is outdated for `device`.
    fn bump(&mut self, device: DeviceId) -> &mut DeviceControl {
        *self.epochs.entry(device).or_insert(0) += 1;
        self.entry(device)
    }
}

/// Per-device epochs observed before a status request went out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceEpochs(BTreeMap<DeviceId, u64>);

/// Shared device status. Readers subscribe; the poller refreshes the
/// confirmed values and the dispatcher drives the optimistic ones.
#[derive(Debug, Clone)]
pub struct DeviceStore {
    board: Arc<watch::Sender<DeviceBoard>>,
}

impl Default for DeviceStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceStore {
    pub fn new() -> Self {
        Self {
            board: Arc::new(watch::Sender::new(DeviceBoard::default())),
        }
    }

    pub fn current(&self) -> DeviceBoard {
        self.board.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<DeviceBoard> {
        self.board.subscribe()
    }

    /// Epochs to pass to [`DeviceStore::refresh_confirmed`] with the next status report.
    pub fn epochs(&self) -> DeviceEpochs {
        DeviceEpochs(self.board.borrow().epochs.clone())
    }

    /// Applies a status report requested when the board was at `observed`.
    ///
    /// Devices switched locally since then keep their state: the report
    /// predates the transition. Pending devices keep their optimistic value.
    pub fn refresh_confirmed(&self, report: &DeviceStatusReport, observed: &DeviceEpochs) {
        let states = report.states();
        self.board.send_if_modified(|board| {
            let before = board.clone();
            for (device, on) in &states {
                let seen = observed.0.get(device).copied().unwrap_or(0);
                if board.epoch(*device) != seen {
                    STALE_RESULTS_TOTAL.inc();
                    debug!("Ignoring status of {} read before its last transition", device);
                    continue;
                }
                let control = board.entry(*device);
                control.confirmed = *on;
                if !control.pending {
                    control.optimistic = *on;
                }
            }
            *board != before
        });
    }

    fn begin(&self, intent: &ControlIntent) -> Result<()> {
        let mut outcome = Ok(());
        self.board.send_if_modified(|board| {
            if board.get(intent.device).pending {
                outcome = Err(Error::Busy(intent.device));
                return false;
            }
            let control = board.bump(intent.device);
            control.pending = true;
            control.optimistic = intent.desired;
            true
        });
        outcome
    }

    fn confirm(&self, device: DeviceId, on: bool) {
        self.board.send_modify(|board| {
            let control = board.bump(device);
            control.confirmed = on;
            control.optimistic = on;
            control.pending = false;
        });
    }

    fn roll_back(&self, device: DeviceId) {
        self.board.send_modify(|board| {
            let control = board.bump(device);
            control.optimistic = control.confirmed;
            control.pending = false;
        });
    }
}

/// User-visible report of a command that did not go through.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notice {
    pub device: DeviceId,
    pub desired: bool,
    pub message: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    Confirmed,
    RolledBack,
}

#[derive(Clone)]
pub struct Dispatcher {
    api: Arc<dyn RemoteApi>,
    devices: DeviceStore,
    notices: broadcast::Sender<Notice>,
}

impl Dispatcher {
    pub fn new(api: Arc<dyn RemoteApi>, devices: DeviceStore) -> Self {
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);
        Self {
            api,
            devices,
            notices,
        }
    }

    pub fn devices(&self) -> &DeviceStore {
        &self.devices
    }

    pub fn subscribe_notices(&self) -> broadcast::Receiver<Notice> {
        self.notices.subscribe()
    }

    /// Flips the device's displayed state.
    pub fn toggle(&self, device: DeviceId) -> Result<(ControlIntent, JoinHandle<CommandOutcome>)> {
        let desired = !self.devices.current().get(device).optimistic;
        self.set(device, desired)
    }

    /// Shows `desired` immediately and sends exactly one command for it.
    ///
    /// Fails with [`Error::Busy`] while a previous command for the same
    /// device is unresolved. The returned handle completes once the
    /// device is idle again.
    pub fn set(&self, device: DeviceId, desired: bool) -> Result<(ControlIntent, JoinHandle<CommandOutcome>)> {
        let intent = ControlIntent::new(device, desired);
        self.devices.begin(&intent)?;
        debug!("Dispatching {} -> {} ({})", device, desired, intent.id);

        let api = Arc::clone(&self.api);
        let devices = self.devices.clone();
        let notices = self.notices.clone();
        let task_intent = intent.clone();
        let handle = tokio::spawn(async move { resolve(api.as_ref(), &devices, &notices, task_intent).await });

        Ok((intent, handle))
    }
}

async fn resolve(
    api: &dyn RemoteApi,
    devices: &DeviceStore,
    notices: &broadcast::Sender<Notice>,
    intent: ControlIntent,
) -> CommandOutcome {
    COMMANDS_TOTAL.inc();

    match api.control(&intent.command()).await {
        Ok(ack) => {
            info!("{} switched {}: {}", intent.device, on_off(intent.desired), ack);
            devices.confirm(intent.device, intent.desired);
            CommandOutcome::Confirmed
        }
        Err(e) => {
            COMMAND_FAILURES_TOTAL.inc();
            warn!("Failed to switch {} {}: {}", intent.device, on_off(intent.desired), e);
            devices.roll_back(intent.device);

            let notice = Notice {
                device: intent.device,
                desired: intent.desired,
                message: format!("Could not turn {} {}: {}", intent.device, on_off(intent.desired), e),
                at: Utc::now(),
            };
            // No subscribers is fine; the failure is already logged.
            let _ = notices.send(notice);
            CommandOutcome::RolledBack
        }
    }
}

fn on_off(on: bool) -> &'static str {
    if on {
        "on"
    } else {
        "off"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Switch;

    fn report(fan: bool) -> DeviceStatusReport {
        DeviceStatusReport {
            fan: fan.into(),
            air_conditioner: Switch::Off,
            lightbulb: Switch::On,
            warning_light: Switch::Off,
        }
    }

    #[test]
    fn test_refresh_sets_idle_devices() {
        let store = DeviceStore::new();
        store.refresh_confirmed(&report(true), &store.epochs());

        let fan = store.current().get(DeviceId::Fan);
        assert!(fan.confirmed);
        assert!(fan.optimistic);
        assert!(store.current().get(DeviceId::Lightbulb).optimistic);
    }

    #[test]
    fn test_refresh_keeps_pending_optimistic_value() {
        let store = DeviceStore::new();
        store.begin(&ControlIntent::new(DeviceId::Fan, true)).unwrap();
        store.refresh_confirmed(&report(false), &store.epochs());

        let fan = store.current().get(DeviceId::Fan);
        assert!(fan.pending);
        assert!(fan.optimistic);
        assert!(!fan.confirmed);
    }

    #[test]
    fn test_begin_rejects_second_intent() {
        let store = DeviceStore::new();
        store.begin(&ControlIntent::new(DeviceId::Lightbulb, true)).unwrap();

        let second = store.begin(&ControlIntent::new(DeviceId::Lightbulb, false));
        assert!(matches!(second, Err(Error::Busy(DeviceId::Lightbulb))));
        assert!(store.current().get(DeviceId::Lightbulb).optimistic);

        // Other devices are independent.
        assert!(store.begin(&ControlIntent::new(DeviceId::Fan, true)).is_ok());
    }

    #[test]
    fn test_roll_back_restores_confirmed() {
        let store = DeviceStore::new();
        store.refresh_confirmed(&report(true), &store.epochs());
        store.begin(&ControlIntent::new(DeviceId::Fan, false)).unwrap();
        store.roll_back(DeviceId::Fan);

        assert_eq!(
            store.current().get(DeviceId::Fan),
            DeviceControl {
                confirmed: true,
                optimistic: true,
                pending: false,
            }
        );
    }

    #[test]
    fn test_status_read_before_confirm_is_ignored() {
        let store = DeviceStore::new();
        let observed = store.epochs();

        store.begin(&ControlIntent::new(DeviceId::Fan, true)).unwrap();
        store.confirm(DeviceId::Fan, true);
        store.refresh_confirmed(&report(false), &observed);

        let fan = store.current().get(DeviceId::Fan);
        assert!(fan.confirmed);
        assert!(fan.optimistic);
        // Untouched devices still take the report.
        assert!(store.current().get(DeviceId::Lightbulb).confirmed);
    }

    #[test]
    fn test_board_json_hides_epochs() {
        let store = DeviceStore::new();
        store.begin(&ControlIntent::new(DeviceId::Fan, true)).unwrap();

        let json = serde_json::to_value(store.current()).unwrap();
        assert_eq!(
            json["fan"],
            serde_json::json!({"confirmed": false, "optimistic": true, "pending": true})
        );
        assert_eq!(json.as_object().unwrap().len(), 4);
    }
}
