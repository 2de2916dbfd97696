//! Debounced, sequence-checked controller for one paginated log table.
//!
//! A single task owns the query state, the debounce timer and the
//! last-issued sequence number. Requests run concurrently; only the
//! response carrying the latest sequence number is applied.

use crate::client::RemoteApi;
use crate::errors::{Error, Result};
use crate::metrics::{STALE_RESULTS_TOTAL, TABLE_REQUESTS_TOTAL};
use crate::model::{DeviceLogEntry, PageResult, SensorLogEntry};
use crate::query::{PageQuery, QueryState, SortDirection};
use crate::validate::{validate_filter, validate_page_size};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, warn};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

const INPUT_CAPACITY: usize = 64;

/// One paginated collection of the remote service.
#[async_trait]
pub trait LogTable: Send + Sync + 'static {
    type Row: Clone + Send + Sync + Serialize + 'static;

    const NAME: &'static str;
    const FILTER_FIELDS: &'static [&'static str];
    const SORT_FIELDS: &'static [&'static str];

    async fn fetch(api: &dyn RemoteApi, query: &PageQuery) -> Result<PageResult<Self::Row>>;
}

pub struct SensorLog;

#[async_trait]
impl LogTable for SensorLog {
    type Row = SensorLogEntry;

    const NAME: &'static str = "sensor-log";
    const FILTER_FIELDS: &'static [&'static str] = &["temperature", "humidity", "light", "timestamp"];
    const SORT_FIELDS: &'static [&'static str] = &["id", "temperature", "humidity", "light", "wind", "timestamp"];

    async fn fetch(api: &dyn RemoteApi, query: &PageQuery) -> Result<PageResult<SensorLogEntry>> {
        api.sensor_log(query).await
    }
}

pub struct DeviceLog;

#[async_trait]
impl LogTable for DeviceLog {
    type Row = DeviceLogEntry;

    const NAME: &'static str = "device-log";
    const FILTER_FIELDS: &'static [&'static str] = &["deviceName", "active", "timestamp"];
    const SORT_FIELDS: &'static [&'static str] = &["id", "deviceName", "active", "timestamp"];

    async fn fetch(api: &dyn RemoteApi, query: &PageQuery) -> Result<PageResult<DeviceLogEntry>> {
        api.device_log(query).await
    }
}

/// A single edit of the table controls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum TableInput {
    FilterValue { value: String },
    FilterField { field: String },
    SortField { field: String },
    SortDirection { direction: Option<SortDirection> },
    Page { page: u32 },
    PageSize { size: u32 },
    /// Fetch now, skipping the debounce.
    Search,
    /// Back to defaults, then fetch now.
    Reset,
}

/// Rendered table. Rows and pagination always come from the same response.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableView<R> {
    pub query: QueryState,
    pub rows: Vec<R>,
    pub total_items: u64,
    pub current_page: u32,
    pub page_size: u32,
    pub total_pages: u32,
    pub loading: bool,
    pub error: Option<String>,
    /// Sequence number of the response the rows came from; 0 before any.
    pub applied_seq: u64,
}

impl<R> Default for TableView<R> {
    fn default() -> Self {
        let query = QueryState::default();
        Self {
            current_page: query.page,
            page_size: query.page_size,
            query,
            rows: Vec::new(),
            total_items: 0,
            total_pages: 0,
            loading: false,
            error: None,
            applied_seq: 0,
        }
    }
}

pub struct TableController<T: LogTable> {
    inputs: mpsc::Sender<TableInput>,
    view: watch::Receiver<TableView<T::Row>>,
    task: JoinHandle<()>,
    _table: PhantomData<T>,
}

impl<T: LogTable> TableController<T> {
    /// Spawns the controller and loads the first page immediately.
    pub fn spawn(api: Arc<dyn RemoteApi>, debounce: Duration) -> Self {
        let (inputs, rx) = mpsc::channel(INPUT_CAPACITY);
        let (view_tx, view) = watch::channel(TableView::default());
        let task = tokio::spawn(run_table::<T>(api, rx, view_tx, debounce));

        Self {
            inputs,
            view,
            task,
            _table: PhantomData,
        }
    }

    /// Checks the input against this table's columns, then queues it.
    pub async fn send(&self, input: TableInput) -> Result<()> {
        match &input {
            TableInput::FilterField { field } => check_field(field, T::FILTER_FIELDS)?,
            TableInput::SortField { field } => check_field(field, T::SORT_FIELDS)?,
            TableInput::PageSize { size } => validate_page_size(*size)?,
            TableInput::Page { page } if *page == 0 => {
                return Err(Error::Validation("Pages are numbered from 1".to_string()));
            }
            _ => {}
        }

        self.inputs.send(input).await.map_err(|_| Error::ChannelSend)
    }

    pub fn view(&self) -> TableView<T::Row> {
        self.view.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<TableView<T::Row>> {
        self.view.clone()
    }

    /// Cancels the debounce timer. Requests already sent are left to finish and ignored.
    pub fn stop(&self) {
        self.task.abort();
    }
}

impl<T: LogTable> Drop for TableController<T> {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn check_field(field: &str, allowed: &[&str]) -> Result<()> {
    if field.is_empty() || allowed.contains(&field) {
        Ok(())
    } else {
        Err(Error::Validation(format!(
            "Unknown column {:?}, expected one of {:?}",
            field, allowed
        )))
    }
}

enum Trigger {
    Debounced,
    Immediate,
}

/// Folds one input into the state and says when to fetch.
fn apply_input(state: &mut QueryState, input: TableInput) -> Trigger {
    match input {
        TableInput::FilterValue { value } => {
            state.filter_value = value;
            state.page = 1;
            Trigger::Debounced
        }
        TableInput::FilterField { field } => {
            state.filter_field = field;
            state.page = 1;
            Trigger::Debounced
        }
        TableInput::SortField { field } => {
            state.sort_field = field;
            Trigger::Debounced
        }
        TableInput::SortDirection { direction } => {
            state.sort_direction = direction;
            Trigger::Debounced
        }
        TableInput::Page { page } => {
            state.page = page.max(1);
            Trigger::Debounced
        }
        TableInput::PageSize { size } => {
            state.page_size = size;
            state.page = 1;
            Trigger::Debounced
        }
        TableInput::Search => Trigger::Immediate,
        TableInput::Reset => {
            *state = QueryState {
                page_size: state.page_size,
                ..QueryState::default()
            };
            Trigger::Immediate
        }
    }
}

struct Issuer<T: LogTable> {
    api: Arc<dyn RemoteApi>,
    view: watch::Sender<TableView<T::Row>>,
    done: mpsc::UnboundedSender<(u64, Result<PageResult<T::Row>>)>,
    issued: u64,
}

impl<T: LogTable> Issuer<T> {
    fn issue(&mut self, state: &QueryState) {
        let query = state.to_query();

        if let Some((field, value)) = query.filter() {
            if let Err(e) = validate_filter(field, value) {
                debug!("[{}] Not querying invalid filter: {}", T::NAME, e);
                // Anything still in flight now answers an abandoned query.
                self.issued += 1;
                self.view.send_modify(|view| {
                    view.query = state.clone();
                    view.loading = false;
                    view.error = Some(e.to_string());
                });
                return;
            }
        }

        self.issued += 1;
        let seq = self.issued;
        TABLE_REQUESTS_TOTAL.inc();
        debug!("[{}] Request #{} {:?}", T::NAME, seq, query.to_params());

        self.view.send_modify(|view| {
            view.query = state.clone();
            view.loading = true;
        });

        let api = Arc::clone(&self.api);
        let done = self.done.clone();
        tokio::spawn(async move {
            let result = T::fetch(api.as_ref(), &query).await;
            // The controller may be gone; its results no longer matter.
            let _ = done.send((seq, result));
        });
    }

    /// Returns the applied page and page size when the response was current and successful.
    fn complete(&self, seq: u64, result: Result<PageResult<T::Row>>) -> Option<(u32, u32)> {
        if seq != self.issued {
            STALE_RESULTS_TOTAL.inc();
            debug!("[{}] Dropping response #{} (latest is #{})", T::NAME, seq, self.issued);
            return None;
        }

        match result {
            Ok(page) => {
                let total_pages = page.total_pages();
                self.view.send_modify(|view| {
                    view.query.page = page.current_page;
                    view.query.page_size = page.page_size;
                    view.rows = page.items;
                    view.total_items = page.total_items;
                    view.current_page = page.current_page;
                    view.page_size = page.page_size;
                    view.total_pages = total_pages;
                    view.loading = false;
                    view.error = None;
                    view.applied_seq = seq;
                });
                Some((page.current_page, page.page_size))
            }
            Err(e) => {
                warn!("[{}] Fetch #{} failed, keeping previous rows: {}", T::NAME, seq, e);
                self.view.send_modify(|view| {
                    view.loading = false;
                    view.error = Some(e.to_string());
                });
                None
            }
        }
    }
}

async fn run_table<T: LogTable>(
    api: Arc<dyn RemoteApi>,
    mut inputs: mpsc::Receiver<TableInput>,
    view: watch::Sender<TableView<T::Row>>,
    debounce: Duration,
) {
    let (done, mut results) = mpsc::unbounded_channel();
    let mut issuer = Issuer::<T> {
        api,
        view,
        done,
        issued: 0,
    };
    let mut state = QueryState::default();
    let mut deadline: Option<Instant> = None;

    issuer.issue(&state);

    loop {
        tokio::select! {
            input = inputs.recv() => {
                let Some(input) = input else {
                    break;
                };
                match apply_input(&mut state, input) {
                    Trigger::Debounced => deadline = Some(Instant::now() + debounce),
                    Trigger::Immediate => {
                        deadline = None;
                        issuer.issue(&state);
                    }
                }
            }

            _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                deadline = None;
                issuer.issue(&state);
            }

            Some((seq, result)) = results.recv() => {
                let applied = issuer.complete(seq, result);
                // Adopt the page the server answered with, unless newer edits are waiting.
                if let (Some((page, page_size)), None) = (applied, deadline) {
                    state.page = page;
                    state.page_size = page_size;
                }
            }
        }
    }

    debug!("[{}] Controller stopped", T::NAME);
}
