mod common;

use common::{FakeApi, LOG_TOTAL_ITEMS};
use dashboard::query::{PageQuery, SortDirection};
use dashboard::{DeviceLog, Error, RemoteApi, SensorLog, TableController, TableInput};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

const DEBOUNCE: Duration = Duration::from_millis(500);

fn controller(api: &Arc<FakeApi>) -> TableController<SensorLog> {
    let api: Arc<dyn RemoteApi> = api.clone();
    TableController::spawn(api, DEBOUNCE)
}

fn filter_value(value: &str) -> TableInput {
    TableInput::FilterValue {
        value: value.to_string(),
    }
}

fn filter_field(field: &str) -> TableInput {
    TableInput::FilterField {
        field: field.to_string(),
    }
}

fn params(query: &PageQuery) -> Vec<(String, String)> {
    query.to_params()
}

fn has_param(query: &PageQuery, key: &str, value: &str) -> bool {
    params(query).iter().any(|(k, v)| k == key && v == value)
}

#[tokio::test(start_paused = true)]
async fn test_first_page_loads_on_spawn() {
    let api = Arc::new(FakeApi::default());
    let table = controller(&api);
    sleep(Duration::from_millis(10)).await;

    let view = table.view();
    assert_eq!(api.queries().len(), 1);
    assert_eq!(view.rows.len(), 1);
    assert_eq!(view.total_items, LOG_TOTAL_ITEMS);
    assert_eq!(view.total_pages, 5);
    assert_eq!(view.current_page, 1);
    assert!(!view.loading);
    assert_eq!(view.applied_seq, 1);
}

#[tokio::test(start_paused = true)]
async fn test_rapid_keystrokes_send_one_request() {
    let api = Arc::new(FakeApi::default());
    let table = controller(&api);
    sleep(Duration::from_millis(10)).await;

    table.send(filter_field("temperature")).await.unwrap();
    for value in ["3", "", "2", "2", "25"] {
        table.send(filter_value(value)).await.unwrap();
        sleep(Duration::from_millis(100)).await;
    }
    assert_eq!(api.queries().len(), 1);

    sleep(Duration::from_millis(600)).await;

    let queries = api.queries();
    assert_eq!(queries.len(), 2);
    assert!(has_param(&queries[1], "temperature", "25"));
    assert_eq!(table.view().rows[0].temperature, Some(25.0));
}

#[tokio::test(start_paused = true)]
async fn test_search_skips_the_debounce() {
    let api = Arc::new(FakeApi::default());
    let table = controller(&api);
    sleep(Duration::from_millis(10)).await;

    table.send(filter_field("humidity")).await.unwrap();
    table.send(filter_value("40")).await.unwrap();
    table.send(TableInput::Search).await.unwrap();
    sleep(Duration::from_millis(10)).await;

    assert_eq!(api.queries().len(), 2);
    assert!(has_param(&api.queries()[1], "humidity", "40"));

    // The pending debounce was folded into the search.
    sleep(Duration::from_millis(1000)).await;
    assert_eq!(api.queries().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_reset_refetches_once_without_filter_or_sort() {
    let api = Arc::new(FakeApi::default());
    let table = controller(&api);
    sleep(Duration::from_millis(10)).await;

    table.send(filter_field("temperature")).await.unwrap();
    table.send(filter_value("25")).await.unwrap();
    table
        .send(TableInput::SortDirection {
            direction: Some(SortDirection::Desc),
        })
        .await
        .unwrap();
    table.send(TableInput::Page { page: 3 }).await.unwrap();
    sleep(Duration::from_millis(600)).await;

    let queries = api.queries();
    assert_eq!(queries.len(), 2);
    assert_eq!(
        params(&queries[1]),
        vec![
            ("pageNumber".to_string(), "2".to_string()),
            ("pageSize".to_string(), "10".to_string()),
            ("temperature".to_string(), "25".to_string()),
            ("sortBy".to_string(), "temperature".to_string()),
            ("sortDirection".to_string(), "desc".to_string()),
        ]
    );

    table.send(TableInput::Reset).await.unwrap();
    sleep(Duration::from_millis(10)).await;

    let queries = api.queries();
    assert_eq!(queries.len(), 3);
    assert_eq!(
        params(&queries[2]),
        vec![
            ("pageNumber".to_string(), "0".to_string()),
            ("pageSize".to_string(), "10".to_string()),
        ]
    );

    sleep(Duration::from_millis(1000)).await;
    assert_eq!(api.queries().len(), 3);

    let view = table.view();
    assert!(view.query.filter_field.is_empty());
    assert!(view.query.filter_value.is_empty());
    assert_eq!(view.query.sort_direction, None);
    assert_eq!(view.current_page, 1);
}

#[tokio::test(start_paused = true)]
async fn test_stale_response_is_not_applied() {
    let api = Arc::new(FakeApi::default());
    api.log_delays
        .lock()
        .unwrap()
        .extend([Duration::ZERO, Duration::from_millis(2000), Duration::from_millis(100)]);
    let table = controller(&api);
    sleep(Duration::from_millis(10)).await;

    table.send(filter_field("temperature")).await.unwrap();
    table.send(filter_value("20")).await.unwrap();
    table.send(TableInput::Search).await.unwrap();
    sleep(Duration::from_millis(10)).await;

    table.send(filter_value("25")).await.unwrap();
    table.send(TableInput::Search).await.unwrap();
    sleep(Duration::from_millis(3000)).await;

    assert_eq!(api.queries().len(), 3);
    let view = table.view();
    assert_eq!(view.applied_seq, 3);
    assert_eq!(view.query.filter_value, "25");
    assert_eq!(view.rows[0].temperature, Some(25.0));
    assert!(!view.loading);
}

#[tokio::test(start_paused = true)]
async fn test_pagination_comes_from_the_response() {
    let api = Arc::new(FakeApi::default());
    let table = controller(&api);
    sleep(Duration::from_millis(10)).await;

    table.send(TableInput::Page { page: 2 }).await.unwrap();
    table.send(TableInput::Search).await.unwrap();
    sleep(Duration::from_millis(10)).await;
    assert_eq!(table.view().current_page, 2);
    assert!(has_param(&api.queries()[1], "pageNumber", "1"));

    // Past the end: the server answers with its last page.
    table.send(TableInput::Page { page: 9 }).await.unwrap();
    table.send(TableInput::Search).await.unwrap();
    sleep(Duration::from_millis(10)).await;

    let view = table.view();
    assert_eq!(view.current_page, 5);
    assert_eq!(view.query.page, 5);
    assert_eq!(view.total_pages, 5);
}

#[tokio::test(start_paused = true)]
async fn test_page_size_change_returns_to_first_page() {
    let api = Arc::new(FakeApi::default());
    let table = controller(&api);
    sleep(Duration::from_millis(10)).await;

    table.send(TableInput::Page { page: 3 }).await.unwrap();
    table.send(TableInput::PageSize { size: 20 }).await.unwrap();
    sleep(Duration::from_millis(600)).await;

    let last = api.queries().pop().unwrap();
    assert_eq!(last.page(), 1);
    assert_eq!(last.page_size, 20);
    assert_eq!(table.view().total_pages, 3);

    assert!(matches!(
        table.send(TableInput::PageSize { size: 12 }).await,
        Err(Error::Validation(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_invalid_filter_value_is_not_sent() {
    let api = Arc::new(FakeApi::default());
    let table = controller(&api);
    sleep(Duration::from_millis(10)).await;
    let rows = table.view().rows;

    table.send(filter_field("timestamp")).await.unwrap();
    table.send(filter_value("2024-1")).await.unwrap();
    table.send(TableInput::Search).await.unwrap();
    sleep(Duration::from_millis(10)).await;

    assert_eq!(api.queries().len(), 1);
    let view = table.view();
    assert!(view.error.is_some());
    assert_eq!(view.rows, rows);

    table.send(filter_value("2024-10-01")).await.unwrap();
    table.send(TableInput::Search).await.unwrap();
    sleep(Duration::from_millis(10)).await;
    assert_eq!(api.queries().len(), 2);
    assert!(table.view().error.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_failed_fetch_keeps_rows() {
    let api = Arc::new(FakeApi::default());
    let table = controller(&api);
    sleep(Duration::from_millis(10)).await;
    let before = table.view();

    api.fail_logs.store(true, Ordering::SeqCst);
    table.send(TableInput::Search).await.unwrap();
    sleep(Duration::from_millis(10)).await;

    let view = table.view();
    assert_eq!(view.rows, before.rows);
    assert_eq!(view.total_items, before.total_items);
    assert_eq!(view.applied_seq, before.applied_seq);
    assert!(!view.loading);
    assert!(view.error.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_device_log_columns() {
    let api = Arc::new(FakeApi::default());
    let api_dyn: Arc<dyn RemoteApi> = api.clone();
    let table: TableController<DeviceLog> = TableController::spawn(api_dyn, DEBOUNCE);
    sleep(Duration::from_millis(10)).await;

    assert!(matches!(
        table.send(filter_field("temperature")).await,
        Err(Error::Validation(_))
    ));

    table.send(filter_field("deviceName")).await.unwrap();
    table.send(filter_value("lightbulb")).await.unwrap();
    table.send(TableInput::Search).await.unwrap();
    sleep(Duration::from_millis(10)).await;

    assert!(has_param(&api.queries()[1], "deviceName", "lightbulb"));
    assert_eq!(table.view().rows[0].device_name, "lightbulb");
}

#[tokio::test(start_paused = true)]
async fn test_stopped_controller_rejects_input() {
    let api = Arc::new(FakeApi::default());
    let table = controller(&api);
    sleep(Duration::from_millis(10)).await;

    table.stop();
    sleep(Duration::from_millis(10)).await;

    assert!(matches!(table.send(TableInput::Search).await, Err(Error::ChannelSend)));
}
