//! JSON-RPC surface wired to SQLite storage

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use jsonrpsee::core::client::ClientT;
use jsonrpsee::core::params::ObjectParams;
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
use jsonrpsee::rpc_params;
use jsonrpsee::server::ServerHandle;
use serde_json::json;

use cadence_api_rpc::types::{AddScheduleResponse, SweepResponse, TaskView};
use cadence_api_rpc::{RpcServer, RpcServerConfig};
use cadence_core::application::{DispatchConfig, DispatchCycle, ScheduleService, SweepRunner};
use cadence_core::port::id_provider::mocks::SequentialIdProvider;
use cadence_core::port::notifier::mocks::{MockBehavior, RecordingNotifier};
use cadence_core::port::time_provider::mocks::FixedTimeProvider;
use cadence_infra_sqlite::{create_pool, run_migrations, SqliteScheduledTaskRepository};

fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2022, 9, 1, h, m, s).unwrap()
}

struct Stack {
    client: HttpClient,
    handle: ServerHandle,
    notifier: Arc<RecordingNotifier>,
    clock: Arc<FixedTimeProvider>,
}

async fn start_stack(now: DateTime<Utc>) -> Stack {
    let pool = create_pool("sqlite::memory:").await.unwrap();
    run_migrations(&pool).await.unwrap();

    let repo = Arc::new(SqliteScheduledTaskRepository::new(pool));
    let notifier = Arc::new(RecordingNotifier::new_success());
    let clock = Arc::new(FixedTimeProvider::new(now));

    let schedules = Arc::new(ScheduleService::new(
        repo.clone(),
        Arc::new(SequentialIdProvider::new("task")),
        clock.clone(),
    ));
    let cycle = DispatchCycle::new(
        repo,
        notifier.clone(),
        Arc::new(SequentialIdProvider::new("evt")),
        clock.clone(),
        DispatchConfig::default(),
    );
    let sweeper = Arc::new(SweepRunner::new(cycle, clock.clone(), Duration::from_secs(60)));

    let config = RpcServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
    };
    let (addr, handle) = RpcServer::new(config, schedules, sweeper)
        .start()
        .await
        .unwrap();
    let client = HttpClientBuilder::default()
        .build(format!("http://{}", addr))
        .unwrap();

    Stack {
        client,
        handle,
        notifier,
        clock,
    }
}

async fn get(client: &HttpClient, task_id: &str) -> TaskView {
    let mut params = ObjectParams::new();
    params.insert("task_id", task_id).unwrap();
    client.request("schedule.get.v1", params).await.unwrap()
}

async fn sweep(client: &HttpClient) -> SweepResponse {
    client.request("sweep.run.v1", rpc_params![]).await.unwrap()
}

#[tokio::test]
async fn test_recurring_task_lifecycle_over_rpc() {
    let stack = start_stack(at(0, 1, 0)).await;

    let mut params = ObjectParams::new();
    params.insert("application_id", "billing").unwrap();
    params.insert("reply_address", "http://billing/hooks").unwrap();
    params.insert("is_recurring", true).unwrap();
    params.insert("cron_expression", "*/5 * * * *").unwrap();
    params.insert("utc_offset_minutes", 0).unwrap();
    params
        .insert("extra_values", json!({ "tenant": "acme", "note": null }))
        .unwrap();
    let added: AddScheduleResponse = stack
        .client
        .request("schedule.add.v1", params)
        .await
        .unwrap();
    assert!(added.is_recurring);
    assert_eq!(added.next_trigger_time, at(0, 5, 0));

    let view = get(&stack.client, &added.task_id).await;
    assert_eq!(view.state, "ENABLED_PENDING");
    assert!(view.previous_triggered_time.is_none());
    assert_eq!(view.extra_values.get("note"), Some(&None));

    // Nothing due yet
    assert_eq!(sweep(&stack.client).await.attempted, 0);

    stack.clock.set(at(0, 5, 0));
    let report = sweep(&stack.client).await;
    assert_eq!(report.attempted, 1);
    assert_eq!(report.succeeded, 1);
    assert_eq!(report.failed, 0);

    let view = get(&stack.client, &added.task_id).await;
    assert_eq!(view.state, "ENABLED_FIRED");
    assert_eq!(view.next_trigger_time, Some(at(0, 10, 0)));
    assert_eq!(view.previous_triggered_time, Some(at(0, 5, 0)));
    assert_eq!(view.total_success_count, 1);

    let delivered = stack.notifier.delivered();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].task_id, added.task_id);

    stack.handle.stop().unwrap();
}

#[tokio::test]
async fn test_failed_sweep_is_reported_over_rpc() {
    let stack = start_stack(at(0, 0, 0)).await;
    stack
        .notifier
        .set_behavior(MockBehavior::Fail("connection reset".to_string()));

    let mut params = ObjectParams::new();
    params.insert("application_id", "reports").unwrap();
    params.insert("reply_address", "http://reports/hooks").unwrap();
    let added: AddScheduleResponse = stack
        .client
        .request("schedule.add.v1", params)
        .await
        .unwrap();

    let report = sweep(&stack.client).await;
    assert_eq!(report.attempted, 1);
    assert_eq!(report.succeeded, 0);
    assert_eq!(report.failed, 1);
    assert_eq!(report.failures[0].task_id, added.task_id);

    let view = get(&stack.client, &added.task_id).await;
    assert!(view.is_enabled);
    assert!(!view.previous_trigger_was_successful);
    assert_eq!(view.consecutive_failure_count, 1);
    assert!(view
        .previous_error
        .as_deref()
        .unwrap()
        .contains("connection reset"));

    stack.handle.stop().unwrap();
}
