//! Bulk submission flows over the SQLite stores

use std::sync::Arc;

use padron_core::application::{
    BreakerConfig, BulkOrchestrator, CircuitBreaker, PoolController, QueueScheduler, RetryPolicy,
    Worker,
};
use padron_core::domain::JobState;
use padron_core::port::fetcher::mocks::{sample_record, ScriptedFetcher};
use padron_core::port::id_provider::mocks::SequentialIdProvider;
use padron_core::port::time_provider::mocks::MockClock;
use padron_core::port::RecordStore;
use padron_infra_sqlite::{create_pool, run_migrations, SqliteJobStore, SqliteRecordStore};
use std::time::Duration;

const FRESHNESS_MS: i64 = 60_000;

struct Rig {
    orchestrator: BulkOrchestrator,
    scheduler: Arc<QueueScheduler>,
    record_store: Arc<SqliteRecordStore>,
    breaker: Arc<CircuitBreaker>,
    clock: Arc<MockClock>,
}

async fn rig() -> Rig {
    let pool = create_pool("sqlite::memory:").await.unwrap();
    run_migrations(&pool).await.unwrap();

    let clock = Arc::new(MockClock::new(1_000_000));
    let breaker = Arc::new(CircuitBreaker::new(BreakerConfig::default(), clock.clone()));
    let job_store = Arc::new(SqliteJobStore::new(pool.clone()));
    let scheduler = Arc::new(QueueScheduler::new(
        job_store.clone(),
        breaker.clone(),
        Arc::new(SequentialIdProvider::new()),
        clock.clone(),
        3,
    ));
    let record_store = Arc::new(SqliteRecordStore::new(pool));
    let orchestrator = BulkOrchestrator::new(
        scheduler.clone(),
        record_store.clone(),
        job_store,
        clock.clone(),
        FRESHNESS_MS,
        5,
    );

    Rig {
        orchestrator,
        scheduler,
        record_store,
        breaker,
        clock,
    }
}

fn documents(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn test_batch_reconciles_against_store_and_queue() {
    let rig = rig().await;

    // Two fresh records in the store
    rig.record_store
        .upsert("1000000001", &sample_record("1000000001"), 990_000)
        .await
        .unwrap();
    rig.record_store
        .upsert("1000000002", &sample_record("1000000002"), 990_000)
        .await
        .unwrap();

    // One document already in flight
    rig.scheduler.enqueue("1000000005", 1).await.unwrap();

    let result = rig
        .orchestrator
        .submit_batch(&documents(&[
            "1000000001",
            "1000000002",
            "1000000003",
            "1000000004",
            "1000000005",
        ]))
        .await
        .unwrap();

    assert_eq!(result.total, 5);
    assert_eq!(result.found_in_store, 2);
    assert_eq!(result.enqueued, 2);
    assert_eq!(result.in_flight, 1);
    assert_eq!(result.errors, 0);

    assert_eq!(rig.scheduler.stats().await.unwrap().queued, 3);
}

#[tokio::test]
async fn test_resubmission_creates_no_new_jobs() {
    let rig = rig().await;
    let batch = documents(&["1000000003", "1000000004"]);

    let first = rig.orchestrator.submit_batch(&batch).await.unwrap();
    assert_eq!(first.enqueued, 2);

    let second = rig.orchestrator.submit_batch(&batch).await.unwrap();
    assert_eq!(second.enqueued, 0);
    assert_eq!(second.in_flight, 2);

    assert_eq!(rig.scheduler.stats().await.unwrap().total, 2);
}

#[tokio::test]
async fn test_batch_drains_and_report_reconciles() {
    let rig = rig().await;
    let batch = documents(&["1000000003", "1000000004"]);
    rig.orchestrator.submit_batch(&batch).await.unwrap();

    let worker = Worker::new(
        0,
        rig.scheduler.clone(),
        rig.record_store.clone(),
        Arc::new(ScriptedFetcher::always_success()),
        Arc::new(RetryPolicy::new(1_000, 60_000)),
        rig.breaker.clone(),
        rig.clock.clone(),
        Arc::new(PoolController::new()),
        Duration::from_secs(5),
    );

    while worker.process_next_job().await.unwrap() {}

    let report = rig.orchestrator.build_report(&batch).await.unwrap();
    assert_eq!(report.len(), 2);
    for row in &report {
        assert_eq!(row.state, Some(JobState::Completed));
        assert!(row.result.is_some());
    }

    // Freshly fetched records now short-circuit the next submission
    let after = rig.orchestrator.submit_batch(&batch).await.unwrap();
    assert_eq!(after.found_in_store, 2);
    assert_eq!(after.enqueued, 0);
}

#[tokio::test]
async fn test_refresh_all_bypasses_freshness() {
    let rig = rig().await;

    rig.record_store
        .upsert("1000000001", &sample_record("1000000001"), 990_000)
        .await
        .unwrap();
    rig.record_store
        .upsert("1000000002", &sample_record("1000000002"), 990_000)
        .await
        .unwrap();

    // Both records are still fresh, yet refresh-all re-fetches them
    rig.clock.advance(1_000);
    let result = rig.orchestrator.refresh_all().await.unwrap();

    assert_eq!(result.total, 2);
    assert_eq!(result.enqueued, 2);
    assert_eq!(result.found_in_store, 0);
    assert_eq!(rig.scheduler.stats().await.unwrap().queued, 2);
}
