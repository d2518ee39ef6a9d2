//! Shared state under concurrent access

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use gpu_ops::{
    CheckConfig, CheckResult, CheckType, DeviceLedger, HealthStatus, LedgerError, ResultStore,
    actors::scheduler::{LedgerPolicy, SchedulerHandle},
};
use pretty_assertions::assert_eq;

use crate::helpers::{engine_over, registration, two_gpu_fleet};

fn result_at(tick: u64) -> CheckResult {
    CheckResult {
        check_name: "power_check".to_string(),
        gpu_id: 0,
        status: HealthStatus::Healthy,
        value: tick as f64,
        threshold: 80.0,
        message: String::new(),
        timestamp: Utc::now(),
        tick,
    }
}

#[tokio::test]
async fn test_duplicate_registration_has_one_winner() {
    let ledger = Arc::new(DeviceLedger::new());

    let attempts = (0..16).map(|i| {
        let ledger = ledger.clone();
        tokio::spawn(async move {
            ledger.register(registration(5, &format!("pool-{i}"), &[]), "test")
        })
    });
    let outcomes: Vec<_> = join_all(attempts)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let winners = outcomes.iter().filter(|outcome| outcome.is_ok()).count();
    let conflicts = outcomes
        .iter()
        .filter(|outcome| matches!(outcome, Err(LedgerError::AlreadyRegistered(5))))
        .count();

    assert_eq!(winners, 1);
    assert_eq!(conflicts, 15);
    assert_eq!(ledger.len(), 1);
}

#[tokio::test]
async fn test_store_keeps_highest_tick() {
    let store = Arc::new(ResultStore::new());

    let writers = (1..=50u64).rev().map(|tick| {
        let store = store.clone();
        tokio::spawn(async move {
            let _ = store.record(result_at(tick));
        })
    });
    join_all(writers).await;

    assert_eq!(store.latest("power_check", 0).unwrap().tick, 50);
    assert_eq!(store.latest_tick(), 50);
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn test_explicit_runs_during_ticks() {
    let test = engine_over(two_gpu_fleet());
    let (scheduler, task) = SchedulerHandle::spawn(
        test.engine.clone(),
        None,
        LedgerPolicy::default(),
        Duration::from_secs(3600),
    );

    let explicit = (0..20).map(|i| {
        let engine = test.engine.clone();
        tokio::spawn(async move { engine.run_check("memory_check", i % 2).await })
    });
    let ((), runs) = tokio::join!(
        async {
            for _ in 0..5 {
                scheduler.run_now().await.unwrap();
            }
        },
        join_all(explicit)
    );

    for run in runs {
        run.unwrap().unwrap();
    }
    assert_eq!(test.engine.store().len(), 6);
    assert_eq!(test.engine.store().latest_tick(), 5);
    assert_eq!(test.engine.store().latest("temperature_check", 1).unwrap().tick, 5);

    scheduler.shutdown().await.unwrap();
    task.await.unwrap();
}

#[tokio::test]
async fn test_registry_changes_between_ticks() {
    let test = engine_over(two_gpu_fleet());
    let (scheduler, task) = SchedulerHandle::spawn(
        test.engine.clone(),
        None,
        LedgerPolicy::default(),
        Duration::from_secs(3600),
    );

    scheduler.run_now().await.unwrap();
    let utilization = CheckType::Other("utilization".to_string());
    test.engine
        .registry()
        .register(CheckConfig::new("utilization_check", utilization, 80.0, 95.0));
    let report = scheduler.run_now().await.unwrap();

    assert_eq!(report.results, 8);
    let unknown = test.engine.store().latest("utilization_check", 0).unwrap();
    assert_eq!(unknown.status, HealthStatus::Unknown);

    scheduler.shutdown().await.unwrap();
    task.await.unwrap();
}
