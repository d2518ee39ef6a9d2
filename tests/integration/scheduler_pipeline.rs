//! Scheduler → engine → store → ledger pipeline

use std::path::Path;
use std::time::Duration;

use gpu_ops::{
    HealthStatus, LedgerStatus,
    actors::scheduler::{LedgerPolicy, SchedulerHandle},
    ledger::DeviceLedger,
};
use pretty_assertions::assert_eq;
use tempfile::tempdir;

use crate::helpers::{cool_down, engine_over, ledger_with, overheat, two_gpu_fleet};

const IDLE: Duration = Duration::from_secs(3600);

async fn wait_for_ledger(path: &Path, done: impl Fn(&DeviceLedger) -> bool) -> DeviceLedger {
    for _ in 0..100 {
        if let Ok(on_disk) = DeviceLedger::load(path)
            && done(&on_disk)
        {
            return on_disk;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("ledger at {} never reached the expected state", path.display());
}

#[tokio::test]
async fn test_run_now_evaluates_every_device() {
    let test = engine_over(two_gpu_fleet());
    let (scheduler, task) =
        SchedulerHandle::spawn(test.engine.clone(), None, LedgerPolicy::default(), IDLE);

    let first = scheduler.run_now().await.unwrap();
    let second = scheduler.run_now().await.unwrap();

    assert_eq!(first.tick, 1);
    assert_eq!(second.tick, 2);
    assert_eq!(second.devices_evaluated, 2);
    assert_eq!(second.results, 6);
    assert_eq!(test.engine.store().len(), 6);
    assert_eq!(test.engine.store().latest_tick(), 2);
    assert_eq!(test.sink.checks.lock().len(), 12);

    scheduler.shutdown().await.unwrap();
    task.await.unwrap();
}

#[tokio::test]
async fn test_timer_drives_ticks() {
    let test = engine_over(two_gpu_fleet());
    let (scheduler, task) =
        SchedulerHandle::spawn(test.engine.clone(), None, LedgerPolicy::default(), IDLE);

    scheduler.update_interval(1).await.unwrap();
    tokio::time::sleep(Duration::from_millis(1500)).await;

    assert!(test.engine.store().latest_tick() >= 1);
    assert_eq!(test.engine.store().len(), 6);

    scheduler.shutdown().await.unwrap();
    task.await.unwrap();
}

#[tokio::test]
async fn test_zero_interval_rejected() {
    let test = engine_over(two_gpu_fleet());
    let (scheduler, task) =
        SchedulerHandle::spawn(test.engine.clone(), None, LedgerPolicy::default(), IDLE);

    assert!(scheduler.update_interval(0).await.is_err());

    scheduler.shutdown().await.unwrap();
    task.await.unwrap();
}

#[tokio::test]
async fn test_shutdown_stops_actor() {
    let test = engine_over(two_gpu_fleet());
    let (scheduler, task) =
        SchedulerHandle::spawn(test.engine.clone(), None, LedgerPolicy::default(), IDLE);

    scheduler.shutdown().await.unwrap();
    task.await.unwrap();

    assert!(scheduler.run_now().await.is_err());
    assert!(test.engine.store().is_empty());
}

#[tokio::test]
async fn test_ledger_status_follows_health() {
    let test = engine_over(two_gpu_fleet());
    let ledger = ledger_with(&[0, 1]);
    let policy = LedgerPolicy {
        failed_threshold: 2,
        auto_unregister: false,
        persist_path: None,
    };
    let (scheduler, task) =
        SchedulerHandle::spawn(test.engine.clone(), Some(ledger.clone()), policy, IDLE);

    overheat(&test.source, 0);

    let report = scheduler.run_now().await.unwrap();
    assert_eq!(report.device_status[0], (0, HealthStatus::Unhealthy));
    assert_eq!(ledger.get(0).unwrap().status, LedgerStatus::Degraded);
    assert_eq!(ledger.get(1).unwrap().status, LedgerStatus::Active);

    scheduler.run_now().await.unwrap();
    assert_eq!(ledger.get(0).unwrap().status, LedgerStatus::Inactive);
    assert!(ledger.get(0).unwrap().last_health_check.is_some());

    cool_down(&test.source, 0);
    scheduler.run_now().await.unwrap();
    assert_eq!(ledger.get(0).unwrap().status, LedgerStatus::Active);

    // one unhealthy tick after recovery starts the count over
    overheat(&test.source, 0);
    scheduler.run_now().await.unwrap();
    assert_eq!(ledger.get(0).unwrap().status, LedgerStatus::Degraded);

    scheduler.shutdown().await.unwrap();
    task.await.unwrap();
}

#[tokio::test]
async fn test_auto_unregister_retires_device() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("registry.json");

    let test = engine_over(two_gpu_fleet());
    let ledger = ledger_with(&[0, 1]);
    let policy = LedgerPolicy {
        failed_threshold: 2,
        auto_unregister: true,
        persist_path: Some(path.clone()),
    };
    let (scheduler, task) =
        SchedulerHandle::spawn(test.engine.clone(), Some(ledger.clone()), policy, IDLE);

    overheat(&test.source, 0);
    scheduler.run_now().await.unwrap();
    assert!(ledger.contains(0));

    scheduler.run_now().await.unwrap();
    assert!(!ledger.contains(0));
    assert!(ledger.contains(1));
    assert!(test.sink.registrations.lock().contains(&(0, false)));
    assert!(test.engine.store().for_device(0).is_empty());
    assert!(test.sink.forgotten.lock().iter().all(|key| key.gpu_id == 0));
    assert_eq!(test.sink.forgotten.lock().len(), 3);

    // the write happens off the scheduler task
    let on_disk = wait_for_ledger(&path, |on_disk| !on_disk.contains(0)).await;
    assert!(on_disk.contains(1));

    // the source no longer reports it as registered, so it drops out
    let report = scheduler.run_now().await.unwrap();
    assert_eq!(report.devices_evaluated, 1);
    assert_eq!(report.device_status, vec![(1, HealthStatus::Healthy)]);

    scheduler.shutdown().await.unwrap();
    task.await.unwrap();
}

#[tokio::test]
async fn test_devices_outside_ledger_untouched() {
    let test = engine_over(two_gpu_fleet());
    let ledger = ledger_with(&[1]);
    let policy = LedgerPolicy {
        failed_threshold: 1,
        auto_unregister: true,
        persist_path: None,
    };
    let (scheduler, task) =
        SchedulerHandle::spawn(test.engine.clone(), Some(ledger.clone()), policy, IDLE);

    overheat(&test.source, 0);
    let report = scheduler.run_now().await.unwrap();

    assert_eq!(report.unhealthy, 1);
    assert!(!ledger.contains(0));
    assert!(test.sink.registrations.lock().is_empty());
    assert_eq!(ledger.get(1).unwrap().status, LedgerStatus::Active);

    scheduler.shutdown().await.unwrap();
    task.await.unwrap();
}

#[tokio::test]
async fn test_vanished_device_keeps_last_results() {
    let test = engine_over(two_gpu_fleet());
    let (scheduler, task) =
        SchedulerHandle::spawn(test.engine.clone(), None, LedgerPolicy::default(), IDLE);

    scheduler.run_now().await.unwrap();
    test.source.remove(1);
    let report = scheduler.run_now().await.unwrap();

    assert_eq!(report.devices_seen, 1);
    assert_eq!(test.engine.store().latest("power_check", 0).unwrap().tick, 2);
    assert_eq!(test.engine.store().latest("power_check", 1).unwrap().tick, 1);

    scheduler.shutdown().await.unwrap();
    task.await.unwrap();
}
