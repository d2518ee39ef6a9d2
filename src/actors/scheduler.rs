//! SchedulerActor - Drives the health engine on a fixed period
//!
//! ## Message Flow
//!
//! ```text
//! Timer tick → HealthEngine::run_tick → ledger follow-up
//!     ↑
//!     └─── Commands (RunNow, UpdateInterval, Shutdown)
//! ```
//!
//! Commands are only observed between ticks, so a tick that has started
//! always runs to completion before `Shutdown` takes effect.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at};
use tracing::{debug, error, info, instrument, trace, warn};

use crate::health::{HealthEngine, HealthStatus, TickReport};
use crate::ledger::{DeviceLedger, LedgerError, LedgerStatus};

use super::messages::SchedulerCommand;

/// What the scheduler does to ledger records after each tick
#[derive(Debug, Clone, Default)]
pub struct LedgerPolicy {
    /// Consecutive unhealthy ticks before a device is taken out of service
    /// (0 disables)
    pub failed_threshold: usize,

    /// Remove the device from the ledger instead of marking it inactive
    pub auto_unregister: bool,

    /// Persist the ledger here after an automatic unregistration; the write
    /// runs in the background
    pub persist_path: Option<PathBuf>,
}

pub struct SchedulerActor {
    engine: Arc<HealthEngine>,
    ledger: Option<Arc<DeviceLedger>>,
    policy: LedgerPolicy,
    command_rx: mpsc::Receiver<SchedulerCommand>,
    interval_duration: Duration,

    /// Sequence number of the last tick run
    tick: u64,

    /// Per-device count of consecutive ticks with an unhealthy result
    consecutive_unhealthy: HashMap<u32, usize>,
}

/// Timer whose first tick fires one full period from now
fn new_ticker(period: Duration) -> Interval {
    let period = period.max(Duration::from_millis(1));
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

impl SchedulerActor {
    pub fn new(
        engine: Arc<HealthEngine>,
        ledger: Option<Arc<DeviceLedger>>,
        policy: LedgerPolicy,
        command_rx: mpsc::Receiver<SchedulerCommand>,
        interval_duration: Duration,
    ) -> Self {
        Self {
            engine,
            ledger,
            policy,
            command_rx,
            interval_duration,
            tick: 0,
            consecutive_unhealthy: HashMap::new(),
        }
    }

    #[instrument(skip(self), fields(interval = ?self.interval_duration))]
    pub async fn run(mut self) {
        info!("starting health scheduler");

        let mut ticker = new_ticker(self.interval_duration);

        loop {
            tokio::select! {
                biased;

                cmd = self.command_rx.recv() => {
                    let Some(cmd) = cmd else {
                        warn!("command channel closed, shutting down");
                        break;
                    };

                    match cmd {
                        SchedulerCommand::RunNow { respond_to } => {
                            debug!("received RunNow command");
                            let report = self.run_tick().await;
                            let _ = respond_to.send(report);
                        }

                        SchedulerCommand::UpdateInterval { interval_secs } => {
                            debug!("updating interval to {interval_secs}s");
                            self.interval_duration = Duration::from_secs(interval_secs);
                            ticker = new_ticker(self.interval_duration);
                        }

                        SchedulerCommand::Shutdown => {
                            debug!("received shutdown command");
                            break;
                        }
                    }
                }

                _ = ticker.tick() => {
                    self.run_tick().await;
                }
            }
        }

        info!("health scheduler stopped after {} ticks", self.tick);
    }

    async fn run_tick(&mut self) -> TickReport {
        self.tick += 1;
        let report = self.engine.run_tick(self.tick).await;

        if let Some(ledger) = self.ledger.clone() {
            self.follow_up(&ledger, &report).await;
        }

        report
    }

    /// Reflect a tick's outcome in the ledger
    async fn follow_up(&mut self, ledger: &DeviceLedger, report: &TickReport) {
        for &(gpu_id, worst) in &report.device_status {
            if !ledger.contains(gpu_id) {
                trace!("GPU {gpu_id} not in ledger, skipping follow-up");
                continue;
            }

            let count = self.consecutive_unhealthy.entry(gpu_id).or_default();
            if worst == HealthStatus::Unhealthy {
                *count += 1;
            } else {
                *count = 0;
            }
            let count = *count;

            let threshold = self.policy.failed_threshold;
            if threshold > 0 && count >= threshold {
                if self.policy.auto_unregister {
                    self.retire(ledger, gpu_id, count).await;
                } else {
                    if count == threshold {
                        warn!("GPU {gpu_id} unhealthy for {count} consecutive ticks, marking inactive");
                    }
                    self.set_status(ledger, gpu_id, LedgerStatus::Inactive);
                }
                continue;
            }

            let status = match worst {
                HealthStatus::Healthy => LedgerStatus::Active,
                _ => LedgerStatus::Degraded,
            };
            self.set_status(ledger, gpu_id, status);
        }
    }

    fn set_status(&self, ledger: &DeviceLedger, gpu_id: u32, status: LedgerStatus) {
        match ledger.update_status(gpu_id, status) {
            Ok(_) => trace!("GPU {gpu_id} ledger status -> {status:?}"),
            Err(LedgerError::NotFound(_)) => trace!("GPU {gpu_id} left the ledger mid-tick"),
            Err(e) => error!("failed to update ledger status for GPU {gpu_id}: {e}"),
        }
    }

    async fn retire(&mut self, ledger: &DeviceLedger, gpu_id: u32, count: usize) {
        let record = match ledger.unregister(gpu_id) {
            Ok(record) => record,
            Err(e) => {
                trace!("GPU {gpu_id}: {e}");
                return;
            }
        };

        warn!("GPU {gpu_id} unhealthy for {count} consecutive ticks, unregistered");
        self.consecutive_unhealthy.remove(&gpu_id);
        self.engine.metrics().observe_registration(&record, false);

        if let Err(e) = self.engine.source().set_registered(gpu_id, false).await {
            warn!("GPU {gpu_id}: failed to clear registered flag: {e}");
        }

        self.engine.forget_device(gpu_id);

        if let (Some(path), Some(ledger)) = (self.policy.persist_path.clone(), self.ledger.clone()) {
            // disk latency must not hold up the next tick
            tokio::spawn(async move {
                if let Err(e) = ledger.save_async(path).await {
                    error!("{e}");
                }
            });
        }
    }
}

/// Handle for controlling a [`SchedulerActor`]
#[derive(Clone)]
pub struct SchedulerHandle {
    sender: mpsc::Sender<SchedulerCommand>,
}

impl SchedulerHandle {
    /// Spawn the scheduler; the join handle resolves once the actor exits
    pub fn spawn(
        engine: Arc<HealthEngine>,
        ledger: Option<Arc<DeviceLedger>>,
        policy: LedgerPolicy,
        interval_duration: Duration,
    ) -> (Self, JoinHandle<()>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);

        let actor = SchedulerActor::new(engine, ledger, policy, cmd_rx, interval_duration);
        let task = tokio::spawn(actor.run());

        (Self { sender: cmd_tx }, task)
    }

    /// Run a tick now and wait for its report
    pub async fn run_now(&self) -> Result<TickReport> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SchedulerCommand::RunNow { respond_to: tx })
            .await
            .context("failed to send RunNow command")?;

        rx.await.context("failed to receive tick report")
    }

    pub async fn update_interval(&self, interval_secs: u64) -> Result<()> {
        anyhow::ensure!(interval_secs > 0, "interval must be at least one second");

        self.sender
            .send(SchedulerCommand::UpdateInterval { interval_secs })
            .await
            .context("failed to send UpdateInterval command")?;
        Ok(())
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(SchedulerCommand::Shutdown)
            .await
            .context("failed to send Shutdown command")?;
        Ok(())
    }
}
