//! AlertActor - Escalates check results into notifications
//!
//! Subscribes to the engine's result broadcast and tracks one grace counter
//! per (check, device):
//!
//! ```text
//! unhealthy:
//!   counter <  grace → Escalation::Failing       (increment, no alert)
//!   counter == grace → Escalation::StartsToFail  (send alert)
//! anything else:
//!   counter == 0 .. grace → Escalation::Ok        (reset)
//!   counter >  grace      → Escalation::Recovered (send recovery alert)
//! ```
//!
//! A single unhealthy reading therefore only pages once `grace` further
//! readings confirm it.

use std::collections::HashMap;

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant};
use tracing::{debug, instrument, trace, warn};

use crate::alerts::{AlertManager, Escalation};
use crate::health::{CheckResult, HealthStatus, ResultKey};

use super::messages::{AlertCommand, AlertState};

pub struct AlertActor {
    manager: AlertManager,
    grace: usize,
    states: HashMap<ResultKey, AlertState>,
    command_rx: mpsc::Receiver<AlertCommand>,
    result_rx: broadcast::Receiver<CheckResult>,

    /// Notifications are suppressed until this instant
    muted_until: Option<Instant>,
}

impl AlertActor {
    pub fn new(
        manager: AlertManager,
        grace: usize,
        command_rx: mpsc::Receiver<AlertCommand>,
        result_rx: broadcast::Receiver<CheckResult>,
    ) -> Self {
        Self {
            manager,
            grace,
            states: HashMap::new(),
            command_rx,
            result_rx,
            muted_until: None,
        }
    }

    fn muted(&mut self) -> bool {
        match self.muted_until {
            Some(until) if Instant::now() < until => true,
            Some(_) => {
                debug!("mute window elapsed, alerts resumed");
                self.muted_until = None;
                false
            }
            None => false,
        }
    }

    #[instrument(skip(self), fields(grace = self.grace))]
    pub async fn run(mut self) {
        debug!("starting alert actor");

        loop {
            tokio::select! {
                biased;

                cmd = self.command_rx.recv() => {
                    let Some(cmd) = cmd else {
                        warn!("command channel closed, shutting down");
                        break;
                    };

                    match cmd {
                        AlertCommand::GetState { key, respond_to } => {
                            let _ = respond_to.send(self.states.get(&key).cloned());
                        }

                        AlertCommand::MuteAlerts { duration_secs } => {
                            debug!("muting alerts for {duration_secs}s");
                            self.muted_until =
                                Some(Instant::now() + Duration::from_secs(duration_secs));
                        }

                        AlertCommand::UnmuteAlerts => {
                            debug!("unmuting alerts");
                            self.muted_until = None;
                        }

                        AlertCommand::Shutdown => {
                            debug!("received shutdown command");
                            break;
                        }
                    }
                }

                result = self.result_rx.recv() => {
                    match result {
                        Ok(result) => self.handle_result(result).await,
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!("alert actor lagged, skipped {skipped} results");
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            debug!("result channel closed, shutting down");
                            break;
                        }
                    }
                }
            }
        }

        debug!("alert actor stopped");
    }

    #[instrument(skip(self, result), fields(key = %result.key()))]
    async fn handle_result(&mut self, result: CheckResult) {
        let key = result.key();
        let state = self.states.entry(key.clone()).or_insert_with(|| AlertState {
            key,
            consecutive_unhealthy: 0,
            last_status: result.status,
            last_evaluation: result.timestamp,
        });

        let failing = result.status == HealthStatus::Unhealthy;
        let evaluation = Escalation::evaluate(failing, self.grace, state.consecutive_unhealthy);

        trace!(
            "{} ({}), grace {}/{} → {evaluation:?}",
            result.status, result.value, state.consecutive_unhealthy, self.grace
        );

        state.consecutive_unhealthy = evaluation.next_count(state.consecutive_unhealthy);
        state.last_status = result.status;
        state.last_evaluation = Utc::now();

        if !evaluation.should_notify() {
            return;
        }

        if self.muted() {
            debug!("alerts muted, suppressing {evaluation:?}");
            return;
        }

        self.manager.notify(evaluation, &result).await;
    }
}

/// Handle for controlling an [`AlertActor`]
#[derive(Clone)]
pub struct AlertHandle {
    sender: mpsc::Sender<AlertCommand>,
}

impl AlertHandle {
    pub fn spawn(
        manager: AlertManager,
        grace: usize,
        result_rx: broadcast::Receiver<CheckResult>,
    ) -> (Self, JoinHandle<()>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);

        let actor = AlertActor::new(manager, grace, cmd_rx, result_rx);
        let task = tokio::spawn(actor.run());

        (Self { sender: cmd_tx }, task)
    }

    pub async fn get_state(&self, key: ResultKey) -> Result<Option<AlertState>> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(AlertCommand::GetState {
                key,
                respond_to: tx,
            })
            .await
            .context("failed to send GetState command")?;

        rx.await.context("failed to receive alert state")
    }

    pub async fn mute_alerts(&self, duration_secs: u64) -> Result<()> {
        self.sender
            .send(AlertCommand::MuteAlerts { duration_secs })
            .await
            .context("failed to send MuteAlerts command")?;
        Ok(())
    }

    pub async fn unmute_alerts(&self) -> Result<()> {
        self.sender
            .send(AlertCommand::UnmuteAlerts)
            .await
            .context("failed to send UnmuteAlerts command")?;
        Ok(())
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(AlertCommand::Shutdown)
            .await
            .context("failed to send Shutdown command")?;
        Ok(())
    }
}
