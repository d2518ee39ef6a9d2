use chrono::Utc;
use reqwest::Client;
use serde_json::json;
use tracing::{error, info, instrument, warn};

use crate::config::Webhook;
use crate::health::CheckResult;

/// Grace-period state machine for one (check, device) pair
///
/// ```text
/// not failing:
///   consecutive <= grace → Ok
///   consecutive >  grace → Recovered     (notify)
/// failing:
///   consecutive <  grace → Failing       (count, stay quiet)
///   consecutive == grace → StartsToFail  (notify)
///   consecutive >  grace → Failing
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Escalation {
    Ok,
    Failing,
    StartsToFail,
    Recovered,
}

impl Escalation {
    pub fn evaluate(failing: bool, grace: usize, consecutive: usize) -> Escalation {
        if !failing {
            if consecutive > grace {
                return Escalation::Recovered;
            }
            return Escalation::Ok;
        }

        if consecutive == grace {
            return Escalation::StartsToFail;
        }

        Escalation::Failing
    }

    /// Counter value after this evaluation
    pub fn next_count(self, consecutive: usize) -> usize {
        match self {
            Escalation::Ok | Escalation::Recovered => 0,
            Escalation::Failing | Escalation::StartsToFail => consecutive + 1,
        }
    }

    pub fn should_notify(self) -> bool {
        matches!(self, Escalation::StartsToFail | Escalation::Recovered)
    }
}

/// Delivers escalations to the configured webhook
#[derive(Debug, Clone)]
pub struct AlertManager {
    client: Client,
    webhook: Option<Webhook>,
}

impl AlertManager {
    pub fn new(webhook: Option<Webhook>) -> Self {
        Self {
            client: Client::new(),
            webhook,
        }
    }

    pub fn format_message(evaluation: Escalation, result: &CheckResult) -> String {
        match evaluation {
            Escalation::StartsToFail => format!(
                "🔥 GPU {} failing {}: {}",
                result.gpu_id, result.check_name, result.message
            ),
            Escalation::Recovered => format!(
                "✅ GPU {} recovered on {}: {}",
                result.gpu_id, result.check_name, result.message
            ),
            _ => format!(
                "GPU {} {} update: {}",
                result.gpu_id, result.check_name, result.message
            ),
        }
    }

    #[instrument(skip(self, result), fields(key = %result.key()))]
    pub async fn notify(&self, evaluation: Escalation, result: &CheckResult) {
        let message = Self::format_message(evaluation, result);

        match evaluation {
            Escalation::StartsToFail => warn!("{message}"),
            _ => info!("{message}"),
        }

        let Some(webhook) = &self.webhook else {
            return;
        };

        let payload = json!({
            "message": message,
            "gpu_id": result.gpu_id,
            "check_name": result.check_name,
            "status": result.status,
            "value": result.value,
            "threshold": result.threshold,
            "timestamp": Utc::now().to_rfc3339()
        });

        match self.client.post(&webhook.url).json(&payload).send().await {
            Ok(response) => {
                if response.status().is_success() {
                    info!("sent webhook alert");
                } else {
                    error!("webhook alert failed with status: {}", response.status());
                }
            }
            Err(e) => {
                error!("failed to send webhook alert: {e}");
            }
        }
    }
}
