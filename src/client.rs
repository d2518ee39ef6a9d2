//! Typed HTTP client for the daemon API, used by `gputl`

use std::time::Duration;

use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::api::types::{
    ChecksResponse, GpuDetail, GpusResponse, HealthResponse, ResultsResponse,
};
use crate::health::CheckResult;
use crate::ledger::{DeviceRecord, Registration};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-2xx answer; `message` is the server's `error` field when present
    #[error("daemon returned {status}: {message}")]
    Api { status: u16, message: String },
}

pub type ClientResult<T> = Result<T, ClientError>;

#[derive(Debug, Clone)]
pub struct GputlClient {
    client: Client,
    base_url: String,
}

impl GputlClient {
    pub fn new(base_url: impl Into<String>) -> ClientResult<Self> {
        let client = Client::builder().timeout(Duration::from_secs(10)).build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn parse<T: DeserializeOwned>(response: Response) -> ClientResult<T> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|value| value.get("error")?.as_str().map(str::to_string))
            .unwrap_or(body);

        Err(ClientError::Api {
            status: status.as_u16(),
            message,
        })
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> ClientResult<T> {
        Self::parse(self.client.get(self.url(path)).send().await?).await
    }

    pub async fn health(&self) -> ClientResult<HealthResponse> {
        self.get("/health").await
    }

    pub async fn list_gpus(&self) -> ClientResult<GpusResponse> {
        self.get("/api/v1/gpus").await
    }

    pub async fn get_gpu(&self, gpu_id: u32) -> ClientResult<GpuDetail> {
        self.get(&format!("/api/v1/gpus/{gpu_id}")).await
    }

    pub async fn register(&self, request: &Registration) -> ClientResult<DeviceRecord> {
        let response = self
            .client
            .post(self.url("/api/v1/register"))
            .json(request)
            .send()
            .await?;
        Self::parse(response).await
    }

    pub async fn unregister(&self, gpu_id: u32) -> ClientResult<DeviceRecord> {
        let response = self
            .client
            .delete(self.url(&format!("/api/v1/unregister/{gpu_id}")))
            .send()
            .await?;
        Self::parse(response).await
    }

    pub async fn list_checks(&self) -> ClientResult<ChecksResponse> {
        self.get("/api/v1/healthchecks").await
    }

    pub async fn run_check(&self, check_name: &str, gpu_id: u32) -> ClientResult<CheckResult> {
        let response = self
            .client
            .post(self.url(&format!("/api/v1/healthchecks/{check_name}/run/{gpu_id}")))
            .send()
            .await?;
        Self::parse(response).await
    }

    pub async fn list_results(&self) -> ClientResult<ResultsResponse> {
        self.get("/api/v1/results").await
    }
}
