//! HTTP Studio Client
//!
//! `StudioApi` over the studio server's JSON endpoints.

use std::time::Duration;

use async_trait::async_trait;
use photo_core::{
    Avatar, BuyerId, CreateJobRequest, CreatePaymentRequest, CreatedJob, CreatedPayment, JobId,
    JobStatus, PaymentId, PaymentStatus, StudioApi, StudioConfig, StudioError,
    error::Result,
};
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;

/// Error body the server sends with non-2xx responses
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

fn network(e: &reqwest::Error) -> StudioError {
    StudioError::Network(e.to_string())
}

fn api_error(status: StatusCode, body: &str) -> StudioError {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    if status == StatusCode::PAYMENT_REQUIRED {
        return StudioError::PaymentNotConfirmed;
    }
    if status == StatusCode::NOT_FOUND {
        return StudioError::NotFound(parsed.message.unwrap_or_else(|| body.to_string()));
    }

    let code = parsed
        .error
        .or(parsed.code)
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("UNKNOWN").to_string());
    let message = parsed.message.unwrap_or_else(|| body.to_string());
    StudioError::api(status.as_u16(), code, message)
}

/// Studio server client
#[derive(Debug, Clone)]
pub struct HttpStudioApi {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpStudioApi {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| StudioError::Config(format!("invalid API base URL {base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(StudioError::Config(format!("API base URL {base_url} cannot be a base")));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StudioError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, base_url })
    }

    pub fn from_config(config: &StudioConfig) -> Result<Self> {
        Self::new(&config.api_base_url, config.request_timeout)
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        // Checked in `new`.
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn read<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        let body = response.text().await.map_err(|e| network(&e))?;
        if status.is_success() {
            return Ok(serde_json::from_str(&body)?);
        }
        tracing::debug!(status = %status, body = %body, "Studio server returned an error");
        Err(api_error(status, &body))
    }

    async fn get<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T> {
        let url = self.endpoint(segments);
        tracing::debug!(url = %url, "GET");
        let response = self.client.get(url).send().await.map_err(|e| network(&e))?;
        Self::read(response).await
    }

    async fn post<B: serde::Serialize + Sync, T: DeserializeOwned>(
        &self,
        segments: &[&str],
        body: &B,
    ) -> Result<T> {
        let url = self.endpoint(segments);
        tracing::debug!(url = %url, "POST");
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| network(&e))?;
        Self::read(response).await
    }
}

#[async_trait]
impl StudioApi for HttpStudioApi {
    async fn create_payment(&self, request: &CreatePaymentRequest) -> Result<CreatedPayment> {
        self.post(&["payments"], request).await
    }

    async fn payment_status(&self, payment_id: &PaymentId) -> Result<PaymentStatus> {
        self.get(&["payments", payment_id.as_str(), "status"]).await
    }

    async fn create_generation_job(&self, request: &CreateJobRequest) -> Result<CreatedJob> {
        self.post(&["generation-jobs"], request).await
    }

    async fn generation_job(&self, job_id: &JobId) -> Result<JobStatus> {
        self.get(&["generation-jobs", job_id.as_str()]).await
    }

    async fn list_avatars(&self, buyer_id: &BuyerId) -> Result<Vec<Avatar>> {
        self.get(&["buyers", buyer_id.as_str(), "avatars"]).await
    }
}
