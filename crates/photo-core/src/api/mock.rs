//! Mock Studio API
//!
//! Scripted in-memory server for tests and offline demos. Responses are
//! queued per endpoint and consumed in order.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use super::{
    CreateJobRequest, CreatePaymentRequest, CreatedJob, CreatedPayment, JobStatus,
    PaymentStatus, StudioApi,
};
use crate::error::{Result, StudioError};
use crate::model::{Avatar, BuyerId, JobId, PaymentId};

/// Number of calls received per endpoint
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MockCalls {
    pub create_payment: usize,
    pub payment_status: usize,
    pub create_job: usize,
    pub job_status: usize,
    pub list_avatars: usize,
}

#[derive(Default)]
struct MockState {
    payments: VecDeque<Result<CreatedPayment>>,
    payment_statuses: VecDeque<Result<PaymentStatus>>,
    jobs: VecDeque<Result<CreatedJob>>,
    job_statuses: VecDeque<Result<JobStatus>>,
    last_job_status: Option<JobStatus>,
    avatars: Vec<Avatar>,
    payment_requests: Vec<CreatePaymentRequest>,
    job_requests: Vec<CreateJobRequest>,
    calls: MockCalls,
}

/// Scripted studio server
///
/// - payment status: an empty queue answers `pending`
/// - job status: an empty queue repeats the last scripted status
/// - payment and job creation: an empty queue is an error
#[derive(Default)]
pub struct MockStudioApi {
    state: Mutex<MockState>,
}

impl MockStudioApi {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push_payment(&self, response: Result<CreatedPayment>) -> &Self {
        self.state().payments.push_back(response);
        self
    }

    pub fn push_payment_status(&self, response: Result<PaymentStatus>) -> &Self {
        self.state().payment_statuses.push_back(response);
        self
    }

    pub fn push_job(&self, response: Result<CreatedJob>) -> &Self {
        self.state().jobs.push_back(response);
        self
    }

    pub fn push_job_status(&self, response: Result<JobStatus>) -> &Self {
        self.state().job_statuses.push_back(response);
        self
    }

    pub fn set_avatars(&self, avatars: Vec<Avatar>) -> &Self {
        self.state().avatars = avatars;
        self
    }

    pub fn calls(&self) -> MockCalls {
        self.state().calls
    }

    pub fn payment_requests(&self) -> Vec<CreatePaymentRequest> {
        self.state().payment_requests.clone()
    }

    pub fn job_requests(&self) -> Vec<CreateJobRequest> {
        self.state().job_requests.clone()
    }
}

#[async_trait]
impl StudioApi for MockStudioApi {
    async fn create_payment(&self, request: &CreatePaymentRequest) -> Result<CreatedPayment> {
        let mut state = self.state();
        state.calls.create_payment += 1;
        state.payment_requests.push(request.clone());
        state
            .payments
            .pop_front()
            .unwrap_or_else(|| Err(StudioError::Other("no scripted payment".into())))
    }

    async fn payment_status(&self, _payment_id: &PaymentId) -> Result<PaymentStatus> {
        let mut state = self.state();
        state.calls.payment_status += 1;
        state
            .payment_statuses
            .pop_front()
            .unwrap_or_else(|| Ok(PaymentStatus::pending()))
    }

    async fn create_generation_job(&self, request: &CreateJobRequest) -> Result<CreatedJob> {
        let mut state = self.state();
        state.calls.create_job += 1;
        state.job_requests.push(request.clone());
        state
            .jobs
            .pop_front()
            .unwrap_or_else(|| Err(StudioError::Other("no scripted job".into())))
    }

    async fn generation_job(&self, job_id: &JobId) -> Result<JobStatus> {
        let mut state = self.state();
        state.calls.job_status += 1;
        match state.job_statuses.pop_front() {
            Some(Ok(status)) => {
                state.last_job_status = Some(status.clone());
                Ok(status)
            }
            Some(Err(e)) => Err(e),
            None => state
                .last_job_status
                .clone()
                .ok_or_else(|| StudioError::NotFound(format!("job {job_id}"))),
        }
    }

    async fn list_avatars(&self, _buyer_id: &BuyerId) -> Result<Vec<Avatar>> {
        let mut state = self.state();
        state.calls.list_avatars += 1;
        Ok(state.avatars.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::GenerationStatus;

    #[tokio::test]
    async fn job_status_repeats_last_response() {
        let api = MockStudioApi::new();
        api.push_job_status(Ok(JobStatus {
            status: GenerationStatus::Processing,
            progress: Default::default(),
            assets: vec!["a".into()],
        }));

        let job = JobId::new("j1");
        assert_eq!(api.generation_job(&job).await.unwrap().assets.len(), 1);
        assert_eq!(api.generation_job(&job).await.unwrap().assets.len(), 1);
        assert_eq!(api.calls().job_status, 2);
    }

    #[tokio::test]
    async fn payment_status_defaults_to_pending() {
        let api = MockStudioApi::new();
        let status = api.payment_status(&PaymentId::new("p1")).await.unwrap();
        assert_eq!(status, PaymentStatus::pending());
    }
}
