//! Generation Resume Coordinator
//!
//! Runs once at bootstrap, after the session resolves and before any view is
//! shown. When the app was relaunched from an external hand-off it decides,
//! from server truth, which avatar the purchase applies to and either routes
//! to upload or starts (or attaches to) a generation job.
//!
//! ```text
//! launch URL ──▶ resume marker? ──no──▶ ColdStart
//!                     │yes
//!                     ▼
//!        buyer (session, then ?buyer_id) ──none──▶ ColdStart
//!                     │
//!                     ▼
//!     GET /buyers/{id}/avatars + fresh intent record
//!                     │
//!        ┌────────────┼─────────────────────────┐
//!   no avatar   0 reference photos        target avatar
//!        │            │                         │
//!        ▼            ▼                         ▼
//!   RouteToUpload RouteToUpload    processing + job ─▶ attach ─┐
//!   (credit kept) (credit kept)    otherwise ─▶ create (retry) ─▶ Tracking
//! ```

use std::sync::Arc;

use photo_core::{
    Avatar, AvatarId, BuyerId, ClientPreferences, CreateJobRequest, GenerationJob, JobId,
    PersistedIntentRecord, PersistentIntentStore, PollingController, StudioApi, StudioConfig,
    TierId,
};
use photo_payments::find_tier;

use crate::error::Result;
use crate::launch::LaunchContext;
use crate::retry::{RetryPolicy, create_job_with_retry};
use crate::tracker::{GenerationTracker, TrackerTimings};

/// Package assumed when no fresh intent names one
pub const FALLBACK_TIER: &str = "standard";

/// What the app should show after bootstrap
#[derive(Debug)]
pub enum ResumeOutcome {
    /// Ordinary start; nothing to resume
    ColdStart,
    /// Send the user to reference-photo upload; the purchased credit is
    /// persisted in `ClientPreferences` for the next upload
    RouteToUpload {
        avatar_id: Option<AvatarId>,
        pro_credit: bool,
    },
    /// A generation job is being tracked
    Tracking(GenerationTracker),
}

#[derive(Debug)]
pub struct ResumeReport {
    /// Launch URL without the resume marker
    pub cleaned_url: String,
    pub outcome: ResumeOutcome,
}

/// Pick the avatar a resumed purchase applies to.
///
/// An exact match with the intent's avatar wins. The intent may carry a
/// temporary pre-upload id the server never saw, so otherwise the most
/// recently created avatar that is not already processing is used. Failing
/// that, the most recent avatar with a running job is attached to.
pub fn select_target<'a>(
    avatars: &'a [Avatar],
    record: Option<&PersistedIntentRecord>,
) -> Option<&'a Avatar> {
    if let Some(wanted) = record.and_then(|r| r.avatar_id.as_ref()) {
        if let Some(avatar) = avatars.iter().find(|a| &a.id == wanted) {
            return Some(avatar);
        }
        tracing::debug!(
            avatar_id = %wanted,
            temporary = wanted.is_temporary(),
            "Intent avatar not on server, falling back"
        );
    }

    avatars
        .iter()
        .filter(|a| !a.is_processing())
        .max_by_key(|a| a.created_at)
        .or_else(|| {
            avatars
                .iter()
                .filter(|a| a.job_id.is_some())
                .max_by_key(|a| a.created_at)
        })
}

fn requested_count(record: Option<&PersistedIntentRecord>) -> u32 {
    record
        .and_then(|r| find_tier(&r.tier_id).ok())
        .or_else(|| find_tier(&TierId::new(FALLBACK_TIER)).ok())
        .map_or(0, |tier| tier.photo_count)
}

pub struct GenerationResumeCoordinator {
    api: Arc<dyn StudioApi>,
    intents: PersistentIntentStore,
    preferences: ClientPreferences,
    polls: PollingController,
    retry: RetryPolicy,
    tracking: TrackerTimings,
}

impl GenerationResumeCoordinator {
    pub fn new(api: Arc<dyn StudioApi>, intents: PersistentIntentStore, polls: PollingController) -> Self {
        let preferences = ClientPreferences::new(intents.store().clone());
        Self {
            api,
            intents,
            preferences,
            polls,
            retry: RetryPolicy::default(),
            tracking: TrackerTimings::default(),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: &StudioConfig) -> Self {
        self.retry = RetryPolicy::from(config);
        self.tracking = TrackerTimings::from(config);
        self
    }

    #[must_use]
    pub const fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub const fn with_tracking(mut self, tracking: TrackerTimings) -> Self {
        self.tracking = tracking;
        self
    }

    /// Inspect `launch_url` and resume a purchase if it asks for one.
    ///
    /// `session_buyer` is the identity from the established session; the
    /// URL's `buyer_id` is only used when it is absent.
    pub async fn run(&self, launch_url: &str, session_buyer: Option<&BuyerId>) -> Result<ResumeReport> {
        let launch = LaunchContext::parse(launch_url)?;
        let outcome = if launch.resume {
            let buyer = session_buyer.cloned().or(launch.buyer_hint);
            self.resume(buyer).await?
        } else {
            tracing::debug!("No resume marker, cold start");
            ResumeOutcome::ColdStart
        };

        Ok(ResumeReport {
            cleaned_url: launch.cleaned_url,
            outcome,
        })
    }

    async fn resume(&self, buyer: Option<BuyerId>) -> Result<ResumeOutcome> {
        let Some(buyer) = buyer else {
            tracing::warn!("Resume requested without a buyer identity, cold start");
            return Ok(ResumeOutcome::ColdStart);
        };

        let record = match self.intents.read() {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(error = %e, "Could not read persisted intent");
                None
            }
        };
        tracing::info!(
            buyer = %buyer,
            provider = record.as_ref().map(|r| r.provider.as_str()),
            "Resuming after external hand-off"
        );

        let avatars = self.api.list_avatars(&buyer).await?;
        let Some(target) = select_target(&avatars, record.as_ref()) else {
            tracing::info!(buyer = %buyer, "No avatar to resume, routing to upload");
            return self.route_to_upload(None);
        };

        if !target.has_references() {
            tracing::info!(avatar_id = %target.id, "Avatar has no reference photos, routing to upload");
            return self.route_to_upload(Some(target.id.clone()));
        }

        let requested_count = requested_count(record.as_ref());
        // A finished avatar may still carry the id of an earlier generation.
        let running_job = target.job_id.as_ref().filter(|_| target.is_processing());
        let job_id: JobId = match running_job {
            Some(job_id) => {
                tracing::info!(avatar_id = %target.id, job_id = %job_id, "Attaching to existing job");
                job_id.clone()
            }
            None => {
                let request = CreateJobRequest {
                    avatar_id: target.id.clone(),
                    requested_count,
                    use_stored_references: true,
                };
                create_job_with_retry(self.api.as_ref(), &request, self.retry)
                    .await?
                    .job_id
            }
        };

        self.clear_intent();
        let tracker = GenerationTracker::start(
            self.api.clone(),
            self.polls.clone(),
            self.intents.clock().clone(),
            GenerationJob::new(job_id, target.id.clone(), requested_count),
            self.tracking,
        )?;
        Ok(ResumeOutcome::Tracking(tracker))
    }

    /// Persist the credit, then drop the intent it came from
    fn route_to_upload(&self, avatar_id: Option<AvatarId>) -> Result<ResumeOutcome> {
        self.preferences.grant_pro_credit()?;
        self.clear_intent();
        Ok(ResumeOutcome::RouteToUpload {
            avatar_id,
            pro_credit: true,
        })
    }

    fn clear_intent(&self) {
        if let Err(e) = self.intents.clear() {
            tracing::warn!(error = %e, "Failed to clear persisted intent after resume");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GenerationError;
    use crate::tracker::GenerationOutcome;
    use chrono::{DateTime, Duration, Utc};
    use photo_core::api::mock::MockStudioApi;
    use photo_core::{
        AvatarStatus, Clock, CreatedJob, GenerationStatus, JobProgress, JobStatus, ManualClock,
        MemoryDurableStore, PaymentProvider, StudioError,
    };

    const RESUME_URL: &str = "https://app.example/?resume=1&buyer_id=42";

    struct Harness {
        api: Arc<MockStudioApi>,
        store: Arc<MemoryDurableStore>,
        clock: Arc<ManualClock>,
        intents: PersistentIntentStore,
        coordinator: GenerationResumeCoordinator,
    }

    fn harness() -> Harness {
        let api = Arc::new(MockStudioApi::new());
        let store = Arc::new(MemoryDurableStore::new());
        let clock = Arc::new(ManualClock::default());
        let intents = PersistentIntentStore::new(store.clone(), clock.clone());
        let coordinator = GenerationResumeCoordinator::new(api.clone(), intents.clone(), PollingController::new());
        Harness {
            api,
            store,
            clock,
            intents,
            coordinator,
        }
    }

    fn avatar(id: &str, status: AvatarStatus, references: u32, created_at: DateTime<Utc>) -> Avatar {
        Avatar {
            id: id.into(),
            name: None,
            status,
            reference_photo_count: references,
            created_at,
            job_id: None,
        }
    }

    fn record(h: &Harness, provider: PaymentProvider, tier: &str, avatar_id: &str) -> PersistedIntentRecord {
        PersistedIntentRecord::new(provider, tier.into(), Some(avatar_id.into()), h.clock.now())
    }

    fn created(job_id: &str) -> photo_core::Result<CreatedJob> {
        Ok(CreatedJob { job_id: job_id.into() })
    }

    #[tokio::test]
    async fn no_marker_is_a_cold_start() {
        let h = harness();
        let report = h.coordinator.run("https://app.example/?tab=gallery", None).await.unwrap();

        assert!(matches!(report.outcome, ResumeOutcome::ColdStart));
        assert_eq!(report.cleaned_url, "https://app.example/?tab=gallery");
        assert_eq!(h.api.calls().list_avatars, 0);
    }

    #[tokio::test]
    async fn marker_without_identity_is_a_cold_start() {
        let h = harness();
        let report = h.coordinator.run("https://app.example/?resume=1", None).await.unwrap();

        assert!(matches!(report.outcome, ResumeOutcome::ColdStart));
        assert_eq!(report.cleaned_url, "https://app.example/");
        assert_eq!(h.api.calls().list_avatars, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_wallet_intent_falls_back_to_latest_idle_avatar() {
        let h = harness();
        let now = h.clock.now();
        h.api.set_avatars(vec![
            avatar("av-old", AvatarStatus::Ready, 12, now - Duration::days(2)),
            avatar("av-new", AvatarStatus::Ready, 10, now - Duration::days(1)),
            avatar("av-busy", AvatarStatus::Processing, 10, now - Duration::hours(1)),
        ]);
        h.api.push_job(created("j1"));
        h.intents
            .write(&record(&h, PaymentProvider::WalletTransfer, "premium", "av-old"))
            .unwrap();
        h.clock.advance(Duration::minutes(10));

        let report = h.coordinator.run(RESUME_URL, None).await.unwrap();

        let ResumeOutcome::Tracking(tracker) = report.outcome else {
            panic!("expected tracking");
        };
        assert_eq!(tracker.job_id(), JobId::new("j1"));
        let requests = h.api.job_requests();
        assert_eq!(requests[0].avatar_id, AvatarId::new("av-new"));
        assert_eq!(requests[0].requested_count, 23);
        assert!(requests[0].use_stored_references);
        assert!(h.intents.read().unwrap().is_none());
        tracker.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn fresh_redirect_intent_matches_exactly() {
        let h = harness();
        let now = h.clock.now();
        h.api.set_avatars(vec![
            avatar("av-old", AvatarStatus::Ready, 12, now - Duration::days(2)),
            avatar("av-new", AvatarStatus::Ready, 10, now - Duration::days(1)),
        ]);
        h.api.push_job(created("j2"));
        h.intents
            .write(&record(&h, PaymentProvider::HostedRedirect, "premium", "av-old"))
            .unwrap();
        h.clock.advance(Duration::hours(1));

        let session = BuyerId::new("42");
        let report = h.coordinator.run(RESUME_URL, Some(&session)).await.unwrap();

        assert!(matches!(report.outcome, ResumeOutcome::Tracking(_)));
        let requests = h.api.job_requests();
        assert_eq!(requests[0].avatar_id, AvatarId::new("av-old"));
        assert_eq!(requests[0].requested_count, 50);
        assert!(h.intents.read().unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn temporary_avatar_id_falls_back() {
        let h = harness();
        let now = h.clock.now();
        h.api.set_avatars(vec![avatar("av-server", AvatarStatus::Draft, 8, now)]);
        h.api.push_job(created("j3"));
        let temporary = AvatarId::temporary();
        h.intents
            .write(&PersistedIntentRecord::new(
                PaymentProvider::HostedRedirect,
                "starter".into(),
                Some(temporary),
                now,
            ))
            .unwrap();

        h.coordinator.run(RESUME_URL, None).await.unwrap();

        let requests = h.api.job_requests();
        assert_eq!(requests[0].avatar_id, AvatarId::new("av-server"));
        assert_eq!(requests[0].requested_count, 10);
    }

    #[tokio::test]
    async fn avatar_without_references_routes_to_upload() {
        let h = harness();
        let now = h.clock.now();
        h.api.set_avatars(vec![avatar("av1", AvatarStatus::Draft, 0, now)]);
        h.intents
            .write(&record(&h, PaymentProvider::HostedRedirect, "standard", "av1"))
            .unwrap();

        let report = h.coordinator.run(RESUME_URL, None).await.unwrap();

        assert!(matches!(
            report.outcome,
            ResumeOutcome::RouteToUpload { avatar_id: Some(ref id), pro_credit: true } if id.as_str() == "av1"
        ));
        assert_eq!(h.api.calls().create_job, 0);
        assert!(h.intents.read().unwrap().is_none());
        assert!(ClientPreferences::new(h.store.clone()).has_pro_credit().unwrap());
    }

    #[tokio::test]
    async fn no_avatars_routes_to_upload_with_credit() {
        let h = harness();
        h.intents
            .write(&record(&h, PaymentProvider::HostedRedirect, "standard", "av1"))
            .unwrap();
        let report = h.coordinator.run(RESUME_URL, None).await.unwrap();

        assert!(matches!(
            report.outcome,
            ResumeOutcome::RouteToUpload {
                avatar_id: None,
                pro_credit: true
            }
        ));
        assert!(h.intents.read().unwrap().is_none());

        // A later launch over the same storage still sees the credit.
        let relaunched = ClientPreferences::new(h.store.clone());
        assert!(relaunched.take_pro_credit().unwrap());
        assert!(!relaunched.has_pro_credit().unwrap());
    }

    #[tokio::test]
    async fn cold_start_grants_no_credit() {
        let h = harness();
        h.coordinator.run("https://app.example/", None).await.unwrap();
        assert!(!ClientPreferences::new(h.store.clone()).has_pro_credit().unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn finished_job_on_ready_avatar_gets_a_new_job() {
        let h = harness();
        let mut ready = avatar("av1", AvatarStatus::Ready, 10, h.clock.now());
        ready.job_id = Some("j-old-completed".into());
        h.api.set_avatars(vec![ready]);
        h.api.push_job(created("j-new"));
        h.intents
            .write(&record(&h, PaymentProvider::HostedRedirect, "standard", "av1"))
            .unwrap();

        let report = h.coordinator.run(RESUME_URL, None).await.unwrap();

        let ResumeOutcome::Tracking(tracker) = report.outcome else {
            panic!("expected tracking");
        };
        assert_eq!(tracker.job_id(), JobId::new("j-new"));
        assert_eq!(h.api.calls().create_job, 1);
        assert_eq!(h.api.job_requests()[0].avatar_id, AvatarId::new("av1"));
        tracker.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn known_job_is_attached_not_recreated() {
        let h = harness();
        let mut busy = avatar("av1", AvatarStatus::Processing, 10, h.clock.now());
        busy.job_id = Some("j-existing".into());
        h.api.set_avatars(vec![busy]);

        let report = h.coordinator.run(RESUME_URL, None).await.unwrap();

        let ResumeOutcome::Tracking(tracker) = report.outcome else {
            panic!("expected tracking");
        };
        assert_eq!(tracker.job_id(), JobId::new("j-existing"));
        assert_eq!(h.api.calls().create_job, 0);
        tracker.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn unconfirmed_payment_keeps_the_intent() {
        let h = harness();
        h.api.set_avatars(vec![avatar("av1", AvatarStatus::Ready, 10, h.clock.now())]);
        for _ in 0..3 {
            h.api.push_job(Err(StudioError::PaymentNotConfirmed));
        }
        h.intents
            .write(&record(&h, PaymentProvider::HostedRedirect, "standard", "av1"))
            .unwrap();

        let err = h.coordinator.run(RESUME_URL, None).await.unwrap_err();

        assert!(matches!(err, GenerationError::PaymentNotConfirmed { attempts: 3 }));
        assert_eq!(h.api.calls().create_job, 3);
        assert!(h.intents.read().unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn resumed_job_is_tracked_to_completion() {
        let h = harness();
        h.api.set_avatars(vec![avatar("av1", AvatarStatus::Ready, 10, h.clock.now())]);
        h.api
            .push_job(Err(StudioError::PaymentNotConfirmed))
            .push_job(created("j9"));
        h.api
            .push_job_status(Ok(JobStatus {
                status: GenerationStatus::Processing,
                progress: JobProgress { completed: 5, total: 23 },
                assets: (0..5).map(|i| format!("https://cdn.example/{i}.jpg")).collect(),
            }))
            .push_job_status(Ok(JobStatus {
                status: GenerationStatus::Completed,
                progress: JobProgress { completed: 23, total: 23 },
                assets: (0..23).map(|i| format!("https://cdn.example/{i}.jpg")).collect(),
            }));

        let report = h.coordinator.run(RESUME_URL, None).await.unwrap();
        let ResumeOutcome::Tracking(tracker) = report.outcome else {
            panic!("expected tracking");
        };

        let job = tracker.wait().await.into_result().unwrap();
        assert_eq!(job.completed.len(), 23);
        assert!(matches!(tracker.outcome(), Some(GenerationOutcome::Completed(_))));
    }

    #[test]
    fn exact_match_wins_even_when_processing() {
        let now = Utc::now();
        let avatars = vec![
            avatar("av1", AvatarStatus::Processing, 10, now - Duration::days(1)),
            avatar("av2", AvatarStatus::Ready, 10, now),
        ];
        let record = PersistedIntentRecord::new(
            PaymentProvider::ChatInvoice,
            "standard".into(),
            Some("av1".into()),
            now,
        );
        assert_eq!(select_target(&avatars, Some(&record)).unwrap().id.as_str(), "av1");
        assert_eq!(select_target(&avatars, None).unwrap().id.as_str(), "av2");
    }
}
