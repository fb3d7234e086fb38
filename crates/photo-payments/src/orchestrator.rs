//! Payment Orchestrator
//!
//! State machine for one purchase attempt at a time:
//!
//! ```text
//!        ┌─────────────── reset / begin ───────────────┐
//!        ▼                                             │
//!      Form ──▶ Processing ──┬──▶ Redirect             │
//!                            ├──▶ ChatInvoiceWait ──┬──▶ Success
//!                            └──▶ WalletSign ───────┴──▶ Error
//! ```
//!
//! Every path that can end an attempt (status poll, invoice-closed event,
//! wallet transfer, request failure, cancel) goes through the attempt's
//! [`TerminalGuard`], so an attempt is settled exactly once no matter which
//! path observes the terminal condition first. Results that belong to a
//! settled or superseded attempt are dropped.
//!
//! A wallet hand-off can kill the process. [`PaymentOrchestrator::restore`]
//! picks a fresh wallet-transfer record back up on the next launch.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use photo_core::{
    BuyerId, CreatePaymentRequest, CreatedPayment, PaymentId, PaymentProvider, PersistentIntentStore,
    PollOptions, PollingController, ProbeOutcome, StudioApi, StudioConfig,
};
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;

use crate::error::{PaymentError, Result};
use crate::handoff::{
    InvoiceStatus, InvoiceSurface, Navigator, TransactionRef, TransferRequest, WalletConnector,
    WalletSession,
};
use crate::intent::{IntentStatus, PaymentIntent, PurchaseRequest, TerminalGuard};
use crate::tier::find_tier;

/// Polling key of the chat-invoice status wait
pub const CHAT_INVOICE_POLL_KEY: &str = "chat-invoice";

/// Identifies one purchase attempt
pub type AttemptId = u64;

/// Broad class of a failed attempt
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureKind {
    /// Provider reported canceled/failed
    NotCompleted,
    /// No definitive answer within the deadline; outcome unknown
    TimedOut,
    /// A request or hand-off failed before the provider answered
    Request,
}

/// User-facing description of a failed attempt
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PaymentFailure {
    pub kind: FailureKind,
    pub message: String,
    pub detail: String,
    pub retryable: bool,
}

impl PaymentFailure {
    pub fn from_error(error: &PaymentError) -> Self {
        let kind = match error {
            PaymentError::NotCompleted(_) => FailureKind::NotCompleted,
            PaymentError::DeadlineExceeded(_) => FailureKind::TimedOut,
            _ => FailureKind::Request,
        };
        Self {
            kind,
            message: error.user_message(),
            detail: error.to_string(),
            retryable: error.is_retryable(),
        }
    }
}

/// Observable orchestrator state
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PaymentState {
    Form,
    Processing {
        provider: PaymentProvider,
    },
    Redirect {
        payment_id: PaymentId,
        confirmation_url: String,
    },
    ChatInvoiceWait {
        payment_id: PaymentId,
        invoice_ref: String,
    },
    WalletSign {
        payment_id: PaymentId,
        transfer: TransferRequest,
    },
    Success {
        payment_id: PaymentId,
        transaction: Option<TransactionRef>,
    },
    Error(PaymentFailure),
}

impl PaymentState {
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Success { .. } | Self::Error(_))
    }
}

/// Terminal result of an attempt, emitted once per attempt
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PaymentOutcome {
    Succeeded {
        attempt: AttemptId,
        intent: PaymentIntent,
        transaction: Option<TransactionRef>,
    },
    Failed {
        attempt: AttemptId,
        intent: PaymentIntent,
        failure: PaymentFailure,
    },
    Cancelled {
        attempt: AttemptId,
        intent: PaymentIntent,
    },
}

/// Cadence of the chat-invoice status wait
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PaymentTimings {
    pub poll_interval: Duration,
    pub poll_deadline: Duration,
}

impl Default for PaymentTimings {
    fn default() -> Self {
        Self::from(&StudioConfig::default())
    }
}

impl From<&StudioConfig> for PaymentTimings {
    fn from(config: &StudioConfig) -> Self {
        Self {
            poll_interval: config.payment_poll_interval,
            poll_deadline: config.payment_poll_deadline,
        }
    }
}

enum Settlement {
    Succeeded(Option<TransactionRef>),
    Failed(PaymentFailure),
}

struct Attempt {
    id: AttemptId,
    intent: PaymentIntent,
    guard: TerminalGuard,
    /// Create the payment as soon as the wallet connects
    pending_auto_continue: bool,
    transfer_started: bool,
    wallet_watch: Option<CancellationToken>,
}

impl Attempt {
    fn is_live(&self) -> bool {
        !self.guard.is_sealed()
    }
}

struct Inner {
    api: Arc<dyn StudioApi>,
    intents: PersistentIntentStore,
    polls: PollingController,
    navigator: Option<Arc<dyn Navigator>>,
    invoices: Option<Arc<dyn InvoiceSurface>>,
    wallet: Option<Arc<dyn WalletConnector>>,
    timings: PaymentTimings,
    state: watch::Sender<PaymentState>,
    outcomes: broadcast::Sender<PaymentOutcome>,
    attempt: Mutex<Option<Attempt>>,
    next_attempt: AtomicU64,
}

impl Inner {
    fn set_state(&self, state: PaymentState) {
        tracing::debug!(state = ?state, "Payment state changed");
        self.state.send_replace(state);
    }
}

/// Builder for [`PaymentOrchestrator`]
pub struct PaymentOrchestratorBuilder {
    api: Arc<dyn StudioApi>,
    intents: PersistentIntentStore,
    polls: PollingController,
    navigator: Option<Arc<dyn Navigator>>,
    invoices: Option<Arc<dyn InvoiceSurface>>,
    wallet: Option<Arc<dyn WalletConnector>>,
    timings: PaymentTimings,
}

impl PaymentOrchestratorBuilder {
    #[must_use]
    pub fn navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        self.navigator = Some(navigator);
        self
    }

    #[must_use]
    pub fn invoices(mut self, invoices: Arc<dyn InvoiceSurface>) -> Self {
        self.invoices = Some(invoices);
        self
    }

    #[must_use]
    pub fn wallet(mut self, wallet: Arc<dyn WalletConnector>) -> Self {
        self.wallet = Some(wallet);
        self
    }

    #[must_use]
    pub const fn timings(mut self, timings: PaymentTimings) -> Self {
        self.timings = timings;
        self
    }

    pub fn build(self) -> PaymentOrchestrator {
        let (state, _) = watch::channel(PaymentState::Form);
        let (outcomes, _) = broadcast::channel(16);
        PaymentOrchestrator {
            inner: Arc::new(Inner {
                api: self.api,
                intents: self.intents,
                polls: self.polls,
                navigator: self.navigator,
                invoices: self.invoices,
                wallet: self.wallet,
                timings: self.timings,
                state,
                outcomes,
                attempt: Mutex::new(None),
                next_attempt: AtomicU64::new(1),
            }),
        }
    }
}

/// Drives purchase attempts across the three payment providers
#[derive(Clone)]
pub struct PaymentOrchestrator {
    inner: Arc<Inner>,
}

impl PaymentOrchestrator {
    pub fn builder(
        api: Arc<dyn StudioApi>,
        intents: PersistentIntentStore,
        polls: PollingController,
    ) -> PaymentOrchestratorBuilder {
        PaymentOrchestratorBuilder {
            api,
            intents,
            polls,
            navigator: None,
            invoices: None,
            wallet: None,
            timings: PaymentTimings::default(),
        }
    }

    fn upgrade(weak: &Weak<Inner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    fn attempt_slot(&self) -> MutexGuard<'_, Option<Attempt>> {
        self.inner.attempt.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` on attempt `id` if it is still current and unsettled
    fn with_live<T>(&self, id: AttemptId, f: impl FnOnce(&mut Attempt, &Inner) -> Result<T>) -> Result<T> {
        let mut slot = self.attempt_slot();
        match slot.as_mut() {
            Some(attempt) if attempt.id == id && attempt.is_live() => f(attempt, &self.inner),
            _ => Err(PaymentError::Cancelled),
        }
    }

    fn is_live(&self, id: AttemptId) -> bool {
        self.attempt_slot()
            .as_ref()
            .is_some_and(|a| a.id == id && a.is_live())
    }

    /// Current state
    pub fn state(&self) -> PaymentState {
        self.inner.state.borrow().clone()
    }

    /// Watch state changes
    pub fn subscribe(&self) -> watch::Receiver<PaymentState> {
        self.inner.state.subscribe()
    }

    /// Receive terminal outcomes (one per attempt)
    pub fn outcomes(&self) -> broadcast::Receiver<PaymentOutcome> {
        self.inner.outcomes.subscribe()
    }

    /// Intent of the current or last attempt
    pub fn intent(&self) -> Option<PaymentIntent> {
        self.attempt_slot().as_ref().map(|a| a.intent.clone())
    }

    fn ensure_provider(&self, provider: PaymentProvider) -> Result<()> {
        let configured = match provider {
            PaymentProvider::HostedRedirect => self.inner.navigator.is_some(),
            PaymentProvider::ChatInvoice => self.inner.invoices.is_some(),
            PaymentProvider::WalletTransfer => self.inner.wallet.is_some(),
        };
        if configured {
            Ok(())
        } else {
            Err(PaymentError::ProviderUnavailable(provider.to_string()))
        }
    }

    /// Start a purchase attempt and drive it to its provider hand-off.
    ///
    /// Allowed from `Form` or a terminal state. Failures are also reflected in
    /// the state (`Error`) and on the outcome channel.
    pub async fn begin(&self, request: PurchaseRequest) -> Result<AttemptId> {
        let tier = find_tier(&request.tier_id)?;
        let provider = request.provider;
        self.ensure_provider(provider)?;

        let intent = PaymentIntent::new(request, tier.photo_count, self.inner.intents.clock().now());
        let attempt_id = self.install(intent)?;

        let result = match provider {
            PaymentProvider::HostedRedirect => self.run_hosted_redirect(attempt_id).await,
            PaymentProvider::ChatInvoice => self.run_chat_invoice(attempt_id).await,
            PaymentProvider::WalletTransfer => self.run_wallet_transfer(attempt_id).await,
        };
        self.conclude(attempt_id, result)
    }

    /// Resume a wallet transfer the process did not survive.
    ///
    /// Reads the persisted intent; only a fresh wallet-transfer record is
    /// picked up (stale records are discarded by the store). A payment the
    /// server already reports paid settles immediately. Otherwise the attempt
    /// continues as soon as the wallet session is back, without asking for a
    /// new connection. Returns `None` when there is nothing to restore.
    pub async fn restore(&self, buyer_id: BuyerId) -> Result<Option<AttemptId>> {
        let Some(wallet) = self.inner.wallet.clone() else {
            return Ok(None);
        };
        let Some(record) = self.inner.intents.read()? else {
            return Ok(None);
        };
        if record.provider != PaymentProvider::WalletTransfer {
            return Ok(None);
        }

        let tier = find_tier(&record.tier_id)?;
        let intent = PaymentIntent::from_record(&record, buyer_id, tier.photo_count);
        let attempt_id = self.install(intent)?;
        tracing::info!(
            attempt = attempt_id,
            payment_id = record.payment_id.as_ref().map(PaymentId::as_str),
            "Restoring wallet transfer"
        );

        let result = self.continue_restored(attempt_id, record.payment_id, wallet.as_ref()).await;
        self.conclude(attempt_id, result).map(Some)
    }

    async fn continue_restored(
        &self,
        id: AttemptId,
        payment_id: Option<PaymentId>,
        wallet: &dyn WalletConnector,
    ) -> Result<()> {
        if let Some(payment_id) = payment_id {
            let status = self.inner.api.payment_status(&payment_id).await?;
            if status.paid {
                self.settle(id, Settlement::Succeeded(None));
                return Ok(());
            }
            if status.is_failed() {
                return Err(PaymentError::NotCompleted(format!(
                    "provider reported {:?}",
                    status.status
                )));
            }
        }

        if self.arm_auto_continue(id, wallet)? {
            self.prepare_transfer(id).await
        } else {
            tracing::info!(attempt = id, "Waiting for the wallet session to return");
            Ok(())
        }
    }

    fn install(&self, intent: PaymentIntent) -> Result<AttemptId> {
        let mut slot = self.attempt_slot();
        if slot.as_ref().is_some_and(Attempt::is_live) {
            return Err(PaymentError::InvalidState(
                "a payment attempt is already in progress".into(),
            ));
        }
        let id = self.inner.next_attempt.fetch_add(1, Ordering::Relaxed);
        let provider = intent.provider;
        tracing::info!(
            attempt = id,
            provider = %provider,
            tier = %intent.tier_id,
            buyer = %intent.buyer_id,
            "Payment attempt started"
        );
        *slot = Some(Attempt {
            id,
            intent,
            guard: TerminalGuard::new(),
            pending_auto_continue: false,
            transfer_started: false,
            wallet_watch: None,
        });
        self.inner.set_state(PaymentState::Processing { provider });
        Ok(id)
    }

    fn conclude(&self, id: AttemptId, result: Result<()>) -> Result<AttemptId> {
        match result {
            Ok(()) => Ok(id),
            Err(PaymentError::Cancelled) => Err(PaymentError::Cancelled),
            Err(e) => {
                tracing::warn!(attempt = id, error = %e, "Payment attempt failed");
                self.settle(id, Settlement::Failed(PaymentFailure::from_error(&e)));
                Err(e)
            }
        }
    }

    async fn create_payment(&self, id: AttemptId) -> Result<CreatedPayment> {
        let request = self.with_live(id, |attempt, _| {
            let intent = &attempt.intent;
            let price = find_tier(&intent.tier_id)?.price_for(intent.provider);
            Ok(CreatePaymentRequest {
                tier_id: intent.tier_id.clone(),
                photo_count: intent.photo_count,
                avatar_id: intent.avatar_id.clone(),
                provider: intent.provider,
                buyer_id: intent.buyer_id.clone(),
                quoted_amount: price.amount,
                currency: price.currency.to_string(),
            })
        })?;

        let created = self.inner.api.create_payment(&request).await?;
        tracing::info!(attempt = id, payment_id = %created.payment_id, "Payment created");

        self.with_live(id, |attempt, _| {
            attempt.intent.assign_payment_id(created.payment_id.clone())
        })?;
        Ok(created)
    }

    async fn run_hosted_redirect(&self, id: AttemptId) -> Result<()> {
        let navigator = self
            .inner
            .navigator
            .clone()
            .ok_or_else(|| PaymentError::ProviderUnavailable(PaymentProvider::HostedRedirect.to_string()))?;

        let created = self.create_payment(id).await?;
        let confirmation_url = created
            .confirmation_url
            .ok_or(PaymentError::MissingField("confirmationUrl"))?;

        // The process may not survive the navigation; the record must be on disk first.
        self.with_live(id, |attempt, inner| {
            inner.intents.write(&attempt.intent.to_record())?;
            inner.set_state(PaymentState::Redirect {
                payment_id: created.payment_id.clone(),
                confirmation_url: confirmation_url.clone(),
            });
            Ok(())
        })?;

        tracing::info!(attempt = id, "Redirecting to hosted checkout");
        navigator.open_external(&confirmation_url).await
    }

    async fn run_chat_invoice(&self, id: AttemptId) -> Result<()> {
        let invoices = self
            .inner
            .invoices
            .clone()
            .ok_or_else(|| PaymentError::ProviderUnavailable(PaymentProvider::ChatInvoice.to_string()))?;

        let created = self.create_payment(id).await?;
        let invoice_ref = created
            .invoice_ref
            .ok_or(PaymentError::MissingField("invoiceRef"))?;
        let payment_id = created.payment_id;

        self.with_live(id, |attempt, inner| {
            inner.intents.write(&attempt.intent.to_record())?;
            inner.set_state(PaymentState::ChatInvoiceWait {
                payment_id: payment_id.clone(),
                invoice_ref: invoice_ref.clone(),
            });
            self.start_invoice_poll(id, payment_id.clone())
        })?;

        invoices.open_invoice(&invoice_ref).await
    }

    fn start_invoice_poll(&self, id: AttemptId, payment_id: PaymentId) -> Result<()> {
        let timings = self.inner.timings;
        let probe_owner = Arc::downgrade(&self.inner);
        let timeout_owner = probe_owner.clone();

        let options = PollOptions::every(timings.poll_interval)
            .deadline(timings.poll_deadline)
            .on_timeout(move |timeout| {
                if let Some(orchestrator) = Self::upgrade(&timeout_owner) {
                    tracing::warn!(attempt = id, attempts = timeout.attempts, "Chat invoice wait timed out");
                    let error = PaymentError::DeadlineExceeded(timings.poll_deadline);
                    orchestrator.settle(id, Settlement::Failed(PaymentFailure::from_error(&error)));
                }
            })
            .on_error(move |e| {
                tracing::warn!(attempt = id, error = %e, "Payment status check failed");
            });

        self.inner.polls.start(
            CHAT_INVOICE_POLL_KEY,
            move || Self::probe_invoice(probe_owner.clone(), id, payment_id.clone()),
            options,
        )?;
        Ok(())
    }

    async fn probe_invoice(
        owner: Weak<Inner>,
        id: AttemptId,
        payment_id: PaymentId,
    ) -> photo_core::Result<ProbeOutcome> {
        let Some(orchestrator) = Self::upgrade(&owner) else {
            return Ok(ProbeOutcome::Done);
        };
        if !orchestrator.is_live(id) {
            return Ok(ProbeOutcome::Done);
        }

        let status = orchestrator.inner.api.payment_status(&payment_id).await?;
        if status.paid {
            orchestrator.settle(id, Settlement::Succeeded(None));
            Ok(ProbeOutcome::Done)
        } else if status.is_failed() {
            let error = PaymentError::NotCompleted(format!("provider reported {:?}", status.status));
            orchestrator.settle(id, Settlement::Failed(PaymentFailure::from_error(&error)));
            Ok(ProbeOutcome::Done)
        } else {
            Ok(ProbeOutcome::Continue)
        }
    }

    /// Platform callback: the chat invoice sheet was closed.
    ///
    /// Returns whether this event settled the attempt.
    pub fn invoice_closed(&self, status: InvoiceStatus) -> bool {
        let id = {
            let slot = self.attempt_slot();
            match slot.as_ref() {
                Some(a) if a.is_live() && a.intent.provider == PaymentProvider::ChatInvoice => a.id,
                _ => return false,
            }
        };

        tracing::info!(attempt = id, status = ?status, "Chat invoice closed");
        match status {
            InvoiceStatus::Paid => self.settle(id, Settlement::Succeeded(None)),
            InvoiceStatus::Cancelled | InvoiceStatus::Failed => {
                let error = PaymentError::NotCompleted(format!("invoice {status:?}").to_lowercase());
                self.settle(id, Settlement::Failed(PaymentFailure::from_error(&error)))
            }
            InvoiceStatus::Pending => false,
        }
    }

    async fn run_wallet_transfer(&self, id: AttemptId) -> Result<()> {
        let wallet = self
            .inner
            .wallet
            .clone()
            .ok_or_else(|| PaymentError::ProviderUnavailable(PaymentProvider::WalletTransfer.to_string()))?;

        self.with_live(id, |attempt, inner| {
            inner.intents.write(&attempt.intent.to_record())?;
            Ok(())
        })?;

        if self.arm_auto_continue(id, wallet.as_ref())? {
            return self.prepare_transfer(id).await;
        }
        tracing::info!(attempt = id, "Wallet not connected; requesting connection");
        wallet.request_connection().await
    }

    /// Returns true if the wallet is already connected. Otherwise marks the
    /// attempt to continue on connection and starts watching the session.
    fn arm_auto_continue(&self, id: AttemptId, wallet: &dyn WalletConnector) -> Result<bool> {
        let mut session = wallet.session();
        if session.borrow_and_update().is_some() {
            return Ok(true);
        }

        let token = CancellationToken::new();
        self.with_live(id, |attempt, _| {
            attempt.pending_auto_continue = true;
            attempt.wallet_watch = Some(token.clone());
            Ok(())
        })?;
        self.spawn_wallet_watch(id, session, token);
        Ok(false)
    }

    fn spawn_wallet_watch(
        &self,
        id: AttemptId,
        mut session: watch::Receiver<Option<WalletSession>>,
        token: CancellationToken,
    ) {
        let owner = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            loop {
                let connected = session.borrow_and_update().is_some();
                if connected {
                    break;
                }
                tokio::select! {
                    () = token.cancelled() => return,
                    changed = session.changed() => {
                        if changed.is_err() {
                            return;
                        }
                    }
                }
            }
            if let Some(orchestrator) = Self::upgrade(&owner) {
                orchestrator.auto_continue(id).await;
            }
        });
    }

    async fn auto_continue(&self, id: AttemptId) {
        let pending = self
            .with_live(id, |attempt, _| {
                attempt.wallet_watch = None;
                Ok(std::mem::take(&mut attempt.pending_auto_continue))
            })
            .unwrap_or(false);
        if !pending {
            return;
        }

        tracing::info!(attempt = id, "Wallet connected; continuing payment");
        match self.prepare_transfer(id).await {
            Ok(()) | Err(PaymentError::Cancelled) => {}
            Err(e) => {
                tracing::warn!(attempt = id, error = %e, "Wallet payment preparation failed");
                self.settle(id, Settlement::Failed(PaymentFailure::from_error(&e)));
            }
        }
    }

    async fn prepare_transfer(&self, id: AttemptId) -> Result<()> {
        let created = self.create_payment(id).await?;
        let to = created
            .wallet_address
            .ok_or(PaymentError::MissingField("walletAddress"))?;
        let amount = created.amount.ok_or(PaymentError::MissingField("amount"))?;
        let transfer = TransferRequest {
            to,
            amount,
            payload: created.payment_id.to_string(),
        };
        let Some(amount_nano) = transfer.amount_nano().filter(|nano| *nano > 0) else {
            return Err(PaymentError::InvalidState(format!(
                "unusable transfer amount {}",
                transfer.amount
            )));
        };
        tracing::debug!(attempt = id, to = %transfer.to, amount_nano, "Transfer prepared");

        self.with_live(id, |attempt, inner| {
            inner.intents.write(&attempt.intent.to_record())?;
            inner.set_state(PaymentState::WalletSign {
                payment_id: created.payment_id.clone(),
                transfer: transfer.clone(),
            });
            Ok(())
        })
    }

    /// User confirmed the transfer shown in `WalletSign`; ask the wallet to sign it.
    ///
    /// A returned transaction reference settles the attempt as successful.
    pub async fn confirm_transfer(&self) -> Result<TransactionRef> {
        let wallet = self
            .inner
            .wallet
            .clone()
            .ok_or_else(|| PaymentError::ProviderUnavailable(PaymentProvider::WalletTransfer.to_string()))?;

        let (id, transfer) = {
            let mut slot = self.attempt_slot();
            let Some(attempt) = slot.as_mut().filter(|a| a.is_live()) else {
                return Err(PaymentError::InvalidState("no payment awaiting a signature".into()));
            };
            let PaymentState::WalletSign { transfer, .. } = self.state() else {
                return Err(PaymentError::InvalidState("no payment awaiting a signature".into()));
            };
            if attempt.transfer_started {
                return Err(PaymentError::InvalidState("transfer already submitted".into()));
            }
            attempt.transfer_started = true;
            (attempt.id, transfer)
        };

        tracing::info!(attempt = id, to = %transfer.to, amount = %transfer.amount, "Requesting wallet transfer");
        match wallet.send_transfer(&transfer).await {
            Ok(tx) => {
                if !self.settle(id, Settlement::Succeeded(Some(tx.clone()))) {
                    tracing::warn!(attempt = id, tx = %tx, "Transfer signed after the attempt was closed");
                }
                Ok(tx)
            }
            Err(e) => {
                self.settle(id, Settlement::Failed(PaymentFailure::from_error(&e)));
                Err(e)
            }
        }
    }

    /// Settle attempt `id`; only the first caller per attempt has any effect
    fn settle(&self, id: AttemptId, settlement: Settlement) -> bool {
        let mut slot = self.attempt_slot();
        let Some(attempt) = slot.as_mut().filter(|a| a.id == id) else {
            return false;
        };
        if !attempt.guard.seal() {
            return false;
        }

        if attempt.intent.provider == PaymentProvider::ChatInvoice {
            self.inner.polls.stop(CHAT_INVOICE_POLL_KEY);
        }
        if let Some(token) = attempt.wallet_watch.take() {
            token.cancel();
        }
        attempt.pending_auto_continue = false;
        if let Err(e) = self.inner.intents.clear() {
            tracing::warn!(attempt = id, error = %e, "Failed to clear persisted intent");
        }

        let payment_id = attempt.intent.payment_id.clone().unwrap_or_default();
        let (state, outcome) = match settlement {
            Settlement::Succeeded(transaction) => {
                attempt.intent.finish(IntentStatus::Succeeded);
                tracing::info!(attempt = id, payment_id = %payment_id, "Payment succeeded");
                (
                    PaymentState::Success {
                        payment_id,
                        transaction: transaction.clone(),
                    },
                    PaymentOutcome::Succeeded {
                        attempt: id,
                        intent: attempt.intent.clone(),
                        transaction,
                    },
                )
            }
            Settlement::Failed(failure) => {
                attempt.intent.finish(IntentStatus::Failed);
                tracing::info!(attempt = id, kind = ?failure.kind, detail = %failure.detail, "Payment failed");
                (
                    PaymentState::Error(failure.clone()),
                    PaymentOutcome::Failed {
                        attempt: id,
                        intent: attempt.intent.clone(),
                        failure,
                    },
                )
            }
        };

        self.inner.set_state(state);
        // No subscribers is fine.
        let _ = self.inner.outcomes.send(outcome);
        true
    }

    /// User closed the payment modal.
    ///
    /// Always clears the persisted intent, even mid wallet-connect, and
    /// returns to `Form`.
    pub fn cancel(&self) {
        let mut slot = self.attempt_slot();
        if let Some(mut attempt) = slot.take() {
            if let Some(token) = attempt.wallet_watch.take() {
                token.cancel();
            }
            if attempt.guard.seal() {
                attempt.intent.finish(IntentStatus::Cancelled);
                if attempt.intent.provider == PaymentProvider::ChatInvoice {
                    self.inner.polls.stop(CHAT_INVOICE_POLL_KEY);
                }
                tracing::info!(attempt = attempt.id, "Payment attempt cancelled");
                let _ = self.inner.outcomes.send(PaymentOutcome::Cancelled {
                    attempt: attempt.id,
                    intent: attempt.intent,
                });
            }
        }
        if let Err(e) = self.inner.intents.clear() {
            tracing::warn!(error = %e, "Failed to clear persisted intent on cancel");
        }
        self.inner.set_state(PaymentState::Form);
    }

    /// Return to `Form` after `Success` or `Error` (retry affordance)
    pub fn reset(&self) -> Result<()> {
        let mut slot = self.attempt_slot();
        if slot.as_ref().is_some_and(Attempt::is_live) {
            return Err(PaymentError::InvalidState(
                "payment in progress; cancel it instead".into(),
            ));
        }
        *slot = None;
        self.inner.set_state(PaymentState::Form);
        Ok(())
    }
}
