//! Purchase Intents
//!
//! In-memory record of one purchase attempt and the complete-once guard that
//! decides which terminal path wins.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use photo_core::{AvatarId, BuyerId, PaymentId, PaymentProvider, PersistedIntentRecord, TierId};
use serde::{Deserialize, Serialize};

use crate::error::{PaymentError, Result};

/// What the user asked to buy
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PurchaseRequest {
    pub provider: PaymentProvider,
    pub tier_id: TierId,
    pub buyer_id: BuyerId,
    /// Avatar the photos are for; may be a temporary id before upload
    pub avatar_id: Option<AvatarId>,
}

/// Lifecycle of an intent
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntentStatus {
    Pending,
    Succeeded,
    Failed,
    Cancelled,
}

impl IntentStatus {
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// One purchase attempt
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentIntent {
    pub provider: PaymentProvider,
    pub tier_id: TierId,
    pub photo_count: u32,
    pub buyer_id: BuyerId,
    pub avatar_id: Option<AvatarId>,
    pub payment_id: Option<PaymentId>,
    pub created_at: DateTime<Utc>,
    pub status: IntentStatus,
}

impl PaymentIntent {
    pub fn new(request: PurchaseRequest, photo_count: u32, created_at: DateTime<Utc>) -> Self {
        Self {
            provider: request.provider,
            tier_id: request.tier_id,
            photo_count,
            buyer_id: request.buyer_id,
            avatar_id: request.avatar_id,
            payment_id: None,
            created_at,
            status: IntentStatus::Pending,
        }
    }

    /// Rebuild a pending intent from its durable projection after a restart
    pub fn from_record(record: &PersistedIntentRecord, buyer_id: BuyerId, photo_count: u32) -> Self {
        Self {
            provider: record.provider,
            tier_id: record.tier_id.clone(),
            photo_count,
            buyer_id,
            avatar_id: record.avatar_id.clone(),
            payment_id: record.payment_id.clone(),
            created_at: record.created_at,
            status: IntentStatus::Pending,
        }
    }

    /// Record the server-assigned payment id
    pub fn assign_payment_id(&mut self, payment_id: PaymentId) -> Result<()> {
        if self.status.is_terminal() {
            return Err(PaymentError::InvalidState(format!(
                "intent already {:?}",
                self.status
            )));
        }
        self.payment_id = Some(payment_id);
        Ok(())
    }

    /// Move to a terminal status; returns false if already terminal
    pub fn finish(&mut self, status: IntentStatus) -> bool {
        if self.status.is_terminal() || !status.is_terminal() {
            return false;
        }
        self.status = status;
        true
    }

    /// Durable projection for resuming after a restart
    pub fn to_record(&self) -> PersistedIntentRecord {
        let record = PersistedIntentRecord::new(
            self.provider,
            self.tier_id.clone(),
            self.avatar_id.clone(),
            self.created_at,
        );
        match &self.payment_id {
            Some(id) => record.with_payment_id(id.clone()),
            None => record,
        }
    }
}

/// Complete-once flag shared by every path that can end an attempt
#[derive(Clone, Debug, Default)]
pub struct TerminalGuard(Arc<AtomicBool>);

impl TerminalGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seal the guard; only the first caller gets `true`
    pub fn seal(&self) -> bool {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn is_sealed(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn intent() -> PaymentIntent {
        PaymentIntent::new(
            PurchaseRequest {
                provider: PaymentProvider::ChatInvoice,
                tier_id: "standard".into(),
                buyer_id: "42".into(),
                avatar_id: None,
            },
            23,
            Utc::now(),
        )
    }

    #[test]
    fn guard_seals_once() {
        let guard = TerminalGuard::new();
        let other_path = guard.clone();
        assert!(guard.seal());
        assert!(!other_path.seal());
        assert!(other_path.is_sealed());
    }

    #[test]
    fn intent_is_frozen_after_terminal() {
        let mut intent = intent();
        intent.assign_payment_id("p1".into()).unwrap();
        assert!(intent.finish(IntentStatus::Succeeded));
        assert!(!intent.finish(IntentStatus::Failed));
        assert!(intent.assign_payment_id("p2".into()).is_err());
        assert_eq!(intent.payment_id, Some(PaymentId::new("p1")));
    }

    #[test]
    fn restored_intent_keeps_original_timestamp() {
        let original = intent();
        let restored = PaymentIntent::from_record(&original.to_record(), "42".into(), 23);
        assert_eq!(restored, original);
    }

    #[test]
    fn record_carries_payment_id() {
        let mut intent = intent();
        intent.assign_payment_id("p7".into()).unwrap();
        let record = intent.to_record();
        assert_eq!(record.payment_id, Some(PaymentId::new("p7")));
        assert_eq!(record.created_at, intent.created_at);
    }
}
