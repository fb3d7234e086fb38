//! Durable Intent Storage
//!
//! Keeps "what the user was trying to buy" across a process restart, so the
//! app can pick the purchase up again after a bank redirect or a wallet
//! hand-off.
//!
//! Records always carry their creation time. A record older than its
//! provider's freshness window is never returned: `read` deletes it and
//! reports nothing, so callers never handle staleness themselves.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::error::Result;
use crate::model::{AvatarId, PaymentId, PaymentProvider, TierId};

/// Default slot for the pending purchase intent
pub const PENDING_INTENT_KEY: &str = "pending_intent";

/// Key/value storage that survives a process restart
pub trait DurableStore: Send + Sync {
    /// Read a value
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a value, replacing any previous one
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Delete a value; deleting a missing key succeeds
    fn remove(&self, key: &str) -> Result<()>;
}

/// In-memory durable store (for development and tests)
#[derive(Default)]
pub struct MemoryDurableStore {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryDurableStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DurableStore for MemoryDurableStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let values = self.values.read().unwrap_or_else(PoisonError::into_inner);
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut values = self.values.write().unwrap_or_else(PoisonError::into_inner);
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut values = self.values.write().unwrap_or_else(PoisonError::into_inner);
        values.remove(key);
        Ok(())
    }
}

/// Durable projection of a payment intent
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedIntentRecord {
    pub provider: PaymentProvider,
    pub tier_id: TierId,
    #[serde(default)]
    pub avatar_id: Option<AvatarId>,
    #[serde(default)]
    pub payment_id: Option<PaymentId>,
    pub created_at: DateTime<Utc>,
}

impl PersistedIntentRecord {
    pub const fn new(
        provider: PaymentProvider,
        tier_id: TierId,
        avatar_id: Option<AvatarId>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            provider,
            tier_id,
            avatar_id,
            payment_id: None,
            created_at,
        }
    }

    #[must_use]
    pub fn with_payment_id(mut self, payment_id: PaymentId) -> Self {
        self.payment_id = Some(payment_id);
        self
    }

    /// Whether the record may still be acted on at `now`
    pub fn is_fresh_at(&self, now: DateTime<Utc>) -> bool {
        now - self.created_at <= self.provider.freshness_window()
    }
}

/// Single-slot store for the outstanding purchase intent
#[derive(Clone)]
pub struct PersistentIntentStore {
    store: Arc<dyn DurableStore>,
    clock: Arc<dyn Clock>,
    slot: String,
}

impl PersistentIntentStore {
    pub fn new(store: Arc<dyn DurableStore>, clock: Arc<dyn Clock>) -> Self {
        Self::with_slot(store, clock, PENDING_INTENT_KEY)
    }

    /// Use a different logical slot (one outstanding intent per slot)
    pub fn with_slot(
        store: Arc<dyn DurableStore>,
        clock: Arc<dyn Clock>,
        slot: impl Into<String>,
    ) -> Self {
        Self {
            store,
            clock,
            slot: slot.into(),
        }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Backing store, shared with the other client keys
    pub fn store(&self) -> &Arc<dyn DurableStore> {
        &self.store
    }

    /// Persist `record`, overwriting the slot
    pub fn write(&self, record: &PersistedIntentRecord) -> Result<()> {
        let json = serde_json::to_string(record)?;
        self.store.set(&self.slot, &json)?;
        tracing::debug!(
            slot = %self.slot,
            provider = %record.provider,
            tier = %record.tier_id,
            "Persisted purchase intent"
        );
        Ok(())
    }

    /// Read the outstanding intent, discarding it if stale or unreadable
    pub fn read(&self) -> Result<Option<PersistedIntentRecord>> {
        let Some(raw) = self.store.get(&self.slot)? else {
            return Ok(None);
        };

        let record: PersistedIntentRecord = match serde_json::from_str(&raw) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(slot = %self.slot, error = %e, "Discarding unreadable purchase intent");
                self.clear()?;
                return Ok(None);
            }
        };

        let now = self.clock.now();
        if !record.is_fresh_at(now) {
            tracing::info!(
                slot = %self.slot,
                provider = %record.provider,
                age_secs = (now - record.created_at).num_seconds(),
                "Discarding stale purchase intent"
            );
            self.clear()?;
            return Ok(None);
        }

        Ok(Some(record))
    }

    /// Delete the outstanding intent
    pub fn clear(&self) -> Result<()> {
        self.store.remove(&self.slot)
    }
}

impl std::fmt::Debug for PersistentIntentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistentIntentStore")
            .field("slot", &self.slot)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::Duration;

    fn setup() -> (Arc<MemoryDurableStore>, Arc<ManualClock>, PersistentIntentStore) {
        let store = Arc::new(MemoryDurableStore::new());
        let clock = Arc::new(ManualClock::default());
        let intents = PersistentIntentStore::new(store.clone(), clock.clone());
        (store, clock, intents)
    }

    fn record(provider: PaymentProvider, clock: &ManualClock) -> PersistedIntentRecord {
        PersistedIntentRecord::new(provider, "standard".into(), Some("av1".into()), clock.now())
    }

    #[test]
    fn fresh_record_is_returned() {
        let (_, clock, intents) = setup();
        let written = record(PaymentProvider::HostedRedirect, &clock);
        intents.write(&written).unwrap();

        clock.advance(Duration::hours(23));
        assert_eq!(intents.read().unwrap(), Some(written));
    }

    #[test]
    fn stale_record_is_deleted_on_read() {
        let (store, clock, intents) = setup();
        intents
            .write(&record(PaymentProvider::WalletTransfer, &clock))
            .unwrap();

        clock.advance(Duration::minutes(10));
        assert_eq!(intents.read().unwrap(), None);
        assert_eq!(store.get(PENDING_INTENT_KEY).unwrap(), None);
    }

    #[test]
    fn later_write_overwrites_slot() {
        let (_, clock, intents) = setup();
        intents
            .write(&record(PaymentProvider::HostedRedirect, &clock))
            .unwrap();
        let second = record(PaymentProvider::ChatInvoice, &clock).with_payment_id("p2".into());
        intents.write(&second).unwrap();

        assert_eq!(intents.read().unwrap(), Some(second));
    }

    #[test]
    fn unreadable_record_is_discarded() {
        let (store, _, intents) = setup();
        store.set(PENDING_INTENT_KEY, "{not json").unwrap();

        assert_eq!(intents.read().unwrap(), None);
        assert_eq!(store.get(PENDING_INTENT_KEY).unwrap(), None);
    }

    #[test]
    fn slots_are_independent() {
        let (store, clock, intents) = setup();
        let other = PersistentIntentStore::with_slot(store, clock.clone(), "gift_intent");
        intents
            .write(&record(PaymentProvider::HostedRedirect, &clock))
            .unwrap();

        assert_eq!(other.read().unwrap(), None);
        other.clear().unwrap();
        assert!(intents.read().unwrap().is_some());
    }
}
