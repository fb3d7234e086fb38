//! Client Preferences
//!
//! Small persisted client state that lives next to the purchase intent:
//! onboarding flag, buyer identity, theme, favorites and the prepaid
//! generation credit.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::{AssetId, BuyerId};
use crate::store::DurableStore;

pub const ONBOARDING_COMPLETE_KEY: &str = "onboarding_complete";
pub const BUYER_ID_KEY: &str = "buyer_id";
pub const THEME_KEY: &str = "theme";
pub const FAVORITES_KEY: &str = "favorites";
pub const PRO_CREDIT_KEY: &str = "pro_credit";

/// Color theme preference
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    Dark,
    #[default]
    System,
}

/// Typed accessors over a durable store
#[derive(Clone)]
pub struct ClientPreferences {
    store: Arc<dyn DurableStore>,
}

impl ClientPreferences {
    pub fn new(store: Arc<dyn DurableStore>) -> Self {
        Self { store }
    }

    pub fn onboarding_complete(&self) -> Result<bool> {
        Ok(self.store.get(ONBOARDING_COMPLETE_KEY)?.as_deref() == Some("true"))
    }

    pub fn set_onboarding_complete(&self, complete: bool) -> Result<()> {
        if complete {
            self.store.set(ONBOARDING_COMPLETE_KEY, "true")
        } else {
            self.store.remove(ONBOARDING_COMPLETE_KEY)
        }
    }

    pub fn buyer_id(&self) -> Result<Option<BuyerId>> {
        Ok(self
            .store
            .get(BUYER_ID_KEY)?
            .filter(|s| !s.trim().is_empty())
            .map(BuyerId::new))
    }

    pub fn set_buyer_id(&self, buyer_id: &BuyerId) -> Result<()> {
        self.store.set(BUYER_ID_KEY, buyer_id.as_str())
    }

    /// Whether a paid generation is waiting for reference photos
    pub fn has_pro_credit(&self) -> Result<bool> {
        Ok(self.store.get(PRO_CREDIT_KEY)?.as_deref() == Some("true"))
    }

    /// Keep a paid generation for the next upload
    pub fn grant_pro_credit(&self) -> Result<()> {
        self.store.set(PRO_CREDIT_KEY, "true")
    }

    /// Use up the credit; returns whether there was one
    pub fn take_pro_credit(&self) -> Result<bool> {
        let had = self.has_pro_credit()?;
        if had {
            self.store.remove(PRO_CREDIT_KEY)?;
        }
        Ok(had)
    }

    /// Stored theme; unknown values fall back to the default
    pub fn theme(&self) -> Result<Theme> {
        let Some(raw) = self.store.get(THEME_KEY)? else {
            return Ok(Theme::default());
        };
        Ok(serde_json::from_str(&raw).unwrap_or_default())
    }

    pub fn set_theme(&self, theme: Theme) -> Result<()> {
        self.store.set(THEME_KEY, &serde_json::to_string(&theme)?)
    }

    pub fn favorites(&self) -> Result<BTreeSet<AssetId>> {
        let Some(raw) = self.store.get(FAVORITES_KEY)? else {
            return Ok(BTreeSet::new());
        };
        match serde_json::from_str(&raw) {
            Ok(favorites) => Ok(favorites),
            Err(e) => {
                tracing::warn!(error = %e, "Resetting unreadable favorites");
                Ok(BTreeSet::new())
            }
        }
    }

    /// Flip an asset in or out of favorites; returns whether it is now a favorite
    pub fn toggle_favorite(&self, asset_id: &AssetId) -> Result<bool> {
        let mut favorites = self.favorites()?;
        let added = if favorites.remove(asset_id) {
            false
        } else {
            favorites.insert(asset_id.clone());
            true
        };
        self.store.set(FAVORITES_KEY, &serde_json::to_string(&favorites)?)?;
        Ok(added)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryDurableStore;

    fn prefs() -> ClientPreferences {
        ClientPreferences::new(Arc::new(MemoryDurableStore::new()))
    }

    #[test]
    fn onboarding_flag_round_trips() {
        let prefs = prefs();
        assert!(!prefs.onboarding_complete().unwrap());
        prefs.set_onboarding_complete(true).unwrap();
        assert!(prefs.onboarding_complete().unwrap());
    }

    #[test]
    fn favorites_toggle() {
        let prefs = prefs();
        let asset = AssetId::new("j1-0");
        assert!(prefs.toggle_favorite(&asset).unwrap());
        assert!(prefs.favorites().unwrap().contains(&asset));
        assert!(!prefs.toggle_favorite(&asset).unwrap());
        assert!(prefs.favorites().unwrap().is_empty());
    }

    #[test]
    fn pro_credit_is_consumed_once() {
        let prefs = prefs();
        assert!(!prefs.take_pro_credit().unwrap());
        prefs.grant_pro_credit().unwrap();
        assert!(prefs.has_pro_credit().unwrap());
        assert!(prefs.take_pro_credit().unwrap());
        assert!(!prefs.has_pro_credit().unwrap());
        assert!(!prefs.take_pro_credit().unwrap());
    }

    #[test]
    fn theme_defaults_to_system() {
        let prefs = prefs();
        assert_eq!(prefs.theme().unwrap(), Theme::System);
        prefs.set_theme(Theme::Dark).unwrap();
        assert_eq!(prefs.theme().unwrap(), Theme::Dark);
    }
}
