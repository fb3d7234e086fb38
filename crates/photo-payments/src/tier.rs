//! Pricing Tiers
//!
//! Photo packages the user can buy, with a price per payment provider.

use photo_core::{PaymentProvider, TierId};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::error::{PaymentError, Result};

/// Price of a tier in a provider's currency
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Price {
    pub amount: Decimal,
    pub currency: &'static str,
}

/// A purchasable photo package
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tier {
    pub id: TierId,
    pub name: &'static str,
    pub photo_count: u32,
    /// Card price in rubles (hosted checkout)
    pub card_price: Decimal,
    /// In-chat price in Stars
    pub stars_price: u32,
    /// Wallet price in TON
    pub ton_price: Decimal,
}

impl Tier {
    /// Price charged through `provider`
    pub fn price_for(&self, provider: PaymentProvider) -> Price {
        match provider {
            PaymentProvider::HostedRedirect => Price {
                amount: self.card_price,
                currency: "RUB",
            },
            PaymentProvider::ChatInvoice => Price {
                amount: Decimal::from(self.stars_price),
                currency: "XTR",
            },
            PaymentProvider::WalletTransfer => Price {
                amount: self.ton_price,
                currency: "TON",
            },
        }
    }
}

/// Built-in tier catalog
pub fn catalog() -> Vec<Tier> {
    vec![
        Tier {
            id: TierId::new("starter"),
            name: "Starter",
            photo_count: 10,
            card_price: dec!(299),
            stars_price: 150,
            ton_price: dec!(0.9),
        },
        Tier {
            id: TierId::new("standard"),
            name: "Standard",
            photo_count: 23,
            card_price: dec!(499),
            stars_price: 250,
            ton_price: dec!(1.5),
        },
        Tier {
            id: TierId::new("premium"),
            name: "Premium",
            photo_count: 50,
            card_price: dec!(899),
            stars_price: 450,
            ton_price: dec!(2.7),
        },
    ]
}

/// Look up a tier by id
pub fn find_tier(id: &TierId) -> Result<Tier> {
    catalog()
        .into_iter()
        .find(|t| &t.id == id)
        .ok_or_else(|| PaymentError::UnknownTier(id.to_string()))
}
