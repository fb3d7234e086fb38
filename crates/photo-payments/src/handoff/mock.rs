//! Mock Hand-off Surfaces
//!
//! Recording implementations of the provider surfaces for tests and demos.

use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::watch;

use super::{
    InvoiceSurface, Navigator, TransactionRef, TransferRequest, WalletConnector, WalletSession,
};
use crate::error::{PaymentError, Result};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Records every URL it is asked to open
#[derive(Default)]
pub struct RecordingNavigator {
    opened: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn opened(&self) -> Vec<String> {
        lock(&self.opened).clone()
    }
}

#[async_trait]
impl Navigator for RecordingNavigator {
    async fn open_external(&self, url: &str) -> Result<()> {
        lock(&self.opened).push(url.to_string());
        Ok(())
    }
}

/// Records every invoice it is asked to show
#[derive(Default)]
pub struct RecordingInvoiceSurface {
    opened: Mutex<Vec<String>>,
}

impl RecordingInvoiceSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn opened(&self) -> Vec<String> {
        lock(&self.opened).clone()
    }
}

#[async_trait]
impl InvoiceSurface for RecordingInvoiceSurface {
    async fn open_invoice(&self, invoice_ref: &str) -> Result<()> {
        lock(&self.opened).push(invoice_ref.to_string());
        Ok(())
    }
}

/// Wallet whose connection is completed by the test
pub struct MockWallet {
    session: watch::Sender<Option<WalletSession>>,
    connection_requests: Mutex<usize>,
    transfers: Mutex<Vec<TransferRequest>>,
    reject_transfers: Mutex<bool>,
}

impl Default for MockWallet {
    fn default() -> Self {
        Self::new()
    }
}

impl MockWallet {
    pub fn new() -> Self {
        let (session, _) = watch::channel(None);
        Self {
            session,
            connection_requests: Mutex::new(0),
            transfers: Mutex::new(Vec::new()),
            reject_transfers: Mutex::new(false),
        }
    }

    /// Wallet that is already connected
    pub fn connected(address: impl Into<String>) -> Self {
        let wallet = Self::new();
        wallet.connect(address);
        wallet
    }

    /// Simulate the user finishing the connection flow
    pub fn connect(&self, address: impl Into<String>) {
        self.session.send_replace(Some(WalletSession {
            address: address.into(),
        }));
    }

    pub fn disconnect(&self) {
        self.session.send_replace(None);
    }

    /// Make the user decline every transfer
    pub fn reject_transfers(&self) {
        *lock(&self.reject_transfers) = true;
    }

    pub fn connection_requests(&self) -> usize {
        *lock(&self.connection_requests)
    }

    pub fn transfers(&self) -> Vec<TransferRequest> {
        lock(&self.transfers).clone()
    }
}

#[async_trait]
impl WalletConnector for MockWallet {
    fn session(&self) -> watch::Receiver<Option<WalletSession>> {
        self.session.subscribe()
    }

    async fn request_connection(&self) -> Result<()> {
        *lock(&self.connection_requests) += 1;
        Ok(())
    }

    async fn send_transfer(&self, request: &TransferRequest) -> Result<TransactionRef> {
        if *lock(&self.reject_transfers) {
            return Err(PaymentError::Wallet("user declined the transfer".into()));
        }
        let mut transfers = lock(&self.transfers);
        transfers.push(request.clone());
        Ok(TransactionRef(format!("tx-{}", transfers.len())))
    }
}
