use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, info, trace, warn};
use serde_json::Value;
use tokio::{
    sync::{broadcast, Mutex, RwLock},
    task::JoinHandle,
    time::sleep,
};
use trustrefund_common::{
    api::{CallSpec, TxOutcome},
    crypto::{Address, TxHash},
};

use crate::{
    config::{ACCOUNT_RESUBSCRIBE_INTERVAL, EVENT_CHANNEL_CAPACITY},
    error::WalletError,
};

// ProviderGateway must be behind an Arc to be shared with the orchestrator
// and the account watcher task
pub type SharedProviderGateway = Arc<ProviderGateway>;

/// Injected wallet capability boundary.
///
/// Everything the host environment provides: account access, read-only
/// contract execution, signing and submission, and receipt lookup. The
/// capability owns the signing context; which account signs is its state,
/// reported through the account-change channel.
#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// Ask the user for account access. The first returned address is the
    /// active signing account.
    async fn request_accounts(&self) -> Result<Vec<Address>, WalletError>;

    /// Execute a read-only contract call and return the raw response payload
    async fn call(&self, spec: &CallSpec) -> Result<Value, WalletError>;

    /// Sign a state-changing call with the active account and submit it
    async fn sign_and_submit(&self, spec: &CallSpec) -> Result<TxHash, WalletError>;

    /// Receipt lookup: `None` while the transaction is unconfirmed
    async fn transaction_outcome(&self, handle: &TxHash) -> Result<Option<TxOutcome>, WalletError>;

    /// Channel reporting active-account changes; disconnection is `None`.
    /// Delivery is not exactly-once, subscribers must re-subscribe on failure.
    fn subscribe_account_changes(&self) -> broadcast::Receiver<Option<Address>>;
}

/// Session-scoped wrapper around the injected wallet capability.
///
/// Owns the last-known connected account and a watcher task that mirrors the
/// capability's account-change channel onto its own, re-subscribing when the
/// underlying channel lags or closes.
pub struct ProviderGateway {
    // None when the host environment has no wallet injected
    provider: Option<Arc<dyn WalletProvider>>,
    account: RwLock<Option<Address>>,
    events: broadcast::Sender<Option<Address>>,
    watcher: Mutex<Option<JoinHandle<()>>>,
}

impl ProviderGateway {
    pub fn new(provider: Option<Arc<dyn WalletProvider>>) -> SharedProviderGateway {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Arc::new(Self {
            provider,
            account: RwLock::new(None),
            events,
            watcher: Mutex::new(None),
        })
    }

    fn provider(&self) -> Result<&Arc<dyn WalletProvider>, WalletError> {
        self.provider.as_ref().ok_or(WalletError::NoWalletAvailable)
    }

    /// Request account access and bind the session to the primary account.
    /// Spawns the account watcher on first success.
    pub async fn connect(self: &Arc<Self>) -> Result<Address, WalletError> {
        trace!("connect");
        let provider = self.provider()?;
        let accounts = provider.request_accounts().await?;
        let primary = accounts.first().copied().ok_or_else(|| {
            WalletError::ProviderUnavailable("wallet exposed no accounts".to_owned())
        })?;

        info!("Connected with account {}", primary);
        *self.account.write().await = Some(primary);
        self.spawn_watcher().await;

        Ok(primary)
    }

    /// Last-known connected account, `None` before connect or after the
    /// wallet reported a disconnection
    pub async fn current_account(&self) -> Option<Address> {
        *self.account.read().await
    }

    /// Subscribe to active-account changes as observed by the watcher
    pub fn on_account_changed(&self) -> broadcast::Receiver<Option<Address>> {
        self.events.subscribe()
    }

    /// Sign and submit a state-changing call through the wallet capability
    pub async fn sign_and_send(&self, spec: &CallSpec) -> Result<TxHash, WalletError> {
        if log::log_enabled!(log::Level::Debug) {
            debug!("sign_and_send {} to {}", spec.method, spec.contract);
        }
        let handle = self.provider()?.sign_and_submit(spec).await?;
        debug!("Submitted transaction {}", handle);
        Ok(handle)
    }

    /// Execute a read-only call through the wallet capability
    pub async fn call(&self, spec: &CallSpec) -> Result<Value, WalletError> {
        trace!("call {}", spec.method);
        self.provider()?.call(spec).await
    }

    /// Look up the settlement outcome of a submitted transaction
    pub async fn transaction_outcome(
        &self,
        handle: &TxHash,
    ) -> Result<Option<TxOutcome>, WalletError> {
        trace!("transaction_outcome {}", handle);
        self.provider()?.transaction_outcome(handle).await
    }

    /// Stop the watcher and clear the session account
    pub async fn disconnect(&self) {
        trace!("disconnect");
        if let Some(task) = self.watcher.lock().await.take() {
            task.abort();
        }
        *self.account.write().await = None;
    }

    // Mirror the capability's account-change channel onto our own.
    // The underlying channel does not guarantee exactly-once delivery, so the
    // watcher re-subscribes whenever it lags or the channel closes.
    async fn spawn_watcher(self: &Arc<Self>) {
        let mut watcher = self.watcher.lock().await;
        if watcher.as_ref().is_some_and(|task| !task.is_finished()) {
            return;
        }

        let zelf = Arc::clone(self);
        *watcher = Some(tokio::spawn(async move {
            let provider = match zelf.provider.as_ref() {
                Some(provider) => Arc::clone(provider),
                None => return,
            };

            loop {
                let mut receiver = provider.subscribe_account_changes();
                loop {
                    match receiver.recv().await {
                        Ok(account) => {
                            let previous = *zelf.account.read().await;
                            if account == previous {
                                continue;
                            }
                            match account {
                                Some(account) => info!("Active account changed to {}", account),
                                None => info!("Wallet reported disconnection"),
                            }
                            *zelf.account.write().await = account;
                            // Nobody listening is fine
                            let _ = zelf.events.send(account);
                        }
                        Err(broadcast::error::RecvError::Lagged(missed)) => {
                            warn!("Account watcher lagged, {} updates missed", missed);
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            debug!("Account channel closed, re-subscribing");
                            break;
                        }
                    }
                }
                sleep(ACCOUNT_RESUBSCRIBE_INTERVAL).await;
            }
        }));
    }
}
