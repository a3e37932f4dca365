use std::{collections::HashMap, future::Future, sync::Arc, time::Duration};

use anyhow::anyhow;
use log::{debug, info, trace, warn};
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
    time::{sleep, timeout},
};
use trustrefund_common::{
    api::TxOutcome,
    crypto::{Address, TxHash},
    ticket::{
        lifecycle_state, IntentKind, LifecycleState, PendingTransaction, TicketRecord, TxStatus,
    },
};

use crate::{
    config::{CONFIRMATION_POLL_INTERVAL, EVENT_CHANNEL_CAPACITY},
    contract::ContractClient,
    error::WalletError,
    provider::ProviderGateway,
};

pub type SharedOrchestrator = Arc<TransactionOrchestrator>;

/// Explicit session context handed to the orchestrator.
///
/// Everything the orchestrator touches lives here rather than in ambient
/// globals, so several sessions can run in isolation side by side.
pub struct Session {
    pub gateway: Arc<ProviderGateway>,
    pub contract: Arc<ContractClient>,
}

/// Event propagated to the presentation layer.
///
/// Failures carry their classified kind so the presentation can branch
/// without parsing messages.
#[derive(Clone, Debug)]
pub enum Event {
    AccountChanged(Option<Address>),
    TransactionSubmitted {
        account: Address,
        intent: IntentKind,
        handle: TxHash,
    },
    TransactionSettled {
        account: Address,
        intent: IntentKind,
        handle: TxHash,
        record: TicketRecord,
    },
    TransactionFailed {
        account: Address,
        intent: IntentKind,
        kind: &'static str,
        message: String,
    },
    LifecycleUpdated {
        account: Address,
        state: LifecycleState,
    },
}

/// Result of a fully settled intent: the handle, the reconciled on-chain
/// record and the lifecycle state derived from it
#[derive(Clone, Debug)]
pub struct Settlement {
    pub handle: TxHash,
    pub record: TicketRecord,
    pub state: LifecycleState,
}

/// Maps one user intent to exactly one ledger-state transition.
///
/// Enforces at most one in-flight transaction per (account, intent kind),
/// reads the ticket price immediately before every buy, pre-guards refunds
/// client-side, serializes submissions against one account's signing context
/// and centralizes confirmation waiting. After every settlement the ticket
/// record is re-read from the ledger: local knowledge is never authoritative.
pub struct TransactionOrchestrator {
    session: Session,
    // The core concurrency invariant lives here: one slot per pair
    pending: Mutex<HashMap<(Address, IntentKind), PendingTransaction>>,
    // One submission at a time per signing context
    submission_locks: Mutex<HashMap<Address, Arc<Mutex<()>>>>,
    events: broadcast::Sender<Event>,
    // account-change forwarder task
    watcher: Mutex<Option<JoinHandle<()>>>,
}

impl TransactionOrchestrator {
    pub fn new(session: Session) -> SharedOrchestrator {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Arc::new(Self {
            session,
            pending: Mutex::new(HashMap::new()),
            submission_locks: Mutex::new(HashMap::new()),
            events,
            watcher: Mutex::new(None),
        })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Subscribe to orchestrator events (the UIAdapter boundary)
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    fn propagate_event(&self, event: Event) {
        trace!("propagate_event {:?}", event);
        // Nobody listening is fine
        let _ = self.events.send(event);
    }

    /// Start forwarding gateway account changes onto the event channel.
    /// Returns false if the forwarder is already running.
    pub async fn start(self: &Arc<Self>) -> bool {
        let mut watcher = self.watcher.lock().await;
        if watcher.as_ref().is_some_and(|task| !task.is_finished()) {
            warn!("Account forwarder is already running");
            return false;
        }

        let zelf = Arc::clone(self);
        *watcher = Some(tokio::spawn(async move {
            let mut receiver = zelf.session.gateway.on_account_changed();
            loop {
                match receiver.recv().await {
                    Ok(account) => {
                        debug!("Forwarding account change: {:?}", account);
                        zelf.propagate_event(Event::AccountChanged(account));
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!("Account forwarder lagged, {} updates missed", missed);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }));
        true
    }

    /// Stop the account forwarder. Returns false if it was not running.
    pub async fn stop(&self) -> bool {
        match self.watcher.lock().await.take() {
            Some(task) => {
                task.abort();
                true
            }
            None => false,
        }
    }

    /// In-flight pending transaction for an account, if any.
    /// A pending buy shadows pending refunds, matching the derivation order.
    pub async fn pending_for(&self, account: &Address) -> Option<PendingTransaction> {
        let pending = self.pending.lock().await;
        select_pending(
            pending
                .iter()
                .filter(|((a, _), p)| a == account && p.is_in_flight())
                .map(|(_, p)| p),
        )
    }

    // Same, but ignoring the slot we just reserved for `intent`
    async fn pending_excluding(
        &self,
        account: &Address,
        intent: IntentKind,
    ) -> Option<PendingTransaction> {
        let pending = self.pending.lock().await;
        select_pending(
            pending
                .iter()
                .filter(|((a, i), p)| a == account && *i != intent && p.is_in_flight())
                .map(|(_, p)| p),
        )
    }

    /// Re-read the ticket record and derive the current lifecycle state
    pub async fn refresh(&self, account: &Address) -> Result<LifecycleState, WalletError> {
        trace!("refresh {}", account);
        let record = self.read_record(account).await?;
        let pending = self.pending_for(account).await;
        let state = lifecycle_state(&record, pending.as_ref());
        self.propagate_event(Event::LifecycleUpdated {
            account: *account,
            state,
        });
        Ok(state)
    }

    /// Submit an intent and drive it to settlement.
    ///
    /// `wait` bounds the confirmation wait only; timing out clears the
    /// pending slot without asserting success or failure of the underlying
    /// transaction, which may still be included later.
    pub async fn submit(
        &self,
        intent: IntentKind,
        wait: Duration,
    ) -> Result<Settlement, WalletError> {
        let account = self
            .session
            .gateway
            .current_account()
            .await
            .ok_or_else(|| WalletError::Any(anyhow!("no account connected")))?;

        // Idle -> Submitting: reserve the slot before any network traffic so
        // a concurrent duplicate never reaches the provider
        {
            let mut pending = self.pending.lock().await;
            if pending
                .get(&(account, intent))
                .is_some_and(|p| p.is_in_flight())
            {
                debug!("Rejecting duplicate {} intent for {}", intent, account);
                return Err(WalletError::DuplicateIntent(intent));
            }
            // Handle stays zero until the provider returns the real one
            pending.insert(
                (account, intent),
                PendingTransaction::new(intent, TxHash::zero()),
            );
        }

        let result = self.drive_intent(&account, intent, wait).await;
        self.clear_pending(&account, intent).await;

        if let Err(e) = result.as_ref() {
            warn!("{} intent failed for {}: {:#}", intent, account, e);
            self.propagate_event(Event::TransactionFailed {
                account,
                intent,
                kind: e.kind(),
                message: e.to_string(),
            });
        }
        result
    }

    // Submitting -> AwaitingConfirmation -> Settled, with the slot already
    // reserved; every error path bubbles up and the caller clears the slot
    async fn drive_intent(
        &self,
        account: &Address,
        intent: IntentKind,
        wait: Duration,
    ) -> Result<Settlement, WalletError> {
        let contract = &self.session.contract;

        if intent.is_refund() {
            // Advisory guard on a fresh read; the ledger's own check remains
            // authoritative and a reversion past this point is still handled
            let record = contract.tickets(account).await?;
            let others = self.pending_excluding(account, intent).await;
            let state = lifecycle_state(&record, others.as_ref());
            if state != LifecycleState::RefundEligible {
                return Err(WalletError::IneligibleForRefund(state));
            }
        }

        let handle = match intent {
            IntentKind::Buy => {
                // Price read at submission time, never a cached constant
                let price = contract
                    .ticket_price()
                    .await
                    .map_err(|e| WalletError::PriceUnavailable(Box::new(e)))?;
                debug!("Buying ticket for {} at price {}", account, price);
                self.submit_serialized(account, contract.buy_ticket(price))
                    .await?
            }
            IntentKind::RefundFull => {
                self.submit_serialized(account, contract.refund_full(account))
                    .await?
            }
            IntentKind::RefundPartial => {
                self.submit_serialized(account, contract.refund_partial(account))
                    .await?
            }
        };

        // Record the real handle on the reserved slot
        {
            let mut pending = self.pending.lock().await;
            if let Some(slot) = pending.get_mut(&(*account, intent)) {
                slot.handle = handle;
            }
        }
        info!("Submitted {} transaction {} for {}", intent, handle, account);
        self.propagate_event(Event::TransactionSubmitted {
            account: *account,
            intent,
            handle,
        });

        match self.await_confirmation(&handle, wait).await? {
            TxOutcome::Success => {}
            TxOutcome::Reverted => return Err(WalletError::TransactionReverted(handle)),
        }

        // Settled: mark the slot so the derivation ignores it, then reconcile
        // against on-chain truth before reporting anything
        {
            let mut pending = self.pending.lock().await;
            if let Some(slot) = pending.get_mut(&(*account, intent)) {
                slot.status = TxStatus::Confirmed;
            }
        }
        let record = self.read_record(account).await?;
        let pending = self.pending_for(account).await;
        let state = lifecycle_state(&record, pending.as_ref());

        info!(
            "{} settled for {}: {} (state {})",
            intent, account, handle, state
        );
        self.propagate_event(Event::TransactionSettled {
            account: *account,
            intent,
            handle,
            record: record.clone(),
        });
        self.propagate_event(Event::LifecycleUpdated {
            account: *account,
            state,
        });

        Ok(Settlement {
            handle,
            record,
            state,
        })
    }

    /// Wait for a submitted transaction to settle, polling the receipt until
    /// `wait` elapses. Shared by intent submission and the non-intent writes
    /// (visit marking, emergency withdraw) so confirmation policy stays in
    /// one place.
    pub async fn await_confirmation(
        &self,
        handle: &TxHash,
        wait: Duration,
    ) -> Result<TxOutcome, WalletError> {
        trace!("await_confirmation {} for up to {:?}", handle, wait);
        let gateway = &self.session.gateway;

        let poll = async {
            loop {
                if let Some(outcome) = gateway.transaction_outcome(handle).await? {
                    break Ok::<TxOutcome, WalletError>(outcome);
                }
                sleep(CONFIRMATION_POLL_INTERVAL).await;
            }
        };

        match timeout(wait, poll).await {
            Ok(outcome) => outcome,
            // Asserts nothing about the transaction itself, it may still land
            Err(_) => Err(WalletError::ConfirmationTimeout {
                handle: *handle,
                elapsed: wait,
            }),
        }
    }

    // Reads may be retried transparently; one retry on a network failure
    async fn read_record(&self, account: &Address) -> Result<TicketRecord, WalletError> {
        match self.session.contract.tickets(account).await {
            Err(WalletError::Network(e)) => {
                warn!("Ticket read failed ({:#}), retrying once", e);
                self.session.contract.tickets(account).await
            }
            result => result,
        }
    }

    async fn clear_pending(&self, account: &Address, intent: IntentKind) {
        self.pending.lock().await.remove(&(*account, intent));
    }

    // No two sign-and-send calls may run concurrently against one account's
    // signing context; the lock is held across submission only, never across
    // the confirmation wait
    async fn submit_serialized<F>(&self, account: &Address, call: F) -> Result<TxHash, WalletError>
    where
        F: Future<Output = Result<TxHash, WalletError>>,
    {
        let lock = {
            let mut locks = self.submission_locks.lock().await;
            Arc::clone(locks.entry(*account).or_default())
        };
        let _guard = lock.lock().await;
        call.await
    }
}

fn select_pending<'a, I>(iter: I) -> Option<PendingTransaction>
where
    I: Iterator<Item = &'a PendingTransaction>,
{
    let mut fallback = None;
    for p in iter {
        if p.intent == IntentKind::Buy {
            return Some(p.clone());
        }
        if fallback.is_none() {
            fallback = Some(p);
        }
    }
    fallback.cloned()
}
