use std::{collections::HashMap, sync::Arc};

use anyhow::anyhow;
use async_trait::async_trait;
use log::{debug, trace};
use primitive_types::U256;
use serde_json::Value;
use tokio::sync::{broadcast, Mutex};
use trustrefund_common::{
    abi::ContractMethod,
    api::{CallSpec, TxOutcome},
    crypto::{Address, TxHash},
    ticket::TicketRecord,
};

use crate::{config::EVENT_CHANNEL_CAPACITY, error::WalletError, provider::WalletProvider};

/// In-memory wallet capability plus ledger, backing the CLI demo and the
/// integration suite.
///
/// Executes the ticket contract's observed semantics at submission time and
/// serves receipts on demand, optionally after a number of polls. Fault hooks
/// script the failure modes a real wallet and chain produce: rejected
/// prompts, reverted transactions, lost receipts, network outages.
pub struct SimulatedLedger {
    state: Mutex<LedgerState>,
    account_events: broadcast::Sender<Option<Address>>,
}

struct Receipt {
    outcome: TxOutcome,
    polls_remaining: u32,
}

#[derive(Default)]
struct Faults {
    reject_next_request: bool,
    reject_next_signature: bool,
    revert_next: bool,
    drop_next_receipt: bool,
    malformed_next_read: bool,
    offline: bool,
}

struct LedgerState {
    contract: Address,
    owner: Address,
    ticket_price: U256,
    full_refund: U256,
    partial_refund: U256,
    contract_balance: U256,
    accounts: Vec<Address>,
    active: Option<Address>,
    balances: HashMap<Address, U256>,
    tickets: HashMap<Address, TicketRecord>,
    receipts: HashMap<TxHash, Receipt>,
    // receipt polls answered None before an outcome is served
    confirmation_polls: u32,
    submissions: u64,
    faults: Faults,
}

impl SimulatedLedger {
    pub fn new(
        contract: Address,
        owner: Address,
        ticket_price: U256,
        full_refund: U256,
        partial_refund: U256,
    ) -> Arc<Self> {
        let (account_events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Arc::new(Self {
            state: Mutex::new(LedgerState {
                contract,
                owner,
                ticket_price,
                full_refund,
                partial_refund,
                contract_balance: U256::zero(),
                accounts: Vec::new(),
                active: None,
                balances: HashMap::new(),
                tickets: HashMap::new(),
                receipts: HashMap::new(),
                confirmation_polls: 0,
                submissions: 0,
                faults: Faults::default(),
            }),
            account_events,
        })
    }

    /// Register an account the wallet will expose; the first one registered
    /// becomes the active signing account
    pub async fn register_account(&self, address: Address, balance: U256) {
        let mut state = self.state.lock().await;
        state.accounts.push(address);
        state.balances.insert(address, balance);
        if state.active.is_none() {
            state.active = Some(address);
        }
    }

    /// Switch the active signing account (or disconnect with `None`) and
    /// notify subscribers, as a wallet UI would
    pub async fn switch_account(&self, account: Option<Address>) {
        let mut state = self.state.lock().await;
        if let Some(address) = account {
            if !state.accounts.contains(&address) {
                state.accounts.push(address);
            }
        }
        state.active = account;
        drop(state);
        let _ = self.account_events.send(account);
    }

    pub async fn set_ticket_price(&self, price: U256) {
        self.state.lock().await.ticket_price = price;
    }

    /// Serve `None` for this many receipt polls before reporting the outcome
    pub async fn set_confirmation_polls(&self, polls: u32) {
        self.state.lock().await.confirmation_polls = polls;
    }

    // ------------------------------------------------------------------
    // Fault hooks
    // ------------------------------------------------------------------

    pub async fn reject_next_request_accounts(&self) {
        self.state.lock().await.faults.reject_next_request = true;
    }

    pub async fn reject_next_signature(&self) {
        self.state.lock().await.faults.reject_next_signature = true;
    }

    pub async fn revert_next_transaction(&self) {
        self.state.lock().await.faults.revert_next = true;
    }

    /// The next submitted transaction lands but its receipt is never served
    pub async fn drop_next_receipt(&self) {
        self.state.lock().await.faults.drop_next_receipt = true;
    }

    pub async fn malformed_next_read(&self) {
        self.state.lock().await.faults.malformed_next_read = true;
    }

    pub async fn set_offline(&self, offline: bool) {
        self.state.lock().await.faults.offline = offline;
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    pub async fn submission_count(&self) -> u64 {
        self.state.lock().await.submissions
    }

    pub async fn balance_of(&self, address: &Address) -> U256 {
        self.state
            .lock()
            .await
            .balances
            .get(address)
            .copied()
            .unwrap_or_default()
    }

    pub async fn contract_balance(&self) -> U256 {
        self.state.lock().await.contract_balance
    }
}

fn param_address(params: &[Value], index: usize) -> Result<Address, WalletError> {
    params
        .get(index)
        .and_then(Value::as_str)
        .and_then(|raw| raw.parse().ok())
        .ok_or_else(|| WalletError::Network(anyhow!("malformed address parameter {}", index)))
}

fn param_bool(params: &[Value], index: usize) -> Result<bool, WalletError> {
    params
        .get(index)
        .and_then(Value::as_bool)
        .ok_or_else(|| WalletError::Network(anyhow!("malformed bool parameter {}", index)))
}

impl LedgerState {
    fn ensure_contract(&self, spec: &CallSpec) -> Result<(), WalletError> {
        if spec.contract != self.contract {
            return Err(WalletError::Network(anyhow!(
                "no contract deployed at {}",
                spec.contract
            )));
        }
        Ok(())
    }

    // Apply a state-changing call; Reverted mirrors the deployed contract's
    // own rules as far as the client can observe them
    fn execute(&mut self, sender: Address, spec: &CallSpec) -> Result<TxOutcome, WalletError> {
        let outcome = match spec.method {
            ContractMethod::BuyTicket => {
                let value = spec.value.unwrap_or_default();
                let already = self
                    .tickets
                    .get(&sender)
                    .is_some_and(|t| t.is_purchased() && !t.refunded);
                if value != self.ticket_price || already {
                    TxOutcome::Reverted
                } else {
                    if let Some(balance) = self.balances.get_mut(&sender) {
                        *balance -= value;
                    }
                    self.contract_balance += value;
                    self.tickets.insert(
                        sender,
                        TicketRecord {
                            amount_paid: value,
                            ..Default::default()
                        },
                    );
                    TxOutcome::Success
                }
            }
            ContractMethod::MarkVisit => {
                let visitor = param_address(&spec.params, 0)?;
                let valley = param_bool(&spec.params, 1)?;
                let shuttle = param_bool(&spec.params, 2)?;
                match self.tickets.get_mut(&visitor) {
                    Some(ticket) if sender == self.owner && ticket.is_purchased() => {
                        ticket.visited_blue_moon_valley = valley;
                        ticket.used_shuttle_bus = shuttle;
                        TxOutcome::Success
                    }
                    _ => TxOutcome::Reverted,
                }
            }
            ContractMethod::RefundFull | ContractMethod::RefundPartial => {
                let visitor = param_address(&spec.params, 0)?;
                let amount = if spec.method == ContractMethod::RefundFull {
                    self.full_refund
                } else {
                    self.partial_refund
                };
                let eligible = self
                    .tickets
                    .get(&visitor)
                    .is_some_and(|t| t.is_purchased() && !t.refunded && t.has_visited());
                if !eligible || self.contract_balance < amount {
                    TxOutcome::Reverted
                } else {
                    // checked above
                    if let Some(ticket) = self.tickets.get_mut(&visitor) {
                        ticket.refunded = true;
                    }
                    self.contract_balance -= amount;
                    *self.balances.entry(visitor).or_default() += amount;
                    TxOutcome::Success
                }
            }
            ContractMethod::EmergencyWithdraw => {
                if sender == self.owner {
                    let drained = self.contract_balance;
                    self.contract_balance = U256::zero();
                    *self.balances.entry(sender).or_default() += drained;
                    TxOutcome::Success
                } else {
                    TxOutcome::Reverted
                }
            }
            method => {
                return Err(WalletError::Network(anyhow!(
                    "cannot submit read method {}",
                    method
                )))
            }
        };
        Ok(outcome)
    }
}

#[async_trait]
impl WalletProvider for SimulatedLedger {
    async fn request_accounts(&self) -> Result<Vec<Address>, WalletError> {
        trace!("request_accounts");
        let mut state = self.state.lock().await;
        if state.faults.offline {
            return Err(WalletError::ProviderUnavailable(
                "simulated outage".to_owned(),
            ));
        }
        if state.faults.reject_next_request {
            state.faults.reject_next_request = false;
            return Err(WalletError::UserRejected);
        }
        Ok(state.accounts.clone())
    }

    async fn call(&self, spec: &CallSpec) -> Result<Value, WalletError> {
        trace!("call {}", spec.method);
        let mut state = self.state.lock().await;
        if state.faults.offline {
            return Err(WalletError::Network(anyhow!("simulated outage")));
        }
        if state.faults.malformed_next_read {
            state.faults.malformed_next_read = false;
            return Ok(Value::String("garbage".to_owned()));
        }
        state.ensure_contract(spec)?;

        let payload = match spec.method {
            ContractMethod::Owner => serde_json::to_value(state.owner),
            ContractMethod::TicketPrice => serde_json::to_value(state.ticket_price),
            ContractMethod::FullRefund => serde_json::to_value(state.full_refund),
            ContractMethod::PartialRefund => serde_json::to_value(state.partial_refund),
            ContractMethod::Tickets => {
                let visitor = param_address(&spec.params, 0)?;
                let record = state.tickets.get(&visitor).cloned().unwrap_or_default();
                serde_json::to_value(record)
            }
            method => {
                return Err(WalletError::Network(anyhow!(
                    "cannot call write method {}",
                    method
                )))
            }
        };
        payload.map_err(|e| WalletError::Any(e.into()))
    }

    async fn sign_and_submit(&self, spec: &CallSpec) -> Result<TxHash, WalletError> {
        let mut state = self.state.lock().await;
        state.submissions += 1;

        if state.faults.offline {
            return Err(WalletError::ProviderUnavailable(
                "simulated outage".to_owned(),
            ));
        }
        if state.faults.reject_next_signature {
            state.faults.reject_next_signature = false;
            return Err(WalletError::UserRejected);
        }
        let sender = state.active.ok_or_else(|| {
            WalletError::ProviderUnavailable("no active signing account".to_owned())
        })?;
        state.ensure_contract(spec)?;

        // The wallet refuses before submission when the sender cannot cover
        // the attached value
        let value = spec.value.unwrap_or_default();
        if state.balances.get(&sender).copied().unwrap_or_default() < value {
            return Err(WalletError::InsufficientFunds);
        }

        let handle = TxHash::new(rand::random::<[u8; 32]>());
        let outcome = if state.faults.revert_next {
            state.faults.revert_next = false;
            TxOutcome::Reverted
        } else {
            state.execute(sender, spec)?
        };
        debug!("Simulated {} from {}: {:?}", spec.method, sender, outcome);

        if state.faults.drop_next_receipt {
            state.faults.drop_next_receipt = false;
        } else {
            let polls_remaining = state.confirmation_polls;
            state.receipts.insert(
                handle,
                Receipt {
                    outcome,
                    polls_remaining,
                },
            );
        }
        Ok(handle)
    }

    async fn transaction_outcome(&self, handle: &TxHash) -> Result<Option<TxOutcome>, WalletError> {
        let mut state = self.state.lock().await;
        if state.faults.offline {
            return Err(WalletError::Network(anyhow!("simulated outage")));
        }
        match state.receipts.get_mut(handle) {
            Some(receipt) if receipt.polls_remaining > 0 => {
                receipt.polls_remaining -= 1;
                Ok(None)
            }
            Some(receipt) => Ok(Some(receipt.outcome)),
            None => Ok(None),
        }
    }

    fn subscribe_account_changes(&self) -> broadcast::Receiver<Option<Address>> {
        self.account_events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(byte: u8) -> Address {
        Address::new([byte; 20])
    }

    fn ledger() -> Arc<SimulatedLedger> {
        SimulatedLedger::new(
            addr(0xcc),
            addr(0x01),
            U256::from(100u64),
            U256::from(100u64),
            U256::from(50u64),
        )
    }

    #[tokio::test]
    async fn buy_with_wrong_value_reverts() -> anyhow::Result<()> {
        let ledger = ledger();
        ledger.register_account(addr(0x02), U256::from(1000u64)).await;

        let spec = CallSpec::new(addr(0xcc), ContractMethod::BuyTicket).with_value(U256::from(90u64));
        let handle = ledger.sign_and_submit(&spec).await?;
        assert_eq!(
            ledger.transaction_outcome(&handle).await?,
            Some(TxOutcome::Reverted)
        );
        assert_eq!(ledger.contract_balance().await, U256::zero());
        Ok(())
    }

    #[tokio::test]
    async fn mark_visit_is_owner_only() -> anyhow::Result<()> {
        let ledger = ledger();
        let visitor = addr(0x02);
        ledger.register_account(visitor, U256::from(1000u64)).await;

        let buy = CallSpec::new(addr(0xcc), ContractMethod::BuyTicket).with_value(U256::from(100u64));
        ledger.sign_and_submit(&buy).await?;

        // Visitor is the active signer, not the owner
        let mark = CallSpec::new(addr(0xcc), ContractMethod::MarkVisit).with_params(vec![
            Value::String(visitor.to_string()),
            Value::Bool(true),
            Value::Bool(false),
        ]);
        let handle = ledger.sign_and_submit(&mark).await?;
        assert_eq!(
            ledger.transaction_outcome(&handle).await?,
            Some(TxOutcome::Reverted)
        );

        ledger.switch_account(Some(addr(0x01))).await;
        let handle = ledger.sign_and_submit(&mark).await?;
        assert_eq!(
            ledger.transaction_outcome(&handle).await?,
            Some(TxOutcome::Success)
        );
        Ok(())
    }

    #[tokio::test]
    async fn refund_credits_visitor_and_flags_record() -> anyhow::Result<()> {
        let ledger = ledger();
        let owner = addr(0x01);
        let visitor = addr(0x02);
        ledger.register_account(visitor, U256::from(1000u64)).await;

        let buy = CallSpec::new(addr(0xcc), ContractMethod::BuyTicket).with_value(U256::from(100u64));
        ledger.sign_and_submit(&buy).await?;

        ledger.switch_account(Some(owner)).await;
        let mark = CallSpec::new(addr(0xcc), ContractMethod::MarkVisit).with_params(vec![
            Value::String(visitor.to_string()),
            Value::Bool(true),
            Value::Bool(true),
        ]);
        ledger.sign_and_submit(&mark).await?;

        let refund = CallSpec::new(addr(0xcc), ContractMethod::RefundFull)
            .with_params(vec![Value::String(visitor.to_string())]);
        let handle = ledger.sign_and_submit(&refund).await?;
        assert_eq!(
            ledger.transaction_outcome(&handle).await?,
            Some(TxOutcome::Success)
        );

        // Full price back, nothing left in the contract
        assert_eq!(ledger.balance_of(&visitor).await, U256::from(1000u64));
        assert_eq!(ledger.contract_balance().await, U256::zero());

        // No double refund
        let handle = ledger.sign_and_submit(&refund).await?;
        assert_eq!(
            ledger.transaction_outcome(&handle).await?,
            Some(TxOutcome::Reverted)
        );
        Ok(())
    }
}
