use std::sync::Arc;

use log::trace;
use primitive_types::U256;
use serde_json::Value;
use trustrefund_common::{
    abi::ContractMethod,
    api::{decode_response, CallSpec},
    crypto::{Address, TxHash},
    ticket::TicketRecord,
};

use crate::{error::WalletError, provider::ProviderGateway};

/// Typed facade over the ticket contract's function set.
///
/// One method per ledger function. Reads are side-effect free and freely
/// retryable, failing only with `Network` or `Decode`. Writes delegate to the
/// gateway and return the transaction handle without waiting: confirmation
/// policy lives in the orchestrator, not here.
pub struct ContractClient {
    gateway: Arc<ProviderGateway>,
    // Fixed at startup, not user-editable at runtime
    contract: Address,
}

impl ContractClient {
    pub fn new(gateway: Arc<ProviderGateway>, contract: Address) -> Arc<Self> {
        Arc::new(Self { gateway, contract })
    }

    pub fn contract_address(&self) -> &Address {
        &self.contract
    }

    fn spec(&self, method: ContractMethod) -> CallSpec {
        CallSpec::new(self.contract, method)
    }

    async fn read<T: serde::de::DeserializeOwned>(
        &self,
        spec: CallSpec,
    ) -> Result<T, WalletError> {
        spec.validate()?;
        let raw = self.gateway.call(&spec).await?;
        Ok(decode_response(raw)?)
    }

    async fn write(&self, spec: CallSpec) -> Result<TxHash, WalletError> {
        spec.validate()?;
        self.gateway.sign_and_send(&spec).await
    }

    // ------------------------------------------------------------------
    // Read methods
    // ------------------------------------------------------------------

    pub async fn owner(&self) -> Result<Address, WalletError> {
        trace!("owner");
        self.read(self.spec(ContractMethod::Owner)).await
    }

    pub async fn ticket_price(&self) -> Result<U256, WalletError> {
        trace!("ticket_price");
        self.read(self.spec(ContractMethod::TicketPrice)).await
    }

    pub async fn full_refund(&self) -> Result<U256, WalletError> {
        trace!("full_refund");
        self.read(self.spec(ContractMethod::FullRefund)).await
    }

    pub async fn partial_refund(&self) -> Result<U256, WalletError> {
        trace!("partial_refund");
        self.read(self.spec(ContractMethod::PartialRefund)).await
    }

    /// Per-visitor ticket record; defaults to all-zero for unknown visitors
    pub async fn tickets(&self, visitor: &Address) -> Result<TicketRecord, WalletError> {
        trace!("tickets {}", visitor);
        let spec = self
            .spec(ContractMethod::Tickets)
            .with_params(vec![Value::String(visitor.to_string())]);
        self.read(spec).await
    }

    // ------------------------------------------------------------------
    // Write methods - submission only, no confirmation waiting
    // ------------------------------------------------------------------

    /// Buy a ticket, attaching `value` as payment
    pub async fn buy_ticket(&self, value: U256) -> Result<TxHash, WalletError> {
        trace!("buy_ticket value={}", value);
        self.write(self.spec(ContractMethod::BuyTicket).with_value(value))
            .await
    }

    /// Record a visit for `visitor`; only honored by the ledger for the owner
    pub async fn mark_visit(
        &self,
        visitor: &Address,
        visited_blue_moon_valley: bool,
        used_shuttle_bus: bool,
    ) -> Result<TxHash, WalletError> {
        trace!("mark_visit {}", visitor);
        let spec = self.spec(ContractMethod::MarkVisit).with_params(vec![
            Value::String(visitor.to_string()),
            Value::Bool(visited_blue_moon_valley),
            Value::Bool(used_shuttle_bus),
        ]);
        self.write(spec).await
    }

    pub async fn refund_full(&self, visitor: &Address) -> Result<TxHash, WalletError> {
        trace!("refund_full {}", visitor);
        let spec = self
            .spec(ContractMethod::RefundFull)
            .with_params(vec![Value::String(visitor.to_string())]);
        self.write(spec).await
    }

    pub async fn refund_partial(&self, visitor: &Address) -> Result<TxHash, WalletError> {
        trace!("refund_partial {}", visitor);
        let spec = self
            .spec(ContractMethod::RefundPartial)
            .with_params(vec![Value::String(visitor.to_string())]);
        self.write(spec).await
    }

    /// Drain the contract balance; only honored by the ledger for the owner
    pub async fn emergency_withdraw(&self) -> Result<TxHash, WalletError> {
        trace!("emergency_withdraw");
        self.write(self.spec(ContractMethod::EmergencyWithdraw))
            .await
    }
}
