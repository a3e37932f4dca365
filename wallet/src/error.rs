use std::time::Duration;

use thiserror::Error;
use trustrefund_common::{
    api::{CallSpecError, DecodeError},
    crypto::TxHash,
    ticket::{IntentKind, LifecycleState},
};

/// Classified failure taxonomy surfaced to the presentation layer.
///
/// Kinds are preserved end to end and never collapsed into a generic failure:
/// "you rejected the prompt", "the ledger rejected the transaction" and "we
/// couldn't reach the network" must stay distinguishable at the UI boundary.
#[derive(Debug, Error)]
pub enum WalletError {
    #[error("no wallet capability is injected")]
    NoWalletAvailable,
    #[error("user rejected the wallet prompt")]
    UserRejected,
    #[error("insufficient funds to cover the attached value")]
    InsufficientFunds,
    #[error("wallet provider is unavailable: {0}")]
    ProviderUnavailable(String),
    #[error("network error while reaching the ledger")]
    Network(#[source] anyhow::Error),
    #[error("malformed response from the ledger")]
    Decode(#[from] DecodeError),
    #[error("ticket price could not be read before submission")]
    PriceUnavailable(#[source] Box<WalletError>),
    #[error("a {0} transaction is already in flight for this account")]
    DuplicateIntent(IntentKind),
    #[error("refund is not eligible while the ticket is {0}")]
    IneligibleForRefund(LifecycleState),
    #[error("transaction {0} was reverted by the ledger")]
    TransactionReverted(TxHash),
    #[error("transaction {handle} still unconfirmed after {elapsed:?}")]
    ConfirmationTimeout { handle: TxHash, elapsed: Duration },
    #[error(transparent)]
    CallSpec(#[from] CallSpecError),
    #[error(transparent)]
    Any(#[from] anyhow::Error),
}

impl WalletError {
    /// Stable tag for the presentation layer to branch on
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NoWalletAvailable => "no_wallet_available",
            Self::UserRejected => "user_rejected",
            Self::InsufficientFunds => "insufficient_funds",
            Self::ProviderUnavailable(_) => "provider_unavailable",
            Self::Network(_) => "network_error",
            Self::Decode(_) => "decode_error",
            Self::PriceUnavailable(_) => "price_unavailable",
            Self::DuplicateIntent(_) => "duplicate_intent",
            Self::IneligibleForRefund(_) => "ineligible_for_refund",
            Self::TransactionReverted(_) => "transaction_reverted",
            Self::ConfirmationTimeout { .. } => "confirmation_timeout",
            Self::CallSpec(_) => "invalid_call_spec",
            Self::Any(_) => "internal_error",
        }
    }
}
