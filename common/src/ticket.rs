use chrono::{DateTime, Utc};
use primitive_types::U256;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter};

use crate::{abi::ContractMethod, crypto::TxHash};

/// Per-visitor ticket record as stored by the ledger.
///
/// The client only ever holds a cached, possibly-stale copy; the ledger copy
/// is authoritative. `amount_paid == 0` means no ticket was purchased,
/// `refunded` means no further refund is eligible.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketRecord {
    pub amount_paid: U256,
    pub visited_blue_moon_valley: bool,
    pub used_shuttle_bus: bool,
    pub refunded: bool,
}

impl TicketRecord {
    pub fn is_purchased(&self) -> bool {
        !self.amount_paid.is_zero()
    }

    pub fn has_visited(&self) -> bool {
        self.visited_blue_moon_valley || self.used_shuttle_bus
    }
}

/// User-requested state transitions the orchestrator accepts
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, Display, AsRefStr, Serialize, Deserialize,
)]
pub enum IntentKind {
    #[strum(serialize = "buy")]
    #[serde(rename = "buy")]
    Buy,
    #[strum(serialize = "refundFull")]
    #[serde(rename = "refundFull")]
    RefundFull,
    #[strum(serialize = "refundPartial")]
    #[serde(rename = "refundPartial")]
    RefundPartial,
}

impl IntentKind {
    /// Ledger function this intent submits
    pub fn method(self) -> ContractMethod {
        match self {
            IntentKind::Buy => ContractMethod::BuyTicket,
            IntentKind::RefundFull => ContractMethod::RefundFull,
            IntentKind::RefundPartial => ContractMethod::RefundPartial,
        }
    }

    pub fn is_refund(self) -> bool {
        matches!(self, IntentKind::RefundFull | IntentKind::RefundPartial)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxStatus {
    Submitted,
    Confirmed,
    Failed,
}

/// Client-local record of an in-flight transaction.
///
/// Created when an intent is submitted, destroyed once confirmed or failed
/// and acknowledged. At most one exists per (account, intent kind). Never
/// crosses the wire, so it carries no serde.
#[derive(Clone, Debug)]
pub struct PendingTransaction {
    pub intent: IntentKind,
    pub submitted_at: DateTime<Utc>,
    pub handle: TxHash,
    pub status: TxStatus,
}

impl PendingTransaction {
    pub fn new(intent: IntentKind, handle: TxHash) -> Self {
        Self {
            intent,
            submitted_at: Utc::now(),
            handle,
            status: TxStatus::Submitted,
        }
    }

    pub fn is_in_flight(&self) -> bool {
        self.status == TxStatus::Submitted
    }
}

/// Display-oriented projection of ledger + pending-transaction state.
/// Derived, never stored; recomputed on every relevant event.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, EnumIter, Display, AsRefStr, Serialize, Deserialize,
)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum LifecycleState {
    Unpurchased,
    PendingPurchase,
    Purchased,
    PendingRefund,
    RefundEligible,
    Refunded,
}

/// Derive the lifecycle state of one visitor's ticket from the last ledger
/// read and any in-flight pending transaction.
///
/// Total over all reachable (record, pending) combinations. A pending entry
/// whose status is no longer `Submitted` is treated as absent: settled slots
/// are cleared promptly, but the derivation must not depend on that timing.
pub fn lifecycle_state(
    record: &TicketRecord,
    pending: Option<&PendingTransaction>,
) -> LifecycleState {
    let in_flight = pending.filter(|p| p.is_in_flight());

    if in_flight.map(|p| p.intent) == Some(IntentKind::Buy) {
        LifecycleState::PendingPurchase
    } else if !record.is_purchased() {
        LifecycleState::Unpurchased
    } else if record.refunded {
        LifecycleState::Refunded
    } else if in_flight.is_some_and(|p| p.intent.is_refund()) {
        LifecycleState::PendingRefund
    } else if record.has_visited() {
        LifecycleState::RefundEligible
    } else {
        LifecycleState::Purchased
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paid(amount: u64) -> TicketRecord {
        TicketRecord {
            amount_paid: U256::from(amount),
            ..Default::default()
        }
    }

    fn pending(intent: IntentKind, status: TxStatus) -> PendingTransaction {
        PendingTransaction {
            status,
            ..PendingTransaction::new(intent, TxHash::zero())
        }
    }

    #[test]
    fn pending_buy_wins_over_everything() {
        let p = pending(IntentKind::Buy, TxStatus::Submitted);
        assert_eq!(
            lifecycle_state(&TicketRecord::default(), Some(&p)),
            LifecycleState::PendingPurchase
        );
        // Even a stale record showing a paid ticket stays pending until settled
        assert_eq!(
            lifecycle_state(&paid(100), Some(&p)),
            LifecycleState::PendingPurchase
        );
    }

    #[test]
    fn unpurchased_when_nothing_paid() {
        assert_eq!(
            lifecycle_state(&TicketRecord::default(), None),
            LifecycleState::Unpurchased
        );
    }

    #[test]
    fn refunded_wins_over_pending_refund() {
        let mut record = paid(100);
        record.refunded = true;
        assert_eq!(lifecycle_state(&record, None), LifecycleState::Refunded);

        // A refund still marked in flight does not resurrect eligibility
        let p = pending(IntentKind::RefundFull, TxStatus::Submitted);
        assert_eq!(lifecycle_state(&record, Some(&p)), LifecycleState::Refunded);
    }

    #[test]
    fn pending_refund_for_both_refund_kinds() {
        let mut record = paid(100);
        record.visited_blue_moon_valley = true;

        for intent in [IntentKind::RefundFull, IntentKind::RefundPartial] {
            let p = pending(intent, TxStatus::Submitted);
            assert_eq!(
                lifecycle_state(&record, Some(&p)),
                LifecycleState::PendingRefund
            );
        }
    }

    #[test]
    fn either_visit_flag_makes_refund_eligible() {
        let mut valley = paid(100);
        valley.visited_blue_moon_valley = true;
        assert_eq!(
            lifecycle_state(&valley, None),
            LifecycleState::RefundEligible
        );

        let mut shuttle = paid(100);
        shuttle.used_shuttle_bus = true;
        assert_eq!(
            lifecycle_state(&shuttle, None),
            LifecycleState::RefundEligible
        );
    }

    #[test]
    fn purchased_when_paid_and_unvisited() {
        assert_eq!(lifecycle_state(&paid(100), None), LifecycleState::Purchased);
    }

    #[test]
    fn settled_pending_is_ignored() {
        // A confirmed/failed slot not yet cleared must not stick the model
        for status in [TxStatus::Confirmed, TxStatus::Failed] {
            let p = pending(IntentKind::Buy, status);
            assert_eq!(
                lifecycle_state(&paid(100), Some(&p)),
                LifecycleState::Purchased
            );
            assert_eq!(
                lifecycle_state(&TicketRecord::default(), Some(&p)),
                LifecycleState::Unpurchased
            );
        }
    }

    #[test]
    fn total_over_all_reachable_pairs() {
        let intents = [
            None,
            Some(IntentKind::Buy),
            Some(IntentKind::RefundFull),
            Some(IntentKind::RefundPartial),
        ];
        let statuses = [TxStatus::Submitted, TxStatus::Confirmed, TxStatus::Failed];

        for amount in [0u64, 100] {
            for refunded in [false, true] {
                for valley in [false, true] {
                    for shuttle in [false, true] {
                        let record = TicketRecord {
                            amount_paid: U256::from(amount),
                            visited_blue_moon_valley: valley,
                            used_shuttle_bus: shuttle,
                            refunded,
                        };
                        for intent in intents {
                            for status in statuses {
                                let p = intent.map(|i| pending(i, status));
                                let state = lifecycle_state(&record, p.as_ref());

                                // Exactly one state, consistent with the record
                                // when no submitted transaction is in flight
                                if p.as_ref().map(|p| p.is_in_flight()) != Some(true) {
                                    if amount == 0 {
                                        assert_eq!(state, LifecycleState::Unpurchased);
                                    } else if refunded {
                                        assert_eq!(state, LifecycleState::Refunded);
                                    } else if valley || shuttle {
                                        assert_eq!(state, LifecycleState::RefundEligible);
                                    } else {
                                        assert_eq!(state, LifecycleState::Purchased);
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn record_serde_matches_ledger_field_names() -> Result<(), Box<dyn std::error::Error>> {
        let record: TicketRecord = serde_json::from_value(serde_json::json!({
            "amountPaid": "0x64",
            "visitedBlueMoonValley": true,
            "usedShuttleBus": false,
            "refunded": false,
        }))?;
        assert_eq!(record.amount_paid, U256::from(100u64));
        assert!(record.visited_blue_moon_valley);
        assert!(!record.refunded);
        Ok(())
    }
}
