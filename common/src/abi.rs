use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, IntoEnumIterator};

/// How a ledger function may be invoked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mutability {
    // Side-effect free, freely retryable
    Read,
    // State-changing, must be signed and submitted
    Write,
    // State-changing and accepts an attached value
    Payable,
}

impl Mutability {
    pub fn is_read(self) -> bool {
        matches!(self, Mutability::Read)
    }

    pub fn is_write(self) -> bool {
        !self.is_read()
    }
}

/// Function set of the ticket contract
///
/// Wire names follow the deployed contract's ABI, which mixes camelCase
/// functions with SCREAMING_CASE public constants.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, Display, AsRefStr, Serialize, Deserialize,
)]
pub enum ContractMethod {
    #[strum(serialize = "buyTicket")]
    #[serde(rename = "buyTicket")]
    BuyTicket,
    #[strum(serialize = "markVisit")]
    #[serde(rename = "markVisit")]
    MarkVisit,
    #[strum(serialize = "refundFull")]
    #[serde(rename = "refundFull")]
    RefundFull,
    #[strum(serialize = "refundPartial")]
    #[serde(rename = "refundPartial")]
    RefundPartial,
    #[strum(serialize = "emergencyWithdraw")]
    #[serde(rename = "emergencyWithdraw")]
    EmergencyWithdraw,
    #[strum(serialize = "owner")]
    #[serde(rename = "owner")]
    Owner,
    #[strum(serialize = "TICKET_PRICE")]
    #[serde(rename = "TICKET_PRICE")]
    TicketPrice,
    #[strum(serialize = "FULL_REFUND")]
    #[serde(rename = "FULL_REFUND")]
    FullRefund,
    #[strum(serialize = "PARTIAL_REFUND")]
    #[serde(rename = "PARTIAL_REFUND")]
    PartialRefund,
    #[strum(serialize = "tickets")]
    #[serde(rename = "tickets")]
    Tickets,
}

impl ContractMethod {
    pub fn mutability(self) -> Mutability {
        match self {
            ContractMethod::BuyTicket => Mutability::Payable,
            ContractMethod::MarkVisit
            | ContractMethod::RefundFull
            | ContractMethod::RefundPartial
            | ContractMethod::EmergencyWithdraw => Mutability::Write,
            ContractMethod::Owner
            | ContractMethod::TicketPrice
            | ContractMethod::FullRefund
            | ContractMethod::PartialRefund
            | ContractMethod::Tickets => Mutability::Read,
        }
    }

    // Number of parameters expected on the wire
    pub fn arity(self) -> usize {
        match self {
            ContractMethod::MarkVisit => 3,
            ContractMethod::RefundFull | ContractMethod::RefundPartial | ContractMethod::Tickets => {
                1
            }
            _ => 0,
        }
    }

    pub fn from_wire_name(name: &str) -> Option<Self> {
        Self::iter().find(|method| method.as_ref() == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_names_match_deployed_abi() {
        assert_eq!(ContractMethod::BuyTicket.to_string(), "buyTicket");
        assert_eq!(ContractMethod::TicketPrice.to_string(), "TICKET_PRICE");
        assert_eq!(ContractMethod::Tickets.to_string(), "tickets");
        assert_eq!(
            ContractMethod::from_wire_name("refundPartial"),
            Some(ContractMethod::RefundPartial)
        );
        assert_eq!(ContractMethod::from_wire_name("refund_partial"), None);
    }

    #[test]
    fn mutability_partition() {
        let reads: Vec<ContractMethod> = ContractMethod::iter()
            .filter(|m| m.mutability().is_read())
            .collect();
        assert_eq!(
            reads,
            vec![
                ContractMethod::Owner,
                ContractMethod::TicketPrice,
                ContractMethod::FullRefund,
                ContractMethod::PartialRefund,
                ContractMethod::Tickets,
            ]
        );
        assert_eq!(ContractMethod::BuyTicket.mutability(), Mutability::Payable);
        assert!(ContractMethod::EmergencyWithdraw.mutability().is_write());
    }

    #[test]
    fn arity_per_method() {
        assert_eq!(ContractMethod::MarkVisit.arity(), 3);
        assert_eq!(ContractMethod::Tickets.arity(), 1);
        assert_eq!(ContractMethod::BuyTicket.arity(), 0);
    }
}
