use primitive_types::U256;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::{
    abi::{ContractMethod, Mutability},
    crypto::Address,
};

/// A contract call specification crossing the provider boundary:
/// target contract, method, arguments, and the optional value attached to a
/// payable call.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CallSpec {
    pub contract: Address,
    pub method: ContractMethod,
    #[serde(default)]
    pub params: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<U256>,
}

impl CallSpec {
    pub fn new(contract: Address, method: ContractMethod) -> Self {
        Self {
            contract,
            method,
            params: Vec::new(),
            value: None,
        }
    }

    pub fn with_params(mut self, params: Vec<Value>) -> Self {
        self.params = params;
        self
    }

    pub fn with_value(mut self, value: U256) -> Self {
        self.value = Some(value);
        self
    }

    // Check the call against the function manifest before it leaves the client
    pub fn validate(&self) -> Result<(), CallSpecError> {
        if self.params.len() != self.method.arity() {
            return Err(CallSpecError::ArityMismatch {
                method: self.method,
                expected: self.method.arity(),
                got: self.params.len(),
            });
        }

        match self.method.mutability() {
            Mutability::Payable => Ok(()),
            _ if self.value.is_some() => Err(CallSpecError::ValueOnNonPayable(self.method)),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Error)]
pub enum CallSpecError {
    #[error("{method} expects {expected} parameters, got {got}")]
    ArityMismatch {
        method: ContractMethod,
        expected: usize,
        got: usize,
    },
    #[error("{0} is not payable but a value was attached")]
    ValueOnNonPayable(ContractMethod),
}

/// Outcome of a settled transaction as reported by the ledger
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxOutcome {
    Success,
    Reverted,
}

/// Malformed response from the ledger
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid response payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unexpected response shape: expected {0}")]
    UnexpectedShape(&'static str),
}

// Decode a raw provider response into its typed result
pub fn decode_response<T: DeserializeOwned>(value: Value) -> Result<T, DecodeError> {
    Ok(serde_json::from_value(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_spec_validation() {
        let contract = Address::zero();
        let spec =
            CallSpec::new(contract, ContractMethod::BuyTicket).with_value(U256::from(100u64));
        assert!(spec.validate().is_ok());

        let spec = CallSpec::new(contract, ContractMethod::Tickets);
        assert!(matches!(
            spec.validate(),
            Err(CallSpecError::ArityMismatch { expected: 1, got: 0, .. })
        ));

        let spec = CallSpec::new(contract, ContractMethod::Owner).with_value(U256::one());
        assert!(matches!(
            spec.validate(),
            Err(CallSpecError::ValueOnNonPayable(ContractMethod::Owner))
        ));
    }

    #[test]
    fn decode_quantity_from_hex_string() -> Result<(), DecodeError> {
        let value: U256 = decode_response(serde_json::json!("0x64"))?;
        assert_eq!(value, U256::from(100u64));
        Ok(())
    }

    #[test]
    fn decode_rejects_malformed_quantity() {
        let result: Result<U256, DecodeError> = decode_response(serde_json::json!("not-hex"));
        assert!(result.is_err());
    }
}
