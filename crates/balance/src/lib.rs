//! Native balance monitoring for the account paying settlement-chain gas.
//!
//! Every signed withdrawal step costs settlement-chain gas. The orchestrator
//! checks the balance before prompting the signer and re-checks it on a timer
//! while a step is blocked, so a stale "insufficient gas" message clears on
//! its own once the account is funded.

pub mod monitor;

use alloy_primitives::{utils::format_ether, Address, U256};
use serde::{Deserialize, Serialize};
use std::{fmt, future::Future};

/// Represents a native balance at a specific point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    /// The address holding the balance
    pub holder: Address,
    /// The balance amount in wei
    pub amount: U256,
}

/// Outcome of comparing a balance against the configured minimum.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasCheck {
    pub balance: Balance,
    pub required: U256,
}

impl GasCheck {
    pub const fn new(balance: Balance, required: U256) -> Self {
        Self { balance, required }
    }

    pub fn is_sufficient(&self) -> bool {
        self.balance.amount >= self.required
    }

    /// Wei still missing, zero when sufficient.
    pub fn shortfall(&self) -> U256 {
        self.required.saturating_sub(self.balance.amount)
    }
}

impl fmt::Display for GasCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} holds {} ETH, {} ETH required",
            self.balance.holder,
            format_ether(self.balance.amount),
            format_ether(self.required)
        )
    }
}

/// Trait for monitoring balances on a blockchain.
pub trait Monitor: Send + Sync {
    /// Query the native balance of `holder`.
    fn native_balance(&self, holder: Address)
        -> impl Future<Output = eyre::Result<Balance>> + Send;

    /// Compare the native balance of `holder` against `required`.
    fn check_gas(
        &self,
        holder: Address,
        required: U256,
    ) -> impl Future<Output = eyre::Result<GasCheck>> + Send {
        async move {
            let balance = self.native_balance(holder).await?;
            Ok(GasCheck::new(balance, required))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;

    fn check(amount: u64, required: u64) -> GasCheck {
        GasCheck::new(
            Balance {
                holder: address!("5CFFA347b0aE99cc01E5c01714cA5658e54a23D1"),
                amount: U256::from(amount),
            },
            U256::from(required),
        )
    }

    #[test]
    fn test_sufficient_at_exact_minimum() {
        assert!(check(100, 100).is_sufficient());
        assert_eq!(check(100, 100).shortfall(), U256::ZERO);
    }

    #[test]
    fn test_shortfall() {
        let check = check(40, 100);
        assert!(!check.is_sufficient());
        assert_eq!(check.shortfall(), U256::from(60));
    }

    #[test]
    fn test_display_in_ether() {
        let check = check(500_000_000_000_000_000, 1_000_000_000_000_000_000);
        assert_eq!(
            check.to_string(),
            "0x5CFFA347b0aE99cc01E5c01714cA5658e54a23D1 holds 0.500000000000000000 ETH, 1.000000000000000000 ETH required"
        );
    }

    #[test]
    fn test_serializes_amounts_as_hex() {
        let json = serde_json::to_value(check(16, 0)).unwrap();
        assert_eq!(json["balance"]["amount"], "0x10");
    }
}
