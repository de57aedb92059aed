use alloy_primitives::{TxHash, B256, U256};
use record::WithdrawalDetails;

pub type WithdrawalHash = B256;

/// Withdrawal decoded from an L2 receipt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedWithdrawal {
    pub details: WithdrawalDetails,
    pub l2_block: u64,
}

/// `MessagePassed` found while scanning a block range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitiatedWithdrawal {
    pub details: WithdrawalDetails,
    pub l2_block: u64,
    pub l2_tx_hash: TxHash,
}

/// Portal record of a proof submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvenWithdrawal {
    pub output_root: B256,
    pub timestamp: u64,
    pub game_index: U256,
}
