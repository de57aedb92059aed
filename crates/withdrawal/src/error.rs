use alloy_primitives::{TxHash, B256};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WithdrawalError {
    /// A required field is absent or zero.
    #[error("{0} is undefined")]
    MissingField(String),

    #[error("Withdrawal proof array is empty")]
    EmptyProof,

    #[error("MessagePassed event not found in transaction {0}")]
    EventNotFound(TxHash),

    #[error("Receipt not found for transaction {0}")]
    ReceiptNotFound(TxHash),

    #[error("Withdrawal hash mismatch: event carries {event}, tuple hashes to {computed}")]
    HashMismatch { event: B256, computed: B256 },

    #[error("Timeout waiting for dispute game covering L2 block {l2_block}")]
    GameTimeout { l2_block: u64 },

    #[error("Could not get proof within window after {attempts} attempts: {reason}")]
    ProofWindow { attempts: usize, reason: String },
}

impl WithdrawalError {
    pub fn missing(field: impl Into<String>) -> Self {
        Self::MissingField(field.into())
    }

    /// Malformed or absent data that retrying will not fix.
    pub const fn is_data_integrity(&self) -> bool {
        matches!(
            self,
            Self::MissingField(_) | Self::EmptyProof | Self::EventNotFound(_) | Self::HashMismatch { .. }
        )
    }
}
