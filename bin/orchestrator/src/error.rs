//! Classification of step failures.
//!
//! Components return `eyre` reports. The driver decides what a failure does to
//! a record from the [`ErrorKind`] alone.

use client::{is_user_rejection, ClientError};
use withdrawal::WithdrawalError;

/// Message attached to a record while the settlement balance is too low.
pub const INSUFFICIENT_GAS: &str = "insufficient gas on settlement chain";

pub const TX_REVERTED: &str = "transaction reverted";

const MAX_MESSAGE_LEN: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The wallet refused to sign. Rolled back silently.
    UserRejected,
    /// Reverted or underfunded transaction. Rolled back with a message.
    Recoverable,
    /// RPC trouble that outlived the component's own retries.
    Transient,
    /// A required field is absent or malformed. Never retried.
    DataIntegrity,
}

pub fn classify(error: &eyre::Report) -> ErrorKind {
    if is_user_rejection(error) {
        return ErrorKind::UserRejected;
    }

    if let Some(e) = error
        .chain()
        .find_map(|cause| cause.downcast_ref::<WithdrawalError>())
    {
        return if e.is_data_integrity() {
            ErrorKind::DataIntegrity
        } else {
            ErrorKind::Transient
        };
    }

    if error.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<ClientError>(),
            Some(ClientError::ReceiptTimeout(_))
        )
    }) {
        return ErrorKind::Transient;
    }

    let text = chain_text(error);
    if is_underfunded(&text) || is_revert(&text) {
        return ErrorKind::Recoverable;
    }
    ErrorKind::Transient
}

/// Short text attached to the record.
pub fn user_message(error: &eyre::Report) -> String {
    let lower = chain_text(error);
    if is_underfunded(&lower) {
        return INSUFFICIENT_GAS.to_string();
    }
    if is_revert(&lower) {
        return TX_REVERTED.to_string();
    }

    let cleaned = error.to_string().split_whitespace().collect::<Vec<_>>().join(" ");
    if cleaned.chars().count() <= MAX_MESSAGE_LEN {
        return cleaned;
    }
    let mut truncated: String = cleaned.chars().take(MAX_MESSAGE_LEN - 3).collect();
    truncated.push_str("...");
    truncated
}

/// Every message in the cause chain, lowercased.
fn chain_text(error: &eyre::Report) -> String {
    error
        .chain()
        .map(|cause| cause.to_string().to_lowercase())
        .collect::<Vec<_>>()
        .join(": ")
}

fn is_underfunded(lower: &str) -> bool {
    lower.contains("insufficient funds")
}

fn is_revert(lower: &str) -> bool {
    lower.contains("revert")
}
