//! Wallet-level refusals.
//!
//! A signer that refuses to sign is not a failure of the withdrawal, so it is
//! kept distinguishable from every other error a signer can return.

use thiserror::Error;

/// EIP-1193 "user rejected request".
pub const USER_REJECTED_CODE: i64 = 4001;

/// Phrases wallets use when the user refuses a prompt.
const REJECTION_PATTERNS: &[&str] = &[
    "user rejected",
    "user denied",
    "user cancelled",
    "user canceled",
    "rejected by user",
    "denied by user",
    "cancelled by user",
    "canceled by user",
    "user disapproved",
    "user declined",
    "transaction was rejected",
    "transaction was cancelled",
    "transaction was canceled",
    "request rejected",
    "request cancelled",
    "request canceled",
    "rejected the request",
    "cancelled the request",
    "canceled the request",
    "action_rejected",
    "userrejectedrequesterror",
];

#[derive(Error, Debug)]
pub enum SignerError {
    /// The signer refused the request.
    #[error("user rejected the request: {0}")]
    Rejected(String),

    /// The signer answered with a JSON-RPC error.
    #[error("JSON-RPC error {code}: {message}")]
    Remote { code: i64, message: String },
}

impl SignerError {
    /// Classify a JSON-RPC error returned by a signer.
    pub fn from_rpc(code: i64, message: String) -> Self {
        if code == USER_REJECTED_CODE || message_is_rejection(&message) {
            Self::Rejected(message)
        } else {
            Self::Remote { code, message }
        }
    }
}

fn message_is_rejection(message: &str) -> bool {
    let lower = message.to_lowercase();
    REJECTION_PATTERNS.iter().any(|p| lower.contains(p))
}

/// True when `error`, or anything in its cause chain, is a user refusal.
pub fn is_user_rejection(error: &eyre::Report) -> bool {
    error.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<SignerError>(),
            Some(SignerError::Rejected(_))
        ) || message_is_rejection(&cause.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_4001_is_rejection() {
        let err = SignerError::from_rpc(4001, "nope".to_string());
        assert!(matches!(err, SignerError::Rejected(_)));
    }

    #[test]
    fn test_other_codes_are_remote_errors() {
        let err = SignerError::from_rpc(-32000, "nonce too low".to_string());
        assert!(matches!(err, SignerError::Remote { code: -32000, .. }));
    }

    #[test]
    fn test_rejection_by_message() {
        let err = SignerError::from_rpc(-1, "MetaMask Tx Signature: User denied transaction signature.".to_string());
        assert!(matches!(err, SignerError::Rejected(_)));
    }

    #[test]
    fn test_is_user_rejection_walks_chain() {
        let report = eyre::Report::new(SignerError::Rejected("x".into())).wrap_err("prove failed");
        assert!(is_user_rejection(&report));

        let report = eyre::eyre!("execution reverted");
        assert!(!is_user_rejection(&report));

        let report = eyre::eyre!("ACTION_REJECTED");
        assert!(is_user_rejection(&report));
    }
}
