//! Hashes committed to by the message passer and the dispute games.

use crate::{error::WithdrawalError, types::WithdrawalHash};
use alloy_primitives::{keccak256, B256};
use alloy_sol_types::SolValue;
use binding::opstack::WithdrawalTransaction;
use record::{OutputRootPreimage, WithdrawalDetails};

/// `Hashing.hashWithdrawal`: keccak256(abi.encode(nonce, sender, target, value, gasLimit, data)).
///
/// The fields are encoded as a sequence, without the offset a tuple wrapper would add.
pub fn compute_withdrawal_hash(tx: &WithdrawalTransaction) -> WithdrawalHash {
    let encoded = (
        &tx.nonce,
        &tx.sender,
        &tx.target,
        &tx.value,
        &tx.gasLimit,
        &tx.data,
    )
        .abi_encode_sequence();

    keccak256(encoded)
}

/// Check that the hash carried by `details` matches its tuple.
pub fn verify_withdrawal_hash(details: &WithdrawalDetails) -> Result<(), WithdrawalError> {
    let computed = compute_withdrawal_hash(&details.transaction());
    if computed != details.withdrawal_hash {
        return Err(WithdrawalError::HashMismatch {
            event: details.withdrawal_hash,
            computed,
        });
    }
    Ok(())
}

/// Slot of `sentMessages[withdrawalHash]` in the message passer.
///
/// The mapping lives at slot 0, so the slot is keccak256(withdrawalHash ‖ 0).
pub fn compute_storage_slot(withdrawal_hash: WithdrawalHash) -> B256 {
    let mut data = [0u8; 64];
    data[0..32].copy_from_slice(withdrawal_hash.as_slice());
    keccak256(data)
}

/// Output root a game claims for `preimage`.
pub fn hash_output_root(preimage: &OutputRootPreimage) -> B256 {
    let encoded = (
        preimage.version,
        preimage.state_root,
        preimage.message_passer_storage_root,
        preimage.latest_blockhash,
    )
        .abi_encode_sequence();

    keccak256(encoded)
}
