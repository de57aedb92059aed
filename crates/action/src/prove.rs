//! Prove withdrawal action.
//!
//! Submits a proof to L1 that a withdrawal was initiated on L2.

use crate::{ensure_chain, sign_and_send, Action, SignerFn};
use alloy_primitives::{Address, Bytes, TxHash, U256};
use alloy_provider::Provider;
use binding::opstack::{IOptimismPortal, OutputRootProof, WithdrawalTransaction};
use record::{DisputeGame, ProofData, WithdrawalDetails, WithdrawalRecord};
use tracing::info;
use withdrawal::{types::WithdrawalHash, WithdrawalError};

/// Input data for proving a withdrawal on L1.
///
/// Parts are optional because they come straight from a persisted record;
/// [`Prove::validate`] turns them into call arguments.
#[derive(Clone, Debug)]
pub struct Prove {
    /// OptimismPortal contract address on L1
    pub portal_address: Address,
    /// Chain the portal lives on
    pub settlement_chain_id: u64,
    pub withdrawal: Option<WithdrawalDetails>,
    pub game: Option<DisputeGame>,
    pub proof: Option<ProofData>,
    /// Address that will submit the proof transaction
    pub from: Address,
}

/// Arguments of `proveWithdrawalTransaction`.
#[derive(Debug, Clone)]
pub struct ProveCall {
    pub withdrawal: WithdrawalTransaction,
    pub dispute_game_index: U256,
    pub output_root_proof: OutputRootProof,
    pub withdrawal_proof: Vec<Bytes>,
}

impl Prove {
    pub fn from_record(
        record: &WithdrawalRecord,
        portal_address: Address,
        settlement_chain_id: u64,
        from: Address,
    ) -> Self {
        Self {
            portal_address,
            settlement_chain_id,
            withdrawal: record.withdrawal_details.clone(),
            game: record.dispute_game.clone(),
            proof: record.proof_data.clone(),
            from,
        }
    }

    /// Check every field the portal reads, naming the first one missing.
    pub fn validate(&self) -> Result<ProveCall, WithdrawalError> {
        let withdrawal = self
            .withdrawal
            .as_ref()
            .ok_or_else(|| WithdrawalError::missing("Withdrawal details"))?;
        if withdrawal.withdrawal_hash.is_zero() {
            return Err(WithdrawalError::missing("Withdrawal hash"));
        }
        if withdrawal.sender.is_zero() {
            return Err(WithdrawalError::missing("Withdrawal sender"));
        }
        if withdrawal.target.is_zero() {
            return Err(WithdrawalError::missing("Withdrawal target"));
        }
        if withdrawal.gas_limit.is_zero() {
            return Err(WithdrawalError::missing("Withdrawal gas limit"));
        }

        let game = self
            .game
            .as_ref()
            .ok_or_else(|| WithdrawalError::missing("Dispute game index"))?;

        let proof = self
            .proof
            .as_ref()
            .ok_or_else(|| WithdrawalError::missing("Proof data"))?;
        let root = &proof.output_root_proof;
        if root.state_root.is_zero() {
            return Err(WithdrawalError::missing("Output root proof state root"));
        }
        if root.message_passer_storage_root.is_zero() {
            return Err(WithdrawalError::missing(
                "Output root proof message passer storage root",
            ));
        }
        if root.latest_blockhash.is_zero() {
            return Err(WithdrawalError::missing("Output root proof latest block hash"));
        }
        if proof.withdrawal_proof.is_empty() {
            return Err(WithdrawalError::EmptyProof);
        }
        if let Some(index) = proof.withdrawal_proof.iter().position(|node| node.is_empty()) {
            return Err(WithdrawalError::missing(format!(
                "Withdrawal proof at index {index}"
            )));
        }

        Ok(ProveCall {
            withdrawal: withdrawal.transaction(),
            dispute_game_index: U256::from(game.game_index),
            output_root_proof: root.proof(),
            withdrawal_proof: proof.withdrawal_proof.clone(),
        })
    }

    fn withdrawal_hash(&self) -> WithdrawalHash {
        self.withdrawal
            .as_ref()
            .map(|w| w.withdrawal_hash)
            .unwrap_or_default()
    }
}

/// Action to prove a withdrawal on L1.
pub struct ProveAction<P> {
    provider: P,
    signer: SignerFn,
    action: Prove,
}

impl<P> ProveAction<P>
where
    P: Provider + Clone,
{
    pub fn new(provider: P, signer: SignerFn, action: Prove) -> Self {
        Self {
            provider,
            signer,
            action,
        }
    }

    /// Get the withdrawal hash for this action.
    pub fn withdrawal_hash(&self) -> WithdrawalHash {
        self.action.withdrawal_hash()
    }
}

impl<P> Action for ProveAction<P>
where
    P: Provider + Clone,
{
    async fn submit(&self) -> eyre::Result<TxHash> {
        let call = self.action.validate()?;
        ensure_chain(&self.provider, self.action.settlement_chain_id).await?;

        info!(
            withdrawal_hash = %self.withdrawal_hash(),
            dispute_game_index = %call.dispute_game_index,
            proof_nodes = call.withdrawal_proof.len(),
            "Submitting withdrawal proof to L1"
        );

        let portal = IOptimismPortal::new(self.action.portal_address, &self.provider);
        let tx_request = portal
            .proveWithdrawalTransaction(
                call.withdrawal,
                call.dispute_game_index,
                call.output_root_proof,
                call.withdrawal_proof,
            )
            .into_transaction_request()
            .from(self.action.from);

        let tx_hash = sign_and_send(&self.provider, &self.signer, tx_request).await?;

        info!(
            tx_hash = %tx_hash,
            withdrawal_hash = %self.withdrawal_hash(),
            "Proof transaction sent"
        );

        Ok(tx_hash)
    }

    fn description(&self) -> String {
        format!("Proving withdrawal {} on L1", self.withdrawal_hash())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{mock_signer, MockProvider};
    use alloy_primitives::{address, b256, B256};
    use record::OutputRootPreimage;

    fn prove() -> Prove {
        Prove {
            portal_address: address!("0d83dab629f0e0F9d36c0Cbc89B69a489f0751bD"),
            settlement_chain_id: 11155111,
            withdrawal: Some(WithdrawalDetails {
                nonce: U256::from(1),
                sender: address!("5CFFA347b0aE99cc01E5c01714cA5658e54a23D1"),
                target: address!("5CFFA347b0aE99cc01E5c01714cA5658e54a23D1"),
                value: U256::from(1000000000000000u64), // 0.001 ETH
                gas_limit: U256::from(100000),
                data: Bytes::new(),
                withdrawal_hash: b256!(
                    "1111111111111111111111111111111111111111111111111111111111111111"
                ),
            }),
            game: Some(DisputeGame {
                game_index: 3,
                game_address: address!("00000000000000000000000000000000000000aa"),
                game_type: 1,
                game_l2_block: 1000,
                root_claim: B256::repeat_byte(0xcc),
                timestamp: 1_700_000_000,
            }),
            proof: Some(ProofData {
                withdrawal_proof: vec![Bytes::from_static(&[0xf8]), Bytes::from_static(&[0xe2])],
                output_root_proof: OutputRootPreimage {
                    version: B256::ZERO,
                    state_root: B256::repeat_byte(1),
                    message_passer_storage_root: B256::repeat_byte(2),
                    latest_blockhash: B256::repeat_byte(3),
                },
                storage_slot: B256::repeat_byte(4),
            }),
            from: address!("5CFFA347b0aE99cc01E5c01714cA5658e54a23D1"),
        }
    }

    fn create_test_prove_action() -> ProveAction<MockProvider> {
        ProveAction::new(MockProvider, mock_signer(), prove())
    }

    #[test]
    fn test_prove_action_description() {
        let action = create_test_prove_action();
        let desc = action.description();
        assert!(desc.contains("Proving withdrawal"));
        assert!(desc.contains("1111111111111111111111111111111111111111111111111111111111111111"));
    }

    #[test]
    fn test_validate_builds_call() {
        let call = prove().validate().unwrap();
        assert_eq!(call.dispute_game_index, U256::from(3));
        assert_eq!(call.output_root_proof.stateRoot, B256::repeat_byte(1));
        assert_eq!(call.withdrawal.gasLimit, U256::from(100000));
        assert_eq!(call.withdrawal_proof.len(), 2);
    }

    #[test]
    fn test_validate_names_missing_game() {
        let mut input = prove();
        input.game = None;
        assert_eq!(
            input.validate().unwrap_err().to_string(),
            "Dispute game index is undefined"
        );
    }

    #[test]
    fn test_validate_names_missing_state_root() {
        let mut input = prove();
        input.proof.as_mut().unwrap().output_root_proof.state_root = B256::ZERO;
        assert_eq!(
            input.validate().unwrap_err().to_string(),
            "Output root proof state root is undefined"
        );
    }

    #[test]
    fn test_validate_rejects_empty_proof() {
        let mut input = prove();
        input.proof.as_mut().unwrap().withdrawal_proof.clear();
        assert!(matches!(
            input.validate(),
            Err(WithdrawalError::EmptyProof)
        ));
    }

    #[test]
    fn test_validate_names_empty_proof_node() {
        let mut input = prove();
        input.proof.as_mut().unwrap().withdrawal_proof[1] = Bytes::new();
        assert_eq!(
            input.validate().unwrap_err().to_string(),
            "Withdrawal proof at index 1 is undefined"
        );
    }
}
