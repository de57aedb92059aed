//! Proof generation for L2→L1 withdrawals.
//!
//! Produces the storage proof of the withdrawal's `sentMessages` slot and the
//! output root preimage the portal checks against the dispute game's claim.

use crate::{
    error::WithdrawalError,
    hash::{compute_storage_slot, hash_output_root},
    types::WithdrawalHash,
};
use alloy_primitives::{Address, Bytes, B256};
use alloy_provider::Provider;
use alloy_rpc_types_eth::BlockNumberOrTag;
use async_trait::async_trait;
use binding::opstack::OUTPUT_VERSION_V0;
use record::{DisputeGame, OutputRootPreimage, ProofData};
use std::time::Duration;
use tokio_retry::{strategy::FixedInterval, Retry};
use tracing::{debug, info, warn};

/// `eth_getProof` result for the message passer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageProof {
    pub block: u64,
    pub storage_hash: B256,
    pub proof: Vec<Bytes>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    pub number: u64,
    pub state_root: B256,
    pub hash: B256,
}

/// Rollup state reads needed to build a proof.
#[async_trait]
pub trait StateSource: Send + Sync {
    async fn latest_block_number(&self) -> eyre::Result<u64>;

    async fn storage_proof(&self, slot: B256, block: u64) -> eyre::Result<StorageProof>;

    /// `None` when the node does not have the block.
    async fn block_header(&self, block: u64) -> eyre::Result<Option<BlockHeader>>;
}

/// [`StateSource`] backed by an L2 RPC provider.
pub struct ProviderState<P> {
    provider: P,
    message_passer: Address,
}

impl<P> ProviderState<P> {
    pub const fn new(provider: P, message_passer: Address) -> Self {
        Self {
            provider,
            message_passer,
        }
    }
}

#[async_trait]
impl<P> StateSource for ProviderState<P>
where
    P: Provider + Clone,
{
    async fn latest_block_number(&self) -> eyre::Result<u64> {
        Ok(self.provider.get_block_number().await?)
    }

    async fn storage_proof(&self, slot: B256, block: u64) -> eyre::Result<StorageProof> {
        let response = self
            .provider
            .get_proof(self.message_passer, vec![slot])
            .block_id(BlockNumberOrTag::Number(block).into())
            .await?;

        let proof = response
            .storage_proof
            .into_iter()
            .next()
            .map(|p| p.proof)
            .unwrap_or_default();

        Ok(StorageProof {
            block,
            storage_hash: response.storage_hash,
            proof,
        })
    }

    async fn block_header(&self, block: u64) -> eyre::Result<Option<BlockHeader>> {
        let block = self
            .provider
            .get_block_by_number(BlockNumberOrTag::Number(block))
            .await?;

        Ok(block.map(|b| BlockHeader {
            number: b.header.number,
            state_root: b.header.state_root,
            hash: b.header.hash,
        }))
    }
}

/// The three preimages tried against a game's root claim, in order.
pub fn candidates(
    proof_block: &BlockHeader,
    game_block: &BlockHeader,
    storage_root: B256,
) -> [OutputRootPreimage; 3] {
    let preimage = |state_root, latest_blockhash| OutputRootPreimage {
        version: OUTPUT_VERSION_V0,
        state_root,
        message_passer_storage_root: storage_root,
        latest_blockhash,
    };

    [
        preimage(game_block.state_root, game_block.hash),
        preimage(proof_block.state_root, game_block.hash),
        preimage(proof_block.state_root, proof_block.hash),
    ]
}

/// Pick the candidate hashing to `root_claim`.
///
/// Falls back to the first candidate when none matches. The flag reports
/// whether the returned preimage actually matched.
pub fn select_output_root(
    candidates: [OutputRootPreimage; 3],
    root_claim: B256,
) -> (OutputRootPreimage, bool) {
    match candidates
        .iter()
        .position(|c| hash_output_root(c) == root_claim)
    {
        Some(index) => (candidates[index].clone(), true),
        None => {
            warn!(
                %root_claim,
                "No output root candidate matches the game claim, using first candidate"
            );
            (candidates[0].clone(), false)
        }
    }
}

pub struct ProofGenerator<S> {
    source: S,
    attempts: usize,
    backoff: Duration,
}

impl<S> ProofGenerator<S>
where
    S: StateSource,
{
    pub const fn new(source: S, attempts: usize, backoff: Duration) -> Self {
        Self {
            source,
            attempts,
            backoff,
        }
    }

    /// Build the proof bundle for `withdrawal_hash` against `game`.
    ///
    /// The storage proof is always taken at the latest L2 block, since nodes
    /// may already have pruned the state of the withdrawal or game block.
    pub async fn generate(
        &self,
        withdrawal_hash: WithdrawalHash,
        game: &DisputeGame,
    ) -> eyre::Result<ProofData> {
        let storage_slot = compute_storage_slot(withdrawal_hash);

        let strategy = FixedInterval::new(self.backoff).take(self.attempts.saturating_sub(1));
        let storage = Retry::spawn(strategy, || async {
            let latest = self.source.latest_block_number().await?;
            self.source
                .storage_proof(storage_slot, latest)
                .await
                .inspect_err(|e| warn!(block = latest, error = %e, "Storage proof failed, will retry"))
        })
        .await
        .map_err(|e| WithdrawalError::ProofWindow {
            attempts: self.attempts,
            reason: e.to_string(),
        })?;

        if storage.proof.is_empty() {
            return Err(WithdrawalError::EmptyProof.into());
        }
        if storage.storage_hash.is_zero() {
            return Err(WithdrawalError::missing("Message passer storage root").into());
        }

        debug!(
            block = storage.block,
            proof_nodes = storage.proof.len(),
            "Generated storage proof"
        );

        let proof_header = self
            .source
            .block_header(storage.block)
            .await?
            .ok_or_else(|| WithdrawalError::missing(format!("Block {} header", storage.block)))?;
        check_header(&proof_header)?;

        let game_header = match self.source.block_header(game.game_l2_block).await {
            Ok(Some(header)) => {
                check_header(&header)?;
                header
            }
            Ok(None) => {
                warn!(
                    block = game.game_l2_block,
                    "Game block header unavailable, using proof block"
                );
                proof_header
            }
            Err(e) => {
                warn!(
                    block = game.game_l2_block,
                    error = %e,
                    "Failed to fetch game block header, using proof block"
                );
                proof_header
            }
        };

        let (output_root_proof, matched) = select_output_root(
            candidates(&proof_header, &game_header, storage.storage_hash),
            game.root_claim,
        );

        info!(
            %withdrawal_hash,
            game_index = game.game_index,
            proof_block = storage.block,
            matched,
            "Generated withdrawal proof"
        );

        Ok(ProofData {
            withdrawal_proof: storage.proof,
            output_root_proof,
            storage_slot,
        })
    }
}

fn check_header(header: &BlockHeader) -> Result<(), WithdrawalError> {
    if header.state_root.is_zero() {
        return Err(WithdrawalError::missing(format!(
            "Block {} state root",
            header.number
        )));
    }
    if header.hash.is_zero() {
        return Err(WithdrawalError::missing(format!(
            "Block {} hash",
            header.number
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        collections::{HashMap, HashSet},
        sync::{
            atomic::{AtomicUsize, Ordering},
            Mutex,
        },
    };

    const LATEST: u64 = 5_000;
    const GAME_BLOCK: u64 = 1_000;

    struct ScriptedState {
        latest: u64,
        headers: HashMap<u64, BlockHeader>,
        /// Blocks whose header request errors
        broken_headers: HashSet<u64>,
        proof: Vec<Bytes>,
        failures: AtomicUsize,
        proof_blocks: Mutex<Vec<u64>>,
    }

    impl ScriptedState {
        fn new() -> Self {
            let headers = [LATEST, GAME_BLOCK]
                .into_iter()
                .map(|n| (n, header(n)))
                .collect();
            Self {
                latest: LATEST,
                headers,
                broken_headers: HashSet::new(),
                proof: vec![Bytes::from_static(&[0xf8, 0x51]), Bytes::from_static(&[0xe2])],
                failures: AtomicUsize::new(0),
                proof_blocks: Mutex::new(Vec::new()),
            }
        }

        fn failing(self, n: usize) -> Self {
            self.failures.store(n, Ordering::SeqCst);
            self
        }
    }

    #[async_trait]
    impl StateSource for ScriptedState {
        async fn latest_block_number(&self) -> eyre::Result<u64> {
            Ok(self.latest)
        }

        async fn storage_proof(&self, _slot: B256, block: u64) -> eyre::Result<StorageProof> {
            self.proof_blocks.lock().unwrap().push(block);
            if self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                eyre::bail!("missing trie node");
            }
            Ok(StorageProof {
                block,
                storage_hash: storage_root(),
                proof: self.proof.clone(),
            })
        }

        async fn block_header(&self, block: u64) -> eyre::Result<Option<BlockHeader>> {
            if self.broken_headers.contains(&block) {
                eyre::bail!("header not found for block {block}");
            }
            Ok(self.headers.get(&block).copied())
        }
    }

    fn header(number: u64) -> BlockHeader {
        BlockHeader {
            number,
            state_root: B256::left_padding_from(&number.to_be_bytes()),
            hash: B256::repeat_byte((number % 251) as u8 + 1),
        }
    }

    fn storage_root() -> B256 {
        B256::repeat_byte(0x5a)
    }

    fn game(root_claim: B256) -> DisputeGame {
        DisputeGame {
            game_index: 3,
            game_address: Address::repeat_byte(0x0d),
            game_type: 1,
            game_l2_block: GAME_BLOCK,
            root_claim,
            timestamp: 1_700_000_000,
        }
    }

    fn generator(state: ScriptedState) -> ProofGenerator<ScriptedState> {
        ProofGenerator::new(state, 3, Duration::from_secs(3))
    }

    #[test]
    fn test_selects_matching_candidate() {
        let all = candidates(&header(LATEST), &header(GAME_BLOCK), storage_root());
        let claim = hash_output_root(&all[1]);

        let (selected, matched) = select_output_root(all.clone(), claim);

        assert!(matched);
        assert_eq!(selected, all[1]);
        assert_eq!(selected.state_root, header(LATEST).state_root);
        assert_eq!(selected.latest_blockhash, header(GAME_BLOCK).hash);
    }

    #[test]
    fn test_falls_back_to_first_candidate() {
        let all = candidates(&header(LATEST), &header(GAME_BLOCK), storage_root());

        let (selected, matched) = select_output_root(all.clone(), B256::repeat_byte(0xee));

        assert!(!matched);
        assert_eq!(selected, all[0]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_proof_taken_at_latest_block() {
        let expected = candidates(&header(LATEST), &header(GAME_BLOCK), storage_root())[0].clone();
        let generator = generator(ScriptedState::new());

        let proof = generator
            .generate(B256::repeat_byte(0xbb), &game(hash_output_root(&expected)))
            .await
            .unwrap();

        assert_eq!(*generator.source.proof_blocks.lock().unwrap(), vec![LATEST]);
        assert_eq!(proof.output_root_proof, expected);
        assert_eq!(proof.storage_slot, compute_storage_slot(B256::repeat_byte(0xbb)));
        assert_eq!(proof.withdrawal_proof.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_storage_proof() {
        let generator = generator(ScriptedState::new().failing(2));

        generator.generate(B256::repeat_byte(0xbb), &game(B256::ZERO)).await.unwrap();

        assert_eq!(generator.source.proof_blocks.lock().unwrap().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_close_the_window() {
        let generator = generator(ScriptedState::new().failing(3));

        let err = generator
            .generate(B256::repeat_byte(0xbb), &game(B256::ZERO))
            .await
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<WithdrawalError>(),
            Some(WithdrawalError::ProofWindow { attempts: 3, .. })
        ));
        assert!(err.to_string().contains("missing trie node"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_proof_is_fatal() {
        let mut state = ScriptedState::new();
        state.proof.clear();

        let err = generator(state)
            .generate(B256::repeat_byte(0xbb), &game(B256::ZERO))
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "Withdrawal proof array is empty");
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_proof_block_header() {
        let mut state = ScriptedState::new();
        state.headers.remove(&LATEST);

        let err = generator(state)
            .generate(B256::repeat_byte(0xbb), &game(B256::ZERO))
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "Block 5000 header is undefined");
    }

    #[tokio::test(start_paused = true)]
    async fn test_game_header_falls_back_to_proof_block() {
        let mut state = ScriptedState::new();
        state.headers.remove(&GAME_BLOCK);

        let proof = generator(state)
            .generate(B256::repeat_byte(0xbb), &game(B256::ZERO))
            .await
            .unwrap();

        assert_eq!(proof.output_root_proof.state_root, header(LATEST).state_root);
        assert_eq!(proof.output_root_proof.latest_blockhash, header(LATEST).hash);
    }

    #[tokio::test(start_paused = true)]
    async fn test_game_header_error_falls_back_to_proof_block() {
        let mut state = ScriptedState::new();
        state.broken_headers.insert(GAME_BLOCK);
        let expected = candidates(&header(LATEST), &header(LATEST), storage_root())[0].clone();

        let proof = generator(state)
            .generate(B256::repeat_byte(0xbb), &game(hash_output_root(&expected)))
            .await
            .unwrap();

        assert_eq!(proof.output_root_proof, expected);
        assert_eq!(proof.output_root_proof.latest_blockhash, header(LATEST).hash);
    }

    #[tokio::test(start_paused = true)]
    async fn test_proof_block_header_error_is_fatal() {
        let mut state = ScriptedState::new();
        state.broken_headers.insert(LATEST);

        let err = generator(state)
            .generate(B256::repeat_byte(0xbb), &game(B256::ZERO))
            .await
            .unwrap_err();

        assert!(err.to_string().contains("header not found for block 5000"));
    }
}
