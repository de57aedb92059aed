//! The persisted withdrawal record.
//!
//! Field names serialize in camelCase so the collection stays readable by any
//! collaborator that already consumes the tracker's JSON shape.

use crate::status::{TxKind, WithdrawalStatus};
use alloy_primitives::{Address, Bytes, TxHash, B256, U256};
use binding::opstack::{OutputRootProof, WithdrawalTransaction};
use serde::{Deserialize, Serialize};
use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::{SystemTime, UNIX_EPOCH},
};

/// Prefix of ids given to records created before the L2 hash is known.
pub const PLACEHOLDER_PREFIX: &str = "pending_";

static PLACEHOLDER_SEQ: AtomicU64 = AtomicU64::new(0);

/// Milliseconds since the unix epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or_default()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    #[default]
    Withdrawal,
    Deposit,
}

/// Canonical withdrawal descriptor decoded from `MessagePassed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawalDetails {
    pub nonce: U256,
    pub sender: Address,
    pub target: Address,
    pub value: U256,
    pub gas_limit: U256,
    pub data: Bytes,
    pub withdrawal_hash: B256,
}

impl WithdrawalDetails {
    pub fn from_transaction(tx: &WithdrawalTransaction, withdrawal_hash: B256) -> Self {
        Self {
            nonce: tx.nonce,
            sender: tx.sender,
            target: tx.target,
            value: tx.value,
            gas_limit: tx.gasLimit,
            data: tx.data.clone(),
            withdrawal_hash,
        }
    }

    /// The tuple accepted by the portal.
    pub fn transaction(&self) -> WithdrawalTransaction {
        WithdrawalTransaction {
            nonce: self.nonce,
            sender: self.sender,
            target: self.target,
            value: self.value,
            gasLimit: self.gas_limit,
            data: self.data.clone(),
        }
    }
}

/// Dispute game accepted as covering the withdrawal's L2 block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisputeGame {
    pub game_index: u64,
    pub game_address: Address,
    pub game_type: u8,
    pub game_l2_block: u64,
    pub root_claim: B256,
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputRootPreimage {
    pub version: B256,
    pub state_root: B256,
    pub message_passer_storage_root: B256,
    pub latest_blockhash: B256,
}

impl OutputRootPreimage {
    pub const fn proof(&self) -> OutputRootProof {
        OutputRootProof {
            version: self.version,
            stateRoot: self.state_root,
            messagePasserStorageRoot: self.message_passer_storage_root,
            latestBlockhash: self.latest_blockhash,
        }
    }
}

/// Everything the portal needs besides the withdrawal tuple and game index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofData {
    pub withdrawal_proof: Vec<Bytes>,
    pub output_root_proof: OutputRootPreimage,
    pub storage_slot: B256,
}

/// Metadata fixed at creation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordMeta {
    pub kind: RecordKind,
    pub amount: String,
    pub token: String,
    pub from_address: Address,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawalRecord {
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: RecordKind,
    pub status: WithdrawalStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub l2_tx_hash: Option<TxHash>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub l1_proof_tx_hash: Option<TxHash>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub l1_resolve_claims_tx_hash: Option<TxHash>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub l1_resolve_game_tx_hash: Option<TxHash>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub l1_finalize_tx_hash: Option<TxHash>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub withdrawal_details: Option<WithdrawalDetails>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dispute_game: Option<DisputeGame>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proof_data: Option<ProofData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub l2_block_number: Option<u64>,

    #[serde(default)]
    pub amount: String,
    #[serde(default)]
    pub token: String,
    pub from_address: Address,

    pub created_at: u64,
    pub updated_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_resolved_at: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl WithdrawalRecord {
    fn with_id(id: String, l2_tx_hash: Option<TxHash>, meta: RecordMeta) -> Self {
        let now = now_ms();
        Self {
            id,
            kind: meta.kind,
            status: WithdrawalStatus::Pending,
            l2_tx_hash,
            l1_proof_tx_hash: None,
            l1_resolve_claims_tx_hash: None,
            l1_resolve_game_tx_hash: None,
            l1_finalize_tx_hash: None,
            withdrawal_details: None,
            dispute_game: None,
            proof_data: None,
            l2_block_number: None,
            amount: meta.amount,
            token: meta.token,
            from_address: meta.from_address,
            created_at: now,
            updated_at: now,
            completed_at: None,
            game_resolved_at: None,
            error_message: None,
        }
    }

    /// Record keyed by its L2 transaction hash.
    pub fn new(l2_tx_hash: TxHash, meta: RecordMeta) -> Self {
        Self::with_id(l2_tx_hash.to_string(), Some(l2_tx_hash), meta)
    }

    /// Record created the instant the user signs, before the hash is known.
    pub fn placeholder(meta: RecordMeta) -> Self {
        let seq = PLACEHOLDER_SEQ.fetch_add(1, Ordering::Relaxed);
        let id = format!("{PLACEHOLDER_PREFIX}{}_{seq}", now_ms());
        Self::with_id(id, None, meta)
    }

    pub fn is_placeholder(&self) -> bool {
        self.l2_tx_hash.is_none() && self.id.starts_with(PLACEHOLDER_PREFIX)
    }

    pub fn meta(&self) -> RecordMeta {
        RecordMeta {
            kind: self.kind,
            amount: self.amount.clone(),
            token: self.token.clone(),
            from_address: self.from_address,
        }
    }

    pub fn withdrawal_hash(&self) -> Option<B256> {
        self.withdrawal_details.as_ref().map(|d| d.withdrawal_hash)
    }

    pub const fn tx_hash(&self, kind: TxKind) -> Option<TxHash> {
        match kind {
            TxKind::Proof => self.l1_proof_tx_hash,
            TxKind::ResolveClaims => self.l1_resolve_claims_tx_hash,
            TxKind::ResolveGame => self.l1_resolve_game_tx_hash,
            TxKind::Finalize => self.l1_finalize_tx_hash,
        }
    }

    pub(crate) fn tx_hash_mut(&mut self, kind: TxKind) -> &mut Option<TxHash> {
        match kind {
            TxKind::Proof => &mut self.l1_proof_tx_hash,
            TxKind::ResolveClaims => &mut self.l1_resolve_claims_tx_hash,
            TxKind::ResolveGame => &mut self.l1_resolve_game_tx_hash,
            TxKind::Finalize => &mut self.l1_finalize_tx_hash,
        }
    }
}

/// A partial update applied through [`crate::RecordStore::update`].
///
/// `None` leaves a field untouched. Write-once fields may be set again only
/// with an identical value.
#[derive(Debug, Clone, Default)]
pub struct RecordPatch {
    /// Apply only if the record is still in this status.
    pub expect: Option<WithdrawalStatus>,
    pub status: Option<WithdrawalStatus>,
    /// `Some(None)` clears the message.
    pub error_message: Option<Option<String>>,
    pub withdrawal_details: Option<WithdrawalDetails>,
    pub dispute_game: Option<DisputeGame>,
    pub proof_data: Option<ProofData>,
    pub l2_block_number: Option<u64>,
    pub tx_hash: Option<(TxKind, TxHash)>,
    /// Forget the hash of a reverted transaction so the retry can record its own.
    pub discard_tx: Option<TxKind>,
    pub completed_at: Option<u64>,
    pub game_resolved_at: Option<u64>,
}

impl RecordPatch {
    pub fn status(status: WithdrawalStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub const fn expecting(mut self, status: WithdrawalStatus) -> Self {
        self.expect = Some(status);
        self
    }

    pub fn error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(Some(message.into()));
        self
    }

    pub fn clear_error(mut self) -> Self {
        self.error_message = Some(None);
        self
    }

    pub fn details(mut self, details: WithdrawalDetails) -> Self {
        self.withdrawal_details = Some(details);
        self
    }

    pub fn game(mut self, game: DisputeGame) -> Self {
        self.dispute_game = Some(game);
        self
    }

    pub fn proof(mut self, proof: ProofData) -> Self {
        self.proof_data = Some(proof);
        self
    }

    pub const fn l2_block(mut self, block: u64) -> Self {
        self.l2_block_number = Some(block);
        self
    }

    pub const fn tx(mut self, kind: TxKind, hash: TxHash) -> Self {
        self.tx_hash = Some((kind, hash));
        self
    }

    pub const fn discard_tx(mut self, kind: TxKind) -> Self {
        self.discard_tx = Some(kind);
        self
    }

    pub const fn completed_at(mut self, at: u64) -> Self {
        self.completed_at = Some(at);
        self
    }

    pub const fn game_resolved_at(mut self, at: u64) -> Self {
        self.game_resolved_at = Some(at);
        self
    }
}
