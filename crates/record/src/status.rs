//! Withdrawal status and the transitions allowed between statuses.

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Position of a withdrawal in the prove → resolve claims → resolve game →
/// finalize protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WithdrawalStatus {
    Pending,
    L2Confirmed,
    WaitingGame,
    GameFound,
    GeneratingProof,
    ProofGenerated,
    WaitingProofSignature,
    ProofSubmitted,
    ProofConfirmed,
    WaitingResolveSignature,
    ResolvingClaims,
    ClaimsResolved,
    WaitingResolveGameSignature,
    ResolvingGame,
    GameResolved,
    WaitingFinalizeSignature,
    Finalizing,
    Completed,
    Error,
}

impl WithdrawalStatus {
    /// Every status, in protocol order.
    pub const ALL: [Self; 19] = [
        Self::Pending,
        Self::L2Confirmed,
        Self::WaitingGame,
        Self::GameFound,
        Self::GeneratingProof,
        Self::ProofGenerated,
        Self::WaitingProofSignature,
        Self::ProofSubmitted,
        Self::ProofConfirmed,
        Self::WaitingResolveSignature,
        Self::ResolvingClaims,
        Self::ClaimsResolved,
        Self::WaitingResolveGameSignature,
        Self::ResolvingGame,
        Self::GameResolved,
        Self::WaitingFinalizeSignature,
        Self::Finalizing,
        Self::Completed,
        Self::Error,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::L2Confirmed => "l2_confirmed",
            Self::WaitingGame => "waiting_game",
            Self::GameFound => "game_found",
            Self::GeneratingProof => "generating_proof",
            Self::ProofGenerated => "proof_generated",
            Self::WaitingProofSignature => "waiting_proof_signature",
            Self::ProofSubmitted => "proof_submitted",
            Self::ProofConfirmed => "proof_confirmed",
            Self::WaitingResolveSignature => "waiting_resolve_signature",
            Self::ResolvingClaims => "resolving_claims",
            Self::ClaimsResolved => "claims_resolved",
            Self::WaitingResolveGameSignature => "waiting_resolve_game_signature",
            Self::ResolvingGame => "resolving_game",
            Self::GameResolved => "game_resolved",
            Self::WaitingFinalizeSignature => "waiting_finalize_signature",
            Self::Finalizing => "finalizing",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }

    /// `completed` and `error` are never left.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }

    pub const fn is_active(self) -> bool {
        !self.is_terminal()
    }

    /// Next status on the happy path.
    pub const fn successor(self) -> Option<Self> {
        match self {
            Self::Pending => Some(Self::L2Confirmed),
            Self::L2Confirmed => Some(Self::WaitingGame),
            Self::WaitingGame => Some(Self::GameFound),
            Self::GameFound => Some(Self::GeneratingProof),
            Self::GeneratingProof => Some(Self::ProofGenerated),
            Self::ProofGenerated => Some(Self::WaitingProofSignature),
            Self::WaitingProofSignature => Some(Self::ProofSubmitted),
            Self::ProofSubmitted => Some(Self::ProofConfirmed),
            Self::ProofConfirmed => Some(Self::WaitingResolveSignature),
            Self::WaitingResolveSignature => Some(Self::ResolvingClaims),
            Self::ResolvingClaims => Some(Self::ClaimsResolved),
            Self::ClaimsResolved => Some(Self::WaitingResolveGameSignature),
            Self::WaitingResolveGameSignature => Some(Self::ResolvingGame),
            Self::ResolvingGame => Some(Self::GameResolved),
            Self::GameResolved => Some(Self::WaitingFinalizeSignature),
            Self::WaitingFinalizeSignature => Some(Self::Finalizing),
            Self::Finalizing => Some(Self::Completed),
            Self::Completed | Self::Error => None,
        }
    }

    /// Nearest actionable predecessor, entered on rejection or recoverable failure.
    pub const fn rollback_target(self) -> Option<Self> {
        match self {
            Self::GeneratingProof => Some(Self::GameFound),
            Self::WaitingProofSignature | Self::ProofSubmitted => Some(Self::ProofGenerated),
            Self::WaitingResolveSignature | Self::ResolvingClaims => Some(Self::ProofConfirmed),
            Self::WaitingResolveGameSignature | Self::ResolvingGame => {
                Some(Self::ClaimsResolved)
            }
            Self::WaitingFinalizeSignature | Self::Finalizing => Some(Self::GameResolved),
            _ => None,
        }
    }

    /// Skip taken when the chain already shows the step as done.
    pub const fn shortcut(self) -> Option<Self> {
        match self {
            Self::ProofGenerated => Some(Self::ProofConfirmed),
            Self::ProofConfirmed => Some(Self::ClaimsResolved),
            Self::ClaimsResolved => Some(Self::GameResolved),
            Self::GameResolved => Some(Self::Completed),
            _ => None,
        }
    }

    /// Whether `self → next` is an edge of the protocol DAG.
    ///
    /// A self edge is a refresh. Any active status may fail into `error`.
    pub fn can_transition_to(self, next: Self) -> bool {
        if self == next {
            return true;
        }
        if self.is_terminal() {
            return false;
        }
        next == Self::Error
            || self.successor() == Some(next)
            || self.rollback_target() == Some(next)
            || self.shortcut() == Some(next)
    }

    /// The signed transaction this status belongs to, if any.
    pub fn tx_kind(self) -> Option<TxKind> {
        TxKind::ALL.into_iter().find(|kind| {
            kind.ready() == self || kind.waiting() == self || kind.submitted() == self
        })
    }
}

impl fmt::Display for WithdrawalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WithdrawalStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown withdrawal status: {s}"))
    }
}

/// The four user-signed settlement chain transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxKind {
    Proof,
    ResolveClaims,
    ResolveGame,
    Finalize,
}

impl TxKind {
    pub const ALL: [Self; 4] = [
        Self::Proof,
        Self::ResolveClaims,
        Self::ResolveGame,
        Self::Finalize,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Self::Proof => "prove",
            Self::ResolveClaims => "resolve_claims",
            Self::ResolveGame => "resolve_game",
            Self::Finalize => "finalize",
        }
    }

    /// Status in which the user may trigger this transaction.
    pub const fn ready(self) -> WithdrawalStatus {
        match self {
            Self::Proof => WithdrawalStatus::ProofGenerated,
            Self::ResolveClaims => WithdrawalStatus::ProofConfirmed,
            Self::ResolveGame => WithdrawalStatus::ClaimsResolved,
            Self::Finalize => WithdrawalStatus::GameResolved,
        }
    }

    /// Status held while the wallet prompt is open.
    pub const fn waiting(self) -> WithdrawalStatus {
        match self {
            Self::Proof => WithdrawalStatus::WaitingProofSignature,
            Self::ResolveClaims => WithdrawalStatus::WaitingResolveSignature,
            Self::ResolveGame => WithdrawalStatus::WaitingResolveGameSignature,
            Self::Finalize => WithdrawalStatus::WaitingFinalizeSignature,
        }
    }

    /// Status held while the broadcast transaction awaits its receipt.
    pub const fn submitted(self) -> WithdrawalStatus {
        match self {
            Self::Proof => WithdrawalStatus::ProofSubmitted,
            Self::ResolveClaims => WithdrawalStatus::ResolvingClaims,
            Self::ResolveGame => WithdrawalStatus::ResolvingGame,
            Self::Finalize => WithdrawalStatus::Finalizing,
        }
    }

    /// Status entered once the transaction is mined successfully.
    pub const fn confirmed(self) -> WithdrawalStatus {
        match self {
            Self::Proof => WithdrawalStatus::ProofConfirmed,
            Self::ResolveClaims => WithdrawalStatus::ClaimsResolved,
            Self::ResolveGame => WithdrawalStatus::GameResolved,
            Self::Finalize => WithdrawalStatus::Completed,
        }
    }
}

impl fmt::Display for TxKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use WithdrawalStatus::*;

    #[test]
    fn test_happy_path_walks_every_active_status() {
        let mut status = Pending;
        let mut visited = vec![status];
        while let Some(next) = status.successor() {
            assert!(status.can_transition_to(next));
            status = next;
            visited.push(status);
        }
        assert_eq!(status, Completed);
        assert_eq!(visited.len(), 18);
    }

    #[test]
    fn test_rollback_edges_target_starred_states() {
        for kind in TxKind::ALL {
            assert!(kind.waiting().can_transition_to(kind.ready()));
            assert!(kind.submitted().can_transition_to(kind.ready()));
        }
        assert!(GeneratingProof.can_transition_to(GameFound));
    }

    #[test]
    fn test_backwards_jumps_are_rejected() {
        assert!(!ProofConfirmed.can_transition_to(ProofGenerated));
        assert!(!GameResolved.can_transition_to(Pending));
        assert!(!WaitingGame.can_transition_to(L2Confirmed));
        assert!(!Pending.can_transition_to(GameFound));
    }

    #[test]
    fn test_terminal_states_are_never_left() {
        for next in WithdrawalStatus::ALL {
            if next != Completed {
                assert!(!Completed.can_transition_to(next), "completed -> {next}");
            }
            if next != Error {
                assert!(!Error.can_transition_to(next), "error -> {next}");
            }
        }
    }

    #[test]
    fn test_every_active_status_may_fail() {
        for status in WithdrawalStatus::ALL.into_iter().filter(|s| s.is_active()) {
            assert!(status.can_transition_to(Error));
        }
    }

    #[test]
    fn test_shortcuts_skip_the_wallet() {
        assert!(ProofGenerated.can_transition_to(ProofConfirmed));
        assert!(GameResolved.can_transition_to(Completed));
        assert!(!ProofGenerated.can_transition_to(ClaimsResolved));
    }

    #[test]
    fn test_serde_names_match_display() {
        for status in WithdrawalStatus::ALL {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{status}\""));
            assert_eq!(status.as_str().parse::<WithdrawalStatus>().unwrap(), status);
        }
    }

    #[test]
    fn test_tx_kind_of_status() {
        assert_eq!(ProofGenerated.tx_kind(), Some(TxKind::Proof));
        assert_eq!(ResolvingClaims.tx_kind(), Some(TxKind::ResolveClaims));
        assert_eq!(WaitingFinalizeSignature.tx_kind(), Some(TxKind::Finalize));
        assert_eq!(GameFound.tx_kind(), None);
        assert_eq!(Completed.tx_kind(), None);
    }
}
