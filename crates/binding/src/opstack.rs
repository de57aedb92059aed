//! OP Stack contract bindings.
//!
//! Includes contracts for L2→L1 withdrawals:
//! - L2ToL1MessagePasser (L2 predeploy)
//! - OptimismPortal (L1 contract)
//! - DisputeGameFactory (L1 contract)
//! - FaultDisputeGame (L1 contract, one per output proposal)

use alloy_primitives::{address, Address, B256};
use alloy_sol_types::sol;

/// L2ToL1MessagePasser predeploy, identical on every OP Stack chain.
pub const MESSAGE_PASSER_ADDRESS: Address = address!("4200000000000000000000000000000000000016");

/// Output root version committed by every current proposal.
pub const OUTPUT_VERSION_V0: B256 = B256::ZERO;

sol! {
    /// L2ToL1MessagePasser - L2 predeploy contract for initiating withdrawals
    #[sol(rpc)]
    interface IL2ToL1MessagePasser {
        /// Emitted when a withdrawal is initiated on L2
        event MessagePassed(
            uint256 indexed nonce,
            address indexed sender,
            address indexed target,
            uint256 value,
            uint256 gasLimit,
            bytes data,
            bytes32 withdrawalHash
        );

        /// Initiate a withdrawal from L2 to L1
        function initiateWithdrawal(
            address _target,
            uint256 _gasLimit,
            bytes calldata _data
        ) external payable;
    }

    /// OptimismPortal - L1 contract for withdrawal proving and finalization
    #[sol(rpc)]
    interface IOptimismPortal {
        /// Emitted when a withdrawal is proven on L1
        event WithdrawalProven(
            bytes32 indexed withdrawalHash,
            address indexed from,
            address indexed to
        );

        /// Emitted when a withdrawal is finalized on L1
        event WithdrawalFinalized(
            bytes32 indexed withdrawalHash,
            bool success
        );

        /// Query a proven withdrawal by hash and prover.
        /// A zero timestamp means the withdrawal was never proven by `prover`.
        function provenWithdrawals(bytes32 withdrawalHash, address prover)
            external view returns (bytes32 outputRoot, uint256 timestamp, uint256 l2OutputIndex);

        /// Query if a withdrawal has been finalized
        function finalizedWithdrawals(bytes32 withdrawalHash)
            external view returns (bool);

        /// Delay between proving and finalizing a withdrawal
        function proofMaturityDelaySeconds()
            external view returns (uint256);

        /// Prove a withdrawal transaction (requires merkle proof)
        function proveWithdrawalTransaction(
            WithdrawalTransaction calldata _tx,
            uint256 _disputeGameIndex,
            OutputRootProof calldata _outputRootProof,
            bytes[] calldata _withdrawalProof
        ) external;

        /// Finalize a proven withdrawal transaction
        function finalizeWithdrawalTransaction(
            WithdrawalTransaction calldata _tx
        ) external;
    }

    /// DisputeGameFactory - registry of output proposals
    #[sol(rpc)]
    interface IDisputeGameFactory {
        /// Get the total number of dispute games created
        function gameCount() external view returns (uint256 gameCount_);

        /// Get the game type, creation timestamp and proxy of a dispute game by index
        function gameAtIndex(uint256 _index)
            external view returns (uint8 gameType_, uint64 timestamp_, address proxy_);
    }

    /// IFaultDisputeGame - output proposal subject to bisection challenges
    #[sol(rpc)]
    interface IFaultDisputeGame {
        /// Get the L2 block number this game is disputing
        function l2BlockNumber() external view returns (uint256);

        /// Get the root claim (output root)
        function rootClaim() external view returns (bytes32);

        /// 0 = IN_PROGRESS, 1 = CHALLENGER_WINS, 2 = DEFENDER_WINS
        function status() external view returns (uint8);

        /// Creation timestamp of the game
        function createdAt() external view returns (uint256);

        /// Number of claims in the claim DAG, including the root
        function claimDataLen() external view returns (uint256);

        /// Chess clock granted to each side
        function maxClockDuration() external view returns (uint64);

        /// Resolve a subgame rooted at `_claimIndex`, visiting at most `_numToResolve` children
        function resolveClaim(uint256 _claimIndex, uint256 _numToResolve) external;

        /// Resolve the game once every subgame is resolved
        function resolve() external returns (uint8 status_);
    }

    /// Output root proof structure (used in proving withdrawals)
    #[derive(Debug)]
    struct OutputRootProof {
        bytes32 version;
        bytes32 stateRoot;
        bytes32 messagePasserStorageRoot;
        bytes32 latestBlockhash;
    }

    /// Withdrawal transaction structure (shared across contracts)
    #[derive(Debug)]
    struct WithdrawalTransaction {
        uint256 nonce;
        address sender;
        address target;
        uint256 value;
        uint256 gasLimit;
        bytes data;
    }
}
