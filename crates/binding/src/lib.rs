//! Contract bindings for the withdrawal pipeline.
//!
//! Interfaces used to move a withdrawal from the rollup to the settlement chain:
//! - L2ToL1MessagePasser (rollup predeploy that emits `MessagePassed`)
//! - OptimismPortal (settlement chain prove / finalize entry points)
//! - DisputeGameFactory and FaultDisputeGame (output proposals and their resolution)
//!
//! All bindings are generated using alloy's `sol!` macro.

pub mod opstack;
