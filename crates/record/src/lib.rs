//! Withdrawal records and their store.
//!
//! A [`WithdrawalRecord`] is the only persisted entity of the pipeline. The
//! [`RecordStore`] owns every record, validates status transitions against the
//! protocol DAG, persists the collection through a [`Persistence`] backend and
//! broadcasts a [`StoreEvent`] after each mutation.

pub mod persist;
pub mod status;
pub mod store;
pub mod types;

pub use persist::{
    JsonFile, MemoryPersistence, Persistence, PersistenceError, Revision, DEFAULT_NAMESPACE,
};
pub use status::{TxKind, WithdrawalStatus};
pub use store::{RecordStore, StoreError, StoreEvent};
pub use types::{
    now_ms, DisputeGame, OutputRootPreimage, ProofData, RecordKind, RecordMeta, RecordPatch,
    WithdrawalDetails, WithdrawalRecord,
};
