//! Per-record, per-step concurrency tokens.

use record::TxKind;
use std::{
    collections::HashSet,
    fmt,
    sync::{Arc, Mutex, PoisonError},
};

/// Unit of work that must not run twice at once for the same record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    Extract,
    Locate,
    Generate,
    /// Wallet prompt and broadcast.
    Submit(TxKind),
    /// Receipt watch.
    Confirm(TxKind),
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Extract => f.write_str("extract"),
            Self::Locate => f.write_str("locate"),
            Self::Generate => f.write_str("generate"),
            Self::Submit(kind) => write!(f, "submit_{kind}"),
            Self::Confirm(kind) => write!(f, "confirm_{kind}"),
        }
    }
}

type Key = (String, Step);

#[derive(Debug, Clone, Default)]
pub struct InFlight {
    running: Arc<Mutex<HashSet<Key>>>,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test-and-set the token for `(id, step)`.
    ///
    /// The token is released when the returned guard drops, on success and
    /// failure paths alike.
    pub fn try_acquire(&self, id: &str, step: Step) -> Option<InFlightGuard> {
        let key = (id.to_string(), step);
        let inserted = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.clone());

        inserted.then(|| InFlightGuard {
            running: Arc::clone(&self.running),
            key,
        })
    }

    pub fn is_running(&self, id: &str, step: Step) -> bool {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&(id.to_string(), step))
    }
}

#[must_use = "the token is released as soon as the guard drops"]
pub struct InFlightGuard {
    running: Arc<Mutex<HashSet<Key>>>,
    key: Key,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_fails_until_drop() {
        let inflight = InFlight::new();
        let guard = inflight.try_acquire("0xaa", Step::Confirm(TxKind::Proof));
        assert!(guard.is_some());
        assert!(inflight.try_acquire("0xaa", Step::Confirm(TxKind::Proof)).is_none());

        // Other steps and other records are independent
        assert!(inflight.try_acquire("0xaa", Step::Submit(TxKind::Proof)).is_some());
        assert!(inflight.try_acquire("0xbb", Step::Confirm(TxKind::Proof)).is_some());

        drop(guard);
        assert!(!inflight.is_running("0xaa", Step::Confirm(TxKind::Proof)));
        assert!(inflight.try_acquire("0xaa", Step::Confirm(TxKind::Proof)).is_some());
    }

    #[test]
    fn test_step_names() {
        assert_eq!(Step::Locate.to_string(), "locate");
        assert_eq!(Step::Submit(TxKind::ResolveGame).to_string(), "submit_resolve_game");
    }
}
