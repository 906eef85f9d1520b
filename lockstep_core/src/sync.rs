//! Sync-hash comparison across clients for a given frame.

use std::collections::HashMap;

use tracing::error;

use crate::error::LockstepError;
use crate::net::NetFrame;

/// A collaborator that dumps a diagnostic snapshot when [`SyncChecker`]
/// detects divergence, and (optionally) captures a per-frame snapshot for
/// later off-band comparison with other clients' reports.
pub trait SyncReport {
    /// Called once, with the mismatching packet bytes, when `check` detects
    /// an out-of-sync frame.
    fn dump_mismatch(&mut self, frame: NetFrame, first: &[u8], second: &[u8]);

    /// Called at the end of `process_orders` for frames selected for sync
    /// reporting (see `OrderManager::process_orders`).
    fn capture_snapshot(&mut self, frame: NetFrame) {
        let _ = frame;
    }
}

/// A [`SyncReport`] that only logs; used when sync reporting is disabled
/// but a collaborator is still required structurally.
#[derive(Debug, Default)]
pub struct NullSyncReport;

impl SyncReport for NullSyncReport {
    fn dump_mismatch(&mut self, frame: NetFrame, first: &[u8], second: &[u8]) {
        error!(frame, first = ?first, second = ?second, "sync mismatch (reporting disabled)");
    }
}

/// `Map<NetFrame, SyncHashPacket>`.
///
/// Invariant: the first sync packet observed for a frame is stored; any
/// subsequent sync packet for the same frame must be byte-identical, else
/// `check` raises [`LockstepError::OutOfSync`].
#[derive(Debug, Default)]
pub struct SyncChecker {
    seen: HashMap<NetFrame, Vec<u8>>,
}

impl SyncChecker {
    pub fn new() -> Self {
        Self::default()
    }

    /// `packet` is a full sync packet body (`frame:u32 | tag:u8 | hash:u32`).
    pub fn check(
        &mut self,
        frame: NetFrame,
        packet: &[u8],
        report: &mut dyn SyncReport,
    ) -> Result<(), LockstepError> {
        match self.seen.get(&frame) {
            None => {
                self.seen.insert(frame, packet.to_vec());
                Ok(())
            }
            Some(first) if first.as_slice() == packet => Ok(()),
            Some(first) => {
                report.dump_mismatch(frame, first, packet);
                Err(LockstepError::OutOfSync {
                    frame,
                    detail: "sync hash mismatch with a previously observed packet".to_string(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::encode_sync;

    #[test]
    fn sync_check_matches_then_mismatches() {
        let mut checker = SyncChecker::new();
        let mut report = NullSyncReport;

        let p1 = encode_sync(42, 0xDEADBEEF);
        checker.check(42, &p1, &mut report).unwrap();

        let p2 = encode_sync(42, 0xDEADBEEF);
        checker.check(42, &p2, &mut report).unwrap();

        let p3 = encode_sync(42, 0xDEADBEF0);
        let err = checker.check(42, &p3, &mut report).unwrap_err();
        match err {
            LockstepError::OutOfSync { frame, .. } => assert_eq!(frame, 42),
            other => panic!("expected OutOfSync, got {other:?}"),
        }
    }

    #[test]
    fn invariant_append_once_length_mismatch_is_fatal() {
        let mut checker = SyncChecker::new();
        let mut report = NullSyncReport;
        checker.check(1, &[1, 2, 3], &mut report).unwrap();
        let err = checker.check(1, &[1, 2, 3, 4], &mut report).unwrap_err();
        assert!(matches!(err, LockstepError::OutOfSync { frame: 1, .. }));
    }

    #[test]
    fn independent_frames_dont_interfere() {
        let mut checker = SyncChecker::new();
        let mut report = NullSyncReport;
        checker.check(1, &encode_sync(1, 10), &mut report).unwrap();
        checker.check(2, &encode_sync(2, 20), &mut report).unwrap();
    }
}
