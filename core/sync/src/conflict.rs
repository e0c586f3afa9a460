//! Last-write-wins conflict resolution.
//!
//! The only conflict rule between the two stores: the copy with the strictly
//! greater timestamp wins, and a tie keeps the local copy.

use serde::{Deserialize, Serialize};

/// What a pull does with one remote record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Resolution {
    /// No local record: materialize the remote one.
    CreateLocal,
    /// Remote is strictly newer: overwrite local nivel and timestamp.
    OverwriteLocal,
    /// Local is newer or equally new.
    KeepLocal,
}

/// Decide how a remote record applies to the local store.
///
/// `local_last_modified` is `None` when the record does not exist locally.
pub fn resolve(local_last_modified: Option<i64>, remote_timestamp: i64) -> Resolution {
    match local_last_modified {
        None => Resolution::CreateLocal,
        Some(local) if remote_timestamp > local => Resolution::OverwriteLocal,
        Some(_) => Resolution::KeepLocal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_newer_remote_wins() {
        assert_eq!(resolve(Some(100), 200), Resolution::OverwriteLocal);
    }

    #[test]
    fn test_tie_keeps_local() {
        assert_eq!(resolve(Some(100), 100), Resolution::KeepLocal);
    }

    #[test]
    fn test_stale_remote_ignored() {
        assert_eq!(resolve(Some(100), 50), Resolution::KeepLocal);
    }

    #[test]
    fn test_missing_local_is_created() {
        assert_eq!(resolve(None, 0), Resolution::CreateLocal);
    }

    proptest! {
        #[test]
        fn overwrite_iff_strictly_newer(local in any::<i64>(), remote in any::<i64>()) {
            let overwrite = resolve(Some(local), remote) == Resolution::OverwriteLocal;
            prop_assert_eq!(overwrite, remote > local);
        }

        #[test]
        fn resolution_is_stable_after_apply(local in any::<i64>(), remote in any::<i64>()) {
            // After applying the decision the local timestamp is the max of
            // the two, and resolving again never overwrites.
            let applied = match resolve(Some(local), remote) {
                Resolution::OverwriteLocal => remote,
                _ => local,
            };
            prop_assert_eq!(resolve(Some(applied), remote), Resolution::KeepLocal);
        }
    }
}
