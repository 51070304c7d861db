/**
 * Version Clock
 *
 * Three-part document version `service.snapshot.log`. The service
 * component is fixed per deployment; the snapshot component counts cut
 * snapshots and resets the log component; the log component counts
 * persisted operations since the last snapshot.
 */
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// A document version. Ordering is lexicographic on
/// `(service, snapshot, log)`, which the derived impls provide.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct Version {
    pub service: u64,
    pub snapshot: u64,
    pub log: u64,
}

impl Version {
    /// Initial version for a fresh document under the configured service
    /// component.
    pub fn initial(service: u64) -> Self {
        Self {
            service,
            snapshot: 0,
            log: 0,
        }
    }

    /// Three-way comparison, kept alongside `Ord` because callers that
    /// gate writes read better against an explicit `Ordering`.
    pub fn compare(&self, other: &Version) -> Ordering {
        self.cmp(other)
    }

    /// One more persisted operation.
    pub fn bump_log(&mut self) {
        self.log += 1;
    }

    /// A snapshot was cut: advance the snapshot component and reset the
    /// operation counter.
    pub fn bump_snapshot(&mut self) {
        self.snapshot += 1;
        self.log = 0;
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.service, self.snapshot, self.log)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial() {
        let v = Version::initial(3);
        assert_eq!(v.to_string(), "3.0.0");
    }

    #[test]
    fn test_compare_is_lexicographic() {
        let base = Version {
            service: 1,
            snapshot: 2,
            log: 3,
        };
        assert_eq!(base.compare(&base), Ordering::Equal);
        assert_eq!(
            base.compare(&Version {
                service: 1,
                snapshot: 2,
                log: 4
            }),
            Ordering::Less
        );
        assert_eq!(
            base.compare(&Version {
                service: 1,
                snapshot: 3,
                log: 0
            }),
            Ordering::Less
        );
        assert_eq!(
            base.compare(&Version {
                service: 2,
                snapshot: 0,
                log: 0
            }),
            Ordering::Less
        );
        assert_eq!(
            base.compare(&Version {
                service: 1,
                snapshot: 1,
                log: 99
            }),
            Ordering::Greater
        );
    }

    #[test]
    fn test_bump_log() {
        let mut v = Version::initial(1);
        v.bump_log();
        v.bump_log();
        assert_eq!(v.to_string(), "1.0.2");
    }

    #[test]
    fn test_bump_snapshot_resets_log() {
        let mut v = Version {
            service: 1,
            snapshot: 0,
            log: 17,
        };
        v.bump_snapshot();
        assert_eq!(v.to_string(), "1.1.0");
    }
}
