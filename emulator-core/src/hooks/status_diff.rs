//! Register snapshot-and-diff, queried on every trace event (spec §3,
//! "StatusDiff").

use emulator_abi::Register;
use std::collections::HashMap;

/// One changed register between two snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterChange {
    pub reg: Register,
    pub old: u64,
    pub new: u64,
}

/// Tracks the last-observed value of a fixed set of registers and reports
/// what changed since the previous query.
#[derive(Debug, Default)]
pub struct StatusDiff {
    last: HashMap<Register, u64>,
}

impl StatusDiff {
    pub fn new() -> Self {
        Self::default()
    }

    /// Diffs `current` against the previous snapshot, updates the
    /// snapshot, and returns the set of changes (empty on the first call
    /// for any register seen for the first time, since there's no prior
    /// value to compare against).
    pub fn update(&mut self, current: &[(Register, u64)]) -> Vec<RegisterChange> {
        let mut changes = Vec::new();
        for &(reg, new) in current {
            match self.last.insert(reg, new) {
                Some(old) if old != new => changes.push(RegisterChange { reg, old, new }),
                _ => {}
            }
        }
        changes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_observation_yields_no_change() {
        let mut diff = StatusDiff::new();
        let changes = diff.update(&[(Register::Rax, 1)]);
        assert!(changes.is_empty());
    }

    #[test]
    fn subsequent_change_is_reported() {
        let mut diff = StatusDiff::new();
        diff.update(&[(Register::Rax, 1)]);
        let changes = diff.update(&[(Register::Rax, 2)]);
        assert_eq!(
            changes,
            vec![RegisterChange {
                reg: Register::Rax,
                old: 1,
                new: 2
            }]
        );
    }

    #[test]
    fn unchanged_value_yields_no_change() {
        let mut diff = StatusDiff::new();
        diff.update(&[(Register::Rax, 1)]);
        let changes = diff.update(&[(Register::Rax, 1)]);
        assert!(changes.is_empty());
    }
}
