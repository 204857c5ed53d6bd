//! Deadlock detector (spec §3, "Deadlock counter").

/// Counts consecutive instruction-hook events at the same address with no
/// register change. Resets on any register change or address change.
#[derive(Debug, Default)]
pub struct DeadlockDetector {
    last_addr: Option<u64>,
    count: u32,
}

impl DeadlockDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// `regs_changed` is whether the last `StatusDiff::update` for this
    /// event reported any change. Returns the updated counter.
    pub fn observe(&mut self, addr: u64, regs_changed: bool) -> u32 {
        let same_addr = self.last_addr == Some(addr);
        if same_addr && !regs_changed {
            self.count += 1;
        } else {
            self.count = 0;
        }
        self.last_addr = Some(addr);
        self.count
    }

    /// Whether the counter has reached the threshold used by the hook
    /// controller to declare a deadlock. The counter only increments on
    /// the *second* and later repeats of an address (the first sighting
    /// establishes the baseline), so three consecutive same-address,
    /// no-change events land here with `count == 2` — matching spec S5
    /// ("inject three consecutive code-hook events at the same address
    /// with no register change ... must observe stop() + FATAL").
    pub fn is_deadlocked(&self) -> bool {
        self.count > 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invariant_6_same_address_no_change_increments() {
        let mut d = DeadlockDetector::new();
        assert_eq!(d.observe(0x1000, false), 0);
        assert_eq!(d.observe(0x1000, false), 1);
        assert_eq!(d.observe(0x1000, false), 2);
        assert_eq!(d.observe(0x1000, false), 3);
        assert!(d.is_deadlocked());
    }

    #[test]
    fn register_change_resets_counter() {
        let mut d = DeadlockDetector::new();
        d.observe(0x1000, false);
        d.observe(0x1000, false);
        assert_eq!(d.observe(0x1000, true), 0);
        assert!(!d.is_deadlocked());
    }

    #[test]
    fn address_change_resets_counter() {
        let mut d = DeadlockDetector::new();
        d.observe(0x1000, false);
        d.observe(0x1000, false);
        assert_eq!(d.observe(0x2000, false), 0);
    }
}
