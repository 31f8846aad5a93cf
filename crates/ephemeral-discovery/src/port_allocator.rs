//! Per-game network port allocation (§4.4.5).
//!
//! Ports are drawn from a fixed, configured range. Released ports are
//! preferred back out in LIFO order: the most recently freed port is the
//! next one handed out, so a burst of short-lived games tends to reuse a
//! small working set of ports rather than sweeping monotonically through
//! the whole range, which keeps firewall/NAT state churn down.

use ephemeral_core::CoordError;
use ephemeral_core::PortRange;
use std::collections::HashSet;

/// Allocates and releases TCP ports from a fixed range.
pub struct PortAllocator {
    range: PortRange,
    next_unused: u16,
    released: Vec<u16>,
    in_use: HashSet<u16>,
}

impl PortAllocator {
    /// Create an allocator over `range`, with nothing yet allocated.
    pub fn new(range: PortRange) -> Self {
        Self {
            next_unused: range.start,
            range,
            released: Vec::new(),
            in_use: HashSet::new(),
        }
    }

    /// Allocate one port: prefer the most recently released port, falling
    /// back to the next never-yet-used port in the range.
    pub fn allocate(&mut self) -> Result<u16, CoordError> {
        if let Some(port) = self.released.pop() {
            self.in_use.insert(port);
            return Ok(port);
        }
        if self.next_unused > self.range.end {
            return Err(CoordError::runtime(format!(
                "port range {}:{} exhausted",
                self.range.start, self.range.end
            )));
        }
        let port = self.next_unused;
        self.next_unused += 1;
        self.in_use.insert(port);
        Ok(port)
    }

    /// Allocate `count` distinct ports, rolling back every one of them if
    /// the range runs out partway through — callers need all-or-nothing for
    /// a game's network allocation.
    pub fn allocate_many(&mut self, count: usize) -> Result<Vec<u16>, CoordError> {
        let mut allocated = Vec::with_capacity(count);
        for _ in 0..count {
            match self.allocate() {
                Ok(port) => allocated.push(port),
                Err(err) => {
                    for port in allocated {
                        self.release(port);
                    }
                    return Err(err);
                }
            }
        }
        Ok(allocated)
    }

    /// Release a port back to the pool. Releasing a port not currently
    /// tracked as in-use is a protocol error rather than a silent no-op,
    /// since it would indicate a double-release bug at the call site.
    pub fn release(&mut self, port: u16) {
        if self.in_use.remove(&port) {
            self.released.push(port);
        }
    }

    /// Reconcile this allocator's bookkeeping with an externally-observed
    /// set of ports actually in use (e.g. read back from the orchestration
    /// layer at startup). Any port this allocator thought was in use but
    /// isn't reported is released; the reverse case (externally in use but
    /// unknown here) is rejected as a validation error, since it means the
    /// range overlaps something this allocator cannot account for.
    pub fn reconcile(&mut self, externally_in_use: &HashSet<u16>) -> Result<(), CoordError> {
        for port in externally_in_use {
            if !self.range_contains(*port) {
                continue;
            }
            if !self.in_use.contains(port) {
                return Err(CoordError::validation(format!(
                    "port {port} is in use outside allocator bookkeeping"
                )));
            }
        }
        let stale: Vec<u16> = self
            .in_use
            .iter()
            .copied()
            .filter(|port| !externally_in_use.contains(port))
            .collect();
        for port in stale {
            self.release(port);
        }
        Ok(())
    }

    fn range_contains(&self, port: u16) -> bool {
        port >= self.range.start && port <= self.range.end
    }

    /// Number of ports currently allocated.
    pub fn in_use_count(&self) -> usize {
        self.in_use.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(start: u16, end: u16) -> PortRange {
        PortRange { start, end }
    }

    #[test]
    fn allocates_sequentially_when_nothing_has_been_released() {
        let mut allocator = PortAllocator::new(range(30000, 30002));
        assert_eq!(allocator.allocate().unwrap(), 30000);
        assert_eq!(allocator.allocate().unwrap(), 30001);
        assert_eq!(allocator.allocate().unwrap(), 30002);
        assert!(allocator.allocate().is_err());
    }

    #[test]
    fn released_ports_are_preferred_in_lifo_order() {
        let mut allocator = PortAllocator::new(range(30000, 30002));
        let a = allocator.allocate().unwrap();
        let b = allocator.allocate().unwrap();
        allocator.release(a);
        allocator.release(b);
        assert_eq!(allocator.allocate().unwrap(), b);
        assert_eq!(allocator.allocate().unwrap(), a);
    }

    #[test]
    fn allocate_many_rolls_back_on_exhaustion() {
        let mut allocator = PortAllocator::new(range(30000, 30001));
        assert!(allocator.allocate_many(3).is_err());
        assert_eq!(allocator.in_use_count(), 0);
    }

    #[test]
    fn reconcile_releases_ports_the_external_view_no_longer_reports() {
        let mut allocator = PortAllocator::new(range(30000, 30002));
        let a = allocator.allocate().unwrap();
        let _b = allocator.allocate().unwrap();
        let mut external = HashSet::new();
        external.insert(a);
        allocator.reconcile(&external).unwrap();
        assert_eq!(allocator.in_use_count(), 1);
    }

    #[test]
    fn reconcile_rejects_ports_in_use_externally_but_unknown_here() {
        let mut allocator = PortAllocator::new(range(30000, 30002));
        let mut external = HashSet::new();
        external.insert(30001);
        assert!(allocator.reconcile(&external).is_err());
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn range(start: u16, end: u16) -> PortRange {
        PortRange { start, end }
    }

    proptest! {
        #[test]
        fn allocator_never_hands_out_a_currently_in_use_port(
            ops in proptest::collection::vec(any::<bool>(), 1..200)
        ) {
            let mut allocator = PortAllocator::new(range(30000, 30031));
            let mut held: Vec<u16> = Vec::new();
            let mut seen_in_use: HashSet<u16> = HashSet::new();

            for allocate in ops {
                if allocate {
                    match allocator.allocate() {
                        Ok(port) => {
                            prop_assert!(!seen_in_use.contains(&port));
                            seen_in_use.insert(port);
                            held.push(port);
                        }
                        Err(_) => {}
                    }
                } else if let Some(port) = held.pop() {
                    seen_in_use.remove(&port);
                    allocator.release(port);
                }
            }
        }

        #[test]
        fn allocated_ports_always_fall_within_the_configured_range(
            count in 0usize..32
        ) {
            let mut allocator = PortAllocator::new(range(30000, 30031));
            for _ in 0..count {
                if let Ok(port) = allocator.allocate() {
                    prop_assert!((30000..=30031).contains(&port));
                }
            }
        }
    }
}
