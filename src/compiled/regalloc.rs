//! Register allocator
//!
//! First-fit allocation over a growable slot table. Each slot remembers how
//! many consumers still have to read it; the slot becomes free the moment
//! the last one has been scheduled.
//!
//! Author: Moroya Sakamoto

/// Register allocation table owned by a single scheduling trial
#[derive(Clone, Debug, Default)]
pub struct RegisterAllocator {
    /// Remaining use count per slot (0 = free)
    uses: Vec<u32>,
    /// High-water mark
    registers_needed: usize,
}

impl RegisterAllocator {
    /// Create an empty allocator
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the lowest free register and give it `uses` pending reads.
    ///
    /// `uses` must be at least 1; a value nobody reads is never scheduled.
    pub fn allocate(&mut self, uses: u32) -> usize {
        debug_assert!(uses > 0, "allocating a register nobody reads");
        let register = match self.uses.iter().position(|&u| u == 0) {
            Some(free) => free,
            None => {
                self.uses.push(0);
                self.uses.len() - 1
            }
        };
        self.uses[register] = uses;
        self.registers_needed = self.registers_needed.max(register + 1);
        register
    }

    /// Record one read of `register`; frees it after the last read
    pub fn decref(&mut self, register: usize) {
        if let Some(uses) = self.uses.get_mut(register) {
            debug_assert!(*uses > 0, "register {} released twice", register);
            *uses = uses.saturating_sub(1);
        }
    }

    /// Peak number of simultaneously occupied registers
    #[inline]
    pub fn registers_needed(&self) -> usize {
        self.registers_needed
    }

    /// Check if a register currently holds a live value
    #[cfg(test)]
    fn is_live(&self, register: usize) -> bool {
        self.uses.get(register).is_some_and(|&u| u > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_fit() {
        let mut alloc = RegisterAllocator::new();
        assert_eq!(alloc.allocate(1), 0);
        assert_eq!(alloc.allocate(2), 1);
        assert_eq!(alloc.allocate(1), 2);
        alloc.decref(0);
        assert_eq!(alloc.allocate(1), 0);
        assert_eq!(alloc.registers_needed(), 3);
    }

    #[test]
    fn test_freed_only_after_last_use() {
        let mut alloc = RegisterAllocator::new();
        let r = alloc.allocate(2);
        alloc.decref(r);
        assert!(alloc.is_live(r));
        assert_eq!(alloc.allocate(1), 1);
        alloc.decref(r);
        assert!(!alloc.is_live(r));
        assert_eq!(alloc.allocate(1), r);
        assert_eq!(alloc.registers_needed(), 2);
    }
}
