//! Engine instance table

use crate::error::{SlError, SlResult};
use crate::object::instance::ObjectRef;

/// Bitset of occupied registry slots
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotMask {
    bits: u32,
    capacity: usize,
}

impl SlotMask {
    /// `capacity` is clamped to 32
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            bits: 0,
            capacity: capacity.min(u32::BITS as usize),
        }
    }

    /// Claim the lowest free slot
    pub fn allocate_lowest(&mut self) -> Option<usize> {
        let index = (!self.bits).trailing_zeros() as usize;
        if index >= self.capacity {
            return None;
        }
        self.bits |= 1 << index;
        Some(index)
    }

    /// Returns whether the slot was occupied
    pub fn release(&mut self, index: usize) -> bool {
        if !self.contains(index) {
            return false;
        }
        self.bits &= !(1 << index);
        true
    }

    pub fn contains(&self, index: usize) -> bool {
        index < self.capacity && self.bits & (1 << index) != 0
    }

    pub fn count(&self) -> usize {
        self.bits.count_ones() as usize
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.count() == self.capacity
    }
}

/// Live children of one engine
pub(crate) struct InstanceTable {
    slots: SlotMask,
    instances: Vec<Option<ObjectRef>>,
    next_instance_id: u32,
    shutdown: bool,
}

impl InstanceTable {
    pub fn new(capacity: usize) -> Self {
        let slots = SlotMask::with_capacity(capacity);
        Self {
            instances: vec![None; slots.capacity()],
            slots,
            // the engine object itself is instance 0
            next_instance_id: 1,
            shutdown: false,
        }
    }

    /// Claim the lowest free slot and the next instance id. The slot counts
    /// as occupied until it is installed or released.
    pub fn reserve(&mut self) -> SlResult<(usize, u32)> {
        if self.shutdown {
            return Err(SlError::ResourceExhausted);
        }
        let slot = self.slots.allocate_lowest().ok_or(SlError::ResourceExhausted)?;
        let instance_id = self.next_instance_id;
        self.next_instance_id = self.next_instance_id.wrapping_add(1).max(1);
        Ok((slot, instance_id))
    }

    /// Store the object built for a reserved slot. Refused once shutdown has
    /// begun; the caller then releases the slot.
    pub fn install(&mut self, slot: usize, object: ObjectRef) -> SlResult<()> {
        if self.shutdown || !self.slots.contains(slot) {
            return Err(SlError::ResourceExhausted);
        }
        self.instances[slot] = Some(object);
        Ok(())
    }

    pub fn release(&mut self, slot: usize) -> Option<ObjectRef> {
        if self.slots.release(slot) {
            self.instances[slot].take()
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.slots.count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown
    }

    pub fn begin_shutdown(&mut self) {
        self.shutdown = true;
    }

    pub fn live(&self) -> Vec<ObjectRef> {
        self.instances.iter().flatten().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_lowest() {
        let mut mask = SlotMask::with_capacity(3);
        assert_eq!(mask.allocate_lowest(), Some(0));
        assert_eq!(mask.allocate_lowest(), Some(1));
        assert_eq!(mask.allocate_lowest(), Some(2));
        assert!(mask.is_full());
        assert_eq!(mask.allocate_lowest(), None);

        assert!(mask.release(1));
        assert!(!mask.release(1));
        assert_eq!(mask.allocate_lowest(), Some(1));
    }

    #[test]
    fn test_reserve_and_release() {
        let mut table = InstanceTable::new(2);
        assert_eq!(table.reserve().unwrap(), (0, 1));
        assert_eq!(table.reserve().unwrap(), (1, 2));
        assert_eq!(table.reserve().unwrap_err(), SlError::ResourceExhausted);
        assert_eq!(table.len(), 2);

        // a reservation that never gets installed is released as usual
        assert!(table.release(0).is_none());
        assert_eq!(table.len(), 1);
        assert_eq!(table.reserve().unwrap(), (0, 3));
    }

    #[test]
    fn test_reserve_refused_after_shutdown() {
        let mut table = InstanceTable::new(4);
        let (slot, _) = table.reserve().unwrap();
        table.begin_shutdown();
        assert_eq!(table.reserve().unwrap_err(), SlError::ResourceExhausted);
        assert!(table.is_shut_down());
        table.release(slot);
        assert!(table.is_empty());
    }

    #[test]
    fn test_full_width_mask() {
        let mut mask = SlotMask::with_capacity(40);
        assert_eq!(mask.capacity(), 32);
        for i in 0..32 {
            assert_eq!(mask.allocate_lowest(), Some(i));
        }
        assert_eq!(mask.allocate_lowest(), None);
        assert_eq!(mask.count(), 32);
    }
}
