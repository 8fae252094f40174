//! Simulated capability machine.
//!
//! [`SimCapability`] carries the fields a CHERI capability exposes to the
//! walker; [`SimMemory`] is a sparse map from capability-sized slots to the
//! tagged values stored there. Slots never written read back as `None`, the
//! same as memory that holds no capability.

use std::collections::BTreeMap;

use crate::capability::{Capability, CapabilityMemory};
use crate::types::Address;

/// A capability value with explicit tag and bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimCapability
{
    valid: bool,
    sentry: bool,
    address: Address,
    base: Address,
    length: u64,
}

impl SimCapability
{
    /// Untagged null capability.
    pub const NULL: Self = Self {
        valid: false,
        sentry: false,
        address: Address::ZERO,
        base: Address::ZERO,
        length: 0,
    };

    /// Valid capability for `[base, base + length)` pointing at `base`.
    pub fn new(base: Address, length: u64) -> Self
    {
        Self {
            valid: true,
            sentry: false,
            address: base,
            base,
            length,
        }
    }

    /// Same bounds, cursor moved to `address`.
    #[must_use]
    pub fn with_address(mut self, address: Address) -> Self
    {
        self.address = address;
        self
    }

    /// Sealed as a sentry.
    #[must_use]
    pub fn sentry(mut self) -> Self
    {
        self.sentry = true;
        self
    }

    /// With the tag cleared.
    #[must_use]
    pub fn untagged(mut self) -> Self
    {
        self.valid = false;
        self
    }
}

impl Capability for SimCapability
{
    fn is_valid(&self) -> bool
    {
        self.valid
    }

    fn is_sentry(&self) -> bool
    {
        self.sentry
    }

    fn address(&self) -> Address
    {
        self.address
    }

    fn base(&self) -> Address
    {
        self.base
    }

    fn length(&self) -> u64
    {
        self.length
    }
}

/// Sparse capability-slot memory.
#[derive(Debug, Clone, Default)]
pub struct SimMemory
{
    slots: BTreeMap<Address, SimCapability>,
}

impl SimMemory
{
    /// Empty memory.
    pub fn new() -> Self
    {
        Self::default()
    }

    /// Store `capability` in the slot holding `slot`.
    pub fn store(&mut self, slot: Address, capability: SimCapability) -> &mut Self
    {
        self.slots.insert(slot.align_down(SimCapability::SIZE), capability);
        self
    }

    /// Number of slots written.
    pub fn len(&self) -> usize
    {
        self.slots.len()
    }

    /// Whether nothing has been stored.
    pub fn is_empty(&self) -> bool
    {
        self.slots.is_empty()
    }
}

impl CapabilityMemory<SimCapability> for SimMemory
{
    fn load_capability(&self, slot: Address) -> Option<SimCapability>
    {
        self.slots.get(&slot.align_down(SimCapability::SIZE)).copied()
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_bounds_and_cursor()
    {
        let cap = SimCapability::new(Address::new(0x1000), 0x40).with_address(Address::new(0x1010));
        assert!(cap.is_valid());
        assert_eq!(cap.address(), Address::new(0x1010));
        assert_eq!(cap.top(), Address::new(0x1040));
        assert_eq!(cap.bounds().len(), 0x40);
    }

    #[test]
    fn test_top_saturates()
    {
        let cap = SimCapability::new(Address::new(u64::MAX - 4), 0x100);
        assert_eq!(cap.top(), Address::new(u64::MAX));
    }

    #[test]
    fn test_slots_are_capability_aligned()
    {
        let mut memory = SimMemory::new();
        let cap = SimCapability::new(Address::new(0x2000), 0x10);
        memory.store(Address::new(0x1008), cap);
        assert_eq!(memory.load_capability(Address::new(0x1000)), Some(cap));
        assert_eq!(memory.load_capability(Address::new(0x1010)), None);
    }
}
