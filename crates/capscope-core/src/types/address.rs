//! Memory address type.

use std::fmt;
use std::ops::{Add, Sub};

/// Strongly typed memory address
///
/// This wrapper around `u64` keeps addresses apart from sizes, offsets and
/// counts. It only carries the integer address: capability metadata (bounds,
/// permissions, tag) lives behind the [`Capability`](crate::capability::Capability)
/// trait, never here.
///
/// ## Example
///
/// ```rust
/// use capscope_core::types::Address;
///
/// let addr = Address::from(0x1000);
/// let next_addr = addr + 0x100; // Add offset
/// assert_eq!(next_addr.value(), 0x1100);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Address(u64);

impl Address
{
    /// The null address (0x0)
    pub const ZERO: Self = Address(0);

    /// Create a new address from a `u64` value
    ///
    /// This is equivalent to `Address::from(value)` but can be used in const contexts.
    pub const fn new(value: u64) -> Self
    {
        Address(value)
    }

    /// Get the raw `u64` value of this address
    pub const fn value(self) -> u64
    {
        self.0
    }

    /// Add an offset to this address, checking for overflow
    ///
    /// ```rust
    /// use capscope_core::types::Address;
    ///
    /// let addr = Address::from(0x1000);
    /// assert_eq!(addr.checked_add(0x100), Some(Address::from(0x1100)));
    /// assert_eq!(addr.checked_add(u64::MAX), None); // Overflow
    /// ```
    pub fn checked_add(self, offset: u64) -> Option<Self>
    {
        self.0.checked_add(offset).map(Address)
    }

    /// Subtract an offset from this address, checking for underflow
    pub fn checked_sub(self, offset: u64) -> Option<Self>
    {
        self.0.checked_sub(offset).map(Address)
    }

    /// Add an offset to this address, saturating at the maximum value
    pub fn saturating_add(self, offset: u64) -> Self
    {
        Address(self.0.saturating_add(offset))
    }

    /// Distance in bytes from `base` up to this address (0 if `base` is above)
    pub fn offset_from(self, base: Address) -> u64
    {
        self.0.saturating_sub(base.0)
    }

    /// Round up to a multiple of `align` (a power of two)
    ///
    /// Saturates at the highest aligned address instead of wrapping.
    ///
    /// ```rust
    /// use capscope_core::types::Address;
    ///
    /// assert_eq!(Address::from(0x1001).align_up(16), Address::from(0x1010));
    /// assert_eq!(Address::from(0x1010).align_up(16), Address::from(0x1010));
    /// ```
    pub fn align_up(self, align: u64) -> Self
    {
        debug_assert!(align.is_power_of_two());
        let mask = align - 1;
        match self.0.checked_add(mask) {
            Some(value) => Address(value & !mask),
            None => Address(u64::MAX & !mask),
        }
    }

    /// Round down to a multiple of `align` (a power of two)
    pub fn align_down(self, align: u64) -> Self
    {
        debug_assert!(align.is_power_of_two());
        Address(self.0 & !(align - 1))
    }
}

impl From<u64> for Address
{
    fn from(value: u64) -> Self
    {
        Address(value)
    }
}

impl From<Address> for u64
{
    fn from(address: Address) -> Self
    {
        address.0
    }
}

impl fmt::Display for Address
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{:#x}", self.0)
    }
}

impl fmt::LowerHex for Address
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

impl Add<u64> for Address
{
    type Output = Address;

    fn add(self, rhs: u64) -> Self::Output
    {
        Address(self.0.wrapping_add(rhs))
    }
}

impl Sub<u64> for Address
{
    type Output = Address;

    fn sub(self, rhs: u64) -> Self::Output
    {
        Address(self.0.wrapping_sub(rhs))
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_align_saturates_near_top()
    {
        assert_eq!(Address::new(u64::MAX).align_up(16), Address::new(u64::MAX & !15));
        assert_eq!(Address::new(u64::MAX).align_down(16), Address::new(u64::MAX & !15));
    }

    #[test]
    fn test_offset_from_never_underflows()
    {
        assert_eq!(Address::new(0x1010).offset_from(Address::new(0x1000)), 0x10);
        assert_eq!(Address::new(0x1000).offset_from(Address::new(0x1010)), 0);
    }
}
