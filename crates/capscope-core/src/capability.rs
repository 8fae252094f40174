//! # Capability Accessors
//!
//! The boundary between capscope and the capability hardware.
//!
//! Everything above this module works on plain integers. The traits here are
//! the only way the walker learns about a capability: whether its tag is set,
//! whether it is a sentry, where it points and what bounds it carries. On a
//! CHERI target they are implemented over the architecture's intrinsics; the
//! [`platform::simulated`](crate::platform::simulated) machine implements
//! them in ordinary memory for hosts without capability hardware.

use std::fmt;

use smallvec::SmallVec;

use crate::range_set::Range;
use crate::types::Address;

/// Read-only view of one capability value.
///
/// Implementations never construct or modify capabilities on behalf of the
/// walker; they only report on values handed to them.
pub trait Capability: Copy + fmt::Debug
{
    /// Size in bytes of a capability-sized memory slot.
    ///
    /// 16 on 64-bit CHERI targets (Morello, CHERI-RISC-V RV64).
    const SIZE: u64 = 16;

    /// Whether the validity tag is set.
    fn is_valid(&self) -> bool;

    /// Whether the capability is sealed as a sentry (entry-only).
    fn is_sentry(&self) -> bool;

    /// Current address (cursor).
    fn address(&self) -> Address;

    /// Lower bound.
    fn base(&self) -> Address;

    /// Length of the bounds in bytes.
    fn length(&self) -> u64;

    /// Upper bound (exclusive), saturating at the top of the address space.
    fn top(&self) -> Address
    {
        self.base().saturating_add(self.length())
    }

    /// `[base, top)`
    fn bounds(&self) -> Range
    {
        Range::new(self.base(), self.top())
    }
}

/// Loads capability-sized slots from the inspected address space.
///
/// The walker only calls this for slots inside an accessible mapping; an
/// implementation returns `None` when the slot still cannot be read.
pub trait CapabilityMemory<C: Capability>
{
    /// Read the capability stored at `slot`, tag included.
    fn load_capability(&self, slot: Address) -> Option<C>;
}

impl<C: Capability, M: CapabilityMemory<C> + ?Sized> CapabilityMemory<C> for &M
{
    fn load_capability(&self, slot: Address) -> Option<C>
    {
        (**self).load_capability(slot)
    }
}

/// Register file of the inspected thread.
///
/// Captured by architecture-specific code outside this crate. The snapshot
/// also records where it was stored: that range sits on the walker's own
/// stack, and everything from the stack mapping's start up to it belongs to
/// the walker's frames, which are excluded from the walk.
#[derive(Debug, Clone)]
pub struct RegisterSnapshot<C>
{
    /// General-purpose capability registers `c0..cN`
    pub general: Vec<C>,
    /// Capability stack pointer
    pub stack: Option<C>,
    /// Program-counter capability
    pub pcc: Option<C>,
    /// Default data capability
    pub ddc: Option<C>,
    /// Memory holding the snapshot itself
    pub frame: Range,
    /// Any code address inside the inspected program, used to name its
    /// stack; the address of a valid `pcc` stands in when unset
    pub code: Option<Address>,
}

/// Walk order of the roots.
///
/// Only the order of output lines depends on this; which capabilities are
/// discovered does not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RootOrder
{
    /// `csp`, `c0..cN`, `pcc`, `ddc`
    #[default]
    RegistersFirst,
    /// `pcc`, `csp`, `c0..cN`, `ddc`
    PccFirst,
}

/// Register name and value of one walk root.
pub type Root<C> = (String, C);

impl<C: Capability> RegisterSnapshot<C>
{
    /// Snapshot with only general-purpose registers.
    pub fn new(general: Vec<C>, frame: Range) -> Self
    {
        Self {
            general,
            stack: None,
            pcc: None,
            ddc: None,
            frame,
            code: None,
        }
    }

    /// Code address naming the owner of the stack: `code`, else the address
    /// of a valid `pcc`.
    pub fn code_address(&self) -> Option<Address>
    {
        self.code
            .or_else(|| self.pcc.filter(|pcc| pcc.is_valid()).map(|pcc| pcc.address()))
    }

    /// Roots of the walk, named as in CHERI assembly.
    pub fn roots(&self, order: RootOrder) -> SmallVec<[Root<C>; 36]>
    {
        let mut roots = SmallVec::new();
        let pcc = self.pcc.map(|cap| ("pcc".to_string(), cap));

        if order == RootOrder::PccFirst {
            roots.extend(pcc.clone());
        }
        roots.extend(self.stack.map(|cap| ("csp".to_string(), cap)));
        roots.extend(self.general.iter().enumerate().map(|(i, cap)| (format!("c{i}"), *cap)));
        if order == RootOrder::RegistersFirst {
            roots.extend(pcc);
        }
        roots.extend(self.ddc.map(|cap| ("ddc".to_string(), cap)));
        roots
    }
}
