//! Memory mapping types.

use std::fmt;

use super::Address;

bitflags::bitflags! {
    /// Access protection and VM flags of one mapping.
    ///
    /// The protection bits follow the capability-aware `rwxRW` layout reported
    /// by `procstat -v`: `R`/`W` are the right to load and store tagged
    /// capabilities, separate from plain data reads and writes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MappingFlags: u32 {
        /// Executable.
        const EXEC        = 0x0100;
        /// Writable.
        const WRITE       = 0x0200;
        /// Readable.
        const READ        = 0x0400;
        /// Capabilities may be stored.
        const WRITE_CAP   = 0x0800;
        /// Capabilities may be loaded.
        const READ_CAP    = 0x1000;
        /// Copy-on-write.
        const COW         = 0x0001_0000;
        /// Guard region.
        const GUARD       = 0x0002_0000;
        /// Reserved but unmapped.
        const UNMAPPED    = 0x0004_0000;
        /// Needs copy.
        const NEEDS_COPY  = 0x0008_0000;
        /// Superpage backed.
        const SUPER       = 0x0010_0000;
        /// Grows upward.
        const GROWS_UP    = 0x0020_0000;
        /// Grows downward (stacks).
        const GROWS_DOWN  = 0x0040_0000;
        /// Wired by the user.
        const USER_WIRED  = 0x0080_0000;
        /// Shared mapping.
        const SHARED      = 0x0100_0000;
        /// Private mapping.
        const PRIVATE     = 0x0200_0000;
    }
}

impl MappingFlags
{
    /// All protection bits.
    pub const PROTECTION: Self = Self::EXEC
        .union(Self::WRITE)
        .union(Self::READ)
        .union(Self::WRITE_CAP)
        .union(Self::READ_CAP);

    /// Parse the five-character `rwxRW` protection field.
    ///
    /// Missing trailing characters count as absent permissions, so the
    /// three-character `rwx` prefix of a `/proc/<pid>/maps` record also works.
    ///
    /// ```rust
    /// use capscope_core::types::MappingFlags;
    ///
    /// let prot = MappingFlags::from_protection("rw-RW");
    /// assert!(prot.contains(MappingFlags::READ | MappingFlags::READ_CAP));
    /// assert!(!prot.contains(MappingFlags::EXEC));
    /// ```
    pub fn from_protection(text: &str) -> Self
    {
        let b = text.as_bytes();
        let at = |i: usize, c: u8| b.get(i) == Some(&c);
        let mut flags = Self::empty();
        flags.set(Self::READ, at(0, b'r'));
        flags.set(Self::WRITE, at(1, b'w'));
        flags.set(Self::EXEC, at(2, b'x'));
        flags.set(Self::READ_CAP, at(3, b'R'));
        flags.set(Self::WRITE_CAP, at(4, b'W'));
        flags
    }

    /// Parse the five-character procstat `FLAG` field (e.g. `CN-D-`).
    pub fn from_procstat_flags(text: &str) -> Self
    {
        let b = text.as_bytes();
        let at = |i: usize, c: u8| b.get(i) == Some(&c);
        let mut flags = Self::empty();
        flags.set(Self::COW, at(0, b'C'));
        flags.set(Self::GUARD, at(0, b'G'));
        flags.set(Self::UNMAPPED, at(0, b'U'));
        flags.set(Self::NEEDS_COPY, at(1, b'N'));
        flags.set(Self::SUPER, at(2, b'S'));
        flags.set(Self::GROWS_UP, at(3, b'U'));
        flags.set(Self::GROWS_DOWN, at(3, b'D'));
        flags.set(Self::USER_WIRED, at(4, b'W'));
        flags
    }

    /// Render the protection bits as `rwxRW`.
    pub fn protection_str(self) -> String
    {
        let pick = |flag: Self, c: char| if self.contains(flag) { c } else { '-' };
        [
            pick(Self::READ, 'r'),
            pick(Self::WRITE, 'w'),
            pick(Self::EXEC, 'x'),
            pick(Self::READ_CAP, 'R'),
            pick(Self::WRITE_CAP, 'W'),
        ]
        .iter()
        .collect()
    }

    /// Render the VM flags in procstat's five-character layout.
    pub fn flags_str(self) -> String
    {
        let first = if self.contains(Self::COW) {
            'C'
        } else if self.contains(Self::GUARD) {
            'G'
        } else if self.contains(Self::UNMAPPED) {
            'U'
        } else {
            '-'
        };
        let grows = if self.contains(Self::GROWS_UP) {
            'U'
        } else if self.contains(Self::GROWS_DOWN) {
            'D'
        } else {
            '-'
        };
        let pick = |flag: Self, c: char| if self.contains(flag) { c } else { '-' };
        [
            first,
            pick(Self::NEEDS_COPY, 'N'),
            pick(Self::SUPER, 'S'),
            grows,
            pick(Self::USER_WIRED, 'W'),
        ]
        .iter()
        .collect()
    }
}

/// Backing object type of a mapping (procstat `TP` column).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MappingType
{
    /// `--`
    None,
    /// `df`: anonymous default memory
    #[default]
    Default,
    /// `vn`: file backed
    Vnode,
    /// `sw`: swap backed
    Swap,
    /// `dv`: device
    Device,
    /// `ph`: physical
    Phys,
    /// `dd`: dead object
    Dead,
    /// `sg`: scatter/gather
    ScatterGather,
    /// `md`: managed device
    ManagedDevice,
    /// `gd`: guard
    Guard,
    /// Anything else
    Unknown,
}

impl MappingType
{
    /// Parse the two-letter procstat type code.
    pub fn from_code(code: &str) -> Self
    {
        match code {
            "--" => MappingType::None,
            "df" => MappingType::Default,
            "vn" => MappingType::Vnode,
            "sw" => MappingType::Swap,
            "dv" => MappingType::Device,
            "ph" => MappingType::Phys,
            "dd" => MappingType::Dead,
            "sg" => MappingType::ScatterGather,
            "md" => MappingType::ManagedDevice,
            "gd" => MappingType::Guard,
            _ => MappingType::Unknown,
        }
    }

    /// Two-letter procstat type code.
    pub const fn code(self) -> &'static str
    {
        match self {
            MappingType::None => "--",
            MappingType::Default => "df",
            MappingType::Vnode => "vn",
            MappingType::Swap => "sw",
            MappingType::Device => "dv",
            MappingType::Phys => "ph",
            MappingType::Dead => "dd",
            MappingType::ScatterGather => "sg",
            MappingType::ManagedDevice => "md",
            MappingType::Guard => "gd",
            MappingType::Unknown => "??",
        }
    }
}

impl fmt::Display for MappingType
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.write_str(self.code())
    }
}

/// One record as produced by a mapping provider.
///
/// This is the whole contract between the address-space model and the OS
/// utilities that list mappings: both textual formats are parsed into this
/// shape before the model sees them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingRecord
{
    /// Start address (inclusive)
    pub start: Address,
    /// End address (exclusive)
    pub end: Address,
    /// Protection and VM flags
    pub flags: MappingFlags,
    /// Backing object type
    pub kind: MappingType,
    /// File backing the mapping, if any
    pub path: Option<String>,
    /// Name supplied by the provider for a path-less mapping (`[stack]`)
    pub name: Option<String>,
}

impl MappingRecord
{
    /// Anonymous record with the given protection.
    pub fn anonymous(start: Address, end: Address, flags: MappingFlags) -> Self
    {
        Self {
            start,
            end,
            flags,
            kind: MappingType::Default,
            path: None,
            name: None,
        }
    }

    /// File-backed record.
    pub fn file(start: Address, end: Address, flags: MappingFlags, path: impl Into<String>) -> Self
    {
        Self {
            start,
            end,
            flags,
            kind: MappingType::Vnode,
            path: Some(path.into()),
            name: None,
        }
    }
}

/// Identity of a mapping that survives list reloads.
///
/// Reloads replace the mapping list wholesale, so indices are not stable;
/// the `[start, end)` range is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MappingKey
{
    /// Start address (inclusive)
    pub start: Address,
    /// End address (exclusive)
    pub end: Address,
}

/// A mapping in the address-space model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mapping
{
    /// Start address (inclusive)
    pub start: Address,
    /// End address (exclusive)
    pub end: Address,
    /// Protection and VM flags
    pub flags: MappingFlags,
    /// Backing object type
    pub kind: MappingType,
    /// Index (in the same list) of the mapping anchoring the owning image.
    ///
    /// Equal to this mapping's own index when nothing else owns it.
    pub base: usize,
    /// Backing file
    pub path: Option<String>,
    /// Human name: the path basename, an image name folded in from a
    /// neighbouring image, or a bracketed tag such as `[ls!stack]`.
    pub name: Option<String>,
}

impl Mapping
{
    /// Size in bytes.
    pub fn size(&self) -> u64
    {
        self.end.offset_from(self.start)
    }

    /// `start <= address < end`
    pub fn contains(&self, address: Address) -> bool
    {
        address >= self.start && address < self.end
    }

    /// Whether `[start, end)` lies entirely within this mapping.
    pub fn covers(&self, start: Address, end: Address) -> bool
    {
        start >= self.start && end <= self.end
    }

    /// Whether the mapping can be read at all.
    ///
    /// Guard pages, unmapped reservations and protection-less ranges are not.
    pub fn is_accessible(&self) -> bool
    {
        self.flags.contains(MappingFlags::READ)
            && !self.flags.intersects(MappingFlags::GUARD | MappingFlags::UNMAPPED)
            && self.kind != MappingType::Guard
    }

    /// Backing file path, or `""`.
    pub fn path(&self) -> &str
    {
        self.path.as_deref().unwrap_or("")
    }

    /// Assigned name, or `""`.
    pub fn name(&self) -> &str
    {
        self.name.as_deref().unwrap_or("")
    }

    /// Stable identity across reloads.
    pub fn key(&self) -> MappingKey
    {
        MappingKey {
            start: self.start,
            end: self.end,
        }
    }
}

impl fmt::Display for Mapping
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        let label = if self.path().is_empty() { self.name() } else { self.path() };
        write!(
            f,
            "{:#x}-{:#x} {} {} {} {}",
            self.start,
            self.end,
            self.flags.protection_str(),
            self.flags.flags_str(),
            self.kind,
            label
        )
    }
}
