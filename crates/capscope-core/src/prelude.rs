//! Common module for library exports

pub use crate::address_space::{AddressSpace, MappingProvider, MappingSource, ResolvedName};
pub use crate::capability::{Capability, CapabilityMemory, RegisterSnapshot, RootOrder};
pub use crate::error::{CapscopeError, Result};
pub use crate::range_set::{Range, RangeSet};
pub use crate::symbols::{parse_nm_output, SymbolProvider, SymbolTable};
pub use crate::types::{Address, Mapping, MappingFlags, MappingKey, MappingRecord, ProcessId, Symbol};
pub use crate::walker::{walk, Discovery, Label, WalkConfig};
