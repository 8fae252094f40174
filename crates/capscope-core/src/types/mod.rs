//! # Types
//!
//! Platform-agnostic types used throughout capscope.
//!
//! These types describe addresses, mappings and symbols without knowing
//! whether they came from `procstat`, `/proc/<pid>/maps`, `nm` or an
//! in-process object reader.

pub mod address;
pub mod mapping;
pub mod process;
pub mod symbols;

// Re-export all public types
pub use address::Address;
pub use mapping::{Mapping, MappingFlags, MappingKey, MappingRecord, MappingType};
pub use process::ProcessId;
pub use symbols::{SectionKind, Symbol, SymbolName};
