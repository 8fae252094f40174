//! # capscope-core
//!
//! Capability-graph inspection for CHERI processes.
//!
//! Starting from a thread's capability registers, the walker follows every
//! valid capability into the memory it grants and reports each capability it
//! reaches, named as `image!symbol+0xN` instead of a raw address. The result
//! answers the question capability security is built around: which memory can
//! this thread reach right now, and through what path.
//!
//! ## Components
//!
//! - [`range_set`]: coalescing interval set (visited and excluded memory)
//! - [`symbols`]: per-image symbol cache with nearest-symbol lookup
//! - [`address_space`]: mapping list, image ownership and region naming
//! - [`walker`]: the depth-first capability walk
//! - [`capability`]: the traits through which capabilities are read
//! - [`platform`]: capability backends (a simulated machine for now)
//!
//! ## Example
//!
//! ```rust
//! use capscope_core::prelude::*;
//! use capscope_core::platform::simulated::{SimCapability, SimMemory};
//!
//! fn main() -> capscope_core::Result<()>
//! {
//!     let image = MappingRecord::file(
//!         Address::new(0x10_000),
//!         Address::new(0x11_000),
//!         MappingFlags::from_protection("rw-RW"),
//!         "/bin/demo",
//!     );
//!     let mappings = move || -> capscope_core::Result<Vec<MappingRecord>> { Ok(vec![image.clone()]) };
//!     let symbols = |_: &str| -> capscope_core::Result<Vec<Symbol>> { Ok(parse_nm_output("0 D g\n")) };
//!     let mut space = AddressSpace::new(mappings, SymbolTable::new(symbols, 8), 64);
//!
//!     let global = SimCapability::new(Address::new(0x10_000), 0x20);
//!     let snapshot = RegisterSnapshot::new(vec![SimCapability::NULL, global], Range::default());
//!
//!     let lines = walk(&mut space, &SimMemory::new(), &snapshot, &WalkConfig::default())?;
//!     assert_eq!(lines[0].to_string(), "c1 0x10000  demo!g");
//!     Ok(())
//! }
//! ```

pub mod address_space;
pub mod capability;
pub mod config;
pub mod error;
pub mod platform;
pub mod prelude;
pub mod range_set;
pub mod symbols;
pub mod types;
pub mod walker;

pub use address_space::{AddressSpace, ResolvedName};
pub use error::{CapscopeError, Result};
pub use walker::{walk, Discovery, WalkConfig, Walker};
