//! # Symbol Table
//!
//! Per-image symbol cache with nearest-below lookup.
//!
//! Each image (binary or shared library, identified by path) is loaded at most
//! once through a [`SymbolProvider`] and kept for the lifetime of the table,
//! so repeated walks do not re-run `nm` or re-parse object files. Symbol
//! values are offsets from the image's load base; every lookup takes that
//! base as a parameter.
//!
//! ## Usage
//!
//! ```rust
//! use capscope_core::symbols::SymbolTable;
//! use capscope_core::types::{Address, Symbol};
//!
//! fn main() -> capscope_core::Result<()>
//! {
//!     let provider = |_: &str| -> capscope_core::Result<Vec<Symbol>> {
//!         Ok(capscope_core::symbols::parse_nm_output("0 T main\n10 D table\n"))
//!     };
//!     let mut table = SymbolTable::new(provider, 16);
//!     table.load("/bin/demo")?;
//!
//!     let base = Address::new(0x4000_0000);
//!     let symbol = table.find_symbol("/bin/demo", base, base + 0x14);
//!     assert_eq!(symbol.map(|s| s.name.raw()), Some("table"));
//!     Ok(())
//! }
//! ```

mod demangle;
pub mod provider;

pub use provider::{parse_nm_output, NmSymbols, ObjectSymbols, SymbolProvider};
use tracing::{debug, warn};

use crate::error::{CapscopeError, Result};
use crate::types::{Address, SectionKind, Symbol};

/// A loaded image and its address-ascending symbols.
#[derive(Debug, Clone)]
pub struct Image
{
    path: String,
    symbols: Vec<Symbol>,
}

impl Image
{
    /// Path the image was loaded from.
    pub fn path(&self) -> &str
    {
        &self.path
    }

    /// Symbols sorted by value.
    pub fn symbols(&self) -> &[Symbol]
    {
        &self.symbols
    }

    /// Symbol with the greatest `base + value <= address`.
    pub fn find_symbol(&self, base: Address, address: Address) -> Option<&Symbol>
    {
        let index = self
            .symbols
            .partition_point(|symbol| base.saturating_add(symbol.value) <= address);
        index.checked_sub(1).map(|i| &self.symbols[i])
    }

    /// Section class of the first classifiable symbol placed in `[start, end)`.
    pub fn find_section_kind(&self, base: Address, start: Address, end: Address) -> Option<SectionKind>
    {
        let first = self
            .symbols
            .partition_point(|symbol| base.saturating_add(symbol.value) < start);
        self.symbols[first..]
            .iter()
            .take_while(|symbol| base.saturating_add(symbol.value) < end)
            .find_map(Symbol::section_kind)
    }
}

/// Cache of images keyed by path (case-insensitive).
pub struct SymbolTable<S>
{
    provider: S,
    images: Vec<Image>,
    max_images: usize,
}

impl<S: SymbolProvider> SymbolTable<S>
{
    /// Create an empty table that will hold at most `max_images` images.
    pub fn new(provider: S, max_images: usize) -> Self
    {
        Self {
            provider,
            images: Vec::new(),
            max_images,
        }
    }

    /// Load the symbols of `path` unless already loaded.
    ///
    /// A failing provider does not fail the load: the image is cached with no
    /// symbols, so addresses inside it resolve to `image+0xN` and the provider
    /// is not asked again.
    ///
    /// ## Errors
    ///
    /// `ResourceExhausted` when the table already holds `max_images` images.
    pub fn load(&mut self, path: &str) -> Result<()>
    {
        if path.is_empty() || self.image(path).is_some() {
            return Ok(());
        }

        if self.images.len() >= self.max_images {
            return Err(CapscopeError::ResourceExhausted(format!(
                "too many images (limit {}) while loading {path}",
                self.max_images
            )));
        }

        let mut symbols = match self.provider.load_symbols(path) {
            Ok(symbols) => symbols,
            Err(err) => {
                warn!(path, error = %err, "continuing without symbols");
                Vec::new()
            }
        };
        // Providers should already sort; a stable sort keeps nm's tie order.
        symbols.sort_by_key(|symbol| symbol.value);

        debug!(path, count = symbols.len(), "loaded image symbols");
        self.images.push(Image {
            path: path.to_string(),
            symbols,
        });
        Ok(())
    }

    /// The cached image for `path`.
    pub fn image(&self, path: &str) -> Option<&Image>
    {
        if path.is_empty() {
            return None;
        }
        self.images.iter().find(|image| image.path.eq_ignore_ascii_case(path))
    }

    /// Every cached image, in load order.
    pub fn images(&self) -> &[Image]
    {
        &self.images
    }

    /// Symbols of `path`, if loaded.
    pub fn symbols(&self, path: &str) -> Option<&[Symbol]>
    {
        self.image(path).map(Image::symbols)
    }

    /// Nearest symbol at or below `address` for an image loaded at `base`.
    ///
    /// `None` when the image is unknown or `address` precedes every symbol.
    pub fn find_symbol(&self, path: &str, base: Address, address: Address) -> Option<&Symbol>
    {
        self.image(path)?.find_symbol(base, address)
    }

    /// Classify `[start, end)` as text, bss or data by the symbols placed in it.
    pub fn find_section_kind(&self, path: &str, base: Address, start: Address, end: Address) -> Option<SectionKind>
    {
        self.image(path)?.find_section_kind(base, start, end)
    }
}

#[cfg(test)]
mod tests
{
    use std::cell::Cell;

    use super::*;

    fn table_with(text: &'static str) -> SymbolTable<impl SymbolProvider>
    {
        SymbolTable::new(move |_: &str| -> Result<Vec<Symbol>> { Ok(parse_nm_output(text)) }, 8)
    }

    #[test]
    fn test_nearest_symbol_below()
    {
        let mut table = table_with("0 T start\n10 B counter\n20 D table\n");
        table.load("/lib/libdemo.so").unwrap();
        let base = Address::new(0x1000);

        let hit = table.find_symbol("/lib/libdemo.so", base, base + 0x18).unwrap();
        assert_eq!(hit.name.raw(), "counter");
        assert_eq!(hit.value, 0x10);

        let exact = table.find_symbol("/lib/libdemo.so", base, base).unwrap();
        assert_eq!(exact.name.raw(), "start");

        assert!(table.find_symbol("/lib/libdemo.so", base, base - 1).is_none());
    }

    #[test]
    fn test_path_match_ignores_case()
    {
        let mut table = table_with("0 T start\n");
        table.load("/lib/LibDemo.so").unwrap();
        assert!(table.image("/lib/libdemo.so").is_some());
        assert!(table.find_symbol("/LIB/LIBDEMO.SO", Address::ZERO, Address::new(4)).is_some());
    }

    #[test]
    fn test_load_runs_provider_once_per_path()
    {
        let calls = Cell::new(0);
        let provider = |_: &str| -> Result<Vec<Symbol>> {
            calls.set(calls.get() + 1);
            Ok(parse_nm_output("0 T start\n"))
        };
        let mut table = SymbolTable::new(provider, 8);
        table.load("/bin/demo").unwrap();
        table.load("/bin/demo").unwrap();
        table.load("/BIN/DEMO").unwrap();
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_provider_failure_degrades_to_no_symbols()
    {
        let provider = |path: &str| -> Result<Vec<Symbol>> {
            Err(CapscopeError::SymbolProvider {
                path: path.into(),
                details: "nm missing".to_string(),
            })
        };
        let mut table = SymbolTable::new(provider, 8);
        table.load("/bin/demo").unwrap();
        assert_eq!(table.symbols("/bin/demo").map(<[Symbol]>::len), Some(0));
        assert!(table.find_symbol("/bin/demo", Address::ZERO, Address::new(0x10)).is_none());
    }

    #[test]
    fn test_image_limit()
    {
        let mut table = SymbolTable::new(|_: &str| -> Result<Vec<Symbol>> { Ok(Vec::new()) }, 1);
        table.load("/bin/a").unwrap();
        assert!(matches!(table.load("/bin/b"), Err(CapscopeError::ResourceExhausted(_))));
    }

    #[test]
    fn test_section_kind_classification()
    {
        let mut table = table_with("0 T start\n100 U undefined_ignored\n100 b local_bss\n200 D data\n");
        table.load("/bin/demo").unwrap();
        let base = Address::new(0x10_000);

        let kind = |start: u64, end: u64| table.find_section_kind("/bin/demo", base, base + start, base + end);
        assert_eq!(kind(0, 0x10), Some(SectionKind::Text));
        assert_eq!(kind(0x100, 0x180), Some(SectionKind::Bss));
        assert_eq!(kind(0x180, 0x300), Some(SectionKind::Data));
        assert_eq!(kind(0x300, 0x400), None);
        assert_eq!(table.find_section_kind("/bin/other", base, base, base + 0x10), None);
    }
}
