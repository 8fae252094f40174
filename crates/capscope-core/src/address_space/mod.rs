//! # Address Space Model
//!
//! Ordered list of the inspected process's memory mappings, with the names
//! that make addresses readable.
//!
//! The list is loaded lazily from a [`MappingProvider`] and replaced
//! wholesale whenever an address cannot be resolved, so mappings created
//! after the first load (a `dlopen`, stack growth) are picked up. Reloading
//! never loses names: a path-less mapping that reappears with the same
//! `[start, end)` keeps whatever name it had.
//!
//! ## Naming
//!
//! - File-backed mappings are named after their path's basename. The first
//!   mapping seen for a path anchors the image; every later mapping of the
//!   same path points back at it, and symbol offsets are taken from the
//!   anchor's start.
//! - Anonymous mappings whose range holds symbols of an image already seen
//!   (bss or data carved outside the file mapping) are folded into that
//!   image.
//! - Other anonymous mappings stay unnamed until [`AddressSpace::set_mapping_name`]
//!   gives them a bracketed tag such as `[demo!stack]`.

mod provider;

use std::fmt;

pub use provider::{
    parse_maps_line, parse_mappings, parse_procstat_line, FileMappings, MappingProvider, MappingSource,
    ProcessMappings,
};
use tracing::{debug, trace};

use crate::error::{CapscopeError, Result};
use crate::symbols::{SymbolProvider, SymbolTable};
use crate::types::{Address, Mapping, MappingFlags, MappingKey, MappingRecord};

/// Human-readable form of one address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedName
{
    /// Inside an image, at or after a symbol.
    Symbol
    {
        /// Image name
        image: String,
        /// Raw symbol name
        symbol: String,
        /// Distance past the symbol
        offset: u64,
    },
    /// Inside an image, before its first symbol or with no symbols loaded.
    Image
    {
        /// Image name
        image: String,
        /// Distance from the image base
        offset: u64,
    },
    /// Inside a named anonymous region.
    Region
    {
        /// Bracketed region name
        name: String,
        /// Distance from the region start
        offset: u64,
    },
    /// Outside every named mapping.
    Unresolved(Address),
}

impl fmt::Display for ResolvedName
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            ResolvedName::Symbol { image, symbol, offset: 0 } => write!(f, "{image}!{symbol}"),
            ResolvedName::Symbol { image, symbol, offset } => write!(f, "{image}!{symbol}+{offset:#x}"),
            ResolvedName::Image { image, offset } => write!(f, "{image}+{offset:#x}"),
            ResolvedName::Region { name, offset } => write!(f, "{name}+{offset:#x}"),
            ResolvedName::Unresolved(address) => write!(f, "{address}"),
        }
    }
}

/// Separator between owner and tag in assigned names.
const OWNER_SEPARATOR: char = '!';

/// Mapping list plus the symbol table of every image it references.
pub struct AddressSpace<P, S>
{
    provider: P,
    symbols: SymbolTable<S>,
    mappings: Vec<Mapping>,
    max_mappings: usize,
    loaded: bool,
}

impl<P: MappingProvider, S: SymbolProvider> AddressSpace<P, S>
{
    /// Create an empty model. Nothing is loaded until the first lookup.
    pub fn new(provider: P, symbols: SymbolTable<S>, max_mappings: usize) -> Self
    {
        Self {
            provider,
            symbols,
            mappings: Vec::new(),
            max_mappings,
            loaded: false,
        }
    }

    /// Current mappings, ascending by start.
    pub fn mappings(&self) -> &[Mapping]
    {
        &self.mappings
    }

    /// The symbol table shared by every image in the list.
    pub fn symbols(&self) -> &SymbolTable<S>
    {
        &self.symbols
    }

    /// Mutable access to the symbol table.
    pub fn symbols_mut(&mut self) -> &mut SymbolTable<S>
    {
        &mut self.symbols
    }

    /// Load the list if it has never been loaded.
    ///
    /// ## Errors
    ///
    /// See [`AddressSpace::reload`].
    pub fn ensure_loaded(&mut self) -> Result<()>
    {
        if self.loaded {
            return Ok(());
        }
        self.reload()
    }

    /// Replace the mapping list with a fresh one from the provider.
    ///
    /// ## Errors
    ///
    /// - `MappingProvider` when the provider fails
    /// - `ResourceExhausted` when the list exceeds the mapping limit, or a
    ///   new image exceeds the image limit
    pub fn reload(&mut self) -> Result<()>
    {
        let mut records = self.provider.load_mappings().map_err(|err| match err {
            CapscopeError::MappingProvider(_) => err,
            other => CapscopeError::MappingProvider(other.to_string()),
        })?;

        if records.len() > self.max_mappings {
            return Err(CapscopeError::ResourceExhausted(format!(
                "{} mappings exceed the limit of {}",
                records.len(),
                self.max_mappings
            )));
        }
        records.sort_by_key(|record| record.start);

        let previous = std::mem::take(&mut self.mappings);
        let mut mappings: Vec<Mapping> = Vec::with_capacity(records.len());
        for record in records {
            let mapping = self.build_mapping(record, &previous, &mappings)?;
            mappings.push(mapping);
        }

        debug!(count = mappings.len(), "reloaded mapping list");
        self.mappings = mappings;
        self.loaded = true;
        Ok(())
    }

    fn build_mapping(&mut self, record: MappingRecord, previous: &[Mapping], current: &[Mapping]) -> Result<Mapping>
    {
        let index = current.len();
        let mut mapping = Mapping {
            start: record.start,
            end: record.end,
            flags: record.flags,
            kind: record.kind,
            base: index,
            path: record.path.filter(|path| !path.is_empty()),
            name: record.name,
        };

        if let Some(path) = mapping.path.as_deref() {
            match current.iter().position(|m| m.path().eq_ignore_ascii_case(path)) {
                Some(anchor) => mapping.base = current[anchor].base,
                None => self.symbols.load(path)?,
            }
            mapping.name = Some(basename(path).to_string());
            return Ok(mapping);
        }

        if let Some(old) = previous
            .iter()
            .find(|old| old.path.is_none() && old.key() == mapping.key() && !old.name().is_empty())
        {
            mapping.name = old.name.clone();
            let owner_path = previous.get(old.base).map_or("", Mapping::path);
            if !owner_path.is_empty() {
                if let Some(anchor) = current.iter().position(|m| m.path().eq_ignore_ascii_case(owner_path)) {
                    mapping.base = current[anchor].base;
                }
            }
            return Ok(mapping);
        }

        if mapping.name.is_none() && mapping.is_accessible() {
            let image = current.iter().enumerate().rev().find(|(i, anchor)| {
                anchor.base == *i
                    && self
                        .symbols
                        .find_section_kind(anchor.path(), anchor.start, mapping.start, mapping.end)
                        .is_some()
            });
            if let Some((anchor, image)) = image {
                trace!(start = %mapping.start, image = image.name(), "folded anonymous mapping into image");
                mapping.base = anchor;
                mapping.name = image.name.clone();
            }
        }
        Ok(mapping)
    }

    fn index_of(&self, address: Address) -> Option<usize>
    {
        for (i, mapping) in self.mappings.iter().enumerate() {
            if address >= mapping.end {
                continue;
            }
            if address < mapping.start {
                break;
            }
            return Some(i);
        }
        None
    }

    fn resolve_index(&mut self, address: Address) -> Result<Option<usize>>
    {
        if let Some(index) = self.index_of(address) {
            return Ok(Some(index));
        }
        trace!(%address, "address not mapped, reloading");
        self.reload()?;
        Ok(self.index_of(address))
    }

    /// The mapping containing `address`.
    ///
    /// A miss reloads the list once and retries; a second miss is `None`.
    ///
    /// ## Errors
    ///
    /// Errors of [`AddressSpace::reload`].
    pub fn resolve(&mut self, address: Address) -> Result<Option<&Mapping>>
    {
        Ok(self.resolve_index(address)?.map(|index| &self.mappings[index]))
    }

    /// The mapping containing `address` in the current list, without reloading.
    pub fn mapping_at(&self, address: Address) -> Option<&Mapping>
    {
        self.index_of(address).map(|index| &self.mappings[index])
    }

    /// Mapping anchoring the image that owns `mapping`.
    pub fn owner_of<'a>(&'a self, mapping: &'a Mapping) -> &'a Mapping
    {
        self.mappings.get(mapping.base).unwrap_or(mapping)
    }

    /// Load address of the image owning `mapping`.
    pub fn base_of(&self, mapping: &Mapping) -> Address
    {
        self.owner_of(mapping).start
    }

    /// Name the path-less mapping `key` as `[owner!tag]`, or `[tag]`.
    ///
    /// Returns `false` and changes nothing when the mapping is unknown, is
    /// file-backed, or already carries an owner-qualified name.
    pub fn set_mapping_name(&mut self, key: MappingKey, owner: Option<&str>, tag: &str) -> bool
    {
        let Some(mapping) = self.mappings.iter_mut().find(|m| m.key() == key) else {
            return false;
        };
        if mapping.path.is_some() || mapping.name().contains(OWNER_SEPARATOR) {
            return false;
        }

        let name = match owner.filter(|owner| !owner.is_empty()) {
            Some(owner) => format!("[{owner}{OWNER_SEPARATOR}{tag}]"),
            None => format!("[{tag}]"),
        };
        debug!(start = %mapping.start, %name, "named mapping");
        mapping.name = Some(name);
        true
    }

    /// Name the region holding `region` after the image holding `owner`.
    ///
    /// Hosts call this once before walking, e.g. with the address of a
    /// function and a local variable, to get `[demo!stack]`.
    ///
    /// ## Errors
    ///
    /// Errors of [`AddressSpace::reload`].
    pub fn name_region(&mut self, owner: Address, region: Address, tag: &str) -> Result<bool>
    {
        let owner_name = self
            .resolve(owner)?
            .map(|mapping| mapping.name().to_string())
            .filter(|name| !name.is_empty());
        let Some(key) = self.resolve(region)?.map(Mapping::key) else {
            return Ok(false);
        };
        Ok(self.set_mapping_name(key, owner_name.as_deref(), tag))
    }

    /// Whether a slot scan may read at `address`.
    ///
    /// For an inaccessible mapping, the second value is the last
    /// `slot`-sized position before its end, so a scanning caller can step
    /// over the whole mapping. Addresses outside every mapping skip to the
    /// last slot before the next mapping, if there is one.
    pub fn check_address_valid(&self, address: Address, slot: u64) -> (bool, Option<Address>)
    {
        match self.mapping_at(address) {
            Some(mapping) if mapping.is_accessible() => (true, None),
            Some(mapping) => (false, mapping.end.checked_sub(slot)),
            None => {
                let next = self.mappings.iter().find(|m| m.start > address);
                (false, next.and_then(|m| m.start.checked_sub(slot)))
            }
        }
    }

    /// Resolve `address` to `image!symbol+0xN` form.
    ///
    /// ## Errors
    ///
    /// Errors of [`AddressSpace::reload`].
    pub fn resolve_name(&mut self, address: Address) -> Result<ResolvedName>
    {
        let Some(index) = self.resolve_index(address)? else {
            return Ok(ResolvedName::Unresolved(address));
        };
        let mapping = &self.mappings[index];
        let owner = self.owner_of(mapping);
        let base = owner.start;

        let name = mapping.name();
        if name.is_empty() {
            return Ok(ResolvedName::Unresolved(address));
        }

        if owner.path().is_empty() {
            return Ok(ResolvedName::Region {
                name: name.to_string(),
                offset: address.offset_from(base),
            });
        }

        Ok(match self.symbols.find_symbol(owner.path(), base, address) {
            Some(symbol) => ResolvedName::Symbol {
                image: name.to_string(),
                symbol: symbol.name.raw().to_string(),
                offset: address.offset_from(base.saturating_add(symbol.value)),
            },
            None => ResolvedName::Image {
                image: name.to_string(),
                offset: address.offset_from(base),
            },
        })
    }

    /// Every mapping with some protection, one per line.
    pub fn listing(&self) -> MappingListing<'_>
    {
        MappingListing {
            mappings: &self.mappings,
        }
    }
}

/// Display adapter for [`AddressSpace::listing`].
pub struct MappingListing<'a>
{
    mappings: &'a [Mapping],
}

impl fmt::Display for MappingListing<'_>
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        for mapping in self.mappings {
            if (mapping.flags & MappingFlags::PROTECTION).is_empty() {
                continue;
            }
            let base = self.mappings.get(mapping.base).map_or(mapping.start, |owner| owner.start);
            writeln!(f, "{mapping} [base {base:#x}]")?;
        }
        Ok(())
    }
}

fn basename(path: &str) -> &str
{
    path.rsplit('/').next().unwrap_or(path)
}
