//! # Inspector Configuration
//!
//! Limits and provider choices for one inspection session.
//!
//! ## Environment Variables
//!
//! - `CAPSCOPE_NM`: symbol dump program (default `nm`)
//! - `CAPSCOPE_SYMBOLS`: `nm` or `object` (default `nm`)
//! - `CAPSCOPE_MAPPINGS`: `auto`, `procstat` or `maps` (default `auto`)
//! - `CAPSCOPE_MAX_MAPPINGS`: mapping list limit (default 4096)
//! - `CAPSCOPE_MAX_IMAGES`: image cache limit (default 256)
//! - `CAPSCOPE_MAX_RANGES`: visited set limit (default 8192)
//!
//! ```rust
//! use capscope_core::config::{InspectorConfig, SymbolSource};
//!
//! let config = InspectorConfig::default();
//! assert_eq!(config.symbols, SymbolSource::Nm);
//! assert_eq!(config.max_images, 256);
//! ```

use std::env;
use std::str::FromStr;

use tracing::warn;

use crate::address_space::{AddressSpace, MappingSource, ProcessMappings};
use crate::error::{CapscopeError, Result};
use crate::symbols::{NmSymbols, ObjectSymbols, SymbolProvider, SymbolTable};
use crate::types::{ProcessId, Symbol};
use crate::walker::WalkConfig;

/// Which symbol provider to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SymbolSource
{
    /// Run `nm`
    #[default]
    Nm,
    /// Read object files in-process
    Object,
}

impl FromStr for SymbolSource
{
    type Err = CapscopeError;

    fn from_str(s: &str) -> Result<Self>
    {
        match s.to_ascii_lowercase().as_str() {
            "nm" => Ok(SymbolSource::Nm),
            "object" | "obj" => Ok(SymbolSource::Object),
            other => Err(CapscopeError::InvalidArgument(format!(
                "unknown symbol source '{other}' (expected nm or object)"
            ))),
        }
    }
}

/// Symbol provider selected by [`SymbolSource`].
#[derive(Debug, Clone)]
pub enum Symbols
{
    /// `nm` subprocess
    Nm(NmSymbols),
    /// `object` crate
    Object(ObjectSymbols),
}

impl SymbolProvider for Symbols
{
    fn load_symbols(&self, path: &str) -> Result<Vec<Symbol>>
    {
        match self {
            Symbols::Nm(provider) => provider.load_symbols(path),
            Symbols::Object(provider) => provider.load_symbols(path),
        }
    }
}

/// Session-wide settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InspectorConfig
{
    /// `nm` binary
    pub nm: String,
    /// Symbol provider
    pub symbols: SymbolSource,
    /// Mapping list layout
    pub mappings: MappingSource,
    /// Most mappings accepted from one reload
    pub max_mappings: usize,
    /// Most images kept in the symbol cache
    pub max_images: usize,
    /// Most entries in a walk's visited set
    pub max_ranges: usize,
}

impl Default for InspectorConfig
{
    fn default() -> Self
    {
        Self {
            nm: "nm".to_string(),
            symbols: SymbolSource::Nm,
            mappings: MappingSource::Auto,
            max_mappings: 4096,
            max_images: 256,
            max_ranges: 8192,
        }
    }
}

impl InspectorConfig
{
    /// Defaults overridden by `CAPSCOPE_*` variables.
    ///
    /// Unparseable values are reported and ignored.
    pub fn from_env() -> Self
    {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self
    {
        let mut config = Self::default();

        if let Some(nm) = lookup("CAPSCOPE_NM").filter(|nm| !nm.is_empty()) {
            config.nm = nm;
        }
        override_with(&lookup, "CAPSCOPE_SYMBOLS", &mut config.symbols);
        override_with(&lookup, "CAPSCOPE_MAPPINGS", &mut config.mappings);
        override_with(&lookup, "CAPSCOPE_MAX_MAPPINGS", &mut config.max_mappings);
        override_with(&lookup, "CAPSCOPE_MAX_IMAGES", &mut config.max_images);
        override_with(&lookup, "CAPSCOPE_MAX_RANGES", &mut config.max_ranges);
        config
    }

    /// The configured symbol provider.
    pub fn symbol_provider(&self) -> Symbols
    {
        match self.symbols {
            SymbolSource::Nm => Symbols::Nm(NmSymbols::new(self.nm.clone())),
            SymbolSource::Object => Symbols::Object(ObjectSymbols),
        }
    }

    /// An empty symbol table using the configured provider and limit.
    pub fn symbol_table(&self) -> SymbolTable<Symbols>
    {
        SymbolTable::new(self.symbol_provider(), self.max_images)
    }

    /// Address-space model of process `pid`.
    pub fn address_space(&self, pid: ProcessId) -> AddressSpace<ProcessMappings, Symbols>
    {
        AddressSpace::new(
            ProcessMappings::new(pid, self.mappings),
            self.symbol_table(),
            self.max_mappings,
        )
    }

    /// Walk settings carrying the visited-range limit.
    pub fn walk_config(&self) -> WalkConfig
    {
        WalkConfig {
            max_ranges: self.max_ranges,
            ..WalkConfig::default()
        }
    }
}

fn override_with<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, slot: &mut T)
{
    let Some(raw) = lookup(key) else {
        return;
    };
    match raw.parse() {
        Ok(value) => *slot = value,
        Err(_) => warn!(key, value = %raw, "ignoring invalid setting"),
    }
}

#[cfg(test)]
mod tests
{
    use std::collections::HashMap;

    use super::*;

    fn config_from(pairs: &[(&str, &str)]) -> InspectorConfig
    {
        let vars: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        InspectorConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults_without_environment()
    {
        assert_eq!(config_from(&[]), InspectorConfig::default());
    }

    #[test]
    fn test_overrides()
    {
        let config = config_from(&[
            ("CAPSCOPE_NM", "llvm-nm"),
            ("CAPSCOPE_SYMBOLS", "object"),
            ("CAPSCOPE_MAPPINGS", "procstat"),
            ("CAPSCOPE_MAX_RANGES", "16"),
        ]);
        assert_eq!(config.nm, "llvm-nm");
        assert_eq!(config.symbols, SymbolSource::Object);
        assert_eq!(config.mappings, MappingSource::Procstat);
        assert_eq!(config.walk_config().max_ranges, 16);
        assert_eq!(config.max_mappings, 4096);
    }

    #[test]
    fn test_invalid_values_are_ignored()
    {
        let config = config_from(&[("CAPSCOPE_MAX_IMAGES", "lots"), ("CAPSCOPE_SYMBOLS", "dwarf")]);
        assert_eq!(config.max_images, 256);
        assert_eq!(config.symbols, SymbolSource::Nm);
    }
}
