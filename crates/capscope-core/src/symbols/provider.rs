//! Symbol providers.
//!
//! A provider turns an image path into an address-ascending list of
//! `(value, type, name)` symbols. Two are built in:
//!
//! - [`NmSymbols`] runs `nm -ne <path>` and falls back to the dynamic symbol
//!   table (`nm -Dne <path>`) when the full dump is empty, as it is for
//!   stripped shared libraries.
//! - [`ObjectSymbols`] reads the file in-process with the `object` crate and
//!   maps section kinds onto nm's one-character type alphabet.
//!
//! Any `Fn(&str) -> Result<Vec<Symbol>>` closure is also a provider.

use std::fs;
use std::process::{Command, Stdio};

use object::{Object, ObjectSection, ObjectSymbol, SymbolKind, SymbolSection};
use tracing::{debug, trace};

use super::demangle::make_symbol_name;
use crate::error::{CapscopeError, Result};
use crate::types::Symbol;

/// Source of symbol dumps for images.
pub trait SymbolProvider
{
    /// Symbols of the image at `path`, ascending by value.
    ///
    /// ## Errors
    ///
    /// `SymbolProvider` when no symbols could be obtained for `path`.
    fn load_symbols(&self, path: &str) -> Result<Vec<Symbol>>;
}

impl<F> SymbolProvider for F
where
    F: Fn(&str) -> Result<Vec<Symbol>>,
{
    fn load_symbols(&self, path: &str) -> Result<Vec<Symbol>>
    {
        self(path)
    }
}

/// Parse `nm` output (`VALUE TYPE NAME` per line, value in hex).
///
/// Lines without a value, such as undefined symbols (`         U free`), and
/// anything else that does not fit are skipped.
///
/// ```rust
/// use capscope_core::symbols::parse_nm_output;
///
/// let symbols = parse_nm_output("                 U free\n0000000000001a40 T main\n");
/// assert_eq!(symbols.len(), 1);
/// assert_eq!(symbols[0].value, 0x1a40);
/// assert_eq!(symbols[0].kind, 'T');
/// ```
pub fn parse_nm_output(text: &str) -> Vec<Symbol>
{
    text.lines().filter_map(parse_nm_line).collect()
}

fn parse_nm_line(line: &str) -> Option<Symbol>
{
    let mut fields = line.split_whitespace();
    let value = u64::from_str_radix(fields.next()?.trim_start_matches("0x"), 16).ok()?;
    let kind = fields.next()?;
    let name = fields.next()?;

    let mut chars = kind.chars();
    let kind = chars.next()?;
    if chars.next().is_some() {
        return None;
    }

    Some(Symbol {
        value,
        name: make_symbol_name(name.to_string()),
        kind,
    })
}

/// Symbols from the `nm` utility.
#[derive(Debug, Clone)]
pub struct NmSymbols
{
    program: String,
}

impl Default for NmSymbols
{
    fn default() -> Self
    {
        Self::new("nm")
    }
}

impl NmSymbols
{
    /// Use `program` as the nm binary.
    pub fn new(program: impl Into<String>) -> Self
    {
        Self {
            program: program.into(),
        }
    }

    fn run(&self, args: &[&str], path: &str) -> Result<Vec<Symbol>>
    {
        trace!(program = %self.program, ?args, path, "running symbol dump");
        let output = Command::new(&self.program)
            .args(args)
            .arg(path)
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output()
            .map_err(|err| CapscopeError::SymbolProvider {
                path: path.into(),
                details: format!("failed to run {}: {err}", self.program),
            })?;

        Ok(parse_nm_output(&String::from_utf8_lossy(&output.stdout)))
    }
}

impl SymbolProvider for NmSymbols
{
    fn load_symbols(&self, path: &str) -> Result<Vec<Symbol>>
    {
        let symbols = self.run(&["-ne"], path)?;
        if !symbols.is_empty() {
            return Ok(symbols);
        }

        debug!(path, "no static symbols, retrying with dynamic symbols");
        let symbols = self.run(&["-Dne"], path)?;
        if symbols.is_empty() {
            return Err(CapscopeError::SymbolProvider {
                path: path.into(),
                details: format!("{} produced no symbols", self.program),
            });
        }
        Ok(symbols)
    }
}

/// Symbols read in-process with the `object` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct ObjectSymbols;

impl ObjectSymbols
{
    fn collect<'data>(file: &object::File<'data>, dynamic: bool) -> Vec<Symbol>
    {
        let iter: Box<dyn Iterator<Item = object::Symbol<'data, '_>> + '_> = if dynamic {
            Box::new(file.dynamic_symbols())
        } else {
            Box::new(file.symbols())
        };

        let mut symbols: Vec<Symbol> = iter
            .filter(|symbol| !symbol.is_undefined())
            .filter(|symbol| !matches!(symbol.kind(), SymbolKind::File | SymbolKind::Section))
            .filter_map(|symbol| {
                let name = symbol.name().ok().filter(|name| !name.is_empty())?;
                Some(Symbol {
                    value: symbol.address(),
                    name: make_symbol_name(name.to_string()),
                    kind: type_char(file, &symbol),
                })
            })
            .collect();
        symbols.sort_by_key(|symbol| symbol.value);
        symbols
    }
}

/// nm-style type character for an `object` symbol.
fn type_char<'data>(file: &object::File<'data>, symbol: &object::Symbol<'data, '_>) -> char
{
    let kind = match symbol.section() {
        SymbolSection::Common => 'C',
        SymbolSection::Absolute => 'A',
        SymbolSection::Section(index) => match file.section_by_index(index).map(|section| section.kind()) {
            Ok(object::SectionKind::Text) => 'T',
            Ok(object::SectionKind::UninitializedData | object::SectionKind::UninitializedTls) => 'B',
            Ok(object::SectionKind::Data | object::SectionKind::Tls) => 'D',
            Ok(
                object::SectionKind::ReadOnlyData
                | object::SectionKind::ReadOnlyDataWithRel
                | object::SectionKind::ReadOnlyString,
            ) => 'R',
            _ => 'N',
        },
        _ => '?',
    };

    if symbol.is_global() || kind == 'C' {
        kind
    } else {
        kind.to_ascii_lowercase()
    }
}

impl SymbolProvider for ObjectSymbols
{
    fn load_symbols(&self, path: &str) -> Result<Vec<Symbol>>
    {
        let data = fs::read(path).map_err(|err| CapscopeError::SymbolProvider {
            path: path.into(),
            details: err.to_string(),
        })?;
        let file = object::File::parse(&*data).map_err(|err| CapscopeError::SymbolProvider {
            path: path.into(),
            details: format!("failed to parse: {err}"),
        })?;

        let symbols = Self::collect(&file, false);
        if !symbols.is_empty() {
            return Ok(symbols);
        }

        debug!(path, "no static symbols, using dynamic symbol table");
        let symbols = Self::collect(&file, true);
        if symbols.is_empty() {
            return Err(CapscopeError::SymbolProvider {
                path: path.into(),
                details: "image has no symbols".to_string(),
            });
        }
        Ok(symbols)
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_parse_nm_skips_malformed_lines()
    {
        let text = "\
0000000000000000 T _start
                 U malloc
garbage
0000000000000010 bss_without_name
0000000000000020 d local_data
";
        let symbols = parse_nm_output(text);
        let names: Vec<_> = symbols.iter().map(|s| (s.value, s.kind, s.name.raw().to_string())).collect();
        assert_eq!(
            names,
            vec![(0, 'T', "_start".to_string()), (0x20, 'd', "local_data".to_string())]
        );
    }

    #[test]
    fn test_parse_nm_accepts_prefixed_values()
    {
        let symbols = parse_nm_output("0x40 R table\n");
        assert_eq!(symbols[0].value, 0x40);
    }

    #[test]
    fn test_missing_nm_binary_is_a_provider_error()
    {
        let provider = NmSymbols::new("/nonexistent/capscope-nm");
        let err = provider.load_symbols("/bin/sh").unwrap_err();
        assert!(matches!(err, CapscopeError::SymbolProvider { .. }));
    }

    #[test]
    fn test_object_provider_rejects_non_object_files()
    {
        let path = std::env::temp_dir().join(format!("capscope-not-an-object-{}", std::process::id()));
        std::fs::write(&path, b"definitely not an object file").unwrap();
        let err = ObjectSymbols.load_symbols(path.to_str().unwrap()).unwrap_err();
        std::fs::remove_file(&path).ok();
        assert!(matches!(err, CapscopeError::SymbolProvider { .. }));
    }
}
