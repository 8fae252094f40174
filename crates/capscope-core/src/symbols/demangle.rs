//! Symbol demangling utilities.
//!
//! Symbol dumps carry raw linkage names. This module attaches a demangled
//! form when `rustc-demangle` recognises the mangling, legacy (`_ZN...E`)
//! or v0 (`_R...`).
//!
//! Resolved capability names always print the raw name so that output is
//! stable across toolchains; the demangled form is for listings.

use rustc_demangle::try_demangle;

use crate::types::SymbolName;

/// Create a `SymbolName` from a raw symbol string.
pub(crate) fn make_symbol_name(raw: String) -> SymbolName
{
    let demangled = try_demangle(&raw).ok().map(|d| format!("{d:#}"));
    SymbolName::new(raw, demangled)
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_plain_c_name()
    {
        let name = make_symbol_name("lib1_int".to_string());
        assert_eq!(name.raw(), "lib1_int");
        assert_eq!(name.demangled(), None);
        assert_eq!(name.display_name(), "lib1_int");
    }

    #[test]
    fn test_itanium_cpp_name_stays_raw()
    {
        let name = make_symbol_name("_Z3foov".to_string());
        assert_eq!(name.demangled(), None);
        assert_eq!(name.display_name(), "_Z3foov");
    }

    #[test]
    fn test_legacy_rust_name()
    {
        let name = make_symbol_name("_ZN4core3fmt5write17h0123456789abcdefE".to_string());
        assert_eq!(name.raw(), "_ZN4core3fmt5write17h0123456789abcdefE");
        assert_eq!(name.display_name(), "core::fmt::write");
    }
}
