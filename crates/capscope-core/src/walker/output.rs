//! Walk output records.

use std::fmt;

use crate::address_space::ResolvedName;
use crate::types::Address;

/// Where a discovered capability was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Label
{
    /// A root register (`csp`, `c3`, `pcc`, ...).
    Register(String),
    /// The memory slot the capability was loaded from.
    Slot(Address),
}

impl fmt::Display for Label
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            Label::Register(name) => f.write_str(name),
            Label::Slot(slot) => write!(f, "{slot:#x}"),
        }
    }
}

/// One valid capability reached by a walk.
///
/// Displays as one trace line, indented two spaces per level:
///
/// ```text
/// c1 0x40001000  demo!g
///   0x40001000 0x40001008  demo!g+0x8
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Discovery
{
    /// 0 for roots
    pub depth: usize,
    /// Register name or origin slot
    pub label: Label,
    /// The capability's address
    pub address: Address,
    /// Resolved form of `address`
    pub name: ResolvedName,
}

impl fmt::Display for Discovery
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(
            f,
            "{:indent$}{} {:#x}  {}",
            "",
            self.label,
            self.address,
            self.name,
            indent = self.depth * 2
        )
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_line_format()
    {
        let root = Discovery {
            depth: 0,
            label: Label::Register("c1".into()),
            address: Address::new(0x4000),
            name: ResolvedName::Symbol {
                image: "demo".into(),
                symbol: "g".into(),
                offset: 0,
            },
        };
        assert_eq!(root.to_string(), "c1 0x4000  demo!g");

        let child = Discovery {
            depth: 2,
            label: Label::Slot(Address::new(0x4010)),
            address: Address::new(0x9000),
            name: ResolvedName::Unresolved(Address::new(0x9000)),
        };
        assert_eq!(child.to_string(), "    0x4010 0x9000  0x9000");
    }
}
