//! Symbol types.

use std::fmt;

/// A raw symbol name and its demangled form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolName
{
    raw: String,
    demangled: Option<String>,
}

impl SymbolName
{
    /// Construct from a raw linkage name.
    pub fn new(raw: String, demangled: Option<String>) -> Self
    {
        Self { raw, demangled }
    }

    /// Raw (mangled) name as dumped from the image.
    pub fn raw(&self) -> &str
    {
        &self.raw
    }

    /// Demangled human-friendly name if available.
    pub fn demangled(&self) -> Option<&str>
    {
        self.demangled.as_deref()
    }

    /// Preferred presentation (demangled fallback to raw).
    pub fn display_name(&self) -> &str
    {
        self.demangled.as_deref().unwrap_or(&self.raw)
    }
}

impl fmt::Display for SymbolName
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{}", self.display_name())
    }
}

/// Coarse section class derived from nm type characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SectionKind
{
    /// `T`, `t`
    Text,
    /// `B`, `C`, `b`
    Bss,
    /// `D`, `R`, `V`, `d`, `r`
    Data,
}

impl SectionKind
{
    /// Classify an nm type character; `None` for kinds outside the three groups.
    ///
    /// ```rust
    /// use capscope_core::types::SectionKind;
    ///
    /// assert_eq!(SectionKind::from_type_char('t'), Some(SectionKind::Text));
    /// assert_eq!(SectionKind::from_type_char('C'), Some(SectionKind::Bss));
    /// assert_eq!(SectionKind::from_type_char('U'), None);
    /// ```
    pub fn from_type_char(kind: char) -> Option<Self>
    {
        match kind {
            'T' | 't' => Some(SectionKind::Text),
            'B' | 'C' | 'b' => Some(SectionKind::Bss),
            'D' | 'R' | 'V' | 'd' | 'r' => Some(SectionKind::Data),
            _ => None,
        }
    }

    /// Lowercase label (`text`, `bss`, `data`).
    pub const fn as_str(self) -> &'static str
    {
        match self {
            SectionKind::Text => "text",
            SectionKind::Bss => "bss",
            SectionKind::Data => "data",
        }
    }
}

impl fmt::Display for SectionKind
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.write_str(self.as_str())
    }
}

/// One entry of an image's symbol table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol
{
    /// Offset from the image's load base
    pub value: u64,
    /// Symbol name
    pub name: SymbolName,
    /// nm type character (`T`, `b`, `D`, ...)
    pub kind: char,
}

impl Symbol
{
    /// Section class of this symbol, if it has one.
    pub fn section_kind(&self) -> Option<SectionKind>
    {
        SectionKind::from_type_char(self.kind)
    }
}

impl fmt::Display for Symbol
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{:#x} {} {}", self.value, self.kind, self.name)
    }
}
