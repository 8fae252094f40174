//! Mapping providers and the record parsers behind them.
//!
//! Two textual layouts are understood:
//!
//! - `procstat -v`: `PID START END PRT RES PRES REF SHD FLAG TP PATH`, with
//!   the capability-aware five-character protection field.
//! - `/proc/<pid>/maps`: `start-end perms offset dev inode [path]`.
//!
//! Both are reduced to [`MappingRecord`]s; nothing else about the OS
//! utilities leaks into the address-space model.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::str::FromStr;

use tracing::{debug, trace};

use crate::error::{CapscopeError, Result};
use crate::types::{Address, MappingFlags, MappingRecord, MappingType, ProcessId};

/// Source of the current mapping list.
pub trait MappingProvider
{
    /// The complete mapping list, in any order.
    ///
    /// ## Errors
    ///
    /// `MappingProvider` when no list can be produced.
    fn load_mappings(&mut self) -> Result<Vec<MappingRecord>>;
}

impl<F> MappingProvider for F
where
    F: FnMut() -> Result<Vec<MappingRecord>>,
{
    fn load_mappings(&mut self) -> Result<Vec<MappingRecord>>
    {
        self()
    }
}

/// Which textual layout to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MappingSource
{
    /// `/proc/<pid>/maps` when it exists, `procstat -v` otherwise; for saved
    /// dumps, decided per line.
    #[default]
    Auto,
    /// `procstat -v`
    Procstat,
    /// `/proc/<pid>/maps`
    Maps,
}

impl FromStr for MappingSource
{
    type Err = CapscopeError;

    fn from_str(s: &str) -> Result<Self>
    {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(MappingSource::Auto),
            "procstat" => Ok(MappingSource::Procstat),
            "maps" => Ok(MappingSource::Maps),
            other => Err(CapscopeError::InvalidArgument(format!(
                "unknown mapping source '{other}' (expected auto, procstat or maps)"
            ))),
        }
    }
}

fn parse_hex(text: &str) -> Option<Address>
{
    let digits = text.strip_prefix("0x").unwrap_or(text);
    u64::from_str_radix(digits, 16).ok().map(Address::new)
}

/// Parse one `procstat -v` line.
///
/// `Ok(None)` for lines that are not records: the header and anything with
/// fewer than five fields.
///
/// ```rust
/// use capscope_core::address_space::parse_procstat_line;
/// use capscope_core::types::{MappingFlags, MappingType};
///
/// let line = " 1234 0x40000000 0x40001000 r-xR- 1 3 4 1 CN--- vn /bin/ls";
/// let record = parse_procstat_line(line, 1).unwrap().unwrap();
/// assert_eq!(record.path.as_deref(), Some("/bin/ls"));
/// assert_eq!(record.kind, MappingType::Vnode);
/// assert!(record.flags.contains(MappingFlags::EXEC | MappingFlags::COW));
/// ```
///
/// ## Errors
///
/// `Parse` when a record-shaped line has unreadable addresses.
pub fn parse_procstat_line(line: &str, number: usize) -> Result<Option<MappingRecord>>
{
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < 5 || fields[0].parse::<u32>().is_err() {
        return Ok(None);
    }

    let (Some(start), Some(end)) = (parse_hex(fields[1]), parse_hex(fields[2])) else {
        return Err(CapscopeError::Parse {
            line: number,
            details: format!("expected hexadecimal START and END, got '{} {}'", fields[1], fields[2]),
        });
    };
    check_order(start, end, number)?;

    let mut flags = MappingFlags::from_protection(fields[3]);
    if let Some(vm_flags) = fields.get(8) {
        flags |= MappingFlags::from_procstat_flags(vm_flags);
    }
    let kind = fields.get(9).map_or(MappingType::Unknown, |code| MappingType::from_code(code));
    let path = (fields.len() > 10).then(|| fields[10..].join(" "));

    Ok(Some(MappingRecord {
        start,
        end,
        flags,
        kind,
        path,
        name: None,
    }))
}

/// Parse one `/proc/<pid>/maps` line.
///
/// Bracketed pseudo-paths such as `[stack]` and `[heap]` name a path-less
/// record instead of backing it. Maps carry no capability permissions, so
/// readable private or shared memory is marked `READ_CAP` and writable memory
/// `WRITE_CAP`, which is what a purecap kernel grants by default.
///
/// ## Errors
///
/// `Parse` for non-empty lines that are not maps records.
pub fn parse_maps_line(line: &str, number: usize) -> Result<Option<MappingRecord>>
{
    let mut fields = line.split_whitespace();
    let Some(range) = fields.next() else {
        return Ok(None);
    };

    let parse_error = |details: String| CapscopeError::Parse { line: number, details };

    let (start, end) = range
        .split_once('-')
        .and_then(|(start, end)| Some((parse_hex(start)?, parse_hex(end)?)))
        .ok_or_else(|| parse_error(format!("expected start-end, got '{range}'")))?;
    check_order(start, end, number)?;

    let perms = fields
        .next()
        .ok_or_else(|| parse_error("missing permissions".to_string()))?;
    let mut flags = MappingFlags::from_protection(perms);
    if flags.contains(MappingFlags::READ) {
        flags |= MappingFlags::READ_CAP;
    }
    if flags.contains(MappingFlags::WRITE) {
        flags |= MappingFlags::WRITE_CAP;
    }
    match perms.as_bytes().get(3) {
        Some(b's') => flags |= MappingFlags::SHARED,
        Some(b'p') => flags |= MappingFlags::PRIVATE,
        _ => {}
    }

    // offset, dev, inode
    let rest: Vec<&str> = fields.skip(3).collect();
    let target = rest.join(" ");

    let mut record = MappingRecord::anonymous(start, end, flags);
    if target.starts_with('[') && target.ends_with(']') {
        record.name = Some(target);
    } else if !target.is_empty() {
        record.kind = MappingType::Vnode;
        record.path = Some(target);
    }
    if record.name.as_deref() == Some("[stack]") {
        record.flags |= MappingFlags::GROWS_DOWN;
    }
    Ok(Some(record))
}

fn check_order(start: Address, end: Address, number: usize) -> Result<()>
{
    if end < start {
        return Err(CapscopeError::Parse {
            line: number,
            details: format!("end {end} precedes start {start}"),
        });
    }
    Ok(())
}

/// Parse a complete dump in the given layout.
///
/// With [`MappingSource::Auto`] each line is read as maps when its first
/// field looks like `start-end`, as procstat otherwise.
///
/// ## Errors
///
/// `Parse` for the first malformed record.
pub fn parse_mappings(text: &str, source: MappingSource) -> Result<Vec<MappingRecord>>
{
    let mut records = Vec::new();
    for (index, line) in text.lines().enumerate() {
        let number = index + 1;
        let record = match source {
            MappingSource::Procstat => parse_procstat_line(line, number)?,
            MappingSource::Maps => parse_maps_line(line, number)?,
            MappingSource::Auto => {
                let first = line.split_whitespace().next().unwrap_or("");
                if first.contains('-') {
                    parse_maps_line(line, number)?
                } else {
                    parse_procstat_line(line, number)?
                }
            }
        };
        records.extend(record);
    }
    Ok(records)
}

/// Mappings of a live process.
#[derive(Debug, Clone)]
pub struct ProcessMappings
{
    pid: ProcessId,
    source: MappingSource,
    procstat: String,
}

impl ProcessMappings
{
    /// Read the mappings of `pid` from `source`.
    pub fn new(pid: ProcessId, source: MappingSource) -> Self
    {
        Self {
            pid,
            source,
            procstat: "procstat".to_string(),
        }
    }

    /// Mappings of the calling process.
    pub fn current() -> Self
    {
        Self::new(ProcessId::current(), MappingSource::Auto)
    }

    /// Use `program` instead of `procstat`.
    #[must_use]
    pub fn with_procstat(mut self, program: impl Into<String>) -> Self
    {
        self.procstat = program.into();
        self
    }

    fn maps_path(&self) -> PathBuf
    {
        PathBuf::from(format!("/proc/{}/maps", self.pid))
    }

    fn resolved_source(&self) -> MappingSource
    {
        match self.source {
            MappingSource::Auto if self.maps_path().exists() => MappingSource::Maps,
            MappingSource::Auto => MappingSource::Procstat,
            source => source,
        }
    }

    fn run_procstat(&self) -> Result<String>
    {
        let output = Command::new(&self.procstat)
            .arg("-v")
            .arg(self.pid.to_string())
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output()
            .map_err(|err| CapscopeError::MappingProvider(format!("failed to run {}: {err}", self.procstat)))?;

        if !output.status.success() {
            return Err(CapscopeError::MappingProvider(format!(
                "{} -v {} exited with {}",
                self.procstat, self.pid, output.status
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl MappingProvider for ProcessMappings
{
    fn load_mappings(&mut self) -> Result<Vec<MappingRecord>>
    {
        let source = self.resolved_source();
        trace!(pid = %self.pid, ?source, "loading mappings");

        let text = match source {
            MappingSource::Maps => fs::read_to_string(self.maps_path()).map_err(|err| {
                CapscopeError::MappingProvider(format!("{}: {err}", self.maps_path().display()))
            })?,
            _ => self.run_procstat()?,
        };

        let records = parse_mappings(&text, source)?;
        if records.is_empty() {
            return Err(CapscopeError::MappingProvider(format!(
                "no mappings listed for process {}",
                self.pid
            )));
        }
        debug!(pid = %self.pid, count = records.len(), "loaded mappings");
        Ok(records)
    }
}

/// Mappings from a saved dump, re-read on every load.
#[derive(Debug, Clone)]
pub struct FileMappings
{
    path: PathBuf,
    source: MappingSource,
}

impl FileMappings
{
    /// Read `path` in the `source` layout.
    pub fn new(path: impl AsRef<Path>, source: MappingSource) -> Self
    {
        Self {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

impl MappingProvider for FileMappings
{
    fn load_mappings(&mut self) -> Result<Vec<MappingRecord>>
    {
        let text = fs::read_to_string(&self.path)
            .map_err(|err| CapscopeError::MappingProvider(format!("{}: {err}", self.path.display())))?;
        parse_mappings(&text, self.source)
    }
}
