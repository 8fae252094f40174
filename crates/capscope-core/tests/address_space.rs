//! Tests for the address-space model

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use capscope_core::address_space::{AddressSpace, MappingProvider, ResolvedName};
use capscope_core::error::{CapscopeError, Result};
use capscope_core::symbols::{parse_nm_output, SymbolProvider, SymbolTable};
use capscope_core::types::{Address, MappingFlags, MappingRecord, Symbol};

const SLOT: u64 = 16;

fn rw() -> MappingFlags
{
    MappingFlags::from_protection("rw-RW")
}

fn anon(start: u64, end: u64) -> MappingRecord
{
    MappingRecord::anonymous(Address::new(start), Address::new(end), rw())
}

fn file(start: u64, end: u64, path: &str) -> MappingRecord
{
    MappingRecord::file(Address::new(start), Address::new(end), MappingFlags::from_protection("r-xR-"), path)
}

/// Provider that returns each listed snapshot in turn, repeating the last.
struct Scripted
{
    lists: Vec<Vec<MappingRecord>>,
    loads: Rc<Cell<usize>>,
}

impl MappingProvider for Scripted
{
    fn load_mappings(&mut self) -> Result<Vec<MappingRecord>>
    {
        let index = self.loads.get().min(self.lists.len() - 1);
        self.loads.set(self.loads.get() + 1);
        Ok(self.lists[index].clone())
    }
}

fn symbols(path: &str) -> Result<Vec<Symbol>>
{
    Ok(match path {
        "/bin/demo" => parse_nm_output("0 T main\n40 T helper\n3010 B counter\n3020 D table\n"),
        _ => Vec::new(),
    })
}

fn space_with(lists: Vec<Vec<MappingRecord>>) -> (AddressSpace<Scripted, impl SymbolProvider>, Rc<Cell<usize>>)
{
    let loads = Rc::new(Cell::new(0));
    let provider = Scripted {
        lists,
        loads: Rc::clone(&loads),
    };
    (AddressSpace::new(provider, SymbolTable::new(symbols, 16), 64), loads)
}

#[test]
fn test_names_survive_reload()
{
    let list = vec![file(0x1000, 0x2000, "/bin/demo"), anon(0x8000, 0x9000)];
    let (mut space, _) = space_with(vec![list.clone(), list]);
    space.ensure_loaded().unwrap();

    let key = space.mapping_at(Address::new(0x8000)).unwrap().key();
    assert!(space.set_mapping_name(key, Some("demo"), "heap"));

    space.reload().unwrap();
    assert_eq!(space.mapping_at(Address::new(0x8800)).unwrap().name(), "[demo!heap]");
}

#[test]
fn test_changed_range_loses_name()
{
    let (mut space, _) = space_with(vec![
        vec![anon(0x8000, 0x9000)],
        vec![anon(0x8000, 0xa000)],
    ]);
    space.ensure_loaded().unwrap();
    let key = space.mapping_at(Address::new(0x8000)).unwrap().key();
    assert!(space.set_mapping_name(key, None, "heap"));

    space.reload().unwrap();
    assert_eq!(space.mapping_at(Address::new(0x8000)).unwrap().name(), "");
}

#[test]
fn test_set_mapping_name_refusals()
{
    let (mut space, _) = space_with(vec![vec![file(0x1000, 0x2000, "/bin/demo"), anon(0x8000, 0x9000)]]);
    space.ensure_loaded().unwrap();

    let image = space.mapping_at(Address::new(0x1000)).unwrap().key();
    assert!(!space.set_mapping_name(image, None, "stack"));

    let region = space.mapping_at(Address::new(0x8000)).unwrap().key();
    assert!(space.set_mapping_name(region, None, "heap"));
    assert_eq!(space.mapping_at(Address::new(0x8000)).unwrap().name(), "[heap]");

    // An unqualified name may still gain an owner, once.
    assert!(space.set_mapping_name(region, Some("demo"), "heap"));
    assert!(!space.set_mapping_name(region, Some("other"), "stack"));
    assert_eq!(space.mapping_at(Address::new(0x8000)).unwrap().name(), "[demo!heap]");
}

#[test]
fn test_single_retry_on_miss()
{
    let first = vec![file(0x1000, 0x2000, "/bin/demo")];
    let second = vec![file(0x1000, 0x2000, "/bin/demo"), anon(0x8000, 0x9000)];
    let (mut space, loads) = space_with(vec![first, second]);

    assert!(space.resolve(Address::new(0x1000)).unwrap().is_some());
    assert_eq!(loads.get(), 1);

    // Created after the first load: found by the reload
    assert!(space.resolve(Address::new(0x8000)).unwrap().is_some());
    assert_eq!(loads.get(), 2);

    // Never mapped: exactly one more reload, then give up
    assert!(space.resolve(Address::new(0xf000)).unwrap().is_none());
    assert_eq!(loads.get(), 3);
}

#[test]
fn test_check_address_valid_skips()
{
    let guard = MappingRecord::anonymous(Address::new(0x4000), Address::new(0x6000), MappingFlags::GUARD);
    let (mut space, _) = space_with(vec![vec![anon(0x1000, 0x2000), guard, anon(0x8000, 0x9000)]]);
    space.ensure_loaded().unwrap();

    assert_eq!(space.check_address_valid(Address::new(0x1ff0), SLOT), (true, None));
    assert_eq!(
        space.check_address_valid(Address::new(0x4000), SLOT),
        (false, Some(Address::new(0x5ff0)))
    );
    assert_eq!(
        space.check_address_valid(Address::new(0x7000), SLOT),
        (false, Some(Address::new(0x7ff0)))
    );
    assert_eq!(space.check_address_valid(Address::new(0xa000), SLOT), (false, None));
}

#[test]
fn test_anonymous_bss_is_folded_into_its_image()
{
    let (mut space, _) = space_with(vec![vec![
        file(0x10_000, 0x12_000, "/bin/demo"),
        anon(0x13_000, 0x14_000),
        anon(0x20_000, 0x21_000),
    ]]);
    space.ensure_loaded().unwrap();

    let bss = space.mapping_at(Address::new(0x13_000)).unwrap();
    assert_eq!(bss.name(), "demo");
    assert_eq!(space.base_of(bss), Address::new(0x10_000));
    assert_eq!(space.mapping_at(Address::new(0x20_000)).unwrap().name(), "");

    assert_eq!(space.resolve_name(Address::new(0x13_018)).unwrap().to_string(), "demo!counter+0x8");
}

#[test]
fn test_resolved_names()
{
    let (mut space, _) = space_with(vec![vec![
        file(0x10_000, 0x12_000, "/bin/demo"),
        file(0x30_000, 0x31_000, "/lib/libempty.so"),
        anon(0x40_000, 0x41_000),
        anon(0x50_000, 0x51_000),
    ]]);
    space.ensure_loaded().unwrap();
    let heap = space.mapping_at(Address::new(0x40_000)).unwrap().key();
    space.set_mapping_name(heap, Some("demo"), "heap");

    let mut name = |addr: u64| space.resolve_name(Address::new(addr)).unwrap();
    assert_eq!(name(0x10_040).to_string(), "demo!helper");
    assert_eq!(name(0x10_044).to_string(), "demo!helper+0x4");
    assert_eq!(name(0x30_010).to_string(), "libempty.so+0x10");
    assert_eq!(name(0x40_020).to_string(), "[demo!heap]+0x20");
    assert_eq!(name(0x50_000), ResolvedName::Unresolved(Address::new(0x50_000)));
    assert_eq!(name(0x90_000).to_string(), "0x90000");
}

#[test]
fn test_name_region_uses_owner_image()
{
    let (mut space, _) = space_with(vec![vec![file(0x10_000, 0x12_000, "/bin/demo"), anon(0x70_000, 0x80_000)]]);
    assert!(space.name_region(Address::new(0x10_100), Address::new(0x7f_f00), "stack").unwrap());
    assert_eq!(space.mapping_at(Address::new(0x70_000)).unwrap().name(), "[demo!stack]");
    assert!(!space.name_region(Address::new(0x10_100), Address::new(0x7f_f00), "heap").unwrap());
}

#[test]
fn test_mapping_limit_is_fatal()
{
    let list: Vec<MappingRecord> = (0..10u64).map(|i| anon(0x1000 * (i + 1), 0x1000 * (i + 1) + 0x800)).collect();
    let loads = Rc::new(Cell::new(0));
    let provider = Scripted { lists: vec![list], loads };
    let mut space = AddressSpace::new(provider, SymbolTable::new(symbols, 4), 8);
    assert!(matches!(space.ensure_loaded(), Err(CapscopeError::ResourceExhausted(_))));
}

#[test]
fn test_provider_failure_is_fatal()
{
    let provider = || -> Result<Vec<MappingRecord>> { Err(CapscopeError::MappingProvider("procstat missing".into())) };
    let mut space = AddressSpace::new(provider, SymbolTable::new(symbols, 4), 8);
    assert!(matches!(space.resolve(Address::new(0x1000)), Err(CapscopeError::MappingProvider(_))));
}

#[test]
fn test_images_load_once_across_reloads()
{
    let calls = Rc::new(RefCell::new(Vec::<String>::new()));
    let seen = Rc::clone(&calls);
    let provider = move |path: &str| -> Result<Vec<Symbol>> {
        seen.borrow_mut().push(path.to_string());
        Ok(Vec::new())
    };
    let list = vec![file(0x1000, 0x2000, "/bin/demo"), file(0x2000, 0x3000, "/bin/demo")];
    let loads = Rc::new(Cell::new(0));
    let mut space = AddressSpace::new(Scripted { lists: vec![list], loads }, SymbolTable::new(provider, 4), 8);
    space.reload().unwrap();
    space.reload().unwrap();
    assert_eq!(*calls.borrow(), vec!["/bin/demo".to_string()]);
}
