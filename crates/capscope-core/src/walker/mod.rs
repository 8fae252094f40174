//! # Capability Graph Walker
//!
//! Depth-first traversal of every valid capability reachable from a
//! register snapshot.
//!
//! Each root is printed, then (unless it is a sentry or its backing range was
//! already explored from an earlier root) every capability-sized slot inside
//! its bounds is loaded. Valid capabilities found there are printed one level
//! deeper and explored the same way.
//!
//! ## Termination
//!
//! A capability is only explored after its `[base, top)` has been added to
//! the visited [`RangeSet`]; a range that is already covered is never
//! explored again, from any root. Memory holding the walker's own frames is
//! recorded in an exclusion set before the walk starts: slots inside it are
//! never read, and capabilities bounded entirely inside it are never
//! followed.
//!
//! ## Order
//!
//! Output order matches a recursive preorder traversal, but the walk keeps an
//! explicit stack of scan frames, so deep pointer chains cannot overflow the
//! native stack.

mod output;

pub use output::{Discovery, Label};
use tracing::{debug, trace};

use crate::address_space::{AddressSpace, MappingProvider};
use crate::capability::{Capability, CapabilityMemory, RegisterSnapshot, RootOrder};
use crate::error::{CapscopeError, Result};
use crate::range_set::{Range, RangeSet};
use crate::symbols::SymbolProvider;
use crate::types::Address;

/// Tag given to the stack mapping found from a root.
const STACK_TAG: &str = "stack";

/// Per-walk settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkConfig
{
    /// Initial capacity of the visited set
    pub visited_capacity: usize,
    /// Initial capacity of the exclusion set
    pub exclude_capacity: usize,
    /// Upper bound on visited entries before the walk gives up
    pub max_ranges: usize,
    /// Name an unnamed stack mapping `[image!stack]` when a root points into it
    pub name_stack: bool,
    /// Order in which roots are walked
    pub root_order: RootOrder,
}

impl Default for WalkConfig
{
    fn default() -> Self
    {
        Self {
            visited_capacity: 1024,
            exclude_capacity: 100,
            max_ranges: 8192,
            name_stack: true,
            root_order: RootOrder::default(),
        }
    }
}

/// Scan position inside one explored capability.
#[derive(Debug)]
struct Frame
{
    cursor: Address,
    end: Address,
    depth: usize,
}

/// State of one walk. Created per walk and dropped with it.
pub struct Walker<'a, P, S, M>
{
    space: &'a mut AddressSpace<P, S>,
    memory: &'a M,
    config: &'a WalkConfig,
    visited: RangeSet,
    exclude: RangeSet,
}

impl<'a, P, S, M> Walker<'a, P, S, M>
where
    P: MappingProvider,
    S: SymbolProvider,
{
    /// Prepare a walk over `space`, reading slots from `memory`.
    pub fn new(space: &'a mut AddressSpace<P, S>, memory: &'a M, config: &'a WalkConfig) -> Self
    {
        Self {
            space,
            memory,
            config,
            visited: RangeSet::new(config.visited_capacity),
            exclude: RangeSet::new(config.exclude_capacity),
        }
    }

    /// Ranges explored so far.
    pub fn visited(&self) -> &RangeSet
    {
        &self.visited
    }

    /// Ranges never read.
    pub fn excluded(&self) -> &RangeSet
    {
        &self.exclude
    }

    /// Walk every root of `snapshot`, passing each discovery to `sink` as it
    /// is made. Each run starts from empty visited and exclusion sets.
    ///
    /// ## Errors
    ///
    /// - `MappingProvider` when the mapping list cannot be loaded
    /// - `ResourceExhausted` when the visited set outgrows `max_ranges`
    pub fn run<C, F>(&mut self, snapshot: &RegisterSnapshot<C>, mut sink: F) -> Result<()>
    where
        C: Capability,
        M: CapabilityMemory<C>,
        F: FnMut(Discovery),
    {
        self.visited.reset();
        self.exclude.reset();
        self.space.ensure_loaded()?;
        self.exclude_own_frames(snapshot)?;

        let roots = snapshot.roots(self.config.root_order);
        debug!(roots = roots.len(), "starting capability walk");
        for (name, capability) in roots {
            self.walk_root(snapshot, name, capability, &mut sink)?;
        }
        debug!(visited = self.visited.len(), "capability walk finished");
        Ok(())
    }

    /// Record the walker's frames: from the start of the stack mapping
    /// holding the snapshot up to the end of the snapshot.
    fn exclude_own_frames<C: Capability>(&mut self, snapshot: &RegisterSnapshot<C>) -> Result<()>
    {
        let frame = snapshot.frame;
        if frame.is_empty() {
            return Ok(());
        }
        let start = self
            .space
            .resolve(frame.start)?
            .map_or(frame.start, |mapping| mapping.start);
        self.exclude.add(start, frame.end);
        trace!(%start, end = %frame.end, "excluding walker frames");
        Ok(())
    }

    fn walk_root<C, F>(&mut self, snapshot: &RegisterSnapshot<C>, name: String, root: C, sink: &mut F) -> Result<()>
    where
        C: Capability,
        M: CapabilityMemory<C>,
        F: FnMut(Discovery),
    {
        if !root.is_valid() {
            trace!(register = %name, "skipping untagged root");
            return Ok(());
        }
        if self.config.name_stack {
            self.name_stack(snapshot, &root)?;
        }
        self.emit(&root, Label::Register(name), 0, sink)?;

        let bounds = root.bounds();
        if !self.visit(bounds)? {
            return Ok(());
        }

        let mut stack: Vec<Frame> = Vec::new();
        stack.extend(scan_frame(&root, 0));
        while let Some(frame) = stack.last_mut() {
            let Some((slot, child)) = self.next_child(frame)? else {
                stack.pop();
                continue;
            };
            let depth = frame.depth + 1;
            self.emit(&child, Label::Slot(slot), depth, sink)?;
            stack.extend(scan_frame(&child, depth));
        }
        Ok(())
    }

    /// Give the mapping a root points into the name `[image!stack]` when it
    /// holds the snapshot and has no name yet.
    fn name_stack<C: Capability>(&mut self, snapshot: &RegisterSnapshot<C>, root: &C) -> Result<()>
    {
        let frame = snapshot.frame.start;
        let key = match self.space.resolve(root.address())? {
            Some(mapping) if mapping.name().is_empty() && mapping.contains(frame) => mapping.key(),
            _ => return Ok(()),
        };

        let owner = match snapshot.code_address() {
            Some(code) => self.space.resolve(code)?.map(|mapping| mapping.name().to_string()),
            None => None,
        };
        self.space.set_mapping_name(key, owner.as_deref(), STACK_TAG);
        Ok(())
    }

    fn emit<C, F>(&mut self, capability: &C, label: Label, depth: usize, sink: &mut F) -> Result<()>
    where
        C: Capability,
        F: FnMut(Discovery),
    {
        let address = capability.address();
        let name = self.space.resolve_name(address)?;
        sink(Discovery {
            depth,
            label,
            address,
            name,
        });
        Ok(())
    }

    /// Add `bounds` to the visited set, reporting whether it was new.
    ///
    /// Zero-length bounds are always new and never stored; they hold no slot
    /// and so are leaves.
    fn visit(&mut self, bounds: Range) -> Result<bool>
    {
        if bounds.is_empty() {
            return Ok(true);
        }
        if !self.visited.add(bounds.start, bounds.end) {
            return Ok(false);
        }
        if self.visited.len() > self.config.max_ranges {
            return Err(CapscopeError::ResourceExhausted(format!(
                "visited set exceeds {} ranges",
                self.config.max_ranges
            )));
        }
        Ok(true)
    }

    /// Advance `frame` to the next slot holding an unexplored capability.
    fn next_child<C>(&mut self, frame: &mut Frame) -> Result<Option<(Address, C)>>
    where
        C: Capability,
        M: CapabilityMemory<C>,
    {
        while frame.cursor < frame.end {
            let slot = frame.cursor;
            let Some(next) = slot.checked_add(C::SIZE) else {
                frame.cursor = frame.end;
                break;
            };

            if let Some(excluded) = self.exclude.find(slot) {
                frame.cursor = excluded.end.align_up(C::SIZE).max(next);
                continue;
            }

            let (accessible, skip_to) = self.space.check_address_valid(slot, C::SIZE);
            if !accessible {
                frame.cursor = match skip_to {
                    Some(last) => last.saturating_add(C::SIZE).max(next),
                    None if self.space.mapping_at(slot).is_some() => next,
                    None => frame.end,
                };
                trace!(%slot, resume = %frame.cursor, "skipping inaccessible memory");
                continue;
            }

            frame.cursor = next;
            let Some(child) = self.memory.load_capability(slot) else {
                continue;
            };
            if !child.is_valid() {
                continue;
            }
            let bounds = child.bounds();
            if self.exclude.covers(bounds.start, bounds.end) {
                trace!(%slot, "capability into walker frames");
                continue;
            }
            if self.visit(bounds)? {
                return Ok(Some((slot, child)));
            }
        }
        Ok(None)
    }
}

/// Slot range to scan inside `capability`, or `None` if it is a leaf.
///
/// Sentries are leaves, as are capabilities whose address lies outside
/// their bounds or whose bounds hold no aligned slot.
fn scan_frame<C: Capability>(capability: &C, depth: usize) -> Option<Frame>
{
    if capability.is_sentry() {
        return None;
    }
    let base = capability.base();
    let top = capability.top();
    let address = capability.address();
    if address < base || address >= top {
        return None;
    }

    let start = base.align_up(C::SIZE);
    let end = top.align_down(C::SIZE);
    (start < end).then_some(Frame {
        cursor: start,
        end,
        depth,
    })
}

/// Walk `snapshot` over `space` and collect every discovery.
///
/// ## Errors
///
/// See [`Walker::run`].
pub fn walk<C, P, S, M>(
    space: &mut AddressSpace<P, S>,
    memory: &M,
    snapshot: &RegisterSnapshot<C>,
    config: &WalkConfig,
) -> Result<Vec<Discovery>>
where
    C: Capability,
    P: MappingProvider,
    S: SymbolProvider,
    M: CapabilityMemory<C>,
{
    let mut found = Vec::new();
    Walker::new(space, memory, config).run(snapshot, |discovery| found.push(discovery))?;
    Ok(found)
}
