//! Type-keyed pool of recyclable residency tracker slots.
//!
//! One [`TypedPool<E>`] per distinct `EnumLabel` type the host tracks,
//! stored behind a type-erased map so [`ResidencyTrackerPool::flush_all`]
//! can walk every tracked type without the caller naming it.

use std::any::Any;
use std::cell::RefCell;
use std::io::{self, Write};
use std::path::Path;
use std::rc::Rc;

use anymap3::Map;
use simloom_clock::Tick;
use simloom_state::EnumLabel;
use tracing::debug;

use crate::tracker::{ResidencyTracker, TrackerSlot};

pub(crate) struct TypedPool<E: EnumLabel> {
    pub(crate) slots: slab::Slab<TrackerSlot<E>>,
    free: Vec<usize>,
}

impl<E: EnumLabel> TypedPool<E> {
    fn new() -> Self {
        Self {
            slots: slab::Slab::new(),
            free: Vec::new(),
        }
    }

    fn acquire(&mut self, initial: E, construction_tick: Tick) -> usize {
        if let Some(slot) = self.free.pop() {
            self.slots[slot].reset(initial, construction_tick);
            slot
        } else {
            self.slots.insert(TrackerSlot {
                deltas: vec![0; E::COUNT],
                last_transition: construction_tick,
                current: initial,
            })
        }
    }

    pub(crate) fn release(&mut self, slot: usize) {
        self.free.push(slot);
    }

    fn instance_count(&self) -> usize {
        self.slots.len()
    }

    fn write_block(&self, out: &mut dyn Write) -> io::Result<()> {
        let mut totals = vec![0u64; E::COUNT];
        for (_, slot) in self.slots.iter() {
            for (i, d) in slot.deltas.iter().enumerate() {
                totals[i] += d;
            }
        }
        let instance_count = self.instance_count().max(1) as u64;

        writeln!(out, "Enum Class Name : {}", E::type_name())?;
        writeln!(out, "Total State Tracker Units used : {}", self.instance_count())?;
        writeln!(out, "Aggregate Residency Stats:")?;
        for value in E::all() {
            writeln!(out, "  {} : {}", value.label(), totals[value.index()])?;
        }
        writeln!(out)?;
        writeln!(out, "Average Residency Stats:")?;
        for value in E::all() {
            writeln!(
                out,
                "  {} : {}",
                value.label(),
                totals[value.index()] / instance_count
            )?;
        }
        Ok(())
    }
}

/// Object-safe facade over a `Rc<RefCell<TypedPool<E>>>`, kept in flush
/// registration order alongside the typed [`Map`] below since `Map` itself
/// has no way to iterate its contents without naming every type.
trait FlushableTypedPool {
    fn write_block(&self, out: &mut dyn Write) -> io::Result<()>;
}

struct TypedPoolHandle<E: EnumLabel>(Rc<RefCell<TypedPool<E>>>);

impl<E: EnumLabel> FlushableTypedPool for TypedPoolHandle<E> {
    fn write_block(&self, out: &mut dyn Write) -> io::Result<()> {
        self.0.borrow().write_block(out)
    }
}

/// Central registry of residency trackers, keyed by the tracked enum type.
///
/// A host constructs one `ResidencyTrackerPool`, hands out trackers via
/// [`ResidencyTrackerPool::acquire`] as `State<Enum>` instances are built,
/// and calls [`ResidencyTrackerPool::flush_all`] at teardown to write the
/// aggregate histogram file.
#[derive(Default)]
pub struct ResidencyTrackerPool {
    typed: RefCell<Map<dyn Any>>,
    flush_order: RefCell<Vec<Box<dyn FlushableTypedPool>>>,
}

impl ResidencyTrackerPool {
    pub fn new() -> Self {
        Self {
            typed: RefCell::new(Map::new()),
            flush_order: RefCell::new(Vec::new()),
        }
    }

    fn typed_pool<E: EnumLabel>(&self) -> Rc<RefCell<TypedPool<E>>> {
        let mut typed = self.typed.borrow_mut();
        if let Some(handle) = typed.get::<Rc<RefCell<TypedPool<E>>>>() {
            return handle.clone();
        }
        let handle = Rc::new(RefCell::new(TypedPool::<E>::new()));
        typed.insert(handle.clone());
        self.flush_order
            .borrow_mut()
            .push(Box::new(TypedPoolHandle(handle.clone())));
        handle
    }

    /// Check out a tracker for one `State<E>` instance, starting in
    /// `initial` at `construction_tick`.
    pub fn acquire<E: EnumLabel>(&self, initial: E, construction_tick: Tick) -> ResidencyTracker<E> {
        let pool = self.typed_pool::<E>();
        let slot = pool.borrow_mut().acquire(initial, construction_tick);
        ResidencyTracker::new(pool, slot)
    }

    /// Number of tracker slots ever allocated for `E` (free or in use) —
    /// Slab entries are recycled, never removed, so this is the true
    /// lifetime instance count.
    pub fn instance_count<E: EnumLabel>(&self) -> usize {
        match self.typed.borrow().get::<Rc<RefCell<TypedPool<E>>>>() {
            Some(handle) => handle.borrow().instance_count(),
            None => 0,
        }
    }

    /// Write one histogram block per tracked enum type to `path`, in
    /// first-registered order.
    pub fn flush_all(&self, path: &Path) -> io::Result<()> {
        let types = self.flush_order.borrow().len();
        debug!(types, path = %path.display(), "flushing residency histograms");
        let file = std::fs::File::create(path)?;
        let mut out = io::BufWriter::new(file);
        for handle in self.flush_order.borrow().iter() {
            handle.write_block(&mut out)?;
            writeln!(out)?;
        }
        out.flush()
    }
}
